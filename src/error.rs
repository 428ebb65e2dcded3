use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while opening or reading a slide.
#[derive(Debug, Error)]
pub enum SlideError {
    /// The slide file could not be opened or decoded
    #[error("Failed to open slide {path}: {message}")]
    Open { path: PathBuf, message: String },

    /// Requested region does not fit inside the slide
    #[error(
        "Region out of bounds: {size}px square at ({x}, {y}) exceeds slide of {width}x{height}"
    )]
    RegionOutOfBounds {
        x: u32,
        y: u32,
        size: u32,
        width: u32,
        height: u32,
    },
}

/// Errors raised while loading polygon annotations.
#[derive(Debug, Error)]
pub enum AnnotationError {
    /// The annotation file could not be read
    #[error("Failed to read annotation file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A line of the annotation file is malformed
    #[error("Invalid annotation on line {line}: {message}")]
    Parse { line: usize, message: String },
}

/// Errors raised while loading a tissue mask.
#[derive(Debug, Error)]
pub enum MaskError {
    /// Raster mask could not be decoded
    #[error("Failed to decode mask image {path}: {message}")]
    Decode { path: PathBuf, message: String },

    /// Mask file extension is not a known raster or polygon format
    #[error("Unsupported mask format: {path}")]
    UnsupportedFormat { path: PathBuf },

    /// Raster mask has a zero dimension
    #[error("Mask image {path} is empty")]
    Empty { path: PathBuf },

    /// Polygon mask could not be parsed
    #[error("Polygon mask error: {0}")]
    Annotation(#[from] AnnotationError),
}

/// Errors raised by patch writers.
#[derive(Debug, Error)]
pub enum WriterError {
    /// Filesystem error while writing a patch or container
    #[error("Failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// PNG encoding failed
    #[error("Failed to encode patch: {message}")]
    Encode { message: String },
}

/// Errors raised while loading or persisting coordinate metadata.
#[derive(Debug, Error)]
pub enum MetadataError {
    /// Filesystem error
    #[error("Failed to access slide coords file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON syntax or schema error
    #[error("Invalid slide coords JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Stored coordinate is negative or not finite
    #[error("Invalid coordinate [{x}, {y}] for slide {slide}, label {label}")]
    InvalidCoordinate {
        slide: String,
        label: String,
        x: f64,
        y: f64,
    },
}

/// Errors raised while discovering slides and their guidance files.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// Directory or manifest could not be read
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Manifest lacks a required column
    #[error("Manifest {path} has no column named {column}")]
    MissingColumn { path: PathBuf, column: &'static str },

    /// Manifest row does not match the header
    #[error("Malformed manifest row {line} in {path}: {message}")]
    MalformedRow {
        path: PathBuf,
        line: usize,
        message: String,
    },
}

/// Invalid or incompatible configuration, detected before any worker starts.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Option value outside its valid range
    #[error("Invalid value {value} for --{name}: expected {expected}")]
    OutOfRange {
        name: &'static str,
        value: String,
        expected: &'static str,
    },

    /// Options that cannot be combined
    #[error("Incompatible options: {0}")]
    Incompatible(String),

    /// Stored coordinates could not be loaded
    #[error("Cannot load stored coordinates: {0}")]
    Metadata(#[from] MetadataError),
}

/// Errors that abort extraction of a single slide.
///
/// A slide failing never aborts the batch or the run; the coordinator logs the
/// error and leaves the slide out of the merged metadata.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("Slide error: {0}")]
    Slide(#[from] SlideError),

    #[error("Annotation error: {0}")]
    Annotation(#[from] AnnotationError),

    #[error("Tissue mask error: {0}")]
    Mask(#[from] MaskError),

    #[error("Writer error: {0}")]
    Writer(#[from] WriterError),

    /// Slide has no annotation file or stored coordinates
    #[error("No guidance available for slide {slide}")]
    MissingGuidance { slide: String },

    /// The worker terminated without reporting a result
    #[error("Worker for slide {slide} terminated abnormally")]
    WorkerAborted { slide: String },
}

/// Errors that abort a whole extraction run.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    /// The merged metadata could not be persisted
    #[error("Failed to persist slide coordinates: {0}")]
    Metadata(#[from] MetadataError),
}

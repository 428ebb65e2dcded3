//! Slide discovery.
//!
//! Slides are located either by walking a root directory or by reading a
//! tab-separated manifest. For each slide the catalog also resolves the
//! guidance files (annotation, tissue mask) that belong to it.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::CatalogError;

/// File extensions recognised as slides when walking a directory.
pub const SLIDE_EXTENSIONS: &[&str] = &["tiff", "tif", "svs", "scn", "png", "jpg", "jpeg"];

/// Default directory pattern below the slide root.
pub const DEFAULT_SLIDE_PATTERN: &str = "subtype";

/// Where slides come from.
#[derive(Debug, Clone, PartialEq)]
pub enum SlideSource {
    /// Walk `root`; `pattern` lists the `/`-separated directory levels between
    /// the root and each slide file (e.g. `subtype`).
    Directory { root: PathBuf, pattern: String },

    /// Read a tab-separated manifest with a `slide_path` column and optional
    /// `annotation_path`, `mask_path` and `subtype` columns.
    Manifest { path: PathBuf },
}

/// Slide discovery settings.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogConfig {
    pub source: SlideSource,

    /// Directory holding `<slide_name>.txt` annotation files.
    pub annotation_location: Option<PathBuf>,

    /// Directory holding `<slide_name>.png` or `<slide_name>.txt` tissue masks.
    pub mask_location: Option<PathBuf>,
}

/// A slide together with its resolved guidance files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlideEntry {
    /// File stem, used as the key in coordinate metadata
    pub name: String,

    /// Identifier used in the output layout, e.g. `MMRd/VOA-1099A`
    pub slide_id: String,

    /// Path of the slide file
    pub path: PathBuf,

    /// Polygon annotation file, if any
    pub annotation: Option<PathBuf>,

    /// Tissue mask file, if any
    pub mask: Option<PathBuf>,
}

impl SlideEntry {
    /// Create an entry with no guidance files.
    pub fn new(path: impl Into<PathBuf>, slide_id: impl Into<String>) -> Self {
        let path = path.into();
        Self {
            name: file_stem(&path),
            slide_id: slide_id.into(),
            path,
            annotation: None,
            mask: None,
        }
    }

    pub fn with_annotation(mut self, annotation: impl Into<PathBuf>) -> Self {
        self.annotation = Some(annotation.into());
        self
    }

    pub fn with_mask(mut self, mask: impl Into<PathBuf>) -> Self {
        self.mask = Some(mask.into());
        self
    }
}

/// Discover every slide described by `config`, sorted by path.
pub fn discover(config: &CatalogConfig) -> Result<Vec<SlideEntry>, CatalogError> {
    let mut entries = match &config.source {
        SlideSource::Directory { root, pattern } => {
            let mut paths = Vec::new();
            collect_slide_paths(root, &mut paths)?;
            paths.sort();
            paths
                .into_iter()
                .map(|path| {
                    let slide_id = slide_id_from_pattern(&path, pattern);
                    SlideEntry::new(path, slide_id)
                })
                .collect()
        }
        SlideSource::Manifest { path } => read_manifest(path)?,
    };

    for entry in &mut entries {
        if entry.annotation.is_none() {
            if let Some(dir) = &config.annotation_location {
                entry.annotation = existing(dir.join(format!("{}.txt", entry.name)));
            }
        }
        if entry.mask.is_none() {
            if let Some(dir) = &config.mask_location {
                entry.mask = existing(dir.join(format!("{}.png", entry.name)))
                    .or_else(|| existing(dir.join(format!("{}.txt", entry.name))));
            }
        }
        debug!(
            slide = %entry.name,
            annotation = entry.annotation.is_some(),
            mask = entry.mask.is_some(),
            "Discovered slide"
        );
    }

    Ok(entries)
}

/// Select the `slide_idx`-th (1-based) chunk of `chunk_size` slides.
///
/// Used to split one large slide list across independent runs. An index past
/// the end yields an empty list.
pub fn select_chunk(entries: Vec<SlideEntry>, slide_idx: usize, chunk_size: usize) -> Vec<SlideEntry> {
    let chunk_size = chunk_size.max(1);
    let start = slide_idx.saturating_sub(1).saturating_mul(chunk_size);
    entries.into_iter().skip(start).take(chunk_size).collect()
}

/// Build a slide id from the last directory levels named by `pattern`.
///
/// With pattern `subtype`, `/root/MMRd/VOA-1099A.tiff` becomes
/// `MMRd/VOA-1099A`; with an empty pattern it becomes `VOA-1099A`.
pub fn slide_id_from_pattern(path: &Path, pattern: &str) -> String {
    let depth = pattern.split('/').filter(|w| !w.is_empty()).count();

    let mut parts: Vec<String> = path
        .ancestors()
        .skip(1)
        .take(depth)
        .filter_map(|p| p.file_name())
        .map(|name| name.to_string_lossy().into_owned())
        .collect();
    parts.reverse();
    parts.push(file_stem(path));
    parts.join("/")
}

/// File name without its extension.
pub fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn existing(path: PathBuf) -> Option<PathBuf> {
    path.is_file().then_some(path)
}

fn collect_slide_paths(dir: &Path, out: &mut Vec<PathBuf>) -> Result<(), CatalogError> {
    let read_dir = fs::read_dir(dir).map_err(|source| CatalogError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    for entry in read_dir {
        let entry = entry.map_err(|source| CatalogError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        if path.is_dir() {
            collect_slide_paths(&path, out)?;
        } else if has_slide_extension(&path) {
            out.push(path);
        }
    }
    Ok(())
}

fn has_slide_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| SLIDE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

// =============================================================================
// Manifest
// =============================================================================

fn read_manifest(path: &Path) -> Result<Vec<SlideEntry>, CatalogError> {
    let text = fs::read_to_string(path).map_err(|source| CatalogError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_manifest(&text, path)
}

/// Parse a tab-separated manifest.
///
/// `origin` is only used in error messages.
pub fn parse_manifest(text: &str, origin: &Path) -> Result<Vec<SlideEntry>, CatalogError> {
    let mut lines = text
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty());

    let Some((_, header)) = lines.next() else {
        return Err(CatalogError::MissingColumn {
            path: origin.to_path_buf(),
            column: "slide_path",
        });
    };
    let columns: Vec<&str> = header.split('\t').map(str::trim).collect();
    let index_of = |name: &str| columns.iter().position(|c| *c == name);

    let slide_col = index_of("slide_path").ok_or_else(|| CatalogError::MissingColumn {
        path: origin.to_path_buf(),
        column: "slide_path",
    })?;
    let annotation_col = index_of("annotation_path");
    let mask_col = index_of("mask_path");
    let subtype_col = index_of("subtype");

    let mut entries = Vec::new();
    for (idx, line) in lines {
        let cells: Vec<&str> = line.split('\t').map(str::trim).collect();
        if cells.len() != columns.len() {
            return Err(CatalogError::MalformedRow {
                path: origin.to_path_buf(),
                line: idx + 1,
                message: format!("expected {} cells, found {}", columns.len(), cells.len()),
            });
        }
        let cell = |col: Option<usize>| {
            col.map(|c| cells[c])
                .filter(|value| !value.is_empty())
                .map(str::to_string)
        };

        let slide_path = PathBuf::from(cells[slide_col]);
        let name = file_stem(&slide_path);
        let slide_id = match cell(subtype_col) {
            Some(subtype) => format!("{subtype}/{name}"),
            None => name,
        };

        let mut entry = SlideEntry::new(slide_path, slide_id);
        entry.annotation = cell(annotation_col).map(PathBuf::from);
        entry.mask = cell(mask_col).map(PathBuf::from);
        entries.push(entry);
    }
    Ok(entries)
}

// =============================================================================
// Tests
// =============================================================================

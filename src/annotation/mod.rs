//! Pathologist polygon annotations.
//!
//! Annotation files are parsed into [`AnnotationRegion`]s, which are indexed
//! per slide by [`AnnotationIndex`] to answer which labels a tile square
//! belongs to.

mod index;
mod parser;

pub use index::{AnnotationIndex, AnnotationRegion, DEFAULT_ANNOTATION_OVERLAP, TUMOR_LABEL};
pub use parser::{load_annotations, parse_annotations};

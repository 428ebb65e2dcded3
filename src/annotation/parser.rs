//! Parser for exported polygon annotation files.
//!
//! Each non-empty line holds one polygon:
//!
//! ```text
//! Tumor [Point: 84332.8046875, 68421.28125, Point: 84340.1, 68425.0, ...]
//! Stroma [Point: ...]
//! ```

use std::fs;
use std::path::Path;

use super::AnnotationRegion;
use crate::error::AnnotationError;

/// Minimum vertex count for a polygon.
const MIN_VERTICES: usize = 3;

/// Read and parse an annotation file.
pub fn load_annotations(path: &Path) -> Result<Vec<AnnotationRegion>, AnnotationError> {
    let text = fs::read_to_string(path).map_err(|source| AnnotationError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_annotations(&text)
}

/// Parse annotation text into labelled regions, in file order.
pub fn parse_annotations(text: &str) -> Result<Vec<AnnotationRegion>, AnnotationError> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(idx, line)| parse_line(line, idx + 1))
        .collect()
}

fn parse_line(line: &str, line_no: usize) -> Result<AnnotationRegion, AnnotationError> {
    let parse_err = |message: String| AnnotationError::Parse {
        line: line_no,
        message,
    };

    let open = line
        .find('[')
        .ok_or_else(|| parse_err("missing '['".to_string()))?;
    let close = line
        .rfind(']')
        .filter(|&close| close > open)
        .ok_or_else(|| parse_err("missing ']'".to_string()))?;

    let label = line[..open].trim();
    if label.is_empty() {
        return Err(parse_err("missing label".to_string()));
    }

    let mut vertices = Vec::new();
    for point in line[open + 1..close].split("Point:") {
        let point = point.trim().trim_end_matches(',').trim();
        if point.is_empty() {
            continue;
        }
        let mut coords = point.split(',').map(str::trim);
        let (Some(x), Some(y), None) = (coords.next(), coords.next(), coords.next()) else {
            return Err(parse_err(format!("expected 'x, y', found '{point}'")));
        };
        let x: f64 = x
            .parse()
            .map_err(|_| parse_err(format!("invalid x coordinate '{x}'")))?;
        let y: f64 = y
            .parse()
            .map_err(|_| parse_err(format!("invalid y coordinate '{y}'")))?;
        vertices.push((x, y));
    }

    if vertices.len() < MIN_VERTICES {
        return Err(parse_err(format!(
            "polygon has {} vertices, need at least {MIN_VERTICES}",
            vertices.len()
        )));
    }

    Ok(AnnotationRegion::new(label, vertices))
}

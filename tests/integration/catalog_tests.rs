//! Slide discovery, chunk selection and job filtering on a real directory tree.

use std::fs;
use std::path::Path;

use wsi_patcher::extract::{select_jobs, Strategy};
use wsi_patcher::slide::catalog::{discover, select_chunk};
use wsi_patcher::slide::{CatalogConfig, SlideSource};

use super::test_utils::*;

fn touch(path: &Path) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, b"").unwrap();
}

#[test]
fn test_discover_resolves_guidance_files() {
    let dir = tempfile::tempdir().unwrap();
    let slides = dir.path().join("slides");
    touch(&slides.join("POLE/VOA-1.tiff"));
    touch(&slides.join("MMRd/VOA-2.svs"));
    touch(&slides.join("MMRd/notes.csv"));
    let annotations = dir.path().join("annotations");
    write_annotation(&annotations, "VOA-2", &rectangle_line("Tumor", 0.0, 0.0, 8.0, 8.0));

    let config = CatalogConfig {
        source: SlideSource::Directory {
            root: slides.clone(),
            pattern: "subtype".to_string(),
        },
        annotation_location: Some(annotations.clone()),
        mask_location: None,
    };
    let entries = discover(&config).unwrap();

    let ids: Vec<_> = entries.iter().map(|e| e.slide_id.as_str()).collect();
    assert_eq!(ids, vec!["MMRd/VOA-2", "POLE/VOA-1"]);
    assert_eq!(entries[0].annotation, Some(annotations.join("VOA-2.txt")));
    assert!(entries[1].annotation.is_none());

    let plan = coords_only_plan(Strategy::Annotation(annotation_strategy(1.0)), 64);
    let jobs = select_jobs(&plan, entries);
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].name, "VOA-2");
}

#[test]
fn test_slide_index_selects_chunk() {
    let dir = tempfile::tempdir().unwrap();
    for i in 1..=5 {
        touch(&dir.path().join(format!("POLE/VOA-{i}.tiff")));
    }
    let config = CatalogConfig {
        source: SlideSource::Directory {
            root: dir.path().to_path_buf(),
            pattern: "subtype".to_string(),
        },
        annotation_location: None,
        mask_location: None,
    };

    let chunk = select_chunk(discover(&config).unwrap(), 2, 2);
    let names: Vec<_> = chunk.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, vec!["VOA-3", "VOA-4"]);

    assert_eq!(select_chunk(discover(&config).unwrap(), 3, 2).len(), 1);
    assert!(select_chunk(discover(&config).unwrap(), 4, 2).is_empty());
}

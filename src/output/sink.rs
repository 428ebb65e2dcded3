use std::collections::HashSet;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use clap::ValueEnum;
use image::RgbImage;
use tar::{Builder, Header};
use tracing::debug;

use super::encoder::{encode_png, gzip};
use super::layout::PatchKey;
use crate::error::WriterError;

/// How extracted patches are stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum StorageMode {
    /// One PNG file per patch under the patch root
    #[default]
    Png,
    /// One tar container per slide of gzip-compressed PNG entries
    Archive,
    /// Record coordinates only
    None,
}

/// Destination for the patches of one slide.
///
/// A sink is owned by the worker extracting the slide and only writes below
/// locations scoped to that slide.
pub trait PatchSink: Send {
    /// Store one patch.
    fn write(&mut self, key: &PatchKey, patch: &RgbImage) -> Result<(), WriterError>;

    /// Flush and close any open container. Further writes are an error.
    fn finish(&mut self) -> Result<(), WriterError>;

    /// Number of patches written so far.
    fn written(&self) -> usize;
}

/// Open the sink for `slide_name` according to `mode`.
pub fn open_sink(
    mode: StorageMode,
    root: &Path,
    slide_name: &str,
) -> Result<Box<dyn PatchSink>, WriterError> {
    Ok(match mode {
        StorageMode::Png => Box::new(PngDirectorySink::new(root)),
        StorageMode::Archive => Box::new(ArchiveSink::create(root, slide_name)?),
        StorageMode::None => Box::new(DiscardSink::default()),
    })
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> WriterError + '_ {
    move |source| WriterError::Io {
        path: path.to_path_buf(),
        source,
    }
}

// =============================================================================
// PNG Directory
// =============================================================================

/// Writes each patch to `<root>/<relative path>`, creating directories on
/// first use.
#[derive(Debug)]
pub struct PngDirectorySink {
    root: PathBuf,
    created: HashSet<PathBuf>,
    written: usize,
}

impl PngDirectorySink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            created: HashSet::new(),
            written: 0,
        }
    }
}

impl PatchSink for PngDirectorySink {
    fn write(&mut self, key: &PatchKey, patch: &RgbImage) -> Result<(), WriterError> {
        let dir = self.root.join(key.relative_dir());
        if !self.created.contains(&dir) {
            fs::create_dir_all(&dir).map_err(io_error(&dir))?;
            self.created.insert(dir.clone());
        }

        let path = dir.join(key.file_name());
        let png = encode_png(patch)?;
        fs::write(&path, &png).map_err(io_error(&path))?;
        self.written += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<(), WriterError> {
        Ok(())
    }

    fn written(&self) -> usize {
        self.written
    }
}

// =============================================================================
// Archive Container
// =============================================================================

/// Writes every patch of a slide into `<root>/<slide_name>.tar`.
///
/// Entries are named by the patch's relative path with a `.gz` suffix and
/// hold the PNG bytes gzip-compressed at level 9. An existing container for
/// the slide is replaced.
pub struct ArchiveSink {
    path: PathBuf,
    builder: Option<Builder<BufWriter<File>>>,
    written: usize,
}

impl ArchiveSink {
    pub fn create(root: &Path, slide_name: &str) -> Result<Self, WriterError> {
        fs::create_dir_all(root).map_err(io_error(root))?;
        let path = root.join(format!("{slide_name}.tar"));
        let file = File::create(&path).map_err(io_error(&path))?;
        debug!(path = %path.display(), "Opened patch container");

        Ok(Self {
            path,
            builder: Some(Builder::new(BufWriter::new(file))),
            written: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PatchSink for ArchiveSink {
    fn write(&mut self, key: &PatchKey, patch: &RgbImage) -> Result<(), WriterError> {
        let path = &self.path;
        let Some(builder) = self.builder.as_mut() else {
            return Err(WriterError::Io {
                path: path.clone(),
                source: std::io::Error::other("container already finished"),
            });
        };

        let entry = gzip(&encode_png(patch)?)?;
        let mut header = Header::new_gnu();
        header.set_size(entry.len() as u64);
        header.set_mode(0o644);
        builder
            .append_data(&mut header, format!("{}.gz", key.entry_name()), &entry[..])
            .map_err(io_error(path))?;
        self.written += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<(), WriterError> {
        if let Some(builder) = self.builder.take() {
            let mut writer = builder.into_inner().map_err(io_error(&self.path))?;
            std::io::Write::flush(&mut writer).map_err(io_error(&self.path))?;
        }
        Ok(())
    }

    fn written(&self) -> usize {
        self.written
    }
}

// =============================================================================
// Discard
// =============================================================================

/// Counts patches without storing them.
#[derive(Debug, Default)]
pub struct DiscardSink {
    written: usize,
}

impl PatchSink for DiscardSink {
    fn write(&mut self, _key: &PatchKey, _patch: &RgbImage) -> Result<(), WriterError> {
        self.written += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<(), WriterError> {
        Ok(())
    }

    fn written(&self) -> usize {
        self.written
    }
}

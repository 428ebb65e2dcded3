//! Patch storage.
//!
//! Patches are addressed by [`PatchKey`] and handed to a [`PatchSink`]:
//!
//! | Mode      | Sink                 | Result                                   |
//! |-----------|----------------------|------------------------------------------|
//! | `png`     | [`PngDirectorySink`] | `<root>/<label>/<slide_id>/<size>/<mag>/<x>_<y>.png` |
//! | `archive` | [`ArchiveSink`]      | `<root>/<slide_name>.tar` of `.png.gz` entries |
//! | `none`    | [`DiscardSink`]      | coordinates only                         |
//!
//! Independently of the mode, a [`SlideThumbnail`] can be stored per slide.

mod encoder;
mod layout;
mod sink;
mod thumbnail;

pub use encoder::{encode_png, gzip, resize_patch};
pub use layout::{magnification, PatchKey, FULL_MAGNIFICATION};
pub use sink::{
    open_sink, ArchiveSink, DiscardSink, PatchSink, PngDirectorySink, StorageMode,
};
pub use thumbnail::{label_colour, SlideThumbnail, THUMBNAIL_DIR, THUMBNAIL_MAX_SIDE};

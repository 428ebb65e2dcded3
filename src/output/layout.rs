use std::path::PathBuf;

/// Objective magnification of a tile read at full resolution.
pub const FULL_MAGNIFICATION: u32 = 40;

/// Magnification of a patch of `patch_size` pixels resized to `resize_size`.
///
/// ```
/// use wsi_patcher::output::magnification;
///
/// assert_eq!(magnification(1024, 1024), 40);
/// assert_eq!(magnification(1024, 512), 20);
/// assert_eq!(magnification(1024, 256), 10);
/// ```
pub fn magnification(patch_size: u32, resize_size: u32) -> u32 {
    if patch_size == 0 {
        return 0;
    }
    (f64::from(resize_size) * f64::from(FULL_MAGNIFICATION) / f64::from(patch_size)).round() as u32
}

/// Identifies one written patch.
///
/// Its relative path is
/// `<label>/<slide_id>/<resize_size>/<magnification>/<x>_<y>.png`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PatchKey {
    pub label: String,
    pub slide_id: String,
    pub resize_size: u32,
    pub magnification: u32,
    pub x: u32,
    pub y: u32,
}

impl PatchKey {
    pub fn new(
        label: impl Into<String>,
        slide_id: impl Into<String>,
        patch_size: u32,
        resize_size: u32,
        x: u32,
        y: u32,
    ) -> Self {
        Self {
            label: label.into(),
            slide_id: slide_id.into(),
            resize_size,
            magnification: magnification(patch_size, resize_size),
            x,
            y,
        }
    }

    /// Directory holding the patch, relative to the patch root.
    pub fn relative_dir(&self) -> PathBuf {
        let mut dir = PathBuf::from(&self.label);
        for part in self.slide_id.split('/').filter(|p| !p.is_empty()) {
            dir.push(part);
        }
        dir.push(self.resize_size.to_string());
        dir.push(self.magnification.to_string());
        dir
    }

    pub fn file_name(&self) -> String {
        format!("{}_{}.png", self.x, self.y)
    }

    pub fn relative_path(&self) -> PathBuf {
        self.relative_dir().join(self.file_name())
    }

    /// `/`-separated relative path, used for container entry names.
    pub fn entry_name(&self) -> String {
        format!(
            "{}/{}/{}/{}/{}",
            self.label,
            self.slide_id.trim_matches('/'),
            self.resize_size,
            self.magnification,
            self.file_name()
        )
    }
}

use crate::links::Link;
use std::path::{Path, PathBuf};

/// Extensions treated as video; everything else a downloader leaves behind is
/// relayed as an image.
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "mkv"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Video,
    Image,
}

impl MediaKind {
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_lowercase());

        match ext {
            Some(ext) if VIDEO_EXTENSIONS.contains(&ext.as_str()) => MediaKind::Video,
            _ => MediaKind::Image,
        }
    }
}

/// One downloaded file on disk. The job owns it until the relay step takes
/// over; the dispatcher deletes it after transmission either way.
#[derive(Debug)]
pub struct MediaFile {
    pub path: PathBuf,
    pub kind: MediaKind,
}

impl MediaFile {
    pub fn new(path: PathBuf) -> Self {
        let kind = MediaKind::from_path(&path);
        Self { path, kind }
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "media".to_string())
    }
}

/// The successful outcome of one retrieval job.
#[derive(Debug)]
pub struct Retrieval {
    pub link: Link,
    pub files: Vec<MediaFile>,
    /// Per-job scratch directory holding the files. Removed wholesale once
    /// the files have been handed off.
    pub scratch_dir: PathBuf,
}

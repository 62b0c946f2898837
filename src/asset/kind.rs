//! Media kinds eligible for asset children.

use crate::utils::mime;

/// Media family of a syncable file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Audio,
    Video,
}

impl MediaKind {
    /// Kind of a URL or path, judged by its extension.
    pub fn of(path: &str) -> Option<Self> {
        let ext = mime::extension(path)?;
        let mime = mime::from_extension(Some(&ext));
        if mime::is_image(mime) {
            Some(Self::Image)
        } else if mime::is_audio(mime) {
            Some(Self::Audio)
        } else if mime::is_video(mime) {
            Some(Self::Video)
        } else {
            None
        }
    }
}

/// Only images, audio and video become asset children.
pub fn is_syncable(path: &str) -> bool {
    MediaKind::of(path).is_some()
}

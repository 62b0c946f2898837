//! Remote media store boundary.
//!
//! The pipelines only need "publish this local file under this public id"
//! and the URL it is delivered from afterwards. [`RemoteStore`] is that
//! contract; [`LocalMirror`] implements it against a directory served by
//! any static file server.

mod mirror;

pub use mirror::LocalMirror;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::utils::mime;

/// Eager transformation requested for image uploads
pub const IMAGE_EAGER: &str = "f_auto,q_auto";

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("cannot read `{0}`")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("upload of `{0}` rejected: {1}")]
    Rejected(String, String),

    #[error("remote store unavailable: {0}")]
    Unavailable(String),

    #[error("`{file}` failed {attempts} times, not retrying")]
    RetryCeiling { file: String, attempts: u32 },
}

/// What is being uploaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadSource {
    /// A plain local file (static cache).
    File(PathBuf),
    /// A file backing an asset child record.
    Asset { id: u64, file: PathBuf },
}

impl UploadSource {
    pub fn file(&self) -> &Path {
        match self {
            Self::File(file) | Self::Asset { file, .. } => file,
        }
    }
}

/// Remote resource family of an upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceType {
    Image,
    Video,
    Raw,
}

impl ResourceType {
    /// Audio travels as video; anything that is not media is raw.
    pub fn for_path(path: &Path) -> Self {
        let mime = mime::from_path(path);
        if mime::is_image(mime) {
            Self::Image
        } else if mime::is_video(mime) || mime::is_audio(mime) {
            Self::Video
        } else {
            Self::Raw
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
            Self::Raw => "raw",
        }
    }
}

/// Options of a single upload call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadOptions {
    pub resource_type: ResourceType,
    pub public_id: String,
    pub overwrite: bool,
    pub unique_filename: bool,
    pub eager: Option<String>,
}

/// An eagerly generated variant of an uploaded resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EagerVariant {
    pub transformation: String,
    pub secure_url: String,
}

/// Remote store answer to a successful upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadResponse {
    pub public_id: String,
    pub secure_url: String,
    pub version: u64,
    #[serde(default)]
    pub eager: Vec<EagerVariant>,
}

impl UploadResponse {
    /// URL to deliver: the first eager variant when present.
    pub fn delivery_url(&self) -> &str {
        self.eager
            .first()
            .map_or(self.secure_url.as_str(), |v| v.secure_url.as_str())
    }
}

/// Publishes local files to a remote media store.
pub trait RemoteStore: Send + Sync {
    fn upload(
        &self,
        source: &UploadSource,
        options: &UploadOptions,
    ) -> Result<UploadResponse, RemoteError>;
}

//! Directory-backed remote store.
//!
//! Copies each upload to `<root>/<public_id>.<ext>` and answers with the URL
//! a static server mounted at `base_url` delivers it from:
//!
//! ```text
//! <base_url>/<resource_type>/upload[/<eager>]/v<version>/<public_id>.<ext>
//! ```

use std::fs;
use std::path::PathBuf;

use super::{
    EagerVariant, RemoteError, RemoteStore, UploadOptions, UploadResponse, UploadSource,
};
use crate::debug;
use crate::store::Clock;
use crate::utils::mime;

#[derive(Debug, Clone)]
pub struct LocalMirror {
    root: PathBuf,
    base_url: String,
    clock: Clock,
}

impl LocalMirror {
    pub fn new(root: impl Into<PathBuf>, base_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            clock: Clock::System,
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    fn url(&self, options: &UploadOptions, transformation: Option<&str>, version: u64, name: &str) -> String {
        let mut url = format!("{}/{}/upload", self.base_url, options.resource_type.as_str());
        if let Some(t) = transformation {
            url.push('/');
            url.push_str(t);
        }
        format!("{url}/v{version}/{name}")
    }
}

impl RemoteStore for LocalMirror {
    fn upload(
        &self,
        source: &UploadSource,
        options: &UploadOptions,
    ) -> Result<UploadResponse, RemoteError> {
        let file = source.file();
        if !file.is_file() {
            return Err(RemoteError::Rejected(
                file.display().to_string(),
                "not a file".to_string(),
            ));
        }

        let public_id = options.public_id.trim_matches('/');
        if public_id.is_empty() {
            return Err(RemoteError::Rejected(
                file.display().to_string(),
                "empty public id".to_string(),
            ));
        }

        let name = match mime::extension(&file.to_string_lossy()) {
            Some(ext) => format!("{public_id}.{ext}"),
            None => public_id.to_string(),
        };

        let target = self.root.join(&name);
        if target.exists() && !options.overwrite {
            return Err(RemoteError::Rejected(name, "already exists".to_string()));
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| RemoteError::Io(parent.to_path_buf(), e))?;
        }
        fs::copy(file, &target).map_err(|e| RemoteError::Io(file.to_path_buf(), e))?;

        let version = self.clock.now_secs();
        let eager = options
            .eager
            .iter()
            .map(|t| EagerVariant {
                transformation: t.clone(),
                secure_url: self.url(options, Some(t), version, &name),
            })
            .collect();

        debug!("upload"; "mirrored {} -> {}", file.display(), target.display());
        Ok(UploadResponse {
            public_id: public_id.to_string(),
            secure_url: self.url(options, None, version, &name),
            version,
            eager,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::ResourceType;
    use tempfile::TempDir;

    fn options(public_id: &str, eager: Option<&str>) -> UploadOptions {
        UploadOptions {
            resource_type: ResourceType::Image,
            public_id: public_id.to_string(),
            overwrite: true,
            unique_filename: false,
            eager: eager.map(str::to_string),
        }
    }

    #[test]
    fn test_upload_copies_and_builds_urls() {
        let src = TempDir::new().unwrap();
        let mirror_dir = TempDir::new().unwrap();
        let file = src.path().join("logo.png");
        fs::write(&file, b"png").unwrap();

        let mirror = LocalMirror::new(mirror_dir.path(), "https://cdn.example/")
            .with_clock(Clock::manual(1_700_000_000_000));
        let response = mirror
            .upload(&UploadSource::File(file), &options("site/x/logo", Some("f_auto,q_auto")))
            .unwrap();

        assert!(mirror_dir.path().join("site/x/logo.png").is_file());
        assert_eq!(response.version, 1_700_000_000);
        assert_eq!(
            response.secure_url,
            "https://cdn.example/image/upload/v1700000000/site/x/logo.png"
        );
        assert_eq!(
            response.delivery_url(),
            "https://cdn.example/image/upload/f_auto,q_auto/v1700000000/site/x/logo.png"
        );
    }

    #[test]
    fn test_missing_file_is_rejected() {
        let mirror_dir = TempDir::new().unwrap();
        let mirror = LocalMirror::new(mirror_dir.path(), "https://cdn.example");
        let result = mirror.upload(
            &UploadSource::File(mirror_dir.path().join("nope.png")),
            &options("nope", None),
        );
        assert!(matches!(result, Err(RemoteError::Rejected(..))));
    }

    #[test]
    fn test_no_overwrite() {
        let src = TempDir::new().unwrap();
        let mirror_dir = TempDir::new().unwrap();
        let file = src.path().join("a.js");
        fs::write(&file, b"js").unwrap();

        let mirror = LocalMirror::new(mirror_dir.path(), "https://cdn.example");
        let mut opts = options("a", None);
        mirror.upload(&UploadSource::File(file.clone()), &opts).unwrap();
        opts.overwrite = false;
        assert!(mirror.upload(&UploadSource::File(file), &opts).is_err());
    }
}

// SPDX-License-Identifier: MPL-2.0

//! Storage for fused photos and preserved raw frames
//!
//! Artifacts are handed over as byte blobs tagged with a [`MediaKind`]. The
//! [`FallbackArtifactSink`] retries the complete artifact set on a second
//! sink when the primary one fails, so a photo and its raw frame always end
//! up side by side.

use crate::constants::file_formats;
use crate::errors::StorageError;
use crate::pipelines::photo::OutputArtifacts;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Media type tag attached to every stored blob
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    /// Fused, lossy compressed photo
    LossyPhoto,
    /// Original raw container kept verbatim
    LosslessRaw,
}

impl MediaKind {
    /// Get file extension for this media kind
    pub fn extension(&self) -> &'static str {
        match self {
            MediaKind::LossyPhoto => file_formats::PHOTO_EXTENSION,
            MediaKind::LosslessRaw => file_formats::RAW_EXTENSION,
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            MediaKind::LossyPhoto => "image/jpeg",
            MediaKind::LosslessRaw => "image/x-adobe-dng",
        }
    }
}

/// Paths of a stored artifact set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredArtifacts {
    pub photo: PathBuf,
    pub raw: Option<PathBuf>,
}

/// Destination for pipeline output
pub trait ArtifactSink: Send + Sync {
    /// Store one blob, returning where it ended up
    fn store(&self, data: &[u8], kind: MediaKind, stem: &str) -> Result<PathBuf, StorageError>;

    /// Store the encoded photo and, if present, the raw frame
    fn store_artifacts(
        &self,
        artifacts: &OutputArtifacts,
        stem: &str,
    ) -> Result<StoredArtifacts, StorageError> {
        let photo = self.store(&artifacts.encoded_image, MediaKind::LossyPhoto, stem)?;
        let raw = match &artifacts.raw_frame {
            Some(raw) => Some(self.store(raw, MediaKind::LosslessRaw, stem)?),
            None => None,
        };
        Ok(StoredArtifacts { photo, raw })
    }
}

/// Writes artifacts into a directory as `IMG_<timestamp>_<stem>.<ext>`
#[derive(Debug, Clone)]
pub struct DirectoryArtifactSink {
    dir: PathBuf,
}

impl DirectoryArtifactSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl ArtifactSink for DirectoryArtifactSink {
    fn store(&self, data: &[u8], kind: MediaKind, stem: &str) -> Result<PathBuf, StorageError> {
        std::fs::create_dir_all(&self.dir)?;

        let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        let filename = format!("IMG_{}_{}.{}", timestamp, stem, kind.extension());
        let filepath = self.dir.join(filename);

        std::fs::write(&filepath, data)?;

        info!(
            path = %filepath.display(),
            mime = kind.mime_type(),
            size = data.len(),
            "Artifact saved"
        );
        Ok(filepath)
    }
}

/// Tries `primary` first and stores the whole artifact set on `fallback` if that fails
pub struct FallbackArtifactSink<P, F> {
    primary: P,
    fallback: F,
}

impl<P: ArtifactSink, F: ArtifactSink> FallbackArtifactSink<P, F> {
    pub fn new(primary: P, fallback: F) -> Self {
        Self { primary, fallback }
    }
}

impl<P: ArtifactSink, F: ArtifactSink> ArtifactSink for FallbackArtifactSink<P, F> {
    fn store(&self, data: &[u8], kind: MediaKind, stem: &str) -> Result<PathBuf, StorageError> {
        self.primary.store(data, kind, stem).or_else(|e| {
            warn!(error = %e, "Primary store failed, using fallback");
            self.fallback.store(data, kind, stem)
        })
    }

    fn store_artifacts(
        &self,
        artifacts: &OutputArtifacts,
        stem: &str,
    ) -> Result<StoredArtifacts, StorageError> {
        match self.primary.store_artifacts(artifacts, stem) {
            Ok(stored) => Ok(stored),
            Err(e) => {
                warn!(error = %e, "Primary store failed, writing artifact set to fallback");
                let stored = self.fallback.store_artifacts(artifacts, stem)?;
                debug!(photo = %stored.photo.display(), "Artifacts stored on fallback");
                Ok(stored)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    struct UnavailableSink;

    impl ArtifactSink for UnavailableSink {
        fn store(&self, _: &[u8], _: MediaKind, _: &str) -> Result<PathBuf, StorageError> {
            Err(StorageError::Unavailable("offline".into()))
        }
    }

    fn artifacts() -> OutputArtifacts {
        OutputArtifacts {
            encoded_image: vec![0xFF, 0xD8, 0xFF],
            raw_frame: Some(Arc::from(&b"raw"[..])),
        }
    }

    #[test]
    fn test_directory_sink_writes_both_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let sink = DirectoryArtifactSink::new(dir.path());

        let stored = sink.store_artifacts(&artifacts(), "abc").unwrap();
        assert_eq!(stored.photo.parent(), Some(sink.dir()));
        assert_eq!(stored.photo.extension().unwrap(), "jpg");
        assert_eq!(std::fs::read(&stored.photo).unwrap(), vec![0xFF, 0xD8, 0xFF]);

        let raw = stored.raw.unwrap();
        assert_eq!(raw.extension().unwrap(), "dng");
        assert_eq!(std::fs::read(raw).unwrap(), b"raw");
    }

    #[test]
    fn test_fallback_keeps_artifacts_together() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FallbackArtifactSink::new(UnavailableSink, DirectoryArtifactSink::new(dir.path()));

        let stored = sink.store_artifacts(&artifacts(), "abc").unwrap();
        assert!(stored.photo.starts_with(dir.path()));
        assert!(stored.raw.unwrap().starts_with(dir.path()));
    }
}

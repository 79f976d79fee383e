// SPDX-License-Identifier: MPL-2.0

//! Directory-backed frame source
//!
//! Plays back raw files from a directory as one burst: files with a raw
//! container extension are sorted by name and the first N are submitted in
//! that order. Used when no capture device is present.

use crate::constants::file_formats;
use crate::errors::SourceError;
use crate::pipelines::photo::capture::{FrameSink, FrameSource};
use futures::future::BoxFuture;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub struct DirectoryFrameSource {
    dir: PathBuf,
}

impl DirectoryFrameSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Raw container files in the directory, sorted by file name
    pub async fn list_frames(&self) -> Result<Vec<PathBuf>, SourceError> {
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let is_raw = path
                .extension()
                .map(|ext| file_formats::is_raw_extension(&ext.to_string_lossy()))
                .unwrap_or(false);
            if is_raw && entry.file_type().await?.is_file() {
                files.push(path);
            }
        }
        files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
        Ok(files)
    }
}

impl FrameSource for DirectoryFrameSource {
    fn name(&self) -> &str {
        "directory"
    }

    fn request_burst(&self, count: usize, sink: FrameSink) -> BoxFuture<'_, Result<(), SourceError>> {
        Box::pin(async move {
            let files = self.list_frames().await?;
            if files.len() < count {
                return Err(SourceError::NotEnoughFrames {
                    found: files.len(),
                    requested: count,
                });
            }

            info!(dir = %self.dir.display(), count, "Loading burst from directory");

            // Read everything first so a read error never leaves a partial burst behind
            let mut blobs = Vec::with_capacity(count);
            for path in &files[..count] {
                let data = tokio::fs::read(path).await?;
                debug!(path = %path.display(), bytes = data.len(), "Read raw frame");
                blobs.push(data);
            }

            for data in blobs {
                sink.deliver(Ok(data));
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_lists_raw_files_sorted_by_name() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["c.dng", "a.TIF", "notes.txt", "b.nef"] {
            std::fs::write(dir.path().join(name), name).unwrap();
        }
        std::fs::create_dir(dir.path().join("z.dng")).unwrap();

        let source = DirectoryFrameSource::new(dir.path());
        assert_eq!(source.dir(), dir.path());
        let names: Vec<String> = source
            .list_frames()
            .await
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.TIF", "b.nef", "c.dng"]);
    }
}

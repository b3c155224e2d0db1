//! Reuse thumbnails that were already downloaded.
//!
//! Pinned asset ids are shown again and again, so their thumbnails are kept
//! as `<dir>/<asset_id>.jpg`. Nothing is ever evicted.

use crate::error::Error;
use std::fs;
use std::path::{Path, PathBuf};

pub struct ThumbnailCache {
    dir: PathBuf,
}

impl ThumbnailCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File for `asset_id`, or `None` if the id is unsafe as a file name.
    fn entry_path(&self, asset_id: &str) -> Option<PathBuf> {
        let safe = !asset_id.is_empty()
            && asset_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        safe.then(|| self.dir.join(format!("{asset_id}.jpg")))
    }

    /// Previously stored bytes for `asset_id`, if any.
    pub fn get(&self, asset_id: &str) -> Option<Vec<u8>> {
        let path = self.entry_path(asset_id)?;
        match fs::read(&path) {
            Ok(bytes) if !bytes.is_empty() => Some(bytes),
            _ => None,
        }
    }

    /// Store bytes for `asset_id`. Ids that cannot be used as a file name
    /// are silently not cached.
    pub fn put(&self, asset_id: &str, bytes: &[u8]) -> Result<(), Error> {
        let Some(path) = self.entry_path(asset_id) else {
            tracing::debug!("Not caching thumbnail for unusual asset id {:?}", asset_id);
            return Ok(());
        };
        fs::create_dir_all(&self.dir)?;
        // Write next to the entry and rename, so an interrupted run never
        // leaves a half-written `<id>.jpg` behind.
        let partial = path.with_extension("jpg.tmp");
        fs::write(&partial, bytes)?;
        fs::rename(&partial, &path)?;
        Ok(())
    }
}

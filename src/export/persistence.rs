//! Persistence sink
//!
//! The last hop of a transform run: the final clip is handed to a sink that
//! stores it somewhere the user can find it. The pipeline asks the sink
//! whether it accepts the file before saving.

use super::types::PersistenceError;
use crate::utils::paths::MOVIE_EXTENSION;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// A clip written by a persistence sink
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedClip {
    pub path: PathBuf,
}

/// Destination for finished clips.
#[async_trait]
pub trait PersistenceSink: Send + Sync {
    /// Whether `path` can be stored by this sink
    async fn is_compatible(&self, path: &Path) -> bool;

    /// Store the clip at `path`
    async fn save(&self, path: &Path) -> Result<SavedClip, PersistenceError>;
}

/// Extensions accepted by [`LibrarySink`]
const COMPATIBLE_EXTENSIONS: [&str; 3] = [MOVIE_EXTENSION, "mp4", "m4v"];

/// Copies clips into a library directory under timestamped names
#[derive(Debug, Clone)]
pub struct LibrarySink {
    library_dir: PathBuf,
}

impl LibrarySink {
    pub fn new(library_dir: impl Into<PathBuf>) -> Self {
        Self {
            library_dir: library_dir.into(),
        }
    }

    pub fn library_dir(&self) -> &Path {
        &self.library_dir
    }

    fn destination_for(&self, source: &Path) -> PathBuf {
        let extension = source
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or(MOVIE_EXTENSION);
        let stem = chrono::Local::now().format("clip-%Y%m%d-%H%M%S").to_string();

        let candidate = self.library_dir.join(format!("{}.{}", stem, extension));
        if !candidate.exists() {
            return candidate;
        }

        let suffix = uuid::Uuid::new_v4().simple().to_string();
        self.library_dir
            .join(format!("{}-{}.{}", stem, &suffix[..8], extension))
    }
}

#[async_trait]
impl PersistenceSink for LibrarySink {
    async fn is_compatible(&self, path: &Path) -> bool {
        let extension_ok = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| {
                COMPATIBLE_EXTENSIONS
                    .iter()
                    .any(|known| known.eq_ignore_ascii_case(e))
            })
            .unwrap_or(false);

        if !extension_ok {
            return false;
        }

        match tokio::fs::metadata(path).await {
            Ok(meta) => meta.is_file() && meta.len() > 0,
            Err(_) => false,
        }
    }

    async fn save(&self, path: &Path) -> Result<SavedClip, PersistenceError> {
        if !self.is_compatible(path).await {
            return Err(PersistenceError::Incompatible(path.to_path_buf()));
        }

        tokio::fs::create_dir_all(&self.library_dir).await?;
        let destination = self.destination_for(path);
        tokio::fs::copy(path, &destination).await?;

        tracing::info!("Saved clip to library: {:?}", destination);
        Ok(SavedClip { path: destination })
    }
}

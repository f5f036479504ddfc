//! Per-session storage namespace.
//!
//! Each capture session owns `<output_dir>/<session_id>/` while receiving and
//! produces `<output_dir>/<session_id>.mp4` next to it.

use std::io;
use std::path::{Path, PathBuf};

use frame_capture_types::{FRAME_EXTENSION, FrameKey};

/// Extension of the assembled video artifact.
pub const VIDEO_EXTENSION: &str = "mp4";

/// Storage layout for one session.
#[derive(Clone, Debug)]
pub struct SessionDir {
    session_id: String,
    root: PathBuf,
    path: PathBuf,
}

impl SessionDir {
    /// Create (or reuse) the session directory under `root`.
    pub async fn create(root: &Path, session_id: &str) -> io::Result<Self> {
        let path = root.join(session_id);
        tokio::fs::create_dir_all(&path).await?;
        Ok(Self {
            session_id: session_id.to_string(),
            root: root.to_path_buf(),
            path,
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Where a frame with `key` is stored while receiving.
    pub fn frame_path(&self, key: FrameKey) -> PathBuf {
        self.path.join(key.file_name())
    }

    /// Where the frame at contiguous `index` lives after sequencing.
    pub fn index_path(&self, index: usize) -> PathBuf {
        self.path.join(format!("{index}.{FRAME_EXTENSION}"))
    }

    /// Final video artifact, outside the frame directory.
    pub fn video_path(&self) -> PathBuf {
        self.root
            .join(format!("{}.{VIDEO_EXTENSION}", self.session_id))
    }

    /// Recursively delete the frame directory.
    ///
    /// Never fails: a missing directory counts as removed, anything else is
    /// logged. Returns `true` when the directory is gone afterwards.
    pub async fn remove(&self) -> bool {
        match tokio::fs::remove_dir_all(&self.path).await {
            Ok(()) => {
                tracing::debug!(
                    session_id = %self.session_id,
                    path = %self.path.display(),
                    "session frames removed"
                );
                true
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => true,
            Err(err) => {
                tracing::warn!(
                    session_id = %self.session_id,
                    path = %self.path.display(),
                    error = %err,
                    "failed to remove session frames"
                );
                false
            }
        }
    }
}

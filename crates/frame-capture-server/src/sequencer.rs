//! Frame sequencer.
//!
//! Renames `<key>.png` files into the contiguous `0.png .. (n-1).png` run the
//! encoder's `%d.png` input pattern expects, ordered by numeric key.

use std::fs;
use std::path::{Path, PathBuf};

use frame_capture_types::{FRAME_EXTENSION, FrameKey};
use thiserror::Error;

/// Fresh subdirectory frames pass through between the two rename passes.
/// A leading dot keeps it out of the `<key>.png` namespace.
const STAGING_DIR: &str = ".sequencing";

#[derive(Debug, Error)]
pub enum SequenceError {
    #[error("list frames in {path:?}: {source}")]
    List {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("staging dir {path:?}: {source}")]
    Staging {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("rename target {path:?} already exists")]
    TargetOccupied { path: PathBuf },
    #[error("rename {from:?} -> {to:?}: {source}")]
    Rename {
        from: PathBuf,
        to: PathBuf,
        source: std::io::Error,
    },
}

fn index_name(index: usize) -> String {
    format!("{index}.{FRAME_EXTENSION}")
}

/// Rename without ever replacing an existing entry.
fn rename(from: PathBuf, to: PathBuf) -> Result<(), SequenceError> {
    if fs::symlink_metadata(&to).is_ok() {
        return Err(SequenceError::TargetOccupied { path: to });
    }
    fs::rename(&from, &to).map_err(|source| SequenceError::Rename { from, to, source })
}

/// Collect stored frames in `dir`, sorted by numeric key (ties by name).
fn collect_frames(dir: &Path) -> Result<Vec<(FrameKey, String)>, SequenceError> {
    let list_err = |source| SequenceError::List {
        path: dir.to_path_buf(),
        source,
    };
    let mut frames = Vec::new();
    for entry in fs::read_dir(dir).map_err(list_err)? {
        let entry = entry.map_err(list_err)?;
        let is_file = entry.file_type().map(|t| t.is_file()).unwrap_or(false);
        let name = entry.file_name();
        let key = name
            .to_str()
            .filter(|_| is_file)
            .and_then(FrameKey::from_file_name);
        match key {
            Some(key) => frames.push((key, name.to_string_lossy().into_owned())),
            None => {
                tracing::warn!(
                    dir = %dir.display(),
                    entry = %name.to_string_lossy(),
                    "skipping non-frame entry while sequencing"
                );
            }
        }
    }
    frames.sort();
    Ok(frames)
}

/// Rename every stored frame in `dir` to its zero-based position in key order.
///
/// Frames move into a fresh staging directory first, so a target name that is
/// still occupied by an unprocessed frame is never overwritten. Returns the
/// number of sequenced frames; an empty directory yields `0`.
pub fn sort_frame_files(dir: &Path) -> Result<usize, SequenceError> {
    let frames = collect_frames(dir)?;
    if frames.is_empty() {
        return Ok(0);
    }

    let staging = dir.join(STAGING_DIR);
    fs::create_dir(&staging).map_err(|source| match source.kind() {
        std::io::ErrorKind::AlreadyExists => SequenceError::TargetOccupied {
            path: staging.clone(),
        },
        _ => SequenceError::Staging {
            path: staging.clone(),
            source,
        },
    })?;
    for (index, (_, name)) in frames.iter().enumerate() {
        rename(dir.join(name), staging.join(index_name(index)))?;
    }
    for index in 0..frames.len() {
        rename(staging.join(index_name(index)), dir.join(index_name(index)))?;
    }
    fs::remove_dir(&staging).map_err(|source| SequenceError::Staging {
        path: staging.clone(),
        source,
    })?;

    tracing::debug!(dir = %dir.display(), frames = frames.len(), "frames sequenced");
    Ok(frames.len())
}

//! Frame receiver: decodes one capture message and writes it to storage.

use std::path::PathBuf;

use base64::{Engine as _, engine::general_purpose};
use frame_capture_types::{CaptureMessage, FrameKey, MessageError, parse_capture_message};
use thiserror::Error;

use crate::session_dir::SessionDir;

#[derive(Debug, Error)]
pub enum FrameStoreError {
    #[error(transparent)]
    Message(#[from] MessageError),
    #[error("message is the end-of-session signal, not a frame")]
    NotAFrame,
    #[error("frame {key} has an empty payload")]
    EmptyPayload { key: FrameKey },
    #[error("frame {key} payload is not valid base64: {source}")]
    Decode {
        key: FrameKey,
        source: base64::DecodeError,
    },
    #[error("write frame {path:?}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Result of a successful frame write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFrame {
    pub key: FrameKey,
    pub path: PathBuf,
    pub bytes: usize,
}

/// Decode `message` and write it to `<session_dir>/<key>.png`.
///
/// A later frame with the same key overwrites the earlier file.
pub async fn store_frame(message: &str, dir: &SessionDir) -> Result<StoredFrame, FrameStoreError> {
    let (key, payload) = match parse_capture_message(message)? {
        CaptureMessage::Frame { key, payload } => (key, payload),
        CaptureMessage::Done => return Err(FrameStoreError::NotAFrame),
    };
    let payload = payload.trim_end();
    if payload.is_empty() {
        return Err(FrameStoreError::EmptyPayload { key });
    }
    let data = general_purpose::STANDARD
        .decode(payload)
        .map_err(|source| FrameStoreError::Decode { key, source })?;

    let path = dir.frame_path(key);
    tokio::fs::write(&path, &data)
        .await
        .map_err(|source| FrameStoreError::Write {
            path: path.clone(),
            source,
        })?;
    Ok(StoredFrame {
        key,
        path,
        bytes: data.len(),
    })
}

//! Wire vocabulary shared by the capture server and its clients.
//!
//! Inbound capture messages are plain text: `<key><marker><base64>` for a
//! frame, or the reserved `done` literal to end the session.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Data-URL prefix separating the ordering key from the PNG payload.
pub const PNG_DATA_URL_MARKER: &str = "data:image/png;base64,";

/// Reserved message that ends a capture session without closing the socket.
pub const DONE_MESSAGE: &str = "done";

/// File extension used for stored and sequenced frames.
pub const FRAME_EXTENSION: &str = "png";

/// Errors raised while interpreting an inbound capture message.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MessageError {
    /// The message does not contain the PNG data-URL marker.
    #[error("message has no PNG data-URL marker")]
    MissingMarker,
    /// The prefix before the marker is not an unsigned integer.
    #[error("invalid frame key {0:?}")]
    InvalidKey(String),
}

/// Client-supplied ordering key of a frame.
///
/// Keys are numeric and need not be contiguous. The canonical decimal form is
/// used as the stored file name, so `007` and `7` name the same frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FrameKey(pub u64);

impl FrameKey {
    /// Parse a key from the text preceding the marker.
    pub fn parse(raw: &str) -> Result<Self, MessageError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
            return Err(MessageError::InvalidKey(raw.to_string()));
        }
        trimmed
            .parse::<u64>()
            .map(FrameKey)
            .map_err(|_| MessageError::InvalidKey(raw.to_string()))
    }

    /// Stored file name for this key (`<key>.png`).
    pub fn file_name(&self) -> String {
        format!("{}.{FRAME_EXTENSION}", self.0)
    }

    /// Recover a key from a stored file name; `None` for anything else.
    pub fn from_file_name(name: &str) -> Option<Self> {
        let stem = name.strip_suffix(FRAME_EXTENSION)?.strip_suffix('.')?;
        if stem.is_empty() || !stem.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        stem.parse::<u64>().ok().map(FrameKey)
    }
}

impl fmt::Display for FrameKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A parsed inbound capture message borrowing from the raw text.
#[derive(Debug, PartialEq, Eq)]
pub enum CaptureMessage<'a> {
    /// One frame: ordering key plus still-encoded base64 payload.
    Frame { key: FrameKey, payload: &'a str },
    /// Explicit end-of-session signal.
    Done,
}

/// `true` when `text` is the reserved end-of-session literal.
pub fn is_done_message(text: &str) -> bool {
    text.trim() == DONE_MESSAGE
}

/// Split an inbound message on the first marker occurrence.
pub fn parse_capture_message(text: &str) -> Result<CaptureMessage<'_>, MessageError> {
    if is_done_message(text) {
        return Ok(CaptureMessage::Done);
    }
    let (raw_key, payload) = text
        .split_once(PNG_DATA_URL_MARKER)
        .ok_or(MessageError::MissingMarker)?;
    let key = FrameKey::parse(raw_key)?;
    Ok(CaptureMessage::Frame { key, payload })
}

/// Lifecycle phase of a capture session as reported over HTTP.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    /// Accepting frames.
    Receiving,
    /// Input ended; sequencing and encoding in progress.
    Assembling,
    /// Video produced and intermediates removed.
    Completed,
    /// Assembly failed; intermediates removed, no video guaranteed.
    Failed,
}

impl SessionPhase {
    /// `true` once the session no longer changes.
    pub fn is_finished(&self) -> bool {
        matches!(self, SessionPhase::Completed | SessionPhase::Failed)
    }
}

/// Snapshot of one capture session.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct SessionSummary {
    /// Session id (also the video file stem).
    pub id: String,
    /// Current phase.
    pub phase: SessionPhase,
    /// Frames written to storage.
    pub frames_stored: u64,
    /// Frames rejected (bad key, missing marker, bad payload, write failure).
    pub frames_rejected: u64,
    /// Milliseconds since the session opened.
    pub created_age_ms: u64,
    /// Output video path once assembly succeeded.
    pub video_path: Option<String>,
    /// Failure reason when `phase` is `failed`.
    pub error: Option<String>,
}

/// Messages pushed by the server over the capture socket.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Sent once after the socket opens.
    Hello { session_id: String },
}

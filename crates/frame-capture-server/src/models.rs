//! HTTP response payloads.

use frame_capture_types::SessionSummary;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    /// Build version string.
    pub version: String,
    /// Sessions still receiving or assembling.
    pub active_sessions: usize,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct SessionsListResponse {
    pub sessions: Vec<SessionSummary>,
}

//! HTTP API handlers.
//!
//! The capture websocket plus read-only health and session inspection.

pub mod capture;
pub mod health;
pub mod sessions;

pub use capture::capture_ws;
pub use sessions::{sessions_get, sessions_list};

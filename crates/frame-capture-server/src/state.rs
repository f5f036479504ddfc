//! Shared server state.

use std::sync::Arc;

use crate::assembler::VideoAssembler;
use crate::config::CaptureConfig;
use crate::session_registry::SessionRegistry;

/// State handed to every handler and capture session.
pub struct AppState {
    /// Static settings resolved at startup.
    pub config: Arc<CaptureConfig>,
    /// Session phases and counters.
    pub sessions: SessionRegistry,
    /// Encoder used at the end of every session.
    pub assembler: Arc<dyn VideoAssembler>,
}

impl AppState {
    pub fn new(
        config: Arc<CaptureConfig>,
        sessions: SessionRegistry,
        assembler: Arc<dyn VideoAssembler>,
    ) -> Self {
        Self {
            config,
            sessions,
            assembler,
        }
    }
}

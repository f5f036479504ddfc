//! In-memory registry of capture sessions.
//!
//! Tracks per-session counters and pipeline phase for the read-only HTTP API.
//! Finished sessions are kept for inspection up to a fixed bound.

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use frame_capture_types::{SessionPhase, SessionSummary};

/// Finished sessions retained before the oldest are pruned.
pub const MAX_FINISHED_SESSIONS: usize = 256;

#[derive(Debug)]
struct SessionRecord {
    phase: SessionPhase,
    frames_stored: u64,
    frames_rejected: u64,
    created_at: Instant,
    video_path: Option<PathBuf>,
    error: Option<String>,
}

#[derive(Default)]
struct RegistryInner {
    sessions: HashMap<String, SessionRecord>,
    finished: VecDeque<String>,
}

/// Shared handle to the session registry.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    inner: Arc<Mutex<RegistryInner>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RegistryInner> {
        self.inner.lock().unwrap_or_else(|err| err.into_inner())
    }

    fn with_record(&self, id: &str, f: impl FnOnce(&mut SessionRecord)) {
        if let Some(record) = self.lock().sessions.get_mut(id) {
            f(record);
        }
    }

    /// Register a new session in the `receiving` phase.
    pub fn register(&self, id: &str) {
        self.lock().sessions.insert(
            id.to_string(),
            SessionRecord {
                phase: SessionPhase::Receiving,
                frames_stored: 0,
                frames_rejected: 0,
                created_at: Instant::now(),
                video_path: None,
                error: None,
            },
        );
    }

    pub fn record_stored(&self, id: &str) {
        self.with_record(id, |r| r.frames_stored += 1);
    }

    pub fn record_rejected(&self, id: &str) {
        self.with_record(id, |r| r.frames_rejected += 1);
    }

    pub fn mark_assembling(&self, id: &str) {
        self.with_record(id, |r| r.phase = SessionPhase::Assembling);
    }

    pub fn mark_completed(&self, id: &str, video_path: PathBuf) {
        self.finish(id, |r| {
            r.phase = SessionPhase::Completed;
            r.video_path = Some(video_path);
        });
    }

    pub fn mark_failed(&self, id: &str, reason: String) {
        self.finish(id, |r| {
            r.phase = SessionPhase::Failed;
            r.error = Some(reason);
        });
    }

    fn finish(&self, id: &str, f: impl FnOnce(&mut SessionRecord)) {
        let mut inner = self.lock();
        let Some(record) = inner.sessions.get_mut(id) else {
            return;
        };
        let was_finished = record.phase.is_finished();
        f(record);
        if was_finished {
            return;
        }
        inner.finished.push_back(id.to_string());
        while inner.finished.len() > MAX_FINISHED_SESSIONS {
            if let Some(oldest) = inner.finished.pop_front() {
                inner.sessions.remove(&oldest);
            }
        }
    }

    /// Snapshot of one session.
    pub fn get(&self, id: &str) -> Option<SessionSummary> {
        self.lock().sessions.get(id).map(|r| summarize(id, r))
    }

    /// Snapshot of all known sessions, newest first.
    pub fn list(&self) -> Vec<SessionSummary> {
        let inner = self.lock();
        let mut sessions: Vec<(Instant, SessionSummary)> = inner
            .sessions
            .iter()
            .map(|(id, r)| (r.created_at, summarize(id, r)))
            .collect();
        sessions.sort_by(|a, b| b.0.cmp(&a.0));
        sessions.into_iter().map(|(_, s)| s).collect()
    }

    /// Sessions still receiving or assembling.
    pub fn active_count(&self) -> usize {
        self.lock()
            .sessions
            .values()
            .filter(|r| !r.phase.is_finished())
            .count()
    }
}

fn summarize(id: &str, record: &SessionRecord) -> SessionSummary {
    SessionSummary {
        id: id.to_string(),
        phase: record.phase,
        frames_stored: record.frames_stored,
        frames_rejected: record.frames_rejected,
        created_age_ms: record.created_at.elapsed().as_millis() as u64,
        video_path: record
            .video_path
            .as_ref()
            .map(|p| p.to_string_lossy().into_owned()),
        error: record.error.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracks_counters_and_phase() {
        let registry = SessionRegistry::new();
        registry.register("a");
        registry.record_stored("a");
        registry.record_stored("a");
        registry.record_rejected("a");
        registry.mark_assembling("a");

        let summary = registry.get("a").unwrap();
        assert_eq!(summary.phase, SessionPhase::Assembling);
        assert_eq!(summary.frames_stored, 2);
        assert_eq!(summary.frames_rejected, 1);
        assert_eq!(registry.active_count(), 1);

        registry.mark_completed("a", PathBuf::from("/out/a.mp4"));
        let summary = registry.get("a").unwrap();
        assert_eq!(summary.phase, SessionPhase::Completed);
        assert_eq!(summary.video_path.as_deref(), Some("/out/a.mp4"));
        assert_eq!(registry.active_count(), 0);
    }

    #[test]
    fn unknown_ids_are_ignored() {
        let registry = SessionRegistry::new();
        registry.record_stored("missing");
        registry.mark_failed("missing", "boom".to_string());
        assert!(registry.get("missing").is_none());
        assert!(registry.list().is_empty());
    }

    #[test]
    fn finished_sessions_are_pruned_oldest_first() {
        let registry = SessionRegistry::new();
        for i in 0..=MAX_FINISHED_SESSIONS {
            let id = format!("s{i}");
            registry.register(&id);
            registry.mark_failed(&id, "no frames".to_string());
        }
        registry.register("live");

        assert!(registry.get("s0").is_none());
        assert!(registry.get("s1").is_some());
        assert!(registry.get("live").is_some());
        assert_eq!(registry.list().len(), MAX_FINISHED_SESSIONS + 1);
    }

    #[test]
    fn finishing_twice_counts_once() {
        let registry = SessionRegistry::new();
        registry.register("a");
        registry.mark_failed("a", "first".to_string());
        registry.mark_failed("a", "second".to_string());
        assert_eq!(registry.lock().finished.len(), 1);
        assert_eq!(registry.get("a").unwrap().error.as_deref(), Some("second"));
    }
}

//! Capture session lifecycle.
//!
//! Every connection gets a [`CaptureSession`] state machine on the socket side
//! and one worker task that applies its commands strictly in order: frame
//! writes first, then the end-of-session pipeline exactly once.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::assembler::VideoAssembler;
use crate::frame_store::store_frame;
use crate::pipeline::finalize_session;
use crate::session_dir::SessionDir;
use crate::session_registry::SessionRegistry;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Receiving,
    Done,
}

/// Socket-side view of a session: `Receiving -> Done`, once.
#[derive(Debug)]
pub struct CaptureSession {
    id: String,
    state: SessionState,
}

impl CaptureSession {
    pub fn new(id: String) -> Self {
        Self {
            id,
            state: SessionState::Receiving,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_receiving(&self) -> bool {
        self.state == SessionState::Receiving
    }

    /// Move to `Done`. Returns `true` only for the first call.
    pub fn terminate(&mut self) -> bool {
        match self.state {
            SessionState::Receiving => {
                self.state = SessionState::Done;
                true
            }
            SessionState::Done => false,
        }
    }
}

/// Work queued for a session worker.
#[derive(Debug)]
pub enum SessionCommand {
    /// Raw inbound frame message.
    Frame(String),
    /// Input ended; run the pipeline.
    Finish,
}

/// Sender half of a session's task queue.
#[derive(Clone)]
pub struct SessionHandle {
    tx: mpsc::UnboundedSender<SessionCommand>,
}

impl SessionHandle {
    /// Queue a frame; `false` once the worker stopped accepting input.
    pub fn push_frame(&self, message: String) -> bool {
        self.tx.send(SessionCommand::Frame(message)).is_ok()
    }

    /// Queue the end-of-session signal.
    pub fn finish(&self) -> bool {
        self.tx.send(SessionCommand::Finish).is_ok()
    }
}

/// Everything a session worker needs besides its id.
#[derive(Clone)]
pub struct SessionContext {
    pub output_dir: PathBuf,
    pub registry: SessionRegistry,
    pub assembler: Arc<dyn VideoAssembler>,
}

/// Register `session_id` and spawn its worker on the current runtime.
pub fn spawn_session_worker(
    session_id: String,
    ctx: SessionContext,
) -> (SessionHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::unbounded_channel();
    ctx.registry.register(&session_id);
    let task = actix_web::rt::spawn(run_session(session_id, ctx, rx));
    (SessionHandle { tx }, task)
}

async fn run_session(
    session_id: String,
    ctx: SessionContext,
    mut rx: mpsc::UnboundedReceiver<SessionCommand>,
) {
    let dir = match SessionDir::create(&ctx.output_dir, &session_id).await {
        Ok(dir) => dir,
        Err(err) => {
            tracing::error!(
                session_id = %session_id,
                output_dir = %ctx.output_dir.display(),
                error = %err,
                "failed to create session directory"
            );
            ctx.registry
                .mark_failed(&session_id, format!("create session directory: {err}"));
            return;
        }
    };
    tracing::info!(session_id = %session_id, dir = %dir.path().display(), "capture session started");

    // A closed channel without `Finish` still ends the session.
    while let Some(cmd) = rx.recv().await {
        match cmd {
            SessionCommand::Frame(message) => match store_frame(&message, &dir).await {
                Ok(frame) => {
                    tracing::debug!(
                        session_id = %session_id,
                        key = %frame.key,
                        bytes = frame.bytes,
                        "frame stored"
                    );
                    ctx.registry.record_stored(&session_id);
                }
                Err(err) => {
                    tracing::warn!(session_id = %session_id, error = %err, "frame rejected");
                    ctx.registry.record_rejected(&session_id);
                }
            },
            SessionCommand::Finish => break,
        }
    }
    rx.close();

    ctx.registry.mark_assembling(&session_id);
    match finalize_session(&dir, ctx.assembler.as_ref()).await {
        Ok(video) => {
            tracing::info!(
                session_id = %session_id,
                frames = video.frames,
                video = %video.path.display(),
                "capture session completed"
            );
            ctx.registry.mark_completed(&session_id, video.path);
        }
        Err(err) => {
            tracing::error!(session_id = %session_id, error = %err, "capture session failed");
            ctx.registry.mark_failed(&session_id, err.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame_store::fixtures::frame_message;
    use crate::pipeline::fakes::RecordingAssembler;
    use crate::session_dir::test_support::scratch_root;
    use frame_capture_types::SessionPhase;

    fn context(tag: &str, assembler: Arc<RecordingAssembler>) -> SessionContext {
        SessionContext {
            output_dir: scratch_root(tag),
            registry: SessionRegistry::new(),
            assembler,
        }
    }

    #[test]
    fn terminate_fires_once() {
        let mut session = CaptureSession::new("s".to_string());
        assert!(session.is_receiving());
        assert!(session.terminate());
        assert_eq!(session.state(), SessionState::Done);
        assert!(!session.terminate());
        assert_eq!(session.state(), SessionState::Done);
    }

    #[actix_web::test]
    async fn out_of_order_frames_are_sequenced_and_cleaned_up() {
        let assembler = Arc::new(RecordingAssembler::default());
        let ctx = context("session-scenario", assembler.clone());
        let root = ctx.output_dir.clone();
        let registry = ctx.registry.clone();

        let (handle, task) = spawn_session_worker("sess".to_string(), ctx);
        assert!(handle.push_frame(frame_message("5", b"five")));
        assert!(handle.push_frame(frame_message("3", b"three")));
        assert!(handle.push_frame(frame_message("8", b"eight")));
        assert!(handle.finish());
        task.await.unwrap();

        let calls = assembler.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].frames_dir, root.join("sess"));
        assert_eq!(
            calls[0].frames,
            vec![b"three".to_vec(), b"five".to_vec(), b"eight".to_vec()]
        );
        assert!(!root.join("sess").exists());
        assert!(root.join("sess.mp4").exists());

        let summary = registry.get("sess").unwrap();
        assert_eq!(summary.phase, SessionPhase::Completed);
        assert_eq!(summary.frames_stored, 3);
        let _ = std::fs::remove_dir_all(&root);
    }

    #[actix_web::test]
    async fn second_finish_does_not_rerun_pipeline() {
        let assembler = Arc::new(RecordingAssembler::default());
        let ctx = context("session-double-finish", assembler.clone());
        let root = ctx.output_dir.clone();

        let (handle, task) = spawn_session_worker("twice".to_string(), ctx);
        handle.push_frame(frame_message("1", b"x"));
        handle.finish();
        handle.finish();
        handle.push_frame(frame_message("2", b"late"));
        task.await.unwrap();

        assert_eq!(assembler.calls().len(), 1);
        assert_eq!(assembler.calls()[0].frames, vec![b"x".to_vec()]);
        assert!(!handle.finish());
        assert!(!handle.push_frame(frame_message("3", b"later")));
        let _ = std::fs::remove_dir_all(&root);
    }

    #[actix_web::test]
    async fn dropped_handle_ends_session() {
        let assembler = Arc::new(RecordingAssembler::default());
        let ctx = context("session-dropped", assembler.clone());
        let root = ctx.output_dir.clone();

        let (handle, task) = spawn_session_worker("gone".to_string(), ctx);
        handle.push_frame(frame_message("4", b"only"));
        drop(handle);
        task.await.unwrap();

        assert_eq!(assembler.calls().len(), 1);
        assert!(!root.join("gone").exists());
        let _ = std::fs::remove_dir_all(&root);
    }

    #[actix_web::test]
    async fn empty_session_fails_and_leaves_no_video() {
        let assembler = Arc::new(RecordingAssembler::default());
        let ctx = context("session-empty", assembler.clone());
        let root = ctx.output_dir.clone();
        let registry = ctx.registry.clone();

        let (handle, task) = spawn_session_worker("empty".to_string(), ctx);
        handle.push_frame("garbage".to_string());
        handle.finish();
        task.await.unwrap();

        let summary = registry.get("empty").unwrap();
        assert_eq!(summary.phase, SessionPhase::Failed);
        assert_eq!(summary.frames_rejected, 1);
        assert!(summary.error.is_some());
        assert!(!root.join("empty").exists());
        assert!(!root.join("empty.mp4").exists());
        let _ = std::fs::remove_dir_all(&root);
    }
}

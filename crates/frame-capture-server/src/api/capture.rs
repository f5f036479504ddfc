//! Capture websocket: one connection is one capture session.

use actix::prelude::*;
use actix_http::ws::Item;
use actix_web::http::header::{HeaderName, HeaderValue};
use actix_web::web::Bytes;
use actix_web::{Error, HttpRequest, HttpResponse, get, web};
use actix_web_actors::ws;
use frame_capture_types::{ServerMessage, is_done_message};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::session::{CaptureSession, SessionContext, SessionHandle, spawn_session_worker};
use crate::state::AppState;

/// Response header carrying the id of the session a websocket upgrade opened.
pub const CAPTURE_SESSION_HEADER: &str = "x-capture-session";

/// Reassembly state for fragmented websocket messages.
#[derive(Debug, Default)]
enum Fragments {
    #[default]
    Idle,
    Buffering(Vec<u8>),
    /// Oversized message already rejected; swallow chunks until `Last`.
    Discarding,
}

pub struct CaptureWs {
    session: CaptureSession,
    handle: Option<SessionHandle>,
    state: web::Data<AppState>,
    fragments: Fragments,
}

impl CaptureWs {
    pub fn new(session_id: String, state: web::Data<AppState>) -> Self {
        Self {
            session: CaptureSession::new(session_id),
            handle: None,
            state,
            fragments: Fragments::Idle,
        }
    }

    /// Register the session and spawn the worker that owns its frames.
    fn start_worker(&mut self) -> JoinHandle<()> {
        let session_ctx = SessionContext {
            output_dir: self.state.config.output_dir.clone(),
            registry: self.state.sessions.clone(),
            assembler: self.state.assembler.clone(),
        };
        let (handle, task) = spawn_session_worker(self.session.id().to_string(), session_ctx);
        self.handle = Some(handle);
        task
    }

    /// Idempotent end of input; only the first trigger reaches the worker.
    fn terminate(&mut self, trigger: &'static str) {
        if !self.session.terminate() {
            return;
        }
        tracing::info!(session_id = %self.session.id(), trigger, "capture input ended");
        if let Some(handle) = self.handle.as_ref() {
            handle.finish();
        }
    }

    fn reject(&self, reason: &'static str) {
        tracing::warn!(session_id = %self.session.id(), reason, "message rejected");
        self.state.sessions.record_rejected(self.session.id());
    }

    fn handle_text(&mut self, text: &str) {
        if !self.session.is_receiving() {
            tracing::debug!(session_id = %self.session.id(), "dropping message after end of input");
            return;
        }
        if is_done_message(text) {
            self.terminate("done message");
            return;
        }
        let queued = self
            .handle
            .as_ref()
            .is_some_and(|h| h.push_frame(text.to_string()));
        if !queued {
            self.reject("session worker unavailable");
        }
    }

    fn handle_bytes(&mut self, bytes: &[u8]) {
        match std::str::from_utf8(bytes) {
            Ok(text) => self.handle_text(text),
            Err(_) => self.reject("binary message is not utf-8"),
        }
    }

    fn handle_continuation(&mut self, item: Item) {
        match item {
            Item::FirstText(data) | Item::FirstBinary(data) => {
                self.fragments = Fragments::Buffering(Vec::new());
                self.append_fragment(data, false);
            }
            Item::Continue(data) => self.append_fragment(data, false),
            Item::Last(data) => self.append_fragment(data, true),
        }
    }

    /// Each fragmented message is delivered or rejected exactly once.
    fn append_fragment(&mut self, chunk: Bytes, last: bool) {
        let limit = self.state.config.max_frame_bytes;
        match std::mem::take(&mut self.fragments) {
            Fragments::Idle => {
                self.reject("continuation without a first fragment");
                if !last {
                    self.fragments = Fragments::Discarding;
                }
            }
            Fragments::Discarding => {
                if !last {
                    self.fragments = Fragments::Discarding;
                }
            }
            Fragments::Buffering(mut buf) => {
                if buf.len() + chunk.len() > limit {
                    self.reject("fragmented message exceeds max_frame_bytes");
                    if !last {
                        self.fragments = Fragments::Discarding;
                    }
                } else if last {
                    buf.extend_from_slice(&chunk);
                    self.handle_bytes(&buf);
                } else {
                    buf.extend_from_slice(&chunk);
                    self.fragments = Fragments::Buffering(buf);
                }
            }
        }
    }
}

impl Actor for CaptureWs {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        let _task = self.start_worker();
        let hello = ServerMessage::Hello {
            session_id: self.session.id().to_string(),
        };
        if let Ok(text) = serde_json::to_string(&hello) {
            ctx.text(text);
        }
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        self.terminate("connection closed");
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for CaptureWs {
    fn handle(&mut self, item: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        let msg = match item {
            Ok(msg) => msg,
            Err(err) => {
                tracing::warn!(session_id = %self.session.id(), error = %err, "websocket protocol error");
                self.terminate("protocol error");
                ctx.stop();
                return;
            }
        };
        match msg {
            ws::Message::Text(text) => self.handle_text(&text),
            ws::Message::Binary(bytes) => self.handle_bytes(&bytes),
            ws::Message::Continuation(item) => self.handle_continuation(item),
            ws::Message::Ping(bytes) => ctx.pong(&bytes),
            ws::Message::Pong(_) => {}
            ws::Message::Close(reason) => {
                self.terminate("connection closed");
                ctx.close(reason);
                ctx.stop();
            }
            ws::Message::Nop => {}
        }
    }

    fn finished(&mut self, ctx: &mut Self::Context) {
        self.terminate("stream finished");
        ctx.stop();
    }
}

#[get("/capture/ws")]
pub async fn capture_ws(
    req: HttpRequest,
    stream: web::Payload,
    state: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let session_id = Uuid::new_v4().to_string();
    let header_value =
        HeaderValue::from_str(&session_id).map_err(actix_web::error::ErrorInternalServerError)?;
    let frame_size = state.config.max_frame_bytes;
    let mut resp = ws::WsResponseBuilder::new(CaptureWs::new(session_id, state), &req, stream)
        .frame_size(frame_size)
        .start()?;
    resp.headers_mut()
        .insert(HeaderName::from_static(CAPTURE_SESSION_HEADER), header_value);
    Ok(resp)
}

#[cfg(test)]
mod tests {
    use actix_web::http::{StatusCode, header};
    use actix_web::{App, test};
    use frame_capture_types::SessionPhase;

    use super::*;
    use crate::config::DEFAULT_MAX_FRAME_BYTES;
    use crate::frame_store::fixtures::frame_message;
    use crate::state::test_support::{make_recording_state, make_state};

    fn upgrade_request() -> test::TestRequest {
        test::TestRequest::get()
            .uri("/capture/ws")
            .insert_header((header::UPGRADE, "websocket"))
            .insert_header((header::CONNECTION, "upgrade"))
            .insert_header((header::SEC_WEBSOCKET_VERSION, "13"))
            .insert_header((header::SEC_WEBSOCKET_KEY, "dGhlIHNhbXBsZSBub25jZQ=="))
    }

    #[actix_web::test]
    async fn upgrade_request_switches_protocols() {
        let (state, root) = make_state("capture-upgrade");
        let app = test::init_service(App::new().app_data(state.clone()).service(capture_ws)).await;

        let resp = test::call_service(&app, upgrade_request().to_request()).await;
        assert_eq!(resp.status(), StatusCode::SWITCHING_PROTOCOLS);
        let session_id = resp
            .headers()
            .get(CAPTURE_SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap();
        assert!(Uuid::parse_str(session_id).is_ok());
        let _ = std::fs::remove_dir_all(&root);
    }

    #[actix_web::test]
    async fn plain_get_is_rejected() {
        let (state, root) = make_state("capture-plain");
        let app = test::init_service(App::new().app_data(state.clone()).service(capture_ws)).await;

        let req = test::TestRequest::get().uri("/capture/ws").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let _ = std::fs::remove_dir_all(&root);
    }

    #[actix_web::test]
    async fn done_then_close_assembles_once_and_drops_late_frames() {
        let (state, assembler, root) =
            make_recording_state("capture-done-close", DEFAULT_MAX_FRAME_BYTES);
        let mut socket = CaptureWs::new("done-close".to_string(), state.clone());
        let task = socket.start_worker();

        socket.handle_text(&frame_message("2", b"two"));
        socket.handle_text(&frame_message("1", b"one"));
        socket.handle_text("done");
        socket.handle_text(&frame_message("3", b"late"));
        socket.terminate("connection closed");
        socket.terminate("stream finished");
        task.await.unwrap();

        let calls = assembler.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].frames, vec![b"one".to_vec(), b"two".to_vec()]);
        let summary = state.sessions.get("done-close").unwrap();
        assert_eq!(summary.phase, SessionPhase::Completed);
        assert_eq!(summary.frames_stored, 2);
        assert_eq!(summary.frames_rejected, 0);
        let _ = std::fs::remove_dir_all(&root);
    }

    #[actix_web::test]
    async fn binary_messages_follow_text_rules() {
        let (state, assembler, root) =
            make_recording_state("capture-binary", DEFAULT_MAX_FRAME_BYTES);
        let mut socket = CaptureWs::new("binary".to_string(), state.clone());
        let task = socket.start_worker();

        socket.handle_bytes(frame_message("0", b"zero").as_bytes());
        socket.handle_bytes(&[0xff, 0xfe, 0x00]);
        socket.handle_bytes(b"done");
        task.await.unwrap();

        let calls = assembler.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].frames, vec![b"zero".to_vec()]);
        let summary = state.sessions.get("binary").unwrap();
        assert_eq!(summary.frames_stored, 1);
        assert_eq!(summary.frames_rejected, 1);
        let _ = std::fs::remove_dir_all(&root);
    }

    #[actix_web::test]
    async fn continuation_frames_are_reassembled() {
        let (state, assembler, root) =
            make_recording_state("capture-continuation", DEFAULT_MAX_FRAME_BYTES);
        let mut socket = CaptureWs::new("fragments".to_string(), state.clone());
        let task = socket.start_worker();

        let message = frame_message("9", b"nine");
        let (head, tail) = message.split_at(4);
        let (middle, last) = tail.split_at(tail.len() / 2);
        socket.handle_continuation(Item::FirstText(Bytes::copy_from_slice(head.as_bytes())));
        socket.handle_continuation(Item::Continue(Bytes::copy_from_slice(middle.as_bytes())));
        socket.handle_continuation(Item::Last(Bytes::copy_from_slice(last.as_bytes())));
        socket.handle_text("done");
        task.await.unwrap();

        assert_eq!(assembler.calls()[0].frames, vec![b"nine".to_vec()]);
        assert_eq!(state.sessions.get("fragments").unwrap().frames_stored, 1);
        let _ = std::fs::remove_dir_all(&root);
    }

    #[actix_web::test]
    async fn oversized_fragmented_message_is_rejected_once() {
        let (state, _assembler, root) = make_recording_state("capture-oversize", 8);
        let mut socket = CaptureWs::new("oversize".to_string(), state.clone());
        let task = socket.start_worker();

        socket.handle_continuation(Item::FirstText(Bytes::from_static(b"12345")));
        socket.handle_continuation(Item::Continue(Bytes::from_static(b"67890")));
        socket.handle_continuation(Item::Continue(Bytes::from_static(b"abc")));
        socket.handle_continuation(Item::Last(Bytes::from_static(b"def")));
        assert_eq!(state.sessions.get("oversize").unwrap().frames_rejected, 1);

        // The next fragmented message starts clean.
        socket.handle_continuation(Item::FirstText(Bytes::from_static(b"do")));
        socket.handle_continuation(Item::Last(Bytes::from_static(b"ne")));
        task.await.unwrap();

        let summary = state.sessions.get("oversize").unwrap();
        assert_eq!(summary.frames_rejected, 1);
        assert_eq!(summary.phase, SessionPhase::Failed);
        let _ = std::fs::remove_dir_all(&root);
    }

    #[actix_web::test]
    async fn stray_continuation_is_rejected_once() {
        let (state, _assembler, root) =
            make_recording_state("capture-stray", DEFAULT_MAX_FRAME_BYTES);
        let mut socket = CaptureWs::new("stray".to_string(), state.clone());
        let task = socket.start_worker();

        socket.handle_continuation(Item::Continue(Bytes::from_static(b"abc")));
        socket.handle_continuation(Item::Continue(Bytes::from_static(b"def")));
        socket.handle_continuation(Item::Last(Bytes::from_static(b"ghi")));
        assert_eq!(state.sessions.get("stray").unwrap().frames_rejected, 1);
        socket.terminate("connection closed");
        task.await.unwrap();
        let _ = std::fs::remove_dir_all(&root);
    }
}

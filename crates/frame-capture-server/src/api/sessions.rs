//! Read-only session inspection handlers.

use actix_web::{HttpResponse, Responder, get, web};

use crate::models::SessionsListResponse;
use crate::state::AppState;

/// List capture sessions, newest first.
#[utoipa::path(
    get,
    path = "/sessions",
    responses(
        (status = 200, description = "Known capture sessions, newest first", body = SessionsListResponse)
    )
)]
#[get("/sessions")]
pub async fn sessions_list(state: web::Data<AppState>) -> impl Responder {
    HttpResponse::Ok().json(SessionsListResponse {
        sessions: state.sessions.list(),
    })
}

/// Fetch one capture session.
#[utoipa::path(
    get,
    path = "/sessions/{id}",
    params(
        ("id" = String, Path, description = "Session id")
    ),
    responses(
        (status = 200, description = "Session summary", body = frame_capture_types::SessionSummary),
        (status = 404, description = "Unknown session")
    )
)]
#[get("/sessions/{id}")]
pub async fn sessions_get(state: web::Data<AppState>, id: web::Path<String>) -> impl Responder {
    match state.sessions.get(&id) {
        Some(summary) => HttpResponse::Ok().json(summary),
        None => HttpResponse::NotFound().body("session not found"),
    }
}

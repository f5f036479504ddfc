use actix_web::{HttpResponse, Responder, get, web};

use crate::models::HealthResponse;
use crate::state::AppState;

/// Liveness check with a count of in-flight sessions.
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Capture server is healthy", body = HealthResponse)
    )
)]
#[get("/health")]
pub async fn health(state: web::Data<AppState>) -> impl Responder {
    HttpResponse::Ok().json(HealthResponse {
        status: "ok".to_string(),
        version: crate::VERSION.to_string(),
        active_sessions: state.sessions.active_count(),
    })
}

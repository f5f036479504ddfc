use utoipa::OpenApi;

use crate::api;
use crate::models;

#[derive(OpenApi)]
#[openapi(
    paths(
        api::health::health,
        api::sessions::sessions_list,
        api::sessions::sessions_get,
    ),
    components(
        schemas(
            models::HealthResponse,
            models::SessionsListResponse,
            frame_capture_types::SessionSummary,
            frame_capture_types::SessionPhase,
        )
    ),
    tags(
        (name = "frame-capture-server", description = "Frame capture and video assembly")
    )
)]
pub struct ApiDoc;

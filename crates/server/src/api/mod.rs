//! # HTTP API
//!
//! Router assembly, OpenAPI document and liveness endpoint.

pub mod projects;

use axum::{response::IntoResponse, routing::get, Json, Router};
use serde::Serialize;
use utoipa::{OpenApi, ToSchema};

use crate::SharedState;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Clew API",
        version = "1.0.0",
        description = "Resolves mod projects and their dependencies across content catalogs"
    ),
    paths(health, projects::resolve_list),
    components(schemas(
        HealthResponse,
        projects::ProjectIdentifierDto,
        projects::ProjectRequestDto,
        projects::ResolveListRequestDto,
        projects::ResolveListResponseDto
    )),
    tags(
        (name = "projects", description = "Project resolution"),
        (name = "health", description = "Liveness")
    )
)]
pub struct ApiDoc;

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    status: String,
    catalogs: Vec<String>,
}

/// Full application router
pub fn router(state: SharedState) -> Router {
    Router::new()
        .nest("/projects", projects::project_routes())
        .route("/health", get(health))
        .route("/openapi.json", get(serve_openapi))
        .with_state(state)
}

/// Liveness check
#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses(
        (status = 200, description = "Service is up", body = HealthResponse)
    )
)]
async fn health(axum::extract::State(state): axum::extract::State<SharedState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        catalogs: state
            .service
            .registry()
            .names()
            .into_iter()
            .map(str::to_string)
            .collect(),
    })
}

async fn serve_openapi() -> impl IntoResponse {
    Json(ApiDoc::openapi())
}

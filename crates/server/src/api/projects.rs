//! # Projects API
//!
//! Resolve endpoint. Maps the wire DTOs onto the resolution model and
//! resolution errors onto HTTP statuses.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use utoipa::ToSchema;

use clew_core::models::{
    ordered_union, GlobalProjectIdentifier, ReleaseChannelFilter, ResolveListRequest,
    ResolveRequest, VersionFilters,
};
use clew_core::resolve::DownloadUrls;
use clew_core::ResolveError;

use crate::SharedState;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProjectIdentifierDto {
    pub content_source_name: String,
    pub id: String,
}

/// One requested project. Lists are in priority order.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProjectRequestDto {
    pub content_source_name: String,
    pub id: String,
    #[serde(default)]
    pub game_versions: Option<Vec<String>>,
    #[serde(default)]
    pub platforms: Option<Vec<String>>,
    /// `any`, `atLeastBeta` or `release`
    #[serde(default)]
    #[schema(value_type = Option<String>)]
    pub release_channel: Option<ReleaseChannelFilter>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResolveListRequestDto {
    pub projects: Vec<ProjectRequestDto>,
    #[serde(default)]
    pub default_game_versions: Vec<String>,
    #[serde(default)]
    pub default_platforms: Vec<String>,
    #[serde(default)]
    #[schema(value_type = Option<String>)]
    pub default_release_channel: Option<ReleaseChannelFilter>,
    #[serde(default)]
    pub excluded_projects: Vec<ProjectIdentifierDto>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResolveListResponseDto {
    pub initial_projects_download_urls: Vec<String>,
    pub dependencies_download_urls: Vec<String>,
}

impl From<DownloadUrls> for ResolveListResponseDto {
    fn from(urls: DownloadUrls) -> Self {
        Self {
            initial_projects_download_urls: urls.initial,
            dependencies_download_urls: urls.dependencies,
        }
    }
}

impl ResolveListRequestDto {
    /// Item lists come first, then the defaults; the channel falls back to
    /// the default channel, then `any`.
    pub fn into_list(self) -> ResolveListRequest {
        let default_channel = self.default_release_channel.unwrap_or_default();
        let defaults = VersionFilters {
            game_versions: Some(self.default_game_versions),
            platforms: Some(self.default_platforms),
            release_channel: Some(default_channel),
        };

        let requests: Vec<ResolveRequest> = self
            .projects
            .into_iter()
            .map(|project| {
                let filters = VersionFilters {
                    game_versions: Some(ordered_union(
                        project.game_versions.as_deref(),
                        defaults.game_versions.as_deref(),
                    )),
                    platforms: Some(ordered_union(
                        project.platforms.as_deref(),
                        defaults.platforms.as_deref(),
                    )),
                    release_channel: Some(project.release_channel.unwrap_or(default_channel)),
                };
                ResolveRequest::initial(
                    GlobalProjectIdentifier::new(project.content_source_name, project.id),
                    filters,
                )
            })
            .collect();

        let excluded = self
            .excluded_projects
            .into_iter()
            .map(|project| GlobalProjectIdentifier::new(project.content_source_name, project.id));

        ResolveListRequest::new(defaults, requests, excluded)
    }
}

/// Resolution failure rendered as an HTTP response
#[derive(Debug)]
pub struct ApiError(pub ResolveError);

impl From<ResolveError> for ApiError {
    fn from(error: ResolveError) -> Self {
        Self(error)
    }
}

pub fn status_for(error: &ResolveError) -> StatusCode {
    match error {
        ResolveError::ProjectNotFound(_)
        | ResolveError::UnknownCatalog(_)
        | ResolveError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
        ResolveError::ProjectVersionNotFound(_) => StatusCode::NOT_FOUND,
        ResolveError::Cancelled => StatusCode::REQUEST_TIMEOUT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        if status.is_server_error() {
            tracing::error!(error = %self.0, "Resolve request failed");
        } else {
            tracing::info!(error = %self.0, %status, "Resolve request rejected");
        }
        (status, self.0.to_string()).into_response()
    }
}

pub fn project_routes() -> Router<SharedState> {
    Router::new().route("/resolve/list", post(resolve_list))
}

/// Resolve projects and their required dependencies to download URLs
#[utoipa::path(
    post,
    path = "/projects/resolve/list",
    tag = "projects",
    request_body = ResolveListRequestDto,
    responses(
        (status = 200, description = "Download URLs of every resolved artifact", body = ResolveListResponseDto),
        (status = 400, description = "Unknown project or catalog, or invalid request"),
        (status = 404, description = "No version satisfies a project's filters"),
        (status = 500, description = "Catalog failure")
    )
)]
pub async fn resolve_list(
    State(state): State<SharedState>,
    Json(request): Json<ResolveListRequestDto>,
) -> Result<Json<ResolveListResponseDto>, ApiError> {
    // dropped with the request future when the client disconnects
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();

    let urls = state
        .service
        .resolve_download_urls(request.into_list(), &cancel)
        .await?;
    Ok(Json(urls.into()))
}

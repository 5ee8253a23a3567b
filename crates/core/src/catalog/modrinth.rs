//! Modrinth catalog client.
//!
//! Supports per-project version listing and bulk project/version lookups,
//! so lists are resolved in staged waves.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::HeaderMap;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::catalog::http::{json_query, CatalogHttp, RateLimiter};
use crate::catalog::{BulkCatalog, Catalog, CatalogClient, ProjectRecord};
use crate::config::ModrinthSettings;
use crate::error::{ResolveError, Result};
use crate::models::{
    sort_newest_first, GlobalProjectIdentifier, ProjectVersion, RelatedProject,
    ResolveListRequest, ResolveOutcome, ResolveRequest,
};
use crate::naming::{NamingCategory, NamingTranslator};
use crate::resolve::selector::select;
use crate::resolve::StagedResolver;

#[derive(Debug, Deserialize)]
struct ProjectDto {
    id: String,
    slug: String,
    #[serde(default)]
    versions: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct VersionDto {
    id: String,
    project_id: String,
    version_type: String,
    #[serde(default)]
    files: Vec<FileDto>,
    #[serde(default)]
    dependencies: Vec<DependencyDto>,
    #[serde(default)]
    game_versions: Vec<String>,
    #[serde(default)]
    loaders: Vec<String>,
    date_published: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct FileDto {
    url: String,
    #[serde(default)]
    primary: bool,
}

#[derive(Debug, Deserialize)]
struct DependencyDto {
    project_id: Option<String>,
    dependency_type: String,
}

pub struct ModrinthClient {
    name: String,
    http: CatalogHttp,
    translator: Arc<NamingTranslator>,
    resolver: StagedResolver,
    max_items_per_request: usize,
    batch_threshold: usize,
}

impl ModrinthClient {
    pub fn new(
        settings: &ModrinthSettings,
        translator: Arc<NamingTranslator>,
        resolver: StagedResolver,
    ) -> Result<Self> {
        let http = CatalogHttp::new(
            &settings.name,
            &settings.base_url,
            Duration::from_secs(settings.timeout_secs),
            HeaderMap::new(),
            Some(RateLimiter::per_minute(settings.max_requests_per_minute)),
            settings.retry.clone(),
        )?;

        Ok(Self {
            name: settings.name.clone(),
            http,
            translator,
            resolver,
            max_items_per_request: settings.max_items_per_request.max(1),
            batch_threshold: settings.batch_threshold,
        })
    }

    fn versions_path(&self, request: &ResolveRequest) -> String {
        let mut query = Vec::new();
        if let Some(game_versions) = request.filters.game_versions.as_ref().filter(|v| !v.is_empty())
        {
            query.push(format!("game_versions={}", json_query(game_versions)));
        }
        if let Some(platforms) = request.filters.platforms.as_ref().filter(|p| !p.is_empty()) {
            let loaders: Vec<String> = platforms
                .iter()
                .map(|platform| {
                    self.translator
                        .to_specific(NamingCategory::Platforms, &self.name, platform)
                        .unwrap_or(platform.as_str())
                        .to_string()
                })
                .collect();
            query.push(format!("loaders={}", json_query(&loaders)));
        }

        let mut path = format!(
            "project/{}/version",
            urlencoding::encode(&request.identifier.id)
        );
        if !query.is_empty() {
            path.push('?');
            path.push_str(&query.join("&"));
        }
        path
    }

    fn to_project_version(&self, dto: VersionDto) -> Result<ProjectVersion> {
        let identifier = GlobalProjectIdentifier::new(&self.name, &dto.project_id);
        let download_url = dto
            .files
            .iter()
            .find(|file| file.primary)
            .or_else(|| dto.files.first())
            .map(|file| file.url.clone())
            .ok_or_else(|| ResolveError::MissingDownload {
                project: identifier.clone(),
                version: dto.id.clone(),
            })?;

        let platforms = dto
            .loaders
            .iter()
            .map(|loader| {
                self.translator
                    .to_common(NamingCategory::Platforms, &self.name, loader)
                    .map(str::to_string)
            })
            .collect::<Result<Vec<_>>>()?;

        let mut related_projects = Vec::new();
        for dependency in &dto.dependencies {
            // dependencies pinned to a version without a project can't be followed
            let Some(project_id) = &dependency.project_id else {
                continue;
            };
            related_projects.push(RelatedProject {
                identifier: identifier.sibling(project_id),
                kind: self.translator.parse_common(
                    NamingCategory::RelationTypes,
                    &self.name,
                    &dependency.dependency_type,
                )?,
            });
        }

        Ok(ProjectVersion {
            release_channel: self.translator.parse_common(
                NamingCategory::ReleaseChannels,
                &self.name,
                &dto.version_type,
            )?,
            identifier,
            game_versions: dto.game_versions,
            platforms,
            download_url,
            published_at: Some(dto.date_published),
            related_projects,
        })
    }
}

#[async_trait]
impl CatalogClient for ModrinthClient {
    fn name(&self) -> &str {
        &self.name
    }

    async fn resolve_one(
        &self,
        request: &ResolveRequest,
        cancel: &CancellationToken,
    ) -> Result<ResolveOutcome> {
        let path = self.versions_path(request);
        let versions: Vec<VersionDto> = match self.http.get_json(&path, cancel).await {
            Ok(Some(versions)) => versions,
            Ok(None) => return Err(ResolveError::ProjectNotFound(request.identifier.clone())),
            Err(ResolveError::Transport { message, .. }) => {
                warn!(project = %request.identifier, %message, "Version lookup failed");
                return Err(ResolveError::ProjectNotFound(request.identifier.clone()));
            }
            Err(e) => return Err(e),
        };

        let mut candidates = versions
            .into_iter()
            .map(|dto| self.to_project_version(dto))
            .collect::<Result<Vec<_>>>()?;
        sort_newest_first(&mut candidates);

        let selected = select(&candidates, &request.filters).cloned();
        Ok(ResolveOutcome::new(request.clone(), selected))
    }
}

#[async_trait]
impl BulkCatalog for ModrinthClient {
    fn max_items_per_request(&self) -> usize {
        self.max_items_per_request
    }

    fn batch_threshold(&self) -> usize {
        self.batch_threshold
    }

    async fn fetch_projects(
        &self,
        ids: &[String],
        cancel: &CancellationToken,
    ) -> Result<Vec<ProjectRecord>> {
        let path = format!("projects?ids={}", json_query(ids));
        let projects: Vec<ProjectDto> = self
            .http
            .get_json(&path, cancel)
            .await?
            .unwrap_or_default();

        Ok(projects
            .into_iter()
            .map(|project| ProjectRecord {
                id: project.id,
                slug: project.slug,
                version_ids: project.versions,
            })
            .collect())
    }

    async fn fetch_versions(
        &self,
        version_ids: &[String],
        cancel: &CancellationToken,
    ) -> Result<Vec<ProjectVersion>> {
        let path = format!("versions?ids={}", json_query(version_ids));
        let versions: Vec<VersionDto> = self
            .http
            .get_json(&path, cancel)
            .await?
            .unwrap_or_default();

        versions
            .into_iter()
            .map(|dto| self.to_project_version(dto))
            .collect()
    }
}

#[async_trait]
impl Catalog for ModrinthClient {
    async fn resolve_list(
        &self,
        list: ResolveListRequest,
        cancel: &CancellationToken,
    ) -> Result<Vec<ResolveOutcome>> {
        self.resolver.resolve(&list, self, cancel).await
    }
}

//! CurseForge catalog client.
//!
//! Only per-project file listing is available, so lists are resolved by the
//! streaming resolver. CurseForge mixes game versions and platform names in
//! one array; the array is used for both, with platform names translated
//! where a mapping exists.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::catalog::http::CatalogHttp;
use crate::catalog::{Catalog, CatalogClient};
use crate::config::CurseForgeSettings;
use crate::error::{ResolveError, Result};
use crate::models::{
    sort_newest_first, GlobalProjectIdentifier, ProjectVersion, RelatedProject,
    ResolveListRequest, ResolveOutcome, ResolveRequest,
};
use crate::naming::{NamingCategory, NamingTranslator};
use crate::resolve::selector::select;
use crate::resolve::StreamingResolver;

#[derive(Debug, Deserialize)]
struct FilesResponse {
    data: Vec<FileDto>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileDto {
    id: u64,
    mod_id: u64,
    download_url: Option<String>,
    #[serde(default)]
    game_versions: Vec<String>,
    release_type: u8,
    file_date: DateTime<Utc>,
    #[serde(default)]
    dependencies: Vec<DependencyDto>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DependencyDto {
    mod_id: u64,
    relation_type: u8,
}

pub struct CurseForgeClient {
    name: String,
    http: CatalogHttp,
    translator: Arc<NamingTranslator>,
    resolver: StreamingResolver,
}

impl CurseForgeClient {
    pub fn new(
        settings: &CurseForgeSettings,
        translator: Arc<NamingTranslator>,
        resolver: StreamingResolver,
    ) -> Result<Self> {
        let mut headers = HeaderMap::new();
        match &settings.api_key {
            Some(key) => {
                let value = HeaderValue::from_str(key)
                    .map_err(|_| ResolveError::invalid_argument("CurseForge API key is not a valid header value"))?;
                headers.insert("x-api-key", value);
            }
            None => warn!("No CurseForge API key configured, requests will be rejected"),
        }

        let http = CatalogHttp::new(
            &settings.name,
            &settings.base_url,
            Duration::from_secs(settings.timeout_secs),
            headers,
            None,
            settings.retry.clone(),
        )?;

        Ok(Self {
            name: settings.name.clone(),
            http,
            translator,
            resolver,
        })
    }

    /// `None` for files CurseForge does not allow third parties to download
    fn to_project_version(&self, dto: FileDto) -> Result<Option<ProjectVersion>> {
        let identifier = GlobalProjectIdentifier::new(&self.name, dto.mod_id.to_string());
        let Some(download_url) = dto.download_url else {
            debug!(project = %identifier, file = dto.id, "File has no download URL");
            return Ok(None);
        };

        let platforms = dto
            .game_versions
            .iter()
            .map(|name| {
                self.translator
                    .to_common(NamingCategory::Platforms, &self.name, name)
                    .unwrap_or(name.as_str())
                    .to_string()
            })
            .collect();

        let related_projects = dto
            .dependencies
            .iter()
            .map(|dependency| {
                Ok(RelatedProject {
                    identifier: identifier.sibling(dependency.mod_id.to_string()),
                    kind: self.translator.parse_common(
                        NamingCategory::RelationTypes,
                        &self.name,
                        &dependency.relation_type.to_string(),
                    )?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Some(ProjectVersion {
            release_channel: self.translator.parse_common(
                NamingCategory::ReleaseChannels,
                &self.name,
                &dto.release_type.to_string(),
            )?,
            identifier,
            game_versions: dto.game_versions,
            platforms,
            download_url,
            published_at: Some(dto.file_date),
            related_projects,
        }))
    }
}

#[async_trait]
impl CatalogClient for CurseForgeClient {
    fn name(&self) -> &str {
        &self.name
    }

    async fn resolve_one(
        &self,
        request: &ResolveRequest,
        cancel: &CancellationToken,
    ) -> Result<ResolveOutcome> {
        let path = format!("mods/{}/files", urlencoding::encode(&request.identifier.id));
        let files: FilesResponse = match self.http.get_json(&path, cancel).await {
            Ok(Some(files)) => files,
            Err(ResolveError::Cancelled) => return Err(ResolveError::Cancelled),
            Ok(None) | Err(_) => {
                warn!(project = %request.identifier, "File listing failed");
                return Err(ResolveError::ProjectNotFound(request.identifier.clone()));
            }
        };

        let mut candidates = Vec::with_capacity(files.data.len());
        for file in files.data {
            if let Some(version) = self.to_project_version(file)? {
                candidates.push(version);
            }
        }
        sort_newest_first(&mut candidates);

        let selected = select(&candidates, &request.filters).cloned();
        Ok(ResolveOutcome::new(request.clone(), selected))
    }
}

#[async_trait]
impl Catalog for CurseForgeClient {
    async fn resolve_list(
        &self,
        list: ResolveListRequest,
        cancel: &CancellationToken,
    ) -> Result<Vec<ResolveOutcome>> {
        self.resolver.resolve(&list, self, cancel).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClewConfig;
    use crate::models::{ReleaseChannel, RelationKind};
    use crate::resolve::{ResolveOptions, WorkerPolicy};

    const FILES_JSON: &str = r#"{
        "data": [
            {
                "id": 4712345,
                "modId": 238222,
                "displayName": "jei-1.20.1-forge-15.2.0.27.jar",
                "downloadUrl": "https://edge.forgecdn.net/files/4712/345/jei-1.20.1-forge-15.2.0.27.jar",
                "gameVersions": ["1.20.1", "Forge", "NeoForge"],
                "releaseType": 2,
                "fileDate": "2023-10-01T12:00:00.000Z",
                "dependencies": [
                    { "modId": 306612, "relationType": 3 },
                    { "modId": 419699, "relationType": 2 }
                ]
            },
            {
                "id": 4712346,
                "modId": 238222,
                "downloadUrl": null,
                "gameVersions": ["1.20.1", "Forge"],
                "releaseType": 1,
                "fileDate": "2023-10-02T12:00:00.000Z"
            }
        ],
        "pagination": { "index": 0, "pageSize": 50, "resultCount": 2, "totalCount": 2 }
    }"#;

    fn client() -> CurseForgeClient {
        let config = ClewConfig::default();
        let translator = Arc::new(NamingTranslator::new(&config.namings.0).unwrap());
        CurseForgeClient::new(
            &config.curseforge,
            translator,
            StreamingResolver::new(WorkerPolicy::default(), ResolveOptions::default()),
        )
        .unwrap()
    }

    #[test]
    fn test_file_maps_to_project_version() {
        let response: FilesResponse = serde_json::from_str(FILES_JSON).unwrap();
        let mut files = response.data.into_iter();
        let version = client()
            .to_project_version(files.next().unwrap())
            .unwrap()
            .unwrap();

        assert_eq!(version.identifier, GlobalProjectIdentifier::new("curseforge", "238222"));
        assert_eq!(version.release_channel, ReleaseChannel::Beta);
        assert_eq!(version.platforms, vec!["1.20.1", "forge", "neoforge"]);
        assert_eq!(version.game_versions, vec!["1.20.1", "Forge", "NeoForge"]);
        assert_eq!(version.related_projects[0].kind, RelationKind::RequiredDependency);
        assert_eq!(version.related_projects[1].kind, RelationKind::OptionalDependency);
        assert_eq!(version.file_name(), "jei-1.20.1-forge-15.2.0.27.jar");

        let undownloadable = client().to_project_version(files.next().unwrap()).unwrap();
        assert!(undownloadable.is_none());
    }

    #[test]
    fn test_unknown_release_type_fails() {
        let mut json: serde_json::Value = serde_json::from_str(FILES_JSON).unwrap();
        json["data"][0]["releaseType"] = serde_json::json!(9);
        let response: FilesResponse = serde_json::from_value(json).unwrap();

        let err = client()
            .to_project_version(response.data.into_iter().next().unwrap())
            .unwrap_err();
        assert!(matches!(err, ResolveError::TranslationNotFound { .. }));
    }

    #[test]
    fn test_invalid_api_key_rejected() {
        let mut settings = ClewConfig::default().curseforge;
        settings.api_key = Some("bad\nkey".to_string());
        let translator = Arc::new(NamingTranslator::default());
        let result = CurseForgeClient::new(
            &settings,
            translator,
            StreamingResolver::new(WorkerPolicy::default(), ResolveOptions::default()),
        );
        assert!(matches!(result, Err(ResolveError::InvalidArgument(_))));
    }
}

//! In-memory catalog used by the resolver tests

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use tokio_util::sync::CancellationToken;

use crate::catalog::{BulkCatalog, Catalog, CatalogClient, ProjectRecord};
use crate::error::{ResolveError, Result};
use crate::models::{
    sort_newest_first, GlobalProjectIdentifier, ProjectVersion, RelatedProject, RelationKind,
    ReleaseChannel, ResolveListRequest, ResolveOutcome, ResolveRequest, VersionFilters,
};
use crate::resolve::selector::select;
use crate::resolve::{ResolveOptions, StagedResolver, StreamingResolver, WorkerPolicy};

pub(crate) struct FakeCatalog {
    name: String,
    projects: Vec<ProjectRecord>,
    versions: HashMap<String, ProjectVersion>,
    stalled: HashSet<String>,
    lookups: Mutex<HashMap<String, usize>>,
    project_batches: Mutex<Vec<Vec<String>>>,
    version_batches: Mutex<Vec<usize>>,
    batch_threshold: usize,
    max_items_per_request: usize,
    staged: bool,
    options: ResolveOptions,
}

impl FakeCatalog {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            projects: Vec::new(),
            versions: HashMap::new(),
            stalled: HashSet::new(),
            lookups: Mutex::new(HashMap::new()),
            project_batches: Mutex::new(Vec::new()),
            version_batches: Mutex::new(Vec::new()),
            batch_threshold: 1,
            max_items_per_request: 100,
            staged: false,
            options: ResolveOptions::default(),
        }
    }

    /// Adds a project whose slug is `<id>-slug`
    pub fn project(self, id: &str, versions: Vec<ProjectVersion>) -> Self {
        let slug = format!("{}-slug", id);
        self.project_with_slug(id, &slug, versions)
    }

    pub fn project_with_slug(mut self, id: &str, slug: &str, versions: Vec<ProjectVersion>) -> Self {
        let mut version_ids = Vec::new();
        for (index, mut version) in versions.into_iter().enumerate() {
            version.identifier = GlobalProjectIdentifier::new(&self.name, id);
            for related in &mut version.related_projects {
                related.identifier.catalog = self.name.clone();
            }
            let version_id = format!("{}-v{}", id, index);
            self.versions.insert(version_id.clone(), version);
            version_ids.push(version_id);
        }
        self.projects.push(ProjectRecord {
            id: id.to_string(),
            slug: slug.to_string(),
            version_ids,
        });
        self
    }

    /// Lookups of `id` never complete
    pub fn stall(mut self, id: &str) -> Self {
        self.stalled.insert(id.to_string());
        self
    }

    /// Resolve lists in bulk waves from `threshold` items
    pub fn staged(mut self, threshold: usize, max_items_per_request: usize) -> Self {
        self.staged = true;
        self.batch_threshold = threshold;
        self.max_items_per_request = max_items_per_request;
        self
    }

    pub fn options(mut self, options: ResolveOptions) -> Self {
        self.options = options;
        self
    }

    pub fn lookups(&self, id: &str) -> usize {
        self.lookups.lock().unwrap().get(id).copied().unwrap_or(0)
    }

    pub fn total_lookups(&self) -> usize {
        self.lookups.lock().unwrap().values().sum()
    }

    pub fn project_batches(&self) -> Vec<Vec<String>> {
        self.project_batches.lock().unwrap().clone()
    }

    pub fn version_batches(&self) -> Vec<usize> {
        self.version_batches.lock().unwrap().clone()
    }

    pub fn request(&self, id: &str, filters: VersionFilters) -> ResolveRequest {
        ResolveRequest::initial(GlobalProjectIdentifier::new(&self.name, id), filters)
    }

    pub fn identifier(&self, id: &str) -> GlobalProjectIdentifier {
        GlobalProjectIdentifier::new(&self.name, id)
    }

    fn find(&self, id: &str) -> Option<&ProjectRecord> {
        self.projects.iter().find(|project| project.matches(id))
    }

    fn streaming(&self) -> StreamingResolver {
        StreamingResolver::new(WorkerPolicy::default(), self.options.clone())
    }
}

#[async_trait]
impl CatalogClient for FakeCatalog {
    fn name(&self) -> &str {
        &self.name
    }

    async fn resolve_one(
        &self,
        request: &ResolveRequest,
        _cancel: &CancellationToken,
    ) -> Result<ResolveOutcome> {
        let id = &request.identifier.id;
        *self.lookups.lock().unwrap().entry(id.clone()).or_default() += 1;
        if self.stalled.contains(id) {
            std::future::pending::<()>().await;
        }
        tokio::task::yield_now().await;

        let project = self
            .find(id)
            .ok_or_else(|| ResolveError::ProjectNotFound(request.identifier.clone()))?;
        let mut candidates: Vec<ProjectVersion> = project
            .version_ids
            .iter()
            .filter_map(|version_id| self.versions.get(version_id).cloned())
            .collect();
        sort_newest_first(&mut candidates);
        let selected = select(&candidates, &request.filters).cloned();
        Ok(ResolveOutcome::new(request.clone(), selected))
    }
}

#[async_trait]
impl BulkCatalog for FakeCatalog {
    fn max_items_per_request(&self) -> usize {
        self.max_items_per_request
    }

    fn batch_threshold(&self) -> usize {
        self.batch_threshold
    }

    async fn fetch_projects(
        &self,
        ids: &[String],
        _cancel: &CancellationToken,
    ) -> Result<Vec<ProjectRecord>> {
        self.project_batches.lock().unwrap().push(ids.to_vec());
        let mut found: Vec<ProjectRecord> = Vec::new();
        for id in ids {
            if let Some(project) = self.find(id) {
                if !found.iter().any(|known| known.id == project.id) {
                    found.push(project.clone());
                }
            }
        }
        Ok(found)
    }

    async fn fetch_versions(
        &self,
        version_ids: &[String],
        _cancel: &CancellationToken,
    ) -> Result<Vec<ProjectVersion>> {
        self.version_batches.lock().unwrap().push(version_ids.len());
        Ok(version_ids
            .iter()
            .filter_map(|id| self.versions.get(id).cloned())
            .collect())
    }
}

#[async_trait]
impl Catalog for FakeCatalog {
    async fn resolve_list(
        &self,
        list: ResolveListRequest,
        cancel: &CancellationToken,
    ) -> Result<Vec<ResolveOutcome>> {
        if self.staged {
            StagedResolver::new(self.streaming(), WorkerPolicy::default())
                .resolve(&list, self, cancel)
                .await
        } else {
            self.streaming().resolve(&list, self, cancel).await
        }
    }
}

/// Release for game version `1.20.1` on fabric, published `day` days into 2024
pub(crate) fn release(file: &str, day: u32, dependencies: &[&str]) -> ProjectVersion {
    ProjectVersion {
        identifier: GlobalProjectIdentifier::new("unset", "unset"),
        game_versions: vec!["1.20.1".to_string()],
        platforms: vec!["fabric".to_string()],
        release_channel: ReleaseChannel::Release,
        download_url: format!("https://cdn.example.com/files/{}", file),
        published_at: Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).single(),
        related_projects: dependencies
            .iter()
            .map(|id| RelatedProject {
                identifier: GlobalProjectIdentifier::new("unset", *id),
                kind: RelationKind::RequiredDependency,
            })
            .collect(),
    }
}

pub(crate) fn filters() -> VersionFilters {
    VersionFilters {
        game_versions: Some(vec!["1.20.1".to_string()]),
        platforms: Some(vec!["fabric".to_string()]),
        release_channel: None,
    }
}

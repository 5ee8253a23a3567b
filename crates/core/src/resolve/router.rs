//! # Catalog Router
//!
//! Splits a mixed-catalog resolve call into one call per catalog, runs them
//! concurrently and merges the results into download URLs.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use futures::future::try_join_all;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

use crate::catalog::Catalog;
use crate::error::{ResolveError, Result};
use crate::models::{ResolveListRequest, ResolveOutcome, ResolveRequest};

/// Catalogs by name, fixed after construction
#[derive(Clone, Default)]
pub struct CatalogRegistry {
    catalogs: HashMap<String, Arc<dyn Catalog>>,
}

impl CatalogRegistry {
    /// Fails if two catalogs share a name
    pub fn new(catalogs: impl IntoIterator<Item = Arc<dyn Catalog>>) -> Result<Self> {
        let mut registry = HashMap::new();
        for catalog in catalogs {
            let name = catalog.name().to_string();
            if registry.insert(name.clone(), catalog).is_some() {
                return Err(ResolveError::DuplicateCatalog(name));
            }
        }
        Ok(Self {
            catalogs: registry,
        })
    }

    pub fn get(&self, name: &str) -> Result<&Arc<dyn Catalog>> {
        self.catalogs
            .get(name)
            .ok_or_else(|| ResolveError::UnknownCatalog(name.to_string()))
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.catalogs.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl std::fmt::Debug for CatalogRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogRegistry")
            .field("catalogs", &self.names())
            .finish()
    }
}

/// Download URLs of a resolve call, split by origin
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DownloadUrls {
    pub initial: Vec<String>,
    pub dependencies: Vec<String>,
}

/// Entry point for resolving project lists across catalogs
#[derive(Debug, Clone)]
pub struct ProjectsService {
    registry: CatalogRegistry,
}

impl ProjectsService {
    pub fn new(registry: CatalogRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &CatalogRegistry {
        &self.registry
    }

    /// Resolves `list` in every catalog it names and returns one URL per
    /// distinct artifact
    pub async fn resolve_download_urls(
        &self,
        list: ResolveListRequest,
        cancel: &CancellationToken,
    ) -> Result<DownloadUrls> {
        let outcomes = self.resolve(list, cancel).await?;

        let mut urls = DownloadUrls::default();
        for outcome in outcomes {
            let Some(version) = outcome.version else {
                continue;
            };
            if outcome.request.is_initial {
                urls.initial.push(version.download_url);
            } else {
                urls.dependencies.push(version.download_url);
            }
        }
        info!(
            initial = urls.initial.len(),
            dependencies = urls.dependencies.len(),
            "Resolved download URLs"
        );
        Ok(urls)
    }

    /// Resolves `list` per catalog and removes duplicate artifacts
    #[instrument(skip_all, fields(requested = list.requests.len()))]
    pub async fn resolve(
        &self,
        list: ResolveListRequest,
        cancel: &CancellationToken,
    ) -> Result<Vec<ResolveOutcome>> {
        let mut groups: Vec<(&Arc<dyn Catalog>, Vec<ResolveRequest>)> = Vec::new();
        for request in list.requests {
            let catalog = self.registry.get(&request.identifier.catalog)?;
            match groups
                .iter_mut()
                .find(|(known, _)| known.name() == catalog.name())
            {
                Some((_, requests)) => requests.push(request),
                None => groups.push((catalog, vec![request])),
            }
        }

        let calls = groups.into_iter().map(|(catalog, requests)| {
            let excluded = list
                .excluded
                .iter()
                .filter(|identifier| identifier.catalog == catalog.name())
                .cloned();
            let sublist = ResolveListRequest::new(list.default_filters.clone(), requests, excluded);
            async move { catalog.resolve_list(sublist, cancel).await }
        });
        let outcomes = try_join_all(calls).await?;

        Ok(remove_duplicate_files(outcomes.into_iter().flatten()))
    }
}

/// Keeps one outcome per artifact file name, preferring initial requests.
///
/// Outcomes without a version are dropped. Order is otherwise preserved.
pub fn remove_duplicate_files(
    outcomes: impl IntoIterator<Item = ResolveOutcome>,
) -> Vec<ResolveOutcome> {
    let mut outcomes: Vec<ResolveOutcome> = outcomes
        .into_iter()
        .filter(|outcome| outcome.version.is_some())
        .collect();
    outcomes.sort_by_key(|outcome| !outcome.request.is_initial);

    let mut seen = HashSet::new();
    outcomes.retain(|outcome| {
        outcome
            .version
            .as_ref()
            .is_some_and(|version| seen.insert(version.file_name().to_string()))
    });
    outcomes
}

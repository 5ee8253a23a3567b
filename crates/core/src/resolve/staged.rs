//! # Staged Resolver
//!
//! Resolves a list in waves of bulk lookups. Each wave fetches project
//! metadata for the whole frontier, fetches all of their versions, selects
//! one version per project and turns the required dependencies of the
//! selections into the next frontier. Once a frontier falls below the
//! catalog's batch threshold the rest is handed to the streaming resolver.
//!
//! Catalogs accept a project under its stable id or its slug. Both forms
//! are tracked so exclusions and deduplication work whichever one a request
//! or dependency uses.

use std::collections::{HashMap, HashSet};

use futures::{stream, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use crate::catalog::{BulkCatalog, ProjectRecord};
use crate::error::{ResolveError, Result};
use crate::models::{
    dedup_requests, sort_newest_first, GlobalProjectIdentifier, ProjectVersion,
    ResolveListRequest, ResolveOutcome, ResolveRequest, VersionFilters,
};
use crate::resolve::chunk::chunk_and_request;
use crate::resolve::selector::select;
use crate::resolve::streaming::StreamingResolver;
use crate::resolve::workers::{TaskKind, WorkerPolicy};

/// Stable id and slug of every project seen during one call, keyed by both
#[derive(Debug, Default)]
struct IdentifierAliases {
    forms: HashMap<String, (String, String)>,
}

impl IdentifierAliases {
    fn learn(&mut self, record: &ProjectRecord) {
        let forms = (record.id.clone(), record.slug.clone());
        self.forms.insert(record.id.clone(), forms.clone());
        self.forms.insert(record.slug.clone(), forms);
    }

    fn forms(&self, id: &str) -> Option<&(String, String)> {
        self.forms.get(id)
    }

    /// Stable id for `id` when known, `id` itself otherwise
    fn canonical<'a>(&'a self, id: &'a str) -> &'a str {
        self.forms(id).map_or(id, |(stable, _)| stable.as_str())
    }
}

/// Exclusion set of one call, aware of id aliases
struct Exclusions {
    catalog: String,
    identifiers: HashSet<GlobalProjectIdentifier>,
}

impl Exclusions {
    fn contains(&self, id: &str, aliases: &IdentifierAliases) -> bool {
        let direct = GlobalProjectIdentifier::new(&self.catalog, id);
        if self.identifiers.contains(&direct) {
            return true;
        }
        aliases.forms(id).is_some_and(|(stable, slug)| {
            self.identifiers
                .contains(&GlobalProjectIdentifier::new(&self.catalog, stable))
                || self
                    .identifiers
                    .contains(&GlobalProjectIdentifier::new(&self.catalog, slug))
        })
    }

    fn insert(&mut self, id: &str) {
        self.identifiers
            .insert(GlobalProjectIdentifier::new(&self.catalog, id));
    }

    /// Adds the other form of every excluded project whose aliases are known
    fn refresh(&mut self, aliases: &IdentifierAliases) {
        let known: Vec<(String, String)> = self
            .identifiers
            .iter()
            .filter_map(|identifier| aliases.forms(&identifier.id).cloned())
            .collect();
        for (stable, slug) in known {
            self.insert(&stable);
            self.insert(&slug);
        }
    }
}

/// Wave resolver for catalogs with bulk lookups
#[derive(Debug, Clone)]
pub struct StagedResolver {
    streaming: StreamingResolver,
    policy: WorkerPolicy,
}

impl StagedResolver {
    pub fn new(streaming: StreamingResolver, policy: WorkerPolicy) -> Self {
        Self { streaming, policy }
    }

    #[instrument(skip_all, fields(catalog = %catalog.name(), requested = list.requests.len()))]
    pub async fn resolve<C>(
        &self,
        list: &ResolveListRequest,
        catalog: &C,
        cancel: &CancellationToken,
    ) -> Result<Vec<ResolveOutcome>>
    where
        C: BulkCatalog + ?Sized,
    {
        let mut aliases = IdentifierAliases::default();
        let mut excluded = Exclusions {
            catalog: catalog.name().to_string(),
            identifiers: list.excluded.clone(),
        };

        if !excluded.identifiers.is_empty() {
            let ids: Vec<String> = excluded
                .identifiers
                .iter()
                .map(|identifier| identifier.id.clone())
                .collect();
            for record in self.fetch_projects(catalog, &ids, cancel).await? {
                aliases.learn(&record);
            }
            excluded.refresh(&aliases);
        }

        let mut results = Vec::new();
        let mut frontier = dedup_requests(list.requests.iter().cloned());
        let mut wave = 0usize;

        loop {
            if cancel.is_cancelled() {
                return Err(ResolveError::Cancelled);
            }
            if frontier.is_empty() {
                break;
            }

            if frontier.len() < catalog.batch_threshold() {
                debug!(remaining = frontier.len(), "Frontier below batch threshold");
                let tail = ResolveListRequest {
                    default_filters: list.default_filters.clone(),
                    requests: frontier,
                    excluded: excluded.identifiers.clone(),
                };
                results.extend(self.streaming.resolve(&tail, catalog, cancel).await?);
                break;
            }

            wave += 1;
            info!(wave, frontier = frontier.len(), "Resolving wave");
            let outcomes = self
                .resolve_wave(catalog, &frontier, &mut excluded, &mut aliases, cancel)
                .await?;
            frontier = if self.streaming.options().expand_dependencies {
                self.next_frontier(&outcomes, &list.default_filters, &excluded, &aliases)
            } else {
                Vec::new()
            };
            results.extend(outcomes);
        }

        info!(resolved = results.len(), waves = wave, "Resolved project list");
        Ok(results)
    }

    async fn resolve_wave<C>(
        &self,
        catalog: &C,
        frontier: &[ResolveRequest],
        excluded: &mut Exclusions,
        aliases: &mut IdentifierAliases,
        cancel: &CancellationToken,
    ) -> Result<Vec<ResolveOutcome>>
    where
        C: BulkCatalog + ?Sized,
    {
        let mut lookup_ids: Vec<String> = Vec::new();
        for request in frontier {
            if !lookup_ids.contains(&request.identifier.id) {
                lookup_ids.push(request.identifier.id.clone());
            }
        }
        for identifier in &excluded.identifiers {
            if aliases.forms(&identifier.id).is_none() && !lookup_ids.contains(&identifier.id) {
                lookup_ids.push(identifier.id.clone());
            }
        }

        let records = self.fetch_projects(catalog, &lookup_ids, cancel).await?;
        for record in &records {
            aliases.learn(record);
        }
        excluded.refresh(aliases);

        let mut claimed: Vec<(ResolveRequest, &ProjectRecord)> = Vec::new();
        let mut seen = HashSet::new();
        for request in frontier {
            let record = find_record(&records, &request.identifier)?;
            if excluded.contains(&record.id, aliases) {
                debug!(project = %request.identifier, "Skipping excluded project");
                continue;
            }
            if seen.insert(record.id.as_str()) {
                claimed.push((request.clone(), record));
            }
        }
        if claimed.is_empty() {
            return Ok(Vec::new());
        }

        let version_ids: Vec<String> = claimed
            .iter()
            .flat_map(|(_, record)| record.version_ids.iter().cloned())
            .collect();
        let versions = chunk_and_request(&version_ids, catalog.max_items_per_request(), |chunk| {
            catalog.fetch_versions(chunk, cancel)
        })
        .await?;

        let mut by_project: HashMap<String, Vec<ProjectVersion>> = HashMap::new();
        for version in versions {
            by_project
                .entry(version.identifier.id.clone())
                .or_default()
                .push(version);
        }

        let workers = self
            .policy
            .workers(TaskKind::VersionSelection, claimed.len())?;
        let jobs: Vec<(ResolveRequest, Vec<ProjectVersion>)> = claimed
            .iter()
            .map(|(request, record)| {
                let candidates = by_project.remove(&record.id).unwrap_or_default();
                (request.clone(), candidates)
            })
            .collect();

        let ignore_missing = self.streaming.options().ignore_missing_versions;
        let selections: Vec<Result<ResolveOutcome>> = stream::iter(jobs)
            .map(|(request, mut candidates)| async move {
                sort_newest_first(&mut candidates);
                match select(&candidates, &request.filters).cloned() {
                    Some(version) => Ok(ResolveOutcome::new(request, Some(version))),
                    None if ignore_missing => {
                        debug!(project = %request.identifier, "No matching version, skipping");
                        Ok(ResolveOutcome::new(request, None))
                    }
                    None => Err(ResolveError::ProjectVersionNotFound(request)),
                }
            })
            .buffer_unordered(workers)
            .collect()
            .await;
        let outcomes = selections.into_iter().collect::<Result<Vec<_>>>()?;

        for outcome in &outcomes {
            let id = &outcome.request.identifier.id;
            if let Some((stable, slug)) = aliases.forms(id) {
                excluded.insert(stable);
                excluded.insert(slug);
            }
            excluded.insert(id);
        }
        Ok(outcomes)
    }

    fn next_frontier(
        &self,
        outcomes: &[ResolveOutcome],
        defaults: &VersionFilters,
        excluded: &Exclusions,
        aliases: &IdentifierAliases,
    ) -> Vec<ResolveRequest> {
        let mut seen: HashSet<String> = HashSet::new();
        let mut next = Vec::new();

        for outcome in outcomes {
            let Some(version) = &outcome.version else {
                continue;
            };
            for dependency in version.required_dependencies() {
                if excluded.contains(&dependency.id, aliases) {
                    continue;
                }
                if seen.insert(aliases.canonical(&dependency.id).to_string()) {
                    next.push(outcome.request.dependency(&dependency.id, defaults));
                }
            }
        }
        next
    }

    /// Bulk project lookup that fails unless every id resolved
    async fn fetch_projects<C>(
        &self,
        catalog: &C,
        ids: &[String],
        cancel: &CancellationToken,
    ) -> Result<Vec<ProjectRecord>>
    where
        C: BulkCatalog + ?Sized,
    {
        let records = chunk_and_request(ids, catalog.max_items_per_request(), |chunk| {
            catalog.fetch_projects(chunk, cancel)
        })
        .await?;

        if let Some(missing) = ids
            .iter()
            .find(|id| !records.iter().any(|record| record.matches(id)))
        {
            return Err(ResolveError::ProjectNotFound(GlobalProjectIdentifier::new(
                catalog.name(),
                missing.clone(),
            )));
        }
        Ok(records)
    }
}

fn find_record<'a>(
    records: &'a [ProjectRecord],
    identifier: &GlobalProjectIdentifier,
) -> Result<&'a ProjectRecord> {
    records
        .iter()
        .find(|record| record.matches(&identifier.id))
        .ok_or_else(|| ResolveError::ProjectNotFound(identifier.clone()))
}

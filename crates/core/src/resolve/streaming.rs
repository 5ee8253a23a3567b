//! # Streaming Resolver
//!
//! Resolves a list through per-item lookups in two concurrent stages:
//!
//! ```text
//! claimed requests --> fetch (F workers) --> bounded buffer --> discovery (D workers) --> results
//!        ^                                                            |
//!        +------------------- newly claimed dependencies <------------+
//! ```
//!
//! Every identifier is claimed at most once per call. A pending counter
//! tracks requests that are claimed but not yet through discovery; when it
//! reaches zero the request channel closes and both stages drain.
//!
//! The feedback channel is unbounded and the fetch-to-discovery buffer is
//! bounded, so discovery never waits on fetch and the cycle cannot stall.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use dashmap::DashSet;
use futures::{StreamExt, TryStreamExt};
use tokio::sync::mpsc;
use tokio_stream::wrappers::{ReceiverStream, UnboundedReceiverStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use crate::catalog::CatalogClient;
use crate::error::{ResolveError, Result};
use crate::models::{
    ClaimKey, GlobalProjectIdentifier, ResolveListRequest, ResolveOutcome, ResolveRequest,
    VersionFilters,
};
use crate::resolve::workers::{TaskKind, WorkerPolicy};
use crate::resolve::ResolveOptions;

/// Claimed identifiers and outstanding work of one resolve call
struct Frontier<'a> {
    claimed: DashSet<ClaimKey>,
    pending: AtomicUsize,
    requests: Mutex<Option<mpsc::UnboundedSender<ResolveRequest>>>,
    excluded: &'a HashSet<GlobalProjectIdentifier>,
}

impl<'a> Frontier<'a> {
    fn new(
        requests: mpsc::UnboundedSender<ResolveRequest>,
        excluded: &'a HashSet<GlobalProjectIdentifier>,
    ) -> Self {
        Self {
            claimed: DashSet::new(),
            pending: AtomicUsize::new(0),
            requests: Mutex::new(Some(requests)),
            excluded,
        }
    }

    fn is_excluded(&self, identifier: &GlobalProjectIdentifier) -> bool {
        self.excluded.contains(identifier)
    }

    /// Claims and enqueues `request`; false if its identifier was already claimed
    fn submit(&self, request: ResolveRequest) -> bool {
        if !self.claimed.insert(request.claim_key()) {
            return false;
        }
        // count before sending so the counter can't reach zero with work queued
        self.pending.fetch_add(1, Ordering::SeqCst);

        let requests = self.requests.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(sender) = requests.as_ref() {
            // a closed receiver means the fetch stage already failed
            let _ = sender.send(request);
        }
        true
    }

    /// Marks one claimed request as fully processed
    fn complete(&self) {
        if self.pending.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.requests
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take();
        }
    }
}

/// Per-item resolver for catalogs without bulk lookups
#[derive(Debug, Clone)]
pub struct StreamingResolver {
    policy: WorkerPolicy,
    options: ResolveOptions,
}

impl StreamingResolver {
    pub fn new(policy: WorkerPolicy, options: ResolveOptions) -> Self {
        Self { policy, options }
    }

    pub fn options(&self) -> &ResolveOptions {
        &self.options
    }

    /// Resolves every request in `list` and, unless disabled, every required
    /// dependency reachable from them that is not excluded.
    ///
    /// Outcomes come back in completion order. Any failure fails the whole
    /// call and abandons in-flight work.
    #[instrument(skip_all, fields(catalog = %lookup.name(), requested = list.requests.len()))]
    pub async fn resolve<L>(
        &self,
        list: &ResolveListRequest,
        lookup: &L,
        cancel: &CancellationToken,
    ) -> Result<Vec<ResolveOutcome>>
    where
        L: CatalogClient + ?Sized,
    {
        let (request_tx, request_rx) = mpsc::unbounded_channel();
        let frontier = Frontier::new(request_tx, &list.excluded);

        let initial = list
            .requests
            .iter()
            .filter(|request| frontier.submit((*request).clone()))
            .count();
        if initial == 0 {
            return Ok(Vec::new());
        }

        let fetch_workers = self.policy.workers(TaskKind::ProjectDataFetching, initial)?;
        let discovery_workers = self
            .policy
            .workers(TaskKind::ProjectDataProcessing, initial)?;
        debug!(initial, fetch_workers, discovery_workers, "Starting resolution stages");

        let (found_tx, found_rx) = mpsc::channel(self.options.buffer_size.max(1));
        let (result_tx, mut result_rx) = mpsc::unbounded_channel();

        let fetch = self.fetch_stage(request_rx, found_tx, lookup, cancel, fetch_workers);
        let discovery = self.discovery_stage(
            found_rx,
            result_tx,
            &frontier,
            &list.default_filters,
            discovery_workers,
        );

        tokio::select! {
            _ = cancel.cancelled() => return Err(ResolveError::Cancelled),
            joined = async { tokio::try_join!(fetch, discovery) } => {
                joined?;
            }
        }

        let mut outcomes = Vec::new();
        while let Ok(outcome) = result_rx.try_recv() {
            outcomes.push(outcome);
        }
        info!(resolved = outcomes.len(), "Resolved project list");
        Ok(outcomes)
    }

    async fn fetch_stage<L>(
        &self,
        requests: mpsc::UnboundedReceiver<ResolveRequest>,
        found: mpsc::Sender<ResolveOutcome>,
        lookup: &L,
        cancel: &CancellationToken,
        workers: usize,
    ) -> Result<()>
    where
        L: CatalogClient + ?Sized,
    {
        UnboundedReceiverStream::new(requests)
            .map(Ok::<_, ResolveError>)
            .try_for_each_concurrent(workers, |request| {
                let found = &found;
                async move {
                    let outcome = lookup.resolve_one(&request, cancel).await?;
                    if outcome.version.is_none() && !self.options.ignore_missing_versions {
                        return Err(ResolveError::ProjectVersionNotFound(outcome.request));
                    }
                    found
                        .send(outcome)
                        .await
                        .map_err(|_| ResolveError::Cancelled)
                }
            })
            .await
    }

    async fn discovery_stage(
        &self,
        found: mpsc::Receiver<ResolveOutcome>,
        results: mpsc::UnboundedSender<ResolveOutcome>,
        frontier: &Frontier<'_>,
        defaults: &VersionFilters,
        workers: usize,
    ) -> Result<()> {
        ReceiverStream::new(found)
            .map(Ok::<_, ResolveError>)
            .try_for_each_concurrent(workers, |outcome| {
                let results = &results;
                async move {
                    let expand = self.options.expand_dependencies;
                    if let Some(version) = outcome.version.as_ref().filter(|_| expand) {
                        for dependency in version.required_dependencies() {
                            let request = outcome.request.dependency(&dependency.id, defaults);
                            if frontier.is_excluded(&request.identifier) {
                                continue;
                            }
                            let identifier = request.identifier.clone();
                            if frontier.submit(request) {
                                debug!(
                                    dependency = %identifier,
                                    parent = %outcome.request.identifier,
                                    "Discovered dependency"
                                );
                            }
                        }
                    }

                    if outcome.version.is_some() {
                        results
                            .send(outcome)
                            .map_err(|_| ResolveError::Cancelled)?;
                    } else {
                        debug!(
                            project = %outcome.request.identifier,
                            "No matching version, skipping"
                        );
                    }

                    frontier.complete();
                    Ok(())
                }
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolve::fake::{filters, release, FakeCatalog};
    use std::time::Duration;

    fn resolver(options: ResolveOptions) -> StreamingResolver {
        StreamingResolver::new(WorkerPolicy::default(), options)
    }

    fn list(catalog: &FakeCatalog, ids: &[&str], excluded: &[&str]) -> ResolveListRequest {
        ResolveListRequest::new(
            filters(),
            ids.iter().map(|id| catalog.request(id, filters())),
            excluded.iter().map(|id| catalog.identifier(id)),
        )
    }

    fn resolved_ids(outcomes: &[ResolveOutcome]) -> Vec<String> {
        let mut ids: Vec<String> = outcomes
            .iter()
            .map(|outcome| outcome.request.identifier.id.clone())
            .collect();
        ids.sort();
        ids
    }

    #[tokio::test]
    async fn test_diamond_dependency_fetched_once() {
        let catalog = FakeCatalog::new("modrinth")
            .project("a", vec![release("a.jar", 1, &["b", "c"])])
            .project("b", vec![release("b.jar", 1, &["d"])])
            .project("c", vec![release("c.jar", 1, &["d"])])
            .project("d", vec![release("d.jar", 1, &[])]);

        let outcomes = resolver(ResolveOptions::default())
            .resolve(&list(&catalog, &["a"], &[]), &catalog, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(resolved_ids(&outcomes), vec!["a", "b", "c", "d"]);
        assert_eq!(catalog.lookups("d"), 1);
        assert_eq!(catalog.total_lookups(), 4);
    }

    #[tokio::test]
    async fn test_long_chain_terminates() {
        let mut catalog = FakeCatalog::new("curseforge");
        for i in 0..40 {
            let next = (i + 1).to_string();
            let dependencies: Vec<&str> = if i < 39 { vec![next.as_str()] } else { vec![] };
            catalog = catalog.project(
                &i.to_string(),
                vec![release(&format!("{}.jar", i), 1, &dependencies)],
            );
        }

        let outcomes = resolver(ResolveOptions::default())
            .resolve(&list(&catalog, &["0"], &[]), &catalog, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcomes.len(), 40);
        assert_eq!(catalog.total_lookups(), 40);
    }

    #[tokio::test]
    async fn test_cycle_terminates() {
        let catalog = FakeCatalog::new("modrinth")
            .project("a", vec![release("a.jar", 1, &["b"])])
            .project("b", vec![release("b.jar", 1, &["a"])]);

        let outcomes = resolver(ResolveOptions::default())
            .resolve(&list(&catalog, &["a"], &[]), &catalog, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(resolved_ids(&outcomes), vec!["a", "b"]);
        assert_eq!(catalog.lookups("a"), 1);
    }

    #[tokio::test]
    async fn test_excluded_dependency_never_fetched() {
        let catalog = FakeCatalog::new("modrinth")
            .project("a", vec![release("a.jar", 1, &["b"])])
            .project("b", vec![release("b.jar", 1, &["c"])])
            .project("c", vec![release("c.jar", 1, &[])]);

        let outcomes = resolver(ResolveOptions::default())
            .resolve(&list(&catalog, &["a"], &["b"]), &catalog, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(resolved_ids(&outcomes), vec!["a"]);
        assert_eq!(catalog.lookups("b"), 0);
        assert_eq!(catalog.lookups("c"), 0);
    }

    #[tokio::test]
    async fn test_dependency_without_version_fails_call() {
        let mut old = release("b-old.jar", 1, &[]);
        old.game_versions = vec!["1.16.5".to_string()];
        let catalog = FakeCatalog::new("modrinth")
            .project("a", vec![release("a.jar", 1, &["b"])])
            .project("b", vec![old]);

        let err = resolver(ResolveOptions::default())
            .resolve(&list(&catalog, &["a"], &[]), &catalog, &CancellationToken::new())
            .await
            .unwrap_err();

        match err {
            ResolveError::ProjectVersionNotFound(request) => {
                assert_eq!(request.identifier.id, "b");
                assert!(!request.is_initial);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_ignore_missing_versions_skips_item() {
        let mut old = release("b-old.jar", 1, &["c"]);
        old.game_versions = vec!["1.16.5".to_string()];
        let catalog = FakeCatalog::new("modrinth")
            .project("a", vec![release("a.jar", 1, &["b"])])
            .project("b", vec![old])
            .project("c", vec![release("c.jar", 1, &[])]);
        let options = ResolveOptions {
            ignore_missing_versions: true,
            ..Default::default()
        };

        let outcomes = resolver(options)
            .resolve(&list(&catalog, &["a"], &[]), &catalog, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(resolved_ids(&outcomes), vec!["a"]);
        assert_eq!(catalog.lookups("c"), 0);
    }

    #[tokio::test]
    async fn test_expansion_can_be_disabled() {
        let catalog = FakeCatalog::new("modrinth")
            .project("a", vec![release("a.jar", 1, &["b"])])
            .project("b", vec![release("b.jar", 1, &[])]);
        let options = ResolveOptions {
            expand_dependencies: false,
            ..Default::default()
        };

        let outcomes = resolver(options)
            .resolve(&list(&catalog, &["a"], &[]), &catalog, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(resolved_ids(&outcomes), vec!["a"]);
        assert_eq!(catalog.lookups("b"), 0);
    }

    #[tokio::test]
    async fn test_empty_list_resolves_to_nothing() {
        let catalog = FakeCatalog::new("modrinth");
        let outcomes = resolver(ResolveOptions::default())
            .resolve(&list(&catalog, &[], &[]), &catalog, &CancellationToken::new())
            .await
            .unwrap();
        assert!(outcomes.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_project_fails() {
        let catalog = FakeCatalog::new("modrinth")
            .project("a", vec![release("a.jar", 1, &["ghost"])]);

        let err = resolver(ResolveOptions::default())
            .resolve(&list(&catalog, &["a"], &[]), &catalog, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, ResolveError::ProjectNotFound(id) if id.id == "ghost"));
    }

    #[tokio::test]
    async fn test_small_buffer_does_not_stall() {
        let mut catalog = FakeCatalog::new("modrinth");
        let leaves: Vec<String> = (0..50).map(|i| format!("leaf{}", i)).collect();
        let leaf_refs: Vec<&str> = leaves.iter().map(String::as_str).collect();
        catalog = catalog.project("root", vec![release("root.jar", 1, &leaf_refs)]);
        for leaf in &leaves {
            catalog = catalog.project(leaf, vec![release(&format!("{}.jar", leaf), 1, &[])]);
        }
        let options = ResolveOptions {
            buffer_size: 1,
            ..Default::default()
        };

        let outcomes = resolver(options)
            .resolve(&list(&catalog, &["root"], &[]), &catalog, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcomes.len(), 51);
    }

    #[tokio::test]
    async fn test_cancellation_stops_resolution() {
        let catalog = FakeCatalog::new("modrinth")
            .project("a", vec![release("a.jar", 1, &["b"])])
            .project("b", vec![release("b.jar", 1, &[])])
            .stall("b");
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let err = resolver(ResolveOptions::default())
            .resolve(&list(&catalog, &["a"], &[]), &catalog, &cancel)
            .await
            .unwrap_err();

        assert!(matches!(err, ResolveError::Cancelled));
        assert_eq!(catalog.lookups("b"), 1);
    }
}

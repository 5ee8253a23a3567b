//! # Catalog Clients
//!
//! Capabilities the resolution engine needs from a content source, and the
//! HTTP clients implementing them.
//!
//! ## Capabilities
//!
//! - [`CatalogClient`] - per-item lookup, required of every catalog
//! - [`BulkCatalog`] - bulk project and version lookup (batched waves)
//! - [`Catalog`] - whole-list resolution, the entry point used by routing
//!
//! ## Clients
//!
//! - `modrinth` - bulk capable, resolved in staged waves
//! - `curseforge` - per item only, resolved by the streaming pipeline

pub mod curseforge;
pub mod http;
pub mod modrinth;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::models::{ProjectVersion, ResolveListRequest, ResolveOutcome, ResolveRequest};

pub use curseforge::CurseForgeClient;
pub use modrinth::ModrinthClient;

/// Per-item lookup against one catalog
#[async_trait]
pub trait CatalogClient: Send + Sync {
    /// Name used to route identifiers to this catalog
    fn name(&self) -> &str;

    /// Fetch the request's candidate versions and select the best one.
    ///
    /// Fails with `ProjectNotFound` when the catalog has no such project; a
    /// known project without a matching version yields an outcome with no
    /// version.
    async fn resolve_one(
        &self,
        request: &ResolveRequest,
        cancel: &CancellationToken,
    ) -> Result<ResolveOutcome>;
}

/// Project metadata returned by a bulk project lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectRecord {
    /// Stable id
    pub id: String,
    /// Human-readable alias
    pub slug: String,
    pub version_ids: Vec<String>,
}

impl ProjectRecord {
    /// Whether `id` names this project in either form
    pub fn matches(&self, id: &str) -> bool {
        self.id == id || self.slug == id
    }
}

/// Bulk lookups for catalogs that support them
#[async_trait]
pub trait BulkCatalog: CatalogClient {
    /// Per-request item ceiling of the bulk endpoints
    fn max_items_per_request(&self) -> usize;

    /// Smallest frontier worth a bulk wave; smaller ones go item by item
    fn batch_threshold(&self) -> usize;

    /// One bulk project request; ids may be stable ids or slugs
    async fn fetch_projects(
        &self,
        ids: &[String],
        cancel: &CancellationToken,
    ) -> Result<Vec<ProjectRecord>>;

    /// One bulk version request. Returned versions carry the owning project's
    /// stable id.
    async fn fetch_versions(
        &self,
        version_ids: &[String],
        cancel: &CancellationToken,
    ) -> Result<Vec<ProjectVersion>>;
}

/// Whole-list resolution for one catalog
#[async_trait]
pub trait Catalog: CatalogClient {
    /// Resolve every request plus its required dependencies.
    ///
    /// `list.excluded` holds only identifiers of this catalog.
    async fn resolve_list(
        &self,
        list: ResolveListRequest,
        cancel: &CancellationToken,
    ) -> Result<Vec<ResolveOutcome>>;
}

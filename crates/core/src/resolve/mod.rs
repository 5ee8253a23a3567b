//! # Resolution Engine
//!
//! Turns a list of requested projects into the set of versions to download,
//! following required dependencies transitively.
//!
//! - [`streaming`] - two-stage fetch/discovery pipeline over per-item lookups
//! - [`staged`] - wave-by-wave resolution over bulk lookups
//! - [`router`] - per-catalog dispatch and artifact deduplication
//! - [`selector`], [`chunk`], [`workers`] - shared building blocks

pub mod chunk;
pub mod router;
pub mod selector;
pub mod staged;
pub mod streaming;
pub mod workers;

#[cfg(test)]
pub(crate) mod fake;

use crate::config::ResolutionSettings;

pub use router::{CatalogRegistry, DownloadUrls, ProjectsService};
pub use staged::StagedResolver;
pub use streaming::StreamingResolver;
pub use workers::{TaskKind, WorkerPolicy};

/// Behaviour switches shared by both resolvers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolveOptions {
    pub expand_dependencies: bool,
    pub ignore_missing_versions: bool,
    /// Capacity of the fetch-to-discovery buffer, at least 1
    pub buffer_size: usize,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self::from(&ResolutionSettings::default())
    }
}

impl From<&ResolutionSettings> for ResolveOptions {
    fn from(settings: &ResolutionSettings) -> Self {
        Self {
            expand_dependencies: settings.expand_dependencies,
            ignore_missing_versions: settings.ignore_missing_versions,
            buffer_size: settings.buffer_size.max(1),
        }
    }
}

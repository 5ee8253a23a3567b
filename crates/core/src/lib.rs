//! # Clew Core
//!
//! Multi-catalog mod dependency resolution: given requested projects and
//! version filters, finds one version per project and follows required
//! dependencies transitively, returning the artifacts to download.
//!
//! ## Architecture
//!
//! - `models` - catalog-independent identifiers, filters and versions
//! - `resolve/` - selector, chunk planner, streaming and staged resolvers, router
//! - `catalog/` - capability traits plus the Modrinth and CurseForge clients
//! - `naming` - catalog vocabulary to common vocabulary translation
//! - `config` - settings with defaults, file and environment overrides
//!
//! ## Usage
//!
//! ```rust,ignore
//! use clew_core::{build_service, config::ClewConfig};
//!
//! let service = build_service(&ClewConfig::default())?;
//! let urls = service.resolve_download_urls(list, &cancel).await?;
//! ```

pub mod catalog;
pub mod config;
pub mod error;
pub mod models;
pub mod naming;
pub mod resolve;

use std::sync::Arc;

use catalog::{Catalog, CurseForgeClient, ModrinthClient};
use config::ClewConfig;
use naming::NamingTranslator;
use resolve::{CatalogRegistry, ProjectsService, ResolveOptions, StagedResolver, StreamingResolver};

pub use error::{ResolveError, Result};

/// Wires both catalog clients into a [`ProjectsService`]
pub fn build_service(config: &ClewConfig) -> Result<ProjectsService> {
    let translator = Arc::new(NamingTranslator::new(&config.namings.0)?);
    let policy = config.concurrency.worker_policy();
    let streaming = StreamingResolver::new(policy.clone(), ResolveOptions::from(&config.resolution));

    let modrinth = ModrinthClient::new(
        &config.modrinth,
        translator.clone(),
        StagedResolver::new(streaming.clone(), policy),
    )?;
    let curseforge = CurseForgeClient::new(&config.curseforge, translator, streaming)?;

    let catalogs: Vec<Arc<dyn Catalog>> = vec![Arc::new(modrinth), Arc::new(curseforge)];
    Ok(ProjectsService::new(CatalogRegistry::new(catalogs)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_service_registers_both_catalogs() {
        let service = build_service(&ClewConfig::default()).unwrap();
        assert_eq!(service.registry().names(), vec!["curseforge", "modrinth"]);
    }

    #[test]
    fn test_clashing_catalog_names_rejected() {
        let mut config = ClewConfig::default();
        config.curseforge.name = "modrinth".to_string();
        assert!(matches!(
            build_service(&config),
            Err(ResolveError::DuplicateCatalog(_))
        ));
    }
}

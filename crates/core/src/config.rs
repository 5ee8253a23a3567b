//! # Clew Configuration
//!
//! Service settings with complete defaults. A JSON file may override any
//! subset of them, and a handful of environment variables override the file.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::naming::{NamingCategory, NamingTable};
use crate::resolve::workers::{TaskKind, WorkerPolicy};

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClewConfig {
    pub server: ServerSettings,
    pub concurrency: ConcurrencySettings,
    pub resolution: ResolutionSettings,
    pub modrinth: ModrinthSettings,
    pub curseforge: CurseForgeSettings,
    pub namings: NamingsSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConcurrencySettings {
    pub items_per_worker: HashMap<TaskKind, usize>,
}

impl Default for ConcurrencySettings {
    fn default() -> Self {
        Self {
            items_per_worker: HashMap::from([
                (TaskKind::ProjectDataFetching, 4),
                (TaskKind::ProjectDataProcessing, 16),
                (TaskKind::VersionSelection, 32),
            ]),
        }
    }
}

impl ConcurrencySettings {
    pub fn worker_policy(&self) -> WorkerPolicy {
        WorkerPolicy::new(self.items_per_worker.clone())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolutionSettings {
    /// Follow required dependencies, or resolve only the requested items
    pub expand_dependencies: bool,
    /// Omit items without a matching version instead of failing the call
    pub ignore_missing_versions: bool,
    /// Capacity of the fetch-to-discovery hand-off buffer
    pub buffer_size: usize,
}

impl Default for ResolutionSettings {
    fn default() -> Self {
        Self {
            expand_dependencies: true,
            ignore_missing_versions: false,
            buffer_size: 64,
        }
    }
}

/// Retry policy for transient catalog failures
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub initial_interval_ms: u64,
    pub max_elapsed_secs: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            initial_interval_ms: 3000,
            max_elapsed_secs: 15,
        }
    }
}

impl RetrySettings {
    pub fn initial_interval(&self) -> Duration {
        Duration::from_millis(self.initial_interval_ms)
    }

    pub fn max_elapsed(&self) -> Duration {
        Duration::from_secs(self.max_elapsed_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModrinthSettings {
    /// Catalog name used for routing
    pub name: String,
    pub base_url: String,
    pub max_requests_per_minute: u32,
    pub max_items_per_request: usize,
    /// Frontier size from which a wave is resolved with bulk calls
    pub batch_threshold: usize,
    pub timeout_secs: u64,
    pub retry: RetrySettings,
}

impl Default for ModrinthSettings {
    fn default() -> Self {
        Self {
            name: "modrinth".to_string(),
            base_url: "https://api.modrinth.com/v2/".to_string(),
            max_requests_per_minute: 300,
            max_items_per_request: 500,
            batch_threshold: 20,
            timeout_secs: 10,
            retry: RetrySettings::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CurseForgeSettings {
    pub name: String,
    pub base_url: String,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub timeout_secs: u64,
    pub retry: RetrySettings,
}

impl Default for CurseForgeSettings {
    fn default() -> Self {
        Self {
            name: "curseforge".to_string(),
            base_url: "https://api.curseforge.com/v1/".to_string(),
            api_key: None,
            timeout_secs: 10,
            retry: RetrySettings::default(),
        }
    }
}

/// Naming table: category -> common name -> catalog -> specific name
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NamingsSettings(pub NamingTable);

impl Default for NamingsSettings {
    fn default() -> Self {
        let release_channels = entries(&[
            ("release", &[("modrinth", "release"), ("curseforge", "1")]),
            ("beta", &[("modrinth", "beta"), ("curseforge", "2")]),
            ("alpha", &[("modrinth", "alpha"), ("curseforge", "3")]),
        ]);
        let relation_types = entries(&[
            (
                "required_dependency",
                &[("modrinth", "required"), ("curseforge", "3")],
            ),
            (
                "optional_dependency",
                &[("modrinth", "optional"), ("curseforge", "2")],
            ),
            (
                "incompatible",
                &[("modrinth", "incompatible"), ("curseforge", "5")],
            ),
            ("embedded", &[("modrinth", "embedded"), ("curseforge", "1")]),
            ("tool", &[("curseforge", "4")]),
            ("include", &[("curseforge", "6")]),
        ]);
        let platforms = entries(&[
            ("fabric", &[("modrinth", "fabric"), ("curseforge", "Fabric")]),
            ("forge", &[("modrinth", "forge"), ("curseforge", "Forge")]),
            (
                "neoforge",
                &[("modrinth", "neoforge"), ("curseforge", "NeoForge")],
            ),
            ("quilt", &[("modrinth", "quilt"), ("curseforge", "Quilt")]),
            (
                "liteloader",
                &[("modrinth", "liteloader"), ("curseforge", "LiteLoader")],
            ),
            ("rift", &[("modrinth", "rift"), ("curseforge", "Rift")]),
            ("minecraft", &[("modrinth", "minecraft")]),
            ("datapack", &[("modrinth", "datapack")]),
            ("iris", &[("modrinth", "iris")]),
            ("optifine", &[("modrinth", "optifine")]),
            ("canvas", &[("modrinth", "canvas")]),
            ("vanilla", &[("modrinth", "vanilla")]),
            ("modloader", &[("modrinth", "modloader")]),
            ("bukkit", &[("modrinth", "bukkit")]),
            ("spigot", &[("modrinth", "spigot")]),
            ("paper", &[("modrinth", "paper")]),
            ("purpur", &[("modrinth", "purpur")]),
            ("folia", &[("modrinth", "folia")]),
            ("sponge", &[("modrinth", "sponge")]),
            ("velocity", &[("modrinth", "velocity")]),
            ("bungeecord", &[("modrinth", "bungeecord")]),
            ("waterfall", &[("modrinth", "waterfall")]),
        ]);

        Self(HashMap::from([
            (NamingCategory::ReleaseChannels, release_channels),
            (NamingCategory::RelationTypes, relation_types),
            (NamingCategory::Platforms, platforms),
        ]))
    }
}

fn entries(rows: &[(&str, &[(&str, &str)])]) -> HashMap<String, HashMap<String, String>> {
    rows.iter()
        .map(|(common, per_catalog)| {
            let per_catalog = per_catalog
                .iter()
                .map(|(catalog, specific)| (catalog.to_string(), specific.to_string()))
                .collect();
            (common.to_string(), per_catalog)
        })
        .collect()
}

impl ClewConfig {
    /// Load from an optional JSON file, then apply environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let content = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config file {}", path.display()))?;
                Self::from_json(&content)
                    .with_context(|| format!("Failed to parse config file {}", path.display()))?
            }
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    /// Apply overrides from a variable source (the process environment in production)
    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(host) = var("CLEW_HOST") {
            self.server.host = host;
        }
        if let Some(port) = var("CLEW_PORT") {
            self.server.port = port
                .parse()
                .with_context(|| format!("CLEW_PORT is not a valid port: {}", port))?;
        }
        if let Some(key) = var("CURSEFORGE_API_KEY") {
            self.curseforge.api_key = Some(key);
        }
        if let Some(url) = var("MODRINTH_BASE_URL") {
            self.modrinth.base_url = url;
        }
        if let Some(url) = var("CURSEFORGE_BASE_URL") {
            self.curseforge.base_url = url;
        }
        Ok(())
    }
}

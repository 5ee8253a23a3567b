//! # Worker Count Policy
//!
//! Turns an "items per worker" setting into the parallelism of one
//! resolution stage for the current item count.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{ResolveError, Result};

/// Kinds of concurrent work the resolvers size independently
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    /// Catalog lookups in the streaming fetch stage
    ProjectDataFetching,
    /// Dependency discovery in the streaming discovery stage
    ProjectDataProcessing,
    /// Per-project version selection inside a batch wave
    VersionSelection,
}

/// How many items a single worker handles before another one is added
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerPolicy {
    items_per_worker: HashMap<TaskKind, usize>,
}

impl WorkerPolicy {
    pub fn new(items_per_worker: HashMap<TaskKind, usize>) -> Self {
        Self { items_per_worker }
    }

    /// Number of workers for `item_count` items of the given kind
    pub fn workers(&self, kind: TaskKind, item_count: usize) -> Result<usize> {
        if item_count < 1 {
            return Err(ResolveError::invalid_argument(
                "item count can't be less than 1",
            ));
        }
        let per_worker = match self.items_per_worker.get(&kind) {
            Some(&n) if n > 0 => n,
            _ => {
                return Err(ResolveError::invalid_argument(format!(
                    "no items-per-worker value configured for {:?}",
                    kind
                )))
            }
        };
        Ok(item_count.div_ceil(per_worker))
    }
}

impl Default for WorkerPolicy {
    fn default() -> Self {
        Self::new(HashMap::from([
            (TaskKind::ProjectDataFetching, 4),
            (TaskKind::ProjectDataProcessing, 16),
            (TaskKind::VersionSelection, 32),
        ]))
    }
}

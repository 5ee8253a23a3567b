//! # Resolve Errors
//!
//! Failure taxonomy shared by the resolution engine, catalog clients and the
//! transport boundary. Every variant is terminal for the enclosing resolve
//! call; concurrent failures collapse to the first one observed.

use thiserror::Error;

use crate::models::{GlobalProjectIdentifier, ResolveRequest};
use crate::naming::NamingCategory;

/// Errors produced while resolving a project list
#[derive(Debug, Error)]
pub enum ResolveError {
    /// The catalog has no record of the identifier at all
    #[error("Project with identifier: '{0}' was not found.")]
    ProjectNotFound(GlobalProjectIdentifier),

    /// The catalog knows the project but no version satisfies the filters
    #[error("No version found for project '{}' with parameters: {}", .0.identifier, .0.filters)]
    ProjectVersionNotFound(ResolveRequest),

    /// A catalog emitted a name with no mapping in the naming table
    #[error("Translation for '{name}' in category '{category}' for source '{catalog}' not found.")]
    TranslationNotFound {
        category: NamingCategory,
        catalog: String,
        name: String,
    },

    /// A resolved version carries no downloadable file
    #[error("Version '{version}' of project '{project}' does not contain any files")]
    MissingDownload {
        project: GlobalProjectIdentifier,
        version: String,
    },

    /// No catalog registered under the requested name
    #[error("No content source with name '{0}' found")]
    UnknownCatalog(String),

    /// Two catalogs registered under the same name
    #[error("Registered multiple content sources with name: {0}")]
    DuplicateCatalog(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Outbound call failed after the client exhausted its retry policy
    #[error("Request to '{catalog}' failed: {message}")]
    Transport { catalog: String, message: String },

    #[error("Resolution was cancelled")]
    Cancelled,
}

impl ResolveError {
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    pub fn transport(catalog: impl Into<String>, message: impl ToString) -> Self {
        Self::Transport {
            catalog: catalog.into(),
            message: message.to_string(),
        }
    }
}

pub type Result<T, E = ResolveError> = std::result::Result<T, E>;

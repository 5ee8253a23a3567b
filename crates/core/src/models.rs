//! # Resolution Models
//!
//! Catalog-independent types flowing through the resolution engine. Names
//! arriving from a catalog are already translated to the common vocabulary
//! by the time they reach these types.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Globally unique project key: the catalog name plus the catalog's own id.
///
/// Comparison is exact and case-sensitive on both fields.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GlobalProjectIdentifier {
    pub catalog: String,
    pub id: String,
}

impl GlobalProjectIdentifier {
    pub fn new(catalog: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            catalog: catalog.into(),
            id: id.into(),
        }
    }

    /// Same catalog, different id
    pub fn sibling(&self, id: impl Into<String>) -> Self {
        Self {
            catalog: self.catalog.clone(),
            id: id.into(),
        }
    }
}

impl fmt::Display for GlobalProjectIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.catalog, self.id)
    }
}

/// Parses the `catalog:id` form used on the command line
impl FromStr for GlobalProjectIdentifier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some((catalog, id)) if !catalog.is_empty() && !id.is_empty() => {
                Ok(Self::new(catalog, id))
            }
            _ => Err(format!("expected '<catalog>:<id>', got '{}'", s)),
        }
    }
}

/// Stability tier of a published version, most stable first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReleaseChannel {
    Release,
    Beta,
    Alpha,
}

impl FromStr for ReleaseChannel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize_name(s).as_str() {
            "release" => Ok(Self::Release),
            "beta" => Ok(Self::Beta),
            "alpha" => Ok(Self::Alpha),
            _ => Err(format!("unknown release channel '{}'", s)),
        }
    }
}

/// Minimum stability a caller accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ReleaseChannelFilter {
    #[default]
    Any,
    AtLeastBeta,
    Release,
}

impl fmt::Display for ReleaseChannelFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Any => "any",
            Self::AtLeastBeta => "atLeastBeta",
            Self::Release => "release",
        };
        f.write_str(name)
    }
}

impl FromStr for ReleaseChannelFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize_name(s).as_str() {
            "any" => Ok(Self::Any),
            "atleastbeta" => Ok(Self::AtLeastBeta),
            "release" => Ok(Self::Release),
            _ => Err(format!("unknown release channel filter '{}'", s)),
        }
    }
}

/// How a version relates to another project
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    /// Must be resolved further
    RequiredDependency,
    OptionalDependency,
    Incompatible,
    Embedded,
    Tool,
    Include,
}

impl FromStr for RelationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize_name(s).as_str() {
            "requireddependency" => Ok(Self::RequiredDependency),
            "optionaldependency" => Ok(Self::OptionalDependency),
            "incompatible" => Ok(Self::Incompatible),
            "embedded" | "embeddeddependency" => Ok(Self::Embedded),
            "tool" => Ok(Self::Tool),
            "include" => Ok(Self::Include),
            _ => Err(format!("unknown relation kind '{}'", s)),
        }
    }
}

fn normalize_name(s: &str) -> String {
    s.chars()
        .filter(|c| *c != '_' && *c != '-')
        .flat_map(char::to_lowercase)
        .collect()
}

/// Version filters. List order encodes priority, earlier is preferred.
///
/// `None` (unset) is distinct from an empty list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionFilters {
    pub game_versions: Option<Vec<String>>,
    pub platforms: Option<Vec<String>>,
    pub release_channel: Option<ReleaseChannelFilter>,
}

impl VersionFilters {
    /// Filters for a dependency discovered under `parent`.
    ///
    /// Lists are the ordered union of the defaults and the parent's lists; the
    /// release channel comes from the defaults only.
    pub fn for_dependency(defaults: &VersionFilters, parent: &VersionFilters) -> VersionFilters {
        VersionFilters {
            game_versions: Some(ordered_union(
                defaults.game_versions.as_deref(),
                parent.game_versions.as_deref(),
            )),
            platforms: Some(ordered_union(
                defaults.platforms.as_deref(),
                parent.platforms.as_deref(),
            )),
            release_channel: Some(defaults.release_channel.unwrap_or_default()),
        }
    }
}

impl fmt::Display for VersionFilters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn list(values: &Option<Vec<String>>) -> String {
            values
                .as_ref()
                .map(|v| v.join(", "))
                .unwrap_or_else(|| "-".to_string())
        }
        let channel = self
            .release_channel
            .map(|c| c.to_string())
            .unwrap_or_else(|| "-".to_string());
        write!(
            f,
            "{{ GameVersions: [{}], Platforms: [{}], ReleaseChannel: {} }}",
            list(&self.game_versions),
            list(&self.platforms),
            channel
        )
    }
}

/// Ordered union: every element of `first`, then the unseen elements of `second`
pub fn ordered_union(first: Option<&[String]>, second: Option<&[String]>) -> Vec<String> {
    let mut seen = HashSet::new();
    first
        .unwrap_or_default()
        .iter()
        .chain(second.unwrap_or_default())
        .filter(|value| seen.insert(value.as_str()))
        .cloned()
        .collect()
}

/// Deduplication key of a [`ResolveRequest`].
///
/// Two requests for the same identifier are the same request, whatever their
/// filters: whichever is claimed first wins.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClaimKey(GlobalProjectIdentifier);

/// One project to resolve, with the filters it is resolved under.
///
/// Deliberately has no structural equality; use [`ResolveRequest::claim_key`].
#[derive(Debug, Clone)]
pub struct ResolveRequest {
    pub identifier: GlobalProjectIdentifier,
    pub filters: VersionFilters,
    pub is_initial: bool,
}

impl ResolveRequest {
    pub fn initial(identifier: GlobalProjectIdentifier, filters: VersionFilters) -> Self {
        Self {
            identifier,
            filters,
            is_initial: true,
        }
    }

    pub fn claim_key(&self) -> ClaimKey {
        ClaimKey(self.identifier.clone())
    }

    /// Request for a required dependency declared by this request's version.
    ///
    /// Dependencies always live in the declaring catalog.
    pub fn dependency(&self, dependency_id: &str, defaults: &VersionFilters) -> ResolveRequest {
        ResolveRequest {
            identifier: self.identifier.sibling(dependency_id),
            filters: VersionFilters::for_dependency(defaults, &self.filters),
            is_initial: false,
        }
    }
}

/// Reference from a version to another project
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelatedProject {
    pub identifier: GlobalProjectIdentifier,
    pub kind: RelationKind,
}

/// A single published version of a project
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectVersion {
    pub identifier: GlobalProjectIdentifier,
    pub game_versions: Vec<String>,
    pub platforms: Vec<String>,
    pub release_channel: ReleaseChannel,
    pub download_url: String,
    pub published_at: Option<DateTime<Utc>>,
    pub related_projects: Vec<RelatedProject>,
}

impl ProjectVersion {
    pub fn required_dependencies(&self) -> impl Iterator<Item = &GlobalProjectIdentifier> {
        self.related_projects
            .iter()
            .filter(|related| related.kind == RelationKind::RequiredDependency)
            .map(|related| &related.identifier)
    }

    /// File name part of the download URL, used to collapse duplicate artifacts
    pub fn file_name(&self) -> &str {
        let path = self
            .download_url
            .split(['?', '#'])
            .next()
            .unwrap_or_default();
        path.rsplit(['/', '\\']).next().unwrap_or(path)
    }
}

/// Orders versions newest published first; undated versions go last.
///
/// The sort is stable, so equally dated versions keep catalog order.
pub fn sort_newest_first(versions: &mut [ProjectVersion]) {
    versions.sort_by(|a, b| b.published_at.cmp(&a.published_at));
}

/// Result of resolving one request
#[derive(Debug, Clone)]
pub struct ResolveOutcome {
    pub request: ResolveRequest,
    /// `None` when no version satisfies the filters
    pub version: Option<ProjectVersion>,
}

impl ResolveOutcome {
    pub fn new(request: ResolveRequest, version: Option<ProjectVersion>) -> Self {
        Self { request, version }
    }
}

/// A whole top-level resolve call
#[derive(Debug, Clone, Default)]
pub struct ResolveListRequest {
    pub default_filters: VersionFilters,
    pub requests: Vec<ResolveRequest>,
    pub excluded: HashSet<GlobalProjectIdentifier>,
}

impl ResolveListRequest {
    /// Builds a list request; duplicate requests (by claim key) keep the first
    pub fn new(
        default_filters: VersionFilters,
        requests: impl IntoIterator<Item = ResolveRequest>,
        excluded: impl IntoIterator<Item = GlobalProjectIdentifier>,
    ) -> Self {
        Self {
            default_filters,
            requests: dedup_requests(requests),
            excluded: excluded.into_iter().collect(),
        }
    }
}

/// Drops later requests whose claim key was already seen
pub fn dedup_requests(requests: impl IntoIterator<Item = ResolveRequest>) -> Vec<ResolveRequest> {
    let mut seen = HashSet::new();
    requests
        .into_iter()
        .filter(|request| seen.insert(request.claim_key()))
        .collect()
}

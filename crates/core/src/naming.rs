//! # Naming Translator
//!
//! Maps each catalog's vocabulary (platform, release channel and relation
//! type names) to the common vocabulary and back. The table is built once
//! from configuration and is read-only afterwards.
//!
//! Lookups ignore ASCII case on both the catalog name and the term.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ResolveError, Result};

/// Category of a translatable name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NamingCategory {
    Platforms,
    ReleaseChannels,
    RelationTypes,
}

impl fmt::Display for NamingCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Platforms => "platforms",
            Self::ReleaseChannels => "release_channels",
            Self::RelationTypes => "relation_types",
        };
        f.write_str(name)
    }
}

/// category -> common name -> catalog name -> catalog-specific name
pub type NamingTable = HashMap<NamingCategory, HashMap<String, HashMap<String, String>>>;

type Lookup = HashMap<(String, String), String>;

/// Bidirectional name translation between catalogs and the common vocabulary
#[derive(Debug, Default, Clone)]
pub struct NamingTranslator {
    common_names: HashMap<NamingCategory, Lookup>,
    specific_names: HashMap<NamingCategory, Lookup>,
}

impl NamingTranslator {
    /// Builds both directions from the configured table.
    ///
    /// Fails when two common names claim the same catalog-specific name.
    pub fn new(table: &NamingTable) -> Result<Self> {
        let mut common_names: HashMap<NamingCategory, Lookup> = HashMap::new();
        let mut specific_names: HashMap<NamingCategory, Lookup> = HashMap::new();

        for (category, entries) in table {
            let common = common_names.entry(*category).or_default();
            let specific = specific_names.entry(*category).or_default();

            for (common_name, per_catalog) in entries {
                for (catalog, specific_name) in per_catalog {
                    let specific_key = key(catalog, specific_name);
                    if let Some(existing) = common.get(&specific_key) {
                        return Err(ResolveError::invalid_argument(format!(
                            "'{}' on '{}' maps to both '{}' and '{}' in category '{}'",
                            specific_name, catalog, existing, common_name, category
                        )));
                    }
                    common.insert(specific_key, common_name.clone());
                    specific.insert(key(catalog, common_name), specific_name.clone());
                }
            }
        }

        Ok(Self {
            common_names,
            specific_names,
        })
    }

    /// Catalog-specific name to common name
    pub fn to_common(&self, category: NamingCategory, catalog: &str, name: &str) -> Result<&str> {
        lookup(&self.common_names, category, catalog, name)
    }

    /// Common name to catalog-specific name
    pub fn to_specific(&self, category: NamingCategory, catalog: &str, name: &str) -> Result<&str> {
        lookup(&self.specific_names, category, catalog, name)
    }

    /// Translates a catalog term and parses it into a common enum
    pub fn parse_common<T: FromStr>(
        &self,
        category: NamingCategory,
        catalog: &str,
        name: &str,
    ) -> Result<T> {
        self.to_common(category, catalog, name)?
            .parse()
            .map_err(|_| ResolveError::TranslationNotFound {
                category,
                catalog: catalog.to_string(),
                name: name.to_string(),
            })
    }
}

fn key(catalog: &str, name: &str) -> (String, String) {
    (catalog.to_ascii_lowercase(), name.to_ascii_lowercase())
}

fn lookup<'a>(
    names: &'a HashMap<NamingCategory, Lookup>,
    category: NamingCategory,
    catalog: &str,
    name: &str,
) -> Result<&'a str> {
    names
        .get(&category)
        .and_then(|lookup| lookup.get(&key(catalog, name)))
        .map(String::as_str)
        .ok_or_else(|| ResolveError::TranslationNotFound {
            category,
            catalog: catalog.to_string(),
            name: name.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ReleaseChannel, RelationKind};

    fn table() -> NamingTable {
        let mut table = NamingTable::new();
        table.insert(
            NamingCategory::ReleaseChannels,
            HashMap::from([
                (
                    "release".to_string(),
                    HashMap::from([
                        ("modrinth".to_string(), "release".to_string()),
                        ("curseforge".to_string(), "1".to_string()),
                    ]),
                ),
                (
                    "beta".to_string(),
                    HashMap::from([("curseforge".to_string(), "2".to_string())]),
                ),
            ]),
        );
        table.insert(
            NamingCategory::RelationTypes,
            HashMap::from([(
                "required_dependency".to_string(),
                HashMap::from([("modrinth".to_string(), "required".to_string())]),
            )]),
        );
        table
    }

    #[test]
    fn test_translates_both_directions() {
        let translator = NamingTranslator::new(&table()).unwrap();
        assert_eq!(
            translator
                .to_common(NamingCategory::ReleaseChannels, "curseforge", "2")
                .unwrap(),
            "beta"
        );
        assert_eq!(
            translator
                .to_specific(NamingCategory::ReleaseChannels, "curseforge", "release")
                .unwrap(),
            "1"
        );
    }

    #[test]
    fn test_lookup_ignores_case() {
        let translator = NamingTranslator::new(&table()).unwrap();
        let channel: ReleaseChannel = translator
            .parse_common(NamingCategory::ReleaseChannels, "Modrinth", "RELEASE")
            .unwrap();
        assert_eq!(channel, ReleaseChannel::Release);

        let kind: RelationKind = translator
            .parse_common(NamingCategory::RelationTypes, "modrinth", "Required")
            .unwrap();
        assert_eq!(kind, RelationKind::RequiredDependency);
    }

    #[test]
    fn test_missing_translation_fails() {
        let translator = NamingTranslator::new(&table()).unwrap();
        let err = translator
            .to_common(NamingCategory::Platforms, "modrinth", "fabric")
            .unwrap_err();
        assert!(matches!(
            err,
            ResolveError::TranslationNotFound {
                category: NamingCategory::Platforms,
                ..
            }
        ));
    }

    #[test]
    fn test_conflicting_table_is_rejected() {
        let mut table = NamingTable::new();
        table.insert(
            NamingCategory::Platforms,
            HashMap::from([
                (
                    "fabric".to_string(),
                    HashMap::from([("modrinth".to_string(), "fabric".to_string())]),
                ),
                (
                    "quilt".to_string(),
                    HashMap::from([("modrinth".to_string(), "Fabric".to_string())]),
                ),
            ]),
        );
        assert!(NamingTranslator::new(&table).is_err());
    }
}

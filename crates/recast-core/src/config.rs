//! Engine configuration with source precedence.
//!
//! Values are resolved from, lowest to highest precedence:
//! 1. Built-in defaults
//! 2. Project config (`recast.json` in the workspace root)
//! 3. Environment variables (`RECAST_*`)
//! 4. CLI flags
//!
//! Each resolved value remembers where it came from.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Name of the project config file looked up in the workspace root.
pub const PROJECT_CONFIG_FILE: &str = "recast.json";

pub const ENV_SEARCH_COMMENTS: &str = "RECAST_SEARCH_COMMENTS";
pub const ENV_LOCK_TIMEOUT_MS: &str = "RECAST_LOCK_TIMEOUT_MS";
pub const ENV_CASE_INSENSITIVE: &str = "RECAST_CASE_INSENSITIVE";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid value '{value}' for {var}")]
    InvalidEnv { var: String, value: String },
}

pub type ConfigResult<T> = Result<T, ConfigError>;

// ============================================================================
// Configuration Sources
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigSource {
    Default = 0,
    ProjectConfig = 1,
    EnvVar = 2,
    /// Highest precedence.
    CliFlag = 3,
}

/// A configuration value with its source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigValue<T> {
    pub value: T,
    pub source: ConfigSource,
}

impl<T> ConfigValue<T> {
    pub fn new(value: T, source: ConfigSource) -> Self {
        ConfigValue { value, source }
    }

    /// Keep whichever value has the higher precedence; ties go to `other`.
    pub fn merge(self, other: Self) -> Self {
        if other.source >= self.source {
            other
        } else {
            self
        }
    }
}

// ============================================================================
// Collection Semantics
// ============================================================================

/// Effect of calling a method on a value-collection receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MethodEffect {
    Read,
    Write,
    ReadWrite,
}

/// Table mapping collection methods to their effect on the receiver.
///
/// A call on a declaration whose declared type is one of
/// `collection_types` is classified by method name; names absent from all
/// three tables leave the usage unclassified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionSemantics {
    pub collection_types: BTreeSet<String>,
    pub read: BTreeSet<String>,
    pub write: BTreeSet<String>,
    pub read_write: BTreeSet<String>,
}

fn set(items: &[&str]) -> BTreeSet<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl Default for CollectionSemantics {
    fn default() -> Self {
        CollectionSemantics {
            collection_types: set(&[
                "ArrayDeque",
                "ArrayList",
                "Collection",
                "Deque",
                "HashMap",
                "HashSet",
                "LinkedHashMap",
                "LinkedHashSet",
                "LinkedList",
                "List",
                "Map",
                "NavigableMap",
                "NavigableSet",
                "Queue",
                "Set",
                "SortedMap",
                "SortedSet",
                "Stack",
                "TreeMap",
                "TreeSet",
                "Vector",
            ]),
            read: set(&[
                "ceilingKey",
                "contains",
                "containsAll",
                "containsKey",
                "containsValue",
                "entrySet",
                "first",
                "firstKey",
                "floorKey",
                "get",
                "getOrDefault",
                "headMap",
                "headSet",
                "indexOf",
                "isEmpty",
                "iterator",
                "keySet",
                "last",
                "lastIndexOf",
                "lastKey",
                "peek",
                "size",
                "stream",
                "subList",
                "subMap",
                "tailMap",
                "tailSet",
                "toArray",
                "values",
            ]),
            write: set(&[
                "add",
                "addAll",
                "addFirst",
                "addLast",
                "clear",
                "push",
                "putAll",
                "remove",
                "removeAll",
                "removeIf",
                "retainAll",
                "sort",
            ]),
            read_write: set(&[
                "compute",
                "computeIfAbsent",
                "computeIfPresent",
                "merge",
                "offer",
                "poll",
                "pollFirst",
                "pollLast",
                "pop",
                "put",
                "putIfAbsent",
                "replace",
                "set",
            ]),
        }
    }
}

impl CollectionSemantics {
    /// Whether `type_name` (simple or qualified) is a value-collection type.
    pub fn is_collection_type(&self, type_name: &str) -> bool {
        let simple = type_name.rsplit('.').next().unwrap_or(type_name);
        self.collection_types.contains(simple)
    }

    pub fn classify(&self, method: &str) -> Option<MethodEffect> {
        if self.read_write.contains(method) {
            Some(MethodEffect::ReadWrite)
        } else if self.write.contains(method) {
            Some(MethodEffect::Write)
        } else if self.read.contains(method) {
            Some(MethodEffect::Read)
        } else {
            None
        }
    }

    /// Layer project additions on top of this table. A method listed in
    /// the patch moves to the patched category.
    fn apply(&mut self, patch: &CollectionPatch) {
        self.collection_types
            .extend(patch.collection_types.iter().cloned());
        let moves = [
            (&patch.read, MethodEffect::Read),
            (&patch.write, MethodEffect::Write),
            (&patch.read_write, MethodEffect::ReadWrite),
        ];
        for (methods, effect) in moves {
            for method in methods {
                self.read.remove(method);
                self.write.remove(method);
                self.read_write.remove(method);
                let target = match effect {
                    MethodEffect::Read => &mut self.read,
                    MethodEffect::Write => &mut self.write,
                    MethodEffect::ReadWrite => &mut self.read_write,
                };
                target.insert(method.clone());
            }
        }
    }
}

// ============================================================================
// Project Config File
// ============================================================================

/// Additions to the collection table from the project file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CollectionPatch {
    pub collection_types: Vec<String>,
    pub read: Vec<String>,
    pub write: Vec<String>,
    pub read_write: Vec<String>,
}

/// Contents of `recast.json`. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProjectConfig {
    pub search_comments: Option<bool>,
    pub lock_timeout_ms: Option<u64>,
    pub case_insensitive: Option<bool>,
    pub implicit_packages: Option<Vec<String>>,
    pub collections: Option<CollectionPatch>,
}

impl ProjectConfig {
    /// Load `recast.json` from `workspace_root`, if present.
    pub fn load(workspace_root: &Path) -> ConfigResult<Option<Self>> {
        let path = workspace_root.join(PROJECT_CONFIG_FILE);
        if !path.exists() {
            return Ok(None);
        }
        let text = fs::read_to_string(&path).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;
        let config = serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.clone(),
            source,
        })?;
        debug!(path = %path.display(), "loaded project config");
        Ok(Some(config))
    }
}

/// Values supplied on the command line.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub search_comments: Option<bool>,
    pub lock_timeout_ms: Option<u64>,
    pub case_insensitive: Option<bool>,
}

// ============================================================================
// Resolved Engine Config
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Default for comment search in usage queries and safe delete.
    pub search_comments: ConfigValue<bool>,
    /// How long a commit waits for file locks held by another session.
    pub lock_timeout_ms: ConfigValue<u64>,
    /// Forces the store's case sensitivity when set.
    pub case_insensitive: Option<ConfigValue<bool>>,
    /// Packages whose types are visible without an import.
    pub implicit_packages: ConfigValue<Vec<String>>,
    pub collections: ConfigValue<CollectionSemantics>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            search_comments: ConfigValue::new(false, ConfigSource::Default),
            lock_timeout_ms: ConfigValue::new(5_000, ConfigSource::Default),
            case_insensitive: None,
            implicit_packages: ConfigValue::new(
                vec!["java.lang".to_string()],
                ConfigSource::Default,
            ),
            collections: ConfigValue::new(CollectionSemantics::default(), ConfigSource::Default),
        }
    }
}

impl EngineConfig {
    /// Resolve from the workspace's project file, the process environment
    /// and CLI overrides.
    pub fn resolve(workspace_root: Option<&Path>, cli: &CliOverrides) -> ConfigResult<Self> {
        let project = match workspace_root {
            Some(root) => ProjectConfig::load(root)?,
            None => None,
        };
        Self::resolve_with(project.as_ref(), |var| std::env::var(var).ok(), cli)
    }

    /// Resolve from explicit sources; `env` looks up environment variables.
    pub fn resolve_with(
        project: Option<&ProjectConfig>,
        env: impl Fn(&str) -> Option<String>,
        cli: &CliOverrides,
    ) -> ConfigResult<Self> {
        let mut config = EngineConfig::default();
        if let Some(project) = project {
            config.apply_project_config(project);
        }
        config.apply_env_vars(env)?;
        config.apply_cli_overrides(cli);
        Ok(config)
    }

    fn apply_project_config(&mut self, project: &ProjectConfig) {
        let source = ConfigSource::ProjectConfig;
        if let Some(v) = project.search_comments {
            self.search_comments = self.search_comments.clone().merge(ConfigValue::new(v, source));
        }
        if let Some(v) = project.lock_timeout_ms {
            self.lock_timeout_ms = self.lock_timeout_ms.clone().merge(ConfigValue::new(v, source));
        }
        if let Some(v) = project.case_insensitive {
            self.case_insensitive = Some(ConfigValue::new(v, source));
        }
        if let Some(packages) = &project.implicit_packages {
            self.implicit_packages = ConfigValue::new(packages.clone(), source);
        }
        if let Some(patch) = &project.collections {
            let mut table = self.collections.value.clone();
            table.apply(patch);
            self.collections = ConfigValue::new(table, source);
        }
    }

    fn apply_env_vars(&mut self, env: impl Fn(&str) -> Option<String>) -> ConfigResult<()> {
        let source = ConfigSource::EnvVar;
        if let Some(raw) = env(ENV_SEARCH_COMMENTS) {
            let v = parse_bool(ENV_SEARCH_COMMENTS, &raw)?;
            self.search_comments = self.search_comments.clone().merge(ConfigValue::new(v, source));
        }
        if let Some(raw) = env(ENV_LOCK_TIMEOUT_MS) {
            let v = raw.trim().parse().map_err(|_| ConfigError::InvalidEnv {
                var: ENV_LOCK_TIMEOUT_MS.to_string(),
                value: raw.clone(),
            })?;
            self.lock_timeout_ms = self.lock_timeout_ms.clone().merge(ConfigValue::new(v, source));
        }
        if let Some(raw) = env(ENV_CASE_INSENSITIVE) {
            let v = parse_bool(ENV_CASE_INSENSITIVE, &raw)?;
            self.case_insensitive = Some(ConfigValue::new(v, source));
        }
        Ok(())
    }

    fn apply_cli_overrides(&mut self, cli: &CliOverrides) {
        let source = ConfigSource::CliFlag;
        if let Some(v) = cli.search_comments {
            self.search_comments = ConfigValue::new(v, source);
        }
        if let Some(v) = cli.lock_timeout_ms {
            self.lock_timeout_ms = ConfigValue::new(v, source);
        }
        if let Some(v) = cli.case_insensitive {
            self.case_insensitive = Some(ConfigValue::new(v, source));
        }
    }

    pub fn search_comments(&self) -> bool {
        self.search_comments.value
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms.value)
    }

    pub fn collections(&self) -> &CollectionSemantics {
        &self.collections.value
    }

    pub fn is_implicit_package(&self, package: &str) -> bool {
        self.implicit_packages.value.iter().any(|p| p == package)
    }

    /// Case sensitivity to use for a store that reports `store_default`.
    pub fn case_insensitive_or(&self, store_default: bool) -> bool {
        self.case_insensitive
            .as_ref()
            .map(|v| v.value)
            .unwrap_or(store_default)
    }
}

fn parse_bool(var: &str, raw: &str) -> ConfigResult<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidEnv {
            var: var.to_string(),
            value: raw.to_string(),
        }),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    mod precedence_tests {
        use super::*;

        #[test]
        fn defaults_when_no_sources() {
            let config =
                EngineConfig::resolve_with(None, env_of(&[]), &CliOverrides::default()).unwrap();
            assert!(!config.search_comments());
            assert_eq!(config.search_comments.source, ConfigSource::Default);
            assert_eq!(config.lock_timeout(), Duration::from_millis(5_000));
            assert!(config.is_implicit_package("java.lang"));
        }

        #[test]
        fn env_beats_project_and_cli_beats_env() {
            let project = ProjectConfig {
                search_comments: Some(true),
                lock_timeout_ms: Some(100),
                ..ProjectConfig::default()
            };
            let env = env_of(&[(ENV_LOCK_TIMEOUT_MS, "200")]);
            let cli = CliOverrides {
                search_comments: Some(false),
                ..CliOverrides::default()
            };
            let config = EngineConfig::resolve_with(Some(&project), env, &cli).unwrap();
            assert!(!config.search_comments());
            assert_eq!(config.search_comments.source, ConfigSource::CliFlag);
            assert_eq!(config.lock_timeout_ms.value, 200);
            assert_eq!(config.lock_timeout_ms.source, ConfigSource::EnvVar);
        }

        #[test]
        fn invalid_env_value_is_an_error() {
            let err = EngineConfig::resolve_with(
                None,
                env_of(&[(ENV_SEARCH_COMMENTS, "maybe")]),
                &CliOverrides::default(),
            )
            .unwrap_err();
            assert!(matches!(err, ConfigError::InvalidEnv { .. }));
        }

        #[test]
        fn merge_prefers_higher_source() {
            let low = ConfigValue::new(1, ConfigSource::ProjectConfig);
            let high = ConfigValue::new(2, ConfigSource::CliFlag);
            assert_eq!(low.clone().merge(high.clone()).value, 2);
            assert_eq!(high.merge(low).value, 2);
        }
    }

    mod collection_tests {
        use super::*;

        #[test]
        fn default_table_classifies_map_methods() {
            let table = CollectionSemantics::default();
            assert_eq!(table.classify("put"), Some(MethodEffect::ReadWrite));
            assert_eq!(table.classify("firstKey"), Some(MethodEffect::Read));
            assert_eq!(table.classify("remove"), Some(MethodEffect::Write));
            assert_eq!(table.classify("equals"), None);
            assert!(table.is_collection_type("java.util.TreeMap"));
            assert!(!table.is_collection_type("String"));
        }

        #[test]
        fn project_patch_moves_methods_between_categories() {
            let project = ProjectConfig {
                collections: Some(CollectionPatch {
                    collection_types: vec!["Bag".to_string()],
                    read: vec!["remove".to_string()],
                    ..CollectionPatch::default()
                }),
                ..ProjectConfig::default()
            };
            let config =
                EngineConfig::resolve_with(Some(&project), env_of(&[]), &CliOverrides::default())
                    .unwrap();
            assert_eq!(config.collections().classify("remove"), Some(MethodEffect::Read));
            assert!(config.collections().is_collection_type("Bag"));
            assert_eq!(config.collections.source, ConfigSource::ProjectConfig);
        }

        #[test]
        fn project_file_is_loaded_from_workspace_root() {
            let dir = tempfile::TempDir::new().unwrap();
            fs::write(
                dir.path().join(PROJECT_CONFIG_FILE),
                r#"{ "search_comments": true, "lock_timeout_ms": 42 }"#,
            )
            .unwrap();
            let project = ProjectConfig::load(dir.path()).unwrap().unwrap();
            assert_eq!(project.search_comments, Some(true));
            assert_eq!(project.lock_timeout_ms, Some(42));
        }

        #[test]
        fn unknown_project_keys_are_rejected() {
            let dir = tempfile::TempDir::new().unwrap();
            fs::write(dir.path().join(PROJECT_CONFIG_FILE), r#"{ "bogus": 1 }"#).unwrap();
            assert!(matches!(
                ProjectConfig::load(dir.path()),
                Err(ConfigError::Parse { .. })
            ));
        }
    }
}

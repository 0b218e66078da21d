//! Query configuration and path helpers.
//!
//! Uses Figment to merge `settings.toml` + `settings.<env>.toml` + `APP_*`
//! env vars (`__` separates nested keys, e.g. `APP_STORAGE__BASE_DIR`).
//! Path helpers expand `~` and `${VAR}`, resolve relative paths against a
//! base directory and resolve `${timestamp}` run directories.

use chrono::NaiveDateTime;
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Component, Path, PathBuf};

use crate::error::{Error, Result};

pub const TIMESTAMP_PLACEHOLDER: &str = "${timestamp}";
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d-%H%M%S";
pub const DEFAULT_QUERY_COLLECTION: &str = "entity_description_embeddings";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryConfig {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub embeddings: EmbeddingsConfig,
    #[serde(default)]
    pub global_search: GlobalSearchConfig,
    #[serde(default)]
    pub local_search: LocalSearchConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_base_dir")]
    pub base_dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { base_dir: default_base_dir() }
    }
}

fn default_base_dir() -> String {
    "output".to_string()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmbeddingsConfig {
    #[serde(default)]
    pub vector_store: Option<VectorStoreConfig>,
}

/// Raw vector store section; turned into per-call store settings by the binder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorStoreConfig {
    #[serde(rename = "type", default = "default_store_type")]
    pub store_type: String,
    #[serde(default)]
    pub collection_name: Option<String>,
    #[serde(default)]
    pub query_collection_name: Option<String>,
    #[serde(default)]
    pub db_uri: Option<String>,
    #[serde(default = "default_true")]
    pub overwrite: bool,
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            store_type: default_store_type(),
            collection_name: None,
            query_collection_name: None,
            db_uri: None,
            overwrite: true,
        }
    }
}

impl VectorStoreConfig {
    /// Collection queried for entity descriptions.
    pub fn query_collection(&self) -> &str {
        self.query_collection_name.as_deref().unwrap_or(DEFAULT_QUERY_COLLECTION)
    }
}

fn default_store_type() -> String {
    "lancedb".to_string()
}

fn default_true() -> bool {
    true
}

/// Parameters handed to the global (map/reduce over reports) engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalSearchConfig {
    pub max_tokens: usize,
    pub data_max_tokens: usize,
    pub map_max_tokens: usize,
    pub reduce_max_tokens: usize,
    pub concurrency: usize,
}

impl Default for GlobalSearchConfig {
    fn default() -> Self {
        Self {
            max_tokens: 12_000,
            data_max_tokens: 12_000,
            map_max_tokens: 1_000,
            reduce_max_tokens: 2_000,
            concurrency: 32,
        }
    }
}

/// Parameters handed to the local (entity neighbourhood) engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalSearchConfig {
    pub text_unit_prop: f32,
    pub community_prop: f32,
    pub conversation_history_max_turns: usize,
    pub top_k_entities: usize,
    pub top_k_relationships: usize,
    pub max_tokens: usize,
}

impl Default for LocalSearchConfig {
    fn default() -> Self {
        Self {
            text_unit_prop: 0.5,
            community_prop: 0.1,
            conversation_history_max_turns: 5,
            top_k_entities: 10,
            top_k_relationships: 10,
            max_tokens: 12_000,
        }
    }
}

impl QueryConfig {
    /// Loads settings from `root`, layering the `RUST_ENV` file and `APP_*` vars.
    pub fn load(root: &Path) -> Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());
        Self::figment(root, &env_name)
            .extract()
            .map_err(|e| Error::configuration(format!("Failed to load settings from {}: {}", root.display(), e)))
    }

    pub fn figment(root: &Path, env_name: &str) -> Figment {
        let mut figment = Figment::new().merge(Toml::file(root.join("settings.toml")));
        match env_name {
            "dev" | "development" => figment = figment.merge(Toml::file(root.join("settings.dev.toml"))),
            "prod" | "production" => figment = figment.merge(Toml::file(root.join("settings.prod.toml"))),
            "test" | "testing" => figment = figment.merge(Toml::file(root.join("settings.test.toml"))),
            _ => {}
        }
        figment.merge(Env::prefixed("APP_").split("__"))
    }

    pub fn vector_store(&self) -> VectorStoreConfig {
        self.embeddings.vector_store.clone().unwrap_or_default()
    }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables; unknown ones are kept
/// - Keeps the `${timestamp}` placeholder for `resolve_timestamp_path`
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env_with_context_no_errors(s, |var| match var {
        "timestamp" => Some(TIMESTAMP_PLACEHOLDER.to_string()),
        _ => env::var(var).ok(),
    });
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}

/// Resolve a possibly relative path against a given base directory after expansion.
/// If `p` is absolute, it's returned as-is; otherwise `base.join(p)` is returned.
pub fn resolve_with_base<S: AsRef<str>>(base: &Path, p: S) -> PathBuf {
    let p = expand_path(p);
    if p.is_absolute() { p } else { base.join(p) }
}

/// Replaces a `${timestamp}` path component with the newest run directory
/// next to it. Paths without the placeholder come back unchanged.
pub fn resolve_timestamp_path(path: &Path) -> Result<PathBuf> {
    let components: Vec<Component<'_>> = path.components().collect();
    let Some(pos) = components
        .iter()
        .position(|c| c.as_os_str() == TIMESTAMP_PLACEHOLDER)
    else {
        return Ok(path.to_path_buf());
    };

    let parent: PathBuf = components[..pos].iter().collect();
    let search_dir = if parent.as_os_str().is_empty() { PathBuf::from(".") } else { parent.clone() };
    let latest = walkdir::WalkDir::new(&search_dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_dir())
        .filter_map(|e| {
            let name = e.file_name().to_str()?.to_string();
            NaiveDateTime::parse_from_str(&name, TIMESTAMP_FORMAT).ok().map(|ts| (ts, name))
        })
        .max_by_key(|(ts, _)| *ts)
        .ok_or_else(|| {
            Error::configuration(format!(
                "no timestamped run directory found in {} to resolve {}",
                search_dir.display(),
                path.display()
            ))
        })?;

    let mut resolved = parent.join(latest.1);
    for c in &components[pos + 1..] {
        resolved.push(c.as_os_str());
    }
    Ok(resolved)
}

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::pipeline::suggestion::MergePolicy;

/// Application-level constants
pub const APP_NAME: &str = "PolicyVault";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prefix for every environment variable read by [`AppConfig::from_env`].
const ENV_PREFIX: &str = "POLICYVAULT_";

/// Default tracing filter when `RUST_LOG` is unset.
pub fn default_log_filter() -> &'static str {
    "info,policyvault_lib=debug,tower_http=info"
}

/// Get the application data directory.
/// `~/PolicyVault/` unless overridden by `POLICYVAULT_DATA_DIR`.
pub fn app_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(APP_NAME)
}

/// SQLite database file inside a data directory.
pub fn database_path(data_dir: &std::path::Path) -> PathBuf {
    data_dir.join("database").join("policyvault.db")
}

/// Directory holding content-addressed version blobs.
pub fn content_dir(data_dir: &std::path::Path) -> PathBuf {
    data_dir.join("content")
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
}

/// Runtime configuration, assembled from defaults and `POLICYVAULT_*` variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    pub bind_addr: SocketAddr,
    pub ollama_url: String,
    pub completion_model: String,
    pub embedding_model: String,
    pub upstream_timeout: Duration,
    /// Attempts per indexing run before the document is marked failed.
    pub index_max_attempts: u32,
    pub index_initial_backoff: Duration,
    pub index_workers: usize,
    /// Documents processed concurrently by a batch suggestion run (1 = sequential).
    pub batch_concurrency: usize,
    /// Maximum characters of document text embedded in a suggestion prompt.
    pub max_prompt_chars: usize,
    pub merge_policy: MergePolicy,
    pub search_max_top_k: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: app_data_dir(),
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8420)),
            ollama_url: "http://localhost:11434".to_string(),
            completion_model: "llama3.1:8b".to_string(),
            embedding_model: "nomic-embed-text".to_string(),
            upstream_timeout: Duration::from_secs(120),
            index_max_attempts: 3,
            index_initial_backoff: Duration::from_millis(500),
            index_workers: 2,
            batch_concurrency: 1,
            max_prompt_chars: 12_000,
            merge_policy: MergePolicy::PreserveHumanEdits,
            search_max_top_k: 50,
        }
    }
}

impl AppConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup (env-like).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(&format!("{ENV_PREFIX}{name}"));
        let mut config = Self::default();

        if let Some(dir) = get("DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        if let Some(addr) = get("BIND_ADDR") {
            config.bind_addr = parse_value("BIND_ADDR", &addr)?;
        }
        if let Some(url) = get("OLLAMA_URL") {
            config.ollama_url = url;
        }
        if let Some(model) = get("COMPLETION_MODEL") {
            config.completion_model = model;
        }
        if let Some(model) = get("EMBEDDING_MODEL") {
            config.embedding_model = model;
        }
        if let Some(secs) = get("UPSTREAM_TIMEOUT_SECS") {
            config.upstream_timeout = Duration::from_secs(parse_value("UPSTREAM_TIMEOUT_SECS", &secs)?);
        }
        if let Some(n) = get("INDEX_MAX_ATTEMPTS") {
            config.index_max_attempts = parse_value::<u32>("INDEX_MAX_ATTEMPTS", &n)?.max(1);
        }
        if let Some(ms) = get("INDEX_BACKOFF_MS") {
            config.index_initial_backoff = Duration::from_millis(parse_value("INDEX_BACKOFF_MS", &ms)?);
        }
        if let Some(n) = get("INDEX_WORKERS") {
            config.index_workers = parse_value::<usize>("INDEX_WORKERS", &n)?.max(1);
        }
        if let Some(n) = get("BATCH_CONCURRENCY") {
            config.batch_concurrency = parse_value::<usize>("BATCH_CONCURRENCY", &n)?.max(1);
        }
        if let Some(n) = get("MAX_PROMPT_CHARS") {
            config.max_prompt_chars = parse_value("MAX_PROMPT_CHARS", &n)?;
        }
        if let Some(policy) = get("MERGE_POLICY") {
            config.merge_policy = parse_value("MERGE_POLICY", &policy)?;
        }
        if let Some(n) = get("SEARCH_MAX_TOP_K") {
            config.search_max_top_k = parse_value::<usize>("SEARCH_MAX_TOP_K", &n)?.max(1);
        }

        Ok(config)
    }
}

fn parse_value<T: FromStr>(key: &str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: format!("{ENV_PREFIX}{key}"),
        value: raw.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn app_data_dir_ends_with_app_name() {
        assert!(app_data_dir().ends_with("PolicyVault"));
    }

    #[test]
    fn database_and_content_live_under_data_dir() {
        let root = PathBuf::from("/tmp/pv");
        assert!(database_path(&root).starts_with(&root));
        assert!(content_dir(&root).ends_with("content"));
    }

    #[test]
    fn defaults_without_env() {
        let config = AppConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config.index_max_attempts, 3);
        assert_eq!(config.batch_concurrency, 1);
        assert_eq!(config.merge_policy, MergePolicy::PreserveHumanEdits);
    }

    #[test]
    fn env_overrides_are_applied() {
        let config = AppConfig::from_lookup(lookup_from(&[
            ("POLICYVAULT_BIND_ADDR", "0.0.0.0:9000"),
            ("POLICYVAULT_INDEX_MAX_ATTEMPTS", "5"),
            ("POLICYVAULT_BATCH_CONCURRENCY", "4"),
            ("POLICYVAULT_MERGE_POLICY", "overwrite"),
            ("POLICYVAULT_UPSTREAM_TIMEOUT_SECS", "30"),
        ]))
        .unwrap();
        assert_eq!(config.bind_addr.port(), 9000);
        assert_eq!(config.index_max_attempts, 5);
        assert_eq!(config.batch_concurrency, 4);
        assert_eq!(config.merge_policy, MergePolicy::Overwrite);
        assert_eq!(config.upstream_timeout, Duration::from_secs(30));
    }

    #[test]
    fn zero_workers_clamped_to_one() {
        let config =
            AppConfig::from_lookup(lookup_from(&[("POLICYVAULT_INDEX_WORKERS", "0")])).unwrap();
        assert_eq!(config.index_workers, 1);
    }

    #[test]
    fn invalid_value_is_reported() {
        let err = AppConfig::from_lookup(lookup_from(&[("POLICYVAULT_INDEX_WORKERS", "many")]))
            .unwrap_err();
        assert!(err.to_string().contains("POLICYVAULT_INDEX_WORKERS"));
    }
}

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub store: StoreConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub training: TrainingConfig,
    pub server: ServerConfig,
    #[serde(default)]
    pub recommend: RecommendConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    /// Base URL of the recommendation store service.
    pub url: String,
    #[serde(default = "default_collection")]
    pub collection: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Environment variable holding the store API key. When set, the key is
    /// sent as `X-Api-Key` on every request.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
}

fn default_collection() -> String {
    "magic_the_gathering_cards".to_string()
}
fn default_timeout_secs() -> u64 {
    300
}
fn default_api_key_env() -> String {
    "SEER_API_KEY".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct CatalogConfig {
    #[serde(default = "default_catalog_path")]
    pub path: PathBuf,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            path: default_catalog_path(),
        }
    }
}

fn default_catalog_path() -> PathBuf {
    PathBuf::from("./dataset/all_cards.jsonl")
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Processed-record count at which training is triggered. Absent means
    /// the run never trains; use `seer train` separately.
    #[serde(default)]
    pub training_watermark: Option<u64>,
    /// Records at or below this count are parsed but not persisted, so a
    /// re-run can skip records already stored while still advancing the
    /// processed counter.
    #[serde(default)]
    pub start_offset: i64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            training_watermark: None,
            start_offset: 0,
        }
    }
}

fn default_batch_size() -> usize {
    1000
}

#[derive(Debug, Deserialize, Clone)]
pub struct TrainingConfig {
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
        }
    }
}

fn default_poll_interval_secs() -> u64 {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RecommendConfig {
    /// How many of the user's most recent interactions feed user-based
    /// recommendations. Older interactions are not considered.
    #[serde(default = "default_user_history_limit")]
    pub user_history_limit: usize,
    /// Upper bound on the superset fetched for color-filtered listing pages.
    #[serde(default = "default_filtered_scan_limit")]
    pub filtered_scan_limit: u64,
}

impl Default for RecommendConfig {
    fn default() -> Self {
        Self {
            user_history_limit: default_user_history_limit(),
            filtered_scan_limit: default_filtered_scan_limit(),
        }
    }
}

fn default_user_history_limit() -> usize {
    100
}
fn default_filtered_scan_limit() -> u64 {
    2000
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.store.url.trim().is_empty() {
        anyhow::bail!("store.url must not be empty");
    }

    if config.ingest.batch_size == 0 {
        anyhow::bail!("ingest.batch_size must be > 0");
    }

    if config.training.poll_interval_secs == 0 {
        anyhow::bail!("training.poll_interval_secs must be > 0");
    }

    if config.recommend.filtered_scan_limit == 0 {
        anyhow::bail!("recommend.filtered_scan_limit must be > 0");
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(content: &str) -> (tempfile::TempDir, PathBuf) {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("seer.toml");
        std::fs::write(&path, content).unwrap();
        (tmp, path)
    }

    #[test]
    fn minimal_config_fills_defaults() {
        let (_tmp, path) = write_config(
            r#"
[store]
url = "http://localhost:8080"

[server]
bind = "127.0.0.1:7878"
"#,
        );
        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.store.collection, "magic_the_gathering_cards");
        assert_eq!(cfg.ingest.batch_size, 1000);
        assert_eq!(cfg.ingest.training_watermark, None);
        assert_eq!(cfg.training.poll_interval_secs, 10);
        assert_eq!(cfg.recommend.user_history_limit, 100);
        assert_eq!(cfg.recommend.filtered_scan_limit, 2000);
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        let (_tmp, path) = write_config(
            r#"
[store]
url = "http://localhost:8080"

[ingest]
batch_size = 0

[server]
bind = "127.0.0.1:7878"
"#,
        );
        assert!(load_config(&path).is_err());
    }

    #[test]
    fn empty_store_url_is_rejected() {
        let (_tmp, path) = write_config(
            r#"
[store]
url = ""

[server]
bind = "127.0.0.1:7878"
"#,
        );
        assert!(load_config(&path).is_err());
    }
}

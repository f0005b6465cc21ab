use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

#[derive(Debug, Deserialize)]
pub struct Config {
    pub general: General,
    pub wallet: Wallet,
    pub storage: Storage,
    pub rpc: RpcSettings,
    pub analysis: Analysis,
    #[serde(default)]
    pub observability: Observability,
}

#[derive(Debug, Deserialize)]
pub struct General {
    pub log_level: String,
}

#[derive(Debug, Deserialize)]
pub struct Wallet {
    pub address: String,
    pub prefix: Option<String>,
}

impl Wallet {
    /// Short tag used to name every file produced for this wallet.
    pub fn prefix(&self) -> String {
        match &self.prefix {
            Some(p) => p.clone(),
            None => self.address.chars().take(6).collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct Storage {
    pub data_dir: PathBuf,
}

impl Storage {
    pub fn raw_transactions_path(&self, prefix: &str) -> PathBuf {
        self.output_path(prefix, "transactions.json")
    }

    pub fn normalized_path(&self, prefix: &str) -> PathBuf {
        self.output_path(prefix, "normalized.csv")
    }

    pub fn output_path(&self, prefix: &str, name: &str) -> PathBuf {
        self.data_dir.join(format!("{prefix}_{name}"))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RpcSettings {
    pub url: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub backoff_min_ms: u64,
    pub backoff_max_ms: u64,
    pub page_delay_ms: u64,
    pub max_pages: u32,
    pub per_page: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Analysis {
    pub top_n: usize,
    pub n_clusters: usize,
    pub cluster_seed: u64,
    pub cluster_n_init: u32,
    pub cluster_max_iter: u32,
    pub retention_max_days: u32,
}

#[derive(Debug, Default, Deserialize)]
pub struct Observability {
    pub prometheus_port: Option<u16>,
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::from_toml_str(&content).with_context(|| format!("invalid config {}", path.display()))
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(self.analysis.top_n > 0, "analysis.top_n must be positive");
        anyhow::ensure!(
            self.analysis.n_clusters > 0,
            "analysis.n_clusters must be positive"
        );
        anyhow::ensure!(
            self.analysis.cluster_n_init > 0,
            "analysis.cluster_n_init must be positive"
        );
        anyhow::ensure!(
            (1..=1000).contains(&self.rpc.per_page),
            "rpc.per_page must be within 1..=1000, got {}",
            self.rpc.per_page
        );
        anyhow::ensure!(self.rpc.max_retries > 0, "rpc.max_retries must be positive");
        anyhow::ensure!(
            self.rpc.backoff_min_ms <= self.rpc.backoff_max_ms,
            "rpc.backoff_min_ms ({}) exceeds rpc.backoff_max_ms ({})",
            self.rpc.backoff_min_ms,
            self.rpc.backoff_max_ms
        );
        Ok(())
    }
}

impl FromStr for Config {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::from_toml_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
[general]
log_level = "debug"

[wallet]
address = "So11111111111111111111111111111111111111112"

[storage]
data_dir = "out"

[rpc]
url = "http://localhost:8899"
timeout_secs = 5
max_retries = 2
backoff_min_ms = 10
backoff_max_ms = 20
page_delay_ms = 0
max_pages = 1
per_page = 10

[analysis]
top_n = 5
n_clusters = 2
cluster_seed = 7
cluster_n_init = 1
cluster_max_iter = 50
retention_max_days = 3
"#;

    #[test]
    fn test_load_default_config() {
        let config = Config::from_toml_str(include_str!("../../../config/default.toml")).unwrap();
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.analysis.top_n, 10);
        assert_eq!(config.analysis.n_clusters, 3);
        assert_eq!(config.rpc.max_retries, 3);
        assert_eq!(config.wallet.prefix(), "MJKqp3");
        assert!(config.observability.prometheus_port.is_none());
    }

    #[test]
    fn test_observability_section_optional() {
        let config = Config::from_toml_str(MINIMAL).unwrap();
        assert!(config.observability.prometheus_port.is_none());
        assert_eq!(config.wallet.prefix(), "So1111");
    }

    #[test]
    fn test_explicit_prefix_wins() {
        let toml = MINIMAL.replace(
            "address = \"So11111111111111111111111111111111111111112\"",
            "address = \"So11111111111111111111111111111111111111112\"\nprefix = \"wsol\"",
        );
        let config = Config::from_toml_str(&toml).unwrap();
        assert_eq!(config.wallet.prefix(), "wsol");
    }

    #[test]
    fn test_storage_paths_use_prefix() {
        let config = Config::from_toml_str(MINIMAL).unwrap();
        let prefix = config.wallet.prefix();
        assert_eq!(
            config.storage.normalized_path(&prefix),
            PathBuf::from("out/So1111_normalized.csv")
        );
        assert_eq!(
            config.storage.raw_transactions_path(&prefix),
            PathBuf::from("out/So1111_transactions.json")
        );
    }

    #[test]
    fn test_rejects_zero_top_n() {
        let toml = MINIMAL.replace("top_n = 5", "top_n = 0");
        let err = Config::from_toml_str(&toml).unwrap_err();
        assert!(err.to_string().contains("top_n"));
    }

    #[test]
    fn test_rejects_inverted_backoff_window() {
        let toml = MINIMAL.replace("backoff_min_ms = 10", "backoff_min_ms = 50");
        assert!(Config::from_toml_str(&toml).is_err());
    }

    #[test]
    fn test_from_str() {
        let config: Config = MINIMAL.parse().unwrap();
        assert_eq!(config.analysis.retention_max_days, 3);
    }
}

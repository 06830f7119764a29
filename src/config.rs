//! TOML configuration parsing.
//!
//! The configuration is read once at startup and passed explicitly to every
//! component. The API credential may be given inline or through a named
//! environment variable; either way it is resolved here, and its presence is
//! enforced when the client is constructed, so `kbsync status` can still
//! report an unconfigured source.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub api: Option<ApiConfig>,
    #[serde(default)]
    pub vault: Option<VaultConfig>,
    #[serde(default)]
    pub sync: SyncConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ApiConfig {
    #[serde(default)]
    pub endpoint: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl ApiConfig {
    /// Build an API config from explicit values.
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: Some(api_key.into()),
            api_key_env: None,
            timeout_secs: default_timeout_secs(),
        }
    }

    /// The credential, if one is configured and non-empty.
    pub fn resolved_key(&self) -> Option<String> {
        self.api_key.clone().filter(|k| !k.trim().is_empty())
    }

    pub fn is_configured(&self) -> bool {
        !self.endpoint.trim().is_empty() && self.resolved_key().is_some()
    }
}

fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct VaultConfig {
    pub root: PathBuf,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
}

fn default_include_globs() -> Vec<String> {
    vec!["**/*.md".to_string(), "**/*.txt".to_string()]
}

#[derive(Debug, Deserialize, Clone)]
pub struct SyncConfig {
    #[serde(default = "default_limit")]
    pub default_limit: usize,
    /// Seconds after which an unfinished run no longer blocks a new run for
    /// the same source.
    #[serde(default = "default_run_lease_secs")]
    pub run_lease_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            default_limit: default_limit(),
            run_lease_secs: default_run_lease_secs(),
        }
    }
}

fn default_limit() -> usize {
    100
}

fn default_run_lease_secs() -> u64 {
    3600
}

impl Config {
    /// A config with only a database path; used by tests and tooling.
    pub fn with_db(path: impl Into<PathBuf>) -> Self {
        Self {
            db: DbConfig { path: path.into() },
            api: None,
            vault: None,
            sync: SyncConfig::default(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_config(&content)
}

pub fn parse_config(content: &str) -> Result<Config> {
    let mut config: Config =
        toml::from_str(content).with_context(|| "Failed to parse config file")?;

    if config.sync.default_limit == 0 {
        anyhow::bail!("sync.default_limit must be >= 1");
    }
    if config.sync.run_lease_secs == 0 {
        anyhow::bail!("sync.run_lease_secs must be >= 1");
    }

    if let Some(api) = config.api.as_mut() {
        if api.timeout_secs == 0 {
            anyhow::bail!("api.timeout_secs must be >= 1");
        }
        if api.api_key.is_none() {
            if let Some(var) = &api.api_key_env {
                api.api_key = std::env::var(var).ok();
            }
        }
    }

    if let Some(vault) = &config.vault {
        if vault.include_globs.is_empty() {
            anyhow::bail!("vault.include_globs must not be empty");
        }
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_gets_defaults() {
        let cfg = parse_config("[db]\npath = \"/tmp/kb.sqlite\"\n").unwrap();
        assert_eq!(cfg.sync.default_limit, 100);
        assert_eq!(cfg.sync.run_lease_secs, 3600);
        assert!(cfg.api.is_none());
        assert!(cfg.vault.is_none());
    }

    #[test]
    fn zero_run_lease_is_rejected() {
        let err = parse_config("[db]\npath = \"/tmp/kb.sqlite\"\n\n[sync]\nrun_lease_secs = 0\n")
            .unwrap_err();
        assert!(err.to_string().contains("run_lease_secs"));
    }

    #[test]
    fn api_section_without_key_is_not_configured() {
        let cfg = parse_config(
            r#"
[db]
path = "/tmp/kb.sqlite"

[api]
endpoint = "http://localhost:8000/api/v1"
"#,
        )
        .unwrap();
        let api = cfg.api.unwrap();
        assert_eq!(api.timeout_secs, 30);
        assert!(!api.is_configured());
    }

    #[test]
    fn key_is_read_from_named_env_var() {
        std::env::set_var("KBSYNC_TEST_KEY_FROM_ENV", "secret");
        let cfg = parse_config(
            r#"
[db]
path = "/tmp/kb.sqlite"

[api]
endpoint = "http://localhost:8000/api/v1"
api_key_env = "KBSYNC_TEST_KEY_FROM_ENV"
"#,
        )
        .unwrap();
        let api = cfg.api.unwrap();
        assert_eq!(api.resolved_key().as_deref(), Some("secret"));
        assert!(api.is_configured());
    }

    #[test]
    fn rejects_zero_limit() {
        let err = parse_config("[db]\npath = \"x\"\n[sync]\ndefault_limit = 0\n").unwrap_err();
        assert!(err.to_string().contains("default_limit"));
    }

    #[test]
    fn vault_globs_default_to_markdown_and_text() {
        let cfg = parse_config("[db]\npath = \"x\"\n[vault]\nroot = \"/v\"\n").unwrap();
        assert_eq!(
            cfg.vault.unwrap().include_globs,
            vec!["**/*.md".to_string(), "**/*.txt".to_string()]
        );
    }
}

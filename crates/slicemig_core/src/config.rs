use std::env;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::document::DEFAULT_SLICE_ZONE;

pub const DEFAULT_USER_AGENT: &str = "slicemig/0.1";
pub const DEFAULT_CDN_URL: &str = "https://{repo}.cdn.prismic.io/api/v2";
pub const DEFAULT_MIGRATION_URL: &str = "https://migration.prismic.io";
pub const DEFAULT_OUTPUT_DIR: &str = "updated_documents";
pub const DEFAULT_PUSH_DELAY_MS: u64 = 2_000;
pub const DEFAULT_HTTP_TIMEOUT_MS: u64 = 30_000;

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct SlicemigConfig {
    #[serde(default)]
    pub prismic: PrismicSection,
    #[serde(default)]
    pub migration: MigrationSection,
    #[serde(default)]
    pub push: PushSection,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct PrismicSection {
    pub repository: Option<String>,
    pub cdn_url: Option<String>,
    pub migration_url: Option<String>,
    pub api_key: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct MigrationSection {
    pub slice_zone: Option<String>,
    pub output_dir: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct PushSection {
    pub delay_ms: Option<u64>,
    pub timeout_ms: Option<u64>,
}

/// Effective settings after applying env > config file > default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSettings {
    pub repository: Option<String>,
    pub cdn_url: String,
    pub migration_url: String,
    pub api_key: Option<String>,
    pub write_token: Option<String>,
    pub user_agent: String,
    pub slice_zone: String,
    pub output_dir: String,
    pub push_delay_ms: u64,
    pub http_timeout_ms: u64,
}

impl SlicemigConfig {
    pub fn resolve(&self) -> ResolvedSettings {
        self.resolve_with_lookup(|key| env::var(key).ok())
    }

    pub fn resolve_with_lookup<F>(&self, lookup_env: F) -> ResolvedSettings
    where
        F: Fn(&str) -> Option<String>,
    {
        let text = |key: &str, configured: Option<&String>| -> Option<String> {
            non_empty(lookup_env(key)).or_else(|| non_empty(configured.cloned()))
        };
        let number = |key: &str, configured: Option<u64>, default: u64| -> u64 {
            lookup_env(key)
                .and_then(|value| value.trim().parse::<u64>().ok())
                .or(configured)
                .unwrap_or(default)
        };

        ResolvedSettings {
            repository: text("PRISMIC_REPOSITORY", self.prismic.repository.as_ref()),
            cdn_url: text("PRISMIC_CDN_URL", self.prismic.cdn_url.as_ref())
                .unwrap_or_else(|| DEFAULT_CDN_URL.to_string()),
            migration_url: text("PRISMIC_MIGRATION_URL", self.prismic.migration_url.as_ref())
                .unwrap_or_else(|| DEFAULT_MIGRATION_URL.to_string()),
            api_key: text("PRISMIC_MIGRATION_API_KEY", self.prismic.api_key.as_ref()),
            // Write tokens are never read from the config file.
            write_token: non_empty(lookup_env("PRISMIC_WRITE_TOKEN")),
            user_agent: text("PRISMIC_USER_AGENT", self.prismic.user_agent.as_ref())
                .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
            slice_zone: non_empty(self.migration.slice_zone.clone())
                .unwrap_or_else(|| DEFAULT_SLICE_ZONE.to_string()),
            output_dir: text("SLICEMIG_OUTPUT_DIR", self.migration.output_dir.as_ref())
                .unwrap_or_else(|| DEFAULT_OUTPUT_DIR.to_string()),
            push_delay_ms: number(
                "SLICEMIG_PUSH_DELAY_MS",
                self.push.delay_ms,
                DEFAULT_PUSH_DELAY_MS,
            ),
            http_timeout_ms: number(
                "SLICEMIG_HTTP_TIMEOUT_MS",
                self.push.timeout_ms,
                DEFAULT_HTTP_TIMEOUT_MS,
            ),
        }
    }
}

/// Load and parse a config file. Returns defaults if the file doesn't exist.
pub fn load_config(config_path: &Path) -> Result<SlicemigConfig> {
    if !config_path.exists() {
        return Ok(SlicemigConfig::default());
    }
    let content = fs::read_to_string(config_path)
        .with_context(|| format!("failed to read {}", config_path.display()))?;
    let parsed: SlicemigConfig = toml::from_str(&content)
        .with_context(|| format!("failed to parse {}", config_path.display()))?;
    Ok(parsed)
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

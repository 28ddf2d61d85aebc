use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub truncation: TruncationConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

/// Search backend connection settings.
///
/// `url` is optional on purpose: search is a non-critical enhancement, so a
/// deployment without a configured backend turns the whole subsystem into a
/// logged no-op instead of a crash.
#[derive(Debug, Deserialize, Clone)]
pub struct BackendConfig {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// Per-request timeout so one wedged call cannot hang a run.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Backend-imposed maximum documents per bulk request.
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: None,
            username: None,
            password: None,
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            max_batch_size: default_max_batch_size(),
        }
    }
}

impl BackendConfig {
    pub fn is_configured(&self) -> bool {
        self.url.is_some()
    }
}

fn default_timeout_secs() -> u64 {
    30
}
fn default_max_retries() -> u32 {
    3
}
fn default_max_batch_size() -> usize {
    1000
}

#[derive(Debug, Deserialize, Clone)]
pub struct SyncConfig {
    /// Primary-store rows fetched per page during a full sync.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Pause between pages, the throttle knob that keeps a full export from
    /// overloading the primary store.
    #[serde(default)]
    pub page_delay_ms: u64,
    /// Only sync entities published within this many days. Meant for
    /// cost-constrained non-production environments; leave unset in prod.
    #[serde(default)]
    pub window_days: Option<i64>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            page_delay_ms: 0,
            window_days: None,
        }
    }
}

fn default_batch_size() -> usize {
    200
}

/// Per-kind content truncation budgets, in characters.
///
/// The backend's ingestion limit is a byte limit; a character budget only
/// approximates it for non-ASCII content, so the budgets are explicit
/// config knobs rather than hidden constants.
#[derive(Debug, Deserialize, Clone)]
pub struct TruncationConfig {
    /// Posts are sharded per paragraph; each paragraph gets this budget.
    #[serde(default = "default_post_paragraph_chars")]
    pub post_paragraph_chars: usize,
    #[serde(default = "default_comment_chars")]
    pub comment_chars: usize,
    #[serde(default = "default_user_bio_chars")]
    pub user_bio_chars: usize,
    #[serde(default = "default_sequence_chars")]
    pub sequence_chars: usize,
    #[serde(default = "default_tag_description_chars")]
    pub tag_description_chars: usize,
}

impl Default for TruncationConfig {
    fn default() -> Self {
        Self {
            post_paragraph_chars: default_post_paragraph_chars(),
            comment_chars: default_comment_chars(),
            user_bio_chars: default_user_bio_chars(),
            sequence_chars: default_sequence_chars(),
            tag_description_chars: default_tag_description_chars(),
        }
    }
}

fn default_post_paragraph_chars() -> usize {
    2000
}
fn default_comment_chars() -> usize {
    2000
}
fn default_user_bio_chars() -> usize {
    3000
}
fn default_sequence_chars() -> usize {
    3000
}
fn default_tag_description_chars() -> usize {
    3000
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.sync.batch_size == 0 {
        anyhow::bail!("sync.batch_size must be > 0");
    }

    if config.backend.max_batch_size == 0 {
        anyhow::bail!("backend.max_batch_size must be > 0");
    }

    if config.backend.timeout_secs == 0 {
        anyhow::bail!("backend.timeout_secs must be > 0");
    }

    if let Some(days) = config.sync.window_days {
        if days <= 0 {
            anyhow::bail!("sync.window_days must be > 0 when set");
        }
    }

    let t = &config.truncation;
    if t.post_paragraph_chars == 0
        || t.comment_chars == 0
        || t.user_bio_chars == 0
        || t.sequence_chars == 0
        || t.tag_description_chars == 0
    {
        anyhow::bail!("truncation budgets must be > 0");
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply() {
        let cfg: Config = toml::from_str(
            r#"
            [db]
            path = "data/forum.sqlite"
            "#,
        )
        .unwrap();
        assert!(!cfg.backend.is_configured());
        assert_eq!(cfg.sync.batch_size, 200);
        assert_eq!(cfg.backend.max_batch_size, 1000);
        assert_eq!(cfg.truncation.post_paragraph_chars, 2000);
    }

    #[test]
    fn backend_url_marks_configured() {
        let cfg: Config = toml::from_str(
            r#"
            [db]
            path = "data/forum.sqlite"

            [backend]
            url = "http://localhost:9200"
            "#,
        )
        .unwrap();
        assert!(cfg.backend.is_configured());
    }
}

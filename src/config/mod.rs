use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;

fn default_downloads_dir() -> PathBuf {
    PathBuf::from("downloads")
}

fn default_cookies_dir() -> PathBuf {
    PathBuf::from("cookies")
}

fn default_max_concurrent_jobs() -> usize {
    3
}

fn default_job_timeout_secs() -> u64 {
    300
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) \
     Chrome/124.0 Safari/537.36"
        .to_string()
}

fn default_true() -> bool {
    true
}

fn default_health_port() -> u16 {
    8080
}

fn default_log_format() -> String {
    "json".to_string()
}

/// Third-party metadata API used as the last-resort retrieval strategy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaApiConfig {
    pub endpoint: String,
    pub api_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: default_log_format(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub discord_token: Option<String>,

    #[serde(default = "default_downloads_dir")]
    pub downloads_dir: PathBuf,

    /// Directory holding per-platform cookie files (`youtube.txt`, ...).
    #[serde(default = "default_cookies_dir")]
    pub cookies_dir: PathBuf,

    /// Size of the job permit pool.
    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: usize,

    /// Per-subprocess timeout; the tool is killed when it expires.
    #[serde(default = "default_job_timeout_secs")]
    pub job_timeout_secs: u64,

    pub ffmpeg_path: Option<String>,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Passes --no-check-certificates to yt-dlp. On by default to match the
    /// behavior the target platforms were observed to need; turn off for
    /// strict TLS verification.
    #[serde(default = "default_true")]
    pub no_check_certificates: bool,

    pub media_api: Option<MediaApiConfig>,

    /// Port for the HTTP liveness endpoint.
    #[serde(default = "default_health_port")]
    pub health_port: u16,

    #[serde(default)]
    pub logging: LoggingConfig,

    /// Channels the bot watches for links. Empty means all channels.
    #[serde(default)]
    pub allowed_channels: HashSet<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            discord_token: None,
            downloads_dir: default_downloads_dir(),
            cookies_dir: default_cookies_dir(),
            max_concurrent_jobs: default_max_concurrent_jobs(),
            job_timeout_secs: default_job_timeout_secs(),
            ffmpeg_path: None,
            user_agent: default_user_agent(),
            no_check_certificates: default_true(),
            media_api: None,
            health_port: default_health_port(),
            logging: LoggingConfig::default(),
            allowed_channels: HashSet::new(),
        }
    }
}

impl Config {
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {path}"))?;
        toml::from_str(&contents).with_context(|| format!("failed to parse config file {path}"))
    }

    pub fn is_allowed_channel(&self, channel_id: &str) -> bool {
        self.allowed_channels.is_empty() || self.allowed_channels.contains(channel_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.max_concurrent_jobs, 3);
        assert_eq!(config.job_timeout_secs, 300);
        assert_eq!(config.downloads_dir, PathBuf::from("downloads"));
        assert!(config.no_check_certificates);
        assert!(config.media_api.is_none());
        assert_eq!(config.health_port, 8080);
        assert_eq!(config.logging.format, "json");
    }

    #[test]
    fn test_parse_minimal_config() {
        let config: Config = toml::from_str(
            r#"
            discord_token = "token"
            max_concurrent_jobs = 1
            "#,
        )
        .unwrap();
        assert_eq!(config.discord_token.as_deref(), Some("token"));
        assert_eq!(config.max_concurrent_jobs, 1);
        assert_eq!(config.user_agent, default_user_agent());
    }

    #[test]
    fn test_parse_media_api_section() {
        let config: Config = toml::from_str(
            r#"
            [media_api]
            endpoint = "https://api.example.com/resolve"
            api_key = "secret"

            [logging]
            format = "text"
            "#,
        )
        .unwrap();
        let api = config.media_api.unwrap();
        assert_eq!(api.endpoint, "https://api.example.com/resolve");
        assert_eq!(config.logging.format, "text");
    }

    #[test]
    fn test_allowed_channels_empty_means_all() {
        let config = Config::default();
        assert!(config.is_allowed_channel("123"));

        let restricted: Config = toml::from_str(r#"allowed_channels = ["42"]"#).unwrap();
        assert!(restricted.is_allowed_channel("42"));
        assert!(!restricted.is_allowed_channel("123"));
    }
}

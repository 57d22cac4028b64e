//! Configuration for Sitemark
//!
//! All settings come from the environment with sensible defaults, so the
//! binary runs with zero configuration in development.

mod logging;

pub use logging::{init_tracing, LogFormat, LogLevel, LoggingConfig};

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Default user agent for browser navigation and HTTP requests
pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Main configuration, assembled from the environment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub pipeline: PipelineConfig,
    pub cache: CacheConfig,
    pub jobs: JobDefaults,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP port (consumed by the API layer wrapping this crate)
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: 3000 }
    }
}

/// Conversion pipeline parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Transient-error retries inside the pipeline
    pub max_retries: u32,
    /// Navigation timeout (ms)
    pub page_timeout_ms: u64,
    /// Dynamic fallback threshold (chars)
    pub min_content_length: usize,
    /// Post-scroll wait (ms)
    pub scroll_wait_ms: u64,
    /// Default cleaning mode
    pub aggressive_cleaning: bool,
    /// Default image policy
    pub remove_images: bool,
    /// Optional JSON file overriding the built-in cleaning rules
    pub rules_path: Option<PathBuf>,
    /// User agent passed to the headless browser
    pub user_agent: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            page_timeout_ms: 30_000,
            min_content_length: 500,
            scroll_wait_ms: 200,
            aggressive_cleaning: true,
            remove_images: false,
            rules_path: None,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

/// Which shared cache tier to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CacheMode {
    /// In-process LRU only
    #[default]
    None,
    /// Redis by host/port/password/db
    Internal,
    /// Redis by full URL
    External,
}

impl FromStr for CacheMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" | "" => Ok(CacheMode::None),
            "internal" => Ok(CacheMode::Internal),
            "external" => Ok(CacheMode::External),
            other => Err(format!(
                "invalid cache mode '{}' (expected internal, external, or none)",
                other
            )),
        }
    }
}

impl fmt::Display for CacheMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CacheMode::None => "none",
            CacheMode::Internal => "internal",
            CacheMode::External => "external",
        };
        f.write_str(s)
    }
}

/// Layered cache parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub mode: CacheMode,
    pub redis_host: String,
    pub redis_port: u16,
    pub redis_password: String,
    pub redis_db: i64,
    pub external_redis_url: Option<String>,
    /// Shared-tier TTL in seconds
    pub redis_ttl_secs: u64,
    /// In-process LRU TTL in milliseconds
    pub lru_ttl_ms: u64,
    /// Master switch: disables both tiers
    pub disable_all: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            mode: CacheMode::None,
            redis_host: "localhost".to_string(),
            redis_port: 6379,
            redis_password: String::new(),
            redis_db: 0,
            external_redis_url: None,
            redis_ttl_secs: 3600,
            lru_ttl_ms: 3_600_000,
            disable_all: false,
        }
    }
}

impl CacheConfig {
    /// Build a redis connection URL from the internal-mode parameters.
    pub fn internal_url(&self) -> String {
        if self.redis_password.is_empty() {
            format!("redis://{}:{}/{}", self.redis_host, self.redis_port, self.redis_db)
        } else {
            format!(
                "redis://:{}@{}:{}/{}",
                self.redis_password, self.redis_host, self.redis_port, self.redis_db
            )
        }
    }
}

/// Defaults applied when a job request omits a knob
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobDefaults {
    pub max_concurrent: usize,
    pub batch_size: usize,
    /// Inter-batch delay (ms)
    pub processing_delay_ms: u64,
    /// Per-URL outer retries
    pub retry_count: u32,
    /// Delay between outer retries (ms)
    pub retry_delay_ms: u64,
    /// Directory receiving per-job JSON reports
    pub reports_dir: PathBuf,
}

impl Default for JobDefaults {
    fn default() -> Self {
        Self {
            max_concurrent: 5,
            batch_size: 10,
            processing_delay_ms: 100,
            retry_count: 2,
            retry_delay_ms: 3000,
            reports_dir: PathBuf::from("reports"),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            pipeline: PipelineConfig::default(),
            cache: CacheConfig::default(),
            jobs: JobDefaults::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// Assemble configuration from the environment, then validate it.
    pub fn from_env() -> Result<Self> {
        let mut errors: Vec<String> = Vec::new();

        let config = Self {
            server: ServerConfig {
                port: parse_env("PORT", 3000, &mut errors),
            },
            pipeline: PipelineConfig {
                max_retries: parse_env("MAX_RETRIES", 2, &mut errors),
                page_timeout_ms: parse_env("PAGE_TIMEOUT", 30_000, &mut errors),
                min_content_length: parse_env("MIN_CONTENT_LENGTH", 500, &mut errors),
                scroll_wait_ms: parse_env("SCROLL_WAIT_TIME", 200, &mut errors),
                aggressive_cleaning: parse_env("AGGRESSIVE_CLEANING", true, &mut errors),
                remove_images: parse_env("REMOVE_IMAGES", false, &mut errors),
                rules_path: env_var("CLEANING_RULES_PATH").map(PathBuf::from),
                user_agent: env_var("BROWSER_USER_AGENT")
                    .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
            },
            cache: CacheConfig {
                mode: parse_env("USE_REDIS", CacheMode::None, &mut errors),
                redis_host: env_var("REDIS_HOST").unwrap_or_else(|| "localhost".to_string()),
                redis_port: parse_env("REDIS_PORT", 6379, &mut errors),
                redis_password: env_var("REDIS_PASSWORD").unwrap_or_default(),
                redis_db: parse_env("REDIS_DB", 0, &mut errors),
                external_redis_url: env_var("EXTERNAL_REDIS_URL"),
                redis_ttl_secs: parse_env("REDIS_CACHE_TTL", 3600, &mut errors),
                lru_ttl_ms: parse_env("LRU_CACHE_TTL", 3_600_000, &mut errors),
                disable_all: parse_env("DISABLE_ALL_CACHING", false, &mut errors),
            },
            jobs: JobDefaults {
                max_concurrent: parse_env("DEFAULT_MAX_CONCURRENT", 5, &mut errors),
                batch_size: parse_env("DEFAULT_BATCH_SIZE", 10, &mut errors),
                processing_delay_ms: parse_env("DEFAULT_PROCESSING_DELAY", 100, &mut errors),
                retry_count: parse_env("DEFAULT_RETRY_COUNT", 2, &mut errors),
                retry_delay_ms: parse_env("DEFAULT_RETRY_DELAY", 3000, &mut errors),
                reports_dir: env_var("REPORTS_DIR")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("reports")),
            },
            logging: LoggingConfig::from_env(),
        };

        if !errors.is_empty() {
            anyhow::bail!(
                "Configuration errors:\n  - {}",
                errors.join("\n  - ")
            );
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate all fields, collecting every error so the user can fix
    /// them in one pass.
    pub fn validate(&self) -> Result<()> {
        let mut errors: Vec<String> = Vec::new();

        if self.pipeline.page_timeout_ms == 0 {
            errors.push("PAGE_TIMEOUT must be positive".to_string());
        }
        if self.pipeline.min_content_length == 0 {
            errors.push("MIN_CONTENT_LENGTH must be positive".to_string());
        }
        if self.cache.mode == CacheMode::External && self.cache.external_redis_url.is_none() {
            errors.push("USE_REDIS=external requires EXTERNAL_REDIS_URL".to_string());
        }
        if self.jobs.max_concurrent == 0 {
            errors.push("DEFAULT_MAX_CONCURRENT must be positive".to_string());
        }
        if self.jobs.batch_size == 0 {
            errors.push("DEFAULT_BATCH_SIZE must be positive".to_string());
        }
        if self.jobs.reports_dir.as_os_str().is_empty() {
            errors.push("REPORTS_DIR must not be empty".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            anyhow::bail!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            );
        }
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_env<T>(name: &str, default: T, errors: &mut Vec<String>) -> T
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match env_var(name) {
        Some(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(e) => {
                errors.push(format!("{}: invalid value '{}': {}", name, raw, e));
                default
            }
        },
        None => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> Config {
        Config::default()
    }

    #[test]
    fn default_config_passes_validation() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn default_values_match_documented_defaults() {
        let cfg = valid_config();
        assert_eq!(cfg.server.port, 3000);
        assert_eq!(cfg.pipeline.max_retries, 2);
        assert_eq!(cfg.pipeline.page_timeout_ms, 30_000);
        assert_eq!(cfg.pipeline.min_content_length, 500);
        assert_eq!(cfg.pipeline.scroll_wait_ms, 200);
        assert!(cfg.pipeline.aggressive_cleaning);
        assert!(!cfg.pipeline.remove_images);
        assert_eq!(cfg.cache.mode, CacheMode::None);
        assert_eq!(cfg.cache.redis_host, "localhost");
        assert_eq!(cfg.cache.redis_port, 6379);
        assert_eq!(cfg.cache.redis_ttl_secs, 3600);
        assert_eq!(cfg.cache.lru_ttl_ms, 3_600_000);
        assert!(!cfg.cache.disable_all);
        assert_eq!(cfg.jobs.max_concurrent, 5);
        assert_eq!(cfg.jobs.batch_size, 10);
        assert_eq!(cfg.jobs.processing_delay_ms, 100);
        assert_eq!(cfg.jobs.retry_count, 2);
        assert_eq!(cfg.jobs.retry_delay_ms, 3000);
        assert_eq!(cfg.jobs.reports_dir, PathBuf::from("reports"));
    }

    #[test]
    fn validate_rejects_external_mode_without_url() {
        let mut cfg = valid_config();
        cfg.cache.mode = CacheMode::External;
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("EXTERNAL_REDIS_URL"));
    }

    #[test]
    fn validate_rejects_zero_batch_size() {
        let mut cfg = valid_config();
        cfg.jobs.batch_size = 0;
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("DEFAULT_BATCH_SIZE"));
    }

    #[test]
    fn validate_collects_multiple_errors() {
        let mut cfg = valid_config();
        cfg.jobs.batch_size = 0;
        cfg.jobs.max_concurrent = 0;
        cfg.pipeline.min_content_length = 0;
        let msg = cfg.validate().unwrap_err().to_string();
        assert!(msg.contains("DEFAULT_BATCH_SIZE"));
        assert!(msg.contains("DEFAULT_MAX_CONCURRENT"));
        assert!(msg.contains("MIN_CONTENT_LENGTH"));
    }

    #[test]
    fn cache_mode_parsing() {
        assert_eq!("internal".parse::<CacheMode>().unwrap(), CacheMode::Internal);
        assert_eq!("EXTERNAL".parse::<CacheMode>().unwrap(), CacheMode::External);
        assert_eq!("none".parse::<CacheMode>().unwrap(), CacheMode::None);
        assert!("memcached".parse::<CacheMode>().is_err());
    }

    #[test]
    fn internal_url_with_and_without_password() {
        let mut cfg = CacheConfig::default();
        assert_eq!(cfg.internal_url(), "redis://localhost:6379/0");
        cfg.redis_password = "hunter2".to_string();
        cfg.redis_db = 3;
        assert_eq!(cfg.internal_url(), "redis://:hunter2@localhost:6379/3");
    }
}

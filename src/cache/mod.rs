//! Layered artifact cache
//!
//! Two tiers behind one interface: a shared Redis store (TTL in
//! seconds) and an in-process LRU fallback (TTL in milliseconds). Tier
//! selection happens once at startup; a failed connect or probe falls
//! back to the LRU. The `disable_all` master switch short-circuits both
//! tiers to miss/no-op.

mod memory;
mod redis;

pub use memory::{MemoryCache, LRU_CAPACITY};
pub use redis::RedisCache;

use tracing::{info, warn};

use crate::config::{CacheConfig, CacheMode};
use crate::types::{Artifact, ConversionOptions};

/// Key prefix for all cache entries
const FINGERPRINT_PREFIX: &str = "sf4ai:";

/// Deterministic cache key over the URL and both selector lists.
/// Selector lists are JSON-encoded preserving insertion order, so equal
/// fingerprints imply interchangeable artifacts within their TTL.
pub fn fingerprint(url: &str, options: &ConversionOptions) -> String {
    let targets =
        serde_json::to_string(&options.target_selectors).unwrap_or_else(|_| "[]".to_string());
    let removes =
        serde_json::to_string(&options.remove_selectors).unwrap_or_else(|_| "[]".to_string());
    format!("{}{}-{}-{}", FINGERPRINT_PREFIX, url, targets, removes)
}

enum Tier {
    Redis(RedisCache),
    Memory(MemoryCache),
}

/// Fingerprint-keyed artifact store shared across all requests and jobs
pub struct ConversionCache {
    tier: Tier,
    disabled: bool,
}

impl ConversionCache {
    /// Select a tier per the configured mode, falling back to the
    /// in-process LRU on any shared-tier failure.
    pub async fn from_config(config: &CacheConfig) -> Self {
        if config.disable_all {
            info!("all caching disabled by master switch");
            return Self {
                tier: Tier::Memory(MemoryCache::new(LRU_CAPACITY, config.lru_ttl_ms)),
                disabled: true,
            };
        }

        let redis_url = match config.mode {
            CacheMode::External => config.external_redis_url.clone(),
            CacheMode::Internal => Some(config.internal_url()),
            CacheMode::None => None,
        };

        if let Some(url) = redis_url {
            match RedisCache::connect(&url, config.redis_ttl_secs).await {
                Ok(redis) => {
                    info!(mode = %config.mode, "shared cache tier selected");
                    return Self {
                        tier: Tier::Redis(redis),
                        disabled: false,
                    };
                }
                Err(e) => {
                    warn!(error = %e, "shared cache unavailable, falling back to in-process LRU");
                }
            }
        }

        Self {
            tier: Tier::Memory(MemoryCache::new(LRU_CAPACITY, config.lru_ttl_ms)),
            disabled: false,
        }
    }

    /// Build a cache directly over an in-process LRU (tests, tools).
    pub fn in_memory(ttl_ms: u64) -> Self {
        Self {
            tier: Tier::Memory(MemoryCache::new(LRU_CAPACITY, ttl_ms)),
            disabled: false,
        }
    }

    /// A cache that never stores anything.
    pub fn disabled() -> Self {
        Self {
            tier: Tier::Memory(MemoryCache::new(1, 0)),
            disabled: true,
        }
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    pub fn tier_name(&self) -> &'static str {
        match self.tier {
            Tier::Redis(_) => "redis",
            Tier::Memory(_) => "memory",
        }
    }

    /// Look up an artifact. Never fails: errors and the master switch
    /// both read as a miss.
    pub async fn get(&self, key: &str) -> Option<Artifact> {
        if self.disabled {
            return None;
        }
        match &self.tier {
            Tier::Redis(redis) => redis.get(key).await,
            Tier::Memory(memory) => memory.get(key),
        }
    }

    /// Store an artifact. Never fails: errors and the master switch
    /// both make this a no-op.
    pub async fn set(&self, key: &str, artifact: &Artifact) {
        if self.disabled {
            return;
        }
        match &self.tier {
            Tier::Redis(redis) => redis.set(key, artifact).await,
            Tier::Memory(memory) => memory.set(key, artifact),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn artifact() -> Artifact {
        Artifact {
            url: "https://example.com/".into(),
            metadata: "Title: T".into(),
            markdown: "body".into(),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn fingerprint_encodes_url_and_selectors_in_order() {
        let options = ConversionOptions {
            target_selectors: vec!["main".into(), "article".into()],
            remove_selectors: vec![".ads".into()],
            ..ConversionOptions::default()
        };
        let key = fingerprint("https://example.com/page", &options);
        assert_eq!(
            key,
            r#"sf4ai:https://example.com/page-["main","article"]-[".ads"]"#
        );
    }

    #[test]
    fn fingerprint_is_order_sensitive() {
        let a = ConversionOptions {
            target_selectors: vec!["main".into(), "article".into()],
            ..ConversionOptions::default()
        };
        let b = ConversionOptions {
            target_selectors: vec!["article".into(), "main".into()],
            ..ConversionOptions::default()
        };
        assert_ne!(
            fingerprint("https://example.com/", &a),
            fingerprint("https://example.com/", &b)
        );
    }

    #[tokio::test]
    async fn memory_tier_round_trip() {
        let cache = ConversionCache::in_memory(60_000);
        assert_eq!(cache.tier_name(), "memory");
        cache.set("k", &artifact()).await;
        assert!(cache.get("k").await.is_some());
    }

    #[tokio::test]
    async fn master_switch_short_circuits_both_operations() {
        let cache = ConversionCache::disabled();
        cache.set("k", &artifact()).await;
        assert!(cache.get("k").await.is_none());
    }

    #[tokio::test]
    async fn from_config_mode_none_selects_memory() {
        let config = CacheConfig::default();
        let cache = ConversionCache::from_config(&config).await;
        assert_eq!(cache.tier_name(), "memory");
        assert!(!cache.is_disabled());
    }

    #[tokio::test]
    async fn from_config_unreachable_redis_falls_back_to_memory() {
        let config = CacheConfig {
            mode: crate::config::CacheMode::External,
            external_redis_url: Some("redis://127.0.0.1:1/".to_string()),
            ..CacheConfig::default()
        };
        let cache = ConversionCache::from_config(&config).await;
        assert_eq!(cache.tier_name(), "memory");
    }
}

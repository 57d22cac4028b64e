//! Shared Redis cache tier
//!
//! Selected only after a successful connect + probe round-trip; any
//! failure there makes the caller fall back to the in-process tier.
//! Operational errors never propagate: they are logged and treated as
//! a miss/no-op.

use redis::AsyncCommands;
use tracing::{debug, warn};

use crate::error::CacheError;
use crate::types::Artifact;

const PROBE_KEY: &str = "sf4ai:probe";
const PROBE_TTL_SECS: u64 = 10;

/// Redis-backed artifact store with TTL in seconds
pub struct RedisCache {
    conn: redis::aio::MultiplexedConnection,
    ttl_secs: u64,
}

impl RedisCache {
    /// Connect and verify the tier with a set/get probe round-trip.
    pub async fn connect(url: &str, ttl_secs: u64) -> Result<Self, CacheError> {
        let client = redis::Client::open(url).map_err(|e| CacheError::Connect(e.to_string()))?;
        let mut conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| CacheError::Connect(e.to_string()))?;

        conn.set_ex::<_, _, ()>(PROBE_KEY, "ok", PROBE_TTL_SECS)
            .await
            .map_err(|e| CacheError::Probe(e.to_string()))?;
        let probe: Option<String> = conn
            .get(PROBE_KEY)
            .await
            .map_err(|e| CacheError::Probe(e.to_string()))?;
        if probe.as_deref() != Some("ok") {
            return Err(CacheError::Probe(format!(
                "probe read returned {:?}",
                probe
            )));
        }

        Ok(Self { conn, ttl_secs })
    }

    pub async fn get(&self, key: &str) -> Option<Artifact> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = match conn.get(key).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "redis get failed, treating as miss");
                return None;
            }
        };
        let raw = raw?;
        match serde_json::from_str(&raw) {
            Ok(artifact) => Some(artifact),
            Err(e) => {
                warn!(error = %e, "failed to decode cached artifact, treating as miss");
                None
            }
        }
    }

    pub async fn set(&self, key: &str, artifact: &Artifact) {
        let raw = match serde_json::to_string(artifact) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "failed to encode artifact for cache");
                return;
            }
        };
        let mut conn = self.conn.clone();
        if let Err(e) = conn.set_ex::<_, _, ()>(key, raw, self.ttl_secs).await {
            warn!(error = %e, "redis set failed, entry not cached");
        } else {
            debug!(key, ttl_secs = self.ttl_secs, "artifact cached");
        }
    }
}

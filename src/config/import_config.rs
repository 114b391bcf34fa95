// ==========================================
// Precast tracking backend - import tuning configuration
// ==========================================
// Storage: config_kv table (scope_id = 'global'), defaults below.
// ==========================================

use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Keys read from config_kv
pub mod config_keys {
    pub const DEFAULT_BATCH_SIZE: &str = "import.batch_size.default";
    pub const MAX_BATCH_SIZE: &str = "import.batch_size.max";
    pub const DEFAULT_CONCURRENT_BATCHES: &str = "import.concurrent_batches.default";
    pub const MAX_CONCURRENT_BATCHES: &str = "import.concurrent_batches.max";
    pub const THROTTLE_THRESHOLD: &str = "import.throttle.threshold";
    pub const THROTTLED_CONCURRENCY: &str = "import.throttle.concurrency";
    pub const MAX_ERROR_SUMMARIES: &str = "import.errors.max";
    pub const ACTIVITY_QUEUE_CAPACITY: &str = "activity_log.queue_capacity";
    pub const POOL_SIZE: &str = "db.pool.size";
    pub const POOL_ACQUIRE_TIMEOUT_MS: &str = "db.pool.acquire_timeout_ms";
}

// ==========================================
// ImportConfig
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportConfig {
    pub default_batch_size: usize,
    pub max_batch_size: usize,
    pub default_concurrent_batches: usize,
    pub max_concurrent_batches: usize,
    /// Above this many drafts concurrency is capped at `throttled_concurrency`
    pub throttle_threshold: usize,
    pub throttled_concurrency: usize,
    pub max_error_summaries: usize,
    pub activity_queue_capacity: usize,
    pub pool_size: usize,
    pub pool_acquire_timeout_ms: u64,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            default_batch_size: 30,
            max_batch_size: 50,
            default_concurrent_batches: 15,
            max_concurrent_batches: 20,
            throttle_threshold: 1000,
            throttled_concurrency: 6,
            max_error_summaries: 100,
            activity_queue_capacity: 1024,
            pool_size: 16,
            pool_acquire_timeout_ms: 30_000,
        }
    }
}

impl ImportConfig {
    /// Overlay values found in config_kv on top of the defaults.
    ///
    /// A missing config_kv table or a malformed value leaves the
    /// default in place.
    pub fn load(conn: &Connection) -> Self {
        let stored = match read_global_values(conn) {
            Ok(values) => values,
            Err(e) => {
                tracing::debug!(error = %e, "config_kv unavailable, using import defaults");
                return Self::default();
            }
        };

        let mut cfg = Self::default();
        let read = |key: &str, slot: &mut usize| {
            if let Some(raw) = stored.get(key) {
                match raw.trim().parse::<usize>() {
                    Ok(v) if v > 0 => *slot = v,
                    _ => tracing::warn!(key, value = %raw, "ignoring malformed import config value"),
                }
            }
        };
        read(config_keys::DEFAULT_BATCH_SIZE, &mut cfg.default_batch_size);
        read(config_keys::MAX_BATCH_SIZE, &mut cfg.max_batch_size);
        read(config_keys::DEFAULT_CONCURRENT_BATCHES, &mut cfg.default_concurrent_batches);
        read(config_keys::MAX_CONCURRENT_BATCHES, &mut cfg.max_concurrent_batches);
        read(config_keys::THROTTLE_THRESHOLD, &mut cfg.throttle_threshold);
        read(config_keys::THROTTLED_CONCURRENCY, &mut cfg.throttled_concurrency);
        read(config_keys::MAX_ERROR_SUMMARIES, &mut cfg.max_error_summaries);
        read(config_keys::ACTIVITY_QUEUE_CAPACITY, &mut cfg.activity_queue_capacity);
        read(config_keys::POOL_SIZE, &mut cfg.pool_size);

        let mut timeout = cfg.pool_acquire_timeout_ms as usize;
        read(config_keys::POOL_ACQUIRE_TIMEOUT_MS, &mut timeout);
        cfg.pool_acquire_timeout_ms = timeout as u64;

        // Defaults must stay inside their own limits
        cfg.default_batch_size = cfg.default_batch_size.min(cfg.max_batch_size);
        cfg.default_concurrent_batches = cfg
            .default_concurrent_batches
            .min(cfg.max_concurrent_batches);
        cfg
    }

    /// Clamp a requested batch size into `[1, max_batch_size]`.
    pub fn clamp_batch_size(&self, requested: Option<i64>) -> usize {
        clamp(requested, self.default_batch_size, self.max_batch_size)
    }

    /// Clamp a requested batch concurrency into `[1, max_concurrent_batches]`.
    pub fn clamp_concurrency(&self, requested: Option<i64>) -> usize {
        clamp(
            requested,
            self.default_concurrent_batches,
            self.max_concurrent_batches,
        )
    }

    /// Concurrency after adaptive throttling for `draft_count` drafts.
    pub fn effective_concurrency(&self, draft_count: usize, requested: usize) -> usize {
        let requested = requested.max(1);
        if draft_count > self.throttle_threshold {
            requested.min(self.throttled_concurrency.max(1))
        } else {
            requested
        }
    }

    pub fn pool_acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.pool_acquire_timeout_ms)
    }
}

fn clamp(requested: Option<i64>, default: usize, max: usize) -> usize {
    match requested {
        None => default,
        Some(v) if v < 1 => 1,
        Some(v) => (v as usize).min(max),
    }
}

fn read_global_values(conn: &Connection) -> rusqlite::Result<HashMap<String, String>> {
    let mut stmt = conn.prepare("SELECT key, value FROM config_kv WHERE scope_id = ?1")?;
    let rows = stmt.query_map(params!["global"], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;

    let mut values = HashMap::new();
    for row in rows {
        let (key, value) = row?;
        values.insert(key, value);
    }
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_tuning_parameters() {
        let cfg = ImportConfig::default();
        assert_eq!(cfg.clamp_batch_size(None), 30);
        assert_eq!(cfg.clamp_batch_size(Some(0)), 1);
        assert_eq!(cfg.clamp_batch_size(Some(-5)), 1);
        assert_eq!(cfg.clamp_batch_size(Some(500)), 50);
        assert_eq!(cfg.clamp_concurrency(None), 15);
        assert_eq!(cfg.clamp_concurrency(Some(21)), 20);
        assert_eq!(cfg.clamp_concurrency(Some(4)), 4);
    }

    #[test]
    fn test_effective_concurrency_throttles_large_jobs() {
        let cfg = ImportConfig::default();
        assert_eq!(cfg.effective_concurrency(1000, 15), 15);
        assert_eq!(cfg.effective_concurrency(1001, 15), 6);
        assert_eq!(cfg.effective_concurrency(5000, 4), 4);
    }

    #[test]
    fn test_load_without_table_uses_defaults() {
        let conn = Connection::open_in_memory().unwrap();
        assert_eq!(ImportConfig::load(&conn), ImportConfig::default());
    }

    #[test]
    fn test_load_overlays_config_kv() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            r#"
            CREATE TABLE config_kv (scope_id TEXT, key TEXT, value TEXT);
            INSERT INTO config_kv VALUES ('global', 'import.batch_size.default', '20');
            INSERT INTO config_kv VALUES ('global', 'import.throttle.concurrency', 'abc');
            INSERT INTO config_kv VALUES ('other', 'import.batch_size.max', '10');
            "#,
        )
        .unwrap();

        let cfg = ImportConfig::load(&conn);
        assert_eq!(cfg.default_batch_size, 20);
        assert_eq!(cfg.throttled_concurrency, 6);
        assert_eq!(cfg.max_batch_size, 50);
    }
}

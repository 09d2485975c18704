//! Redis-backed crowd counter store (shared across instances).
//!
//! One hash per shelf (`harvesthub:crowd:<shelf_id>`) with a field per task
//! kind, incremented with HINCRBY so concurrent instances never lose a
//! bump. Negative drift (a decrement racing a reset) is clamped back to
//! zero on read — acceptable for an advisory signal.

use std::sync::Arc;

use tracing::instrument;

use harvesthub_core::ShelfId;
use harvesthub_warehouse::{CrowdCounters, CrowdKind};

use super::{CrowdStore, CrowdStoreError};

/// Default key prefix for shelf counter hashes
const DEFAULT_KEY_PREFIX: &str = "harvesthub:crowd";

#[derive(Debug, Clone)]
pub struct RedisCrowdStore {
    client: Arc<redis::Client>,
    key_prefix: String,
}

impl RedisCrowdStore {
    /// Create a new Redis counter store.
    ///
    /// # Arguments
    ///
    /// * `redis_url` - Redis connection URL (e.g., "redis://localhost:6379")
    /// * `key_prefix` - Hash key prefix (default: "harvesthub:crowd")
    pub fn new(
        redis_url: impl AsRef<str>,
        key_prefix: Option<String>,
    ) -> Result<Self, CrowdStoreError> {
        let client = redis::Client::open(redis_url.as_ref())
            .map_err(|e| CrowdStoreError::Connection(e.to_string()))?;

        Ok(Self {
            client: Arc::new(client),
            key_prefix: key_prefix.unwrap_or_else(|| DEFAULT_KEY_PREFIX.to_string()),
        })
    }

    fn key(&self, shelf_id: ShelfId) -> String {
        format!("{}:{}", self.key_prefix, shelf_id)
    }

    fn connection(&self) -> Result<redis::Connection, CrowdStoreError> {
        self.client
            .get_connection()
            .map_err(|e| CrowdStoreError::Connection(e.to_string()))
    }

    fn read_counters(
        conn: &mut redis::Connection,
        key: &str,
    ) -> Result<CrowdCounters, CrowdStoreError> {
        let fields: std::collections::HashMap<String, i64> = redis::cmd("HGETALL")
            .arg(key)
            .query(conn)
            .map_err(|e| CrowdStoreError::Command(e.to_string()))?;

        let mut counters = CrowdCounters::default();
        for (field, value) in fields {
            // Clamp negative drift to zero.
            let value = value.max(0) as u32;
            match field.as_str() {
                "pick" => counters.pick = value,
                "sort" => counters.sort = value,
                "audit" => counters.audit = value,
                _ => {}
            }
        }
        Ok(counters)
    }
}

impl CrowdStore for RedisCrowdStore {
    #[instrument(skip(self), fields(shelf_id = %shelf_id, kind = %kind), err)]
    fn bump(
        &self,
        shelf_id: ShelfId,
        kind: CrowdKind,
        delta: i32,
    ) -> Result<CrowdCounters, CrowdStoreError> {
        let key = self.key(shelf_id);
        let mut conn = self.connection()?;

        let after: i64 = redis::cmd("HINCRBY")
            .arg(&key)
            .arg(kind.to_string())
            .arg(i64::from(delta))
            .query(&mut conn)
            .map_err(|e| CrowdStoreError::Command(e.to_string()))?;

        // A decrement past zero leaves a negative field; reset it so later
        // reads do not understate other kinds' totals. Racy by design.
        if after < 0 {
            let _: Result<i64, _> = redis::cmd("HSET")
                .arg(&key)
                .arg(kind.to_string())
                .arg(0i64)
                .query(&mut conn);
        }

        Self::read_counters(&mut conn, &key)
    }

    fn counters(&self, shelf_id: ShelfId) -> Result<CrowdCounters, CrowdStoreError> {
        let key = self.key(shelf_id);
        let mut conn = self.connection()?;
        Self::read_counters(&mut conn, &key)
    }
}

//! Redis-backed deduplication storage
//!
//! A list holds the UUID order for eviction and a set provides O(1)
//! membership, both keyed by the DDQ key under a configurable prefix with a
//! TTL. Push and set-add run in one MULTI/EXEC pipeline; the trim that
//! follows is a separate step, so duplicate delivery is possible on
//! contention. Failure policy is fail-open: a transient store failure makes
//! `contains` report not-a-duplicate, and `add` failures are logged.

use std::sync::Mutex;
use std::time::Duration;

use tracing::warn;

use super::{DdqKey, DdqStore};
use crate::error::DdqError;

/// Connection and keying options for the shared store.
#[derive(Debug, Clone)]
pub struct RedisDdqOptions {
    /// Server URL, e.g. `redis://127.0.0.1:6379`.
    pub url: String,
    /// Logical database index selected after connecting.
    pub database: i64,
    /// Prefix applied to both keys.
    pub key_prefix: String,
    /// Expiry refreshed on every `add`; `None` keeps the keys forever.
    pub ttl: Option<Duration>,
}

impl Default for RedisDdqOptions {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379".to_string(),
            database: 0,
            key_prefix: "courier:ddq".to_string(),
            ttl: Some(Duration::from_secs(3600)),
        }
    }
}

/// Shared dedup window visible across processes.
pub struct RedisDdq {
    list_key: String,
    set_key: String,
    capacity: usize,
    options: RedisDdqOptions,
    conn: Mutex<Option<redis::Connection>>,
}

impl std::fmt::Debug for RedisDdq {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisDdq")
            .field("list_key", &self.list_key)
            .field("set_key", &self.set_key)
            .field("capacity", &self.capacity)
            .finish_non_exhaustive()
    }
}

impl RedisDdq {
    /// Creates the window for one dedup key. The connection is established
    /// lazily on first use and re-established after a failure.
    #[must_use]
    pub fn new(key: &DdqKey, capacity: usize, options: RedisDdqOptions) -> Self {
        Self {
            list_key: format!("{}:{}:queue", options.key_prefix, key),
            set_key: format!("{}:{}:members", options.key_prefix, key),
            capacity,
            options,
            conn: Mutex::new(None),
        }
    }

    /// The list key holding UUID order.
    #[must_use]
    pub fn list_key(&self) -> &str {
        &self.list_key
    }

    /// The set key holding membership.
    #[must_use]
    pub fn set_key(&self) -> &str {
        &self.set_key
    }

    fn with_conn<T>(
        &self,
        f: impl FnOnce(&mut redis::Connection) -> redis::RedisResult<T>,
    ) -> Result<T, DdqError> {
        let mut guard = self.conn.lock().unwrap_or_else(|e| e.into_inner());

        if guard.is_none() {
            let client = redis::Client::open(self.options.url.as_str()).map_err(|source| {
                DdqError::Connection {
                    url: self.options.url.clone(),
                    source,
                }
            })?;
            let mut conn = client.get_connection().map_err(|source| DdqError::Connection {
                url: self.options.url.clone(),
                source,
            })?;
            if self.options.database != 0 {
                redis::cmd("SELECT")
                    .arg(self.options.database)
                    .query::<()>(&mut conn)
                    .map_err(|source| DdqError::Storage { source })?;
            }
            *guard = Some(conn);
        }

        let conn = guard.as_mut().expect("connection just established");
        match f(conn) {
            Ok(value) => Ok(value),
            Err(source) => {
                // Drop the connection so the next call reconnects.
                *guard = None;
                Err(DdqError::Storage { source })
            }
        }
    }

    fn ttl_secs(&self) -> Option<i64> {
        self.options.ttl.map(|ttl| ttl.as_secs().max(1) as i64)
    }
}

impl DdqStore for RedisDdq {
    fn contains(&self, uuid: &str) -> bool {
        let result = self.with_conn(|conn| {
            redis::cmd("SISMEMBER")
                .arg(&self.set_key)
                .arg(uuid)
                .query::<bool>(conn)
        });
        match result {
            Ok(member) => member,
            Err(err) => {
                warn!(key = %self.set_key, error = %err, "dedup membership check failed, treating as new");
                false
            }
        }
    }

    fn add(&self, uuid: &str) {
        let result = self.with_conn(|conn| {
            let mut pipe = redis::pipe();
            pipe.atomic();
            pipe.cmd("LPUSH").arg(&self.list_key).arg(uuid).ignore();
            pipe.cmd("SADD").arg(&self.set_key).arg(uuid).ignore();
            if let Some(ttl) = self.ttl_secs() {
                pipe.cmd("EXPIRE").arg(&self.list_key).arg(ttl).ignore();
                pipe.cmd("EXPIRE").arg(&self.set_key).arg(ttl).ignore();
            }
            pipe.query::<()>(conn)?;

            // Trim runs outside the transaction; over-capacity entries are
            // removed tail-first together with their set membership.
            let len: i64 = redis::cmd("LLEN").arg(&self.list_key).query(conn)?;
            let mut excess = len - self.capacity as i64;
            while excess > 0 {
                let popped: Option<String> =
                    redis::cmd("RPOP").arg(&self.list_key).query(conn)?;
                let Some(old) = popped else { break };
                redis::cmd("SREM")
                    .arg(&self.set_key)
                    .arg(&old)
                    .query::<()>(conn)?;
                excess -= 1;
            }
            Ok(())
        });

        if let Err(err) = result {
            warn!(key = %self.list_key, error = %err, "dedup add failed, duplicate re-delivery possible");
        }
    }

    fn clear(&self) {
        let result = self.with_conn(|conn| {
            redis::cmd("DEL")
                .arg(&self.list_key)
                .arg(&self.set_key)
                .query::<()>(conn)
        });
        if let Err(err) = result {
            warn!(key = %self.list_key, error = %err, "dedup clear failed");
        }
    }

    fn len(&self) -> usize {
        let result = self.with_conn(|conn| {
            redis::cmd("SCARD")
                .arg(&self.set_key)
                .query::<i64>(conn)
        });
        match result {
            Ok(count) => usize::try_from(count).unwrap_or(0),
            Err(err) => {
                warn!(key = %self.set_key, error = %err, "dedup size query failed");
                0
            }
        }
    }

    fn capacity(&self) -> usize {
        self.capacity
    }

    fn storage_kind(&self) -> &'static str {
        "redis"
    }
}

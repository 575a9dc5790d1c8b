//! Shared stores behind distributed pulses.
//!
//! A store needs three atomic list operations: length, push and blocking pop.
//! The emitter never reads-modifies-writes a list; every access is one of these.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::error_handling::AttenuatorError;

/// Atomic list operations shared by every process in a fleet.
#[async_trait]
pub trait SharedStore: Send + Sync {
    /// Number of entries in the list at `key` (zero if absent).
    async fn list_len(&self, key: &str) -> Result<usize, AttenuatorError>;

    /// Pushes `value` onto the head of the list at `key`.
    async fn push(&self, key: &str, value: String) -> Result<(), AttenuatorError>;

    /// Pops from the tail of the list at `key`, waiting until an entry exists.
    ///
    /// Must be cancellation-safe: dropping the future never loses an entry.
    async fn blocking_pop(&self, key: &str) -> Result<String, AttenuatorError>;
}

/// A process-local store.
///
/// Used by tests and single-node deployments that still want the distributed
/// pulse's at-most-one-token behaviour.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    lists: Mutex<HashMap<String, VecDeque<String>>>,
    pushed: Notify,
}

impl InMemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn try_pop(&self, key: &str) -> Option<String> {
        let mut lists = self.lists.lock().unwrap_or_else(|e| e.into_inner());
        lists.get_mut(key).and_then(|list| list.pop_back())
    }
}

#[async_trait]
impl SharedStore for InMemoryStore {
    async fn list_len(&self, key: &str) -> Result<usize, AttenuatorError> {
        let lists = self.lists.lock().unwrap_or_else(|e| e.into_inner());
        Ok(lists.get(key).map(VecDeque::len).unwrap_or(0))
    }

    async fn push(&self, key: &str, value: String) -> Result<(), AttenuatorError> {
        {
            let mut lists = self.lists.lock().unwrap_or_else(|e| e.into_inner());
            lists.entry(key.to_string()).or_default().push_front(value);
        }
        self.pushed.notify_waiters();
        Ok(())
    }

    async fn blocking_pop(&self, key: &str) -> Result<String, AttenuatorError> {
        loop {
            // register before checking so a push between the check and the await is not missed
            let notified = self.pushed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(value) = self.try_pop(key) {
                return Ok(value);
            }
            notified.await;
        }
    }
}

#[cfg(feature = "redis-backend")]
pub use self::redis_store::RedisStore;

#[cfg(feature = "redis-backend")]
mod redis_store {
    use async_trait::async_trait;

    use redis::aio::MultiplexedConnection;

    use super::SharedStore;
    use crate::config::{STORE_POP_POLL_INTERVAL, STORE_POP_POOL_SIZE};
    use crate::error_handling::AttenuatorError;
    use crate::pulse::pool::ConnectionPool;

    /// A Redis-backed store using `LLEN`, `LPUSH` and `BRPOP`.
    ///
    /// `LLEN` and `LPUSH` share one multiplexed connection. Each `BRPOP` runs on a
    /// dedicated connection drawn from a small pool.
    pub struct RedisStore {
        client: redis::Client,
        shared: MultiplexedConnection,
        pops: ConnectionPool<MultiplexedConnection>,
    }

    fn store_error(op: &str, e: redis::RedisError) -> AttenuatorError {
        AttenuatorError::Store(format!("redis.{}(): {}", op, e))
    }

    impl RedisStore {
        /// Connects to the Redis server at `url` (e.g. `redis://127.0.0.1:6379`).
        ///
        /// # Errors
        ///
        /// Returns `AttenuatorError::Store` if the URL is invalid or the server is unreachable.
        pub async fn connect(url: &str) -> Result<Self, AttenuatorError> {
            let client = redis::Client::open(url).map_err(|e| store_error("connect", e))?;
            let shared = client
                .get_multiplexed_async_connection()
                .await
                .map_err(|e| store_error("connect", e))?;
            log::info!("Connected to shared store at {}", url);
            Ok(RedisStore {
                client,
                shared,
                pops: ConnectionPool::new(STORE_POP_POOL_SIZE),
            })
        }
    }

    #[async_trait]
    impl SharedStore for RedisStore {
        async fn list_len(&self, key: &str) -> Result<usize, AttenuatorError> {
            let mut conn = self.shared.clone();
            redis::cmd("LLEN")
                .arg(key)
                .query_async(&mut conn)
                .await
                .map_err(|e| store_error("list_len", e))
        }

        async fn push(&self, key: &str, value: String) -> Result<(), AttenuatorError> {
            let mut conn = self.shared.clone();
            let _: usize = redis::cmd("LPUSH")
                .arg(key)
                .arg(value)
                .query_async(&mut conn)
                .await
                .map_err(|e| store_error("push", e))?;
            Ok(())
        }

        async fn blocking_pop(&self, key: &str) -> Result<String, AttenuatorError> {
            let mut pooled = self
                .pops
                .checkout(|| async {
                    self.client
                        .get_multiplexed_async_connection()
                        .await
                        .map_err(|e| store_error("blocking_pop", e))
                })
                .await?;
            // on error or cancellation the checkout is dropped and its connection closed
            loop {
                let popped: Option<(String, String)> = redis::cmd("BRPOP")
                    .arg(key)
                    .arg(STORE_POP_POLL_INTERVAL.as_secs())
                    .query_async(pooled.conn())
                    .await
                    .map_err(|e| store_error("blocking_pop", e))?;
                if let Some((_, value)) = popped {
                    pooled.release();
                    return Ok(value);
                }
            }
        }
    }
}

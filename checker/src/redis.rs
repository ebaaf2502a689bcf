use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use redis::AsyncCommands;

/// A simple redis wrapper exposing the handful of commands the cache
/// diagnostics need.
#[async_trait]
pub trait CacheClient {
    async fn ping(&self) -> Result<String>;
    async fn set_ex(&self, k: String, v: String, seconds: usize) -> Result<()>;
    async fn get(&self, k: String) -> Result<Option<String>>;
    async fn keys(&self, pattern: String) -> Result<Vec<String>>;
}

/// One multiplexed connection opened by the startup probe and shared by
/// every request for the life of the process. Commands ride on clones of
/// the same underlying connection.
pub struct RedisClient {
    connection: redis::aio::MultiplexedConnection,
}

impl RedisClient {
    pub async fn connect(addr: String) -> Result<RedisClient> {
        let client = redis::Client::open(addr)?;
        let connection = client.get_multiplexed_tokio_connection().await?;

        Ok(RedisClient { connection })
    }
}

#[async_trait]
impl CacheClient for RedisClient {
    async fn ping(&self) -> Result<String> {
        let mut conn = self.connection.clone();
        let pong: String = redis::cmd("PING").query_async(&mut conn).await?;

        Ok(pong)
    }

    async fn set_ex(&self, k: String, v: String, seconds: usize) -> Result<()> {
        let mut conn = self.connection.clone();
        conn.set_ex::<_, _, ()>(k, v, seconds).await?;

        Ok(())
    }

    async fn get(&self, k: String) -> Result<Option<String>> {
        let mut conn = self.connection.clone();
        let value: Option<String> = conn.get(k).await?;

        Ok(value)
    }

    async fn keys(&self, pattern: String) -> Result<Vec<String>> {
        let mut conn = self.connection.clone();
        let keys: Vec<String> = conn.keys(pattern).await?;

        Ok(keys)
    }
}

/// In-memory stand-in for tests. Only supports the `prefix*` patterns the
/// dispatcher actually issues.
#[derive(Clone, Default)]
pub struct MockCacheClient {
    entries: Arc<Mutex<HashMap<String, String>>>,
    fail_with: Option<String>,
    calls: Arc<AtomicUsize>,
}

impl MockCacheClient {
    pub fn new() -> MockCacheClient {
        Default::default()
    }

    /// A client whose every command fails with the given message.
    pub fn failing(message: &str) -> MockCacheClient {
        MockCacheClient {
            fail_with: Some(message.to_string()),
            ..Default::default()
        }
    }

    /// Number of commands issued against this client so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn guard(&self) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.fail_with {
            Some(message) => Err(anyhow!("{message}")),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl CacheClient for MockCacheClient {
    async fn ping(&self) -> Result<String> {
        self.guard()?;

        Ok("PONG".to_string())
    }

    async fn set_ex(&self, k: String, v: String, _seconds: usize) -> Result<()> {
        self.guard()?;
        self.entries
            .lock()
            .expect("poisoned mock cache mutex")
            .insert(k, v);

        Ok(())
    }

    async fn get(&self, k: String) -> Result<Option<String>> {
        self.guard()?;

        Ok(self
            .entries
            .lock()
            .expect("poisoned mock cache mutex")
            .get(&k)
            .cloned())
    }

    async fn keys(&self, pattern: String) -> Result<Vec<String>> {
        self.guard()?;
        let prefix = pattern.trim_end_matches('*');

        Ok(self
            .entries
            .lock()
            .expect("poisoned mock cache mutex")
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect())
    }
}

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;
use sqlx::postgres::PgPool;

/// The statements the database diagnostics run. Every operation acquires
/// one pooled connection scoped to the call, so the connection returns to
/// the pool on the error path as well.
#[async_trait]
pub trait DatabaseClient {
    async fn ping(&self) -> Result<i32>;
    async fn tables(&self) -> Result<Vec<String>>;
    async fn version(&self) -> Result<String>;
}

pub struct PostgresClient {
    pool: PgPool,
}

impl PostgresClient {
    pub fn new(pool: PgPool) -> PostgresClient {
        PostgresClient { pool }
    }
}

#[async_trait]
impl DatabaseClient for PostgresClient {
    async fn ping(&self) -> Result<i32> {
        let mut conn = self.pool.acquire().await?;
        let value = sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&mut *conn)
            .await?;

        Ok(value)
    }

    async fn tables(&self) -> Result<Vec<String>> {
        let mut conn = self.pool.acquire().await?;
        let tables = sqlx::query_scalar::<_, String>(
            "SELECT tablename FROM pg_catalog.pg_tables \
             WHERE schemaname NOT IN ('pg_catalog', 'information_schema') \
             ORDER BY tablename",
        )
        .fetch_all(&mut *conn)
        .await?;

        Ok(tables)
    }

    async fn version(&self) -> Result<String> {
        let mut conn = self.pool.acquire().await?;
        let version = sqlx::query_scalar::<_, String>("SELECT version()")
            .fetch_one(&mut *conn)
            .await?;

        Ok(version)
    }
}

/// Mock client tracking outstanding connections, so tests can observe that
/// a failing statement still releases what it acquired.
#[derive(Clone)]
pub struct MockDatabaseClient {
    in_use: Arc<AtomicUsize>,
    fail_next: Arc<AtomicBool>,
    tables_ret: Vec<String>,
    version_ret: String,
}

impl MockDatabaseClient {
    pub fn new() -> MockDatabaseClient {
        MockDatabaseClient {
            in_use: Arc::new(AtomicUsize::new(0)),
            fail_next: Arc::new(AtomicBool::new(false)),
            tables_ret: Vec::new(),
            version_ret: "PostgreSQL 15.4 (mock)".to_string(),
        }
    }

    pub fn tables_ret(&mut self, ret: Vec<String>) -> Self {
        self.tables_ret = ret;

        self.clone()
    }

    /// Make the next statement fail mid-operation.
    pub fn fail_next(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    /// Connections currently checked out of the mock pool.
    pub fn outstanding(&self) -> usize {
        self.in_use.load(Ordering::SeqCst)
    }

    fn acquire(&self) -> MockConnection {
        self.in_use.fetch_add(1, Ordering::SeqCst);
        MockConnection {
            in_use: self.in_use.clone(),
        }
    }

    fn should_fail(&self) -> bool {
        self.fail_next.swap(false, Ordering::SeqCst)
    }
}

impl Default for MockDatabaseClient {
    fn default() -> Self {
        Self::new()
    }
}

struct MockConnection {
    in_use: Arc<AtomicUsize>,
}

impl Drop for MockConnection {
    fn drop(&mut self) {
        self.in_use.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl DatabaseClient for MockDatabaseClient {
    async fn ping(&self) -> Result<i32> {
        let _conn = self.acquire();
        if self.should_fail() {
            bail!("connection reset during query");
        }

        Ok(1)
    }

    async fn tables(&self) -> Result<Vec<String>> {
        let _conn = self.acquire();
        if self.should_fail() {
            bail!("connection reset during query");
        }

        Ok(self.tables_ret.clone())
    }

    async fn version(&self) -> Result<String> {
        let _conn = self.acquire();
        if self.should_fail() {
            bail!("connection reset during query");
        }

        Ok(self.version_ret.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_answers_queries() {
        let client = MockDatabaseClient::new().tables_ret(vec!["users".to_string()]);

        assert_eq!(client.ping().await.unwrap(), 1);
        assert_eq!(client.tables().await.unwrap(), vec!["users".to_string()]);
        assert!(client.version().await.unwrap().starts_with("PostgreSQL"));
    }

    #[tokio::test]
    async fn failed_query_releases_its_connection() {
        let client = MockDatabaseClient::new();
        client.fail_next();

        let err = client.ping().await.unwrap_err();
        assert_eq!(err.to_string(), "connection reset during query");
        assert_eq!(client.outstanding(), 0);

        // the next statement reuses the pool as if nothing happened
        assert_eq!(client.ping().await.unwrap(), 1);
        assert_eq!(client.outstanding(), 0);
    }
}

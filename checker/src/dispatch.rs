use std::sync::Arc;

use anyhow::Result;
use serde_json::json;

use crate::api::ActionResponse;
use crate::database::DatabaseClient;
use crate::redis::CacheClient;
use crate::registry::{BackendHandle, ComponentKind, ComponentRegistry, ComponentStatus};
use crate::session::SessionStore;
use crate::storage::StorageBackend;
use crate::time::{now_rfc3339, unix_millis};

pub const TEST_KEY_PREFIX: &str = "test-key-";
pub const TEST_KEY_TTL_SECONDS: usize = 60;

/// Route one (component, action) pair to the live backend handle.
///
/// Every failure is local: backend errors are folded into the response
/// body and nothing propagates past this function. An unreachable
/// component answers without touching the backend at all.
pub async fn execute(
    registry: &ComponentRegistry,
    kind: ComponentKind,
    action: &str,
    session_id: &str,
) -> ActionResponse {
    let record = registry.get(kind);
    if record.status == ComponentStatus::Unreachable {
        return ActionResponse::failure(action, format!("{kind} not connected"));
    }
    let Some(handle) = record.handle else {
        return ActionResponse::failure(action, format!("{kind} not connected"));
    };

    match handle {
        BackendHandle::Cache(client) => cache_action(client, action).await,
        BackendHandle::Database(client) => database_action(client, action).await,
        BackendHandle::Filesystem(backend) => filesystem_action(backend, action).await,
        BackendHandle::Session(store) => session_action(store, action, session_id).await,
    }
}

async fn cache_action(client: Arc<dyn CacheClient + Send + Sync>, action: &str) -> ActionResponse {
    match action {
        "ping" => match client.ping().await {
            Ok(pong) => ActionResponse::success(action).with("result", json!(pong)),
            Err(err) => ActionResponse::backend_error(action, err),
        },
        "set" => {
            let key = format!("{TEST_KEY_PREFIX}{}", unix_millis());
            let value = format!("test value {}", now_rfc3339());
            match client
                .set_ex(key.clone(), value.clone(), TEST_KEY_TTL_SECONDS)
                .await
            {
                Ok(()) => ActionResponse::success(action)
                    .with("key", json!(key))
                    .with("value", json!(value))
                    .with("ttl", json!(TEST_KEY_TTL_SECONDS)),
                Err(err) => ActionResponse::backend_error(action, err),
            }
        }
        "get" => match latest_test_key(client).await {
            Ok(Some((key, value))) => ActionResponse::success(action)
                .with("key", json!(key))
                .with("value", json!(value)),
            Ok(None) => ActionResponse::failure(action, "no test keys found"),
            Err(err) => ActionResponse::backend_error(action, err),
        },
        _ => ActionResponse::failure(action, "unknown action"),
    }
}

/// Picks the lexicographically last test key. With the fixed-width
/// timestamps embedded in generated names this doubles as newest-first.
async fn latest_test_key(
    client: Arc<dyn CacheClient + Send + Sync>,
) -> Result<Option<(String, Option<String>)>> {
    let mut keys = client.keys(format!("{TEST_KEY_PREFIX}*")).await?;
    keys.sort();
    let Some(key) = keys.pop() else {
        return Ok(None);
    };
    let value = client.get(key.clone()).await?;

    Ok(Some((key, value)))
}

async fn database_action(
    client: Arc<dyn DatabaseClient + Send + Sync>,
    action: &str,
) -> ActionResponse {
    match action {
        "ping" => match client.ping().await {
            Ok(value) => ActionResponse::success(action).with("result", json!(value)),
            Err(err) => ActionResponse::backend_error(action, err),
        },
        "tables" => match client.tables().await {
            Ok(tables) => ActionResponse::success(action).with("tables", json!(tables)),
            Err(err) => ActionResponse::backend_error(action, err),
        },
        "version" => match client.version().await {
            Ok(version) => ActionResponse::success(action).with("version", json!(version)),
            Err(err) => ActionResponse::backend_error(action, err),
        },
        _ => ActionResponse::failure(action, "unknown action"),
    }
}

async fn filesystem_action(backend: StorageBackend, action: &str) -> ActionResponse {
    let storage = backend.kind().label();
    match action {
        "write" => match backend.write_test_file().await {
            Ok(file) => ActionResponse::success(action)
                .with("filename", json!(file.name))
                .with("content", json!(file.content))
                .with("storage", json!(storage)),
            Err(err) => ActionResponse::backend_error(action, err),
        },
        "read" => match backend.read_latest_test_file().await {
            Ok(Some(file)) => ActionResponse::success(action)
                .with("filename", json!(file.name))
                .with("content", json!(file.content))
                .with("storage", json!(storage)),
            Ok(None) => ActionResponse::failure(action, "no test files found"),
            Err(err) => ActionResponse::backend_error(action, err),
        },
        "list" => match backend.list_files().await {
            Ok(files) => ActionResponse::success(action)
                .with("files", json!(files))
                .with("storage", json!(storage)),
            Err(err) => ActionResponse::backend_error(action, err),
        },
        _ => ActionResponse::failure(action, "unknown action"),
    }
}

async fn session_action(
    store: Arc<dyn SessionStore + Send + Sync>,
    action: &str,
    session_id: &str,
) -> ActionResponse {
    match action {
        "set" => {
            let value = format!("test value {}", now_rfc3339());
            match set_session_value(store.as_ref(), session_id, value.clone()).await {
                Ok(()) => ActionResponse::success(action)
                    .with("key", json!("test_data"))
                    .with("value", json!(value)),
                Err(err) => ActionResponse::backend_error(action, err),
            }
        }
        "get" => match store.load(session_id).await {
            Ok(data) => {
                let value = data
                    .and_then(|data| data.test_data)
                    .unwrap_or_else(|| "not set".to_string());
                ActionResponse::success(action)
                    .with("key", json!("test_data"))
                    .with("value", json!(value))
            }
            Err(err) => ActionResponse::backend_error(action, err),
        },
        "count" => match store.increment_views(session_id).await {
            Ok(views) => ActionResponse::success(action)
                .with("views", json!(views))
                .with("session_id", json!(session_id))
                .with("store", json!(store.name())),
            Err(err) => ActionResponse::backend_error(action, err),
        },
        _ => ActionResponse::failure(action, "unknown action"),
    }
}

async fn set_session_value(
    store: &(dyn SessionStore + Send + Sync),
    id: &str,
    value: String,
) -> Result<()> {
    let mut data = store.load(id).await?.unwrap_or_default();
    data.test_data = Some(value);
    store.store(id, &data).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::MockDatabaseClient;
    use crate::redis::MockCacheClient;
    use crate::registry::ComponentRecord;
    use crate::session::MemorySessionStore;

    fn registry_with(kind: ComponentKind, record: ComponentRecord) -> ComponentRegistry {
        let registry = ComponentRegistry::new();
        registry.set(kind, record);
        registry
    }

    #[tokio::test]
    async fn unreachable_component_fails_fast() {
        let registry = registry_with(
            ComponentKind::Cache,
            ComponentRecord::unreachable("connection refused"),
        );

        let response = execute(&registry, ComponentKind::Cache, "ping", "sess").await;
        assert!(!response.success);
        assert_eq!(response.message.as_deref(), Some("cache not connected"));
    }

    #[tokio::test]
    async fn unreachable_status_blocks_io_even_with_a_handle() {
        let client = MockCacheClient::new();
        let mut record =
            ComponentRecord::connected("redis", BackendHandle::Cache(Arc::new(client.clone())));
        record.status = ComponentStatus::Unreachable;
        let registry = registry_with(ComponentKind::Cache, record);

        let response = execute(&registry, ComponentKind::Cache, "ping", "sess").await;

        assert!(!response.success);
        assert_eq!(client.calls(), 0);
    }

    #[tokio::test]
    async fn cache_set_then_get_returns_the_latest_key() {
        let client = MockCacheClient::new();
        client
            .set_ex(
                "test-key-1700000000000".to_string(),
                "older".to_string(),
                60,
            )
            .await
            .unwrap();
        client
            .set_ex(
                "test-key-1700000000005".to_string(),
                "newer".to_string(),
                60,
            )
            .await
            .unwrap();
        let registry = registry_with(
            ComponentKind::Cache,
            ComponentRecord::connected("redis", BackendHandle::Cache(Arc::new(client))),
        );

        let response = execute(&registry, ComponentKind::Cache, "get", "sess").await;

        assert!(response.success);
        assert_eq!(response.data["key"], json!("test-key-1700000000005"));
        assert_eq!(response.data["value"], json!("newer"));
    }

    #[tokio::test]
    async fn cache_get_without_keys_reports_failure() {
        let registry = registry_with(
            ComponentKind::Cache,
            ComponentRecord::connected(
                "redis",
                BackendHandle::Cache(Arc::new(MockCacheClient::new())),
            ),
        );

        let response = execute(&registry, ComponentKind::Cache, "get", "sess").await;

        assert!(!response.success);
        assert_eq!(response.message.as_deref(), Some("no test keys found"));
    }

    #[tokio::test]
    async fn backend_errors_are_embedded_not_raised() {
        let registry = registry_with(
            ComponentKind::Cache,
            ComponentRecord::connected(
                "redis",
                BackendHandle::Cache(Arc::new(MockCacheClient::failing("broken pipe"))),
            ),
        );

        let response = execute(&registry, ComponentKind::Cache, "ping", "sess").await;

        assert!(!response.success);
        assert_eq!(response.error.as_deref(), Some("broken pipe"));
    }

    #[tokio::test]
    async fn unknown_actions_are_rejected_per_kind() {
        let registry = ComponentRegistry::new();
        registry.set(
            ComponentKind::Cache,
            ComponentRecord::connected(
                "redis",
                BackendHandle::Cache(Arc::new(MockCacheClient::new())),
            ),
        );
        registry.set(
            ComponentKind::Database,
            ComponentRecord::connected(
                "postgres",
                BackendHandle::Database(Arc::new(MockDatabaseClient::new())),
            ),
        );
        let dir = tempfile::tempdir().unwrap();
        registry.set(
            ComponentKind::Filesystem,
            ComponentRecord::connected(
                "shared",
                BackendHandle::Filesystem(StorageBackend::shared(dir.path())),
            ),
        );
        registry.set(
            ComponentKind::Session,
            ComponentRecord::connected(
                "redis",
                BackendHandle::Session(Arc::new(MemorySessionStore::new())),
            ),
        );

        for kind in ComponentKind::ALL {
            let response = execute(&registry, kind, "flush-everything", "sess").await;
            assert!(!response.success, "{kind} accepted an unknown action");
            assert_eq!(response.message.as_deref(), Some("unknown action"));
        }
    }

    #[tokio::test]
    async fn database_failure_releases_the_pooled_connection() {
        let client = MockDatabaseClient::new();
        client.fail_next();
        let registry = registry_with(
            ComponentKind::Database,
            ComponentRecord::connected(
                "postgres",
                BackendHandle::Database(Arc::new(client.clone())),
            ),
        );

        let response = execute(&registry, ComponentKind::Database, "ping", "sess").await;

        assert!(!response.success);
        assert_eq!(
            response.error.as_deref(),
            Some("connection reset during query")
        );
        assert_eq!(client.outstanding(), 0);
    }

    #[tokio::test]
    async fn database_tables_and_version_answer() {
        let client = MockDatabaseClient::new().tables_ret(vec!["users".to_string()]);
        let registry = registry_with(
            ComponentKind::Database,
            ComponentRecord::connected("postgres", BackendHandle::Database(Arc::new(client))),
        );

        let tables = execute(&registry, ComponentKind::Database, "tables", "sess").await;
        assert!(tables.success);
        assert_eq!(tables.data["tables"], json!(["users"]));

        let version = execute(&registry, ComponentKind::Database, "version", "sess").await;
        assert!(version.success);
        assert!(version.data["version"]
            .as_str()
            .unwrap()
            .starts_with("PostgreSQL"));
    }

    #[tokio::test]
    async fn filesystem_write_then_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry_with(
            ComponentKind::Filesystem,
            ComponentRecord::degraded(
                "local-disk",
                BackendHandle::Filesystem(StorageBackend::local(dir.path())),
                "shared path missing",
            ),
        );

        let written = execute(&registry, ComponentKind::Filesystem, "write", "sess").await;
        assert!(written.success);
        assert_eq!(written.data["storage"], json!("local-disk"));

        let read = execute(&registry, ComponentKind::Filesystem, "read", "sess").await;
        assert!(read.success);
        assert_eq!(read.data["content"], written.data["content"]);
        assert_eq!(read.data["filename"], written.data["filename"]);
    }

    #[tokio::test]
    async fn session_count_increments_by_one_per_call() {
        let registry = registry_with(
            ComponentKind::Session,
            ComponentRecord::degraded(
                "in-memory",
                BackendHandle::Session(Arc::new(MemorySessionStore::new())),
                "cache not connected",
            ),
        );

        for expected in 1..=3u64 {
            let response = execute(&registry, ComponentKind::Session, "count", "sess-1").await;
            assert!(response.success);
            assert_eq!(response.data["views"], json!(expected));
            assert_eq!(response.data["store"], json!("in-memory"));
        }

        // another session starts back at one
        let response = execute(&registry, ComponentKind::Session, "count", "sess-2").await;
        assert_eq!(response.data["views"], json!(1));
    }

    #[tokio::test]
    async fn session_set_then_get_round_trips() {
        let registry = registry_with(
            ComponentKind::Session,
            ComponentRecord::connected(
                "redis",
                BackendHandle::Session(Arc::new(MemorySessionStore::new())),
            ),
        );

        let unset = execute(&registry, ComponentKind::Session, "get", "sess").await;
        assert!(unset.success);
        assert_eq!(unset.data["value"], json!("not set"));

        let set = execute(&registry, ComponentKind::Session, "set", "sess").await;
        assert!(set.success);

        let get = execute(&registry, ComponentKind::Session, "get", "sess").await;
        assert!(get.success);
        assert_eq!(get.data["value"], set.data["value"]);
    }
}

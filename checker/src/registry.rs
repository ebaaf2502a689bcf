use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, RwLock};

use serde::Serialize;

use crate::database::DatabaseClient;
use crate::redis::CacheClient;
use crate::session::SessionStore;
use crate::storage::StorageBackend;

/// The closed set of dependencies the service watches. Registry lookups
/// go through this enum, so an unknown kind cannot be named past the
/// route-parsing boundary.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum ComponentKind {
    Cache,
    Database,
    Filesystem,
    Session,
}

impl ComponentKind {
    pub const ALL: [ComponentKind; 4] = [
        ComponentKind::Cache,
        ComponentKind::Database,
        ComponentKind::Filesystem,
        ComponentKind::Session,
    ];
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ComponentKind::Cache => "cache",
            ComponentKind::Database => "database",
            ComponentKind::Filesystem => "filesystem",
            ComponentKind::Session => "session",
        };
        write!(f, "{name}")
    }
}

impl FromStr for ComponentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cache" => Ok(ComponentKind::Cache),
            "database" => Ok(ComponentKind::Database),
            "filesystem" => Ok(ComponentKind::Filesystem),
            "session" => Ok(ComponentKind::Session),
            invalid => Err(format!("{invalid} is not a known component")),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    /// Set when the record is created, replaced once startup probing
    /// settles.
    Checking,
    /// The primary backend answered the probe.
    Connected,
    /// Running on a substitute backend with lower guarantees.
    Degraded,
    /// No backend available; actions fail fast without I/O.
    Unreachable,
}

impl fmt::Display for ComponentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ComponentStatus::Checking => "checking",
            ComponentStatus::Connected => "connected",
            ComponentStatus::Degraded => "degraded",
            ComponentStatus::Unreachable => "unreachable",
        };
        write!(f, "{name}")
    }
}

/// The live backend for one component, dispatched over by kind. Handles
/// are owned by the registry; callers clone the inner `Arc` for the
/// duration of one dispatcher call only.
#[derive(Clone)]
pub enum BackendHandle {
    Cache(Arc<dyn CacheClient + Send + Sync>),
    Database(Arc<dyn DatabaseClient + Send + Sync>),
    Filesystem(StorageBackend),
    Session(Arc<dyn SessionStore + Send + Sync>),
}

#[derive(Clone)]
pub struct ComponentRecord {
    pub status: ComponentStatus,
    /// Label of the active implementation, e.g. `redis` or `local-disk`.
    pub backend: String,
    /// Endpoint or path in use, masked connection descriptor, last error
    /// reason. Never holds raw credentials.
    pub detail: HashMap<String, String>,
    pub handle: Option<BackendHandle>,
}

impl ComponentRecord {
    pub fn checking() -> ComponentRecord {
        ComponentRecord {
            status: ComponentStatus::Checking,
            backend: "none".to_string(),
            detail: HashMap::new(),
            handle: None,
        }
    }

    pub fn connected(backend: &str, handle: BackendHandle) -> ComponentRecord {
        ComponentRecord {
            status: ComponentStatus::Connected,
            backend: backend.to_string(),
            detail: HashMap::new(),
            handle: Some(handle),
        }
    }

    pub fn degraded(
        backend: &str,
        handle: BackendHandle,
        reason: impl Into<String>,
    ) -> ComponentRecord {
        let mut detail = HashMap::new();
        detail.insert("reason".to_string(), reason.into());
        ComponentRecord {
            status: ComponentStatus::Degraded,
            backend: backend.to_string(),
            detail,
            handle: Some(handle),
        }
    }

    pub fn unreachable(reason: impl Into<String>) -> ComponentRecord {
        let mut detail = HashMap::new();
        detail.insert("reason".to_string(), reason.into());
        ComponentRecord {
            status: ComponentStatus::Unreachable,
            backend: "none".to_string(),
            detail,
            handle: None,
        }
    }

    pub fn with_detail(mut self, key: &str, value: impl Into<String>) -> ComponentRecord {
        self.detail.insert(key.to_string(), value.into());
        self
    }
}

/// Handle-free view of a record, safe to hand to reporting code.
#[derive(Clone, Debug)]
pub struct ComponentSnapshot {
    pub status: ComponentStatus,
    pub backend: String,
    pub detail: HashMap<String, String>,
}

/// Process-wide component table, seeded with a `Checking` record per kind
/// and written only by startup probing. Cloning shares the table.
#[derive(Clone)]
pub struct ComponentRegistry {
    components: Arc<RwLock<HashMap<ComponentKind, ComponentRecord>>>,
}

impl ComponentRegistry {
    pub fn new() -> ComponentRegistry {
        let mut components = HashMap::new();
        for kind in ComponentKind::ALL {
            components.insert(kind, ComponentRecord::checking());
        }

        ComponentRegistry {
            components: Arc::new(RwLock::new(components)),
        }
    }

    pub fn get(&self, kind: ComponentKind) -> ComponentRecord {
        self.components
            .read()
            .expect("poisoned ComponentRegistry lock")
            .get(&kind)
            .cloned()
            .expect("registry seeds a record for every component kind")
    }

    pub fn set(&self, kind: ComponentKind, record: ComponentRecord) {
        self.components
            .write()
            .expect("poisoned ComponentRegistry lock")
            .insert(kind, record);
    }

    pub fn snapshot(&self) -> HashMap<ComponentKind, ComponentSnapshot> {
        self.components
            .read()
            .expect("poisoned ComponentRegistry lock")
            .iter()
            .map(|(kind, record)| {
                (
                    *kind,
                    ComponentSnapshot {
                        status: record.status,
                        backend: record.backend.clone(),
                        detail: record.detail.clone(),
                    },
                )
            })
            .collect()
    }

    /// The active session store, if the session component holds one.
    pub fn session_store(&self) -> Option<Arc<dyn SessionStore + Send + Sync>> {
        match self.get(ComponentKind::Session).handle {
            Some(BackendHandle::Session(store)) => Some(store),
            _ => None,
        }
    }
}

impl Default for ComponentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::redis::MockCacheClient;
    use crate::session::MemorySessionStore;

    #[test]
    fn registry_seeds_every_kind_as_checking() {
        let registry = ComponentRegistry::new();

        for kind in ComponentKind::ALL {
            let record = registry.get(kind);
            assert_eq!(record.status, ComponentStatus::Checking);
            assert!(record.handle.is_none());
        }
    }

    #[test]
    fn set_replaces_the_record() {
        let registry = ComponentRegistry::new();
        let record = ComponentRecord::connected(
            "redis",
            BackendHandle::Cache(Arc::new(MockCacheClient::new())),
        )
        .with_detail("endpoint", "redis://cache.internal:6379/");

        registry.set(ComponentKind::Cache, record);

        let stored = registry.get(ComponentKind::Cache);
        assert_eq!(stored.status, ComponentStatus::Connected);
        assert_eq!(stored.backend, "redis");
        assert_eq!(
            stored.detail.get("endpoint").map(String::as_str),
            Some("redis://cache.internal:6379/")
        );
        assert!(stored.handle.is_some());
    }

    #[test]
    fn snapshot_covers_all_kinds() {
        let registry = ComponentRegistry::new();
        registry.set(
            ComponentKind::Session,
            ComponentRecord::degraded(
                "in-memory",
                BackendHandle::Session(Arc::new(MemorySessionStore::new())),
                "cache not connected",
            ),
        );

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.len(), 4);
        let session = snapshot.get(&ComponentKind::Session).unwrap();
        assert_eq!(session.status, ComponentStatus::Degraded);
        assert_eq!(
            session.detail.get("reason").map(String::as_str),
            Some("cache not connected")
        );
    }

    #[test]
    fn session_store_follows_the_session_record() {
        let registry = ComponentRegistry::new();
        assert!(registry.session_store().is_none());

        registry.set(
            ComponentKind::Session,
            ComponentRecord::degraded(
                "in-memory",
                BackendHandle::Session(Arc::new(MemorySessionStore::new())),
                "cache not connected",
            ),
        );
        assert!(registry.session_store().is_some());
    }

    #[test]
    fn component_kind_parses_route_segments() {
        assert_eq!("cache".parse::<ComponentKind>(), Ok(ComponentKind::Cache));
        assert_eq!(
            "session".parse::<ComponentKind>(),
            Ok(ComponentKind::Session)
        );
        assert!("widget".parse::<ComponentKind>().is_err());
        assert_eq!(ComponentKind::Filesystem.to_string(), "filesystem");
    }

    #[test]
    fn statuses_serialize_lowercase() {
        assert_eq!(
            serde_json::to_string(&ComponentStatus::Degraded).unwrap(),
            "\"degraded\""
        );
        assert_eq!(ComponentStatus::Unreachable.to_string(), "unreachable");
    }
}

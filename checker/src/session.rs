use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, HeaderValue, Request};
use axum::middleware::Next;
use axum::response::Response;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::redis::CacheClient;

pub const SESSION_COOKIE: &str = "checker_session";
pub const SESSION_TTL_SECONDS: usize = 86400;

const SESSION_KEY_PREFIX: &str = "session:";

/// Per-session state: the dashboard view counter and the diagnostic test
/// value, both scoped to the caller's cookie.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionData {
    #[serde(default)]
    pub views: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test_data: Option<String>,
}

#[async_trait]
pub trait SessionStore {
    /// Label reported to callers, `redis` or `in-memory`.
    fn name(&self) -> &'static str;

    async fn load(&self, id: &str) -> Result<Option<SessionData>>;

    async fn store(&self, id: &str, data: &SessionData) -> Result<()>;

    async fn increment_views(&self, id: &str) -> Result<u64> {
        let mut data = self.load(id).await?.unwrap_or_default();
        data.views += 1;
        self.store(id, &data).await?;

        Ok(data.views)
    }
}

/// Sessions stored as JSON in the distributed cache, sharing the probed
/// cache connection. Entries expire with the cookie.
pub struct RedisSessionStore {
    cache: Arc<dyn CacheClient + Send + Sync>,
}

impl RedisSessionStore {
    pub fn new(cache: Arc<dyn CacheClient + Send + Sync>) -> RedisSessionStore {
        RedisSessionStore { cache }
    }
}

#[async_trait]
impl SessionStore for RedisSessionStore {
    fn name(&self) -> &'static str {
        "redis"
    }

    async fn load(&self, id: &str) -> Result<Option<SessionData>> {
        let raw = self.cache.get(format!("{SESSION_KEY_PREFIX}{id}")).await?;
        match raw {
            Some(raw) => {
                let data =
                    serde_json::from_str(&raw).context("failed to parse stored session data")?;
                Ok(Some(data))
            }
            None => Ok(None),
        }
    }

    async fn store(&self, id: &str, data: &SessionData) -> Result<()> {
        let raw = serde_json::to_string(data).context("failed to serialize session data")?;
        self.cache
            .set_ex(format!("{SESSION_KEY_PREFIX}{id}"), raw, SESSION_TTL_SECONDS)
            .await
    }
}

/// In-process substitute used when the cache is down. Sessions are lost
/// on restart and invisible to other instances.
#[derive(Default)]
pub struct MemorySessionStore {
    sessions: Mutex<HashMap<String, SessionData>>,
}

impl MemorySessionStore {
    pub fn new() -> MemorySessionStore {
        Default::default()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    fn name(&self) -> &'static str {
        "in-memory"
    }

    async fn load(&self, id: &str) -> Result<Option<SessionData>> {
        Ok(self
            .sessions
            .lock()
            .expect("poisoned session store mutex")
            .get(id)
            .cloned())
    }

    async fn store(&self, id: &str, data: &SessionData) -> Result<()> {
        self.sessions
            .lock()
            .expect("poisoned session store mutex")
            .insert(id.to_string(), data.clone());

        Ok(())
    }
}

/// The caller's session identifier, set by `session_middleware` for every
/// request.
#[derive(Clone, Debug)]
pub struct SessionId(pub String);

/// Cookie-based session identification. Assigns a fresh id when the
/// request carries none and answers with a `Set-Cookie` header.
pub async fn session_middleware(mut request: Request<Body>, next: Next) -> Response {
    let existing = request
        .headers()
        .get(header::COOKIE)
        .and_then(|value| value.to_str().ok())
        .and_then(session_cookie_value);

    let (id, issued) = match existing {
        Some(id) => (id, false),
        None => (Uuid::now_v7().to_string(), true),
    };

    request.extensions_mut().insert(SessionId(id.clone()));
    let mut response = next.run(request).await;

    if issued {
        match HeaderValue::from_str(&format!(
            "{SESSION_COOKIE}={id}; Path=/; HttpOnly; Max-Age={SESSION_TTL_SECONDS}"
        )) {
            Ok(cookie) => {
                response.headers_mut().append(header::SET_COOKIE, cookie);
            }
            Err(err) => tracing::warn!("failed to build session cookie: {err}"),
        }
    }

    response
}

fn session_cookie_value(header: &str) -> Option<String> {
    header.split(';').map(str::trim).find_map(|pair| {
        let (name, value) = pair.split_once('=')?;
        (name == SESSION_COOKIE && Uuid::parse_str(value).is_ok()).then(|| value.to_string())
    })
}

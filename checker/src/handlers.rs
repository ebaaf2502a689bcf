use axum::extract::{Path, State};
use axum::response::Html;
use axum::{Extension, Json};

use crate::api::ActionResponse;
use crate::dispatch;
use crate::registry::ComponentKind;
use crate::router;
use crate::session::SessionId;
use crate::status::{self, SessionInfo, StatusReport};

/// Minimal status page. Loading it counts as a visit, like the
/// diagnostic `session/count` action does.
pub async fn index(
    State(state): State<router::State>,
    Extension(SessionId(session_id)): Extension<SessionId>,
) -> Html<String> {
    let views = match state.registry.session_store() {
        Some(store) => match store.increment_views(&session_id).await {
            Ok(views) => Some(views),
            Err(err) => {
                tracing::warn!("failed to update session views: {err}");
                None
            }
        },
        None => None,
    };

    let mut rows = String::new();
    for kind in ComponentKind::ALL {
        let record = state.registry.get(kind);
        rows.push_str(&format!(
            "    <tr><td>{kind}</td><td class=\"{status}\">{status}</td><td>{backend}</td></tr>\n",
            status = record.status,
            backend = record.backend,
        ));
    }

    let views = views.map_or_else(|| "-".to_string(), |views| views.to_string());
    Html(format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8">
  <title>Component Checker</title>
  <style>
    body {{ font-family: sans-serif; margin: 2em; }}
    td, th {{ padding: 0.3em 1em; border-bottom: 1px solid #ddd; }}
    .connected {{ color: green; }}
    .degraded {{ color: orange; }}
    .unreachable {{ color: red; }}
  </style>
</head>
<body>
  <h1>Component Checker</h1>
  <p>host: {hostname} | environment: {environment} | views: {views}</p>
  <table>
    <tr><th>component</th><th>status</th><th>backend</th></tr>
{rows}  </table>
</body>
</html>
"#,
        hostname = state.hostname,
        environment = state.environment,
    ))
}

/// Liveness only: answers as long as the process runs, regardless of the
/// component registry.
pub async fn health() -> &'static str {
    "ok"
}

pub async fn system_status(
    State(state): State<router::State>,
    Extension(SessionId(session_id)): Extension<SessionId>,
) -> Json<StatusReport> {
    let session = match state.registry.session_store() {
        Some(store) => {
            let views = match store.load(&session_id).await {
                Ok(data) => data.map_or(0, |data| data.views),
                Err(err) => {
                    tracing::warn!("failed to load session data: {err}");
                    0
                }
            };
            Some(SessionInfo {
                id: session_id,
                views,
            })
        }
        None => None,
    };

    Json(status::report(
        &state.registry.snapshot(),
        &state.hostname,
        &state.environment,
        session,
    ))
}

pub async fn component_action(
    State(state): State<router::State>,
    Path((component, action)): Path<(String, String)>,
    Extension(SessionId(session_id)): Extension<SessionId>,
) -> ActionResponse {
    match component.parse::<ComponentKind>() {
        Ok(kind) => dispatch::execute(&state.registry, kind, &action, &session_id).await,
        Err(_) => ActionResponse::failure(&action, "unknown component"),
    }
}

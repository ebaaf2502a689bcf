use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::{Map, Value};

/// Uniform result shape for every diagnostic action. Backend errors are
/// embedded in the body instead of propagating; the HTTP status stays 200
/// so callers only have to look at the `success` flag.
#[derive(Debug, Serialize)]
pub struct ActionResponse {
    pub success: bool,
    pub action: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(flatten)]
    pub data: Map<String, Value>,
}

impl ActionResponse {
    pub fn success(action: &str) -> Self {
        Self {
            success: true,
            action: action.to_string(),
            message: None,
            error: None,
            data: Map::new(),
        }
    }

    pub fn failure(action: &str, message: impl Into<String>) -> Self {
        Self {
            success: false,
            action: action.to_string(),
            message: Some(message.into()),
            error: None,
            data: Map::new(),
        }
    }

    pub fn backend_error(action: &str, error: anyhow::Error) -> Self {
        Self {
            success: false,
            action: action.to_string(),
            message: None,
            error: Some(error.to_string()),
            data: Map::new(),
        }
    }

    pub fn with(mut self, key: &str, value: Value) -> Self {
        self.data.insert(key.to_string(), value);
        self
    }
}

impl IntoResponse for ActionResponse {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self)).into_response()
    }
}

// Errors surfaced by the backend client

use thiserror::Error;

/// Generic message shown when a failed login or registration carries no detail.
pub const AUTH_FALLBACK_MESSAGE: &str = "Authentication failed";

#[derive(Debug, Error)]
pub enum ApiError {
    /// The request never completed (connection refused, reset, timeout, ...)
    #[error("backend not reachable: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("backend returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("{0}")]
    Auth(String),

    #[error("not logged in; run `docgen login` first")]
    NotAuthenticated,

    #[error("export failed: {0}")]
    Export(String),

    #[error("unexpected response from backend: {0}")]
    InvalidResponse(String),
}

/// Pulls a human readable message out of an error body.
///
/// Understands `{"error": ...}`, `{"detail": ...}`, `{"message": ...}` and
/// field error maps such as `{"username": ["already taken"]}`.
pub fn server_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    let object = value.as_object()?;

    for key in ["error", "detail", "message"] {
        if let Some(text) = object.get(key).and_then(first_text) {
            return Some(text);
        }
    }

    object.values().find_map(first_text)
}

fn first_text(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        serde_json::Value::Array(items) => items.iter().find_map(first_text),
        serde_json::Value::Object(map) => map.values().find_map(first_text),
        _ => None,
    }
}

// Handles communication with the DocGen backend

use std::time::Duration;

use chrono::Utc;
use reqwest::{Client, RequestBuilder, Response};
use tracing::{debug, warn};

use crate::error::{server_message, ApiError, AUTH_FALLBACK_MESSAGE};
use crate::models::{
    Credentials, ExportFormat, ExportRequest, GenerationRequest, HistoryEntry, TokenResponse,
};
use crate::status::ConnectionState;

const STATUS_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone)]
pub struct BackendClient {
    base_url: String,
    http_client: Client,
    token: Option<String>,
}

impl BackendClient {
    pub fn new(base_url: impl Into<String>, connect_timeout: Duration) -> Result<Self, ApiError> {
        let http_client = Client::builder().connect_timeout(connect_timeout).build()?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http_client,
            token: None,
        })
    }

    /// Attaches a bearer token to every following request.
    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    fn require_token(&self) -> Result<(), ApiError> {
        if self.is_authenticated() {
            Ok(())
        } else {
            Err(ApiError::NotAuthenticated)
        }
    }

    /// Starts a generation and hands back the response whose body is the document stream.
    pub async fn generate(&self, request: &GenerationRequest) -> Result<Response, ApiError> {
        let response = self
            .authorized(self.http_client.post(self.url("generate/")))
            .json(request)
            .send()
            .await?;

        ensure_success(response).await
    }

    /// Asks the backend whether it is online. Never fails: any error means offline.
    pub async fn status(&self) -> ConnectionState {
        let response = self
            .http_client
            .get(self.url("status/"))
            .query(&[("t", Utc::now().timestamp_millis())])
            .timeout(STATUS_TIMEOUT)
            .send()
            .await;

        let response = match response {
            Ok(response) if response.status().is_success() => response,
            Ok(response) => {
                debug!(status = %response.status(), "status check rejected");
                return ConnectionState::Offline;
            }
            Err(e) => {
                debug!(error = %e, "status check failed");
                return ConnectionState::Offline;
            }
        };

        let body = response.text().await.unwrap_or_default();
        match serde_json::from_str::<serde_json::Value>(&body)
            .ok()
            .and_then(|json| json.get("online").and_then(|online| online.as_bool()))
        {
            Some(false) => ConnectionState::Offline,
            _ => ConnectionState::Online,
        }
    }

    pub async fn register(&self, credentials: &Credentials) -> Result<(), ApiError> {
        let response = self
            .http_client
            .post(self.url("register/"))
            .json(credentials)
            .send()
            .await?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(auth_error(response).await)
        }
    }

    /// Logs in and returns the access token issued by the backend.
    pub async fn login(&self, credentials: &Credentials) -> Result<String, ApiError> {
        let response = self
            .http_client
            .post(self.url("login/"))
            .json(credentials)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(auth_error(response).await);
        }

        let body = response.text().await?;
        serde_json::from_str::<TokenResponse>(&body)
            .map(|token| token.access)
            .map_err(|_| {
                warn!("login response carried no access token");
                ApiError::Auth(server_message(&body).unwrap_or_else(|| AUTH_FALLBACK_MESSAGE.to_string()))
            })
    }

    pub async fn history(&self) -> Result<Vec<HistoryEntry>, ApiError> {
        self.require_token()?;

        let response = self
            .authorized(self.http_client.get(self.url("history/")))
            .send()
            .await?;
        let response = ensure_success(response).await?;

        response
            .json::<Vec<HistoryEntry>>()
            .await
            .map_err(|e| ApiError::InvalidResponse(e.to_string()))
    }

    pub async fn delete_history(&self, id: i64) -> Result<(), ApiError> {
        self.require_token()?;

        let response = self
            .authorized(
                self.http_client
                    .delete(self.url(&format!("history/{}/delete/", id))),
            )
            .send()
            .await?;

        ensure_success(response).await.map(|_| ())
    }

    /// Renders `docs` in the requested format and returns the whole file.
    pub async fn export(&self, format: ExportFormat, docs: &str) -> Result<Vec<u8>, ApiError> {
        if docs.trim().is_empty() {
            return Err(ApiError::Export("no documentation to export".to_string()));
        }

        let response = self
            .authorized(self.http_client.post(self.url(format.endpoint())))
            .json(&ExportRequest { docs })
            .send()
            .await
            .map_err(|e| ApiError::Export(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Export(
                server_message(&body).unwrap_or_else(|| format!("backend returned {}", status)),
            ));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| ApiError::Export(e.to_string()))?;

        // The backend answers `{"error": ...}` with 200 when there is nothing to render.
        if let Some(message) = std::str::from_utf8(&bytes).ok().and_then(server_message) {
            return Err(ApiError::Export(message));
        }

        Ok(bytes.to_vec())
    }
}

async fn ensure_success(response: Response) -> Result<Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(ApiError::Status {
        status: status.as_u16(),
        message: server_message(&body).unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("request failed")
                .to_string()
        }),
    })
}

async fn auth_error(response: Response) -> ApiError {
    let body = response.text().await.unwrap_or_default();
    ApiError::Auth(server_message(&body).unwrap_or_else(|| AUTH_FALLBACK_MESSAGE.to_string()))
}

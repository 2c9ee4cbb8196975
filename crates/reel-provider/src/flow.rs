//! Client for the session-authenticated Flow web API.
//!
//! The API is undocumented, so the client probes a fixed list of endpoints
//! and request shapes and accepts whichever answers with a result URL or a
//! job id.

use std::time::Duration;

use async_trait::async_trait;
use reel_models::{CredentialSlot, GenerationRequest, GenerationStart, OperationHandle, OperationStatus};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::error::{ProviderError, ProviderResult};
use crate::GenerationProvider;

const DEFAULT_BASE_URL: &str = "https://labs.withgoogle.com/flow";

const START_ENDPOINTS: &[&str] = &[
    "/api/videos",
    "/api/video",
    "/api/generate",
    "/_/api/videos",
    "/_/api/generate",
];

const STATUS_ENDPOINTS: &[&str] = &["/api/videos", "/api/video", "/_/api/videos"];

const URL_FIELDS: &[&str] = &["/download_url", "/video_url", "/url", "/result/url", "/data/url"];
const JOB_ID_FIELDS: &[&str] = &["/id", "/video_id", "/jobId", "/job_id", "/result/id"];
const STATE_FIELDS: &[&str] = &["/status", "/state", "/phase"];
const FINISHED_URL_FIELDS: &[&str] = &["/asset/download_url", "/result/download_url", "/artifact/url"];
const FINISHED_STATES: &[&str] = &["succeeded", "finished", "done", "completed"];
const FAILED_STATES: &[&str] = &["failed", "error", "cancelled"];

/// Configuration for the Flow client.
#[derive(Debug, Clone)]
pub struct FlowConfig {
    pub base_url: String,
    /// Header carrying the session key, e.g. `Authorization`
    pub header_name: Option<String>,
    /// Prefix put in front of the key in that header, e.g. `Bearer `
    pub header_prefix: String,
    /// Cookie carrying the session key
    pub cookie_name: Option<String>,
    pub timeout: Duration,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            header_name: Some("Authorization".to_string()),
            header_prefix: "Bearer ".to_string(),
            cookie_name: None,
            timeout: Duration::from_secs(60),
        }
    }
}

impl FlowConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            base_url: std::env::var("REEL_FLOW_BASE_URL")
                .ok()
                .filter(|s| !s.is_empty())
                .map(|s| s.trim_end_matches('/').to_string())
                .unwrap_or(defaults.base_url),
            header_name: match std::env::var("REEL_FLOW_HEADER_NAME") {
                Ok(name) if name.is_empty() => None,
                Ok(name) => Some(name),
                Err(_) => defaults.header_name,
            },
            header_prefix: std::env::var("REEL_FLOW_HEADER_PREFIX").unwrap_or(defaults.header_prefix),
            cookie_name: std::env::var("REEL_FLOW_COOKIE_NAME").ok().filter(|s| !s.is_empty()),
            timeout: Duration::from_secs(
                std::env::var("REEL_PROVIDER_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(60),
            ),
        }
    }
}

pub struct FlowClient {
    http: Client,
    config: FlowConfig,
    session: CredentialSlot,
}

impl FlowClient {
    pub fn new(config: FlowConfig, session: CredentialSlot) -> ProviderResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(ProviderError::Network)?;
        Ok(Self { http, config, session })
    }

    /// Create from environment variables (`REEL_FLOW_SESSION_KEY` for the key).
    pub fn from_env() -> ProviderResult<Self> {
        Self::new(FlowConfig::from_env(), CredentialSlot::from_env("REEL_FLOW_SESSION_KEY"))
    }

    pub fn session(&self) -> &CredentialSlot {
        &self.session
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn authorized(&self, mut builder: RequestBuilder) -> ProviderResult<RequestBuilder> {
        let key = self.session.get().ok_or(ProviderError::MissingCredential)?;
        if let Some(name) = &self.config.header_name {
            builder = builder.header(name.as_str(), format!("{}{}", self.config.header_prefix, key));
        }
        if let Some(cookie) = &self.config.cookie_name {
            builder = builder.header(reqwest::header::COOKIE, format!("{cookie}={key}"));
        }
        Ok(builder)
    }

    fn body_shapes(prompt: &str) -> [Value; 4] {
        [
            json!({ "prompt": prompt }),
            json!({ "input": prompt }),
            json!({ "text": prompt }),
            json!({ "request": { "prompt": prompt } }),
        ]
    }
}

fn auth_rejected(status: StatusCode) -> bool {
    status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN
}

/// First non-empty string at any of `pointers`. Numeric ids count too.
fn first_field(value: &Value, pointers: &[&str]) -> Option<String> {
    pointers.iter().find_map(|p| match value.pointer(p)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

/// Interpret a status document. Anything without a result or a failure is still running.
fn status_from_document(doc: &Value) -> OperationStatus {
    if let Some(url) = first_field(doc, URL_FIELDS) {
        return OperationStatus::succeeded(url);
    }
    let state = first_field(doc, STATE_FIELDS).map(|s| s.to_ascii_lowercase());
    match state.as_deref() {
        Some(s) if FINISHED_STATES.contains(&s) => match first_field(doc, FINISHED_URL_FIELDS) {
            Some(url) => OperationStatus::succeeded(url),
            None => OperationStatus::running(None),
        },
        Some(s) if FAILED_STATES.contains(&s) => {
            let message = first_field(doc, &["/error/message", "/error", "/message"])
                .unwrap_or_else(|| format!("Generation {s}"));
            OperationStatus::failed(message)
        }
        _ => OperationStatus::running(None),
    }
}

#[async_trait]
impl GenerationProvider for FlowClient {
    async fn start(&self, request: &GenerationRequest) -> ProviderResult<GenerationStart> {
        for endpoint in START_ENDPOINTS {
            let url = self.url(endpoint);
            for body in Self::body_shapes(&request.prompt) {
                let response = match self.authorized(self.http.post(&url).json(&body))?.send().await {
                    Ok(response) => response,
                    Err(e) => {
                        debug!(url, error = %e, "Flow endpoint unreachable");
                        continue;
                    }
                };

                let status = response.status();
                if auth_rejected(status) {
                    return Err(ProviderError::http(
                        status.as_u16(),
                        format!("Auth failed with status {}", status.as_u16()),
                    ));
                }

                let text = response.text().await.unwrap_or_default();
                let Ok(doc) = serde_json::from_str::<Value>(&text) else {
                    continue;
                };

                if let Some(uri) = first_field(&doc, URL_FIELDS) {
                    info!(url, "Flow returned a result immediately");
                    return Ok(GenerationStart::Immediate { uri });
                }
                if let Some(id) = first_field(&doc, JOB_ID_FIELDS) {
                    info!(url, job = %id, "Flow accepted generation");
                    return Ok(GenerationStart::Pending {
                        handle: OperationHandle::new(id),
                    });
                }
            }
        }
        Err(ProviderError::NoEndpoint)
    }

    async fn status(&self, handle: &OperationHandle) -> ProviderResult<OperationStatus> {
        for endpoint in STATUS_ENDPOINTS {
            let url = self.url(&format!("{}/{}", endpoint, handle.as_str()));
            let response = match self.authorized(self.http.get(&url))?.send().await {
                Ok(response) => response,
                Err(e) => {
                    debug!(url, error = %e, "Flow status endpoint unreachable");
                    continue;
                }
            };

            let status = response.status();
            if auth_rejected(status) {
                return Err(ProviderError::http(
                    status.as_u16(),
                    format!("Auth failed with status {}", status.as_u16()),
                ));
            }
            if !status.is_success() {
                continue;
            }

            let text = response.text().await.unwrap_or_default();
            if let Ok(doc) = serde_json::from_str::<Value>(&text) {
                return Ok(status_from_document(&doc));
            }
        }
        Err(ProviderError::NoEndpoint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reel_models::OperationOutcome;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> FlowClient {
        let config = FlowConfig {
            base_url: server.uri(),
            cookie_name: Some("session".to_string()),
            ..Default::default()
        };
        FlowClient::new(config, CredentialSlot::new(Some("tok".to_string()))).unwrap()
    }

    #[test]
    fn test_status_document_shapes() {
        assert_eq!(
            status_from_document(&json!({"result": {"url": "https://v/1.mp4"}})).outcome(),
            OperationOutcome::Succeeded {
                uri: "https://v/1.mp4".to_string()
            }
        );
        assert_eq!(
            status_from_document(&json!({"state": "completed", "artifact": {"url": "https://v/2.mp4"}}))
                .outcome(),
            OperationOutcome::Succeeded {
                uri: "https://v/2.mp4".to_string()
            }
        );
        assert_eq!(
            status_from_document(&json!({"status": "running"})).outcome(),
            OperationOutcome::Pending
        );
        assert!(matches!(
            status_from_document(&json!({"status": "failed", "error": {"message": "blocked"}})).outcome(),
            OperationOutcome::Failed { ref message } if message == "blocked"
        ));
    }

    #[tokio::test]
    async fn test_start_probes_until_job_id() {
        let server = MockServer::start().await;
        // First endpoint answers with HTML for every shape.
        Mock::given(method("POST"))
            .and(path("/api/videos"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html></html>"))
            .expect(4)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/video"))
            .and(body_json(json!({"input": "eagle"})))
            .and(header("authorization", "Bearer tok"))
            .and(header("cookie", "session=tok"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"job_id": 42})))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/video"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let start = client(&server).start(&GenerationRequest::new("eagle")).await.unwrap();
        assert_eq!(
            start,
            GenerationStart::Pending {
                handle: OperationHandle::new("42")
            }
        );
    }

    #[tokio::test]
    async fn test_start_auth_failure_stops_probing() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;

        let err = client(&server).start(&GenerationRequest::new("eagle")).await.unwrap_err();
        assert!(err.is_credential_error());
    }

    #[tokio::test]
    async fn test_status_falls_through_candidates() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/videos/7"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/video/7"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"video_url": "https://v/7.mp4"})))
            .mount(&server)
            .await;

        let status = client(&server).status(&OperationHandle::new("7")).await.unwrap();
        assert_eq!(status.result_uri.as_deref(), Some("https://v/7.mp4"));
        assert!(status.done);
    }
}

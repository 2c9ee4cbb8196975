//! Client for the long-running `predictLongRunning` video API.

use std::time::Duration;

use async_trait::async_trait;
use reel_models::{
    CredentialSlot, GenerationRequest, GenerationStart, OperationHandle, OperationStatus, VideoQuality,
};
use reqwest::{Client, RequestBuilder, Response};
use tracing::{debug, info};

use crate::error::{ProviderError, ProviderResult};
use crate::types::{Operation, PredictInstance, PredictParameters, PredictRequest};
use crate::GenerationProvider;

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const FAST_MODEL: &str = "veo-3.0-fast-generate-001";
const STANDARD_MODEL: &str = "veo-3.0-generate-001";
const API_KEY_HEADER: &str = "x-goog-api-key";

/// Configuration for the LRO client.
#[derive(Debug, Clone)]
pub struct LroClientConfig {
    /// API root, without trailing slash
    pub base_url: String,
    /// Model override; when unset the model follows the request quality
    pub model: Option<String>,
    /// Per-request timeout
    pub timeout: Duration,
}

impl Default for LroClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            model: None,
            timeout: Duration::from_secs(60),
        }
    }
}

impl LroClientConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            base_url: std::env::var("REEL_PROVIDER_URL")
                .map(|s| s.trim_end_matches('/').to_string())
                .unwrap_or_else(|_| DEFAULT_BASE_URL.to_string()),
            model: std::env::var("REEL_VIDEO_MODEL").ok().filter(|s| !s.is_empty()),
            timeout: Duration::from_secs(
                std::env::var("REEL_PROVIDER_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(60),
            ),
        }
    }

    pub fn model_for(&self, quality: VideoQuality) -> &str {
        match (&self.model, quality) {
            (Some(model), _) => model,
            (None, VideoQuality::Fast) => FAST_MODEL,
            (None, VideoQuality::Standard) => STANDARD_MODEL,
        }
    }
}

/// Client for the provider's long-running generation endpoints.
pub struct LroClient {
    http: Client,
    config: LroClientConfig,
    credential: CredentialSlot,
}

impl LroClient {
    pub fn new(config: LroClientConfig, credential: CredentialSlot) -> ProviderResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(ProviderError::Network)?;

        Ok(Self {
            http,
            config,
            credential,
        })
    }

    /// Create from environment variables (`GEMINI_API_KEY` for the key).
    pub fn from_env() -> ProviderResult<Self> {
        Self::new(LroClientConfig::from_env(), CredentialSlot::from_env("GEMINI_API_KEY"))
    }

    pub fn credential(&self) -> &CredentialSlot {
        &self.credential
    }

    fn authorized(&self, builder: RequestBuilder) -> ProviderResult<RequestBuilder> {
        let key = self.credential.get().ok_or(ProviderError::MissingCredential)?;
        Ok(builder.header(API_KEY_HEADER, key))
    }

    async fn read_operation(response: Response) -> ProviderResult<Operation> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::http(status.as_u16(), body));
        }
        Ok(response.json().await?)
    }
}

#[async_trait]
impl GenerationProvider for LroClient {
    async fn start(&self, request: &GenerationRequest) -> ProviderResult<GenerationStart> {
        let model = self.config.model_for(request.quality);
        let url = format!("{}/models/{}:predictLongRunning", self.config.base_url, model);
        let body = PredictRequest {
            instances: vec![PredictInstance {
                prompt: request.prompt.clone(),
            }],
            parameters: PredictParameters {
                aspect_ratio: request.aspect_ratio.as_str().to_string(),
            },
        };

        debug!(model, "Submitting generation");
        let response = self.authorized(self.http.post(&url).json(&body))?.send().await?;
        let operation = Self::read_operation(response).await?;

        if operation.done {
            if let Some(uri) = operation.video_uri() {
                info!(model, "Generation finished immediately");
                return Ok(GenerationStart::Immediate { uri: uri.to_string() });
            }
            if let Some(error) = operation.error {
                return Err(ProviderError::Rejected(error.message));
            }
        }

        let name = operation
            .name
            .filter(|n| !n.is_empty())
            .ok_or_else(|| ProviderError::invalid_response("operation has no name"))?;
        info!(model, operation = %name, "Generation accepted");
        Ok(GenerationStart::Pending {
            handle: OperationHandle::new(name),
        })
    }

    async fn status(&self, handle: &OperationHandle) -> ProviderResult<OperationStatus> {
        let url = format!("{}/{}", self.config.base_url, handle.as_str().trim_start_matches('/'));
        let response = self.authorized(self.http.get(&url))?.send().await?;
        let operation = Self::read_operation(response).await?;
        Ok(operation.into_status())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reel_models::{AspectRatio, OperationOutcome};
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer, key: Option<&str>) -> LroClient {
        let config = LroClientConfig {
            base_url: server.uri(),
            ..Default::default()
        };
        LroClient::new(config, CredentialSlot::new(key.map(str::to_string))).unwrap()
    }

    #[test]
    fn test_config_defaults() {
        let config = LroClientConfig::default();
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.model_for(VideoQuality::Fast), FAST_MODEL);
        assert_eq!(config.model_for(VideoQuality::Standard), STANDARD_MODEL);
    }

    #[tokio::test]
    async fn test_start_returns_pending_handle() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!("/models/{FAST_MODEL}:predictLongRunning")))
            .and(header("x-goog-api-key", "k1"))
            .and(body_json(serde_json::json!({
                "instances": [{"prompt": "A majestic eagle"}],
                "parameters": {"aspectRatio": "9:16"}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "name": "models/veo/operations/op-1"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let request = GenerationRequest::new("A majestic eagle").with_aspect_ratio(AspectRatio::Portrait);
        let start = client(&server, Some("k1")).start(&request).await.unwrap();
        assert_eq!(
            start,
            GenerationStart::Pending {
                handle: OperationHandle::new("models/veo/operations/op-1")
            }
        );
    }

    #[tokio::test]
    async fn test_status_parses_progress_and_result() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/models/veo/operations/op-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "name": "models/veo/operations/op-1",
                "done": true,
                "response": {"generatedVideos": [{"video": {"uri": "https://files/eagle.mp4"}}]}
            })))
            .mount(&server)
            .await;

        let status = client(&server, Some("k1"))
            .status(&OperationHandle::new("models/veo/operations/op-1"))
            .await
            .unwrap();
        assert_eq!(
            status.outcome(),
            OperationOutcome::Succeeded {
                uri: "https://files/eagle.mp4".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_rejected_key_is_credential_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403).set_body_string("API key not valid"))
            .mount(&server)
            .await;

        let err = client(&server, Some("bad"))
            .start(&GenerationRequest::new("x"))
            .await
            .unwrap_err();
        assert!(err.is_credential_error());
        assert!(err.to_string().contains("API key not valid"));
    }

    #[tokio::test]
    async fn test_missing_key_sends_nothing() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let err = client(&server, None)
            .start(&GenerationRequest::new("x"))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::MissingCredential));
    }
}

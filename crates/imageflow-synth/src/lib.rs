//! Image Synthesis Client: generates an image from text + aspect ratio,
//! via a Vertex Imagen-style primary provider with automatic fallback to a
//! fal.ai-style secondary provider on quota exhaustion.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use imageflow_core::error::PipelineError;
use imageflow_core::models::AspectRatio;
use imageflow_core::traits::SynthesisClient;
use serde_json::{json, Value};
use tracing::{info, warn};

/// An error from the primary provider, already classified as either a
/// quota condition (which triggers fallback) or anything else (which
/// propagates unchanged, per spec.md §4.4).
enum PrimaryOutcome {
    Image(Vec<u8>),
    QuotaExhausted,
    Other(PipelineError),
}

pub struct VertexImagenClient {
    http: reqwest::Client,
    auth: gcp_auth::AuthenticationManager,
    project_id: String,
    location: String,
}

impl VertexImagenClient {
    /// `credentials_path` must be an absolute path to a service-account
    /// credentials JSON file (resolved by [`imageflow_core::Config`] at
    /// startup). Loading the credentials explicitly, rather than letting
    /// `gcp_auth` rediscover them from the ambient environment, is what
    /// makes an invalid or missing path a startup failure instead of an
    /// opaque error on the first request.
    pub async fn new(
        project_id: impl Into<String>,
        location: impl Into<String>,
        credentials_path: impl AsRef<std::path::Path>,
    ) -> Result<Self, PipelineError> {
        let service_account = gcp_auth::CustomServiceAccount::from_file(credentials_path.as_ref())
            .map_err(|e| PipelineError::Configuration(format!("failed to load Google application credentials: {e}")))?;
        let auth = gcp_auth::AuthenticationManager::from(service_account);
        Ok(Self {
            http: reqwest::Client::new(),
            auth,
            project_id: project_id.into(),
            location: location.into(),
        })
    }

    async fn call(&self, prompt: &str, aspect_ratio: &str) -> PrimaryOutcome {
        let token = match self
            .auth
            .get_token(&["https://www.googleapis.com/auth/cloud-platform"])
            .await
        {
            Ok(t) => t,
            Err(e) => return PrimaryOutcome::Other(PipelineError::Transport(format!("failed to mint access token: {e}"))),
        };

        let url = format!(
            "https://{}-aiplatform.googleapis.com/v1/projects/{}/locations/{}/publishers/google/models/imagen-3.0-generate-001:predict",
            self.location, self.project_id, self.location
        );

        let body = json!({
            "instances": [{ "prompt": prompt }],
            "parameters": { "sampleCount": 1, "aspectRatio": aspect_ratio },
        });

        let resp = match self
            .http
            .post(&url)
            .bearer_auth(token.as_str())
            .json(&body)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => return PrimaryOutcome::Other(PipelineError::Transport(e.to_string())),
        };

        let status = resp.status();
        let payload: Value = match resp.json().await {
            Ok(v) => v,
            Err(e) => return PrimaryOutcome::Other(PipelineError::Transport(format!("malformed synthesis response: {e}"))),
        };

        if !status.is_success() {
            if is_quota_exhausted(&payload) {
                return PrimaryOutcome::QuotaExhausted;
            }
            return PrimaryOutcome::Other(PipelineError::Transport(format!(
                "image synthesis returned {status}: {payload}"
            )));
        }

        match extract_inline_image(&payload) {
            Some(bytes) => PrimaryOutcome::Image(bytes),
            None => PrimaryOutcome::Other(PipelineError::Transport(
                "synthesis response contained no inline image data".into(),
            )),
        }
    }
}

/// Quota detection per spec.md §4.4: numeric code 8, string status
/// `RESOURCE_EXHAUSTED`, or `details`+`message` (uppercased) containing
/// `RESOURCE_EXHAUSTED` or `QUOTA`.
fn is_quota_exhausted(payload: &Value) -> bool {
    let error = &payload["error"];
    if error["code"].as_i64() == Some(8) {
        return true;
    }
    if error["status"].as_str() == Some("RESOURCE_EXHAUSTED") {
        return true;
    }
    let combined = format!("{}{}", error["details"], error["message"].as_str().unwrap_or(""))
        .to_uppercase();
    combined.contains("RESOURCE_EXHAUSTED") || combined.contains("QUOTA")
}

fn extract_inline_image(payload: &Value) -> Option<Vec<u8>> {
    let prediction = payload["predictions"].as_array()?.first()?;
    let b64 = prediction["bytesBase64Encoded"].as_str()?;
    BASE64.decode(b64).ok()
}

pub struct FallbackImageClient {
    http: reqwest::Client,
    endpoint: String,
    model_id: String,
    api_key: Option<String>,
    output_format: String,
}

impl FallbackImageClient {
    pub fn new(endpoint: impl Into<String>, model_id: impl Into<String>, api_key: Option<String>, output_format: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: endpoint.into(),
            model_id: model_id.into(),
            api_key,
            output_format: output_format.into(),
        }
    }

    async fn call(&self, prompt: &str, aspect_ratio: &str) -> Result<Vec<u8>, PipelineError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| PipelineError::FallbackUnavailable("no fallback API key configured".into()))?;

        let body = json!({
            "prompt": prompt,
            "model": self.model_id,
            "num_images": 1,
            "aspect_ratio": aspect_ratio,
            "output_format": self.output_format,
        });

        let resp = self
            .http
            .post(&self.endpoint)
            .header("Authorization", format!("Key {api_key}"))
            .json(&body)
            .send()
            .await
            .map_err(|e| PipelineError::Transport(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(PipelineError::Transport(format!("fallback provider returned {status}: {text}")));
        }

        let payload: FallbackResponse = resp
            .json()
            .await
            .map_err(|e| PipelineError::Transport(format!("malformed fallback response: {e}")))?;

        let first = payload
            .images
            .into_iter()
            .next()
            .ok_or_else(|| PipelineError::Transport("fallback provider returned no images".into()))?;

        let image_resp = self
            .http
            .get(&first.url)
            .send()
            .await
            .map_err(|e| PipelineError::Transport(e.to_string()))?;
        let bytes = image_resp
            .bytes()
            .await
            .map_err(|e| PipelineError::Transport(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}

#[derive(serde::Deserialize)]
struct FallbackResponse {
    images: Vec<FallbackImage>,
}

#[derive(serde::Deserialize)]
struct FallbackImage {
    url: String,
}

pub struct ImageSynthesisPipeline {
    primary: VertexImagenClient,
    fallback: FallbackImageClient,
    default_aspect_ratio: AspectRatio,
}

impl ImageSynthesisPipeline {
    pub fn new(primary: VertexImagenClient, fallback: FallbackImageClient, default_aspect_ratio: AspectRatio) -> Self {
        Self { primary, fallback, default_aspect_ratio }
    }
}

impl SynthesisClient for ImageSynthesisPipeline {
    async fn generate(&self, prompt: &str, aspect_ratio: AspectRatio) -> Result<Vec<u8>, PipelineError> {
        let ratio = aspect_ratio.to_string();
        match self.primary.call(prompt, &ratio).await {
            PrimaryOutcome::Image(bytes) => Ok(bytes),
            PrimaryOutcome::Other(e) => Err(e),
            PrimaryOutcome::QuotaExhausted => {
                warn!("primary synthesis provider quota exhausted, routing to fallback");
                let fallback_ratio = if ratio.is_empty() { self.default_aspect_ratio.to_string() } else { ratio };
                let bytes = self.fallback.call(prompt, &fallback_ratio).await?;
                info!("fallback synthesis provider succeeded");
                Ok(bytes)
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    #[test]
    fn detects_quota_by_numeric_code() {
        let payload = json!({ "error": { "code": 8, "message": "exhausted", "status": "X" } });
        assert!(is_quota_exhausted(&payload));
    }

    #[test]
    fn detects_quota_by_status_string() {
        let payload = json!({ "error": { "code": 1, "message": "nope", "status": "RESOURCE_EXHAUSTED" } });
        assert!(is_quota_exhausted(&payload));
    }

    #[test]
    fn detects_quota_by_message_substring() {
        let payload = json!({ "error": { "code": 1, "message": "Quota exceeded for this project", "status": "X" } });
        assert!(is_quota_exhausted(&payload));
    }

    #[test]
    fn non_quota_error_is_not_detected() {
        let payload = json!({ "error": { "code": 3, "message": "invalid argument", "status": "INVALID_ARGUMENT" } });
        assert!(!is_quota_exhausted(&payload));
    }

    #[test]
    fn extracts_inline_base64_image() {
        let encoded = BASE64.encode(b"fake-image-bytes");
        let payload = json!({ "predictions": [{ "bytesBase64Encoded": encoded, "mimeType": "image/png" }] });
        assert_eq!(extract_inline_image(&payload).unwrap(), b"fake-image-bytes");
    }

    #[tokio::test]
    async fn fallback_without_api_key_is_unavailable() {
        let client = FallbackImageClient::new("https://fal.example.test/run", "fal-ai/gemini", None, "png");
        let err = client.call("a prompt", "1:1").await.unwrap_err();
        assert!(matches!(err, PipelineError::FallbackUnavailable(_)));
    }
}

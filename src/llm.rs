use crate::config::Config;
use crate::error::ModelError;
use crate::streaming::data_payloads;
use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Callback receiving streamed text fragments
pub type DeltaSink<'a> = &'a (dyn Fn(&str) + Send + Sync);

/// The external model service, seen from the conversation
#[async_trait]
pub trait GenerativeModel: Send + Sync {
    /// Model identifier shown in the status line
    fn model_name(&self) -> &str;

    /// Send one prompt and return the complete answer text.
    /// An empty string means the service answered without text.
    async fn generate(&self, prompt: &str) -> Result<String, ModelError>;

    /// Like `generate`, but report fragments to `on_delta` as they arrive.
    /// The returned text is the full answer.
    async fn generate_streaming(
        &self,
        prompt: &str,
        on_delta: DeltaSink<'_>,
    ) -> Result<String, ModelError> {
        let text = self.generate(prompt).await?;
        if !text.is_empty() {
            on_delta(&text);
        }
        Ok(text)
    }
}

/// Connection settings for `GeminiClient`
#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
}

impl From<&Config> for ClientSettings {
    fn from(config: &Config) -> Self {
        Self {
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
        }
    }
}

/// Request body for `generateContent`
#[derive(Debug, Serialize)]
pub struct GenerateContentRequest {
    pub contents: Vec<Content>,
}

impl GenerateContentRequest {
    pub fn from_prompt(prompt: &str) -> Self {
        Self {
            contents: vec![Content {
                role: Some("user".to_string()),
                parts: vec![Part {
                    text: Some(prompt.to_string()),
                }],
            }],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub content: Option<Content>,
    pub finish_reason: Option<String>,
}

impl GenerateContentResponse {
    /// Text of the first candidate, parts concatenated
    pub fn text(&self) -> String {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|content| {
                content
                    .parts
                    .iter()
                    .filter_map(|p| p.text.as_deref())
                    .collect::<String>()
            })
            .unwrap_or_default()
    }

    /// Why the first candidate stopped, present on the last chunk of an answer
    pub fn finish_reason(&self) -> Option<&str> {
        self.candidates.first()?.finish_reason.as_deref()
    }
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

/// Build an `Api` error from a non-success status and body
pub fn parse_error_response(status: u16, body: &str) -> ModelError {
    let message = serde_json::from_str::<ErrorEnvelope>(body)
        .map(|e| e.error.message)
        .unwrap_or_else(|_| body.trim().to_string());
    ModelError::Api { status, message }
}

/// Client for the Google generative-language REST API
#[derive(Clone)]
pub struct GeminiClient {
    settings: ClientSettings,
    client: reqwest::Client,
}

impl GeminiClient {
    pub fn new(settings: ClientSettings) -> Result<Self, ModelError> {
        let client = reqwest::Client::builder().build()?;
        Ok(Self { settings, client })
    }

    fn endpoint(&self, action: &str) -> String {
        format!(
            "{}/models/{}:{}",
            self.settings.base_url, self.settings.model, action
        )
    }

    fn api_key(&self) -> Result<&str, ModelError> {
        self.settings
            .api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or(ModelError::MissingApiKey)
    }

    async fn post(&self, url: &str, prompt: &str) -> Result<reqwest::Response, ModelError> {
        let api_key = self.api_key()?;
        let payload = GenerateContentRequest::from_prompt(prompt);

        let response = self
            .client
            .post(url)
            .header("x-goog-api-key", api_key)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let err = parse_error_response(status.as_u16(), &body);
            warn!(%status, error = %err, "model request rejected");
            return Err(err);
        }

        Ok(response)
    }
}

#[async_trait]
impl GenerativeModel for GeminiClient {
    fn model_name(&self) -> &str {
        &self.settings.model
    }

    async fn generate(&self, prompt: &str) -> Result<String, ModelError> {
        let url = self.endpoint("generateContent");
        debug!(model = %self.settings.model, chars = prompt.len(), "sending prompt");

        let response = self.post(&url, prompt).await?;
        let body = response.text().await?;
        let parsed: GenerateContentResponse = serde_json::from_str(&body)?;
        Ok(parsed.text())
    }

    async fn generate_streaming(
        &self,
        prompt: &str,
        on_delta: DeltaSink<'_>,
    ) -> Result<String, ModelError> {
        let url = format!("{}?alt=sse", self.endpoint("streamGenerateContent"));
        debug!(model = %self.settings.model, chars = prompt.len(), "streaming prompt");

        let response = self.post(&url, prompt).await?;
        let payloads = data_payloads(response.bytes_stream());
        futures::pin_mut!(payloads);

        let mut full_text = String::new();
        let mut finished = false;
        while let Some(data) = payloads.next().await {
            let chunk: GenerateContentResponse = serde_json::from_str(&data?)?;
            if chunk.finish_reason().is_some() {
                finished = true;
            }
            let text = chunk.text();
            if !text.is_empty() {
                on_delta(&text);
                full_text.push_str(&text);
            }
        }

        // Every complete answer ends with a chunk carrying `finishReason`
        if !finished {
            warn!(received = full_text.len(), "stream ended before the answer finished");
            return Err(ModelError::StreamClosed);
        }
        Ok(full_text)
    }
}

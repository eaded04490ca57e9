//! Gemini (Google) image transformation.

use crate::error::{parse_retry_after, sanitize_error_message, PlushyError, Result};
use crate::image::{TransformationRequest, TransformationResult};
use crate::transform::provider::ImageTransformer;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Default Generative Language API endpoint.
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Finish reasons that mean the output was withheld by a safety filter.
const SAFETY_FINISH_REASONS: &[&str] = &[
    "SAFETY",
    "IMAGE_SAFETY",
    "IMAGE_PROHIBITED_CONTENT",
    "IMAGE_RECITATION",
    "RECITATION",
    "PROHIBITED_CONTENT",
    "BLOCKLIST",
];

/// Gemini image model variants.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum GeminiModel {
    /// Nano Banana - Gemini 2.5 Flash Image.
    #[default]
    NanoBanana,
    /// Nano Banana Pro - Gemini 3 Pro Image.
    NanoBananaPro,
}

impl GeminiModel {
    /// Returns the API model identifier.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NanoBanana => "gemini-2.5-flash-image",
            Self::NanoBananaPro => "nano-banana-pro-preview",
        }
    }
}

/// Builder for [`GeminiTransformer`].
#[derive(Debug, Clone)]
pub struct GeminiTransformerBuilder {
    api_key: Option<String>,
    model: String,
    base_url: String,
}

impl Default for GeminiTransformerBuilder {
    fn default() -> Self {
        Self {
            api_key: None,
            model: GeminiModel::default().as_str().to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }
}

impl GeminiTransformerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the API key. Falls back to `GOOGLE_API_KEY`, then `API_KEY`.
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Sets the Gemini model variant.
    pub fn model(mut self, model: GeminiModel) -> Self {
        self.model = model.as_str().to_string();
        self
    }

    /// Sets a model identifier not covered by [`GeminiModel`].
    pub fn model_id(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Overrides the API endpoint.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Builds the transformer, resolving the API key.
    pub fn build(self) -> Result<GeminiTransformer> {
        let api_key = self
            .api_key
            .or_else(|| std::env::var("GOOGLE_API_KEY").ok())
            .or_else(|| std::env::var("API_KEY").ok())
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| {
                PlushyError::Auth("GOOGLE_API_KEY not set and no API key provided".into())
            })?;

        Ok(GeminiTransformer {
            client: reqwest::Client::new(),
            api_key,
            model: self.model,
            base_url: self.base_url.trim_end_matches('/').to_string(),
        })
    }
}

/// Gemini image transformer.
pub struct GeminiTransformer {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiTransformer {
    /// Creates a new `GeminiTransformerBuilder`.
    pub fn builder() -> GeminiTransformerBuilder {
        GeminiTransformerBuilder::new()
    }

    fn model_url(&self) -> String {
        format!("{}/v1beta/models/{}", self.base_url, self.model)
    }

    async fn transform_impl(&self, request: &TransformationRequest) -> Result<TransformationResult> {
        let start = Instant::now();
        let url = format!("{}:generateContent", self.model_url());
        let body = GeminiRequest::from_transformation_request(request);

        tracing::debug!(
            model = %self.model,
            mime_type = %request.mime_type,
            payload_len = request.image_base64.len(),
            "submitting transformation request"
        );

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let headers = response.headers().clone();
            let text = response.text().await.unwrap_or_default();
            return Err(parse_error(status.as_u16(), &text, &headers));
        }

        let gemini_response: GeminiResponse = response.json().await?;
        let mut result = extract_image(gemini_response)?;

        let duration_ms = start.elapsed().as_millis() as u64;
        tracing::debug!(duration_ms, "transformation complete");

        result.model = Some(self.model.clone());
        result.duration_ms = Some(duration_ms);
        Ok(result)
    }
}

/// Maps a non-success HTTP response onto the crate error.
fn parse_error(status: u16, text: &str, headers: &reqwest::header::HeaderMap) -> PlushyError {
    let text = sanitize_error_message(text);
    if status == 404 {
        return PlushyError::Api {
            status,
            message: "Model not found. Verify the model name is correct.".into(),
        };
    }
    if status == 429 {
        let retry_after = parse_retry_after(headers).map(std::time::Duration::from_secs);
        return PlushyError::RateLimited { retry_after };
    }
    if status == 401 || status == 403 {
        return PlushyError::Auth(text);
    }
    let lower = text.to_lowercase();
    if lower.contains("safety") || lower.contains("blocked") || lower.contains("prohibited") {
        return PlushyError::ContentBlocked(text);
    }
    PlushyError::Api {
        status,
        message: text,
    }
}

/// Pulls the first inline image out of a response.
///
/// Only the first candidate is considered. Its parts are scanned in order
/// and the first one carrying inline data wins.
fn extract_image(response: GeminiResponse) -> Result<TransformationResult> {
    if let Some(feedback) = &response.prompt_feedback {
        if let Some(reason) = &feedback.block_reason {
            let msg = feedback
                .block_reason_message
                .clone()
                .unwrap_or_else(|| format!("Prompt blocked: {reason}"));
            return Err(PlushyError::ContentBlocked(msg));
        }
    }

    let candidate = response.candidates.into_iter().next();
    let finish_reason = candidate.as_ref().and_then(|c| c.finish_reason.clone());
    let parts = candidate
        .and_then(|c| c.content)
        .map(|content| content.parts)
        .unwrap_or_default();

    if parts.is_empty() {
        if let Some(reason) = finish_reason.filter(|r| SAFETY_FINISH_REASONS.contains(&r.as_str())) {
            return Err(PlushyError::ContentBlocked(format!(
                "Content blocked by Gemini safety filter: {reason}"
            )));
        }
        return Err(PlushyError::NoContentGenerated);
    }

    let inline = parts
        .iter()
        .filter_map(|p| p.inline_data.as_ref())
        .find(|inline| !inline.data.is_empty())
        .ok_or(PlushyError::NoImageData)?;

    tracing::debug!(
        mime_type = inline.mime_type.as_deref().unwrap_or("unknown"),
        "found inline image"
    );
    Ok(TransformationResult::from_base64(&inline.data))
}

#[async_trait]
impl ImageTransformer for GeminiTransformer {
    async fn transform(&self, request: &TransformationRequest) -> Result<TransformationResult> {
        self.transform_impl(request).await
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn name(&self) -> &str {
        "Gemini (Google)"
    }

    async fn health_check(&self) -> Result<()> {
        let response = self
            .client
            .get(self.model_url())
            .header("x-goog-api-key", &self.api_key)
            .send()
            .await?;

        match response.status().as_u16() {
            401 | 403 => Err(PlushyError::Auth("Invalid API key".into())),
            404 => Err(PlushyError::Api {
                status: 404,
                message: "Model not found. Verify the model name is correct.".into(),
            }),
            s if !(200..300).contains(&s) => Err(PlushyError::Api {
                status: s,
                message: "Health check failed".into(),
            }),
            _ => Ok(()),
        }
    }
}

// Request/Response types
#[derive(Debug, Serialize)]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
}

#[derive(Debug, Serialize)]
struct GeminiContent {
    parts: Vec<GeminiRequestPart>,
}

/// A part in a Gemini request - either inline image data or text.
#[derive(Debug, Serialize)]
#[serde(untagged)]
enum GeminiRequestPart {
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
    Text {
        text: String,
    },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

impl GeminiRequest {
    fn from_transformation_request(req: &TransformationRequest) -> Self {
        let parts = vec![
            GeminiRequestPart::InlineData {
                inline_data: InlineData {
                    mime_type: req.mime_type.clone(),
                    data: req.image_base64.clone(),
                },
            },
            GeminiRequestPart::Text {
                text: req.instruction.clone(),
            },
        ];

        Self {
            contents: vec![GeminiContent { parts }],
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    #[serde(default)]
    content: Option<GeminiContentResponse>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
    #[serde(default)]
    block_reason_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiContentResponse {
    #[serde(default)]
    parts: Vec<GeminiPartResponse>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiPartResponse {
    #[serde(default)]
    inline_data: Option<InlineDataResponse>,
}

/// Inline data in a response. Only `data` is needed to return an image.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineDataResponse {
    #[serde(default)]
    mime_type: Option<String>,
    #[serde(default)]
    data: String,
}

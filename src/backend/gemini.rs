// Google Gemini API backend
//
// `reason` goes to the vision/language model, `render` to the image model.
// Both use the generateContent endpoint; images travel as base64 inlineData
// parts. Retries live in `RetryingBackend`, not here: one call = one attempt.

use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{
    strip_markdown_fences, AspectRatio, BackendError, GenerativeBackend, ImageData, ReasonOutput,
    ReasonRequest, RenderRequest,
};
use crate::config::BackendConfig;

/// Google Gemini API backend
#[derive(Clone)]
pub struct GeminiBackend {
    client: Client,
    config: BackendConfig,
}

impl GeminiBackend {
    /// Create a backend from explicit configuration.
    pub fn new(config: BackendConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client, config })
    }

    pub fn reasoning_model(&self) -> &str {
        &self.config.reasoning_model
    }

    pub fn image_model(&self) -> &str {
        &self.config.image_model
    }

    fn endpoint(&self, model: &str) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.config.base_url.trim_end_matches('/'),
            model
        )
    }

    /// Convert a ReasonRequest to Gemini API format
    fn to_reason_request(request: &ReasonRequest) -> GeminiRequest {
        // Images first so the text can refer to "the image(s) above"
        let mut parts: Vec<GeminiPart> = request
            .image_inputs
            .iter()
            .map(GeminiPart::from_image)
            .collect();
        parts.extend(request.text_inputs.iter().map(|text| GeminiPart::Text {
            text: text.clone(),
        }));

        let generation_config = GeminiGenerationConfig {
            temperature: request.temperature,
            response_mime_type: request
                .output_schema
                .as_ref()
                .map(|_| "application/json".to_string()),
            response_json_schema: request.output_schema.clone(),
            ..Default::default()
        };

        GeminiRequest {
            contents: vec![GeminiContent {
                role: "user".to_string(),
                parts,
            }],
            generation_config: Some(generation_config),
        }
    }

    /// Convert a RenderRequest to Gemini API format
    fn to_render_request(request: &RenderRequest) -> GeminiRequest {
        let generation_config = GeminiGenerationConfig {
            temperature: request.temperature,
            response_modalities: Some(vec!["IMAGE".to_string(), "TEXT".to_string()]),
            image_config: Some(GeminiImageConfig {
                aspect_ratio: request.aspect_ratio,
            }),
            ..Default::default()
        };

        GeminiRequest {
            contents: vec![GeminiContent {
                role: "user".to_string(),
                parts: vec![GeminiPart::Text {
                    text: request.description.clone(),
                }],
            }],
            generation_config: Some(generation_config),
        }
    }

    async fn post(&self, model: &str, body: &GeminiRequest) -> Result<GeminiResponse, BackendError> {
        let url = self.endpoint(model);
        tracing::debug!(model, parts = body.part_count(), "Sending request to Gemini API");

        let response = self
            .client
            .post(&url)
            .header("content-type", "application/json")
            .header("x-goog-api-key", &self.config.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| self.classify_transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &error_body));
        }

        response
            .json::<GeminiResponse>()
            .await
            .map_err(|e| BackendError::unavailable(format!("unreadable Gemini response: {}", e)))
    }

    fn classify_transport_error(&self, e: reqwest::Error) -> BackendError {
        if e.is_timeout() {
            BackendError::Timeout(Duration::from_secs(self.config.request_timeout_secs))
        } else {
            BackendError::unavailable(format!("failed to reach Gemini API: {}", e))
        }
    }
}

/// 408/429/5xx are worth retrying; anything else will fail the same way again.
fn classify_status(status: StatusCode, body: &str) -> BackendError {
    let reason = format!("Gemini API request failed\n\nStatus: {}\nBody: {}", status, body);
    if status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
        || status.is_server_error()
    {
        BackendError::unavailable(reason)
    } else {
        BackendError::rejected(reason)
    }
}

#[async_trait]
impl GenerativeBackend for GeminiBackend {
    async fn reason(&self, request: &ReasonRequest) -> Result<ReasonOutput, BackendError> {
        let body = Self::to_reason_request(request);
        let response = self.post(&self.config.reasoning_model, &body).await?;
        let text = response.text();

        if text.trim().is_empty() {
            return Err(BackendError::unavailable("Gemini returned no text"));
        }

        if request.expects_structured() {
            serde_json::from_str(strip_markdown_fences(&text))
                .map(ReasonOutput::Structured)
                .map_err(|e| BackendError::SchemaMismatch(e.to_string()))
        } else {
            Ok(ReasonOutput::Text(text.trim().to_string()))
        }
    }

    async fn render(&self, request: &RenderRequest) -> Result<ImageData, BackendError> {
        let body = Self::to_render_request(request);
        let response = self.post(&self.config.image_model, &body).await?;

        match response.first_image() {
            Some(Ok(image)) => Ok(image),
            Some(Err(e)) => Err(BackendError::unavailable(format!(
                "Gemini returned undecodable image data: {}",
                e
            ))),
            None => Err(BackendError::unavailable("No image data in API response")),
        }
    }

    fn name(&self) -> &str {
        "gemini"
    }
}

// Gemini API types

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GeminiGenerationConfig>,
}

impl GeminiRequest {
    fn part_count(&self) -> usize {
        self.contents.iter().map(|c| c.parts.len()).sum()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct GeminiContent {
    #[serde(default)]
    role: String, // "user" or "model"
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum GeminiPart {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: GeminiBlob,
    },
    // Thoughts, function calls and anything else we never ask for
    #[serde(skip_serializing)]
    Other(serde_json::Value),
}

impl GeminiPart {
    fn from_image(image: &ImageData) -> Self {
        Self::InlineData {
            inline_data: GeminiBlob {
                mime_type: image.media_type.clone(),
                data: BASE64.encode(&image.bytes),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiBlob {
    mime_type: String,
    data: String,
}

#[derive(Debug, Clone, Serialize, Default)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_json_schema: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_modalities: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    image_config: Option<GeminiImageConfig>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiImageConfig {
    aspect_ratio: AspectRatio,
}

#[derive(Debug, Clone, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Clone, Deserialize)]
#[allow(dead_code)]
struct GeminiCandidate {
    #[serde(default)]
    content: Option<GeminiContent>,
    #[serde(rename = "finishReason")]
    finish_reason: Option<String>,
}

impl GeminiResponse {
    fn first_parts(&self) -> &[GeminiPart] {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|c| c.parts.as_slice())
            .unwrap_or(&[])
    }

    /// Concatenated text parts of the first candidate
    fn text(&self) -> String {
        self.first_parts()
            .iter()
            .filter_map(|part| match part {
                GeminiPart::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }

    /// First inline image of the first candidate
    fn first_image(&self) -> Option<Result<ImageData, base64::DecodeError>> {
        self.first_parts().iter().find_map(|part| match part {
            GeminiPart::InlineData { inline_data } if inline_data.mime_type.starts_with("image/") => {
                Some(
                    BASE64
                        .decode(inline_data.data.as_bytes())
                        .map(|bytes| ImageData::new(bytes, inline_data.mime_type.clone())),
                )
            }
            _ => None,
        })
    }
}

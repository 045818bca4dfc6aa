//! Thin client for the Google generative-language REST API.
//!
//! Each call site builds a fresh client from the current credential; the
//! client holds no session state beyond the reqwest connection pool.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::error::GatewayError;

const BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Default chat/text model.
pub const CHAT_MODEL: &str = "gemini-2.5-flash";
/// Image-capable model used for editing (image in, image+text out).
pub const IMAGE_EDIT_MODEL: &str = "gemini-2.5-flash-image-preview";
/// Dedicated image-generation model.
pub const IMAGE_GEN_MODEL: &str = "imagen-4.0-generate-001";

// ── Request types ────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub(crate) struct GenerateContentRequest {
    pub contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<Tool>>,
    #[serde(rename = "generationConfig", skip_serializing_if = "Option::is_none")]
    pub generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(
        rename = "inlineData",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub inline_data: Option<InlineData>,
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            inline_data: None,
        }
    }

    pub fn inline_data(mime_type: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            text: None,
            inline_data: Some(InlineData {
                mime_type: mime_type.into(),
                data: data.into(),
            }),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct InlineData {
    #[serde(rename = "mimeType")]
    pub mime_type: String,
    pub data: String,
}

/// Model augmentation tools. URL-context and web-search are mutually
/// exclusive; the request builder only ever sets one.
#[derive(Debug, Default, Serialize)]
pub(crate) struct Tool {
    #[serde(rename = "url_context", skip_serializing_if = "Option::is_none")]
    pub url_context: Option<EmptyConfig>,
    #[serde(rename = "google_search", skip_serializing_if = "Option::is_none")]
    pub google_search: Option<EmptyConfig>,
}

impl Tool {
    pub fn url_context() -> Self {
        Self {
            url_context: Some(EmptyConfig {}),
            ..Self::default()
        }
    }

    pub fn web_search() -> Self {
        Self {
            google_search: Some(EmptyConfig {}),
            ..Self::default()
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct EmptyConfig {}

#[derive(Debug, Default, Serialize)]
pub(crate) struct GenerationConfig {
    #[serde(
        rename = "responseMimeType",
        skip_serializing_if = "Option::is_none"
    )]
    pub response_mime_type: Option<String>,
    #[serde(rename = "responseSchema", skip_serializing_if = "Option::is_none")]
    pub response_schema: Option<serde_json::Value>,
    #[serde(rename = "thinkingConfig", skip_serializing_if = "Option::is_none")]
    pub thinking_config: Option<ThinkingConfig>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ThinkingConfig {
    #[serde(rename = "thinkingBudget")]
    pub thinking_budget: i32,
}

// ── Response types ───────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub(crate) struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Candidate {
    pub content: Option<Content>,
    #[serde(rename = "urlContextMetadata", default)]
    pub url_context_metadata: Option<UrlContextMetadata>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct UrlContextMetadata {
    #[serde(rename = "urlMetadata", default)]
    pub url_metadata: Vec<UrlMetadata>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct UrlMetadata {
    #[serde(rename = "retrievedUrl", default)]
    pub retrieved_url: Option<String>,
    #[serde(rename = "urlRetrievalStatus", default)]
    pub url_retrieval_status: Option<String>,
}

impl GenerateContentResponse {
    /// All text parts of the first candidate, concatenated.
    pub fn text(&self) -> String {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|content| {
                content
                    .parts
                    .iter()
                    .filter_map(|p| p.text.as_deref())
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default()
    }
}

// ── Client ───────────────────────────────────────────────────────────

pub struct GeminiClient {
    http: Client,
    api_key: String,
}

impl GeminiClient {
    pub fn new(api_key: &str) -> Result<Self, GatewayError> {
        Ok(Self {
            http: Client::builder()
                .timeout(Duration::from_secs(120))
                .build()?,
            api_key: api_key.to_string(),
        })
    }

    /// Liveness/validity probe against the model-listing endpoint, used
    /// before a candidate key is persisted.
    pub async fn verify_key(&self) -> Result<(), GatewayError> {
        let url = format!("{}/models?key={}", BASE_URL, self.api_key);
        let resp = self.http.get(url).send().await?;
        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(GatewayError::from_status(status, &body));
        }
        Ok(())
    }

    pub(crate) async fn generate(
        &self,
        model: &str,
        request: &GenerateContentRequest,
    ) -> Result<GenerateContentResponse, GatewayError> {
        debug!(model, "generateContent request");
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            BASE_URL, model, self.api_key
        );
        let resp = self.http.post(url).json(request).send().await?;
        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(GatewayError::from_status(status, &body));
        }
        let body: GenerateContentResponse = resp.json().await?;
        Ok(body)
    }

    /// Raw POST against a model's `:predict` endpoint (Imagen).
    pub(crate) async fn predict(
        &self,
        model: &str,
        request: &serde_json::Value,
    ) -> Result<serde_json::Value, GatewayError> {
        debug!(model, "predict request");
        let url = format!("{}/models/{}:predict?key={}", BASE_URL, model, self.api_key);
        let resp = self.http.post(url).json(request).send().await?;
        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(GatewayError::from_status(status, &body));
        }
        let body: serde_json::Value = resp.json().await?;
        Ok(body)
    }
}

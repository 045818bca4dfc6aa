//! Contextual chat completion and initial-suggestion generation.

use shared::chat::UrlRetrieval;
use shared::context::LocalContext;
use tracing::debug;

use crate::error::GatewayError;
use crate::gemini::{
    Content, GeminiClient, GenerateContentRequest, GenerationConfig, Part, ThinkingConfig, Tool,
    CHAT_MODEL,
};

/// Request-time settings for a chat completion.
#[derive(Debug, Clone, Default)]
pub struct ChatOptions {
    /// Use live web search instead of URL-context augmentation.
    pub use_web_search: bool,
    /// When false, the model is asked to spend no reasoning effort.
    pub thinking: bool,
    /// Optional custom system-prompt prefix.
    pub system_prompt: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ChatReply {
    pub text: String,
    pub retrieval: Vec<UrlRetrieval>,
}

/// Canned payload returned when there is nothing to suggest against.
pub const SUGGESTIONS_FALLBACK: &str =
    r#"{"suggestions": ["Add some URLs or attach a document to get started."]}"#;

/// Assemble the composite prompt sent to the model: custom system prefix
/// first, then the user's prompt, then the attached document framed with
/// its display name, then the URL list.
pub fn compose_prompt(
    prompt: &str,
    urls: &[String],
    local: Option<&LocalContext>,
    system_prompt: Option<&str>,
) -> String {
    let mut out = String::new();
    if let Some(prefix) = system_prompt {
        let prefix = prefix.trim();
        if !prefix.is_empty() {
            out.push_str(prefix);
            out.push_str("\n\n");
        }
    }
    out.push_str(prompt);
    if let Some(local) = local {
        out.push_str(&format!(
            "\n\nUse the following attached document \"{}\" as context:\n{}",
            local.name, local.content
        ));
    }
    if !urls.is_empty() {
        out.push_str("\n\nRelevant URLs:\n");
        out.push_str(&urls.join("\n"));
    }
    out
}

/// One contextual chat completion. Exactly one augmentation tool is
/// selected: web search when the toggle is on, URL context otherwise.
pub async fn send_chat(
    client: &GeminiClient,
    prompt: &str,
    urls: &[String],
    local: Option<&LocalContext>,
    options: &ChatOptions,
) -> Result<ChatReply, GatewayError> {
    let composed = compose_prompt(prompt, urls, local, options.system_prompt.as_deref());

    let tool = if options.use_web_search {
        Tool::web_search()
    } else {
        Tool::url_context()
    };
    let generation_config = if options.thinking {
        None
    } else {
        Some(GenerationConfig {
            thinking_config: Some(ThinkingConfig { thinking_budget: 0 }),
            ..GenerationConfig::default()
        })
    };

    let request = GenerateContentRequest {
        contents: vec![Content {
            role: Some("user".to_string()),
            parts: vec![Part::text(composed)],
        }],
        tools: Some(vec![tool]),
        generation_config,
    };

    let response = client.generate(CHAT_MODEL, &request).await?;
    let retrieval = response
        .candidates
        .first()
        .and_then(|c| c.url_context_metadata.as_ref())
        .map(|meta| {
            meta.url_metadata
                .iter()
                .filter_map(|m| {
                    m.retrieved_url.as_ref().map(|url| UrlRetrieval {
                        url: url.clone(),
                        status: m
                            .url_retrieval_status
                            .clone()
                            .unwrap_or_else(|| "UNKNOWN".to_string()),
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    Ok(ChatReply {
        text: response.text(),
        retrieval,
    })
}

/// Generate 3-4 opening questions for the current context.
///
/// With no URLs and no attached document there is nothing to ask about,
/// so this short-circuits to a canned payload without a remote call.
/// Returns raw text; JSON parsing is the caller's responsibility.
pub async fn initial_suggestions(
    client: &GeminiClient,
    urls: &[String],
    local_text: Option<&str>,
) -> Result<String, GatewayError> {
    if urls.is_empty() && local_text.map_or(true, |t| t.trim().is_empty()) {
        debug!("no context configured, returning canned suggestions");
        return Ok(SUGGESTIONS_FALLBACK.to_string());
    }

    let mut prompt = String::from(
        "Based on the following content, suggest 3 to 4 short questions a reader \
         might ask about it. Respond with a strict JSON object of the form \
         {\"suggestions\": [\"question\", ...]} and nothing else.",
    );
    if let Some(text) = local_text {
        if !text.trim().is_empty() {
            prompt.push_str("\n\nAttached document:\n");
            prompt.push_str(text);
        }
    }
    if !urls.is_empty() {
        prompt.push_str("\n\nURLs:\n");
        prompt.push_str(&urls.join("\n"));
    }

    let request = GenerateContentRequest {
        contents: vec![Content {
            role: Some("user".to_string()),
            parts: vec![Part::text(prompt)],
        }],
        tools: None,
        generation_config: Some(GenerationConfig {
            response_mime_type: Some("application/json".to_string()),
            ..GenerationConfig::default()
        }),
    };

    let response = client
        .generate(CHAT_MODEL, &request)
        .await
        .map_err(GatewayError::without_quota_branch)?;
    Ok(response.text())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compose_orders_prefix_context_and_urls() {
        let local = LocalContext {
            name: "notes.txt".to_string(),
            content: "Some notes.".to_string(),
        };
        let urls = vec!["https://a.example".to_string(), "https://b.example".to_string()];
        let out = compose_prompt("What is this?", &urls, Some(&local), Some("Be terse."));

        let prefix_at = out.find("Be terse.").unwrap();
        let prompt_at = out.find("What is this?").unwrap();
        let doc_at = out.find("attached document \"notes.txt\"").unwrap();
        let urls_at = out.find("Relevant URLs:").unwrap();
        assert!(prefix_at < prompt_at && prompt_at < doc_at && doc_at < urls_at);
        assert!(out.contains("https://a.example\nhttps://b.example"));
    }

    #[test]
    fn compose_skips_blank_prefix_and_empty_sections() {
        let out = compose_prompt("Hello", &[], None, Some("   "));
        assert_eq!(out, "Hello");
    }

    #[tokio::test]
    async fn suggestions_short_circuit_without_context() {
        // Client never issues a request on this path; a dummy key is fine.
        let client = GeminiClient::new("unused").unwrap();
        let raw = initial_suggestions(&client, &[], None).await.unwrap();
        assert_eq!(raw, SUGGESTIONS_FALLBACK);

        let raw = initial_suggestions(&client, &[], Some("   ")).await.unwrap();
        assert_eq!(raw, SUGGESTIONS_FALLBACK);
    }
}

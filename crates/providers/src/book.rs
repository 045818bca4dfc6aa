//! Two-phase book generation: a schema-constrained outline, then one
//! content request per chapter, issued in parallel.

use futures::future::join_all;
use regex::Regex;
use serde::Deserialize;
use shared::book::{Book, Chapter};
use std::sync::LazyLock;
use tracing::{info, warn};

use crate::error::GatewayError;
use crate::gemini::{
    Content, GeminiClient, GenerateContentRequest, GenerationConfig, Part, CHAT_MODEL,
};

/// Substituted for a chapter whose content request failed. One bad
/// chapter never aborts the book.
pub const CHAPTER_PLACEHOLDER: &str = "Content for this chapter could not be generated.";

static FENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)^```[a-zA-Z]*\s*(.*?)\s*```$").expect("fence regex is valid")
});

/// Strip a surrounding fenced code block, if any. Models asked for JSON
/// output still sometimes wrap it in triple backticks.
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    match FENCE_RE.captures(trimmed) {
        Some(caps) => caps.get(1).map(|m| m.as_str()).unwrap_or(trimmed),
        None => trimmed,
    }
}

#[derive(Debug, Deserialize)]
pub struct Outline {
    pub title: String,
    pub chapters: Vec<String>,
}

/// Parse the outline response. Any failure to produce the expected
/// shape, including valid JSON with the wrong keys, aborts the whole
/// generation; the raw text is kept on the error for the log.
pub fn parse_outline(raw: &str) -> Result<Outline, GatewayError> {
    let stripped = strip_code_fence(raw);
    let outline: Outline =
        serde_json::from_str(stripped).map_err(|_| GatewayError::MalformedOutline {
            raw: raw.to_string(),
        })?;
    if outline.title.trim().is_empty() || outline.chapters.is_empty() {
        return Err(GatewayError::MalformedOutline {
            raw: raw.to_string(),
        });
    }
    Ok(outline)
}

fn outline_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "OBJECT",
        "properties": {
            "title": {"type": "STRING"},
            "chapters": {
                "type": "ARRAY",
                "items": {"type": "STRING"},
                "minItems": 5,
                "maxItems": 7,
            },
        },
        "required": ["title", "chapters"],
    })
}

fn text_request(prompt: String, generation_config: Option<GenerationConfig>) -> GenerateContentRequest {
    GenerateContentRequest {
        contents: vec![Content {
            role: Some("user".to_string()),
            parts: vec![Part::text(prompt)],
        }],
        tools: None,
        generation_config,
    }
}

async fn request_outline(client: &GeminiClient, topic: &str) -> Result<Outline, GatewayError> {
    let prompt = format!(
        "Create an outline for a book about the following topic. Choose a compelling \
         title and 5 to 7 chapter titles that cover the topic well.\n\nTopic: {topic}"
    );
    let request = text_request(
        prompt,
        Some(GenerationConfig {
            response_mime_type: Some("application/json".to_string()),
            response_schema: Some(outline_schema()),
            ..GenerationConfig::default()
        }),
    );
    let response = client.generate(CHAT_MODEL, &request).await?;
    parse_outline(&response.text())
}

async fn request_chapter(
    client: &GeminiClient,
    book_title: &str,
    chapter_title: &str,
) -> Result<String, GatewayError> {
    let prompt = format!(
        "Write a comprehensive chapter titled \"{chapter_title}\" for the book \
         \"{book_title}\". Write in Markdown, with clear sections. Do not repeat \
         the chapter title as a heading."
    );
    let response = client.generate(CHAT_MODEL, &text_request(prompt, None)).await?;
    let text = response.text();
    if text.trim().is_empty() {
        return Err(GatewayError::MalformedResponse(
            "empty chapter response".to_string(),
        ));
    }
    Ok(text)
}

/// Generate a whole book for a topic.
///
/// The outline request is fatal on failure; chapter requests all run in
/// parallel and each degrades to [`CHAPTER_PLACEHOLDER`] on its own.
pub async fn generate_book(client: &GeminiClient, topic: &str) -> Result<Book, GatewayError> {
    let outline = request_outline(client, topic).await?;
    info!(title = %outline.title, chapters = outline.chapters.len(), "outline generated");

    let futures = outline
        .chapters
        .iter()
        .map(|chapter| request_chapter(client, &outline.title, chapter));
    let results = join_all(futures).await;

    let chapters = outline
        .chapters
        .into_iter()
        .zip(results)
        .map(|(title, result)| Chapter {
            content: match result {
                Ok(content) => content,
                Err(e) => {
                    warn!(chapter = %title, error = %e, "chapter generation failed");
                    CHAPTER_PLACEHOLDER.to_string()
                }
            },
            title,
        })
        .collect();

    Ok(Book {
        title: outline.title,
        chapters,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_plain_and_labelled_fences() {
        assert_eq!(strip_code_fence("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fence("```\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fence("  {\"a\":1}  "), "{\"a\":1}");
    }

    #[test]
    fn parses_bare_and_fenced_outlines() {
        let bare = r#"{"title":"T","chapters":["A","B"]}"#;
        let outline = parse_outline(bare).unwrap();
        assert_eq!(outline.title, "T");
        assert_eq!(outline.chapters, vec!["A", "B"]);

        let fenced = "```json\n{\"title\":\"T\",\"chapters\":[\"A\",\"B\"]}\n```";
        let outline = parse_outline(fenced).unwrap();
        assert_eq!(outline.title, "T");
        assert_eq!(outline.chapters.len(), 2);
    }

    #[test]
    fn wrong_shape_json_aborts() {
        // Valid JSON, missing the chapters array.
        let err = parse_outline(r#"{"title":"T"}"#).unwrap_err();
        assert!(matches!(err, GatewayError::MalformedOutline { .. }));

        let err = parse_outline("not json at all").unwrap_err();
        match err {
            GatewayError::MalformedOutline { raw } => assert_eq!(raw, "not json at all"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn empty_chapter_list_aborts() {
        let err = parse_outline(r#"{"title":"T","chapters":[]}"#).unwrap_err();
        assert!(matches!(err, GatewayError::MalformedOutline { .. }));
    }
}

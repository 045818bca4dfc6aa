//! Image generation and editing.

use base64::Engine;
use tracing::debug;

use crate::error::GatewayError;
use crate::gemini::{
    Content, GeminiClient, GenerateContentRequest, Part, IMAGE_EDIT_MODEL, IMAGE_GEN_MODEL,
};

/// The result of an image operation: the first image part's bytes plus
/// whatever text the model produced around it.
#[derive(Debug, Clone)]
pub struct GeneratedImage {
    pub bytes: Vec<u8>,
    pub mime_type: String,
    pub caption: String,
}

fn decode_b64(data: &str) -> Result<Vec<u8>, GatewayError> {
    base64::engine::general_purpose::STANDARD
        .decode(data)
        .map_err(|e| GatewayError::MalformedResponse(format!("bad image payload: {e}")))
}

/// Edit a source image according to a prompt.
///
/// The response must contain at least one image part; a text-only
/// response (typically a content-safety refusal) is a terminal failure,
/// not something to retry.
pub async fn edit_image(
    client: &GeminiClient,
    prompt: &str,
    image_base64: &str,
    mime_type: &str,
) -> Result<GeneratedImage, GatewayError> {
    let request = GenerateContentRequest {
        contents: vec![Content {
            role: Some("user".to_string()),
            parts: vec![
                Part::inline_data(mime_type, image_base64),
                Part::text(prompt),
            ],
        }],
        tools: None,
        generation_config: None,
    };

    let response = client.generate(IMAGE_EDIT_MODEL, &request).await?;
    extract_image(&response)
}

/// Pull the first image part (and all text parts) out of an edit
/// response. No image part means the whole operation failed.
fn extract_image(
    response: &crate::gemini::GenerateContentResponse,
) -> Result<GeneratedImage, GatewayError> {
    let parts = response
        .candidates
        .first()
        .and_then(|c| c.content.as_ref())
        .map(|c| c.parts.as_slice())
        .unwrap_or(&[]);

    let caption: String = parts
        .iter()
        .filter_map(|p| p.text.as_deref())
        .collect::<Vec<_>>()
        .join("");
    let image = parts
        .iter()
        .find_map(|p| p.inline_data.as_ref())
        .ok_or(GatewayError::NoImageReturned)?;

    debug!(mime = %image.mime_type, "image edit returned an image part");
    Ok(GeneratedImage {
        bytes: decode_b64(&image.data)?,
        mime_type: if image.mime_type.is_empty() {
            "image/png".to_string()
        } else {
            image.mime_type.clone()
        },
        caption,
    })
}

/// Generate a single square JPEG image from a prompt.
pub async fn generate_image(
    client: &GeminiClient,
    prompt: &str,
) -> Result<GeneratedImage, GatewayError> {
    let request = serde_json::json!({
        "instances": [{"prompt": prompt}],
        "parameters": {
            "sampleCount": 1,
            "aspectRatio": "1:1",
            "outputMimeType": "image/jpeg",
        },
    });

    let response = client.predict(IMAGE_GEN_MODEL, &request).await?;
    let prediction = response
        .get("predictions")
        .and_then(|p| p.as_array())
        .and_then(|p| p.first())
        .ok_or(GatewayError::NoImageReturned)?;
    let data = prediction
        .get("bytesBase64Encoded")
        .and_then(|d| d.as_str())
        .ok_or(GatewayError::NoImageReturned)?;
    let mime_type = prediction
        .get("mimeType")
        .and_then(|m| m.as_str())
        .unwrap_or("image/jpeg")
        .to_string();

    Ok(GeneratedImage {
        bytes: decode_b64(data)?,
        mime_type,
        caption: String::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gemini::GenerateContentResponse;
    use base64::Engine;

    fn response_from(value: serde_json::Value) -> GenerateContentResponse {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn text_only_response_is_a_no_image_failure() {
        let resp = response_from(serde_json::json!({
            "candidates": [{
                "content": {
                    "role": "model",
                    "parts": [{"text": "I can't edit that image."}]
                }
            }]
        }));
        assert!(matches!(
            extract_image(&resp),
            Err(GatewayError::NoImageReturned)
        ));
    }

    #[test]
    fn first_image_part_wins_and_text_is_concatenated() {
        let png = base64::engine::general_purpose::STANDARD.encode([1u8, 2, 3]);
        let resp = response_from(serde_json::json!({
            "candidates": [{
                "content": {
                    "role": "model",
                    "parts": [
                        {"text": "Here you "},
                        {"inlineData": {"mimeType": "image/webp", "data": png}},
                        {"text": "go."},
                    ]
                }
            }]
        }));
        let image = extract_image(&resp).unwrap();
        assert_eq!(image.bytes, vec![1, 2, 3]);
        assert_eq!(image.mime_type, "image/webp");
        assert_eq!(image.caption, "Here you go.");
    }

    #[test]
    fn missing_mime_defaults_to_png() {
        let data = base64::engine::general_purpose::STANDARD.encode([9u8]);
        let resp = response_from(serde_json::json!({
            "candidates": [{
                "content": {
                    "role": "model",
                    "parts": [{"inlineData": {"mimeType": "", "data": data}}]
                }
            }]
        }));
        let image = extract_image(&resp).unwrap();
        assert_eq!(image.mime_type, "image/png");
    }
}

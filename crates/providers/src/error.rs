//! Gateway error taxonomy.
//!
//! Every failure class gets its own variant so the session layer can show
//! a distinct human-readable message. Nothing here retries.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Your API key is not valid. Please log out and log in again.")]
    InvalidCredential,

    #[error("API quota exceeded. Please wait a while and try again.")]
    QuotaExceeded,

    #[error("The AI service returned an error ({status}): {detail}")]
    Upstream { status: u16, detail: String },

    #[error("The model did not return an image. It may have declined the request.")]
    NoImageReturned,

    #[error("Could not generate a valid outline for the book.")]
    MalformedOutline { raw: String },

    #[error("The AI service returned a response that could not be read: {0}")]
    MalformedResponse(String),

    #[error("Network error talking to the AI service: {0}")]
    Http(#[from] reqwest::Error),
}

impl GatewayError {
    /// Classify a non-success HTTP status into the error taxonomy.
    pub fn from_status(status: u16, body: &str) -> Self {
        match status {
            400 if body.contains("API key not valid") => GatewayError::InvalidCredential,
            401 | 403 => GatewayError::InvalidCredential,
            429 => GatewayError::QuotaExceeded,
            _ => {
                let detail = body.trim();
                // Truncate on a char boundary; error bodies are not
                // guaranteed to be ASCII.
                let detail = match detail.char_indices().nth(800) {
                    Some((cut, _)) => format!("{}...", &detail[..cut]),
                    None => detail.to_string(),
                };
                GatewayError::Upstream { status, detail }
            }
        }
    }

    /// Fold the quota branch into the generic upstream one. Used by the
    /// suggestions path, which does not special-case quota errors.
    pub fn without_quota_branch(self) -> Self {
        match self {
            GatewayError::QuotaExceeded => GatewayError::Upstream {
                status: 429,
                detail: "rate limited".to_string(),
            },
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_bad_key_on_400() {
        let err = GatewayError::from_status(400, r#"{"error": "API key not valid."}"#);
        assert!(matches!(err, GatewayError::InvalidCredential));
    }

    #[test]
    fn classifies_quota() {
        assert!(matches!(
            GatewayError::from_status(429, "slow down"),
            GatewayError::QuotaExceeded
        ));
    }

    #[test]
    fn other_statuses_pass_through_with_detail() {
        match GatewayError::from_status(500, "boom") {
            GatewayError::Upstream { status, detail } => {
                assert_eq!(status, 500);
                assert_eq!(detail, "boom");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn long_bodies_are_truncated() {
        let body = "x".repeat(2000);
        match GatewayError::from_status(503, &body) {
            GatewayError::Upstream { detail, .. } => assert!(detail.len() < 900),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn truncation_respects_multibyte_boundaries() {
        // A euro sign straddling the old byte cut-off must not panic.
        let body = format!("{}{}", "x".repeat(799), "€".repeat(10));
        match GatewayError::from_status(500, &body) {
            GatewayError::Upstream { detail, .. } => {
                assert!(detail.ends_with("..."));
                assert!(detail.chars().count() <= 803);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }
}

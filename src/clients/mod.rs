//! HTTP clients for the external collaborators: the hosted backend's
//! identity and functions APIs, the caption model and the image CDN.
//!
//! Each collaborator sits behind an async trait so services can be driven
//! by in-memory fakes.

pub mod cdn;
pub mod functions;
pub mod identity;
pub mod llm;

use sonic_rs::JsonValueTrait;

/// Maximum length of a raw response body quoted in an error message.
const MAX_ERROR_BODY: usize = 300;

/// Pulls a human-readable message out of an error response body.
///
/// Understands the shapes returned by the backend (`error_description`,
/// `msg`, `message`, `error` as string or `{message}`), falling back to the
/// raw text.
pub(crate) fn extract_error_message(body: &[u8]) -> String {
    if let Ok(value) = sonic_rs::from_slice::<sonic_rs::Value>(body) {
        for key in ["error_description", "msg", "message", "error"] {
            if let Some(field) = value.get(key) {
                if let Some(text) = field.as_str() {
                    return text.to_string();
                }
                if let Some(text) = field.get("message").and_then(|m| m.as_str()) {
                    return text.to_string();
                }
            }
        }
    }

    let text = String::from_utf8_lossy(body);
    let text = text.trim();
    if text.is_empty() {
        return "empty response body".to_string();
    }
    text.chars().take(MAX_ERROR_BODY).collect()
}

//! Transform gateway: HTTP client for the external AI cleaning service.
//!
//! Sends a bounded row sample plus a user instruction to an
//! OpenRouter-compatible chat-completions endpoint and parses the reply
//! into a JSON array of row objects. The client never retries on its
//! own; a failed call is reported and the user may re-submit.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use cleandata::ai::AiClient;
//!
//! let client = AiClient::from_env()?;
//! let rows = client.transform_rows("openai/gpt-3.5-turbo", "trim emails", &sample).await?;
//! ```

pub mod prompt;

use serde::Deserialize;
use serde_json::Value;
use std::env;
use std::time::Duration;

use crate::error::{AiError, AiResult};

/// OpenRouter API base URL.
const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";

/// Default request timeout. An unbounded call is an availability risk.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Maximum rows submitted per call, to bound payload size and cost.
pub const MAX_ROWS_PER_CALL: usize = 20;

// =============================================================================
// Client
// =============================================================================

/// AI transform client.
#[derive(Clone)]
pub struct AiClient {
    api_key: String,
    base_url: String,
    referer: String,
    timeout: Duration,
}

/// Chat-completions success payload (the parts we read).
#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: String,
}

/// Chat-completions error payload.
#[derive(Debug, Deserialize)]
struct ApiError {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

impl AiClient {
    /// Create a client with an explicit API key.
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            referer: "http://localhost:3000".to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    /// Create a client from the environment.
    ///
    /// Reads `OPENROUTER_API_KEY` (required), `CLEANDATA_APP_URL` and
    /// `CLEANDATA_AI_TIMEOUT_SECS` (optional). Loads `.env` if present.
    pub fn from_env() -> AiResult<Self> {
        let _ = dotenvy::dotenv();

        let api_key = env::var("OPENROUTER_API_KEY")
            .map_err(|_| AiError::MissingApiKey("OPENROUTER_API_KEY not set".to_string()))?;

        let mut client = Self::new(api_key);
        if let Ok(url) = env::var("CLEANDATA_APP_URL") {
            client.referer = url;
        }
        if let Some(secs) = env::var("CLEANDATA_AI_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            client.timeout = Duration::from_secs(secs);
        }
        Ok(client)
    }

    /// Override the endpoint base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Override the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Submit `rows` and `instruction` to `model` and return the
    /// transformed rows.
    ///
    /// The caller is responsible for bounding `rows` (see
    /// [`MAX_ROWS_PER_CALL`]) and for entitlement checks; this method
    /// only speaks the wire protocol.
    pub async fn transform_rows(
        &self,
        model: &str,
        instruction: &str,
        rows: &[Value],
    ) -> AiResult<Vec<Value>> {
        let client = reqwest::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| AiError::Unreachable(e.to_string()))?;

        let request_body = serde_json::json!({
            "model": model,
            "messages": [
                { "role": "system", "content": prompt::system_prompt(rows) },
                { "role": "user", "content": prompt::user_message(rows, instruction) },
            ],
            "temperature": 0.3,
            "max_tokens": 4096,
        });

        let response = client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .header("HTTP-Referer", &self.referer)
            .header("X-Title", "CleanData AI")
            .json(&request_body)
            .send()
            .await
            .map_err(|e| AiError::Unreachable(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AiError::Unreachable(e.to_string()))?;

        if !status.is_success() {
            if let Ok(err) = serde_json::from_str::<ApiError>(&body) {
                return Err(AiError::ServiceError(err.error.message));
            }
            return Err(AiError::ServiceError(format!(
                "Failed to fetch from AI provider (HTTP {status})"
            )));
        }

        let parsed: ChatResponse =
            serde_json::from_str(&body).map_err(|_| AiError::InvalidResponse)?;
        let content = parsed
            .choices
            .first()
            .map(|c| c.message.content.as_str())
            .ok_or(AiError::InvalidResponse)?;

        parse_rows(content)
    }
}

// =============================================================================
// Response parsing
// =============================================================================

/// Parse model output into a JSON array of row objects.
///
/// Tolerates markdown code fences around the payload; anything that is
/// not an array of objects is the distinct invalid-response failure.
pub fn parse_rows(content: &str) -> AiResult<Vec<Value>> {
    let cleaned = strip_fences(content);

    let value: Value =
        serde_json::from_str(&cleaned).map_err(|_| AiError::InvalidResponse)?;

    let Value::Array(rows) = value else {
        return Err(AiError::InvalidResponse);
    };
    if rows.iter().any(|r| !r.is_object()) {
        return Err(AiError::InvalidResponse);
    }
    Ok(rows)
}

/// Strip markdown code fences the model may wrap its JSON in.
fn strip_fences(text: &str) -> String {
    text.replace("```json", "").replace("```", "").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rows_plain_array() {
        let rows = parse_rows(r#"[{"id": 0, "name": "ALICE"}]"#).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["name"], "ALICE");
    }

    #[test]
    fn test_parse_rows_with_fences() {
        let content = "```json\n[{\"id\": 0, \"a\": \"1\"}]\n```";
        let rows = parse_rows(content).unwrap();
        assert_eq!(rows[0]["a"], "1");
    }

    #[test]
    fn test_parse_rows_rejects_non_array() {
        assert!(matches!(
            parse_rows(r#"{"id": 0}"#),
            Err(AiError::InvalidResponse)
        ));
        assert!(matches!(
            parse_rows("Sure! Here is the cleaned data."),
            Err(AiError::InvalidResponse)
        ));
    }

    #[test]
    fn test_parse_rows_rejects_non_object_elements() {
        assert!(matches!(
            parse_rows(r#"[1, 2, 3]"#),
            Err(AiError::InvalidResponse)
        ));
    }

    #[test]
    fn test_builder_overrides() {
        let client = AiClient::new("k".into())
            .with_base_url("http://localhost:9999/v1")
            .with_timeout(Duration::from_secs(5));
        assert_eq!(client.base_url, "http://localhost:9999/v1");
        assert_eq!(client.timeout, Duration::from_secs(5));
    }
}

use std::time::Duration;

use anyhow::Result;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::history::Turn;

/// Canned assistant text for a success body with no usable answer. Not an
/// error: it becomes a normal assistant turn.
pub const FALLBACK_ANSWER: &str = "Sorry, I couldn't process your request.";

/// How a single dispatch failed. Every variant resolves the session back to
/// idle; the variant only shapes the apology the user sees.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The backend answered with a non-success status.
    #[error("{reason}")]
    Backend { status: u16, reason: String },
    /// The transport timeout elapsed before the call settled.
    #[error("request timed out: {0}")]
    Timeout(String),
    /// Network-level failure or a malformed response body.
    #[error("{0}")]
    Transport(String),
}

/// Which backend collaborator a query travels through. The direct path and
/// the proxy speak different request shapes, so they stay distinct clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Route {
    #[default]
    Direct,
    Proxy,
}

impl Route {
    pub fn as_str(&self) -> &'static str {
        match self {
            Route::Direct => "direct",
            Route::Proxy => "proxy",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "direct" => Some(Route::Direct),
            "proxy" => Some(Route::Proxy),
            _ => None,
        }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    message: &'a str,
    history: &'a [Turn],
}

#[derive(Serialize)]
struct ProxyRequest<'a> {
    message: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    answer: Option<String>,
}

#[derive(Deserialize)]
struct ProxyResponse {
    answer: Option<String>,
    response: Option<String>,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: Option<String>,
}

fn transport_error(err: reqwest::Error) -> DispatchError {
    let message = err.to_string();
    let message = if message.is_empty() {
        "unknown error".to_string()
    } else {
        message
    };
    if err.is_timeout() {
        DispatchError::Timeout(message)
    } else {
        DispatchError::Transport(message)
    }
}

/// Failure reason for a non-success status: the structured `error` field
/// when the body carries one, otherwise a generic status line.
fn error_reason(status: u16, body: &str) -> String {
    serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.error)
        .unwrap_or_else(|| format!("backend error: {}", status))
}

/// Pull the answer out of a success body. A missing or empty `answer` field
/// degrades to the canned fallback text rather than an error.
fn extract_answer(body: &str) -> Result<String, DispatchError> {
    let parsed: ChatResponse =
        serde_json::from_str(body).map_err(|e| DispatchError::Transport(e.to_string()))?;
    Ok(parsed
        .answer
        .filter(|a| !a.is_empty())
        .unwrap_or_else(|| FALLBACK_ANSWER.to_string()))
}

/// Proxy replies expose `answer` but may fall back to the backend's raw
/// `response` field; tolerate both.
fn extract_proxy_answer(body: &str) -> Result<String, DispatchError> {
    let parsed: ProxyResponse =
        serde_json::from_str(body).map_err(|e| DispatchError::Transport(e.to_string()))?;
    Ok(parsed
        .answer
        .filter(|a| !a.is_empty())
        .or(parsed.response.filter(|r| !r.is_empty()))
        .unwrap_or_else(|| FALLBACK_ANSWER.to_string()))
}

/// Direct path to the UniD3 chat endpoint: the query plus its windowed
/// history in one POST. One round trip per call, no retry, no streaming;
/// the session's single-flight latch keeps calls from overlapping.
#[derive(Clone)]
pub struct DirectClient {
    client: Client,
    base_url: String,
}

impl DirectClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub async fn send(&self, message: &str, history: &[Turn]) -> Result<String, DispatchError> {
        let url = format!("{}/api/chat", self.base_url);
        let request = ChatRequest { message, history };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        let body = response.text().await.map_err(transport_error)?;

        if !status.is_success() {
            return Err(DispatchError::Backend {
                status: status.as_u16(),
                reason: error_reason(status.as_u16(), &body),
            });
        }

        extract_answer(&body)
    }
}

/// Pass-through proxy collaborator. Takes only the message (the proxy
/// forwards a bare `query` and keeps no history) and normalizes the reply.
#[derive(Clone)]
pub struct ProxyClient {
    client: Client,
    base_url: String,
}

impl ProxyClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub async fn send(&self, message: &str) -> Result<String, DispatchError> {
        let url = format!("{}/api/chat", self.base_url);
        let request = ProxyRequest { message };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        let body = response.text().await.map_err(transport_error)?;

        if !status.is_success() {
            return Err(DispatchError::Backend {
                status: status.as_u16(),
                reason: error_reason(status.as_u16(), &body),
            });
        }

        extract_proxy_answer(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_body_reason_is_used_verbatim() {
        assert_eq!(error_reason(500, r#"{"error": "timeout"}"#), "timeout");
    }

    #[test]
    fn unparseable_error_body_falls_back_to_status() {
        assert_eq!(error_reason(502, "<html>bad gateway</html>"), "backend error: 502");
        assert_eq!(error_reason(500, r#"{"detail": "no error field"}"#), "backend error: 500");
    }

    #[test]
    fn answer_field_is_extracted() {
        let answer = extract_answer(r#"{"answer": "Yes, related."}"#).unwrap();
        assert_eq!(answer, "Yes, related.");
    }

    #[test]
    fn missing_answer_is_a_fallback_turn_not_an_error() {
        assert_eq!(extract_answer("{}").unwrap(), FALLBACK_ANSWER);
        assert_eq!(extract_answer(r#"{"answer": ""}"#).unwrap(), FALLBACK_ANSWER);
    }

    #[test]
    fn malformed_success_body_is_a_transport_error() {
        let err = extract_answer("definitely not json").unwrap_err();
        assert!(matches!(err, DispatchError::Transport(_)));
    }

    #[test]
    fn proxy_reply_tolerates_both_answer_shapes() {
        assert_eq!(
            extract_proxy_answer(r#"{"answer": "from answer"}"#).unwrap(),
            "from answer"
        );
        assert_eq!(
            extract_proxy_answer(r#"{"response": "from response"}"#).unwrap(),
            "from response"
        );
        assert_eq!(
            extract_proxy_answer(r#"{"answer": "a", "response": "b"}"#).unwrap(),
            "a"
        );
        assert_eq!(extract_proxy_answer("{}").unwrap(), FALLBACK_ANSWER);
    }

    #[test]
    fn backend_error_displays_its_reason() {
        let err = DispatchError::Backend {
            status: 500,
            reason: "timeout".to_string(),
        };
        assert_eq!(err.to_string(), "timeout");
    }

    #[test]
    fn route_parses_from_config_strings() {
        assert_eq!(Route::from_str("direct"), Some(Route::Direct));
        assert_eq!(Route::from_str("Proxy"), Some(Route::Proxy));
        assert_eq!(Route::from_str("smoke-signal"), None);
        assert_eq!(Route::default(), Route::Direct);
    }
}

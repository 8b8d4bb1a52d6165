use reqwest::header::ACCEPT;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

#[derive(Serialize)]
struct GenerateRequest<'a> {
    prompt: &'a str,
}

/// A successful `/generate` reply.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Generation {
    pub response: String,
    #[serde(default)]
    pub duration: Option<f64>,
}

#[derive(Deserialize)]
struct ErrorBody {
    detail: Option<serde_json::Value>,
}

#[derive(Debug, Error)]
pub enum RequestError {
    /// The request never reached the server or no response came back.
    #[error("{status_text}")]
    Transport {
        status_text: String,
        #[source]
        source: reqwest::Error,
    },
    /// Non-2xx reply.
    #[error("server returned {status}")]
    Server { status: StatusCode, body: String },
    /// 2xx reply whose body is not the expected JSON.
    #[error("unexpected response body ({status})")]
    Decode { status: StatusCode, body: String },
    /// The task running the request ended without producing a result.
    #[error("request did not complete: {0}")]
    Aborted(String),
}

impl RequestError {
    fn transport(source: reqwest::Error) -> Self {
        let status_text = if source.is_timeout() {
            "request timed out"
        } else if source.is_connect() {
            "could not connect to server"
        } else {
            "request failed"
        };
        RequestError::Transport {
            status_text: status_text.to_string(),
            source,
        }
    }

    /// Text shown in the chat log for this failure.
    pub fn user_message(&self) -> String {
        match self {
            RequestError::Transport { status_text, .. } => format!("Error: {}", status_text),
            RequestError::Server { status, body } => describe_http_failure(*status, body),
            RequestError::Decode { status, body } => {
                if body.trim().is_empty() {
                    "Error: empty response from server".to_string()
                } else {
                    describe_http_failure(*status, body)
                }
            }
            RequestError::Aborted(reason) => format!("Error: {}", reason),
        }
    }
}

/// `detail` from a JSON body, else status and raw body, else the status text.
pub fn describe_http_failure(status: StatusCode, body: &str) -> String {
    if let Ok(ErrorBody { detail: Some(detail) }) = serde_json::from_str::<ErrorBody>(body) {
        match detail {
            serde_json::Value::String(detail) if !detail.is_empty() => {
                return format!("Error: {}", detail);
            }
            serde_json::Value::String(_) | serde_json::Value::Null => {}
            // e.g. a list of validation errors
            other => return format!("Error: {}", other),
        }
    }

    if !body.trim().is_empty() {
        return format!("Server error ({}): {}", status.as_u16(), body);
    }

    format!("Error: {}", status)
}

#[derive(Clone)]
pub struct GenerateClient {
    client: Client,
    base_url: String,
}

impl GenerateClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// One POST to `/generate`. No retries, no timeout.
    pub async fn generate(&self, prompt: &str) -> Result<Generation, RequestError> {
        let url = format!("{}/generate", self.base_url);

        let response = self
            .client
            .post(&url)
            .header(ACCEPT, "application/json")
            .json(&GenerateRequest { prompt })
            .send()
            .await
            .map_err(RequestError::transport)?;

        let status = response.status();
        let body = response.text().await.map_err(RequestError::transport)?;
        debug!(%status, bytes = body.len(), "generate responded");

        if !status.is_success() {
            return Err(RequestError::Server { status, body });
        }

        serde_json::from_str(&body).map_err(|_| RequestError::Decode { status, body })
    }
}

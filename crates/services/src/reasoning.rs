use async_trait::async_trait;
use picker_models::{AnalysisRequest, FactorBundle, FactorKind, TeamDirectory, TeamId};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ReasoningError {
    #[error("Reasoning call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Reasoning transport failure: {0}")]
    Transport(String),

    #[error("Reasoning service rejected the request ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("Reasoning service returned an unusable response: {reason}")]
    InvalidResponse { reason: String, raw: String },
}

impl ReasoningError {
    /// Timeouts, transport failures and upstream overload are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            ReasoningError::Timeout(_) | ReasoningError::Transport(_) => true,
            ReasoningError::Rejected { status, .. } => {
                *status == StatusCode::TOO_MANY_REQUESTS.as_u16() || *status >= 500
            }
            ReasoningError::InvalidResponse { .. } => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TeamBrief {
    pub id: TeamId,
    pub name: String,
    pub role: &'static str,
    pub factors: FactorBundle,
}

/// Structured payload handed to the reasoning service.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReasoningRequest {
    pub away: TeamBrief,
    pub home: TeamBrief,
    pub enabled_factors: Vec<FactorKind>,
}

impl ReasoningRequest {
    pub fn assemble(
        request: &AnalysisRequest,
        away_factors: FactorBundle,
        home_factors: FactorBundle,
        directory: &TeamDirectory,
    ) -> Self {
        let brief = |id: &TeamId, role, factors| TeamBrief {
            id: id.clone(),
            name: directory.name_of(id).to_string(),
            role,
            factors,
        };
        Self {
            away: brief(request.away_team(), "away", away_factors),
            home: brief(request.home_team(), "home", home_factors),
            enabled_factors: request.enabled_factors(),
        }
    }

    pub fn teams(&self) -> [&TeamBrief; 2] {
        [&self.away, &self.home]
    }
}

/// Raw reasoning output: free text plus whatever structured verdict came with it.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ReasoningResponse {
    pub narrative: String,
    pub verdict: Value,
}

#[async_trait]
pub trait ReasoningClient: Send + Sync {
    async fn analyze(&self, request: &ReasoningRequest) -> Result<ReasoningResponse, ReasoningError>;
}

const SYSTEM_PROMPT: &str = "You are an NFL matchup analyst. Compare the two teams using only \
the factors provided. Reply with a JSON object containing: \"winner\" (team name), \"score\" \
(\"W-L\", winner's points first), \"confidence\" (0-100), \"key_factors\" (up to five short \
strings) and \"analysis\" (a few paragraphs).";

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    temperature: f32,
    messages: Vec<ChatMessage>,
    response_format: Value,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    content: Option<String>,
}

/// OpenAI-compatible chat completion client.
pub struct OpenAiReasoningClient {
    client: Client,
    endpoint: String,
    api_key: String,
    model: String,
    timeout: Duration,
}

impl OpenAiReasoningClient {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ReasoningError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| ReasoningError::Transport(format!("failed to build HTTP client: {err}")))?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            model: model.into(),
            timeout,
        })
    }

    fn transport_error(&self, err: reqwest::Error) -> ReasoningError {
        if err.is_timeout() {
            ReasoningError::Timeout(self.timeout)
        } else {
            ReasoningError::Transport(err.to_string())
        }
    }
}

#[async_trait]
impl ReasoningClient for OpenAiReasoningClient {
    async fn analyze(&self, request: &ReasoningRequest) -> Result<ReasoningResponse, ReasoningError> {
        let payload = serde_json::to_string(request).map_err(|err| {
            ReasoningError::InvalidResponse {
                reason: format!("could not encode request: {err}"),
                raw: String::new(),
            }
        })?;
        let body = ChatRequest {
            model: self.model.clone(),
            temperature: 0.2,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: payload,
                },
            ],
            response_format: serde_json::json!({ "type": "json_object" }),
        };

        let start = Instant::now();
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|err| self.transport_error(err))?;

        let status = response.status();
        let text = response.text().await.map_err(|err| self.transport_error(err))?;
        debug!(
            "Reasoning call for {} @ {} returned {} in {:?}",
            request.away.id,
            request.home.id,
            status,
            start.elapsed()
        );

        if !status.is_success() {
            warn!("Reasoning service rejected request with {}", status);
            return Err(ReasoningError::Rejected {
                status: status.as_u16(),
                body: text,
            });
        }

        let chat: ChatResponse =
            serde_json::from_str(&text).map_err(|err| ReasoningError::InvalidResponse {
                reason: format!("unexpected completion shape: {err}"),
                raw: text.clone(),
            })?;
        let content = chat
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| ReasoningError::InvalidResponse {
                reason: "completion had no content".to_string(),
                raw: text.clone(),
            })?;

        Ok(split_reply(content))
    }
}

/// Separates a model reply into a structured verdict and a narrative.
/// Plain-text replies keep everything in the narrative.
pub fn split_reply(content: String) -> ReasoningResponse {
    match serde_json::from_str::<Value>(content.trim()) {
        Ok(verdict @ Value::Object(_)) => {
            let narrative = verdict
                .get("analysis")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or(content);
            ReasoningResponse { narrative, verdict }
        }
        _ => ReasoningResponse {
            narrative: content,
            verdict: Value::Null,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use picker_models::AnalysisOptions;
    use serde_json::json;

    #[test]
    fn test_retryable_errors() {
        assert!(ReasoningError::Timeout(Duration::from_secs(1)).is_retryable());
        assert!(ReasoningError::Transport("reset".into()).is_retryable());
        assert!(ReasoningError::Rejected { status: 503, body: String::new() }.is_retryable());
        assert!(!ReasoningError::Rejected { status: 401, body: String::new() }.is_retryable());
        assert!(!ReasoningError::InvalidResponse {
            reason: "empty".into(),
            raw: String::new()
        }
        .is_retryable());
    }

    #[test]
    fn test_assemble_names_roles() {
        let request =
            AnalysisRequest::new(TeamId::new("NE"), TeamId::new("KC"), AnalysisOptions::stats_only())
                .unwrap();
        let assembled = ReasoningRequest::assemble(
            &request,
            FactorBundle::new(TeamId::new("NE")),
            FactorBundle::new(TeamId::new("KC")),
            &TeamDirectory::nfl(),
        );

        let value = serde_json::to_value(&assembled).unwrap();
        assert_eq!(value["home"]["name"], "Kansas City Chiefs");
        assert_eq!(value["home"]["role"], "home");
        assert_eq!(value["away"]["name"], "New England Patriots");
        assert_eq!(value["enabled_factors"], json!(["stats"]));
    }

    #[test]
    fn test_split_reply_prefers_analysis_field() {
        let reply = split_reply(r#"{"winner": "KC", "analysis": "Chiefs win."}"#.to_string());
        assert_eq!(reply.narrative, "Chiefs win.");
        assert_eq!(reply.verdict["winner"], "KC");

        let plain = split_reply("Winner: Kansas City Chiefs".to_string());
        assert_eq!(plain.verdict, Value::Null);
        assert_eq!(plain.narrative, "Winner: Kansas City Chiefs");
    }
}

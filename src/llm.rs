//! Gemini API client behind the `ChatModel` seam
//!
//! Prompt completion is an opaque external service to the rest of the
//! pipeline. Uses a long-lived reqwest::Client for connection pooling.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{error, info};

use crate::error::AssessorError;
use crate::session::{Turn, TurnRole};
use crate::Result;

/// Model tier for routing/rendering decisions: deterministic and cheap.
pub const ROUTER_MODEL: &str = "gemini-2.0-flash";
pub const ROUTER_TEMPERATURE: f32 = 0.0;

/// Model tier for the specialists: richer, mildly creative.
pub const SPECIALIST_MODEL: &str = "gemini-2.5-flash";
pub const SPECIALIST_TEMPERATURE: f32 = 0.7;

/// Chat completion seam. Implementations receive the system prompt, the
/// session history and the current task input, and return raw text.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(&self, system_prompt: &str, history: &[Turn], input: &str) -> Result<String>;
}

/// Reusable Gemini client (connection-pooled)
pub struct GeminiModel {
    client: Client,
    api_key: String,
    base_url: String,
    temperature: f32,
}

impl GeminiModel {
    pub fn new(api_key: String, model: &str, temperature: f32) -> Self {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(8)
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            api_key,
            base_url: format!(
                "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent",
                model
            ),
            temperature,
        }
    }

    /// Fast deterministic tier used by the router.
    pub fn router_tier(api_key: String) -> Self {
        Self::new(api_key, ROUTER_MODEL, ROUTER_TEMPERATURE)
    }

    /// Richer tier used by the specialists.
    pub fn specialist_tier(api_key: String) -> Self {
        Self::new(api_key, SPECIALIST_MODEL, SPECIALIST_TEMPERATURE)
    }
}

#[async_trait]
impl ChatModel for GeminiModel {
    async fn complete(&self, system_prompt: &str, history: &[Turn], input: &str) -> Result<String> {
        if self.api_key.is_empty() {
            return Err(AssessorError::LlmError(
                "GEMINI_API_KEY not configured".to_string(),
            ));
        }

        let url = format!("{}?key={}", self.base_url, self.api_key);

        let mut contents: Vec<Content> = history
            .iter()
            .map(|turn| Content {
                role: match turn.role {
                    TurnRole::User => "user",
                    TurnRole::Assistant => "model",
                }
                .to_string(),
                parts: vec![Part {
                    text: turn.text.clone(),
                }],
            })
            .collect();
        contents.push(Content {
            role: "user".to_string(),
            parts: vec![Part {
                text: input.to_string(),
            }],
        });

        let request = GeminiRequest {
            contents,
            generation_config: GenerationConfig {
                temperature: self.temperature,
                top_p: 0.95,
                top_k: 40,
                max_output_tokens: 1024,
            },
            system_instruction: SystemInstruction {
                parts: vec![Part {
                    text: system_prompt.to_string(),
                }],
            },
        };

        info!("Calling Gemini API");

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                error!("Gemini API request failed: {}", e);
                AssessorError::LlmError(format!("Gemini API error: {}", e))
            })?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!("Gemini API error response: {}", error_text);
            return Err(AssessorError::LlmError(format!(
                "Gemini API error: {}",
                error_text
            )));
        }

        let gemini_response: GeminiResponse = response.json().await.map_err(|e| {
            error!("Failed to parse Gemini response: {}", e);
            AssessorError::LlmError(format!("Gemini parse error: {}", e))
        })?;

        let answer = gemini_response
            .candidates
            .first()
            .and_then(|candidate| candidate.content.parts.first())
            .map(|part| part.text.clone())
            .ok_or_else(|| AssessorError::LlmError("Empty response from Gemini".to_string()))?;

        Ok(answer)
    }
}

#[derive(Debug, Serialize)]
struct GeminiRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
    system_instruction: SystemInstruction,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default)]
    role: String,
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    text: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f32,
    top_p: f32,
    top_k: i32,
    max_output_tokens: i32,
}

#[derive(Debug, Serialize)]
struct SystemInstruction {
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Content,
}

/// Scripted model for development & testing.
/// Keeps the pipeline functional without LLM dependency: pops one canned
/// response per call, in order.
pub struct ScriptedModel {
    responses: Mutex<VecDeque<String>>,
    /// Inputs seen by the model, for assertions on prompt plumbing.
    pub seen_inputs: Mutex<Vec<String>>,
}

impl ScriptedModel {
    pub fn new<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            responses: Mutex::new(responses.into_iter().map(Into::into).collect()),
            seen_inputs: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    async fn complete(
        &self,
        _system_prompt: &str,
        _history: &[Turn],
        input: &str,
    ) -> Result<String> {
        self.seen_inputs
            .lock()
            .expect("seen_inputs lock")
            .push(input.to_string());

        self.responses
            .lock()
            .expect("responses lock")
            .pop_front()
            .ok_or_else(|| AssessorError::LlmError("scripted model exhausted".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_serialization() {
        let request = GeminiRequest {
            contents: vec![Content {
                role: "user".to_string(),
                parts: vec![Part {
                    text: "Quanto gastei hoje?".to_string(),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: 0.0,
                top_p: 0.95,
                top_k: 40,
                max_output_tokens: 1024,
            },
            system_instruction: SystemInstruction {
                parts: vec![Part {
                    text: "Você é o Assessor.AI".to_string(),
                }],
            },
        };

        let json = serde_json::to_string(&request);
        assert!(json.is_ok());
        assert!(json.unwrap().contains("Quanto gastei hoje?"));
    }

    #[tokio::test]
    async fn test_scripted_model_pops_in_order() {
        let model = ScriptedModel::new(["primeira", "segunda"]);
        assert_eq!(model.complete("", &[], "a").await.unwrap(), "primeira");
        assert_eq!(model.complete("", &[], "b").await.unwrap(), "segunda");
        assert!(model.complete("", &[], "c").await.is_err());
    }

    #[tokio::test]
    async fn test_missing_api_key() {
        let model = GeminiModel::new(String::new(), ROUTER_MODEL, 0.0);
        let result = model.complete("system", &[], "oi").await;
        assert!(result.is_err());
        let error_msg = result.unwrap_err().to_string();
        assert!(error_msg.contains("GEMINI_API_KEY"));
    }
}

use super::{GenerateRequest, LLMError, LLMProvider, ModelReply, Part, Role, Turn, Usage};
use crate::config::GeminiConfig;
use async_trait::async_trait;
use sdk::types::ToolCall;
use serde_json::{json, Value};
use tracing::debug;

pub struct GeminiProvider {
    config: GeminiConfig,
    api_key: String,
    client: reqwest::Client,
}

impl GeminiProvider {
    pub fn new(config: GeminiConfig, api_key: impl Into<String>) -> Self {
        Self {
            config,
            api_key: api_key.into(),
            client: reqwest::Client::new(),
        }
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.config.base_url.trim_end_matches('/'),
            self.config.model
        )
    }
}

/// Build the `generateContent` body for a request.
///
/// Tool turns travel as `user` content holding `functionResponse` parts.
pub fn build_payload(request: &GenerateRequest<'_>) -> Value {
    let contents: Vec<Value> = request.transcript.iter().map(encode_turn).collect();

    let declarations: Vec<Value> = request
        .tools
        .iter()
        .map(|tool| {
            json!({
                "name": tool.name,
                "description": tool.description,
                "parameters": tool.parameters,
            })
        })
        .collect();

    let mut payload = serde_json::Map::new();
    payload.insert("contents".to_string(), json!(contents));
    payload.insert(
        "systemInstruction".to_string(),
        json!({ "parts": [{ "text": request.system_prompt }] }),
    );
    if !declarations.is_empty() {
        payload.insert(
            "tools".to_string(),
            json!([{ "functionDeclarations": declarations }]),
        );
    }

    Value::Object(payload)
}

fn encode_turn(turn: &Turn) -> Value {
    let role = match turn.role {
        Role::Model => "model",
        Role::User | Role::Tool => "user",
    };

    let parts: Vec<Value> = turn
        .parts
        .iter()
        .map(|part| match part {
            Part::Text(text) => json!({ "text": text }),
            Part::FunctionCall(call) => json!({
                "functionCall": { "name": call.name, "args": call.args }
            }),
            Part::FunctionResponse(response) => json!({
                "functionResponse": { "name": response.name, "response": response.body() }
            }),
        })
        .collect();

    json!({ "role": role, "parts": parts })
}

/// Extract the parts and usage of the first candidate.
///
/// A response without candidates or content yields an empty reply rather
/// than an error; the agent loop decides what an empty turn means.
pub fn parse_reply(data: &Value) -> ModelReply {
    let raw_parts = data
        .get("candidates")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .and_then(|candidate| candidate.get("content"))
        .and_then(|content| content.get("parts"))
        .and_then(|p| p.as_array());

    let mut parts = Vec::new();
    for part in raw_parts.into_iter().flatten() {
        if let Some(call) = part.get("functionCall") {
            let Some(name) = call.get("name").and_then(|n| n.as_str()) else {
                debug!("Skipping functionCall without a name");
                continue;
            };
            let id = call
                .get("id")
                .and_then(|i| i.as_str())
                .map(str::to_string)
                .unwrap_or_else(|| format!("call_{}", uuid::Uuid::new_v4()));
            let args = call.get("args").cloned().unwrap_or_else(|| json!({}));
            parts.push(Part::FunctionCall(ToolCall::new(id, name, args)));
        } else if let Some(text) = part.get("text").and_then(|t| t.as_str()) {
            parts.push(Part::Text(text.to_string()));
        }
    }

    let usage = data.get("usageMetadata").map(|meta| Usage {
        prompt_tokens: meta
            .get("promptTokenCount")
            .and_then(|v| v.as_u64())
            .unwrap_or(0),
        response_tokens: meta
            .get("candidatesTokenCount")
            .and_then(|v| v.as_u64())
            .unwrap_or(0),
    });

    ModelReply { parts, usage }
}

#[async_trait]
impl LLMProvider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn generate(&self, request: &GenerateRequest<'_>) -> super::Result<ModelReply> {
        let payload = build_payload(request);
        debug!(
            "Sending {} turns to Gemini model {}",
            request.transcript.len(),
            self.config.model
        );

        let response = self
            .client
            .post(self.endpoint())
            .header("Content-Type", "application/json")
            .header("x-goog-api-key", &self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LLMError::Timeout
                } else {
                    LLMError::NetworkError(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();

            if status.as_u16() == 400 || status.as_u16() == 404 {
                return Err(LLMError::InvalidRequest(text));
            } else if status.as_u16() == 429 {
                return Err(LLMError::RateLimitExceeded);
            } else if status.as_u16() == 401 || status.as_u16() == 403 {
                return Err(LLMError::AuthenticationFailed(text));
            } else {
                return Err(LLMError::ProviderUnavailable(format!(
                    "Gemini API error ({}): {}",
                    status, text
                )));
            }
        }

        let data: Value = response
            .json()
            .await
            .map_err(|e| LLMError::ParseError(e.to_string()))?;

        Ok(parse_reply(&data))
    }
}

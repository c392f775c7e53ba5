//! LLM client: blocking request/response with two shapes, text completion
//! and JSON completion, against an OpenAI-compatible chat-completions
//! endpoint.
//!
//! Two implementations are provided: [`RemoteLlmClient`] talks to a hosted
//! provider (OpenAI-shaped API, bearer auth); [`LocalLlmClient`] talks to a
//! local Ollama-compatible gateway and additionally implements a
//! JSON-extraction fallback for local models that reject
//! `response_format=json_object`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

use crate::error::EngineError;

/// Free-form text completion and JSON-mode completion against a chat model.
/// Implementations perform one blocking HTTP call per invocation; the
/// orchestrator and generator never retry internally.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete_text(
        &self,
        model: &str,
        system_prompt: &str,
        user_input: &str,
    ) -> Result<String, EngineError>;

    async fn complete_json(
        &self,
        model: &str,
        system_prompt: &str,
        user_input: &str,
    ) -> Result<Value, EngineError>;
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ResponseFormat<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat<'a>>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

fn extract_content(body: ChatResponse) -> Result<String, EngineError> {
    body.choices
        .into_iter()
        .next()
        .map(|c| c.message.content)
        .ok_or_else(|| EngineError::LlmError("completion returned no choices".into()))
}

/// A hosted, OpenAI-shaped remote provider.
pub struct RemoteLlmClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl RemoteLlmClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.into(),
            api_key: api_key.into(),
        })
    }

    async fn chat(&self, req: &ChatRequest<'_>) -> Result<String, EngineError> {
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let resp = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(req)
            .send()
            .await
            .map_err(|e| EngineError::LlmError(format!("llm request failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(EngineError::LlmError(format!(
                "llm request returned {status}: {body}"
            )));
        }

        let body: ChatResponse = resp
            .json()
            .await
            .map_err(|e| EngineError::LlmError(format!("llm response decode failed: {e}")))?;
        extract_content(body)
    }
}

#[async_trait]
impl LlmClient for RemoteLlmClient {
    async fn complete_text(
        &self,
        model: &str,
        system_prompt: &str,
        user_input: &str,
    ) -> Result<String, EngineError> {
        let req = ChatRequest {
            model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: user_input,
                },
            ],
            response_format: None,
        };
        self.chat(&req).await
    }

    async fn complete_json(
        &self,
        model: &str,
        system_prompt: &str,
        user_input: &str,
    ) -> Result<Value, EngineError> {
        let req = ChatRequest {
            model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: user_input,
                },
            ],
            response_format: Some(ResponseFormat { kind: "json_object" }),
        };
        let text = self.chat(&req).await?;
        serde_json::from_str(&text)
            .map_err(|e| EngineError::LlmError(format!("llm returned invalid json: {e}")))
    }
}

/// A local, Ollama-compatible gateway. Some local
/// models reject `response_format=json_object`; `complete_json` falls back
/// to a plain completion and extracts a JSON object from the response text.
pub struct LocalLlmClient {
    http: reqwest::Client,
    base_url: String,
}

impl LocalLlmClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.into(),
        })
    }

    async fn chat(&self, req: &ChatRequest<'_>) -> Result<String, EngineError> {
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let resp = self
            .http
            .post(&url)
            .json(req)
            .send()
            .await
            .map_err(|e| EngineError::LlmError(format!("local llm request failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(EngineError::LlmError(format!(
                "local llm request returned {status}: {body}"
            )));
        }

        let body: ChatResponse = resp
            .json()
            .await
            .map_err(|e| EngineError::LlmError(format!("local llm response decode failed: {e}")))?;
        extract_content(body)
    }
}

#[async_trait]
impl LlmClient for LocalLlmClient {
    async fn complete_text(
        &self,
        model: &str,
        system_prompt: &str,
        user_input: &str,
    ) -> Result<String, EngineError> {
        let req = ChatRequest {
            model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: user_input,
                },
            ],
            response_format: None,
        };
        self.chat(&req).await
    }

    async fn complete_json(
        &self,
        model: &str,
        system_prompt: &str,
        user_input: &str,
    ) -> Result<Value, EngineError> {
        let json_req = ChatRequest {
            model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: user_input,
                },
            ],
            response_format: Some(ResponseFormat { kind: "json_object" }),
        };

        let text = match self.chat(&json_req).await {
            Ok(text) => text,
            Err(_) => {
                // local model rejected response_format; retry as plain text
                // and recover a JSON object from the free-form reply.
                self.complete_text(model, system_prompt, user_input).await?
            }
        };

        if let Ok(value) = serde_json::from_str::<Value>(&text) {
            return Ok(value);
        }
        extract_json_object(&text)
            .ok_or_else(|| EngineError::LlmError("no json object found in local llm response".into()))
    }
}

/// Recover a JSON object from free-form text: first a fenced code block
/// (```json ... ``` or ``` ... ```), else the first balanced `{...}` span.
fn extract_json_object(text: &str) -> Option<Value> {
    if let Some(fenced) = extract_fenced_block(text) {
        if let Ok(v) = serde_json::from_str(&fenced) {
            return Some(v);
        }
    }
    extract_balanced_braces(text).and_then(|s| serde_json::from_str(&s).ok())
}

fn extract_fenced_block(text: &str) -> Option<String> {
    let start = text.find("```")?;
    let after_fence = &text[start + 3..];
    // skip an optional language tag on the opening fence line
    let body_start = after_fence.find('\n').map(|i| i + 1).unwrap_or(0);
    let body = &after_fence[body_start..];
    let end = body.find("```")?;
    Some(body[..end].trim().to_string())
}

fn extract_balanced_braces(text: &str) -> Option<String> {
    let bytes = text.as_bytes();
    let start = text.find('{')?;
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, &b) in bytes[start..].iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(text[start..start + offset + 1].to_string());
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_fenced_json_block() {
        let text = "Here you go:\n```json\n{\"a\": 1}\n```\nthanks";
        let value = extract_json_object(text).unwrap();
        assert_eq!(value["a"], 1);
    }

    #[test]
    fn extracts_balanced_braces_without_fence() {
        let text = "sure, the result is {\"scenes\": [{\"n\": 1}], \"note\": \"a { b }\"} done";
        let value = extract_json_object(text).unwrap();
        assert_eq!(value["scenes"][0]["n"], 1);
        assert_eq!(value["note"], "a { b }");
    }

    #[test]
    fn returns_none_when_no_object_present() {
        assert!(extract_json_object("no json here at all").is_none());
    }
}

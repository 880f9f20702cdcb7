use crate::error::CoreError;
use futures_util::StreamExt;
use serde_json::{json, Value};
use std::future::Future;
use std::time::Duration;

/// Chat-completion seam used by the planner, scorer, and evaluator.
/// Production wires [`LlmClient`]; tests substitute canned responses.
pub trait ChatModel: Send + Sync {
    fn complete(&self, prompt: &str) -> impl Future<Output = Result<String, CoreError>> + Send;

    /// Multimodal variant: attaches a base64 mp4 clip when one exists.
    fn complete_with_video(
        &self,
        prompt: &str,
        video_b64: Option<String>,
    ) -> impl Future<Output = Result<String, CoreError>> + Send;
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    /// OpenAI-compatible base URL, e.g.
    /// `https://dashscope.aliyuncs.com/compatible-mode/v1`.
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub request_timeout: Duration,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            api_key: String::new(),
            model: "qwen2.5-omni-7b".to_string(),
            request_timeout: Duration::from_secs(120),
        }
    }
}

/// Streaming client against an OpenAI-compatible chat endpoint. One
/// process-wide instance; reqwest handles connection pooling internally.
#[derive(Clone)]
pub struct LlmClient {
    http: reqwest::Client,
    config: LlmConfig,
}

impl LlmClient {
    pub fn new(config: LlmConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .unwrap_or_default();
        Self { http, config }
    }

    async fn stream_chat(&self, content: Value) -> Result<String, CoreError> {
        if self.config.base_url.is_empty() {
            return Err(CoreError::Llm("llm endpoint not configured".to_string()));
        }
        let body = json!({
            "model": self.config.model,
            "messages": [{"role": "user", "content": content}],
            "modalities": ["text"],
            "stream": true,
        });
        let response = self
            .http
            .post(format!("{}/chat/completions", self.config.base_url))
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| CoreError::Llm(e.to_string()))?;
        if !response.status().is_success() {
            return Err(CoreError::Llm(format!(
                "chat endpoint returned {}",
                response.status()
            )));
        }

        // Concatenate SSE `data:` deltas into the full response text.
        let mut full = String::new();
        let mut pending = String::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| CoreError::Llm(e.to_string()))?;
            pending.push_str(&String::from_utf8_lossy(&chunk));
            while let Some(newline) = pending.find('\n') {
                let line = pending[..newline].trim().to_string();
                pending.drain(..=newline);
                if let Some(delta) = parse_sse_delta(&line) {
                    full.push_str(&delta);
                }
            }
        }
        if let Some(delta) = parse_sse_delta(pending.trim()) {
            full.push_str(&delta);
        }
        Ok(full)
    }
}

/// Extract the content delta from one SSE line, if any.
fn parse_sse_delta(line: &str) -> Option<String> {
    let payload = line.strip_prefix("data:")?.trim();
    if payload.is_empty() || payload == "[DONE]" {
        return None;
    }
    let value: Value = serde_json::from_str(payload).ok()?;
    value
        .pointer("/choices/0/delta/content")
        .and_then(|c| c.as_str())
        .map(str::to_string)
}

impl ChatModel for LlmClient {
    async fn complete(&self, prompt: &str) -> Result<String, CoreError> {
        self.stream_chat(json!([{"type": "text", "text": prompt}]))
            .await
    }

    async fn complete_with_video(
        &self,
        prompt: &str,
        video_b64: Option<String>,
    ) -> Result<String, CoreError> {
        let mut content = vec![json!({"type": "text", "text": prompt})];
        if let Some(video) = video_b64 {
            content.push(json!({
                "type": "video_url",
                "video_url": {"url": format!("data:;base64,{video}")},
            }));
        }
        self.stream_chat(Value::Array(content)).await
    }
}

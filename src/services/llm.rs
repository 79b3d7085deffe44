use crate::core::config::Config;
use crate::core::error::{Result, StoryError};
use async_trait::async_trait;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn tool(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_call_id: Some(tool_call_id.into()),
            ..Self::new(Role::Tool, content)
        }
    }

    pub fn assistant_tool_calls(calls: Vec<ToolCall>) -> Self {
        Self {
            role: Role::Assistant,
            content: None,
            tool_calls: Some(calls),
            tool_call_id: None,
        }
    }

    pub fn tool_calls(&self) -> &[ToolCall] {
        self.tool_calls.as_deref().unwrap_or(&[])
    }

    /// The message text, trimmed. Missing or blank content is a malformed
    /// response.
    pub fn text(&self) -> Result<String> {
        match self.content.as_deref().map(str::trim) {
            Some(text) if !text.is_empty() => Ok(text.to_string()),
            _ => Err(StoryError::MalformedResponse(
                "response empty or missing content".to_string(),
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    #[serde(rename = "type", default = "default_tool_type")]
    pub call_type: String,
    pub function: ToolCallFunction,
}

impl ToolCall {
    pub fn function(id: impl Into<String>, name: impl Into<String>, arguments: &Value) -> Self {
        Self {
            id: id.into(),
            call_type: default_tool_type(),
            function: ToolCallFunction {
                name: name.into(),
                arguments: arguments.to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallFunction {
    pub name: String,
    /// JSON-encoded arguments, exactly as the model produced them.
    pub arguments: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    #[serde(rename = "type", default = "default_tool_type")]
    pub tool_type: String,
    pub function: FunctionDefinition,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

fn default_tool_type() -> String {
    "function".to_string()
}

#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    /// Overrides the client's default model.
    pub model: Option<String>,
    pub messages: Vec<ChatMessage>,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub max_tokens: Option<u32>,
    pub json_mode: bool,
    pub tools: Vec<ToolDefinition>,
}

impl ChatRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            ..Default::default()
        }
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn top_p(mut self, top_p: f32) -> Self {
        self.top_p = Some(top_p);
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn json_mode(mut self) -> Self {
        self.json_mode = true;
        self
    }

    pub fn tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = tools;
        self
    }
}

#[async_trait]
pub trait LlmClient: Send + Sync + Debug {
    /// Sends one request and returns the assistant message, tool calls
    /// included.
    async fn complete(&self, request: ChatRequest) -> Result<ChatMessage>;

    async fn chat(&self, system: &str, user: &str) -> Result<String> {
        let request = ChatRequest::new(vec![ChatMessage::system(system), ChatMessage::user(user)]);
        self.complete(request).await?.text()
    }

    /// Single user turn, no system prompt.
    async fn prompt(&self, text: &str, model: &str) -> Result<String> {
        let request = ChatRequest::new(vec![ChatMessage::user(text)]).model(model);
        self.complete(request).await?.text()
    }
}

pub fn create_llm(config: &Config) -> Result<Arc<dyn LlmClient>> {
    match config.llm.provider.as_str() {
        "openai" => {
            let client = OpenAIClient::new(
                config.api_key()?,
                &config.llm.story_model,
                Some(&config.base_url()),
            )
            .with_retry(
                config.llm.retry_count,
                Duration::from_secs(config.llm.retry_delay_seconds),
            );
            Ok(Arc::new(client))
        }
        other => Err(StoryError::Configuration(format!(
            "Unknown LLM provider: {}",
            other
        ))),
    }
}

// --- OpenAI ---

#[derive(Debug)]
pub struct OpenAIClient {
    api_key: String,
    model: String,
    base_url: String,
    retry_count: usize,
    retry_delay: Duration,
    client: reqwest::Client,
}

impl OpenAIClient {
    pub fn new(api_key: &str, model: &str, base_url: Option<&str>) -> Self {
        Self {
            api_key: api_key.to_string(),
            model: model.to_string(),
            base_url: base_url
                .unwrap_or("https://api.openai.com/v1")
                .trim_end_matches('/')
                .to_string(),
            retry_count: 0,
            retry_delay: Duration::from_secs(0),
            client: reqwest::Client::new(),
        }
    }

    pub fn with_retry(mut self, retry_count: usize, retry_delay: Duration) -> Self {
        self.retry_count = retry_count;
        self.retry_delay = retry_delay;
        self
    }

    async fn send_once(&self, body: &OpenAIRequest<'_>) -> Result<ChatMessage> {
        let url = format!("{}/chat/completions", self.base_url);

        let resp = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(body)
            .send()
            .await
            .map_err(|e| StoryError::network(&url, e))?;

        let status = resp.status();
        let response_text = resp.text().await.map_err(|e| StoryError::network(&url, e))?;
        if !status.is_success() {
            return Err(StoryError::Api {
                service: "OpenAI",
                status: status.as_u16(),
                body: response_text,
            });
        }

        let result: OpenAIResponse = serde_json::from_str(&response_text).map_err(|e| {
            StoryError::MalformedResponse(format!(
                "Failed to parse OpenAI response: {}. Body: {}",
                e, response_text
            ))
        })?;

        result
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message)
            .ok_or_else(|| StoryError::MalformedResponse("OpenAI response has no choices".into()))
    }
}

#[derive(Serialize)]
struct OpenAIRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<&'a [ToolDefinition]>,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: &'static str,
}

#[derive(Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
}

#[derive(Deserialize)]
struct OpenAIChoice {
    message: ChatMessage,
}

#[async_trait]
impl LlmClient for OpenAIClient {
    async fn complete(&self, request: ChatRequest) -> Result<ChatMessage> {
        let model = request.model.as_deref().unwrap_or(&self.model);
        let body = OpenAIRequest {
            model,
            messages: &request.messages,
            temperature: request.temperature,
            top_p: request.top_p,
            max_tokens: request.max_tokens,
            response_format: request.json_mode.then_some(ResponseFormat {
                format_type: "json_object",
            }),
            tools: (!request.tools.is_empty()).then_some(request.tools.as_slice()),
        };
        debug!(
            "OpenAI request: model={} messages={} tools={}",
            model,
            request.messages.len(),
            request.tools.len()
        );

        let mut attempt = 0;
        loop {
            match self.send_once(&body).await {
                Ok(message) => return Ok(message),
                Err(e) if e.is_transient() && attempt < self.retry_count => {
                    attempt += 1;
                    warn!(
                        "OpenAI request failed ({}), retrying {}/{}",
                        e, attempt, self.retry_count
                    );
                    tokio::time::sleep(self.retry_delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ErrorKind;
    use mockito::Matcher;
    use serde_json::json;

    #[test]
    fn test_openai_response_parsing_success() {
        let json = r#"{
            "id": "chatcmpl-123",
            "object": "chat.completion",
            "created": 1677652288,
            "model": "gpt-3.5-turbo-0613",
            "choices": [{
                "index": 0,
                "message": {
                    "role": "assistant",
                    "content": "Once upon a time, a little mouse named Pip..."
                },
                "logprobs": null,
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 9, "completion_tokens": 12, "total_tokens": 21}
        }"#;

        let result: OpenAIResponse = serde_json::from_str(json).unwrap();
        assert_eq!(
            result.choices[0].message.text().unwrap(),
            "Once upon a time, a little mouse named Pip..."
        );
    }

    #[test]
    fn test_tool_call_message_parsing() {
        let json = r#"{
            "role": "assistant",
            "content": null,
            "tool_calls": [{
                "id": "call_1",
                "type": "function",
                "function": {"name": "createItem", "arguments": "{\"type\":\"story\"}"}
            }]
        }"#;
        let message: ChatMessage = serde_json::from_str(json).unwrap();
        assert_eq!(message.tool_calls().len(), 1);
        assert_eq!(message.tool_calls()[0].function.name, "createItem");
        assert!(message.text().is_err());
    }

    #[test]
    fn test_tool_message_serialization() {
        let value = serde_json::to_value(ChatMessage::tool("call_1", "done")).unwrap();
        assert_eq!(value, json!({"role": "tool", "content": "done", "tool_call_id": "call_1"}));
    }

    #[tokio::test]
    async fn test_chat_sends_auth_and_json_mode() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .match_header("authorization", "Bearer test-key")
            .match_body(Matcher::PartialJson(json!({
                "model": "gpt-4o",
                "response_format": {"type": "json_object"},
                "max_tokens": 4000
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"choices":[{"message":{"role":"assistant","content":" {\"ok\": true} "}}]}"#)
            .create_async()
            .await;

        let client = OpenAIClient::new("test-key", "gpt-3.5-turbo", Some(&server.url()));
        let request = ChatRequest::new(vec![ChatMessage::user("hi")])
            .model("gpt-4o")
            .max_tokens(4000)
            .json_mode();
        let reply = client.complete(request).await.unwrap();
        assert_eq!(reply.text().unwrap(), "{\"ok\": true}");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_error_status_is_api_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/chat/completions")
            .with_status(401)
            .with_body(r#"{"error":{"message":"Incorrect API key"}}"#)
            .create_async()
            .await;

        let client = OpenAIClient::new("bad", "gpt-3.5-turbo", Some(&server.url()));
        let err = client.chat("system", "user").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Api);
        assert!(err.to_string().contains("Incorrect API key"));
    }

    #[tokio::test]
    async fn test_transient_errors_retried() {
        let mut server = mockito::Server::new_async().await;
        let failing = server
            .mock("POST", "/chat/completions")
            .with_status(503)
            .expect(3)
            .create_async()
            .await;

        let client = OpenAIClient::new("k", "m", Some(&server.url()))
            .with_retry(2, Duration::from_millis(1));
        let err = client.chat("s", "u").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Api);
        failing.assert_async().await;
    }

    #[tokio::test]
    async fn test_empty_choices_is_malformed() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_body(r#"{"choices":[]}"#)
            .create_async()
            .await;

        let client = OpenAIClient::new("k", "m", Some(&server.url()));
        let err = client.chat("s", "u").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedResponse);
    }
}

use crate::core::error::Result;
use crate::core::state::{StateSnapshot, StateStore, KEY_LAST_ACTION};
use crate::services::agent::backend::BackendTools;
use crate::services::agent::prompt::system_prompt_with_state;
use crate::services::agent::tools::{ToolRegistry, ToolSide, ToolSpec};
use crate::services::llm::{ChatMessage, ChatRequest, LlmClient, ToolCall};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RunInput {
    #[serde(default)]
    pub thread_id: Option<String>,
    /// Conversation so far, without a system message.
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    /// Shared state as the UI currently sees it. Replaces the stored state
    /// before the run when present.
    #[serde(default)]
    pub state: Option<Map<String, Value>>,
    #[serde(default)]
    pub state_version: Option<u64>,
}

/// A validated frontend tool call for the UI to execute.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrontendCall {
    pub id: String,
    pub name: String,
    pub arguments: Value,
    pub description: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunOutput {
    pub thread_id: String,
    /// Messages produced during this run, tool results included.
    pub messages: Vec<ChatMessage>,
    pub frontend_calls: Vec<FrontendCall>,
    pub state: StateSnapshot,
}

/// Drives the tool-calling conversation. Backend tools run here and their
/// output is fed back to the model; frontend tools end the run and are
/// handed to the UI.
pub struct AgentRouter {
    llm: Arc<dyn LlmClient>,
    registry: ToolRegistry,
    backend: BackendTools,
    state: Arc<dyn StateStore>,
    model: String,
    max_steps: usize,
}

enum CallOutcome {
    Reply(ChatMessage),
    Frontend(FrontendCall),
}

impl AgentRouter {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        backend: BackendTools,
        state: Arc<dyn StateStore>,
        model: &str,
        max_steps: usize,
    ) -> Self {
        Self {
            llm,
            registry: ToolRegistry::standard(),
            backend,
            state,
            model: model.to_string(),
            max_steps,
        }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn state(&self) -> &Arc<dyn StateStore> {
        &self.state
    }

    pub async fn run(&self, input: RunInput) -> Result<RunOutput> {
        let thread_id = input
            .thread_id
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        if let Some(values) = input.state {
            self.state.replace(values, input.state_version).await?;
        }

        let snapshot = self.state.snapshot().await;
        let mut conversation = Vec::with_capacity(input.messages.len() + 1);
        conversation.push(ChatMessage::system(system_prompt_with_state(&snapshot)));
        conversation.extend(input.messages);

        let definitions = self.registry.definitions();
        let mut produced = Vec::new();
        let mut frontend_calls = Vec::new();

        for step in 1..=self.max_steps {
            let request = ChatRequest::new(conversation.clone())
                .model(&self.model)
                .tools(definitions.clone());
            let reply = self.llm.complete(request).await?;
            conversation.push(reply.clone());
            produced.push(reply.clone());

            let calls = reply.tool_calls();
            if calls.is_empty() {
                debug!("Thread {} finished after {} step(s)", thread_id, step);
                break;
            }

            for call in calls {
                match self.handle_call(call).await {
                    CallOutcome::Reply(message) => {
                        conversation.push(message.clone());
                        produced.push(message);
                    }
                    CallOutcome::Frontend(call) => frontend_calls.push(call),
                }
            }

            if !frontend_calls.is_empty() {
                break;
            }
            if step == self.max_steps {
                warn!(
                    "Thread {} stopped after {} steps without a final answer",
                    thread_id, self.max_steps
                );
            }
        }

        Ok(RunOutput {
            thread_id,
            messages: produced,
            frontend_calls,
            state: self.state.snapshot().await,
        })
    }

    async fn handle_call(&self, call: &ToolCall) -> CallOutcome {
        let name = call.function.name.as_str();
        let Some(spec) = self.registry.get(name) else {
            warn!("Model called unknown tool {}", name);
            return error_reply(call, &format!("Unknown tool '{}'", name));
        };

        let args = match parse_arguments(&call.function.arguments) {
            Ok(args) => args,
            Err(msg) => return error_reply(call, &msg),
        };
        if let Err(e) = spec.validate_args(&args) {
            return error_reply(call, &e.to_string());
        }

        let description = spec.describe_call(&args);

        match spec.side {
            ToolSide::Frontend => {
                info!("Frontend call: {}", description);
                self.record_action(&description).await;
                CallOutcome::Frontend(FrontendCall {
                    id: call.id.clone(),
                    name: name.to_string(),
                    arguments: with_defaults(spec, args),
                    description,
                })
            }
            ToolSide::Backend => {
                info!("Backend call: {}", description);
                let content = match self.backend.dispatch(name, &args).await {
                    Ok(text) => text,
                    Err(e) => {
                        warn!("Backend tool {} failed: {}", name, e);
                        format!("Error: {}", e)
                    }
                };
                CallOutcome::Reply(ChatMessage::tool(&call.id, content))
            }
        }
    }

    /// Only frontend calls count as canvas actions.
    async fn record_action(&self, description: &str) {
        self.state.set(KEY_LAST_ACTION, json!(description)).await;
    }
}

fn error_reply(call: &ToolCall, message: &str) -> CallOutcome {
    CallOutcome::Reply(ChatMessage::tool(&call.id, format!("Error: {}", message)))
}

/// Models send `""` for argument-less calls.
fn parse_arguments(raw: &str) -> std::result::Result<Value, String> {
    if raw.trim().is_empty() {
        return Ok(json!({}));
    }
    serde_json::from_str(raw).map_err(|e| format!("arguments are not valid JSON: {}", e))
}

fn with_defaults(spec: &ToolSpec, mut args: Value) -> Value {
    if let Value::Object(obj) = &mut args {
        for param in &spec.params {
            if let Some(default) = &param.default {
                obj.entry(param.name.to_string())
                    .or_insert_with(|| default.clone());
            }
        }
    }
    args
}

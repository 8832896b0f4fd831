use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use ureq::Agent;

use crate::error::{Result, StageError};
use crate::per_item::{ItemStage, Outputs, emit};
use crate::stage::ToolCallFn;
use crate::{Dict, Record, Setting};

const DEFAULT_HOST: &str = "http://localhost:11434";

/// A function call requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub name: String,
    #[serde(default)]
    pub arguments: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallEntry {
    pub function: ToolCall,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallEntry>,
    /// Set on `tool` messages: the function that produced the content.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
}

impl Message {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
            ..Self::default()
        }
    }

    fn tool_result(name: &str, content: String) -> Self {
        Self {
            role: "tool".into(),
            content,
            tool_name: Some(name.into()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatResponse {
    pub model: String,
    pub created_at: String,
    pub message: Message,
    pub done: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub done_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatInput {
    messages: Vec<Message>,
}

#[derive(Serialize)]
struct ChatOutput<'r> {
    response: &'r ChatResponse,
}

/// Something that answers one chat request.
pub trait ChatClient {
    fn chat(&mut self, request: &ChatRequest) -> Result<ChatResponse>;
}

/// Talks to an Ollama server over HTTP.
pub struct OllamaClient {
    host: String,
    timeout: Duration,
}

impl OllamaClient {
    pub fn new(host: impl Into<String>, timeout: Duration) -> Self {
        Self {
            host: host.into(),
            timeout,
        }
    }
}

impl ChatClient for OllamaClient {
    fn chat(&mut self, request: &ChatRequest) -> Result<ChatResponse> {
        let config = Agent::config_builder()
            .timeout_global(Some(self.timeout))
            .build();
        let agent: Agent = config.into();

        let url = format!("{}/api/chat", self.host);
        let response: ChatResponse = agent
            .post(&url)
            .send_json(request)?
            .body_mut()
            .read_json()?;
        Ok(response)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    pub model: String,
    pub system_prompt: String,
    pub format: Option<Value>,
    pub tools: Vec<Value>,
    pub options: Option<Value>,
    pub host: String,
    pub timeout_secs: u64,
    pub max_tool_rounds: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            model: String::new(),
            system_prompt: String::new(),
            format: None,
            tools: Vec::new(),
            options: None,
            host: String::new(),
            timeout_secs: 120,
            max_tool_rounds: 8,
        }
    }
}

impl ChatConfig {
    /// The configured host, else `OLLAMA_HOST`, else the local default.
    pub fn resolved_host(&self) -> String {
        let host = if self.host.is_empty() {
            std::env::var("OLLAMA_HOST").unwrap_or_default()
        } else {
            self.host.clone()
        };
        let host = if host.is_empty() {
            DEFAULT_HOST.to_string()
        } else if host.contains("://") {
            host
        } else {
            format!("http://{host}")
        };
        host.trim_end_matches('/').to_string()
    }
}

/// Sends each input conversation to a chat model.
///
/// Input: `{"messages": [{"role", "content"}, ..]}`. Output:
/// `{"response": <chat response>}`. Tool calls in a reply are answered
/// through the [`Setting::ToolCall`] callback and the conversation is
/// re-sent, up to `max_tool_rounds` times.
#[derive(Default)]
pub struct ChatStage {
    conf: ChatConfig,
    client: Option<Box<dyn ChatClient>>,
    tool_call: Option<ToolCallFn>,
}

impl ChatStage {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            conf: ChatConfig {
                model: model.into(),
                ..ChatConfig::default()
            },
            ..Self::default()
        }
    }

    /// Use `client` instead of an HTTP connection to Ollama.
    pub fn with_client(mut self, client: impl ChatClient + 'static) -> Self {
        self.client = Some(Box::new(client));
        self
    }

    pub fn config(&self) -> &ChatConfig {
        &self.conf
    }
}

impl ItemStage for ChatStage {
    fn name(&self) -> &str {
        "chat"
    }

    fn configure(&mut self, blob: &[u8]) -> Result<()> {
        self.conf = serde_json::from_slice(blob)?;
        Ok(())
    }

    fn begin(&mut self) -> Result<()> {
        if self.conf.model.is_empty() {
            return Err(StageError::config("model is not set"));
        }
        Ok(())
    }

    fn process_one<'d>(&mut self, record: Record, _dict: &'d Dict) -> Result<Outputs<'d>> {
        let input: ChatInput = serde_json::from_slice(&record)?;

        let mut messages = Vec::with_capacity(input.messages.len() + 1);
        if !self.conf.system_prompt.is_empty() {
            messages.push(Message::new("system", self.conf.system_prompt.as_str()));
        }
        messages.extend(input.messages);

        let mut request = ChatRequest {
            model: self.conf.model.clone(),
            messages,
            stream: false,
            format: self.conf.format.clone(),
            tools: self.conf.tools.clone(),
            options: self.conf.options.clone(),
        };

        let mut ollama;
        let client: &mut dyn ChatClient = match self.client.as_deref_mut() {
            Some(client) => client,
            None => {
                ollama = OllamaClient::new(
                    self.conf.resolved_host(),
                    Duration::from_secs(self.conf.timeout_secs),
                );
                &mut ollama
            }
        };

        let max_rounds = self.conf.max_tool_rounds;
        for round in 0..=max_rounds {
            let response = client.chat(&request)?;
            if response.message.tool_calls.is_empty() {
                let out = serde_json::to_vec(&ChatOutput {
                    response: &response,
                })?;
                return Ok(emit::one(out));
            }
            if round == max_rounds {
                break;
            }

            let answer = self.tool_call.as_mut().ok_or_else(|| {
                StageError::config("model requested a tool call but no callback is set")
            })?;
            let calls = response.message.tool_calls.clone();
            request.messages.push(response.message);
            for call in &calls {
                tracing::debug!(tool = %call.function.name, round, "tool call");
                let content = answer(&call.function)?;
                request
                    .messages
                    .push(Message::tool_result(&call.function.name, content));
            }
        }

        Err(StageError::other(format!(
            "no answer after {max_rounds} tool rounds"
        )))
    }

    /// Takes [`Setting::Model`], [`Setting::Format`], [`Setting::Tools`] and
    /// [`Setting::ToolCall`].
    fn set_value(&mut self, setting: Setting) -> Result<()> {
        match setting {
            Setting::Model(model) => self.conf.model = model,
            Setting::Format(format) => self.conf.format = Some(format),
            Setting::Tools(tools) => self.conf.tools = tools,
            Setting::ToolCall(callback) => self.tool_call = Some(callback),
            other => return Err(other.unsupported()),
        }
        Ok(())
    }
}

pub mod openai;

use anyhow::Result;
use async_openai::types::{ChatCompletionRequestMessage, ChatCompletionTool};

/// A tool invocation requested by the model.
#[derive(Debug, Clone)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    /// Raw JSON argument string, e.g. `{"query": "..."}`.
    pub arguments: String,
}

/// One model turn: either a batch of tool-call requests or a final answer.
#[derive(Debug, Clone)]
pub enum ChatTurn {
    ToolCalls(Vec<ToolCall>),
    Answer(String),
}

#[async_trait::async_trait]
pub trait Llm: Send + Sync {
    /// One reasoning turn with the given tool descriptors available.
    async fn chat(
        &self,
        messages: Vec<ChatCompletionRequestMessage>,
        tools: Vec<ChatCompletionTool>,
    ) -> Result<ChatTurn>;

    /// JSON-constrained completion, used for schema coercion.
    async fn chat_json(&self, messages: Vec<ChatCompletionRequestMessage>) -> Result<String>;

    /// Plain-text completion, used for report synthesis.
    async fn chat_text(&self, messages: Vec<ChatCompletionRequestMessage>) -> Result<String>;
}

use std::time::Duration;

use anyhow::{anyhow, Result};
use async_openai::config::OpenAIConfig;
use async_openai::error::OpenAIError;
use async_openai::types::{
    ChatCompletionRequestMessage, ChatCompletionTool, CreateChatCompletionRequest,
    CreateChatCompletionRequestArgs, CreateChatCompletionResponse, ResponseFormat,
};
use async_openai::Client;

use super::{ChatTurn, Llm, ToolCall};

/// OpenAI-compatible chat client (works against SiliconFlow-style hosts via
/// a base-URL override). Transient rate limiting is retried here with
/// bounded exponential backoff; the batch scheduler above never retries.
#[derive(Clone)]
pub struct LlmClient {
    client: Client<OpenAIConfig>,
    model: String,
    temperature: f32,
    max_retries: u32,
}

fn is_retryable(err: &OpenAIError) -> bool {
    match err {
        OpenAIError::Reqwest(_) => true,
        OpenAIError::ApiError(_) => {
            let msg = err.to_string().to_lowercase();
            msg.contains("rate limit") || msg.contains("429") || msg.contains("overloaded")
        }
        _ => false,
    }
}

impl LlmClient {
    pub fn new(
        model: String,
        base_url: Option<String>,
        api_key: Option<String>,
        temperature: f32,
        timeout: Duration,
        max_retries: u32,
    ) -> Result<Self> {
        let mut cfg = OpenAIConfig::default();
        if let Some(url) = base_url {
            cfg = cfg.with_api_base(url);
        }
        if let Some(key) = api_key {
            cfg = cfg.with_api_key(key);
        }
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        let client = Client::with_config(cfg).with_http_client(http);
        Ok(Self {
            client,
            model,
            temperature,
            max_retries: max_retries.max(1),
        })
    }

    async fn create(
        &self,
        req: CreateChatCompletionRequest,
    ) -> Result<CreateChatCompletionResponse> {
        let mut attempt = 0u32;
        loop {
            match self.client.chat().create(req.clone()).await {
                Ok(resp) => return Ok(resp),
                Err(e) if attempt + 1 < self.max_retries && is_retryable(&e) => {
                    let delay = Duration::from_millis(500u64 << attempt.min(6));
                    tracing::warn!(attempt, error = %e, delay_ms = delay.as_millis() as u64,
                        "transient model-call failure, backing off");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn base_request(
        &self,
        messages: Vec<ChatCompletionRequestMessage>,
    ) -> CreateChatCompletionRequestArgs {
        let mut args = CreateChatCompletionRequestArgs::default();
        args.model(self.model.clone())
            .messages(messages)
            .temperature(self.temperature);
        args
    }
}

#[async_trait::async_trait]
impl Llm for LlmClient {
    async fn chat(
        &self,
        messages: Vec<ChatCompletionRequestMessage>,
        tools: Vec<ChatCompletionTool>,
    ) -> Result<ChatTurn> {
        let mut args = self.base_request(messages);
        if !tools.is_empty() {
            args.tools(tools);
        }
        let resp = self.create(args.build()?).await?;
        let choice = resp
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("model returned no choices"))?;
        if let Some(calls) = choice.message.tool_calls {
            if !calls.is_empty() {
                return Ok(ChatTurn::ToolCalls(
                    calls
                        .into_iter()
                        .map(|c| ToolCall {
                            id: c.id,
                            name: c.function.name,
                            arguments: c.function.arguments,
                        })
                        .collect(),
                ));
            }
        }
        Ok(ChatTurn::Answer(choice.message.content.unwrap_or_default()))
    }

    async fn chat_json(&self, messages: Vec<ChatCompletionRequestMessage>) -> Result<String> {
        let req = self
            .base_request(messages)
            .response_format(ResponseFormat::JsonObject)
            .build()?;
        let resp = self.create(req).await?;
        resp.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| anyhow!("model returned no content"))
    }

    async fn chat_text(&self, messages: Vec<ChatCompletionRequestMessage>) -> Result<String> {
        let resp = self.create(self.base_request(messages).build()?).await?;
        resp.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| anyhow!("model returned no content"))
    }
}

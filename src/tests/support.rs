//! Shared fakes for agent and scheduler tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::Result;
use async_openai::types::{
    ChatCompletionRequestMessage, ChatCompletionRequestUserMessageContent, ChatCompletionTool,
};
use async_trait::async_trait;
use tokio::time::sleep;

use crate::evidence::{EvidenceError, EvidenceSource};
use crate::llm::{ChatTurn, Llm};

type ChatHandler = Box<
    dyn Fn(&[ChatCompletionRequestMessage], &[ChatCompletionTool]) -> (u64, Result<ChatTurn>)
        + Send
        + Sync,
>;
type JsonHandler =
    Box<dyn Fn(&[ChatCompletionRequestMessage]) -> (u64, Result<String>) + Send + Sync>;

/// Scriptable model double. Handlers return a delay in milliseconds plus the
/// outcome, so tests can shuffle completion order and inject failures.
pub struct FakeLlm {
    chat: ChatHandler,
    json: JsonHandler,
}

impl FakeLlm {
    pub fn new<C, J>(chat: C, json: J) -> Self
    where
        C: Fn(&[ChatCompletionRequestMessage], &[ChatCompletionTool]) -> (u64, Result<ChatTurn>)
            + Send
            + Sync
            + 'static,
        J: Fn(&[ChatCompletionRequestMessage]) -> (u64, Result<String>) + Send + Sync + 'static,
    {
        Self {
            chat: Box::new(chat),
            json: Box::new(json),
        }
    }

    /// Fixed sequences: one reasoning turn and one coercion reply popped per
    /// call. Exhausted scripts yield empty answers.
    pub fn scripted(turns: Vec<ChatTurn>, jsons: Vec<String>) -> Self {
        let turns = Mutex::new(turns.into_iter().collect::<VecDeque<_>>());
        let jsons = Mutex::new(jsons.into_iter().collect::<VecDeque<_>>());
        Self::new(
            move |_, _| {
                let next = turns
                    .lock()
                    .unwrap()
                    .pop_front()
                    .unwrap_or_else(|| ChatTurn::Answer(String::new()));
                (0, Ok(next))
            },
            move |_| {
                let next = jsons.lock().unwrap().pop_front().unwrap_or_default();
                (0, Ok(next))
            },
        )
    }

    /// First user-message text in the transcript, for keying fake behavior
    /// on the statement under evaluation.
    pub fn user_text(messages: &[ChatCompletionRequestMessage]) -> String {
        messages
            .iter()
            .find_map(|m| match m {
                ChatCompletionRequestMessage::User(u) => match &u.content {
                    ChatCompletionRequestUserMessageContent::Text(t) => Some(t.clone()),
                    _ => None,
                },
                _ => None,
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl Llm for FakeLlm {
    async fn chat(
        &self,
        messages: Vec<ChatCompletionRequestMessage>,
        tools: Vec<ChatCompletionTool>,
    ) -> Result<ChatTurn> {
        let (delay_ms, out) = (self.chat)(&messages, &tools);
        if delay_ms > 0 {
            sleep(Duration::from_millis(delay_ms)).await;
        }
        out
    }

    async fn chat_json(&self, messages: Vec<ChatCompletionRequestMessage>) -> Result<String> {
        let (delay_ms, out) = (self.json)(&messages);
        if delay_ms > 0 {
            sleep(Duration::from_millis(delay_ms)).await;
        }
        out
    }

    async fn chat_text(&self, messages: Vec<ChatCompletionRequestMessage>) -> Result<String> {
        self.chat_json(messages).await
    }
}

/// Evidence source that records call counts and the in-flight high-water
/// mark, for the tool-call-bound and concurrency-cap properties.
pub struct CountingEvidence {
    name: &'static str,
    text: String,
    delay_ms: u64,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl CountingEvidence {
    pub fn named(name: &'static str, text: &str) -> Self {
        Self {
            name,
            text: text.to_string(),
            delay_ms: 0,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn with_delay_ms(mut self, delay_ms: u64) -> Self {
        self.delay_ms = delay_ms;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EvidenceSource for CountingEvidence {
    fn name(&self) -> &str {
        self.name
    }

    async fn lookup(&self, _query: &str) -> Result<String, EvidenceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        if self.delay_ms > 0 {
            sleep(Duration::from_millis(self.delay_ms)).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(self.text.clone())
    }
}

/// Evidence source whose lookups always fail, simulating timeouts.
pub struct FailingEvidence {
    name: &'static str,
}

impl FailingEvidence {
    pub fn named(name: &'static str) -> Self {
        Self { name }
    }
}

#[async_trait]
impl EvidenceSource for FailingEvidence {
    fn name(&self) -> &str {
        self.name
    }

    async fn lookup(&self, _query: &str) -> Result<String, EvidenceError> {
        Err(EvidenceError::Other("simulated timeout".into()))
    }
}

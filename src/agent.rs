use anyhow::{Context, Result};
use async_openai::types::{
    ChatCompletionMessageToolCall, ChatCompletionRequestAssistantMessageArgs,
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
    ChatCompletionRequestToolMessageArgs, ChatCompletionRequestUserMessageArgs,
    ChatCompletionTool, ChatCompletionToolArgs, ChatCompletionToolType, FunctionCall,
    FunctionObjectArgs,
};
use serde::Deserialize;

use crate::evidence::EvidenceSource;
use crate::llm::{ChatTurn, Llm, ToolCall};
use crate::types::Statement;
use crate::verdict::{self, Verdict};

pub const KB_TOOL: &str = "search_knowledge_base";
pub const WEB_TOOL: &str = "web_search";

/// Upper bound on reasoning turns per statement; the protocol needs at most
/// two (decide on KB evidence, decide on web evidence).
const MAX_TURNS: usize = 4;

/// Web page content beyond this is truncated before it enters the transcript.
const MAX_EVIDENCE_CHARS: usize = 6000;

const SYSTEM_PROMPT: &str = "You are a fact-checking assistant evaluating one factual statement.\n\
Protocol:\n\
1. The knowledge base has already been searched once; its result is in the transcript.\n\
2. If the retrieved passages clearly support the statement, conclude it is correct and cite the passage as \"<document>, page <n>\".\n\
3. If they clearly contradict it, conclude it is wrong with the same citation format.\n\
4. If the knowledge base is insufficient (neutral, unrelated, or empty), call the web_search tool ONCE to check online, then conclude. Cite exactly one URL.\n\
5. If the web results still do not clarify, conclude undetermined with no source.\n\
Never call any tool more than once. Never cite both the knowledge base and the web.";

/// Hard cap on tool invocations per statement evaluation. The prompt asks
/// for discipline; this guard enforces it regardless of model compliance.
#[derive(Debug, Default)]
struct ToolGuard {
    kb_calls: u32,
    web_calls: u32,
}

impl ToolGuard {
    fn admit(&mut self, name: &str) -> bool {
        match name {
            KB_TOOL => {
                self.kb_calls += 1;
                self.kb_calls <= 1
            }
            WEB_TOOL => {
                self.web_calls += 1;
                self.web_calls <= 1
            }
            _ => false,
        }
    }
}

#[derive(Deserialize)]
struct WebSearchArgs {
    query: String,
}

/// Evaluates one statement into exactly one verdict, driving the reasoning
/// model through the knowledge-base-then-web protocol.
pub struct FactChecker<'a> {
    llm: &'a dyn Llm,
    kb: &'a dyn EvidenceSource,
    web: Option<&'a dyn EvidenceSource>,
}

impl<'a> FactChecker<'a> {
    pub fn new(
        llm: &'a dyn Llm,
        kb: &'a dyn EvidenceSource,
        web: Option<&'a dyn EvidenceSource>,
    ) -> Self {
        Self { llm, kb, web }
    }

    fn tool_descriptors(&self) -> Result<Vec<ChatCompletionTool>> {
        let kb = ChatCompletionToolArgs::default()
            .r#type(ChatCompletionToolType::Function)
            .function(
                FunctionObjectArgs::default()
                    .name(KB_TOOL)
                    .description("Search the internal knowledge base of relevant essay documents.")
                    .parameters(serde_json::json!({
                        "type": "object",
                        "properties": {"query": {"type": "string"}},
                        "required": ["query"]
                    }))
                    .build()?,
            )
            .build()?;
        let web = ChatCompletionToolArgs::default()
            .r#type(ChatCompletionToolType::Function)
            .function(
                FunctionObjectArgs::default()
                    .name(WEB_TOOL)
                    .description("Search the web and return page content for real-time information.")
                    .parameters(serde_json::json!({
                        "type": "object",
                        "properties": {"query": {"type": "string"}},
                        "required": ["query"]
                    }))
                    .build()?,
            )
            .build()?;
        Ok(vec![kb, web])
    }

    /// Runs the protocol for one statement. Errors escaping here (coercion
    /// failure after repair, model-call exhaustion) are handled by the batch
    /// scheduler's fallback substitution.
    pub async fn evaluate(&self, st: &Statement) -> Result<Verdict> {
        let mut guard = ToolGuard::default();
        let mut web_cited = false;

        // The mandatory knowledge-base lookup happens here, exactly once,
        // and is seeded into the transcript as a completed tool exchange so
        // the model can neither skip nor repeat it.
        guard.kb_calls = 1;
        let kb_evidence = match self.kb.lookup(&st.statement).await {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(source = self.kb.name(), error = %e,
                    "knowledge-base lookup failed, treating as empty");
                crate::evidence::KB_EMPTY_SENTINEL.to_string()
            }
        };

        let kb_call_id = "kb-initial".to_string();
        let mut messages: Vec<ChatCompletionRequestMessage> = vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(SYSTEM_PROMPT)
                .build()?
                .into(),
            ChatCompletionRequestUserMessageArgs::default()
                .content(format!(
                    "Evaluate this fact: {}\n(Quoted in the essay as: \"{}\", page {})",
                    st.statement, st.source_quote, st.page_number
                ))
                .build()?
                .into(),
            ChatCompletionRequestAssistantMessageArgs::default()
                .tool_calls(vec![ChatCompletionMessageToolCall {
                    id: kb_call_id.clone(),
                    r#type: ChatCompletionToolType::Function,
                    function: FunctionCall {
                        name: KB_TOOL.to_string(),
                        arguments: serde_json::json!({ "query": st.statement }).to_string(),
                    },
                }])
                .build()?
                .into(),
            ChatCompletionRequestToolMessageArgs::default()
                .tool_call_id(kb_call_id)
                .content(truncate(&kb_evidence))
                .build()?
                .into(),
        ];

        let tools = self.tool_descriptors()?;
        let mut conclusion = String::new();
        for _ in 0..MAX_TURNS {
            match self.llm.chat(messages.clone(), tools.clone()).await? {
                ChatTurn::Answer(text) => {
                    conclusion = text;
                    break;
                }
                ChatTurn::ToolCalls(calls) => {
                    messages.push(
                        ChatCompletionRequestAssistantMessageArgs::default()
                            .tool_calls(
                                calls
                                    .iter()
                                    .map(|c| ChatCompletionMessageToolCall {
                                        id: c.id.clone(),
                                        r#type: ChatCompletionToolType::Function,
                                        function: FunctionCall {
                                            name: c.name.clone(),
                                            arguments: c.arguments.clone(),
                                        },
                                    })
                                    .collect::<Vec<_>>(),
                            )
                            .build()?
                            .into(),
                    );
                    for call in calls {
                        let reply = self.dispatch(st, &call, &mut guard, &mut web_cited).await;
                        messages.push(
                            ChatCompletionRequestToolMessageArgs::default()
                                .tool_call_id(call.id)
                                .content(reply)
                                .build()?
                                .into(),
                        );
                    }
                }
            }
        }
        if conclusion.is_empty() {
            conclusion = "No conclusion was reached within the allowed turns.".to_string();
        }

        self.coerce(st, &conclusion, web_cited).await
    }

    /// Tool dispatch with the hard call-count guard. Rejected calls get a
    /// textual result and never reach the evidence source.
    async fn dispatch(
        &self,
        st: &Statement,
        call: &ToolCall,
        guard: &mut ToolGuard,
        web_cited: &mut bool,
    ) -> String {
        if call.name != KB_TOOL && call.name != WEB_TOOL {
            return format!("Unknown tool: {}", call.name);
        }
        if !guard.admit(&call.name) {
            tracing::warn!(tool = %call.name, statement = %st.statement,
                "protocol violation: tool call beyond limit rejected");
            return format!(
                "Tool call limit reached for {}. Finalize using the evidence already provided.",
                call.name
            );
        }
        // Only the web tool can reach this point: the mandatory lookup in
        // evaluate() pre-charges the knowledge-base budget.
        let Some(web) = self.web else {
            return "Web search is not configured; treat web evidence as unavailable.".to_string();
        };
        let query = serde_json::from_str::<WebSearchArgs>(&call.arguments)
            .map(|a| a.query)
            .unwrap_or_else(|_| st.statement.clone());
        match web.lookup(&query).await {
            Ok(text) if text.trim().is_empty() => "Web search returned no content.".to_string(),
            Ok(text) => {
                *web_cited = true;
                truncate(&text)
            }
            Err(e) => {
                tracing::warn!(source = web.name(), error = %e,
                    "web lookup failed, continuing without web evidence");
                format!("Web search unavailable: {e}")
            }
        }
    }

    /// FINALIZE: re-parse the free-form conclusion through a JSON-constrained
    /// model call, with one schema-repair retry, then validate against the
    /// verdict invariants.
    async fn coerce(&self, st: &Statement, conclusion: &str, web_cited: bool) -> Result<Verdict> {
        let messages = coercion_messages(st, conclusion, None)?;
        let raw = self
            .llm
            .chat_json(messages)
            .await
            .context("verdict coercion call failed")?;
        match verdict::decode(&raw) {
            Ok(rv) => Ok(verdict::normalize(rv, &st.statement, web_cited)),
            Err(first_err) => {
                tracing::warn!(error = %first_err, "verdict decode failed, attempting one repair");
                let messages = coercion_messages(st, conclusion, Some(&first_err.to_string()))?;
                let raw = self
                    .llm
                    .chat_json(messages)
                    .await
                    .context("verdict repair call failed")?;
                let rv = verdict::decode(&raw)
                    .with_context(|| format!("verdict coercion failed after repair: {first_err}"))?;
                Ok(verdict::normalize(rv, &st.statement, web_cited))
            }
        }
    }
}

fn coercion_messages(
    st: &Statement,
    conclusion: &str,
    repair: Option<&str>,
) -> Result<Vec<ChatCompletionRequestMessage>> {
    let mut system = String::from(
        "Convert the fact-check conclusion into a JSON object with exactly these keys:\n\
         statement (string), correctness_score (one of \"correct\", \"wrong\", \"undetermined\"),\n\
         summary_description (string), source_document (string).\n\
         Rules: undetermined verdicts have an empty source_document; knowledge-base citations are\n\
         formatted \"<document>, page <n>\"; web citations are a single URL. Return ONLY the JSON object.",
    );
    if let Some(err) = repair {
        system.push_str(&format!(
            "\nYour previous output was invalid ({err}); emit strictly valid JSON this time."
        ));
    }
    Ok(vec![
        ChatCompletionRequestSystemMessageArgs::default()
            .content(system)
            .build()?
            .into(),
        ChatCompletionRequestUserMessageArgs::default()
            .content(format!(
                "Fact: {}\n\nConclusion:\n{}",
                st.statement, conclusion
            ))
            .build()?
            .into(),
    ])
}

fn truncate(text: &str) -> String {
    if text.chars().count() <= MAX_EVIDENCE_CHARS {
        return text.to_string();
    }
    let cut: String = text.chars().take(MAX_EVIDENCE_CHARS).collect();
    format!("{cut}\n[truncated]")
}

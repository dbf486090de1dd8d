use anyhow::Result;
use async_openai::types::{
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
    ChatCompletionRequestUserMessageArgs,
};
use serde::Deserialize;

use crate::llm::Llm;
use crate::types::{PageDoc, Statement};
use crate::verdict::json_block;

const SYSTEM_PROMPT: &str = "You are an expert fact-checker. \
Extract every distinct factual claim made in the text provided. \
Ignore opinions and transitional phrases. For every fact you must provide the \
exact quote from the text. Return a JSON object: \
{\"facts\": [{\"statement\": \"...\", \"source_quote\": \"...\"}]}";

#[derive(Debug, Deserialize)]
struct RawFact {
    statement: String,
    #[serde(default)]
    source_quote: String,
}

#[derive(Debug, Deserialize)]
struct FactList {
    #[serde(default)]
    facts: Vec<RawFact>,
}

fn extraction_messages(page_text: &str) -> Result<Vec<ChatCompletionRequestMessage>> {
    Ok(vec![
        ChatCompletionRequestSystemMessageArgs::default()
            .content(SYSTEM_PROMPT)
            .build()?
            .into(),
        ChatCompletionRequestUserMessageArgs::default()
            .content(page_text.to_string())
            .build()?
            .into(),
    ])
}

/// Extracts statements page by page. The page number is stamped from the
/// document side, never trusted from the model. A failing page is logged
/// and skipped; the stage itself never aborts.
pub async fn extract_statements(llm: &dyn Llm, pages: &[PageDoc]) -> Vec<Statement> {
    let mut out = Vec::new();
    for page in pages {
        if page.text.trim().is_empty() {
            continue;
        }
        let raw = match extraction_messages(&page.text) {
            Ok(messages) => match llm.chat_json(messages).await {
                Ok(raw) => raw,
                Err(e) => {
                    tracing::warn!(page = page.page, error = %e, "fact extraction failed for page");
                    continue;
                }
            },
            Err(e) => {
                tracing::warn!(page = page.page, error = %e, "building extraction prompt failed");
                continue;
            }
        };
        let list: FactList = match serde_json::from_str(json_block(&raw)) {
            Ok(list) => list,
            Err(e) => {
                tracing::warn!(page = page.page, error = %e, "fact extraction response did not parse");
                continue;
            }
        };
        tracing::info!(page = page.page, facts = list.facts.len(), "extracted facts from page");
        out.extend(list.facts.into_iter().map(|f| Statement {
            statement: f.statement,
            source_quote: f.source_quote,
            page_number: page.page,
        }));
    }
    out
}

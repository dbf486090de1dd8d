use anyhow::{Context, Result};
use async_openai::types::{
    ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
};
use serde_json::Value;

use crate::llm::Llm;

const SYSTEM_PROMPT: &str = "You are the Lead Academic Examiner for an advanced university course. \
Grade the student essay by strictly synthesizing the reports of three expert sub-analyses \
(logic, fact verification, language) against the provided grading rubric.\n\
Grading algorithm:\n\
1. If the logic report marks the essay off-topic, cap the Task Response band at Band 5.\n\
2. Map evidence to rubric criteria: relevance and argument strength to Task Response; flow \
scores and flow issues to Cohesion; grammar-issue count and vocabulary score to Language; \
incorrect fact verdicts and identified fallacies to Evidence/Referencing.\n\
3. For each criterion select the performance level whose descriptor points best match, and \
quote those descriptor points to justify the score.\n\
Use only the supplied JSON data when annotating errors; do not invent new ones. \
Produce a clean, professional Markdown report.";

/// Synthesizes the final markdown report from the persisted stage artifacts.
pub async fn generate_final_report(
    llm: &dyn Llm,
    essay: &str,
    question: &str,
    rubric: &Value,
    logic: &Value,
    facts: &Value,
    language: &Value,
) -> Result<String> {
    tracing::info!("synthesizing final report");
    let user = format!(
        "**ESSAY QUESTION:** {question}\n\n\
         **RUBRIC:** {rubric}\n\n\
         **LOGIC & RELEVANCE REPORT:** {logic}\n\n\
         **FACT CHECK REPORT:** {facts}\n\n\
         **LANGUAGE REPORT:** {language}\n\n\
         **STUDENT ESSAY:** {essay}\n\n\
         ---\n\
         Generate the Academic Assessment Report now.",
        rubric = serde_json::to_string_pretty(rubric)?,
        logic = serde_json::to_string_pretty(logic)?,
        facts = serde_json::to_string_pretty(facts)?,
        language = serde_json::to_string_pretty(language)?,
    );
    let messages = vec![
        ChatCompletionRequestSystemMessageArgs::default()
            .content(SYSTEM_PROMPT)
            .build()?
            .into(),
        ChatCompletionRequestUserMessageArgs::default()
            .content(user)
            .build()?
            .into(),
    ];
    llm.chat_text(messages)
        .await
        .context("report synthesis call failed")
}

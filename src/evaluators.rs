//! Single-shot structured evaluators: rubric digitization, logic/relevance,
//! and language/grammar. Thin collaborators around one JSON-constrained
//! model call each; the agentic fact checker lives in [`crate::agent`].

use anyhow::{Context, Result};
use async_openai::types::{
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
    ChatCompletionRequestUserMessageArgs,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::llm::Llm;
use crate::verdict::json_block;

// --- Rubric digitization ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceLevel {
    /// E.g. "High Distinction", "A", "Band 5".
    pub grade_label: String,
    /// E.g. "80-100", "16-20".
    pub score_range: String,
    pub descriptor_points: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssessmentCriterion {
    #[serde(default)]
    pub category: Option<String>,
    pub name: String,
    pub weight: String,
    pub levels: Vec<PerformanceLevel>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RubricExtraction {
    pub title: String,
    #[serde(default)]
    pub context_notes: Vec<String>,
    pub criteria: Vec<AssessmentCriterion>,
}

// --- Logic & relevance ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogicalFallacy {
    pub fallacy_type: String,
    pub location_snippet: String,
    pub explanation: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelevanceAnalysis {
    pub is_off_topic: bool,
    pub score: i32,
    pub thesis_alignment: String,
    #[serde(default)]
    pub missing_key_points: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EssayStructureAnalysis {
    pub has_clear_intro: bool,
    pub has_clear_conclusion: bool,
    pub flow_score: i32,
    #[serde(default)]
    pub structural_weaknesses: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogicAnalysis {
    pub relevance: RelevanceAnalysis,
    pub structure: EssayStructureAnalysis,
    #[serde(default)]
    pub identified_fallacies: Vec<LogicalFallacy>,
    pub argument_strength_score: i32,
    pub summary_critique: String,
}

// --- Language & grammar ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GrammarError {
    pub original_text: String,
    pub correction: String,
    pub error_type: String,
    pub explanation: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VocabularyAnalysis {
    pub score: i32,
    #[serde(default)]
    pub repetitive_words: Vec<String>,
    #[serde(default)]
    pub advanced_words_used: Vec<String>,
    pub feedback: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentenceStructureAnalysis {
    pub sentence_variety_score: i32,
    #[serde(default)]
    pub flow_issues: Vec<String>,
    pub feedback: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LanguageAnalysis {
    #[serde(default)]
    pub grammar_issues: Vec<GrammarError>,
    pub vocabulary: VocabularyAnalysis,
    pub structure: SentenceStructureAnalysis,
    pub overall_tone: String,
    pub summary_critique: String,
}

fn messages(system: &str, user: String) -> Result<Vec<ChatCompletionRequestMessage>> {
    Ok(vec![
        ChatCompletionRequestSystemMessageArgs::default()
            .content(system)
            .build()?
            .into(),
        ChatCompletionRequestUserMessageArgs::default()
            .content(user)
            .build()?
            .into(),
    ])
}

async fn structured_call<T: DeserializeOwned>(
    llm: &dyn Llm,
    system: &str,
    user: String,
    what: &str,
) -> Result<T> {
    let raw = llm
        .chat_json(messages(system, user)?)
        .await
        .with_context(|| format!("{what} model call failed"))?;
    serde_json::from_str(json_block(&raw)).with_context(|| format!("{what} response did not parse"))
}

const RUBRIC_PROMPT: &str = "You are an expert in academic assessment and pedagogy. \
Digitize the grading rubric you are given. Explode dense descriptor blocks into the \
descriptor_points list, capture row categories when the rubric groups rows, and record \
any global rules (footnotes, penalty headers) in context_notes. \
Return a JSON object with keys: title, context_notes, criteria \
(each criterion: category, name, weight, levels; each level: grade_label, score_range, descriptor_points).";

pub async fn extract_rubric(llm: &dyn Llm, rubric_text: &str) -> Result<RubricExtraction> {
    tracing::info!("digitizing rubric");
    structured_call(llm, RUBRIC_PROMPT, rubric_text.to_string(), "rubric extraction").await
}

const LOGIC_PROMPT: &str = "You are a strict essay editor and logic expert. Ruthlessly \
evaluate the relevance and logic of the student's essay against the provided question. \
Return a JSON object with keys: relevance (is_off_topic, score, thesis_alignment, \
missing_key_points), structure (has_clear_intro, has_clear_conclusion, flow_score, \
structural_weaknesses), identified_fallacies (fallacy_type, location_snippet, explanation), \
argument_strength_score, summary_critique. Scores are 1-10.";

pub async fn check_logic(llm: &dyn Llm, essay: &str, question: &str) -> Result<LogicAnalysis> {
    tracing::info!("analyzing logic and relevance");
    structured_call(
        llm,
        LOGIC_PROMPT,
        format!("Essay Question: {question}\n\nStudent Essay Content:\n{essay}"),
        "logic analysis",
    )
    .await
}

const LANGUAGE_PROMPT: &str = "You are a strict linguistics professor and editor. Analyze \
the student's essay purely on language mechanics, style, and structure; do NOT grade content \
or arguments. Return a JSON object with keys: grammar_issues (original_text, correction, \
error_type, explanation), vocabulary (score, repetitive_words, advanced_words_used, feedback), \
structure (sentence_variety_score, flow_issues, feedback), overall_tone, summary_critique. \
Scores are 1-10.";

pub async fn check_language(llm: &dyn Llm, essay: &str) -> Result<LanguageAnalysis> {
    tracing::info!("analyzing language and grammar");
    structured_call(
        llm,
        LANGUAGE_PROMPT,
        format!("Here is the student's essay:\n\n{essay}"),
        "language analysis",
    )
    .await
}

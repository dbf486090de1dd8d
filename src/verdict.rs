use std::sync::OnceLock;

use anyhow::{anyhow, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use url::Url;

/// Final verdict enum. Never free text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Correctness {
    #[serde(alias = "Correct")]
    Correct,
    #[serde(alias = "Wrong")]
    Wrong,
    #[serde(alias = "Undetermined")]
    Undetermined,
}

/// Structured result of verifying one statement.
///
/// Invariants enforced by [`normalize`]:
/// - `undetermined` verdicts carry an empty `source_document`;
/// - knowledge-base citations match `"<document>, page <n>"`;
/// - web citations are a single valid http(s) URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Verdict {
    pub statement: String,
    pub correctness_score: Correctness,
    pub summary_description: String,
    pub source_document: String,
}

/// What the coercion model actually returned, before validation. Lenient on
/// everything except the score enum.
#[derive(Debug, Deserialize)]
pub struct RawVerdict {
    #[serde(default)]
    pub statement: Option<String>,
    pub correctness_score: Correctness,
    #[serde(default)]
    pub summary_description: Option<String>,
    #[serde(default)]
    pub source_document: String,
}

fn kb_citation_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^.+, page \d+$").unwrap())
}

/// Extracts the JSON object from a model reply, tolerating code fences and
/// commentary around the braces.
pub fn json_block(raw: &str) -> &str {
    let trimmed = raw.trim();
    match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(start), Some(end)) if start < end => &trimmed[start..=end],
        _ => trimmed,
    }
}

pub fn decode(raw: &str) -> Result<RawVerdict> {
    serde_json::from_str(json_block(raw))
        .map_err(|e| anyhow!("verdict did not match the schema: {e}"))
}

fn is_single_url(source: &str) -> bool {
    if source.split_whitespace().count() != 1 {
        return false;
    }
    match Url::parse(source) {
        Ok(u) => matches!(u.scheme(), "http" | "https"),
        Err(_) => false,
    }
}

/// Projects a decoded verdict onto the schema invariants.
///
/// `web_cited` is the agent's own record of whether web evidence was
/// consumed; it decides which citation format the source must satisfy.
/// Violations that cannot be corrected demote the verdict to undetermined
/// with a diagnostic summary.
pub fn normalize(raw: RawVerdict, statement: &str, web_cited: bool) -> Verdict {
    let summary = raw.summary_description.unwrap_or_default();
    let source = raw.source_document.trim().to_string();

    let score = raw.correctness_score;
    let (score, summary, source) = if score == Correctness::Undetermined {
        (Correctness::Undetermined, summary, String::new())
    } else if source.is_empty() {
        (
            Correctness::Undetermined,
            format!("Demoted to undetermined: no citation was provided. {summary}"),
            String::new(),
        )
    } else if web_cited && !is_single_url(&source) {
        (
            Correctness::Undetermined,
            format!("Demoted to undetermined: web citation was not a single valid URL ({source}). {summary}"),
            String::new(),
        )
    } else if !web_cited && !kb_citation_re().is_match(&source) {
        (
            Correctness::Undetermined,
            format!("Demoted to undetermined: knowledge-base citation did not match \"<document>, page <n>\" ({source}). {summary}"),
            String::new(),
        )
    } else {
        (score, summary, source)
    };

    Verdict {
        // The verdict subject is always the original statement, verbatim.
        statement: statement.to_string(),
        correctness_score: score,
        summary_description: summary,
        source_document: source,
    }
}

/// Substitute verdict for a statement whose evaluation failed entirely.
pub fn fallback(statement: &str, diagnostic: &str) -> Verdict {
    Verdict {
        statement: statement.to_string(),
        correctness_score: Correctness::Undetermined,
        summary_description: format!("Error during validation: {diagnostic}"),
        source_document: String::new(),
    }
}

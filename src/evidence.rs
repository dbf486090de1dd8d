use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use nonzero_ext::nonzero;
use reqwest::Client;
use thiserror::Error;
use unicode_segmentation::UnicodeSegmentation;
use url::Url;

use crate::ingest;

#[derive(Debug, Error)]
pub enum EvidenceError {
    #[error("web search request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("web search returned status {0}")]
    Status(reqwest::StatusCode),
    #[error("evidence lookup failed: {0}")]
    Other(String),
}

/// A provider of text passages relevant to a free-text query. The agent
/// invokes sources through this seam without knowing the transport; tests
/// substitute instrumented fakes.
#[async_trait]
pub trait EvidenceSource: Send + Sync {
    fn name(&self) -> &str;
    async fn lookup(&self, query: &str) -> Result<String, EvidenceError>;
}

/// A pre-chunked passage with its citation provenance.
#[derive(Debug, Clone)]
pub struct Passage {
    pub document: String,
    pub page: u32,
    pub text: String,
}

/// Local knowledge base: pre-indexed passages ranked by lexical overlap.
///
/// Lookup never fails the caller; an empty corpus or a query with no
/// relevant passages is a valid non-error outcome.
pub struct KnowledgeBase {
    passages: Vec<Passage>,
    top_k: usize,
}

pub const KB_EMPTY_SENTINEL: &str = "Knowledge base is empty.";
pub const KB_NO_MATCH_SENTINEL: &str = "No relevant passages found in the knowledge base.";

const CHUNK_CHARS: usize = 1000;
const CHUNK_OVERLAP: usize = 200;

fn terms(text: &str) -> HashSet<String> {
    text.unicode_words().map(|w| w.to_lowercase()).collect()
}

/// Splits one page into overlapping character windows, on char boundaries.
fn chunk_page(text: &str) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= CHUNK_CHARS {
        let t = text.trim();
        return if t.is_empty() { vec![] } else { vec![t.to_string()] };
    }
    let step = CHUNK_CHARS - CHUNK_OVERLAP;
    let mut out = Vec::new();
    let mut start = 0;
    while start < chars.len() {
        let end = (start + CHUNK_CHARS).min(chars.len());
        let chunk: String = chars[start..end].iter().collect();
        let chunk = chunk.trim();
        if !chunk.is_empty() {
            out.push(chunk.to_string());
        }
        if end == chars.len() {
            break;
        }
        start += step;
    }
    out
}

impl KnowledgeBase {
    pub fn new(passages: Vec<Passage>, top_k: usize) -> Self {
        Self { passages, top_k }
    }

    pub fn empty() -> Self {
        Self { passages: Vec::new(), top_k: 5 }
    }

    /// Ingests every readable document in `dir` (PDF or plain text),
    /// chunking page texts into overlapping passages.
    pub fn load_dir(dir: &Path, top_k: usize) -> anyhow::Result<Self> {
        let mut passages = Vec::new();
        if dir.is_dir() {
            let mut entries: Vec<_> = std::fs::read_dir(dir)?.filter_map(|e| e.ok()).collect();
            entries.sort_by_key(|e| e.file_name());
            for entry in entries {
                let path = entry.path();
                if !path.is_file() {
                    continue;
                }
                let document = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                let pages = match ingest::load_document(&path) {
                    Ok(pages) => pages,
                    Err(e) => {
                        tracing::warn!(document = %document, error = %e, "skipping unreadable knowledge-base document");
                        continue;
                    }
                };
                for page in pages {
                    for chunk in chunk_page(&page.text) {
                        passages.push(Passage {
                            document: document.clone(),
                            page: page.page,
                            text: chunk,
                        });
                    }
                }
            }
        }
        tracing::info!(passages = passages.len(), "knowledge base loaded");
        Ok(Self::new(passages, top_k))
    }

    pub fn is_empty(&self) -> bool {
        self.passages.is_empty()
    }

    fn ranked(&self, query: &str) -> Vec<&Passage> {
        let query_terms = terms(query);
        let mut scored: Vec<(usize, &Passage)> = self
            .passages
            .iter()
            .map(|p| {
                let overlap = terms(&p.text).intersection(&query_terms).count();
                (overlap, p)
            })
            .filter(|(score, _)| *score > 0)
            .collect();
        scored.sort_by(|a, b| b.0.cmp(&a.0));
        scored.into_iter().take(self.top_k).map(|(_, p)| p).collect()
    }
}

#[async_trait]
impl EvidenceSource for KnowledgeBase {
    fn name(&self) -> &str {
        "search_knowledge_base"
    }

    async fn lookup(&self, query: &str) -> Result<String, EvidenceError> {
        if self.passages.is_empty() {
            return Ok(KB_EMPTY_SENTINEL.to_string());
        }
        let hits = self.ranked(query);
        if hits.is_empty() {
            return Ok(KB_NO_MATCH_SENTINEL.to_string());
        }
        let joined = hits
            .iter()
            .map(|p| format!("[{}, page {}]\n{}", p.document, p.page, p.text))
            .collect::<Vec<_>>()
            .join("\n\n");
        Ok(joined)
    }
}

/// Live web evidence via the Jina reader endpoint. Returns markdown-ish
/// text; network, auth, and status failures surface as typed errors so the
/// agent can distinguish "unavailable" from "empty".
pub struct JinaSearch {
    http: Client,
    key: String,
    limiter: DefaultDirectRateLimiter,
    base_url: String,
}

impl JinaSearch {
    pub fn new(key: String, qps: u32, timeout: Duration) -> anyhow::Result<Self> {
        let http = Client::builder().timeout(timeout).build()?;
        let qps = std::num::NonZeroU32::new(qps).unwrap_or(nonzero!(1u32));
        let limiter = RateLimiter::direct(Quota::per_second(qps));
        Ok(Self {
            http,
            key,
            limiter,
            base_url: "https://s.jina.ai".to_string(),
        })
    }

    fn request_url(&self, query: &str) -> Result<Url, EvidenceError> {
        Url::parse(&format!("{}/{}", self.base_url, query))
            .map_err(|e| EvidenceError::Other(format!("invalid search query: {e}")))
    }
}

#[async_trait]
impl EvidenceSource for JinaSearch {
    fn name(&self) -> &str {
        "web_search"
    }

    async fn lookup(&self, query: &str) -> Result<String, EvidenceError> {
        self.limiter.until_ready().await;
        let url = self.request_url(query)?;
        let resp = self.http.get(url).bearer_auth(&self.key).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(EvidenceError::Status(status));
        }
        Ok(resp.text().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kb_with(passages: Vec<(&str, u32, &str)>) -> KnowledgeBase {
        KnowledgeBase::new(
            passages
                .into_iter()
                .map(|(d, p, t)| Passage {
                    document: d.into(),
                    page: p,
                    text: t.into(),
                })
                .collect(),
            5,
        )
    }

    #[tokio::test]
    async fn empty_kb_returns_sentinel_not_error() {
        let kb = KnowledgeBase::empty();
        let out = kb.lookup("anything").await.unwrap();
        assert_eq!(out, KB_EMPTY_SENTINEL);
    }

    #[tokio::test]
    async fn kb_ranks_relevant_passage_first_with_citation() {
        let kb = kb_with(vec![
            ("cooking.pdf", 4, "Olive oil has a low smoke point."),
            (
                "physics.pdf",
                3,
                "At sea level, water boils at 100 degrees Celsius.",
            ),
        ]);
        let out = kb.lookup("water boils at 100 degrees at sea level").await.unwrap();
        assert!(out.starts_with("[physics.pdf, page 3]"));
        assert!(out.contains("water boils"));
    }

    #[tokio::test]
    async fn kb_with_no_overlap_reports_no_match() {
        let kb = kb_with(vec![("cooking.pdf", 1, "Olive oil basics.")]);
        let out = kb.lookup("quantum chromodynamics").await.unwrap();
        assert_eq!(out, KB_NO_MATCH_SENTINEL);
    }

    #[test]
    fn chunking_overlaps_long_pages() {
        let page = "word ".repeat(600); // 3000 chars
        let chunks = chunk_page(&page);
        assert!(chunks.len() >= 3);
        assert!(chunks.iter().all(|c| c.chars().count() <= CHUNK_CHARS));
    }

    #[test]
    fn jina_url_encodes_query() {
        let jina = JinaSearch::new("k".into(), 1, Duration::from_secs(1)).unwrap();
        let url = jina.request_url("water boils at sea level").unwrap();
        assert_eq!(
            url.as_str(),
            "https://s.jina.ai/water%20boils%20at%20sea%20level"
        );
    }
}

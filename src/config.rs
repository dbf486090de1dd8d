use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

/// Process-wide configuration resolved once at startup. A missing model
/// credential is fatal here, before any batch work begins.
#[derive(Debug, Clone)]
pub struct Config {
    pub api_key: String,
    pub base_url: String,
    /// Web-evidence credential; absent means the agent runs without the
    /// web_search tool backing (degrades to "no web evidence").
    pub jina_api_key: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        let api_key = match std::env::var("OPENAI_API_KEY") {
            Ok(k) if !k.trim().is_empty() => k,
            _ => bail!("OPENAI_API_KEY is not set; refusing to start"),
        };
        let base_url = std::env::var("SILICON_FLOW_BASE_URL")
            .unwrap_or_else(|_| "https://api.siliconflow.cn/v1".to_string());
        let jina_api_key = std::env::var("JINA_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty());
        if jina_api_key.is_none() {
            tracing::warn!("JINA_API_KEY not set; web search evidence disabled");
        }
        Ok(Self {
            api_key,
            base_url,
            jina_api_key,
        })
    }
}

/// Data-directory layout shared by all pipeline stages.
#[derive(Debug, Clone)]
pub struct DataPaths {
    base: PathBuf,
}

impl DataPaths {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in [self.processed_dir(), self.report_dir()] {
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("creating {}", dir.display()))?;
        }
        Ok(())
    }

    pub fn raw_dir(&self) -> PathBuf {
        self.base.join("raw")
    }

    pub fn kb_dir(&self) -> PathBuf {
        self.base.join("knowledge_base")
    }

    fn processed_dir(&self) -> PathBuf {
        self.base.join("processed")
    }

    fn report_dir(&self) -> PathBuf {
        self.base.join("final_report")
    }

    pub fn essay_pdf(&self) -> PathBuf {
        self.raw_dir().join("essay_content.pdf")
    }

    pub fn question_pdf(&self) -> PathBuf {
        self.raw_dir().join("essay_question.pdf")
    }

    pub fn rubric_pdf(&self) -> PathBuf {
        self.raw_dir().join("essay_rubric.pdf")
    }

    pub fn facts_jsonl(&self) -> PathBuf {
        self.processed_dir().join("extracted_facts.jsonl")
    }

    pub fn rubrics_json(&self) -> PathBuf {
        self.processed_dir().join("extracted_rubrics.json")
    }

    pub fn fact_check_output(&self) -> PathBuf {
        self.processed_dir().join("fact_checking_output.json")
    }

    pub fn logic_output(&self) -> PathBuf {
        self.processed_dir().join("logic_analysis_output.json")
    }

    pub fn language_output(&self) -> PathBuf {
        self.processed_dir().join("language_analysis_output.json")
    }

    pub fn final_report(&self) -> PathBuf {
        self.report_dir().join("final_report.md")
    }

    /// Prefers a plain-text sibling when the expected PDF is absent, so the
    /// pipeline can run on pre-extracted text.
    pub fn existing_input(&self, pdf: &Path) -> PathBuf {
        if pdf.exists() {
            return pdf.to_path_buf();
        }
        let txt = pdf.with_extension("txt");
        if txt.exists() {
            txt
        } else {
            pdf.to_path_buf()
        }
    }
}

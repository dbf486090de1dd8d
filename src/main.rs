use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use essaycheck_rs::agent::FactChecker;
use essaycheck_rs::config::{Config, DataPaths};
use essaycheck_rs::evaluators;
use essaycheck_rs::evidence::{EvidenceSource, JinaSearch, KnowledgeBase};
use essaycheck_rs::extract::extract_statements;
use essaycheck_rs::ingest;
use essaycheck_rs::llm::openai::LlmClient;
use essaycheck_rs::report::generate_final_report;
use essaycheck_rs::scheduler::{self, check_statements};
use essaycheck_rs::types::{read_statements_jsonl, write_statements_jsonl};
use essaycheck_rs::verdict::Verdict;

#[derive(Parser)]
#[command(name = "essaycheck", version, about = "Agentic essay grading pipeline")]
struct Cli {
    #[command(subcommand)]
    cmd: Cmd,
    /// Where the raw/, knowledge_base/, processed/ and final_report/ trees live
    #[arg(long, default_value = "./data")]
    data_dir: PathBuf,
    #[arg(long, env = "ESSAYCHECK_MODEL", default_value = "deepseek-ai/DeepSeek-V3")]
    model: String,
    /// Concurrency cap for the fact-check batch
    #[arg(long, default_value_t = scheduler::DEFAULT_CONCURRENCY)]
    concurrency: usize,
    /// Per-call timeout for model and web requests, in seconds
    #[arg(long, default_value_t = 30)]
    timeout_secs: u64,
    /// Max attempts for rate-limited model calls
    #[arg(long, default_value_t = 10)]
    max_retries: u32,
    #[arg(long, default_value_t = 0.0)]
    temperature: f32,
    /// Web-search requests per second
    #[arg(long, default_value_t = 2)]
    search_qps: u32,
    /// Passages returned per knowledge-base lookup
    #[arg(long, default_value_t = 5)]
    kb_top_k: usize,
}

#[derive(Subcommand)]
enum Cmd {
    /// End-to-end: rubric -> logic -> language -> extract -> fact check -> report
    Run,
    /// Extract facts from the essay into extracted_facts.jsonl
    Extract,
    /// Fact-check a statement batch (defaults to extracted_facts.jsonl)
    Check {
        #[arg(long)]
        input_file: Option<PathBuf>,
    },
    /// Synthesize the final report from persisted stage artifacts
    Report,
}

impl Cli {
    fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    fn llm(&self, cfg: &Config, temperature: f32) -> Result<LlmClient> {
        LlmClient::new(
            self.model.clone(),
            Some(cfg.base_url.clone()),
            Some(cfg.api_key.clone()),
            temperature,
            self.timeout(),
            self.max_retries,
        )
    }

    fn web(&self, cfg: &Config) -> Result<Option<JinaSearch>> {
        match &cfg.jina_api_key {
            Some(key) => Ok(Some(JinaSearch::new(
                key.clone(),
                self.search_qps,
                self.timeout(),
            )?)),
            None => Ok(None),
        }
    }
}

fn write_json<T: serde::Serialize>(path: &std::path::Path, value: &T) -> Result<()> {
    std::fs::write(path, serde_json::to_string_pretty(value)?)
        .with_context(|| format!("writing {}", path.display()))?;
    tracing::info!(path = %path.display(), "artifact written");
    Ok(())
}

fn read_json(path: &std::path::Path) -> Result<serde_json::Value> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading {} (run the earlier stage first)", path.display()))?;
    Ok(serde_json::from_str(&text)?)
}

async fn check_stage(
    cli: &Cli,
    cfg: &Config,
    paths: &DataPaths,
    input_file: Option<&std::path::Path>,
) -> Result<Vec<Verdict>> {
    let input = input_file
        .map(PathBuf::from)
        .unwrap_or_else(|| paths.facts_jsonl());
    let statements = read_statements_jsonl(&input)?;
    tracing::info!(count = statements.len(), input = %input.display(), "starting fact check");

    let llm = cli.llm(cfg, cli.temperature)?;
    let kb = KnowledgeBase::load_dir(&paths.kb_dir(), cli.kb_top_k)?;
    let web = cli.web(cfg)?;
    let checker = FactChecker::new(
        &llm,
        &kb,
        web.as_ref().map(|w| w as &dyn EvidenceSource),
    );
    let verdicts = check_statements(&checker, &statements, cli.concurrency).await;
    write_json(&paths.fact_check_output(), &verdicts)?;
    Ok(verdicts)
}

async fn report_stage(cli: &Cli, cfg: &Config, paths: &DataPaths) -> Result<()> {
    let essay = ingest::load_document_text(&paths.existing_input(&paths.essay_pdf()))?;
    let question = ingest::load_document_text(&paths.existing_input(&paths.question_pdf()))?;
    let rubric = read_json(&paths.rubrics_json())?;
    let logic = read_json(&paths.logic_output())?;
    let facts = read_json(&paths.fact_check_output())?;
    let language = read_json(&paths.language_output())?;

    // The examiner synthesis runs slightly warmer than the analysis passes.
    let judge = cli.llm(cfg, 0.2)?;
    let report =
        generate_final_report(&judge, &essay, &question, &rubric, &logic, &facts, &language)
            .await?;
    std::fs::write(paths.final_report(), report)
        .with_context(|| format!("writing {}", paths.final_report().display()))?;
    tracing::info!(path = %paths.final_report().display(), "final report written");
    Ok(())
}

async fn run_pipeline(cli: &Cli, cfg: &Config, paths: &DataPaths) -> Result<()> {
    let essay_path = paths.existing_input(&paths.essay_pdf());
    let essay_pages = ingest::load_document(&essay_path)?;
    let essay = ingest::load_document_text(&essay_path)?;
    let question = ingest::load_document_text(&paths.existing_input(&paths.question_pdf()))?;
    let rubric_text = ingest::load_document_text(&paths.existing_input(&paths.rubric_pdf()))?;

    let llm = cli.llm(cfg, cli.temperature)?;

    let rubric = evaluators::extract_rubric(&llm, &rubric_text).await?;
    write_json(&paths.rubrics_json(), &rubric)?;

    let logic = evaluators::check_logic(&llm, &essay, &question).await?;
    write_json(&paths.logic_output(), &logic)?;

    let language = evaluators::check_language(&llm, &essay).await?;
    write_json(&paths.language_output(), &language)?;

    let statements = extract_statements(&llm, &essay_pages).await;
    write_statements_jsonl(&paths.facts_jsonl(), &statements)?;
    tracing::info!(count = statements.len(), "facts extracted");

    check_stage(cli, cfg, paths, None).await?;
    report_stage(cli, cfg, paths).await
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let cfg = Config::from_env()?;
    let paths = DataPaths::new(&cli.data_dir);
    paths.ensure_dirs()?;

    match &cli.cmd {
        Cmd::Run => run_pipeline(&cli, &cfg, &paths).await,
        Cmd::Extract => {
            let llm = cli.llm(&cfg, cli.temperature)?;
            let pages = ingest::load_document(&paths.existing_input(&paths.essay_pdf()))?;
            let statements = extract_statements(&llm, &pages).await;
            write_statements_jsonl(&paths.facts_jsonl(), &statements)?;
            tracing::info!(count = statements.len(), path = %paths.facts_jsonl().display(),
                "facts extracted");
            Ok(())
        }
        Cmd::Check { input_file } => {
            check_stage(&cli, &cfg, &paths, input_file.as_deref()).await?;
            Ok(())
        }
        Cmd::Report => report_stage(&cli, &cfg, &paths).await,
    }
}

//! End-to-end fact-check stage: persisted JSONL in, persisted verdict
//! array out, with fakes standing in for the model and evidence sources.

use crate::agent::{FactChecker, KB_TOOL, WEB_TOOL};
use crate::llm::{ChatTurn, ToolCall};
use crate::scheduler::check_statements;
use crate::tests::support::{CountingEvidence, FakeLlm};
use crate::types::{read_statements_jsonl, write_statements_jsonl, Statement};
use crate::verdict::{Correctness, Verdict};

fn pipeline_llm() -> FakeLlm {
    FakeLlm::new(
        |messages, _tools| {
            let subject = FakeLlm::user_text(messages);
            // One statement escalates to the web; detect whether that
            // exchange already happened by counting transcript entries.
            if subject.contains("escalate") && messages.len() <= 4 {
                return (
                    0,
                    Ok(ChatTurn::ToolCalls(vec![ToolCall {
                        id: "w1".into(),
                        name: WEB_TOOL.into(),
                        arguments: r#"{"query": "escalated claim"}"#.into(),
                    }])),
                );
            }
            (0, Ok(ChatTurn::Answer("decided".into())))
        },
        |messages| {
            let subject = FakeLlm::user_text(messages);
            let (score, source) = if subject.contains("escalate") {
                ("wrong", "https://example.com/refutation")
            } else if subject.contains("supported") {
                ("correct", "kb.pdf, page 2")
            } else {
                ("undetermined", "")
            };
            (
                0,
                Ok(serde_json::json!({
                    "statement": subject,
                    "correctness_score": score,
                    "summary_description": "pipeline test",
                    "source_document": source,
                })
                .to_string()),
            )
        },
    )
}

#[tokio::test]
async fn fact_check_stage_roundtrips_through_files() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("extracted_facts.jsonl");
    let output = dir.path().join("fact_checking_output.json");

    let statements = vec![
        Statement {
            statement: "supported claim one".into(),
            source_quote: "quote one".into(),
            page_number: 1,
        },
        Statement {
            statement: "escalate this claim".into(),
            source_quote: "quote two".into(),
            page_number: 2,
        },
        Statement {
            statement: "murky claim".into(),
            source_quote: "quote three".into(),
            page_number: 3,
        },
    ];
    write_statements_jsonl(&input, &statements).unwrap();

    let loaded = read_statements_jsonl(&input).unwrap();
    assert_eq!(loaded.len(), 3);

    let kb = CountingEvidence::named(KB_TOOL, "[kb.pdf, page 2]\nA relevant passage.");
    let web = CountingEvidence::named(WEB_TOOL, "Refuting page content.");
    let llm = pipeline_llm();
    let checker = FactChecker::new(&llm, &kb, Some(&web));
    let verdicts = check_statements(&checker, &loaded, 3).await;

    std::fs::write(&output, serde_json::to_string_pretty(&verdicts).unwrap()).unwrap();
    let persisted: Vec<Verdict> =
        serde_json::from_str(&std::fs::read_to_string(&output).unwrap()).unwrap();

    assert_eq!(persisted.len(), 3);
    assert_eq!(persisted[0].correctness_score, Correctness::Correct);
    assert_eq!(persisted[0].source_document, "kb.pdf, page 2");
    assert_eq!(persisted[1].correctness_score, Correctness::Wrong);
    assert_eq!(persisted[1].source_document, "https://example.com/refutation");
    assert_eq!(persisted[2].correctness_score, Correctness::Undetermined);
    assert_eq!(persisted[2].source_document, "");
    // Every statement hits the knowledge base exactly once; only the
    // escalated one reaches the web.
    assert_eq!(kb.calls(), 3);
    assert_eq!(web.calls(), 1);
}

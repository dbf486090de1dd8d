use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// One atomic factual claim extracted from the essay.
///
/// Immutable once handed to the fact checker; identified by its position in
/// the batch. Persisted one record per line between pipeline stages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Statement {
    pub statement: String,
    /// Exact sentence or phrase from the essay where the claim appears.
    pub source_quote: String,
    pub page_number: u32,
}

/// A single page of a loaded document.
#[derive(Debug, Clone)]
pub struct PageDoc {
    pub page: u32,
    pub text: String,
}

pub fn read_statements_jsonl(path: &Path) -> Result<Vec<Statement>> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mut out = Vec::new();
    for (lineno, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let st: Statement = serde_json::from_str(&line)
            .with_context(|| format!("{}:{}: invalid statement record", path.display(), lineno + 1))?;
        out.push(st);
    }
    Ok(out)
}

pub fn write_statements_jsonl(path: &Path, statements: &[Statement]) -> Result<()> {
    let mut file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    for st in statements {
        serde_json::to_writer(&mut file, st)?;
        file.write_all(b"\n")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statements_roundtrip_jsonl() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("facts.jsonl");
        let statements = vec![
            Statement {
                statement: "Water boils at 100C at sea level.".into(),
                source_quote: "water boils at 100 degrees".into(),
                page_number: 2,
            },
            Statement {
                statement: "The Nile is the longest river.".into(),
                source_quote: "the Nile, the longest river".into(),
                page_number: 3,
            },
        ];
        write_statements_jsonl(&path, &statements).unwrap();
        let back = read_statements_jsonl(&path).unwrap();
        assert_eq!(back.len(), 2);
        assert_eq!(back[0].statement, statements[0].statement);
        assert_eq!(back[1].page_number, 3);
    }

    #[test]
    fn blank_lines_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("facts.jsonl");
        std::fs::write(
            &path,
            "{\"statement\":\"a\",\"source_quote\":\"b\",\"page_number\":1}\n\n",
        )
        .unwrap();
        let back = read_statements_jsonl(&path).unwrap();
        assert_eq!(back.len(), 1);
    }
}

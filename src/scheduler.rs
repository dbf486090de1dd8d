use futures::{stream, StreamExt};

use crate::agent::FactChecker;
use crate::types::Statement;
use crate::verdict::{self, Verdict};

pub const DEFAULT_CONCURRENCY: usize = 3;

/// Fans the fact checker over a batch with at most `concurrency` statements
/// in flight. Always returns exactly one verdict per input statement, in
/// input order; a per-item failure is substituted with a fallback verdict
/// and never affects its siblings.
pub async fn check_statements(
    checker: &FactChecker<'_>,
    statements: &[Statement],
    concurrency: usize,
) -> Vec<Verdict> {
    let total = statements.len();
    let tasks = statements.iter().enumerate().map(|(idx, st)| async move {
        let v = match checker.evaluate(st).await {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(index = idx, error = %e,
                    "statement evaluation failed, substituting fallback verdict");
                verdict::fallback(&st.statement, &format!("{e:#}"))
            }
        };
        tracing::info!(index = idx, total, score = ?v.correctness_score, "statement checked");
        (idx, v)
    });

    let mut tagged = stream::iter(tasks)
        .buffer_unordered(concurrency.max(1))
        .collect::<Vec<_>>()
        .await;
    tagged.sort_by_key(|(idx, _)| *idx);
    tagged.into_iter().map(|(_, v)| v).collect()
}

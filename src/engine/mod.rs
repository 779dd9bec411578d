//! Core engine — bet placement, round settlement, and round lifecycle.

pub mod lifecycle;
pub mod placement;
pub mod scheduler;
pub mod settlement;

use std::future::Future;
use tracing::warn;

use crate::types::LedgerError;

/// Run a ledger operation, retrying exactly once on a transient write
/// conflict (SQLite busy/locked). A second conflict surfaces as
/// `LedgerError::Conflict`.
pub(crate) async fn with_conflict_retry<T, F, Fut>(what: &'static str, mut op: F) -> Result<T, LedgerError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, LedgerError>>,
{
    match op().await {
        Err(e) if e.is_transient_conflict() => {
            warn!(operation = what, error = %e, "Write conflict, retrying once");
            op().await.map_err(|e| {
                if e.is_transient_conflict() {
                    LedgerError::Conflict(what.to_string())
                } else {
                    e
                }
            })
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_retry_passes_through_success() {
        let result = with_conflict_retry("noop", || async { Ok::<_, LedgerError>(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_retry_passes_through_domain_errors() {
        let result: Result<(), _> =
            with_conflict_retry("noop", || async { Err(LedgerError::NoOpenRound) }).await;
        assert!(matches!(result.unwrap_err(), LedgerError::NoOpenRound));
    }
}

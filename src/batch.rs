//! Concurrent fan-out over independent targets
//!
//! Every multi-target command (add, activate, deactivate, remove, clean)
//! runs its items through [`run_batch`]. Each item gets its own blocking
//! worker; a failing item never cancels or delays the others, and the caller
//! receives one [`BatchOutcome`] per target once all of them have finished.
//!
//! Partial failure is the normal case: five activations where one target is
//! missing still activate the other four and report exactly one failure.

use crate::error::{BextError, BextResult};
use futures_util::future::join_all;
use std::sync::Arc;
use tracing::{info, warn};

/// Result of running the work function for a single target
#[derive(Debug)]
pub struct BatchOutcome<T> {
    /// Target as given by the caller
    pub target: String,
    /// What the worker returned
    pub result: BextResult<T>,
}

/// All outcomes of a batch, in the order targets were submitted
#[derive(Debug)]
pub struct BatchReport<T> {
    operation: &'static str,
    outcomes: Vec<BatchOutcome<T>>,
}

impl<T> BatchReport<T> {
    /// Build a report from already collected outcomes
    pub fn new(operation: &'static str, outcomes: Vec<BatchOutcome<T>>) -> Self {
        Self {
            operation,
            outcomes,
        }
    }

    /// Name of the operation this batch performed
    pub fn operation(&self) -> &'static str {
        self.operation
    }

    /// Every outcome, successful or not
    pub fn outcomes(&self) -> &[BatchOutcome<T>] {
        &self.outcomes
    }

    /// Number of targets in the batch
    pub fn total(&self) -> usize {
        self.outcomes.len()
    }

    /// Targets that completed, with their values
    pub fn successes(&self) -> impl Iterator<Item = (&str, &T)> {
        self.outcomes.iter().filter_map(|o| match &o.result {
            Ok(value) => Some((o.target.as_str(), value)),
            Err(_) => None,
        })
    }

    /// Targets that failed, with their errors
    pub fn failures(&self) -> impl Iterator<Item = (&str, &BextError)> {
        self.outcomes.iter().filter_map(|o| match &o.result {
            Ok(_) => None,
            Err(e) => Some((o.target.as_str(), e)),
        })
    }

    /// Number of failed targets
    pub fn failed(&self) -> usize {
        self.failures().count()
    }

    /// Whether every target succeeded
    pub fn is_success(&self) -> bool {
        self.failed() == 0
    }

    /// Log one warning per failed target, or a success line if none failed
    pub fn log(&self) {
        for (target, err) in self.failures() {
            warn!(
                operation = self.operation,
                item = target,
                error = %err,
                "Error encountered during {}: {}",
                self.operation,
                err
            );
        }

        if self.is_success() {
            let targets: Vec<&str> = self.outcomes.iter().map(|o| o.target.as_str()).collect();
            info!(
                operation = self.operation,
                targets = %targets.join(" "),
                "Successfully completed {}",
                self.operation
            );
        }
    }

    /// Collapse the report into a command result
    ///
    /// Without `strict`, failures are only reported through [`log`](Self::log)
    /// and the command still succeeds. With `strict`, any failure becomes
    /// [`BextError::BatchFailed`].
    pub fn into_result(self, strict: bool) -> BextResult<()> {
        let failed = self.failed();
        if strict && failed > 0 {
            return Err(BextError::BatchFailed {
                operation: self.operation.to_string(),
                failed,
                total: self.outcomes.len(),
            });
        }
        Ok(())
    }
}

/// Run `work` once per target, each on its own blocking worker
///
/// All workers are started before any is awaited. Completion order is
/// unspecified; the returned outcomes follow the submission order.
pub async fn run_batch<T, F>(
    operation: &'static str,
    targets: Vec<String>,
    work: F,
) -> BatchReport<T>
where
    T: Send + 'static,
    F: Fn(&str) -> BextResult<T> + Send + Sync + 'static,
{
    let work = Arc::new(work);

    let handles: Vec<_> = targets
        .into_iter()
        .map(|target| {
            let work = Arc::clone(&work);
            let item = target.clone();
            let handle = tokio::task::spawn_blocking(move || work(&item));
            (target, handle)
        })
        .collect();

    let (targets, handles): (Vec<_>, Vec<_>) = handles.into_iter().unzip();
    let joined = join_all(handles).await;

    let outcomes = targets
        .into_iter()
        .zip(joined)
        .map(|(target, joined)| {
            let result = joined.unwrap_or_else(|e| {
                Err(BextError::Internal(format!(
                    "{} worker for {} did not complete: {}",
                    operation, target, e
                )))
            });
            BatchOutcome { target, result }
        })
        .collect();

    BatchReport::new(operation, outcomes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;

    fn targets(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn partial_failure_runs_every_item() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);

        let report = run_batch("activate", targets(&["a", "b", "missing", "c", "d"]), move |t| {
            counter.fetch_add(1, Ordering::SeqCst);
            if t == "missing" {
                Err(BextError::LayerNotFound(t.to_string()))
            } else {
                Ok(t.len())
            }
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 5);
        assert_eq!(report.total(), 5);
        assert_eq!(report.failed(), 1);
        assert_eq!(report.successes().count(), 4);

        let (target, err) = report.failures().next().unwrap();
        assert_eq!(target, "missing");
        assert!(matches!(err, BextError::LayerNotFound(_)));
    }

    #[tokio::test]
    async fn outcomes_follow_submission_order() {
        let report = run_batch("add", targets(&["slow", "fast"]), |t| {
            if t == "slow" {
                std::thread::sleep(std::time::Duration::from_millis(50));
            }
            Ok(t.to_string())
        })
        .await;

        let order: Vec<&str> = report.outcomes().iter().map(|o| o.target.as_str()).collect();
        assert_eq!(order, vec!["slow", "fast"]);
    }

    #[tokio::test]
    async fn items_run_concurrently() {
        // Every worker blocks until all three are running at once.
        let barrier = Arc::new(Barrier::new(3));
        let gate = Arc::clone(&barrier);

        let report = run_batch("clean", targets(&["x", "y", "z"]), move |_| {
            gate.wait();
            Ok(())
        })
        .await;

        assert!(report.is_success());
    }

    #[tokio::test]
    async fn panicking_item_is_captured() {
        let report = run_batch("remove", targets(&["ok", "boom"]), |t| {
            if t == "boom" {
                panic!("worker exploded");
            }
            Ok(())
        })
        .await;

        assert_eq!(report.failed(), 1);
        assert!(matches!(
            report.failures().next(),
            Some(("boom", BextError::Internal(_)))
        ));
    }

    #[tokio::test]
    async fn empty_batch_succeeds() {
        let report: BatchReport<()> = run_batch("deactivate", Vec::new(), |_| Ok(())).await;
        assert_eq!(report.total(), 0);
        assert!(report.is_success());
        assert!(report.into_result(true).is_ok());
    }

    #[tokio::test]
    async fn failures_only_fail_in_strict_mode() {
        let all_failed = || async {
            run_batch("deactivate", targets(&["a", "b"]), |t| -> BextResult<()> {
                Err(BextError::ActivationNotFound(t.to_string()))
            })
            .await
        };

        assert!(all_failed().await.into_result(false).is_ok());

        let err = all_failed().await.into_result(true).unwrap_err();
        assert!(matches!(
            err,
            BextError::BatchFailed { failed: 2, total: 2, .. }
        ));
    }
}

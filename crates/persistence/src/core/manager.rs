//! Coordinators that drive several transactions as one unit.
//!
//! Both managers follow the same sequence: begin every transaction, run
//! every transaction in order, then commit every transaction in order. Any
//! failure rolls back everything that is still open and returns the
//! original error.
//!
//! # Partial commits
//!
//! Commits are not two-phase. If commit *n* fails after commits `1..n`
//! already succeeded, those earlier commits stay durable. The failure is
//! reported as [`TransactionError::PartialChainFailure`] so callers can tell
//! this case apart from a clean rollback.

use std::fmt;

use crate::error::{StorageResult, TransactionError};

use super::transaction::Transaction;

/// Runs transactions in order and commits them only when all runs succeed.
pub struct ChainedTransactionManager<'a> {
    transactions: Vec<Box<dyn Transaction + 'a>>,
}

impl<'a> ChainedTransactionManager<'a> {
    /// Creates a manager over the given transactions.
    pub fn new(transactions: Vec<Box<dyn Transaction + 'a>>) -> Self {
        Self { transactions }
    }

    /// Begins, runs and commits every transaction.
    pub fn execute(mut self) -> StorageResult<()> {
        execute_chain(&mut self.transactions, || Ok(()))
    }
}

impl fmt::Debug for ChainedTransactionManager<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChainedTransactionManager")
            .field("transactions", &self.transactions.len())
            .finish()
    }
}

/// Like [`ChainedTransactionManager`], with a check between run and commit.
///
/// The check sees every write made during the run phase before anything is
/// durable. An error from the check rolls everything back.
pub struct ExecuteTryTransactionManager<'a, F> {
    transactions: Vec<Box<dyn Transaction + 'a>>,
    check: F,
}

impl<'a, F> ExecuteTryTransactionManager<'a, F>
where
    F: FnOnce() -> StorageResult<()>,
{
    /// Creates a manager that calls `check` before committing.
    pub fn new(transactions: Vec<Box<dyn Transaction + 'a>>, check: F) -> Self {
        Self {
            transactions,
            check,
        }
    }

    /// Begins and runs every transaction, calls the check, then commits.
    pub fn execute(mut self) -> StorageResult<()> {
        execute_chain(&mut self.transactions, self.check)
    }
}

impl<F> fmt::Debug for ExecuteTryTransactionManager<'_, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecuteTryTransactionManager")
            .field("transactions", &self.transactions.len())
            .finish_non_exhaustive()
    }
}

fn execute_chain<F>(transactions: &mut [Box<dyn Transaction + '_>], check: F) -> StorageResult<()>
where
    F: FnOnce() -> StorageResult<()>,
{
    let total = transactions.len();

    let begun = transactions.iter_mut().try_for_each(|tx| tx.begin());
    if let Err(e) = begun {
        rollback_all(transactions);
        return Err(e);
    }

    let ran = transactions
        .iter_mut()
        .enumerate()
        .try_for_each(|(index, tx)| tx.run().map_err(|e| (index, e)));
    if let Err((index, e)) = ran {
        tracing::debug!(transaction = index + 1, total, "run failed, rolling back chain");
        rollback_all(transactions);
        return Err(e);
    }

    if let Err(e) = check() {
        tracing::debug!("pre-commit check failed, rolling back chain");
        rollback_all(transactions);
        return Err(e);
    }

    for index in 0..total {
        if let Err(e) = transactions[index].commit() {
            rollback_all(transactions);
            if index == 0 {
                return Err(e);
            }
            tracing::warn!(
                committed = index,
                total,
                "commit failed after earlier commits of the chain succeeded: {}",
                e
            );
            return Err(TransactionError::PartialChainFailure {
                committed: index,
                failed_at: index + 1,
                total,
                source: Box::new(e),
            }
            .into());
        }
    }

    Ok(())
}

/// Best-effort rollback of every transaction; failures are logged.
fn rollback_all(transactions: &mut [Box<dyn Transaction + '_>]) {
    for (index, tx) in transactions.iter_mut().enumerate() {
        if let Err(e) = tx.rollback() {
            tracing::warn!(transaction = index + 1, "rollback failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::core::runnable::{ConnectedTask, Runnable};
    use crate::core::testing::{Journal, RecordingConnection, journal};
    use crate::core::transaction::ConnectionTransaction;
    use crate::error::{BackendError, StorageError};

    fn failing() -> StorageError {
        StorageError::Backend(BackendError::QueryError {
            message: "boom".to_string(),
        })
    }

    fn tx_on<'a>(conn: &Arc<RecordingConnection>, fail: bool) -> Box<dyn Transaction + 'a> {
        let conn_for_body = conn.clone();
        let units: Vec<Box<dyn Runnable + 'a>> = vec![Box::new(ConnectedTask::new(
            conn.clone(),
            move || {
                use crate::core::connection::Connection;
                conn_for_body.execute("INSERT", &[])?;
                if fail { Err(failing()) } else { Ok(()) }
            },
        ))];
        Box::new(ConnectionTransaction::new(units).unwrap())
    }

    fn three(journal: &Journal) -> Vec<Arc<RecordingConnection>> {
        ["t1", "t2", "t3"]
            .iter()
            .map(|name| RecordingConnection::shared_with(name, journal))
            .collect()
    }

    #[test]
    fn test_commits_in_order() {
        let journal = journal();
        let conns = three(&journal);
        let manager = ChainedTransactionManager::new(
            conns.iter().map(|c| tx_on(c, false)).collect(),
        );
        manager.execute().unwrap();

        assert_eq!(
            conns[0].entries(),
            vec![
                "t1:begin",
                "t2:begin",
                "t3:begin",
                "t1:execute INSERT",
                "t2:execute INSERT",
                "t3:execute INSERT",
                "t1:commit",
                "t2:commit",
                "t3:commit",
            ]
        );
    }

    #[test]
    fn test_run_failure_rolls_back_everything() {
        let journal = journal();
        let conns = three(&journal);
        let manager = ChainedTransactionManager::new(vec![
            tx_on(&conns[0], false),
            tx_on(&conns[1], true),
            tx_on(&conns[2], false),
        ]);

        let err = manager.execute().unwrap_err();
        assert!(err.to_string().contains("boom"));

        let entries = conns[0].entries();
        assert!(entries.contains(&"t1:rollback".to_string()));
        assert!(entries.contains(&"t2:rollback".to_string()));
        assert!(entries.contains(&"t3:rollback".to_string()));
        assert!(!entries.iter().any(|e| e.ends_with(":commit")));
        // Transaction 3 never ran.
        assert!(!entries.contains(&"t3:execute INSERT".to_string()));
    }

    #[test]
    fn test_first_commit_failure_is_plain_error() {
        let journal = journal();
        let conns = three(&journal);
        conns[0].fail_commits();
        let manager =
            ChainedTransactionManager::new(conns.iter().map(|c| tx_on(c, false)).collect());

        let err = manager.execute().unwrap_err();
        assert!(matches!(err, StorageError::Backend(_)));
        let entries = conns[0].entries();
        assert!(entries.contains(&"t2:rollback".to_string()));
        assert!(entries.contains(&"t3:rollback".to_string()));
    }

    #[test]
    fn test_later_commit_failure_is_partial() {
        let journal = journal();
        let conns = three(&journal);
        conns[1].fail_commits();
        let manager =
            ChainedTransactionManager::new(conns.iter().map(|c| tx_on(c, false)).collect());

        let err = manager.execute().unwrap_err();
        match err {
            StorageError::Transaction(TransactionError::PartialChainFailure {
                committed,
                failed_at,
                total,
                ..
            }) => {
                assert_eq!((committed, failed_at, total), (1, 2, 3));
            }
            other => panic!("unexpected error: {other}"),
        }

        let entries = conns[0].entries();
        assert!(entries.contains(&"t1:commit".to_string()));
        assert!(!entries.contains(&"t1:rollback".to_string()));
        assert!(entries.contains(&"t2:rollback".to_string()));
        assert!(entries.contains(&"t3:rollback".to_string()));
    }

    #[test]
    fn test_execute_try_check_sees_run_phase() {
        let journal = journal();
        let conns = three(&journal);
        let probe = conns[0].clone();
        let manager = ExecuteTryTransactionManager::new(
            conns.iter().map(|c| tx_on(c, false)).collect(),
            move || {
                let entries = probe.entries();
                assert!(entries.contains(&"t3:execute INSERT".to_string()));
                assert!(!entries.iter().any(|e| e.ends_with(":commit")));
                Ok(())
            },
        );
        manager.execute().unwrap();
        assert!(conns[0].entries().contains(&"t3:commit".to_string()));
    }

    #[test]
    fn test_execute_try_check_failure_rolls_back() {
        let journal = journal();
        let conns = three(&journal);
        let manager = ExecuteTryTransactionManager::new(
            conns.iter().map(|c| tx_on(c, false)).collect(),
            || Err(failing()),
        );
        assert!(manager.execute().is_err());

        let entries = conns[0].entries();
        assert!(!entries.iter().any(|e| e.ends_with(":commit")));
        assert_eq!(entries.iter().filter(|e| e.ends_with(":rollback")).count(), 3);
    }
}

//! Serializable write transactions with busy-retry (spec.md §4.C1 mode ii).
//!
//! Grounded on `examples/original_source/.../db/database.py`'s
//! `immediate_transaction`: `BEGIN IMMEDIATE` acquires a reserved lock up
//! front (rather than deferring and discovering contention mid-transaction),
//! and a "database is locked"/"database is busy" failure is retried with
//! exponential backoff up to a bounded attempt count before being surfaced
//! as a typed, retriable error.
//!
//! `f` is `Fn`, not `FnOnce`: a busy failure may require re-running the
//! whole transaction body, so the caller's closure must be safe to invoke
//! more than once (it should only stage writes inside the transaction it is
//! handed, never mutate outside state as a side effect).

use crate::core::config::IndexConfig;
use crate::core::error::{Error, Result};
use parking_lot::Mutex;
use rusqlite::{Connection, TransactionBehavior};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

pub fn run_with_retry<T>(
    conn: &Arc<Mutex<Connection>>,
    config: &IndexConfig,
    f: impl Fn(&rusqlite::Transaction<'_>) -> Result<T>,
) -> Result<T> {
    let mut attempt: u32 = 0;
    let mut delay: Duration = config.retry_base;

    loop {
        let mut guard = conn.lock();

        let outcome: Result<T> = (|| {
            let txn = guard.transaction_with_behavior(TransactionBehavior::Immediate)?;
            match f(&txn) {
                Ok(value) => {
                    txn.commit()?;
                    Ok(value)
                }
                Err(err) => {
                    let _ = txn.rollback();
                    Err(err)
                }
            }
        })();

        match outcome {
            Ok(value) => return Ok(value),
            Err(err) if err.retriable() && attempt < config.retry_attempts => {
                drop(guard);
                attempt += 1;
                thread::sleep(delay);
                delay = (delay * 2).min(config.retry_max);
                continue;
            }
            Err(err) if err.retriable() => return Err(Error::DatabaseLocked),
            Err(err) => return Err(err),
        }
    }
}

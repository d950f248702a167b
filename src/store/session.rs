//! Low-volume transactional sessions (spec.md §4.C1 mode i).

use crate::core::error::Result;
use parking_lot::Mutex;
use rusqlite::Connection;
use std::sync::Arc;

pub fn run<T>(conn: &Arc<Mutex<Connection>>, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
    let guard = conn.lock();
    f(&guard)
}

//! In-process stand-in for the database, used by the persister tests.

use std::{
    collections::{BTreeMap, HashMap},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use thiserror::Error;

use super::{BatchTxn, Connector, Transact};
use crate::{
    db::Value,
    table::{DuplicatePolicy, Table},
};

#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("connection refused")]
    Refused,
    #[error("injected failure on insert #{0}")]
    Injected(usize),
    #[error("injected commit failure")]
    Commit,
    #[error("duplicate key id = {0}")]
    DuplicateId(i64),
}

type Rows = BTreeMap<i64, Vec<Value>>;

#[derive(Default)]
struct State {
    tables: HashMap<&'static str, Rows>,
    opened: usize,
    open: usize,
    inserts: usize,
    rollbacks: usize,
    fail_insert: Option<usize>,
    fail_commit: bool,
    refuse: bool,
}

#[derive(Clone, Default)]
pub struct MemoryConnector(Arc<Mutex<State>>);

fn lock(state: &Mutex<State>) -> MutexGuard<'_, State> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MemoryConnector {
    /// Puts a committed row with only nulls under `id`.
    pub fn seed(&self, table: &'static Table, id: i64) {
        lock(&self.0)
            .tables
            .entry(table.name)
            .or_default()
            .insert(id, vec![Value::Null; table.columns.len()]);
    }

    pub fn ids(&self, table: &Table) -> Vec<i64> {
        lock(&self.0)
            .tables
            .get(table.name)
            .map(|rows| rows.keys().copied().collect())
            .unwrap_or_default()
    }

    pub fn rows(&self, table: &Table) -> Vec<Vec<Value>> {
        lock(&self.0)
            .tables
            .get(table.name)
            .map(|rows| rows.values().cloned().collect())
            .unwrap_or_default()
    }

    /// The `n`-th insert from now on (1-based) fails.
    pub fn fail_on_insert(&self, n: usize) {
        let mut state = lock(&self.0);
        state.fail_insert = Some(state.inserts + n);
    }

    pub fn fail_on_commit(&self) {
        lock(&self.0).fail_commit = true;
    }

    pub fn refuse_connections(&self) {
        lock(&self.0).refuse = true;
    }

    pub fn connections_opened(&self) -> usize {
        lock(&self.0).opened
    }

    pub fn open_connections(&self) -> usize {
        lock(&self.0).open
    }

    pub fn rollbacks(&self) -> usize {
        lock(&self.0).rollbacks
    }
}

pub struct MemoryConn(Arc<Mutex<State>>);

impl Drop for MemoryConn {
    fn drop(&mut self) {
        lock(&self.0).open -= 1;
    }
}

impl Connector for MemoryConnector {
    type Error = MemoryError;
    type Conn = MemoryConn;

    async fn connect(&self) -> Result<MemoryConn, MemoryError> {
        let mut state = lock(&self.0);
        if state.refuse {
            return Err(MemoryError::Refused);
        }
        state.opened += 1;
        state.open += 1;
        Ok(MemoryConn(self.0.clone()))
    }
}

pub struct MemoryTxn<'a> {
    conn: &'a MemoryConn,
    pending: Vec<(&'static Table, i64, Vec<Value>)>,
}

impl Transact for MemoryConn {
    type Error = MemoryError;
    type Txn<'a> = MemoryTxn<'a>;

    async fn begin(&mut self) -> Result<MemoryTxn<'_>, MemoryError> {
        Ok(MemoryTxn {
            conn: self,
            pending: Vec::new(),
        })
    }
}

impl MemoryTxn<'_> {
    fn conflicts(&self, rows: Option<&Rows>, table: &'static Table, values: &[Value]) -> bool {
        let DuplicatePolicy::IgnoreOn(key) = table.policy else {
            return false;
        };
        let Some(idx) = table.column_index(key) else {
            return false;
        };
        let value = &values[idx];
        if *value == Value::Null {
            return false;
        }

        rows.is_some_and(|rows| rows.values().any(|row| row[idx] == *value))
            || self
                .pending
                .iter()
                .any(|(t, _, row)| t.name == table.name && row[idx] == *value)
    }
}

impl BatchTxn for MemoryTxn<'_> {
    type Error = MemoryError;

    async fn lock_max_id(&mut self, table: &'static Table) -> Result<i64, MemoryError> {
        let state = lock(&self.conn.0);
        let committed = state
            .tables
            .get(table.name)
            .and_then(|rows| rows.keys().next_back().copied());
        let pending = self
            .pending
            .iter()
            .filter(|(t, ..)| t.name == table.name)
            .map(|(_, id, _)| *id)
            .max();
        Ok(committed.max(pending).unwrap_or(0))
    }

    async fn insert(
        &mut self,
        table: &'static Table,
        id: i64,
        values: &[Value],
    ) -> Result<u64, MemoryError> {
        let conflict = {
            let mut state = lock(&self.conn.0);
            state.inserts += 1;
            if state.fail_insert == Some(state.inserts) {
                return Err(MemoryError::Injected(state.inserts));
            }
            let rows = state.tables.get(table.name);
            if rows.is_some_and(|rows| rows.contains_key(&id))
                || self.pending.iter().any(|(t, i, _)| t.name == table.name && *i == id)
            {
                return Err(MemoryError::DuplicateId(id));
            }
            self.conflicts(rows, table, values)
        };

        if conflict {
            return Ok(0);
        }
        self.pending.push((table, id, values.to_vec()));
        Ok(1)
    }

    async fn commit(self) -> Result<(), MemoryError> {
        let mut state = lock(&self.conn.0);
        if state.fail_commit {
            state.rollbacks += 1;
            return Err(MemoryError::Commit);
        }
        for (table, id, values) in self.pending {
            state.tables.entry(table.name).or_default().insert(id, values);
        }
        Ok(())
    }

    async fn rollback(self) -> Result<(), MemoryError> {
        lock(&self.conn.0).rollbacks += 1;
        Ok(())
    }
}

//! Transactional batch insert with locally assigned ids.
//!
//! The persister reads the current maximum id of the target table under a
//! table lock, numbers the well-formed records `base + 1 ..= base + n` in
//! input order, and writes them in one transaction. Either the whole batch
//! is committed or none of it is.

use std::time::SystemTime;

use crate::{
    db::Value,
    error::{BoxError, IdExhausted, StoreError, StoreResult},
    model::Record,
    table::Table,
};

#[cfg(test)]
pub mod memory;

/// Hands out one connection per call; dropping the connection releases it.
pub trait Connector {
    type Error: core::error::Error + Send + Sync + 'static;
    type Conn: Transact<Error = Self::Error>;

    async fn connect(&self) -> Result<Self::Conn, Self::Error>;
}

pub trait Transact {
    type Error;
    type Txn<'a>: BatchTxn<Error = Self::Error>
    where
        Self: 'a;

    async fn begin(&mut self) -> Result<Self::Txn<'_>, Self::Error>;
}

/// An open transaction. Dropping it without `commit` discards its writes.
pub trait BatchTxn {
    type Error;

    /// Blocks concurrent writers of `table` for the rest of the transaction
    /// and returns its largest id, 0 when empty.
    async fn lock_max_id(&mut self, table: &'static Table) -> Result<i64, Self::Error>;

    /// Returns the number of rows written: 0 when a duplicate was ignored.
    async fn insert(
        &mut self,
        table: &'static Table,
        id: i64,
        values: &[Value],
    ) -> Result<u64, Self::Error>;

    async fn commit(self) -> Result<(), Self::Error>;

    async fn rollback(self) -> Result<(), Self::Error>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Skipped {
    /// 0-based position in the input.
    pub position: usize,
    pub field: &'static str,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BatchOutcome {
    /// Largest id in the table before the batch.
    pub base_id: i64,
    /// Ids given to the well-formed records, in input order.
    pub assigned: Vec<i64>,
    /// Rows actually written; lower than `assigned.len()` only when
    /// duplicates were ignored.
    pub inserted: u64,
    pub skipped: Vec<Skipped>,
}

impl BatchOutcome {
    #[must_use]
    pub const fn is_noop(&self) -> bool {
        self.assigned.is_empty()
    }
}

fn bind_all<R: Record>(records: &[R], now: SystemTime) -> (Vec<Vec<Value>>, Vec<Skipped>) {
    let table = R::TABLE.name;
    let mut rows = Vec::with_capacity(records.len());
    let mut skipped = Vec::new();

    for (position, record) in records.iter().enumerate() {
        match record.bind(now) {
            Ok(values) => rows.push(values),
            Err(e) => {
                tracing::warn!(target: "persist", "{table}: skipping record #{position}: {e}");
                skipped.push(Skipped {
                    position,
                    field: e.field,
                });
            }
        }
    }

    (rows, skipped)
}

async fn write_rows<T>(
    txn: &mut T,
    table: &'static Table,
    rows: &[Vec<Value>],
) -> Result<(i64, u64), BoxError>
where
    T: BatchTxn,
    T::Error: Into<BoxError>,
{
    let base = txn.lock_max_id(table).await.map_err(Into::into)?;
    let last = i64::try_from(rows.len())
        .ok()
        .and_then(|n| base.checked_add(n))
        .ok_or(IdExhausted { base })?;

    let mut inserted = 0;
    for (id, values) in (base + 1..=last).zip(rows) {
        tracing::debug!(target: "persist", "{}: inserting #{id}", table.name);
        inserted += txn.insert(table, id, values).await.map_err(Into::into)?;
    }

    Ok((base, inserted))
}

/// Inserts `records` into `R::TABLE` as one transaction.
///
/// Records missing a required field are skipped and reported in the
/// outcome; no connection is opened when nothing is left to write. Any
/// database failure after the transaction has begun rolls the whole batch
/// back and is returned as [`StoreError::RolledBack`].
pub async fn insert_batch<C, R>(connector: &C, records: &[R]) -> StoreResult<BatchOutcome>
where
    C: Connector,
    R: Record,
{
    let table = R::TABLE;

    if records.is_empty() {
        tracing::info!(target: "persist", "{}: nothing to insert", table.name);
        return Ok(BatchOutcome::default());
    }

    let (rows, skipped) = bind_all(records, SystemTime::now());
    if rows.is_empty() {
        tracing::warn!(target: "persist", "{}: no valid record among {}", table.name, records.len());
        return Ok(BatchOutcome {
            skipped,
            ..BatchOutcome::default()
        });
    }

    let mut conn = connector.connect().await.map_err(StoreError::connect)?;
    let mut txn = conn
        .begin()
        .await
        .map_err(StoreError::statement(table.name))?;

    let (base_id, inserted) = match write_rows(&mut txn, table, &rows).await {
        Ok(r) => r,
        Err(e) => {
            tracing::error!(target: "persist", "\x1b[31m{}: {e}, rolling back {} rows\x1b[0m", table.name, rows.len());
            if let Err(e) = txn.rollback().await {
                tracing::error!(target: "persist", "{}: rollback failed: {e}", table.name);
            }
            return Err(rolled_back(table, e));
        }
    };

    if let Err(e) = txn.commit().await {
        tracing::error!(target: "persist", "\x1b[31m{}: commit failed: {e}\x1b[0m", table.name);
        return Err(rolled_back(table, e));
    }

    let last_id = base_id + rows.len() as i64;
    let assigned = (base_id + 1..=last_id).collect::<Vec<_>>();
    tracing::info!(
        target: "persist",
        "\x1b[36m{}: inserted {inserted}/{} rows, ids {}..={last_id}\x1b[0m",
        table.name,
        rows.len(),
        base_id + 1,
    );

    Ok(BatchOutcome {
        base_id,
        assigned,
        inserted,
        skipped,
    })
}

fn rolled_back<E>(table: &'static Table, e: E) -> StoreError
where
    E: Into<BoxError>,
{
    StoreError::RolledBack {
        table: table.name,
        source: e.into(),
    }
}

/// Inserts a single record; returns its id if a row was written.
pub async fn insert_one<C, R>(connector: &C, record: &R) -> StoreResult<Option<i64>>
where
    C: Connector,
    R: Record,
{
    let outcome = insert_batch(connector, core::slice::from_ref(record)).await?;
    if let Some(skipped) = outcome.skipped.first() {
        tracing::warn!(target: "persist", "{}: record not inserted, missing `{}`", R::TABLE.name, skipped.field);
    }
    Ok(match (outcome.inserted, outcome.assigned.first()) {
        (1, Some(&id)) => Some(id),
        _ => None,
    })
}

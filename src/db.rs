use core::{
    fmt::Debug,
    ops::{Deref, DerefMut},
};
use std::time::SystemTime;

use bb8_postgres::{PostgresConnectionManager, bb8};
use compact_str::CompactString;
use thiserror::Error;
use tokio_postgres::{
    Client, NoTls, Statement,
    types::{IsNull, ToSql, Type, to_sql_checked},
};

use crate::{
    config::{CONNECTION_TIMEOUT, DbConfig},
    persist::{BatchTxn, Connector, Transact},
    table::Table,
};

pub type ConnectionManager = PostgresConnectionManager<NoTls>;
pub type Pool = bb8::Pool<ConnectionManager>;
pub type PooledConnection = bb8::PooledConnection<'static, ConnectionManager>;
pub type DBError = tokio_postgres::Error;
pub type BB8Error = bb8::RunError<DBError>;
pub type DBResult<T> = Result<T, DBError>;

#[derive(Debug, Error)]
pub enum PgError {
    #[error(transparent)]
    Postgres(#[from] DBError),
    #[error("timed out waiting for a pooled connection")]
    PoolTimedOut,
}

impl From<BB8Error> for PgError {
    fn from(e: BB8Error) -> Self {
        match e {
            bb8::RunError::User(e) => Self::Postgres(e),
            bb8::RunError::TimedOut => Self::PoolTimedOut,
        }
    }
}

/// A single bind parameter, typed at run time so one statement template can
/// serve every column layout.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Int(i64),
    Float(f64),
    Text(CompactString),
    Time(SystemTime),
}

impl ToSql for Value {
    fn to_sql(
        &self,
        ty: &Type,
        out: &mut bytes::BytesMut,
    ) -> Result<IsNull, Box<dyn std::error::Error + Sync + Send>> {
        match self {
            Self::Null => Ok(IsNull::Yes),
            Self::Int(v) => match *ty {
                Type::INT2 => i16::try_from(*v)?.to_sql_checked(ty, out),
                Type::INT4 => i32::try_from(*v)?.to_sql_checked(ty, out),
                _ => v.to_sql_checked(ty, out),
            },
            Self::Float(v) => match *ty {
                Type::FLOAT4 => (*v as f32).to_sql_checked(ty, out),
                _ => v.to_sql_checked(ty, out),
            },
            Self::Text(s) => s.as_str().to_sql_checked(ty, out),
            Self::Time(t) => t.to_sql_checked(ty, out),
        }
    }

    #[inline]
    fn accepts(_: &Type) -> bool {
        true
    }

    to_sql_checked!();
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(v.into())
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.into())
    }
}

impl From<CompactString> for Value {
    fn from(v: CompactString) -> Self {
        Self::Text(v)
    }
}

impl From<SystemTime> for Value {
    fn from(v: SystemTime) -> Self {
        Self::Time(v)
    }
}

impl<T: Into<Self>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

pub fn params<'a>(head: &'a [Value], tail: &'a [Value]) -> Vec<&'a (dyn ToSql + Sync)> {
    head.iter()
        .chain(tail)
        .map(|v| v as &(dyn ToSql + Sync))
        .collect()
}

pub async fn connect_direct(config: &tokio_postgres::Config) -> DBResult<Client> {
    let (client, connection) = config.connect(NoTls).await?;
    tokio::spawn(async move {
        if let Err(e) = connection.await {
            tracing::error!(target: "db", "connection error: {e}");
        }
    });
    tracing::debug!(target: "db", "connected to {:?}", config.get_dbname());
    Ok(client)
}

pub async fn build_pool(config: &DbConfig) -> DBResult<Pool> {
    let manager = PostgresConnectionManager::new(config.to_pg_config(), NoTls);
    Pool::builder()
        .max_size(config.pool_size)
        .connection_timeout(CONNECTION_TIMEOUT)
        .build(manager)
        .await
}

/// Where connections come from: a fresh one per call, or a shared pool.
#[derive(Clone)]
pub enum Source {
    Direct(tokio_postgres::Config),
    Pooled(Pool),
}

impl Debug for Source {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Direct(config) => f
                .debug_struct("Direct")
                .field("hosts", &config.get_hosts())
                .field("dbname", &config.get_dbname())
                .finish(),
            Self::Pooled(pool) => f.debug_tuple("Pooled").field(&pool.state()).finish(),
        }
    }
}

pub enum Conn {
    Direct(Client),
    Pooled(PooledConnection),
}

impl Deref for Conn {
    type Target = Client;

    #[inline(always)]
    fn deref(&self) -> &Client {
        match self {
            Self::Direct(client) => client,
            Self::Pooled(conn) => conn,
        }
    }
}

impl DerefMut for Conn {
    #[inline(always)]
    fn deref_mut(&mut self) -> &mut Client {
        match self {
            Self::Direct(client) => client,
            Self::Pooled(conn) => conn,
        }
    }
}

impl Connector for Source {
    type Error = PgError;
    type Conn = Conn;

    async fn connect(&self) -> Result<Conn, PgError> {
        Ok(match self {
            Self::Direct(config) => Conn::Direct(connect_direct(config).await?),
            Self::Pooled(pool) => Conn::Pooled(pool.get_owned().await?),
        })
    }
}

pub struct PgTxn<'a> {
    txn: tokio_postgres::Transaction<'a>,
    insert: Option<(&'static str, Statement)>,
}

impl Transact for Conn {
    type Error = PgError;
    type Txn<'a> = PgTxn<'a>;

    async fn begin(&mut self) -> Result<PgTxn<'_>, PgError> {
        Ok(PgTxn {
            txn: self.transaction().await?,
            insert: None,
        })
    }
}

impl PgTxn<'_> {
    async fn insert_statement(&mut self, table: &'static Table) -> DBResult<Statement> {
        if let Some((name, stmt)) = &self.insert {
            if *name == table.name {
                return Ok(stmt.clone());
            }
        }
        let stmt = self.txn.prepare(&table.insert_sql()).await?;
        self.insert = Some((table.name, stmt.clone()));
        Ok(stmt)
    }
}

impl BatchTxn for PgTxn<'_> {
    type Error = PgError;

    async fn lock_max_id(&mut self, table: &'static Table) -> Result<i64, PgError> {
        self.txn.batch_execute(&table.lock_sql()).await?;
        let row = self.txn.query_one(&table.max_id_sql(), &[]).await?;
        Ok(row.try_get(0)?)
    }

    async fn insert(
        &mut self,
        table: &'static Table,
        id: i64,
        values: &[Value],
    ) -> Result<u64, PgError> {
        let stmt = self.insert_statement(table).await?;
        let id = [Value::Int(id)];
        Ok(self.txn.execute(&stmt, &params(&id, values)).await?)
    }

    async fn commit(self) -> Result<(), PgError> {
        Ok(self.txn.commit().await?)
    }

    async fn rollback(self) -> Result<(), PgError> {
        Ok(self.txn.rollback().await?)
    }
}

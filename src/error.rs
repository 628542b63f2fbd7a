use thiserror::Error;

pub type BoxError = Box<dyn core::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing database setting `{0}`")]
    Missing(&'static str),

    #[error("invalid database setting `{field}`: {reason}")]
    Invalid { field: &'static str, reason: &'static str },
}

/// A collected record lacks a column the table cannot store without.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("missing required field `{field}`")]
pub struct MissingField {
    pub field: &'static str,
}

/// The table's largest id leaves no room for the batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("ids after {base} would overflow")]
pub struct IdExhausted {
    pub base: i64,
}

#[derive(Debug, Error)]
pub enum StoreError {
    /// The database could not be reached; nothing was attempted.
    #[error("cannot connect to database")]
    Connect(#[source] BoxError),

    /// A single autocommit statement failed.
    #[error("statement on `{table}` failed")]
    Statement {
        table: &'static str,
        #[source]
        source: BoxError,
    },

    /// A batch failed part way and every pending row was discarded.
    #[error("batch into `{table}` rolled back")]
    RolledBack {
        table: &'static str,
        #[source]
        source: BoxError,
    },
}

impl StoreError {
    pub fn connect<E>(e: E) -> Self
    where
        E: Into<BoxError>,
    {
        Self::Connect(e.into())
    }

    pub fn statement<E>(table: &'static str) -> impl FnOnce(E) -> Self
    where
        E: Into<BoxError>,
    {
        move |e| Self::Statement {
            table,
            source: e.into(),
        }
    }

    #[must_use]
    pub const fn is_connect(&self) -> bool {
        matches!(self, Self::Connect(_))
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

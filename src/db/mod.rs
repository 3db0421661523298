//! Database access: connection pooling, SQL templating, transactions and
//! row projection.
//!
//! Queries are materialized to full SQL strings by the templater and run
//! over the simple-query protocol, which returns every column as text;
//! projection parses the text back into typed JSON values. Transactions
//! map one-to-one onto `BEGIN`/`COMMIT`/`ROLLBACK` and roll back on drop
//! when neither was issued.

pub mod orm;
pub mod pool;
pub mod sqlfmt;

pub use orm::{Column, ColumnType, RowMap, SqlRow};
pub use pool::{Pool, Pooled};
pub use sqlfmt::{name, quote_ident, quote_literal, render_template, SqlValue};

use crate::error::ServiceError;
use postgres::{Client, NoTls, SimpleQueryMessage, SimpleQueryRow};
use std::sync::Arc;
use tracing::info;

/// Pool of raw PostgreSQL connections.
pub type DbPool = Pool<Client>;

impl Pool<Client> {
    /// Open `n` connections against a libpq-style connection string.
    pub fn connect(conn_str: &str, n: usize) -> Result<Self, postgres::Error> {
        let mut conns = Vec::with_capacity(n);
        for _ in 0..n {
            conns.push(Client::connect(conn_str, NoTls)?);
        }
        info!(connections = n, "database pool initialized");
        Ok(Pool::from_conns(conns))
    }
}

/// Shared per-request handle to a pooled database connection.
///
/// Cloning shares the same underlying connection; it returns to the pool
/// when the last clone drops at the end of the request.
#[derive(Clone)]
pub struct DbConn {
    inner: Arc<Pooled<Client>>,
}

impl DbConn {
    pub(crate) fn new(pooled: Pooled<Client>) -> Self {
        DbConn {
            inner: Arc::new(pooled),
        }
    }

    /// Begin a transaction on this connection.
    pub fn transaction(&self) -> Result<DbTransaction<'_>, ServiceError> {
        DbTransaction::begin(self)
    }
}

/// Rows produced by one statement, plus the materialized query text.
pub struct DbRows {
    rows: Vec<SimpleQueryRow>,
    query: String,
}

impl DbRows {
    /// The SQL that was executed, post-substitution.
    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn rows(&self) -> &[SimpleQueryRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// An open transaction; commit and abort consume it, drop rolls back.
pub struct DbTransaction<'a> {
    guard: std::sync::MutexGuard<'a, Option<Client>>,
    open: bool,
}

impl<'a> DbTransaction<'a> {
    fn begin(conn: &'a DbConn) -> Result<Self, ServiceError> {
        let mut guard = conn.inner.lock();
        guard
            .as_mut()
            .expect("pooled connection already returned")
            .batch_execute("BEGIN")?;
        Ok(DbTransaction { guard, open: true })
    }

    fn client(&mut self) -> &mut Client {
        self.guard
            .as_mut()
            .expect("pooled connection already returned")
    }

    /// Render the template against `params` and execute it.
    pub fn exec(&mut self, template: &str, params: &[SqlValue]) -> Result<DbRows, ServiceError> {
        let query = render_template(template, params)?;
        let messages = self.client().simple_query(&query)?;
        let rows = messages
            .into_iter()
            .filter_map(|m| match m {
                SimpleQueryMessage::Row(row) => Some(row),
                _ => None,
            })
            .collect();
        Ok(DbRows { rows, query })
    }

    pub fn commit(mut self) -> Result<(), ServiceError> {
        self.client().batch_execute("COMMIT")?;
        self.open = false;
        Ok(())
    }

    pub fn abort(mut self) -> Result<(), ServiceError> {
        self.client().batch_execute("ROLLBACK")?;
        self.open = false;
        Ok(())
    }
}

impl Drop for DbTransaction<'_> {
    fn drop(&mut self) {
        if self.open {
            let _ = self.client().batch_execute("ROLLBACK");
        }
    }
}

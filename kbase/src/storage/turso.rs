//! libsql backend
//!
//! Supports two connection modes:
//! - **Local**: SQLite file or `:memory:`, no network
//! - **Remote**: Turso cloud or libsql-server
//!
//! The backend keeps a single connection. An in-memory database exists only
//! as long as its connection, and SQLite serializes writers anyway, so
//! transactions take turns on that connection through an async mutex.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use libsql::params::Params;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::config::StorageConfig;
use crate::error::{sanitize_url, DatabaseError, DatabaseOperation};

use super::dialect::sqlite;
use super::{Backend, QueryDialect, Row, Session, SqlValue, Statement, Transaction};

/// libsql-backed [`Backend`]
#[derive(Clone)]
pub struct LibsqlBackend {
    // Kept alive for as long as the connection is in use
    _database: Arc<libsql::Database>,
    connection: Arc<Mutex<libsql::Connection>>,
}

impl fmt::Debug for LibsqlBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LibsqlBackend").finish_non_exhaustive()
    }
}

impl LibsqlBackend {
    /// Open the backend described by `config`
    ///
    /// `libsql://`, `https://` and `http://` URLs connect remotely with the
    /// configured auth token; anything else is a local path.
    pub async fn connect(config: &StorageConfig) -> Result<Self, DatabaseError> {
        let url = config.url.as_str();
        if ["libsql://", "https://", "http://"]
            .iter()
            .any(|scheme| url.starts_with(scheme))
        {
            let token = config.auth_token.clone().unwrap_or_default();
            Self::open_remote(url, token).await
        } else {
            Self::open_local(url.strip_prefix("sqlite://").unwrap_or(url)).await
        }
    }

    /// A fresh private in-memory database
    pub async fn memory() -> Result<Self, DatabaseError> {
        Self::open_local(":memory:").await
    }

    pub async fn open_local(path: impl AsRef<Path>) -> Result<Self, DatabaseError> {
        let path = path.as_ref();
        tracing::debug!("Opening local libsql database at: {}", path.display());
        let database = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| {
                DatabaseError::connection_failed(e.to_string())
                    .add_context(path.display().to_string())
            })?;
        Self::from_database(database)
    }

    pub async fn open_remote(
        url: impl Into<String>,
        auth_token: impl Into<String>,
    ) -> Result<Self, DatabaseError> {
        let url = url.into();
        let url_safe = sanitize_url(&url);
        tracing::debug!("Connecting to remote libsql database: {}", url_safe);
        let database = libsql::Builder::new_remote(url, auth_token.into())
            .build()
            .await
            .map_err(|e| DatabaseError::connection_failed(e.to_string()).add_context(url_safe))?;
        Self::from_database(database)
    }

    fn from_database(database: libsql::Database) -> Result<Self, DatabaseError> {
        let connection = database
            .connect()
            .map_err(|e| DatabaseError::connection_failed(e.to_string()))?;
        Ok(Self {
            _database: Arc::new(database),
            connection: Arc::new(Mutex::new(connection)),
        })
    }
}

#[async_trait]
impl Backend for LibsqlBackend {
    type Transaction = LibsqlTransaction;

    fn dialect(&self) -> &'static dyn QueryDialect {
        sqlite()
    }

    async fn begin(&self) -> Result<LibsqlTransaction, DatabaseError> {
        let connection = Arc::clone(&self.connection).lock_owned().await;
        if !connection.is_autocommit() {
            // a previous transaction was abandoned mid-flight
            tracing::warn!("Rolling back abandoned libsql transaction");
            connection
                .execute("ROLLBACK", Params::None)
                .await
                .map_err(|e| DatabaseError::from(e).during(DatabaseOperation::Transaction))?;
        }
        connection
            .execute("BEGIN", Params::None)
            .await
            .map_err(|e| DatabaseError::transaction_failed(e.to_string()))?;
        Ok(LibsqlTransaction { connection })
    }
}

/// An open libsql transaction holding the connection
pub struct LibsqlTransaction {
    connection: OwnedMutexGuard<libsql::Connection>,
}

impl fmt::Debug for LibsqlTransaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LibsqlTransaction").finish_non_exhaustive()
    }
}

fn bind(values: Vec<SqlValue>) -> Params {
    if values.is_empty() {
        return Params::None;
    }
    Params::Positional(
        values
            .into_iter()
            .map(|value| match value {
                SqlValue::Integer(Some(v)) => libsql::Value::Integer(v),
                SqlValue::Real(Some(v)) => libsql::Value::Real(v),
                SqlValue::Text(Some(v)) => libsql::Value::Text(v),
                _ => libsql::Value::Null,
            })
            .collect(),
    )
}

fn decode(value: libsql::Value) -> SqlValue {
    match value {
        libsql::Value::Null => SqlValue::Integer(None),
        libsql::Value::Integer(v) => SqlValue::Integer(Some(v)),
        libsql::Value::Real(v) => SqlValue::Real(Some(v)),
        libsql::Value::Text(v) => SqlValue::Text(Some(v)),
        libsql::Value::Blob(v) => SqlValue::Text(Some(String::from_utf8_lossy(&v).into_owned())),
    }
}

#[async_trait]
impl Session for LibsqlTransaction {
    fn dialect(&self) -> &'static dyn QueryDialect {
        sqlite()
    }

    async fn execute(&mut self, statement: Statement) -> Result<u64, DatabaseError> {
        tracing::trace!(sql = %statement.sql, "execute");
        let affected = self
            .connection
            .execute(&statement.sql, bind(statement.params))
            .await?;
        Ok(affected)
    }

    async fn query(&mut self, statement: Statement) -> Result<Vec<Row>, DatabaseError> {
        tracing::trace!(sql = %statement.sql, "query");
        let mut rows = self
            .connection
            .query(&statement.sql, bind(statement.params))
            .await?;
        let width = rows.column_count();
        let mut result = Vec::new();
        while let Some(row) = rows.next().await? {
            let mut values = Vec::with_capacity(usize::try_from(width).unwrap_or_default());
            for index in 0..width {
                values.push(decode(row.get_value(index)?));
            }
            result.push(Row::new(values));
        }
        Ok(result)
    }
}

#[async_trait]
impl Transaction for LibsqlTransaction {
    async fn commit(self) -> Result<(), DatabaseError> {
        self.connection
            .execute("COMMIT", Params::None)
            .await
            .map_err(|e| DatabaseError::transaction_failed(e.to_string()))?;
        Ok(())
    }

    async fn rollback(self) -> Result<(), DatabaseError> {
        self.connection
            .execute("ROLLBACK", Params::None)
            .await
            .map_err(|e| DatabaseError::transaction_failed(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn create_table(backend: &LibsqlBackend) {
        let mut tx = backend.begin().await.expect("begin");
        tx.execute(Statement::raw(
            "CREATE TABLE notes (id INTEGER PRIMARY KEY, body TEXT)",
        ))
        .await
        .expect("create");
        tx.commit().await.expect("commit");
    }

    #[tokio::test]
    async fn test_execute_and_query() {
        let backend = LibsqlBackend::memory().await.expect("memory database");
        create_table(&backend).await;

        let mut tx = backend.begin().await.expect("begin");
        let inserted = tx
            .execute(Statement {
                sql: "INSERT INTO notes (id, body) VALUES (?1, ?2), (?3, ?4)".to_string(),
                params: vec![
                    SqlValue::from(1_i64),
                    SqlValue::from("first"),
                    SqlValue::from(2_i64),
                    SqlValue::Text(None),
                ],
            })
            .await
            .expect("insert");
        assert_eq!(inserted, 2);

        let rows = tx
            .query(Statement::raw("SELECT id, body FROM notes ORDER BY id"))
            .await
            .expect("select");
        tx.commit().await.expect("commit");

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get_i64(0).expect("id"), 1);
        assert_eq!(rows[0].get_string(1).expect("body"), "first");
        assert_eq!(rows[1].get_opt_string(1).expect("null body"), None);
    }

    #[tokio::test]
    async fn test_rollback_discards_writes() {
        let backend = LibsqlBackend::memory().await.expect("memory database");
        create_table(&backend).await;

        let mut tx = backend.begin().await.expect("begin");
        tx.execute(Statement::raw("INSERT INTO notes (id, body) VALUES (1, 'x')"))
            .await
            .expect("insert");
        tx.rollback().await.expect("rollback");

        let mut tx = backend.begin().await.expect("begin");
        let rows = tx
            .query(Statement::raw("SELECT COUNT(*) FROM notes"))
            .await
            .expect("count");
        tx.commit().await.expect("commit");
        assert_eq!(rows[0].get_i64(0).expect("count"), 0);
    }

    #[tokio::test]
    async fn test_abandoned_transaction_is_recovered() {
        let backend = LibsqlBackend::memory().await.expect("memory database");
        create_table(&backend).await;

        let mut tx = backend.begin().await.expect("begin");
        tx.execute(Statement::raw("INSERT INTO notes (id, body) VALUES (1, 'x')"))
            .await
            .expect("insert");
        drop(tx);

        let mut tx = backend.begin().await.expect("begin after abandon");
        let rows = tx
            .query(Statement::raw("SELECT COUNT(*) FROM notes"))
            .await
            .expect("count");
        tx.commit().await.expect("commit");
        assert_eq!(rows[0].get_i64(0).expect("count"), 0);
    }

    #[tokio::test]
    async fn test_local_file_database() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("kb.db");
        let backend = LibsqlBackend::open_local(&path).await.expect("open");
        create_table(&backend).await;
        assert!(path.exists());
    }
}

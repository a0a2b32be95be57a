//! sqlx backend for PostgreSQL and MySQL
//!
//! Uses the sqlx `Any` driver so one pool type serves both engines; the
//! dialect is picked from the connection URL scheme.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::any::{AnyPoolOptions, AnyRow};
use sqlx::{Any, AnyPool, Row as _};

use crate::config::StorageConfig;
use crate::error::{sanitize_url, DatabaseError, DatabaseErrorKind, DatabaseOperation};

use super::{dialect_for_url, Backend, QueryDialect, Row, Session, SqlValue, Statement, Transaction};

/// sqlx-backed [`Backend`]
#[derive(Debug, Clone)]
pub struct SqlxBackend {
    pool: AnyPool,
    dialect: &'static dyn QueryDialect,
}

impl SqlxBackend {
    /// Create a connection pool for `config.url`
    pub async fn connect(config: &StorageConfig) -> Result<Self, DatabaseError> {
        let url_safe = sanitize_url(&config.url);
        let dialect = dialect_for_url(&config.url).ok_or_else(|| {
            DatabaseError::new(
                DatabaseOperation::Connect,
                DatabaseErrorKind::Configuration,
                format!("Unsupported database URL scheme: {}", url_safe),
            )
        })?;

        sqlx::any::install_default_drivers();

        let pool = AnyPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.connection_timeout_secs))
            .connect(&config.url)
            .await
            .map_err(|e| DatabaseError::from(e).add_context(url_safe.clone()))?;

        tracing::info!(
            "Database connection pool created: dialect={}, max={}",
            dialect.name(),
            config.max_connections
        );

        Ok(Self { pool, dialect })
    }

    /// Wrap an existing pool
    pub fn from_pool(pool: AnyPool, dialect: &'static dyn QueryDialect) -> Self {
        Self { pool, dialect }
    }

    pub fn pool(&self) -> &AnyPool {
        &self.pool
    }
}

#[async_trait]
impl Backend for SqlxBackend {
    type Transaction = SqlxTransaction;

    fn dialect(&self) -> &'static dyn QueryDialect {
        self.dialect
    }

    async fn begin(&self) -> Result<SqlxTransaction, DatabaseError> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| DatabaseError::from(e).during(DatabaseOperation::Transaction))?;
        Ok(SqlxTransaction {
            tx,
            dialect: self.dialect,
        })
    }
}

/// An open sqlx transaction
pub struct SqlxTransaction {
    tx: sqlx::Transaction<'static, Any>,
    dialect: &'static dyn QueryDialect,
}

fn prepare(statement: &Statement) -> sqlx::query::Query<'_, Any, sqlx::any::AnyArguments<'_>> {
    let mut query = sqlx::query(&statement.sql);
    for value in &statement.params {
        query = match value {
            SqlValue::Integer(v) => query.bind(*v),
            SqlValue::Real(v) => query.bind(*v),
            SqlValue::Text(v) => query.bind(v.clone()),
        };
    }
    query
}

fn decode(row: &AnyRow) -> Result<Row, DatabaseError> {
    let mut values = Vec::with_capacity(row.len());
    for index in 0..row.len() {
        let value = if let Ok(v) = row.try_get::<Option<i64>, _>(index) {
            SqlValue::Integer(v)
        } else if let Ok(v) = row.try_get::<Option<f64>, _>(index) {
            SqlValue::Real(v)
        } else {
            SqlValue::Text(row.try_get::<Option<String>, _>(index)?)
        };
        values.push(value);
    }
    Ok(Row::new(values))
}

#[async_trait]
impl Session for SqlxTransaction {
    fn dialect(&self) -> &'static dyn QueryDialect {
        self.dialect
    }

    async fn execute(&mut self, statement: Statement) -> Result<u64, DatabaseError> {
        tracing::trace!(sql = %statement.sql, "execute");
        let result = prepare(&statement).execute(&mut *self.tx).await?;
        Ok(result.rows_affected())
    }

    async fn query(&mut self, statement: Statement) -> Result<Vec<Row>, DatabaseError> {
        tracing::trace!(sql = %statement.sql, "query");
        let rows = prepare(&statement).fetch_all(&mut *self.tx).await?;
        rows.iter().map(decode).collect()
    }
}

#[async_trait]
impl Transaction for SqlxTransaction {
    async fn commit(self) -> Result<(), DatabaseError> {
        self.tx
            .commit()
            .await
            .map_err(|e| DatabaseError::from(e).during(DatabaseOperation::Transaction))
    }

    async fn rollback(self) -> Result<(), DatabaseError> {
        self.tx
            .rollback()
            .await
            .map_err(|e| DatabaseError::from(e).during(DatabaseOperation::Transaction))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BackendKind, StorageConfig};

    #[tokio::test]
    async fn test_unknown_scheme_is_a_configuration_error() {
        let config = StorageConfig {
            backend: BackendKind::Sqlx,
            url: "redis://localhost:6379".to_string(),
            ..StorageConfig::default()
        };
        let err = SqlxBackend::connect(&config).await.expect_err("unsupported");
        assert_eq!(err.kind, DatabaseErrorKind::Configuration);
        assert_eq!(err.operation, DatabaseOperation::Connect);
    }
}

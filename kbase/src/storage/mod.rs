//! SQL storage abstraction
//!
//! Repositories talk to the database through three small traits:
//!
//! - [`Backend`]: owns connections and opens transactions
//! - [`Transaction`]: one open transaction, finished by commit or rollback
//! - [`Session`]: executes statements inside a transaction
//!
//! Statements are built with [`QueryBuilder`], which asks the backend's
//! [`QueryDialect`] for placeholder syntax, identifier quoting and upsert
//! clauses.
//!
//! # Available Backends
//!
//! - **libsql** (`turso` feature): local SQLite files, `:memory:` and remote
//!   libsql servers
//! - **sqlx** (`database` feature): PostgreSQL and MySQL through the sqlx
//!   `Any` driver

use async_trait::async_trait;

use crate::error::DatabaseError;

mod dialect;
mod query;
pub mod schema;

#[cfg(feature = "database")]
pub mod database;

#[cfg(feature = "turso")]
pub mod turso;

pub use dialect::{dialect_for_url, MySqlDialect, PostgresDialect, QueryDialect, SqliteDialect};
pub use query::{QueryBuilder, Statement};

#[cfg(feature = "database")]
pub use database::SqlxBackend;

#[cfg(feature = "turso")]
pub use turso::LibsqlBackend;

/// A bindable parameter or a decoded column value
///
/// Nulls keep their column type so that strictly typed backends can bind them.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Integer(Option<i64>),
    Real(Option<f64>),
    Text(Option<String>),
}

impl SqlValue {
    pub fn is_null(&self) -> bool {
        match self {
            Self::Integer(value) => value.is_none(),
            Self::Real(value) => value.is_none(),
            Self::Text(value) => value.is_none(),
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(value) => *value,
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(value) => value.as_deref(),
            _ => None,
        }
    }
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        Self::Integer(Some(value))
    }
}

impl From<Option<i64>> for SqlValue {
    fn from(value: Option<i64>) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for SqlValue {
    fn from(value: f64) -> Self {
        Self::Real(Some(value))
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        Self::Text(Some(value))
    }
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        Self::Text(Some(value.to_string()))
    }
}

impl From<&String> for SqlValue {
    fn from(value: &String) -> Self {
        Self::Text(Some(value.clone()))
    }
}

impl From<Option<String>> for SqlValue {
    fn from(value: Option<String>) -> Self {
        Self::Text(value)
    }
}

/// One result row, columns in select order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    values: Vec<SqlValue>,
}

impl Row {
    pub fn new(values: Vec<SqlValue>) -> Self {
        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn value(&self, index: usize) -> Result<&SqlValue, DatabaseError> {
        self.values.get(index).ok_or_else(|| {
            DatabaseError::type_conversion(format!(
                "Column index {} out of bounds (len: {})",
                index,
                self.values.len()
            ))
        })
    }

    pub fn get_opt_i64(&self, index: usize) -> Result<Option<i64>, DatabaseError> {
        match self.value(index)? {
            value if value.is_null() => Ok(None),
            SqlValue::Integer(value) => Ok(*value),
            other => Err(DatabaseError::type_conversion(format!(
                "Column {} is not an integer: {:?}",
                index, other
            ))),
        }
    }

    pub fn get_i64(&self, index: usize) -> Result<i64, DatabaseError> {
        self.get_opt_i64(index)?.ok_or_else(|| {
            DatabaseError::type_conversion(format!("Column {} is unexpectedly null", index))
        })
    }

    pub fn get_opt_string(&self, index: usize) -> Result<Option<String>, DatabaseError> {
        match self.value(index)? {
            value if value.is_null() => Ok(None),
            SqlValue::Text(value) => Ok(value.clone()),
            other => Err(DatabaseError::type_conversion(format!(
                "Column {} is not text: {:?}",
                index, other
            ))),
        }
    }

    pub fn get_string(&self, index: usize) -> Result<String, DatabaseError> {
        self.get_opt_string(index)?.ok_or_else(|| {
            DatabaseError::type_conversion(format!("Column {} is unexpectedly null", index))
        })
    }
}

/// Executes statements inside an open transaction
#[async_trait]
pub trait Session: Send {
    fn dialect(&self) -> &'static dyn QueryDialect;

    /// Run a statement, returning the number of affected rows
    async fn execute(&mut self, statement: Statement) -> Result<u64, DatabaseError>;

    /// Run a query, returning every row
    async fn query(&mut self, statement: Statement) -> Result<Vec<Row>, DatabaseError>;
}

/// An open transaction
///
/// Dropping a transaction without finishing it leaves the outcome to the
/// driver; repositories always call one of the two methods.
#[async_trait]
pub trait Transaction: Session + Sized {
    async fn commit(self) -> Result<(), DatabaseError>;

    async fn rollback(self) -> Result<(), DatabaseError>;
}

/// A database the repositories can open transactions on
#[async_trait]
pub trait Backend: Send + Sync + 'static {
    type Transaction: Transaction + 'static;

    fn dialect(&self) -> &'static dyn QueryDialect;

    async fn begin(&self) -> Result<Self::Transaction, DatabaseError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_getters() {
        let row = Row::new(vec![
            SqlValue::from(7_i64),
            SqlValue::from("rust"),
            SqlValue::Integer(None),
            SqlValue::Text(None),
        ]);
        assert_eq!(row.get_i64(0).expect("int"), 7);
        assert_eq!(row.get_string(1).expect("text"), "rust");
        assert_eq!(row.get_opt_i64(2).expect("null int"), None);
        assert_eq!(row.get_opt_string(3).expect("null text"), None);
        // nulls decode as None whatever their declared type
        assert_eq!(row.get_opt_string(2).expect("null"), None);
    }

    #[test]
    fn test_row_getter_errors() {
        let row = Row::new(vec![SqlValue::from("x"), SqlValue::Integer(None)]);
        assert!(row.get_i64(0).is_err());
        assert!(row.get_i64(1).is_err());
        assert!(row.get_string(5).is_err());
    }
}

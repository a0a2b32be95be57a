//! Statement building
//!
//! [`QueryBuilder`] accumulates SQL text and bound parameters side by side so
//! placeholders always line up with their values, whatever the dialect.

use crate::expression::{FilterExpression, FilterOperator, Operand};

use super::{QueryDialect, SqlValue};

/// A finished statement with its parameters
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

impl Statement {
    /// A statement without parameters
    pub fn raw(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }
}

/// Incremental SQL builder bound to one dialect
#[derive(Debug)]
pub struct QueryBuilder {
    dialect: &'static dyn QueryDialect,
    sql: String,
    params: Vec<SqlValue>,
    has_condition: bool,
}

impl QueryBuilder {
    pub fn new(dialect: &'static dyn QueryDialect) -> Self {
        Self {
            dialect,
            sql: String::new(),
            params: Vec::new(),
            has_condition: false,
        }
    }

    pub fn dialect(&self) -> &'static dyn QueryDialect {
        self.dialect
    }

    pub fn push(&mut self, sql: &str) -> &mut Self {
        self.sql.push_str(sql);
        self
    }

    pub fn push_identifier(&mut self, identifier: &str) -> &mut Self {
        let quoted = self.dialect.quote_identifier(identifier);
        self.sql.push_str(&quoted);
        self
    }

    /// Comma-separated quoted identifiers
    pub fn push_identifiers(&mut self, identifiers: &[&str]) -> &mut Self {
        for (index, identifier) in identifiers.iter().enumerate() {
            if index > 0 {
                self.sql.push_str(", ");
            }
            self.push_identifier(identifier);
        }
        self
    }

    /// Bind one value at the current position
    pub fn push_bind(&mut self, value: impl Into<SqlValue>) -> &mut Self {
        self.params.push(value.into());
        let placeholder = self.dialect.placeholder(self.params.len());
        self.sql.push_str(&placeholder);
        self
    }

    /// Bind several values, comma-separated
    pub fn push_bind_list<I, V>(&mut self, values: I) -> &mut Self
    where
        I: IntoIterator<Item = V>,
        V: Into<SqlValue>,
    {
        for (index, value) in values.into_iter().enumerate() {
            if index > 0 {
                self.sql.push_str(", ");
            }
            self.push_bind(value);
        }
        self
    }

    /// ` WHERE ` for the first condition, ` AND ` afterwards
    pub fn push_condition(&mut self) -> &mut Self {
        if self.has_condition {
            self.sql.push_str(" AND ");
        } else {
            self.sql.push_str(" WHERE ");
            self.has_condition = true;
        }
        self
    }

    /// Render `expression` as a predicate over `column`
    ///
    /// `column` is inserted verbatim so it may be qualified or computed.
    /// Empty `IN` lists match nothing and empty `NOT IN` lists match
    /// everything.
    pub fn push_filter<T>(&mut self, column: &str, expression: &FilterExpression<T>) -> &mut Self
    where
        T: Clone + Into<SqlValue>,
    {
        let operator = expression.operator();
        match expression.operand() {
            Operand::Scalar(value) => {
                self.push(column)
                    .push(" ")
                    .push(&operator.to_string())
                    .push(" ")
                    .push_bind(value.clone());
            }
            Operand::Range(low, high) => {
                self.push(column)
                    .push(" ")
                    .push(&operator.to_string())
                    .push(" ")
                    .push_bind(low.clone())
                    .push(" AND ")
                    .push_bind(high.clone());
            }
            Operand::List(values) if values.is_empty() => {
                if operator == FilterOperator::NotIn {
                    self.push("1 = 1");
                } else {
                    self.push("1 = 0");
                }
            }
            Operand::List(values) => {
                self.push(column)
                    .push(" ")
                    .push(&operator.to_string())
                    .push(" (")
                    .push_bind_list(values.iter().cloned())
                    .push(")");
            }
            Operand::Compound(lhs, rhs) => {
                self.push("(");
                self.push_filter(column, lhs);
                self.push(") ").push(&operator.to_string()).push(" (");
                self.push_filter(column, rhs);
                self.push(")");
            }
        }
        self
    }

    pub fn build(self) -> Statement {
        Statement {
            sql: self.sql,
            params: self.params,
        }
    }
}

//! Typed filter expressions
//!
//! A [`FilterExpression`] is a recursive boolean predicate over the values of
//! a single field. Leaves compare the field against a scalar, a range or a
//! list of values; `And`/`Or` nodes combine two sub-expressions.
//!
//! The operator and the operand always agree: the typed constructors build
//! matching pairs, and [`FilterExpression::try_new`] rejects mismatched ones.
//!
//! # Example
//!
//! ```rust
//! use kbase::expression::{FilterExpression, FilterOperator};
//!
//! let recent = FilterExpression::ge(2020_i64).and(FilterExpression::lt(2024_i64));
//! assert_eq!(recent.operator(), FilterOperator::And);
//! assert_eq!(recent.leaves().count(), 2);
//! ```

use std::fmt;

use thiserror::Error;

/// Operators a filter expression can carry
///
/// # Example
///
/// ```rust
/// use kbase::expression::FilterOperator;
///
/// assert_eq!(format!("{}", FilterOperator::Equal), "=");
/// assert_eq!(format!("{}", FilterOperator::NotBetween), "NOT BETWEEN");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterOperator {
    /// Equal to (=)
    Equal,
    /// Not equal to (!=)
    NotEqual,
    /// Greater than (>)
    GreaterThan,
    /// Greater than or equal to (>=)
    GreaterOrEqual,
    /// Less than (<)
    LessThan,
    /// Less than or equal to (<=)
    LessOrEqual,
    /// Value is in a list (IN)
    In,
    /// Value is not in a list (NOT IN)
    NotIn,
    /// Value lies in an inclusive range (BETWEEN)
    Between,
    /// Value lies outside an inclusive range (NOT BETWEEN)
    NotBetween,
    /// Pattern matching (LIKE)
    Like,
    /// Negated pattern matching (NOT LIKE)
    NotLike,
    /// Either sub-expression holds (OR)
    Or,
    /// Both sub-expressions hold (AND)
    And,
}

impl FilterOperator {
    /// The operand family this operator requires
    pub fn operand_kind(self) -> OperandKind {
        match self {
            Self::Equal
            | Self::NotEqual
            | Self::GreaterThan
            | Self::GreaterOrEqual
            | Self::LessThan
            | Self::LessOrEqual
            | Self::Like
            | Self::NotLike => OperandKind::Scalar,
            Self::In | Self::NotIn => OperandKind::List,
            Self::Between | Self::NotBetween => OperandKind::Range,
            Self::Or | Self::And => OperandKind::Compound,
        }
    }
}

impl fmt::Display for FilterOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Equal => write!(f, "="),
            Self::NotEqual => write!(f, "!="),
            Self::GreaterThan => write!(f, ">"),
            Self::GreaterOrEqual => write!(f, ">="),
            Self::LessThan => write!(f, "<"),
            Self::LessOrEqual => write!(f, "<="),
            Self::In => write!(f, "IN"),
            Self::NotIn => write!(f, "NOT IN"),
            Self::Between => write!(f, "BETWEEN"),
            Self::NotBetween => write!(f, "NOT BETWEEN"),
            Self::Like => write!(f, "LIKE"),
            Self::NotLike => write!(f, "NOT LIKE"),
            Self::Or => write!(f, "OR"),
            Self::And => write!(f, "AND"),
        }
    }
}

/// Shape of an operand, independent of its value type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperandKind {
    Scalar,
    Range,
    List,
    Compound,
}

impl fmt::Display for OperandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scalar => write!(f, "scalar"),
            Self::Range => write!(f, "range"),
            Self::List => write!(f, "list"),
            Self::Compound => write!(f, "compound"),
        }
    }
}

/// Right-hand side of a filter expression
#[derive(Debug, Clone, PartialEq)]
pub enum Operand<T> {
    /// A single value
    Scalar(T),
    /// An inclusive `(low, high)` range
    Range(T, T),
    /// An ordered list of values
    List(Vec<T>),
    /// Two sub-expressions joined by `And`/`Or`
    Compound(Box<FilterExpression<T>>, Box<FilterExpression<T>>),
}

impl<T> Operand<T> {
    pub fn kind(&self) -> OperandKind {
        match self {
            Self::Scalar(_) => OperandKind::Scalar,
            Self::Range(_, _) => OperandKind::Range,
            Self::List(_) => OperandKind::List,
            Self::Compound(_, _) => OperandKind::Compound,
        }
    }
}

/// Error raised when an operator is paired with the wrong operand shape
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExpressionError {
    #[error("operator {operator} requires a {expected} operand, got {found}")]
    OperandMismatch {
        operator: FilterOperator,
        expected: OperandKind,
        found: OperandKind,
    },
}

/// A typed, recursive filter over one field
#[derive(Debug, Clone, PartialEq)]
pub struct FilterExpression<T> {
    operator: FilterOperator,
    operand: Operand<T>,
}

impl<T> FilterExpression<T> {
    /// Build an expression from a dynamically chosen operator and operand
    ///
    /// # Example
    ///
    /// ```rust
    /// use kbase::expression::{FilterExpression, FilterOperator, Operand};
    ///
    /// assert!(FilterExpression::try_new(FilterOperator::In, Operand::List(vec![1, 2])).is_ok());
    /// assert!(FilterExpression::try_new(FilterOperator::In, Operand::Scalar(1)).is_err());
    /// ```
    pub fn try_new(operator: FilterOperator, operand: Operand<T>) -> Result<Self, ExpressionError> {
        let expected = operator.operand_kind();
        let found = operand.kind();
        if expected != found {
            return Err(ExpressionError::OperandMismatch {
                operator,
                expected,
                found,
            });
        }
        Ok(Self { operator, operand })
    }

    /// Reassemble an expression whose operand shape is known to match
    pub(super) fn from_parts(operator: FilterOperator, operand: Operand<T>) -> Self {
        debug_assert_eq!(operator.operand_kind(), operand.kind());
        Self { operator, operand }
    }

    fn scalar(operator: FilterOperator, value: T) -> Self {
        Self {
            operator,
            operand: Operand::Scalar(value),
        }
    }

    pub fn eq(value: T) -> Self {
        Self::scalar(FilterOperator::Equal, value)
    }

    pub fn ne(value: T) -> Self {
        Self::scalar(FilterOperator::NotEqual, value)
    }

    pub fn gt(value: T) -> Self {
        Self::scalar(FilterOperator::GreaterThan, value)
    }

    pub fn ge(value: T) -> Self {
        Self::scalar(FilterOperator::GreaterOrEqual, value)
    }

    pub fn lt(value: T) -> Self {
        Self::scalar(FilterOperator::LessThan, value)
    }

    pub fn le(value: T) -> Self {
        Self::scalar(FilterOperator::LessOrEqual, value)
    }

    /// SQL `LIKE` pattern match; `%` and `_` keep their usual meaning
    pub fn like(pattern: T) -> Self {
        Self::scalar(FilterOperator::Like, pattern)
    }

    pub fn not_like(pattern: T) -> Self {
        Self::scalar(FilterOperator::NotLike, pattern)
    }

    pub fn in_list(values: impl IntoIterator<Item = T>) -> Self {
        Self {
            operator: FilterOperator::In,
            operand: Operand::List(values.into_iter().collect()),
        }
    }

    pub fn not_in(values: impl IntoIterator<Item = T>) -> Self {
        Self {
            operator: FilterOperator::NotIn,
            operand: Operand::List(values.into_iter().collect()),
        }
    }

    pub fn between(low: T, high: T) -> Self {
        Self {
            operator: FilterOperator::Between,
            operand: Operand::Range(low, high),
        }
    }

    pub fn not_between(low: T, high: T) -> Self {
        Self {
            operator: FilterOperator::NotBetween,
            operand: Operand::Range(low, high),
        }
    }

    /// Combine with another expression; both must hold
    pub fn and(self, rhs: Self) -> Self {
        Self {
            operator: FilterOperator::And,
            operand: Operand::Compound(Box::new(self), Box::new(rhs)),
        }
    }

    /// Combine with another expression; either may hold
    pub fn or(self, rhs: Self) -> Self {
        Self {
            operator: FilterOperator::Or,
            operand: Operand::Compound(Box::new(self), Box::new(rhs)),
        }
    }

    pub fn operator(&self) -> FilterOperator {
        self.operator
    }

    pub fn operand(&self) -> &Operand<T> {
        &self.operand
    }

    pub fn into_parts(self) -> (FilterOperator, Operand<T>) {
        (self.operator, self.operand)
    }

    /// Iterate over every leaf value, left to right
    pub fn leaves(&self) -> Leaves<'_, T> {
        Leaves {
            stack: vec![self],
            pending: Vec::new(),
        }
    }

    /// Number of nodes in the tree, compound nodes included
    pub fn node_count(&self) -> usize {
        match &self.operand {
            Operand::Compound(lhs, rhs) => 1 + lhs.node_count() + rhs.node_count(),
            _ => 1,
        }
    }
}

/// Iterator over the leaf values of a [`FilterExpression`]
pub struct Leaves<'a, T> {
    stack: Vec<&'a FilterExpression<T>>,
    pending: Vec<&'a T>,
}

impl<'a, T> Iterator for Leaves<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(value) = self.pending.pop() {
                return Some(value);
            }
            let expr = self.stack.pop()?;
            match &expr.operand {
                Operand::Scalar(value) => return Some(value),
                Operand::Range(low, high) => {
                    self.pending.push(high);
                    return Some(low);
                }
                Operand::List(values) => self.pending.extend(values.iter().rev()),
                Operand::Compound(lhs, rhs) => {
                    self.stack.push(rhs);
                    self.stack.push(lhs);
                }
            }
        }
    }
}

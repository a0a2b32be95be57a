//! Typed single-field updates
//!
//! Every updatable field type declares which family of operators it accepts
//! through [`Field::Operator`]:
//!
//! - [`ScalarOperator`]: `Set` and `Clear` (booleans, optionals, timestamps)
//! - [`ConcatOperator`]: additionally `Append` and `Prepend` (strings, sequences)
//! - [`ArithmeticOperator`]: additionally `Add` and `Subtract` (numbers)
//!
//! The `append`/`prepend` constructors only exist for [`Appendable`] fields
//! and `add`/`subtract` only for [`Addable`] ones, so appending to a number
//! or adding to a string does not compile.
//!
//! # Example
//!
//! ```rust
//! use kbase::expression::{UpdateExpression, UpdateOperator};
//!
//! let mut title = String::from("Rust");
//! UpdateExpression::append(String::from(" book")).apply(&mut title);
//! assert_eq!(title, "Rust book");
//!
//! let mut visits = 3_i64;
//! UpdateExpression::subtract(1).apply(&mut visits);
//! assert_eq!(visits, 2);
//!
//! assert_eq!(UpdateExpression::<bool>::clear().operator(), UpdateOperator::Clear);
//! ```
//!
//! ```compile_fail
//! use kbase::expression::UpdateExpression;
//!
//! // numbers are not appendable
//! let _ = UpdateExpression::append(1_i64);
//! ```

use std::fmt;

use chrono::{DateTime, Utc};

/// The full set of update operators, independent of field type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UpdateOperator {
    Set,
    Clear,
    Append,
    Prepend,
    Add,
    Subtract,
}

impl fmt::Display for UpdateOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Set => write!(f, "set"),
            Self::Clear => write!(f, "clear"),
            Self::Append => write!(f, "append"),
            Self::Prepend => write!(f, "prepend"),
            Self::Add => write!(f, "add"),
            Self::Subtract => write!(f, "subtract"),
        }
    }
}

/// An operator family accepted by some set of field types
pub trait FieldOperator: Copy + fmt::Debug + PartialEq + Send + Sync + 'static {
    const SET: Self;
    const CLEAR: Self;

    fn operator(self) -> UpdateOperator;
}

/// Operators valid for every field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarOperator {
    Set,
    Clear,
}

/// Operators for string-like and sequence fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConcatOperator {
    Set,
    Clear,
    Append,
    Prepend,
}

/// Operators for numeric fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArithmeticOperator {
    Set,
    Clear,
    Add,
    Subtract,
}

impl FieldOperator for ScalarOperator {
    const SET: Self = Self::Set;
    const CLEAR: Self = Self::Clear;

    fn operator(self) -> UpdateOperator {
        match self {
            Self::Set => UpdateOperator::Set,
            Self::Clear => UpdateOperator::Clear,
        }
    }
}

impl FieldOperator for ConcatOperator {
    const SET: Self = Self::Set;
    const CLEAR: Self = Self::Clear;

    fn operator(self) -> UpdateOperator {
        match self {
            Self::Set => UpdateOperator::Set,
            Self::Clear => UpdateOperator::Clear,
            Self::Append => UpdateOperator::Append,
            Self::Prepend => UpdateOperator::Prepend,
        }
    }
}

impl FieldOperator for ArithmeticOperator {
    const SET: Self = Self::Set;
    const CLEAR: Self = Self::Clear;

    fn operator(self) -> UpdateOperator {
        match self {
            Self::Set => UpdateOperator::Set,
            Self::Clear => UpdateOperator::Clear,
            Self::Add => UpdateOperator::Add,
            Self::Subtract => UpdateOperator::Subtract,
        }
    }
}

/// A value type that can be the target of an [`UpdateExpression`]
///
/// `Clear` resets the field to `Default::default()`.
pub trait Field: Clone + Default + Send + Sync {
    type Operator: FieldOperator;

    fn apply(&mut self, operator: Self::Operator, operand: &Self);
}

/// Fields that support `Append` and `Prepend`
pub trait Appendable: Field<Operator = ConcatOperator> {}

impl<T: Field<Operator = ConcatOperator>> Appendable for T {}

/// Fields that support `Add` and `Subtract`
pub trait Addable: Field<Operator = ArithmeticOperator> {}

impl<T: Field<Operator = ArithmeticOperator>> Addable for T {}

macro_rules! scalar_field {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Field for $ty {
                type Operator = ScalarOperator;

                fn apply(&mut self, operator: ScalarOperator, operand: &Self) {
                    match operator {
                        ScalarOperator::Set => *self = operand.clone(),
                        ScalarOperator::Clear => *self = Self::default(),
                    }
                }
            }
        )*
    };
}

scalar_field!(bool, DateTime<Utc>);

macro_rules! integer_field {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Field for $ty {
                type Operator = ArithmeticOperator;

                fn apply(&mut self, operator: ArithmeticOperator, operand: &Self) {
                    match operator {
                        ArithmeticOperator::Set => *self = *operand,
                        ArithmeticOperator::Clear => *self = 0,
                        ArithmeticOperator::Add => *self = self.saturating_add(*operand),
                        ArithmeticOperator::Subtract => *self = self.saturating_sub(*operand),
                    }
                }
            }
        )*
    };
}

integer_field!(i32, i64, u32, u64);

impl Field for f64 {
    type Operator = ArithmeticOperator;

    fn apply(&mut self, operator: ArithmeticOperator, operand: &Self) {
        match operator {
            ArithmeticOperator::Set => *self = *operand,
            ArithmeticOperator::Clear => *self = 0.0,
            ArithmeticOperator::Add => *self += *operand,
            ArithmeticOperator::Subtract => *self -= *operand,
        }
    }
}

impl<T: Clone + Send + Sync> Field for Option<T> {
    type Operator = ScalarOperator;

    fn apply(&mut self, operator: ScalarOperator, operand: &Self) {
        match operator {
            ScalarOperator::Set => *self = operand.clone(),
            ScalarOperator::Clear => *self = None,
        }
    }
}

impl Field for String {
    type Operator = ConcatOperator;

    fn apply(&mut self, operator: ConcatOperator, operand: &Self) {
        match operator {
            ConcatOperator::Set => self.clone_from(operand),
            ConcatOperator::Clear => self.clear(),
            ConcatOperator::Append => self.push_str(operand),
            ConcatOperator::Prepend => self.insert_str(0, operand),
        }
    }
}

impl<T: Clone + Send + Sync> Field for Vec<T> {
    type Operator = ConcatOperator;

    fn apply(&mut self, operator: ConcatOperator, operand: &Self) {
        match operator {
            ConcatOperator::Set => self.clone_from(operand),
            ConcatOperator::Clear => self.clear(),
            ConcatOperator::Append => self.extend(operand.iter().cloned()),
            ConcatOperator::Prepend => {
                self.splice(0..0, operand.iter().cloned());
            }
        }
    }
}

/// A mutation of a single field of type `T`
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateExpression<T: Field> {
    operator: T::Operator,
    operand: T,
}

impl<T: Field> UpdateExpression<T> {
    /// Build an expression from a family operator chosen at runtime
    pub fn new(operator: T::Operator, operand: T) -> Self {
        Self { operator, operand }
    }

    pub fn set(value: T) -> Self {
        Self::new(<T::Operator as FieldOperator>::SET, value)
    }

    pub fn clear() -> Self {
        Self::new(<T::Operator as FieldOperator>::CLEAR, T::default())
    }

    pub fn operator(&self) -> UpdateOperator {
        self.operator.operator()
    }

    pub fn field_operator(&self) -> T::Operator {
        self.operator
    }

    pub fn operand(&self) -> &T {
        &self.operand
    }

    pub fn into_parts(self) -> (T::Operator, T) {
        (self.operator, self.operand)
    }

    /// Apply the mutation to `target` in place
    pub fn apply(&self, target: &mut T) {
        target.apply(self.operator, &self.operand);
    }
}

impl<T: Appendable> UpdateExpression<T> {
    pub fn append(value: T) -> Self {
        Self::new(ConcatOperator::Append, value)
    }

    pub fn prepend(value: T) -> Self {
        Self::new(ConcatOperator::Prepend, value)
    }
}

impl<T: Addable> UpdateExpression<T> {
    pub fn add(value: T) -> Self {
        Self::new(ArithmeticOperator::Add, value)
    }

    pub fn subtract(value: T) -> Self {
        Self::new(ArithmeticOperator::Subtract, value)
    }
}

/// Apply an optional update to a field
pub fn apply_optional<T: Field>(update: Option<&UpdateExpression<T>>, target: &mut T) {
    if let Some(update) = update {
        update.apply(target);
    }
}

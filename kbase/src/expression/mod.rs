//! Generic filter and update expressions
//!
//! Every repository describes "which records" with a [`FilterExpression`]
//! per field and "what to change" with an [`UpdateExpression`] per field.
//! Both are typed over the field's value type; [`convert_filter`] and
//! [`convert_update`] re-type them between domain and storage values.

mod convert;
mod filter;
mod update;

pub use convert::{convert_filter, convert_filter_ref, convert_update};
pub use filter::{ExpressionError, FilterExpression, FilterOperator, Leaves, Operand, OperandKind};
pub use update::{
    apply_optional, Addable, Appendable, ArithmeticOperator, ConcatOperator, Field, FieldOperator,
    ScalarOperator, UpdateExpression, UpdateOperator,
};

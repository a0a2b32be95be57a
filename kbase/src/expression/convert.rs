//! Structure-preserving re-typing of expressions
//!
//! Repositories receive filters and updates typed over domain values
//! (`DateTime<Utc>`, tag names, type names) and need them typed over storage
//! values (epoch milliseconds, ids). The functions here rebuild an expression
//! with a per-leaf conversion, keeping every operator and the tree shape.
//! The first failing leaf aborts the conversion.

use super::filter::{FilterExpression, Operand};
use super::update::{Field, UpdateExpression};

/// Re-type a filter expression leaf by leaf
///
/// # Example
///
/// ```rust
/// use kbase::expression::{convert_filter, FilterExpression};
///
/// let years = FilterExpression::between(2001_i64, 2010).or(FilterExpression::eq(2020));
/// let text = convert_filter(years, |year| Ok::<_, ()>(year.to_string())).unwrap();
/// assert_eq!(text.leaves().cloned().collect::<Vec<_>>(), ["2001", "2010", "2020"]);
/// ```
pub fn convert_filter<TIn, TOut, E, F>(
    expr: FilterExpression<TIn>,
    mut leaf: F,
) -> Result<FilterExpression<TOut>, E>
where
    F: FnMut(TIn) -> Result<TOut, E>,
{
    convert_node(expr, &mut leaf)
}

fn convert_node<TIn, TOut, E, F>(
    expr: FilterExpression<TIn>,
    leaf: &mut F,
) -> Result<FilterExpression<TOut>, E>
where
    F: FnMut(TIn) -> Result<TOut, E>,
{
    let (operator, operand) = expr.into_parts();
    let operand = match operand {
        Operand::Scalar(value) => Operand::Scalar(leaf(value)?),
        Operand::Range(low, high) => {
            let low = leaf(low)?;
            Operand::Range(low, leaf(high)?)
        }
        Operand::List(values) => Operand::List(
            values
                .into_iter()
                .map(&mut *leaf)
                .collect::<Result<Vec<_>, E>>()?,
        ),
        Operand::Compound(lhs, rhs) => {
            let lhs = convert_node(*lhs, leaf)?;
            Operand::Compound(Box::new(lhs), Box::new(convert_node(*rhs, leaf)?))
        }
    };
    // The operand keeps the shape it had, so the pairing stays valid.
    Ok(FilterExpression::from_parts(operator, operand))
}

/// Re-type a filter expression through a borrowed leaf conversion
pub fn convert_filter_ref<TIn, TOut, E, F>(
    expr: &FilterExpression<TIn>,
    mut leaf: F,
) -> Result<FilterExpression<TOut>, E>
where
    TIn: Clone,
    F: FnMut(&TIn) -> Result<TOut, E>,
{
    convert_filter(expr.clone(), |value| leaf(&value))
}

/// Re-type an update expression
///
/// The target type must accept the same operator family as the source, so an
/// `append` on a string can become an `append` on a list but never an `add`.
pub fn convert_update<TIn, TOut, E, F>(
    expr: UpdateExpression<TIn>,
    leaf: F,
) -> Result<UpdateExpression<TOut>, E>
where
    TIn: Field,
    TOut: Field<Operator = TIn::Operator>,
    F: FnOnce(TIn) -> Result<TOut, E>,
{
    let (operator, operand) = expr.into_parts();
    Ok(UpdateExpression::new(operator, leaf(operand)?))
}

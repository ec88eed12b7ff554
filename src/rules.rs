//! Rule Predicate Combinator
//!
//! Logical `ALL`/`ANY` combinators over nested predicate expressions, with
//! atoms handed to a caller-supplied evaluator. Expressions are plain JSON
//! so rule files can carry them:
//!
//! ```text
//! ["ALL", [atom, ["ANY", [atom, atom]], atom]]
//! ```
//!
//! There is no data to evaluate "against"; if the atoms need context, close
//! over it in the evaluator.
//!
//! The top-level expression is parsed strictly (anything malformed is
//! [`BadPattern`](crate::types::DredgeError::BadPattern)); nested items that
//! do not parse as expressions simply go to the atom evaluator.

use serde_json::Value;

use crate::types::{DredgeError, Result};

/// The two combinators. `All` over an empty item list is true, `Any` is
/// false.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleOp {
    All,
    Any,
}

impl RuleOp {
    fn parse(value: &Value) -> Option<Self> {
        match value.as_str()? {
            "ALL" => Some(Self::All),
            "ANY" => Some(Self::Any),
            _ => None,
        }
    }
}

/// Evaluate a predicate expression with `atom_ok` deciding each atom.
pub fn rule_match<F>(expr: &Value, atom_ok: &F) -> Result<bool>
where
    F: Fn(&Value) -> bool,
{
    let (op, items) = parse_strict(expr)?;
    Ok(eval(op, items, atom_ok))
}

fn parse_strict(expr: &Value) -> Result<(RuleOp, &[Value])> {
    let pair = expr
        .as_array()
        .ok_or_else(|| DredgeError::bad_pattern(format!("expression is not an array: {expr}")))?;
    let [op_tag, items] = pair.as_slice() else {
        return Err(DredgeError::bad_pattern(format!(
            "expression must be [op, items]: {expr}"
        )));
    };
    let op = RuleOp::parse(op_tag)
        .ok_or_else(|| DredgeError::bad_pattern(format!("unknown operator: {op_tag}")))?;
    let items = items
        .as_array()
        .ok_or_else(|| DredgeError::bad_pattern(format!("items must be an array: {items}")))?;
    Ok((op, items))
}

fn parse_lenient(expr: &Value) -> Option<(RuleOp, &[Value])> {
    let pair = expr.as_array()?;
    let [op_tag, items] = pair.as_slice() else {
        return None;
    };
    Some((RuleOp::parse(op_tag)?, items.as_array()?.as_slice()))
}

fn eval<F>(op: RuleOp, items: &[Value], atom_ok: &F) -> bool
where
    F: Fn(&Value) -> bool,
{
    let check = |item: &Value| match parse_lenient(item) {
        Some((sub_op, sub_items)) => eval(sub_op, sub_items, atom_ok),
        None => atom_ok(item),
    };
    match op {
        RuleOp::All => items.iter().all(check),
        RuleOp::Any => items.iter().any(check),
    }
}

// =============================================================================
// Tests
// =============================================================================

//! The op-conversion registry: tensor op → block op rewrite rules.
//!
//! A conversion receives the (already tile-substituted) arguments of a
//! tensor-op call and answers with prologue statements plus a result
//! expression. Simple rules are synthesized from a name mapping; custom
//! rules may stage data through other memory spaces before the final op.
//! Re-registering a name replaces the previous rule (override semantics);
//! like [`tessera_ir::op`], the table is `thread_local` and built on first
//! access, and overrides must happen before any pipeline runs.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use tessera_ir::{ExprRef, Kwargs, Span, StmtRef, op};

use crate::error::Result;

/// What one conversion produced.
pub struct ConversionResult {
    /// Statements to insert before the rewritten assignment.
    pub prologue: Vec<StmtRef>,
    /// The result expression (typically a block-op call).
    pub result: ExprRef,
}

impl ConversionResult {
    /// Simple case: a single expression, no prologue.
    pub fn expr(result: ExprRef) -> Self {
        Self { prologue: Vec::new(), result }
    }

    /// Complex case: prologue statements plus the final expression.
    pub fn with_prologue(prologue: Vec<StmtRef>, result: ExprRef) -> Self {
        Self { prologue, result }
    }
}

/// Conversion rule: `(substituted args, original kwargs, span) → result`.
pub type ConversionFn = Rc<dyn Fn(&[ExprRef], &Kwargs, &Span) -> Result<ConversionResult>>;

thread_local! {
    static CONVERSIONS: RefCell<Option<HashMap<String, ConversionFn>>> = const { RefCell::new(None) };
}

fn with_conversions<R>(f: impl FnOnce(&mut HashMap<String, ConversionFn>) -> R) -> R {
    CONVERSIONS.with(|conversions| {
        let mut conversions = conversions.borrow_mut();
        let table = conversions.get_or_insert_with(baseline_table);
        f(table)
    })
}

/// Register a name mapping: the synthesized rule calls the target op with
/// the same args and kwargs. Replaces any previous rule for `from_op`.
pub fn register_simple(from_op: &str, to_op: &str) {
    let rule = simple_rule(to_op);
    with_conversions(|table| {
        table.insert(from_op.to_string(), rule);
    });
}

/// Register an arbitrary conversion. Replaces any previous rule.
pub fn register_custom(from_op: &str, func: ConversionFn) {
    with_conversions(|table| {
        table.insert(from_op.to_string(), func);
    });
}

pub fn lookup(op_name: &str) -> Option<ConversionFn> {
    with_conversions(|table| table.get(op_name).cloned())
}

pub fn has_conversion(op_name: &str) -> bool {
    with_conversions(|table| table.contains_key(op_name))
}

/// Drop every rule and re-install the baseline on next access. Test hook.
pub fn reset() {
    CONVERSIONS.with(|conversions| {
        *conversions.borrow_mut() = None;
    });
}

fn simple_rule(to_op: &str) -> ConversionFn {
    let to_op = to_op.to_string();
    Rc::new(move |args, kwargs, span| {
        let call = op::create(&to_op, args.to_vec(), kwargs.clone(), span.clone())?;
        Ok(ConversionResult::expr(call))
    })
}

/// Baseline simple mappings, installed at construction.
fn baseline_table() -> HashMap<String, ConversionFn> {
    let mappings = [
        // Elementwise binary ops
        ("tensor.add", "block.add"),
        ("tensor.sub", "block.sub"),
        ("tensor.mul", "block.mul"),
        ("tensor.div", "block.div"),
        ("tensor.maximum", "block.maximum"),
        // Scalar-broadcast ops
        ("tensor.add_scalar", "block.adds"),
        ("tensor.sub_scalar", "block.subs"),
        ("tensor.mul_scalar", "block.muls"),
        ("tensor.div_scalar", "block.divs"),
        // Unary ops
        ("tensor.exp", "block.exp"),
        ("tensor.cast", "block.cast"),
        // Transform ops
        ("tensor.reshape", "block.reshape"),
        ("tensor.transpose", "block.transpose"),
    ];
    mappings
        .into_iter()
        .map(|(from, to)| (from.to_string(), simple_rule(to)))
        .collect()
}

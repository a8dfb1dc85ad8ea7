//! Typed, immutable, reference-shared IR for tensor kernels.
//!
//! The IR is a tree of [`Rc`]-shared nodes: expressions ([`expr`]), statements
//! ([`stmt`]), functions and programs ([`func`]), and types ([`types`]).
//! Transformations never mutate nodes; they build new ones and share every
//! unchanged subtree, so the in-memory form is a DAG (acyclic by
//! construction, no child-to-parent edges).
//!
//! # Module Organization
//!
//! - [`span`] - source locations
//! - [`types`] - scalar/tensor/tile/tuple/function types
//! - [`expr`] / [`stmt`] / [`func`] - the node categories
//! - [`op`] - the process-wide operator registry (`tensor.*`, `block.*`)
//! - [`reflect`] - per-node field descriptors driving comparison and
//!   serialization order
//! - [`structural`] - structural equality and hashing with optional
//!   α-equivalence
//! - [`visit`] - visitor/mutator traversal scaffold

use std::cell::Cell;

pub mod error;
pub mod expr;
pub mod func;
pub mod op;
pub mod reflect;
pub mod span;
pub mod stmt;
pub mod structural;
pub mod types;
pub mod visit;

#[cfg(test)]
pub mod test;

pub use error::{Error, Result};
pub use expr::{BinaryOp, Call, Callee, Expr, ExprRef, IterArg, KwValue, Kwargs, MemRef, UnaryOp, Var, VarRef};
pub use func::{FuncRef, Function, FunctionKind, GlobalVar, GlobalVarRef, Program, ProgramRef};
pub use span::Span;
pub use stmt::{Stmt, StmtRef};
pub use structural::{NodeRef, assert_structural_equal, structural_equal, structural_hash};
pub use types::{TileView, Type, TypeRef};
pub use visit::{
    Mutator, VarSubstituter, Visitor, fold_expr, fold_function, fold_program, fold_stmt, walk_expr,
    walk_function, walk_program, walk_stmt,
};

// Thread-local counter for node identity numbers (Var, MemRef).
//
// Cell is !Send + !Sync, matching the single-threaded-per-pipeline model:
// nodes built on one thread stay on that thread, and no atomics are paid for.
thread_local! {
    static NODE_ID_COUNTER: Cell<u64> = const { Cell::new(0) };
}

pub(crate) fn next_node_id() -> u64 {
    NODE_ID_COUNTER.with(|counter| {
        let id = counter.get();
        counter.set(id + 1);
        id
    })
}

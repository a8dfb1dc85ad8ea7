//! Statement-structure normalization and its inverse.
//!
//! `normalize_stmt_structure` makes every function/if/for body a `Seq`
//! (splicing directly nested `Seq`s); `flatten_single_stmt` unwraps
//! single-statement `Seq` blocks recursively. The two passes invalidate
//! each other's property, as recorded in their contracts.

use std::rc::Rc;

use tessera_ir::{Function, Stmt, StmtRef};

use crate::error::Result;
use crate::pass::{Pass, create_function_pass};
use crate::property::{FLATTEN_SINGLE_STMT_PROPERTIES, NORMALIZE_STMT_STRUCTURE_PROPERTIES};

pub fn normalize_stmt_structure() -> Pass {
    create_function_pass("NormalizeStmtStructure", NORMALIZE_STMT_STRUCTURE_PROPERTIES, |func| {
        let new_body = normalize_body(&func.body)?;
        if Rc::ptr_eq(&new_body, &func.body) {
            return Ok(func.clone());
        }
        Ok(Function::new(
            func.name.clone(),
            func.params.clone(),
            func.return_types.clone(),
            new_body,
            func.span.clone(),
            func.kind,
        ))
    })
}

pub fn flatten_single_stmt() -> Pass {
    create_function_pass("FlattenSingleStmt", FLATTEN_SINGLE_STMT_PROPERTIES, |func| {
        let new_body = flatten(&func.body)?;
        if Rc::ptr_eq(&new_body, &func.body) {
            return Ok(func.clone());
        }
        Ok(Function::new(
            func.name.clone(),
            func.params.clone(),
            func.return_types.clone(),
            new_body,
            func.span.clone(),
            func.kind,
        ))
    })
}

/// Normalize a body position: always a `Seq` whose children are normalized
/// statements, with directly nested `Seq`s spliced in.
fn normalize_body(stmt: &StmtRef) -> Result<StmtRef> {
    match &**stmt {
        Stmt::Seq { stmts, span } => {
            let mut new_stmts = Vec::with_capacity(stmts.len());
            let mut changed = false;
            for stmt in stmts {
                let normalized = normalize_stmt(stmt)?;
                if let Stmt::Seq { stmts: inner, .. } = &*normalized {
                    changed = true;
                    new_stmts.extend(inner.iter().cloned());
                } else {
                    changed |= !Rc::ptr_eq(&normalized, stmt);
                    new_stmts.push(normalized);
                }
            }
            if !changed {
                return Ok(stmt.clone());
            }
            Ok(Stmt::seq(new_stmts, span.clone()))
        }
        _ => {
            let normalized = normalize_stmt(stmt)?;
            // A non-Seq body gains a wrapping Seq; a spliced Seq is reused.
            if let Stmt::Seq { .. } = &*normalized {
                Ok(normalized)
            } else {
                Ok(Stmt::seq(vec![normalized], stmt.span()))
            }
        }
    }
}

fn normalize_stmt(stmt: &StmtRef) -> Result<StmtRef> {
    match &**stmt {
        Stmt::If { cond, then_body, else_body, span } => {
            let new_then = normalize_body(then_body)?;
            let new_else = match else_body {
                Some(else_body) => Some(normalize_body(else_body)?),
                None => None,
            };
            let unchanged = Rc::ptr_eq(&new_then, then_body)
                && match (&new_else, else_body) {
                    (Some(a), Some(b)) => Rc::ptr_eq(a, b),
                    (None, None) => true,
                    _ => false,
                };
            if unchanged {
                return Ok(stmt.clone());
            }
            Ok(Stmt::if_(cond.clone(), new_then, new_else, span.clone()))
        }
        Stmt::For { loop_var, start, stop, step, iter_args, body, span } => {
            let new_body = normalize_body(body)?;
            if Rc::ptr_eq(&new_body, body) {
                return Ok(stmt.clone());
            }
            Ok(Stmt::for_(
                loop_var.clone(),
                start.clone(),
                stop.clone(),
                step.clone(),
                iter_args.clone(),
                new_body,
                span.clone(),
            ))
        }
        Stmt::Seq { .. } => normalize_body(stmt),
        _ => Ok(stmt.clone()),
    }
}

/// Bottom-up unwrap of single-statement `Seq` blocks.
fn flatten(stmt: &StmtRef) -> Result<StmtRef> {
    match &**stmt {
        Stmt::Seq { stmts, span } => {
            let mut new_stmts = Vec::with_capacity(stmts.len());
            let mut changed = false;
            for stmt in stmts {
                let flattened = flatten(stmt)?;
                changed |= !Rc::ptr_eq(&flattened, stmt);
                new_stmts.push(flattened);
            }
            if new_stmts.len() == 1 {
                return Ok(new_stmts.pop().expect("length checked"));
            }
            if !changed {
                return Ok(stmt.clone());
            }
            Ok(Stmt::seq(new_stmts, span.clone()))
        }
        Stmt::If { cond, then_body, else_body, span } => {
            let new_then = flatten(then_body)?;
            let new_else = match else_body {
                Some(else_body) => Some(flatten(else_body)?),
                None => None,
            };
            let unchanged = Rc::ptr_eq(&new_then, then_body)
                && match (&new_else, else_body) {
                    (Some(a), Some(b)) => Rc::ptr_eq(a, b),
                    (None, None) => true,
                    _ => false,
                };
            if unchanged {
                return Ok(stmt.clone());
            }
            Ok(Stmt::if_(cond.clone(), new_then, new_else, span.clone()))
        }
        Stmt::For { loop_var, start, stop, step, iter_args, body, span } => {
            let new_body = flatten(body)?;
            if Rc::ptr_eq(&new_body, body) {
                return Ok(stmt.clone());
            }
            Ok(Stmt::for_(
                loop_var.clone(),
                start.clone(),
                stop.clone(),
                step.clone(),
                iter_args.clone(),
                new_body,
                span.clone(),
            ))
        }
        _ => Ok(stmt.clone()),
    }
}

//! SSA conversion: every variable assigned exactly once.
//!
//! Re-assignments of a name introduce a fresh, numbered variable
//! (`x` → `x_1`, `x_2`, ...); subsequent uses of the name resolve to the
//! latest version. A loop body is renamed with the surrounding context's
//! map (loop-carried values go through the explicit `IterArg` binders).
//! The two arms of an `If` each rename against a fork of the incoming
//! state and are rejoined afterwards: a name rebound in one arm propagates,
//! a name rebound in both arms would need a merge construct the IR does not
//! have and fails the pass.

use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use tessera_ir::{ExprRef, Function, IterArg, Stmt, StmtRef, Var, VarRef, VarSubstituter};

use crate::error::{self, Result};
use crate::pass::{Pass, create_function_pass};
use crate::property::CONVERT_TO_SSA_PROPERTIES;

const PASS_NAME: &str = "ConvertToSSA";

pub fn convert_to_ssa() -> Pass {
    create_function_pass(PASS_NAME, CONVERT_TO_SSA_PROPERTIES, |func| {
        let mut ctx = RenameCtx::default();
        for param in &func.params {
            ctx.declare(param.clone());
        }

        let new_body = ctx.rewrite_stmt(&func.body)?;
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

#[derive(Default)]
struct RenameCtx {
    /// Source name → current version of the variable.
    current: HashMap<String, VarRef>,
    /// Every name that holds a definition, including generated versions.
    defined: HashSet<String>,
}

impl RenameCtx {
    /// First definition of a name: no renaming needed.
    fn declare(&mut self, var: VarRef) {
        self.defined.insert(var.name.clone());
        self.current.insert(var.name.clone(), var);
    }

    /// Definition of `var`; returns the variable to bind, renaming when the
    /// name is already taken.
    fn define(&mut self, var: &VarRef) -> VarRef {
        if !self.defined.contains(&var.name) {
            self.declare(var.clone());
            return var.clone();
        }
        let mut version = 1;
        let fresh_name = loop {
            let candidate = format!("{}_{version}", var.name);
            if !self.defined.contains(&candidate) {
                break candidate;
            }
            version += 1;
        };
        let fresh = Var::new(fresh_name, var.ty.clone(), var.span.clone());
        self.defined.insert(fresh.name.clone());
        // Later uses of the source name resolve to this version.
        self.current.insert(var.name.clone(), fresh.clone());
        fresh
    }

    fn fork(&self) -> RenameCtx {
        RenameCtx { current: self.current.clone(), defined: self.defined.clone() }
    }

    /// Rejoin the arm states of an `If`. A rebinding performed by exactly
    /// one arm propagates; a name rebound in both arms has no merge
    /// construct in the IR, so emitting either binding would be wrong on
    /// the other execution path.
    fn merge_branches(&mut self, then_ctx: RenameCtx, else_ctx: RenameCtx) -> Result<()> {
        let mut names: Vec<&String> =
            then_ctx.current.keys().chain(else_ctx.current.keys()).collect();
        names.sort();
        names.dedup();

        for name in names {
            let pre = self.current.get(name).map(|var| var.id());
            let then_var = then_ctx.current.get(name);
            let else_var = else_ctx.current.get(name);
            let then_changed = then_var.is_some_and(|var| Some(var.id()) != pre);
            let else_changed = else_var.is_some_and(|var| Some(var.id()) != pre);
            match (then_changed, else_changed) {
                (true, true) => {
                    return error::InternalCheckSnafu {
                        pass: PASS_NAME,
                        message: format!(
                            "variable '{name}' is bound in both arms of an if statement; \
                             the IR has no construct to merge branch definitions"
                        ),
                    }
                    .fail();
                }
                (true, false) => {
                    let bound = then_var.expect("changed binding exists").clone();
                    self.current.insert(name.clone(), bound);
                }
                (false, true) => {
                    let bound = else_var.expect("changed binding exists").clone();
                    self.current.insert(name.clone(), bound);
                }
                (false, false) => {}
            }
        }

        // Names consumed by either arm stay reserved for later renames.
        self.defined.extend(then_ctx.defined);
        self.defined.extend(else_ctx.defined);
        Ok(())
    }

    fn rewrite_expr(&self, expr: &ExprRef) -> Result<ExprRef> {
        Ok(VarSubstituter::new(&self.current).substitute(expr)?)
    }

    fn rewrite_stmt(&mut self, stmt: &StmtRef) -> Result<StmtRef> {
        match &**stmt {
            Stmt::Assign { var, value, span } => {
                let new_value = self.rewrite_expr(value)?;
                let new_var = self.define(var);
                if Rc::ptr_eq(&new_var, var) && Rc::ptr_eq(&new_value, value) {
                    return Ok(stmt.clone());
                }
                Ok(Stmt::assign(new_var, new_value, span.clone())?)
            }
            Stmt::Eval { expr, span } => {
                let new_expr = self.rewrite_expr(expr)?;
                if Rc::ptr_eq(&new_expr, expr) {
                    return Ok(stmt.clone());
                }
                Ok(Stmt::eval(new_expr, span.clone()))
            }
            Stmt::Return { values, span } => {
                let mut new_values = Vec::with_capacity(values.len());
                let mut changed = false;
                for value in values {
                    let rewritten = self.rewrite_expr(value)?;
                    changed |= !Rc::ptr_eq(&rewritten, value);
                    new_values.push(rewritten);
                }
                if !changed {
                    return Ok(stmt.clone());
                }
                Ok(Stmt::ret(new_values, span.clone()))
            }
            Stmt::If { cond, then_body, else_body, span } => {
                let new_cond = self.rewrite_expr(cond)?;
                // Both arms start from the pre-branch state; neither sees
                // the other's renames.
                let mut then_ctx = self.fork();
                let new_then = then_ctx.rewrite_stmt(then_body)?;
                let mut else_ctx = self.fork();
                let new_else = match else_body {
                    Some(else_body) => Some(else_ctx.rewrite_stmt(else_body)?),
                    None => None,
                };
                self.merge_branches(then_ctx, else_ctx)?;
                let unchanged = Rc::ptr_eq(&new_cond, cond)
                    && Rc::ptr_eq(&new_then, then_body)
                    && match (&new_else, else_body) {
                        (Some(a), Some(b)) => Rc::ptr_eq(a, b),
                        (None, None) => true,
                        _ => false,
                    };
                if unchanged {
                    return Ok(stmt.clone());
                }
                Ok(Stmt::if_(new_cond, new_then, new_else, span.clone()))
            }
            Stmt::For { loop_var, start, stop, step, iter_args, body, span } => {
                let new_start = self.rewrite_expr(start)?;
                let new_stop = self.rewrite_expr(stop)?;
                let new_step = self.rewrite_expr(step)?;
                let new_loop_var = self.define(loop_var);
                let mut new_iter_args = Vec::with_capacity(iter_args.len());
                let mut args_changed = false;
                for arg in iter_args {
                    let new_init = self.rewrite_expr(&arg.init)?;
                    let new_var = self.define(&arg.var);
                    if Rc::ptr_eq(&new_var, &arg.var) && Rc::ptr_eq(&new_init, &arg.init) {
                        new_iter_args.push(arg.clone());
                    } else {
                        args_changed = true;
                        new_iter_args.push(IterArg::new(new_var, new_init, arg.span.clone()));
                    }
                }
                let new_body = self.rewrite_stmt(body)?;
                let unchanged = Rc::ptr_eq(&new_loop_var, loop_var)
                    && Rc::ptr_eq(&new_start, start)
                    && Rc::ptr_eq(&new_stop, stop)
                    && Rc::ptr_eq(&new_step, step)
                    && !args_changed
                    && Rc::ptr_eq(&new_body, body);
                if unchanged {
                    return Ok(stmt.clone());
                }
                Ok(Stmt::for_(
                    new_loop_var,
                    new_start,
                    new_stop,
                    new_step,
                    new_iter_args,
                    new_body,
                    span.clone(),
                ))
            }
            Stmt::Seq { stmts, span } => {
                let mut new_stmts = Vec::with_capacity(stmts.len());
                let mut changed = false;
                for stmt in stmts {
                    let rewritten = self.rewrite_stmt(stmt)?;
                    changed |= !Rc::ptr_eq(&rewritten, stmt);
                    new_stmts.push(rewritten);
                }
                if !changed {
                    return Ok(stmt.clone());
                }
                Ok(Stmt::seq(new_stmts, span.clone()))
            }
        }
    }
}

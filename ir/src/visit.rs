//! Generic traversal scaffold: read-only visitors and rebuilding mutators.
//!
//! [`Visitor`] walks the tree pre-order: override a `visit_*` method, match
//! on the node kind you care about, and call the corresponding `walk_*`
//! function to recurse into children.
//!
//! [`Mutator`] rebuilds bottom-up. Reconstruction is identity-preserving:
//! when every child comes back pointer-equal the original node is returned,
//! so unchanged subtrees stay shared across the old and new trees.
//! The generic fold is type-preserving; passes that change a node's type
//! rebuild the affected nodes themselves.

use std::collections::HashMap;
use std::rc::Rc;

use crate::error::Result;
use crate::expr::{Call, Expr, ExprRef, IterArg, VarRef};
use crate::func::{FuncRef, Function, Program, ProgramRef};
use crate::stmt::{Stmt, StmtRef};

/// Read-only pre-order traversal.
pub trait Visitor {
    fn visit_program(&mut self, program: &ProgramRef) {
        walk_program(self, program);
    }

    fn visit_function(&mut self, func: &FuncRef) {
        walk_function(self, func);
    }

    fn visit_stmt(&mut self, stmt: &StmtRef) {
        walk_stmt(self, stmt);
    }

    fn visit_expr(&mut self, expr: &ExprRef) {
        walk_expr(self, expr);
    }
}

pub fn walk_program<V: Visitor + ?Sized>(v: &mut V, program: &ProgramRef) {
    for (_, func) in program.functions() {
        v.visit_function(func);
    }
}

pub fn walk_function<V: Visitor + ?Sized>(v: &mut V, func: &FuncRef) {
    v.visit_stmt(&func.body);
}

pub fn walk_stmt<V: Visitor + ?Sized>(v: &mut V, stmt: &StmtRef) {
    match &**stmt {
        Stmt::Assign { value, .. } => v.visit_expr(value),
        Stmt::Eval { expr, .. } => v.visit_expr(expr),
        Stmt::Return { values, .. } => {
            for value in values {
                v.visit_expr(value);
            }
        }
        Stmt::If { cond, then_body, else_body, .. } => {
            v.visit_expr(cond);
            v.visit_stmt(then_body);
            if let Some(else_body) = else_body {
                v.visit_stmt(else_body);
            }
        }
        Stmt::For { start, stop, step, iter_args, body, .. } => {
            v.visit_expr(start);
            v.visit_expr(stop);
            v.visit_expr(step);
            for arg in iter_args {
                v.visit_expr(&arg.init);
            }
            v.visit_stmt(body);
        }
        Stmt::Seq { stmts, .. } => {
            for stmt in stmts {
                v.visit_stmt(stmt);
            }
        }
    }
}

pub fn walk_expr<V: Visitor + ?Sized>(v: &mut V, expr: &ExprRef) {
    match &**expr {
        Expr::Var(_)
        | Expr::ConstInt { .. }
        | Expr::ConstFloat { .. }
        | Expr::ConstBool { .. }
        | Expr::MemRef(_) => {}
        Expr::IterArg(arg) => v.visit_expr(&arg.init),
        Expr::MakeTuple { elements, .. } => {
            for element in elements {
                v.visit_expr(element);
            }
        }
        Expr::TupleGetItem { tuple, .. } => v.visit_expr(tuple),
        Expr::Call(call) => {
            for arg in &call.args {
                v.visit_expr(arg);
            }
        }
        Expr::Binary { lhs, rhs, .. } => {
            v.visit_expr(lhs);
            v.visit_expr(rhs);
        }
        Expr::Unary { operand, .. } => v.visit_expr(operand),
    }
}

/// Rebuilding bottom-up traversal with structural sharing.
pub trait Mutator {
    fn mutate_program(&mut self, program: &ProgramRef) -> Result<ProgramRef> {
        fold_program(self, program)
    }

    fn mutate_function(&mut self, func: &FuncRef) -> Result<FuncRef> {
        fold_function(self, func)
    }

    fn mutate_stmt(&mut self, stmt: &StmtRef) -> Result<StmtRef> {
        fold_stmt(self, stmt)
    }

    fn mutate_expr(&mut self, expr: &ExprRef) -> Result<ExprRef> {
        fold_expr(self, expr)
    }

    /// Variable rebinding hook; the default keeps definitions unchanged.
    fn mutate_var(&mut self, var: &VarRef) -> Result<VarRef> {
        Ok(var.clone())
    }
}

pub fn fold_program<M: Mutator + ?Sized>(m: &mut M, program: &ProgramRef) -> Result<ProgramRef> {
    let mut functions = Vec::with_capacity(program.len());
    let mut changed = false;
    for (_, func) in program.functions() {
        let folded = m.mutate_function(func)?;
        changed |= !Rc::ptr_eq(&folded, func);
        functions.push(folded);
    }
    if !changed {
        return Ok(program.clone());
    }
    Ok(Program::new(functions, program.name.clone(), program.span.clone()))
}

pub fn fold_function<M: Mutator + ?Sized>(m: &mut M, func: &FuncRef) -> Result<FuncRef> {
    let body = m.mutate_stmt(&func.body)?;
    if Rc::ptr_eq(&body, &func.body) {
        return Ok(func.clone());
    }
    Ok(Function::new(
        func.name.clone(),
        func.params.clone(),
        func.return_types.clone(),
        body,
        func.span.clone(),
        func.kind,
    ))
}

pub fn fold_stmt<M: Mutator + ?Sized>(m: &mut M, stmt: &StmtRef) -> Result<StmtRef> {
    match &**stmt {
        Stmt::Assign { var, value, span } => {
            let new_var = m.mutate_var(var)?;
            let new_value = m.mutate_expr(value)?;
            if Rc::ptr_eq(&new_var, var) && Rc::ptr_eq(&new_value, value) {
                return Ok(stmt.clone());
            }
            Stmt::assign(new_var, new_value, span.clone())
        }
        Stmt::Eval { expr, span } => {
            let new_expr = m.mutate_expr(expr)?;
            if Rc::ptr_eq(&new_expr, expr) {
                return Ok(stmt.clone());
            }
            Ok(Stmt::eval(new_expr, span.clone()))
        }
        Stmt::Return { values, span } => {
            let (new_values, changed) = fold_exprs(m, values)?;
            if !changed {
                return Ok(stmt.clone());
            }
            Ok(Stmt::ret(new_values, span.clone()))
        }
        Stmt::If { cond, then_body, else_body, span } => {
            let new_cond = m.mutate_expr(cond)?;
            let new_then = m.mutate_stmt(then_body)?;
            let new_else = match else_body {
                Some(else_body) => Some(m.mutate_stmt(else_body)?),
                None => None,
            };
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
            let new_loop_var = m.mutate_var(loop_var)?;
            let new_start = m.mutate_expr(start)?;
            let new_stop = m.mutate_expr(stop)?;
            let new_step = m.mutate_expr(step)?;
            let mut new_iter_args = Vec::with_capacity(iter_args.len());
            let mut args_changed = false;
            for arg in iter_args {
                let new_var = m.mutate_var(&arg.var)?;
                let new_init = m.mutate_expr(&arg.init)?;
                if Rc::ptr_eq(&new_var, &arg.var) && Rc::ptr_eq(&new_init, &arg.init) {
                    new_iter_args.push(arg.clone());
                } else {
                    args_changed = true;
                    new_iter_args.push(IterArg::new(new_var, new_init, arg.span.clone()));
                }
            }
            let new_body = m.mutate_stmt(body)?;
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
                let folded = m.mutate_stmt(stmt)?;
                changed |= !Rc::ptr_eq(&folded, stmt);
                new_stmts.push(folded);
            }
            if !changed {
                return Ok(stmt.clone());
            }
            Ok(Stmt::seq(new_stmts, span.clone()))
        }
    }
}

fn fold_exprs<M: Mutator + ?Sized>(m: &mut M, exprs: &[ExprRef]) -> Result<(Vec<ExprRef>, bool)> {
    let mut out = Vec::with_capacity(exprs.len());
    let mut changed = false;
    for expr in exprs {
        let folded = m.mutate_expr(expr)?;
        changed |= !Rc::ptr_eq(&folded, expr);
        out.push(folded);
    }
    Ok((out, changed))
}

pub fn fold_expr<M: Mutator + ?Sized>(m: &mut M, expr: &ExprRef) -> Result<ExprRef> {
    match &**expr {
        Expr::Var(_)
        | Expr::ConstInt { .. }
        | Expr::ConstFloat { .. }
        | Expr::ConstBool { .. }
        | Expr::MemRef(_) => Ok(expr.clone()),
        Expr::IterArg(arg) => {
            let new_init = m.mutate_expr(&arg.init)?;
            if Rc::ptr_eq(&new_init, &arg.init) {
                return Ok(expr.clone());
            }
            Ok(Expr::iter_arg(&IterArg::new(arg.var.clone(), new_init, arg.span.clone())))
        }
        Expr::MakeTuple { elements, span, .. } => {
            let (new_elements, changed) = fold_exprs(m, elements)?;
            if !changed {
                return Ok(expr.clone());
            }
            Ok(Expr::make_tuple(new_elements, span.clone()))
        }
        Expr::TupleGetItem { tuple, index, span, .. } => {
            let new_tuple = m.mutate_expr(tuple)?;
            if Rc::ptr_eq(&new_tuple, tuple) {
                return Ok(expr.clone());
            }
            Expr::tuple_get(new_tuple, *index, span.clone())
        }
        Expr::Call(call) => {
            let (new_args, changed) = fold_exprs(m, &call.args)?;
            if !changed {
                return Ok(expr.clone());
            }
            // The result type is carried through rewrites, as in op creation.
            Ok(Call::with_parts(
                call.callee.clone(),
                new_args,
                call.kwargs.clone(),
                call.ty.clone(),
                call.span.clone(),
            ))
        }
        Expr::Binary { op, lhs, rhs, span, .. } => {
            let new_lhs = m.mutate_expr(lhs)?;
            let new_rhs = m.mutate_expr(rhs)?;
            if Rc::ptr_eq(&new_lhs, lhs) && Rc::ptr_eq(&new_rhs, rhs) {
                return Ok(expr.clone());
            }
            Expr::binary(*op, new_lhs, new_rhs, span.clone())
        }
        Expr::Unary { op, operand, ty, span } => {
            let new_operand = m.mutate_expr(operand)?;
            if Rc::ptr_eq(&new_operand, operand) {
                return Ok(expr.clone());
            }
            match op {
                crate::expr::UnaryOp::Cast => Expr::cast(
                    new_operand,
                    ty.dtype().expect("cast result is scalar"),
                    span.clone(),
                ),
                _ => Expr::unary(*op, new_operand, span.clone()),
            }
        }
    }
}

/// Rebinds variables by name: occurrences of a mapped name are replaced by
/// the mapped variable, both at use sites and (via [`Mutator::mutate_var`])
/// at definition sites. Used by renaming passes such as SSA conversion.
pub struct VarSubstituter<'a> {
    map: &'a HashMap<String, VarRef>,
}

impl<'a> VarSubstituter<'a> {
    pub fn new(map: &'a HashMap<String, VarRef>) -> Self {
        Self { map }
    }

    pub fn substitute(&mut self, expr: &ExprRef) -> Result<ExprRef> {
        self.mutate_expr(expr)
    }
}

impl Mutator for VarSubstituter<'_> {
    fn mutate_expr(&mut self, expr: &ExprRef) -> Result<ExprRef> {
        if let Expr::Var(var) = &**expr
            && let Some(replacement) = self.map.get(&var.name)
            && !Rc::ptr_eq(replacement, var)
        {
            return Ok(Expr::var(replacement));
        }
        fold_expr(self, expr)
    }
}

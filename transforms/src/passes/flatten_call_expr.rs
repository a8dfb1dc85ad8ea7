//! Hoists nested call expressions into fresh temporaries, so that no call
//! has another call anywhere in its argument subtree.
//!
//! `y = f(g(x) + 1)` becomes `_t0 = g(x); y = f(_t0 + 1)`.

use std::rc::Rc;

use tessera_ir::{Call, Expr, ExprRef, Function, IterArg, Stmt, StmtRef, Var};

use crate::error::Result;
use crate::pass::{Pass, create_function_pass};
use crate::property::FLATTEN_CALL_EXPR_PROPERTIES;

pub fn flatten_call_expr() -> Pass {
    create_function_pass("FlattenCallExpr", FLATTEN_CALL_EXPR_PROPERTIES, |func| {
        let mut ctx = HoistCtx { counter: 0 };
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

struct HoistCtx {
    counter: usize,
}

impl HoistCtx {
    fn fresh_temp(&mut self, value: ExprRef, out: &mut Vec<StmtRef>) -> Result<ExprRef> {
        let span = value.span();
        let var = Var::new(format!("_t{}", self.counter), value.ty(), span.clone());
        self.counter += 1;
        out.push(Stmt::assign(var.clone(), value, span)?);
        Ok(Expr::var(&var))
    }

    /// Rebuild `expr` with every call in a nested position hoisted into
    /// `out`. `is_top` marks an expression that may itself stay a call.
    fn extract(&mut self, expr: &ExprRef, is_top: bool, out: &mut Vec<StmtRef>) -> Result<ExprRef> {
        let rebuilt = match &**expr {
            Expr::Call(call) => {
                let mut args = Vec::with_capacity(call.args.len());
                let mut changed = false;
                for arg in &call.args {
                    let extracted = self.extract(arg, false, out)?;
                    changed |= !Rc::ptr_eq(&extracted, arg);
                    args.push(extracted);
                }
                if changed {
                    Call::with_parts(
                        call.callee.clone(),
                        args,
                        call.kwargs.clone(),
                        call.ty.clone(),
                        call.span.clone(),
                    )
                } else {
                    expr.clone()
                }
            }
            Expr::MakeTuple { elements, span, .. } => {
                let mut new_elements = Vec::with_capacity(elements.len());
                let mut changed = false;
                for element in elements {
                    let extracted = self.extract(element, false, out)?;
                    changed |= !Rc::ptr_eq(&extracted, element);
                    new_elements.push(extracted);
                }
                if changed { Expr::make_tuple(new_elements, span.clone()) } else { expr.clone() }
            }
            Expr::TupleGetItem { tuple, index, span, .. } => {
                let new_tuple = self.extract(tuple, false, out)?;
                if Rc::ptr_eq(&new_tuple, tuple) {
                    expr.clone()
                } else {
                    Expr::tuple_get(new_tuple, *index, span.clone())?
                }
            }
            Expr::Binary { op, lhs, rhs, span, .. } => {
                let new_lhs = self.extract(lhs, false, out)?;
                let new_rhs = self.extract(rhs, false, out)?;
                if Rc::ptr_eq(&new_lhs, lhs) && Rc::ptr_eq(&new_rhs, rhs) {
                    expr.clone()
                } else {
                    Expr::binary(*op, new_lhs, new_rhs, span.clone())?
                }
            }
            Expr::Unary { op, operand, ty, span } => {
                let new_operand = self.extract(operand, false, out)?;
                if Rc::ptr_eq(&new_operand, operand) {
                    expr.clone()
                } else if *op == tessera_ir::UnaryOp::Cast {
                    Expr::cast(new_operand, ty.dtype().expect("cast result is scalar"), span.clone())?
                } else {
                    Expr::unary(*op, new_operand, span.clone())?
                }
            }
            _ => expr.clone(),
        };

        if !is_top && matches!(&*rebuilt, Expr::Call(_)) {
            return self.fresh_temp(rebuilt, out);
        }
        Ok(rebuilt)
    }

    fn rewrite_stmt(&mut self, stmt: &StmtRef) -> Result<StmtRef> {
        match &**stmt {
            Stmt::Seq { stmts, span } => {
                let mut new_stmts = Vec::with_capacity(stmts.len());
                let mut changed = false;
                for stmt in stmts {
                    let before = new_stmts.len();
                    let rewritten = self.rewrite_with_hoisting(stmt, &mut new_stmts)?;
                    changed |= before != new_stmts.len() || !Rc::ptr_eq(&rewritten, stmt);
                    new_stmts.push(rewritten);
                }
                if !changed {
                    return Ok(stmt.clone());
                }
                Ok(Stmt::seq(new_stmts, span.clone()))
            }
            // A lone statement may still need hoisted temporaries in front.
            _ => {
                let mut hoisted = Vec::new();
                let rewritten = self.rewrite_with_hoisting(stmt, &mut hoisted)?;
                if hoisted.is_empty() {
                    return Ok(rewritten);
                }
                let span = stmt.span();
                hoisted.push(rewritten);
                Ok(Stmt::seq(hoisted, span))
            }
        }
    }

    fn rewrite_with_hoisting(
        &mut self,
        stmt: &StmtRef,
        out: &mut Vec<StmtRef>,
    ) -> Result<StmtRef> {
        match &**stmt {
            Stmt::Assign { var, value, span } => {
                let new_value = self.extract(value, true, out)?;
                if Rc::ptr_eq(&new_value, value) {
                    return Ok(stmt.clone());
                }
                Ok(Stmt::assign(var.clone(), new_value, span.clone())?)
            }
            Stmt::Eval { expr, span } => {
                let new_expr = self.extract(expr, true, out)?;
                if Rc::ptr_eq(&new_expr, expr) {
                    return Ok(stmt.clone());
                }
                Ok(Stmt::eval(new_expr, span.clone()))
            }
            Stmt::Return { values, span } => {
                let mut new_values = Vec::with_capacity(values.len());
                let mut changed = false;
                for value in values {
                    let extracted = self.extract(value, true, out)?;
                    changed |= !Rc::ptr_eq(&extracted, value);
                    new_values.push(extracted);
                }
                if !changed {
                    return Ok(stmt.clone());
                }
                Ok(Stmt::ret(new_values, span.clone()))
            }
            Stmt::If { cond, then_body, else_body, span } => {
                let new_cond = self.extract(cond, true, out)?;
                let new_then = self.rewrite_stmt(then_body)?;
                let new_else = match else_body {
                    Some(else_body) => Some(self.rewrite_stmt(else_body)?),
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
                let new_start = self.extract(start, true, out)?;
                let new_stop = self.extract(stop, true, out)?;
                let new_step = self.extract(step, true, out)?;
                let mut new_iter_args = Vec::with_capacity(iter_args.len());
                let mut args_changed = false;
                for arg in iter_args {
                    let new_init = self.extract(&arg.init, true, out)?;
                    if Rc::ptr_eq(&new_init, &arg.init) {
                        new_iter_args.push(arg.clone());
                    } else {
                        args_changed = true;
                        new_iter_args.push(IterArg::new(arg.var.clone(), new_init, arg.span.clone()));
                    }
                }
                let new_body = self.rewrite_stmt(body)?;
                let unchanged = Rc::ptr_eq(&new_start, start)
                    && Rc::ptr_eq(&new_stop, stop)
                    && Rc::ptr_eq(&new_step, step)
                    && !args_changed
                    && Rc::ptr_eq(&new_body, body);
                if unchanged {
                    return Ok(stmt.clone());
                }
                Ok(Stmt::for_(
                    loop_var.clone(),
                    new_start,
                    new_stop,
                    new_step,
                    new_iter_args,
                    new_body,
                    span.clone(),
                ))
            }
            Stmt::Seq { .. } => self.rewrite_stmt(stmt),
        }
    }
}

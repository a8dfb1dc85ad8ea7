//! Tensor-op → block-op lowering for InCore functions.
//!
//! Phase 1 rewrites every InCore function: a `block.load` prologue turns
//! each tensor parameter into a tile, convertible tensor ops are replaced
//! through the conversion registry, and returned tiles are stored into
//! appended output tensor parameters. Phase 2 rewrites call sites in the
//! remaining functions, creating the output tensors with `tensor.create`
//! and passing them as extra arguments.
//!
//! Residual tensor ops are not diagnosed here; the `IncoreBlockOps`
//! verifier reports them.

use std::collections::HashMap;
use std::rc::Rc;

use snafu::ensure;

use tessera_dtype::{DataType, MemorySpace};
use tessera_ir::{
    Call, Expr, ExprRef, FuncRef, Function, FunctionKind, KwValue, Program, Span, Stmt, StmtRef,
    Var, VarRef, Visitor, op, walk_expr,
};

use crate::conversion;
use crate::error::{self, Result};
use crate::pass::{Pass, create_program_pass};
use crate::property::CONVERT_TENSOR_TO_BLOCK_OPS_PROPERTIES;

const PASS_NAME: &str = "ConvertTensorToBlockOps";

pub fn convert_tensor_to_block_ops() -> Pass {
    create_program_pass(PASS_NAME, CONVERT_TENSOR_TO_BLOCK_OPS_PROPERTIES, |program| {
        // Phase 1: transform InCore functions.
        let mut added_outputs: HashMap<String, usize> = HashMap::new();
        let mut transformed: HashMap<String, FuncRef> = HashMap::new();
        let mut phase1 = Vec::with_capacity(program.len());

        for (_, func) in program.functions() {
            if func.kind == FunctionKind::InCore {
                let (new_func, num_added) = transform_incore_function(func)?;
                added_outputs.insert(func.name.clone(), num_added);
                transformed.insert(func.name.clone(), new_func.clone());
                phase1.push(new_func);
            } else {
                phase1.push(func.clone());
            }
        }

        // Phase 2: update call sites in non-InCore functions.
        let mut phase2 = Vec::with_capacity(phase1.len());
        for func in phase1 {
            if func.kind != FunctionKind::InCore {
                phase2.push(update_call_sites(&func, &added_outputs, &transformed)?);
            } else {
                phase2.push(func);
            }
        }

        Ok(Program::new(phase2, program.name.clone(), program.span.clone()))
    })
}

/// MakeTuple of INT64 zeros, used as load/store offsets.
fn zero_offsets(ndim: usize, span: &Span) -> ExprRef {
    let zeros = (0..ndim).map(|_| Expr::const_int(0, DataType::Int64, span.clone())).collect();
    Expr::make_tuple(zeros, span.clone())
}

fn shape_tuple(shape: &[ExprRef], span: &Span) -> ExprRef {
    Expr::make_tuple(shape.to_vec(), span.clone())
}

/// Substitute variables by name.
///
/// Recurses through calls, tuples and projections. Binary/unary operands
/// are scalar arithmetic and must never resolve to tensor/tile variables;
/// this is enforced rather than assumed.
fn substitute_expr(expr: &ExprRef, map: &HashMap<String, VarRef>) -> Result<ExprRef> {
    match &**expr {
        Expr::Var(var) => Ok(match map.get(&var.name) {
            Some(replacement) if !Rc::ptr_eq(replacement, var) => Expr::var(replacement),
            _ => expr.clone(),
        }),
        Expr::Call(call) => {
            let mut args = Vec::with_capacity(call.args.len());
            let mut changed = false;
            for arg in &call.args {
                let substituted = substitute_expr(arg, map)?;
                changed |= !Rc::ptr_eq(&substituted, arg);
                args.push(substituted);
            }
            if !changed {
                return Ok(expr.clone());
            }
            Ok(Call::with_parts(
                call.callee.clone(),
                args,
                call.kwargs.clone(),
                call.ty.clone(),
                call.span.clone(),
            ))
        }
        Expr::MakeTuple { elements, span, .. } => {
            let mut new_elements = Vec::with_capacity(elements.len());
            let mut changed = false;
            for element in elements {
                let substituted = substitute_expr(element, map)?;
                changed |= !Rc::ptr_eq(&substituted, element);
                new_elements.push(substituted);
            }
            if !changed {
                return Ok(expr.clone());
            }
            Ok(Expr::make_tuple(new_elements, span.clone()))
        }
        Expr::TupleGetItem { tuple, index, span, .. } => {
            let new_tuple = substitute_expr(tuple, map)?;
            if Rc::ptr_eq(&new_tuple, tuple) {
                return Ok(expr.clone());
            }
            Ok(Expr::tuple_get(new_tuple, *index, span.clone())?)
        }
        Expr::Binary { lhs, rhs, .. } => {
            let new_lhs = substitute_expr(lhs, map)?;
            let new_rhs = substitute_expr(rhs, map)?;
            ensure!(
                Rc::ptr_eq(&new_lhs, lhs) && Rc::ptr_eq(&new_rhs, rhs),
                error::InternalCheckSnafu {
                    pass: PASS_NAME,
                    message: "scalar arithmetic must not reference tensor/tile variables".to_string(),
                }
            );
            Ok(expr.clone())
        }
        Expr::Unary { operand, .. } => {
            let new_operand = substitute_expr(operand, map)?;
            ensure!(
                Rc::ptr_eq(&new_operand, operand),
                error::InternalCheckSnafu {
                    pass: PASS_NAME,
                    message: "scalar arithmetic must not reference tensor/tile variables".to_string(),
                }
            );
            Ok(expr.clone())
        }
        _ => Ok(expr.clone()),
    }
}

/// Emit `value` substituted; when anything changed, re-bind under a fresh
/// variable of the substituted type and extend the map.
fn passthrough_assign(
    var: &VarRef,
    value: &ExprRef,
    span: &Span,
    stmt: &StmtRef,
    map: &mut HashMap<String, VarRef>,
    out: &mut Vec<StmtRef>,
) -> Result<bool> {
    let substituted = substitute_expr(value, map)?;
    if Rc::ptr_eq(&substituted, value) {
        out.push(stmt.clone());
        Ok(false)
    } else {
        let new_var = Var::new(var.name.clone(), substituted.ty(), var.span.clone());
        out.push(Stmt::assign(new_var.clone(), substituted, span.clone())?);
        map.insert(var.name.clone(), new_var);
        Ok(true)
    }
}

/// Transform one InCore function; returns it plus the number of appended
/// output parameters.
fn transform_incore_function(func: &FuncRef) -> Result<(FuncRef, usize)> {
    let span = func.span.clone();

    // Tensor param name → tile variable, extended as the body is rewritten.
    let mut tensor_to_tile: HashMap<String, VarRef> = HashMap::new();
    let mut new_stmts: Vec<StmtRef> = Vec::new();

    // Load prologue: one block.load per tensor parameter.
    for param in &func.params {
        let Some(shape) = param.ty.shape().filter(|_| param.ty.is_tensor()).map(<[ExprRef]>::to_vec)
        else {
            continue; // scalar params pass through unchanged
        };

        let load = op::create(
            "block.load",
            vec![Expr::var(param), zero_offsets(shape.len(), &span), shape_tuple(&shape, &span)],
            vec![("target_memory".to_string(), KwValue::Memory(MemorySpace::UB))],
            span.clone(),
        )?;
        let tile_var = Var::new(format!("{}_tile", param.name), load.ty(), span.clone());
        new_stmts.push(Stmt::assign(tile_var.clone(), load, span.clone())?);
        tensor_to_tile.insert(param.name.clone(), tile_var);
    }

    // Body rewrite. The body is flat (SplitIncoreOrch): one statement or a Seq.
    let mut return_stmt: Option<StmtRef> = None;
    for stmt in Stmt::flatten(&func.body) {
        if matches!(&*stmt, Stmt::Return { .. }) {
            return_stmt = Some(stmt);
            continue;
        }

        let Stmt::Assign { var, value, span: stmt_span } = &*stmt else {
            new_stmts.push(stmt.clone());
            continue;
        };

        let Some(call) = value.as_call() else {
            passthrough_assign(var, value, stmt_span, &stmt, &mut tensor_to_tile, &mut new_stmts)?;
            continue;
        };

        // Function calls and ops without a conversion survive, modulo
        // substitution of their arguments.
        if call.callee.is_function() {
            passthrough_assign(var, value, stmt_span, &stmt, &mut tensor_to_tile, &mut new_stmts)?;
            continue;
        }
        let Some(converter) = conversion::lookup(call.callee.name()) else {
            passthrough_assign(var, value, stmt_span, &stmt, &mut tensor_to_tile, &mut new_stmts)?;
            continue;
        };

        let mut substituted_args = Vec::with_capacity(call.args.len());
        for arg in &call.args {
            substituted_args.push(substitute_expr(arg, &tensor_to_tile)?);
        }

        let converted = converter(&substituted_args, &call.kwargs, &call.span)?;
        new_stmts.extend(converted.prologue);

        let tile_var = Var::new(format!("{}_tile", var.name), converted.result.ty(), var.span.clone());
        new_stmts.push(Stmt::assign(tile_var.clone(), converted.result, stmt_span.clone())?);
        tensor_to_tile.insert(var.name.clone(), tile_var);
    }

    // Store epilogue: returned tiles go to appended output tensor params.
    let Some(return_stmt) = return_stmt else {
        return error::InternalCheckSnafu {
            pass: PASS_NAME,
            message: format!("InCore function '{}' has no return statement", func.name),
        }
        .fail();
    };
    let Stmt::Return { values, span: ret_span } = &*return_stmt else { unreachable!() };

    let mut new_params = func.params.clone();
    let mut new_return_types = Vec::with_capacity(values.len());
    let mut new_return_exprs = Vec::with_capacity(values.len());
    let mut num_added_outputs = 0usize;

    for (i, value) in values.iter().enumerate() {
        let ret_expr = substitute_expr(value, &tensor_to_tile)?;
        let ret_ty = ret_expr.ty();

        if !ret_ty.is_tile() {
            new_return_types.push(ret_ty);
            new_return_exprs.push(ret_expr);
            continue;
        }

        let orig_ty = &func.return_types[i];
        ensure!(
            orig_ty.is_tensor(),
            error::InternalCheckSnafu {
                pass: PASS_NAME,
                message: format!(
                    "return type {i} of '{}' should be TensorType but is {}",
                    func.name,
                    orig_ty.type_name()
                ),
            }
        );

        let out_name = format!("out_{num_added_outputs}");
        let out_param = Var::new(out_name.clone(), orig_ty.clone(), span.clone());
        new_params.push(out_param.clone());

        let tile_shape = ret_ty.shape().expect("tile type has a shape").to_vec();
        let store = op::create_simple(
            "block.store",
            vec![
                ret_expr,
                zero_offsets(tile_shape.len(), &span),
                shape_tuple(&tile_shape, &span),
                Expr::var(&out_param),
            ],
            span.clone(),
        )?;

        let store_var = Var::new(out_name, store.ty(), span.clone());
        new_stmts.push(Stmt::assign(store_var.clone(), store, span.clone())?);

        new_return_types.push(store_var.ty.clone());
        new_return_exprs.push(Expr::var(&store_var));
        num_added_outputs += 1;
    }

    new_stmts.push(Stmt::ret(new_return_exprs, ret_span.clone()));

    let new_func = Function::new(
        func.name.clone(),
        new_params,
        new_return_types,
        Stmt::seq(new_stmts, span.clone()),
        span,
        FunctionKind::InCore,
    );
    Ok((new_func, num_added_outputs))
}

/// Guard for the flat-body assumption: calls to transformed InCore
/// functions must not hide inside nested control flow, where the top-level
/// rewrite would miss them.
fn check_no_nested_incore_calls(
    stmt: &StmtRef,
    added_outputs: &HashMap<String, usize>,
) -> Result<()> {
    struct NestedCallScan<'a> {
        added_outputs: &'a HashMap<String, usize>,
        found: Option<String>,
    }

    impl Visitor for NestedCallScan<'_> {
        fn visit_expr(&mut self, expr: &ExprRef) {
            if let Expr::Call(call) = &**expr
                && let Some(gv) = call.target_function()
                && self.added_outputs.get(&gv.name).copied().unwrap_or(0) > 0
            {
                self.found.get_or_insert_with(|| gv.name.clone());
            }
            walk_expr(self, expr);
        }
    }

    let mut scan = NestedCallScan { added_outputs, found: None };
    scan.visit_stmt(stmt);
    ensure!(
        scan.found.is_none(),
        error::InternalCheckSnafu {
            pass: PASS_NAME,
            message: format!(
                "call to transformed InCore function '{}' inside nested control flow",
                scan.found.unwrap_or_default()
            ),
        }
    );
    Ok(())
}

/// Phase 2: rewrite calls to transformed InCore functions in one
/// orchestration/opaque function.
fn update_call_sites(
    func: &FuncRef,
    added_outputs: &HashMap<String, usize>,
    transformed: &HashMap<String, FuncRef>,
) -> Result<FuncRef> {
    let span = func.span.clone();

    let mut new_stmts: Vec<StmtRef> = Vec::new();
    let mut changed = false;
    // Old variable name → replacement, threaded through dependent statements.
    let mut var_map: HashMap<String, VarRef> = HashMap::new();

    for stmt in Stmt::flatten(&func.body) {
        if let Stmt::Return { values, span: ret_span } = &*stmt {
            if var_map.is_empty() {
                new_stmts.push(stmt.clone());
            } else {
                let mut new_values = Vec::with_capacity(values.len());
                for value in values {
                    new_values.push(substitute_expr(value, &var_map)?);
                }
                new_stmts.push(Stmt::ret(new_values, ret_span.clone()));
            }
            continue;
        }

        let Stmt::Assign { var, value, span: stmt_span } = &*stmt else {
            // Calls inside nested control flow are not rewritten; the flat
            // bodies guaranteed by SplitIncoreOrch make that safe, and the
            // guard turns a violated assumption into a loud failure.
            if matches!(&*stmt, Stmt::If { .. } | Stmt::For { .. }) {
                check_no_nested_incore_calls(&stmt, added_outputs)?;
            }
            new_stmts.push(stmt.clone());
            continue;
        };

        let value = if var_map.is_empty() { value.clone() } else { substitute_expr(value, &var_map)? };

        let rewrite_target = value
            .as_call()
            .and_then(Call::target_function)
            .filter(|gv| added_outputs.get(&gv.name).copied().unwrap_or(0) > 0)
            .cloned();

        let Some(gv) = rewrite_target else {
            changed |=
                passthrough_assign(var, &value, stmt_span, &stmt, &mut var_map, &mut new_stmts)?;
            continue;
        };
        let call = value.as_call().expect("rewrite target is a call");

        let num_outputs = added_outputs[&gv.name];
        let incore_func = transformed.get(&gv.name).ok_or_else(|| {
            error::InternalCheckSnafu {
                pass: PASS_NAME,
                message: format!("transformed InCore function '{}' not found", gv.name),
            }
            .build()
        })?;

        // Create one output tensor per appended parameter.
        let orig_param_count = incore_func.params.len() - num_outputs;
        let mut extra_args = Vec::with_capacity(num_outputs);
        for i in 0..num_outputs {
            let out_param = &incore_func.params[orig_param_count + i];
            let out_ty = &out_param.ty;
            ensure!(
                out_ty.is_tensor(),
                error::InternalCheckSnafu {
                    pass: PASS_NAME,
                    message: format!("output parameter '{}' is not TensorType", out_param.name),
                }
            );

            let create = op::create(
                "tensor.create",
                vec![shape_tuple(out_ty.shape().expect("tensor type has a shape"), &span)],
                vec![(
                    "dtype".to_string(),
                    KwValue::DType(out_ty.dtype().expect("tensor type has a dtype")),
                )],
                span.clone(),
            )?;

            let out_var = Var::new(format!("out_{i}"), create.ty(), span.clone());
            new_stmts.push(Stmt::assign(out_var.clone(), create, span.clone())?);
            extra_args.push(Expr::var(&out_var));
        }

        let mut new_args = call.args.clone();
        new_args.extend(extra_args);

        let new_return_type = incore_func.result_type();
        let new_call = Call::with_parts(
            call.callee.clone(),
            new_args,
            call.kwargs.clone(),
            new_return_type.clone(),
            call.span.clone(),
        );

        let new_var = Var::new(var.name.clone(), new_return_type, var.span.clone());
        new_stmts.push(Stmt::assign(new_var.clone(), new_call, stmt_span.clone())?);
        var_map.insert(var.name.clone(), new_var);
        changed = true;
    }

    if !changed {
        return Ok(func.clone());
    }

    Ok(Function::new(
        func.name.clone(),
        func.params.clone(),
        func.return_types.clone(),
        Stmt::seq(new_stmts, span.clone()),
        span,
        func.kind,
    ))
}

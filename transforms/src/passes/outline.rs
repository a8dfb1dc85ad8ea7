//! Outlines incore regions into their own InCore functions.
//!
//! A region is the statement run between `scope.begin_incore()` and
//! `scope.end_incore()` eval-markers in an Opaque function. Variables the
//! region reads from the surrounding scope become parameters; variables the
//! surrounding scope reads back become return values. The region is
//! replaced by a call to the outlined function and both markers are
//! consumed.

use std::collections::{HashMap, HashSet};

use snafu::ensure;

use tessera_ir::{
    Call, Expr, ExprRef, FuncRef, Function, FunctionKind, Mutator, Program, Stmt, StmtRef, Var,
    VarRef, VarSubstituter, Visitor, walk_expr,
};

use crate::error::{self, Result};
use crate::pass::{Pass, create_program_pass};
use crate::property::OUTLINE_INCORE_SCOPES_PROPERTIES;

const PASS_NAME: &str = "OutlineIncoreScopes";

pub fn outline_incore_scopes() -> Pass {
    create_program_pass(PASS_NAME, OUTLINE_INCORE_SCOPES_PROPERTIES, |program| {
        let mut new_functions = Vec::with_capacity(program.len());
        let mut changed = false;

        for (_, func) in program.functions() {
            if func.kind != FunctionKind::Opaque {
                new_functions.push(func.clone());
                continue;
            }
            let (outlined, host) = outline_function(func)?;
            changed |= !outlined.is_empty();
            // Outlined functions precede their host in insertion order.
            new_functions.extend(outlined);
            new_functions.push(host);
        }

        if !changed {
            return Ok(program.clone());
        }
        Ok(Program::new(new_functions, program.name.clone(), program.span.clone()))
    })
}

fn is_marker(stmt: &StmtRef, op_name: &str) -> bool {
    matches!(&**stmt, Stmt::Eval { expr, .. } if expr.as_call().is_some_and(|c| c.is_op(op_name)))
}

/// Variable uses in first-use order.
fn collect_uses(stmts: &[StmtRef]) -> Vec<VarRef> {
    struct UseCollector {
        seen: HashSet<String>,
        uses: Vec<VarRef>,
    }

    impl Visitor for UseCollector {
        fn visit_expr(&mut self, expr: &ExprRef) {
            if let Expr::Var(var) = &**expr
                && self.seen.insert(var.name.clone())
            {
                self.uses.push(var.clone());
            }
            walk_expr(self, expr);
        }
    }

    let mut collector = UseCollector { seen: HashSet::new(), uses: Vec::new() };
    for stmt in stmts {
        collector.visit_stmt(stmt);
    }
    collector.uses
}

/// Assignment targets in definition order.
fn collect_defs(stmts: &[StmtRef]) -> Vec<VarRef> {
    stmts
        .iter()
        .filter_map(|stmt| match &**stmt {
            Stmt::Assign { var, .. } => Some(var.clone()),
            _ => None,
        })
        .collect()
}

fn substitute_stmt(stmt: &StmtRef, map: &HashMap<String, VarRef>) -> Result<StmtRef> {
    if map.is_empty() {
        return Ok(stmt.clone());
    }
    Ok(VarSubstituter::new(map).mutate_stmt(stmt)?)
}

/// Outline every region of one Opaque function. Returns the new InCore
/// functions plus the rewritten host.
fn outline_function(func: &FuncRef) -> Result<(Vec<FuncRef>, FuncRef)> {
    let stmts = Stmt::flatten(&func.body);
    let span = func.span.clone();

    let mut outlined: Vec<FuncRef> = Vec::new();
    let mut new_stmts: Vec<StmtRef> = Vec::new();
    // Names re-bound by region replacements, applied to later statements.
    let mut var_map: HashMap<String, VarRef> = HashMap::new();
    let mut region_index = 0usize;
    let mut i = 0usize;

    while i < stmts.len() {
        let stmt = &stmts[i];
        if !is_marker(stmt, "scope.begin_incore") {
            new_stmts.push(substitute_stmt(stmt, &var_map)?);
            i += 1;
            continue;
        }

        let end = stmts[i + 1..]
            .iter()
            .position(|s| is_marker(s, "scope.end_incore"))
            .map(|offset| i + 1 + offset);
        let Some(end) = end else {
            return error::InternalCheckSnafu {
                pass: PASS_NAME,
                message: format!("unmatched scope.begin_incore in '{}'", func.name),
            }
            .fail();
        };

        let mut region: Vec<StmtRef> = Vec::with_capacity(end - i - 1);
        for stmt in &stmts[i + 1..end] {
            ensure!(
                matches!(&**stmt, Stmt::Assign { .. } | Stmt::Eval { .. }),
                error::InternalCheckSnafu {
                    pass: PASS_NAME,
                    message: format!(
                        "incore region in '{}' contains a {} (must be flat)",
                        func.name,
                        stmt.type_name()
                    ),
                }
            );
            region.push(substitute_stmt(stmt, &var_map)?);
        }

        let region_defs = collect_defs(&region);
        let region_def_names: HashSet<&str> = region_defs.iter().map(|v| v.name.as_str()).collect();

        // Live-ins: used in the region, defined outside it.
        let live_ins: Vec<VarRef> = collect_uses(&region)
            .into_iter()
            .filter(|var| !region_def_names.contains(var.name.as_str()))
            .collect();

        // Live-outs: defined in the region, used after it.
        let after_uses: HashSet<String> =
            collect_uses(&stmts[end + 1..]).into_iter().map(|v| v.name.clone()).collect();
        let live_outs: Vec<VarRef> =
            region_defs.into_iter().filter(|var| after_uses.contains(&var.name)).collect();

        let incore_name = format!("{}_incore_{region_index}", func.name);
        region_index += 1;

        // Fresh parameters, region body substituted onto them.
        let mut param_map: HashMap<String, VarRef> = HashMap::new();
        let mut params = Vec::with_capacity(live_ins.len());
        for live_in in &live_ins {
            let param = Var::new(live_in.name.clone(), live_in.ty.clone(), live_in.span.clone());
            param_map.insert(live_in.name.clone(), param.clone());
            params.push(param);
        }
        let mut incore_body: Vec<StmtRef> = Vec::with_capacity(region.len() + 1);
        for stmt in &region {
            incore_body.push(substitute_stmt(stmt, &param_map)?);
        }
        incore_body.push(Stmt::ret(
            live_outs.iter().map(Expr::var).collect(),
            span.clone(),
        ));

        let incore_func = Function::new(
            incore_name.clone(),
            params,
            live_outs.iter().map(|v| v.ty.clone()).collect(),
            Stmt::seq(incore_body, span.clone()),
            span.clone(),
            FunctionKind::InCore,
        );

        // Replace the region with a call to the outlined function.
        let call = Call::function(
            tessera_ir::GlobalVar::new(incore_name, span.clone()),
            live_ins.iter().map(Expr::var).collect(),
            Vec::new(),
            incore_func.result_type(),
            span.clone(),
        );
        match live_outs.len() {
            0 => new_stmts.push(Stmt::eval(call, span.clone())),
            1 => {
                let out = &live_outs[0];
                let result_var = Var::new(out.name.clone(), out.ty.clone(), out.span.clone());
                new_stmts.push(Stmt::assign(result_var.clone(), call, span.clone())?);
                var_map.insert(out.name.clone(), result_var);
            }
            _ => {
                let tuple_var =
                    Var::new(format!("{}_ret", incore_func.name), call.ty(), span.clone());
                new_stmts.push(Stmt::assign(tuple_var.clone(), call, span.clone())?);
                for (index, out) in live_outs.iter().enumerate() {
                    let item = Expr::tuple_get(Expr::var(&tuple_var), index, span.clone())?;
                    let result_var = Var::new(out.name.clone(), out.ty.clone(), out.span.clone());
                    new_stmts.push(Stmt::assign(result_var.clone(), item, span.clone())?);
                    var_map.insert(out.name.clone(), result_var);
                }
            }
        }

        outlined.push(incore_func);
        i = end + 1;
    }

    if outlined.is_empty() {
        return Ok((outlined, func.clone()));
    }

    let host = Function::new(
        func.name.clone(),
        func.params.clone(),
        func.return_types.clone(),
        Stmt::seq(new_stmts, span.clone()),
        span,
        func.kind,
    );
    Ok((outlined, host))
}

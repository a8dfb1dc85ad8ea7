//! Memory-reference passes for InCore functions: `init_mem_ref`,
//! `basic_memory_reuse` and `add_alloc`.
//!
//! A [`tessera_ir::MemRef`] is the unit of on-chip allocation: `init_mem_ref`
//! attaches one to every tensor/tile variable (UB by default, DDR for
//! `block.load` sources and `block.store` destinations), `basic_memory_reuse`
//! lets variables with disjoint live ranges share one, and `add_alloc`
//! materializes a `block.alloc` per distinct reference at function entry.

use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use tessera_dtype::MemorySpace;
use tessera_ir::{
    Expr, ExprRef, FuncRef, Function, FunctionKind, MemRef, Mutator, Stmt, StmtRef, VarRef,
    VarSubstituter, Visitor, op, walk_expr,
};

use crate::error::Result;
use crate::pass::{Pass, create_function_pass};
use crate::property::{
    ADD_ALLOC_PROPERTIES, BASIC_MEMORY_REUSE_PROPERTIES, INIT_MEM_REF_PROPERTIES,
};

/// Variables used in an expression.
fn used_vars(expr: &ExprRef) -> Vec<VarRef> {
    struct Uses {
        vars: Vec<VarRef>,
    }

    impl Visitor for Uses {
        fn visit_expr(&mut self, expr: &ExprRef) {
            if let Expr::Var(var) = &**expr {
                self.vars.push(var.clone());
            }
            walk_expr(self, expr);
        }
    }

    let mut uses = Uses { vars: Vec::new() };
    uses.visit_expr(expr);
    uses.vars
}

fn stmt_used_vars(stmt: &StmtRef) -> Vec<VarRef> {
    match &**stmt {
        Stmt::Assign { value, .. } => used_vars(value),
        Stmt::Eval { expr, .. } => used_vars(expr),
        Stmt::Return { values, .. } => values.iter().flat_map(used_vars).collect(),
        _ => Vec::new(),
    }
}

fn rebuild(func: &FuncRef, params: Vec<VarRef>, stmts: Vec<StmtRef>) -> FuncRef {
    Function::new(
        func.name.clone(),
        params,
        func.return_types.clone(),
        Stmt::seq(stmts, func.span.clone()),
        func.span.clone(),
        func.kind,
    )
}

// ---------------------------------------------------------------------------
// init_mem_ref
// ---------------------------------------------------------------------------

/// Names that flow through `block.load`/`block.store` and therefore live in
/// DDR: load sources (arg 0) and store destinations (arg 3).
fn ddr_resident_names(stmts: &[StmtRef]) -> HashSet<String> {
    struct DdrScan {
        names: HashSet<String>,
    }

    impl Visitor for DdrScan {
        fn visit_expr(&mut self, expr: &ExprRef) {
            if let Expr::Call(call) = &**expr {
                let arg = match () {
                    _ if call.is_op("block.load") => call.args.first(),
                    _ if call.is_op("block.store") => call.args.get(3),
                    _ => None,
                };
                if let Some(arg) = arg
                    && let Expr::Var(var) = &**arg
                {
                    self.names.insert(var.name.clone());
                }
            }
            walk_expr(self, expr);
        }
    }

    let mut scan = DdrScan { names: HashSet::new() };
    for stmt in stmts {
        scan.visit_stmt(stmt);
    }
    scan.names
}

pub fn init_mem_ref() -> Pass {
    create_function_pass("InitMemRef", INIT_MEM_REF_PROPERTIES, |func| {
        if func.kind != FunctionKind::InCore {
            return Ok(func.clone());
        }

        let stmts = Stmt::flatten(&func.body);
        let ddr_names = ddr_resident_names(&stmts);

        let attach = |var: &VarRef| -> Option<VarRef> {
            if var.memref.is_some() || !(var.ty.is_tile() || var.ty.is_tensor()) {
                return None;
            }
            let space = if ddr_names.contains(&var.name) { MemorySpace::DDR } else { MemorySpace::UB };
            let size = var.ty.size_bytes().unwrap_or(0);
            Some(var.with_memref(MemRef::new(space, size, var.span.clone())))
        };

        let mut var_map: HashMap<String, VarRef> = HashMap::new();
        let mut new_params = Vec::with_capacity(func.params.len());
        let mut changed = false;
        for param in &func.params {
            match attach(param) {
                Some(annotated) => {
                    var_map.insert(param.name.clone(), annotated.clone());
                    new_params.push(annotated);
                    changed = true;
                }
                None => new_params.push(param.clone()),
            }
        }

        let mut new_stmts = Vec::with_capacity(stmts.len());
        for stmt in &stmts {
            match &**stmt {
                Stmt::Assign { var, value, span } => {
                    let new_value = VarSubstituter::new(&var_map).substitute(value)?;
                    match attach(var) {
                        Some(annotated) => {
                            var_map.insert(var.name.clone(), annotated.clone());
                            new_stmts.push(Stmt::assign(annotated, new_value, span.clone())?);
                            changed = true;
                        }
                        None if Rc::ptr_eq(&new_value, value) => new_stmts.push(stmt.clone()),
                        None => {
                            changed = true;
                            new_stmts.push(Stmt::assign(var.clone(), new_value, span.clone())?);
                        }
                    }
                }
                _ => {
                    let substituted = VarSubstituter::new(&var_map).mutate_stmt(stmt)?;
                    changed |= !Rc::ptr_eq(&substituted, stmt);
                    new_stmts.push(substituted);
                }
            }
        }

        if !changed {
            return Ok(func.clone());
        }
        Ok(rebuild(func, new_params, new_stmts))
    })
}

// ---------------------------------------------------------------------------
// basic_memory_reuse
// ---------------------------------------------------------------------------

pub fn basic_memory_reuse() -> Pass {
    create_function_pass("BasicMemoryReuse", BASIC_MEMORY_REUSE_PROPERTIES, |func| {
        if func.kind != FunctionKind::InCore {
            return Ok(func.clone());
        }

        let stmts = Stmt::flatten(&func.body);

        // Live ranges of tile variables defined in the body.
        struct Candidate {
            var: VarRef,
            def_index: usize,
            last_use: usize,
        }
        let mut candidates: Vec<Candidate> = Vec::new();
        let mut last_use: HashMap<String, usize> = HashMap::new();
        for (index, stmt) in stmts.iter().enumerate() {
            for used in stmt_used_vars(stmt) {
                last_use.insert(used.name.clone(), index);
            }
            if let Stmt::Assign { var, .. } = &**stmt
                && var.ty.is_tile()
                && var.memref.is_some()
            {
                candidates.push(Candidate { var: var.clone(), def_index: index, last_use: index });
            }
        }
        for candidate in &mut candidates {
            if let Some(index) = last_use.get(&candidate.var.name) {
                candidate.last_use = (*index).max(candidate.def_index);
            }
        }

        // Linear scan: a reference whose owner died may back a new variable
        // of the same memory space and size.
        let mut active: Vec<(Rc<MemRef>, usize)> = Vec::new();
        let mut free: Vec<Rc<MemRef>> = Vec::new();
        let mut var_map: HashMap<String, VarRef> = HashMap::new();

        for candidate in &candidates {
            active.retain(|(memref, end)| {
                if *end < candidate.def_index {
                    free.push(memref.clone());
                    false
                } else {
                    true
                }
            });

            let own = candidate.var.memref.as_ref().expect("candidates carry a memref");
            let reusable = free.iter().position(|memref| {
                memref.memory_space == own.memory_space && memref.size_bytes == own.size_bytes
            });
            let memref = match reusable {
                Some(index) => {
                    let shared = free.swap_remove(index);
                    let annotated = candidate.var.with_memref(shared.clone());
                    var_map.insert(candidate.var.name.clone(), annotated);
                    shared
                }
                None => own.clone(),
            };
            active.push((memref, candidate.last_use));
        }

        if var_map.is_empty() {
            return Ok(func.clone());
        }

        let mut new_stmts = Vec::with_capacity(stmts.len());
        for stmt in &stmts {
            match &**stmt {
                Stmt::Assign { var, value, span } => {
                    let value = VarSubstituter::new(&var_map).substitute(value)?;
                    let var = var_map.get(&var.name).cloned().unwrap_or_else(|| var.clone());
                    new_stmts.push(Stmt::assign(var, value, span.clone())?);
                }
                _ => new_stmts.push(VarSubstituter::new(&var_map).mutate_stmt(stmt)?),
            }
        }
        Ok(rebuild(func, func.params.clone(), new_stmts))
    })
}

// ---------------------------------------------------------------------------
// add_alloc
// ---------------------------------------------------------------------------

pub fn add_alloc() -> Pass {
    create_function_pass("AddAlloc", ADD_ALLOC_PROPERTIES, |func| {
        if func.kind != FunctionKind::InCore {
            return Ok(func.clone());
        }

        let stmts = Stmt::flatten(&func.body);

        // Distinct on-chip references, in first-appearance order.
        let mut seen: HashSet<u64> = HashSet::new();
        let mut memrefs: Vec<Rc<MemRef>> = Vec::new();
        let mut record = |var: &VarRef| {
            if let Some(memref) = &var.memref
                && memref.memory_space.is_on_chip()
                && seen.insert(memref.id())
            {
                memrefs.push(memref.clone());
            }
        };
        for param in &func.params {
            record(param);
        }
        for stmt in &stmts {
            if let Stmt::Assign { var, .. } = &**stmt {
                record(var);
            }
        }

        if memrefs.is_empty() {
            return Ok(func.clone());
        }

        let span = func.span.clone();
        let mut new_stmts = Vec::with_capacity(memrefs.len() + stmts.len());
        for memref in &memrefs {
            let alloc = op::create_simple("block.alloc", vec![Expr::memref(memref)], span.clone())?;
            new_stmts.push(Stmt::eval(alloc, span.clone()));
        }
        new_stmts.extend(stmts);

        Ok(rebuild(func, func.params.clone(), new_stmts))
    })
}

//! Pipe synchronization for InCore functions.
//!
//! Ops execute on fixed hardware pipes: loads on MTE2, stores on MTE3,
//! on-chip moves on MTE1, elementwise/vector ops on V, matrix ops on M.
//! A data dependency that crosses pipes needs a `sync_src`/`sync_dst` flag
//! pair; a write to a reference still visible to a reader on another pipe
//! needs a `bar_v`/`bar_m` barrier. Reuse-induced hazards exist only after
//! `basic_memory_reuse`, which is why this pass requires `HasMemRefs`.

use std::collections::{HashMap, HashSet};

use tessera_ir::{Expr, ExprRef, FunctionKind, KwValue, Stmt, StmtRef, VarRef, Visitor, op, walk_expr};

use crate::error::Result;
use crate::pass::{Pass, create_function_pass};
use crate::property::INSERT_SYNC_PROPERTIES;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Pipe {
    V,
    M,
    Mte1,
    Mte2,
    Mte3,
}

impl Pipe {
    fn as_str(self) -> &'static str {
        match self {
            Self::V => "PIPE_V",
            Self::M => "PIPE_M",
            Self::Mte1 => "PIPE_MTE1",
            Self::Mte2 => "PIPE_MTE2",
            Self::Mte3 => "PIPE_MTE3",
        }
    }
}

fn op_pipe(name: &str) -> Option<Pipe> {
    match name {
        "block.load" => Some(Pipe::Mte2),
        "block.store" => Some(Pipe::Mte3),
        "block.move" => Some(Pipe::Mte1),
        "block.add" | "block.sub" | "block.mul" | "block.div" | "block.maximum" | "block.adds"
        | "block.subs" | "block.muls" | "block.divs" | "block.exp" | "block.cast"
        | "block.reshape" | "block.transpose" => Some(Pipe::V),
        _ => None,
    }
}

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

fn sync_pair(src: Pipe, dst: Pipe, span: &tessera_ir::Span) -> Result<[StmtRef; 2]> {
    let kwargs = vec![
        ("src_pipe".to_string(), KwValue::Str(src.as_str().to_string())),
        ("dst_pipe".to_string(), KwValue::Str(dst.as_str().to_string())),
    ];
    let set = op::create("block.sync_src", Vec::new(), kwargs.clone(), span.clone())?;
    let wait = op::create("block.sync_dst", Vec::new(), kwargs, span.clone())?;
    Ok([Stmt::eval(set, span.clone()), Stmt::eval(wait, span.clone())])
}

pub fn insert_sync() -> Pass {
    create_function_pass("InsertSync", INSERT_SYNC_PROPERTIES, |func| {
        if func.kind != FunctionKind::InCore {
            return Ok(func.clone());
        }

        let stmts = Stmt::flatten(&func.body);

        // Producing pipe per variable name, reader pipe per memref.
        let mut producer_pipe: HashMap<String, Pipe> = HashMap::new();
        let mut reader_pipe: HashMap<u64, Pipe> = HashMap::new();
        let mut synced: HashSet<(Pipe, Pipe)> = HashSet::new();

        let mut new_stmts: Vec<StmtRef> = Vec::new();
        let mut changed = false;

        for stmt in &stmts {
            let Stmt::Assign { var, value, span } = &**stmt else {
                new_stmts.push(stmt.clone());
                continue;
            };
            let pipe = value
                .as_call()
                .filter(|call| !call.callee.is_function())
                .and_then(|call| op_pipe(call.callee.name()));
            let Some(pipe) = pipe else {
                new_stmts.push(stmt.clone());
                continue;
            };

            let uses = used_vars(value);

            // Cross-pipe read-after-write: one flag pair per pipe edge.
            for used in &uses {
                if let Some(src) = producer_pipe.get(&used.name).copied()
                    && src != pipe
                    && synced.insert((src, pipe))
                {
                    new_stmts.extend(sync_pair(src, pipe, span)?);
                    changed = true;
                }
            }

            // Write-after-read on a shared reference from another pipe.
            if let Some(memref) = &var.memref
                && let Some(reader) = reader_pipe.get(&memref.id()).copied()
                && reader != pipe
            {
                let barrier = match pipe {
                    Pipe::V => Some("block.bar_v"),
                    Pipe::M => Some("block.bar_m"),
                    _ => None,
                };
                if let Some(barrier) = barrier {
                    let call = op::create_simple(barrier, Vec::new(), span.clone())?;
                    new_stmts.push(Stmt::eval(call, span.clone()));
                    changed = true;
                }
            }

            new_stmts.push(stmt.clone());

            // A new producer on this pipe invalidates its outgoing flags.
            synced.retain(|(src, _)| *src != pipe);
            producer_pipe.insert(var.name.clone(), pipe);
            for used in &uses {
                if let Some(memref) = &used.memref {
                    reader_pipe.insert(memref.id(), pipe);
                }
            }
        }

        if !changed {
            return Ok(func.clone());
        }
        Ok(tessera_ir::Function::new(
            func.name.clone(),
            func.params.clone(),
            func.return_types.clone(),
            Stmt::seq(new_stmts, func.span.clone()),
            func.span.clone(),
            func.kind,
        ))
    })
}

//! Property tests for the mechanical passes.
//!
//! Programs are generated as blueprints (plain data) and materialized into
//! scalar functions, deliberately reusing a small pool of variable names so
//! that SSA conversion has real work to do. Statement plans include `If`
//! branches whose arms carry independent assignment plans, so cross-arm
//! rebinding (which SSA conversion must either fork around or refuse) is
//! sampled routinely.

use proptest::prelude::*;

use tessera_dtype::DataType;
use tessera_ir::{
    Expr, ExprRef, Function, FunctionKind, ProgramRef, Stmt, StmtRef, Type, Var, VarRef,
    structural_equal,
};

use crate::error::Error;
use crate::passes::{convert_to_ssa, flatten_single_stmt, normalize_stmt_structure};
use crate::property::IRProperty;
use crate::test::helpers::{program, span};
use crate::verifier::{IRVerifier, Severity, verifier_for};

const NAME_POOL: usize = 2;

#[derive(Debug, Clone)]
enum ExprPlan {
    Const(i64),
    /// Reference to an earlier assignment, resolved modulo the number of
    /// definitions available at build time.
    Earlier(usize),
    Add(Box<ExprPlan>, Box<ExprPlan>),
}

/// One assignment: a name slot (taken modulo the name pool, forcing
/// re-assignments) plus a value plan.
type AssignPlan = (usize, ExprPlan);

#[derive(Debug, Clone)]
enum StmtPlan {
    Assign(AssignPlan),
    /// `if true: <then assigns> else: <else assigns>`; an empty else list
    /// builds an if without an else body.
    If {
        then_assigns: Vec<AssignPlan>,
        else_assigns: Vec<AssignPlan>,
    },
}

fn arb_expr_plan() -> impl Strategy<Value = ExprPlan> {
    let leaf = prop_oneof![
        (-50i64..50).prop_map(ExprPlan::Const),
        (0usize..8).prop_map(ExprPlan::Earlier),
    ];
    leaf.prop_recursive(3, 16, 2, |inner| {
        (inner.clone(), inner).prop_map(|(a, b)| ExprPlan::Add(Box::new(a), Box::new(b)))
    })
}

fn arb_assign_plan() -> impl Strategy<Value = AssignPlan> {
    (0usize..4, arb_expr_plan())
}

fn arb_stmt_plan() -> impl Strategy<Value = StmtPlan> {
    prop_oneof![
        3 => arb_assign_plan().prop_map(StmtPlan::Assign),
        1 => (
            prop::collection::vec(arb_assign_plan(), 1..3),
            prop::collection::vec(arb_assign_plan(), 0..3),
        )
            .prop_map(|(then_assigns, else_assigns)| StmtPlan::If { then_assigns, else_assigns }),
    ]
}

fn arb_program_plan() -> impl Strategy<Value = Vec<StmtPlan>> {
    prop::collection::vec(arb_stmt_plan(), 1..6)
}

fn build_expr(plan: &ExprPlan, defined: &[VarRef]) -> ExprRef {
    match plan {
        ExprPlan::Const(value) => Expr::const_int(*value, DataType::Int32, span()),
        ExprPlan::Earlier(index) => {
            if defined.is_empty() {
                Expr::const_int(0, DataType::Int32, span())
            } else {
                Expr::var(&defined[index % defined.len()])
            }
        }
        ExprPlan::Add(lhs, rhs) => Expr::binary(
            tessera_ir::BinaryOp::Add,
            build_expr(lhs, defined),
            build_expr(rhs, defined),
            span(),
        )
        .expect("INT32 operands are always valid"),
    }
}

fn build_assign(slot: usize, plan: &ExprPlan, defined: &mut Vec<VarRef>) -> StmtRef {
    let value = build_expr(plan, defined);
    let var = Var::new(format!("x{}", slot % NAME_POOL), Type::scalar(DataType::Int32), span());
    defined.push(var.clone());
    Stmt::assign(var, value, span()).expect("types match")
}

fn build_branch(assigns: &[AssignPlan], defined: &mut Vec<VarRef>) -> StmtRef {
    let stmts: Vec<StmtRef> =
        assigns.iter().map(|(slot, plan)| build_assign(*slot, plan, defined)).collect();
    if stmts.len() == 1 {
        stmts.into_iter().next().expect("length checked")
    } else {
        Stmt::seq(stmts, span())
    }
}

/// Scalar function mixing straight-line assignments and `if` statements
/// whose arms rebind names from the same pool.
fn build_program(plans: &[StmtPlan]) -> ProgramRef {
    let mut defined: Vec<VarRef> = Vec::new();
    let mut stmts = Vec::with_capacity(plans.len() + 1);
    for plan in plans {
        match plan {
            StmtPlan::Assign((slot, expr)) => {
                stmts.push(build_assign(*slot, expr, &mut defined));
            }
            StmtPlan::If { then_assigns, else_assigns } => {
                let cond = Expr::const_bool(true, span());
                let then_body = build_branch(then_assigns, &mut defined);
                let else_body = if else_assigns.is_empty() {
                    None
                } else {
                    Some(build_branch(else_assigns, &mut defined))
                };
                stmts.push(Stmt::if_(cond, then_body, else_body, span()));
            }
        }
    }
    let last = defined.last().expect("at least one assignment");
    stmts.push(Stmt::ret(vec![Expr::var(last)], span()));
    let func = Function::new(
        "f",
        vec![],
        vec![Type::scalar(DataType::Int32)],
        Stmt::seq(stmts, span()),
        span(),
        FunctionKind::Opaque,
    );
    program(vec![func])
}

fn errors_for(property: IRProperty, program: &ProgramRef) -> usize {
    let mut verifier = IRVerifier::new();
    verifier.add_rule(verifier_for(property));
    verifier.verify(program).iter().filter(|d| d.severity == Severity::Error).count()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    /// SSA conversion has exactly two outcomes: it succeeds and the result
    /// satisfies the SSA and type verifiers (and re-running it changes
    /// nothing), or the input rebinds a name in both arms of an if and the
    /// pass refuses with an internal check. It never emits unverifiable IR.
    #[test]
    fn ssa_is_sound_or_rejects(plans in arb_program_plan()) {
        let input = build_program(&plans);
        match convert_to_ssa().run(&input) {
            Ok(result) => {
                prop_assert_eq!(errors_for(IRProperty::SSAForm, &result), 0);
                prop_assert_eq!(errors_for(IRProperty::TypeChecked, &result), 0);
                let twice = convert_to_ssa().run(&result).unwrap();
                prop_assert!(structural_equal(&result, &twice, false));
            }
            Err(Error::InternalCheck { .. }) => {
                // Divergent cross-arm rebinding; refusing beats miscompiling.
            }
            Err(other) => prop_assert!(false, "unexpected error: {}", other),
        }
    }

    /// Branch-free programs are always accepted, whatever the reassignment
    /// pattern.
    #[test]
    fn ssa_accepts_straight_line(assigns in prop::collection::vec(arb_assign_plan(), 1..6)) {
        let plans: Vec<StmtPlan> = assigns.into_iter().map(StmtPlan::Assign).collect();
        let input = build_program(&plans);
        let result = convert_to_ssa().run(&input).unwrap();
        prop_assert_eq!(errors_for(IRProperty::SSAForm, &result), 0);
        prop_assert_eq!(errors_for(IRProperty::TypeChecked, &result), 0);
        let twice = convert_to_ssa().run(&result).unwrap();
        prop_assert!(structural_equal(&result, &twice, false));
    }

    /// Normalization always satisfies its own verifier, and a second run
    /// changes nothing.
    #[test]
    fn normalize_satisfies_and_idempotent(plans in arb_program_plan()) {
        let input = build_program(&plans);
        let once = normalize_stmt_structure().run(&input).unwrap();
        prop_assert_eq!(errors_for(IRProperty::NormalizedStmtStructure, &once), 0);
        let twice = normalize_stmt_structure().run(&once).unwrap();
        prop_assert!(structural_equal(&once, &twice, false));
    }

    /// Flattening always satisfies its own verifier, and a second run
    /// changes nothing.
    #[test]
    fn flatten_satisfies_and_idempotent(plans in arb_program_plan()) {
        let input = build_program(&plans);
        let once = flatten_single_stmt().run(&input).unwrap();
        prop_assert_eq!(errors_for(IRProperty::FlattenedSingleStmt, &once), 0);
        let twice = flatten_single_stmt().run(&once).unwrap();
        prop_assert!(structural_equal(&once, &twice, false));
    }
}

use tessera_dtype::{DataType, MemorySpace};

use crate::error::Error;
use crate::expr::{BinaryOp, Expr, ExprRef, Var, VarRef};
use crate::func::{FuncRef, Function, FunctionKind};
use crate::op;
use crate::span::Span;
use crate::stmt::Stmt;
use crate::structural::{assert_structural_equal, structural_equal, structural_hash};
use crate::types::Type;

fn scalar_var(name: &str) -> VarRef {
    Var::new(name, Type::scalar(DataType::Int32), Span::unknown())
}

fn plus_one(var: &VarRef) -> ExprRef {
    let one = Expr::const_int(1, DataType::Int32, Span::unknown());
    Expr::binary(BinaryOp::Add, Expr::var(var), one, Span::unknown()).unwrap()
}

fn plus(lhs: &VarRef, rhs: &VarRef) -> ExprRef {
    Expr::binary(BinaryOp::Add, Expr::var(lhs), Expr::var(rhs), Span::unknown()).unwrap()
}

/// `f(a: Tensor[[16], FP32]) { t = tensor.add(a, a); return t }` built from
/// scratch on every call, so no nodes are shared between two builds.
fn add_function() -> FuncRef {
    let span = Span::unknown();
    let shape = vec![Expr::const_int(16, DataType::Int64, span.clone())];
    let tensor_ty = Type::tensor(shape, DataType::Float32, MemorySpace::DDR);
    let a = Var::new("a", tensor_ty.clone(), span.clone());

    let call = op::create_simple("tensor.add", vec![Expr::var(&a), Expr::var(&a)], span.clone()).unwrap();
    let t = Var::new("t", call.ty(), span.clone());
    let body = Stmt::seq(
        vec![
            Stmt::assign(t.clone(), call, span.clone()).unwrap(),
            Stmt::ret(vec![Expr::var(&t)], span.clone()),
        ],
        span.clone(),
    );
    Function::new("f", vec![a], vec![tensor_ty], body, span, FunctionKind::InCore)
}

#[test]
fn test_alpha_off_distinct_vars_differ() {
    let x = scalar_var("x");
    let y = scalar_var("y");
    assert!(!structural_equal(&plus_one(&x), &plus_one(&y), false));
}

#[test]
fn test_alpha_on_maps_vars() {
    let x = scalar_var("x");
    let y = scalar_var("y");
    let lhs = plus_one(&x);
    let rhs = plus_one(&y);
    assert!(structural_equal(&lhs, &rhs, true));
    assert_eq!(structural_hash(&lhs, true), structural_hash(&rhs, true));
}

#[test]
fn test_alpha_mapping_requires_equal_types() {
    let x = scalar_var("x");
    let y = Var::new("y", Type::scalar(DataType::Int64), Span::unknown());
    let one32 = Expr::const_int(1, DataType::Int32, Span::unknown());
    let one64 = Expr::const_int(1, DataType::Int64, Span::unknown());
    let lhs = Expr::binary(BinaryOp::Add, Expr::var(&x), one32, Span::unknown()).unwrap();
    let rhs = Expr::binary(BinaryOp::Add, Expr::var(&y), one64, Span::unknown()).unwrap();
    assert!(!structural_equal(&lhs, &rhs, true));
}

#[test]
fn test_alpha_mapping_is_bijective() {
    let x = scalar_var("x");
    let y = scalar_var("y");
    let z = scalar_var("z");

    // x + x vs y + z: x cannot map to both y and z.
    assert!(!structural_equal(&plus(&x, &x), &plus(&y, &z), true));
    // x + x vs y + y maps consistently.
    assert!(structural_equal(&plus(&x, &x), &plus(&y, &y), true));
    // x + y vs z + z: z cannot be the image of both x and y.
    assert!(!structural_equal(&plus(&x, &y), &plus(&z, &z), true));
}

#[test]
fn test_same_var_compares_equal_without_mapping() {
    let x = scalar_var("x");
    assert!(structural_equal(&plus_one(&x), &plus_one(&x), false));
}

#[test]
fn test_def_bound_vars_compare_alpha_off() {
    // Two independently built, structurally identical functions: all
    // variables are bound at definition sites (params, assignment), so the
    // functions compare equal even with auto-mapping off.
    let f1 = add_function();
    let f2 = add_function();
    assert!(structural_equal(&f1, &f2, false));
    assert_eq!(structural_hash(&f1, false), structural_hash(&f2, false));
    assert_eq!(structural_hash(&f1, true), structural_hash(&f2, true));
}

#[test]
fn test_function_name_is_ignored() {
    let f1 = add_function();
    let f2 = add_function();
    let renamed = Function::new(
        format!("{}_identity", f2.name),
        f2.params.clone(),
        f2.return_types.clone(),
        f2.body.clone(),
        f2.span.clone(),
        f2.kind,
    );
    assert!(structural_equal(&f1, &renamed, false));
}

#[test]
fn test_different_op_detected() {
    let span = Span::unknown();
    let x = scalar_var("x");
    let one = Expr::const_int(1, DataType::Int32, span.clone());
    let add = Expr::binary(BinaryOp::Add, Expr::var(&x), one.clone(), span.clone()).unwrap();
    let sub = Expr::binary(BinaryOp::Sub, Expr::var(&x), one, span).unwrap();
    assert!(!structural_equal(&add, &sub, false));
    assert!(!structural_equal(&add, &sub, true));
}

#[test]
fn test_assert_reports_first_mismatch_path() {
    let span = Span::unknown();
    let x = scalar_var("x");
    let lhs = Expr::binary(
        BinaryOp::Add,
        Expr::var(&x),
        Expr::const_int(1, DataType::Int32, span.clone()),
        span.clone(),
    )
    .unwrap();
    let rhs = Expr::binary(
        BinaryOp::Add,
        Expr::var(&x),
        Expr::const_int(2, DataType::Int32, span.clone()),
        span,
    )
    .unwrap();

    let err = assert_structural_equal(&lhs, &rhs, false).unwrap_err();
    match err {
        Error::StructuralMismatch { path, reason } => {
            assert!(path.contains("right"), "path was `{path}`");
            assert!(reason.contains('1') && reason.contains('2'), "reason was `{reason}`");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_hash_is_deterministic() {
    let f = add_function();
    assert_eq!(structural_hash(&f, false), structural_hash(&f, false));
    assert_eq!(structural_hash(&f, true), structural_hash(&f, true));
}

#[test]
fn test_kwargs_compare_as_ordered_pairs() {
    use crate::expr::{Call, Callee, KwValue};
    use crate::op::Op;
    use crate::types::Type;

    let span = Span::unknown();
    let build = |kwargs: Vec<(&str, i64)>| {
        Call::with_parts(
            Callee::Op(Op::new("opaque.configure")),
            Vec::new(),
            kwargs.into_iter().map(|(k, v)| (k.to_string(), KwValue::Int(v))).collect(),
            Type::void(),
            span.clone(),
        )
    };

    let ab = build(vec![("alpha", 1), ("beta", 2)]);
    let ab2 = build(vec![("alpha", 1), ("beta", 2)]);
    let ba = build(vec![("beta", 2), ("alpha", 1)]);

    assert!(structural_equal(&ab, &ab2, false));
    // Insertion order is semantically significant.
    assert!(!structural_equal(&ab, &ba, false));
}

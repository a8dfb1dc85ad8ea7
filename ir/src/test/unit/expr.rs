use tessera_dtype::DataType;

use crate::error::Error;
use crate::expr::{BinaryOp, Expr, KwValue, UnaryOp, Var, kwarg};
use crate::span::Span;
use crate::types::Type;

fn int(value: i64) -> crate::ExprRef {
    Expr::const_int(value, DataType::Int32, Span::unknown())
}

#[test]
fn test_binary_arithmetic_keeps_operand_dtype() {
    let add = Expr::binary(BinaryOp::Add, int(1), int(2), Span::unknown()).unwrap();
    assert_eq!(add.ty().dtype(), Some(DataType::Int32));
}

#[test]
fn test_comparison_yields_bool() {
    let lt = Expr::binary(BinaryOp::Lt, int(1), int(2), Span::unknown()).unwrap();
    assert_eq!(lt.ty().dtype(), Some(DataType::Bool));
}

#[test]
fn test_logical_requires_bool() {
    let err = Expr::binary(BinaryOp::And, int(1), int(2), Span::unknown()).unwrap_err();
    assert!(matches!(err, Error::TypeMismatch { .. }));

    let t = Expr::const_bool(true, Span::unknown());
    let f = Expr::const_bool(false, Span::unknown());
    let and = Expr::binary(BinaryOp::And, t, f, Span::unknown()).unwrap();
    assert_eq!(and.ty().dtype(), Some(DataType::Bool));
}

#[test]
fn test_mixed_dtypes_rejected() {
    let lhs = Expr::const_int(1, DataType::Int32, Span::unknown());
    let rhs = Expr::const_int(1, DataType::Int64, Span::unknown());
    let err = Expr::binary(BinaryOp::Add, lhs, rhs, Span::unknown()).unwrap_err();
    assert!(matches!(err, Error::TypeMismatch { .. }));
}

#[test]
fn test_unary_not_requires_bool() {
    assert!(Expr::unary(UnaryOp::Not, int(1), Span::unknown()).is_err());
    let b = Expr::const_bool(true, Span::unknown());
    assert!(Expr::unary(UnaryOp::Not, b, Span::unknown()).is_ok());
}

#[test]
fn test_cast_changes_result_dtype() {
    let cast = Expr::cast(int(1), DataType::Float32, Span::unknown()).unwrap();
    assert_eq!(cast.ty().dtype(), Some(DataType::Float32));
}

#[test]
fn test_make_tuple_type() {
    let tuple = Expr::make_tuple(vec![int(1), Expr::const_bool(true, Span::unknown())], Span::unknown());
    match &*tuple.ty() {
        Type::Tuple(elements) => {
            assert_eq!(elements.len(), 2);
            assert_eq!(elements[0].dtype(), Some(DataType::Int32));
            assert_eq!(elements[1].dtype(), Some(DataType::Bool));
        }
        other => panic!("expected tuple type, got {other}"),
    }
}

#[test]
fn test_tuple_get_bounds() {
    let tuple = Expr::make_tuple(vec![int(1), int(2)], Span::unknown());
    let item = Expr::tuple_get(tuple.clone(), 1, Span::unknown()).unwrap();
    assert_eq!(item.ty().dtype(), Some(DataType::Int32));

    let err = Expr::tuple_get(tuple, 2, Span::unknown()).unwrap_err();
    assert!(matches!(err, Error::TupleIndexOutOfBounds { index: 2, len: 2 }));
}

#[test]
fn test_var_identity_is_by_pointer() {
    let a = Var::new("x", Type::scalar(DataType::Int32), Span::unknown());
    let b = Var::new("x", Type::scalar(DataType::Int32), Span::unknown());
    assert_ne!(a.id(), b.id(), "same name and type, still distinct variables");
}

#[test]
fn test_kwarg_lookup_preserves_order() {
    let kwargs = vec![
        ("beta".to_string(), KwValue::Int(1)),
        ("alpha".to_string(), KwValue::Int(2)),
    ];
    assert_eq!(kwarg(&kwargs, "alpha"), Some(&KwValue::Int(2)));
    assert_eq!(kwarg(&kwargs, "gamma"), None);
    // Insertion order is the emission order.
    let names: Vec<_> = kwargs.iter().map(|(k, _)| k.as_str()).collect();
    assert_eq!(names, ["beta", "alpha"]);
}

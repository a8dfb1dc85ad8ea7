use tessera_dtype::{DataType, MemorySpace};

use crate::error::Error;
use crate::expr::{Expr, KwValue, Var, kwarg};
use crate::op::{self, OpCategory, OpEntry};
use crate::span::Span;
use crate::types::Type;

fn tensor_var(name: &str, dims: &[i64]) -> crate::VarRef {
    let span = Span::unknown();
    let shape = dims.iter().map(|d| Expr::const_int(*d, DataType::Int64, span.clone())).collect();
    Var::new(name, Type::tensor(shape, DataType::Float32, MemorySpace::DDR), span)
}

#[test]
fn test_create_infers_result_type() {
    let a = tensor_var("a", &[16]);
    let call = op::create_simple(
        "tensor.add",
        vec![Expr::var(&a), Expr::var(&a)],
        Span::unknown(),
    )
    .unwrap();
    assert_eq!(call.ty(), a.ty);
}

#[test]
fn test_create_unknown_op() {
    let err = op::create_simple("tensor.no_such_op", vec![], Span::unknown()).unwrap_err();
    assert!(matches!(err, Error::UnknownOp { .. }));
}

#[test]
fn test_create_arity_mismatch() {
    let a = tensor_var("a", &[16]);
    let err = op::create_simple("tensor.add", vec![Expr::var(&a)], Span::unknown()).unwrap_err();
    assert!(matches!(err, Error::ArityMismatch { expected: 2, actual: 1, .. }));
}

#[test]
fn test_block_load_defaults_to_ub() {
    let a = tensor_var("a", &[16]);
    let span = Span::unknown();
    let offsets = Expr::make_tuple(vec![Expr::const_int(0, DataType::Int64, span.clone())], span.clone());
    let shapes = Expr::make_tuple(vec![Expr::const_int(16, DataType::Int64, span.clone())], span.clone());
    let call = op::create_simple("block.load", vec![Expr::var(&a), offsets, shapes], span).unwrap();

    assert!(call.ty().is_tile());
    assert_eq!(call.ty().memory_space(), Some(MemorySpace::UB));
    // The default kwarg is materialized on the call.
    let kwargs = &call.as_call().unwrap().kwargs;
    assert_eq!(kwarg(kwargs, "target_memory"), Some(&KwValue::Memory(MemorySpace::UB)));
}

#[test]
fn test_user_kwargs_override_defaults() {
    let a = tensor_var("a", &[16]);
    let span = Span::unknown();
    let offsets = Expr::make_tuple(vec![Expr::const_int(0, DataType::Int64, span.clone())], span.clone());
    let shapes = Expr::make_tuple(vec![Expr::const_int(16, DataType::Int64, span.clone())], span.clone());
    let call = op::create(
        "block.load",
        vec![Expr::var(&a), offsets, shapes],
        vec![("target_memory".to_string(), KwValue::Memory(MemorySpace::L1))],
        span,
    )
    .unwrap();
    assert_eq!(call.ty().memory_space(), Some(MemorySpace::L1));
}

#[test]
fn test_tensor_create_requires_dtype_kwarg() {
    let span = Span::unknown();
    let shape = Expr::make_tuple(vec![Expr::const_int(16, DataType::Int64, span.clone())], span.clone());
    let err = op::create_simple("tensor.create", vec![shape.clone()], span.clone()).unwrap_err();
    assert!(matches!(err, Error::MissingKwarg { .. }));

    let call = op::create(
        "tensor.create",
        vec![shape],
        vec![("dtype".to_string(), KwValue::DType(DataType::Float32))],
        span,
    )
    .unwrap();
    assert!(call.ty().is_tensor());
    assert_eq!(call.ty().dtype(), Some(DataType::Float32));
}

#[test]
fn test_register_duplicate_fails() {
    fn infer_void(_: &str, _: &[crate::ExprRef], _: &crate::Kwargs, _: &Span) -> crate::Result<crate::TypeRef> {
        Ok(Type::void())
    }

    op::register("custom.noop", OpEntry::new(OpCategory::Scalar, infer_void)).unwrap();
    assert!(op::is_registered("custom.noop"));

    let err = op::register("custom.noop", OpEntry::new(OpCategory::Scalar, infer_void)).unwrap_err();
    assert!(matches!(err, Error::DuplicateOp { .. }));

    let err = op::register("tensor.add", OpEntry::new(OpCategory::Scalar, infer_void)).unwrap_err();
    assert!(matches!(err, Error::DuplicateOp { .. }));
}

#[test]
fn test_reset_restores_builtins_and_drops_custom() {
    fn infer_void(_: &str, _: &[crate::ExprRef], _: &crate::Kwargs, _: &Span) -> crate::Result<crate::TypeRef> {
        Ok(Type::void())
    }

    op::register("custom.transient", OpEntry::new(OpCategory::Scalar, infer_void)).unwrap();
    assert!(op::is_registered("custom.transient"));

    op::reset();
    assert!(!op::is_registered("custom.transient"));
    assert!(op::is_registered("tensor.add"));
    assert!(op::is_registered("block.store"));
}

#[test]
fn test_entry_reports_category() {
    assert_eq!(op::entry("tensor.add").unwrap().category, OpCategory::Tensor);
    assert_eq!(op::entry("block.add").unwrap().category, OpCategory::Block);
    assert_eq!(op::entry("scope.begin_incore").unwrap().category, OpCategory::Scope);
    assert_eq!(op::entry("tensor.add").unwrap().category.as_str(), "TensorOp");
}

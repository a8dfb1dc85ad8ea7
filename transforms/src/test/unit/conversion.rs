use std::rc::Rc;

use tessera_dtype::{DataType, MemorySpace};
use tessera_ir::{Expr, Span, Stmt, Type, Var, op};

use crate::conversion::{self, ConversionResult};
use crate::test::helpers::{dims, span};

fn tile_var(name: &str) -> tessera_ir::VarRef {
    Var::new(name, Type::tile(dims(&[16]), DataType::Float32, MemorySpace::UB), span())
}

#[test]
fn test_baseline_mappings_present() {
    for name in [
        "tensor.add",
        "tensor.sub",
        "tensor.mul",
        "tensor.div",
        "tensor.maximum",
        "tensor.add_scalar",
        "tensor.sub_scalar",
        "tensor.mul_scalar",
        "tensor.div_scalar",
        "tensor.exp",
        "tensor.cast",
        "tensor.reshape",
        "tensor.transpose",
    ] {
        assert!(conversion::has_conversion(name), "{name} should have a baseline conversion");
    }
    assert!(!conversion::has_conversion("tensor.create"));
    assert!(!conversion::has_conversion("block.add"));
}

#[test]
fn test_simple_conversion_produces_block_call() {
    let a = tile_var("a");
    let b = tile_var("b");
    let converter = conversion::lookup("tensor.add").expect("baseline rule");

    let result = converter(&[Expr::var(&a), Expr::var(&b)], &Vec::new(), &span()).unwrap();
    assert!(result.prologue.is_empty());
    let call = result.result.as_call().expect("conversion result is a call");
    assert!(call.is_op("block.add"));
    assert!(result.result.ty().is_tile());
}

#[test]
fn test_reregistering_replaces_rule() {
    conversion::register_simple("tensor.add", "block.maximum");

    let a = tile_var("a");
    let converter = conversion::lookup("tensor.add").expect("rule still present");
    let result = converter(&[Expr::var(&a), Expr::var(&a)], &Vec::new(), &span()).unwrap();
    assert!(result.result.as_call().unwrap().is_op("block.maximum"));

    conversion::reset();
    let converter = conversion::lookup("tensor.add").expect("baseline restored");
    let result = converter(&[Expr::var(&a), Expr::var(&a)], &Vec::new(), &span()).unwrap();
    assert!(result.result.as_call().unwrap().is_op("block.add"));
}

#[test]
fn test_custom_conversion_with_prologue() {
    // A matmul-style rule: stage the left operand into L0A first.
    conversion::register_custom(
        "tensor.staged_add",
        Rc::new(|args, _kwargs, span| {
            let moved = op::create(
                "block.move",
                vec![args[0].clone()],
                vec![("target_memory".to_string(), tessera_ir::KwValue::Memory(MemorySpace::L0A))],
                span.clone(),
            )?;
            let staged = Var::new("staged", moved.ty(), span.clone());
            let prologue = vec![Stmt::assign(staged.clone(), moved, span.clone())?];
            let call = op::create_simple(
                "block.add",
                vec![Expr::var(&staged), args[1].clone()],
                span.clone(),
            )?;
            Ok(ConversionResult::with_prologue(prologue, call))
        }),
    );

    let a = Var::new("a", Type::tile(dims(&[16]), DataType::Float32, MemorySpace::L0A), span());
    let b = Var::new("b", Type::tile(dims(&[16]), DataType::Float32, MemorySpace::L0A), span());
    let converter = conversion::lookup("tensor.staged_add").expect("custom rule");
    let result = converter(&[Expr::var(&a), Expr::var(&b)], &Vec::new(), &Span::unknown()).unwrap();

    assert_eq!(result.prologue.len(), 1);
    assert!(result.result.as_call().unwrap().is_op("block.add"));

    conversion::reset();
}

#[test]
fn test_conversion_propagates_kwargs() {
    let a = tile_var("a");
    let converter = conversion::lookup("tensor.cast").expect("baseline rule");
    let kwargs = vec![("dtype".to_string(), tessera_ir::KwValue::DType(DataType::Float16))];
    let result = converter(&[Expr::var(&a)], &kwargs, &span()).unwrap();
    assert_eq!(result.result.ty().dtype(), Some(DataType::Float16));
}

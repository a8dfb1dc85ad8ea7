use tessera_dtype::{DataType, MemorySpace};

use crate::expr::Expr;
use crate::span::Span;
use crate::types::Type;

fn shape16() -> Vec<crate::ExprRef> {
    vec![Expr::const_int(16, DataType::Int64, Span::unknown())]
}

#[test]
fn test_type_equality_is_structural() {
    let a = Type::tensor(shape16(), DataType::Float32, MemorySpace::DDR);
    let b = Type::tensor(shape16(), DataType::Float32, MemorySpace::DDR);
    assert_eq!(a, b, "independently built identical types compare equal");

    let c = Type::tensor(shape16(), DataType::Float16, MemorySpace::DDR);
    assert_ne!(a, c);

    let d = Type::tensor(shape16(), DataType::Float32, MemorySpace::UB);
    assert_ne!(a, d);
}

#[test]
fn test_tensor_vs_tile_differ() {
    let tensor = Type::tensor(shape16(), DataType::Float32, MemorySpace::DDR);
    let tile = Type::tile(shape16(), DataType::Float32, MemorySpace::DDR);
    assert_ne!(tensor, tile);
}

#[test]
fn test_tuple_equality() {
    let a = Type::tuple(vec![Type::scalar(DataType::Int32), Type::scalar(DataType::Bool)]);
    let b = Type::tuple(vec![Type::scalar(DataType::Int32), Type::scalar(DataType::Bool)]);
    let c = Type::tuple(vec![Type::scalar(DataType::Bool), Type::scalar(DataType::Int32)]);
    assert_eq!(a, b);
    assert_ne!(a, c);
}

#[test]
fn test_element_count_and_size() {
    let span = Span::unknown();
    let shape = vec![
        Expr::const_int(32, DataType::Int64, span.clone()),
        Expr::const_int(64, DataType::Int64, span.clone()),
    ];
    let ty = Type::tensor(shape, DataType::Float16, MemorySpace::DDR);
    assert_eq!(ty.element_count(), Some(2048));
    assert_eq!(ty.size_bytes(), Some(4096));

    assert_eq!(Type::scalar(DataType::Int32).element_count(), None);
}

#[test]
fn test_display() {
    let ty = Type::tensor(shape16(), DataType::Float32, MemorySpace::DDR);
    assert_eq!(ty.to_string(), "Tensor[[16], FP32, DDR]");

    let tile = Type::tile(shape16(), DataType::BFloat16, MemorySpace::UB);
    assert_eq!(tile.to_string(), "Tile[[16], BF16, UB]");

    assert_eq!(Type::void().to_string(), "void");
}

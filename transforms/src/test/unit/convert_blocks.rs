//! Tests for the tensor-op → block-op lowering pass.

use tessera_dtype::{DataType, MemorySpace};
use tessera_ir::{
    Call, Callee, Expr, Function, FunctionKind, GlobalVar, KwValue, Stmt, Type, Var,
    assert_structural_equal, op, structural_equal,
};

use crate::passes::convert_tensor_to_block_ops;
use crate::test::helpers::*;

fn zeros(ndim: usize) -> tessera_ir::ExprRef {
    Expr::make_tuple(
        (0..ndim).map(|_| Expr::const_int(0, DataType::Int64, span())).collect(),
        span(),
    )
}

fn shape_tuple(shape: &[i64]) -> tessera_ir::ExprRef {
    Expr::make_tuple(dims(shape), span())
}

/// The expected Phase-1 result for `incore_add_function`:
///
/// ```text
/// a_tile = block.load(a, (0,), (16,), target_memory=UB)
/// t_tile = block.add(a_tile, a_tile)
/// out_0  = block.store(t_tile, (0,), (16,), out_0)
/// return out_0
/// ```
fn expected_incore_add(name: &str, shape: &[i64], dtype: DataType) -> tessera_ir::FuncRef {
    let ndim = shape.len();
    let a = tensor_param("a", shape, dtype);
    let out_param = Var::new("out_0", tensor_ty(shape, dtype), span());

    let load = op::create(
        "block.load",
        vec![Expr::var(&a), zeros(ndim), shape_tuple(shape)],
        vec![("target_memory".to_string(), KwValue::Memory(MemorySpace::UB))],
        span(),
    )
    .unwrap();
    let a_tile = Var::new("a_tile", load.ty(), span());

    let add = op::create_simple("block.add", vec![Expr::var(&a_tile), Expr::var(&a_tile)], span()).unwrap();
    let t_tile = Var::new("t_tile", add.ty(), span());

    let store = op::create_simple(
        "block.store",
        vec![Expr::var(&t_tile), zeros(ndim), shape_tuple(shape), Expr::var(&out_param)],
        span(),
    )
    .unwrap();
    let out_result = Var::new("out_0", store.ty(), span());

    let body = Stmt::seq(
        vec![
            Stmt::assign(a_tile.clone(), load, span()).unwrap(),
            Stmt::assign(t_tile.clone(), add, span()).unwrap(),
            Stmt::assign(out_result.clone(), store, span()).unwrap(),
            Stmt::ret(vec![Expr::var(&out_result)], span()),
        ],
        span(),
    );
    Function::new(
        name,
        vec![a, out_param],
        vec![tensor_ty(shape, dtype)],
        body,
        span(),
        FunctionKind::InCore,
    )
}

/// The expected Phase-2 result for `orchestration_calling`:
///
/// ```text
/// out_0 = tensor.create((16,), dtype=FP32)
/// y     = f(x, out_0)
/// return y
/// ```
fn expected_orchestration(callee: &str, shape: &[i64], dtype: DataType) -> tessera_ir::FuncRef {
    let x = tensor_param("x", shape, dtype);
    let create = op::create(
        "tensor.create",
        vec![shape_tuple(shape)],
        vec![("dtype".to_string(), KwValue::DType(dtype))],
        span(),
    )
    .unwrap();
    let out_var = Var::new("out_0", create.ty(), span());

    let call = Call::function(
        GlobalVar::new(callee, span()),
        vec![Expr::var(&x), Expr::var(&out_var)],
        Vec::new(),
        tensor_ty(shape, dtype),
        span(),
    );
    let y = Var::new("y", call.ty(), span());

    let body = Stmt::seq(
        vec![
            Stmt::assign(out_var.clone(), create, span()).unwrap(),
            Stmt::assign(y.clone(), call, span()).unwrap(),
            Stmt::ret(vec![Expr::var(&y)], span()),
        ],
        span(),
    );
    Function::new(
        "main",
        vec![x],
        vec![tensor_ty(shape, dtype)],
        body,
        span(),
        FunctionKind::Orchestration,
    )
}

#[test]
fn test_simple_elementwise_add() {
    let f = incore_add_function("f", &[16], DataType::Float32);
    let input = program(vec![f]);

    let result = convert_tensor_to_block_ops().run(&input).unwrap();

    let converted = result.function("f").expect("function kept");
    let expected = expected_incore_add("f", &[16], DataType::Float32);
    assert_structural_equal(converted, &expected, false).unwrap();
    assert_eq!(converted.params.len(), 2, "one output parameter appended");
}

#[test]
fn test_call_site_rewrite() {
    let f = incore_add_function("f", &[16], DataType::Float32);
    let main = orchestration_calling(&f, &[16], DataType::Float32);
    let input = program(vec![f, main]);

    let result = convert_tensor_to_block_ops().run(&input).unwrap();

    let main = result.function("main").expect("function kept");
    let expected = expected_orchestration("f", &[16], DataType::Float32);
    assert_structural_equal(main, &expected, false).unwrap();

    // Whole-program comparison: same insertion order, both phases applied.
    let expected_program = program(vec![
        expected_incore_add("f", &[16], DataType::Float32),
        expected_orchestration("f", &[16], DataType::Float32),
    ]);
    assert_structural_equal(&result, &expected_program, false).unwrap();
}

#[test]
fn test_2d_tensor_offsets_and_shapes() {
    let f = incore_add_function("f", &[32, 64], DataType::Float16);
    let input = program(vec![f]);

    let result = convert_tensor_to_block_ops().run(&input).unwrap();

    let converted = result.function("f").expect("function kept");
    let expected = expected_incore_add("f", &[32, 64], DataType::Float16);
    assert_structural_equal(converted, &expected, false).unwrap();
}

#[test]
fn test_chained_ops_substitute_through() {
    // y = tensor.add(x, x); z = tensor.mul(y, y): the second op must see
    // y's tile, not y.
    let x = tensor_param("x", &[16], DataType::Float32);
    let add = op::create_simple("tensor.add", vec![Expr::var(&x), Expr::var(&x)], span()).unwrap();
    let y = Var::new("y", add.ty(), span());
    let mul = op::create_simple("tensor.mul", vec![Expr::var(&y), Expr::var(&y)], span()).unwrap();
    let z = Var::new("z", mul.ty(), span());
    let body = Stmt::seq(
        vec![
            Stmt::assign(y.clone(), add, span()).unwrap(),
            Stmt::assign(z.clone(), mul, span()).unwrap(),
            Stmt::ret(vec![Expr::var(&z)], span()),
        ],
        span(),
    );
    let f = Function::new(
        "f",
        vec![x],
        vec![tensor_ty(&[16], DataType::Float32)],
        body,
        span(),
        FunctionKind::InCore,
    );

    let result = convert_tensor_to_block_ops().run(&program(vec![f])).unwrap();
    let text = result.to_string();
    assert!(text.contains("block.add(x_tile, x_tile)"), "got:\n{text}");
    assert!(text.contains("block.mul(y_tile, y_tile)"), "got:\n{text}");
    assert!(text.contains("block.store(z_tile"), "got:\n{text}");
}

#[test]
fn test_non_convertible_call_survives_with_substitution() {
    // `opaque.g` has no conversion: the call survives verbatim except that
    // its tensor argument is substituted with the loaded tile.
    fn infer_passthrough(
        _op: &str,
        args: &[tessera_ir::ExprRef],
        _kwargs: &tessera_ir::Kwargs,
        _span: &tessera_ir::Span,
    ) -> tessera_ir::Result<tessera_ir::TypeRef> {
        Ok(args[0].ty())
    }
    let _ = op::register(
        "opaque.g",
        op::OpEntry::new(op::OpCategory::Scalar, infer_passthrough),
    );

    let a = tensor_param("a", &[16], DataType::Float32);
    let call = op::create_simple("opaque.g", vec![Expr::var(&a)], span()).unwrap();
    let t = Var::new("t", call.ty(), span());
    let body = Stmt::seq(
        vec![
            Stmt::assign(t.clone(), call, span()).unwrap(),
            Stmt::ret(vec![Expr::var(&t)], span()),
        ],
        span(),
    );
    let f = Function::new(
        "f",
        vec![a],
        vec![tensor_ty(&[16], DataType::Float32)],
        body,
        span(),
        FunctionKind::InCore,
    );

    let result = convert_tensor_to_block_ops().run(&program(vec![f])).unwrap();
    let converted = result.function("f").expect("function kept");

    // Expected: a_tile = block.load(a, ...); t = opaque.g(a_tile); return t.
    // The call keeps its original result type through substitution.
    let a = tensor_param("a", &[16], DataType::Float32);
    let load = op::create(
        "block.load",
        vec![Expr::var(&a), zeros(1), shape_tuple(&[16])],
        vec![("target_memory".to_string(), KwValue::Memory(MemorySpace::UB))],
        span(),
    )
    .unwrap();
    let a_tile = Var::new("a_tile", load.ty(), span());
    let g_call = Call::with_parts(
        Callee::Op(op::Op::new("opaque.g")),
        vec![Expr::var(&a_tile)],
        Vec::new(),
        tensor_ty(&[16], DataType::Float32),
        span(),
    );
    let t = Var::new("t", g_call.ty(), span());
    let body = Stmt::seq(
        vec![
            Stmt::assign(a_tile.clone(), load, span()).unwrap(),
            Stmt::assign(t.clone(), g_call, span()).unwrap(),
            Stmt::ret(vec![Expr::var(&t)], span()),
        ],
        span(),
    );
    let expected = Function::new(
        "f",
        vec![a],
        vec![tensor_ty(&[16], DataType::Float32)],
        body,
        span(),
        FunctionKind::InCore,
    );

    assert_structural_equal(converted, &expected, false).unwrap();
    assert_eq!(converted.params.len(), 1, "no output parameter for a tensor return");
}

#[test]
fn test_empty_program_passes_through() {
    let input = program(vec![]);
    let result = convert_tensor_to_block_ops().run(&input).unwrap();
    assert!(result.is_empty());
    assert!(structural_equal(&input, &result, false));
}

#[test]
fn test_incore_function_without_tensors_unchanged() {
    use tessera_ir::BinaryOp;

    let s = Var::new("s", Type::scalar(DataType::Int32), span());
    let sum = Expr::binary(
        BinaryOp::Add,
        Expr::var(&s),
        Expr::const_int(1, DataType::Int32, span()),
        span(),
    )
    .unwrap();
    let c = Var::new("c", sum.ty(), span());
    let body = Stmt::seq(
        vec![
            Stmt::assign(c.clone(), sum, span()).unwrap(),
            Stmt::ret(vec![Expr::var(&c)], span()),
        ],
        span(),
    );
    let f = Function::new(
        "f",
        vec![s],
        vec![Type::scalar(DataType::Int32)],
        body,
        span(),
        FunctionKind::InCore,
    );
    let input = program(vec![f.clone()]);

    let result = convert_tensor_to_block_ops().run(&input).unwrap();
    let converted = result.function("f").expect("function kept");
    assert_structural_equal(converted, &f, false).unwrap();
    assert_eq!(converted.params.len(), 1);
}

#[test]
fn test_bare_return_body_is_accepted() {
    // Body is a single Return statement, not a Seq: the parameter round-trips
    // through a load and a store into the appended output.
    let a = tensor_param("a", &[16], DataType::Float32);
    let body = Stmt::ret(vec![Expr::var(&a)], span());
    let f = Function::new(
        "f",
        vec![a],
        vec![tensor_ty(&[16], DataType::Float32)],
        body,
        span(),
        FunctionKind::InCore,
    );

    let result = convert_tensor_to_block_ops().run(&program(vec![f])).unwrap();
    let converted = result.function("f").unwrap();
    assert_eq!(converted.params.len(), 2);
    let stmts = Stmt::flatten(&converted.body);
    assert_eq!(stmts.len(), 3, "load, store, return");
    let text = converted.to_string();
    assert!(text.contains("block.load"), "got:\n{text}");
    assert!(text.contains("block.store(a_tile"), "got:\n{text}");
}

#[test]
fn test_orchestration_without_incore_calls_is_kept() {
    let f = incore_add_function("f", &[16], DataType::Float32);
    // main calls nothing InCore-related.
    let x = tensor_param("x", &[16], DataType::Float32);
    let body = Stmt::seq(vec![Stmt::ret(vec![Expr::var(&x)], span())], span());
    let main = Function::new(
        "main",
        vec![x],
        vec![tensor_ty(&[16], DataType::Float32)],
        body,
        span(),
        FunctionKind::Orchestration,
    );
    let main_before = main.clone();

    let result = convert_tensor_to_block_ops().run(&program(vec![f, main])).unwrap();
    let main_after = result.function("main").expect("function kept");
    assert!(std::rc::Rc::ptr_eq(main_after, &main_before), "untouched function is shared");
}

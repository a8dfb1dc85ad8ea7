//! The process-wide operator registry.
//!
//! Maps op names (`tensor.add`, `block.load`, ...) to their metadata:
//! category, default kwargs, and a result-type inference rule. Registration
//! happens once at startup (the built-in table is installed on first
//! access); afterwards the table is read-only. The registry is
//! `thread_local`, so concurrent pipelines on different threads read their
//! own frozen copy without locking.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use snafu::ensure;

use tessera_dtype::{DataType, MemorySpace};

use crate::error::{self, Result};
use crate::expr::{Call, Callee, Expr, ExprRef, KwValue, Kwargs, kwarg};
use crate::span::Span;
use crate::types::{Type, TypeRef};

/// A primitive operator, identified by name. Lives inside [`Callee::Op`].
#[derive(Debug)]
pub struct Op {
    pub name: String,
}

impl Op {
    pub fn new(name: impl Into<String>) -> Rc<Self> {
        Rc::new(Self { name: name.into() })
    }
}

/// Coarse op classification, used by verifiers and the conversion pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpCategory {
    Tensor,
    Block,
    Scalar,
    Scope,
}

impl OpCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tensor => "TensorOp",
            Self::Block => "BlockOp",
            Self::Scalar => "ScalarOp",
            Self::Scope => "ScopeOp",
        }
    }
}

/// Result-type inference rule. Receives the op name for diagnostics.
pub type InferFn = fn(&str, &[ExprRef], &Kwargs, &Span) -> Result<TypeRef>;

/// Registry entry for one op.
#[derive(Debug, Clone)]
pub struct OpEntry {
    pub category: OpCategory,
    pub default_kwargs: Kwargs,
    pub infer: InferFn,
}

impl OpEntry {
    pub fn new(category: OpCategory, infer: InferFn) -> Self {
        Self { category, default_kwargs: Vec::new(), infer }
    }

    pub fn with_defaults(category: OpCategory, default_kwargs: Kwargs, infer: InferFn) -> Self {
        Self { category, default_kwargs, infer }
    }
}

thread_local! {
    static REGISTRY: RefCell<Option<HashMap<String, OpEntry>>> = const { RefCell::new(None) };
}

fn with_registry<R>(f: impl FnOnce(&mut HashMap<String, OpEntry>) -> R) -> R {
    REGISTRY.with(|registry| {
        let mut registry = registry.borrow_mut();
        let table = registry.get_or_insert_with(builtin_table);
        f(table)
    })
}

/// Register an op. Fails with `DuplicateOp` if the name is taken.
pub fn register(name: &str, entry: OpEntry) -> Result<()> {
    with_registry(|table| {
        ensure!(!table.contains_key(name), error::DuplicateOpSnafu { name });
        tracing::debug!(op = name, category = entry.category.as_str(), "registered op");
        table.insert(name.to_string(), entry);
        Ok(())
    })
}

pub fn is_registered(name: &str) -> bool {
    with_registry(|table| table.contains_key(name))
}

/// Registry entry for `name`, or `UnknownOp`.
pub fn entry(name: &str) -> Result<OpEntry> {
    with_registry(|table| table.get(name).cloned().ok_or_else(|| error::UnknownOpSnafu { name }.build()))
}

/// Drop every registration and re-install the built-in table on next access.
/// Test hook; must not be called while a pipeline is running.
pub fn reset() {
    REGISTRY.with(|registry| {
        *registry.borrow_mut() = None;
    });
}

/// Build an op call: merges default kwargs under the user's (user wins,
/// defaults keep their position), infers the result type, and returns a new
/// immutable `Call` expression.
pub fn create(name: &str, args: Vec<ExprRef>, kwargs: Kwargs, span: Span) -> Result<ExprRef> {
    let entry = entry(name)?;

    let mut merged: Kwargs = entry.default_kwargs.clone();
    for (key, value) in kwargs {
        match merged.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => merged.push((key, value)),
        }
    }

    let ty = (entry.infer)(name, &args, &merged, &span)?;
    Ok(Call::with_parts(Callee::Op(Op::new(name)), args, merged, ty, span))
}

/// `create` without keyword arguments.
pub fn create_simple(name: &str, args: Vec<ExprRef>, span: Span) -> Result<ExprRef> {
    create(name, args, Vec::new(), span)
}

// ---------------------------------------------------------------------------
// Inference helpers
// ---------------------------------------------------------------------------

fn expect_arity(op: &str, args: &[ExprRef], expected: usize) -> Result<()> {
    ensure!(
        args.len() == expected,
        error::ArityMismatchSnafu { op, expected, actual: args.len() }
    );
    Ok(())
}

fn expect_tensor(op: &str, arg: &ExprRef) -> Result<TypeRef> {
    let ty = arg.ty();
    ensure!(
        ty.is_tensor(),
        error::TypeMismatchSnafu {
            context: format!("op '{op}'"),
            expected: "TensorType".to_string(),
            actual: ty.to_string(),
        }
    );
    Ok(ty)
}

fn expect_tile(op: &str, arg: &ExprRef) -> Result<TypeRef> {
    let ty = arg.ty();
    ensure!(
        ty.is_tile(),
        error::TypeMismatchSnafu {
            context: format!("op '{op}'"),
            expected: "TileType".to_string(),
            actual: ty.to_string(),
        }
    );
    Ok(ty)
}

fn expect_scalar(op: &str, arg: &ExprRef) -> Result<DataType> {
    match &*arg.ty() {
        Type::Scalar(dtype) => Ok(*dtype),
        other => error::TypeMismatchSnafu {
            context: format!("op '{op}'"),
            expected: "ScalarType".to_string(),
            actual: other.to_string(),
        }
        .fail(),
    }
}

fn tuple_elements<'a>(op: &str, arg: &'a ExprRef) -> Result<&'a [ExprRef]> {
    arg.as_make_tuple().ok_or_else(|| {
        error::TypeMismatchSnafu {
            context: format!("op '{op}'"),
            expected: "MakeTuple".to_string(),
            actual: arg.type_name().to_string(),
        }
        .build()
    })
}

fn kwarg_dtype(op: &str, kwargs: &Kwargs, name: &str) -> Result<DataType> {
    match kwarg(kwargs, name) {
        Some(KwValue::DType(dtype)) => Ok(*dtype),
        Some(_) => error::KwargTypeSnafu { op, name, expected: "a DataType" }.fail(),
        None => error::MissingKwargSnafu { op, name }.fail(),
    }
}

fn kwarg_memory(op: &str, kwargs: &Kwargs, name: &str) -> Result<MemorySpace> {
    match kwarg(kwargs, name) {
        Some(KwValue::Memory(space)) => Ok(*space),
        Some(_) => error::KwargTypeSnafu { op, name, expected: "a MemorySpace" }.fail(),
        None => error::MissingKwargSnafu { op, name }.fail(),
    }
}

fn same_type(op: &str, lhs: &TypeRef, rhs: &TypeRef) -> Result<()> {
    ensure!(
        lhs == rhs,
        error::TypeMismatchSnafu {
            context: format!("op '{op}'"),
            expected: lhs.to_string(),
            actual: rhs.to_string(),
        }
    );
    Ok(())
}

// ---------------------------------------------------------------------------
// Inference rules
// ---------------------------------------------------------------------------

fn infer_tensor_create(op: &str, args: &[ExprRef], kwargs: &Kwargs, _span: &Span) -> Result<TypeRef> {
    expect_arity(op, args, 1)?;
    let shape = tuple_elements(op, &args[0])?;
    let dtype = kwarg_dtype(op, kwargs, "dtype")?;
    Ok(Type::tensor(shape.to_vec(), dtype, MemorySpace::DDR))
}

fn infer_tensor_read(op: &str, args: &[ExprRef], _kwargs: &Kwargs, _span: &Span) -> Result<TypeRef> {
    expect_arity(op, args, 2)?;
    let tensor = expect_tensor(op, &args[0])?;
    tuple_elements(op, &args[1])?;
    Ok(Type::scalar(tensor.dtype().expect("tensor type has a dtype")))
}

fn infer_tensor_dim(op: &str, args: &[ExprRef], _kwargs: &Kwargs, _span: &Span) -> Result<TypeRef> {
    expect_arity(op, args, 2)?;
    expect_tensor(op, &args[0])?;
    Ok(Type::scalar(DataType::Int64))
}

fn infer_tensor_elementwise(op: &str, args: &[ExprRef], _kwargs: &Kwargs, _span: &Span) -> Result<TypeRef> {
    expect_arity(op, args, 2)?;
    let lhs = expect_tensor(op, &args[0])?;
    let rhs = expect_tensor(op, &args[1])?;
    same_type(op, &lhs, &rhs)?;
    Ok(lhs)
}

fn infer_tensor_scalar(op: &str, args: &[ExprRef], _kwargs: &Kwargs, _span: &Span) -> Result<TypeRef> {
    expect_arity(op, args, 2)?;
    let tensor = expect_tensor(op, &args[0])?;
    expect_scalar(op, &args[1])?;
    Ok(tensor)
}

fn infer_tensor_unary(op: &str, args: &[ExprRef], _kwargs: &Kwargs, _span: &Span) -> Result<TypeRef> {
    expect_arity(op, args, 1)?;
    expect_tensor(op, &args[0])
}

fn infer_tensor_cast(op: &str, args: &[ExprRef], kwargs: &Kwargs, _span: &Span) -> Result<TypeRef> {
    expect_arity(op, args, 1)?;
    let tensor = expect_tensor(op, &args[0])?;
    let dtype = kwarg_dtype(op, kwargs, "dtype")?;
    let shape = tensor.shape().expect("tensor type has a shape").to_vec();
    Ok(Type::tensor(shape, dtype, tensor.memory_space().expect("tensor type has a memory space")))
}

fn infer_tensor_reshape(op: &str, args: &[ExprRef], _kwargs: &Kwargs, _span: &Span) -> Result<TypeRef> {
    expect_arity(op, args, 2)?;
    let tensor = expect_tensor(op, &args[0])?;
    let new_shape = tuple_elements(op, &args[1])?;
    Ok(Type::tensor(
        new_shape.to_vec(),
        tensor.dtype().expect("tensor type has a dtype"),
        tensor.memory_space().expect("tensor type has a memory space"),
    ))
}

fn infer_tensor_transpose(op: &str, args: &[ExprRef], _kwargs: &Kwargs, _span: &Span) -> Result<TypeRef> {
    expect_arity(op, args, 1)?;
    let tensor = expect_tensor(op, &args[0])?;
    let mut shape = tensor.shape().expect("tensor type has a shape").to_vec();
    shape.reverse();
    Ok(Type::tensor(
        shape,
        tensor.dtype().expect("tensor type has a dtype"),
        tensor.memory_space().expect("tensor type has a memory space"),
    ))
}

fn infer_block_load(op: &str, args: &[ExprRef], kwargs: &Kwargs, _span: &Span) -> Result<TypeRef> {
    expect_arity(op, args, 3)?;
    let tensor = expect_tensor(op, &args[0])?;
    tuple_elements(op, &args[1])?;
    let shapes = tuple_elements(op, &args[2])?;
    let target = kwarg_memory(op, kwargs, "target_memory")?;
    Ok(Type::tile(shapes.to_vec(), tensor.dtype().expect("tensor type has a dtype"), target))
}

fn infer_block_store(op: &str, args: &[ExprRef], _kwargs: &Kwargs, _span: &Span) -> Result<TypeRef> {
    expect_arity(op, args, 4)?;
    expect_tile(op, &args[0])?;
    tuple_elements(op, &args[1])?;
    tuple_elements(op, &args[2])?;
    expect_tensor(op, &args[3])
}

fn infer_block_elementwise(op: &str, args: &[ExprRef], _kwargs: &Kwargs, _span: &Span) -> Result<TypeRef> {
    expect_arity(op, args, 2)?;
    let lhs = expect_tile(op, &args[0])?;
    let rhs = expect_tile(op, &args[1])?;
    same_type(op, &lhs, &rhs)?;
    Ok(lhs)
}

fn infer_block_scalar(op: &str, args: &[ExprRef], _kwargs: &Kwargs, _span: &Span) -> Result<TypeRef> {
    expect_arity(op, args, 2)?;
    let tile = expect_tile(op, &args[0])?;
    expect_scalar(op, &args[1])?;
    Ok(tile)
}

fn infer_block_unary(op: &str, args: &[ExprRef], _kwargs: &Kwargs, _span: &Span) -> Result<TypeRef> {
    expect_arity(op, args, 1)?;
    expect_tile(op, &args[0])
}

fn infer_block_cast(op: &str, args: &[ExprRef], kwargs: &Kwargs, _span: &Span) -> Result<TypeRef> {
    expect_arity(op, args, 1)?;
    let tile = expect_tile(op, &args[0])?;
    let dtype = kwarg_dtype(op, kwargs, "dtype")?;
    let shape = tile.shape().expect("tile type has a shape").to_vec();
    Ok(Type::tile(shape, dtype, tile.memory_space().expect("tile type has a memory space")))
}

fn infer_block_reshape(op: &str, args: &[ExprRef], _kwargs: &Kwargs, _span: &Span) -> Result<TypeRef> {
    expect_arity(op, args, 2)?;
    let tile = expect_tile(op, &args[0])?;
    let new_shape = tuple_elements(op, &args[1])?;
    Ok(Type::tile(
        new_shape.to_vec(),
        tile.dtype().expect("tile type has a dtype"),
        tile.memory_space().expect("tile type has a memory space"),
    ))
}

fn infer_block_transpose(op: &str, args: &[ExprRef], _kwargs: &Kwargs, _span: &Span) -> Result<TypeRef> {
    expect_arity(op, args, 1)?;
    let tile = expect_tile(op, &args[0])?;
    let mut shape = tile.shape().expect("tile type has a shape").to_vec();
    shape.reverse();
    Ok(Type::tile(
        shape,
        tile.dtype().expect("tile type has a dtype"),
        tile.memory_space().expect("tile type has a memory space"),
    ))
}

fn infer_block_move(op: &str, args: &[ExprRef], kwargs: &Kwargs, _span: &Span) -> Result<TypeRef> {
    expect_arity(op, args, 1)?;
    let tile = expect_tile(op, &args[0])?;
    let target = kwarg_memory(op, kwargs, "target_memory")?;
    let shape = tile.shape().expect("tile type has a shape").to_vec();
    Ok(Type::tile(shape, tile.dtype().expect("tile type has a dtype"), target))
}

fn infer_block_alloc(op: &str, args: &[ExprRef], _kwargs: &Kwargs, _span: &Span) -> Result<TypeRef> {
    expect_arity(op, args, 1)?;
    ensure!(
        matches!(&*args[0], Expr::MemRef(_)),
        error::TypeMismatchSnafu {
            context: format!("op '{op}'"),
            expected: "MemRef".to_string(),
            actual: args[0].type_name().to_string(),
        }
    );
    Ok(Type::void())
}

fn infer_void(op: &str, args: &[ExprRef], _kwargs: &Kwargs, _span: &Span) -> Result<TypeRef> {
    expect_arity(op, args, 0)?;
    Ok(Type::void())
}

// ---------------------------------------------------------------------------
// Built-in table
// ---------------------------------------------------------------------------

fn builtin_table() -> HashMap<String, OpEntry> {
    use OpCategory::*;

    let ub = || vec![("target_memory".to_string(), KwValue::Memory(MemorySpace::UB))];

    let entries: Vec<(&str, OpEntry)> = vec![
        // Tensor ops (orchestration level)
        ("tensor.create", OpEntry::new(Tensor, infer_tensor_create)),
        ("tensor.read", OpEntry::new(Tensor, infer_tensor_read)),
        ("tensor.dim", OpEntry::new(Tensor, infer_tensor_dim)),
        ("tensor.add", OpEntry::new(Tensor, infer_tensor_elementwise)),
        ("tensor.sub", OpEntry::new(Tensor, infer_tensor_elementwise)),
        ("tensor.mul", OpEntry::new(Tensor, infer_tensor_elementwise)),
        ("tensor.div", OpEntry::new(Tensor, infer_tensor_elementwise)),
        ("tensor.maximum", OpEntry::new(Tensor, infer_tensor_elementwise)),
        ("tensor.add_scalar", OpEntry::new(Tensor, infer_tensor_scalar)),
        ("tensor.sub_scalar", OpEntry::new(Tensor, infer_tensor_scalar)),
        ("tensor.mul_scalar", OpEntry::new(Tensor, infer_tensor_scalar)),
        ("tensor.div_scalar", OpEntry::new(Tensor, infer_tensor_scalar)),
        ("tensor.exp", OpEntry::new(Tensor, infer_tensor_unary)),
        ("tensor.cast", OpEntry::new(Tensor, infer_tensor_cast)),
        ("tensor.reshape", OpEntry::new(Tensor, infer_tensor_reshape)),
        ("tensor.transpose", OpEntry::new(Tensor, infer_tensor_transpose)),
        // Block ops (tile level)
        ("block.load", OpEntry::with_defaults(Block, ub(), infer_block_load)),
        ("block.store", OpEntry::new(Block, infer_block_store)),
        ("block.add", OpEntry::new(Block, infer_block_elementwise)),
        ("block.sub", OpEntry::new(Block, infer_block_elementwise)),
        ("block.mul", OpEntry::new(Block, infer_block_elementwise)),
        ("block.div", OpEntry::new(Block, infer_block_elementwise)),
        ("block.maximum", OpEntry::new(Block, infer_block_elementwise)),
        ("block.adds", OpEntry::new(Block, infer_block_scalar)),
        ("block.subs", OpEntry::new(Block, infer_block_scalar)),
        ("block.muls", OpEntry::new(Block, infer_block_scalar)),
        ("block.divs", OpEntry::new(Block, infer_block_scalar)),
        ("block.exp", OpEntry::new(Block, infer_block_unary)),
        ("block.cast", OpEntry::new(Block, infer_block_cast)),
        ("block.reshape", OpEntry::new(Block, infer_block_reshape)),
        ("block.transpose", OpEntry::new(Block, infer_block_transpose)),
        ("block.move", OpEntry::with_defaults(Block, ub(), infer_block_move)),
        ("block.alloc", OpEntry::new(Block, infer_block_alloc)),
        // Pipe synchronization (emitted by insert_sync)
        ("block.sync_src", OpEntry::new(Block, infer_void)),
        ("block.sync_dst", OpEntry::new(Block, infer_void)),
        ("block.bar_v", OpEntry::new(Block, infer_void)),
        ("block.bar_m", OpEntry::new(Block, infer_void)),
        // Region markers consumed by outline_incore_scopes
        ("scope.begin_incore", OpEntry::new(Scope, infer_void)),
        ("scope.end_incore", OpEntry::new(Scope, infer_void)),
    ];

    entries.into_iter().map(|(name, entry)| (name.to_string(), entry)).collect()
}

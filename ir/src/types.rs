//! IR types: scalars, tensors, tiles, tuples, function signatures.
//!
//! Type equality is structural and never subject to α-mapping: variable
//! names do not participate in type identity. `PartialEq` therefore
//! delegates to [`crate::structural::type_equal`].

use std::fmt;
use std::rc::Rc;

use tessera_dtype::{DataType, MemorySpace};

use crate::expr::{Expr, ExprRef};

pub type TypeRef = Rc<Type>;

/// An offset/size window a tile exposes over its backing tensor.
#[derive(Debug, Clone)]
pub struct TileView {
    pub offsets: Vec<ExprRef>,
    pub sizes: Vec<ExprRef>,
}

#[derive(Debug)]
pub enum Type {
    Scalar(DataType),
    Tensor {
        shape: Vec<ExprRef>,
        dtype: DataType,
        memory_space: MemorySpace,
    },
    Tile {
        shape: Vec<ExprRef>,
        dtype: DataType,
        memory_space: MemorySpace,
        view: Option<TileView>,
    },
    Tuple(Vec<TypeRef>),
    Function {
        params: Vec<TypeRef>,
        returns: Vec<TypeRef>,
    },
    /// Sentinel for ops and calls that produce no value.
    Void,
}

impl Type {
    pub fn scalar(dtype: DataType) -> TypeRef {
        Rc::new(Self::Scalar(dtype))
    }

    pub fn tensor(shape: Vec<ExprRef>, dtype: DataType, memory_space: MemorySpace) -> TypeRef {
        Rc::new(Self::Tensor { shape, dtype, memory_space })
    }

    pub fn tile(shape: Vec<ExprRef>, dtype: DataType, memory_space: MemorySpace) -> TypeRef {
        Rc::new(Self::Tile { shape, dtype, memory_space, view: None })
    }

    pub fn tile_with_view(
        shape: Vec<ExprRef>,
        dtype: DataType,
        memory_space: MemorySpace,
        view: TileView,
    ) -> TypeRef {
        Rc::new(Self::Tile { shape, dtype, memory_space, view: Some(view) })
    }

    pub fn tuple(elements: Vec<TypeRef>) -> TypeRef {
        Rc::new(Self::Tuple(elements))
    }

    pub fn function(params: Vec<TypeRef>, returns: Vec<TypeRef>) -> TypeRef {
        Rc::new(Self::Function { params, returns })
    }

    pub fn void() -> TypeRef {
        Rc::new(Self::Void)
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Scalar(_) => "ScalarType",
            Self::Tensor { .. } => "TensorType",
            Self::Tile { .. } => "TileType",
            Self::Tuple(_) => "TupleType",
            Self::Function { .. } => "FunctionType",
            Self::Void => "VoidType",
        }
    }

    /// Element dtype for scalar/tensor/tile types.
    pub fn dtype(&self) -> Option<DataType> {
        match self {
            Self::Scalar(dtype) => Some(*dtype),
            Self::Tensor { dtype, .. } | Self::Tile { dtype, .. } => Some(*dtype),
            _ => None,
        }
    }

    pub fn shape(&self) -> Option<&[ExprRef]> {
        match self {
            Self::Tensor { shape, .. } | Self::Tile { shape, .. } => Some(shape),
            _ => None,
        }
    }

    pub fn memory_space(&self) -> Option<MemorySpace> {
        match self {
            Self::Tensor { memory_space, .. } | Self::Tile { memory_space, .. } => Some(*memory_space),
            _ => None,
        }
    }

    pub fn is_scalar(&self) -> bool {
        matches!(self, Self::Scalar(_))
    }

    pub fn is_tensor(&self) -> bool {
        matches!(self, Self::Tensor { .. })
    }

    pub fn is_tile(&self) -> bool {
        matches!(self, Self::Tile { .. })
    }

    pub fn is_void(&self) -> bool {
        matches!(self, Self::Void)
    }

    /// Total element count if every shape dimension is a constant.
    pub fn element_count(&self) -> Option<usize> {
        let shape = self.shape()?;
        let mut count = 1usize;
        for dim in shape {
            match &**dim {
                Expr::ConstInt { value, .. } if *value >= 0 => count = count.checked_mul(*value as usize)?,
                _ => return None,
            }
        }
        Some(count)
    }

    /// Byte size if the shape is fully constant.
    pub fn size_bytes(&self) -> Option<usize> {
        let dtype = self.dtype()?;
        Some(self.element_count()? * dtype.bytes())
    }
}

impl PartialEq for Type {
    fn eq(&self, other: &Self) -> bool {
        crate::structural::type_equal(self, other)
    }
}

impl Eq for Type {}

fn fmt_shape(f: &mut fmt::Formatter<'_>, shape: &[ExprRef]) -> fmt::Result {
    write!(f, "[")?;
    for (i, dim) in shape.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        match &**dim {
            Expr::ConstInt { value, .. } => write!(f, "{value}")?,
            other => write!(f, "{other}")?,
        }
    }
    write!(f, "]")
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scalar(dtype) => write!(f, "{dtype}"),
            Self::Tensor { shape, dtype, memory_space } => {
                write!(f, "Tensor[")?;
                fmt_shape(f, shape)?;
                write!(f, ", {dtype}, {memory_space}]")
            }
            Self::Tile { shape, dtype, memory_space, .. } => {
                write!(f, "Tile[")?;
                fmt_shape(f, shape)?;
                write!(f, ", {dtype}, {memory_space}]")
            }
            Self::Tuple(elements) => {
                write!(f, "(")?;
                for (i, ty) in elements.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{ty}")?;
                }
                write!(f, ")")
            }
            Self::Function { params, returns } => {
                write!(f, "fn(")?;
                for (i, ty) in params.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{ty}")?;
                }
                write!(f, ") -> (")?;
                for (i, ty) in returns.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{ty}")?;
                }
                write!(f, ")")
            }
            Self::Void => write!(f, "void"),
        }
    }
}

use snafu::Snafu;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Clone, PartialEq, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    /// Op name is not present in the registry.
    #[snafu(display("unknown op '{name}'"))]
    UnknownOp { name: String },

    /// Op name registered twice (registration happens once at startup).
    #[snafu(display("op '{name}' is already registered"))]
    DuplicateOp { name: String },

    /// Wrong number of positional arguments to an op.
    #[snafu(display("op '{op}' expects {expected} positional argument(s), got {actual}"))]
    ArityMismatch { op: String, expected: usize, actual: usize },

    /// An operand or assignment has the wrong type.
    #[snafu(display("type mismatch in {context}: expected {expected}, got {actual}"))]
    TypeMismatch { context: String, expected: String, actual: String },

    /// Required keyword argument is absent (and has no default).
    #[snafu(display("op '{op}' is missing required kwarg '{name}'"))]
    MissingKwarg { op: String, name: String },

    /// Keyword argument carries a value of the wrong variant.
    #[snafu(display("op '{op}': kwarg '{name}' expects {expected}"))]
    KwargType { op: String, name: String, expected: &'static str },

    /// Tuple projection out of bounds.
    #[snafu(display("tuple index {index} out of bounds for tuple of {len} element(s)"))]
    TupleIndexOutOfBounds { index: usize, len: usize },

    /// `assert_structural_equal` found a difference.
    #[snafu(display("structural mismatch at {path}: {reason}"))]
    StructuralMismatch { path: String, reason: String },
}

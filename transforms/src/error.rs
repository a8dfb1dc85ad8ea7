use snafu::Snafu;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Clone, PartialEq, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    /// Compiler-internal consistency failure; aborts the current pass and is
    /// considered a bug, not a user diagnostic.
    #[snafu(display("internal check failed in pass '{pass}': {message}"))]
    InternalCheck { pass: String, message: String },

    /// One or more Error-severity diagnostics were collected.
    #[snafu(display("verification failed:\n{report}"))]
    Verification { report: String },

    #[snafu(transparent)]
    Ir { source: tessera_ir::Error },
}

//! IR transformation framework: passes, pipeline, registries, verifiers.
//!
//! A [`tessera_ir::Program`] flows through a [`PassPipeline`]: each
//! [`Pass`] returns a new program, the pipeline folds the pass's property
//! contract into its running [`property::IRPropertySet`], and (optionally)
//! the matching [`verifier`] rules check the actual IR before/after each
//! step.
//!
//! # Module Organization
//!
//! - [`property`] - IR properties and per-pass contracts
//! - [`pass`] - the opaque pass object and its function/program adapters
//! - [`pipeline`] - ordered execution with property tracking
//! - [`conversion`] - the tensor-op → block-op conversion registry
//! - [`verifier`] - diagnostics, per-property verifiers, the rule framework
//! - [`passes`] - all built-in passes

pub mod conversion;
pub mod error;
pub mod pass;
pub mod passes;
pub mod pipeline;
pub mod property;
pub mod verifier;

#[cfg(test)]
pub mod test;

pub use conversion::{ConversionFn, ConversionResult};
pub use error::{Error, Result};
pub use pass::{Pass, PassImpl, create_function_pass, create_program_pass};
pub use pipeline::{PassPipeline, VerificationMode};
pub use property::{IRProperty, IRPropertySet, PassProperties};
pub use verifier::{Diagnostic, IRVerifier, PropertyVerifier, Severity};

//! The pass pipeline: ordered passes, property tracking, optional
//! verification.
//!
//! The pipeline folds each pass's produced/invalidated sets into a running
//! property state, but the state is bookkeeping only: no pass is skipped or
//! reordered because of it, and a required property missing from the state
//! is not an error. When a verification mode is set, the *verifiers* of the
//! required (before) and produced (after) properties run against the actual
//! IR, and any Error diagnostic aborts the run.

use tessera_ir::ProgramRef;

use crate::error::{self, Result};
use crate::pass::Pass;
use crate::property::{IRProperty, IRPropertySet};
use crate::verifier::{IRVerifier, Severity, verifier_for};

/// When property verification runs during [`PassPipeline::run`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VerificationMode {
    /// No automatic verification.
    #[default]
    None,
    /// Verify each pass's required properties before it runs.
    Before,
    /// Verify each pass's produced properties after it runs.
    After,
    /// Both.
    BeforeAndAfter,
}

impl VerificationMode {
    fn before(self) -> bool {
        matches!(self, Self::Before | Self::BeforeAndAfter)
    }

    fn after(self) -> bool {
        matches!(self, Self::After | Self::BeforeAndAfter)
    }
}

#[derive(Default)]
pub struct PassPipeline {
    passes: Vec<Pass>,
    verification_mode: VerificationMode,
    initial_properties: IRPropertySet,
}

impl PassPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_pass(&mut self, pass: Pass) {
        self.passes.push(pass);
    }

    pub fn set_verification_mode(&mut self, mode: VerificationMode) {
        self.verification_mode = mode;
    }

    /// Properties known to hold about the input program.
    pub fn set_initial_properties(&mut self, properties: IRPropertySet) {
        self.initial_properties = properties;
    }

    pub fn pass_names(&self) -> Vec<String> {
        self.passes.iter().map(|p| p.name().to_string()).collect()
    }

    /// Execute all passes in order with property tracking.
    pub fn run(&self, program: &ProgramRef) -> Result<ProgramRef> {
        let mut state = self.initial_properties;
        let mut current = program.clone();

        for pass in &self.passes {
            if self.verification_mode.before() {
                for property in pass.required_properties() {
                    verify_property(property, &current)?;
                }
            }

            current = pass.run(&current)?;

            state = (state - pass.invalidated_properties()) | pass.produced_properties();
            tracing::trace!(pass = pass.name(), properties = ?state, "property state updated");

            if self.verification_mode.after() {
                for property in pass.produced_properties() {
                    verify_property(property, &current)?;
                }
            }
        }

        Ok(current)
    }
}

fn verify_property(property: IRProperty, program: &ProgramRef) -> Result<()> {
    let verifier = verifier_for(property);
    let mut diagnostics = Vec::new();
    verifier.verify(program, &mut diagnostics);
    if diagnostics.iter().any(|d| d.severity == Severity::Error) {
        return error::VerificationSnafu { report: IRVerifier::generate_report(&diagnostics) }.fail();
    }
    Ok(())
}

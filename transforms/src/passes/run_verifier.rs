//! Verification as a pipeline step.

use crate::pass::{Pass, create_program_pass};
use crate::property::RUN_VERIFIER_PROPERTIES;
use crate::verifier::IRVerifier;

/// Runs the default verifier (minus `disabled_rules`) and raises on any
/// Error diagnostic. The program passes through unchanged.
pub fn run_verifier(disabled_rules: &[&str]) -> Pass {
    let disabled: Vec<String> = disabled_rules.iter().map(|r| r.to_string()).collect();
    create_program_pass("RunVerifier", RUN_VERIFIER_PROPERTIES, move |program| {
        let mut verifier = IRVerifier::create_default();
        for rule in &disabled {
            verifier.disable_rule(rule);
        }
        verifier.verify_or_throw(program)?;
        Ok(program.clone())
    })
}

//! Test scaffolding pass: proves a pipeline actually executed.

use tessera_ir::Function;

use crate::pass::{Pass, create_function_pass};
use crate::property::IDENTITY_PROPERTIES;

/// Appends `_identity` to every function name; everything else unchanged.
pub fn identity() -> Pass {
    create_function_pass("Identity", IDENTITY_PROPERTIES, |func| {
        Ok(Function::new(
            format!("{}_identity", func.name),
            func.params.clone(),
            func.return_types.clone(),
            func.body.clone(),
            func.span.clone(),
            func.kind,
        ))
    })
}

//! Pass core: the opaque pass object and its two adapters.
//!
//! A [`Pass`] is a cheap value handle around a shared [`PassImpl`]. Nearly
//! every pass is built with [`create_function_pass`] (a per-function
//! transform applied in program insertion order); whole-program passes such
//! as outlining use [`create_program_pass`]. Passes never mutate their
//! input: they return a new program, sharing unchanged subtrees.

use std::rc::Rc;

use tessera_ir::{FuncRef, Program, ProgramRef};

use crate::error::Result;
use crate::property::{IRPropertySet, PassProperties};

/// Internal interface of a pass implementation.
///
/// Implement this directly only for passes with custom state; prefer the
/// `create_*_pass` adapters.
pub trait PassImpl {
    /// Execute the pass. Errors are compiler-internal failures only.
    fn run(&self, program: &ProgramRef) -> Result<ProgramRef>;

    fn name(&self) -> &str;

    fn properties(&self) -> &PassProperties;
}

/// Value-type handle around a shared pass implementation.
#[derive(Clone)]
pub struct Pass {
    inner: Rc<dyn PassImpl>,
}

impl Pass {
    pub fn new(inner: Rc<dyn PassImpl>) -> Self {
        Self { inner }
    }

    pub fn run(&self, program: &ProgramRef) -> Result<ProgramRef> {
        tracing::debug!(pass = self.name(), "running pass");
        self.inner.run(program)
    }

    pub fn name(&self) -> &str {
        self.inner.name()
    }

    pub fn required_properties(&self) -> IRPropertySet {
        self.inner.properties().required
    }

    pub fn produced_properties(&self) -> IRPropertySet {
        self.inner.properties().produced
    }

    pub fn invalidated_properties(&self) -> IRPropertySet {
        self.inner.properties().invalidated
    }
}

impl std::fmt::Debug for Pass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pass").field("name", &self.name()).finish()
    }
}

struct FunctionPass<F> {
    transform: F,
    name: String,
    properties: PassProperties,
}

impl<F> PassImpl for FunctionPass<F>
where
    F: Fn(&FuncRef) -> Result<FuncRef>,
{
    fn run(&self, program: &ProgramRef) -> Result<ProgramRef> {
        let mut functions = Vec::with_capacity(program.len());
        let mut changed = false;
        for (_, func) in program.functions() {
            let transformed = (self.transform)(func)?;
            changed |= !Rc::ptr_eq(&transformed, func);
            functions.push(transformed);
        }
        if !changed {
            return Ok(program.clone());
        }
        Ok(Program::new(functions, program.name.clone(), program.span.clone()))
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn properties(&self) -> &PassProperties {
        &self.properties
    }
}

struct ProgramPass<F> {
    transform: F,
    name: String,
    properties: PassProperties,
}

impl<F> PassImpl for ProgramPass<F>
where
    F: Fn(&ProgramRef) -> Result<ProgramRef>,
{
    fn run(&self, program: &ProgramRef) -> Result<ProgramRef> {
        (self.transform)(program)
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn properties(&self) -> &PassProperties {
        &self.properties
    }
}

/// Pass from a function-level transform (the common case). The transform is
/// applied to every function, preserving program insertion order.
pub fn create_function_pass(
    name: impl Into<String>,
    properties: PassProperties,
    transform: impl Fn(&FuncRef) -> Result<FuncRef> + 'static,
) -> Pass {
    Pass::new(Rc::new(FunctionPass { transform, name: name.into(), properties }))
}

/// Pass with whole-program access (outlining, call-site rewrites).
pub fn create_program_pass(
    name: impl Into<String>,
    properties: PassProperties,
    transform: impl Fn(&ProgramRef) -> Result<ProgramRef> + 'static,
) -> Pass {
    Pass::new(Rc::new(ProgramPass { transform, name: name.into(), properties }))
}

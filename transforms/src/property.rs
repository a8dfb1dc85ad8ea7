//! IR properties and per-pass property contracts.
//!
//! Properties are *tags*: each pass declares what it requires, produces and
//! invalidates, and the pipeline folds these sets as it runs. They become
//! enforced predicates only when the pipeline's verification mode asks for
//! it, at which point the matching [`crate::verifier`] rule runs against the
//! actual IR.

use enumset::{EnumSet, enum_set};

/// Verifiable, named predicates about a program.
#[derive(Debug, Hash, PartialOrd, Ord)]
#[derive(strum::AsRefStr, strum::EnumCount, strum::EnumIter)]
#[derive(enumset::EnumSetType)]
pub enum IRProperty {
    /// Assignments, returns and call targets are well-typed.
    TypeChecked,
    /// Every variable is assigned exactly once.
    SSAForm,
    /// No call expression contains another call.
    NoNestedCalls,
    /// Every function/if/for body is a `SeqStmts`.
    NormalizedStmtStructure,
    /// No single-statement `SeqStmts` blocks remain.
    FlattenedSingleStmt,
    /// InCore regions have been outlined into their own flat functions.
    SplitIncoreOrch,
    /// No convertible tensor op remains in any InCore function.
    IncoreBlockOps,
    /// Tile-typed variables in InCore functions carry memory references.
    HasMemRefs,
}

pub type IRPropertySet = EnumSet<IRProperty>;

/// Property contract of one pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassProperties {
    pub required: IRPropertySet,
    pub produced: IRPropertySet,
    pub invalidated: IRPropertySet,
}

// Central registry of PassProperties for all built-in passes.

pub const IDENTITY_PROPERTIES: PassProperties = PassProperties {
    required: enum_set!(),
    produced: enum_set!(),
    invalidated: enum_set!(),
};

pub const CONVERT_TO_SSA_PROPERTIES: PassProperties = PassProperties {
    required: enum_set!(IRProperty::TypeChecked),
    produced: enum_set!(IRProperty::SSAForm),
    invalidated: enum_set!(IRProperty::NormalizedStmtStructure | IRProperty::FlattenedSingleStmt),
};

pub const FLATTEN_CALL_EXPR_PROPERTIES: PassProperties = PassProperties {
    required: enum_set!(IRProperty::TypeChecked),
    produced: enum_set!(IRProperty::NoNestedCalls),
    invalidated: enum_set!(IRProperty::NormalizedStmtStructure | IRProperty::FlattenedSingleStmt),
};

pub const NORMALIZE_STMT_STRUCTURE_PROPERTIES: PassProperties = PassProperties {
    required: enum_set!(IRProperty::TypeChecked),
    produced: enum_set!(IRProperty::NormalizedStmtStructure),
    invalidated: enum_set!(IRProperty::FlattenedSingleStmt),
};

pub const FLATTEN_SINGLE_STMT_PROPERTIES: PassProperties = PassProperties {
    required: enum_set!(IRProperty::TypeChecked),
    produced: enum_set!(IRProperty::FlattenedSingleStmt),
    invalidated: enum_set!(IRProperty::NormalizedStmtStructure),
};

pub const OUTLINE_INCORE_SCOPES_PROPERTIES: PassProperties = PassProperties {
    required: enum_set!(IRProperty::SSAForm),
    produced: enum_set!(IRProperty::SplitIncoreOrch),
    invalidated: enum_set!(),
};

pub const CONVERT_TENSOR_TO_BLOCK_OPS_PROPERTIES: PassProperties = PassProperties {
    required: enum_set!(IRProperty::SplitIncoreOrch),
    produced: enum_set!(IRProperty::IncoreBlockOps),
    invalidated: enum_set!(),
};

pub const INIT_MEM_REF_PROPERTIES: PassProperties = PassProperties {
    required: enum_set!(IRProperty::SSAForm),
    produced: enum_set!(IRProperty::HasMemRefs),
    invalidated: enum_set!(),
};

pub const BASIC_MEMORY_REUSE_PROPERTIES: PassProperties = PassProperties {
    required: enum_set!(IRProperty::HasMemRefs),
    produced: enum_set!(),
    invalidated: enum_set!(),
};

pub const INSERT_SYNC_PROPERTIES: PassProperties = PassProperties {
    required: enum_set!(IRProperty::HasMemRefs),
    produced: enum_set!(),
    invalidated: enum_set!(),
};

pub const ADD_ALLOC_PROPERTIES: PassProperties = PassProperties {
    required: enum_set!(IRProperty::HasMemRefs),
    produced: enum_set!(),
    invalidated: enum_set!(),
};

pub const RUN_VERIFIER_PROPERTIES: PassProperties = PassProperties {
    required: enum_set!(),
    produced: enum_set!(),
    invalidated: enum_set!(),
};

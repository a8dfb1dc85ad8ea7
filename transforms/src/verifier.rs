//! Property verifiers and the verifier framework.
//!
//! Each [`IRProperty`] has a matching [`PropertyVerifier`]. Verifiers never
//! fail: they append [`Diagnostic`]s to the caller's sink. Raising is the
//! caller's choice, through [`IRVerifier::verify_or_throw`] or the
//! pipeline's verification mode.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::rc::Rc;

use tessera_ir::{
    Expr, ExprRef, FuncRef, FunctionKind, ProgramRef, Span, Stmt, StmtRef, Visitor, op, walk_expr,
    walk_stmt,
};

use crate::conversion;
use crate::error::{self, Result};
use crate::property::IRProperty;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[derive(strum::AsRefStr)]
pub enum Severity {
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Warning => "warning",
            Self::Error => "error",
        })
    }
}

/// One verification finding.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    pub rule: String,
    pub code: u32,
    pub message: String,
    pub span: Span,
}

impl Diagnostic {
    pub fn error(rule: &str, code: u32, message: impl Into<String>, span: Span) -> Self {
        Self { severity: Severity::Error, rule: rule.to_string(), code, message: message.into(), span }
    }

    pub fn warning(rule: &str, code: u32, message: impl Into<String>, span: Span) -> Self {
        Self { severity: Severity::Warning, rule: rule.to_string(), code, message: message.into(), span }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}: {} [at {}]", self.severity, self.rule, self.code, self.message, self.span)
    }
}

/// One named check over a whole program.
///
/// Implementations must not fail; every issue becomes a diagnostic.
pub trait PropertyVerifier {
    /// Unique rule name (e.g. `"TypeCheck"`, `"IncoreBlockOps"`).
    fn name(&self) -> &str;

    fn verify(&self, program: &ProgramRef, diagnostics: &mut Vec<Diagnostic>);
}

pub type PropertyVerifierRef = Rc<dyn PropertyVerifier>;

/// Ordered collection of verifiers with per-rule enable/disable.
#[derive(Default, Clone)]
pub struct IRVerifier {
    rules: Vec<PropertyVerifierRef>,
    disabled: HashSet<String>,
}

impl IRVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// All built-in property verifiers, in pipeline order.
    pub fn create_default() -> Self {
        use strum::IntoEnumIterator;
        let mut verifier = Self::new();
        for property in IRProperty::iter() {
            verifier.add_rule(verifier_for(property));
        }
        verifier
    }

    /// Adds a rule; a rule with an already-present name is not added again.
    pub fn add_rule(&mut self, rule: PropertyVerifierRef) {
        if self.rules.iter().any(|r| r.name() == rule.name()) {
            return;
        }
        self.rules.push(rule);
    }

    pub fn enable_rule(&mut self, name: &str) {
        self.disabled.remove(name);
    }

    pub fn disable_rule(&mut self, name: &str) {
        self.disabled.insert(name.to_string());
    }

    pub fn is_rule_enabled(&self, name: &str) -> bool {
        !self.disabled.contains(name)
    }

    /// Run every enabled rule, collecting all diagnostics.
    pub fn verify(&self, program: &ProgramRef) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();
        for rule in &self.rules {
            if !self.disabled.contains(rule.name()) {
                rule.verify(program, &mut diagnostics);
            }
        }
        for diagnostic in &diagnostics {
            if diagnostic.severity == Severity::Error {
                tracing::warn!(%diagnostic, "verification error");
            }
        }
        diagnostics
    }

    /// Like [`IRVerifier::verify`], but raises if any Error was collected.
    pub fn verify_or_throw(&self, program: &ProgramRef) -> Result<()> {
        let diagnostics = self.verify(program);
        if diagnostics.iter().any(|d| d.severity == Severity::Error) {
            return error::VerificationSnafu { report: Self::generate_report(&diagnostics) }.fail();
        }
        Ok(())
    }

    pub fn generate_report(diagnostics: &[Diagnostic]) -> String {
        diagnostics.iter().map(|d| d.to_string()).collect::<Vec<_>>().join("\n")
    }
}

/// The built-in verifier for one property.
pub fn verifier_for(property: IRProperty) -> PropertyVerifierRef {
    match property {
        IRProperty::TypeChecked => Rc::new(TypeCheckVerifier),
        IRProperty::SSAForm => Rc::new(SsaVerifier),
        IRProperty::NoNestedCalls => Rc::new(NoNestedCallVerifier),
        IRProperty::NormalizedStmtStructure => Rc::new(NormalizedStmtVerifier),
        IRProperty::FlattenedSingleStmt => Rc::new(FlattenedSingleStmtVerifier),
        IRProperty::SplitIncoreOrch => Rc::new(SplitIncoreOrchVerifier),
        IRProperty::IncoreBlockOps => Rc::new(IncoreBlockOpsVerifier),
        IRProperty::HasMemRefs => Rc::new(HasMemRefsVerifier),
    }
}

// ---------------------------------------------------------------------------
// TypeCheck
// ---------------------------------------------------------------------------

struct TypeCheckVerifier;

const TYPE_CHECK: &str = "TypeCheck";

impl PropertyVerifier for TypeCheckVerifier {
    fn name(&self) -> &str {
        TYPE_CHECK
    }

    fn verify(&self, program: &ProgramRef, diagnostics: &mut Vec<Diagnostic>) {
        for (_, func) in program.functions() {
            check_stmt_types(program, func, &func.body, diagnostics);
        }
    }
}

fn check_stmt_types(
    program: &ProgramRef,
    func: &FuncRef,
    stmt: &StmtRef,
    diagnostics: &mut Vec<Diagnostic>,
) {
    match &**stmt {
        Stmt::Assign { var, value, span } => {
            if var.ty != value.ty() {
                diagnostics.push(Diagnostic::error(
                    TYPE_CHECK,
                    1,
                    format!(
                        "variable '{}' declared as {} but assigned a value of type {}",
                        var.name,
                        var.ty,
                        value.ty()
                    ),
                    span.clone(),
                ));
            }
            check_expr_types(program, value, diagnostics);
        }
        Stmt::Eval { expr, .. } => check_expr_types(program, expr, diagnostics),
        Stmt::Return { values, span } => {
            if values.len() != func.return_types.len() {
                diagnostics.push(Diagnostic::error(
                    TYPE_CHECK,
                    2,
                    format!(
                        "function '{}' declares {} return value(s) but returns {}",
                        func.name,
                        func.return_types.len(),
                        values.len()
                    ),
                    span.clone(),
                ));
            } else {
                for (i, (value, expected)) in values.iter().zip(&func.return_types).enumerate() {
                    if &value.ty() != expected {
                        diagnostics.push(Diagnostic::error(
                            TYPE_CHECK,
                            2,
                            format!(
                                "return value {i} of '{}' has type {} but the function declares {}",
                                func.name,
                                value.ty(),
                                expected
                            ),
                            span.clone(),
                        ));
                    }
                }
            }
            for value in values {
                check_expr_types(program, value, diagnostics);
            }
        }
        Stmt::If { cond, then_body, else_body, .. } => {
            check_expr_types(program, cond, diagnostics);
            check_stmt_types(program, func, then_body, diagnostics);
            if let Some(else_body) = else_body {
                check_stmt_types(program, func, else_body, diagnostics);
            }
        }
        Stmt::For { start, stop, step, iter_args, body, .. } => {
            for expr in [start, stop, step] {
                check_expr_types(program, expr, diagnostics);
            }
            for arg in iter_args {
                check_expr_types(program, &arg.init, diagnostics);
            }
            check_stmt_types(program, func, body, diagnostics);
        }
        Stmt::Seq { stmts, .. } => {
            for stmt in stmts {
                check_stmt_types(program, func, stmt, diagnostics);
            }
        }
    }
}

fn check_expr_types(program: &ProgramRef, expr: &ExprRef, diagnostics: &mut Vec<Diagnostic>) {
    struct CallCheck<'a> {
        program: &'a ProgramRef,
        diagnostics: &'a mut Vec<Diagnostic>,
    }

    impl Visitor for CallCheck<'_> {
        fn visit_expr(&mut self, expr: &ExprRef) {
            if let Expr::Call(call) = &**expr {
                match &call.callee {
                    tessera_ir::Callee::Op(op_ref) => {
                        if !op::is_registered(&op_ref.name) {
                            self.diagnostics.push(Diagnostic::error(
                                TYPE_CHECK,
                                3,
                                format!("call to unregistered op '{}'", op_ref.name),
                                call.span.clone(),
                            ));
                        }
                    }
                    tessera_ir::Callee::Func(gv) => {
                        if self.program.function(&gv.name).is_none() {
                            self.diagnostics.push(Diagnostic::error(
                                TYPE_CHECK,
                                4,
                                format!("call to unknown function '{}'", gv.name),
                                call.span.clone(),
                            ));
                        }
                    }
                }
            }
            walk_expr(self, expr);
        }
    }

    CallCheck { program, diagnostics }.visit_expr(expr);
}

// ---------------------------------------------------------------------------
// SSAForm
// ---------------------------------------------------------------------------

struct SsaVerifier;

const SSA_FORM: &str = "SSAForm";

impl PropertyVerifier for SsaVerifier {
    fn name(&self) -> &str {
        SSA_FORM
    }

    fn verify(&self, program: &ProgramRef, diagnostics: &mut Vec<Diagnostic>) {
        struct DefCollector<'a> {
            assigned: HashMap<u64, (String, Span)>,
            diagnostics: &'a mut Vec<Diagnostic>,
        }

        impl DefCollector<'_> {
            fn define(&mut self, id: u64, name: &str, span: &Span) {
                if self.assigned.insert(id, (name.to_string(), span.clone())).is_some() {
                    self.diagnostics.push(Diagnostic::error(
                        SSA_FORM,
                        1,
                        format!("variable '{name}' is assigned more than once"),
                        span.clone(),
                    ));
                }
            }
        }

        impl Visitor for DefCollector<'_> {
            fn visit_stmt(&mut self, stmt: &StmtRef) {
                match &**stmt {
                    Stmt::Assign { var, span, .. } => self.define(var.id(), &var.name, span),
                    Stmt::For { loop_var, iter_args, span, .. } => {
                        self.define(loop_var.id(), &loop_var.name, span);
                        for arg in iter_args {
                            self.define(arg.var.id(), &arg.var.name, span);
                        }
                    }
                    _ => {}
                }
                walk_stmt(self, stmt);
            }
        }

        for (_, func) in program.functions() {
            let mut collector = DefCollector { assigned: HashMap::new(), diagnostics: &mut *diagnostics };
            for param in &func.params {
                collector.define(param.id(), &param.name, &param.span);
            }
            collector.visit_stmt(&func.body);
        }
    }
}

// ---------------------------------------------------------------------------
// NoNestedCalls
// ---------------------------------------------------------------------------

struct NoNestedCallVerifier;

const NO_NESTED_CALL: &str = "NoNestedCall";

impl PropertyVerifier for NoNestedCallVerifier {
    fn name(&self) -> &str {
        NO_NESTED_CALL
    }

    fn verify(&self, program: &ProgramRef, diagnostics: &mut Vec<Diagnostic>) {
        struct NestedCallCheck<'a> {
            inside_call: bool,
            diagnostics: &'a mut Vec<Diagnostic>,
        }

        impl Visitor for NestedCallCheck<'_> {
            fn visit_expr(&mut self, expr: &ExprRef) {
                if let Expr::Call(call) = &**expr {
                    if self.inside_call {
                        self.diagnostics.push(Diagnostic::error(
                            NO_NESTED_CALL,
                            1,
                            format!("call to '{}' is nested inside another call", call.callee.name()),
                            call.span.clone(),
                        ));
                    }
                    let was_inside = self.inside_call;
                    self.inside_call = true;
                    walk_expr(self, expr);
                    self.inside_call = was_inside;
                } else {
                    walk_expr(self, expr);
                }
            }
        }

        let mut check = NestedCallCheck { inside_call: false, diagnostics };
        check.visit_program(program);
    }
}

// ---------------------------------------------------------------------------
// NormalizedStmtStructure / FlattenedSingleStmt
// ---------------------------------------------------------------------------

struct NormalizedStmtVerifier;

const NORMALIZED_STMT: &str = "NormalizedStmtStructure";

fn check_body_is_seq(context: &str, body: &StmtRef, diagnostics: &mut Vec<Diagnostic>) {
    if !matches!(&**body, Stmt::Seq { .. }) {
        diagnostics.push(Diagnostic::error(
            NORMALIZED_STMT,
            1,
            format!("{context} body is not a SeqStmts"),
            body.span(),
        ));
    }
}

impl PropertyVerifier for NormalizedStmtVerifier {
    fn name(&self) -> &str {
        NORMALIZED_STMT
    }

    fn verify(&self, program: &ProgramRef, diagnostics: &mut Vec<Diagnostic>) {
        struct StructureCheck<'a> {
            diagnostics: &'a mut Vec<Diagnostic>,
        }

        impl Visitor for StructureCheck<'_> {
            fn visit_stmt(&mut self, stmt: &StmtRef) {
                match &**stmt {
                    Stmt::If { then_body, else_body, .. } => {
                        check_body_is_seq("if", then_body, self.diagnostics);
                        if let Some(else_body) = else_body {
                            check_body_is_seq("else", else_body, self.diagnostics);
                        }
                    }
                    Stmt::For { body, .. } => check_body_is_seq("for", body, self.diagnostics),
                    Stmt::Seq { stmts, span } => {
                        if stmts.iter().any(|s| matches!(&**s, Stmt::Seq { .. })) {
                            self.diagnostics.push(Diagnostic::error(
                                NORMALIZED_STMT,
                                2,
                                "SeqStmts directly nested in SeqStmts",
                                span.clone(),
                            ));
                        }
                    }
                    _ => {}
                }
                walk_stmt(self, stmt);
            }
        }

        for (_, func) in program.functions() {
            check_body_is_seq(&format!("function '{}'", func.name), &func.body, diagnostics);
            StructureCheck { diagnostics: &mut *diagnostics }.visit_stmt(&func.body);
        }
    }
}

struct FlattenedSingleStmtVerifier;

const FLATTENED_SINGLE_STMT: &str = "FlattenedSingleStmt";

impl PropertyVerifier for FlattenedSingleStmtVerifier {
    fn name(&self) -> &str {
        FLATTENED_SINGLE_STMT
    }

    fn verify(&self, program: &ProgramRef, diagnostics: &mut Vec<Diagnostic>) {
        struct SingletonCheck<'a> {
            diagnostics: &'a mut Vec<Diagnostic>,
        }

        impl Visitor for SingletonCheck<'_> {
            fn visit_stmt(&mut self, stmt: &StmtRef) {
                if let Stmt::Seq { stmts, span } = &**stmt
                    && stmts.len() == 1
                {
                    self.diagnostics.push(Diagnostic::error(
                        FLATTENED_SINGLE_STMT,
                        1,
                        "single-statement SeqStmts should have been flattened",
                        span.clone(),
                    ));
                }
                walk_stmt(self, stmt);
            }
        }

        let mut check = SingletonCheck { diagnostics };
        check.visit_program(program);
    }
}

// ---------------------------------------------------------------------------
// SplitIncoreOrch
// ---------------------------------------------------------------------------

struct SplitIncoreOrchVerifier;

const SPLIT_INCORE_ORCH: &str = "SplitIncoreOrch";

impl PropertyVerifier for SplitIncoreOrchVerifier {
    fn name(&self) -> &str {
        SPLIT_INCORE_ORCH
    }

    fn verify(&self, program: &ProgramRef, diagnostics: &mut Vec<Diagnostic>) {
        struct MarkerCheck<'a> {
            diagnostics: &'a mut Vec<Diagnostic>,
        }

        impl Visitor for MarkerCheck<'_> {
            fn visit_expr(&mut self, expr: &ExprRef) {
                if let Expr::Call(call) = &**expr
                    && (call.is_op("scope.begin_incore") || call.is_op("scope.end_incore"))
                {
                    self.diagnostics.push(Diagnostic::error(
                        SPLIT_INCORE_ORCH,
                        1,
                        format!("incore scope marker '{}' was not outlined", call.callee.name()),
                        call.span.clone(),
                    ));
                }
                walk_expr(self, expr);
            }
        }

        let mut check = MarkerCheck { diagnostics: &mut *diagnostics };
        check.visit_program(program);

        // InCore bodies must be flat: assignments, evals and returns only.
        for (_, func) in program.functions() {
            if func.kind != FunctionKind::InCore {
                continue;
            }
            for stmt in Stmt::flatten(&func.body) {
                if !matches!(&*stmt, Stmt::Assign { .. } | Stmt::Eval { .. } | Stmt::Return { .. }) {
                    diagnostics.push(Diagnostic::error(
                        SPLIT_INCORE_ORCH,
                        2,
                        format!(
                            "InCore function '{}' contains a {} (body must be flat)",
                            func.name,
                            stmt.type_name()
                        ),
                        stmt.span(),
                    ));
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// IncoreBlockOps
// ---------------------------------------------------------------------------

struct IncoreBlockOpsVerifier;

const INCORE_BLOCK_OPS: &str = "IncoreBlockOps";

impl PropertyVerifier for IncoreBlockOpsVerifier {
    fn name(&self) -> &str {
        INCORE_BLOCK_OPS
    }

    fn verify(&self, program: &ProgramRef, diagnostics: &mut Vec<Diagnostic>) {
        struct TensorOpCheck<'a> {
            diagnostics: &'a mut Vec<Diagnostic>,
        }

        impl Visitor for TensorOpCheck<'_> {
            fn visit_expr(&mut self, expr: &ExprRef) {
                if let Expr::Call(call) = &**expr
                    && let tessera_ir::Callee::Op(op_ref) = &call.callee
                    && let Ok(entry) = op::entry(&op_ref.name)
                    && entry.category.as_str() == "TensorOp"
                    && conversion::has_conversion(&op_ref.name)
                {
                    self.diagnostics.push(Diagnostic::error(
                        INCORE_BLOCK_OPS,
                        1,
                        format!(
                            "tensor op '{}' found in InCore function (should have been converted)",
                            op_ref.name
                        ),
                        call.span.clone(),
                    ));
                }
                walk_expr(self, expr);
            }
        }

        for (_, func) in program.functions() {
            if func.kind != FunctionKind::InCore {
                continue;
            }
            let mut check = TensorOpCheck { diagnostics: &mut *diagnostics };
            check.visit_stmt(&func.body);
        }
    }
}

// ---------------------------------------------------------------------------
// HasMemRefs
// ---------------------------------------------------------------------------

struct HasMemRefsVerifier;

const HAS_MEM_REFS: &str = "HasMemRefs";

impl PropertyVerifier for HasMemRefsVerifier {
    fn name(&self) -> &str {
        HAS_MEM_REFS
    }

    fn verify(&self, program: &ProgramRef, diagnostics: &mut Vec<Diagnostic>) {
        struct MemRefCheck<'a> {
            diagnostics: &'a mut Vec<Diagnostic>,
        }

        impl MemRefCheck<'_> {
            fn check(&mut self, var: &tessera_ir::VarRef) {
                if var.ty.is_tile() && var.memref.is_none() {
                    self.diagnostics.push(Diagnostic::error(
                        HAS_MEM_REFS,
                        1,
                        format!("tile variable '{}' has no memory reference", var.name),
                        var.span.clone(),
                    ));
                }
            }
        }

        impl Visitor for MemRefCheck<'_> {
            fn visit_stmt(&mut self, stmt: &StmtRef) {
                if let Stmt::Assign { var, .. } = &**stmt {
                    self.check(var);
                }
                walk_stmt(self, stmt);
            }
        }

        for (_, func) in program.functions() {
            if func.kind != FunctionKind::InCore {
                continue;
            }
            let mut check = MemRefCheck { diagnostics: &mut *diagnostics };
            for param in &func.params {
                check.check(param);
            }
            check.visit_stmt(&func.body);
        }
    }
}

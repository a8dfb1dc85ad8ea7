//! Statement nodes.

use std::fmt;
use std::rc::Rc;

use snafu::ensure;

use crate::error::{self, Result};
use crate::expr::{ExprRef, IterArg, VarRef};
use crate::span::Span;

pub type StmtRef = Rc<Stmt>;

#[derive(Debug)]
pub enum Stmt {
    Assign {
        var: VarRef,
        value: ExprRef,
        span: Span,
    },
    Eval {
        expr: ExprRef,
        span: Span,
    },
    Return {
        values: Vec<ExprRef>,
        span: Span,
    },
    If {
        cond: ExprRef,
        then_body: StmtRef,
        else_body: Option<StmtRef>,
        span: Span,
    },
    For {
        loop_var: VarRef,
        start: ExprRef,
        stop: ExprRef,
        step: ExprRef,
        iter_args: Vec<Rc<IterArg>>,
        body: StmtRef,
        span: Span,
    },
    /// Flattened statement block.
    Seq {
        stmts: Vec<StmtRef>,
        span: Span,
    },
}

impl Stmt {
    /// Binds `value` to `var`. The variable's declared type must structurally
    /// equal the value's type.
    pub fn assign(var: VarRef, value: ExprRef, span: Span) -> Result<StmtRef> {
        ensure!(
            var.ty == value.ty(),
            error::TypeMismatchSnafu {
                context: format!("assignment to '{}'", var.name),
                expected: var.ty.to_string(),
                actual: value.ty().to_string(),
            }
        );
        Ok(Rc::new(Self::Assign { var, value, span }))
    }

    pub fn eval(expr: ExprRef, span: Span) -> StmtRef {
        Rc::new(Self::Eval { expr, span })
    }

    pub fn ret(values: Vec<ExprRef>, span: Span) -> StmtRef {
        Rc::new(Self::Return { values, span })
    }

    pub fn if_(cond: ExprRef, then_body: StmtRef, else_body: Option<StmtRef>, span: Span) -> StmtRef {
        Rc::new(Self::If { cond, then_body, else_body, span })
    }

    pub fn for_(
        loop_var: VarRef,
        start: ExprRef,
        stop: ExprRef,
        step: ExprRef,
        iter_args: Vec<Rc<IterArg>>,
        body: StmtRef,
        span: Span,
    ) -> StmtRef {
        Rc::new(Self::For { loop_var, start, stop, step, iter_args, body, span })
    }

    pub fn seq(stmts: Vec<StmtRef>, span: Span) -> StmtRef {
        Rc::new(Self::Seq { stmts, span })
    }

    pub fn span(&self) -> Span {
        match self {
            Self::Assign { span, .. }
            | Self::Eval { span, .. }
            | Self::Return { span, .. }
            | Self::If { span, .. }
            | Self::For { span, .. }
            | Self::Seq { span, .. } => span.clone(),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Assign { .. } => "AssignStmt",
            Self::Eval { .. } => "EvalStmt",
            Self::Return { .. } => "ReturnStmt",
            Self::If { .. } => "IfStmt",
            Self::For { .. } => "ForStmt",
            Self::Seq { .. } => "SeqStmts",
        }
    }

    /// A function body viewed as a statement list: `Seq` contents, or the
    /// single statement itself.
    pub fn flatten(body: &StmtRef) -> Vec<StmtRef> {
        match &**body {
            Self::Seq { stmts, .. } => stmts.clone(),
            _ => vec![body.clone()],
        }
    }
}

impl Stmt {
    fn fmt_indented(&self, f: &mut fmt::Formatter<'_>, indent: usize) -> fmt::Result {
        let pad = "    ".repeat(indent);
        match self {
            Self::Assign { var, value, .. } => {
                writeln!(f, "{pad}{}: {} = {value}", var.name, var.ty)
            }
            Self::Eval { expr, .. } => writeln!(f, "{pad}{expr}"),
            Self::Return { values, .. } => {
                write!(f, "{pad}return ")?;
                for (i, v) in values.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{v}")?;
                }
                writeln!(f)
            }
            Self::If { cond, then_body, else_body, .. } => {
                writeln!(f, "{pad}if {cond}:")?;
                then_body.fmt_indented(f, indent + 1)?;
                if let Some(else_body) = else_body {
                    writeln!(f, "{pad}else:")?;
                    else_body.fmt_indented(f, indent + 1)?;
                }
                Ok(())
            }
            Self::For { loop_var, start, stop, step, iter_args, body, .. } => {
                write!(f, "{pad}for {} in range({start}, {stop}, {step})", loop_var.name)?;
                if !iter_args.is_empty() {
                    write!(f, " with ")?;
                    for (i, arg) in iter_args.iter().enumerate() {
                        if i > 0 {
                            write!(f, ", ")?;
                        }
                        write!(f, "{} = {}", arg.var.name, arg.init)?;
                    }
                }
                writeln!(f, ":")?;
                body.fmt_indented(f, indent + 1)
            }
            Self::Seq { stmts, .. } => {
                for stmt in stmts {
                    stmt.fmt_indented(f, indent)?;
                }
                Ok(())
            }
        }
    }
}

impl fmt::Display for Stmt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_indented(f, 0)
    }
}

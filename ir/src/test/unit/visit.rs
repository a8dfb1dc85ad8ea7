use std::collections::HashMap;
use std::rc::Rc;

use tessera_dtype::DataType;

use crate::expr::{BinaryOp, Expr, ExprRef, Var};
use crate::span::Span;
use crate::stmt::Stmt;
use crate::types::Type;
use crate::visit::{Mutator, VarSubstituter, Visitor, walk_expr};

struct VarCounter {
    count: usize,
}

impl Visitor for VarCounter {
    fn visit_expr(&mut self, expr: &ExprRef) {
        if matches!(&**expr, Expr::Var(_)) {
            self.count += 1;
        }
        walk_expr(self, expr);
    }
}

#[test]
fn test_visitor_reaches_all_uses() {
    let span = Span::unknown();
    let x = Var::new("x", Type::scalar(DataType::Int32), span.clone());
    let sum = Expr::binary(BinaryOp::Add, Expr::var(&x), Expr::var(&x), span.clone()).unwrap();
    let stmt = Stmt::seq(
        vec![Stmt::eval(sum, span.clone()), Stmt::ret(vec![Expr::var(&x)], span.clone())],
        span,
    );

    let mut counter = VarCounter { count: 0 };
    counter.visit_stmt(&stmt);
    assert_eq!(counter.count, 3);
}

struct NoopMutator;

impl Mutator for NoopMutator {}

#[test]
fn test_identity_mutation_shares_nodes() {
    let span = Span::unknown();
    let x = Var::new("x", Type::scalar(DataType::Int32), span.clone());
    let one = Expr::const_int(1, DataType::Int32, span.clone());
    let sum = Expr::binary(BinaryOp::Add, Expr::var(&x), one, span.clone()).unwrap();
    let stmt = Stmt::seq(vec![Stmt::eval(sum, span.clone())], span);

    let folded = NoopMutator.mutate_stmt(&stmt).unwrap();
    assert!(Rc::ptr_eq(&folded, &stmt), "unchanged trees must be returned as-is");
}

#[test]
fn test_substituter_replaces_uses() {
    let span = Span::unknown();
    let x = Var::new("x", Type::scalar(DataType::Int32), span.clone());
    let y = Var::new("y", Type::scalar(DataType::Int32), span.clone());
    let one = Expr::const_int(1, DataType::Int32, span.clone());
    let sum = Expr::binary(BinaryOp::Add, Expr::var(&x), one, span).unwrap();

    let mut map = HashMap::new();
    map.insert("x".to_string(), y.clone());

    let substituted = VarSubstituter::new(&map).substitute(&sum).unwrap();
    match &*substituted {
        Expr::Binary { lhs, .. } => match &**lhs {
            Expr::Var(var) => assert!(Rc::ptr_eq(var, &y)),
            other => panic!("expected var, got {other}"),
        },
        other => panic!("expected binary, got {other}"),
    }
}

#[test]
fn test_substituter_shares_untouched_subtrees() {
    let span = Span::unknown();
    let x = Var::new("x", Type::scalar(DataType::Int32), span.clone());
    let z = Var::new("z", Type::scalar(DataType::Int32), span.clone());
    let sum = Expr::binary(BinaryOp::Add, Expr::var(&x), Expr::var(&x), span).unwrap();

    // Map does not mention `x`: nothing changes, same node comes back.
    let mut map = HashMap::new();
    map.insert("unrelated".to_string(), z);

    let substituted = VarSubstituter::new(&map).substitute(&sum).unwrap();
    assert!(Rc::ptr_eq(&substituted, &sum));
}

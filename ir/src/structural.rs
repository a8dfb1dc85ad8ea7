//! Structural equality and hashing with optional α-equivalence.
//!
//! Both algorithms are driven by the field descriptors of
//! [`crate::reflect`]: `Ignore` fields contribute nothing, `Usual` fields
//! recurse with the caller's α-mapping flag, and `Def` fields (definition
//! sites: `AssignStmt::var`, `Function::params`, `ForStmt::loop_var`,
//! `ForStmt::iter_args`) recurse with α-mapping unconditionally enabled.
//!
//! Equality keeps a bijective variable mapping (left→right and right→left).
//! The mapping is consulted before the flag, so variables bound at a
//! definition site compare equal at their use sites even when the caller
//! disabled auto-mapping; an *unmapped* pair with auto-mapping disabled
//! falls back to pointer identity.
//!
//! Hashing mirrors equality so that `equal ⇒ equal_hash` holds for either
//! flag value: under auto-mapping a variable hashes its type only; without
//! it, a variable hashes its first-visit ordinal, which is stable across
//! structurally identical trees.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::rc::Rc;

use smallvec::SmallVec;

use crate::error::{Error, Result};
use crate::expr::{Expr, ExprRef, IterArg, KwValue, Kwargs, MemRef, Var, VarRef};
use crate::func::{FuncRef, GlobalVar, ProgramRef};
use crate::reflect::{Field, FieldKind, FieldValue};
use crate::stmt::StmtRef;
use crate::types::{Type, TypeRef};

/// A borrowed IR node of any category, for the public entry points.
#[derive(Clone, Copy)]
pub enum NodeRef<'a> {
    Expr(&'a ExprRef),
    Stmt(&'a StmtRef),
    Type(&'a TypeRef),
    Var(&'a VarRef),
    Function(&'a FuncRef),
    Program(&'a ProgramRef),
}

impl<'a> From<&'a ExprRef> for NodeRef<'a> {
    fn from(node: &'a ExprRef) -> Self {
        Self::Expr(node)
    }
}

impl<'a> From<&'a StmtRef> for NodeRef<'a> {
    fn from(node: &'a StmtRef) -> Self {
        Self::Stmt(node)
    }
}

impl<'a> From<&'a TypeRef> for NodeRef<'a> {
    fn from(node: &'a TypeRef) -> Self {
        Self::Type(node)
    }
}

impl<'a> From<&'a VarRef> for NodeRef<'a> {
    fn from(node: &'a VarRef) -> Self {
        Self::Var(node)
    }
}

impl<'a> From<&'a FuncRef> for NodeRef<'a> {
    fn from(node: &'a FuncRef) -> Self {
        Self::Function(node)
    }
}

impl<'a> From<&'a ProgramRef> for NodeRef<'a> {
    fn from(node: &'a ProgramRef) -> Self {
        Self::Program(node)
    }
}

/// Structural equality of two nodes of the same category.
///
/// With `auto_map` enabled, consistently renamed variables compare equal
/// (`x + 1` ≡ `y + 1`); the induced mapping must stay bijective
/// (`x + x` ≢ `y + z`).
pub fn structural_equal<'a>(
    lhs: impl Into<NodeRef<'a>>,
    rhs: impl Into<NodeRef<'a>>,
    auto_map: bool,
) -> bool {
    Comparator::default().equal_node(lhs.into(), rhs.into(), auto_map)
}

/// Like [`structural_equal`] but reports the first mismatch as an error.
pub fn assert_structural_equal<'a>(
    lhs: impl Into<NodeRef<'a>>,
    rhs: impl Into<NodeRef<'a>>,
    auto_map: bool,
) -> Result<()> {
    let mut comparator = Comparator::default();
    if comparator.equal_node(lhs.into(), rhs.into(), auto_map) {
        return Ok(());
    }
    let (path, reason) = comparator
        .mismatch
        .unwrap_or_else(|| ("<root>".to_string(), "nodes differ".to_string()));
    Err(Error::StructuralMismatch { path, reason })
}

/// Structural hash; `structural_equal(a, b, m) ⇒ structural_hash(a, m) ==
/// structural_hash(b, m)` for either value of `m`.
pub fn structural_hash<'a>(node: impl Into<NodeRef<'a>>, auto_map: bool) -> u64 {
    StructHasher::default().hash_node(node.into(), auto_map)
}

/// Type equality: structural and never subject to α-mapping.
pub fn type_equal(lhs: &Type, rhs: &Type) -> bool {
    Comparator::default().equal_type_nodes(lhs, rhs)
}

// ---------------------------------------------------------------------------
// Equality
// ---------------------------------------------------------------------------

enum PathSeg {
    Field(&'static str),
    Index(usize),
}

#[derive(Default)]
struct Comparator {
    /// Bijective variable mapping, keyed by `Var` identity number.
    l2r: HashMap<u64, u64>,
    r2l: HashMap<u64, u64>,
    /// Field path to the node under comparison; inline storage keeps the
    /// hot push/pop traffic off the heap.
    path: SmallVec<[PathSeg; 16]>,
    mismatch: Option<(String, String)>,
}

impl Comparator {
    fn fail(&mut self, reason: String) -> bool {
        if self.mismatch.is_none() {
            let mut path = String::new();
            for seg in &self.path {
                match seg {
                    PathSeg::Field(name) => {
                        if !path.is_empty() {
                            path.push('.');
                        }
                        path.push_str(name);
                    }
                    PathSeg::Index(i) => {
                        let _ = write!(path, "[{i}]");
                    }
                }
            }
            if path.is_empty() {
                path.push_str("<root>");
            }
            self.mismatch = Some((path, reason));
        }
        false
    }

    fn equal_node(&mut self, lhs: NodeRef<'_>, rhs: NodeRef<'_>, auto: bool) -> bool {
        match (lhs, rhs) {
            (NodeRef::Expr(a), NodeRef::Expr(b)) => self.equal_expr(a, b, auto),
            (NodeRef::Stmt(a), NodeRef::Stmt(b)) => self.equal_stmt(a, b, auto),
            (NodeRef::Type(a), NodeRef::Type(b)) => self.equal_type_nodes(a, b),
            (NodeRef::Var(a), NodeRef::Var(b)) => self.equal_var(a, b, auto),
            (NodeRef::Function(a), NodeRef::Function(b)) => self.equal_function(a, b, auto),
            (NodeRef::Program(a), NodeRef::Program(b)) => self.equal_program(a, b, auto),
            _ => self.fail("node categories differ".to_string()),
        }
    }

    fn equal_expr(&mut self, a: &ExprRef, b: &ExprRef, auto: bool) -> bool {
        // Variables first: even a pointer-shared Var must stay consistent
        // with the bijective mapping.
        if let (Expr::Var(va), Expr::Var(vb)) = (&**a, &**b) {
            return self.equal_var(va, vb, auto);
        }
        if Rc::ptr_eq(a, b) {
            return true;
        }
        if a.type_name() != b.type_name() {
            return self.fail(format!("kind `{}` != `{}`", a.type_name(), b.type_name()));
        }
        self.equal_fields(&a.field_descriptors(), &b.field_descriptors(), auto)
    }

    fn equal_stmt(&mut self, a: &StmtRef, b: &StmtRef, auto: bool) -> bool {
        if Rc::ptr_eq(a, b) {
            return true;
        }
        if a.type_name() != b.type_name() {
            return self.fail(format!("kind `{}` != `{}`", a.type_name(), b.type_name()));
        }
        self.equal_fields(&a.field_descriptors(), &b.field_descriptors(), auto)
    }

    fn equal_function(&mut self, a: &FuncRef, b: &FuncRef, auto: bool) -> bool {
        if Rc::ptr_eq(a, b) {
            return true;
        }
        self.equal_fields(&a.field_descriptors(), &b.field_descriptors(), auto)
    }

    fn equal_program(&mut self, a: &ProgramRef, b: &ProgramRef, auto: bool) -> bool {
        if Rc::ptr_eq(a, b) {
            return true;
        }
        self.equal_fields(&a.field_descriptors(), &b.field_descriptors(), auto)
    }

    /// Types never interact with the α state: compare with the variable
    /// maps swapped out and auto-mapping off.
    fn equal_type_nodes(&mut self, a: &Type, b: &Type) -> bool {
        let saved_l2r = std::mem::take(&mut self.l2r);
        let saved_r2l = std::mem::take(&mut self.r2l);
        let result = if a.type_name() != b.type_name() {
            self.fail(format!("kind `{}` != `{}`", a.type_name(), b.type_name()))
        } else {
            self.equal_fields(&a.field_descriptors(), &b.field_descriptors(), false)
        };
        self.l2r = saved_l2r;
        self.r2l = saved_r2l;
        result
    }

    fn equal_var(&mut self, a: &VarRef, b: &VarRef, auto: bool) -> bool {
        match (self.l2r.get(&a.id()).copied(), self.r2l.get(&b.id()).copied()) {
            (Some(mapped), Some(reverse)) => {
                if mapped == b.id() && reverse == a.id() {
                    true
                } else {
                    self.fail(format!(
                        "inconsistent variable mapping for `{}` vs `{}`",
                        a.name, b.name
                    ))
                }
            }
            (None, None) => {
                if auto {
                    if !self.equal_type_nodes(&a.ty, &b.ty) {
                        return false;
                    }
                    self.l2r.insert(a.id(), b.id());
                    self.r2l.insert(b.id(), a.id());
                    true
                } else if Rc::ptr_eq(a, b) {
                    true
                } else {
                    self.fail(format!("distinct variables `{}` and `{}`", a.name, b.name))
                }
            }
            _ => self.fail(format!(
                "inconsistent variable mapping for `{}` vs `{}`",
                a.name, b.name
            )),
        }
    }

    fn equal_iter_arg(&mut self, a: &Rc<IterArg>, b: &Rc<IterArg>, auto: bool) -> bool {
        if Rc::ptr_eq(a, b) {
            return true;
        }
        self.equal_fields(&a.field_descriptors(), &b.field_descriptors(), auto)
    }

    fn equal_memref(&mut self, a: &Rc<MemRef>, b: &Rc<MemRef>, auto: bool) -> bool {
        if Rc::ptr_eq(a, b) {
            return true;
        }
        self.equal_fields(&a.field_descriptors(), &b.field_descriptors(), auto)
    }

    fn equal_global_var(&mut self, a: &GlobalVar, b: &GlobalVar) -> bool {
        if a.name == b.name {
            true
        } else {
            self.fail(format!("global `{}` != `{}`", a.name, b.name))
        }
    }

    fn equal_fields(&mut self, lhs: &[Field<'_>], rhs: &[Field<'_>], auto: bool) -> bool {
        debug_assert_eq!(lhs.len(), rhs.len(), "same node kind must have the same descriptors");
        for (l, r) in lhs.iter().zip(rhs.iter()) {
            debug_assert_eq!(l.kind, r.kind);
            let field_auto = match l.kind {
                FieldKind::Ignore => continue,
                FieldKind::Usual => auto,
                FieldKind::Def => true,
            };
            self.path.push(PathSeg::Field(l.name));
            let ok = self.equal_value(&l.value, &r.value, field_auto);
            self.path.pop();
            if !ok {
                return false;
            }
        }
        true
    }

    fn equal_seq<T>(
        &mut self,
        lhs: &[T],
        rhs: &[T],
        auto: bool,
        mut item: impl FnMut(&mut Self, &T, &T, bool) -> bool,
    ) -> bool {
        if lhs.len() != rhs.len() {
            return self.fail(format!("length {} != {}", lhs.len(), rhs.len()));
        }
        for (i, (l, r)) in lhs.iter().zip(rhs.iter()).enumerate() {
            self.path.push(PathSeg::Index(i));
            let ok = item(self, l, r, auto);
            self.path.pop();
            if !ok {
                return false;
            }
        }
        true
    }

    fn equal_value(&mut self, lhs: &FieldValue<'_>, rhs: &FieldValue<'_>, auto: bool) -> bool {
        use FieldValue::*;
        match (lhs, rhs) {
            (Expr(a), Expr(b)) => self.equal_expr(a, b, auto),
            (Exprs(a), Exprs(b)) => self.equal_seq(a, b, auto, |s, l, r, m| s.equal_expr(l, r, m)),
            (Stmt(a), Stmt(b)) => self.equal_stmt(a, b, auto),
            (OptStmt(a), OptStmt(b)) => match (a, b) {
                (None, None) => true,
                (Some(a), Some(b)) => self.equal_stmt(a, b, auto),
                _ => self.fail("one side has no statement".to_string()),
            },
            (Stmts(a), Stmts(b)) => self.equal_seq(a, b, auto, |s, l, r, m| s.equal_stmt(l, r, m)),
            (Type(a), Type(b)) => self.equal_type_nodes(a, b),
            (Types(a), Types(b)) => {
                self.equal_seq(a, b, auto, |s, l, r, _| s.equal_type_nodes(l, r))
            }
            (Var(a), Var(b)) => self.equal_var(a, b, auto),
            (Vars(a), Vars(b)) => self.equal_seq(a, b, auto, |s, l, r, m| s.equal_var(l, r, m)),
            (IterArgs(a), IterArgs(b)) => {
                self.equal_seq(a, b, auto, |s, l, r, m| s.equal_iter_arg(l, r, m))
            }
            (OptMemRef(a), OptMemRef(b)) => match (a, b) {
                (None, None) => true,
                (Some(a), Some(b)) => self.equal_memref(a, b, auto),
                _ => self.fail("one side has no memref".to_string()),
            },
            (OptView(a), OptView(b)) => match (a, b) {
                (None, None) => true,
                (Some(a), Some(b)) => {
                    self.equal_fields(&a.field_descriptors(), &b.field_descriptors(), auto)
                }
                _ => self.fail("one side has no tile view".to_string()),
            },
            (Callee(a), Callee(b)) => match (a, b) {
                (crate::expr::Callee::Op(x), crate::expr::Callee::Op(y)) => {
                    if x.name == y.name {
                        true
                    } else {
                        self.fail(format!("op `{}` != `{}`", x.name, y.name))
                    }
                }
                (crate::expr::Callee::Func(x), crate::expr::Callee::Func(y)) => {
                    self.equal_global_var(x, y)
                }
                _ => self.fail("op call vs function call".to_string()),
            },
            (Kwargs(a), Kwargs(b)) => self.equal_kwargs(a, b),
            (Functions(a), Functions(b)) => self.equal_seq(a, b, auto, |s, l, r, m| {
                s.equal_global_var(&l.0, &r.0) && s.equal_function(&l.1, &r.1, m)
            }),
            (Str(a), Str(b)) => *a == *b || self.fail(format!("`{a}` != `{b}`")),
            (Usize(a), Usize(b)) => a == b || self.fail(format!("{a} != {b}")),
            (U64(a), U64(b)) => a == b || self.fail(format!("{a} != {b}")),
            (Int(a), Int(b)) => a == b || self.fail(format!("{a} != {b}")),
            (Float(a), Float(b)) => {
                a.to_bits() == b.to_bits() || self.fail(format!("{a} != {b}"))
            }
            (Bool(a), Bool(b)) => a == b || self.fail(format!("{a} != {b}")),
            (DType(a), DType(b)) => a == b || self.fail(format!("{a} != {b}")),
            (Memory(a), Memory(b)) => a == b || self.fail(format!("{a} != {b}")),
            (BinOp(a), BinOp(b)) => {
                a == b || self.fail(format!("{} != {}", a.as_ref(), b.as_ref()))
            }
            (UnOp(a), UnOp(b)) => {
                a == b || self.fail(format!("{} != {}", a.as_ref(), b.as_ref()))
            }
            (FuncKind(a), FuncKind(b)) => {
                a == b || self.fail(format!("{} != {}", a.as_ref(), b.as_ref()))
            }
            (Span(_), Span(_)) => true,
            _ => self.fail("field value kinds differ".to_string()),
        }
    }

    fn equal_kwargs(&mut self, a: &Kwargs, b: &Kwargs) -> bool {
        if a.len() != b.len() {
            return self.fail(format!("kwarg count {} != {}", a.len(), b.len()));
        }
        for (i, ((ka, va), (kb, vb))) in a.iter().zip(b.iter()).enumerate() {
            self.path.push(PathSeg::Index(i));
            let ok = if ka != kb {
                self.fail(format!("kwarg name `{ka}` != `{kb}`"))
            } else if !kw_value_equal(va, vb) {
                self.fail(format!("kwarg `{ka}`: {va} != {vb}"))
            } else {
                true
            };
            self.path.pop();
            if !ok {
                return false;
            }
        }
        true
    }
}

fn kw_value_equal(a: &KwValue, b: &KwValue) -> bool {
    match (a, b) {
        // Floats compare by bit pattern, consistent with hashing.
        (KwValue::Float(x), KwValue::Float(y)) => x.to_bits() == y.to_bits(),
        _ => a == b,
    }
}

// ---------------------------------------------------------------------------
// Hashing
// ---------------------------------------------------------------------------

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash = FNV_OFFSET;
    for byte in bytes {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// Boost-style hash combine.
fn combine(seed: u64, value: u64) -> u64 {
    seed ^ value
        .wrapping_add(0x9e37_79b9_7f4a_7c15)
        .wrapping_add(seed << 6)
        .wrapping_add(seed >> 2)
}

#[derive(Default)]
struct StructHasher {
    /// First-visit ordinal per variable; the "per-program identity number"
    /// used when auto-mapping is off.
    ordinals: HashMap<u64, u64>,
}

impl StructHasher {
    fn ordinal(&mut self, var: &Var) -> u64 {
        let next = self.ordinals.len() as u64;
        *self.ordinals.entry(var.id()).or_insert(next)
    }

    fn hash_node(&mut self, node: NodeRef<'_>, auto: bool) -> u64 {
        match node {
            NodeRef::Expr(e) => self.hash_expr(e, auto),
            NodeRef::Stmt(s) => self.hash_fields(s.type_name(), &s.field_descriptors(), auto),
            NodeRef::Type(t) => self.hash_type(t),
            NodeRef::Var(v) => self.hash_var(v, auto),
            NodeRef::Function(f) => self.hash_fields("Function", &f.field_descriptors(), auto),
            NodeRef::Program(p) => self.hash_fields("Program", &p.field_descriptors(), auto),
        }
    }

    fn hash_expr(&mut self, expr: &ExprRef, auto: bool) -> u64 {
        if let Expr::Var(var) = &**expr {
            return self.hash_var(var, auto);
        }
        self.hash_fields(expr.type_name(), &expr.field_descriptors(), auto)
    }

    fn hash_var(&mut self, var: &VarRef, auto: bool) -> u64 {
        let seed = fnv1a(b"Var");
        if auto {
            combine(seed, self.hash_type(&var.ty))
        } else {
            combine(seed, self.ordinal(var))
        }
    }

    /// Types hash in isolation (fresh ordinal space, auto-mapping off), so
    /// their hashes never depend on the surrounding α state.
    fn hash_type(&mut self, ty: &Type) -> u64 {
        let mut sub = StructHasher::default();
        sub.hash_fields(ty.type_name(), &ty.field_descriptors(), false)
    }

    fn hash_fields(&mut self, type_name: &str, fields: &[Field<'_>], auto: bool) -> u64 {
        let mut hash = fnv1a(type_name.as_bytes());
        for field in fields {
            let field_auto = match field.kind {
                FieldKind::Ignore => continue,
                FieldKind::Usual => auto,
                FieldKind::Def => true,
            };
            hash = combine(hash, self.hash_value(&field.value, field_auto));
        }
        hash
    }

    fn hash_seq<T>(
        &mut self,
        items: &[T],
        auto: bool,
        mut item: impl FnMut(&mut Self, &T, bool) -> u64,
    ) -> u64 {
        let mut hash = combine(FNV_OFFSET, items.len() as u64);
        for entry in items {
            hash = combine(hash, item(self, entry, auto));
        }
        hash
    }

    fn hash_value(&mut self, value: &FieldValue<'_>, auto: bool) -> u64 {
        use FieldValue::*;
        match value {
            Expr(e) => self.hash_expr(e, auto),
            Exprs(list) => self.hash_seq(list, auto, |s, e, m| s.hash_expr(e, m)),
            Stmt(stmt) => self.hash_fields(stmt.type_name(), &stmt.field_descriptors(), auto),
            OptStmt(opt) => match opt {
                None => fnv1a(b"None"),
                Some(stmt) => self.hash_fields(stmt.type_name(), &stmt.field_descriptors(), auto),
            },
            Stmts(list) => {
                self.hash_seq(list, auto, |s, stmt, m| {
                    s.hash_fields(stmt.type_name(), &stmt.field_descriptors(), m)
                })
            }
            Type(ty) => self.hash_type(ty),
            Types(list) => self.hash_seq(list, auto, |s, ty, _| s.hash_type(ty)),
            Var(var) => self.hash_var(var, auto),
            Vars(list) => self.hash_seq(list, auto, |s, v, m| s.hash_var(v, m)),
            IterArgs(list) => self.hash_seq(list, auto, |s, arg, m| {
                s.hash_fields("IterArg", &arg.field_descriptors(), m)
            }),
            OptMemRef(opt) => match opt {
                None => fnv1a(b"None"),
                Some(memref) => self.hash_fields("MemRef", &memref.field_descriptors(), auto),
            },
            OptView(opt) => match opt {
                None => fnv1a(b"None"),
                Some(view) => self.hash_fields("TileView", &view.field_descriptors(), auto),
            },
            Callee(callee) => match callee {
                crate::expr::Callee::Op(op) => combine(fnv1a(b"Op"), fnv1a(op.name.as_bytes())),
                crate::expr::Callee::Func(gv) => {
                    combine(fnv1a(b"GlobalVar"), fnv1a(gv.name.as_bytes()))
                }
            },
            Kwargs(kwargs) => self.hash_seq(kwargs, auto, |s, (name, value), _| {
                combine(fnv1a(name.as_bytes()), s.hash_kw_value(value))
            }),
            Functions(list) => self.hash_seq(list, auto, |s, (gv, func), m| {
                combine(
                    fnv1a(gv.name.as_bytes()),
                    s.hash_fields("Function", &func.field_descriptors(), m),
                )
            }),
            Str(s) => fnv1a(s.as_bytes()),
            Usize(v) => *v as u64,
            U64(v) => *v,
            Int(v) => *v as u64,
            Float(v) => v.to_bits(),
            Bool(v) => *v as u64,
            DType(v) => fnv1a(v.name().as_bytes()),
            Memory(v) => fnv1a(v.name().as_bytes()),
            BinOp(v) => fnv1a(v.as_ref().as_bytes()),
            UnOp(v) => fnv1a(v.as_ref().as_bytes()),
            FuncKind(v) => fnv1a(v.as_ref().as_bytes()),
            Span(_) => 0,
        }
    }

    fn hash_kw_value(&mut self, value: &KwValue) -> u64 {
        match value {
            KwValue::Int(v) => combine(fnv1a(b"Int"), *v as u64),
            KwValue::Float(v) => combine(fnv1a(b"Float"), v.to_bits()),
            KwValue::Bool(v) => combine(fnv1a(b"Bool"), *v as u64),
            KwValue::Str(v) => combine(fnv1a(b"Str"), fnv1a(v.as_bytes())),
            KwValue::DType(v) => combine(fnv1a(b"DType"), fnv1a(v.name().as_bytes())),
            KwValue::Memory(v) => combine(fnv1a(b"Memory"), fnv1a(v.name().as_bytes())),
        }
    }
}

//! Symbolic/numeric expression graph.
//!
//! One expression type covers both worlds: a node is either a concrete
//! constant or a symbolic operation. Constructors eagerly fold constants,
//! so an all-numeric computation collapses to `Const` results without the
//! caller ever branching on numeric-vs-symbolic. Expressions are immutable
//! and reference-counted; cloning is cheap and never aliases mutable state.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::num::NonZeroU32;
use std::ops::{Add, Div, Mul, Neg, Sub};
use std::rc::Rc;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::error::{CoreError, CoreResult};

static NEXT_SYMBOL: AtomicU32 = AtomicU32::new(1);

/// Identity of a symbolic variable.
///
/// Allocated by [`Expr::symbol`], so every declared variable is distinct
/// even when display names collide; `Env`, `diff` and `substitute` key on
/// the id, never on the name. `NonZero` keeps `Option<SymbolId>` the size
/// of the id itself.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SymbolId(NonZeroU32);

impl SymbolId {
    fn fresh() -> Self {
        let raw = NEXT_SYMBOL.fetch_add(1, Ordering::Relaxed);
        SymbolId(NonZeroU32::new(raw).expect("symbol id space exhausted"))
    }
}

impl fmt::Debug for SymbolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SymbolId({})", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UnOp {
    Neg,
    Sin,
    Cos,
    Tan,
    Sqrt,
    Exp,
    Ln,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

#[derive(Debug)]
enum Node {
    Const(f64),
    Sym { id: SymbolId, name: String },
    Unary { op: UnOp, arg: Expr },
    Binary { op: BinOp, lhs: Expr, rhs: Expr },
}

/// A scalar expression: either a concrete number or a symbolic graph node.
#[derive(Clone, Debug)]
pub struct Expr(Rc<Node>);

/// Numeric evaluation environment: symbol id -> value.
#[derive(Clone, Debug, Default)]
pub struct Env {
    vals: HashMap<SymbolId, f64>,
}

impl Env {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, id: SymbolId, value: f64) {
        self.vals.insert(id, value);
    }

    pub fn get(&self, id: SymbolId) -> Option<f64> {
        self.vals.get(&id).copied()
    }

    /// Copy every binding of `other` into this environment.
    pub fn merge(&mut self, other: &Env) {
        for (id, v) in &other.vals {
            self.vals.insert(*id, *v);
        }
    }

    pub fn len(&self) -> usize {
        self.vals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vals.is_empty()
    }
}

impl Expr {
    /// A concrete numeric constant.
    pub fn constant(value: f64) -> Self {
        Expr(Rc::new(Node::Const(value)))
    }

    pub fn zero() -> Self {
        Expr::constant(0.0)
    }

    pub fn one() -> Self {
        Expr::constant(1.0)
    }

    /// A fresh symbol with a process-unique id.
    pub fn symbol(name: impl Into<String>) -> Self {
        Expr(Rc::new(Node::Sym {
            id: SymbolId::fresh(),
            name: name.into(),
        }))
    }

    /// The concrete value, if this expression reduced to a constant.
    pub fn as_const(&self) -> Option<f64> {
        match &*self.0 {
            Node::Const(v) => Some(*v),
            _ => None,
        }
    }

    /// The symbol id, if this expression is a bare symbol.
    pub fn sym_id(&self) -> Option<SymbolId> {
        match &*self.0 {
            Node::Sym { id, .. } => Some(*id),
            _ => None,
        }
    }

    /// The symbol name, if this expression is a bare symbol.
    pub fn sym_name(&self) -> Option<&str> {
        match &*self.0 {
            Node::Sym { name, .. } => Some(name),
            _ => None,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.as_const() == Some(0.0)
    }

    fn unary(op: UnOp, arg: Expr) -> Expr {
        if let Some(v) = arg.as_const() {
            return Expr::constant(apply_unary(op, v));
        }
        Expr(Rc::new(Node::Unary { op, arg }))
    }

    fn binary(op: BinOp, lhs: Expr, rhs: Expr) -> Expr {
        if let (Some(a), Some(b)) = (lhs.as_const(), rhs.as_const()) {
            return Expr::constant(apply_binary(op, a, b));
        }
        // Identity/absorbing element shortcuts keep derivative graphs small.
        match op {
            BinOp::Add => {
                if lhs.is_zero() {
                    return rhs;
                }
                if rhs.is_zero() {
                    return lhs;
                }
            }
            BinOp::Sub => {
                if rhs.is_zero() {
                    return lhs;
                }
                if lhs.is_zero() {
                    return Expr::unary(UnOp::Neg, rhs);
                }
            }
            BinOp::Mul => {
                if lhs.is_zero() || rhs.is_zero() {
                    return Expr::zero();
                }
                if lhs.as_const() == Some(1.0) {
                    return rhs;
                }
                if rhs.as_const() == Some(1.0) {
                    return lhs;
                }
            }
            BinOp::Div => {
                if lhs.is_zero() {
                    return Expr::zero();
                }
                if rhs.as_const() == Some(1.0) {
                    return lhs;
                }
            }
            BinOp::Pow => {
                if rhs.is_zero() {
                    return Expr::one();
                }
                if rhs.as_const() == Some(1.0) {
                    return lhs;
                }
            }
        }
        Expr(Rc::new(Node::Binary { op, lhs, rhs }))
    }

    pub fn sin(&self) -> Expr {
        Expr::unary(UnOp::Sin, self.clone())
    }

    pub fn cos(&self) -> Expr {
        Expr::unary(UnOp::Cos, self.clone())
    }

    pub fn tan(&self) -> Expr {
        Expr::unary(UnOp::Tan, self.clone())
    }

    pub fn sqrt(&self) -> Expr {
        Expr::unary(UnOp::Sqrt, self.clone())
    }

    pub fn exp(&self) -> Expr {
        Expr::unary(UnOp::Exp, self.clone())
    }

    pub fn ln(&self) -> Expr {
        Expr::unary(UnOp::Ln, self.clone())
    }

    pub fn powi(&self, n: i32) -> Expr {
        Expr::binary(BinOp::Pow, self.clone(), Expr::constant(f64::from(n)))
    }

    pub fn powf(&self, p: f64) -> Expr {
        Expr::binary(BinOp::Pow, self.clone(), Expr::constant(p))
    }

    pub fn pow(&self, exponent: &Expr) -> Expr {
        Expr::binary(BinOp::Pow, self.clone(), exponent.clone())
    }

    /// Evaluate numerically against `env`.
    ///
    /// Non-finite intermediate results (division by zero, sqrt of a
    /// negative) propagate as IEEE values; only a symbol with no binding
    /// is an error.
    pub fn eval(&self, env: &Env) -> CoreResult<f64> {
        let mut cache: HashMap<*const Node, f64> = HashMap::new();
        self.eval_inner(env, &mut cache)
    }

    fn eval_inner(&self, env: &Env, cache: &mut HashMap<*const Node, f64>) -> CoreResult<f64> {
        let key = Rc::as_ptr(&self.0);
        if let Some(v) = cache.get(&key) {
            return Ok(*v);
        }
        let v = match &*self.0 {
            Node::Const(v) => *v,
            Node::Sym { id, name } => env.get(*id).ok_or_else(|| CoreError::UnknownSymbol {
                name: name.clone(),
            })?,
            Node::Unary { op, arg } => apply_unary(*op, arg.eval_inner(env, cache)?),
            Node::Binary { op, lhs, rhs } => apply_binary(
                *op,
                lhs.eval_inner(env, cache)?,
                rhs.eval_inner(env, cache)?,
            ),
        };
        cache.insert(key, v);
        Ok(v)
    }

    /// Symbolic derivative with respect to one symbol.
    pub fn diff(&self, wrt: SymbolId) -> Expr {
        let mut cache: HashMap<*const Node, Expr> = HashMap::new();
        self.diff_inner(wrt, &mut cache)
    }

    fn diff_inner(&self, wrt: SymbolId, cache: &mut HashMap<*const Node, Expr>) -> Expr {
        let key = Rc::as_ptr(&self.0);
        if let Some(d) = cache.get(&key) {
            return d.clone();
        }
        let d = match &*self.0 {
            Node::Const(_) => Expr::zero(),
            Node::Sym { id, .. } => {
                if *id == wrt {
                    Expr::one()
                } else {
                    Expr::zero()
                }
            }
            Node::Unary { op, arg } => {
                let da = arg.diff_inner(wrt, cache);
                match op {
                    UnOp::Neg => -da,
                    UnOp::Sin => arg.cos() * da,
                    UnOp::Cos => -(arg.sin()) * da,
                    UnOp::Tan => da / (arg.cos() * arg.cos()),
                    UnOp::Sqrt => da / (2.0 * arg.sqrt()),
                    UnOp::Exp => arg.exp() * da,
                    UnOp::Ln => da / arg.clone(),
                }
            }
            Node::Binary { op, lhs, rhs } => {
                let da = lhs.diff_inner(wrt, cache);
                let db = rhs.diff_inner(wrt, cache);
                match op {
                    BinOp::Add => da + db,
                    BinOp::Sub => da - db,
                    BinOp::Mul => da * rhs.clone() + lhs.clone() * db,
                    BinOp::Div => (da * rhs.clone() - lhs.clone() * db) / (rhs.clone() * rhs.clone()),
                    BinOp::Pow => {
                        if db.is_zero() {
                            // constant exponent: p * a^(p-1) * a'
                            rhs.clone() * lhs.pow(&(rhs.clone() - 1.0)) * da
                        } else {
                            // a^b * (b' ln a + b a'/a)
                            self.clone() * (db * lhs.ln() + rhs.clone() * da / lhs.clone())
                        }
                    }
                }
            }
        };
        cache.insert(key, d.clone());
        d
    }

    /// Replace symbols by expressions, rebuilding through the folding
    /// constructors (so an all-numeric substitution reduces to constants).
    pub fn substitute(&self, map: &HashMap<SymbolId, Expr>) -> Expr {
        let mut cache: HashMap<*const Node, Expr> = HashMap::new();
        self.substitute_inner(map, &mut cache)
    }

    fn substitute_inner(
        &self,
        map: &HashMap<SymbolId, Expr>,
        cache: &mut HashMap<*const Node, Expr>,
    ) -> Expr {
        let key = Rc::as_ptr(&self.0);
        if let Some(e) = cache.get(&key) {
            return e.clone();
        }
        let e = match &*self.0 {
            Node::Const(_) => self.clone(),
            Node::Sym { id, .. } => match map.get(id) {
                Some(replacement) => replacement.clone(),
                None => self.clone(),
            },
            Node::Unary { op, arg } => Expr::unary(*op, arg.substitute_inner(map, cache)),
            Node::Binary { op, lhs, rhs } => Expr::binary(
                *op,
                lhs.substitute_inner(map, cache),
                rhs.substitute_inner(map, cache),
            ),
        };
        cache.insert(key, e.clone());
        e
    }

    /// All symbols this expression references, with their names.
    pub fn symbols(&self) -> BTreeMap<SymbolId, String> {
        let mut out = BTreeMap::new();
        let mut seen = BTreeSet::new();
        self.collect_symbols(&mut out, &mut seen);
        out
    }

    fn collect_symbols(&self, out: &mut BTreeMap<SymbolId, String>, seen: &mut BTreeSet<*const Node>) {
        if !seen.insert(Rc::as_ptr(&self.0)) {
            return;
        }
        match &*self.0 {
            Node::Const(_) => {}
            Node::Sym { id, name } => {
                out.insert(*id, name.clone());
            }
            Node::Unary { arg, .. } => arg.collect_symbols(out, seen),
            Node::Binary { lhs, rhs, .. } => {
                lhs.collect_symbols(out, seen);
                rhs.collect_symbols(out, seen);
            }
        }
    }

    pub fn depends_on(&self, id: SymbolId) -> bool {
        self.symbols().contains_key(&id)
    }
}

fn apply_unary(op: UnOp, v: f64) -> f64 {
    match op {
        UnOp::Neg => -v,
        UnOp::Sin => v.sin(),
        UnOp::Cos => v.cos(),
        UnOp::Tan => v.tan(),
        UnOp::Sqrt => v.sqrt(),
        UnOp::Exp => v.exp(),
        UnOp::Ln => v.ln(),
    }
}

fn apply_binary(op: BinOp, a: f64, b: f64) -> f64 {
    match op {
        BinOp::Add => a + b,
        BinOp::Sub => a - b,
        BinOp::Mul => a * b,
        BinOp::Div => a / b,
        BinOp::Pow => a.powf(b),
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &*self.0 {
            Node::Const(v) => write!(f, "{v}"),
            Node::Sym { name, .. } => write!(f, "{name}"),
            Node::Unary { op, arg } => match op {
                UnOp::Neg => write!(f, "(-{arg})"),
                UnOp::Sin => write!(f, "sin({arg})"),
                UnOp::Cos => write!(f, "cos({arg})"),
                UnOp::Tan => write!(f, "tan({arg})"),
                UnOp::Sqrt => write!(f, "sqrt({arg})"),
                UnOp::Exp => write!(f, "exp({arg})"),
                UnOp::Ln => write!(f, "ln({arg})"),
            },
            Node::Binary { op, lhs, rhs } => {
                let sym = match op {
                    BinOp::Add => "+",
                    BinOp::Sub => "-",
                    BinOp::Mul => "*",
                    BinOp::Div => "/",
                    BinOp::Pow => "^",
                };
                write!(f, "({lhs} {sym} {rhs})")
            }
        }
    }
}

// ── Operator overloads ──────────────────────────────────────────────
//
// Every arithmetic operator works on owned and borrowed expressions and
// mixes with f64 on either side.

macro_rules! impl_binop {
    ($trait:ident, $method:ident, $op:expr) => {
        impl $trait<Expr> for Expr {
            type Output = Expr;
            fn $method(self, rhs: Expr) -> Expr {
                Expr::binary($op, self, rhs)
            }
        }

        impl $trait<&Expr> for Expr {
            type Output = Expr;
            fn $method(self, rhs: &Expr) -> Expr {
                Expr::binary($op, self, rhs.clone())
            }
        }

        impl $trait<Expr> for &Expr {
            type Output = Expr;
            fn $method(self, rhs: Expr) -> Expr {
                Expr::binary($op, self.clone(), rhs)
            }
        }

        impl $trait<&Expr> for &Expr {
            type Output = Expr;
            fn $method(self, rhs: &Expr) -> Expr {
                Expr::binary($op, self.clone(), rhs.clone())
            }
        }

        impl $trait<f64> for Expr {
            type Output = Expr;
            fn $method(self, rhs: f64) -> Expr {
                Expr::binary($op, self, Expr::constant(rhs))
            }
        }

        impl $trait<f64> for &Expr {
            type Output = Expr;
            fn $method(self, rhs: f64) -> Expr {
                Expr::binary($op, self.clone(), Expr::constant(rhs))
            }
        }

        impl $trait<Expr> for f64 {
            type Output = Expr;
            fn $method(self, rhs: Expr) -> Expr {
                Expr::binary($op, Expr::constant(self), rhs)
            }
        }

        impl $trait<&Expr> for f64 {
            type Output = Expr;
            fn $method(self, rhs: &Expr) -> Expr {
                Expr::binary($op, Expr::constant(self), rhs.clone())
            }
        }
    };
}

impl_binop!(Add, add, BinOp::Add);
impl_binop!(Sub, sub, BinOp::Sub);
impl_binop!(Mul, mul, BinOp::Mul);
impl_binop!(Div, div, BinOp::Div);

impl From<f64> for Expr {
    fn from(v: f64) -> Expr {
        Expr::constant(v)
    }
}

impl From<&Expr> for Expr {
    fn from(e: &Expr) -> Expr {
        e.clone()
    }
}

impl Neg for Expr {
    type Output = Expr;
    fn neg(self) -> Expr {
        Expr::unary(UnOp::Neg, self)
    }
}

impl Neg for &Expr {
    type Output = Expr;
    fn neg(self) -> Expr {
        Expr::unary(UnOp::Neg, self.clone())
    }
}

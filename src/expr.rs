use crate::symbol::{Name, SymbolTable};
use hashbrown::HashMap;
use parking_lot::RwLock;
use rustc_hash::FxHasher;
use smallvec::SmallVec;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU32, Ordering};

/// Unique identifier for an expression in the store.
/// Stable for the life of the store and comparable for equality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExprId(u32);

impl ExprId {
    /// Get the raw u32 value (for debugging/display).
    pub fn raw(self) -> u32 {
        self.0
    }
}

/// Scalar type of an expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Ty {
    Int32,
    Bool,
}

/// Binary operator kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Min,
    Max,
    And,
    Or,
    Lt,
}

impl BinOp {
    /// Operand type the operator expects.
    pub fn operand_ty(self) -> Ty {
        match self {
            BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Min | BinOp::Max | BinOp::Lt => {
                Ty::Int32
            }
            BinOp::And | BinOp::Or => Ty::Bool,
        }
    }

    /// Result type of the operator.
    pub fn result_ty(self) -> Ty {
        match self {
            BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Min | BinOp::Max => Ty::Int32,
            BinOp::And | BinOp::Or | BinOp::Lt => Ty::Bool,
        }
    }

    pub fn is_commutative(self) -> bool {
        !matches!(self, BinOp::Sub | BinOp::Lt)
    }

    /// Associative as a binary operation (not the same thing as a
    /// reduction update being associative).
    pub fn is_associative(self) -> bool {
        matches!(
            self,
            BinOp::Add | BinOp::Mul | BinOp::Min | BinOp::Max | BinOp::And | BinOp::Or
        )
    }

    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Min => "min",
            BinOp::Max => "max",
            BinOp::And => "&&",
            BinOp::Or => "||",
            BinOp::Lt => "<",
        }
    }
}

/// A symbolic expression node. The set of kinds is closed; every pass
/// is a single match over it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Expr {
    IntConst(i32),
    BoolConst(bool),
    /// A named variable. In pattern templates, variables act as
    /// wildcards (see `pattern`).
    Var(Ty, Name),
    /// A call to a symbolic function, tagged with which tuple value of
    /// that function this node refers to.
    Call {
        ty: Ty,
        name: Name,
        args: SmallVec<[ExprId; 4]>,
        value_index: u32,
    },
    Binary(BinOp, ExprId, ExprId),
    /// select(cond, then, else); both branches share one type.
    Select(ExprId, ExprId, ExprId),
    Let {
        name: Name,
        value: ExprId,
        body: ExprId,
    },
}

/// Number of shards for the hashcons maps (power of 2).
const NUM_SHARDS: usize = 16;

/// Thread-safe expression store with hashconsing.
///
/// Guarantees:
/// - Structurally equal expressions get the same ExprId, so equality
///   of ids is structural equality of trees.
/// - Every id resolves back to its node and its scalar type.
pub struct ExprStore {
    nodes: RwLock<Vec<(Expr, Ty)>>,
    shards: [RwLock<HashMap<Expr, ExprId>>; NUM_SHARDS],
    next_id: AtomicU32,
}

impl ExprStore {
    pub fn new() -> Self {
        let shards = std::array::from_fn(|_| RwLock::new(HashMap::new()));
        Self {
            nodes: RwLock::new(Vec::new()),
            shards,
            next_id: AtomicU32::new(0),
        }
    }

    fn intern(&self, expr: Expr, ty: Ty) -> ExprId {
        let shard_idx = Self::shard_index(&expr);
        let shard = &self.shards[shard_idx];

        {
            let map = shard.read();
            if let Some(&id) = map.get(&expr) {
                return id;
            }
        }

        let mut map = shard.write();
        if let Some(&id) = map.get(&expr) {
            return id;
        }

        let id = ExprId(self.next_id.fetch_add(1, Ordering::Relaxed));
        {
            let mut nodes = self.nodes.write();
            let idx = id.0 as usize;
            if nodes.len() <= idx {
                nodes.resize(idx + 1, (Expr::IntConst(0), Ty::Int32));
            }
            nodes[idx] = (expr.clone(), ty);
        }
        map.insert(expr, id);
        id
    }

    fn shard_index(expr: &Expr) -> usize {
        let mut hasher = FxHasher::default();
        expr.hash(&mut hasher);
        (hasher.finish() as usize) % NUM_SHARDS
    }

    pub fn int(&self, v: i32) -> ExprId {
        self.intern(Expr::IntConst(v), Ty::Int32)
    }

    pub fn bool_const(&self, v: bool) -> ExprId {
        self.intern(Expr::BoolConst(v), Ty::Bool)
    }

    pub fn var(&self, ty: Ty, name: Name) -> ExprId {
        self.intern(Expr::Var(ty, name), ty)
    }

    pub fn call(
        &self,
        ty: Ty,
        name: Name,
        args: SmallVec<[ExprId; 4]>,
        value_index: u32,
    ) -> ExprId {
        self.intern(
            Expr::Call {
                ty,
                name,
                args,
                value_index,
            },
            ty,
        )
    }

    /// Build a binary node. Operand types are an internal invariant;
    /// a mismatch is a compiler bug, not a user error.
    pub fn binary(&self, op: BinOp, a: ExprId, b: ExprId) -> ExprId {
        let want = op.operand_ty();
        assert_eq!(
            self.ty(a),
            want,
            "operand type mismatch for {}",
            op.symbol()
        );
        assert_eq!(
            self.ty(b),
            want,
            "operand type mismatch for {}",
            op.symbol()
        );
        self.intern(Expr::Binary(op, a, b), op.result_ty())
    }

    pub fn add(&self, a: ExprId, b: ExprId) -> ExprId {
        self.binary(BinOp::Add, a, b)
    }

    pub fn sub(&self, a: ExprId, b: ExprId) -> ExprId {
        self.binary(BinOp::Sub, a, b)
    }

    pub fn mul(&self, a: ExprId, b: ExprId) -> ExprId {
        self.binary(BinOp::Mul, a, b)
    }

    pub fn min(&self, a: ExprId, b: ExprId) -> ExprId {
        self.binary(BinOp::Min, a, b)
    }

    pub fn max(&self, a: ExprId, b: ExprId) -> ExprId {
        self.binary(BinOp::Max, a, b)
    }

    pub fn and(&self, a: ExprId, b: ExprId) -> ExprId {
        self.binary(BinOp::And, a, b)
    }

    pub fn or(&self, a: ExprId, b: ExprId) -> ExprId {
        self.binary(BinOp::Or, a, b)
    }

    pub fn lt(&self, a: ExprId, b: ExprId) -> ExprId {
        self.binary(BinOp::Lt, a, b)
    }

    pub fn select(&self, cond: ExprId, t: ExprId, f: ExprId) -> ExprId {
        assert_eq!(self.ty(cond), Ty::Bool, "select condition must be Bool");
        let ty = self.ty(t);
        assert_eq!(ty, self.ty(f), "select branches must share one type");
        self.intern(Expr::Select(cond, t, f), ty)
    }

    pub fn let_in(&self, name: Name, value: ExprId, body: ExprId) -> ExprId {
        let ty = self.ty(body);
        self.intern(Expr::Let { name, value, body }, ty)
    }

    /// Resolve an id to its node. Panics on a foreign id; ids are only
    /// ever produced by this store.
    pub fn resolve(&self, id: ExprId) -> Expr {
        let nodes = self.nodes.read();
        nodes[id.0 as usize].0.clone()
    }

    pub fn ty(&self, id: ExprId) -> Ty {
        let nodes = self.nodes.read();
        nodes[id.0 as usize].1
    }

    /// Structural equality. Hashconsing makes this id equality.
    pub fn equal(&self, a: ExprId, b: ExprId) -> bool {
        a == b
    }

    pub fn is_var(&self, id: ExprId) -> Option<(Ty, Name)> {
        match self.resolve(id) {
            Expr::Var(ty, name) => Some((ty, name)),
            _ => None,
        }
    }

    pub fn as_int_const(&self, id: ExprId) -> Option<i32> {
        match self.resolve(id) {
            Expr::IntConst(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_const(&self, id: ExprId) -> bool {
        matches!(self.resolve(id), Expr::IntConst(_) | Expr::BoolConst(_))
    }

    /// The zero-ish constant of a type: used as the don't-care identity
    /// of a slot with no self-reference.
    pub fn zero_of(&self, ty: Ty) -> ExprId {
        match ty {
            Ty::Int32 => self.int(0),
            Ty::Bool => self.bool_const(false),
        }
    }

    /// Largest value of an integer type (identity of min).
    pub fn max_of(&self, ty: Ty) -> ExprId {
        match ty {
            Ty::Int32 => self.int(i32::MAX),
            Ty::Bool => self.bool_const(true),
        }
    }

    /// Smallest value of an integer type (identity of max).
    pub fn min_of(&self, ty: Ty) -> ExprId {
        match ty {
            Ty::Int32 => self.int(i32::MIN),
            Ty::Bool => self.bool_const(false),
        }
    }
}

impl Default for ExprStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Render an expression for diagnostics.
pub fn format_expr(id: ExprId, store: &ExprStore, syms: &SymbolTable) -> String {
    fn render(id: ExprId, store: &ExprStore, syms: &SymbolTable, out: &mut String) {
        let name_of = |n: Name| syms.resolve(n).unwrap_or("<?>").to_string();
        match store.resolve(id) {
            Expr::IntConst(v) => out.push_str(&v.to_string()),
            Expr::BoolConst(v) => out.push_str(if v { "true" } else { "false" }),
            Expr::Var(_, name) => out.push_str(&name_of(name)),
            Expr::Call {
                name,
                args,
                value_index,
                ..
            } => {
                out.push_str(&name_of(name));
                out.push('(');
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    render(*arg, store, syms, out);
                }
                out.push(')');
                out.push('[');
                out.push_str(&value_index.to_string());
                out.push(']');
            }
            Expr::Binary(op @ (BinOp::Min | BinOp::Max), a, b) => {
                out.push_str(op.symbol());
                out.push('(');
                render(a, store, syms, out);
                out.push_str(", ");
                render(b, store, syms, out);
                out.push(')');
            }
            Expr::Binary(op, a, b) => {
                out.push('(');
                render(a, store, syms, out);
                out.push(' ');
                out.push_str(op.symbol());
                out.push(' ');
                render(b, store, syms, out);
                out.push(')');
            }
            Expr::Select(c, t, f) => {
                out.push_str("select(");
                render(c, store, syms, out);
                out.push_str(", ");
                render(t, store, syms, out);
                out.push_str(", ");
                render(f, store, syms, out);
                out.push(')');
            }
            Expr::Let { name, value, body } => {
                out.push_str("(let ");
                out.push_str(&name_of(name));
                out.push_str(" = ");
                render(value, store, syms, out);
                out.push_str(" in ");
                render(body, store, syms, out);
                out.push(')');
            }
        }
    }

    let mut out = String::new();
    render(id, store, syms, &mut out);
    out
}

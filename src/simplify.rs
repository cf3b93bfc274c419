//! Algebraic simplification.
//!
//! Bottom-up rewriting with a closed rule set: constant folding
//! (wrapping i32 arithmetic), unit and absorbing elements, idempotent
//! and absorptive min/max rules, select folding, and two
//! canonicalizations the rest of the prover relies on:
//!
//! - constants sit on the right of commutative operators, and
//! - `a - b` is normalized to `a + b * -1`, so subtraction never
//!   reaches the binary-op extractor (see DESIGN.md).

use crate::expr::{BinOp, Expr, ExprId, ExprStore};
use hashbrown::HashMap;

/// Simplify an expression to a canonical form.
pub fn simplify(expr: ExprId, store: &ExprStore) -> ExprId {
    let mut memo = HashMap::new();
    simp(expr, store, &mut memo)
}

fn simp(expr: ExprId, store: &ExprStore, memo: &mut HashMap<ExprId, ExprId>) -> ExprId {
    if let Some(&done) = memo.get(&expr) {
        return done;
    }
    let out = match store.resolve(expr) {
        Expr::IntConst(_) | Expr::BoolConst(_) | Expr::Var(_, _) => expr,
        Expr::Binary(op, a, b) => {
            let a = simp(a, store, memo);
            let b = simp(b, store, memo);
            simp_binary(op, a, b, store)
        }
        Expr::Select(c, t, f) => {
            let c = simp(c, store, memo);
            let t = simp(t, store, memo);
            let f = simp(f, store, memo);
            simp_select(c, t, f, store)
        }
        Expr::Call {
            ty,
            name,
            args,
            value_index,
        } => {
            let new_args = args.iter().map(|x| simp(*x, store, memo)).collect();
            store.call(ty, name, new_args, value_index)
        }
        Expr::Let { name, value, body } => {
            let value = simp(value, store, memo);
            let body = simp(body, store, memo);
            store.let_in(name, value, body)
        }
    };
    memo.insert(expr, out);
    out
}

/// Fold a binary operator over two constants.
fn fold(op: BinOp, a: &Expr, b: &Expr) -> Option<Expr> {
    match (op, a, b) {
        (BinOp::Add, Expr::IntConst(x), Expr::IntConst(y)) => {
            Some(Expr::IntConst(x.wrapping_add(*y)))
        }
        (BinOp::Sub, Expr::IntConst(x), Expr::IntConst(y)) => {
            Some(Expr::IntConst(x.wrapping_sub(*y)))
        }
        (BinOp::Mul, Expr::IntConst(x), Expr::IntConst(y)) => {
            Some(Expr::IntConst(x.wrapping_mul(*y)))
        }
        (BinOp::Min, Expr::IntConst(x), Expr::IntConst(y)) => Some(Expr::IntConst(*x.min(y))),
        (BinOp::Max, Expr::IntConst(x), Expr::IntConst(y)) => Some(Expr::IntConst(*x.max(y))),
        (BinOp::Lt, Expr::IntConst(x), Expr::IntConst(y)) => Some(Expr::BoolConst(x < y)),
        (BinOp::And, Expr::BoolConst(x), Expr::BoolConst(y)) => Some(Expr::BoolConst(*x && *y)),
        (BinOp::Or, Expr::BoolConst(x), Expr::BoolConst(y)) => Some(Expr::BoolConst(*x || *y)),
        _ => None,
    }
}

fn intern_folded(folded: Expr, store: &ExprStore) -> ExprId {
    match folded {
        Expr::IntConst(v) => store.int(v),
        Expr::BoolConst(v) => store.bool_const(v),
        _ => unreachable!("fold only produces constants"),
    }
}

/// Apply local rules to `op(a, b)`; operands are already simplified.
fn simp_binary(op: BinOp, a: ExprId, b: ExprId, store: &ExprStore) -> ExprId {
    let na = store.resolve(a);
    let nb = store.resolve(b);

    if let Some(folded) = fold(op, &na, &nb) {
        return intern_folded(folded, store);
    }

    // a - b => a + b * -1 (constant subtrahends fold immediately).
    if op == BinOp::Sub {
        let neg_b = if let Expr::IntConst(v) = nb {
            store.int(v.wrapping_neg())
        } else {
            simp_binary(BinOp::Mul, b, store.int(-1), store)
        };
        return simp_binary(BinOp::Add, a, neg_b, store);
    }

    // Constants go on the right of commutative operators.
    if op.is_commutative() && store.is_const(a) && !store.is_const(b) {
        return simp_binary(op, b, a, store);
    }

    // Unit and absorbing constants on the right.
    if let Expr::IntConst(c) = store.resolve(b) {
        match op {
            BinOp::Add if c == 0 => return a,
            BinOp::Mul if c == 1 => return a,
            BinOp::Mul if c == 0 => return b,
            BinOp::Min if c == i32::MAX => return a,
            BinOp::Min if c == i32::MIN => return b,
            BinOp::Max if c == i32::MIN => return a,
            BinOp::Max if c == i32::MAX => return b,
            _ => {}
        }
    }
    if let Expr::BoolConst(c) = store.resolve(b) {
        match op {
            BinOp::And if c => return a,
            BinOp::And => return b,
            BinOp::Or if c => return b,
            BinOp::Or => return a,
            _ => {}
        }
    }

    // Idempotence.
    if a == b && matches!(op, BinOp::Min | BinOp::Max | BinOp::And | BinOp::Or) {
        return a;
    }

    // min/max absorb their own operands: max(max(p, q), p) == max(p, q).
    if matches!(op, BinOp::Min | BinOp::Max) {
        if let Expr::Binary(inner, p, q) = store.resolve(a) {
            if inner == op && (b == p || b == q) {
                return a;
            }
        }
        if let Expr::Binary(inner, p, q) = store.resolve(b) {
            if inner == op && (a == p || a == q) {
                return b;
            }
        }
    }

    // Absorption: max(min(p, q), p) == p and min(max(p, q), p) == p.
    let dual = match op {
        BinOp::Max => Some(BinOp::Min),
        BinOp::Min => Some(BinOp::Max),
        _ => None,
    };
    if let Some(dual) = dual {
        if let Expr::Binary(inner, p, q) = store.resolve(a) {
            if inner == dual && (b == p || b == q) {
                return b;
            }
        }
        if let Expr::Binary(inner, p, q) = store.resolve(b) {
            if inner == dual && (a == p || a == q) {
                return a;
            }
        }
    }

    // op(op(e, c1), c2) => op(e, c1 op c2) for associative-commutative ops.
    if matches!(op, BinOp::Add | BinOp::Mul | BinOp::Min | BinOp::Max) && store.is_const(b) {
        if let Expr::Binary(inner, p, q) = store.resolve(a) {
            if inner == op && store.is_const(q) {
                if let Some(folded) = fold(op, &store.resolve(q), &store.resolve(b)) {
                    return simp_binary(op, p, intern_folded(folded, store), store);
                }
            }
        }
    }

    store.binary(op, a, b)
}

fn simp_select(c: ExprId, t: ExprId, f: ExprId, store: &ExprStore) -> ExprId {
    match store.resolve(c) {
        Expr::BoolConst(true) => return t,
        Expr::BoolConst(false) => return f,
        _ => {}
    }
    if t == f {
        return t;
    }
    store.select(c, t, f)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::Ty;
    use crate::symbol::SymbolTable;

    fn setup() -> (SymbolTable, ExprStore) {
        (SymbolTable::new(), ExprStore::new())
    }

    #[test]
    fn constant_folding_wraps() {
        let (_, store) = setup();
        let e = store.add(store.int(i32::MAX), store.int(1));
        assert_eq!(simplify(e, &store), store.int(i32::MIN));
        let m = store.mul(store.int(1 << 20), store.int(1 << 20));
        assert_eq!(simplify(m, &store), store.int((1i32 << 20).wrapping_mul(1 << 20)));
    }

    #[test]
    fn units_and_absorbers() {
        let (syms, store) = setup();
        let x = store.var(Ty::Int32, syms.intern("x"));
        assert_eq!(simplify(store.add(x, store.int(0)), &store), x);
        assert_eq!(simplify(store.mul(x, store.int(1)), &store), x);
        assert_eq!(simplify(store.mul(x, store.int(0)), &store), store.int(0));
        assert_eq!(simplify(store.min(x, store.int(i32::MAX)), &store), x);
        assert_eq!(simplify(store.max(x, store.int(i32::MIN)), &store), x);
    }

    #[test]
    fn constants_move_right() {
        let (syms, store) = setup();
        let g = store.call(Ty::Int32, syms.intern("g"), Default::default(), 0);
        let e = store.min(store.int(4), g);
        assert_eq!(simplify(e, &store), store.min(g, store.int(4)));
    }

    #[test]
    fn subtraction_normalizes_to_add() {
        let (syms, store) = setup();
        let x = store.var(Ty::Int32, syms.intern("x"));
        let g = store.call(Ty::Int32, syms.intern("g"), Default::default(), 0);

        // Constant subtrahend folds into a negative constant.
        let e = store.sub(x, store.int(3));
        assert_eq!(simplify(e, &store), store.add(x, store.int(-3)));

        // Symbolic subtrahend becomes g * -1.
        let e2 = store.sub(x, g);
        assert_eq!(
            simplify(e2, &store),
            store.add(x, store.mul(g, store.int(-1)))
        );
    }

    #[test]
    fn double_negation_cancels() {
        let (syms, store) = setup();
        let x = store.var(Ty::Int32, syms.intern("x"));
        let neg = store.mul(x, store.int(-1));
        let e = store.mul(neg, store.int(-1));
        assert_eq!(simplify(e, &store), x);
    }

    #[test]
    fn idempotent_min_max() {
        let (syms, store) = setup();
        let x = store.var(Ty::Int32, syms.intern("x"));
        assert_eq!(simplify(store.min(x, x), &store), x);
        assert_eq!(simplify(store.max(x, x), &store), x);
    }

    #[test]
    fn absorption_collapses_min_max() {
        let (syms, store) = setup();
        let x = store.var(Ty::Int32, syms.intern("x"));
        let y = store.var(Ty::Int32, syms.intern("y"));
        let e = store.max(store.min(x, y), x);
        assert_eq!(simplify(e, &store), x);
        let e2 = store.min(store.max(x, y), y);
        assert_eq!(simplify(e2, &store), y);
    }

    #[test]
    fn min_max_absorb_their_own_operands() {
        let (syms, store) = setup();
        let x = store.var(Ty::Int32, syms.intern("x"));
        let g = store.var(Ty::Int32, syms.intern("g"));
        let e = store.max(store.max(x, g), x);
        assert_eq!(simplify(e, &store), store.max(x, g));
        let e2 = store.min(g, store.min(x, g));
        assert_eq!(simplify(e2, &store), store.min(x, g));
    }

    #[test]
    fn nested_constants_merge() {
        let (syms, store) = setup();
        let x = store.var(Ty::Int32, syms.intern("x"));
        let e = store.add(store.add(x, store.int(2)), store.int(3));
        assert_eq!(simplify(e, &store), store.add(x, store.int(5)));
        let m = store.min(store.min(x, store.int(7)), store.int(4));
        assert_eq!(simplify(m, &store), store.min(x, store.int(4)));
    }

    #[test]
    fn select_folding() {
        let (syms, store) = setup();
        let x = store.var(Ty::Int32, syms.intern("x"));
        let y = store.var(Ty::Int32, syms.intern("y"));
        let e = store.select(store.bool_const(true), x, y);
        assert_eq!(simplify(e, &store), x);
        let c = store.lt(x, y);
        let same = store.select(c, x, x);
        assert_eq!(simplify(same, &store), x);
    }

    #[test]
    fn bool_short_circuits() {
        let (syms, store) = setup();
        let p = store.var(Ty::Bool, syms.intern("p"));
        assert_eq!(simplify(store.and(p, store.bool_const(true)), &store), p);
        assert_eq!(
            simplify(store.and(p, store.bool_const(false)), &store),
            store.bool_const(false)
        );
        assert_eq!(simplify(store.or(p, store.bool_const(false)), &store), p);
    }

    #[test]
    fn lt_folds_on_constants() {
        let (_, store) = setup();
        let e = store.lt(store.int(1), store.int(2));
        assert_eq!(simplify(e, &store), store.bool_const(true));
    }
}

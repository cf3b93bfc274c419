//! Solve-for-variable: rearrange an expression so a named variable
//! sits as far left/outward as algebra allows.
//!
//! The binary-op extractor only recognizes `op(x, y)` with the
//! accumulator placeholder exactly on the left, so the prover runs
//! this pass between self-reference conversion and extraction. The
//! pass is fallible by design: when no rule applies it returns the
//! input unchanged and reports no progress.

use crate::expr::{BinOp, Expr, ExprId, ExprStore};
use crate::pattern::uses_var;
use crate::symbol::Name;

#[cfg(feature = "tracing")]
use crate::trace::trace;

/// Result of a solve pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Solved {
    pub expr: ExprId,
    pub changed: bool,
}

/// Pull `x` leftward/outward through commutative swaps, reassociation
/// of associative chains, and min/max factoring over `+`.
pub fn solve_for(expr: ExprId, x: Name, store: &ExprStore) -> Solved {
    let out = go(expr, x, store);
    #[cfg(feature = "tracing")]
    if out != expr {
        trace!("solve_rearranged");
    }
    Solved {
        expr: out,
        changed: out != expr,
    }
}

fn go(e: ExprId, x: Name, store: &ExprStore) -> ExprId {
    match store.resolve(e) {
        Expr::Binary(op, a, b) if op.is_associative() => {
            let mut a = go(a, x, store);
            let mut b = go(b, x, store);

            // All associative ops here are also commutative: put the
            // x-carrying operand on the left.
            if !uses_var(a, x, store) && uses_var(b, x, store) {
                std::mem::swap(&mut a, &mut b);
            }

            if uses_var(a, x, store) && !uses_var(b, x, store) {
                // (x ∘ q) ∘ b  =>  x ∘ (q ∘ b)
                if let Expr::Binary(inner, p, q) = store.resolve(a) {
                    if inner == op && uses_var(p, x, store) && !uses_var(q, x, store) {
                        let rest = store.binary(op, q, b);
                        return go(store.binary(op, p, rest), x, store);
                    }
                }
            }

            // min/max distribute over +:  min(p + q, p + s) => p + min(q, s)
            if matches!(op, BinOp::Min | BinOp::Max) {
                if let (Expr::Binary(BinOp::Add, p, q), Expr::Binary(BinOp::Add, r, s)) =
                    (store.resolve(a), store.resolve(b))
                {
                    if p == r && uses_var(p, x, store) {
                        return store.add(p, store.binary(op, q, s));
                    }
                }
            }

            store.binary(op, a, b)
        }
        Expr::Binary(op, a, b) => {
            let na = go(a, x, store);
            let nb = go(b, x, store);
            store.binary(op, na, nb)
        }
        Expr::Select(c, t, f) => {
            let nt = go(t, x, store);
            let nf = go(f, x, store);
            store.select(c, nt, nf)
        }
        Expr::Let { name, value, body } => {
            let nb = go(body, x, store);
            store.let_in(name, value, nb)
        }
        _ => e,
    }
}

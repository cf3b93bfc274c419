//! Single-slot binary-operator extraction.
//!
//! Given one tuple slot's post-conversion expression, try to decompose
//! it as `op(x, y)` where `x` is the slot's placeholder and `y` is
//! everything else. The solve pass has already pulled the placeholder
//! as far left as algebra allows, so a simple shape check suffices;
//! anything it misses goes to the pattern table (32-bit integer slots
//! only). Returning None is the ordinary not-associative outcome.

use crate::expr::{BinOp, Expr, ExprId, ExprStore, Ty};
use crate::pattern::uses_var;
use crate::prove::{Replacement, SlotOp};
use crate::symbol::{Name, SymbolTable};
use crate::table::{find_match, ops_table};

#[cfg(feature = "tracing")]
use crate::trace::debug;

/// Identity element of a built-in associative operator.
fn identity_of(op: BinOp, ty: Ty, store: &ExprStore) -> ExprId {
    match op {
        BinOp::Add => store.int(0),
        BinOp::Mul => store.int(1),
        BinOp::Min => store.max_of(ty),
        BinOp::Max => store.min_of(ty),
        BinOp::And => store.bool_const(true),
        BinOp::Or => store.bool_const(false),
        BinOp::Sub | BinOp::Lt => unreachable!("no identity for {}", op.symbol()),
    }
}

/// Try to express one slot as an associative binary operator.
pub fn extract_binary_op(
    store: &ExprStore,
    syms: &SymbolTable,
    x_name: Name,
    y_name: Name,
    x_part: Option<ExprId>,
    expr: ExprId,
) -> Option<SlotOp> {
    let ty = store.ty(expr);

    // No self-reference: the slot is a pure function of new data.
    // Sequential accumulation overwrites, so any identity works; it is
    // discarded at the use site.
    let Some(x_part) = x_part else {
        return Some(SlotOp {
            op: store.var(ty, y_name),
            identity: store.zero_of(ty),
            x: None,
            y: Replacement {
                var: y_name,
                expr,
            },
        });
    };

    if let Expr::Binary(op, a, b) = store.resolve(expr) {
        if op.is_associative() {
            let lhs_is_x = matches!(store.is_var(a), Some((_, n)) if n == x_name);
            if lhs_is_x && !uses_var(b, x_name, store) {
                let x_var = store.var(ty, x_name);
                let y_var = store.var(ty, y_name);
                return Some(SlotOp {
                    op: store.binary(op, x_var, y_var),
                    identity: identity_of(op, ty, store),
                    x: Some(Replacement {
                        var: x_name,
                        expr: x_part,
                    }),
                    y: Replacement {
                        var: y_name,
                        expr: b,
                    },
                });
            }
            #[cfg(feature = "tracing")]
            debug!(op = op.symbol(), "simple_shape_check_failed");
        }
    }

    if matches!(store.resolve(expr), Expr::Let { .. }) {
        panic!("lets must be inlined before binary-op extraction");
    }

    // Non-trivial shape: consult the single-slot table (int32 only).
    if ty != Ty::Int32 {
        return None;
    }
    let table = ops_table(1, store, syms);
    let slots = find_match(
        &table,
        &[x_name],
        &[y_name],
        &[Some(x_part)],
        &[expr],
        store,
    )?;
    debug_assert_eq!(slots.len(), 1);
    slots.into_iter().next()
}

#[cfg(test)]
#[path = "tests/extract.rs"]
mod tests;

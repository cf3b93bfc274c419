//! Common-subexpression elimination and let inlining.
//!
//! `cse` binds maximal repeated non-trivial subtrees to fresh `Let`
//! names; `inline_lets` substitutes every let away. The prover runs
//! both around simplification so that differently-spelled but equal
//! subtrees are recognized, then works on a let-free tree.

use crate::expr::{Expr, ExprId, ExprStore};
use crate::pattern::substitute_expr;
use crate::symbol::{Name, SymbolTable};
use hashbrown::HashMap;

/// Bind maximal repeated subtrees to fresh lets.
///
/// Only non-trivial nodes (calls, operators, selects) are candidates;
/// constants and variables are never worth naming.
pub fn cse(expr: ExprId, store: &ExprStore, syms: &SymbolTable) -> ExprId {
    let mut counts: HashMap<ExprId, usize> = HashMap::new();
    count_occurrences(expr, store, &mut counts);

    let mut candidates: Vec<ExprId> = counts
        .iter()
        .filter(|(id, n)| **n >= 2 && is_candidate(**id, store))
        .map(|(id, _)| *id)
        .collect();

    // Keep only maximal candidates: a repeated subtree nested inside a
    // larger repeated subtree is named along with its parent.
    candidates.retain(|&c| {
        !counts.iter().any(|(&d, &n)| {
            n >= 2 && d != c && is_candidate(d, store) && contains(d, c, store)
        })
    });
    // Deterministic let order.
    candidates.sort_by_key(|id| id.raw());

    let mut body = expr;
    let mut bindings: Vec<(Name, ExprId)> = Vec::new();
    for cand in candidates {
        let name = syms.fresh("_cse");
        let var = store.var(store.ty(cand), name);
        body = substitute_expr(body, cand, var, store);
        bindings.push((name, cand));
    }
    for (name, value) in bindings.into_iter().rev() {
        body = store.let_in(name, value, body);
    }
    body
}

fn is_candidate(id: ExprId, store: &ExprStore) -> bool {
    matches!(
        store.resolve(id),
        Expr::Binary(_, _, _) | Expr::Select(_, _, _) | Expr::Call { .. }
    )
}

fn count_occurrences(expr: ExprId, store: &ExprStore, counts: &mut HashMap<ExprId, usize>) {
    *counts.entry(expr).or_insert(0) += 1;
    match store.resolve(expr) {
        Expr::IntConst(_) | Expr::BoolConst(_) | Expr::Var(_, _) => {}
        Expr::Binary(_, a, b) => {
            count_occurrences(a, store, counts);
            count_occurrences(b, store, counts);
        }
        Expr::Select(c, t, f) => {
            count_occurrences(c, store, counts);
            count_occurrences(t, store, counts);
            count_occurrences(f, store, counts);
        }
        Expr::Call { args, .. } => {
            for a in args.iter() {
                count_occurrences(*a, store, counts);
            }
        }
        Expr::Let { value, body, .. } => {
            count_occurrences(value, store, counts);
            count_occurrences(body, store, counts);
        }
    }
}

fn contains(haystack: ExprId, needle: ExprId, store: &ExprStore) -> bool {
    if haystack == needle {
        return false; // strict containment only
    }
    let mut stack = vec![haystack];
    while let Some(id) = stack.pop() {
        if id == needle && id != haystack {
            return true;
        }
        match store.resolve(id) {
            Expr::IntConst(_) | Expr::BoolConst(_) | Expr::Var(_, _) => {}
            Expr::Binary(_, a, b) => {
                stack.push(a);
                stack.push(b);
            }
            Expr::Select(c, t, f) => {
                stack.push(c);
                stack.push(t);
                stack.push(f);
            }
            Expr::Call { args, .. } => stack.extend(args.iter().copied()),
            Expr::Let { value, body, .. } => {
                stack.push(value);
                stack.push(body);
            }
        }
    }
    false
}

/// Substitute every `Let` binding into its body, returning a let-free
/// expression. Inner bindings shadow outer ones of the same name.
pub fn inline_lets(expr: ExprId, store: &ExprStore) -> ExprId {
    let mut scope: HashMap<Name, ExprId> = HashMap::new();
    inline(expr, store, &mut scope)
}

fn inline(expr: ExprId, store: &ExprStore, scope: &mut HashMap<Name, ExprId>) -> ExprId {
    match store.resolve(expr) {
        Expr::Var(_, name) => scope.get(&name).copied().unwrap_or(expr),
        Expr::IntConst(_) | Expr::BoolConst(_) => expr,
        Expr::Let { name, value, body } => {
            let value = inline(value, store, scope);
            let saved = scope.insert(name, value);
            let out = inline(body, store, scope);
            match saved {
                Some(prev) => {
                    scope.insert(name, prev);
                }
                None => {
                    scope.remove(&name);
                }
            }
            out
        }
        Expr::Binary(op, a, b) => {
            let na = inline(a, store, scope);
            let nb = inline(b, store, scope);
            store.binary(op, na, nb)
        }
        Expr::Select(c, t, f) => {
            let nc = inline(c, store, scope);
            let nt = inline(t, store, scope);
            let nf = inline(f, store, scope);
            store.select(nc, nt, nf)
        }
        Expr::Call {
            ty,
            name,
            args,
            value_index,
        } => {
            let new_args = args.iter().map(|a| inline(*a, store, scope)).collect();
            store.call(ty, name, new_args, value_index)
        }
    }
}

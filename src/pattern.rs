//! Structural matching against wildcard-bearing templates, plus the
//! substitution and variable-usage helpers the prover is built from.
//!
//! A template is an ordinary expression; every `Var` node in it is a
//! named wildcard that matches any expression of the same type. The
//! same wildcard name must resolve to one expression everywhere it
//! appears.

use crate::expr::{Expr, ExprId, ExprStore};
use crate::symbol::Name;
use hashbrown::{HashMap, HashSet};
use smallvec::SmallVec;

#[cfg(feature = "tracing")]
use crate::trace::trace;

/// Wildcard name -> matched expression.
pub type MatchEnv = HashMap<Name, ExprId>;

/// Match `expr` against `template`, returning the wildcard bindings.
///
/// Uses an explicit worklist to avoid recursion. Returns None on any
/// structural mismatch or on a wildcard rebinding to a different
/// expression.
pub fn match_template(template: ExprId, expr: ExprId, store: &ExprStore) -> Option<MatchEnv> {
    let mut env = MatchEnv::new();
    let mut worklist: SmallVec<[(ExprId, ExprId); 16]> = SmallVec::new();
    worklist.push((template, expr));

    while let Some((t, e)) = worklist.pop() {
        match store.resolve(t) {
            Expr::Var(ty, name) => {
                if store.ty(e) != ty {
                    #[cfg(feature = "tracing")]
                    trace!("match_wildcard_type_mismatch");
                    return None;
                }
                match env.get(&name) {
                    Some(&bound) if bound != e => {
                        #[cfg(feature = "tracing")]
                        trace!("match_inconsistent_binding");
                        return None;
                    }
                    Some(_) => {}
                    None => {
                        env.insert(name, e);
                    }
                }
            }
            Expr::IntConst(tv) => match store.resolve(e) {
                Expr::IntConst(ev) if ev == tv => {}
                _ => return None,
            },
            Expr::BoolConst(tv) => match store.resolve(e) {
                Expr::BoolConst(ev) if ev == tv => {}
                _ => return None,
            },
            Expr::Binary(top, ta, tb) => match store.resolve(e) {
                Expr::Binary(eop, ea, eb) if eop == top => {
                    worklist.push((ta, ea));
                    worklist.push((tb, eb));
                }
                _ => return None,
            },
            Expr::Select(tc, tt, tf) => match store.resolve(e) {
                Expr::Select(ec, et, ef) => {
                    worklist.push((tc, ec));
                    worklist.push((tt, et));
                    worklist.push((tf, ef));
                }
                _ => return None,
            },
            Expr::Call {
                name: tname,
                args: targs,
                value_index: tidx,
                ..
            } => match store.resolve(e) {
                Expr::Call {
                    name: ename,
                    args: eargs,
                    value_index: eidx,
                    ..
                } if ename == tname && eidx == tidx && eargs.len() == targs.len() => {
                    for (ta, ea) in targs.iter().zip(eargs.iter()) {
                        worklist.push((*ta, *ea));
                    }
                }
                _ => return None,
            },
            // Templates never contain lets.
            Expr::Let { .. } => return None,
        }
    }

    Some(env)
}

/// Replace every variable bound in `env` with its binding.
pub fn substitute_vars(expr: ExprId, env: &MatchEnv, store: &ExprStore) -> ExprId {
    rewrite(expr, store, &mut HashMap::new(), &mut |id, store| {
        match store.resolve(id) {
            Expr::Var(_, name) => env.get(&name).copied(),
            _ => None,
        }
    })
}

/// Replace every occurrence of the subtree `from` with `to`.
pub fn substitute_expr(expr: ExprId, from: ExprId, to: ExprId, store: &ExprStore) -> ExprId {
    rewrite(expr, store, &mut HashMap::new(), &mut |id, _| {
        if id == from {
            Some(to)
        } else {
            None
        }
    })
}

/// Bottom-up rebuild with a leaf-replacement hook. Memoized on node id
/// so shared subtrees are rewritten once.
fn rewrite(
    expr: ExprId,
    store: &ExprStore,
    memo: &mut HashMap<ExprId, ExprId>,
    replace: &mut dyn FnMut(ExprId, &ExprStore) -> Option<ExprId>,
) -> ExprId {
    if let Some(&done) = memo.get(&expr) {
        return done;
    }
    if let Some(new) = replace(expr, store) {
        memo.insert(expr, new);
        return new;
    }
    let out = match store.resolve(expr) {
        Expr::IntConst(_) | Expr::BoolConst(_) | Expr::Var(_, _) => expr,
        Expr::Binary(op, a, b) => {
            let na = rewrite(a, store, memo, replace);
            let nb = rewrite(b, store, memo, replace);
            if na == a && nb == b {
                expr
            } else {
                store.binary(op, na, nb)
            }
        }
        Expr::Select(c, t, f) => {
            let nc = rewrite(c, store, memo, replace);
            let nt = rewrite(t, store, memo, replace);
            let nf = rewrite(f, store, memo, replace);
            if nc == c && nt == t && nf == f {
                expr
            } else {
                store.select(nc, nt, nf)
            }
        }
        Expr::Call {
            ty,
            name,
            args,
            value_index,
        } => {
            let new_args: SmallVec<[ExprId; 4]> = args
                .iter()
                .map(|a| rewrite(*a, store, memo, replace))
                .collect();
            if new_args == args {
                expr
            } else {
                store.call(ty, name, new_args, value_index)
            }
        }
        Expr::Let { name, value, body } => {
            let nv = rewrite(value, store, memo, replace);
            let nb = rewrite(body, store, memo, replace);
            if nv == value && nb == body {
                expr
            } else {
                store.let_in(name, nv, nb)
            }
        }
    };
    memo.insert(expr, out);
    out
}

/// Does `expr` reference the variable `name` anywhere?
pub fn uses_var(expr: ExprId, name: Name, store: &ExprStore) -> bool {
    let mut single = HashSet::new();
    single.insert(name);
    uses_any_var(expr, &single, store)
}

/// Does `expr` reference any of the given variables?
pub fn uses_any_var(expr: ExprId, names: &HashSet<Name>, store: &ExprStore) -> bool {
    let mut stack: SmallVec<[ExprId; 16]> = SmallVec::new();
    let mut seen: HashSet<ExprId> = HashSet::new();
    stack.push(expr);

    while let Some(id) = stack.pop() {
        if !seen.insert(id) {
            continue;
        }
        match store.resolve(id) {
            Expr::Var(_, n) => {
                if names.contains(&n) {
                    return true;
                }
            }
            Expr::IntConst(_) | Expr::BoolConst(_) => {}
            Expr::Binary(_, a, b) => {
                stack.push(a);
                stack.push(b);
            }
            Expr::Select(c, t, f) => {
                stack.push(c);
                stack.push(t);
                stack.push(f);
            }
            Expr::Call { args, .. } => {
                for a in args.iter() {
                    stack.push(*a);
                }
            }
            Expr::Let { value, body, .. } => {
                stack.push(value);
                stack.push(body);
            }
        }
    }
    false
}

#[cfg(test)]
#[path = "tests/pattern.rs"]
mod tests;

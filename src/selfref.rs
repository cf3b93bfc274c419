//! Self-reference conversion.
//!
//! Rewrites calls back into the function being defined (`f(args)[k]`)
//! into that slot's canonical placeholder variable, so the rest of the
//! prover can treat the accumulator as an opaque value. Two shapes
//! disqualify the proof outright:
//!
//! - a self-reference to the slot under analysis inside a `select`
//!   condition (conditional self-reference), and
//! - a self-reference whose arguments differ from the left-hand side
//!   (an update reading a *different* accumulator coordinate).
//!
//! A self-reference with a different argument *count* is a malformed
//! definition and panics: the front end can never produce it.

use crate::expr::{Expr, ExprId, ExprStore};
use crate::symbol::Name;
use hashbrown::HashSet;
use smallvec::SmallVec;

#[cfg(feature = "tracing")]
use crate::trace::debug;

/// Outcome of converting one tuple slot's update expression.
#[derive(Debug, Clone)]
pub struct SelfRefConversion {
    /// The expression with self-references replaced by placeholders.
    pub expr: ExprId,
    /// False when a disqualifying self-reference was found.
    pub is_solvable: bool,
    /// The original self-reference call for the slot under analysis,
    /// if the slot reads its own previous value.
    pub x_part: Option<ExprId>,
    /// Other tuple slots this slot's update reads.
    pub dependencies: HashSet<usize>,
}

struct Converter<'a> {
    store: &'a ExprStore,
    func: Name,
    args: &'a [ExprId],
    value_index: usize,
    x_names: &'a [Name],
    in_condition: bool,
    is_solvable: bool,
    x_part: Option<ExprId>,
    dependencies: HashSet<usize>,
}

impl<'a> Converter<'a> {
    fn mutate(&mut self, e: ExprId) -> ExprId {
        if !self.is_solvable {
            return e;
        }
        match self.store.resolve(e) {
            Expr::IntConst(_) | Expr::BoolConst(_) | Expr::Var(_, _) => e,
            Expr::Call {
                ty,
                name,
                args,
                value_index,
            } => {
                let new_args: SmallVec<[ExprId; 4]> =
                    args.iter().map(|a| self.mutate(*a)).collect();
                if !self.is_solvable {
                    return e;
                }
                if name != self.func {
                    return self.store.call(ty, name, new_args, value_index);
                }

                assert_eq!(
                    new_args.len(),
                    self.args.len(),
                    "self-reference arity differs from the definition"
                );
                let slot = value_index as usize;
                assert!(
                    slot < self.x_names.len(),
                    "self-reference value index {slot} out of range"
                );

                if self.in_condition && slot == self.value_index {
                    #[cfg(feature = "tracing")]
                    debug!(slot, "self_reference_inside_condition");
                    self.is_solvable = false;
                    return e;
                }
                for (call_arg, lhs_arg) in new_args.iter().zip(self.args.iter()) {
                    if !self.store.equal(*call_arg, *lhs_arg) {
                        #[cfg(feature = "tracing")]
                        debug!(slot, "self_reference_with_different_args");
                        self.is_solvable = false;
                        return e;
                    }
                }

                if slot == self.value_index {
                    // Hashconsing keeps repeated sightings identical.
                    self.x_part = Some(e);
                } else {
                    self.dependencies.insert(slot);
                }
                self.store.var(ty, self.x_names[slot])
            }
            Expr::Binary(op, a, b) => {
                let na = self.mutate(a);
                let nb = self.mutate(b);
                if !self.is_solvable {
                    return e;
                }
                self.store.binary(op, na, nb)
            }
            Expr::Select(c, t, f) => {
                let saved = self.in_condition;
                self.in_condition = true;
                let nc = self.mutate(c);
                self.in_condition = saved;
                let nt = self.mutate(t);
                let nf = self.mutate(f);
                if !self.is_solvable {
                    return e;
                }
                self.store.select(nc, nt, nf)
            }
            Expr::Let { name, value, body } => {
                let nv = self.mutate(value);
                let nb = self.mutate(body);
                if !self.is_solvable {
                    return e;
                }
                self.store.let_in(name, nv, nb)
            }
        }
    }
}

/// Convert all self-references to `func` in one slot's update
/// expression. `x_names` holds the canonical placeholder for every
/// tuple slot, so cross-slot references bind consistently across the
/// whole proof attempt.
pub fn convert_self_refs(
    store: &ExprStore,
    func: Name,
    args: &[ExprId],
    value_index: usize,
    x_names: &[Name],
    expr: ExprId,
) -> SelfRefConversion {
    let mut conv = Converter {
        store,
        func,
        args,
        value_index,
        x_names,
        in_condition: false,
        is_solvable: true,
        x_part: None,
        dependencies: HashSet::new(),
    };
    let out = conv.mutate(expr);
    SelfRefConversion {
        expr: if conv.is_solvable { out } else { expr },
        is_solvable: conv.is_solvable,
        x_part: conv.x_part,
        dependencies: conv.dependencies,
    }
}

#[cfg(test)]
#[path = "tests/selfref.rs"]
mod tests;

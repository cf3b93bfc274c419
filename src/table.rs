//! Pattern tables of known associative operators.
//!
//! Each entry pairs operator templates (over wildcard names `x{k}`,
//! `y{k}`) with identity constants, one per tuple slot of the entry's
//! arity. Tables are ordered: the first structurally matching entry
//! wins and no backtracking is attempted once an entry is rejected.
//! Entries cover 32-bit integer reductions only.
//!
//! Tables are built fresh per prover invocation; templates are run
//! through the simplifier so that they share the canonical form of the
//! expressions they will be matched against (in particular the
//! subtraction normalization).

use crate::expr::{ExprId, ExprStore, Ty};
use crate::pattern::{match_template, substitute_expr, uses_any_var, MatchEnv};
use crate::prove::{Replacement, SlotOp};
use crate::simplify::simplify;
use crate::symbol::{Name, SymbolTable};
use hashbrown::HashSet;
use smallvec::{smallvec, SmallVec};

#[cfg(feature = "tracing")]
use crate::trace::debug;

/// One known associative operator: templates plus identities, indexed
/// by slot within the entry.
#[derive(Debug, Clone)]
pub struct AssociativePattern {
    pub ops: SmallVec<[ExprId; 2]>,
    pub identities: SmallVec<[ExprId; 2]>,
}

/// An ordered pattern table for a fixed subgraph arity.
pub struct OpsTable {
    entries: Vec<AssociativePattern>,
    x_wilds: Vec<Name>,
    y_wilds: Vec<Name>,
}

impl OpsTable {
    pub fn arity(&self) -> usize {
        self.x_wilds.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Build the table for subgraphs of the given arity (1 or 2).
pub fn ops_table(arity: usize, store: &ExprStore, syms: &SymbolTable) -> OpsTable {
    assert!(
        arity >= 1 && arity <= 2,
        "no pattern table for subgraphs of {arity} slots"
    );
    let x_wilds: Vec<Name> = (0..arity).map(|k| syms.intern(&format!("x{k}"))).collect();
    let y_wilds: Vec<Name> = (0..arity).map(|k| syms.intern(&format!("y{k}"))).collect();
    let xv: Vec<ExprId> = x_wilds.iter().map(|&n| store.var(Ty::Int32, n)).collect();
    let yv: Vec<ExprId> = y_wilds.iter().map(|&n| store.var(Ty::Int32, n)).collect();

    let entries = if arity == 1 {
        let (x0, y0) = (xv[0], yv[0]);
        vec![
            AssociativePattern {
                ops: smallvec![store.add(x0, y0)],
                identities: smallvec![store.int(0)],
            },
            AssociativePattern {
                ops: smallvec![store.mul(x0, y0)],
                identities: smallvec![store.int(1)],
            },
            AssociativePattern {
                ops: smallvec![store.min(x0, y0)],
                identities: smallvec![store.int(i32::MAX)],
            },
            AssociativePattern {
                ops: smallvec![store.max(x0, y0)],
                identities: smallvec![store.int(i32::MIN)],
            },
            // x + y + x*y, the "probabilistic or" shape.
            AssociativePattern {
                ops: smallvec![store.add(store.add(x0, y0), store.mul(x0, y0))],
                identities: smallvec![store.int(0)],
            },
        ]
    } else {
        let (x0, x1, y0, y1) = (xv[0], xv[1], yv[0], yv[1]);
        vec![
            // argmin: running minimum plus its witness.
            AssociativePattern {
                ops: smallvec![
                    store.min(x0, y0),
                    store.select(store.lt(x0, y0), x1, y1)
                ],
                identities: smallvec![store.int(i32::MAX), store.int(0)],
            },
            // argmax.
            AssociativePattern {
                ops: smallvec![
                    store.max(x0, y0),
                    store.select(store.lt(y0, x0), x1, y1)
                ],
                identities: smallvec![store.int(i32::MIN), store.int(0)],
            },
            // Complex multiplication over (re, im). The imaginary slot
            // is oriented with its own accumulator leftmost, the form
            // the solve pass produces.
            AssociativePattern {
                ops: smallvec![
                    store.sub(store.mul(x0, y0), store.mul(x1, y1)),
                    store.add(store.mul(x1, y0), store.mul(x0, y1))
                ],
                identities: smallvec![store.int(1), store.int(0)],
            },
        ]
    };

    let entries = entries
        .into_iter()
        .map(|p| AssociativePattern {
            ops: p.ops.iter().map(|&op| simplify(op, store)).collect(),
            identities: p.identities,
        })
        .collect();

    OpsTable {
        entries,
        x_wilds,
        y_wilds,
    }
}

/// Match a subgraph of slot expressions against the table, first
/// entry wins.
///
/// An entry is rejected when any slot fails to match structurally,
/// when an `x{k}` wildcard resolves to anything but the expected
/// placeholder variable, when a `y{k}` wildcard's binding references
/// any placeholder (the new contribution must be independent of
/// history), when a wildcard rebinds inconsistently across the
/// entry's slots, or when some `y{k}` is never bound at all.
pub fn find_match(
    table: &OpsTable,
    x_names: &[Name],
    y_names: &[Name],
    x_parts: &[Option<ExprId>],
    exprs: &[ExprId],
    store: &ExprStore,
) -> Option<Vec<SlotOp>> {
    assert_eq!(x_names.len(), y_names.len(), "per-slot table mismatch");
    assert_eq!(x_names.len(), x_parts.len(), "per-slot table mismatch");
    assert_eq!(x_names.len(), exprs.len(), "per-slot table mismatch");

    let x_name_set: HashSet<Name> = x_names.iter().copied().collect();

    'entry: for pattern in &table.entries {
        assert_eq!(
            pattern.ops.len(),
            exprs.len(),
            "table entry arity does not match the call site"
        );

        let mut env = MatchEnv::new();
        for (&template, &e) in pattern.ops.iter().zip(exprs.iter()) {
            let Some(m) = match_template(template, e, store) else {
                continue 'entry;
            };
            for (&wild, &bound) in m.iter() {
                if let Some(k) = table.x_wilds.iter().position(|&w| w == wild) {
                    // x-wildcards must be exactly the placeholder.
                    match store.is_var(bound) {
                        Some((_, n)) if n == x_names[k] => {}
                        _ => continue 'entry,
                    }
                } else if table.y_wilds.contains(&wild)
                    && uses_any_var(bound, &x_name_set, store)
                {
                    // A y-part must not depend on any accumulator value.
                    continue 'entry;
                }
                match env.get(&wild) {
                    Some(&prev) if prev != bound => continue 'entry,
                    Some(_) => {}
                    None => {
                        env.insert(wild, bound);
                    }
                }
            }
        }

        let mut y_parts: Vec<ExprId> = Vec::with_capacity(exprs.len());
        for k in 0..exprs.len() {
            match env.get(&table.y_wilds[k]) {
                Some(&y) => y_parts.push(y),
                None => continue 'entry,
            }
        }

        #[cfg(feature = "tracing")]
        debug!("pattern_table_entry_matched");

        // Substitute y-parts back in index order; later y-parts may be
        // subtrees of earlier ones (argmin: y0 = g(rx)[0], y1 = rx).
        let replacements: Vec<(ExprId, ExprId)> = y_parts
            .iter()
            .enumerate()
            .map(|(k, &y)| (y, store.var(store.ty(y), y_names[k])))
            .collect();

        let mut slots = Vec::with_capacity(exprs.len());
        for k in 0..exprs.len() {
            let mut op = exprs[k];
            for &(from, to) in &replacements {
                op = substitute_expr(op, from, to, store);
            }
            slots.push(SlotOp {
                op,
                identity: pattern.identities[k],
                x: x_parts[k].map(|xp| Replacement {
                    var: x_names[k],
                    expr: xp,
                }),
                y: Replacement {
                    var: y_names[k],
                    expr: y_parts[k],
                },
            });
        }
        return Some(slots);
    }
    None
}

#[cfg(test)]
#[path = "tests/table.rs"]
mod tests;

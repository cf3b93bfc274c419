//! The associativity prover.
//!
//! Entry point for the reduction-lowering stage: given a recursive
//! update definition `f(args) = (e_0, ..., e_{n-1})`, decide whether
//! the update is an associative merge and, if so, hand back the
//! equivalent binary operator, its identity, and the accumulator /
//! new-contribution split per tuple slot.
//!
//! All expected negatives (not associative, no identity, subgraph too
//! wide) come back as `ProofResult::NotAssociative`; the caller falls
//! back to strictly sequential lowering. Panics are reserved for
//! malformed input, which indicates a bug upstream in the compiler.

use crate::cse::{cse, inline_lets};
use crate::deps::{add_transitive, subgraphs, MAX_SUBGRAPH};
use crate::expr::{ExprId, ExprStore};
use crate::extract::extract_binary_op;
use crate::selfref::convert_self_refs;
use crate::simplify::simplify;
use crate::solve::solve_for;
use crate::symbol::{Name, SymbolTable};
use crate::table::{find_match, ops_table};
use hashbrown::HashSet;

#[cfg(feature = "tracing")]
use crate::trace::debug;

/// One variable replacement: `var` stands for `expr` inside a slot's
/// operator expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Replacement {
    pub var: Name,
    pub expr: ExprId,
}

/// Proof output for one tuple slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotOp {
    /// The merge operator, written over the canonical x/y names.
    pub op: ExprId,
    /// The operator's identity element (type-matched to the slot).
    pub identity: ExprId,
    /// Accumulator binding. None when the slot never reads its own
    /// previous value; the identity is then a placeholder.
    pub x: Option<Replacement>,
    /// New-contribution binding.
    pub y: Replacement,
}

/// Result of a proof attempt. A failed proof carries no partial data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProofResult {
    Proved(Vec<SlotOp>),
    NotAssociative,
}

impl ProofResult {
    pub fn is_associative(&self) -> bool {
        matches!(self, ProofResult::Proved(_))
    }

    pub fn slots(&self) -> Option<&[SlotOp]> {
        match self {
            ProofResult::Proved(slots) => Some(slots),
            ProofResult::NotAssociative => None,
        }
    }
}

/// Prove associativity of a tuple-valued update definition.
///
/// `args` are the left-hand-side index expressions of `func`; `exprs`
/// holds one update expression per tuple slot.
pub fn prove_associativity(
    store: &ExprStore,
    syms: &SymbolTable,
    func: Name,
    args: &[ExprId],
    exprs: &[ExprId],
) -> ProofResult {
    assert!(!exprs.is_empty(), "a definition has at least one slot");
    let n = exprs.len();

    // Normalize the LHS arguments first so differently-spelled but
    // equal coordinates compare equal during self-reference detection.
    let args: Vec<ExprId> = args
        .iter()
        .map(|&a| {
            let a = cse(a, store, syms);
            let a = simplify(a, store);
            inline_lets(a, store)
        })
        .collect();

    let x_names: Vec<Name> = (0..n).map(|i| syms.fresh(&format!("_x_{i}"))).collect();
    let y_names: Vec<Name> = (0..n).map(|i| syms.fresh(&format!("_y_{i}"))).collect();

    let mut exprs: Vec<ExprId> = exprs.to_vec();
    let mut x_parts: Vec<Option<ExprId>> = vec![None; n];
    let mut dependencies: Vec<HashSet<usize>> = vec![HashSet::new(); n];
    let mut all_independent = true;

    // Process slots from last to first so that by the time a slot is
    // converted, every higher slot's placeholder binding already
    // exists.
    for idx in (0..n).rev() {
        let mut e = exprs[idx];
        e = simplify(e, store);
        e = cse(e, store, syms);
        e = inline_lets(e, store);

        let conv = convert_self_refs(store, func, &args, idx, &x_names, e);
        if !conv.is_solvable {
            #[cfg(feature = "tracing")]
            debug!(slot = idx, "self_reference_conversion_failed");
            return ProofResult::NotAssociative;
        }
        if !conv.dependencies.is_empty() {
            all_independent = false;
        }
        x_parts[idx] = conv.x_part;
        dependencies[idx] = conv.dependencies;
        if conv.x_part.is_some() {
            dependencies[idx].insert(idx);
        }

        // Pull the placeholder as far left as possible to give the
        // simple-shape check its best chance.
        e = cse(conv.expr, store, syms);
        e = simplify(e, store);
        e = solve_for(e, x_names[idx], store).expr;
        e = inline_lets(e, store);
        exprs[idx] = e;
    }

    add_transitive(&mut dependencies);

    if all_independent || n == 1 {
        #[cfg(feature = "tracing")]
        debug!("proving_slots_independently");
        let mut slots = Vec::with_capacity(n);
        for idx in 0..n {
            match extract_binary_op(
                store,
                syms,
                x_names[idx],
                y_names[idx],
                x_parts[idx],
                exprs[idx],
            ) {
                Some(slot) => slots.push(slot),
                None => {
                    #[cfg(feature = "tracing")]
                    debug!(slot = idx, "single_slot_extraction_failed");
                    return ProofResult::NotAssociative;
                }
            }
        }
        return ProofResult::Proved(slots);
    }

    #[cfg(feature = "tracing")]
    debug!("proving_cross_dependent_slots_jointly");

    let graphs = subgraphs(&dependencies);
    assert_eq!(graphs.len(), n, "mismatched per-slot tables");
    let mut results: Vec<Option<SlotOp>> = vec![None; n];

    for graph in graphs.iter().filter(|g| !g.is_empty()) {
        if graph.len() > MAX_SUBGRAPH {
            // Documented limitation, not a wrong answer.
            #[cfg(feature = "tracing")]
            debug!(size = graph.len(), "dependency_subgraph_too_wide");
            return ProofResult::NotAssociative;
        }

        let mut indices: Vec<usize> = graph.iter().copied().collect();
        indices.sort_unstable();

        let sub_exprs: Vec<ExprId> = indices.iter().map(|&i| exprs[i]).collect();
        let sub_x_names: Vec<Name> = indices.iter().map(|&i| x_names[i]).collect();
        let sub_y_names: Vec<Name> = indices.iter().map(|&i| y_names[i]).collect();
        let sub_x_parts: Vec<Option<ExprId>> = indices.iter().map(|&i| x_parts[i]).collect();

        let table = ops_table(indices.len(), store, syms);
        let Some(sub_slots) = find_match(
            &table,
            &sub_x_names,
            &sub_y_names,
            &sub_x_parts,
            &sub_exprs,
            store,
        ) else {
            #[cfg(feature = "tracing")]
            debug!("no_matching_table_entry");
            return ProofResult::NotAssociative;
        };

        for (slot, &index) in sub_slots.into_iter().zip(indices.iter()) {
            match &results[index] {
                Some(existing) if *existing != slot => {
                    // Two subgraphs disagreeing on a shared slot should
                    // be impossible given the partition, but a silent
                    // wrong answer is worse than a failed proof.
                    #[cfg(feature = "tracing")]
                    debug!(slot = index, "conflicting_subgraph_results");
                    return ProofResult::NotAssociative;
                }
                Some(_) => {}
                None => results[index] = Some(slot),
            }
        }
    }

    // Slots outside every subgraph have no self-reference; they merge
    // trivially as a pure function of the new data.
    let mut slots = Vec::with_capacity(n);
    for (idx, result) in results.into_iter().enumerate() {
        match result {
            Some(slot) => slots.push(slot),
            None => {
                assert!(
                    x_parts[idx].is_none(),
                    "self-referencing slot {idx} missing from every subgraph"
                );
                let ty = store.ty(exprs[idx]);
                slots.push(SlotOp {
                    op: store.var(ty, y_names[idx]),
                    identity: store.zero_of(ty),
                    x: None,
                    y: Replacement {
                        var: y_names[idx],
                        expr: exprs[idx],
                    },
                });
            }
        }
    }
    ProofResult::Proved(slots)
}

#[cfg(test)]
#[path = "tests/prove.rs"]
mod tests;

//! Dependency analysis across tuple slots.
//!
//! Slot `i` depends on slot `j` when slot `i`'s update expression
//! self-references slot `j`. Joint proofs are attempted per connected
//! dependency subgraph; subgraphs wider than `MAX_SUBGRAPH` are a
//! proof failure, not an error.

use hashbrown::HashSet;

#[cfg(feature = "tracing")]
use crate::trace::debug;

/// Largest dependency subgraph the pattern tables can prove jointly.
pub const MAX_SUBGRAPH: usize = 2;

/// Propagate dependencies to a fixed point: if `i -> j` and `j -> k`
/// then `i -> k`. Naive iteration; tuple arity is small in practice.
pub fn add_transitive(deps: &mut [HashSet<usize>]) {
    let n = deps.len();
    let mut changed = true;
    while changed {
        changed = false;
        for i in 0..n {
            let mut additions: Vec<usize> = Vec::new();
            for &j in deps[i].iter() {
                if j == i || j >= n {
                    continue;
                }
                for &k in deps[j].iter() {
                    if !deps[i].contains(&k) {
                        additions.push(k);
                    }
                }
            }
            if !additions.is_empty() {
                changed = true;
                deps[i].extend(additions);
            }
        }
    }
}

/// Extract the subgraphs to prove jointly.
///
/// A slot's dependency set is dropped when it is a strict subset of
/// another slot's set (the larger joint proof covers it), or when it
/// duplicates a lower-indexed slot's set (identical sets produce
/// identical sub-proofs). Empty sets contribute no subgraph; those
/// slots are proved independently.
pub fn subgraphs(deps: &[HashSet<usize>]) -> Vec<HashSet<usize>> {
    let mut out: Vec<HashSet<usize>> = vec![HashSet::new(); deps.len()];
    for (i, current) in deps.iter().enumerate() {
        if current.is_empty() {
            continue;
        }
        let absorbed = deps.iter().enumerate().any(|(j, other)| {
            if i == j {
                return false;
            }
            let subset = current.is_subset(other);
            (subset && current.len() < other.len()) || (subset && current == other && j < i)
        });
        if !absorbed {
            #[cfg(feature = "tracing")]
            debug!(slot = i, size = current.len(), "dependency_subgraph");
            out[i] = current.clone();
        }
    }
    out
}

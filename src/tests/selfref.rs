use crate::expr::{ExprId, ExprStore, Ty};
use crate::selfref::convert_self_refs;
use crate::symbol::{Name, SymbolTable};
use smallvec::smallvec;

struct Fixture {
    syms: SymbolTable,
    store: ExprStore,
    f: Name,
    x_names: Vec<Name>,
    lhs: Vec<ExprId>,
}

fn fixture(slots: usize) -> Fixture {
    let syms = SymbolTable::new();
    let store = ExprStore::new();
    let f = syms.intern("f");
    let x = store.var(Ty::Int32, syms.intern("x"));
    let x_names = (0..slots).map(|i| syms.fresh(&format!("_x_{i}"))).collect();
    Fixture {
        syms,
        store,
        f,
        x_names,
        lhs: vec![x],
    }
}

fn self_call(fix: &Fixture, slot: u32) -> ExprId {
    fix.store
        .call(Ty::Int32, fix.f, fix.lhs.iter().copied().collect(), slot)
}

#[test]
fn self_reference_becomes_placeholder() {
    let fix = fixture(1);
    let g = fix.store.call(Ty::Int32, fix.syms.intern("g"), smallvec![], 0);
    let call = self_call(&fix, 0);
    let e = fix.store.add(call, g);

    let conv = convert_self_refs(&fix.store, fix.f, &fix.lhs, 0, &fix.x_names, e);
    assert!(conv.is_solvable);
    assert_eq!(conv.x_part, Some(call));
    let ph = fix.store.var(Ty::Int32, fix.x_names[0]);
    assert_eq!(conv.expr, fix.store.add(ph, g));
    assert!(conv.dependencies.is_empty());
}

#[test]
fn repeated_sightings_share_one_binding() {
    let fix = fixture(1);
    let call = self_call(&fix, 0);
    let e = fix.store.add(call, fix.store.mul(call, fix.store.int(2)));

    let conv = convert_self_refs(&fix.store, fix.f, &fix.lhs, 0, &fix.x_names, e);
    assert!(conv.is_solvable);
    let ph = fix.store.var(Ty::Int32, fix.x_names[0]);
    assert_eq!(
        conv.expr,
        fix.store.add(ph, fix.store.mul(ph, fix.store.int(2)))
    );
}

#[test]
fn cross_slot_reference_records_dependency() {
    let fix = fixture(2);
    let other = self_call(&fix, 0);
    let own = self_call(&fix, 1);
    // slot 1 update reads slot 0: select(f[0] < 3, f[1], 7)
    let cond = fix.store.lt(other, fix.store.int(3));
    let e = fix.store.select(cond, own, fix.store.int(7));

    let conv = convert_self_refs(&fix.store, fix.f, &fix.lhs, 1, &fix.x_names, e);
    assert!(conv.is_solvable);
    assert_eq!(conv.x_part, Some(own));
    assert!(conv.dependencies.contains(&0));
    assert!(!conv.dependencies.contains(&1));
}

#[test]
fn own_slot_in_condition_is_not_solvable() {
    let fix = fixture(1);
    let call = self_call(&fix, 0);
    let cond = fix.store.lt(call, fix.store.int(0));
    let e = fix.store.select(cond, fix.store.int(1), fix.store.int(2));

    let conv = convert_self_refs(&fix.store, fix.f, &fix.lhs, 0, &fix.x_names, e);
    assert!(!conv.is_solvable);
}

#[test]
fn other_slot_in_condition_is_fine() {
    let fix = fixture(2);
    let other = self_call(&fix, 0);
    let cond = fix.store.lt(other, fix.store.int(0));
    let e = fix.store.select(cond, fix.store.int(1), fix.store.int(2));

    let conv = convert_self_refs(&fix.store, fix.f, &fix.lhs, 1, &fix.x_names, e);
    assert!(conv.is_solvable);
    assert!(conv.dependencies.contains(&0));
}

#[test]
fn nested_select_restores_condition_flag() {
    let fix = fixture(1);
    let call = self_call(&fix, 0);
    let inner_cond = fix.store.lt(fix.store.int(0), fix.store.int(1));
    let inner = fix.store.select(inner_cond, fix.store.int(1), fix.store.int(2));
    // Self-reference in the *branch* of an inner select nested in an
    // outer branch: still unconditional in the disqualifying sense.
    let outer_cond = fix.store.lt(fix.store.int(2), fix.store.int(3));
    let e = fix.store.select(outer_cond, fix.store.add(call, inner), fix.store.int(0));

    let conv = convert_self_refs(&fix.store, fix.f, &fix.lhs, 0, &fix.x_names, e);
    assert!(conv.is_solvable);
    assert_eq!(conv.x_part, Some(call));
}

#[test]
fn different_args_are_not_solvable() {
    let fix = fixture(1);
    let other_coord = fix.store.var(Ty::Int32, fix.syms.intern("x_other"));
    let shifted = fix
        .store
        .call(Ty::Int32, fix.f, smallvec![other_coord], 0);
    let g = fix.store.call(Ty::Int32, fix.syms.intern("g"), smallvec![], 0);
    let e = fix.store.add(shifted, g);

    let conv = convert_self_refs(&fix.store, fix.f, &fix.lhs, 0, &fix.x_names, e);
    assert!(!conv.is_solvable);
}

#[test]
#[should_panic(expected = "arity differs")]
fn wrong_arity_self_reference_panics() {
    let fix = fixture(1);
    let y = fix.store.var(Ty::Int32, fix.syms.intern("y"));
    let bad = fix
        .store
        .call(Ty::Int32, fix.f, smallvec![fix.lhs[0], y], 0);
    convert_self_refs(&fix.store, fix.f, &fix.lhs, 0, &fix.x_names, bad);
}

#[test]
fn unrelated_calls_are_untouched() {
    let fix = fixture(1);
    let g = fix.store.call(Ty::Int32, fix.syms.intern("g"), smallvec![], 0);
    let e = fix.store.min(g, fix.store.int(4));

    let conv = convert_self_refs(&fix.store, fix.f, &fix.lhs, 0, &fix.x_names, e);
    assert!(conv.is_solvable);
    assert_eq!(conv.expr, e);
    assert_eq!(conv.x_part, None);
    assert!(conv.dependencies.is_empty());
}

use crate::expr::{ExprId, ExprStore, Ty};
use crate::prove::{prove_associativity, ProofResult};
use crate::symbol::{Name, SymbolTable};
use smallvec::smallvec;

/// Shared fixture for prover tests: a definition `f(x)` folding over a
/// data function `g(rx)`.
pub(crate) struct Defs {
    pub syms: SymbolTable,
    pub store: ExprStore,
    pub f: Name,
    pub x: ExprId,
    pub rx: ExprId,
}

pub(crate) fn defs() -> Defs {
    let syms = SymbolTable::new();
    let store = ExprStore::new();
    let f = syms.intern("f");
    let x = store.var(Ty::Int32, syms.intern("x"));
    let rx = store.var(Ty::Int32, syms.intern("rx"));
    Defs {
        syms,
        store,
        f,
        x,
        rx,
    }
}

impl Defs {
    /// `f(x)[slot]` — a self-reference.
    pub fn f_call(&self, slot: u32) -> ExprId {
        self.store.call(Ty::Int32, self.f, smallvec![self.x], slot)
    }

    /// `g(rx)[slot]` — new data for this reduction step.
    pub fn g_call(&self, slot: u32) -> ExprId {
        let g = self.syms.intern("g");
        self.store.call(Ty::Int32, g, smallvec![self.rx], slot)
    }

    pub fn int_var(&self, name: &str) -> ExprId {
        self.store.var(Ty::Int32, self.syms.intern(name))
    }

    pub fn prove(&self, exprs: &[ExprId]) -> ProofResult {
        prove_associativity(&self.store, &self.syms, self.f, &[self.x], exprs)
    }
}

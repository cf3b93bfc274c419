use lasso::{Spur, ThreadedRodeo};
use std::sync::atomic::{AtomicU64, Ordering};

/// An interned variable/function name. Cheap to copy and compare.
pub type Name = Spur;

/// Thread-safe interner for variable and function names.
///
/// Also hands out *fresh* names for the prover's canonical `x`/`y`
/// placeholders. Fresh names contain a `$`, which the surface language
/// never allows in identifiers, so they cannot collide with user names.
pub struct SymbolTable {
    rodeo: ThreadedRodeo,
    fresh_counter: AtomicU64,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self {
            rodeo: ThreadedRodeo::new(),
            fresh_counter: AtomicU64::new(0),
        }
    }

    /// Intern a name, returning its unique id. Idempotent.
    pub fn intern(&self, name: &str) -> Name {
        self.rodeo.get_or_intern(name)
    }

    /// Resolve a name id back to its string.
    /// Returns None if the id was not created by this table.
    pub fn resolve(&self, name: Name) -> Option<&str> {
        self.rodeo.try_resolve(&name)
    }

    /// Look up a name without interning it.
    pub fn get(&self, name: &str) -> Option<Name> {
        self.rodeo.get(name)
    }

    /// Generate a fresh name with the given prefix, unique within this
    /// table for the life of the process.
    pub fn fresh(&self, prefix: &str) -> Name {
        let n = self.fresh_counter.fetch_add(1, Ordering::Relaxed);
        self.rodeo.get_or_intern(format!("{prefix}${n}"))
    }
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

//! Variable environment for template execution.

use indexmap::IndexMap;
use ul4_types::Value;

/// Variables passed to (or produced by) a template run, in the order they
/// were first bound.
pub type Vars = IndexMap<String, Value>;

/// The variables visible to one template activation.
///
/// UL4 has a single flat scope per activation: loop variables and
/// assignments inside blocks stay visible after the block ends.
/// Sub-templates get a fresh environment built from their render arguments.
#[derive(Debug, Clone, Default)]
pub struct Environment {
    bindings: Vars,
}

impl Environment {
    pub fn new(vars: Vars) -> Self {
        Self { bindings: vars }
    }

    /// Look up a variable.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.bindings.get(name)
    }

    /// Create or overwrite a variable.
    pub fn set(&mut self, name: &str, value: Value) {
        self.bindings.insert(name.to_string(), value);
    }

    /// Remove a variable, keeping the order of the others. Returns `false`
    /// if it did not exist.
    pub fn remove(&mut self, name: &str) -> bool {
        self.bindings.shift_remove(name).is_some()
    }

    /// All bindings, for `vars()`.
    pub fn vars(&self) -> &Vars {
        &self.bindings
    }

    pub fn into_vars(self) -> Vars {
        self.bindings
    }
}

//! `var.<name>` references
//!
//! An argument supplied by the parent module call beats the variable's own
//! default. An argument that is itself a reference is resolved by kind:
//! - a variable reference against this module's own defaults
//! - a module reference against the parent's children
//! - any other reference generically
//!
//! A plain literal argument is used as is.

use serde_json::Value;

use super::patterns::{self, NamedRef};
use super::{Declared, RefResolver, splice};

impl RefResolver<'_> {
    pub(super) fn resolve_var_ref(&self, text: &str, reference: &NamedRef, depth: usize) -> Option<Value> {
        let node = self.current();
        let argument = node
            .parent_call
            .as_ref()
            .and_then(|call| call.args.get(&reference.name));

        let value = self.expand_declared(Declared::Variable, &reference.name, || match argument {
            Some(argument) => {
                tracing::debug!(reference = text, module = %node.name, "variable set by parent module call");
                Some(self.resolve_argument(argument, depth))
            }
            None => self.own_default(&reference.name, depth),
        })?;
        Some(splice(text, reference.range.clone(), value))
    }

    fn own_default(&self, name: &str, depth: usize) -> Option<Value> {
        let default = self
            .current()
            .module
            .variables
            .get(name)?
            .default
            .clone()
            .filter(|v| !v.is_null())?;
        Some(self.scoped(default, depth))
    }

    fn resolve_argument(&self, argument: &Value, depth: usize) -> Value {
        let Value::String(text) = argument else {
            return self.scoped(argument.clone(), depth);
        };
        let masked = patterns::mask_lookups(text);

        if let Some(reference) = patterns::var_ref(&masked) {
            return match self.own_default(&reference.name, depth) {
                Some(value) => splice(text, reference.range, value),
                None => argument.clone(),
            };
        }

        if let Some(reference) = patterns::module_ref(&masked) {
            let parent = self.current().parent;
            return parent
                .and_then(|parent| self.resolve_module_ref(text, &reference, parent))
                .unwrap_or_else(|| argument.clone());
        }

        if patterns::is_reference(text) {
            return self.resolve_at(text, depth + 1);
        }
        argument.clone()
    }
}

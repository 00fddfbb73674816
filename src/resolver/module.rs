//! `module.<name>.<attr>` references
//!
//! The referenced module is looked up among the children of a scope node; the
//! attribute names one of its variables, whose default is substituted.

use serde_json::Value;

use super::patterns::ModuleRef;
use super::{RefResolver, splice};
use crate::loader::tree::NodeId;

impl RefResolver<'_> {
    pub(super) fn resolve_module_ref(&self, text: &str, reference: &ModuleRef, scope: NodeId) -> Option<Value> {
        if reference.module.is_empty() || reference.attr.is_empty() {
            return None;
        }
        let Some(child) = self.tree.child(scope, &reference.module) else {
            tracing::debug!(reference = text, module = %reference.module, "module not present in children");
            return None;
        };
        let default = self
            .tree
            .node(child)
            .module
            .variables
            .get(&reference.attr)?
            .default
            .clone()
            .filter(|v| !v.is_null())?;
        tracing::debug!(reference = text, "resolved module reference");
        Some(splice(text, reference.range.clone(), default))
    }
}

//! `local.<name>` references

use serde_json::Value;

use super::patterns::NamedRef;
use super::{Declared, RefResolver, splice};

impl RefResolver<'_> {
    /// Substitute the declared local value; chained references are resolved by the caller
    pub(super) fn resolve_local_ref(&self, text: &str, reference: &NamedRef, depth: usize) -> Option<Value> {
        let Some(local) = self.current().module.locals.get(&reference.name) else {
            tracing::debug!(reference = text, "local value not declared");
            return None;
        };
        let value = self.expand_declared(Declared::Local, &reference.name, || {
            Some(self.scoped(local.value.clone(), depth))
        })?;
        tracing::debug!(reference = text, "resolved local value");
        Some(splice(text, reference.range.clone(), value))
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::super::tests::module;
    use crate::loader::tree::ConfigTree;
    use crate::resolver::RefResolver;
    use serde_json::json;
    use std::path::Path;

    #[test]
    fn test_chained_locals() {
        let tree = ConfigTree::new(module(
            "/scan",
            r#"
variable "name" {
  default = "app"
}
locals {
  base   = "${var.name}"
  prefix = "${local.base}-prod"
  ports  = [80, 443]
}
"#,
        ));
        let resolver = RefResolver::new(&tree, tree.root(), Path::new("/scan"));
        assert_eq!(resolver.resolve_one("${local.prefix}"), json!("app-prod"));
        assert_eq!(resolver.resolve_one("${local.ports}"), json!([80, 443]));
        assert_eq!(resolver.resolve_one("${local.nope}"), json!("${local.nope}"));
    }
}

//! Reference resolution inside resource configurations
//!
//! This module handles:
//! - Walking a config value tree and resolving every string leaf
//! - Dispatching a string to the first reference syntax it contains, in the
//!   fixed order module > local > lookup > variable
//! - Splicing the resolved value back into the surrounding template
//! - Re-resolving the result, since a resolved value may itself be a reference
//!
//! Resolution is fail-soft: a reference that cannot be resolved is left as its
//! literal text and never produces an error.
//!
//! A declaration met again while it is still being expanded stays literal, so
//! mutually referencing locals terminate. Each top-level call also has a fixed
//! budget of resolution steps.
//!
//! ## Module Organization
//!
//! - `patterns.rs`: the reference syntaxes and their matchers
//! - `variable.rs`: `var.<name>`, parent-call arguments first, then defaults
//! - `local.rs`: `local.<name>`
//! - `module.rs`: `module.<name>.<attr>`
//! - `lookup.rs`: `lookup(<table>, <key>)`

mod local;
mod lookup;
mod module;
pub mod patterns;
mod variable;

use std::borrow::Cow;
use std::cell::{Cell, RefCell};
use std::ops::Range;
use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::loader::tree::{ConfigNode, ConfigTree, NodeId};

/// Re-entrant resolutions deeper than this return the value unchanged
pub const MAX_RESOLVE_DEPTH: usize = 16;

/// Resolution steps allowed for one `resolve_all` or `resolve_one` call
pub const MAX_RESOLVE_STEPS: usize = 10_000;

/// Kind of declaration being expanded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Declared {
    Local,
    Variable,
}

/// Resolves references in the scope of one node of the config tree
#[derive(Debug)]
pub struct RefResolver<'a> {
    tree: &'a ConfigTree,
    node: NodeId,
    root_dir: &'a Path,
    cwd: PathBuf,
    expanding: RefCell<Vec<(NodeId, Declared, String)>>,
    steps: Cell<usize>,
}

impl<'a> RefResolver<'a> {
    pub fn new(tree: &'a ConfigTree, node: NodeId, root_dir: &'a Path) -> Self {
        Self {
            tree,
            node,
            root_dir,
            cwd: std::env::current_dir().unwrap_or_else(|_| root_dir.to_path_buf()),
            expanding: RefCell::new(Vec::new()),
            steps: Cell::new(0),
        }
    }

    fn current(&self) -> &'a ConfigNode {
        self.tree.node(self.node)
    }

    /// Resolve every string leaf of `value` in place
    pub fn resolve_all(&self, value: &mut Value) {
        self.steps.set(0);
        self.resolve_tree_at(value, 0);
    }

    fn resolve_tree_at(&self, value: &mut Value, depth: usize) {
        match value {
            Value::String(text) => {
                let resolved = self.resolve_at(text, depth);
                *value = resolved;
            }
            Value::Array(items) => items
                .iter_mut()
                .for_each(|item| self.resolve_tree_at(item, depth)),
            Value::Object(fields) => fields
                .values_mut()
                .for_each(|field| self.resolve_tree_at(field, depth)),
            _ => {}
        }
    }

    /// A declared value taken into this scope; lists and maps are resolved element-wise
    fn scoped(&self, mut value: Value, depth: usize) -> Value {
        if value.is_array() || value.is_object() {
            self.resolve_tree_at(&mut value, depth + 1);
        }
        value
    }

    /// Resolve one string, returning the input unchanged when it holds no resolvable reference
    pub fn resolve_one(&self, text: &str) -> Value {
        self.steps.set(0);
        self.resolve_at(text, 0)
    }

    /// Expand the declaration `name` of this node, `None` while it is already being expanded
    fn expand_declared(
        &self,
        kind: Declared,
        name: &str,
        expand: impl FnOnce() -> Option<Value>,
    ) -> Option<Value> {
        let key = (self.node, kind, name.to_string());
        if self.expanding.borrow().contains(&key) {
            tracing::debug!(name, kind = ?kind, "reference cycle, leaving as is");
            return None;
        }
        self.expanding.borrow_mut().push(key);
        let value = expand();
        self.expanding.borrow_mut().pop();
        value
    }

    fn resolve_at(&self, text: &str, depth: usize) -> Value {
        if depth > MAX_RESOLVE_DEPTH {
            tracing::debug!(reference = text, "reference nesting too deep, leaving as is");
            return Value::String(text.to_string());
        }
        let steps = self.steps.get() + 1;
        self.steps.set(steps);
        if steps > MAX_RESOLVE_STEPS {
            tracing::debug!(reference = text, "resolution step budget spent, leaving as is");
            return Value::String(text.to_string());
        }

        let text = self.expand_paths(text);
        let masked = patterns::mask_lookups(&text);

        let resolved = if let Some(reference) = patterns::module_ref(&masked) {
            self.resolve_module_ref(&text, &reference, self.node)
        } else if let Some(reference) = patterns::local_ref(&masked) {
            self.resolve_local_ref(&text, &reference, depth)
        } else if let Some(reference) = patterns::lookup_ref(&text) {
            self.resolve_lookup_ref(&text, &reference, depth)
        } else if let Some(reference) = patterns::var_ref(&masked) {
            self.resolve_var_ref(&text, &reference, depth)
        } else {
            None
        };

        match resolved {
            None => Value::String(text.into_owned()),
            Some(Value::String(out)) if out == text => Value::String(out),
            Some(Value::String(out)) => self.resolve_at(&out, depth + 1),
            Some(native) => native,
        }
    }

    fn expand_paths<'t>(&self, text: &'t str) -> Cow<'t, str> {
        if !text.contains("${path.") {
            return Cow::Borrowed(text);
        }
        let module_dir = self.current().module.dir.display().to_string();
        Cow::Owned(
            text.replace("${path.module}", &module_dir)
                .replace("${path.root}", &self.root_dir.display().to_string())
                .replace("${path.cwd}", &self.cwd.display().to_string()),
        )
    }
}

/// Put `value` in place of `range` inside `text`.
///
/// A reference spanning the whole string yields the native value. Inside a
/// larger template, strings and scalars are interpolated while lists and maps
/// replace the template.
fn splice(text: &str, range: Range<usize>, value: Value) -> Value {
    if range.start == 0 && range.end == text.len() {
        return value;
    }
    let inner = match value {
        Value::String(s) => s,
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => return other,
    };
    let mut out = String::with_capacity(text.len() + inner.len());
    out.push_str(&text[..range.start]);
    out.push_str(&inner);
    out.push_str(&text[range.end..]);
    Value::String(out)
}

//! `lookup(<table>, <key>[, <default>])` references

use serde_json::Value;

use super::patterns::{LookupRef, is_reference};
use super::{RefResolver, splice};

impl RefResolver<'_> {
    pub(super) fn resolve_lookup_ref(&self, text: &str, reference: &LookupRef, depth: usize) -> Option<Value> {
        let Some(key) = self.lookup_key(&reference.key, depth) else {
            tracing::debug!(reference = text, key = %reference.key, "lookup key is unresolved");
            return None;
        };

        let Value::Object(table) = self.resolve_at(&reference.table, depth + 1) else {
            tracing::debug!(reference = text, table = %reference.table, "lookup table is not a map");
            return None;
        };

        let value = match (table.get(&key), &reference.default) {
            (Some(value), _) => value.clone(),
            (None, Some(default)) => self.lookup_argument(default, depth)?,
            (None, None) => {
                tracing::debug!(reference = text, key = %key, "key not present in lookup table");
                return None;
            }
        };
        Some(splice(text, reference.range.clone(), value))
    }

    fn lookup_key(&self, key: &str, depth: usize) -> Option<String> {
        match self.lookup_argument(key, depth)? {
            Value::String(s) if is_reference(&s) => None,
            Value::String(s) => Some(s),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    // Quoted literals stand for themselves, anything else is resolved
    fn lookup_argument(&self, arg: &str, depth: usize) -> Option<Value> {
        if let Some(literal) = arg.strip_prefix('"').and_then(|a| a.strip_suffix('"')) {
            return Some(Value::String(literal.to_string()));
        }
        Some(self.resolve_at(arg, depth + 1))
    }
}

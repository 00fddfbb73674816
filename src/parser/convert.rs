//! Conversion of parsed HCL into generic value trees
//!
//! Every attribute body converts into two trees of identical shape: the
//! configuration itself and a tree holding the starting line of each value.

use hcl_edit::Span;
use hcl_edit::expr::{Expression, ObjectKey};
use hcl_edit::structure::{Block, Body, Structure};
use serde_json::{Map, Value};

/// Source text of one file, used to recover spans and line numbers
#[derive(Debug, Clone, Copy)]
pub struct SourceText<'a> {
    text: &'a str,
}

impl<'a> SourceText<'a> {
    pub fn new(text: &'a str) -> Self {
        Self { text }
    }

    /// 1-based line of a byte offset
    pub fn line_at(&self, offset: usize) -> usize {
        let end = offset.min(self.text.len());
        self.text.as_bytes()[..end]
            .iter()
            .filter(|b| **b == b'\n')
            .count()
            + 1
    }

    pub fn line_of(&self, node: &impl Span) -> usize {
        node.span().map_or(0, |range| self.line_at(range.start))
    }

    /// Text of `node` exactly as written
    pub fn slice(&self, node: &impl Span) -> Option<&'a str> {
        node.span().and_then(|range| self.text.get(range))
    }
}

/// Convert a body into `(config, lines)`
pub fn body_to_values(body: &Body, src: SourceText<'_>) -> (Value, Value) {
    let mut config = Map::new();
    let mut lines = Map::new();

    for structure in body.iter() {
        match structure {
            Structure::Attribute(attr) => {
                let key = attr.key.value().as_str().to_string();
                config.insert(key.clone(), expr_to_value(&attr.value, src));
                lines.insert(key, expr_lines(&attr.value, src, src.line_of(attr)));
            }
            Structure::Block(block) => {
                let key = block.ident.value().as_str().to_string();
                let (block_config, block_lines) = labelled_block(block, src);
                push_block(&mut config, &key, block_config);
                push_block(&mut lines, &key, block_lines);
            }
        }
    }

    (Value::Object(config), Value::Object(lines))
}

// Labels nest as object keys: `dynamic "tag" { .. }` becomes `{"tag": {..}}`
fn labelled_block(block: &Block, src: SourceText<'_>) -> (Value, Value) {
    let (mut config, mut lines) = body_to_values(&block.body, src);
    for label in block.labels.iter().rev() {
        let label = label.as_str().to_string();
        config = Value::Object(Map::from_iter([(label.clone(), config)]));
        lines = Value::Object(Map::from_iter([(label, lines)]));
    }
    (config, lines)
}

fn push_block(map: &mut Map<String, Value>, key: &str, value: Value) {
    match map.get_mut(key) {
        Some(Value::Array(items)) => items.push(value),
        _ => {
            map.insert(key.to_string(), Value::Array(vec![value]));
        }
    }
}

/// Convert one expression into a native value.
///
/// Literals become native values, quoted templates keep their template text,
/// anything else is rendered as `${<expression>}`.
pub fn expr_to_value(expr: &Expression, src: SourceText<'_>) -> Value {
    match expr {
        Expression::Null(_) => Value::Null,
        Expression::Bool(b) => Value::Bool(*b.value()),
        Expression::Number(n) => {
            let text = n.value().to_string();
            serde_json::from_str::<serde_json::Number>(&text)
                .map(Value::Number)
                .unwrap_or(Value::String(text))
        }
        Expression::String(s) => Value::String(s.value().clone()),
        Expression::Array(array) => {
            Value::Array(array.iter().map(|e| expr_to_value(e, src)).collect())
        }
        Expression::Object(object) => Value::Object(
            object
                .iter()
                .map(|(key, value)| (object_key(key, src), expr_to_value(value.expr(), src)))
                .collect(),
        ),
        Expression::StringTemplate(_) => Value::String(template_text(expr, src)),
        Expression::HeredocTemplate(heredoc) => Value::String(heredoc.template.to_string()),
        other => Value::String(format!("${{{}}}", expression_text(other, src))),
    }
}

fn expr_lines(expr: &Expression, src: SourceText<'_>, line: usize) -> Value {
    match expr {
        Expression::Array(array) => Value::Array(
            array
                .iter()
                .map(|e| expr_lines(e, src, src.line_of(e)))
                .collect(),
        ),
        Expression::Object(object) => Value::Object(
            object
                .iter()
                .map(|(key, value)| {
                    let line = src.line_of(value.expr());
                    (object_key(key, src), expr_lines(value.expr(), src, line))
                })
                .collect(),
        ),
        _ => Value::from(line),
    }
}

fn object_key(key: &ObjectKey, src: SourceText<'_>) -> String {
    match key {
        ObjectKey::Ident(ident) => ident.value().as_str().to_string(),
        ObjectKey::Expression(Expression::String(s)) => s.value().clone(),
        ObjectKey::Expression(expr) => expression_text(expr, src),
    }
}

fn template_text(expr: &Expression, src: SourceText<'_>) -> String {
    let raw = expression_text(expr, src);
    raw.strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(&raw)
        .to_string()
}

/// The expression as written in the source file
pub fn expression_text(expr: &Expression, src: SourceText<'_>) -> String {
    match src.slice(expr) {
        Some(text) => text.trim().to_string(),
        None => expr.to_string().trim().to_string(),
    }
}

/// String value of an expression that must be a literal string, like a module source
pub fn literal_string(expr: &Expression, src: SourceText<'_>) -> Option<String> {
    match expr_to_value(expr, src) {
        Value::String(s) => Some(s),
        _ => None,
    }
}

//! Reference syntaxes recognized inside attribute strings
//!
//! Each syntax may be wrapped in `${...}`. Matching returns the byte range of
//! the first occurrence so the resolved value can be spliced back in place.

use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;

#[allow(clippy::expect_used)]
static VAR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\$\{)?\bvar\.(?P<name>\w*)(\})?").expect("variable reference regex is valid")
});

#[allow(clippy::expect_used)]
static LOCAL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\$\{)?\blocal\.(?P<name>\w*)(\})?").expect("local reference regex is valid")
});

#[allow(clippy::expect_used)]
static MODULE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\$\{)?\bmodule\.(?P<module>\w*)\.(?P<attr>\w*)(\})?")
        .expect("module reference regex is valid")
});

#[allow(clippy::expect_used)]
static LOOKUP_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(\$\{)?\blookup\((?P<table>[^,\s]+),\s*(?P<key>"(?:[^"\\]|\\.)*"|[^,)\s]+)(,\s*(?P<default>(?:"(?:[^"\\]|\\.)*"|[^)"])*?))?\s*\)(\})?"#,
    )
    .expect("lookup reference regex is valid")
});

#[allow(clippy::expect_used)]
static LOOKUP_START_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\blookup\(").expect("lookup start regex is valid"));

#[allow(clippy::expect_used)]
static INTERPOLATION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{.*\}").expect("interpolation regex is valid"));

/// `var.<name>` or `local.<name>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedRef {
    pub range: Range<usize>,
    pub name: String,
}

/// `module.<module>.<attr>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleRef {
    pub range: Range<usize>,
    pub module: String,
    pub attr: String,
}

/// `lookup(<table>, <key>[, <default>])`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupRef {
    pub range: Range<usize>,
    pub table: String,
    pub key: String,
    pub default: Option<String>,
}

fn named(re: &Regex, text: &str) -> Option<NamedRef> {
    let caps = re.captures(text)?;
    Some(NamedRef {
        range: caps.get(0)?.range(),
        name: caps.name("name")?.as_str().to_string(),
    })
}

pub fn var_ref(text: &str) -> Option<NamedRef> {
    named(&VAR_RE, text)
}

pub fn local_ref(text: &str) -> Option<NamedRef> {
    named(&LOCAL_RE, text)
}

pub fn module_ref(text: &str) -> Option<ModuleRef> {
    let caps = MODULE_RE.captures(text)?;
    Some(ModuleRef {
        range: caps.get(0)?.range(),
        module: caps.name("module")?.as_str().to_string(),
        attr: caps.name("attr")?.as_str().to_string(),
    })
}

pub fn lookup_ref(text: &str) -> Option<LookupRef> {
    let caps = LOOKUP_RE.captures(text)?;
    Some(LookupRef {
        range: caps.get(0)?.range(),
        table: caps.name("table")?.as_str().to_string(),
        key: caps.name("key")?.as_str().to_string(),
        default: caps
            .name("default")
            .map(|m| m.as_str().trim().to_string())
            .filter(|d| !d.is_empty()),
    })
}

/// Whether `text` still contains any reference or interpolation
pub fn is_reference(text: &str) -> bool {
    INTERPOLATION_RE.is_match(text)
        || VAR_RE.is_match(text)
        || LOCAL_RE.is_match(text)
        || MODULE_RE.is_match(text)
        || LOOKUP_RE.is_match(text)
}

/// `text` with every `lookup(...)` call blanked out, byte offsets unchanged.
///
/// References that are arguments of a lookup belong to the lookup, so the
/// other matchers run against this masked copy. A call is blanked up to its
/// balancing `)`, or to the end of `text` when it is never closed, whether or
/// not the lookup syntax itself parses.
pub fn mask_lookups(text: &str) -> String {
    let mut masked = String::with_capacity(text.len());
    let mut last = 0;
    for start in LOOKUP_START_RE.find_iter(text) {
        if start.start() < last {
            continue;
        }
        let end = call_end(text, start.end());
        masked.push_str(&text[last..start.start()]);
        masked.extend(std::iter::repeat_n(' ', end - start.start()));
        last = end;
    }
    masked.push_str(&text[last..]);
    masked
}

/// Byte offset just past the `)` closing a call whose arguments start at `from`
fn call_end(text: &str, from: usize) -> usize {
    let mut depth = 1_usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, c) in text[from..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return from + offset + 1;
                }
            }
            _ => {}
        }
    }
    text.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_var_ref_range() {
        let r = var_ref("${var.env}-app").expect("matches");
        assert_eq!(r.name, "env");
        assert_eq!(r.range, 0..10);
        assert!(var_ref("myvar.env").is_none());
    }

    #[test]
    fn test_module_ref() {
        let r = module_ref("${module.network.cidr}").expect("matches");
        assert_eq!((r.module.as_str(), r.attr.as_str()), ("network", "cidr"));
    }

    #[test]
    fn test_lookup_ref() {
        let r = lookup_ref(r#"${lookup(local.m, "k")}"#).expect("matches");
        assert_eq!(r.table, "local.m");
        assert_eq!(r.key, "\"k\"");
        assert_eq!(r.default, None);

        let r = lookup_ref(r#"${lookup(var.sizes, var.env, "small")}"#).expect("matches");
        assert_eq!(r.key, "var.env");
        assert_eq!(r.default.as_deref(), Some("\"small\""));
    }

    #[test]
    fn test_mask_preserves_offsets() {
        let text = r#"${var.a}-${lookup(local.m, "k")}"#;
        let masked = mask_lookups(text);
        assert_eq!(masked.len(), text.len());
        assert!(local_ref(&masked).is_none());
        assert_eq!(var_ref(&masked).map(|r| r.range), Some(0..8));
    }

    #[test]
    fn test_lookup_ref_quoted_key_with_space() {
        let r = lookup_ref(r#"lookup(local.m, "my key")"#).expect("matches");
        assert_eq!(r.key, "\"my key\"");

        let r = lookup_ref(r#"${lookup(local.m, "a, b", "x (y)")}"#).expect("matches");
        assert_eq!(r.key, "\"a, b\"");
        assert_eq!(r.default.as_deref(), Some("\"x (y)\""));
    }

    #[test]
    fn test_mask_covers_unparsed_lookup() {
        for text in [
            "${lookup(local.m, local.n, format(\"%s\", var.x))}",
            "lookup(local.m",
            "${lookup(local.m, \")\" , var.k)}",
        ] {
            let masked = mask_lookups(text);
            assert_eq!(masked.len(), text.len());
            assert!(local_ref(&masked).is_none(), "{text}");
            assert!(var_ref(&masked).is_none(), "{text}");
        }

        let masked = mask_lookups("${lookup(local.m, \"k\")}-${var.env}");
        assert!(var_ref(&masked).is_some());
    }

    #[test]
    fn test_is_reference() {
        assert!(is_reference("${anything}"));
        assert!(is_reference("var.x"));
        assert!(!is_reference("plain"));
    }
}

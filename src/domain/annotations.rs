//! Inline `#ts:` annotations inside resource blocks

use std::sync::LazyLock;

use regex::Regex;

use super::resource::SkipRule;

const SKIP_PREFIX: &str = "#ts:skip=";

#[allow(clippy::expect_used)]
static SKIP_RULE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(#ts:skip=[ \t]*(([A-Za-z0-9]+[.-]){3,5}(\d+))([ \t]+.*)?)")
        .expect("skip rule regex is valid")
});

#[allow(clippy::expect_used)]
static MAX_SEVERITY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)#ts:maxseverity=(none|high|medium|low)\b").expect("max severity regex is valid")
});

#[allow(clippy::expect_used)]
static MIN_SEVERITY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)#ts:minseverity=(high|medium|low)\b").expect("min severity regex is valid")
});

/// Every `#ts:skip=<rule> [comment]` annotation in `text`, one per line
pub fn skip_rules(text: &str) -> Vec<SkipRule> {
    SKIP_RULE_RE
        .find_iter(text)
        .filter_map(|m| {
            let rest = m.as_str().trim_start_matches(SKIP_PREFIX);
            let mut fields = rest.split_whitespace();
            let rule = fields.next()?.to_string();
            let comment = fields.collect::<Vec<_>>().join(" ");
            Some(SkipRule { rule, comment })
        })
        .collect()
}

/// `(min, max)` severity bounds; the first annotation of each kind wins
pub fn severity_bounds(text: &str) -> (String, String) {
    let first = |re: &Regex| {
        re.captures(text)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
            .unwrap_or_default()
    };
    (first(&MIN_SEVERITY_RE), first(&MAX_SEVERITY_RE))
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;

    const BLOCK: &str = r#"resource "aws_s3_bucket" "b" {
  #ts:skip=AWS.S3Bucket.DS.High.1043 bucket is public on purpose
  #ts:skip=AC_AWS_0214
  #ts:skip=accurics.gcp.IAM.145
  #ts:minseverity=High
  #ts:maxseverity=low
  #ts:minseverity=Low
  bucket = "b"
}"#;

    #[test]
    fn test_skip_rules() {
        let rules = skip_rules(BLOCK);
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].rule, "AWS.S3Bucket.DS.High.1043");
        assert_eq!(rules[0].comment, "bucket is public on purpose");
        assert_eq!(rules[1].rule, "accurics.gcp.IAM.145");
        assert_eq!(rules[1].comment, "");
    }

    #[test]
    fn test_severity_first_wins() {
        assert_eq!(
            severity_bounds(BLOCK),
            ("High".to_string(), "low".to_string())
        );
        assert_eq!(severity_bounds("bucket = 1"), (String::new(), String::new()));
    }
}

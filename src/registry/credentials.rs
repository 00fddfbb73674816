//! Registry credentials
//!
//! Tokens come from two places, environment first:
//! - `TF_TOKEN_<host>` variables (dots as `_`, dashes as `__`)
//! - `credentials "<host>" { token = "..." }` blocks in the CLI config file

use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::Path;

use hcl_edit::expr::Expression;
use hcl_edit::structure::{Body, Structure};

/// Bearer tokens keyed by lowercase host
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    tokens: HashMap<String, String>,
}

impl Credentials {
    /// Load tokens from a CLI config file; a missing or unparseable file yields no tokens
    pub fn load(cli_config: Option<&Path>) -> Self {
        let Some(path) = cli_config else {
            return Self::default();
        };
        let Ok(contents) = fs::read_to_string(path) else {
            tracing::debug!(path = %path.display(), "no CLI config file");
            return Self::default();
        };
        match Self::parse(&contents) {
            Ok(credentials) => credentials,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "ignoring unparseable CLI config");
                Self::default()
            }
        }
    }

    pub fn parse(contents: &str) -> Result<Self, hcl_edit::parser::Error> {
        let body: Body = hcl_edit::parser::parse_body(contents)?;
        let mut tokens = HashMap::new();
        for structure in body.iter() {
            let Structure::Block(block) = structure else {
                continue;
            };
            if block.ident.value().as_str() != "credentials" {
                continue;
            }
            let Some(host) = block.labels.first() else {
                continue;
            };
            for inner in block.body.iter() {
                if let Structure::Attribute(attr) = inner {
                    if attr.key.value().as_str() == "token" {
                        if let Expression::String(token) = &attr.value {
                            tokens.insert(host.as_str().to_ascii_lowercase(), token.value().clone());
                        }
                    }
                }
            }
        }
        Ok(Self { tokens })
    }

    pub fn with_token(mut self, host: &str, token: impl Into<String>) -> Self {
        self.tokens.insert(host.to_ascii_lowercase(), token.into());
        self
    }

    /// Token for `host`, preferring the `TF_TOKEN_` environment variable
    pub fn token_for(&self, host: &str) -> Option<String> {
        let host = host.to_ascii_lowercase();
        if let Ok(token) = env::var(env_var_name(&host)) {
            if !token.is_empty() {
                return Some(token);
            }
        }
        self.tokens.get(&host).cloned()
    }
}

fn env_var_name(host: &str) -> String {
    let host = host.split(':').next().unwrap_or(host);
    format!("TF_TOKEN_{}", host.replace('-', "__").replace('.', "_"))
}

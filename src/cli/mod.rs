//! CLI definitions using clap derive API

use clap::Parser;
use clap::builder::{Styles, styling::AnsiColor};
use std::path::PathBuf;

/// tfingest - Terraform module tree ingestion
///
/// Load a Terraform configuration directory and every module it calls, and
/// print the resolved resources grouped by type as JSON.
#[derive(Parser, Debug)]
#[command(
    name = "tfingest",
    author,
    version,
    color = clap::ColorChoice::Auto,
    styles = Styles::styled()
        .header(AnsiColor::Green.on_default().bold())
        .usage(AnsiColor::Green.on_default().bold())
        .literal(AnsiColor::Cyan.on_default().bold())
        .placeholder(AnsiColor::Cyan.on_default()),
    about = "Load Terraform module trees into normalized resource records",
    long_about = "tfingest fetches every module a Terraform configuration calls (local paths, \
                  registry modules, git/http/s3/gcs sources), resolves variable, local, module \
                  and lookup references across the module tree, and prints one record per resource.",
    after_help = "\x1b[1m\x1b[32mExamples:\x1b[0m\n   \
                  tfingest ./infra                        \x1b[90m# Scan ./infra and every subdirectory\x1b[0m\n   \
                  tfingest ./infra --non-recursive        \x1b[90m# Scan only ./infra\x1b[0m\n   \
                  tfingest . --use-terraform-cache        \x1b[90m# Reuse modules installed by terraform init\x1b[0m\n   \
                  TFINGEST_LOG=debug tfingest . --pretty  \x1b[90m# Trace resolution on stderr\x1b[0m\n\n\
                  "
)]
pub struct Cli {
    /// Configuration directory to scan
    #[arg(value_name = "DIR")]
    pub dir: PathBuf,

    /// Scan only DIR instead of every descendant directory
    #[arg(long, short = 'n')]
    pub non_recursive: bool,

    /// Satisfy module calls from .terraform/modules/modules.json when possible
    #[arg(long)]
    pub use_terraform_cache: bool,

    /// Pretty-print the JSON output
    #[arg(long, short = 'p')]
    pub pretty: bool,

    /// Log debug events to stderr (overrides TFINGEST_LOG)
    #[arg(long, short = 'v')]
    pub verbose: bool,
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing_defaults() {
        let cli = Cli::try_parse_from(["tfingest", "./infra"]).expect("parses");
        assert_eq!(cli.dir, PathBuf::from("./infra"));
        assert!(!cli.non_recursive);
        assert!(!cli.use_terraform_cache);
        assert!(!cli.pretty);
    }

    #[test]
    fn test_cli_parsing_flags() {
        let cli = Cli::try_parse_from([
            "tfingest",
            "-n",
            "--use-terraform-cache",
            "--pretty",
            "/tmp/scan",
        ])
        .expect("parses");
        assert!(cli.non_recursive);
        assert!(cli.use_terraform_cache);
        assert!(cli.pretty);
    }

    #[test]
    fn test_cli_requires_dir() {
        assert!(Cli::try_parse_from(["tfingest"]).is_err());
    }
}

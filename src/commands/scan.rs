//! Scan command implementation

use std::io::{self, Write};

use serde::Serialize;

use tfingest::{DirError, DirectoryLoader, LoadOptions, LoadOutput, ResourcesByType, Result, Settings};

use crate::cli::Cli;

/// JSON document printed on stdout
#[derive(Debug, Serialize)]
struct ScanReport<'a> {
    resources: &'a ResourcesByType,
    errors: &'a [DirError],
    #[serde(skip_serializing_if = "no_records")]
    warnings: &'a [DirError],
}

impl<'a> From<&'a LoadOutput> for ScanReport<'a> {
    fn from(output: &'a LoadOutput) -> Self {
        Self {
            resources: &output.resources,
            errors: output.errors.as_ref().map(|e| e.records()).unwrap_or_default(),
            warnings: &output.warnings,
        }
    }
}

fn no_records(records: &&[DirError]) -> bool {
    records.is_empty()
}

/// Run the scan and print the report
pub fn run(cli: &Cli) -> Result<()> {
    let options = LoadOptions::new()
        .non_recursive(cli.non_recursive)
        .use_terraform_cache(cli.use_terraform_cache);

    let loader = DirectoryLoader::new(Settings::from_env())?;
    let output = loader.load(&cli.dir, &options)?;
    tracing::info!(
        resources = output.resource_count(),
        errors = output.errors.as_ref().map_or(0, |e| e.len()),
        "loaded configuration"
    );

    let report = ScanReport::from(&output);
    let json = if cli.pretty {
        serde_json::to_string_pretty(&report)?
    } else {
        serde_json::to_string(&report)?
    };

    let mut stdout = io::stdout().lock();
    writeln!(stdout, "{json}")?;
    Ok(())
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;
    use std::path::Path;
    use tfingest::error::DiagnosticSink;

    #[test]
    fn test_report_lists_error_records() {
        let sink = DiagnosticSink::new();
        sink.push(Path::new("/scan/bad"), "failed to load terraform config");
        let output = LoadOutput {
            errors: sink.take_error(),
            ..LoadOutput::default()
        };
        let json = serde_json::to_value(ScanReport::from(&output)).expect("serializes");
        assert_eq!(json["resources"], serde_json::json!({}));
        assert_eq!(json["errors"][0]["directory"], "/scan/bad");
        assert!(json.get("warnings").is_none());
    }
}

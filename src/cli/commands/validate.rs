//! `skirmish validate`
//!
//! Loads scenario files and reports errors and warnings without running
//! anything.

use std::path::Path;

use serde::Serialize;

use crate::cli::args::{OutputFormat, ValidateArgs};
use crate::config::{LoadWarning, ScenarioLoader};
use crate::error::{ConfigError, Severity, SkirmishError, ValidationIssue};

/// Validation outcome of one file.
#[derive(Debug, Serialize)]
struct FileReport {
    file: String,
    valid: bool,
    errors: Vec<String>,
    warnings: Vec<String>,
}

/// Validate every file and print a report.
///
/// # Errors
///
/// Returns the first file's error when any file fails. With `--strict`,
/// warnings count as errors.
pub fn run(args: &ValidateArgs) -> Result<(), SkirmishError> {
    let loader = ScenarioLoader::with_defaults();
    let mut reports = Vec::with_capacity(args.files.len());
    let mut first_error: Option<ConfigError> = None;

    for path in &args.files {
        tracing::info!(file = %path.display(), "validating scenario");
        let (report, error) = match loader.load(path) {
            Ok(loaded) => check_warnings(path, &loaded.warnings, args.strict),
            Err(err) => {
                let report = FileReport {
                    file: path.display().to_string(),
                    valid: false,
                    errors: describe(&err),
                    warnings: Vec::new(),
                };
                (report, Some(err))
            }
        };
        if first_error.is_none() {
            first_error = error;
        }
        reports.push(report);
    }

    match args.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&reports)?),
        OutputFormat::Human => {
            for report in &reports {
                let status = if report.valid { "ok" } else { "FAILED" };
                println!("{}: {status}", report.file);
                for error in &report.errors {
                    println!("  error: {error}");
                }
                for warning in &report.warnings {
                    println!("  warning: {warning}");
                }
            }
        }
    }

    first_error.map_or(Ok(()), |err| Err(err.into()))
}

fn check_warnings(
    path: &Path,
    warnings: &[LoadWarning],
    strict: bool,
) -> (FileReport, Option<ConfigError>) {
    let rendered: Vec<String> = warnings
        .iter()
        .map(|w| match &w.location {
            Some(location) => format!("{} at {location}", w.message),
            None => w.message.clone(),
        })
        .collect();

    let error = (strict && !warnings.is_empty()).then(|| ConfigError::ValidationError {
        path: path.display().to_string(),
        errors: warnings
            .iter()
            .map(|w| ValidationIssue {
                path: w.location.clone().unwrap_or_default(),
                message: w.message.clone(),
                severity: Severity::Warning,
            })
            .collect(),
    });

    let report = FileReport {
        file: path.display().to_string(),
        valid: error.is_none(),
        errors: Vec::new(),
        warnings: rendered,
    };
    (report, error)
}

fn describe(err: &ConfigError) -> Vec<String> {
    match err {
        ConfigError::ValidationError { errors, .. } => {
            errors.iter().map(ToString::to_string).collect()
        }
        ConfigError::ParseError {
            line: Some(line),
            message,
            ..
        } => vec![format!("line {line}: {message}")],
        other => vec![other.to_string()],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strict_mode_fails_on_warnings() {
        let warnings = vec![LoadWarning {
            message: "toll garrison demands nothing".into(),
            location: Some("garrisons[0].toll_amount".into()),
        }];
        let (report, error) = check_warnings(Path::new("t.yaml"), &warnings, true);
        assert!(!report.valid);
        assert!(matches!(error, Some(ConfigError::ValidationError { .. })));

        let (report, error) = check_warnings(Path::new("t.yaml"), &warnings, false);
        assert!(report.valid);
        assert!(error.is_none());
        assert_eq!(
            report.warnings,
            vec!["toll garrison demands nothing at garrisons[0].toll_amount"]
        );
    }

    #[test]
    fn validation_errors_are_listed_individually() {
        let err = ConfigError::ValidationError {
            path: "x.yaml".into(),
            errors: vec![
                ValidationIssue {
                    path: "characters[0].id".into(),
                    message: "duplicate id".into(),
                    severity: Severity::Error,
                },
                ValidationIssue {
                    path: "sector_id".into(),
                    message: "bad".into(),
                    severity: Severity::Error,
                },
            ],
        };
        assert_eq!(describe(&err).len(), 2);
    }
}

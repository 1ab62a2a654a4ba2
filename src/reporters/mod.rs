//! Report builder for benchmark comparisons
//!
//! Supports multiple output formats:
//! - `text` - Terminal table with colors
//! - `json` - Machine-readable JSON
//! - `markdown` - GitHub-flavored Markdown for pull request comments

pub mod compare;
mod json;
pub mod markdown;
mod text;

pub use compare::{format_delta, Bucket, Comparison, MetricDelta, PackageComparison};
pub use markdown::REPORT_FILE;

use anyhow::{anyhow, Result};
use std::str::FromStr;

/// Error lines shown per failed package
const ERROR_LINES: usize = 3;

/// First non-blank lines of a package error
fn error_lines(error: &str) -> Vec<&str> {
    error
        .lines()
        .map(str::trim_end)
        .filter(|line| !line.trim().is_empty())
        .take(ERROR_LINES)
        .collect()
}

/// Supported output formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
    Markdown,
}

impl FromStr for OutputFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" | "txt" | "terminal" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            "markdown" | "md" => Ok(OutputFormat::Markdown),
            _ => Err(anyhow!(
                "Unknown format '{}'. Valid formats: text, json, markdown",
                s
            )),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Markdown => write!(f, "markdown"),
        }
    }
}

/// Render a comparison in the specified format
pub fn report(cmp: &Comparison, format: &str) -> Result<String> {
    let fmt = OutputFormat::from_str(format)?;
    report_with_format(cmp, fmt)
}

/// Render a comparison using an OutputFormat enum
pub fn report_with_format(cmp: &Comparison, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Text => text::render(cmp),
        OutputFormat::Json => json::render(cmp),
        OutputFormat::Markdown => markdown::render(cmp),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_parsing() {
        assert_eq!(OutputFormat::from_str("text").unwrap(), OutputFormat::Text);
        assert_eq!(OutputFormat::from_str("JSON").unwrap(), OutputFormat::Json);
        assert_eq!(
            OutputFormat::from_str("md").unwrap(),
            OutputFormat::Markdown
        );
        assert!(OutputFormat::from_str("sarif").is_err());
    }

    #[test]
    fn test_error_lines() {
        let error = "tsc exited with code 2: a.ts(1,1): error TS2304\n\nb.ts(2,2): error TS2322\nc\nd";
        assert_eq!(
            error_lines(error),
            vec!["tsc exited with code 2: a.ts(1,1): error TS2304", "b.ts(2,2): error TS2322", "c"]
        );
        assert!(error_lines("").is_empty());
    }

    #[test]
    fn test_display_roundtrip() {
        for format in [OutputFormat::Text, OutputFormat::Json, OutputFormat::Markdown] {
            assert_eq!(OutputFormat::from_str(&format.to_string()).unwrap(), format);
        }
    }
}

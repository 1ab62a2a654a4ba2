//! Markdown reporter for pull request comments
//!
//! Layout:
//! - header with worker count, CPU count and the baseline commit
//! - "Reduced types" and "Increased types" tables
//! - collapsible "No change" and "Error" sections
//! - version/CPU footer

use super::compare::{Bucket, Comparison, MetricDelta, PackageComparison};
use super::error_lines;
use anyhow::Result;

/// Default report file name, written to the working directory
pub const REPORT_FILE: &str = "ts-bench-report.md";

const METRIC_HEADER: &str = "| package | traceTypes | traceTypesSize | totalTime | memoryUsed |\n\
                             | :------ | ---------: | -------------: | --------: | ---------: |\n";

const ERROR_HEADER: &str = "| package | error |\n| :------ | :---- |\n";

/// Render the comparison as GitHub-flavored Markdown
pub fn render(cmp: &Comparison) -> Result<String> {
    let mut md = String::new();

    md.push_str(&format!(
        "\n**Tsc benchmark {} / {} CPUs** (compared to {})\n\n",
        cmp.concurrency,
        cmp.logical_cores,
        cmp.previous_commit_hash.as_deref().unwrap_or("N/A")
    ));

    let reduced = metric_table(cmp, Bucket::Improved);
    if !reduced.is_empty() {
        md.push_str("#### Reduced types :+1:\n");
        md.push_str(&reduced);
        md.push('\n');
    }

    let increased = metric_table(cmp, Bucket::Regressed);
    if !increased.is_empty() {
        md.push_str("#### Increased types :bangbang:\n");
        md.push_str(&increased);
        md.push('\n');
    }

    let unchanged = metric_table(cmp, Bucket::Unchanged);
    if !unchanged.is_empty() {
        md.push_str("<details><summary>No change</summary>\n\n");
        md.push_str(&unchanged);
        md.push_str("\n</details>\n\n");
    }

    let errors = error_table(cmp);
    if !errors.is_empty() {
        md.push_str("<details><summary>Error</summary>\n\n");
        md.push_str(&errors);
        md.push_str("\n</details>\n\n");
    }

    md.push_str(&format!(
        "<p align=\"right\">v{} ({} x {})</p>\n",
        cmp.version, cmp.cpu_model, cmp.logical_cores
    ));

    Ok(md)
}

fn metric_table(cmp: &Comparison, bucket: Bucket) -> String {
    let rows: Vec<String> = cmp.bucket(bucket).map(metric_row).collect();
    if rows.is_empty() {
        return String::new();
    }
    format!("{}{}\n", METRIC_HEADER, rows.join("\n"))
}

fn metric_row(p: &PackageComparison) -> String {
    let cell = |delta: &Option<MetricDelta>, value: String| {
        delta
            .as_ref()
            .map(|d| d.display_with(&value))
            .unwrap_or_default()
    };

    let types = p.types.as_ref().map(|d| d.after).unwrap_or(0.0);
    let types_size = p.types_file_size.as_ref().map(|d| d.after).unwrap_or(0.0);
    let total_time = p.total_time.as_ref().map(|d| d.after).unwrap_or(0.0);
    let memory = p.memory_used.as_ref().map(|d| d.after).unwrap_or(0.0);

    let name = if p.is_cached {
        format!("{} (cached)", escape(&p.package))
    } else {
        escape(&p.package)
    };

    format!(
        "| {} | {} | {} | {} | {} |",
        name,
        cell(&p.types, format!("{}", types as u64)),
        cell(&p.types_file_size, format!("{}", types_size as u64)),
        cell(&p.total_time, format!("{}s", total_time)),
        cell(&p.memory_used, format!("{}K", memory as u64)),
    )
}

fn error_table(cmp: &Comparison) -> String {
    let rows: Vec<String> = cmp
        .bucket(Bucket::Errored)
        .map(|p| {
            let error = p.error.as_deref().unwrap_or("unknown error");
            // Table cells are single-line
            let lines: Vec<String> = error_lines(error).into_iter().map(escape).collect();
            format!("| {} | {} |", escape(&p.package), lines.join("<br>"))
        })
        .collect();
    if rows.is_empty() {
        return String::new();
    }
    format!("{}{}\n", ERROR_HEADER, rows.join("\n"))
}

fn escape(text: &str) -> String {
    text.replace('|', "\\|")
}

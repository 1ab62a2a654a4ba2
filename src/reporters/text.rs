//! Text (terminal) reporter: one row per package, colored by bucket

use super::compare::{Bucket, Comparison, PackageComparison};
use super::error_lines;
use anyhow::Result;
use console::{style, StyledObject};

const NAME_WIDTH: usize = 40;

/// Render the comparison as a terminal table
pub fn render(cmp: &Comparison) -> Result<String> {
    let mut out = String::new();

    out.push_str(&format!("\n{}\n", style("Tsc benchmark").bold()));
    out.push_str(&format!(
        "{}\n",
        style("──────────────────────────────────────").dim()
    ));
    out.push_str(&format!(
        "Commit: {}  Baseline: {}  Workers: {}/{}\n\n",
        short(&cmp.commit_hash),
        cmp.previous_commit_hash.as_deref().map(short).unwrap_or("none"),
        cmp.concurrency,
        cmp.logical_cores
    ));

    out.push_str(&format!(
        "{}\n",
        style(format!(
            "  {:<NAME_WIDTH$} {:>8} {:>18} {:>16} {:>18} {:>9}",
            "PACKAGE", "STATUS", "TYPES", "TOTAL TIME", "MEMORY", "HOT SPOTS"
        ))
        .dim()
    ));

    for p in &cmp.packages {
        out.push_str(&row(p));
        out.push('\n');
    }

    out.push_str(&format!(
        "\n{} improved  {} regressed  {} unchanged  {} failed\n",
        style(cmp.count(Bucket::Improved)).green(),
        style(cmp.count(Bucket::Regressed)).red(),
        cmp.count(Bucket::Unchanged),
        style(cmp.count(Bucket::Errored)).red().bold()
    ));

    Ok(out)
}

fn short(hash: &str) -> &str {
    &hash[..hash.len().min(8)]
}

fn colored(bucket: Bucket, text: String) -> StyledObject<String> {
    match bucket {
        Bucket::Improved => style(text).green(),
        Bucket::Regressed => style(text).red(),
        Bucket::Unchanged => style(text),
        Bucket::Errored => style(text).red().bold(),
    }
}

fn row(p: &PackageComparison) -> String {
    let name = if p.package.chars().count() > NAME_WIDTH {
        let head: String = p.package.chars().take(NAME_WIDTH - 1).collect();
        format!("{}…", head)
    } else {
        p.package.clone()
    };

    if p.bucket == Bucket::Errored {
        let error = p.error.as_deref().unwrap_or("unknown error");
        let lines = error_lines(error);
        let mut out = format!(
            "  {:<NAME_WIDTH$} {}  {}",
            name,
            colored(p.bucket, format!("{:>8}", "FAILED")),
            style(lines.first().copied().unwrap_or_default()).dim()
        );
        for line in lines.iter().skip(1) {
            out.push_str(&format!("\n  {:<NAME_WIDTH$} {:>8}  {}", "", "", style(line).dim()));
        }
        return out;
    }

    let status = if p.is_cached { "CACHED" } else { "OK" };
    let cell = |value: String, change: Option<&str>| match change {
        Some(c) if !c.is_empty() => format!("{} ({})", value, c),
        _ => value,
    };

    let types = p
        .types
        .as_ref()
        .map(|d| cell(format!("{}", d.after as u64), Some(&d.change)))
        .unwrap_or_default();
    let total_time = p
        .total_time
        .as_ref()
        .map(|d| cell(format!("{:.2}s", d.after), Some(&d.change)))
        .unwrap_or_default();
    let memory = p
        .memory_used
        .as_ref()
        .map(|d| cell(format!("{}K", d.after as u64), Some(&d.change)))
        .unwrap_or_default();

    format!(
        "  {:<NAME_WIDTH$} {:>8} {} {:>16} {:>18} {:>9}",
        name,
        status,
        colored(p.bucket, format!("{:>18}", types)),
        total_time,
        memory,
        p.num_hot_spots.unwrap_or(0)
    )
}

//! Doctor command - check environment

use super::analyze::open_repo;
use crate::config::{load_project_config, CacheLookup};
use crate::git::RepoIdentity;
use crate::models::CpuInfo;
use crate::runner::external_tool::is_tool_installed;
use anyhow::Result;
use console::style;
use std::path::Path;

pub fn run(path: &Path) -> Result<()> {
    println!("🩺 ts-bench Doctor\n");
    let mut problems = 0;

    let has_npm = is_tool_installed("npm");
    let has_bun = is_tool_installed("bun");
    if has_npm || has_bun {
        let mut runtimes = Vec::new();
        if has_npm {
            runtimes.push("npm");
        }
        if has_bun {
            runtimes.push("bun");
        }
        ok(&format!("JavaScript runtime: {}", runtimes.join(", ")));
    } else {
        problems += 1;
        fail("JavaScript runtime: neither npm nor bun found");
        println!("  Install Node.js (npx runs tsc and @typescript/analyze-trace)");
    }

    let cpu = CpuInfo::detect();
    ok(&format!(
        "CPU: {} (default concurrency {})",
        cpu,
        cpu.default_concurrency()
    ));

    let git = match open_repo(path) {
        Ok(git) => git,
        Err(e) => {
            fail(&format!("Git repository: {:#}", e));
            println!("\n{} problem found", style("✗").red().bold());
            return Ok(());
        }
    };
    let repo_root = git.repo_root()?.to_path_buf();
    match git.head_commit() {
        Ok(head) => ok(&format!(
            "Git repository: {} @ {}",
            repo_root.display(),
            head.short_hash()
        )),
        Err(_) => {
            problems += 1;
            fail("Git repository has no commits yet");
        }
    }

    let identity = RepoIdentity::resolve(&git);
    println!(
        "{} Repository identity: {}/{}",
        style("○").dim(),
        identity.owner,
        identity.repository
    );

    let config = load_project_config(&repo_root);
    match config.packages.cache_lookup {
        CacheLookup::Turbo if is_tool_installed("turbo") => ok("turbo: found (cache lookup enabled)"),
        CacheLookup::Turbo => {
            problems += 1;
            fail("turbo: not found, but cache_lookup = \"turbo\"");
        }
        CacheLookup::None => println!("{} Cache lookup: disabled", style("○").dim()),
    }

    let db_path = config.db_path(&repo_root);
    let db_state = if db_path.exists() { "exists" } else { "will be created" };
    ok(&format!("History database: {} ({})", db_path.display(), db_state));

    if problems == 0 {
        println!("\n✅ All checks passed!");
    } else {
        println!(
            "\n{} {} problem{} found",
            style("✗").red().bold(),
            problems,
            if problems == 1 { "" } else { "s" }
        );
    }
    Ok(())
}

fn ok(message: &str) {
    println!("{} {}", style("✓").green(), message);
}

fn fail(message: &str) {
    println!("{} {}", style("✗").red(), message);
}

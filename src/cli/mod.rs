//! CLI command definitions and handlers

pub(crate) mod analyze;
mod clean;
mod doctor;
mod report;
mod scans;
mod span;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Parse and validate workers count (1-64)
fn parse_workers(s: &str) -> Result<usize, String> {
    let n: usize = s
        .parse()
        .map_err(|_| format!("'{}' is not a valid number", s))?;
    if n == 0 {
        Err("workers must be at least 1".to_string())
    } else if n > 64 {
        Err("workers cannot exceed 64".to_string())
    } else {
        Ok(n)
    }
}

/// Parse a timeout in minutes (at least 1)
fn parse_minutes(s: &str) -> Result<u64, String> {
    match s.parse::<u64>() {
        Ok(0) => Err("timeout must be at least 1 minute".to_string()),
        Ok(n) => Ok(n),
        Err(_) => Err(format!("'{}' is not a valid number of minutes", s)),
    }
}

/// ts-bench - TypeScript compiler benchmarks for monorepos
#[derive(Parser, Debug)]
#[command(name = "ts-bench")]
#[command(
    version,
    about = "Benchmark the TypeScript compiler across every package of a monorepo and track it per commit",
    long_about = "ts-bench type-checks every workspace package with tsc, collects extended \
diagnostics, trace sizes and hot spots, stores the results per commit and \
compares them with the previous commit.\n\n\
Run without a subcommand to benchmark the current directory:\n  \
ts-bench .",
    after_help = "\
Examples:
  ts-bench .                                Benchmark the current commit
  ts-bench . --concurrency 4                Limit parallel compilers
  ts-bench span --size 10 --skip 4          Benchmark every 5th of the last 50 commits
  ts-bench report --format json             Re-render the latest comparison as JSON
  ts-bench scans --limit 5                  List stored scans"
)]
pub struct Cli {
    /// Path to repository (default: current directory)
    #[arg(global = true, default_value = ".")]
    pub path: PathBuf,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "info", value_parser = ["error", "warn", "info", "debug", "trace"])]
    pub log_level: String,

    /// Number of parallel compilers (1-64, default: 80% of logical cores)
    #[arg(long, short = 'c', visible_alias = "workers", global = true, value_parser = parse_workers)]
    pub concurrency: Option<usize>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Benchmark every package at the current commit
    #[command(after_help = "\
Examples:
  ts-bench analyze .                        Benchmark current directory
  ts-bench analyze . --timeout 30           Cancel packages still running after 30 minutes
  ts-bench analyze . --no-analyze           Skip hot-spot analysis
  ts-bench analyze . --format json          JSON comparison on stdout")]
    Analyze {
        /// Console output format: text, json, markdown (or md)
        #[arg(long, short = 'f', default_value = "text", value_parser = ["text", "json", "markdown", "md"])]
        format: String,

        /// Markdown report path (default: ts-bench-report.md)
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,

        /// Overall deadline in minutes
        #[arg(long, short = 'm', value_parser = parse_minutes)]
        timeout: Option<u64>,

        /// Skip @typescript/analyze-trace
        #[arg(long)]
        no_analyze: bool,
    },

    /// Benchmark a span of recent commits, oldest last
    #[command(after_help = "\
Examples:
  ts-bench span                                         Last 30 commits
  ts-bench span --size 5 --skip 9                       Every 10th of the last 50 commits
  ts-bench span -p \"npm ci\" -p \"npm run build\"          Custom prepare commands")]
    Span {
        /// Number of commits to benchmark
        #[arg(long, short = 's', default_value = "30")]
        size: usize,

        /// Commits to step over between two benchmarked commits
        #[arg(long, short = 'k', default_value = "0")]
        skip: usize,

        /// Shell commands run after each checkout, in order
        #[arg(long = "prepare-command", short = 'p', default_values_t = [String::from("pnpm install"), String::from("pnpm build")])]
        prepare_commands: Vec<String>,

        /// Deadline per commit in minutes
        #[arg(long, short = 'm', default_value = "60", value_parser = parse_minutes)]
        timeout: u64,

        /// Allow a dirty working tree and discard local changes on checkout
        #[arg(long)]
        force: bool,
    },

    /// Re-render the latest stored comparison
    Report {
        /// Output format: text, json, markdown (or md)
        #[arg(long, short = 'f', default_value = "markdown", value_parser = ["text", "json", "markdown", "md"])]
        format: String,

        /// Output file path (default: stdout)
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,

        /// Stored scan id (default: latest)
        #[arg(long)]
        scan: Option<u64>,
    },

    /// List stored scans, newest commit first
    Scans {
        /// Maximum scans to show
        #[arg(long, short = 'n', default_value = "20")]
        limit: usize,

        /// Scans to skip
        #[arg(long, default_value = "0")]
        offset: usize,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Remove trace directories left in packages
    Clean {
        /// Preview what would be removed without deleting
        #[arg(long)]
        dry_run: bool,
    },

    /// Check environment setup
    Doctor,

    /// Show version info
    Version,
}

/// Run the CLI
pub fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Some(Commands::Analyze {
            format,
            output,
            timeout,
            no_analyze,
        }) => analyze::run(
            &cli.path,
            analyze::AnalyzeOptions {
                concurrency: cli.concurrency,
                format,
                output,
                timeout_minutes: timeout,
                no_analyze,
            },
        ),

        Some(Commands::Span {
            size,
            skip,
            prepare_commands,
            timeout,
            force,
        }) => span::run(
            &cli.path,
            span::SpanOptions {
                size,
                skip,
                prepare_commands,
                timeout_minutes: timeout,
                force,
                concurrency: cli.concurrency,
            },
        ),

        Some(Commands::Report {
            format,
            output,
            scan,
        }) => report::run(&cli.path, &format, output, scan),

        Some(Commands::Scans {
            limit,
            offset,
            json,
        }) => scans::run(&cli.path, limit, offset, json),

        Some(Commands::Clean { dry_run }) => clean::run(&cli.path, dry_run),

        Some(Commands::Doctor) => doctor::run(&cli.path),

        Some(Commands::Version) => {
            println!("ts-bench {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }

        None => analyze::run(
            &cli.path,
            analyze::AnalyzeOptions {
                concurrency: cli.concurrency,
                ..Default::default()
            },
        ),
    }
}

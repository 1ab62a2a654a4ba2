//! ts-bench - TypeScript compiler benchmarks for monorepos
//!
//! Type-checks every workspace package with `tsc`, collects extended
//! diagnostics, trace sizes and hot spots, stores them per commit and
//! compares each commit with the previous one.

pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod git;
pub mod models;
pub mod packages;
pub mod pipeline;
pub mod reporters;
pub mod runner;
pub mod store;

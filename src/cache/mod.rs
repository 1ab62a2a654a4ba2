//! Per-repository data locations outside the working tree

pub mod paths;

pub use paths::{get_cache_dir, history_db_path};

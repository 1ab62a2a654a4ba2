//! JSON reporter
//!
//! Outputs the full comparison as pretty-printed JSON for scripting.

use super::compare::Comparison;
use anyhow::Result;

/// Render comparison as JSON
pub fn render(cmp: &Comparison) -> Result<String> {
    Ok(serde_json::to_string_pretty(cmp)?)
}

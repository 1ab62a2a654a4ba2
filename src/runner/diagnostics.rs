//! Parser for `tsc --extendedDiagnostics` output
//!
//! tsc prints one `Label: value[unit]` pair per line:
//!
//! ```text
//! Files:                         618
//! Lines of TypeScript:          1068
//! Memory used:               285146K
//! Check time:                  0.69s
//! ```
//!
//! Each line is parsed independently into a camelCase key and a number.
//! Lines that do not fit are skipped. Keys we do not know are kept in
//! [`DiagnosticMetrics::extra`] so new compiler fields survive to storage.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::OnceLock;
use tracing::trace;

/// Keys of the documented extended-diagnostics set, in tsc's print order
pub const KNOWN_KEYS: &[&str] = &[
    "files",
    "linesOfLibrary",
    "linesOfDefinitions",
    "linesOfTypeScript",
    "linesOfJavaScript",
    "linesOfJSON",
    "linesOfOther",
    "identifiers",
    "symbols",
    "types",
    "instantiations",
    "memoryUsed",
    "assignabilityCacheSize",
    "identityCacheSize",
    "subtypeCacheSize",
    "strictSubtypeCacheSize",
    "tracingTime",
    "ioReadTime",
    "parseTime",
    "resolveModuleTime",
    "resolveTypeReferenceTime",
    "resolveLibraryTime",
    "programTime",
    "bindTime",
    "checkTime",
    "printTime",
    "emitTime",
    "dumpTypesTime",
    "totalTime",
];

static VALUE_PATTERN: OnceLock<Regex> = OnceLock::new();

fn get_value_pattern() -> &'static Regex {
    VALUE_PATTERN.get_or_init(|| {
        Regex::new(r"^(-?\d+(?:\.\d+)?)\s*(ms|s|K)?$").expect("valid diagnostics value regex")
    })
}

/// Metric name → value map parsed from the diagnostics text
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawDiagnostics(BTreeMap<String, f64>);

impl RawDiagnostics {
    /// Parse extended-diagnostics text. Never fails; bad lines are skipped.
    pub fn parse(stdout: &str) -> Self {
        let mut values = BTreeMap::new();

        for line in stdout.lines().filter(|l| !l.trim().is_empty()) {
            if let Some((key, value)) = parse_line(line) {
                values.insert(key, value);
            }
        }

        Self(values)
    }

    pub fn get(&self, key: &str) -> Option<f64> {
        self.0.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

/// One `Key: value[unit]` line, or `None` for anything else
fn parse_line(line: &str) -> Option<(String, f64)> {
    let Some((label, raw_value)) = line.split_once(':') else {
        trace!("Skipping diagnostics line without colon: {:?}", line);
        return None;
    };

    let key = normalize_key(label);
    if key.is_empty() {
        return None;
    }

    match parse_value(raw_value.trim()) {
        Some(value) => Some((key, value)),
        None => {
            trace!("Skipping non-numeric diagnostics line: {:?}", line);
            None
        }
    }
}

/// Whether `line` is part of the extended-diagnostics block
pub fn is_diagnostics_line(line: &str) -> bool {
    parse_line(line).is_some()
}

/// Parse `1.41s`, `285146K`, `644`, `12ms` into a number.
///
/// Seconds stay decimal, kilobytes and plain counts are integral,
/// milliseconds are converted to seconds.
fn parse_value(raw: &str) -> Option<f64> {
    let caps = get_value_pattern().captures(raw)?;
    let number: f64 = caps.get(1)?.as_str().parse().ok()?;

    match caps.get(2).map(|m| m.as_str()) {
        Some("s") => Some(number),
        Some("ms") => Some(number / 1000.0),
        Some("K") | None => Some(number.trunc()),
        Some(_) => None,
    }
}

/// Turn a tsc label into a camelCase key.
///
/// `Memory used` → `memoryUsed`, `I/O Read time` → `ioReadTime`,
/// `Lines of JSON` → `linesOfJSON`, `printTime time` → `printTime`.
pub fn normalize_key(label: &str) -> String {
    let words: Vec<String> = label
        .split(|c: char| c.is_whitespace() || c == '/' || c == '-' || c == '_')
        .filter(|w| !w.is_empty())
        .map(|w| w.chars().filter(|c| c.is_alphanumeric()).collect::<String>())
        .filter(|w| !w.is_empty())
        .collect();

    // "I/O" splits into "I" and "O"; rejoin single-letter uppercase runs
    let mut merged: Vec<String> = Vec::with_capacity(words.len());
    for word in words {
        let is_letter = word.len() == 1 && word.chars().all(|c| c.is_ascii_uppercase());
        match merged.last_mut() {
            Some(prev) if is_letter && prev.chars().all(|c| c.is_ascii_uppercase()) && prev.len() < 3 => {
                prev.push_str(&word)
            }
            _ => merged.push(word),
        }
    }

    let mut key = String::new();
    for (i, word) in merged.iter().enumerate() {
        if i == 0 {
            if word.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()) {
                key.push_str(&word.to_lowercase());
            } else {
                let mut chars = word.chars();
                if let Some(first) = chars.next() {
                    key.extend(first.to_lowercase());
                    key.push_str(chars.as_str());
                }
            }
            continue;
        }

        // tsc prints some phases as "printTime time"
        if word.eq_ignore_ascii_case("time") && key.ends_with("Time") {
            continue;
        }

        let mut chars = word.chars();
        if let Some(first) = chars.next() {
            key.extend(first.to_uppercase());
            key.push_str(chars.as_str());
        }
    }
    key
}

/// Typed view of the extended diagnostics persisted with each result
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DiagnosticMetrics {
    pub files: u64,
    pub lines_of_library: u64,
    pub lines_of_definitions: u64,
    pub lines_of_type_script: u64,
    pub lines_of_java_script: u64,
    #[serde(rename = "linesOfJSON")]
    pub lines_of_json: u64,
    pub lines_of_other: u64,
    pub identifiers: u64,
    pub symbols: u64,
    pub types: u64,
    pub instantiations: u64,
    /// Kilobytes
    pub memory_used: u64,
    pub assignability_cache_size: u64,
    pub identity_cache_size: u64,
    pub subtype_cache_size: u64,
    pub strict_subtype_cache_size: u64,
    // Phase timings, seconds
    pub tracing_time: f64,
    pub io_read_time: f64,
    pub parse_time: f64,
    pub resolve_module_time: f64,
    pub resolve_type_reference_time: f64,
    pub resolve_library_time: f64,
    pub program_time: f64,
    pub bind_time: f64,
    pub check_time: f64,
    pub print_time: f64,
    pub emit_time: f64,
    pub dump_types_time: f64,
    pub total_time: f64,
    /// Diagnostics outside the known set
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, f64>,
}

impl DiagnosticMetrics {
    pub fn from_raw(raw: &RawDiagnostics) -> Self {
        let count = |key: &str| raw.get(key).map(|v| v.max(0.0) as u64).unwrap_or(0);
        let secs = |key: &str| raw.get(key).map(|v| v.max(0.0)).unwrap_or(0.0);

        let extra = raw
            .iter()
            .filter(|(k, _)| !KNOWN_KEYS.contains(k))
            .map(|(k, v)| (k.to_string(), v))
            .collect();

        Self {
            files: count("files"),
            lines_of_library: count("linesOfLibrary"),
            lines_of_definitions: count("linesOfDefinitions"),
            lines_of_type_script: count("linesOfTypeScript"),
            lines_of_java_script: count("linesOfJavaScript"),
            lines_of_json: count("linesOfJSON"),
            lines_of_other: count("linesOfOther"),
            identifiers: count("identifiers"),
            symbols: count("symbols"),
            types: count("types"),
            instantiations: count("instantiations"),
            memory_used: count("memoryUsed"),
            assignability_cache_size: count("assignabilityCacheSize"),
            identity_cache_size: count("identityCacheSize"),
            subtype_cache_size: count("subtypeCacheSize"),
            strict_subtype_cache_size: count("strictSubtypeCacheSize"),
            tracing_time: secs("tracingTime"),
            io_read_time: secs("ioReadTime"),
            parse_time: secs("parseTime"),
            resolve_module_time: secs("resolveModuleTime"),
            resolve_type_reference_time: secs("resolveTypeReferenceTime"),
            resolve_library_time: secs("resolveLibraryTime"),
            program_time: secs("programTime"),
            bind_time: secs("bindTime"),
            check_time: secs("checkTime"),
            print_time: secs("printTime"),
            emit_time: secs("emitTime"),
            dump_types_time: secs("dumpTypesTime"),
            total_time: secs("totalTime"),
            extra,
        }
    }

    /// Parse diagnostics text straight into typed metrics
    pub fn parse(stdout: &str) -> Self {
        Self::from_raw(&RawDiagnostics::parse(stdout))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_diagnostics_line() {
        assert!(is_diagnostics_line("Types:            644"));
        assert!(is_diagnostics_line("Check time:   0.91s"));
        assert!(!is_diagnostics_line("src/index.ts(3,1): error TS2304: Cannot find name 'x'."));
        assert!(!is_diagnostics_line("Found 1 error."));
        assert!(!is_diagnostics_line(""));
    }

    const SAMPLE: &str = "\
Files:                         618
Lines of Library:            41836
Lines of Definitions:       127137
Lines of TypeScript:          1068
Lines of JavaScript:             0
Lines of JSON:                  44
Lines of Other:                  0
Identifiers:                186597
Symbols:                    203309
Types:                       71049
Instantiations:             926111
Memory used:               285146K
Assignability cache size:    15536
Identity cache size:           181
Subtype cache size:            139
Strict subtype cache size:      35
Tracing time:                0.03s
I/O Read time:               0.04s
Parse time:                  0.28s
ResolveModule time:          0.10s
ResolveTypeReference time:   0.00s
ResolveLibrary time:         0.01s
Program time:                0.51s
Bind time:                   0.21s
printTime time:              0.00s
Check time:                  0.69s
Emit time:                   0.00s
Dump types time:             0.99s
Total time:                  1.41s
";

    #[test]
    fn test_single_lines() {
        let raw = RawDiagnostics::parse("Types: 644");
        assert_eq!(raw.get("types"), Some(644.0));
        assert_eq!(raw.len(), 1);

        let raw = RawDiagnostics::parse("Total time: 1.41s");
        assert_eq!(raw.get("totalTime"), Some(1.41));

        let raw = RawDiagnostics::parse("Memory used: 285146K");
        assert_eq!(raw.get("memoryUsed"), Some(285146.0));
    }

    #[test]
    fn test_key_normalization() {
        assert_eq!(normalize_key("Files"), "files");
        assert_eq!(normalize_key("Memory used"), "memoryUsed");
        assert_eq!(normalize_key("I/O Read time"), "ioReadTime");
        assert_eq!(normalize_key("Lines of JSON"), "linesOfJSON");
        assert_eq!(normalize_key("Lines of TypeScript"), "linesOfTypeScript");
        assert_eq!(normalize_key("printTime time"), "printTime");
        assert_eq!(normalize_key("ResolveTypeReference time"), "resolveTypeReferenceTime");
        assert_eq!(normalize_key("Strict subtype cache size"), "strictSubtypeCacheSize");
    }

    #[test]
    fn test_full_sample_covers_known_keys() {
        let raw = RawDiagnostics::parse(SAMPLE);
        for key in KNOWN_KEYS {
            assert!(raw.get(key).is_some(), "missing {}", key);
        }

        let metrics = DiagnosticMetrics::from_raw(&raw);
        assert_eq!(metrics.files, 618);
        assert_eq!(metrics.lines_of_json, 44);
        assert_eq!(metrics.types, 71049);
        assert_eq!(metrics.memory_used, 285146);
        assert_eq!(metrics.strict_subtype_cache_size, 35);
        assert!((metrics.check_time - 0.69).abs() < 1e-9);
        assert!((metrics.total_time - 1.41).abs() < 1e-9);
        assert!(metrics.extra.is_empty());
    }

    #[test]
    fn test_malformed_lines_are_skipped() {
        let raw = RawDiagnostics::parse(
            "src/index.ts(3,1): error TS2304: Cannot find name 'x'.\n\
             no colon here\n\
             Types: lots\n\
             \n\
             Symbols: 12\n",
        );
        assert_eq!(raw.get("symbols"), Some(12.0));
        assert_eq!(raw.get("types"), None);
        assert_eq!(raw.len(), 1);
    }

    #[test]
    fn test_unknown_keys_pass_through() {
        let metrics = DiagnosticMetrics::parse("Types: 5\nNodes: 12345\nSource Map time: 0.02s\n");
        assert_eq!(metrics.types, 5);
        assert_eq!(metrics.extra.get("nodes"), Some(&12345.0));
        assert_eq!(metrics.extra.get("sourceMapTime"), Some(&0.02));
    }

    #[test]
    fn test_milliseconds_become_seconds() {
        let raw = RawDiagnostics::parse("Check time: 250ms");
        assert_eq!(raw.get("checkTime"), Some(0.25));
    }

    #[test]
    fn test_serde_uses_original_column_names() {
        let metrics = DiagnosticMetrics::parse("Lines of JSON: 3\nTotal time: 2.5s");
        let json = serde_json::to_value(&metrics).unwrap();
        assert_eq!(json["linesOfJSON"], 3);
        assert_eq!(json["totalTime"], 2.5);
        assert!(json.get("extra").is_none());
    }
}

//! Report builder: per-file error/warning accumulation and the global
//! summary/metadata merge.
//!
//! Diagnostics accumulate as a plain record type, no thread-safety baked
//! in, `format!`-rendered messages: warnings and errors, each keyed by
//! diagnostic type with its own per-type counter and message list.

use indexmap::IndexMap;
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Level {
    Error,
    Warning,
}

#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub level: Level,
    pub diagnostic_type: String,
    pub message: String,
}

impl Diagnostic {
    pub fn error(diagnostic_type: impl Into<String>, message: impl Into<String>) -> Self {
        Diagnostic {
            level: Level::Error,
            diagnostic_type: diagnostic_type.into(),
            message: message.into(),
        }
    }

    pub fn warning(diagnostic_type: impl Into<String>, message: impl Into<String>) -> Self {
        Diagnostic {
            level: Level::Warning,
            diagnostic_type: diagnostic_type.into(),
            message: message.into(),
        }
    }
}

/// Accumulates diagnostics for a single file. Diagnostics of the same type
/// are numbered in emission order, starting at 1, separately for the
/// errors and warnings namespaces.
#[derive(Debug, Default)]
pub struct FileBuilder {
    errors: IndexMap<String, IndexMap<u32, String>>,
    warnings: IndexMap<String, IndexMap<u32, String>>,
    error_counters: IndexMap<String, u32>,
    warning_counters: IndexMap<String, u32>,
}

impl FileBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        let (bucket, counters) = match diagnostic.level {
            Level::Error => (&mut self.errors, &mut self.error_counters),
            Level::Warning => (&mut self.warnings, &mut self.warning_counters),
        };
        let counter = counters.entry(diagnostic.diagnostic_type.clone()).or_insert(1);
        let n = *counter;
        *counter += 1;
        bucket
            .entry(diagnostic.diagnostic_type)
            .or_default()
            .insert(n, diagnostic.message);
    }

    pub fn push_all(&mut self, diagnostics: impl IntoIterator<Item = Diagnostic>) {
        for d in diagnostics {
            self.push(d);
        }
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn has_diagnostics(&self) -> bool {
        !self.errors.is_empty() || !self.warnings.is_empty()
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct Metadata {
    pub processed: u64,
    pub valid: u64,
    pub invalid: u64,
}

/// Accumulates per-file results into the global report.
#[derive(Debug, Default)]
pub struct Report {
    metadata: Metadata,
    summary: IndexMap<String, u64>,
    files: IndexMap<String, FileBuilder>,
}

impl Report {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merges one file's results. Files are kept in insertion order, which
    /// the driver is responsible for making match the original input order
    /// even when files were checked in parallel.
    pub fn add_file(&mut self, identifier: String, file: FileBuilder) {
        self.metadata.processed += 1;
        if file.is_valid() {
            self.metadata.valid += 1;
        } else {
            self.metadata.invalid += 1;
        }
        for (diagnostic_type, entries) in file.errors.iter().chain(file.warnings.iter()) {
            *self.summary.entry(diagnostic_type.clone()).or_insert(0) += entries.len() as u64;
        }
        self.files.insert(identifier, file);
    }

    pub fn metadata(&self) -> Metadata {
        self.metadata
    }

    pub fn summary(&self) -> &IndexMap<String, u64> {
        &self.summary
    }

    pub fn file(&self, identifier: &str) -> Option<&FileBuilder> {
        self.files.get(identifier)
    }

    pub fn to_json(&self) -> Value {
        let mut root = Map::new();

        let mut metadata = Map::new();
        metadata.insert("processed".into(), Value::from(self.metadata.processed));
        metadata.insert("valid".into(), Value::from(self.metadata.valid));
        metadata.insert("invalid".into(), Value::from(self.metadata.invalid));
        root.insert("metadata".into(), Value::Object(metadata));

        let mut summary = Map::new();
        for (diagnostic_type, count) in &self.summary {
            summary.insert(diagnostic_type.clone(), Value::from(*count));
        }
        root.insert("summary".into(), Value::Object(summary));

        for (identifier, file) in &self.files {
            root.insert(identifier.clone(), file_to_json(file));
        }

        Value::Object(root)
    }
}

fn file_to_json(file: &FileBuilder) -> Value {
    let mut entry = Map::new();
    if !file.has_diagnostics() {
        entry.insert("results".into(), Value::String("File looks correct!".into()));
        return Value::Object(entry);
    }

    let mut results = Map::new();
    if !file.errors.is_empty() {
        results.insert("errors".into(), diagnostics_to_json(&file.errors));
    }
    if !file.warnings.is_empty() {
        results.insert("warnings".into(), diagnostics_to_json(&file.warnings));
    }
    entry.insert("results".into(), Value::Object(results));
    Value::Object(entry)
}

fn diagnostics_to_json(bucket: &IndexMap<String, IndexMap<u32, String>>) -> Value {
    let mut by_type = Map::new();
    for (diagnostic_type, entries) in bucket {
        let mut by_counter = Map::new();
        for (n, message) in entries {
            by_counter.insert(n.to_string(), Value::String(message.clone()));
        }
        by_type.insert(diagnostic_type.clone(), Value::Object(by_counter));
    }
    Value::Object(by_type)
}

/// Thousands-separated rendering for human-readable diagnostic messages,
/// stable regardless of locale.
pub fn format_thousands(n: i64) -> String {
    let negative = n < 0;
    let digits = n.unsigned_abs().to_string();
    let mut grouped = String::new();
    for (i, c) in digits.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    let grouped: String = grouped.chars().rev().collect();
    if negative {
        format!("-{grouped}")
    } else {
        grouped
    }
}

/// Same grouping, for the budget/cost sums that arrive as `f64`. Costs and
/// budgets are whole currency units in every PB file seen in practice, so
/// the integer part is grouped and any fractional part is kept verbatim.
pub fn format_thousands_f64(n: f64) -> String {
    let integer_part = format_thousands(n.trunc() as i64);
    let fraction = n.fract().abs();
    if fraction == 0.0 {
        integer_part
    } else {
        let fraction_str = format!("{fraction:.2}");
        format!("{integer_part}{}", &fraction_str[1..])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_start_at_one_per_type_and_namespace() {
        let mut file = FileBuilder::new();
        file.push(Diagnostic::error("vote for non-existent project", "a"));
        file.push(Diagnostic::error("vote for non-existent project", "b"));
        file.push(Diagnostic::warning("empty lines removed", "c"));

        let mut report = Report::new();
        report.add_file("example".into(), file);
        let json = report.to_json();
        let errors = &json["example"]["results"]["errors"]["vote for non-existent project"];
        assert_eq!(errors["1"], "a");
        assert_eq!(errors["2"], "b");
        let warnings = &json["example"]["results"]["warnings"]["empty lines removed"];
        assert_eq!(warnings["1"], "c");
    }

    #[test]
    fn file_with_only_warnings_is_valid() {
        let mut file = FileBuilder::new();
        file.push(Diagnostic::warning("empty lines removed", "x"));
        assert!(file.is_valid());

        let mut report = Report::new();
        report.add_file("f".into(), file);
        assert_eq!(report.metadata().valid, 1);
        assert_eq!(report.metadata().invalid, 0);
    }

    #[test]
    fn clean_file_reports_looks_correct() {
        let mut report = Report::new();
        report.add_file("clean".into(), FileBuilder::new());
        let json = report.to_json();
        assert_eq!(json["clean"]["results"], "File looks correct!");
    }

    #[test]
    fn summary_sums_across_files() {
        let mut f1 = FileBuilder::new();
        f1.push(Diagnostic::error("budget exceeded", "a"));
        let mut f2 = FileBuilder::new();
        f2.push(Diagnostic::error("budget exceeded", "b"));
        f2.push(Diagnostic::error("budget exceeded", "c"));

        let mut report = Report::new();
        report.add_file("1".into(), f1);
        report.add_file("2".into(), f2);
        assert_eq!(report.summary()["budget exceeded"], 3);
    }

    #[test]
    fn thousands_formatting_groups_every_three_digits() {
        assert_eq!(format_thousands(1000), "1,000");
        assert_eq!(format_thousands(1234567), "1,234,567");
        assert_eq!(format_thousands(-42), "-42");
        assert_eq!(format_thousands(0), "0");
    }

    #[test]
    fn thousands_formatting_of_floats_groups_the_integer_part() {
        assert_eq!(format_thousands_f64(1000.0), "1,000");
        assert_eq!(format_thousands_f64(1234567.5), "1,234,567.50");
        assert_eq!(format_thousands_f64(42.0), "42");
    }
}

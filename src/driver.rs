//! Orchestrates the per-file pipeline (scan → parse → validate → check →
//! verify) and folds results into a [`Report`] in original input order.
//!
//! Files are processed concurrently with `rayon`; each worker builds a
//! private [`FileBuilder`] with no shared mutable state, and the merge
//! into the global report happens sequentially afterward so ordering and
//! the summary counters stay deterministic regardless of scheduling.

use crate::counting::{count_points_per_project, count_votes_per_project};
use crate::model::PbFile;
use crate::parser::parse;
use crate::report::{Diagnostic, FileBuilder, Report};
use crate::scanner::scan;
use crate::{consistency, rules, validate};
use rayon::prelude::*;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};

/// One unit of work for the driver: either an on-disk path or raw text
/// content supplied directly (e.g. by a test harness).
pub enum Input {
    Path(PathBuf),
    Raw(String),
}

impl Input {
    fn identifier(&self, index: usize) -> String {
        match self {
            Input::Path(path) => path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| (index + 1).to_string()),
            Input::Raw(_) => (index + 1).to_string(),
        }
    }

    fn read(&self) -> std::io::Result<String> {
        match self {
            Input::Path(path) => std::fs::read_to_string(path),
            Input::Raw(text) => Ok(text.clone()),
        }
    }
}

impl From<&Path> for Input {
    fn from(path: &Path) -> Self {
        Input::Path(path.to_path_buf())
    }
}

/// Runs the whole pipeline on one file's text, without any I/O — the part
/// that's safe to run inside `catch_unwind`.
fn process_text(text: &str) -> FileBuilder {
    let mut builder = FileBuilder::new();

    let scanned = scan(text);
    builder.push_all(scanned.diagnostics);

    let parsed = parse(&scanned.lines);
    builder.push_all(parsed.diagnostics);

    let mut file: PbFile = parsed.file;
    builder.push_all(consistency::repair_comma_floats(&mut file));

    builder.push_all(validate::validate_meta(&file));
    builder.push_all(validate::validate_projects(&file));
    builder.push_all(validate::validate_votes(&file));
    builder.push_all(validate::validate_date_range(&file));

    let votes_tally = count_votes_per_project(&file);
    let (points_tally, points_diagnostics) = count_points_per_project(&file);
    builder.push_all(points_diagnostics);
    builder.push_all(consistency::run(&mut file, &votes_tally, &points_tally));

    // Rule verification replays against whichever declared column backs the
    // result: score when present, otherwise votes.
    let results_tally = if file.scores_in_projects { &points_tally } else { &votes_tally };
    builder.push_all(rules::verify(&file, results_tally));

    builder
}

fn process_one(input: &Input, index: usize, verbosity: u8) -> (String, FileBuilder) {
    let identifier = input.identifier(index);
    if verbosity >= 1 {
        eprintln!("checking {identifier}...");
    }

    let text = match input.read() {
        Ok(text) => text,
        Err(err) => {
            let mut builder = FileBuilder::new();
            builder.push(Diagnostic::error("internal error", format!("could not read file: {err}")));
            return (identifier, builder);
        }
    };

    let result = catch_unwind(AssertUnwindSafe(|| process_text(&text)));
    let builder = result.unwrap_or_else(|payload| {
        let message = panic_message(&payload);
        let mut builder = FileBuilder::new();
        builder.push(Diagnostic::error("internal error", message));
        builder
    });
    if verbosity >= 2 {
        eprintln!("{identifier}: {}", if builder.is_valid() { "valid" } else { "invalid" });
    }
    (identifier, builder)
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

pub fn process_batch(inputs: Vec<Input>, verbosity: u8) -> Report {
    let results: Vec<(String, FileBuilder)> = inputs
        .par_iter()
        .enumerate()
        .map(|(index, input)| process_one(input, index, verbosity))
        .collect();

    let mut report = Report::new();
    for (identifier, builder) in results {
        report.add_file(identifier, builder);
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID_FILE: &str = "META\ndescription;d\ncountry;Poland\nunit;Warsaw\ninstance;1\nnum_projects;2\nnum_votes;3\nbudget;500\nvote_type;approval\nrule;greedy\ndate_begin;2020\ndate_end;2021\n\nPROJECTS\nproject_id;cost;name;selected;votes\n1;500;Project1;1;2\n2;300;Project2;0;2\n\nVOTES\nvoter_id;vote\nvoter1;1,2\nvoter2;1\nvoter3;2\n";

    #[test]
    fn valid_file_has_no_errors() {
        let builder = process_text(VALID_FILE);
        assert!(builder.is_valid(), "{:?}", builder);
    }

    #[test]
    fn unreadable_file_in_a_batch_does_not_affect_its_siblings() {
        let inputs = vec![
            Input::Raw(VALID_FILE.to_string()),
            Input::Path(PathBuf::from("/nonexistent/path/does-not-exist.pb")),
            Input::Raw(VALID_FILE.to_string()),
        ];
        let report = process_batch(inputs, 0);
        assert_eq!(report.metadata().processed, 3);
        assert!(report.file("does-not-exist").unwrap().has_diagnostics());
        assert!(report.file("1").unwrap().is_valid());
        assert!(report.file("3").unwrap().is_valid());
    }
}

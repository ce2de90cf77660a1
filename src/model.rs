//! The parsed, typed representation of a PB file.
//!
//! Built by the section parser ([`crate::parser`]) and read by every
//! downstream check. Maps preserve file order, not just key identity —
//! presence/order diagnostics in [`crate::validate`] depend on it.

use indexmap::IndexMap;
use std::collections::HashSet;

/// An ordered record: a PROJECTS or VOTES row, or the META section itself.
pub type Record = IndexMap<String, String>;

/// A fully parsed PB file, before any validation has run.
#[derive(Debug, Clone, Default)]
pub struct PbFile {
    pub meta: Record,
    /// META fields that were obligatory but absent from the file. The
    /// corresponding key in `meta` still holds a type-appropriate default
    /// so downstream numeric/date parsing never has to special-case it.
    pub missing_marks: HashSet<String>,

    /// Declared PROJECTS header columns, in file order, *excluding*
    /// `project_id` (which is always the first column and is never itself
    /// a "field" to validate).
    pub project_fields: Vec<String>,
    pub projects: IndexMap<String, Record>,

    /// Declared VOTES header columns, excluding `voter_id`.
    pub vote_fields: Vec<String>,
    pub votes: IndexMap<String, Record>,

    pub votes_in_projects: bool,
    pub scores_in_projects: bool,
}

impl PbFile {
    pub fn new() -> Self {
        Self::default()
    }
}

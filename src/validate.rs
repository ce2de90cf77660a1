//! Field validation: presence, declared order, unknown fields, and
//! per-record value checks against the schema registry.
//!
//! Presence/order/unknown checks compare the *declared header columns* of
//! PROJECTS/VOTES against the canonical schema — they run once per section,
//! not once per record. Value checks run per field, per record, across
//! every row. Diagnostic type strings follow a fixed `<action> <section>
//! field ...` vocabulary, lowercase section name, since they're part of the
//! stable output contract.

use crate::model::PbFile;
use crate::report::Diagnostic;
use crate::schema::{self, Coerced, SectionSchema, META_IGNORED_FIELD};

pub fn validate_meta(file: &PbFile) -> Vec<Diagnostic> {
    let schema = schema::meta_schema();
    let mut diagnostics = Vec::new();
    check_meta_presence(file, &mut diagnostics);
    let declared: Vec<String> = file.meta.keys().cloned().collect();
    check_order(&schema, &declared, "meta", &mut diagnostics);
    check_unknown(&schema, file.meta.keys().map(String::as_str), "meta", &mut diagnostics);
    check_values(&schema, std::iter::once(&file.meta), "meta", &mut diagnostics);
    diagnostics.extend(validate_cumulative_requires_max_sum_points(file));
    diagnostics
}

pub fn validate_projects(file: &PbFile) -> Vec<Diagnostic> {
    let schema = schema::projects_schema();
    let mut diagnostics = Vec::new();
    check_declared_presence(&schema, &file.project_fields, "projects", &mut diagnostics);
    check_order(&schema, &file.project_fields, "projects", &mut diagnostics);
    check_unknown(&schema, file.project_fields.iter().map(String::as_str), "projects", &mut diagnostics);
    check_values(&schema, file.projects.values(), "projects", &mut diagnostics);
    diagnostics
}

pub fn validate_votes(file: &PbFile) -> Vec<Diagnostic> {
    let schema = schema::votes_schema();
    let mut diagnostics = Vec::new();
    check_declared_presence(&schema, &file.vote_fields, "votes", &mut diagnostics);
    check_order(&schema, &file.vote_fields, "votes", &mut diagnostics);
    check_unknown(&schema, file.vote_fields.iter().map(String::as_str), "votes", &mut diagnostics);
    check_values(&schema, file.votes.values(), "votes", &mut diagnostics);
    diagnostics
}

/// META's obligatory fields absent from the file are recorded in
/// `missing_marks` by the parser, which already backfilled a typed
/// default — check that set directly rather than META's own keys, which
/// always contain the backfilled defaults by construction.
fn check_meta_presence(file: &PbFile, diagnostics: &mut Vec<Diagnostic>) {
    for name in &file.missing_marks {
        diagnostics.push(Diagnostic::error(
            "missing meta field value",
            format!("meta field `{name}` is missing; a default value was substituted"),
        ));
    }
}

/// The id column (`project_id`/`voter_id`) is the map key, stripped from
/// the header before it ever reaches `declared` — it has nothing to be
/// declared-present, ordered, or unknown relative to.
fn is_id_column(name: &str) -> bool {
    name == "project_id" || name == "voter_id"
}

/// Every obligatory field of `schema` must appear among the section's
/// declared header columns.
fn check_declared_presence(schema: &SectionSchema, declared: &[String], section: &str, diagnostics: &mut Vec<Diagnostic>) {
    for field in schema.obligatory_fields() {
        if field.name == META_IGNORED_FIELD || is_id_column(field.name) {
            continue;
        }
        if !declared.iter().any(|d| d == field.name) {
            diagnostics.push(Diagnostic::error(
                format!("missing {section} field value"),
                format!("{section} is missing obligatory field `{}`", field.name),
            ));
        }
    }
}

/// Declared fields that appear in both `schema` and `declared` must appear
/// in the same relative order as the schema's canonical order.
fn check_order(schema: &SectionSchema, declared: &[String], section: &str, diagnostics: &mut Vec<Diagnostic>) {
    let canonical = schema.canonical_order();
    let present_in_canonical_order: Vec<&str> = canonical
        .into_iter()
        .filter(|name| declared.iter().any(|d| d == name))
        .collect();
    let declared_known: Vec<&str> = declared
        .iter()
        .map(String::as_str)
        .filter(|d| schema.field(d).is_some())
        .collect();
    if declared_known != present_in_canonical_order {
        diagnostics.push(Diagnostic::warning(
            format!("wrong {section} fields order"),
            format!("{section} fields are declared out of the expected order: {present_in_canonical_order:?}"),
        ));
    }
}

fn check_unknown<'a>(
    schema: &SectionSchema,
    declared: impl Iterator<Item = &'a str>,
    section: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    for name in declared {
        if name == META_IGNORED_FIELD {
            continue;
        }
        if schema.field(name).is_none() {
            diagnostics.push(Diagnostic::error(
                format!("not known {section} fields"),
                format!("{section} declares unrecognized field `{name}`"),
            ));
        }
    }
}

fn check_values<'a>(
    schema: &SectionSchema,
    records: impl Iterator<Item = &'a crate::model::Record>,
    section: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    for record in records {
        for field in &schema.0 {
            if field.name == META_IGNORED_FIELD {
                continue;
            }
            let Some(raw) = record.get(field.name) else {
                continue;
            };
            if raw.is_empty() {
                if field.nullable {
                    continue;
                }
                diagnostics.push(Diagnostic::error(
                    format!("invalid {section} field value"),
                    format!("{section} field `{}` must not be empty", field.name),
                ));
                continue;
            }
            let coerced = match Coerced::coerce(field.datatype, raw) {
                Ok(c) => c,
                Err(reason) => {
                    diagnostics.push(Diagnostic::error(
                        format!("incorrect {section} field datatype"),
                        format!("{section} field `{}`: {reason}", field.name),
                    ));
                    continue;
                }
            };
            if let Some(predicate) = &field.predicate {
                if let Err(reason) = predicate.evaluate(&coerced) {
                    diagnostics.push(Diagnostic::error(
                        format!("invalid {section} field value"),
                        format!("{section} field `{}`: {reason}", field.name),
                    ));
                }
            }
        }
    }
}

/// Cross-field rule that no single predicate can express: a cumulative
/// ballot needs a declared cap to be meaningful.
fn validate_cumulative_requires_max_sum_points(file: &PbFile) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    if file.meta.get("vote_type").map(String::as_str) != Some("cumulative") {
        return diagnostics;
    }
    let present = file.meta.get("max_sum_points").is_some_and(|v| !v.is_empty());
    if !present {
        diagnostics.push(Diagnostic::error(
            "missing meta field value",
            "max_sum_points is required when vote_type is cumulative",
        ));
    }
    diagnostics
}

/// `date_end` must not fall before `date_begin`.
pub fn validate_date_range(file: &PbFile) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    let (Some(begin), Some(end)) = (file.meta.get("date_begin"), file.meta.get("date_end")) else {
        return diagnostics;
    };
    if let (Some(begin), Some(end)) = (schema::parse_date(begin), schema::parse_date(end)) {
        if end < begin {
            diagnostics.push(Diagnostic::error(
                "date range missmatch",
                format!("date_end ({end}) is before date_begin ({begin})"),
            ));
        }
    }
    diagnostics
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;
    use crate::scanner::scan;

    fn parse_text(text: &str) -> PbFile {
        parse(&scan(text).lines).file
    }

    #[test]
    fn missing_obligatory_meta_field_is_reported() {
        let file = parse_text("META\ncountry;Poland\n\nPROJECTS\nproject_id;cost;name\n\nVOTES\nvoter_id;vote\n");
        let diagnostics = validate_meta(&file);
        assert!(diagnostics
            .iter()
            .any(|d| d.diagnostic_type == "missing meta field value" && d.message.contains("num_projects")));
    }

    #[test]
    fn unknown_meta_field_is_reported_but_key_is_ignored() {
        let mut file = PbFile::new();
        file.meta.insert("bogus".into(), "1".into());
        file.meta.insert("key".into(), "abcdef".into());
        let diagnostics = validate_meta(&file);
        assert!(diagnostics
            .iter()
            .any(|d| d.diagnostic_type == "not known meta fields" && d.message.contains("bogus")));
        assert!(!diagnostics.iter().any(|d| d.message.contains("`key`")));
    }

    #[test]
    fn meta_fields_out_of_order_is_a_warning() {
        let mut file = PbFile::new();
        file.meta.insert("budget".into(), "100".into());
        file.meta.insert("num_votes".into(), "1".into());
        let diagnostics = validate_meta(&file);
        let found = diagnostics.iter().find(|d| d.diagnostic_type == "wrong meta fields order").unwrap();
        assert_eq!(found.level, crate::report::Level::Warning);
    }

    #[test]
    fn project_fields_out_of_order_is_a_warning() {
        let mut file = PbFile::new();
        file.project_fields = vec!["name".into(), "cost".into()];
        let diagnostics = validate_projects(&file);
        let found = diagnostics.iter().find(|d| d.diagnostic_type == "wrong projects fields order").unwrap();
        assert_eq!(found.level, crate::report::Level::Warning);
    }

    #[test]
    fn vote_type_value_error_is_reported() {
        let mut file = PbFile::new();
        file.meta.insert("vote_type".into(), "lottery".into());
        let diagnostics = validate_meta(&file);
        assert!(diagnostics
            .iter()
            .any(|d| d.diagnostic_type == "invalid meta field value" && d.message.contains("vote_type")));
    }

    #[test]
    fn cumulative_without_max_sum_points_is_flagged() {
        let mut file = PbFile::new();
        file.meta.insert("vote_type".into(), "cumulative".into());
        let diagnostics = validate_cumulative_requires_max_sum_points(&file);
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].diagnostic_type, "missing meta field value");
    }

    #[test]
    fn cumulative_with_max_sum_points_present_is_fine() {
        let mut file = PbFile::new();
        file.meta.insert("vote_type".into(), "cumulative".into());
        file.meta.insert("max_sum_points".into(), "10".into());
        assert!(validate_cumulative_requires_max_sum_points(&file).is_empty());
    }

    #[test]
    fn date_end_before_date_begin_is_flagged() {
        let mut file = PbFile::new();
        file.meta.insert("date_begin".into(), "2021".into());
        file.meta.insert("date_end".into(), "2020".into());
        let diagnostics = validate_date_range(&file);
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].diagnostic_type, "date range missmatch");
    }
}

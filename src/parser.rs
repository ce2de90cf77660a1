//! Section parser: recognizes the three ordered sections, tokenizes
//! semicolon-separated records, and yields a [`PbFile`] — always, even
//! when required sections or fields are missing, so downstream checks can
//! still report what they can about a broken file.

use crate::model::PbFile;
use crate::report::Diagnostic;
use crate::schema;
use indexmap::IndexMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Meta,
    Projects,
    Votes,
}

impl Section {
    fn label(self) -> &'static str {
        match self {
            Section::Meta => "META",
            Section::Projects => "PROJECTS",
            Section::Votes => "VOTES",
        }
    }
}

fn looks_like_header(trimmed: &str) -> bool {
    !trimmed.is_empty()
        && trimmed.chars().all(|c| c.is_ascii_uppercase())
        && !trimmed.contains(';')
}

pub struct ParseResult {
    pub file: PbFile,
    pub diagnostics: Vec<Diagnostic>,
}

pub fn parse(lines: &[String]) -> ParseResult {
    let mut diagnostics = Vec::new();

    let mut current: Option<Section> = None;
    let mut seen = [false; 3];
    let mut meta_lines: Vec<&str> = Vec::new();
    let mut project_lines: Vec<&str> = Vec::new();
    let mut vote_lines: Vec<&str> = Vec::new();

    for line in lines {
        let trimmed = line.trim();
        match trimmed {
            "META" => {
                seen[0] = true;
                current = Some(Section::Meta);
            }
            "PROJECTS" => {
                seen[1] = true;
                current = Some(Section::Projects);
            }
            "VOTES" => {
                seen[2] = true;
                current = Some(Section::Votes);
            }
            other if looks_like_header(other) => {
                diagnostics.push(Diagnostic::error(
                    "unknown section",
                    format!("unrecognized section header: `{other}`"),
                ));
            }
            _ => match current {
                Some(Section::Meta) => meta_lines.push(line),
                Some(Section::Projects) => project_lines.push(line),
                Some(Section::Votes) => vote_lines.push(line),
                None => {} // content before any recognized section header
            },
        }
    }

    for (found, section) in seen.iter().zip([Section::Meta, Section::Projects, Section::Votes]) {
        if !found {
            diagnostics.push(Diagnostic::error(
                "missing section",
                format!("{} section is missing", section.label()),
            ));
        }
    }

    let mut file = PbFile::new();
    parse_meta(&meta_lines, &mut file);
    parse_records(
        &project_lines,
        "project_id",
        &mut file.project_fields,
        &mut file.projects,
        "duplicate project_id",
        &mut diagnostics,
    );
    parse_records(
        &vote_lines,
        "voter_id",
        &mut file.vote_fields,
        &mut file.votes,
        "duplicate voter_id",
        &mut diagnostics,
    );
    file.votes_in_projects = file.project_fields.iter().any(|f| f == "votes");
    file.scores_in_projects = file.project_fields.iter().any(|f| f == "score");

    ParseResult { file, diagnostics }
}

fn parse_meta(lines: &[&str], file: &mut PbFile) {
    for (i, line) in lines.iter().enumerate() {
        if i == 0 && line.trim() == "key;value" {
            continue;
        }
        let Some((key, value)) = line.split_once(';') else {
            continue;
        };
        file.meta.insert(key.trim().to_lowercase(), value.trim().to_string());
    }

    let schema = schema::meta_schema();
    for field in schema.obligatory_fields() {
        if !file.meta.contains_key(field.name) {
            let default = match field.datatype {
                schema::DataType::Str => "",
                schema::DataType::Int => "0",
                schema::DataType::Float => "0.0",
            };
            file.meta.insert(field.name.to_string(), default.to_string());
            file.missing_marks.insert(field.name.to_string());
        }
    }
}

fn parse_records(
    lines: &[&str],
    id_column: &str,
    declared_fields: &mut Vec<String>,
    records: &mut IndexMap<String, IndexMap<String, String>>,
    duplicate_diagnostic_type: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    let mut lines = lines.iter();
    let Some(header) = lines.next() else {
        return;
    };
    let mut columns: Vec<&str> = header.split(';').collect();
    if columns.first().map(|c| c.trim()) == Some(id_column) {
        columns.remove(0);
    }
    *declared_fields = columns.iter().map(|c| c.trim().to_string()).collect();

    for line in lines {
        let mut parts = line.split(';');
        let Some(id) = parts.next() else { continue };
        let id = id.trim().to_string();

        let mut record = IndexMap::new();
        for (field, value) in declared_fields.iter().zip(parts) {
            record.insert(field.clone(), value.trim().to_string());
        }

        if records.contains_key(&id) {
            diagnostics.push(Diagnostic::error(
                duplicate_diagnostic_type,
                format!("duplicate id `{id}`"),
            ));
            continue;
        }
        records.insert(id, record);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::scan;

    fn lines_of(text: &str) -> Vec<String> {
        scan(text).lines
    }

    #[test]
    fn parses_a_minimal_valid_file() {
        let text = "META\ndescription;d\ncountry;Poland\nunit;Warsaw\ninstance;1\nnum_projects;1\nnum_votes;1\nbudget;100\nvote_type;approval\nrule;greedy\ndate_begin;2020\ndate_end;2021\n\nPROJECTS\nproject_id;cost;name;votes\n1;100;Park;1\n\nVOTES\nvoter_id;vote\nvoter1;1\n";
        let result = parse(&lines_of(text));
        assert!(result.diagnostics.is_empty());
        assert_eq!(result.file.meta["country"], "Poland");
        assert_eq!(result.file.projects["1"]["name"], "Park");
        assert_eq!(result.file.votes["voter1"]["vote"], "1");
        assert!(result.file.votes_in_projects);
        assert!(!result.file.scores_in_projects);
    }

    #[test]
    fn missing_section_is_reported_once_per_section() {
        let result = parse(&lines_of("META\ncountry;Poland\n"));
        let missing: Vec<_> = result
            .diagnostics
            .iter()
            .filter(|d| d.diagnostic_type == "missing section")
            .collect();
        assert_eq!(missing.len(), 2); // PROJECTS and VOTES
    }

    #[test]
    fn missing_meta_field_gets_a_typed_default_and_a_missing_mark() {
        let result = parse(&lines_of("META\ncountry;Poland\n\nPROJECTS\nproject_id;cost;name\n\nVOTES\nvoter_id;vote\n"));
        assert_eq!(result.file.meta["num_votes"], "0");
        assert_eq!(result.file.meta["budget"], "0.0");
        assert!(result.file.missing_marks.contains("num_votes"));
        assert!(result.file.missing_marks.contains("budget"));
    }

    #[test]
    fn duplicate_project_id_is_reported_and_first_occurrence_kept() {
        let result = parse(&lines_of(
            "META\n\nPROJECTS\nproject_id;cost;name\n1;10;First\n1;20;Second\n\nVOTES\nvoter_id;vote\n",
        ));
        assert_eq!(result.file.projects["1"]["name"], "First");
        assert!(result
            .diagnostics
            .iter()
            .any(|d| d.diagnostic_type == "duplicate project_id"));
    }

    #[test]
    fn leading_key_value_header_line_is_skipped() {
        let result = parse(&lines_of("META\nkey;value\ncountry;Poland\n\nPROJECTS\nproject_id;cost;name\n\nVOTES\nvoter_id;vote\n"));
        assert_eq!(result.file.meta["country"], "Poland");
        assert!(!result.file.meta.contains_key("key;value"));
    }

    #[test]
    fn unrecognized_section_header_is_flagged() {
        let result = parse(&lines_of("META\ncountry;Poland\n\nRESULTS\n\nPROJECTS\nproject_id;cost;name\n\nVOTES\nvoter_id;vote\n"));
        assert!(result
            .diagnostics
            .iter()
            .any(|d| d.diagnostic_type == "unknown section"));
    }
}

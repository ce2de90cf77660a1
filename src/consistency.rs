//! Reconciles redundant counts — declared vs. computed, budget totals,
//! ballot shapes — against the parsed model. Runs as a fixed, independent
//! sequence of checks; none of them stop the pass on their own.

use crate::model::PbFile;
use crate::report::{format_thousands, format_thousands_f64, Diagnostic};
use indexmap::IndexMap;

/// Runs ahead of field validation so that later numeric checks (and
/// datatype coercion in the field validator) see the repaired value.
pub fn repair_comma_floats(file: &mut PbFile) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    for field in ["budget", "max_sum_cost"] {
        if let Some(raw) = file.meta.get(field) {
            if let Some(repaired) = repair_comma_float(raw) {
                diagnostics.push(Diagnostic::error("comma in float!", format!("in {field}")));
                file.meta.insert(field.to_string(), repaired);
            }
        }
    }
    for (project_id, record) in file.projects.iter_mut() {
        if let Some(raw) = record.get("cost") {
            if let Some(repaired) = repair_comma_float(raw) {
                diagnostics.push(Diagnostic::error("comma in float!", format!("in cost of project {project_id}")));
                record.insert("cost".to_string(), repaired);
            }
        }
    }
    diagnostics
}

/// `votes_tally` and `points_tally` come from `counting::count_votes_per_project`
/// and `counting::count_points_per_project` respectively — they are computed
/// independently and each feeds only the declared column it reconciles.
pub fn run(
    file: &mut PbFile,
    votes_tally: &IndexMap<String, f64>,
    points_tally: &IndexMap<String, f64>,
) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    diagnostics.extend(check_declared_vote_count(file));
    diagnostics.extend(check_declared_project_count(file));
    diagnostics.extend(check_duplicate_projects_in_ballot(file));
    diagnostics.extend(check_ballot_length_bounds(file));
    diagnostics.extend(check_no_max_length_used(file));
    diagnostics.extend(check_votes_or_score_present(file));
    diagnostics.extend(check_declared_votes_column(file, votes_tally));
    diagnostics.extend(check_declared_score_column(file, points_tally));
    diagnostics.extend(check_project_with_no_votes(file));
    diagnostics.extend(check_project_with_no_cost(file));
    diagnostics.extend(check_single_project_exceeds_budget(file));
    diagnostics.extend(check_budget_exceeded(file));
    diagnostics.extend(check_fully_funded_flag(file));
    diagnostics.extend(check_vote_for_nonexistent_project(file));
    diagnostics
}

fn repair_comma_float(raw: &str) -> Option<String> {
    if raw.contains(',') {
        Some(raw.replace(',', ""))
    } else {
        None
    }
}

fn check_declared_vote_count(file: &PbFile) -> Vec<Diagnostic> {
    let Some(declared) = file.meta.get("num_votes").and_then(|v| v.parse::<i64>().ok()) else {
        return Vec::new();
    };
    let actual = file.votes.len() as i64;
    if declared != actual {
        vec![Diagnostic::error(
            "different number of votes",
            format!(
                "declared {} votes, file has {}",
                format_thousands(declared),
                format_thousands(actual)
            ),
        )]
    } else {
        Vec::new()
    }
}

fn check_declared_project_count(file: &PbFile) -> Vec<Diagnostic> {
    let Some(declared) = file.meta.get("num_projects").and_then(|v| v.parse::<i64>().ok()) else {
        return Vec::new();
    };
    let actual = file.projects.len() as i64;
    if declared != actual {
        vec![Diagnostic::error(
            "different number of projects",
            format!(
                "declared {} projects, file has {}",
                format_thousands(declared),
                format_thousands(actual)
            ),
        )]
    } else {
        Vec::new()
    }
}

fn ballot_ids(record: &crate::model::Record) -> Vec<&str> {
    record
        .get("vote")
        .map(|v| v.split(',').map(str::trim).filter(|s| !s.is_empty()).collect())
        .unwrap_or_default()
}

fn check_duplicate_projects_in_ballot(file: &PbFile) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    for (voter_id, record) in &file.votes {
        let ids = ballot_ids(record);
        let mut seen = std::collections::HashSet::new();
        for id in ids {
            if !seen.insert(id) {
                diagnostics.push(Diagnostic::error(
                    "vote with duplicated projects",
                    format!("voter `{voter_id}` lists project `{id}` more than once"),
                ));
            }
        }
    }
    diagnostics
}

/// `min_length`/`max_length`, falling back to the `_unit` then
/// `_district` suffixed variants when the base key is absent.
fn length_bound(meta: &crate::model::Record, prefix: &str) -> Option<i64> {
    for suffix in ["", "_unit", "_district"] {
        if let Some(v) = meta.get(&format!("{prefix}{suffix}")).and_then(|v| v.parse::<i64>().ok()) {
            return Some(v);
        }
    }
    None
}

fn check_ballot_length_bounds(file: &PbFile) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    let min_length = length_bound(&file.meta, "min_length");
    let max_length = length_bound(&file.meta, "max_length");
    for (voter_id, record) in &file.votes {
        let length = ballot_ids(record).len() as i64;
        if let Some(max_length) = max_length {
            if length > max_length {
                diagnostics.push(Diagnostic::error(
                    "vote length exceeded",
                    format!("voter `{voter_id}` lists {length} projects, exceeding the max of {max_length}"),
                ));
            }
        }
        if let Some(min_length) = min_length {
            if length < min_length {
                diagnostics.push(Diagnostic::error(
                    "vote length too short",
                    format!("voter `{voter_id}` lists {length} projects, below the min of {min_length}"),
                ));
            }
        }
    }
    diagnostics
}

fn check_no_max_length_used(file: &PbFile) -> Vec<Diagnostic> {
    let Some(max_length) = length_bound(&file.meta, "max_length") else {
        return Vec::new();
    };
    let used = file.votes.values().any(|r| ballot_ids(r).len() as i64 == max_length);
    if used {
        Vec::new()
    } else {
        vec![Diagnostic::warning(
            "no_max_length_used",
            format!("no ballot uses the full declared max_length of {max_length}"),
        )]
    }
}

fn check_votes_or_score_present(file: &PbFile) -> Vec<Diagnostic> {
    if file.votes_in_projects || file.scores_in_projects {
        Vec::new()
    } else {
        vec![Diagnostic::error(
            "No votes or score counted in PROJECTS section",
            "PROJECTS declares neither a votes nor a score column",
        )]
    }
}

fn check_declared_votes_column(file: &PbFile, tally: &IndexMap<String, f64>) -> Vec<Diagnostic> {
    if !file.votes_in_projects {
        return Vec::new();
    }
    let mut diagnostics = Vec::new();
    for (project_id, record) in &file.projects {
        let Some(declared) = record.get("votes").and_then(|v| v.parse::<f64>().ok()) else {
            continue;
        };
        let computed = tally.get(project_id).copied().unwrap_or(0.0);
        if (declared - computed).abs() > f64::EPSILON {
            diagnostics.push(Diagnostic::error(
                "different values in votes",
                format!("project `{project_id}` declares {declared} votes, ballots tally {computed}"),
            ));
        }
    }
    diagnostics
}

fn check_declared_score_column(file: &PbFile, tally: &IndexMap<String, f64>) -> Vec<Diagnostic> {
    if !file.scores_in_projects {
        return Vec::new();
    }
    let mut diagnostics = Vec::new();
    for (project_id, record) in &file.projects {
        let Some(declared) = record.get("score").and_then(|v| v.parse::<f64>().ok()) else {
            continue;
        };
        let computed = tally.get(project_id).copied().unwrap_or(0.0);
        if (declared - computed).abs() > f64::EPSILON {
            diagnostics.push(Diagnostic::error(
                "different values in scores",
                format!("project `{project_id}` declares score {declared}, ballots tally {computed}"),
            ));
        }
    }
    diagnostics
}

fn check_project_with_no_votes(file: &PbFile) -> Vec<Diagnostic> {
    if !file.votes_in_projects {
        return Vec::new();
    }
    let mut diagnostics = Vec::new();
    for (project_id, record) in &file.projects {
        if record.get("votes").map(String::as_str) == Some("0") {
            diagnostics.push(Diagnostic::error(
                "project with no votes",
                format!("project `{project_id}` declares zero votes"),
            ));
        }
    }
    diagnostics
}

fn check_project_with_no_cost(file: &PbFile) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    for (project_id, record) in &file.projects {
        if record.get("cost").and_then(|v| v.parse::<f64>().ok()) == Some(0.0) {
            diagnostics.push(Diagnostic::error(
                "project with no cost",
                format!("project `{project_id}` has cost 0"),
            ));
        }
    }
    diagnostics
}

fn check_single_project_exceeds_budget(file: &PbFile) -> Vec<Diagnostic> {
    let Some(budget) = file.meta.get("budget").and_then(|v| v.parse::<f64>().ok()) else {
        return Vec::new();
    };
    let mut diagnostics = Vec::new();
    for (project_id, record) in &file.projects {
        let Some(cost) = record.get("cost").and_then(|v| v.parse::<f64>().ok()) else {
            continue;
        };
        if cost > budget {
            diagnostics.push(Diagnostic::error(
                "single project exceeded whole budget",
                format!(
                    "project `{project_id}` costs {}, exceeding the total budget of {}",
                    format_thousands_f64(cost),
                    format_thousands_f64(budget)
                ),
            ));
        }
    }
    diagnostics
}

/// Invariant 4 scopes the budget sum to `selected=1` only — `selected=2`
/// (Poznań-style partial selection) never counts toward it.
fn is_selected_for_budget(record: &crate::model::Record) -> bool {
    record.get("selected").map(String::as_str) == Some("1")
}

fn project_costs(file: &PbFile) -> impl Iterator<Item = f64> + '_ {
    file.projects.values().filter_map(|r| r.get("cost").and_then(|v| v.parse::<f64>().ok()))
}

fn check_budget_exceeded(file: &PbFile) -> Vec<Diagnostic> {
    let Some(budget) = file.meta.get("budget").and_then(|v| v.parse::<f64>().ok()) else {
        return Vec::new();
    };
    let selected_cost: f64 = file
        .projects
        .values()
        .filter(|r| is_selected_for_budget(r))
        .filter_map(|r| r.get("cost").and_then(|v| v.parse::<f64>().ok()))
        .sum();
    if selected_cost > budget {
        vec![Diagnostic::error(
            "budget exceeded",
            format!(
                "selected projects cost {}, exceeding the budget of {}",
                format_thousands_f64(selected_cost),
                format_thousands_f64(budget)
            ),
        )]
    } else {
        Vec::new()
    }
}

fn check_fully_funded_flag(file: &PbFile) -> Vec<Diagnostic> {
    let Some(budget) = file.meta.get("budget").and_then(|v| v.parse::<f64>().ok()) else {
        return Vec::new();
    };
    let total_cost: f64 = project_costs(file).sum();
    let fully_funded = file.meta.get("fully_funded").map(String::as_str) == Some("1");
    if fully_funded && total_cost > budget {
        vec![Diagnostic::error(
            "wrong fully_funded flag",
            format!(
                "fully_funded is set but all-project cost {} exceeds budget {}",
                format_thousands_f64(total_cost),
                format_thousands_f64(budget)
            ),
        )]
    } else if !fully_funded && budget >= total_cost {
        vec![Diagnostic::error(
            "all projects funded",
            format!(
                "budget {} covers the all-project cost {} but fully_funded is not set",
                format_thousands_f64(budget),
                format_thousands_f64(total_cost)
            ),
        )]
    } else {
        Vec::new()
    }
}

fn check_vote_for_nonexistent_project(file: &PbFile) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    for (voter_id, record) in &file.votes {
        for project_id in ballot_ids(record) {
            if !file.projects.contains_key(project_id) {
                diagnostics.push(Diagnostic::error(
                    "vote for non-existent project",
                    format!("voter `{voter_id}` references unknown project `{project_id}`"),
                ));
            }
        }
    }
    diagnostics
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Record;

    fn set(record: &mut Record, key: &str, value: &str) {
        record.insert(key.to_string(), value.to_string());
    }

    #[test]
    fn comma_in_budget_is_repaired_and_flagged() {
        let mut file = PbFile::new();
        file.meta.insert("budget".into(), "1,000.50".into());
        let diagnostics = repair_comma_floats(&mut file);
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].diagnostic_type, "comma in float!");
        assert_eq!(file.meta["budget"], "1000.50");
    }

    #[test]
    fn declared_vote_count_mismatch_is_flagged() {
        let mut file = PbFile::new();
        file.meta.insert("num_votes".into(), "3".into());
        file.votes.insert("v1".into(), Record::new());
        let diagnostics = check_declared_vote_count(&file);
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].diagnostic_type, "different number of votes");
    }

    #[test]
    fn duplicate_projects_within_a_ballot_are_flagged() {
        let mut file = PbFile::new();
        let mut record = Record::new();
        set(&mut record, "vote", "1,2,1");
        file.votes.insert("v1".into(), record);
        let diagnostics = check_duplicate_projects_in_ballot(&file);
        assert_eq!(diagnostics.len(), 1);
    }

    #[test]
    fn ballot_length_bounds_are_enforced_with_unit_fallback() {
        let mut file = PbFile::new();
        file.meta.insert("max_length_unit".into(), "1".into());
        let mut record = Record::new();
        set(&mut record, "vote", "1,2");
        file.votes.insert("v1".into(), record);
        let diagnostics = check_ballot_length_bounds(&file);
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].diagnostic_type, "vote length exceeded");
    }

    #[test]
    fn vote_for_nonexistent_project_is_flagged_per_reference() {
        let mut file = PbFile::new();
        let mut record = Record::new();
        set(&mut record, "vote", "999,777");
        file.votes.insert("v1".into(), record);
        let diagnostics = check_vote_for_nonexistent_project(&file);
        assert_eq!(diagnostics.len(), 2);
    }

    #[test]
    fn single_project_exceeding_budget_is_flagged() {
        let mut file = PbFile::new();
        file.meta.insert("budget".into(), "100".into());
        let mut record = Record::new();
        set(&mut record, "cost", "500");
        file.projects.insert("1".into(), record);
        let diagnostics = check_single_project_exceeds_budget(&file);
        assert_eq!(diagnostics.len(), 1);
    }

    #[test]
    fn fully_funded_mismatch_cases() {
        let mut file = PbFile::new();
        file.meta.insert("budget".into(), "100".into());
        let mut record = Record::new();
        set(&mut record, "cost", "50");
        file.projects.insert("1".into(), record);
        // budget covers all costs, fully_funded unset -> "all projects funded"
        let diagnostics = check_fully_funded_flag(&file);
        assert_eq!(diagnostics[0].diagnostic_type, "all projects funded");
    }

    #[test]
    fn missing_votes_and_score_column_is_flagged() {
        let file = PbFile::new();
        let diagnostics = check_votes_or_score_present(&file);
        assert_eq!(diagnostics.len(), 1);
    }

    #[test]
    fn budget_exceeded_only_counts_selected_equal_one() {
        let mut file = PbFile::new();
        file.meta.insert("budget".into(), "100".into());
        let mut fully = Record::new();
        set(&mut fully, "cost", "60");
        set(&mut fully, "selected", "1");
        file.projects.insert("1".into(), fully);
        let mut partial = Record::new();
        set(&mut partial, "cost", "60");
        set(&mut partial, "selected", "2");
        file.projects.insert("2".into(), partial);
        // selected=1 alone costs 60, under budget; selected=2 must not add to the sum.
        let diagnostics = check_budget_exceeded(&file);
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn budget_exceeded_message_uses_thousands_separators() {
        let mut file = PbFile::new();
        file.meta.insert("budget".into(), "1000".into());
        let mut record = Record::new();
        set(&mut record, "cost", "2500");
        set(&mut record, "selected", "1");
        file.projects.insert("1".into(), record);
        let diagnostics = check_budget_exceeded(&file);
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].message.contains("2,500"));
        assert!(diagnostics[0].message.contains("1,000"));
    }
}

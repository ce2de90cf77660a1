//! Tallies the `vote`/`points` columns of VOTES into per-project results,
//! and produces the result-ordering used by rule verification.
//!
//! The two counting functions are independent of each other and of
//! `vote_type`: `count_votes_per_project` always counts plain ballot
//! references, `count_points_per_project` always sums the `vote`/`points`
//! zip. Which one reconciles against which declared PROJECTS column is a
//! question of which column is present, not which `vote_type` is declared.

use crate::model::PbFile;
use crate::report::Diagnostic;
use indexmap::IndexMap;

/// A plain reference count: how many ballots list each project, regardless
/// of `vote_type` or any `points` column. Projects that received no votes
/// at all are present with `0.0`.
pub fn count_votes_per_project(file: &PbFile) -> IndexMap<String, f64> {
    let mut tally: IndexMap<String, f64> = file.projects.keys().map(|id| (id.clone(), 0.0)).collect();
    for record in file.votes.values() {
        let Some(vote) = record.get("vote") else { continue };
        for project_id in vote.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            *tally.entry(project_id.to_string()).or_insert(0.0) += 1.0;
        }
    }
    tally
}

/// The `vote`/`points` zip-and-sum, run whenever VOTES declares a `points`
/// column at all — independent of `vote_type`. Projects that received no
/// points are present with `0.0`.
pub fn count_points_per_project(file: &PbFile) -> (IndexMap<String, f64>, Vec<Diagnostic>) {
    let mut diagnostics = Vec::new();
    let mut tally: IndexMap<String, f64> = file.projects.keys().map(|id| (id.clone(), 0.0)).collect();

    if !file.vote_fields.iter().any(|f| f == "points") {
        return (tally, diagnostics);
    }

    for (voter_id, record) in &file.votes {
        let Some(vote) = record.get("vote") else { continue };
        let project_ids: Vec<&str> = vote.split(',').map(str::trim).filter(|s| !s.is_empty()).collect();
        let points: Vec<&str> = record
            .get("points")
            .map(|p| p.split(',').map(str::trim).filter(|s| !s.is_empty()).collect())
            .unwrap_or_default();
        if points.len() != project_ids.len() {
            diagnostics.push(Diagnostic::error(
                "vote/points length mismatch",
                format!(
                    "voter `{voter_id}` lists {} projects but {} points",
                    project_ids.len(),
                    points.len()
                ),
            ));
            continue;
        }
        for (project_id, points) in project_ids.iter().zip(points.iter()) {
            let Ok(points) = points.parse::<f64>() else { continue };
            *tally.entry((*project_id).to_string()).or_insert(0.0) += points;
        }
    }

    (tally, diagnostics)
}

/// Project ids ranked by descending result, ties broken by ascending id.
pub fn sort_projects_by_results(tally: &IndexMap<String, f64>) -> Vec<String> {
    let mut ids: Vec<String> = tally.keys().cloned().collect();
    ids.sort_by(|a, b| {
        let result_a = tally[a];
        let result_b = tally[b];
        result_b
            .partial_cmp(&result_a)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.cmp(b))
    });
    ids
}

//! Replays the declared aggregation rule against the model and compares
//! the replayed selection with the declared `selected` flags.
//!
//! Only activates when PROJECTS declares a `selected` column — the rule
//! verifier has nothing to compare against otherwise.

use crate::counting::sort_projects_by_results;
use crate::model::PbFile;
use crate::report::Diagnostic;
use indexmap::IndexMap;

struct Candidate {
    id: String,
    cost: f64,
    result: f64,
}

/// Orders by result descending, id ascending — the priority order every
/// replay in this module walks.
fn ordered_candidates(file: &PbFile, tally: &IndexMap<String, f64>, threshold: f64) -> Vec<Candidate> {
    sort_projects_by_results(tally)
        .into_iter()
        .filter_map(|id| {
            let cost = file.projects.get(&id)?.get("cost")?.parse::<f64>().ok()?;
            let result = tally.get(&id).copied().unwrap_or(0.0);
            (result >= threshold).then_some(Candidate { id, cost, result })
        })
        .collect()
}

fn declared_selected(file: &PbFile) -> std::collections::HashSet<String> {
    file.projects
        .iter()
        .filter(|(_, r)| matches!(r.get("selected").map(String::as_str), Some("1") | Some("2")))
        .map(|(id, _)| id.clone())
        .collect()
}

/// Walks `candidates` in priority order, admitting every one whose cost
/// still fits; never stops early (a later, cheaper project can still fit
/// after a pricier one didn't).
fn greedy_with_skip(candidates: &[Candidate], budget: f64) -> std::collections::HashSet<String> {
    let mut remaining = budget;
    let mut selected = std::collections::HashSet::new();
    for c in candidates {
        if c.cost <= remaining {
            selected.insert(c.id.clone());
            remaining -= c.cost;
        }
    }
    selected
}

/// Walks in priority order and stops at the first project that doesn't
/// fit, admitting nothing after that regardless of cost.
fn greedy_no_skip(candidates: &[Candidate], budget: f64) -> std::collections::HashSet<String> {
    let mut remaining = budget;
    let mut selected = std::collections::HashSet::new();
    for c in candidates {
        if c.cost > remaining {
            break;
        }
        selected.insert(c.id.clone());
        remaining -= c.cost;
    }
    selected
}

/// Walks in priority order; the first project that doesn't fit is still
/// admitted if its cost is within 80% of the budget remaining at that
/// moment, then the walk stops.
fn poznan(candidates: &[Candidate], budget: f64) -> std::collections::HashSet<String> {
    let mut remaining = budget;
    let mut selected = std::collections::HashSet::new();
    for c in candidates {
        if c.cost <= remaining {
            selected.insert(c.id.clone());
            remaining -= c.cost;
        } else {
            if c.cost <= 0.8 * remaining {
                selected.insert(c.id.clone());
            }
            break;
        }
    }
    selected
}

fn divergence_message(expected: &std::collections::HashSet<String>, declared: &std::collections::HashSet<String>) -> Option<String> {
    let mut missing: Vec<&String> = expected.difference(declared).collect();
    let mut extra: Vec<&String> = declared.difference(expected).collect();
    if missing.is_empty() && extra.is_empty() {
        return None;
    }
    missing.sort();
    extra.sort();
    Some(format!(
        "Projects not selected but should be: {:?}; Projects selected but should not: {:?}",
        missing, extra
    ))
}

/// Replays `greedy` against the file's declared `selected=1` set's
/// remaining budget, over the unselected projects in priority order, and
/// reports every project the replay would still admit.
fn unused_budget(candidates: &[Candidate], budget: f64, declared: &std::collections::HashSet<String>) -> Vec<String> {
    let selected_cost: f64 = candidates.iter().filter(|c| declared.contains(&c.id)).map(|c| c.cost).sum();
    let mut remaining = budget - selected_cost;
    let mut admitted = Vec::new();
    for c in candidates.iter().filter(|c| !declared.contains(&c.id)) {
        if c.cost <= remaining {
            admitted.push(c.id.clone());
            remaining -= c.cost;
        }
    }
    admitted
}

pub fn verify(file: &PbFile, tally: &IndexMap<String, f64>) -> Vec<Diagnostic> {
    if !file.project_fields.iter().any(|f| f == "selected") {
        return Vec::new();
    }

    let mut diagnostics = Vec::new();
    let Some(budget) = file.meta.get("budget").and_then(|v| v.parse::<f64>().ok()) else {
        return diagnostics;
    };
    let rule = file.meta.get("rule").map(String::as_str).unwrap_or("unknown");
    let threshold: f64 = file
        .meta
        .get("min_project_score_threshold")
        .and_then(|v| v.parse().ok())
        .unwrap_or(0.0);
    let declared = declared_selected(file);

    let unit_is_poznan = file.meta.get("unit").map(String::as_str) == Some("Poznań");

    match rule {
        "greedy" => {
            let candidates = ordered_candidates(file, tally, 0.0);
            let expected = greedy_with_skip(&candidates, budget);
            if let Some(message) = divergence_message(&expected, &declared) {
                diagnostics.push(Diagnostic::error("greedy rule not followed", message));
            }
            for id in unused_budget(&candidates, budget, &declared) {
                diagnostics.push(Diagnostic::error("unused budget", format!("project `{id}` could still be funded")));
            }
        }
        "greedy-no-skip" => {
            let candidates = ordered_candidates(file, tally, 0.0);
            let expected = greedy_no_skip(&candidates, budget);
            if let Some(message) = divergence_message(&expected, &declared) {
                diagnostics.push(Diagnostic::error("greedy-no-skip rule not followed", message));
            }
            for id in unused_budget(&candidates, budget, &declared) {
                diagnostics.push(Diagnostic::warning("unused budget", format!("project `{id}` could still be funded")));
            }
        }
        "greedy-threshold" => {
            if file.meta.get("min_project_score_threshold").is_none() {
                diagnostics.push(Diagnostic::error("missing threshold field", "greedy-threshold requires min_project_score_threshold"));
            }
            let candidates = ordered_candidates(file, tally, threshold);
            let expected = greedy_with_skip(&candidates, budget);
            if let Some(message) = divergence_message(&expected, &declared) {
                diagnostics.push(Diagnostic::error("greedy rule not followed", message));
            }
            for id in &declared {
                let result = tally.get(id).copied().unwrap_or(0.0);
                if result < threshold {
                    diagnostics.push(Diagnostic::error(
                        "threshold violation",
                        format!("project `{id}` is selected with result {result}, below threshold {threshold}"),
                    ));
                }
            }
            for id in unused_budget(&candidates, budget, &declared) {
                diagnostics.push(Diagnostic::warning("unused budget", format!("project `{id}` could still be funded")));
            }
        }
        "greedy-exclusive" => {
            let candidates = ordered_candidates(file, tally, 0.0);
            let expected = greedy_with_skip(&candidates, budget);
            if let Some(message) = divergence_message(&expected, &declared) {
                diagnostics.push(Diagnostic::warning("greedy-exclusive potential mismatch", message));
            }
            for id in unused_budget(&candidates, budget, &declared) {
                diagnostics.push(Diagnostic::warning("unused budget", format!("project `{id}` could still be funded")));
            }
        }
        "greedy-custom" => {
            if unit_is_poznan {
                let candidates = ordered_candidates(file, tally, 0.0);
                let expected = poznan(&candidates, budget);
                if let Some(message) = divergence_message(&expected, &declared) {
                    diagnostics.push(Diagnostic::error("poznan rule not followed", message));
                }
            } else {
                let candidates = ordered_candidates(file, tally, 0.0);
                let expected = greedy_with_skip(&candidates, budget);
                if let Some(message) = divergence_message(&expected, &declared) {
                    diagnostics.push(Diagnostic::warning("greedy-custom cannot be verified", message));
                }
                if file.meta.get("comment").is_none() {
                    diagnostics.push(Diagnostic::warning("missing comment for greedy-custom", "greedy-custom has no comment explaining its selection logic"));
                }
            }
        }
        "unknown" => {
            diagnostics.push(Diagnostic::warning("rule validation skipped", "rule is declared as unknown"));
        }
        "equalshares" | "equalshares/add1" => {
            diagnostics.push(Diagnostic::warning("rule checker not implemented", format!("no replay is implemented for `{rule}`")));
        }
        other => {
            diagnostics.push(Diagnostic::error("unknown rule value", format!("`{other}` is not a recognized rule")));
        }
    }

    diagnostics
}

//! Line scanner: splits raw text into logical lines and drops blank ones,
//! counting what it removed.

use crate::report::Diagnostic;

pub struct ScanResult {
    pub lines: Vec<String>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Strips trailing all-blank lines, then removes any remaining
/// whitespace-only line, reporting the total removed as a warning.
/// Never fatal — an all-blank file just yields an empty line list.
pub fn scan(text: &str) -> ScanResult {
    let mut lines: Vec<&str> = text.lines().collect();
    while matches!(lines.last(), Some(l) if l.trim().is_empty()) {
        lines.pop();
    }

    let mut removed = 0usize;
    let kept: Vec<String> = lines
        .into_iter()
        .filter(|l| {
            if l.trim().is_empty() {
                removed += 1;
                false
            } else {
                true
            }
        })
        .map(str::to_string)
        .collect();

    let mut diagnostics = Vec::new();
    if removed > 0 {
        diagnostics.push(Diagnostic::warning(
            "empty lines removed",
            format!("Removed {removed} empty lines from the file."),
        ));
    }

    ScanResult {
        lines: kept,
        diagnostics,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drops_trailing_blank_lines_without_a_warning() {
        let result = scan("META\nkey;value\n\n\n");
        assert_eq!(result.lines, vec!["META", "key;value"]);
        assert!(result.diagnostics.is_empty());
    }

    #[test]
    fn drops_interior_blank_lines_with_a_warning() {
        let result = scan("META\n\nkey;value\n\nPROJECTS");
        assert_eq!(result.lines, vec!["META", "key;value", "PROJECTS"]);
        assert_eq!(result.diagnostics.len(), 1);
        assert_eq!(result.diagnostics[0].message, "Removed 2 empty lines from the file.");
    }

    #[test]
    fn whitespace_only_line_counts_as_blank() {
        let result = scan("META\n   \nkey;value");
        assert_eq!(result.lines, vec!["META", "key;value"]);
        assert_eq!(result.diagnostics.len(), 1);
    }
}

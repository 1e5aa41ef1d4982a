//! CLI output formatting.
//!
//! The report is **outcome-centric**: one line per resource that did
//! something, labelled with what happened, followed by a summary. Skipped
//! resources are counted but not listed; a warm rebuild of a large site
//! should print one line, not thousands. Failures carry their cause on an
//! indented line.
//!
//! # Output Format
//!
//! ## Gen
//!
//! ```text
//! Rendered     layout/base.html
//! Rendered     content/index.md → index.html
//! Copied       media/site.css → media/site.css
//! RenderError  content/broken.md → broken.html
//!     Cause: Layout not found: layout/gone.html
//! Removed      old-post.html
//!
//! Generated 2 rendered, 1 copied, 4 skipped, 1 failed (8 total)
//! ```
//!
//! ## Create
//!
//! ```text
//! Created site at my-site (layout: basic)
//!     content/index.md
//!     layout/base.html
//!     site.yaml
//! ```
//!
//! # Architecture
//!
//! Each command has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format
//! functions are pure.

use crate::generate::{GenerationReport, Outcome};
use std::path::Path;

/// Width of the outcome label column.
const LABEL_WIDTH: usize = 12;

fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

// ============================================================================
// Gen
// ============================================================================

pub fn format_report(report: &GenerationReport) -> Vec<String> {
    let mut lines = Vec::new();

    for o in &report.outcomes {
        if o.outcome == Outcome::Skipped {
            continue;
        }
        let target = match &o.output {
            Some(output) => format!("{} → {}", o.source, output),
            None => o.source.clone(),
        };
        lines.push(format!("{:<LABEL_WIDTH$} {}", o.outcome.label(), target));
        if let Outcome::Failed { cause, .. } = &o.outcome {
            lines.push(format!("{}Cause: {}", indent(1), cause));
        }
    }
    for output in &report.removed {
        lines.push(format!("{:<LABEL_WIDTH$} {}", "Removed", output));
    }

    if !lines.is_empty() {
        lines.push(String::new());
    }
    lines.push(format!("Generated {}", report.summary()));
    lines
}

pub fn print_report(report: &GenerationReport) {
    for line in format_report(report) {
        println!("{}", line);
    }
}

// ============================================================================
// Create
// ============================================================================

/// `files` are site-relative paths of what was written, in any order.
pub fn format_create(site_path: &Path, layout: &str, files: &[String]) -> Vec<String> {
    let mut lines = vec![format!(
        "Created site at {} (layout: {})",
        site_path.display(),
        layout
    )];
    let mut sorted: Vec<&String> = files.iter().collect();
    sorted.sort();
    lines.extend(sorted.into_iter().map(|f| format!("{}{}", indent(1), f)));
    lines
}

pub fn print_create(site_path: &Path, layout: &str, files: &[String]) {
    for line in format_create(site_path, layout, files) {
        println!("{}", line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generate::{FailureKind, ResourceOutcome, RunStatus};

    fn outcome(source: &str, output: Option<&str>, outcome: Outcome) -> ResourceOutcome {
        ResourceOutcome {
            source: source.to_string(),
            output: output.map(str::to_string),
            outcome,
        }
    }

    #[test]
    fn report_lists_work_and_hides_skips() {
        let report = GenerationReport {
            outcomes: vec![
                outcome("layout/base.html", None, Outcome::Rendered),
                outcome("content/index.md", Some("index.html"), Outcome::Rendered),
                outcome("content/about.md", Some("about.html"), Outcome::Skipped),
                outcome("media/site.css", Some("media/site.css"), Outcome::Copied),
            ],
            status: RunStatus::Completed,
            removed: Vec::new(),
        };
        assert_eq!(
            format_report(&report),
            vec![
                "Rendered     layout/base.html",
                "Rendered     content/index.md → index.html",
                "Copied       media/site.css → media/site.css",
                "",
                "Generated 2 rendered, 1 copied, 1 skipped (4 total)",
            ]
        );
    }

    #[test]
    fn failures_show_cause() {
        let report = GenerationReport {
            outcomes: vec![outcome(
                "content/broken.md",
                Some("broken.html"),
                Outcome::Failed {
                    kind: FailureKind::Render,
                    cause: "Layout not found: layout/gone.html".into(),
                },
            )],
            status: RunStatus::PartiallyFailed,
            removed: Vec::new(),
        };
        let lines = format_report(&report);
        assert_eq!(lines[0], "RenderError  content/broken.md → broken.html");
        assert_eq!(lines[1], "    Cause: Layout not found: layout/gone.html");
        assert!(lines.last().unwrap().contains("1 failed"));
    }

    #[test]
    fn nothing_to_do_is_one_line() {
        let report = GenerationReport {
            outcomes: vec![outcome("media/a.css", Some("media/a.css"), Outcome::Skipped)],
            status: RunStatus::Completed,
            removed: Vec::new(),
        };
        assert_eq!(
            format_report(&report),
            vec!["Generated 0 rendered, 0 copied, 1 skipped (1 total)"]
        );
    }

    #[test]
    fn removed_outputs_are_listed() {
        let report = GenerationReport {
            outcomes: vec![outcome("content/index.md", Some("index.html"), Outcome::Skipped)],
            status: RunStatus::Completed,
            removed: vec!["old.html".into(), "media/gone.css".into()],
        };
        assert_eq!(
            format_report(&report),
            vec![
                "Removed      old.html",
                "Removed      media/gone.css",
                "",
                "Generated 0 rendered, 0 copied, 1 skipped (1 total)",
            ]
        );
    }

    #[test]
    fn create_lists_files_sorted() {
        let files = vec!["site.yaml".to_string(), "content/index.md".to_string()];
        assert_eq!(
            format_create(Path::new("my-site"), "basic", &files),
            vec![
                "Created site at my-site (layout: basic)",
                "    content/index.md",
                "    site.yaml",
            ]
        );
    }
}

use std::fmt::Write as _;

use anyhow::{Context, Result};
use epicsync_engine::{
    ChildOutcome, ChildReport, Resolution, ResolutionKind, RunReport, ScanReport,
};
use serde::Serialize;

const ERROR_LIMIT: usize = 120;

#[derive(Serialize)]
pub struct ResolutionView<'a> {
    pub trigger: u64,
    pub resolution: ResolutionKind,
    pub epic: Option<u64>,
    pub epic_title: Option<&'a str>,
}

impl<'a> ResolutionView<'a> {
    pub fn new(trigger: u64, resolution: &'a Resolution) -> Self {
        let epic = resolution.epic();
        Self {
            trigger,
            resolution: resolution.kind(),
            epic: epic.map(|issue| issue.number),
            epic_title: epic.map(|issue| issue.title.as_str()),
        }
    }
}

pub fn to_json<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value).with_context(|| "failed to encode report as JSON")
}

pub fn render_resolution(view: &ResolutionView<'_>) -> String {
    match (view.resolution, view.epic) {
        (ResolutionKind::NoEpic, _) | (_, None) => {
            format!("#{}: no epic", view.trigger)
        }
        (kind, Some(epic)) => format!(
            "#{}: {} #{} {}",
            view.trigger,
            resolution_label(kind),
            epic,
            view.epic_title.unwrap_or_default()
        )
        .trim_end()
        .to_string(),
    }
}

pub fn render_run(report: &RunReport) -> String {
    let mut out = String::new();
    let Some(epic) = report.epic else {
        let _ = write!(out, "#{}: no epic, nothing to do", report.trigger);
        return out;
    };
    if !report.epic_on_board {
        let _ = write!(
            out,
            "#{}: epic #{} is not on the project board, nothing to do",
            report.trigger, epic
        );
        return out;
    }

    let _ = writeln!(
        out,
        "#{}: {} #{} status={} children={}",
        report.trigger,
        resolution_label(report.resolution),
        epic,
        or_dash(report.epic_status.as_deref()),
        report.children.len()
    );
    render_children(&mut out, &report.children);
    let propagation = report.propagation();
    let _ = write!(
        out,
        "updated={} skipped={}{}",
        propagation.updated(),
        propagation.skipped(),
        if report.cancelled { " (cancelled)" } else { "" }
    );
    out
}

pub fn render_scan(report: &ScanReport) -> String {
    let mut out = String::new();
    for epic in &report.epics {
        let _ = writeln!(
            out,
            "epic #{} {} status={} children={}",
            epic.number,
            epic.title,
            or_dash(epic.status.as_deref()),
            epic.children.len()
        );
        if let Some(error) = epic.error.as_deref() {
            let _ = writeln!(out, "  skipped: {}", compact_error(error));
        }
        render_children(&mut out, &epic.children);
    }
    let _ = write!(
        out,
        "items={} epics={}{}",
        report.items_seen,
        report.epics.len(),
        if report.cancelled { " (cancelled)" } else { "" }
    );
    out
}

fn render_children(out: &mut String, children: &[ChildReport]) {
    for child in children {
        let _ = writeln!(out, "  #{} {}", child.number, describe(&child.outcome));
    }
}

fn describe(outcome: &ChildOutcome) -> String {
    match outcome {
        ChildOutcome::Updated { from, to } => {
            format!("updated {} -> {to}", or_dash(from.as_deref()))
        }
        ChildOutcome::WouldUpdate { from, to } => {
            format!("would update {} -> {to}", or_dash(from.as_deref()))
        }
        ChildOutcome::AlreadyAligned { status } => format!("already {status}"),
        ChildOutcome::Untouched { status } => format!("left at {}", or_dash(status.as_deref())),
        ChildOutcome::Skipped { kind, reason } => {
            format!("skipped ({kind}): {}", compact_error(reason))
        }
    }
}

fn resolution_label(kind: ResolutionKind) -> &'static str {
    match kind {
        ResolutionKind::SelfEpic => "is epic",
        ResolutionKind::ParentEpic => "child of epic",
        ResolutionKind::NoEpic => "no epic",
    }
}

fn or_dash(value: Option<&str>) -> &str {
    value.unwrap_or("-")
}

fn compact_error(value: &str) -> String {
    let cleaned = value.replace('\n', " ");
    if cleaned.chars().count() <= ERROR_LIMIT {
        return cleaned;
    }
    let cut = cleaned.chars().take(ERROR_LIMIT).collect::<String>();
    format!("{cut}...")
}

#[cfg(test)]
mod tests {
    use epicsync_domain::{Issue, IssueType};
    use epicsync_engine::{
        ChildOutcome, ChildReport, EpicReport, Resolution, ResolutionKind, RunReport, ScanReport,
    };
    use serde_json::Value;

    use super::{
        compact_error, render_resolution, render_run, render_scan, to_json, ResolutionView,
    };

    fn child(number: u64, outcome: ChildOutcome) -> ChildReport {
        ChildReport {
            number,
            title: format!("Child {number}"),
            outcome,
        }
    }

    fn run_report() -> RunReport {
        RunReport {
            trigger: 30,
            resolution: ResolutionKind::ParentEpic,
            epic: Some(5),
            epic_on_board: true,
            epic_status: Some("Done".to_string()),
            children: vec![
                child(
                    30,
                    ChildOutcome::Updated {
                        from: Some("In Progress".to_string()),
                        to: "Done".to_string(),
                    },
                ),
                child(
                    31,
                    ChildOutcome::AlreadyAligned {
                        status: "Done".to_string(),
                    },
                ),
                child(
                    32,
                    ChildOutcome::Skipped {
                        kind: "not_on_board",
                        reason: "issue #32 is not on the configured project board".to_string(),
                    },
                ),
            ],
            cancelled: false,
        }
    }

    #[test]
    fn renders_run_summary() {
        let text = render_run(&run_report());

        assert!(text.starts_with("#30: child of epic #5 status=Done children=3"));
        assert!(text.contains("  #30 updated In Progress -> Done"));
        assert!(text.contains("  #31 already Done"));
        assert!(text.contains("  #32 skipped (not_on_board)"));
        assert!(text.ends_with("updated=1 skipped=1"));
    }

    #[test]
    fn renders_idle_runs() {
        let mut report = run_report();
        report.epic = None;
        report.resolution = ResolutionKind::NoEpic;
        assert_eq!(render_run(&report), "#30: no epic, nothing to do");

        let mut report = run_report();
        report.epic_on_board = false;
        assert!(render_run(&report).contains("not on the project board"));
    }

    #[test]
    fn run_json_flattens_child_outcomes() {
        let json = to_json(&run_report()).expect("json");
        let value: Value = serde_json::from_str(&json).expect("valid json");

        assert_eq!(value["resolution"], "parent_epic");
        assert_eq!(value["children"][0]["outcome"], "updated");
        assert_eq!(value["children"][0]["from"], "In Progress");
        assert_eq!(value["children"][2]["kind"], "not_on_board");
    }

    #[test]
    fn renders_scan_with_epic_errors() {
        let report = ScanReport {
            items_seen: 4,
            epics: vec![
                EpicReport {
                    number: 1,
                    title: "Launch".to_string(),
                    status: Some("Backlog".to_string()),
                    children: vec![child(
                        2,
                        ChildOutcome::WouldUpdate {
                            from: Some("Todo".to_string()),
                            to: "Backlog".to_string(),
                        },
                    )],
                    error: None,
                },
                EpicReport {
                    number: 3,
                    title: "Gone".to_string(),
                    status: None,
                    children: Vec::new(),
                    error: Some("issue #3 not found".to_string()),
                },
            ],
            cancelled: true,
        };

        let text = render_scan(&report);
        assert!(text.contains("epic #1 Launch status=Backlog children=1"));
        assert!(text.contains("  #2 would update Todo -> Backlog"));
        assert!(text.contains("epic #3 Gone status=- children=0\n  skipped: issue #3 not found"));
        assert!(text.ends_with("items=4 epics=2 (cancelled)"));
    }

    #[test]
    fn renders_resolution() {
        let epic = Resolution::ParentEpic(Issue::new(5, "Launch", IssueType::Epic));
        assert_eq!(
            render_resolution(&ResolutionView::new(30, &epic)),
            "#30: child of epic #5 Launch"
        );
        assert_eq!(
            render_resolution(&ResolutionView::new(40, &Resolution::NoEpic)),
            "#40: no epic"
        );
    }

    #[test]
    fn compact_error_truncates_long_strings() {
        let compact = compact_error(&"a".repeat(200));
        assert!(compact.ends_with("..."));
        assert_eq!(compact.chars().count(), 123);
        assert_eq!(compact_error("line\nbreak"), "line break");
    }
}

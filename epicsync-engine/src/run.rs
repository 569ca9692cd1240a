use epicsync_domain::SyncContext;
use serde::Serialize;

use crate::{
    board::BoardClient,
    error::SyncResult,
    propagate::{ChildReport, PropagationOptions, PropagationReport, Propagator},
    resolver::{resolve_epic, ResolutionKind},
};

/// Outcome of one issue-triggered run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub trigger: u64,
    pub resolution: ResolutionKind,
    pub epic: Option<u64>,
    pub epic_on_board: bool,
    pub epic_status: Option<String>,
    pub children: Vec<ChildReport>,
    pub cancelled: bool,
}

impl RunReport {
    fn idle(context: &SyncContext, resolution: ResolutionKind) -> Self {
        Self {
            trigger: context.trigger,
            resolution,
            epic: context.epic.as_ref().map(|epic| epic.number),
            epic_on_board: false,
            epic_status: None,
            children: Vec::new(),
            cancelled: false,
        }
    }

    pub fn propagation(&self) -> PropagationReport {
        PropagationReport {
            children: self.children.clone(),
            cancelled: self.cancelled,
        }
    }
}

/// Resolves the epic for `trigger` and aligns its children. Resolver failures
/// end the run before any mutation.
pub fn sync_issue<B: BoardClient + ?Sized>(
    board: &B,
    trigger: u64,
    options: PropagationOptions,
) -> SyncResult<RunReport> {
    tracing::info!(issue = trigger, "processing issue");
    let mut context = SyncContext::new(trigger);

    let resolution = resolve_epic(board, trigger)?;
    context.epic = resolution.epic().cloned();
    let Some(epic) = context.epic.as_ref() else {
        return Ok(RunReport::idle(&context, resolution.kind()));
    };

    if board.get_project_item(epic.number)?.is_none() {
        tracing::warn!(epic = epic.number, "epic is not on the project board, skipping");
        return Ok(RunReport::idle(&context, resolution.kind()));
    }

    context.epic_status = board.get_current_status(epic.number)?;
    let report =
        Propagator::new(board, options).propagate(epic, context.epic_status.as_deref())?;

    Ok(RunReport {
        trigger,
        resolution: resolution.kind(),
        epic: Some(epic.number),
        epic_on_board: true,
        epic_status: context.epic_status,
        children: report.children,
        cancelled: report.cancelled,
    })
}

#[cfg(test)]
mod tests {
    use epicsync_domain::IssueType;

    use super::sync_issue;
    use crate::{
        error::SyncError, memory::InMemoryBoard, propagate::PropagationOptions,
        resolver::ResolutionKind,
    };

    #[test]
    fn backlog_epic_drags_children_back() {
        let board = InMemoryBoard::new();
        board.add_issue(10, "Epic", IssueType::Epic);
        board.place(10, Some("Backlog"));
        for (number, status) in [(11, "Todo"), (12, "Done")] {
            board.add_issue(number, "Child", IssueType::Task);
            board.link(10, number);
            board.place(number, Some(status));
        }

        let report = sync_issue(&board, 10, PropagationOptions::default()).expect("run");

        assert_eq!(report.resolution, ResolutionKind::SelfEpic);
        assert_eq!(report.epic_status.as_deref(), Some("Backlog"));
        assert_eq!(board.status_of(11).as_deref(), Some("Backlog"));
        assert_eq!(board.status_of(12).as_deref(), Some("Backlog"));

        sync_issue(&board, 10, PropagationOptions::default()).expect("second run");
        assert_eq!(board.writes().len(), 2);
    }

    #[test]
    fn in_progress_epic_promotes_backlog_child() {
        let board = InMemoryBoard::new();
        board.add_issue(20, "Epic", IssueType::Epic);
        board.place(20, Some("In Progress"));
        for (number, status) in [(21, "Backlog"), (22, "In Progress")] {
            board.add_issue(number, "Child", IssueType::Task);
            board.link(20, number);
            board.place(number, Some(status));
        }

        sync_issue(&board, 20, PropagationOptions::default()).expect("run");

        assert_eq!(board.status_of(21).as_deref(), Some("Todo"));
        assert_eq!(board.status_of(22).as_deref(), Some("In Progress"));
        assert_eq!(board.writes(), vec![(21, "Todo".to_string())]);
    }

    #[test]
    fn task_trigger_syncs_all_siblings_through_parent() {
        let board = InMemoryBoard::new();
        board.add_issue(5, "Epic", IssueType::Epic);
        board.place(5, Some("Done"));
        for (number, status) in [(30, "In Progress"), (31, "Backlog"), (32, "Todo")] {
            board.add_issue(number, "Child", IssueType::Task);
            board.link(5, number);
            board.place(number, Some(status));
        }

        let report = sync_issue(&board, 30, PropagationOptions::default()).expect("run");

        assert_eq!(report.resolution, ResolutionKind::ParentEpic);
        assert_eq!(report.epic, Some(5));
        for number in [30, 31, 32] {
            assert_eq!(board.status_of(number).as_deref(), Some("Done"));
        }
    }

    #[test]
    fn orphan_task_makes_no_mutations() {
        let board = InMemoryBoard::new();
        board.add_issue(40, "Orphan", IssueType::Task);
        board.place(40, Some("Backlog"));

        let report = sync_issue(&board, 40, PropagationOptions::default()).expect("run");

        assert_eq!(report.resolution, ResolutionKind::NoEpic);
        assert_eq!(report.epic, None);
        assert!(report.children.is_empty());
        assert_eq!(board.calls().status_writes, 0);
        assert_eq!(board.calls().children_pages, 0);
    }

    #[test]
    fn epic_off_the_board_is_skipped() {
        let board = InMemoryBoard::new();
        board.add_issue(50, "Epic", IssueType::Epic);
        board.add_issue(51, "Child", IssueType::Task);
        board.link(50, 51);
        board.place(51, Some("Backlog"));

        let report = sync_issue(&board, 50, PropagationOptions::default()).expect("run");

        assert!(!report.epic_on_board);
        assert!(report.children.is_empty());
        assert_eq!(board.status_of(51).as_deref(), Some("Backlog"));
    }

    #[test]
    fn unset_epic_status_still_promotes_backlog_children() {
        let board = InMemoryBoard::new();
        board.add_issue(60, "Epic", IssueType::Epic);
        board.place(60, None);
        board.add_issue(61, "Child", IssueType::Task);
        board.link(60, 61);
        board.place(61, Some("Backlog"));

        let report = sync_issue(&board, 60, PropagationOptions::default()).expect("run");

        assert_eq!(report.epic_status, None);
        assert_eq!(board.status_of(61).as_deref(), Some("Todo"));
    }

    #[test]
    fn dry_run_report_serializes_planned_updates() {
        let board = InMemoryBoard::new();
        board.add_issue(70, "Epic", IssueType::Epic);
        board.place(70, Some("Done"));
        board.add_issue(71, "Child", IssueType::Task);
        board.link(70, 71);
        board.place(71, Some("Todo"));

        let options = PropagationOptions {
            dry_run: true,
            ..PropagationOptions::default()
        };
        let report = sync_issue(&board, 70, options).expect("run");
        let value = serde_json::to_value(&report).expect("json");

        assert_eq!(value["resolution"], "self_epic");
        assert_eq!(value["children"][0]["outcome"], "would_update");
        assert_eq!(value["children"][0]["from"], "Todo");
        assert_eq!(value["children"][0]["to"], "Done");
        assert!(board.writes().is_empty());
    }

    #[test]
    fn unknown_trigger_aborts_before_mutation() {
        let board = InMemoryBoard::new();
        let error = sync_issue(&board, 404, PropagationOptions::default()).expect_err("missing");
        assert!(matches!(error, SyncError::NotFound { number: 404 }));
        assert!(board.writes().is_empty());
    }
}

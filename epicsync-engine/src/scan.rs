use serde::Serialize;

use crate::{
    board::BoardClient,
    error::{SyncError, SyncResult},
    propagate::{ChildReport, PropagationOptions, PropagationReport, Propagator},
};

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct EpicReport {
    pub number: u64,
    pub title: String,
    pub status: Option<String>,
    pub children: Vec<ChildReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl EpicReport {
    pub fn propagation(&self) -> PropagationReport {
        PropagationReport {
            children: self.children.clone(),
            cancelled: false,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ScanReport {
    pub items_seen: usize,
    pub epics: Vec<EpicReport>,
    pub cancelled: bool,
}

impl ScanReport {
    pub fn updated(&self) -> usize {
        self.epics
            .iter()
            .map(|epic| epic.propagation().updated())
            .sum()
    }

    /// Skipped children plus epics that failed as a whole.
    pub fn skipped(&self) -> usize {
        self.epics
            .iter()
            .map(|epic| epic.propagation().skipped() + usize::from(epic.error.is_some()))
            .sum()
    }
}

/// Walks every item on the board and propagates the status of each epic found
/// there, using the status reported by the listing itself.
pub fn sync_board<B: BoardClient + ?Sized>(
    board: &B,
    options: PropagationOptions,
) -> SyncResult<ScanReport> {
    let propagator = Propagator::new(board, options.clone());
    let mut report = ScanReport::default();

    for next in board.walk_board() {
        if options.is_cancelled() {
            report.cancelled = true;
            break;
        }
        let entry = next?;
        report.items_seen += 1;
        let Some(epic) = entry.issue.filter(|issue| issue.is_epic()) else {
            continue;
        };

        tracing::info!(epic = epic.number, "found epic on the board");
        let mut epic_report = EpicReport {
            number: epic.number,
            title: epic.title.clone(),
            status: entry.status.clone(),
            children: Vec::new(),
            error: None,
        };
        let propagation = propagator
            .propagate(&epic, entry.status.as_deref())
            .map_err(SyncError::unwrap_first_page);
        match propagation {
            Ok(propagation) => {
                epic_report.children = propagation.children;
                report.cancelled |= propagation.cancelled;
            }
            Err(error) if !error.is_fatal() => {
                tracing::warn!(epic = epic.number, %error, "skipping epic");
                epic_report.error = Some(error.to_string());
            }
            Err(error) => return Err(error),
        }
        report.epics.push(epic_report);
        if report.cancelled {
            break;
        }
    }

    tracing::info!(
        items = report.items_seen,
        epics = report.epics.len(),
        "board scan finished"
    );
    Ok(report)
}

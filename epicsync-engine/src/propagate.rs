use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc, Arc, Mutex, PoisonError,
    },
    thread,
};

use epicsync_domain::{next_status, Issue};
use serde::Serialize;

use crate::{
    board::BoardClient,
    error::{SyncError, SyncResult},
};

#[derive(Clone, Debug, Default)]
pub struct PropagationOptions {
    /// Children processed in parallel. Zero and one both mean sequential.
    pub workers: usize,
    pub dry_run: bool,
    pub cancel: Option<Arc<AtomicBool>>,
}

impl PropagationOptions {
    pub fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::SeqCst))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ChildOutcome {
    Updated { from: Option<String>, to: String },
    WouldUpdate { from: Option<String>, to: String },
    AlreadyAligned { status: String },
    Untouched { status: Option<String> },
    Skipped { kind: &'static str, reason: String },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ChildReport {
    pub number: u64,
    pub title: String,
    #[serde(flatten)]
    pub outcome: ChildOutcome,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct PropagationReport {
    pub children: Vec<ChildReport>,
    pub cancelled: bool,
}

impl PropagationReport {
    pub fn updated(&self) -> usize {
        self.count(|outcome| {
            matches!(
                outcome,
                ChildOutcome::Updated { .. } | ChildOutcome::WouldUpdate { .. }
            )
        })
    }

    pub fn skipped(&self) -> usize {
        self.count(|outcome| matches!(outcome, ChildOutcome::Skipped { .. }))
    }

    fn count(&self, predicate: impl Fn(&ChildOutcome) -> bool) -> usize {
        self.children
            .iter()
            .filter(|child| predicate(&child.outcome))
            .count()
    }
}

/// Applies the rule table to every child of an epic.
pub struct Propagator<'a, B: ?Sized> {
    board: &'a B,
    options: PropagationOptions,
}

impl<'a, B: BoardClient + ?Sized> Propagator<'a, B> {
    pub fn new(board: &'a B, options: PropagationOptions) -> Self {
        Self { board, options }
    }

    /// Children that fail with a per-issue error are reported as skipped and
    /// do not stop their siblings. Fatal errors end the propagation; updates
    /// already applied stay in place.
    pub fn propagate(
        &self,
        epic: &Issue,
        epic_status: Option<&str>,
    ) -> SyncResult<PropagationReport> {
        tracing::info!(
            epic = epic.number,
            status = epic_status.unwrap_or("<unset>"),
            dry_run = self.options.dry_run,
            "propagating epic status to sub-issues"
        );

        let report = if self.options.workers > 1 {
            self.propagate_parallel(epic, epic_status)?
        } else {
            self.propagate_sequential(epic, epic_status)?
        };

        tracing::info!(
            epic = epic.number,
            children = report.children.len(),
            updated = report.updated(),
            skipped = report.skipped(),
            cancelled = report.cancelled,
            "finished propagation"
        );
        Ok(report)
    }

    fn propagate_sequential(
        &self,
        epic: &Issue,
        epic_status: Option<&str>,
    ) -> SyncResult<PropagationReport> {
        let mut report = PropagationReport::default();
        let mut walker = self.board.walk_children(epic.number);

        loop {
            if self.options.is_cancelled() {
                report.cancelled = true;
                break;
            }
            let Some(next) = walker.next() else {
                break;
            };
            let child = next?;
            report.children.push(self.process_child(&child, epic_status)?);
        }

        Ok(report)
    }

    fn propagate_parallel(
        &self,
        epic: &Issue,
        epic_status: Option<&str>,
    ) -> SyncResult<PropagationReport> {
        let workers = self.options.workers;
        let abort = AtomicBool::new(false);
        let (work_tx, work_rx) = mpsc::sync_channel::<(usize, Issue)>(workers);
        let work_rx = Mutex::new(work_rx);
        let (result_tx, result_rx) = mpsc::channel::<(usize, SyncResult<ChildReport>)>();

        let (mut results, walk_error, cancelled) = thread::scope(|scope| {
            for _ in 0..workers {
                let work_rx = &work_rx;
                let abort = &abort;
                let result_tx = result_tx.clone();
                scope.spawn(move || loop {
                    let next = work_rx
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .recv();
                    let Ok((index, child)) = next else {
                        break;
                    };
                    if abort.load(Ordering::SeqCst) || self.options.is_cancelled() {
                        continue;
                    }
                    let result = self.process_child(&child, epic_status);
                    if result.is_err() {
                        abort.store(true, Ordering::SeqCst);
                    }
                    if result_tx.send((index, result)).is_err() {
                        break;
                    }
                });
            }
            drop(result_tx);

            let mut walk_error = None;
            let mut cancelled = false;
            for (index, next) in self.board.walk_children(epic.number).enumerate() {
                if abort.load(Ordering::SeqCst) {
                    break;
                }
                if self.options.is_cancelled() {
                    cancelled = true;
                    break;
                }
                match next {
                    Ok(child) => {
                        if work_tx.send((index, child)).is_err() {
                            break;
                        }
                    }
                    Err(error) => {
                        walk_error = Some(error);
                        break;
                    }
                }
            }
            drop(work_tx);

            let results = result_rx.iter().collect::<Vec<_>>();
            (results, walk_error, cancelled || self.options.is_cancelled())
        });

        results.sort_by_key(|(index, _)| *index);
        let mut report = PropagationReport {
            children: Vec::with_capacity(results.len()),
            cancelled,
        };
        for (_, result) in results {
            report.children.push(result?);
        }
        if let Some(error) = walk_error {
            return Err(error);
        }
        Ok(report)
    }

    fn process_child(&self, child: &Issue, epic_status: Option<&str>) -> SyncResult<ChildReport> {
        let outcome = match self.align_child(child, epic_status) {
            Ok(outcome) => outcome,
            Err(error) if !error.is_fatal() => {
                tracing::warn!(child = child.number, %error, "skipping sub-issue");
                ChildOutcome::Skipped {
                    kind: error.kind(),
                    reason: error.to_string(),
                }
            }
            Err(error) => return Err(error),
        };

        Ok(ChildReport {
            number: child.number,
            title: child.title.clone(),
            outcome,
        })
    }

    fn align_child(&self, child: &Issue, epic_status: Option<&str>) -> SyncResult<ChildOutcome> {
        let current = self.board.get_current_status(child.number)?;
        let Some(target) = next_status(epic_status, current.as_deref()) else {
            return Ok(ChildOutcome::Untouched { status: current });
        };

        if current.as_deref() == Some(target) {
            return Ok(ChildOutcome::AlreadyAligned {
                status: target.to_string(),
            });
        }

        if self.options.dry_run {
            let field = self.board.get_status_field_definition()?;
            if field.option(target).is_none() {
                return Err(SyncError::UnknownStatus {
                    status: target.to_string(),
                    available: field.option_names(),
                });
            }
            if current.is_none() && self.board.get_project_item(child.number)?.is_none() {
                return Err(SyncError::NotOnBoard {
                    number: child.number,
                });
            }
            tracing::info!(
                child = child.number,
                from = current.as_deref().unwrap_or("<unset>"),
                to = target,
                "would update sub-issue status"
            );
            return Ok(ChildOutcome::WouldUpdate {
                from: current,
                to: target.to_string(),
            });
        }

        self.board.set_status(child.number, target)?;
        tracing::info!(
            child = child.number,
            from = current.as_deref().unwrap_or("<unset>"),
            to = target,
            "updated sub-issue status"
        );
        Ok(ChildOutcome::Updated {
            from: current,
            to: target.to_string(),
        })
    }
}

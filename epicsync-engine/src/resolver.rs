use epicsync_domain::Issue;
use serde::Serialize;

use crate::{board::BoardClient, error::SyncResult};

/// Which epic, if any, a triggering issue belongs to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Resolution {
    SelfEpic(Issue),
    ParentEpic(Issue),
    NoEpic,
}

impl Resolution {
    pub fn epic(&self) -> Option<&Issue> {
        match self {
            Self::SelfEpic(issue) | Self::ParentEpic(issue) => Some(issue),
            Self::NoEpic => None,
        }
    }

    pub fn kind(&self) -> ResolutionKind {
        match self {
            Self::SelfEpic(_) => ResolutionKind::SelfEpic,
            Self::ParentEpic(_) => ResolutionKind::ParentEpic,
            Self::NoEpic => ResolutionKind::NoEpic,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionKind {
    SelfEpic,
    ParentEpic,
    NoEpic,
}

/// An epic resolves to itself without a parent lookup. Any other issue
/// resolves to its parent, whatever the parent's declared type.
pub fn resolve_epic<B: BoardClient + ?Sized>(board: &B, number: u64) -> SyncResult<Resolution> {
    let issue = board.get_issue(number)?;
    if issue.is_epic() {
        tracing::info!(issue = number, "issue is an epic, processing its sub-issues");
        return Ok(Resolution::SelfEpic(issue));
    }

    match board.get_parent(number)? {
        Some(parent) => {
            tracing::info!(
                issue = number,
                parent = parent.number,
                "issue has a parent, processing it as the epic"
            );
            Ok(Resolution::ParentEpic(parent))
        }
        None => {
            tracing::info!(issue = number, "issue is not an epic and has no parent");
            Ok(Resolution::NoEpic)
        }
    }
}

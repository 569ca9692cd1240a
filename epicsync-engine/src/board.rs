use epicsync_domain::{BoardEntry, Issue, IssueType, ProjectItem, StatusField};

use crate::{
    error::SyncResult,
    pagination::{Page, PageWalker},
};

/// Remote reads and writes against one configured project board.
///
/// Implementations are bound to a repository, a project and a status field at
/// construction. Every call may block on network I/O.
pub trait BoardClient: Send + Sync {
    /// Fails with `NotFound` when the issue does not exist in the repository.
    fn get_issue(&self, number: u64) -> SyncResult<Issue>;

    /// `None` when the issue has no parent.
    fn get_parent(&self, number: u64) -> SyncResult<Option<Issue>>;

    fn children_page(&self, number: u64, cursor: Option<&str>) -> SyncResult<Page<Issue>>;

    fn get_status_field_definition(&self) -> SyncResult<StatusField>;

    /// The issue's item on the configured board, ignoring items on other boards.
    fn get_project_item(&self, number: u64) -> SyncResult<Option<ProjectItem>>;

    /// `None` when the issue is not on the board or the field is unset.
    fn get_current_status(&self, number: u64) -> SyncResult<Option<String>>;

    /// Sets the status field to the option named `status`. Fails with
    /// `UnknownStatus` or `NotOnBoard`; writing the current value is allowed.
    fn set_status(&self, number: u64, status: &str) -> SyncResult<()>;

    fn board_items_page(&self, cursor: Option<&str>) -> SyncResult<Page<BoardEntry>>;

    fn get_issue_type(&self, number: u64) -> SyncResult<IssueType> {
        Ok(self.get_issue(number)?.issue_type)
    }

    fn walk_children(&self, number: u64) -> PageWalker<'_, Issue> {
        PageWalker::new(move |cursor| self.children_page(number, cursor))
    }

    fn get_children(&self, number: u64) -> SyncResult<Vec<Issue>> {
        self.walk_children(number).collect()
    }

    fn walk_board(&self) -> PageWalker<'_, BoardEntry> {
        PageWalker::new(move |cursor| self.board_items_page(cursor))
    }
}

//! A board held entirely in memory, with call counters and fault injection.
//! It backs the engine's tests and local experiments without a remote board.

use std::{
    collections::BTreeMap,
    sync::{Mutex, MutexGuard, PoisonError},
};

use epicsync_domain::{
    BoardEntry, Issue, IssueType, ProjectItem, StatusField, StatusOption, DEFAULT_STATUS_FIELD,
};

use crate::{
    board::BoardClient,
    error::{SyncError, SyncResult},
    pagination::Page,
};

const PROJECT_ID: &str = "PVT_memory";
const DEFAULT_PAGE_SIZE: usize = 50;
const DEFAULT_OPTIONS: [&str; 4] = ["Backlog", "Todo", "In Progress", "Done"];

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub issue_lookups: usize,
    pub parent_lookups: usize,
    pub children_pages: usize,
    pub field_lookups: usize,
    pub status_reads: usize,
    pub status_writes: usize,
    pub board_pages: usize,
}

#[derive(Default)]
struct State {
    issues: BTreeMap<u64, Issue>,
    parents: BTreeMap<u64, u64>,
    children: BTreeMap<u64, Vec<u64>>,
    statuses: BTreeMap<u64, Option<String>>,
    field: Option<StatusField>,
    calls: CallCounts,
    writes: Vec<(u64, String)>,
    read_faults: BTreeMap<u64, SyncError>,
    write_faults: BTreeMap<u64, SyncError>,
    children_faults: BTreeMap<u64, SyncError>,
    page_faults: BTreeMap<usize, SyncError>,
}

pub struct InMemoryBoard {
    page_size: usize,
    state: Mutex<State>,
}

impl Default for InMemoryBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBoard {
    pub fn new() -> Self {
        let board = Self {
            page_size: DEFAULT_PAGE_SIZE,
            state: Mutex::new(State::default()),
        };
        board.set_options(&DEFAULT_OPTIONS);
        board
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn set_options(&self, names: &[&str]) {
        let options = names
            .iter()
            .enumerate()
            .map(|(idx, name)| StatusOption {
                option_id: format!("opt-{idx}"),
                name: (*name).to_string(),
            })
            .collect();
        self.lock().field = Some(StatusField {
            field_id: "PVTSSF_memory".to_string(),
            name: DEFAULT_STATUS_FIELD.to_string(),
            options,
        });
    }

    pub fn add_issue(&self, number: u64, title: &str, issue_type: IssueType) {
        self.lock()
            .issues
            .insert(number, Issue::new(number, title, issue_type));
    }

    /// Adds `child` as a sub-issue of `parent`.
    pub fn link(&self, parent: u64, child: u64) {
        let mut state = self.lock();
        state.parents.insert(child, parent);
        state.children.entry(parent).or_default().push(child);
    }

    /// Puts the issue on the board with the given status value.
    pub fn place(&self, number: u64, status: Option<&str>) {
        self.lock()
            .statuses
            .insert(number, status.map(str::to_string));
    }

    pub fn fail_reads_for(&self, number: u64, error: SyncError) {
        self.lock().read_faults.insert(number, error);
    }

    pub fn fail_writes_for(&self, number: u64, error: SyncError) {
        self.lock().write_faults.insert(number, error);
    }

    /// Makes every sub-issue page of `number` fail.
    pub fn fail_children_for(&self, number: u64, error: SyncError) {
        self.lock().children_faults.insert(number, error);
    }

    /// Makes the fetch of page `index` (zero-based) of any listing fail.
    pub fn fail_page(&self, index: usize, error: SyncError) {
        self.lock().page_faults.insert(index, error);
    }

    pub fn status_of(&self, number: u64) -> Option<String> {
        self.lock().statuses.get(&number).cloned().flatten()
    }

    pub fn writes(&self) -> Vec<(u64, String)> {
        self.lock().writes.clone()
    }

    pub fn calls(&self) -> CallCounts {
        self.lock().calls.clone()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn page_of<T: Clone>(
        &self,
        state: &State,
        items: &[T],
        cursor: Option<&str>,
    ) -> SyncResult<Page<T>> {
        let offset = match cursor {
            None => 0,
            Some(raw) => raw
                .strip_prefix("offset:")
                .and_then(|value| value.parse::<usize>().ok())
                .ok_or_else(|| SyncError::Protocol(format!("invalid cursor '{raw}'")))?,
        };
        if let Some(error) = state.page_faults.get(&(offset / self.page_size)) {
            return Err(error.clone());
        }

        let end = (offset + self.page_size).min(items.len());
        let slice = items.get(offset..end).unwrap_or_default().to_vec();
        if end < items.len() {
            Ok(Page::more(slice, format!("offset:{end}")))
        } else {
            Ok(Page::last(slice))
        }
    }
}

impl BoardClient for InMemoryBoard {
    fn get_issue(&self, number: u64) -> SyncResult<Issue> {
        let mut state = self.lock();
        state.calls.issue_lookups += 1;
        state
            .issues
            .get(&number)
            .cloned()
            .ok_or(SyncError::NotFound { number })
    }

    fn get_parent(&self, number: u64) -> SyncResult<Option<Issue>> {
        let mut state = self.lock();
        state.calls.parent_lookups += 1;
        if !state.issues.contains_key(&number) {
            return Err(SyncError::NotFound { number });
        }
        Ok(state
            .parents
            .get(&number)
            .and_then(|parent| state.issues.get(parent))
            .cloned())
    }

    fn children_page(&self, number: u64, cursor: Option<&str>) -> SyncResult<Page<Issue>> {
        let mut state = self.lock();
        state.calls.children_pages += 1;
        if let Some(error) = state.children_faults.get(&number) {
            return Err(error.clone());
        }
        if !state.issues.contains_key(&number) {
            return Err(SyncError::NotFound { number });
        }
        let children = state
            .children
            .get(&number)
            .map(|numbers| {
                numbers
                    .iter()
                    .filter_map(|child| state.issues.get(child).cloned())
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        self.page_of(&state, &children, cursor)
    }

    fn get_status_field_definition(&self) -> SyncResult<StatusField> {
        let mut state = self.lock();
        state.calls.field_lookups += 1;
        state
            .field
            .clone()
            .ok_or_else(|| SyncError::Protocol("status field not defined".to_string()))
    }

    fn get_project_item(&self, number: u64) -> SyncResult<Option<ProjectItem>> {
        let state = self.lock();
        if !state.issues.contains_key(&number) {
            return Err(SyncError::NotFound { number });
        }
        Ok(state.statuses.contains_key(&number).then(|| ProjectItem {
            item_id: format!("PVTI_{number}"),
            project_id: PROJECT_ID.to_string(),
        }))
    }

    fn get_current_status(&self, number: u64) -> SyncResult<Option<String>> {
        let mut state = self.lock();
        state.calls.status_reads += 1;
        if let Some(error) = state.read_faults.get(&number) {
            return Err(error.clone());
        }
        if !state.issues.contains_key(&number) {
            return Err(SyncError::NotFound { number });
        }
        Ok(state.statuses.get(&number).cloned().flatten())
    }

    fn set_status(&self, number: u64, status: &str) -> SyncResult<()> {
        let mut state = self.lock();
        if let Some(error) = state.write_faults.get(&number) {
            return Err(error.clone());
        }
        let field = state
            .field
            .as_ref()
            .ok_or_else(|| SyncError::Protocol("status field not defined".to_string()))?;
        if field.option(status).is_none() {
            return Err(SyncError::UnknownStatus {
                status: status.to_string(),
                available: field.option_names(),
            });
        }
        if !state.issues.contains_key(&number) {
            return Err(SyncError::NotFound { number });
        }
        let Some(slot) = state.statuses.get_mut(&number) else {
            return Err(SyncError::NotOnBoard { number });
        };
        *slot = Some(status.to_string());
        state.calls.status_writes += 1;
        state.writes.push((number, status.to_string()));
        Ok(())
    }

    fn board_items_page(&self, cursor: Option<&str>) -> SyncResult<Page<BoardEntry>> {
        let mut state = self.lock();
        state.calls.board_pages += 1;
        let entries = state
            .statuses
            .iter()
            .map(|(number, status)| BoardEntry {
                item_id: format!("PVTI_{number}"),
                issue: state.issues.get(number).cloned(),
                status: status.clone(),
            })
            .collect::<Vec<_>>();
        self.page_of(&state, &entries, cursor)
    }
}

#[cfg(test)]
mod tests {
    use epicsync_domain::IssueType;

    use super::InMemoryBoard;
    use crate::{board::BoardClient, error::SyncError};

    fn board_with_children(count: u64) -> InMemoryBoard {
        let board = InMemoryBoard::new().with_page_size(2);
        board.add_issue(1, "Epic", IssueType::Epic);
        for number in 2..2 + count {
            board.add_issue(number, "Child", IssueType::Task);
            board.link(1, number);
        }
        board
    }

    #[test]
    fn pages_children_by_page_size() {
        let board = board_with_children(5);
        let children = board.get_children(1).expect("children");
        assert_eq!(
            children.iter().map(|issue| issue.number).collect::<Vec<_>>(),
            vec![2, 3, 4, 5, 6]
        );
        assert_eq!(board.calls().children_pages, 3);
    }

    #[test]
    fn rejects_unknown_status_before_writing() {
        let board = board_with_children(1);
        board.place(2, Some("Todo"));

        let error = board.set_status(2, "Shipped").expect_err("unknown status");
        assert!(matches!(
            error,
            SyncError::UnknownStatus { ref status, .. } if status == "Shipped"
        ));
        assert_eq!(board.status_of(2).as_deref(), Some("Todo"));
        assert!(board.writes().is_empty());
    }

    #[test]
    fn refuses_writes_for_issues_off_the_board() {
        let board = board_with_children(1);
        let error = board.set_status(2, "Todo").expect_err("not on board");
        assert!(matches!(error, SyncError::NotOnBoard { number: 2 }));
        assert_eq!(board.get_current_status(2).expect("status"), None);
        assert_eq!(board.get_project_item(2).expect("item"), None);
    }

    #[test]
    fn injected_page_fault_fails_the_walk() {
        let board = board_with_children(5);
        board.fail_page(1, SyncError::Transport("reset".to_string()));

        let result = board.get_children(1);
        assert!(matches!(
            result,
            Err(SyncError::Pagination { last_cursor: Some(ref cursor), .. }) if cursor == "offset:2"
        ));
    }
}

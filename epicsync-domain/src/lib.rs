pub mod rules;

pub use rules::{matching_rule, next_status, Rule, BACKLOG, DONE, RULES, TODO};

pub const DEFAULT_STATUS_FIELD: &str = "Status";
pub const DEFAULT_EPIC_TYPE: &str = "Epic";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IssueType {
    Epic,
    Task,
    Unknown,
}

impl IssueType {
    /// Maps a board issue-type name onto the two kinds the sync cares about.
    /// Any named type other than the epic type counts as a task.
    pub fn from_name(name: Option<&str>, epic_type: &str) -> Self {
        match name.map(str::trim).filter(|value| !value.is_empty()) {
            Some(value) if value.eq_ignore_ascii_case(epic_type.trim()) => Self::Epic,
            Some(_) => Self::Task,
            None => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Epic => "epic",
            Self::Task => "task",
            Self::Unknown => "unknown",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Issue {
    pub number: u64,
    pub title: String,
    pub issue_type: IssueType,
}

impl Issue {
    pub fn new(number: u64, title: impl Into<String>, issue_type: IssueType) -> Self {
        Self {
            number,
            title: title.into(),
            issue_type,
        }
    }

    pub fn is_epic(&self) -> bool {
        self.issue_type == IssueType::Epic
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProjectItem {
    pub item_id: String,
    pub project_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StatusOption {
    pub option_id: String,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StatusField {
    pub field_id: String,
    pub name: String,
    pub options: Vec<StatusOption>,
}

impl StatusField {
    /// Exact, case-sensitive match: option names are the status vocabulary.
    pub fn option(&self, name: &str) -> Option<&StatusOption> {
        self.options.iter().find(|option| option.name == name)
    }

    pub fn option_names(&self) -> Vec<String> {
        self.options.iter().map(|option| option.name.clone()).collect()
    }
}

/// One row of a board-wide item listing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BoardEntry {
    pub item_id: String,
    pub issue: Option<Issue>,
    pub status: Option<String>,
}

/// Ephemeral per-run state.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SyncContext {
    pub trigger: u64,
    pub epic: Option<Issue>,
    pub epic_status: Option<String>,
}

impl SyncContext {
    pub fn new(trigger: u64) -> Self {
        Self {
            trigger,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Issue, IssueType, StatusField, StatusOption};

    #[test]
    fn maps_issue_type_names() {
        assert_eq!(IssueType::from_name(Some("Epic"), "Epic"), IssueType::Epic);
        assert_eq!(IssueType::from_name(Some(" epic "), "Epic"), IssueType::Epic);
        assert_eq!(IssueType::from_name(Some("Bug"), "Epic"), IssueType::Task);
        assert_eq!(IssueType::from_name(Some(""), "Epic"), IssueType::Unknown);
        assert_eq!(IssueType::from_name(None, "Epic"), IssueType::Unknown);
        assert_eq!(
            IssueType::from_name(Some("Initiative"), "Initiative"),
            IssueType::Epic
        );
    }

    #[test]
    fn finds_status_options_by_exact_name() {
        let field = StatusField {
            field_id: "F1".to_string(),
            name: "Status".to_string(),
            options: vec![
                StatusOption {
                    option_id: "o1".to_string(),
                    name: "Backlog".to_string(),
                },
                StatusOption {
                    option_id: "o2".to_string(),
                    name: "Todo".to_string(),
                },
            ],
        };

        assert_eq!(field.option("Todo").map(|o| o.option_id.as_str()), Some("o2"));
        assert!(field.option("todo").is_none());
        assert_eq!(field.option_names(), vec!["Backlog", "Todo"]);
    }

    #[test]
    fn epic_detection_uses_issue_type() {
        assert!(Issue::new(1, "a", IssueType::Epic).is_epic());
        assert!(!Issue::new(2, "b", IssueType::Task).is_epic());
    }
}

pub const BACKLOG: &str = "Backlog";
pub const TODO: &str = "Todo";
pub const DONE: &str = "Done";

/// A guarded propagation rule. `guard` sees the epic status and the child
/// status; a match sets the child to `target`.
#[derive(Debug)]
pub struct Rule {
    pub name: &'static str,
    pub target: &'static str,
    guard: fn(Option<&str>, Option<&str>) -> bool,
}

impl Rule {
    pub fn matches(&self, epic: Option<&str>, child: Option<&str>) -> bool {
        (self.guard)(epic, child)
    }
}

/// Evaluated top to bottom, first match wins.
pub const RULES: &[Rule] = &[
    Rule {
        name: "epic-backlog",
        target: BACKLOG,
        guard: |epic, _| epic == Some(BACKLOG),
    },
    Rule {
        name: "epic-done",
        target: DONE,
        guard: |epic, _| epic == Some(DONE),
    },
    Rule {
        name: "promote-backlog-child",
        target: TODO,
        guard: |_, child| child == Some(BACKLOG),
    },
];

pub fn matching_rule(epic: Option<&str>, child: Option<&str>) -> Option<&'static Rule> {
    RULES.iter().find(|rule| rule.matches(epic, child))
}

/// Status a child should move to, or `None` to leave it untouched. The result
/// may equal the child's current status; callers skip those writes.
pub fn next_status(epic: Option<&str>, child: Option<&str>) -> Option<&'static str> {
    matching_rule(epic, child).map(|rule| rule.target)
}

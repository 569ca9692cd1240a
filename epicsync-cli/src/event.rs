use std::{
    env, fs,
    path::{Path, PathBuf},
};

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;

#[derive(Deserialize)]
struct EventPayload {
    issue: Option<EventIssue>,
}

#[derive(Deserialize)]
struct EventIssue {
    number: u64,
}

pub fn default_event_path() -> Option<PathBuf> {
    env::var_os("GITHUB_EVENT_PATH")
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
}

/// The explicit issue wins. Otherwise the issue comes from the event payload.
pub fn resolve_trigger(explicit: Option<u64>, event_path: Option<PathBuf>) -> Result<u64> {
    if let Some(number) = explicit {
        return Ok(number);
    }
    let path = event_path.ok_or_else(|| {
        anyhow!("no issue given: pass ISSUE, --event-path or set GITHUB_EVENT_PATH")
    })?;
    issue_from_event(&path)
}

pub fn issue_from_event(path: &Path) -> Result<u64> {
    let payload = fs::read_to_string(path)
        .with_context(|| format!("failed to read event payload {}", path.display()))?;
    parse_event(&payload).with_context(|| format!("in event payload {}", path.display()))
}

fn parse_event(payload: &str) -> Result<u64> {
    let event: EventPayload =
        serde_json::from_str(payload).with_context(|| "invalid event payload JSON")?;
    event
        .issue
        .map(|issue| issue.number)
        .ok_or_else(|| anyhow!("event payload has no issue.number"))
}

use std::{env, io, sync::OnceLock, time::Duration};

use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "epicsync=info,epicsync_engine=info,epicsync_github=info";

static TELEMETRY_ENABLED: OnceLock<bool> = OnceLock::new();

/// Logs go to stderr so stdout only carries the report.
pub fn init_logging() {
    let directives = filter_directives(env::var("EPICSYNC_LOG").ok(), env::var("RUST_LOG").ok());
    let filter = EnvFilter::try_new(&directives).unwrap_or_else(|error| {
        eprintln!("epicsync: ignoring invalid log filter '{directives}': {error}");
        EnvFilter::new(DEFAULT_FILTER)
    });
    // A subscriber may already be installed when embedded in tests.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

pub fn emit_success(op: &str, trigger: Option<u64>, elapsed: Duration, updated: usize) {
    if !telemetry_enabled() {
        return;
    }
    tracing::info!(
        target: "epicsync::telemetry",
        op,
        trigger = trigger.unwrap_or(0),
        status = "ok",
        duration_ms = elapsed.as_millis() as u64,
        updated,
        "telemetry"
    );
}

pub fn emit_failure(op: &str, trigger: Option<u64>, elapsed: Duration, error: &str) {
    if !telemetry_enabled() {
        return;
    }
    tracing::info!(
        target: "epicsync::telemetry",
        op,
        trigger = trigger.unwrap_or(0),
        status = "error",
        duration_ms = elapsed.as_millis() as u64,
        error,
        "telemetry"
    );
}

fn telemetry_enabled() -> bool {
    *TELEMETRY_ENABLED.get_or_init(|| {
        let value = env::var("EPICSYNC_TELEMETRY").unwrap_or_default();
        parse_bool_flag(value.as_str())
    })
}

fn filter_directives(epicsync_log: Option<String>, rust_log: Option<String>) -> String {
    [epicsync_log, rust_log]
        .into_iter()
        .flatten()
        .map(|value| value.trim().to_string())
        .find(|value| !value.is_empty())
        .unwrap_or_else(|| DEFAULT_FILTER.to_string())
}

fn parse_bool_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

use std::{
    path::Path,
    sync::{atomic::AtomicBool, Arc},
};

use anyhow::Result;
use epicsync_config::EpicSyncConfig;
use epicsync_engine::PropagationOptions;
use epicsync_github::GitHubBoard;

use crate::cli_args::RunArgs;

pub fn load_runtime(config_path: Option<&Path>) -> Result<(EpicSyncConfig, GitHubBoard)> {
    let config = EpicSyncConfig::load(config_path)?;
    config.validate()?;
    let board = GitHubBoard::from_config(&config)?;
    tracing::debug!(
        repository = %board.repository().full_name(),
        project = board.project_id(),
        "runtime ready"
    );
    Ok((config, board))
}

/// Flags override the configured worker count.
pub fn propagation_options(
    config: &EpicSyncConfig,
    run: &RunArgs,
    cancel: Arc<AtomicBool>,
) -> PropagationOptions {
    PropagationOptions {
        workers: run.workers.map_or(config.workers, usize::from).max(1),
        dry_run: run.dry_run,
        cancel: Some(cancel),
    }
}

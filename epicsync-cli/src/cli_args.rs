use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "epicsync", version)]
#[command(about = "Propagate epic status to sub-issues on a GitHub project board")]
pub struct Cli {
    /// Config file [default: $EPICSYNC_CONFIG_FILE or ~/.config/epicsync/config.yaml]
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Align the sub-issues of the epic behind one issue
    Sync(SyncArgs),
    /// Align the sub-issues of every epic on the board
    SyncAll(RunArgs),
    /// Show which epic an issue resolves to, without writing anything
    Resolve(ResolveArgs),
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Sync(_) => "sync",
            Self::SyncAll(_) => "sync-all",
            Self::Resolve(_) => "resolve",
        }
    }
}

#[derive(Debug, Args)]
pub struct SyncArgs {
    /// Triggering issue number; read from the event payload when omitted
    pub issue: Option<u64>,

    /// Actions event payload [default: $GITHUB_EVENT_PATH]
    #[arg(long, value_name = "PATH")]
    pub event_path: Option<PathBuf>,

    #[command(flatten)]
    pub run: RunArgs,
}

#[derive(Clone, Debug, Default, Args)]
pub struct RunArgs {
    /// Compute the plan without writing any status
    #[arg(long)]
    pub dry_run: bool,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,

    /// Exit with status 2 when any child was skipped
    #[arg(long)]
    pub strict: bool,

    /// Children processed in parallel [default: sync.workers]
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u16).range(1..=64))]
    pub workers: Option<u16>,
}

#[derive(Debug, Args)]
pub struct ResolveArgs {
    pub issue: u64,

    /// Print the resolution as JSON
    #[arg(long)]
    pub json: bool,
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use clap::{CommandFactory, Parser};

    use super::{Cli, Command};

    fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("epicsync").chain(args.iter().copied()))
    }

    #[test]
    fn definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_sync_with_flags() {
        let cli = parse(&["sync", "42", "--dry-run", "--json", "--workers", "4"]).expect("cli");
        let Command::Sync(args) = cli.command else {
            panic!("expected sync");
        };

        assert_eq!(args.issue, Some(42));
        assert!(args.run.dry_run);
        assert!(args.run.json);
        assert!(!args.run.strict);
        assert_eq!(args.run.workers, Some(4));
    }

    #[test]
    fn sync_issue_is_optional() {
        let cli = parse(&["sync", "--event-path", "/tmp/event.json"]).expect("cli");
        let Command::Sync(args) = cli.command else {
            panic!("expected sync");
        };

        assert_eq!(args.issue, None);
        assert_eq!(args.event_path.as_deref(), Some(Path::new("/tmp/event.json")));
    }

    #[test]
    fn config_flag_is_global() {
        let cli = parse(&["sync-all", "--config", "board.yaml", "--strict"]).expect("cli");
        assert_eq!(cli.config.as_deref(), Some(Path::new("board.yaml")));
        assert_eq!(cli.command.name(), "sync-all");
    }

    #[test]
    fn rejects_zero_workers() {
        assert!(parse(&["sync", "1", "--workers", "0"]).is_err());
    }

    #[test]
    fn resolve_requires_an_issue() {
        assert!(parse(&["resolve"]).is_err());
        let cli = parse(&["resolve", "7"]).expect("cli");
        assert!(matches!(cli.command, Command::Resolve(ref args) if args.issue == 7));
    }
}

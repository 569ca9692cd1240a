mod adapter;
mod cli_args;
mod event;
mod report;
mod telemetry;

use std::{
    process::ExitCode,
    sync::{atomic::AtomicBool, Arc},
    time::Instant,
};

use anyhow::{Context, Result};
use clap::Parser;
use epicsync_engine::{resolve_epic, sync_board, sync_issue};
use serde::Serialize;

use crate::{
    cli_args::{Cli, Command},
    report::ResolutionView,
};

const EXIT_FAILURE: u8 = 1;
const EXIT_SKIPPED: u8 = 2;
const EXIT_CANCELLED: u8 = 130;

/// What a finished command leaves behind for the exit status and telemetry.
#[derive(Debug, Default, PartialEq, Eq)]
struct Outcome {
    trigger: Option<u64>,
    updated: usize,
    skipped: usize,
    cancelled: bool,
    strict: bool,
}

impl Outcome {
    fn exit_code(&self) -> u8 {
        if self.cancelled {
            EXIT_CANCELLED
        } else if self.strict && self.skipped > 0 {
            EXIT_SKIPPED
        } else {
            0
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    telemetry::init_logging();

    let cancel = Arc::new(AtomicBool::new(false));
    if let Err(error) = install_signal_handlers(&cancel) {
        tracing::warn!(%error, "could not install signal handlers");
    }

    let op = cli.command.name();
    let started = Instant::now();
    let trigger = match command_trigger(&cli.command) {
        Ok(trigger) => trigger,
        Err(error) => return fail(op, None, started, &error),
    };
    match run(&cli, trigger, &cancel) {
        Ok(outcome) => {
            telemetry::emit_success(op, outcome.trigger, started.elapsed(), outcome.updated);
            if outcome.cancelled {
                tracing::warn!("run cancelled before every child was processed");
            }
            ExitCode::from(outcome.exit_code())
        }
        Err(error) => fail(op, trigger, started, &error),
    }
}

fn fail(op: &str, trigger: Option<u64>, started: Instant, error: &anyhow::Error) -> ExitCode {
    let message = format!("{error:#}");
    telemetry::emit_failure(op, trigger, started.elapsed(), &message);
    eprintln!("epicsync: {message}");
    ExitCode::from(EXIT_FAILURE)
}

/// The issue a command acts on, known before any remote call.
fn command_trigger(command: &Command) -> Result<Option<u64>> {
    match command {
        Command::Sync(args) => {
            let event_path = args.event_path.clone().or_else(event::default_event_path);
            event::resolve_trigger(args.issue, event_path).map(Some)
        }
        Command::SyncAll(_) => Ok(None),
        Command::Resolve(args) => Ok(Some(args.issue)),
    }
}

fn run(cli: &Cli, trigger: Option<u64>, cancel: &Arc<AtomicBool>) -> Result<Outcome> {
    match &cli.command {
        Command::Sync(args) => {
            let trigger = trigger.context("sync needs a triggering issue")?;
            let (config, board) = adapter::load_runtime(cli.config.as_deref())?;
            let options = adapter::propagation_options(&config, &args.run, Arc::clone(cancel));

            let run = sync_issue(&board, trigger, options)
                .with_context(|| format!("sync for issue #{trigger} failed"))?;
            print_report(args.run.json, &run, report::render_run)?;

            let propagation = run.propagation();
            Ok(Outcome {
                trigger: Some(trigger),
                updated: propagation.updated(),
                skipped: propagation.skipped(),
                cancelled: run.cancelled,
                strict: args.run.strict,
            })
        }
        Command::SyncAll(args) => {
            let (config, board) = adapter::load_runtime(cli.config.as_deref())?;
            let options = adapter::propagation_options(&config, args, Arc::clone(cancel));

            let scan = sync_board(&board, options).with_context(|| "board scan failed")?;
            print_report(args.json, &scan, report::render_scan)?;

            Ok(Outcome {
                trigger: None,
                updated: scan.updated(),
                skipped: scan.skipped(),
                cancelled: scan.cancelled,
                strict: args.strict,
            })
        }
        Command::Resolve(args) => {
            let (_, board) = adapter::load_runtime(cli.config.as_deref())?;
            let resolution = resolve_epic(&board, args.issue)
                .with_context(|| format!("could not resolve issue #{}", args.issue))?;
            let view = ResolutionView::new(args.issue, &resolution);
            print_report(args.json, &view, report::render_resolution)?;
            Ok(Outcome {
                trigger: Some(args.issue),
                ..Outcome::default()
            })
        }
    }
}

fn print_report<T: Serialize>(
    json: bool,
    value: &T,
    render: impl FnOnce(&T) -> String,
) -> Result<()> {
    let text = if json {
        report::to_json(value)?
    } else {
        render(value)
    };
    println!("{text}");
    Ok(())
}

/// The first signal asks the run to stop after in-flight children; a second
/// one exits immediately.
#[cfg(unix)]
fn install_signal_handlers(cancel: &Arc<AtomicBool>) -> std::io::Result<()> {
    use signal_hook::{
        consts::{SIGINT, SIGTERM},
        flag,
    };

    for signal in [SIGINT, SIGTERM] {
        flag::register_conditional_shutdown(
            signal,
            i32::from(EXIT_CANCELLED),
            Arc::clone(cancel),
        )?;
        flag::register(signal, Arc::clone(cancel))?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn install_signal_handlers(_cancel: &Arc<AtomicBool>) -> std::io::Result<()> {
    Ok(())
}

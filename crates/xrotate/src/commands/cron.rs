//! `cron`: repeat the pipeline on a fixed interval.

use xrotate_core::{CycleOutcome, Pipeline, ScannerBackend, Scheduler};

use crate::cli::{CronArgs, GlobalOpts};
use crate::config;
use crate::error::CliError;

pub async fn handle(args: CronArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let mut cfg = config::load(global)?;
    if let Some(minutes) = args.minutes {
        cfg.interval_minutes = minutes;
    }
    let pipeline_config = cfg.pipeline_config(true)?;
    let scanner = ScannerBackend::from_settings(&pipeline_config.scan)?;
    let scheduler = Scheduler::new(Pipeline::new(pipeline_config, scanner));

    let quiet = global.quiet;
    if !quiet {
        eprintln!(
            "Running every {} (Ctrl-C to stop)",
            humantime::format_duration(scheduler.interval())
        );
    }

    let result = scheduler
        .run_with(|outcome| match outcome {
            CycleOutcome::Completed(report) if !quiet => eprintln!(
                "[{}] cycle completed: {} kept, {} removed, {} added",
                report.finished_at.format("%Y-%m-%d %H:%M:%S"),
                report.update.preserved,
                report.update.removed,
                report.update.added
            ),
            CycleOutcome::Completed(_) => {}
            CycleOutcome::Faulted(message) => {
                eprintln!("cycle aborted by an internal fault, continuing: {message}");
            }
        })
        .await;

    match result {
        Ok(never) => match never {},
        Err(err) => Err(err.into()),
    }
}

// ── Periodic scheduler ──
//
// Runs the pipeline, sleeps the full interval, repeats. A cycle that
// panics is logged and the loop carries on; a cycle that reports an
// error ends the loop with that error. No overlap and no drift
// compensation: the next cycle starts one interval after the previous
// one finished.

use std::any::Any;
use std::convert::Infallible;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use futures_util::FutureExt;
use tracing::{error, info};

use crate::pipeline::{CycleReport, Pipeline, PipelineError};
use crate::scan::Scanner;

/// How a contained cycle ended.
#[derive(Debug)]
pub enum CycleOutcome {
    Completed(Box<CycleReport>),
    /// The cycle panicked; carries the panic message.
    Faulted(String),
}

pub struct Scheduler<S> {
    pipeline: Pipeline<S>,
    interval: Duration,
}

impl<S: Scanner> Scheduler<S> {
    /// Scheduler using the pipeline's configured interval.
    pub fn new(pipeline: Pipeline<S>) -> Self {
        let interval = pipeline.config().interval();
        Self { pipeline, interval }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn pipeline(&self) -> &Pipeline<S> {
        &self.pipeline
    }

    /// Run one cycle with panics contained.
    pub async fn run_cycle(&self) -> Result<CycleOutcome, PipelineError> {
        match AssertUnwindSafe(self.pipeline.run_once()).catch_unwind().await {
            Ok(Ok(report)) => Ok(CycleOutcome::Completed(Box::new(report))),
            Ok(Err(err)) => Err(err),
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!(panic = %message, "cycle panicked; continuing with the next cycle");
                Ok(CycleOutcome::Faulted(message))
            }
        }
    }

    /// Loop forever. Returns only when a cycle reports an error.
    pub async fn run(&self) -> Result<Infallible, PipelineError> {
        self.run_with(|_| {}).await
    }

    /// Like [`run`](Self::run), calling `on_cycle` after every contained
    /// cycle.
    pub async fn run_with<F>(&self, mut on_cycle: F) -> Result<Infallible, PipelineError>
    where
        F: FnMut(&CycleOutcome),
    {
        let every = humantime::format_duration(self.interval);
        info!(interval = %every, "scheduler started");
        loop {
            let outcome = self.run_cycle().await.inspect_err(|err| {
                error!(phase = %err.phase, error = %err.source, "cycle failed; stopping");
            })?;
            if let CycleOutcome::Completed(ref report) = outcome {
                info!(
                    added = report.update.added,
                    removed = report.update.removed,
                    preserved = report.update.preserved,
                    "cycle completed"
                );
            }
            on_cycle(&outcome);

            info!(next_in = %every, "sleeping until next cycle");
            tokio::time::sleep(self.interval).await;
        }
    }
}

/// Best-effort text of a panic payload.
fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panic_payloads_are_readable() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");
        let payload: Box<dyn Any + Send> = Box::new(String::from("owned boom"));
        assert_eq!(panic_message(payload.as_ref()), "owned boom");
        let payload: Box<dyn Any + Send> = Box::new(42_u8);
        assert_eq!(panic_message(payload.as_ref()), "non-string panic payload");
    }
}

//! Daily issuance timer.
//!
//! # Responsibility
//! - Invoke the on-due callback once at startup (restart catch-up).
//! - Invoke it again at every following local-midnight boundary.
//!
//! # Invariants
//! - At most one callback execution is in flight; the loop is single-threaded.
//! - A failed run is logged and never retried early; the next boundary (or a
//!   manual issuance call) is the next opportunity.
//! - A run is due whenever the clock's calendar date differs from the date
//!   of the last run. The next-midnight instant only bounds the sleep and is
//!   recomputed on every poll, so offset changes (DST) and wall-clock jumps
//!   cannot delay a day's run past the first poll of that day.
//! - The scheduler never forces rotation; it only calls what it is given.

use crate::clock::{Clock, IssueDate};
use chrono::{DateTime, FixedOffset};
use log::{error, info, warn};
use std::fmt::Display;
use std::io;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Longest single sleep; bounds drift between the monotonic timer and the
/// wall clock.
const MAX_SLEEP: Duration = Duration::from_secs(60 * 60);
const THREAD_NAME: &str = "presence-scheduler";

/// Outcome of one callback execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub date: IssueDate,
    pub succeeded: bool,
}

/// Result of one [`DailyScheduler::poll`] step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollOutcome {
    /// Present when the callback ran during this poll.
    pub fired: Option<RunReport>,
    /// How long the caller may sleep before polling again.
    pub wait: Duration,
}

/// Clock-driven daily trigger around an injectable callback.
pub struct DailyScheduler<F> {
    clock: Arc<dyn Clock>,
    on_due: F,
    last_run: Option<IssueDate>,
    next_due: Option<DateTime<FixedOffset>>,
}

impl<F, E> DailyScheduler<F>
where
    F: FnMut(IssueDate) -> Result<(), E>,
    E: Display,
{
    pub fn new(clock: Arc<dyn Clock>, on_due: F) -> Self {
        Self {
            clock,
            on_due,
            last_run: None,
            next_due: None,
        }
    }

    /// Instant of the next scheduled run; `None` before the startup run.
    pub fn next_due(&self) -> Option<DateTime<FixedOffset>> {
        self.next_due
    }

    /// Date of the most recent run, successful or not.
    pub fn last_run(&self) -> Option<IssueDate> {
        self.last_run
    }

    /// Runs the callback if today has not run yet and refreshes the wake-up
    /// instant.
    pub fn poll(&mut self) -> PollOutcome {
        let now = self.clock.now();
        let today = now.date_naive();

        let fired = if self.last_run != Some(today) {
            let succeeded = match (self.on_due)(today) {
                Ok(()) => {
                    info!("event=scheduler_run module=scheduler status=ok date={today}");
                    true
                }
                Err(err) => {
                    error!(
                        "event=scheduler_run module=scheduler status=error date={today} error={err}"
                    );
                    false
                }
            };
            self.last_run = Some(today);
            Some(RunReport {
                date: today,
                succeeded,
            })
        } else {
            None
        };

        let next = self.clock.next_boundary(now);
        if fired.is_some() {
            info!("event=scheduler_arm module=scheduler status=ok next_due={next}");
        }
        self.next_due = Some(next);

        let wait = (next - now)
            .to_std()
            .unwrap_or(Duration::ZERO)
            .min(MAX_SLEEP);

        PollOutcome { fired, wait }
    }

    /// Polls until a shutdown signal arrives or the sender is dropped.
    pub fn run(mut self, shutdown: mpsc::Receiver<()>) {
        info!("event=scheduler_start module=scheduler status=ok");
        loop {
            let outcome = self.poll();
            match shutdown.recv_timeout(outcome.wait) {
                Err(RecvTimeoutError::Timeout) => continue,
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        info!("event=scheduler_stop module=scheduler status=ok");
    }
}

impl<F, E> DailyScheduler<F>
where
    F: FnMut(IssueDate) -> Result<(), E> + Send + 'static,
    E: Display,
{
    /// Moves the scheduler onto a dedicated thread.
    pub fn spawn(self) -> io::Result<SchedulerHandle> {
        let (shutdown, receiver) = mpsc::channel();
        let thread = thread::Builder::new()
            .name(THREAD_NAME.to_string())
            .spawn(move || self.run(receiver))?;
        Ok(SchedulerHandle { shutdown, thread })
    }
}

/// Owner handle of a spawned scheduler thread.
pub struct SchedulerHandle {
    shutdown: Sender<()>,
    thread: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Signals the loop to stop and waits for it.
    pub fn shutdown(self) {
        // A send error means the loop already exited.
        let _ = self.shutdown.send(());
        self.join();
    }

    /// Blocks until the scheduler thread exits.
    pub fn join(self) {
        if self.thread.join().is_err() {
            warn!("event=scheduler_stop module=scheduler status=error error=thread_panicked");
        }
    }
}

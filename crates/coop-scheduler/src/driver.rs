use thiserror::Error;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::clock::{VirtualTime, saturating_secs};
use crate::config::DriverConfig;
use crate::event::EventName;
use crate::scheduler::{Scheduler, SchedulerStats};

/// Commands delivered to a running driver from any thread
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverCommand {
    /// Resume every task waiting on the event
    Signal(EventName),
    /// Stop the driver loop after the current command
    Shutdown,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DriverError {
    #[error("frame driver has stopped")]
    Closed,
}

/// Thread-safe handle for feeding a [`FrameDriver`]
///
/// All scheduler entry points coming from other threads go through this
/// channel, so the scheduler itself is only ever touched by the driver loop.
#[derive(Debug, Clone)]
pub struct DriverHandle {
    tx: UnboundedSender<DriverCommand>,
}

impl DriverHandle {
    /// Ask the driver to signal `name` on the scheduler thread
    pub fn signal(&self, name: impl Into<EventName>) -> Result<(), DriverError> {
        self.send(DriverCommand::Signal(name.into()))
    }

    pub fn shutdown(&self) -> Result<(), DriverError> {
        self.send(DriverCommand::Shutdown)
    }

    pub fn send(&self, command: DriverCommand) -> Result<(), DriverError> {
        self.tx.send(command).map_err(|_| DriverError::Closed)
    }
}

/// What a driver run did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriverSummary {
    pub ticks: u64,
    pub signals: u64,
    pub now: VirtualTime,
    pub stats: SchedulerStats,
}

/// Advances a scheduler once per tick and applies commands between ticks
pub struct FrameDriver {
    scheduler: Scheduler,
    config: DriverConfig,
    tx: UnboundedSender<DriverCommand>,
    rx: UnboundedReceiver<DriverCommand>,
}

impl FrameDriver {
    pub fn new(scheduler: Scheduler, config: DriverConfig) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            scheduler,
            config,
            tx,
            rx,
        }
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn handle(&self) -> DriverHandle {
        DriverHandle {
            tx: self.tx.clone(),
        }
    }

    /// Run until shut down or until `max_ticks` ticks have been processed
    ///
    /// Each tick advances the scheduler by the wall-clock time measured since
    /// the previous tick, scaled by `time_scale`. The future is not `Send`; run it
    /// on a current-thread runtime or a `LocalSet`.
    pub async fn run(mut self) -> DriverSummary {
        let tick_interval = self.config.tick_interval();
        let time_scale = self.config.effective_time_scale();
        let max_ticks = self.config.max_ticks;

        let mut interval = tokio::time::interval(tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut last_tick = Instant::now();
        let mut ticks = 0_u64;
        let mut signals = 0_u64;

        info!(
            target: "driver",
            "Frame driver started ({}ms ticks, time scale {})",
            tick_interval.as_millis(),
            time_scale
        );

        loop {
            if max_ticks.is_some_and(|max| ticks >= max) {
                debug!(target: "driver", "Reached {} ticks, stopping", ticks);
                break;
            }

            tokio::select! {
                biased;

                Some(command) = self.rx.recv() => match command {
                    DriverCommand::Signal(name) => {
                        let resumed = self.scheduler.signal(name.clone());
                        signals += 1;
                        debug!(target: "driver", "Signal '{}' resumed {} task(s)", name, resumed);
                    }
                    DriverCommand::Shutdown => {
                        info!(target: "driver", "Shutdown requested");
                        break;
                    }
                },

                now = interval.tick() => {
                    let elapsed = now.duration_since(last_tick);
                    last_tick = now;
                    let step = saturating_secs(elapsed.as_secs_f64() * time_scale);
                    self.scheduler.advance(step);
                    ticks += 1;
                }
            }
        }

        let stats = self.scheduler.stats();
        info!(
            target: "driver",
            "Frame driver stopped after {} tick(s) at {} ({} live, {} sleeping, {} waiting)",
            ticks,
            stats.now,
            stats.live,
            stats.sleeping,
            stats.waiting
        );

        DriverSummary {
            ticks,
            signals,
            now: stats.now,
            stats,
        }
    }
}

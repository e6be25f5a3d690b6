//! # Periodic Tick Scheduler
//!
//! Spawns one tokio task per periodic concern. Each task sends a [`Tick`]
//! over a shared `mpsc` channel at its interval; the survey loop owns the
//! receiver and all survey state, so ticks never touch state themselves.
//!
//! Every task watches its own cancellation signal. [`Scheduler::cancel_all`]
//! signals and then awaits every task, so no stale tick can arrive from a
//! previous session once it returns.

use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, warn};

/// Capacity of the tick channel
pub const TICK_BUFFER: usize = 32;

/// What a tick is for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TickKind {
    /// Duration/status display
    Status,
    /// Recompute and publish the survey summary
    Refresh,
    /// Save the session document
    Autosave,
    /// Resynchronise with Iridium network time
    TimeSync,
}

/// One timer expiry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tick {
    pub kind: TickKind,
}

/// A running periodic task
#[derive(Debug)]
pub struct ScheduledTask {
    kind: TickKind,
    period: Duration,
    cancel: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl ScheduledTask {
    pub fn kind(&self) -> TickKind {
        self.kind
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Signal the task and wait for it to exit
    pub async fn cancel(self) {
        let _ = self.cancel.send(true);
        if let Err(e) = self.handle.await {
            warn!("{:?} timer ended abnormally: {}", self.kind, e);
        }
    }
}

/// Owner of all periodic tasks
#[derive(Debug)]
pub struct Scheduler {
    tx: mpsc::Sender<Tick>,
    tasks: Vec<ScheduledTask>,
}

impl Scheduler {
    /// Create a scheduler and the receiver its ticks arrive on
    pub fn new() -> (Self, mpsc::Receiver<Tick>) {
        let (tx, rx) = mpsc::channel(TICK_BUFFER);
        (
            Self {
                tx,
                tasks: Vec::new(),
            },
            rx,
        )
    }

    /// Start a periodic task; an existing task of the same kind is stopped first
    ///
    /// The first tick fires one `period` after the call.
    pub async fn start(&mut self, kind: TickKind, period: Duration) {
        if let Some(pos) = self.tasks.iter().position(|t| t.kind == kind) {
            self.tasks.swap_remove(pos).cancel().await;
        }

        let (cancel, mut cancelled) = watch::channel(false);
        let tx = self.tx.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;

                    // Err means the scheduler side was dropped
                    changed = cancelled.changed() => {
                        if changed.is_err() || *cancelled.borrow() {
                            break;
                        }
                    }

                    _ = ticker.tick() => {
                        if tx.send(Tick { kind }).await.is_err() {
                            break;
                        }
                    }
                }
            }
            debug!("{:?} timer stopped", kind);
        });

        debug!("{:?} timer started every {:?}", kind, period);
        self.tasks.push(ScheduledTask {
            kind,
            period,
            cancel,
            handle,
        });
    }

    pub fn is_running(&self, kind: TickKind) -> bool {
        self.tasks.iter().any(|t| t.kind == kind)
    }

    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    /// Stop every task and wait until all have exited
    pub async fn cancel_all(&mut self) {
        for task in self.tasks.drain(..) {
            task.cancel().await;
        }
    }
}

//! Button Stream Reader
//!
//! Blocking loop over the raw event device. One fixed-size record per read,
//! decoded into [`ButtonEvent`]s and queued for the consumer in arrival order.
//!
//! Read policy:
//! - wrong-size read: logged, skipped
//! - `EINTR`: the same read is retried
//! - any other error while running: the loop dies, only this subsystem stops
//! - any error after shutdown was requested: normal stop (the descriptor was revoked)

use std::io;
use std::sync::Arc;

use chrono::Local;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, error, info, trace, warn};

use crate::controller::buttons::{decode, ButtonEvent};
use crate::controller::device_locator::EventSource;
use crate::controller::lifecycle::{RunState, SubsystemHealth, WorkerStatus};
use crate::controller::raw_event::{RawEventRecord, RECORD_SIZE};

const STATS_WINDOW_SECS: i64 = 10;

#[derive(Debug)]
pub enum ReaderExit {
    /// Shutdown was observed
    Stopped,
    /// Unrecoverable read failure
    Failed(io::Error),
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReaderStats {
    pub records: u64,
    pub emitted: u64,
    pub malformed: u64,
    pub interrupted: u64,
    pub dropped: u64,
}

pub struct ButtonReader {
    source: Arc<dyn EventSource>,
    run_state: Arc<RunState>,
    health: Arc<SubsystemHealth>,
    events: mpsc::Sender<ButtonEvent>,
    stats: ReaderStats,
}

impl ButtonReader {
    pub fn new(
        source: Arc<dyn EventSource>,
        run_state: Arc<RunState>,
        health: Arc<SubsystemHealth>,
        events: mpsc::Sender<ButtonEvent>,
    ) -> Self {
        Self {
            source,
            run_state,
            health,
            events,
            stats: ReaderStats::default(),
        }
    }

    /// Runs until shutdown or an unrecoverable read error. Blocks the calling thread.
    pub fn run(mut self) -> (ReaderExit, ReaderStats) {
        info!("Button monitoring loop started on {}", self.source.path().display());
        self.health.button_reader.set(WorkerStatus::Running);

        let exit = self.read_loop();

        match &exit {
            ReaderExit::Stopped => {
                self.health.button_reader.set(WorkerStatus::Stopped);
                info!("Button monitoring loop ended");
            }
            ReaderExit::Failed(e) => {
                self.health.button_reader.set(WorkerStatus::Died);
                error!("Button monitoring loop died: {}", e);
            }
        }
        debug!("Button reader stats: {:?}", self.stats);

        (exit, self.stats)
    }

    fn read_loop(&mut self) -> ReaderExit {
        let mut buf = [0u8; RECORD_SIZE];
        let mut window_start = Local::now();
        let mut window_emitted = 0u64;

        loop {
            if !self.run_state.is_running() {
                return ReaderExit::Stopped;
            }

            match self.source.read_record(&mut buf) {
                Ok(0) => {
                    if !self.run_state.is_running() {
                        return ReaderExit::Stopped;
                    }
                    return ReaderExit::Failed(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "event device closed",
                    ));
                }
                Ok(n) if n == RECORD_SIZE => {
                    self.stats.records += 1;
                    if let Some(record) = RawEventRecord::parse(&buf[..n]) {
                        if self.handle_record(&record) {
                            window_emitted += 1;
                        }
                    }
                }
                Ok(n) => {
                    self.stats.malformed += 1;
                    warn!("Unexpected event size: {} bytes (expected {})", n, RECORD_SIZE);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {
                    self.stats.interrupted += 1;
                    trace!("Read interrupted, retrying");
                }
                Err(e) => {
                    if !self.run_state.is_running() {
                        debug!("Read returned {} after shutdown request", e);
                        return ReaderExit::Stopped;
                    }
                    return ReaderExit::Failed(e);
                }
            }

            let now = Local::now();
            if (now - window_start).num_seconds() >= STATS_WINDOW_SECS {
                info!(
                    "Button reader stats: emitted {} events in last {} seconds",
                    window_emitted, STATS_WINDOW_SECS
                );
                window_emitted = 0;
                window_start = now;
            }
        }
    }

    // Returns true when an event was queued
    fn handle_record(&mut self, record: &RawEventRecord) -> bool {
        let Some(event) = decode(record) else {
            return false;
        };

        debug!(
            "Button event: {} {} (code {})",
            event.button.label(),
            event.edge.label(),
            event.raw_code
        );

        match self.events.try_send(event) {
            Ok(()) => {
                self.stats.emitted += 1;
                true
            }
            Err(TrySendError::Full(event)) => {
                self.stats.dropped += 1;
                warn!("Button queue full, dropping {:?}", event);
                false
            }
            Err(TrySendError::Closed(event)) => {
                self.stats.dropped += 1;
                debug!("No button consumer, discarding {:?}", event);
                false
            }
        }
    }
}

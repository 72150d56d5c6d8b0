//! Shared run-state flags
//!
//! [`RunState`] is the single atomic both workers poll once per iteration.
//! [`SubsystemHealth`] reports whether each worker is still alive.

use std::sync::atomic::{AtomicU8, Ordering};

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Uninitialized = 0,
    Initializing = 1,
    Running = 2,
    ShuttingDown = 3,
    Stopped = 4,
}

impl Lifecycle {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Lifecycle::Uninitialized,
            1 => Lifecycle::Initializing,
            2 => Lifecycle::Running,
            3 => Lifecycle::ShuttingDown,
            _ => Lifecycle::Stopped,
        }
    }
}

/// Supervisor lifecycle. Once `ShuttingDown` is reached, `Running` is never re-entered.
#[derive(Debug)]
pub struct RunState(AtomicU8);

impl Default for RunState {
    fn default() -> Self {
        Self(AtomicU8::new(Lifecycle::Uninitialized as u8))
    }
}

impl RunState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(&self) -> Lifecycle {
        Lifecycle::from_u8(self.0.load(Ordering::Acquire))
    }

    pub fn is_running(&self) -> bool {
        self.load() == Lifecycle::Running
    }

    /// Compare-and-swap transition. Returns the observed state on failure.
    pub fn transition(&self, from: Lifecycle, to: Lifecycle) -> Result<(), Lifecycle> {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(Lifecycle::from_u8)
    }

    /// Moves to `ShuttingDown` (or straight to `Stopped` when nothing was ever
    /// initialized). Returns `true` only for the call that performed the change.
    ///
    /// Lock-free and allocation-free.
    pub fn begin_shutdown(&self) -> bool {
        let mut current = self.0.load(Ordering::Acquire);
        loop {
            let next = match Lifecycle::from_u8(current) {
                Lifecycle::Uninitialized => Lifecycle::Stopped,
                Lifecycle::Initializing | Lifecycle::Running => Lifecycle::ShuttingDown,
                Lifecycle::ShuttingDown | Lifecycle::Stopped => return false,
            };
            match self.0.compare_exchange_weak(
                current,
                next as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(observed) => current = observed,
            }
        }
    }

    pub(crate) fn reset_uninitialized(&self) {
        let _ = self.transition(Lifecycle::Initializing, Lifecycle::Uninitialized);
    }

    pub(crate) fn mark_stopped(&self) {
        self.0.store(Lifecycle::Stopped as u8, Ordering::Release);
    }
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerStatus {
    Idle = 0,
    Running = 1,
    Stopped = 2,
    Died = 3,
}

#[derive(Debug, Default)]
pub struct WorkerFlag(AtomicU8);

impl WorkerFlag {
    pub fn get(&self) -> WorkerStatus {
        match self.0.load(Ordering::Acquire) {
            0 => WorkerStatus::Idle,
            1 => WorkerStatus::Running,
            2 => WorkerStatus::Stopped,
            _ => WorkerStatus::Died,
        }
    }

    pub fn set(&self, status: WorkerStatus) {
        self.0.store(status as u8, Ordering::Release);
    }
}

/// "This subsystem stopped" signal for both workers
#[derive(Debug, Default)]
pub struct SubsystemHealth {
    pub button_reader: WorkerFlag,
    pub axis_poller: WorkerFlag,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shutdown_never_returns_to_running() {
        let state = RunState::new();
        state.transition(Lifecycle::Uninitialized, Lifecycle::Initializing).unwrap();
        state.transition(Lifecycle::Initializing, Lifecycle::Running).unwrap();
        assert!(state.is_running());

        assert!(state.begin_shutdown());
        assert!(!state.begin_shutdown());
        assert_eq!(state.load(), Lifecycle::ShuttingDown);
        assert_eq!(
            state.transition(Lifecycle::Initializing, Lifecycle::Running),
            Err(Lifecycle::ShuttingDown)
        );
        assert!(!state.is_running());
    }

    #[test]
    fn shutdown_before_initialize_stops_directly() {
        let state = RunState::new();
        assert!(state.begin_shutdown());
        assert_eq!(state.load(), Lifecycle::Stopped);
    }

    #[test]
    fn reset_only_applies_while_initializing() {
        let state = RunState::new();
        state.transition(Lifecycle::Uninitialized, Lifecycle::Initializing).unwrap();
        state.reset_uninitialized();
        assert_eq!(state.load(), Lifecycle::Uninitialized);

        state.mark_stopped();
        state.reset_uninitialized();
        assert_eq!(state.load(), Lifecycle::Stopped);
    }

    #[test]
    fn worker_flag_defaults_to_idle() {
        let health = SubsystemHealth::default();
        assert_eq!(health.button_reader.get(), WorkerStatus::Idle);
        health.axis_poller.set(WorkerStatus::Died);
        assert_eq!(health.axis_poller.get(), WorkerStatus::Died);
    }
}

//! Error definitions for the controller subsystem

use std::path::PathBuf;

use crate::controller::joystick::StickAxis;

/// No candidate event device could be opened
#[derive(Debug, thiserror::Error)]
pub enum LocateError {
    #[error("could not find any working input device (tried {tried:?})")]
    NotFound { tried: Vec<PathBuf> },
}

/// Errors raised by a joystick backend
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum JoystickError {
    /// The joystick subsystem itself failed to come up
    #[error("joystick subsystem initialization failed: {0}")]
    Init(String),

    /// Subsystem is up but no device is attached
    #[error("no joysticks detected")]
    NoDevice,

    #[error("failed to open joystick: {0}")]
    Open(String),

    #[error("joystick subsystem not initialized")]
    NotInitialized,

    #[error("joystick disconnected")]
    Disconnected,

    #[error("failed to read axis {axis:?}: {reason}")]
    Read { axis: StickAxis, reason: String },
}

/// Aggregated errors of the controller supervisor
#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    /// Button subsystem could not find a device
    #[error("input device error: {0}")]
    Locate(#[from] LocateError),

    /// Axis subsystem could not be brought up
    #[error("joystick error: {0}")]
    Joystick(#[from] JoystickError),

    /// API misuse, e.g. `run()` before `initialize()`
    #[error("contract violation: {0}")]
    ContractViolation(String),

    /// Shutdown was requested before initialization finished
    #[error("shutdown requested during initialization")]
    ShutdownInProgress,

    /// A worker task could not be joined
    #[error("worker error: {0}")]
    Worker(String),
}

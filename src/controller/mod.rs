//! Controller subsystem for pad input acquisition
//!
//! Two independent acquisition loops feed one supervisor:
//!
//! 1. [`button_reader`] - blocking reads of raw `input_event` records
//! 2. [`axis_poller`] - fixed-interval joystick polling and normalization
//! 3. [`supervisor`] - initialization, worker lifecycle and shutdown
//!
//! # Architecture
//!
//! ```text
//! /dev/input/eventN ──► Device Locator ──► Button Reader ──► mpsc<ButtonEvent>
//!                                                    ▲
//!                                          Supervisor (RunState)
//!                                                    ▼
//! Joystick provider ─────────────────────► Axis Poller ───► ControlSignalCell
//! ```
//!
//! Button events are a FIFO stream; the control signal is a snapshot that
//! consumers poll. No ordering exists between the two.

pub mod active;
pub mod axis;
pub mod axis_poller;
pub mod button_reader;
pub mod buttons;
pub mod device_locator;
pub mod error;
pub mod joystick;
pub mod lifecycle;
pub mod raw_event;
pub mod supervisor;

pub use active::{clear_active, register_active, trigger_active_shutdown};
pub use axis::{AxisNormalizer, AxisSample, ControlSignal, ControlSignalCell};
pub use buttons::{ButtonEvent, ButtonName, Edge};
pub use device_locator::{DeviceLocator, DeviceOpener, EvdevOpener, EventSource, LocatedDevice};
pub use error::{ControllerError, JoystickError, LocateError};
pub use joystick::{GilrsProvider, JoystickProvider, StickAxis};
pub use lifecycle::{Lifecycle, WorkerStatus};
pub use supervisor::{ControllerSupervisor, RunReport, ShutdownTrigger, WorkerOutcome};

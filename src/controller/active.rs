//! Process-wide "active supervisor" slot
//!
//! Lets an external shutdown source (signal listener, timer) reach the running
//! supervisor without holding a reference to it. Single writer: the binary
//! registers once at startup and clears once after `run()` returns.

use std::sync::{Mutex, PoisonError};

use tracing::{debug, warn};

use crate::controller::error::ControllerError;
use crate::controller::supervisor::ShutdownTrigger;

static ACTIVE: Mutex<Option<ShutdownTrigger>> = Mutex::new(None);

pub fn register_active(trigger: ShutdownTrigger) -> Result<(), ControllerError> {
    let mut active = ACTIVE.lock().unwrap_or_else(PoisonError::into_inner);
    if active.is_some() {
        return Err(ControllerError::ContractViolation(
            "a supervisor is already registered".into(),
        ));
    }
    *active = Some(trigger);
    debug!("Active supervisor registered");
    Ok(())
}

/// Returns `true` if a supervisor was registered.
pub fn clear_active() -> bool {
    let cleared = ACTIVE
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .take()
        .is_some();
    if cleared {
        debug!("Active supervisor cleared");
    }
    cleared
}

/// Requests shutdown of the registered supervisor, if any.
pub fn trigger_active_shutdown() -> bool {
    let trigger = ACTIVE
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .clone();

    match trigger {
        Some(trigger) => {
            trigger.request();
            true
        }
        None => {
            warn!("Shutdown requested but no supervisor is registered");
            false
        }
    }
}

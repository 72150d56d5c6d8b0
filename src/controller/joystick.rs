//! Joystick provider boundary and the gilrs backend
//!
//! The axis poller only talks to [`JoystickProvider`]. A backend must be able to
//! bring its subsystem up, enumerate and open the first device, refresh its
//! internal state, report a raw axis and tear everything down again.

use std::fmt;
use std::sync::{Arc, Mutex};

use gilrs::{Axis, Event, EventType, GamepadId, Gilrs, GilrsBuilder};
use tracing::{debug, error, info, trace, warn};

use crate::controller::axis::{AxisSample, AXIS_MAX};
use crate::controller::error::JoystickError;

/// Sticks read by the poller. Indices follow the usual joystick numbering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StickAxis {
    LeftX,
    LeftY,
    RightX,
}

impl StickAxis {
    pub fn index(self) -> u8 {
        match self {
            StickAxis::LeftX => 0,
            StickAxis::LeftY => 1,
            StickAxis::RightX => 2,
        }
    }

    fn is_vertical(self) -> bool {
        matches!(self, StickAxis::LeftY)
    }

    fn gilrs_axis(self) -> Axis {
        match self {
            StickAxis::LeftX => Axis::LeftStickX,
            StickAxis::LeftY => Axis::LeftStickY,
            StickAxis::RightX => Axis::RightStickX,
        }
    }
}

/// Capability interface over a joystick library
pub trait JoystickProvider: Send + fmt::Debug {
    fn init_subsystem(&mut self) -> Result<(), JoystickError>;

    fn device_count(&self) -> usize;

    /// Opens device index 0 and returns its name
    fn open_first(&mut self) -> Result<String, JoystickError>;

    /// Drains pending library events so axis state stays fresh
    fn pump_events(&mut self);

    /// Raw axis value, forward/up negative on vertical axes
    fn axis(&self, axis: StickAxis) -> Result<i16, JoystickError>;

    fn close_device(&mut self);

    fn teardown(&mut self);

    fn read_sample(&self) -> Result<AxisSample, JoystickError> {
        Ok(AxisSample {
            left_y: self.axis(StickAxis::LeftY)?,
            right_x: self.axis(StickAxis::RightX)?,
            left_x: self.axis(StickAxis::LeftX)?,
        })
    }
}

/// Joystick handle shared between the supervisor (owner) and the axis poller
pub type SharedJoystick = Arc<Mutex<Box<dyn JoystickProvider>>>;

pub fn shared(provider: Box<dyn JoystickProvider>) -> SharedJoystick {
    Arc::new(Mutex::new(provider))
}

/// gilrs' default filter chain (jitter plus a rescaling radial deadzone) stays
/// off, so `axis_data` holds the plain device value and the normalizer's hard
/// cutoff is the only deadzone applied.
const GILRS_DEFAULT_FILTERS: bool = false;

// gilrs backend
#[derive(Debug, Default)]
pub struct GilrsProvider {
    gilrs: Option<Gilrs>,
    active: Option<GamepadId>,
}

impl GilrsProvider {
    pub fn new() -> Self {
        Self::default()
    }
}

// gilrs reports floats with up positive; convert back to the raw device convention
fn to_raw(value: f32, vertical: bool) -> i16 {
    let value = if vertical { -value } else { value };
    (value.clamp(-1.0, 1.0) * AXIS_MAX).round() as i16
}

impl JoystickProvider for GilrsProvider {
    fn init_subsystem(&mut self) -> Result<(), JoystickError> {
        if self.gilrs.is_some() {
            debug!("gilrs already initialized");
            return Ok(());
        }

        info!("Initializing gilrs controller interface");
        match GilrsBuilder::new()
            .with_default_filters(GILRS_DEFAULT_FILTERS)
            .build()
        {
            Ok(gilrs) => {
                info!("Successfully initialized gilrs");
                self.gilrs = Some(gilrs);
                Ok(())
            }
            Err(e) => {
                error!("Failed to initialize gilrs: {}", e);
                Err(JoystickError::Init(e.to_string()))
            }
        }
    }

    fn device_count(&self) -> usize {
        self.gilrs.as_ref().map_or(0, |gilrs| gilrs.gamepads().count())
    }

    fn open_first(&mut self) -> Result<String, JoystickError> {
        let gilrs = self.gilrs.as_ref().ok_or(JoystickError::NotInitialized)?;

        for (idx, (id, gamepad)) in gilrs.gamepads().enumerate() {
            info!("  [{}] ID: {}, Name: {}", idx, id, gamepad.name());
        }

        let (id, gamepad) = gilrs.gamepads().next().ok_or(JoystickError::NoDevice)?;
        let name = gamepad.name().to_string();
        self.active = Some(id);
        info!("Selected gamepad: {} ({})", name, id);
        Ok(name)
    }

    fn pump_events(&mut self) {
        let active = self.active;
        let Some(gilrs) = self.gilrs.as_mut() else {
            return;
        };

        while let Some(Event { id, event, .. }) = gilrs.next_event() {
            match event {
                EventType::Disconnected if Some(id) == active => {
                    warn!("Active gamepad {} disconnected", id);
                }
                EventType::Connected if Some(id) == active => {
                    info!("Active gamepad {} reconnected", id);
                }
                _ => trace!("gilrs event from {}: {:?}", id, event),
            }
        }
    }

    fn axis(&self, axis: StickAxis) -> Result<i16, JoystickError> {
        let gilrs = self.gilrs.as_ref().ok_or(JoystickError::NotInitialized)?;
        let id = self.active.ok_or(JoystickError::NotInitialized)?;
        let gamepad = gilrs
            .connected_gamepad(id)
            .ok_or(JoystickError::Disconnected)?;

        // No data yet means the stick never left center
        let value = gamepad
            .axis_data(axis.gilrs_axis())
            .map_or(0.0, |data| data.value());

        Ok(to_raw(value, axis.is_vertical()))
    }

    fn close_device(&mut self) {
        if let Some(id) = self.active.take() {
            debug!("Closing gamepad {}", id);
        }
    }

    fn teardown(&mut self) {
        if self.gilrs.take().is_some() {
            debug!("gilrs context dropped");
        }
    }
}

use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use statum::{machine, state};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, trace, warn};

use crate::controller::axis::{AxisNormalizer, ControlSignal, ControlSignalCell};
use crate::controller::error::JoystickError;
use crate::controller::joystick::{JoystickProvider, SharedJoystick};
use crate::controller::lifecycle::{RunState, SubsystemHealth, WorkerStatus};

const STATS_WINDOW_SECS: i64 = 10;

// Poller settings
#[derive(Clone, Debug)]
pub struct PollerSettings {
    pub poll_interval: Duration,
    pub deadzone: f32,
}

impl Default for PollerSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(50),
            deadzone: crate::controller::axis::DEFAULT_DEADZONE,
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PollerStats {
    pub published: u64,
    pub skipped: u64,
}

// Run of consecutive failed ticks. Only the first one of a run is a warning.
#[derive(Debug, Default)]
struct FailureStreak(u64);

impl FailureStreak {
    // true for the first failure after a good tick
    fn fail(&mut self) -> bool {
        self.0 += 1;
        self.0 == 1
    }

    // Length of the run that just ended, if there was one
    fn recover(&mut self) -> Option<u64> {
        if self.0 == 0 {
            return None;
        }
        Some(std::mem::take(&mut self.0))
    }
}

// Poller states using statum's state macro
#[state]
#[derive(Debug, Clone)]
pub enum PollerState {
    Initializing,
    Polling,
}

#[machine]
#[derive(Debug)]
pub struct AxisPoller<S: PollerState> {
    // Joystick handle, owned by the supervisor
    joystick: SharedJoystick,

    normalizer: AxisNormalizer,

    poll_interval: Duration,

    // Name of the opened device
    device_name: Option<String>,
}

impl<S: PollerState> AxisPoller<S> {
    pub fn device_name(&self) -> Option<&str> {
        self.device_name.as_deref()
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }
}

impl AxisPoller<Initializing> {
    pub fn create(joystick: SharedJoystick, settings: &PollerSettings) -> Self {
        debug!("Creating axis poller with settings: {:?}", settings);
        Self::new(
            joystick,
            AxisNormalizer::new(settings.deadzone),
            settings.poll_interval,
            None,
        )
    }

    /// Brings the joystick subsystem up and opens device index 0.
    ///
    /// On failure everything opened so far is torn down again.
    pub fn initialize(mut self) -> Result<AxisPoller<Polling>, JoystickError> {
        info!("Initializing joystick system");

        let opened = {
            let mut joystick = self
                .joystick
                .lock()
                .map_err(|_| JoystickError::Init("joystick lock poisoned".into()))?;

            let result = open_device(&mut **joystick);
            if result.is_err() {
                joystick.close_device();
                joystick.teardown();
            }
            result
        };

        let name = opened?;
        info!("Joystick initialized: {}", name);
        self.device_name = Some(name);
        Ok(self.transition())
    }
}

fn open_device(joystick: &mut dyn JoystickProvider) -> Result<String, JoystickError> {
    joystick.init_subsystem()?;

    let count = joystick.device_count();
    debug!("Number of joysticks detected: {}", count);
    if count == 0 {
        error!("No joysticks detected");
        return Err(JoystickError::NoDevice);
    }

    joystick.open_first()
}

impl AxisPoller<Polling> {
    /// One poll: refresh the backend, read three raw axes and normalize them.
    pub fn tick(&mut self) -> Result<ControlSignal, JoystickError> {
        let mut joystick = self
            .joystick
            .lock()
            .map_err(|_| JoystickError::Disconnected)?;

        joystick.pump_events();
        let sample = joystick.read_sample()?;
        trace!("Axis sample: {:?}", sample);

        Ok(self.normalizer.control_signal(&sample))
    }

    /// Polls at a fixed interval until the run state leaves `Running`.
    ///
    /// A failed tick keeps the previously published signal.
    pub async fn run(
        mut self,
        run_state: Arc<RunState>,
        output: Arc<ControlSignalCell>,
        health: Arc<SubsystemHealth>,
    ) -> PollerStats {
        info!(
            "Joystick monitoring loop started ({} ms interval)",
            self.poll_interval.as_millis()
        );
        health.axis_poller.set(WorkerStatus::Running);

        let mut stats = PollerStats::default();
        let mut ticker = interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut window_start = Local::now();
        let mut window_published = 0u64;
        let mut failures = FailureStreak::default();

        loop {
            ticker.tick().await;
            if !run_state.is_running() {
                break;
            }

            match self.tick() {
                Ok(signal) => {
                    if let Some(skipped) = failures.recover() {
                        info!("Joystick readable again after {} skipped ticks", skipped);
                    }
                    output.store(signal);
                    stats.published += 1;
                    window_published += 1;
                    trace!(
                        "Throttle: {:.2} | Steering: {:.2}",
                        signal.throttle,
                        signal.steering
                    );
                }
                Err(e) => {
                    stats.skipped += 1;
                    if failures.fail() {
                        warn!("Error reading joystick values, skipping ticks: {}", e);
                    } else {
                        debug!("Joystick still unreadable, skipping tick: {}", e);
                    }
                }
            }

            let now = Local::now();
            if (now - window_start).num_seconds() >= STATS_WINDOW_SECS {
                info!(
                    "Axis poller stats: published {} samples in last {} seconds ({} skipped total)",
                    window_published, STATS_WINDOW_SECS, stats.skipped
                );
                window_published = 0;
                window_start = now;
            }
        }

        health.axis_poller.set(WorkerStatus::Stopped);
        info!("Joystick monitoring loop ended");
        stats
    }
}

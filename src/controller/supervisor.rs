//! Controller State Supervisor
//!
//! Owns the device descriptor, the joystick handle and both worker tasks.
//!
//! # Lifecycle
//!
//! ```text
//! Uninitialized ──initialize()──► Initializing ──► Running ──shutdown()──► ShuttingDown ──► Stopped
//!       ▲                              │
//!       └──────── failure ─────────────┘
//! ```
//!
//! # Threading Model
//!
//! `run()` spawns two workers and then parks the caller until a shutdown is
//! requested:
//! 1. **Button reader**: `spawn_blocking`, suspends only in the device read
//! 2. **Axis poller**: async task, suspends only on its fixed interval
//!
//! Both poll the shared [`RunState`] once per iteration. Shutdown flips that
//! flag, revokes the event device so a blocked read returns, joins both
//! workers and releases the [`ControllerHandle`] exactly once.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::Settings;
use crate::controller::axis::{ControlSignal, ControlSignalCell};
use crate::controller::axis_poller::{AxisPoller, Polling, PollerStats};
use crate::controller::button_reader::{ButtonReader, ReaderExit, ReaderStats};
use crate::controller::buttons::ButtonEvent;
use crate::controller::device_locator::{DeviceLocator, DeviceOpener, EventSource, LocatedDevice};
use crate::controller::error::ControllerError;
use crate::controller::joystick::{shared, JoystickProvider, SharedJoystick};
use crate::controller::lifecycle::{Lifecycle, RunState, SubsystemHealth};

/// Exclusive owner of the open event device and joystick.
///
/// Released exactly once, either by `shutdown()` or when the supervisor is dropped.
#[derive(Debug)]
pub struct ControllerHandle {
    device: LocatedDevice,
    joystick: SharedJoystick,
}

impl ControllerHandle {
    pub fn device_path(&self) -> &Path {
        &self.device.path
    }

    fn release(self) {
        info!("Cleaning up resources");
        self.device.source.release();

        match self.joystick.lock() {
            Ok(mut joystick) => {
                joystick.close_device();
                joystick.teardown();
            }
            Err(_) => warn!("Joystick lock poisoned, skipping joystick teardown"),
        }
    }
}

/// Final state of one worker task
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum WorkerOutcome {
    #[default]
    NotStarted,
    /// Observed the shutdown and exited
    Stopped,
    /// Exited on its own with an unrecoverable error
    Failed(String),
    Panicked(String),
    /// Did not exit within the shutdown timeout
    Detached,
}

/// What happened to both workers during `run()`
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RunReport {
    pub button_reader: WorkerOutcome,
    pub axis_poller: WorkerOutcome,
    pub reader_stats: Option<ReaderStats>,
    pub poller_stats: Option<PollerStats>,
}

impl RunReport {
    /// No worker failed or panicked
    pub fn is_clean(&self) -> bool {
        [&self.button_reader, &self.axis_poller]
            .iter()
            .all(|outcome| !matches!(outcome, WorkerOutcome::Failed(_) | WorkerOutcome::Panicked(_)))
    }

    pub fn has_detached(&self) -> bool {
        self.button_reader == WorkerOutcome::Detached || self.axis_poller == WorkerOutcome::Detached
    }
}

/// Cloneable shutdown request, safe to fire from any context.
///
/// Only flips the run state, revokes the event device and wakes `run()`;
/// the joining happens in `shutdown()` on the normal path.
#[derive(Debug, Clone)]
pub struct ShutdownTrigger {
    state: Arc<RunState>,
    wake: CancellationToken,
    source: Arc<OnceLock<Arc<dyn EventSource>>>,
}

impl ShutdownTrigger {
    /// Returns `true` for the call that actually started the shutdown.
    pub fn request(&self) -> bool {
        let first = self.state.begin_shutdown();
        if first {
            debug!("Shutdown requested");
            if let Some(source) = self.source.get() {
                source.interrupt();
            }
        }
        self.wake.cancel();
        first
    }

    pub fn is_requested(&self) -> bool {
        self.wake.is_cancelled()
    }
}

struct Workers {
    button: JoinHandle<(ReaderExit, ReaderStats)>,
    axis: JoinHandle<PollerStats>,
}

#[derive(Default)]
struct Slots {
    handle: Option<ControllerHandle>,
    poller: Option<AxisPoller<Polling>>,
    workers: Option<Workers>,
    events_tx: Option<mpsc::Sender<ButtonEvent>>,
    run_started: bool,
    shutdown_claimed: bool,
    report: Option<RunReport>,
}

pub struct ControllerSupervisor {
    settings: Settings,
    opener: Arc<dyn DeviceOpener>,
    joystick: SharedJoystick,
    state: Arc<RunState>,
    signal: Arc<ControlSignalCell>,
    health: Arc<SubsystemHealth>,
    trigger: ShutdownTrigger,
    slots: Mutex<Slots>,
    events_rx: Mutex<Option<mpsc::Receiver<ButtonEvent>>>,
    stopped: watch::Sender<bool>,
}

impl ControllerSupervisor {
    pub fn new(
        settings: Settings,
        opener: Arc<dyn DeviceOpener>,
        joystick: Box<dyn JoystickProvider>,
    ) -> Self {
        debug!("Creating controller supervisor with settings: {:?}", settings);

        let state = Arc::new(RunState::new());
        let trigger = ShutdownTrigger {
            state: state.clone(),
            wake: CancellationToken::new(),
            source: Arc::new(OnceLock::new()),
        };
        let (events_tx, events_rx) = mpsc::channel(settings.buttons.channel_capacity.max(1));
        let (stopped, _) = watch::channel(false);

        Self {
            settings,
            opener,
            joystick: shared(joystick),
            state,
            signal: Arc::new(ControlSignalCell::new()),
            health: Arc::new(SubsystemHealth::default()),
            trigger,
            slots: Mutex::new(Slots {
                events_tx: Some(events_tx),
                ..Default::default()
            }),
            events_rx: Mutex::new(Some(events_rx)),
            stopped,
        }
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.state.load()
    }

    pub fn is_running(&self) -> bool {
        self.state.is_running()
    }

    /// Latest published (throttle, steering). Never blocks the poller.
    pub fn control_signal(&self) -> ControlSignal {
        self.signal.load()
    }

    pub fn control_signal_cell(&self) -> Arc<ControlSignalCell> {
        self.signal.clone()
    }

    pub fn health(&self) -> &SubsystemHealth {
        &self.health
    }

    pub fn trigger(&self) -> ShutdownTrigger {
        self.trigger.clone()
    }

    /// Button event stream. Can be taken once; ends after shutdown.
    pub fn take_button_events(&self) -> Option<mpsc::Receiver<ButtonEvent>> {
        self.events_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    pub fn device_path(&self) -> Option<PathBuf> {
        self.slots()
            .handle
            .as_ref()
            .map(|handle| handle.device_path().to_path_buf())
    }

    fn slots(&self) -> MutexGuard<'_, Slots> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Brings up the joystick subsystem, then the event device.
    ///
    /// Both are required. On failure everything acquired so far is released
    /// and the supervisor stays `Uninitialized`.
    pub fn initialize(&self, device_path_hint: Option<&Path>) -> Result<(), ControllerError> {
        self.state
            .transition(Lifecycle::Uninitialized, Lifecycle::Initializing)
            .map_err(|current| {
                ControllerError::ContractViolation(format!("initialize() called while {current:?}"))
            })?;
        info!("Initializing controller");

        let (poller, device) = match self.acquire(device_path_hint) {
            Ok(acquired) => acquired,
            Err(e) => {
                error!("Controller initialization failed: {}", e);
                self.state.reset_uninitialized();
                return Err(e);
            }
        };

        info!("Button device: {}", device.path.display());
        if let Some(name) = poller.device_name() {
            info!("Joystick device: {}", name);
        }

        let _ = self.trigger.source.set(device.source.clone());
        {
            let mut slots = self.slots();
            slots.handle = Some(ControllerHandle {
                device,
                joystick: self.joystick.clone(),
            });
            slots.poller = Some(poller);
        }

        if let Err(current) = self
            .state
            .transition(Lifecycle::Initializing, Lifecycle::Running)
        {
            warn!("Initialization interrupted ({:?})", current);
            self.trigger.request();
            let handle = self.slots().handle.take();
            if let Some(handle) = handle {
                handle.release();
            }
            return Err(ControllerError::ShutdownInProgress);
        }

        info!("Controller initialization successful");
        Ok(())
    }

    fn acquire(
        &self,
        device_path_hint: Option<&Path>,
    ) -> Result<(AxisPoller<Polling>, LocatedDevice), ControllerError> {
        let poller = AxisPoller::create(self.joystick.clone(), &self.settings.axis.poller_settings())
            .initialize()?;

        let preferred = device_path_hint
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.settings.device.path.clone());
        let locator = DeviceLocator::new(
            self.opener.clone(),
            self.settings.device.fallback_paths.clone(),
            self.settings.device.grab,
        );

        match locator.locate(&preferred) {
            Ok(device) => Ok((poller, device)),
            Err(e) => {
                error!("Failed to initialize input device: {}", e);
                drop(poller);
                match self.joystick.lock() {
                    Ok(mut joystick) => {
                        joystick.close_device();
                        joystick.teardown();
                    }
                    Err(_) => warn!("Joystick lock poisoned, skipping joystick teardown"),
                }
                Err(e.into())
            }
        }
    }

    /// Spawns both workers and waits for a shutdown request, then shuts down.
    pub async fn run(&self) -> Result<RunReport, ControllerError> {
        match self.state.load() {
            Lifecycle::Running => {}
            Lifecycle::ShuttingDown | Lifecycle::Stopped => {
                info!("Shutdown already requested, not starting workers");
                self.shutdown().await?;
                return Ok(self.report());
            }
            current => {
                return Err(ControllerError::ContractViolation(format!(
                    "run() called while {current:?}"
                )));
            }
        }

        self.spawn_workers()?;
        info!("Controller running, waiting for shutdown request");

        self.trigger.wake.cancelled().await;
        self.shutdown().await?;
        Ok(self.report())
    }

    fn report(&self) -> RunReport {
        self.slots().report.clone().unwrap_or_default()
    }

    fn spawn_workers(&self) -> Result<(), ControllerError> {
        let mut slots = self.slots();
        if slots.shutdown_claimed {
            debug!("Shutdown already claimed, not spawning workers");
            return Ok(());
        }
        if slots.run_started {
            return Err(ControllerError::ContractViolation(
                "run() called more than once".into(),
            ));
        }

        let source = match slots.handle.as_ref() {
            Some(handle) => handle.device.source.clone(),
            None => {
                return Err(ControllerError::ContractViolation(
                    "controller handle missing".into(),
                ))
            }
        };
        let events_tx = slots.events_tx.clone().ok_or_else(|| {
            ControllerError::ContractViolation("button channel already closed".into())
        })?;
        let poller = slots.poller.take().ok_or_else(|| {
            ControllerError::ContractViolation("axis poller missing".into())
        })?;

        let reader = ButtonReader::new(source, self.state.clone(), self.health.clone(), events_tx);
        let button = tokio::task::spawn_blocking(move || reader.run());
        let axis = tokio::spawn(poller.run(
            self.state.clone(),
            self.signal.clone(),
            self.health.clone(),
        ));
        debug!("Worker tasks spawned");

        slots.workers = Some(Workers { button, axis });
        slots.run_started = true;
        Ok(())
    }

    /// Idempotent. The first caller joins the workers and releases the handle;
    /// concurrent callers wait until that has finished.
    pub async fn shutdown(&self) -> Result<(), ControllerError> {
        self.trigger.request();

        let claimed = {
            let mut slots = self.slots();
            if slots.shutdown_claimed {
                None
            } else {
                slots.shutdown_claimed = true;
                Some((
                    slots.workers.take(),
                    slots.poller.take(),
                    slots.handle.take(),
                    slots.events_tx.take(),
                ))
            }
        };

        let Some((workers, poller, handle, events_tx)) = claimed else {
            debug!("Shutdown already in progress, waiting for it to finish");
            let mut stopped = self.stopped.subscribe();
            return stopped
                .wait_for(|stopped| *stopped)
                .await
                .map(|_| ())
                .map_err(|e| ControllerError::Worker(e.to_string()));
        };

        info!("Shutting down controller");
        drop(events_tx);
        drop(poller);

        let report = match workers {
            Some(workers) => self.join_workers(workers).await,
            None => RunReport::default(),
        };
        debug!("Run report: {:?}", report);

        if let Some(handle) = handle {
            handle.release();
        }

        self.state.mark_stopped();
        self.slots().report = Some(report);
        self.stopped.send_replace(true);
        info!("Controller stopped");
        Ok(())
    }

    async fn join_workers(&self, mut workers: Workers) -> RunReport {
        let timeout = self.settings.supervisor.shutdown_timeout();
        let mut report = RunReport::default();

        match tokio::time::timeout(timeout, &mut workers.axis).await {
            Ok(Ok(stats)) => {
                report.axis_poller = WorkerOutcome::Stopped;
                report.poller_stats = Some(stats);
            }
            Ok(Err(e)) => {
                error!("Axis poller task failed: {}", e);
                report.axis_poller = WorkerOutcome::Panicked(e.to_string());
            }
            Err(_) => {
                warn!("Axis poller did not stop within {:?}, aborting", timeout);
                workers.axis.abort();
                report.axis_poller = WorkerOutcome::Detached;
            }
        }

        match tokio::time::timeout(timeout, &mut workers.button).await {
            Ok(Ok((exit, stats))) => {
                report.button_reader = match exit {
                    ReaderExit::Stopped => WorkerOutcome::Stopped,
                    ReaderExit::Failed(e) => WorkerOutcome::Failed(e.to_string()),
                };
                report.reader_stats = Some(stats);
            }
            Ok(Err(e)) => {
                error!("Button reader task failed: {}", e);
                report.button_reader = WorkerOutcome::Panicked(e.to_string());
            }
            Err(_) => {
                warn!(
                    "Button reader did not stop within {:?}, leaving it detached",
                    timeout
                );
                report.button_reader = WorkerOutcome::Detached;
            }
        }

        report
    }
}

impl Drop for ControllerSupervisor {
    fn drop(&mut self) {
        self.trigger.request();
        let handle = self.slots().handle.take();
        if let Some(handle) = handle {
            debug!("Supervisor dropped without shutdown, releasing handle");
            handle.release();
        }
    }
}

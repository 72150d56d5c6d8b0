#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use padpilot::config::Settings;
use padpilot::controller::raw_event::RawEventRecord;
use padpilot::controller::{
    AxisSample, ControllerSupervisor, DeviceOpener, EventSource, JoystickError, JoystickProvider,
    StickAxis,
};

enum Item {
    Bytes(Vec<u8>),
    Fail(i32),
}

#[derive(Default)]
struct Queue {
    items: VecDeque<Item>,
    interrupted: bool,
}

/// Event device fed from the test; blocks like a real device until data arrives
/// or it is interrupted.
pub struct ScriptedDevice {
    path: PathBuf,
    queue: Mutex<Queue>,
    ready: Condvar,
    // Stuck reads ignore interrupt() and only return after unblock()
    stuck: AtomicBool,
    pub interrupts: AtomicUsize,
    pub releases: AtomicUsize,
}

impl std::fmt::Debug for ScriptedDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedDevice").field("path", &self.path).finish()
    }
}

impl ScriptedDevice {
    pub fn new(path: &str) -> Arc<Self> {
        Arc::new(Self {
            path: PathBuf::from(path),
            queue: Mutex::new(Queue::default()),
            ready: Condvar::new(),
            stuck: AtomicBool::new(false),
            interrupts: AtomicUsize::new(0),
            releases: AtomicUsize::new(0),
        })
    }

    /// A device whose blocked read survives interrupt()
    pub fn stuck(path: &str) -> Arc<Self> {
        let device = Self::new(path);
        device.stuck.store(true, Ordering::SeqCst);
        device
    }

    /// Ends any blocked read, stuck or not
    pub fn unblock(&self) {
        self.stuck.store(false, Ordering::SeqCst);
        self.queue.lock().unwrap().interrupted = true;
        self.ready.notify_all();
    }

    pub fn push_key(&self, code: u16, value: i32) {
        self.push(Item::Bytes(RawEventRecord::key(code, value).encode()));
    }

    pub fn push_bytes(&self, bytes: Vec<u8>) {
        self.push(Item::Bytes(bytes));
    }

    pub fn fail_with(&self, errno: i32) {
        self.push(Item::Fail(errno));
    }

    fn push(&self, item: Item) {
        self.queue.lock().unwrap().items.push_back(item);
        self.ready.notify_all();
    }
}

impl EventSource for ScriptedDevice {
    fn path(&self) -> &Path {
        &self.path
    }

    fn name(&self) -> Option<&str> {
        Some("Scripted Pad")
    }

    fn read_record(&self, buf: &mut [u8]) -> io::Result<usize> {
        let mut queue = self.queue.lock().unwrap();
        loop {
            if queue.interrupted {
                return Err(io::Error::from_raw_os_error(libc::ENODEV));
            }
            match queue.items.pop_front() {
                Some(Item::Bytes(bytes)) => {
                    let n = bytes.len().min(buf.len());
                    buf[..n].copy_from_slice(&bytes[..n]);
                    return Ok(n);
                }
                Some(Item::Fail(errno)) => return Err(io::Error::from_raw_os_error(errno)),
                None => queue = self.ready.wait(queue).unwrap(),
            }
        }
    }

    fn grab(&self) -> io::Result<()> {
        Ok(())
    }

    fn interrupt(&self) {
        self.interrupts.fetch_add(1, Ordering::SeqCst);
        if self.stuck.load(Ordering::SeqCst) {
            return;
        }
        self.queue.lock().unwrap().interrupted = true;
        self.ready.notify_all();
    }

    fn release(&self) {
        self.releases.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct ScriptedOpener {
    devices: HashMap<PathBuf, Arc<ScriptedDevice>>,
    pub attempts: AtomicUsize,
}

impl ScriptedOpener {
    pub fn with(devices: &[Arc<ScriptedDevice>]) -> Self {
        Self {
            devices: devices
                .iter()
                .map(|device| (device.path.clone(), device.clone()))
                .collect(),
            attempts: AtomicUsize::new(0),
        }
    }
}

impl DeviceOpener for ScriptedOpener {
    fn open(&self, path: &Path) -> io::Result<Arc<dyn EventSource>> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        match self.devices.get(path) {
            Some(device) => Ok(device.clone() as Arc<dyn EventSource>),
            None => Err(io::Error::from(io::ErrorKind::NotFound)),
        }
    }
}

/// Shared view into a [`FakeJoystick`]
#[derive(Debug, Default)]
pub struct PadState {
    pub devices: AtomicUsize,
    pub sample: Mutex<AxisSample>,
    pub failing: AtomicBool,
    pub closes: AtomicUsize,
    pub teardowns: AtomicUsize,
}

impl PadState {
    pub fn with_devices(devices: usize) -> Arc<Self> {
        let pad = Self::default();
        pad.devices.store(devices, Ordering::SeqCst);
        Arc::new(pad)
    }

    pub fn set_sample(&self, sample: AxisSample) {
        *self.sample.lock().unwrap() = sample;
    }
}

#[derive(Debug)]
pub struct FakeJoystick(pub Arc<PadState>);

impl JoystickProvider for FakeJoystick {
    fn init_subsystem(&mut self) -> Result<(), JoystickError> {
        Ok(())
    }

    fn device_count(&self) -> usize {
        self.0.devices.load(Ordering::SeqCst)
    }

    fn open_first(&mut self) -> Result<String, JoystickError> {
        Ok("Fake Pad".into())
    }

    fn pump_events(&mut self) {}

    fn axis(&self, axis: StickAxis) -> Result<i16, JoystickError> {
        if self.0.failing.load(Ordering::SeqCst) {
            return Err(JoystickError::Disconnected);
        }
        let sample = *self.0.sample.lock().unwrap();
        Ok(match axis {
            StickAxis::LeftX => sample.left_x,
            StickAxis::LeftY => sample.left_y,
            StickAxis::RightX => sample.right_x,
        })
    }

    fn close_device(&mut self) {
        self.0.closes.fetch_add(1, Ordering::SeqCst);
    }

    fn teardown(&mut self) {
        self.0.teardowns.fetch_add(1, Ordering::SeqCst);
    }
}

pub fn test_settings() -> Settings {
    let mut settings = Settings::default();
    settings.device.path = PathBuf::from("/dev/input/event3");
    settings.device.fallback_paths = vec![
        PathBuf::from("/dev/input/event0"),
        PathBuf::from("/dev/input/event1"),
    ];
    settings.axis.poll_interval_ms = 5;
    settings
}

pub fn supervisor(
    devices: &[Arc<ScriptedDevice>],
    joystick: Arc<PadState>,
) -> Arc<ControllerSupervisor> {
    supervisor_with(
        test_settings(),
        Arc::new(ScriptedOpener::with(devices)),
        joystick,
    )
}

pub fn supervisor_with(
    settings: Settings,
    opener: Arc<dyn DeviceOpener>,
    joystick: Arc<PadState>,
) -> Arc<ControllerSupervisor> {
    Arc::new(ControllerSupervisor::new(
        settings,
        opener,
        Box::new(FakeJoystick(joystick)),
    ))
}

/// Polls `condition` for up to two seconds
pub async fn eventually(condition: impl Fn() -> bool) -> bool {
    for _ in 0..400 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}

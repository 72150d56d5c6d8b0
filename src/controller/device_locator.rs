//! Device Locator - finds a readable raw event device
//!
//! Tries the preferred path, then a fixed fallback list, and returns the first
//! device that opens for reading. The chosen device is grabbed best-effort so
//! no other process consumes its events.

use std::fmt;
use std::io;
use std::os::fd::{AsRawFd, RawFd};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{debug, info, warn};

use crate::controller::error::LocateError;

/// `EVIOCREVOKE`: `_IOW('E', 0x91, int)`
const EVIOCREVOKE: libc::c_ulong = 0x4004_4591;

/// Fallback candidates tried after the preferred path, in order
pub const DEFAULT_FALLBACK_PATHS: [&str; 6] = [
    "/dev/input/event0",
    "/dev/input/event1",
    "/dev/input/event2",
    "/dev/input/event4",
    "/dev/input/event5",
    "/dev/input/event6",
];

pub const DEFAULT_DEVICE_PATH: &str = "/dev/input/event3";

/// An open raw event device.
///
/// Owned by the supervisor; the button reader only reads from it.
pub trait EventSource: Send + Sync + fmt::Debug {
    fn path(&self) -> &Path;

    fn name(&self) -> Option<&str> {
        None
    }

    /// Blocking read of at most `buf.len()` bytes
    fn read_record(&self, buf: &mut [u8]) -> io::Result<usize>;

    /// Requests exclusive delivery of the device's events
    fn grab(&self) -> io::Result<()>;

    /// Invalidates the descriptor so a blocked `read_record` returns an error
    fn interrupt(&self);

    /// Gives up the grab. Called once when the controller handle is released.
    fn release(&self);
}

pub trait DeviceOpener: Send + Sync {
    fn open(&self, path: &Path) -> io::Result<Arc<dyn EventSource>>;
}

// evdev backed source
pub struct EvdevSource {
    path: PathBuf,
    name: Option<String>,
    fd: RawFd,
    device: Mutex<evdev::Device>,
    revoked: AtomicBool,
}

impl fmt::Debug for EvdevSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EvdevSource")
            .field("path", &self.path)
            .field("name", &self.name)
            .field("fd", &self.fd)
            .finish()
    }
}

impl EvdevSource {
    pub fn open(path: &Path) -> io::Result<Self> {
        let device = evdev::Device::open(path)?;
        let name = device.name().map(str::to_string);
        let fd = device.as_raw_fd();

        Ok(Self {
            path: path.to_path_buf(),
            name,
            fd,
            device: Mutex::new(device),
            revoked: AtomicBool::new(false),
        })
    }
}

impl EventSource for EvdevSource {
    fn path(&self) -> &Path {
        &self.path
    }

    fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    // The descriptor is opened blocking, so this parks until a record arrives
    // or the device is revoked.
    fn read_record(&self, buf: &mut [u8]) -> io::Result<usize> {
        // SAFETY: `fd` stays open while `self.device` lives; `buf` is valid for `buf.len()` bytes.
        let ret = unsafe { libc::read(self.fd, buf.as_mut_ptr().cast(), buf.len()) };
        if ret < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(ret as usize)
    }

    fn grab(&self) -> io::Result<()> {
        let mut device = self
            .device
            .lock()
            .map_err(|_| io::Error::other("device lock poisoned"))?;
        device.grab()
    }

    fn interrupt(&self) {
        if self.revoked.swap(true, Ordering::AcqRel) {
            return;
        }

        // SAFETY: plain ioctl on an fd we own; the int argument is ignored by the kernel.
        let ret = unsafe { libc::ioctl(self.fd, EVIOCREVOKE as _, 0) };
        if ret < 0 {
            warn!(
                "Failed to revoke {}: {}",
                self.path.display(),
                io::Error::last_os_error()
            );
        } else {
            debug!("Revoked access to {}", self.path.display());
        }
    }

    fn release(&self) {
        // A revoked descriptor has already dropped its grab
        if self.revoked.load(Ordering::Acquire) {
            return;
        }
        match self.device.lock() {
            Ok(mut device) => {
                if let Err(e) = device.ungrab() {
                    debug!("Ungrab of {} failed: {}", self.path.display(), e);
                }
            }
            Err(_) => warn!("Device lock poisoned, skipping ungrab"),
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct EvdevOpener;

impl DeviceOpener for EvdevOpener {
    fn open(&self, path: &Path) -> io::Result<Arc<dyn EventSource>> {
        Ok(Arc::new(EvdevSource::open(path)?))
    }
}

/// Device chosen by the locator
#[derive(Debug, Clone)]
pub struct LocatedDevice {
    pub path: PathBuf,
    pub source: Arc<dyn EventSource>,
    pub grabbed: bool,
}

pub struct DeviceLocator {
    opener: Arc<dyn DeviceOpener>,
    fallback_paths: Vec<PathBuf>,
    grab: bool,
}

impl DeviceLocator {
    pub fn new(opener: Arc<dyn DeviceOpener>, fallback_paths: Vec<PathBuf>, grab: bool) -> Self {
        Self {
            opener,
            fallback_paths,
            grab,
        }
    }

    /// Preferred path first, then the fallbacks in order, without duplicates
    pub fn candidates(&self, preferred: &Path) -> Vec<PathBuf> {
        let mut candidates = vec![preferred.to_path_buf()];
        for path in &self.fallback_paths {
            if !candidates.contains(path) {
                candidates.push(path.clone());
            }
        }
        candidates
    }

    pub fn locate(&self, preferred: &Path) -> Result<LocatedDevice, LocateError> {
        info!("Initializing input device: {}", preferred.display());

        let candidates = self.candidates(preferred);
        for path in &candidates {
            debug!("Trying input device: {}", path.display());
            let source = match self.opener.open(path) {
                Ok(source) => source,
                Err(e) => {
                    warn!("Failed to open device '{}': {}", path.display(), e);
                    continue;
                }
            };

            if path.as_path() != preferred {
                info!("Found working device: {}", path.display());
            }

            let grabbed = self.grab && self.try_grab(source.as_ref());

            info!(
                "Selected input device {} ({})",
                path.display(),
                source.name().unwrap_or("unnamed")
            );
            return Ok(LocatedDevice {
                path: path.clone(),
                source,
                grabbed,
            });
        }

        Err(LocateError::NotFound { tried: candidates })
    }

    fn try_grab(&self, source: &dyn EventSource) -> bool {
        match source.grab() {
            Ok(()) => {
                debug!("Grabbed {}", source.path().display());
                true
            }
            Err(e) => {
                warn!(
                    "Failed to grab device {}: {} (continuing without exclusive access)",
                    source.path().display(),
                    e
                );
                false
            }
        }
    }
}

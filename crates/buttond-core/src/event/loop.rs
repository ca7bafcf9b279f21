// Buttond Event Loop
// evdev sources multiplexed with poll(2), bounded by the key deadlines

use std::ffi::OsString;
use std::os::unix::io::{AsRawFd, RawFd};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};

use evdev::{Device, EventType, InputEvent};
use inotify::{Inotify, WatchDescriptor, WatchMask};

use crate::input::RawEvent;

/// Result type for event loop operations
pub type EventLoopResult<T> = Result<T, EventLoopError>;

/// Errors that can occur in event loop
#[derive(Debug, thiserror::Error)]
pub enum EventLoopError {
    #[error("Cannot open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Input {0} went away")]
    Disconnected(PathBuf),

    #[error("No input have been given")]
    NoInputs,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Device information for listing devices
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    /// Device name
    pub name: String,
    /// Device path
    pub path: PathBuf,
}

/// One monitored event device
struct InputSource {
    path: PathBuf,
    /// Wait for the device to come back instead of failing
    wait: bool,
    device: Option<Device>,
    last_attempt: Option<Instant>,
    /// Watch on the parent directory, for `wait` sources
    watch: Option<WatchDescriptor>,
}

impl InputSource {
    fn open(&mut self) -> EventLoopResult<()> {
        self.last_attempt = Some(Instant::now());
        match Device::open(&self.path) {
            Ok(device) => {
                log::info!(
                    "opened {} ({})",
                    self.path.display(),
                    device.name().unwrap_or("Unknown")
                );
                self.device = Some(device);
                Ok(())
            }
            Err(source) => {
                self.device = None;
                Err(EventLoopError::Open {
                    path: self.path.clone(),
                    source,
                })
            }
        }
    }

    fn file_name(&self) -> Option<&std::ffi::OsStr> {
        self.path.file_name()
    }
}

/// How a polled device descriptor came back
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Readiness {
    Idle,
    Readable,
    /// HUP/ERR without data
    Lost,
}

impl Readiness {
    fn from_revents(revents: libc::c_short) -> Self {
        if revents == 0 {
            Readiness::Idle
        } else if revents & libc::POLLIN != 0 {
            Readiness::Readable
        } else {
            Readiness::Lost
        }
    }
}

/// Events gathered by one `EventLoop::poll` call
#[derive(Debug, Default)]
pub struct PollOutcome {
    /// Key and other events, in device order per source
    pub events: Vec<RawEvent>,
    /// Wake descriptors that became readable
    pub woken: Vec<RawFd>,
    /// Inputs that reported HUP/ERR, before any reopen attempt
    pub hung_up: Vec<PathBuf>,
}

impl PollOutcome {
    pub fn is_woken(&self, fd: RawFd) -> bool {
        self.woken.contains(&fd)
    }
}

/// Slot markers for the non-device descriptors in a poll set
const SLOT_WAKE: usize = usize::MAX;
const SLOT_INOTIFY: usize = usize::MAX - 1;

/// Poll loop over the configured event devices.
///
/// Extra "wake" descriptors (e.g. signal pipes) can be registered so the
/// otherwise indefinite wait can be interrupted. Devices given with
/// `wait_inputs` are watched with inotify and reopened as soon as their
/// node shows up again.
pub struct EventLoop {
    sources: Vec<InputSource>,
    wake_fds: Vec<RawFd>,
    inotify: Option<Inotify>,
}

impl EventLoop {
    /// Retry interval for devices that are waited for
    pub const REOPEN_INTERVAL: Duration = Duration::from_secs(1);

    /// Open all inputs. `inputs` must open now; `wait_inputs` may be absent
    /// and are retried until they appear.
    pub fn new(inputs: &[PathBuf], wait_inputs: &[PathBuf]) -> EventLoopResult<Self> {
        if inputs.is_empty() && wait_inputs.is_empty() {
            return Err(EventLoopError::NoInputs);
        }

        let mut inotify = if wait_inputs.is_empty() {
            None
        } else {
            match Inotify::init() {
                Ok(inotify) => Some(inotify),
                Err(e) => {
                    log::warn!("inotify unavailable ({}), retrying missing inputs periodically", e);
                    None
                }
            }
        };

        let mut sources = Vec::with_capacity(inputs.len() + wait_inputs.len());
        for (path, wait) in inputs
            .iter()
            .map(|p| (p, false))
            .chain(wait_inputs.iter().map(|p| (p, true)))
        {
            let mut source = InputSource {
                path: path.clone(),
                wait,
                device: None,
                last_attempt: None,
                watch: None,
            };
            if let Some(inotify) = inotify.as_mut().filter(|_| wait) {
                source.watch = watch_parent(inotify, path);
            }
            match source.open() {
                Ok(()) => {}
                Err(e) if wait => log::warn!("{}, waiting for it", e),
                Err(e) => return Err(e),
            }
            sources.push(source);
        }

        Ok(Self {
            sources,
            wake_fds: Vec::new(),
            inotify,
        })
    }

    /// Register a descriptor that interrupts `poll` when readable
    pub fn add_wake_fd(&mut self, fd: RawFd) {
        self.wake_fds.push(fd);
    }

    /// List all devices reporting key events
    pub fn list_devices() -> Vec<DeviceInfo> {
        let mut devices: Vec<DeviceInfo> = evdev::enumerate()
            .filter(|(_, device)| device.supported_events().contains(EventType::KEY))
            .map(|(path, device)| DeviceInfo {
                name: device.name().unwrap_or("Unknown").to_string(),
                path,
            })
            .collect();
        devices.sort_by(|a, b| a.path.cmp(&b.path));
        devices
    }

    /// Number of sources currently open
    pub fn open_count(&self) -> usize {
        self.sources.iter().filter(|s| s.device.is_some()).count()
    }

    /// Poll timeout cap while a missing source has no directory watch
    fn reopen_cap(&self) -> Option<i32> {
        self.sources
            .iter()
            .any(|s| s.device.is_none() && s.watch.is_none())
            .then(|| Self::REOPEN_INTERVAL.as_millis() as i32)
    }

    /// Retry missing sources nobody watches for
    fn reopen_missing(&mut self) {
        let now = Instant::now();
        for source in self
            .sources
            .iter_mut()
            .filter(|s| s.device.is_none() && s.watch.is_none())
        {
            let due = source
                .last_attempt
                .map_or(true, |t| now.saturating_duration_since(t) >= Self::REOPEN_INTERVAL);
            if due {
                if let Err(e) = source.open() {
                    log::debug!("{}", e);
                }
            }
        }
    }

    /// Wait up to `timeout_ms` (-1 = forever) and read whatever is ready.
    ///
    /// While a waited-for device without a directory watch is missing the
    /// timeout is capped so it can be reopened. Returns an empty outcome on
    /// timeout and on EINTR.
    pub fn poll(&mut self, timeout_ms: i32) -> EventLoopResult<PollOutcome> {
        let mut outcome = PollOutcome::default();

        self.reopen_missing();
        let mut timeout_ms = timeout_ms;
        if let Some(cap) = self.reopen_cap() {
            if timeout_ms < 0 || timeout_ms > cap {
                timeout_ms = cap;
            }
        }

        // source index per pollfd, or one of the SLOT_* markers
        let extra = self.wake_fds.len() + 1;
        let mut slots: Vec<usize> = Vec::with_capacity(self.sources.len() + extra);
        let mut poll_fds: Vec<libc::pollfd> = Vec::with_capacity(self.sources.len() + extra);
        for (i, source) in self.sources.iter().enumerate() {
            if let Some(device) = &source.device {
                slots.push(i);
                poll_fds.push(libc::pollfd {
                    fd: device.as_raw_fd(),
                    events: libc::POLLIN,
                    revents: 0,
                });
            }
        }
        if let Some(inotify) = &self.inotify {
            slots.push(SLOT_INOTIFY);
            poll_fds.push(libc::pollfd {
                fd: inotify.as_raw_fd(),
                events: libc::POLLIN,
                revents: 0,
            });
        }
        for &fd in &self.wake_fds {
            slots.push(SLOT_WAKE);
            poll_fds.push(libc::pollfd {
                fd,
                events: libc::POLLIN,
                revents: 0,
            });
        }

        let poll_result = unsafe {
            libc::poll(
                poll_fds.as_mut_ptr(),
                poll_fds.len() as libc::nfds_t,
                timeout_ms,
            )
        };

        if poll_result < 0 {
            let err = std::io::Error::last_os_error();
            if matches!(err.raw_os_error(), Some(libc::EINTR) | Some(libc::EAGAIN)) {
                return Ok(outcome);
            }
            return Err(EventLoopError::Io(err));
        }

        if poll_result == 0 {
            return Ok(outcome);
        }

        let mut inotify_ready = false;
        for (&slot, pfd) in slots.iter().zip(&poll_fds) {
            let readiness = Readiness::from_revents(pfd.revents);
            match slot {
                _ if readiness == Readiness::Idle => {}
                SLOT_WAKE => outcome.woken.push(pfd.fd),
                SLOT_INOTIFY => inotify_ready = true,
                index => {
                    let lost = match readiness {
                        Readiness::Lost => {
                            outcome.hung_up.push(self.sources[index].path.clone());
                            true
                        }
                        _ => !self.read_source(index, &mut outcome.events),
                    };
                    if lost {
                        self.handle_lost(index)?;
                    }
                }
            }
        }

        if inotify_ready {
            self.handle_inotify()?;
        }

        Ok(outcome)
    }

    /// Reopen watched sources whose device node was created or changed
    fn handle_inotify(&mut self) -> EventLoopResult<()> {
        let Some(inotify) = self.inotify.as_mut() else {
            return Ok(());
        };

        let mut buffer = [0u8; 4096];
        let mut touched: Vec<(WatchDescriptor, OsString)> = Vec::new();
        loop {
            match inotify.read_events(&mut buffer) {
                Ok(events) => {
                    let mut read = 0;
                    for event in events {
                        read += 1;
                        if let Some(name) = event.name {
                            touched.push((event.wd.clone(), name.to_owned()));
                        }
                    }
                    if read == 0 {
                        break;
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(e) => return Err(EventLoopError::Io(e)),
            }
        }

        for source in self.sources.iter_mut().filter(|s| s.device.is_none()) {
            let hit = touched.iter().any(|(wd, name)| {
                source.watch.as_ref() == Some(wd) && source.file_name() == Some(name.as_os_str())
            });
            if hit {
                log::debug!("{} appeared, reopening", source.path.display());
                if let Err(e) = source.open() {
                    // udev may not have set permissions yet; ATTRIB follows
                    log::debug!("{}", e);
                }
            }
        }
        Ok(())
    }

    /// Drain one device; false if it needs reopening
    fn read_source(&mut self, index: usize, events: &mut Vec<RawEvent>) -> bool {
        let source = &mut self.sources[index];
        let Some(device) = source.device.as_mut() else {
            return true;
        };

        match device.fetch_events() {
            Ok(fetched) => {
                let wall_now = SystemTime::now();
                let mono_now = Instant::now();
                events.extend(fetched.map(|event| to_raw_event(&event, wall_now, mono_now)));
                true
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => true,
            Err(e) => {
                log::error!("read error on {}: {}. Trying to reopen", source.path.display(), e);
                false
            }
        }
    }

    fn handle_lost(&mut self, index: usize) -> EventLoopResult<()> {
        let source = &mut self.sources[index];
        log::warn!("got HUP/ERR on {}. Trying to reopen.", source.path.display());
        source.device = None;

        match source.open() {
            Ok(()) => Ok(()),
            Err(e) if source.wait => {
                log::warn!("{}, waiting for it", e);
                Ok(())
            }
            Err(e) => {
                log::error!("{}", e);
                Err(EventLoopError::Disconnected(source.path.clone()))
            }
        }
    }

    /// Paths of all sources, for logging
    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.sources.iter().map(|s| s.path.as_path())
    }
}

/// Watch the directory holding `path` for the node to be (re)created
fn watch_parent(inotify: &mut Inotify, path: &Path) -> Option<WatchDescriptor> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    match inotify
        .watches()
        .add(dir, WatchMask::CREATE | WatchMask::ATTRIB | WatchMask::MOVED_TO)
    {
        Ok(wd) => Some(wd),
        Err(e) => {
            log::warn!(
                "cannot watch {} ({}), retrying {} periodically",
                dir.display(),
                e,
                path.display()
            );
            None
        }
    }
}

/// Convert an evdev event to a monotonic `RawEvent`.
///
/// The kernel stamps events on the wall clock; the event's age relative to
/// `wall_now` is subtracted from `mono_now`. Events stamped in the future
/// are taken as happening now.
pub fn to_raw_event(event: &InputEvent, wall_now: SystemTime, mono_now: Instant) -> RawEvent {
    RawEvent::new(
        to_monotonic(event.timestamp(), wall_now, mono_now),
        event.event_type().0,
        event.code(),
        event.value(),
    )
}

fn to_monotonic(stamp: SystemTime, wall_now: SystemTime, mono_now: Instant) -> Instant {
    wall_now
        .duration_since(stamp)
        .ok()
        .and_then(|age| mono_now.checked_sub(age))
        .unwrap_or(mono_now)
}

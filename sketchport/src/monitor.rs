//! Periodic connection health monitoring and auto-reconnect.
//!
//! The monitor runs on its own fixed-interval timer, independent of any
//! in-flight detection or upload. A poll tick that cannot take the
//! transport (a manual operation holds it) is skipped rather than queued,
//! so monitor reads can never interleave with response parsing.
//!
//! While disconnected with auto-reconnect enabled, each tick attempts a
//! silent scan + connect cycle. Those failures are swallowed at `debug!`
//! level by design: disconnection may be intentional, and surfacing every
//! failed attempt would be noisy false-alarm behavior.

use crate::session::{Session, SessionState};
use log::{debug, info};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Granularity at which the poll loop observes its stop flag.
const STOP_SLICE: Duration = Duration::from_millis(25);

/// Options for the status monitor.
#[derive(Debug, Clone)]
pub struct MonitorOptions {
    /// Fixed polling interval.
    pub interval: Duration,
    /// Attempt a silent reconnect cycle while disconnected.
    pub auto_reconnect: bool,
    /// Baud rate used for reconnect attempts.
    pub baud: u32,
}

impl Default for MonitorOptions {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            auto_reconnect: true,
            baud: crate::port::DEFAULT_BAUD,
        }
    }
}

/// Handle to a running status monitor thread.
///
/// Stopping (explicitly or on drop) joins the thread; the session itself
/// is left in whatever state the last poll produced.
pub struct StatusMonitor {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl StatusMonitor {
    /// Spawn the poll thread for `session`.
    pub fn start(session: Arc<Session>, options: MonitorOptions) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);
        let handle = thread::Builder::new()
            .name("sketchport-monitor".to_string())
            .spawn(move || poll_loop(&session, &options, &flag))
            .ok();

        Self { stop, handle }
    }

    /// Signal the poll thread to stop and wait for it to exit.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }

    /// Whether the poll thread is still running.
    pub fn is_running(&self) -> bool {
        self.handle
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }
}

impl Drop for StatusMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

fn poll_loop(session: &Session, options: &MonitorOptions, stop: &AtomicBool) {
    debug!("status monitor started (interval {:?})", options.interval);

    while !stop.load(Ordering::SeqCst) {
        match session.state() {
            SessionState::Connected => check_liveness(session),
            SessionState::Disconnected if options.auto_reconnect => {
                try_reconnect(session, options.baud);
            },
            // Detecting, or disconnected without auto-reconnect: nothing to do
            _ => {},
        }

        // Sleep in slices so stop() returns promptly
        let mut slept = Duration::ZERO;
        while slept < options.interval && !stop.load(Ordering::SeqCst) {
            let step = STOP_SLICE.min(options.interval - slept);
            thread::sleep(step);
            slept += step;
        }
    }

    debug!("status monitor stopped");
}

/// Re-check that the connected device is still responsive. A contended
/// transport means a manual operation is in flight — skip this tick.
fn check_liveness(session: &Session) {
    let Some(transport) = session.transport() else {
        return;
    };

    match transport.poll_liveness() {
        None => debug!("liveness poll skipped: transport busy"),
        Some(true) => {},
        Some(false) => {
            info!("{}: liveness check failed, disconnecting", transport.name());
            session.disconnect();
        },
    }
}

/// Silent reconnect cycle: scan, pick the best candidate, try to connect.
/// Every failure is swallowed — the next tick simply tries again.
#[cfg(feature = "native")]
fn try_reconnect(session: &Session, baud: u32) {
    let candidates = session.scan();
    let best = candidates
        .iter()
        .find(|p| p.is_high_priority())
        .or_else(|| candidates.iter().find(|p| p.is_recognized()))
        .or_else(|| candidates.first());

    let Some(candidate) = best else {
        return;
    };

    match session.connect(candidate, baud) {
        Ok(model) => info!("auto-reconnected to {} as '{model}'", candidate.info.name),
        Err(e) => debug!("auto-reconnect attempt failed: {e}"),
    }
}

#[cfg(not(feature = "native"))]
fn try_reconnect(_session: &Session, _baud: u32) {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::PortInfo;
    use crate::session::SessionObserver;
    use crate::test_support::MockPort;
    use std::sync::Mutex;
    use std::time::Instant;

    fn uno_info() -> PortInfo {
        PortInfo {
            name: "mock0".to_string(),
            vid: Some(0x2341),
            pid: Some(0x0043),
            manufacturer: None,
            product: None,
            serial_number: None,
        }
    }

    struct DisconnectFlag(Arc<Mutex<bool>>);

    impl SessionObserver for DisconnectFlag {
        fn on_disconnect(&self) {
            *self.0.lock().unwrap() = true;
        }
    }

    fn monitor_options(interval_ms: u64) -> MonitorOptions {
        MonitorOptions {
            interval: Duration::from_millis(interval_ms),
            // Reconnect would race with real hardware on dev machines
            auto_reconnect: false,
            baud: 9600,
        }
    }

    #[test]
    fn test_start_stop_without_hardware() {
        let session = Arc::new(Session::new());
        let mut monitor = StatusMonitor::start(Arc::clone(&session), monitor_options(20));

        assert!(monitor.is_running());
        thread::sleep(Duration::from_millis(60));
        monitor.stop();

        assert!(!monitor.is_running());
        assert_eq!(session.state(), SessionState::Disconnected);
    }

    #[test]
    fn test_failed_liveness_disconnects_and_notifies() {
        let session = Arc::new(Session::new());
        let flagged = Arc::new(Mutex::new(false));
        session.add_observer(Box::new(DisconnectFlag(Arc::clone(&flagged))));

        let (port, _) = MockPort::new(vec![]);
        session.attach(Box::new(port), uno_info()).unwrap();
        let transport = session.transport().unwrap();

        let _monitor = StatusMonitor::start(Arc::clone(&session), monitor_options(20));

        // Simulate the cable being yanked: the handle dies under the monitor
        transport.close();

        let deadline = Instant::now() + Duration::from_secs(2);
        while session.state() == SessionState::Connected && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }

        assert_eq!(session.state(), SessionState::Disconnected);
        assert!(*flagged.lock().unwrap());
    }

    #[test]
    fn test_drop_stops_monitor_thread() {
        let session = Arc::new(Session::new());
        let monitor = StatusMonitor::start(Arc::clone(&session), monitor_options(20));
        drop(monitor);
        // Dropping joined the thread; nothing left running to panic later
    }
}

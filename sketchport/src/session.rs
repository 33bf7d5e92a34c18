//! Connection lifecycle state machine and observer dispatch.
//!
//! Exactly one logical session is active at a time; connecting again
//! invalidates the prior transport. All mutable connection state lives in
//! one `Session` value shared by reference — there is no module-global
//! state. Observers are notified synchronously, with each callback isolated
//! so one panicking observer cannot break dispatch to the rest.

use crate::board::DetectedPort;
use crate::error::{SessionError, TransportError};
use crate::identify;
use crate::port::{Port, PortInfo};
#[cfg(feature = "native")]
use crate::port::SerialConfig;
use crate::transport::Transport;
use log::{debug, info, warn};
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// Connection lifecycle states.
///
/// `Disconnected → Detecting → Connected → Disconnected`, looping.
/// Scanning is a sub-operation of `Disconnected` and never changes state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No port handle owned.
    Disconnected,
    /// A connect request is opening and probing a port.
    Detecting,
    /// A board is connected and the transport is live.
    Connected,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Detecting => write!(f, "detecting"),
            Self::Connected => write!(f, "connected"),
        }
    }
}

/// Observer interface for connection events.
///
/// Registration returns no token and there is no unregistration; observers
/// live as long as the session. Default methods are no-ops so implementors
/// pick only the events they care about.
pub trait SessionObserver: Send + Sync {
    /// A board was identified and connected.
    fn on_connect(&self, _model: &str, _port: &PortInfo) {}

    /// The connection ended, explicitly or by a failed liveness check.
    fn on_disconnect(&self) {}

    /// The session changed state.
    fn on_status_change(&self, _state: SessionState) {}
}

/// One logical connection attempt/lifetime.
pub struct Session {
    state: Mutex<SessionState>,
    transport: Mutex<Option<Arc<Transport>>>,
    model: Mutex<Option<String>>,
    port_info: Mutex<Option<PortInfo>>,
    last_error: Mutex<Option<String>>,
    connecting: AtomicBool,
    observers: Mutex<Vec<Box<dyn SessionObserver>>>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

fn relock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

impl Session {
    /// Create a new, disconnected session.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SessionState::Disconnected),
            transport: Mutex::new(None),
            model: Mutex::new(None),
            port_info: Mutex::new(None),
            last_error: Mutex::new(None),
            connecting: AtomicBool::new(false),
            observers: Mutex::new(Vec::new()),
        }
    }

    /// Current connection state.
    pub fn state(&self) -> SessionState {
        *relock(&self.state)
    }

    /// Whether the session is connected.
    pub fn is_connected(&self) -> bool {
        self.state() == SessionState::Connected
    }

    /// Identified board model, if a connection resolved one.
    pub fn model(&self) -> Option<String> {
        relock(&self.model).clone()
    }

    /// Metadata of the connected port.
    pub fn port_info(&self) -> Option<PortInfo> {
        relock(&self.port_info).clone()
    }

    /// Most recent connection error, if any.
    pub fn last_error(&self) -> Option<String> {
        relock(&self.last_error).clone()
    }

    /// The live transport, if connected. Used by the upload manager and the
    /// status monitor; exclusive access is enforced by the transport itself.
    pub fn transport(&self) -> Option<Arc<Transport>> {
        relock(&self.transport).clone()
    }

    /// Register an observer. Multiple observers may register; there is no
    /// unregistration token.
    pub fn add_observer(&self, observer: Box<dyn SessionObserver>) {
        relock(&self.observers).push(observer);
    }

    /// Enumerate previously-granted ports and run the descriptor-match step
    /// against each — cheap, no port is opened, and the session state does
    /// not change.
    pub fn scan(&self) -> Vec<DetectedPort> {
        crate::board::detect_ports()
    }

    /// Open the chosen port and run the full identification ladder.
    ///
    /// On success the session transitions to `Connected` and returns the
    /// identified model. On an unrecoverable open error the session returns
    /// to `Disconnected` and the error is surfaced — no retry at this layer.
    #[cfg(feature = "native")]
    pub fn connect(&self, port: &DetectedPort, baud: u32) -> Result<String, SessionError> {
        let config = SerialConfig::new(&port.info.name, baud);
        self.connect_with(port.clone(), move || Transport::open(&config))
    }

    /// Connect over an already-open port (tests, Web Serial hand-off).
    pub fn attach(&self, port: Box<dyn Port>, info: PortInfo) -> Result<String, SessionError> {
        let detected = DetectedPort::from_info(info);
        self.connect_with(detected, move || Ok(Transport::from_port(port)))
    }

    fn connect_with<F>(&self, port: DetectedPort, open: F) -> Result<String, SessionError>
    where
        F: FnOnce() -> Result<Transport, TransportError>,
    {
        if self
            .connecting
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(SessionError::AlreadyConnecting);
        }

        // A new connection invalidates any prior transport ownership.
        self.release_transport();
        self.set_state(SessionState::Detecting);

        let transport = match open() {
            Ok(t) => Arc::new(t),
            Err(e) => {
                *relock(&self.last_error) = Some(e.to_string());
                self.set_state(SessionState::Disconnected);
                self.connecting.store(false, Ordering::SeqCst);
                debug!("connect to {} failed: {e}", port.info.name);
                // A port that vanished between scan and open means the
                // grant itself is gone, not a transient transport fault
                return Err(match e {
                    TransportError::DeviceUnavailable(what) => SessionError::HardwareRevoked(what),
                    other => other.into(),
                });
            },
        };

        // Identification is advisory: it degrades, it never fails.
        let model = identify::identify_model(&transport, &port);

        *relock(&self.transport) = Some(transport);
        *relock(&self.model) = Some(model.clone());
        *relock(&self.port_info) = Some(port.info.clone());
        *relock(&self.last_error) = None;
        self.set_state(SessionState::Connected);
        self.notify(|obs| obs.on_connect(&model, &port.info));
        self.connecting.store(false, Ordering::SeqCst);

        info!("connected to {} as '{model}'", port.info.name);
        Ok(model)
    }

    /// Tear down the connection. Safe to call in any state, including
    /// mid-detection or mid-upload: in-flight reads and chunk loops observe
    /// the cancel flag, the port handle is released, and the session
    /// transitions to `Disconnected`.
    pub fn disconnect(&self) {
        let was = self.state();
        self.release_transport();
        *relock(&self.model) = None;
        *relock(&self.port_info) = None;

        if was != SessionState::Disconnected {
            self.set_state(SessionState::Disconnected);
            self.notify(|obs| obs.on_disconnect());
        }
    }

    fn release_transport(&self) {
        let taken = relock(&self.transport).take();
        if let Some(transport) = taken {
            // cancel() is implied: close sets the flag before taking the
            // handle, so a blocked read or chunk loop exits promptly.
            transport.close();
        }
    }

    fn set_state(&self, new: SessionState) {
        let changed = {
            let mut state = relock(&self.state);
            if *state == new {
                false
            } else {
                debug!("session state: {} -> {new}", *state);
                *state = new;
                true
            }
        };
        if changed {
            self.notify(|obs| obs.on_status_change(new));
        }
    }

    /// Dispatch an event to every observer, isolating panics so one broken
    /// observer cannot block the others.
    fn notify<F>(&self, event: F)
    where
        F: Fn(&dyn SessionObserver),
    {
        let observers = relock(&self.observers);
        for observer in observers.iter() {
            if catch_unwind(AssertUnwindSafe(|| event(observer.as_ref()))).is_err() {
                warn!("session observer panicked; continuing dispatch");
            }
        }
    }
}

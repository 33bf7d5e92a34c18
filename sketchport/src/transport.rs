//! Byte-safe transport over one open serial port.
//!
//! The transport owns the only mutable I/O handle for a session. Access is
//! exclusive: a second concurrent writer fails fast with `WriteInProgress`
//! and a second concurrent reader with `PortBusy` — neither ever blocks,
//! since interleaved bytes would corrupt the stream irrecoverably.
//!
//! Blocking reads run in short slices so a `cancel()` from another thread
//! (typically `Session::disconnect`) is observed promptly, and `close()`
//! releases the underlying handle on every exit path.

use crate::error::TransportError;
use crate::port::Port;
#[cfg(feature = "native")]
use crate::port::{NativePort, SerialConfig};
use log::trace;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, TryLockError};
use std::thread;
use std::time::{Duration, Instant};

/// Byte cap for the default identification read predicate. Prevents
/// unbounded accumulation from a noisy or misbehaving link.
pub const READ_CAP: usize = 1024;

/// Granularity of blocking reads; cancellation and deadlines are checked
/// once per slice.
const READ_SLICE: Duration = Duration::from_millis(50);

/// Default read predicate used during identification: stop at a line
/// terminator, or once [`READ_CAP`] bytes have accumulated.
#[must_use]
pub fn line_or_cap(buf: &[u8]) -> bool {
    buf.len() >= READ_CAP || buf.iter().any(|b| *b == b'\n' || *b == b'\r')
}

type SharedPort = Arc<Mutex<Option<Box<dyn Port>>>>;

/// Exclusive-access transport over one open port.
pub struct Transport {
    inner: SharedPort,
    cancel: Arc<AtomicBool>,
    name: String,
}

impl Transport {
    /// Open a native serial port (8-N-1, no flow control) and wrap it.
    #[cfg(feature = "native")]
    pub fn open(config: &SerialConfig) -> Result<Self, TransportError> {
        let port = NativePort::open(config)?;
        Ok(Self::from_port(Box::new(port)))
    }

    /// Wrap an already-open port (tests, Web Serial hand-off).
    pub fn from_port(port: Box<dyn Port>) -> Self {
        let name = port.name().to_string();
        Self {
            inner: Arc::new(Mutex::new(Some(port))),
            cancel: Arc::new(AtomicBool::new(false)),
            name,
        }
    }

    /// Port name this transport was opened on.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Request cancellation of any in-flight read/write loop.
    ///
    /// The flag is observed at the next read slice or chunk boundary.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    fn lock_for_write(&self) -> Result<MutexGuard<'_, Option<Box<dyn Port>>>, TransportError> {
        match self.inner.try_lock() {
            Ok(guard) => Ok(guard),
            Err(TryLockError::WouldBlock) => Err(TransportError::WriteInProgress),
            Err(TryLockError::Poisoned(p)) => Ok(p.into_inner()),
        }
    }

    fn lock_for_read(&self) -> Result<MutexGuard<'_, Option<Box<dyn Port>>>, TransportError> {
        match self.inner.try_lock() {
            Ok(guard) => Ok(guard),
            Err(TryLockError::WouldBlock) => Err(TransportError::PortBusy(self.name.clone())),
            Err(TryLockError::Poisoned(p)) => Ok(p.into_inner()),
        }
    }

    fn port_of<'a>(
        &self,
        guard: &'a mut MutexGuard<'_, Option<Box<dyn Port>>>,
    ) -> Result<&'a mut Box<dyn Port>, TransportError> {
        guard
            .as_mut()
            .ok_or_else(|| TransportError::DeviceUnavailable(format!("{} is closed", self.name)))
    }

    /// Write all bytes in one exclusive operation.
    pub fn write(&self, bytes: &[u8]) -> Result<(), TransportError> {
        if self.is_cancelled() {
            return Err(TransportError::Cancelled);
        }
        let mut guard = self.lock_for_write()?;
        let port = self.port_of(&mut guard)?;
        port.write_all_bytes(bytes)
    }

    /// Accumulate bytes until `predicate(buffer)` is true or `timeout`
    /// elapses.
    ///
    /// Reads run in short slices; cancellation aborts with `Cancelled`,
    /// an exhausted deadline with `Timeout`. The buffer read so far is
    /// discarded on failure — identification callers treat that as an
    /// inconclusive probe, never as fatal.
    pub fn read_until<F>(&self, predicate: F, timeout: Duration) -> Result<Vec<u8>, TransportError>
    where
        F: Fn(&[u8]) -> bool,
    {
        let mut guard = self.lock_for_read()?;
        let port = self.port_of(&mut guard)?;
        port.set_timeout(READ_SLICE)?;

        let deadline = Instant::now() + timeout;
        let mut accumulated = Vec::new();
        let mut buf = [0u8; 256];

        loop {
            if self.cancel.load(Ordering::SeqCst) {
                return Err(TransportError::Cancelled);
            }
            if predicate(&accumulated) {
                trace!("read_until satisfied with {} bytes", accumulated.len());
                return Ok(accumulated);
            }
            if Instant::now() >= deadline {
                return Err(TransportError::Timeout(timeout));
            }

            match port.read(&mut buf) {
                Ok(n) if n > 0 => accumulated.extend_from_slice(&buf[..n]),
                Ok(_) => {},
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut => {},
                Err(e) => return Err(TransportError::Io(e)),
            }
        }
    }

    /// Write `bytes` as fixed-size chunks with an inter-chunk pacing delay.
    ///
    /// There is no acknowledgment protocol at this layer; pacing is the only
    /// defense against overrunning the receiver's buffer. The first failed
    /// write aborts the remaining chunks — bytes already sent are not rolled
    /// back. The exclusive lock is held for the whole sequence so no other
    /// operation can interleave.
    pub fn write_chunked<F>(
        &self,
        bytes: &[u8],
        chunk_size: usize,
        delay: Duration,
        mut progress: F,
    ) -> Result<(), TransportError>
    where
        F: FnMut(usize, usize),
    {
        let chunk_size = chunk_size.max(1);
        let mut guard = self.lock_for_write()?;
        let port = self.port_of(&mut guard)?;

        let total = bytes.len();
        let mut sent = 0;

        for chunk in bytes.chunks(chunk_size) {
            if self.cancel.load(Ordering::SeqCst) {
                return Err(TransportError::Cancelled);
            }
            if sent > 0 && !delay.is_zero() {
                thread::sleep(delay);
            }

            port.write_all_bytes(chunk)?;
            sent += chunk.len();
            trace!("wrote chunk: {sent}/{total} bytes");
            progress(sent, total);
        }

        Ok(())
    }

    /// Change the baud rate of the underlying port.
    pub fn set_baud_rate(&self, baud: u32) -> Result<(), TransportError> {
        let mut guard = self.lock_for_read()?;
        let port = self.port_of(&mut guard)?;
        port.set_baud_rate(baud)
    }

    /// Current baud rate of the underlying port.
    pub fn baud_rate(&self) -> Result<u32, TransportError> {
        let mut guard = self.lock_for_read()?;
        let port = self.port_of(&mut guard)?;
        Ok(port.baud_rate())
    }

    /// Discard pending input/output bytes.
    pub fn clear_buffers(&self) -> Result<(), TransportError> {
        let mut guard = self.lock_for_read()?;
        let port = self.port_of(&mut guard)?;
        port.clear_buffers()
    }

    /// Non-blocking liveness probe for the status monitor.
    ///
    /// Returns `None` when a manual operation holds the transport (the poll
    /// tick must be skipped, not queued), otherwise whether the port still
    /// accepts a flush.
    pub fn poll_liveness(&self) -> Option<bool> {
        let mut guard = match self.inner.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::WouldBlock) => return None,
            Err(TryLockError::Poisoned(p)) => p.into_inner(),
        };
        match guard.as_mut() {
            Some(port) => Some(std::io::Write::flush(port).is_ok()),
            None => Some(false),
        }
    }

    /// Whether the transport still owns an open handle.
    pub fn is_open(&self) -> bool {
        match self.inner.try_lock() {
            Ok(guard) => guard.is_some(),
            Err(TryLockError::WouldBlock) => true,
            Err(TryLockError::Poisoned(p)) => p.into_inner().is_some(),
        }
    }

    /// Close the port, releasing the handle on every exit path.
    ///
    /// Sets the cancel flag first so any in-flight loop exits at its next
    /// slice, then takes the handle under the lock. Safe to call repeatedly.
    pub fn close(&self) {
        self.cancel.store(true, Ordering::SeqCst);
        let mut guard = self
            .inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(mut port) = guard.take() {
            if let Err(e) = port.close() {
                trace!("close on {}: {e}", self.name);
            }
        }
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        self.close();
    }
}

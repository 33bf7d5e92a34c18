//! Chunked sketch upload over a connected session.
//!
//! There is no acknowledgment protocol at this layer: the sketch is
//! streamed as small fixed-size chunks with a pacing delay between them,
//! the only defense against overrunning the receiver's input buffer.
//! Chunk size and delay trade upload latency against overrun risk.

use crate::error::UploadError;
use crate::session::Session;
use crate::sketch::{self, WrapOptions};
use log::{debug, info};
use std::time::Duration;

/// Default chunk size in bytes — conservative with respect to the 64-byte
/// receive buffer on classic AVR boards.
pub const DEFAULT_CHUNK_SIZE: usize = 64;

/// Default pacing delay between chunks.
pub const DEFAULT_CHUNK_DELAY: Duration = Duration::from_millis(50);

/// Options for one upload job.
#[derive(Debug, Clone)]
pub struct UploadOptions {
    /// Fixed chunk size in bytes.
    pub chunk_size: usize,
    /// Pacing delay inserted between chunks.
    pub chunk_delay: Duration,
    /// Send source verbatim, skipping envelope wrapping.
    pub raw: bool,
    /// Envelope options used when wrapping applies.
    pub wrap: WrapOptions,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_delay: DEFAULT_CHUNK_DELAY,
            raw: false,
            wrap: WrapOptions::default(),
        }
    }
}

/// Produce the exact byte payload an upload with these options would send.
#[must_use]
pub fn payload(source: &str, options: &UploadOptions) -> String {
    if options.raw {
        source.to_string()
    } else {
        sketch::wrap(source, &options.wrap)
    }
}

/// Stream a sketch to the connected device.
///
/// Fails immediately with [`UploadError::NotConnected`] — zero bytes
/// written — unless the session is connected. Any chunk write failure
/// (including a `disconnect()` landing mid-upload) aborts the remaining
/// chunks and surfaces [`UploadError::TransportFailure`]. Chunks already
/// sent are **not** rolled back: the device may be left holding a truncated
/// program. The progress callback receives `(bytes_sent, bytes_total)`
/// after each chunk.
pub fn upload<F>(
    session: &Session,
    source: &str,
    options: &UploadOptions,
    progress: F,
) -> Result<(), UploadError>
where
    F: FnMut(usize, usize),
{
    if !session.is_connected() {
        return Err(UploadError::NotConnected);
    }
    let transport = session.transport().ok_or(UploadError::NotConnected)?;

    let text = payload(source, options);
    let bytes = text.as_bytes();
    debug!(
        "uploading {} bytes in {}-byte chunks every {:?}",
        bytes.len(),
        options.chunk_size,
        options.chunk_delay
    );

    transport.write_chunked(bytes, options.chunk_size, options.chunk_delay, progress)?;

    info!("upload complete: {} bytes", bytes.len());
    Ok(())
}

//! Transport abstraction
//!
//! The client core does no I/O of its own. It is handed two byte-level
//! callbacks for the lifetime of the client: `send` transmits one complete
//! frame, `recv` delivers one complete frame. Any packetization needed to
//! move whole frames across the underlying channel (socket, serial line,
//! shared memory) is the transport's responsibility, as are timeouts.

use std::io;

/// Byte-level frame transport
///
/// Implementations must be synchronous: each call blocks until the frame
/// has been handed off or an error is known.
pub trait Transport {
    /// Transmit exactly `frame.len()` bytes
    fn send(&mut self, frame: &[u8]) -> io::Result<()>;

    /// Receive one complete frame
    ///
    /// Writes up to [`MAX_MESSAGE`](crate::protocol::MAX_MESSAGE) bytes
    /// into `buf` and returns the frame length.
    fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize>;
}

/// Adapter wrapping a pair of closures as a [`Transport`]
///
/// For callers without a dedicated transport type:
///
/// ```
/// use ferrolink::transport::CallbackTransport;
///
/// let mut wire: Vec<u8> = Vec::new();
/// let transport = CallbackTransport::new(
///     move |frame: &[u8]| {
///         wire.extend_from_slice(frame);
///         Ok(())
///     },
///     |_buf: &mut [u8]| Err(std::io::Error::from(std::io::ErrorKind::TimedOut)),
/// );
/// # let _ = transport;
/// ```
pub struct CallbackTransport<S, R> {
    send_fn: S,
    recv_fn: R,
}

impl<S, R> CallbackTransport<S, R>
where
    S: FnMut(&[u8]) -> io::Result<()>,
    R: FnMut(&mut [u8]) -> io::Result<usize>,
{
    /// Wrap a send callback and a receive callback
    pub fn new(send_fn: S, recv_fn: R) -> Self {
        Self { send_fn, recv_fn }
    }
}

impl<S, R> Transport for CallbackTransport<S, R>
where
    S: FnMut(&[u8]) -> io::Result<()>,
    R: FnMut(&mut [u8]) -> io::Result<usize>,
{
    fn send(&mut self, frame: &[u8]) -> io::Result<()> {
        (self.send_fn)(frame)
    }

    fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        (self.recv_fn)(buf)
    }
}

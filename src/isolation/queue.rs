//! Bounded frame queues between the graph process and a worker process.
//!
//! Each queue is a Unix socketpair carrying length-prefixed bincode items
//! in one direction and one-byte delivery credits in the other. The sender
//! counts items in flight and refuses to exceed the configured capacity
//! until the receiver acknowledges a delivery, which reproduces a bounded
//! FIFO counted in frames rather than bytes. Both ends survive `fork`, so
//! the graph keeps one endpoint and the worker inherits the other.
//!
//! All waits are bounded: `send_timeout` reports an expired deadline as
//! `Ok(false)` and `recv_timeout` as `Ok(None)`, so callers can re-check
//! their stop flag between attempts. A timeout in the middle of an item is
//! a hard error, since the stream would desynchronize.

use crate::error::{Error, Result};
use crate::frame::Frame;
use serde::{Deserialize, Serialize};
use std::io::{ErrorKind, Read, Write};
use std::os::unix::net::UnixStream;
use std::time::{Duration, Instant};

/// Upper bound on one encoded item, to keep a corrupted length prefix from
/// allocating unbounded memory.
const MAX_ITEM_BYTES: usize = 64 << 20;

/// Socket timeouts may not be zero; use this when a deadline has nearly
/// expired.
const MIN_WAIT: Duration = Duration::from_millis(1);

/// One message on a queue.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) enum QueueItem {
    /// A frame tagged with the short name of the pad it belongs to.
    Frame { pad: String, frame: Frame },
    /// A failure raised inside the worker; fatal to the graph on receipt.
    Fault { message: String },
}

/// Sending end of a bounded queue.
pub(crate) struct QueueSender {
    stream: UnixStream,
    capacity: usize,
    in_flight: usize,
}

/// Receiving end of a bounded queue.
pub(crate) struct QueueReceiver {
    stream: UnixStream,
}

/// Create a connected queue with the given capacity (at least 1).
pub(crate) fn channel(capacity: usize) -> Result<(QueueSender, QueueReceiver)> {
    let (tx, rx) = UnixStream::pair()?;
    Ok((
        QueueSender {
            stream: tx,
            capacity: capacity.max(1),
            in_flight: 0,
        },
        QueueReceiver { stream: rx },
    ))
}

impl QueueSender {
    /// Send one item, waiting at most `timeout` for queue capacity.
    ///
    /// Returns `Ok(false)` if the deadline passed before a slot freed up.
    pub(crate) fn send_timeout(&mut self, item: &QueueItem, timeout: Duration) -> Result<bool> {
        let deadline = Instant::now() + timeout;
        while self.in_flight >= self.capacity {
            if !self.take_credit(deadline)? {
                return Ok(false);
            }
        }

        let payload = bincode::serialize(item)?;
        if payload.len() > MAX_ITEM_BYTES {
            return Err(Error::Transport(format!(
                "queue item too large ({} bytes)",
                payload.len()
            )));
        }
        let mut message = Vec::with_capacity(4 + payload.len());
        message.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        message.extend_from_slice(&payload);

        if !write_all_deadline(&mut self.stream, &message, deadline)? {
            return Ok(false);
        }
        self.in_flight += 1;
        Ok(true)
    }

    /// Wait for one delivery credit from the receiver.
    fn take_credit(&mut self, deadline: Instant) -> Result<bool> {
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(false);
            }
            self.stream.set_read_timeout(Some(remaining.max(MIN_WAIT)))?;
            let mut credit = [0u8; 1];
            match self.stream.read(&mut credit) {
                Ok(0) => return Err(Error::Transport("queue closed by peer".into())),
                Ok(_) => {
                    self.in_flight -= 1;
                    return Ok(true);
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) if would_block(&e) => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }
}

impl QueueReceiver {
    /// Receive one item, waiting at most `timeout` for one to start
    /// arriving. Returns `Ok(None)` on timeout.
    pub(crate) fn recv_timeout(&mut self, timeout: Duration) -> Result<Option<QueueItem>> {
        let mut header = [0u8; 4];
        if !self.read_exact_deadline(&mut header, Instant::now() + timeout, true)? {
            return Ok(None);
        }
        let len = u32::from_le_bytes(header) as usize;
        if len > MAX_ITEM_BYTES {
            return Err(Error::Transport(format!("oversized queue item ({len} bytes)")));
        }

        let mut payload = vec![0u8; len];
        if !self.read_exact_deadline(&mut payload, Instant::now() + timeout, false)? {
            return Err(Error::Transport("timed out mid-item".into()));
        }
        let item = bincode::deserialize(&payload)?;

        // Acknowledge the delivery so the sender can reuse the slot.
        self.stream.set_write_timeout(Some(timeout.max(MIN_WAIT)))?;
        self.stream
            .write_all(&[1])
            .map_err(|e| Error::Transport(format!("failed to send delivery credit: {e}")))?;
        Ok(Some(item))
    }

    /// Read exactly `buf.len()` bytes before `deadline`. With
    /// `allow_empty`, a deadline that passes before the first byte returns
    /// `Ok(false)`; otherwise an expired deadline is a hard error.
    fn read_exact_deadline(
        &mut self,
        buf: &mut [u8],
        deadline: Instant,
        allow_empty: bool,
    ) -> Result<bool> {
        let mut filled = 0;
        while filled < buf.len() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                if filled == 0 && allow_empty {
                    return Ok(false);
                }
                return Err(Error::Transport("timed out mid-item".into()));
            }
            self.stream.set_read_timeout(Some(remaining.max(MIN_WAIT)))?;
            match self.stream.read(&mut buf[filled..]) {
                Ok(0) => return Err(Error::Transport("queue closed by peer".into())),
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) if would_block(&e) => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(true)
    }
}

fn write_all_deadline(stream: &mut UnixStream, buf: &[u8], deadline: Instant) -> Result<bool> {
    let mut written = 0;
    while written < buf.len() {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            if written == 0 {
                return Ok(false);
            }
            return Err(Error::Transport("timed out mid-item".into()));
        }
        stream.set_write_timeout(Some(remaining.max(MIN_WAIT)))?;
        match stream.write(&buf[written..]) {
            Ok(0) => return Err(Error::Transport("queue closed by peer".into())),
            Ok(n) => written += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) if would_block(&e) => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(true)
}

fn would_block(e: &std::io::Error) -> bool {
    matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut)
}

//! Frames are the unit of data flowing along graph edges.
//!
//! A [`Frame`] is an immutable envelope: an optional opaque payload plus an
//! end-of-stream marker. Frames are created by an element's `produce` hook,
//! handed downstream by the scheduler, and consumed by a `pull` hook. The
//! payload is reference-counted [`Bytes`], so fanning a frame out to several
//! sink pads never copies the data, and frames serialize cleanly when an
//! edge crosses a process boundary.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// One unit of data on an edge: an optional opaque payload and an EOS flag.
///
/// A frame with the EOS flag set is terminal for the pad that produced it;
/// its payload, if present, is still delivered to the downstream element.
///
/// # Example
///
/// ```rust
/// use millrace::Frame;
///
/// let data = Frame::new(vec![1u8, 2, 3]);
/// assert!(!data.is_eos());
///
/// let last = Frame::eos_with(vec![4u8]);
/// assert!(last.is_eos());
/// assert_eq!(last.data().unwrap().as_ref(), &[4]);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frame {
    data: Option<Bytes>,
    eos: bool,
}

impl Frame {
    /// Create a frame carrying a payload.
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: Some(data.into()),
            eos: false,
        }
    }

    /// Create a frame with no payload (a tick with nothing to say).
    pub fn empty() -> Self {
        Self {
            data: None,
            eos: false,
        }
    }

    /// Create a terminal frame with no payload.
    pub fn eos() -> Self {
        Self {
            data: None,
            eos: true,
        }
    }

    /// Create a terminal frame that still carries a final payload.
    pub fn eos_with(data: impl Into<Bytes>) -> Self {
        Self {
            data: Some(data.into()),
            eos: true,
        }
    }

    /// The payload, if any.
    pub fn data(&self) -> Option<&Bytes> {
        self.data.as_ref()
    }

    /// Consume the frame, returning its payload.
    pub fn into_data(self) -> Option<Bytes> {
        self.data
    }

    /// Whether this frame is the last one on its pad.
    pub fn is_eos(&self) -> bool {
        self.eos
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_frame() {
        let frame = Frame::new(vec![1u8, 2, 3]);
        assert!(!frame.is_eos());
        assert_eq!(frame.data().unwrap().as_ref(), &[1, 2, 3]);
        assert_eq!(frame.into_data().unwrap().as_ref(), &[1, 2, 3]);
    }

    #[test]
    fn test_empty_frame() {
        let frame = Frame::empty();
        assert!(frame.data().is_none());
        assert!(!frame.is_eos());
    }

    #[test]
    fn test_eos_frames() {
        assert!(Frame::eos().is_eos());
        assert!(Frame::eos().data().is_none());

        let last = Frame::eos_with(vec![9u8]);
        assert!(last.is_eos());
        assert!(last.data().is_some());
    }

    #[test]
    fn test_clone_shares_payload() {
        let frame = Frame::new(vec![0u8; 1024]);
        let copy = frame.clone();
        // Bytes clones share the same backing allocation.
        assert_eq!(
            frame.data().unwrap().as_ptr(),
            copy.data().unwrap().as_ptr()
        );
    }
}

//! Cross-process control flags.
//!
//! `stop` and `shutdown` are set-once booleans that both sides of the
//! transport poll between bounded waits. Each flag is a word in a tiny
//! memfd-backed shared mapping, so a flag set in the graph process is
//! immediately visible to forked workers and vice versa.

use crate::error::Result;
use crate::memory::SharedMemorySegment;
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// A set-once boolean shared with worker processes.
#[derive(Clone, Debug)]
pub(crate) struct SignalFlag {
    seg: Arc<SharedMemorySegment>,
}

impl SignalFlag {
    /// Allocate an unset flag. `name` is a debugging label.
    pub(crate) fn new(name: &str) -> Result<Self> {
        Ok(Self {
            seg: Arc::new(SharedMemorySegment::new(name, 4)?),
        })
    }

    /// Raise the flag. Idempotent.
    pub(crate) fn set(&self) {
        self.seg.atomic_u32(0).store(1, Ordering::SeqCst);
    }

    /// Whether the flag has been raised.
    pub(crate) fn is_set(&self) -> bool {
        self.seg.atomic_u32(0).load(Ordering::SeqCst) != 0
    }
}

//! Cross-process memory for the isolation transport.

mod shared;

pub use shared::SharedMemorySegment;

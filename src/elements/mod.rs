//! Ready-made elements.
//!
//! Only exercising fixtures live here; real sources and sinks (file
//! readers, printers, signal generators) belong to applications, not the
//! engine.

pub mod testing;

//! # millrace
//!
//! A streaming dataflow engine: build a directed acyclic graph of stateful
//! elements joined by named pads, then drive it tick by tick until every
//! stream reaches end of stream.
//!
//! Elements implement up to three synchronous hooks — `pull` for frames
//! arriving on sink pads, `internal` for per-tick bookkeeping, `produce`
//! for frames leaving on source pads — and the scheduler walks the graph
//! in a deterministic topological order, moving frames through single-slot
//! edges. End of stream propagates edge by edge: a source pad finishes by
//! emitting a terminal frame, and the run returns once every source pad
//! has finished and every delivered frame has been consumed.
//!
//! Elements can optionally host their work in a separate OS process,
//! joined to the graph through bounded queues and shared memory; see
//! [`isolation`].
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use millrace::elements::testing::{CollectSnk, DataSrc};
//! use millrace::pipeline::{ElementDef, Pipeline};
//!
//! let src = DataSrc::new().with_pad("out", [vec![1u8], vec![2], vec![3]]);
//! let (snk, collected) = CollectSnk::new();
//!
//! let mut pipeline = Pipeline::new();
//! pipeline.insert(ElementDef::source(["out"]).named("count"), Box::new(src))?;
//! pipeline.insert(ElementDef::sink(["in"]).named("record"), Box::new(snk))?;
//! pipeline.link("record:snk:in", "count:src:out")?;
//! pipeline.run()?;
//!
//! assert_eq!(collected.payloads().len(), 3);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod element;
pub mod elements;
pub mod error;
pub mod frame;
pub mod isolation;
pub mod memory;
pub mod pad;
pub mod pipeline;

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::element::{Element, ProduceContext, PullContext};
    pub use crate::error::{Error, Result};
    pub use crate::frame::Frame;
    pub use crate::isolation::{Supervisor, WorkerConfig, WorkerContext};
    pub use crate::pad::{PadDirection, PadName};
    pub use crate::pipeline::{CancelToken, ElementDef, NodeId, Pipeline};
}

pub use error::{Error, Result};
pub use frame::Frame;

//! Process isolation for elements.
//!
//! An isolated element's work runs in a separate OS process, joined to the
//! graph by a pair of bounded FIFO queues and a set of shared-memory
//! segments. The pieces:
//!
//! - [`Supervisor`]: the scoped resource that owns workers and shared
//!   memory around a graph run
//! - [`WorkerConfig`]: queue capacity, timeouts, and worker arguments
//! - [`WorkerContext`]: what the worker routine receives in its process
//! - [`Isolated`]: the in-graph element wrapping the worker's queues
//!
//! Two control flags govern shutdown. `stop` tells a worker to cease work;
//! routines poll it between bounded queue waits. `shutdown` additionally
//! asks the worker to drain its input queue before exiting, and is raised
//! when the graph terminates on an error or an explicit request.
//!
//! # Example
//!
//! ```rust,ignore
//! use millrace::isolation::{Supervisor, WorkerConfig};
//! use millrace::pipeline::{ElementDef, Pipeline};
//!
//! let mut supervisor = Supervisor::new();
//! let square = supervisor.isolate("square", WorkerConfig::default(), |ctx| {
//!     while !ctx.stopped() {
//!         if let Some((pad, frame)) = ctx.recv()? {
//!             ctx.send(&pad, square_payload(frame))?;
//!         }
//!     }
//!     Ok(())
//! })?;
//!
//! let mut pipeline = Pipeline::new();
//! pipeline.insert(
//!     ElementDef::transform(["in"], ["out"]).named("square"),
//!     Box::new(square),
//! )?;
//! // ... link the rest of the graph ...
//! supervisor.run(&mut pipeline)?;
//! ```

mod queue;
mod signal;
mod supervisor;
mod worker;
mod wrapper;

pub use supervisor::{Supervisor, WorkerConfig};
pub use worker::WorkerContext;
pub use wrapper::Isolated;

//! Graph construction and execution.
//!
//! This module provides the core graph infrastructure:
//!
//! - [`Pipeline`]: the element container and DAG
//! - [`ElementDef`]: pad declarations for one element
//! - [`NodeId`]: handle to an inserted element
//! - [`CancelToken`]: orderly-shutdown requests from outside the run
//!
//! # Example
//!
//! ```rust,ignore
//! use millrace::pipeline::{ElementDef, Pipeline};
//!
//! let mut pipeline = Pipeline::new();
//! pipeline.insert(ElementDef::source(["out"]).named("count"), Box::new(count))?;
//! pipeline.insert(ElementDef::transform(["in"], ["out"]).named("double"), Box::new(double))?;
//! pipeline.insert(ElementDef::sink(["in"]).named("print"), Box::new(print))?;
//! pipeline.link_many([
//!     ("double:snk:in", "count:src:out"),
//!     ("print:snk:in", "double:src:out"),
//! ])?;
//! pipeline.run()?;
//! ```

mod executor;
mod graph;

pub use executor::CancelToken;
pub use graph::{ElementDef, NodeId, Pipeline, PipelineState};

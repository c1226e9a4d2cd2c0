//! Element system for millrace graphs.
//!
//! An element is a stateful node with zero or more sink (input) pads and
//! zero or more source (output) pads. The graph-facing contract is three
//! hooks, all synchronous:
//!
//! - [`Element::pull`] — called once per frame delivered to a sink pad
//! - [`Element::internal`] — called once per tick, after all pulls and
//!   before any produce
//! - [`Element::produce`] — called to create the next frame on a source pad
//!
//! # Design
//!
//! Hooks are synchronous and run on the single scheduler thread; the
//! scheduler owns all orchestration. Which hooks an element needs follows
//! from the pads it declares at insert time: the scheduler never calls
//! `pull` on an element without sink pads, nor `produce` on one without
//! source pads. The defaults therefore only fire on a mismatch between an
//! element's declared pads and its implementation, and they fail loudly.
//!
//! # Example
//!
//! ```rust,ignore
//! use millrace::element::{Element, ProduceContext, PullContext};
//! use millrace::{Frame, Result};
//!
//! struct Upper;
//!
//! impl Element for Upper {
//!     fn pull(&mut self, ctx: &mut PullContext<'_>, frame: Frame) -> Result<()> {
//!         if frame.is_eos() {
//!             ctx.mark_eos();
//!         }
//!         // stash the frame for the produce hook
//!         Ok(())
//!     }
//!
//!     fn produce(&mut self, ctx: &ProduceContext<'_>) -> Result<Frame> {
//!         // emit the transformed frame
//!         # unimplemented!()
//!     }
//! }
//! ```

mod context;

pub use context::{ProduceContext, PullContext};

use crate::error::{Error, Result};
use crate::frame::Frame;

/// A stateful graph node driven by the scheduler through its hooks.
///
/// Implement `pull` if the element declares sink pads, `produce` if it
/// declares source pads, and `internal` for per-tick bookkeeping between
/// the two. Every hook may fail; a hook error is fatal to the whole graph.
pub trait Element: Send {
    /// Receive one frame on a sink pad.
    ///
    /// Called once per pending frame, in sink-pad declaration order, before
    /// `internal` on each tick. Must not block indefinitely and must not
    /// produce frames. Call [`PullContext::mark_eos`] to declare the pad
    /// drained once a terminal frame has been seen.
    fn pull(&mut self, ctx: &mut PullContext<'_>, frame: Frame) -> Result<()> {
        let _ = frame;
        Err(Error::Element(format!(
            "a frame arrived on '{}' but the element has no pull hook",
            ctx.pad()
        )))
    }

    /// Per-tick bookkeeping, after all pulls and before any produce.
    fn internal(&mut self) -> Result<()> {
        Ok(())
    }

    /// Create the next frame for the named source pad.
    ///
    /// Called once per tick for every source pad that has not yet emitted a
    /// terminal frame, in declaration order. Returning a frame with the EOS
    /// flag set marks the pad finished; the scheduler will not ask again.
    fn produce(&mut self, ctx: &ProduceContext<'_>) -> Result<Frame> {
        Err(Error::Element(format!(
            "a frame was requested on '{}' but the element has no produce hook",
            ctx.pad()
        )))
    }
}

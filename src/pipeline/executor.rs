//! The tick scheduler.
//!
//! One driver walks the elements in topological order, over and over, until
//! the graph drains. Per element and tick:
//!
//! 1. every pending frame on a sink pad is delivered (`pull`), clearing the
//!    pad's single slot, in pad declaration order;
//! 2. `internal` runs once;
//! 3. `produce` runs for each source pad that has not yet emitted a
//!    terminal frame, and the frame is fanned out into the slot of every
//!    bound sink pad.
//!
//! Topological order guarantees an upstream `produce` lands before the
//! downstream `pull` of the same tick, so every slot it writes to is empty;
//! a non-empty slot at write time is a scheduling-invariant failure and
//! aborts the run. The graph is done when every source pad has signalled
//! end of stream and no sink slot holds an undelivered frame.

use crate::element::{Element, ProduceContext, PullContext};
use crate::error::{Error, Result};
use crate::pipeline::graph::{NodeId, Pipeline, PipelineState, SinkPadState};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Handle for requesting an orderly shutdown of a running pipeline.
///
/// Cloneable and thread-safe; typically handed to a Ctrl-C handler. Once
/// tripped, the scheduler finishes the tick in progress, refuses to start
/// another, and [`Pipeline::run`] returns [`Error::Cancelled`].
#[derive(Debug, Clone)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

impl Pipeline {
    /// A token that cancels this pipeline's run from another thread.
    pub fn cancel_token(&self) -> CancelToken {
        CancelToken(self.cancel.clone())
    }

    /// Validate the graph and drive it to termination.
    ///
    /// Returns once every source pad has signalled end of stream and all
    /// delivered frames have been consumed, or with the first fatal error:
    /// a validation failure (no hook runs), a hook error, a scheduling
    /// invariant violation, or cancellation.
    pub fn run(&mut self) -> Result<()> {
        let order = self.validate()?;
        self.state = PipelineState::Running;
        let result = self.drive(&order);
        self.state = match result {
            Ok(()) => PipelineState::Finished,
            Err(_) => PipelineState::Error,
        };
        result
    }

    fn drive(&mut self, order: &[NodeId]) -> Result<()> {
        let mut ticks: u64 = 0;
        loop {
            if self.drained() {
                tracing::debug!(ticks, "graph drained");
                return Ok(());
            }
            if self.cancel.load(Ordering::SeqCst) {
                tracing::debug!(ticks, "cancellation observed between ticks");
                return Err(Error::Cancelled);
            }
            for &id in order {
                self.step_element(id)?;
            }
            ticks += 1;
            tracing::trace!(ticks, "tick complete");
        }
    }

    /// Run one element's hooks for the current tick.
    fn step_element(&mut self, id: NodeId) -> Result<()> {
        let node = &mut self.nodes[id.0];
        let elem_name = node.name.clone();
        let Some(mut element) = node.element.take() else {
            return Err(Error::Element(format!(
                "element '{elem_name}' is already executing"
            )));
        };
        let result = self.hooks(id, &elem_name, element.as_mut());
        self.nodes[id.0].element = Some(element);
        result
    }

    fn hooks(&mut self, id: NodeId, elem_name: &str, element: &mut dyn Element) -> Result<()> {
        // Deliveries, in sink pad declaration order.
        for k in 0..self.nodes[id.0].sink_pads.len() {
            let pad = &mut self.nodes[id.0].sink_pads[k];
            let Some(frame) = pad.slot.take() else {
                continue;
            };
            if frame.is_eos() {
                pad.eos_received = true;
            }
            let SinkPadState {
                name, eos_marked, ..
            } = pad;
            let mut ctx = PullContext::new(name, eos_marked);
            element
                .pull(&mut ctx, frame)
                .map_err(|e| Error::in_hook(elem_name, "pull", e))?;
        }

        element
            .internal()
            .map_err(|e| Error::in_hook(elem_name, "internal", e))?;

        // Production, in source pad declaration order, skipping pads that
        // already signalled end of stream.
        for k in 0..self.nodes[id.0].source_pads.len() {
            if self.nodes[id.0].source_pads[k].eos_sent {
                continue;
            }
            let pad_name = self.nodes[id.0].source_pads[k].name.clone();
            let ctx = ProduceContext::new(&pad_name);
            let frame = element
                .produce(&ctx)
                .map_err(|e| Error::in_hook(elem_name, "produce", e))?;
            let eos = frame.is_eos();

            let targets = self.nodes[id.0].source_pads[k].targets.clone();
            for &(target, slot_idx) in &targets {
                let dst = &mut self.nodes[target.0].sink_pads[slot_idx];
                if dst.slot.is_some() {
                    return Err(Error::SlotOccupied(dst.name.to_string()));
                }
                dst.slot = Some(frame.clone());
            }

            if eos {
                self.nodes[id.0].source_pads[k].eos_sent = true;
                tracing::debug!(pad = %pad_name, "source pad signalled end of stream");
            }
        }
        Ok(())
    }

    /// Termination predicate: every source pad has signalled end of stream
    /// and no sink slot holds an undelivered frame.
    fn drained(&self) -> bool {
        self.nodes
            .iter()
            .all(|node| node.source_pads.iter().all(|pad| pad.eos_sent))
            && self
                .nodes
                .iter()
                .all(|node| node.sink_pads.iter().all(|pad| pad.slot.is_none()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Frame;
    use crate::pipeline::graph::ElementDef;
    use std::sync::atomic::AtomicU64;

    /// Emits `count` payload frames then EOS.
    struct Numbers {
        next: u64,
        count: u64,
    }

    impl Element for Numbers {
        fn produce(&mut self, _ctx: &ProduceContext<'_>) -> Result<Frame> {
            if self.next == self.count {
                return Ok(Frame::eos());
            }
            self.next += 1;
            Ok(Frame::new(self.next.to_le_bytes().to_vec()))
        }
    }

    /// Counts payload frames and EOS markers.
    struct Tally {
        frames: Arc<AtomicU64>,
        eos: Arc<AtomicU64>,
    }

    impl Element for Tally {
        fn pull(&mut self, ctx: &mut PullContext<'_>, frame: Frame) -> Result<()> {
            if frame.is_eos() {
                ctx.mark_eos();
                self.eos.fetch_add(1, Ordering::Relaxed);
            } else {
                self.frames.fetch_add(1, Ordering::Relaxed);
            }
            Ok(())
        }
    }

    #[test]
    fn test_source_to_sink_runs_to_eos() {
        let frames = Arc::new(AtomicU64::new(0));
        let eos = Arc::new(AtomicU64::new(0));

        let mut p = Pipeline::new();
        p.insert(
            ElementDef::source(["out"]).named("numbers"),
            Box::new(Numbers { next: 0, count: 4 }),
        )
        .unwrap();
        p.insert(
            ElementDef::sink(["in"]).named("tally"),
            Box::new(Tally {
                frames: frames.clone(),
                eos: eos.clone(),
            }),
        )
        .unwrap();
        p.link("tally:snk:in", "numbers:src:out").unwrap();

        p.run().unwrap();
        assert_eq!(p.state(), PipelineState::Finished);
        assert_eq!(frames.load(Ordering::Relaxed), 4);
        assert_eq!(eos.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_empty_pipeline_is_vacuously_drained() {
        let mut p = Pipeline::new();
        p.run().unwrap();
        assert_eq!(p.state(), PipelineState::Finished);
    }

    #[test]
    fn test_hook_error_is_fatal_and_attributed() {
        struct Broken;
        impl Element for Broken {
            fn produce(&mut self, _ctx: &ProduceContext<'_>) -> Result<Frame> {
                Err(Error::Element("refusing to produce".into()))
            }
        }

        let mut p = Pipeline::new();
        p.insert(
            ElementDef::source(["out"]).named("broken"),
            Box::new(Broken),
        )
        .unwrap();

        match p.run().unwrap_err() {
            Error::Hook { element, hook, .. } => {
                assert_eq!(element, "broken");
                assert_eq!(hook, "produce");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(p.state(), PipelineState::Error);
    }

    #[test]
    fn test_cancellation_stops_before_next_tick() {
        /// Never signals EOS; cancels the run from inside the graph after
        /// a few frames, standing in for an external signal handler.
        struct Endless {
            emitted: u64,
            token: CancelToken,
        }
        impl Element for Endless {
            fn produce(&mut self, _ctx: &ProduceContext<'_>) -> Result<Frame> {
                self.emitted += 1;
                if self.emitted == 3 {
                    self.token.cancel();
                }
                Ok(Frame::new(vec![0u8]))
            }
        }

        let frames = Arc::new(AtomicU64::new(0));
        let eos = Arc::new(AtomicU64::new(0));
        let mut p = Pipeline::new();
        let token = p.cancel_token();
        let observer = p.cancel_token();
        p.insert(
            ElementDef::source(["out"]).named("endless"),
            Box::new(Endless { emitted: 0, token }),
        )
        .unwrap();
        p.insert(
            ElementDef::sink(["in"]).named("tally"),
            Box::new(Tally {
                frames: frames.clone(),
                eos: eos.clone(),
            }),
        )
        .unwrap();
        p.link("tally:snk:in", "endless:src:out").unwrap();

        assert!(!observer.is_cancelled());
        assert!(matches!(p.run().unwrap_err(), Error::Cancelled));
        assert!(observer.is_cancelled());
        // The tick in progress completed, so everything produced was also
        // delivered.
        assert_eq!(frames.load(Ordering::Relaxed), 3);
    }

    #[test]
    fn test_produce_not_called_after_eos() {
        struct Strict {
            calls: u64,
        }
        impl Element for Strict {
            fn produce(&mut self, _ctx: &ProduceContext<'_>) -> Result<Frame> {
                self.calls += 1;
                match self.calls {
                    1 => Ok(Frame::new(vec![1u8])),
                    2 => Ok(Frame::eos()),
                    _ => Err(Error::Element("produce called after EOS".into())),
                }
            }
        }

        let frames = Arc::new(AtomicU64::new(0));
        let eos = Arc::new(AtomicU64::new(0));
        let mut p = Pipeline::new();
        p.insert(
            ElementDef::source(["out"]).named("strict"),
            Box::new(Strict { calls: 0 }),
        )
        .unwrap();
        p.insert(
            ElementDef::sink(["in"]).named("tally"),
            Box::new(Tally {
                frames: frames.clone(),
                eos: eos.clone(),
            }),
        )
        .unwrap();
        p.link("tally:snk:in", "strict:src:out").unwrap();

        p.run().unwrap();
        assert_eq!(frames.load(Ordering::Relaxed), 1);
        assert_eq!(eos.load(Ordering::Relaxed), 1);
    }
}

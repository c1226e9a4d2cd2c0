//! Elements for exercising graphs in tests and examples.

use crate::element::{Element, ProduceContext, PullContext};
use crate::error::{Error, Result};
use crate::frame::Frame;
use bytes::Bytes;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

/// Emits a fixed sequence of payloads on each of its source pads, then a
/// terminal frame per pad.
///
/// ```rust,ignore
/// let src = DataSrc::new()
///     .with_pad("numbers", [vec![1u8], vec![2], vec![3]])
///     .with_pad("letters", [b"A".to_vec(), b"B".to_vec()]);
/// ```
#[derive(Default)]
pub struct DataSrc {
    queues: HashMap<String, VecDeque<Bytes>>,
}

impl DataSrc {
    /// An element with no data queued yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue payloads for one source pad, by short name.
    pub fn with_pad<I, B>(mut self, short: &str, items: I) -> Self
    where
        I: IntoIterator<Item = B>,
        B: Into<Bytes>,
    {
        self.queues
            .entry(short.to_string())
            .or_default()
            .extend(items.into_iter().map(Into::into));
        self
    }
}

impl Element for DataSrc {
    fn produce(&mut self, ctx: &ProduceContext<'_>) -> Result<Frame> {
        let queue = self.queues.get_mut(ctx.short()).ok_or_else(|| {
            Error::Element(format!("no data queued for pad '{}'", ctx.pad()))
        })?;
        Ok(match queue.pop_front() {
            Some(data) => Frame::new(data),
            None => Frame::eos(),
        })
    }
}

/// Forwards frames from its single sink pad to its single source pad
/// unchanged, end of stream included.
#[derive(Default)]
pub struct Passthrough {
    pending: VecDeque<Frame>,
}

impl Passthrough {
    /// A fresh forwarder.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Element for Passthrough {
    fn pull(&mut self, ctx: &mut PullContext<'_>, frame: Frame) -> Result<()> {
        if frame.is_eos() {
            ctx.mark_eos();
        }
        self.pending.push_back(frame);
        Ok(())
    }

    fn produce(&mut self, ctx: &ProduceContext<'_>) -> Result<Frame> {
        self.pending.pop_front().ok_or_else(|| {
            Error::Element(format!("no frame to forward on '{}'", ctx.pad()))
        })
    }
}

/// Discards everything it receives, marking each pad drained at EOS.
#[derive(Default)]
pub struct NullSnk;

impl NullSnk {
    /// A fresh discarder.
    pub fn new() -> Self {
        Self
    }
}

impl Element for NullSnk {
    fn pull(&mut self, ctx: &mut PullContext<'_>, frame: Frame) -> Result<()> {
        if frame.is_eos() {
            ctx.mark_eos();
        }
        Ok(())
    }
}

/// What a [`CollectSnk`] saw, observable after the run through the handle
/// returned by [`CollectSnk::new`].
#[derive(Clone, Default)]
pub struct Collected {
    frames: Arc<Mutex<Vec<(String, Bytes)>>>,
    eos: Arc<Mutex<Vec<String>>>,
}

impl Collected {
    /// All recorded payloads, in delivery order across pads.
    pub fn payloads(&self) -> Vec<Bytes> {
        self.frames
            .lock()
            .unwrap()
            .iter()
            .map(|(_, data)| data.clone())
            .collect()
    }

    /// Payloads delivered to one pad, by short name, in delivery order.
    pub fn payloads_on(&self, short: &str) -> Vec<Bytes> {
        self.frames
            .lock()
            .unwrap()
            .iter()
            .filter(|(pad, _)| pad == short)
            .map(|(_, data)| data.clone())
            .collect()
    }

    /// Number of payload frames recorded.
    pub fn frame_count(&self) -> usize {
        self.frames.lock().unwrap().len()
    }

    /// Short names of pads that saw a terminal frame, in order.
    pub fn eos_pads(&self) -> Vec<String> {
        self.eos.lock().unwrap().clone()
    }

    /// Number of terminal frames observed.
    pub fn eos_count(&self) -> usize {
        self.eos.lock().unwrap().len()
    }
}

/// Records every payload and EOS it receives.
pub struct CollectSnk {
    out: Collected,
}

impl CollectSnk {
    /// A recorder and the handle for reading it back after the run.
    #[allow(clippy::new_ret_no_self)]
    pub fn new() -> (Self, Collected) {
        let out = Collected::default();
        (Self { out: out.clone() }, out)
    }
}

impl Element for CollectSnk {
    fn pull(&mut self, ctx: &mut PullContext<'_>, frame: Frame) -> Result<()> {
        if frame.is_eos() {
            ctx.mark_eos();
            self.out.eos.lock().unwrap().push(ctx.short().to_string());
        }
        if let Some(data) = frame.into_data() {
            self.out
                .frames
                .lock()
                .unwrap()
                .push((ctx.short().to_string(), data));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pad::PadName;

    #[test]
    fn test_data_src_runs_dry_then_eos() {
        let mut src = DataSrc::new().with_pad("out", [vec![1u8], vec![2u8]]);
        let pad = PadName::src("src", "out");
        let ctx = ProduceContext::new(&pad);

        assert_eq!(src.produce(&ctx).unwrap().data().unwrap().as_ref(), &[1]);
        assert_eq!(src.produce(&ctx).unwrap().data().unwrap().as_ref(), &[2]);
        assert!(src.produce(&ctx).unwrap().is_eos());

        let unknown = PadName::src("src", "other");
        let ctx = ProduceContext::new(&unknown);
        assert!(src.produce(&ctx).is_err());
    }

    #[test]
    fn test_passthrough_forwards_in_order() {
        let mut fwd = Passthrough::new();
        let snk = PadName::snk("fwd", "in");
        let src = PadName::src("fwd", "out");
        let mut marked = false;

        let mut ctx = PullContext::new(&snk, &mut marked);
        fwd.pull(&mut ctx, Frame::new(vec![7u8])).unwrap();
        fwd.pull(&mut ctx, Frame::eos()).unwrap();
        assert!(marked);

        let ctx = ProduceContext::new(&src);
        assert_eq!(fwd.produce(&ctx).unwrap().data().unwrap().as_ref(), &[7]);
        assert!(fwd.produce(&ctx).unwrap().is_eos());
        assert!(fwd.produce(&ctx).is_err());
    }

    #[test]
    fn test_collect_snk_records_payloads_and_eos() {
        let (mut snk, out) = CollectSnk::new();
        let pad = PadName::snk("snk", "in");
        let mut marked = false;
        let mut ctx = PullContext::new(&pad, &mut marked);

        snk.pull(&mut ctx, Frame::new(vec![1u8])).unwrap();
        snk.pull(&mut ctx, Frame::eos_with(vec![2u8])).unwrap();

        assert_eq!(out.frame_count(), 2);
        assert_eq!(out.payloads_on("in").len(), 2);
        assert_eq!(out.eos_pads(), ["in"]);
        assert!(marked);
    }
}

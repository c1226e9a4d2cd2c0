//! The in-graph face of a process-hosted element.

use super::queue::{QueueItem, QueueReceiver, QueueSender};
use super::signal::SignalFlag;
use crate::element::{Element, ProduceContext, PullContext};
use crate::error::{Error, Result};
use crate::frame::Frame;
use std::time::Duration;

/// An element whose work runs in a worker process.
///
/// Created by [`Supervisor::isolate`](super::Supervisor::isolate) and
/// inserted into a pipeline like any other element. Its hooks only move
/// frames across the process boundary: `pull` enqueues the delivered frame
/// (tagged with the pad's short name) to the worker's input queue, and
/// `produce` dequeues the worker's next frame from the output queue. Both
/// wait in bounded slices, re-checking the `stop` flag between attempts,
/// so a stuck worker surfaces as a transport error instead of a hang.
///
/// Whether the element acts as a transform, a sink, or a source follows
/// from the pads declared at insert time.
pub struct Isolated {
    name: String,
    inputs: QueueSender,
    outputs: QueueReceiver,
    stop: SignalFlag,
    op_timeout: Duration,
    max_retries: u32,
}

impl Isolated {
    pub(crate) fn new(
        name: String,
        inputs: QueueSender,
        outputs: QueueReceiver,
        stop: SignalFlag,
        op_timeout: Duration,
        max_retries: u32,
    ) -> Self {
        Self {
            name,
            inputs,
            outputs,
            stop,
            op_timeout,
            max_retries,
        }
    }

    /// The worker name this element fronts for.
    pub fn worker_name(&self) -> &str {
        &self.name
    }
}

impl Element for Isolated {
    fn pull(&mut self, ctx: &mut PullContext<'_>, frame: Frame) -> Result<()> {
        if frame.is_eos() {
            ctx.mark_eos();
        }
        let item = QueueItem::Frame {
            pad: ctx.short().to_string(),
            frame,
        };
        for _ in 0..self.max_retries.max(1) {
            if self.stop.is_set() {
                return Err(Error::Transport(format!(
                    "worker '{}' was stopped while feeding it",
                    self.name
                )));
            }
            if self.inputs.send_timeout(&item, self.op_timeout)? {
                return Ok(());
            }
        }
        Err(Error::Transport(format!(
            "timed out feeding worker '{}'",
            self.name
        )))
    }

    fn produce(&mut self, _ctx: &ProduceContext<'_>) -> Result<Frame> {
        for _ in 0..self.max_retries.max(1) {
            if self.stop.is_set() {
                return Err(Error::Transport(format!(
                    "worker '{}' was stopped while awaiting output",
                    self.name
                )));
            }
            match self.outputs.recv_timeout(self.op_timeout)? {
                Some(QueueItem::Frame { frame, .. }) => return Ok(frame),
                Some(QueueItem::Fault { message }) => {
                    return Err(Error::Worker(self.name.clone(), message))
                }
                None => {}
            }
        }
        Err(Error::Transport(format!(
            "timed out waiting for worker '{}'",
            self.name
        )))
    }
}

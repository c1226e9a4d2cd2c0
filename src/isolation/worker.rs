//! The worker-process side of the isolation transport.
//!
//! A worker routine receives a [`WorkerContext`]: its input and output
//! queues, the `stop` and `shutdown` flags, an opaque argument map, and the
//! shared-memory segments registered before spawn. The usual shape of a
//! routine is a loop that receives, processes, and sends until `stop` is
//! observed:
//!
//! ```rust,ignore
//! supervisor.isolate("square", WorkerConfig::default(), |ctx| {
//!     while !ctx.stopped() {
//!         if let Some((pad, frame)) = ctx.recv()? {
//!             ctx.send(&pad, transform(frame))?;
//!         }
//!     }
//!     Ok(())
//! })?;
//! ```

use super::queue::{QueueItem, QueueReceiver, QueueSender};
use super::signal::SignalFlag;
use crate::error::{Error, Result};
use crate::frame::Frame;
use crate::memory::SharedMemorySegment;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Everything a worker routine gets to work with.
pub struct WorkerContext {
    pub(crate) name: String,
    pub(crate) inputs: QueueReceiver,
    pub(crate) outputs: QueueSender,
    pub(crate) stop: SignalFlag,
    pub(crate) shutdown: SignalFlag,
    pub(crate) args: HashMap<String, String>,
    pub(crate) shm: Vec<Arc<SharedMemorySegment>>,
    pub(crate) op_timeout: Duration,
}

impl WorkerContext {
    /// The worker's name, as registered with the supervisor.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the graph has told this worker to cease work.
    ///
    /// Poll this between queue waits; it is the loop condition of a
    /// well-behaved worker routine.
    pub fn stopped(&self) -> bool {
        self.stop.is_set()
    }

    /// Whether the graph is tearing down due to an error or an explicit
    /// shutdown request. Input should be drained rather than processed.
    pub fn shutdown_requested(&self) -> bool {
        self.shutdown.is_set()
    }

    /// Receive the next `(pad short name, frame)` pair from the graph,
    /// waiting up to the configured operation timeout. `None` on timeout.
    pub fn recv(&mut self) -> Result<Option<(String, Frame)>> {
        match self.inputs.recv_timeout(self.op_timeout)? {
            None => Ok(None),
            Some(QueueItem::Frame { pad, frame }) => Ok(Some((pad, frame))),
            Some(QueueItem::Fault { message }) => Err(Error::Transport(message)),
        }
    }

    /// Send a frame back to the graph, tagged with the source pad it is
    /// for. Returns `Ok(false)` if the output queue stayed full for the
    /// whole operation timeout.
    pub fn send(&mut self, pad: &str, frame: Frame) -> Result<bool> {
        let item = QueueItem::Frame {
            pad: pad.to_string(),
            frame,
        };
        self.outputs.send_timeout(&item, self.op_timeout)
    }

    /// A worker argument, as set in `WorkerConfig::args`.
    pub fn arg(&self, key: &str) -> Option<&str> {
        self.args.get(key).map(String::as_str)
    }

    /// A registered shared-memory segment, by name.
    pub fn shm(&self, name: &str) -> Option<&SharedMemorySegment> {
        self.shm
            .iter()
            .find(|segment| segment.name() == name)
            .map(Arc::as_ref)
    }

    /// All registered shared-memory segments, in registration order.
    pub fn shm_list(&self) -> &[Arc<SharedMemorySegment>] {
        &self.shm
    }
}

pub(crate) type WorkerFn = Box<dyn FnOnce(&mut WorkerContext) -> Result<()> + Send>;

/// Entry point of the forked child: run the routine, surface failures as a
/// fault item plus a nonzero exit code, honor a drain request, and exit
/// without unwinding into the inherited graph state.
pub(crate) fn child_main(worker: WorkerFn, mut ctx: WorkerContext) -> ! {
    let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| worker(&mut ctx)));
    let code = match outcome {
        Ok(Ok(())) => 0,
        Ok(Err(err)) => {
            report_fault(&mut ctx, err.to_string());
            1
        }
        Err(panic) => {
            report_fault(&mut ctx, panic_message(panic.as_ref()));
            2
        }
    };
    if ctx.shutdown.is_set() {
        drain_inputs(&mut ctx);
    }
    unsafe { libc::_exit(code) }
}

fn report_fault(ctx: &mut WorkerContext, message: String) {
    tracing::warn!(worker = %ctx.name, %message, "worker routine failed");
    let fault = QueueItem::Fault { message };
    let _ = ctx.outputs.send_timeout(&fault, ctx.op_timeout);
}

/// Empty the input queue so the graph side is never left blocked on a put.
fn drain_inputs(ctx: &mut WorkerContext) {
    while let Ok(Some(_)) = ctx.inputs.recv_timeout(Duration::from_millis(50)) {}
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("worker panicked: {s}")
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("worker panicked: {s}")
    } else {
        "worker panicked".to_string()
    }
}

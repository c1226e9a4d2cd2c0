//! Supervisor for worker processes and the shared-memory registry.
//!
//! The supervisor is the scoped resource around a graph run with isolated
//! elements: register shared memory with [`Supervisor::to_shm`], register
//! worker routines with [`Supervisor::isolate`], then call
//! [`Supervisor::run`]. Workers are spawned (forked) at run entry, after
//! all shared memory exists, and on every exit path — normal completion,
//! element error, cancellation, or drop — the supervisor raises the
//! control flags, joins each worker within a bounded timeout,
//! force-terminates laggards, and releases every segment. Each step is
//! idempotent.

use super::queue;
use super::signal::SignalFlag;
use super::worker::{child_main, WorkerContext, WorkerFn};
use super::wrapper::Isolated;
use crate::error::{Error, Result};
use crate::memory::SharedMemorySegment;
use crate::pipeline::Pipeline;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Configuration for one isolated worker.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Capacity of the input and output queues, in frames.
    pub queue_capacity: usize,
    /// Timeout for one queue operation on either side.
    pub op_timeout: Duration,
    /// How many timed-out operations the in-graph wrapper retries before
    /// declaring the worker unresponsive.
    pub max_retries: u32,
    /// How long to wait for the worker to exit before force-terminating.
    pub join_timeout: Duration,
    /// Opaque arguments handed to the worker routine.
    pub args: HashMap<String, String>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 16,
            op_timeout: Duration::from_secs(1),
            max_retries: 30,
            join_timeout: Duration::from_secs(5),
            args: HashMap::new(),
        }
    }
}

impl WorkerConfig {
    /// Add one worker argument.
    pub fn with_arg(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.args.insert(key.into(), value.into());
        self
    }
}

/// A worker registered but not yet spawned.
struct PendingWorker {
    name: String,
    worker: WorkerFn,
    inputs: queue::QueueReceiver,
    outputs: queue::QueueSender,
    stop: SignalFlag,
    shutdown: SignalFlag,
    args: HashMap<String, String>,
    op_timeout: Duration,
    join_timeout: Duration,
}

/// A spawned worker process.
struct RunningWorker {
    name: String,
    pid: rustix::process::Pid,
    join_timeout: Duration,
}

/// The control flags of one worker, kept for the supervisor's lifetime.
struct WorkerControl {
    stop: SignalFlag,
    shutdown: SignalFlag,
}

/// Owns worker processes and shared-memory segments around a graph run.
///
/// # Example
///
/// ```rust,ignore
/// use millrace::isolation::{Supervisor, WorkerConfig};
///
/// let mut supervisor = Supervisor::new();
/// supervisor.to_shm("table", &table_bytes)?;
/// let square = supervisor.isolate("square", WorkerConfig::default(), worker)?;
/// pipeline.insert(ElementDef::transform(["in"], ["out"]).named("square"), Box::new(square))?;
/// supervisor.run(&mut pipeline)?;
/// ```
pub struct Supervisor {
    shm: Vec<Arc<SharedMemorySegment>>,
    pending: Vec<PendingWorker>,
    running: Vec<RunningWorker>,
    controls: Vec<WorkerControl>,
}

impl Supervisor {
    /// Create an empty supervisor.
    pub fn new() -> Self {
        Self {
            shm: Vec::new(),
            pending: Vec::new(),
            running: Vec::new(),
            controls: Vec::new(),
        }
    }

    /// Register a named shared-memory segment initialized with `bytes`.
    ///
    /// Must happen before [`Supervisor::run`] so workers inherit the
    /// mapping. Duplicate names are refused. The registry owns the
    /// segment; it is released when the supervisor scope ends.
    pub fn to_shm(&mut self, name: &str, bytes: &[u8]) -> Result<()> {
        if self.shm.iter().any(|segment| segment.name() == name) {
            return Err(Error::Memory(format!(
                "segment '{name}' is already registered"
            )));
        }
        self.shm
            .push(Arc::new(SharedMemorySegment::with_bytes(name, bytes)?));
        Ok(())
    }

    /// A registered segment, by name. Workers use
    /// [`WorkerContext::shm`](super::WorkerContext::shm) instead.
    pub fn segment(&self, name: &str) -> Option<&SharedMemorySegment> {
        self.shm
            .iter()
            .find(|segment| segment.name() == name)
            .map(Arc::as_ref)
    }

    /// Number of segments currently held by the registry.
    pub fn segment_count(&self) -> usize {
        self.shm.len()
    }

    /// Number of workers registered and not yet reaped.
    pub fn worker_count(&self) -> usize {
        self.pending.len() + self.running.len()
    }

    /// Register a worker routine, returning the element that represents it
    /// in the graph.
    ///
    /// The routine runs in a separate process spawned at
    /// [`Supervisor::run`] entry. `name` labels the worker in diagnostics
    /// and should match the element name used at insert time.
    pub fn isolate<F>(
        &mut self,
        name: impl Into<String>,
        config: WorkerConfig,
        worker: F,
    ) -> Result<Isolated>
    where
        F: FnOnce(&mut WorkerContext) -> Result<()> + Send + 'static,
    {
        let name = name.into();
        let stop = SignalFlag::new(&format!("{name}-stop"))?;
        let shutdown = SignalFlag::new(&format!("{name}-shutdown"))?;
        let (in_tx, in_rx) = queue::channel(config.queue_capacity)?;
        let (out_tx, out_rx) = queue::channel(config.queue_capacity)?;

        let element = Isolated::new(
            name.clone(),
            in_tx,
            out_rx,
            stop.clone(),
            config.op_timeout,
            config.max_retries,
        );
        self.controls.push(WorkerControl {
            stop: stop.clone(),
            shutdown: shutdown.clone(),
        });
        self.pending.push(PendingWorker {
            name,
            worker: Box::new(worker),
            inputs: in_rx,
            outputs: out_tx,
            stop,
            shutdown,
            args: config.args,
            op_timeout: config.op_timeout,
            join_timeout: config.join_timeout,
        });
        Ok(element)
    }

    /// Spawn all registered workers and drive the pipeline to termination.
    ///
    /// On a normal end the workers are told to stop; on any error —
    /// including cancellation — they are additionally told to shut down,
    /// which makes them drain their input queues on the way out. Either
    /// way every worker is joined (or force-terminated after its join
    /// timeout) and every shared-memory segment is released before this
    /// returns.
    pub fn run(&mut self, pipeline: &mut Pipeline) -> Result<()> {
        self.spawn_all()?;
        let result = pipeline.run();
        if result.is_err() {
            for control in &self.controls {
                control.shutdown.set();
            }
        }
        for control in &self.controls {
            control.stop.set();
        }
        self.join_all();
        self.shm.clear();
        result
    }

    fn spawn_all(&mut self) -> Result<()> {
        for pending in self.pending.drain(..) {
            let PendingWorker {
                name,
                worker,
                inputs,
                outputs,
                stop,
                shutdown,
                args,
                op_timeout,
                join_timeout,
            } = pending;
            let ctx = WorkerContext {
                name: name.clone(),
                inputs,
                outputs,
                stop,
                shutdown,
                args,
                shm: self.shm.clone(),
                op_timeout,
            };

            let pid = unsafe { libc::fork() };
            if pid < 0 {
                return Err(std::io::Error::last_os_error().into());
            }
            if pid == 0 {
                child_main(worker, ctx);
            }
            // Parent: let go of the child's endpoints and bookkeeping.
            drop(worker);
            drop(ctx);
            let pid = rustix::process::Pid::from_raw(pid)
                .ok_or_else(|| Error::Transport(format!("invalid pid for worker '{name}'")))?;
            tracing::debug!(worker = %name, pid = ?pid, "spawned worker process");
            self.running.push(RunningWorker {
                name,
                pid,
                join_timeout,
            });
        }
        Ok(())
    }

    fn join_all(&mut self) {
        for worker in self.running.drain(..) {
            join_or_kill(worker);
        }
    }
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        for control in &self.controls {
            control.shutdown.set();
            control.stop.set();
        }
        self.pending.clear();
        self.join_all();
        self.shm.clear();
    }
}

/// Wait for a worker to exit; SIGKILL and reap it if the timeout passes.
fn join_or_kill(worker: RunningWorker) {
    use rustix::process::{kill_process, waitpid, Signal, WaitOptions};

    let deadline = Instant::now() + worker.join_timeout;
    loop {
        match waitpid(Some(worker.pid), WaitOptions::NOHANG) {
            Ok(Some(_)) => {
                tracing::debug!(worker = %worker.name, "worker exited");
                return;
            }
            Ok(None) => {
                if Instant::now() >= deadline {
                    tracing::warn!(
                        worker = %worker.name,
                        "worker did not exit within its join timeout, killing"
                    );
                    let _ = kill_process(worker.pid, Signal::Kill);
                    let _ = waitpid(Some(worker.pid), WaitOptions::empty());
                    return;
                }
                std::thread::sleep(Duration::from_millis(10));
            }
            // Already reaped or gone.
            Err(_) => return,
        }
    }
}

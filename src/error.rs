//! Error types for millrace.

use thiserror::Error;

/// Result type alias using millrace's [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for graph construction, scheduling, and the isolation
/// transport.
#[derive(Error, Debug)]
pub enum Error {
    /// An element with this name is already in the graph.
    #[error("element name '{0}' is already in use")]
    DuplicateElement(String),

    /// A pad with this full name is already registered.
    #[error("pad '{0}' is already in use")]
    DuplicatePad(String),

    /// An element was declared without any pads.
    #[error("element '{0}' declares no pads")]
    EmptyElement(String),

    /// An element or pad name contains a reserved character.
    #[error("invalid name '{0}': names may not be empty or contain ':'")]
    InvalidName(String),

    /// A full pad name did not have the `<element>:<src|snk>:<name>` shape.
    #[error("malformed pad name '{0}': expected '<element>:<src|snk>:<name>'")]
    MalformedPadName(String),

    /// A pad name did not resolve to a pad in this graph.
    #[error("unknown pad '{0}'")]
    UnknownPad(String),

    /// The sink side of a link already has an upstream peer.
    #[error("sink pad '{0}' is already linked")]
    AlreadyLinked(String),

    /// A link call was given pads of the wrong directions.
    #[error("cannot link '{snk}' from '{src}': expected a sink pad and a source pad")]
    LinkDirection {
        /// The name passed as the sink side.
        snk: String,
        /// The name passed as the source side.
        src: String,
    },

    /// A sink pad was left unbound at validation time.
    #[error("unlinked pad '{0}'")]
    UnlinkedPad(String),

    /// The element graph contains a cycle.
    #[error("cycle detected among elements: {}", .0.join(", "))]
    CycleDetected(Vec<String>),

    /// A frame was routed to a sink pad whose slot was still occupied.
    #[error("sink pad '{0}' still holds an undelivered frame")]
    SlotOccupied(String),

    /// A frame was requested from a source pad that already signalled end
    /// of stream.
    #[error("source pad '{0}' already signalled end of stream")]
    PadFinished(String),

    /// A user hook failed; fatal to the graph.
    #[error("element '{element}' failed in {hook}: {source}")]
    Hook {
        /// Name of the failing element.
        element: String,
        /// Which hook raised the error.
        hook: &'static str,
        /// The underlying failure.
        #[source]
        source: Box<Error>,
    },

    /// A failure reported by user element code.
    #[error("{0}")]
    Element(String),

    /// The run was cancelled by an orderly-shutdown request.
    #[error("run cancelled by shutdown request")]
    Cancelled,

    /// Queue traffic with a worker process failed or timed out.
    #[error("transport error: {0}")]
    Transport(String),

    /// A worker process reported a failure.
    #[error("worker '{0}' failed: {1}")]
    Worker(String, String),

    /// Shared memory allocation or registration failed.
    #[error("shared memory error: {0}")]
    Memory(String),

    /// Frame encoding or decoding at a process boundary failed.
    #[error("codec error: {0}")]
    Codec(#[from] bincode::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// System call error (via rustix).
    #[error("system error: {0}")]
    System(#[from] rustix::io::Errno),
}

impl Error {
    /// Wrap a hook failure with the element and hook that raised it.
    pub(crate) fn in_hook(element: &str, hook: &'static str, source: Error) -> Self {
        Error::Hook {
            element: element.to_string(),
            hook,
            source: Box::new(source),
        }
    }
}

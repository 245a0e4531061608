//! Error taxonomy for the engine (spec §7).
//!
//! Every kind spec.md names has its own variant so callers can match on
//! cause rather than parse a message string. `Result<T>` defaults to
//! [`SpeechFlowError`] the way `langgraph_core::error::Result` defaults to
//! `GraphError` in the teacher crate this engine is grounded on.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, SpeechFlowError>;

/// Top-level error type returned by graph construction, execution, and the
/// control surface.
#[derive(Debug, Error)]
pub enum SpeechFlowError {
    /// Invalid parameter type/value, unknown node kind, port mismatch, or a
    /// missing required parameter. Fails graph construction before any node
    /// is opened.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// `open()` failed to allocate a resource (socket, file, worker, model).
    #[error("resource error on node '{node}': {source}")]
    Resource { node: String, source: ResourceError },

    /// A transform failed mid-flow on a live edge.
    #[error("stream error on node '{node}': {source}")]
    Stream { node: String, source: StreamError },

    /// A bounded wait expired.
    #[error("timeout error: {0}")]
    Timeout(#[from] TimeoutError),

    /// The control surface rejected a client request.
    #[error("external request error: {0}")]
    ExternalRequest(#[from] ExternalRequestError),

    /// A node's `close()` raised an error during shutdown.
    #[error("shutdown error on node '{node}': {reason}")]
    Shutdown { node: String, reason: String },
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("unknown node kind '{0}'")]
    UnknownNodeKind(String),

    #[error("node '{node}': required parameter '{param}' is missing")]
    MissingParam { node: String, param: String },

    #[error("node '{node}': parameter '{param}' has wrong type (expected {expected}, got {got})")]
    WrongType {
        node: String,
        param: String,
        expected: &'static str,
        got: &'static str,
    },

    #[error("node '{node}': parameter '{param}' value does not satisfy its constraint: {reason}")]
    FailedMatch { node: String, param: String, reason: String },

    #[error("node '{node}': unknown named parameter '{param}'")]
    UnknownNamedParam { node: String, param: String },

    #[error("node '{node}': unclaimed positional argument at index {index}")]
    UnclaimedPositional { node: String, index: usize },

    #[error("node '{node}' requires an input port but has no incoming edge")]
    MissingInputEdge { node: String },

    #[error("node '{node}' requires an output port but has no outgoing edge")]
    MissingOutputEdge { node: String },

    #[error("port type mismatch on edge {from} -> {to}: {from_port} output feeds {to_port} input")]
    PortMismatch {
        from: String,
        to: String,
        from_port: &'static str,
        to_port: &'static str,
    },

    #[error("failed to load engine config from {path}: {reason}")]
    LoadFailed { path: String, reason: String },

    #[error("invalid engine config: {0}")]
    InvalidEngineConfig(String),
}

#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("failed to allocate resource: {0}")]
    AllocationFailed(String),

    #[error("external backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("invalid chunk payload: expected {expected}, got {got}")]
    InvalidPayloadType { expected: &'static str, got: &'static str },

    #[error("write after destruction")]
    WriteAfterClose,

    #[error("external service error: {0}")]
    External(String),
}

#[derive(Debug, Error)]
pub enum TimeoutError {
    #[error("operation '{operation}' timed out after {elapsed_ms}ms")]
    Elapsed { operation: String, elapsed_ms: u64 },
}

#[derive(Debug, Error)]
pub enum ExternalRequestError {
    #[error("malformed request: {0}")]
    Malformed(String),

    #[error("unknown node '{0}'")]
    UnknownNode(String),

    #[error("node '{node}' does not accept requests")]
    NotRequestable { node: String },

    #[error("node '{node}' rejected request: {reason}")]
    Rejected { node: String, reason: String },
}

impl SpeechFlowError {
    pub fn stream(node: impl Into<String>, source: StreamError) -> Self {
        SpeechFlowError::Stream { node: node.into(), source }
    }

    pub fn resource(node: impl Into<String>, source: ResourceError) -> Self {
        SpeechFlowError::Resource { node: node.into(), source }
    }

    pub fn shutdown(node: impl Into<String>, reason: impl Into<String>) -> Self {
        SpeechFlowError::Shutdown { node: node.into(), reason: reason.into() }
    }
}

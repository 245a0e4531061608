//! Core graph execution engine: chunk and time model, parameter binder,
//! node runtime, streaming primitives, graph builder/executor, sidechain
//! bus, and shutdown orchestrator. Everything that talks to the outside
//! world (concrete nodes, the HTTP/WS control surface, the CLI) lives in
//! sibling crates.

pub mod chunk;
pub mod cursor_queue;
pub mod engine;
pub mod error;
pub mod executor;
pub mod graph;
pub mod node;
pub mod params;
pub mod registry;
pub mod shutdown;
pub mod sidechain;
pub mod streaming;

pub use chunk::{Chunk, ChunkKind, MediaType, Meta, Payload};
pub use engine::{AudioBitDepth, Engine, EngineConfig};
pub use error::{Result, SpeechFlowError};
pub use executor::NotifyBroadcast;
pub use graph::{Graph, GraphBuilder, NodeId, VariableResolver};
pub use node::{ControlHandle, EventSink, Node, NodeContext, NodeEvent, NodeIo, PortType};
pub use params::{bind, BoundParams, MatchRule, ParamSchema, ParamSpec, ParamType, ParamValue};
pub use registry::NodeRegistry;
pub use shutdown::{ShutdownCoordinator, ShutdownReason, Stoppable};
pub use sidechain::{SidechainBus, SidechainRegistry};

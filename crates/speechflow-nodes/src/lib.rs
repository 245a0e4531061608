//! Concrete node implementations (spec §4.4, §4.10) plus the node-kind
//! registry a DSL driver's `create_node` callback dispatches through.

pub mod classifier_queue;
pub mod compressor;
pub mod io;
pub mod mute;
pub mod registry;
pub mod sentence_splitter;

pub use classifier_queue::{Classifier, ClassifierQueueNode};
pub use compressor::{CompressorConfig, CompressorNode, DynamicsMode, SidechainRole};
pub use io::{FileSinkNode, FileSourceNode, PassthroughNode};
pub use mute::MuteNode;
pub use registry::{build_node, schema_for};
pub use sentence_splitter::SentenceSplitterNode;

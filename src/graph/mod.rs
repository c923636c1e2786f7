/// Graph model layer
///
/// Typed sockets and ports, the wired in-memory graph with its connection
/// rules, the persisted record shapes, and the kind registry behind the
/// import boundary.

// Typed sockets, ports and control descriptors
pub mod socket;

// Live wired graph: nodes, connections, adjacency, notifications
pub mod node;

// Persisted node/edge/graph record shapes
pub mod types;

// Node kind registry consumed by the import boundary
pub mod import;

pub use import::NodeRegistry;
pub use node::{Connection, Graph, Node, Notification};
pub use socket::{ControlDescriptor, DataType, Port, Socket};
pub use types::{DataMap, EdgeRecord, GraphRecord, NodeId, NodeRecord};

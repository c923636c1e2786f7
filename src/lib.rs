/// Wireflow: node-graph execution runtime
///
/// A typed node graph with two cooperating engines over the same wiring:
/// pull-based memoized dataflow resolution and push-based trigger-driven
/// controlflow execution. Every node runs its own actor state machine with
/// observable context and debounced snapshot persistence.

// Runtime tunables (debounce, wait polling, timeouts)
pub mod config;

// Typed error surface shared across the engines
pub mod error;

// Graph model: sockets, wired graph, records, kind registry
pub mod graph;

// Built-in node behavior library
pub mod nodes;

// Actors plus the DataFlow and ControlFlow engines
pub mod runtime;

// Snapshot store and module resolver implementations
pub mod storage;

// Re-export commonly used types for external consumers
pub use config::RuntimeConfig;
pub use error::RuntimeError;
pub use graph::{
    Connection, DataMap, DataType, EdgeRecord, Graph, GraphRecord, Node, NodeId, NodeRecord,
    NodeRegistry, Notification, Port, Socket,
};
pub use nodes::{NodeBehavior, NodePorts};
pub use runtime::{
    new_execution_id, wait_for_state, ActorContext, ActorEvent, ActorHandle, ActorState,
    GraphRuntime, ModuleInstance, NodeError, RuntimeServices, RuntimeSignal,
};
pub use storage::{MemoryStore, ModuleResolver, SnapshotStore, SqliteStore};

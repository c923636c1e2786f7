/// Typed runtime faults
///
/// The engine distinguishes recoverable faults (captured into a node's actor
/// error context) from hard faults that abort the attempted operation. Only
/// the hard faults live here; node-level production errors travel as
/// `anyhow::Error` and end up in the actor's `{name, message}` error slot.

use crate::runtime::actor::ActorState;

/// Hard engine faults raised to the immediate caller
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// `wait_for_state` exceeded its bound before the actor reached the target
    #[error("timed out waiting for node '{node}' to reach state {target:?}")]
    WaitTimeout { node: String, target: ActorState },

    /// Import encountered a node type with no registered constructor
    #[error("unknown node kind '{0}'")]
    UnknownNodeKind(String),

    /// An operation referenced a node id that is not in the live graph
    #[error("node '{0}' not found in graph")]
    NodeNotFound(String),

    /// The pure-data dependency graph would stop being a DAG
    #[error("dataflow cycle detected involving node '{0}'")]
    CycleDetected(String),

    /// The module resolver has no graph for the requested module id
    #[error("module '{0}' could not be resolved")]
    ModuleNotFound(String),

    /// A module graph is missing the designated Input/Output boundary node
    #[error("module '{module}' has no boundary node '{node}'")]
    MissingBoundary { module: String, node: String },

    /// Persistence collaborator failure surfaced on a non-debounced path
    #[error("storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

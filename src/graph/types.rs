/// Persisted graph record types
///
/// Defines the collaborator-facing shapes for node and edge records. These
/// types are serialized/deserialized from JSON by the persistence layer and
/// consumed by the import boundary to build a live wired graph.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Stable node identifier, unique within one graph
pub type NodeId = String;

/// Node data payload keyed by port name
///
/// Ordered map so snapshots serialize deterministically and output-change
/// detection is a plain equality check.
pub type DataMap = BTreeMap<String, Value>;

/// A persisted node record
///
/// `context` carries the node's settings (and, for saved workflows, the last
/// actor context). Layout fields are stored for editor collaborators but the
/// runtime never interprets them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeRecord {
    /// Stable node id, preserved across save cycles
    pub id: NodeId,
    /// Node kind tag, resolved through the constructor registry
    pub kind: String,
    /// Editor canvas position (opaque to the runtime)
    #[serde(default)]
    pub position: (f64, f64),
    /// Editor canvas size (opaque to the runtime)
    #[serde(default)]
    pub size: Option<(f64, f64)>,
    /// Node settings / initial context as flexible JSON
    #[serde(default)]
    pub context: Value,
}

impl NodeRecord {
    pub fn new(id: impl Into<String>, kind: impl Into<String>, context: Value) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            position: (0.0, 0.0),
            size: None,
            context,
        }
    }

    /// Extract the settings map from the record's context object
    ///
    /// Non-object contexts yield an empty settings map rather than an error;
    /// the lenient import boundary treats malformed settings as absent.
    pub fn settings(&self) -> DataMap {
        match &self.context {
            Value::Object(map) => map.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            _ => DataMap::new(),
        }
    }
}

/// A persisted edge record
///
/// Names both endpoints and both port keys; the 4-tuple must be unique in the
/// live connection set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeRecord {
    pub source: NodeId,
    pub source_output: String,
    pub target: NodeId,
    pub target_input: String,
}

impl EdgeRecord {
    pub fn new(
        source: impl Into<String>,
        source_output: impl Into<String>,
        target: impl Into<String>,
        target_input: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into(),
            source_output: source_output.into(),
            target: target.into(),
            target_input: target_input.into(),
        }
    }
}

/// A complete persisted graph: node records plus edge records
///
/// This is the shape the persistence collaborator hands to the import
/// boundary and the module resolver returns for module delegate graphs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphRecord {
    pub nodes: Vec<NodeRecord>,
    pub edges: Vec<EdgeRecord>,
}

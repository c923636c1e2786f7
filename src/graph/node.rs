/// Live graph structure
///
/// Holds the wired node set and connection set with explicit adjacency
/// indexes (incoming/outgoing per node), incrementally maintained on every
/// edge add/remove. Connection creation enforces socket compatibility with
/// non-fatal notifications and keeps the dataflow subgraph acyclic.

use crate::error::RuntimeError;
use crate::graph::socket::Port;
use crate::graph::types::NodeId;
use crate::nodes::NodeBehavior;
use crate::runtime::actor::{ActorContext, ActorHandle};
use petgraph::algo::toposort;
use petgraph::graph::DiGraph;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::broadcast;

/// A wired node: ports, behavior, and its one actor
pub struct Node {
    pub id: NodeId,
    pub kind: String,
    pub inputs: BTreeMap<String, Port>,
    pub outputs: BTreeMap<String, Port>,
    pub behavior: Arc<dyn NodeBehavior>,
    pub actor: ActorHandle,
}

impl Node {
    pub fn context(&self) -> ActorContext {
        self.actor.context()
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("inputs", &self.inputs.keys().collect::<Vec<_>>())
            .field("outputs", &self.outputs.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Directed link from one node's output port to another node's input port
///
/// The full 4-tuple identifies a connection; duplicates are rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connection {
    pub source: NodeId,
    pub source_output: String,
    pub target: NodeId,
    pub target_input: String,
}

impl Connection {
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

/// Non-fatal editor notifications emitted by graph mutation
///
/// These surface recoverable rejections (incompatible sockets, duplicate
/// wires, missing ports) to UI collaborators without raising errors.
#[derive(Debug, Clone)]
pub enum Notification {
    IncompatibleSockets(Connection),
    DuplicateConnection(Connection),
    MissingPort(Connection),
}

/// Node set + connection set with adjacency indexes
pub struct Graph {
    nodes: HashMap<NodeId, Node>,
    connections: Vec<Connection>,
    incoming: HashMap<NodeId, Vec<Connection>>,
    outgoing: HashMap<NodeId, Vec<Connection>>,
    notifications: broadcast::Sender<Notification>,
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}

impl Graph {
    pub fn new() -> Self {
        let (notifications, _) = broadcast::channel(64);
        Self {
            nodes: HashMap::new(),
            connections: Vec::new(),
            incoming: HashMap::new(),
            outgoing: HashMap::new(),
            notifications,
        }
    }

    /// Subscribe to non-fatal graph notifications
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.notifications.subscribe()
    }

    pub fn add_node(&mut self, node: Node) {
        tracing::debug!("graph: added node '{}' (kind: {})", node.id, node.kind);
        self.nodes.insert(node.id.clone(), node);
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn node_mut(&mut self, id: &str) -> Option<&mut Node> {
        self.nodes.get_mut(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn node_ids(&self) -> Vec<NodeId> {
        self.nodes.keys().cloned().collect()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    /// Remove a node and sever every connection touching it
    pub fn remove_node(&mut self, id: &str) -> bool {
        if self.nodes.remove(id).is_none() {
            return false;
        }
        let severed: Vec<Connection> = self
            .connections
            .iter()
            .filter(|c| c.source == id || c.target == id)
            .cloned()
            .collect();
        for conn in severed {
            self.disconnect(&conn);
        }
        self.incoming.remove(id);
        self.outgoing.remove(id);
        true
    }

    /// Create a connection after checking ports, uniqueness and compatibility
    ///
    /// Recoverable rejections (missing port, duplicate, incompatible sockets)
    /// return `Ok(false)` and emit a notification. A dataflow cycle is the
    /// one hard error: the edge is rolled back and the offending node named.
    pub fn connect(&mut self, conn: Connection) -> Result<bool, RuntimeError> {
        let Some((source_port, target_port)) = self.endpoint_ports(&conn) else {
            tracing::warn!(
                "connection {}:{} -> {}:{} references a missing endpoint or port",
                conn.source, conn.source_output, conn.target, conn.target_input
            );
            let _ = self.notifications.send(Notification::MissingPort(conn));
            return Ok(false);
        };

        if self.connections.contains(&conn) {
            tracing::debug!(
                "duplicate connection rejected: {}:{} -> {}:{}",
                conn.source, conn.source_output, conn.target, conn.target_input
            );
            let _ = self.notifications.send(Notification::DuplicateConnection(conn));
            return Ok(false);
        }

        if !source_port.socket.is_compatible_with(&target_port.socket) {
            tracing::warn!(
                "incompatible sockets: {}:{} ({:?}) -> {}:{} ({:?})",
                conn.source,
                conn.source_output,
                source_port.socket.data_type,
                conn.target,
                conn.target_input,
                target_port.socket.data_type
            );
            let _ = self.notifications.send(Notification::IncompatibleSockets(conn));
            return Ok(false);
        }

        let is_data_edge = !source_port.is_trigger();
        self.insert_edge(conn.clone());

        // Trigger edges may revisit nodes; only the pure-data subgraph must
        // stay acyclic.
        if is_data_edge {
            if let Err(e) = self.assert_dataflow_acyclic() {
                self.disconnect(&conn);
                return Err(e);
            }
        }

        tracing::debug!(
            "graph: connected {}:{} -> {}:{}",
            conn.source, conn.source_output, conn.target, conn.target_input
        );
        Ok(true)
    }

    /// Remove one connection; adjacency indexes are updated in place
    pub fn disconnect(&mut self, conn: &Connection) -> bool {
        let Some(pos) = self.connections.iter().position(|c| c == conn) else {
            return false;
        };
        self.connections.remove(pos);
        if let Some(list) = self.outgoing.get_mut(&conn.source) {
            list.retain(|c| c != conn);
        }
        if let Some(list) = self.incoming.get_mut(&conn.target) {
            list.retain(|c| c != conn);
        }
        true
    }

    fn insert_edge(&mut self, conn: Connection) {
        self.outgoing
            .entry(conn.source.clone())
            .or_default()
            .push(conn.clone());
        self.incoming
            .entry(conn.target.clone())
            .or_default()
            .push(conn.clone());
        self.connections.push(conn);
    }

    fn endpoint_ports(&self, conn: &Connection) -> Option<(&Port, &Port)> {
        let source = self.nodes.get(&conn.source)?.outputs.get(&conn.source_output)?;
        let target = self.nodes.get(&conn.target)?.inputs.get(&conn.target_input)?;
        Some((source, target))
    }

    fn is_trigger_edge(&self, conn: &Connection) -> bool {
        self.nodes
            .get(&conn.source)
            .and_then(|n| n.outputs.get(&conn.source_output))
            .map(|p| p.is_trigger())
            .unwrap_or(false)
    }

    /// Incoming dataflow connections feeding one input key
    pub fn data_incomers(&self, id: &str, input_key: &str) -> Vec<Connection> {
        self.incoming
            .get(id)
            .map(|list| {
                list.iter()
                    .filter(|c| c.target_input == input_key && !self.is_trigger_edge(c))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Outgoing trigger connections sourced at one output key, in wire order
    pub fn trigger_outgoers(&self, id: &str, output_key: &str) -> Vec<Connection> {
        self.outgoing
            .get(id)
            .map(|list| {
                list.iter()
                    .filter(|c| c.source_output == output_key && self.is_trigger_edge(c))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Node ids fed by this node through dataflow edges
    pub fn data_outgoers(&self, id: &str) -> Vec<NodeId> {
        self.outgoing
            .get(id)
            .map(|list| {
                list.iter()
                    .filter(|c| !self.is_trigger_edge(c))
                    .map(|c| c.target.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Validate the dataflow subgraph (trigger edges excluded) is a DAG
    ///
    /// Builds a petgraph `DiGraph` over the data connections and runs a
    /// topological sort; a cycle is reported with the offending node's id.
    pub fn assert_dataflow_acyclic(&self) -> Result<(), RuntimeError> {
        let mut graph = DiGraph::<&str, ()>::new();
        let mut indexes = HashMap::new();
        for id in self.nodes.keys() {
            indexes.insert(id.as_str(), graph.add_node(id.as_str()));
        }
        for conn in &self.connections {
            if self.is_trigger_edge(conn) {
                continue;
            }
            if let (Some(&from), Some(&to)) = (
                indexes.get(conn.source.as_str()),
                indexes.get(conn.target.as_str()),
            ) {
                graph.add_edge(from, to, ());
            }
        }
        toposort(&graph, None).map_err(|cycle| {
            let node = graph[cycle.node_id()].to_string();
            tracing::error!("dataflow cycle detected involving node '{}'", node);
            RuntimeError::CycleDetected(node)
        })?;
        Ok(())
    }
}

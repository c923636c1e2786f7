/// Runtime execution layer
///
/// This module provides the per-node actor runtime plus the two engines that
/// share the live graph:
/// - DataFlow: pull-based, memoized, pure output resolution
/// - ControlFlow: push-based, trigger-driven side-effecting execution
/// `GraphRuntime` wires both engines to one graph together with the import
/// boundary and the output-change invalidation listener.

use crate::config::RuntimeConfig;
use crate::error::RuntimeError;
use crate::graph::import::NodeRegistry;
use crate::graph::node::{Connection, Graph, Node, Notification};
use crate::graph::types::{GraphRecord, NodeId};
use crate::storage::{MemoryStore, ModuleResolver, SnapshotStore};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::mpsc;

// Per-node finite-state actor with mailbox, observers and persistence
pub mod actor;

// Push-based trigger execution with explicit forward propagation
pub mod controlflow;

// Pull-based memoized output resolution
pub mod dataflow;

// Module composition: a subgraph exposed as a single node
pub mod module;

pub use actor::{wait_for_state, ActorContext, ActorEvent, ActorHandle, ActorState, NodeError};
pub use controlflow::{new_execution_id, ControlflowEngine, ExecCx};
pub use dataflow::DataflowEngine;
pub use module::ModuleInstance;

/// In-process signals emitted by live actors
#[derive(Debug, Clone)]
pub enum RuntimeSignal {
    /// A node's output context changed; its cache entry is stale
    OutputsChanged(NodeId),
}

/// Shared collaborators handed to node handlers and sub-runtimes
pub struct RuntimeServices {
    pub registry: Arc<NodeRegistry>,
    pub store: Arc<dyn SnapshotStore>,
    pub resolver: Arc<dyn ModuleResolver>,
    pub config: RuntimeConfig,
}

/// One live graph with its engines
///
/// Owns the wired graph, one DataFlow engine instance, one ControlFlow
/// engine instance, and the listener that reacts to actor output changes by
/// invalidating the changed node's cache entry and recomputing its
/// reachable descendants.
pub struct GraphRuntime {
    graph: Arc<RwLock<Graph>>,
    dataflow: Arc<DataflowEngine>,
    controlflow: Arc<ControlflowEngine>,
    services: Arc<RuntimeServices>,
    signals: mpsc::UnboundedSender<RuntimeSignal>,
}

impl GraphRuntime {
    /// Wire a fresh runtime over an empty graph
    ///
    /// Must be called from within a tokio runtime: the invalidation listener
    /// and every imported node's actor run as spawned tasks.
    pub fn new(
        registry: Arc<NodeRegistry>,
        store: Arc<dyn SnapshotStore>,
        resolver: Arc<dyn ModuleResolver>,
        config: RuntimeConfig,
    ) -> Self {
        let graph = Arc::new(RwLock::new(Graph::new()));
        let dataflow = Arc::new(DataflowEngine::new(graph.clone()));
        let services = Arc::new(RuntimeServices {
            registry,
            store,
            resolver,
            config,
        });
        let controlflow = Arc::new(ControlflowEngine::new(
            graph.clone(),
            dataflow.clone(),
            services.clone(),
        ));

        let (signals, mut signal_rx) = mpsc::unbounded_channel();
        let listener_dataflow = dataflow.clone();
        tokio::spawn(async move {
            while let Some(signal) = signal_rx.recv().await {
                match signal {
                    RuntimeSignal::OutputsChanged(node_id) => {
                        tracing::debug!(
                            "outputs changed for '{}', recomputing descendants",
                            node_id
                        );
                        listener_dataflow.invalidate(&node_id);
                        listener_dataflow.recompute_descendants(&node_id);
                    }
                }
            }
        });

        Self {
            graph,
            dataflow,
            controlflow,
            services,
            signals,
        }
    }

    /// Test/ephemeral convenience: in-memory store and resolver
    pub fn in_memory(registry: Arc<NodeRegistry>, config: RuntimeConfig) -> Self {
        let store = Arc::new(MemoryStore::new());
        Self::new(registry, store.clone(), store, config)
    }

    pub fn dataflow(&self) -> &Arc<DataflowEngine> {
        &self.dataflow
    }

    pub fn controlflow(&self) -> &Arc<ControlflowEngine> {
        &self.controlflow
    }

    pub fn services(&self) -> &Arc<RuntimeServices> {
        &self.services
    }

    /// Read access to the live graph
    pub fn with_graph<R>(&self, f: impl FnOnce(&Graph) -> R) -> R {
        f(&self.graph_read())
    }

    fn graph_read(&self) -> RwLockReadGuard<'_, Graph> {
        self.graph.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn graph_write(&self) -> RwLockWriteGuard<'_, Graph> {
        self.graph.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Subscribe to non-fatal graph notifications (editor observers)
    pub fn subscribe_notifications(&self) -> tokio::sync::broadcast::Receiver<Notification> {
        self.graph_read().subscribe()
    }

    /// Import a persisted record set into the live graph
    ///
    /// Node construction goes through the kind registry (unknown kind is a
    /// hard error); nodes whose id is already live are skipped so import is
    /// idempotent. Edges referencing missing endpoints or ports are silently
    /// skipped, a known lenient-import tradeoff.
    pub fn import<'a>(
        &'a self,
        record: &'a GraphRecord,
    ) -> Pin<Box<dyn Future<Output = Result<(), RuntimeError>> + Send + 'a>> {
        Box::pin(async move {
            for node_record in &record.nodes {
                if self.with_graph(|g| g.contains(&node_record.id)) {
                    tracing::debug!("import: node '{}' already live, skipped", node_record.id);
                    continue;
                }
                let behavior = self
                    .services
                    .registry
                    .get(&node_record.kind)
                    .ok_or_else(|| RuntimeError::UnknownNodeKind(node_record.kind.clone()))?;

                let settings = node_record.settings();
                let ports = behavior.ports(&settings);

                let snapshot = match self.services.store.load(&node_record.id).await {
                    Ok(blob) => blob,
                    Err(e) => {
                        tracing::warn!("snapshot load for '{}' failed: {}", node_record.id, e);
                        None
                    }
                };
                let initial = match snapshot
                    .and_then(|blob| serde_json::from_value::<actor::ActorContext>(blob).ok())
                {
                    Some(mut ctx) => {
                        // The record is authoritative for settings, the
                        // snapshot for accumulated state.
                        ctx.settings = settings;
                        ctx
                    }
                    None => behavior.initial_context(settings),
                };

                let handle = actor::spawn_actor(actor::ActorSpawn {
                    node_id: node_record.id.clone(),
                    persist_key: node_record.id.clone(),
                    table: behavior.transitions(),
                    initial,
                    store: self.services.store.clone(),
                    signals: Some(self.signals.clone()),
                    debounce: self.services.config.persist_debounce,
                });

                self.graph_write().add_node(Node {
                    id: node_record.id.clone(),
                    kind: node_record.kind.clone(),
                    inputs: ports.inputs,
                    outputs: ports.outputs,
                    behavior,
                    actor: handle,
                });
            }

            // Module nodes mirror ports from their delegate graph; sync them
            // before edges are wired so connections to mirrored ports hold.
            let module_nodes: Vec<NodeId> = self.with_graph(|g| {
                g.nodes()
                    .filter(|n| n.kind == crate::nodes::module::KIND)
                    .map(|n| n.id.clone())
                    .collect()
            });
            for node_id in module_nodes {
                if let Err(e) = self.update_module(&node_id).await {
                    tracing::warn!("import: module node '{}' not synced: {}", node_id, e);
                }
            }

            for edge in &record.edges {
                let endpoints_exist = self.with_graph(|g| {
                    g.node(&edge.source)
                        .map(|n| n.outputs.contains_key(&edge.source_output))
                        .unwrap_or(false)
                        && g.node(&edge.target)
                            .map(|n| n.inputs.contains_key(&edge.target_input))
                            .unwrap_or(false)
                });
                if !endpoints_exist {
                    tracing::debug!(
                        "import: skipping edge {}:{} -> {}:{} (missing endpoint or port)",
                        edge.source,
                        edge.source_output,
                        edge.target,
                        edge.target_input
                    );
                    continue;
                }
                self.graph_write().connect(Connection::new(
                    edge.source.clone(),
                    edge.source_output.clone(),
                    edge.target.clone(),
                    edge.target_input.clone(),
                ))?;
            }
            Ok(())
        })
    }

    /// Create a connection in the live graph (compatibility-checked)
    pub fn connect(&self, conn: Connection) -> Result<bool, RuntimeError> {
        self.graph_write().connect(conn)
    }

    pub fn disconnect(&self, conn: &Connection) -> bool {
        self.graph_write().disconnect(conn)
    }

    pub fn remove_node(&self, node_id: &str) -> bool {
        self.graph_write().remove_node(node_id)
    }

    /// Handle to a node's actor
    pub fn actor(&self, node_id: &str) -> Option<ActorHandle> {
        self.graph_read().node(node_id).map(|n| n.actor.clone())
    }

    /// Send an event to a node's actor
    pub fn send(&self, node_id: &str, event: ActorEvent) -> Result<(), RuntimeError> {
        let actor = self
            .actor(node_id)
            .ok_or_else(|| RuntimeError::NodeNotFound(node_id.to_string()))?;
        actor.send(event);
        Ok(())
    }

    /// Externally initiated top-level fetch: reset the session, then pull
    pub fn resolve(&self, node_id: &str) -> Result<crate::graph::types::DataMap, RuntimeError> {
        self.dataflow.reset();
        self.dataflow.fetch(node_id)
    }

    /// Resolve a node's normalized inputs (connected values plus control
    /// defaults)
    pub fn resolve_inputs(
        &self,
        node_id: &str,
    ) -> Result<crate::graph::types::DataMap, RuntimeError> {
        self.dataflow.resolve_inputs(node_id)
    }

    /// Trigger-driven execution entry point
    pub async fn execute(
        &self,
        node_id: &str,
        input: Option<&str>,
        execution_id: Option<&str>,
    ) -> Result<(), RuntimeError> {
        self.controlflow.execute(node_id, input, execution_id).await
    }

    /// Re-synchronize a module node's mirrored ports from its delegate graph
    pub async fn update_module(&self, node_id: &str) -> Result<(), RuntimeError> {
        module::update_module(self, node_id).await
    }
}

/// Push-based, trigger-driven controlflow engine
///
/// Executes nodes on explicit trigger rather than by walking the whole
/// graph. A node's execute handler propagates by calling `forward` with an
/// output trigger key; the engine then executes every connected target,
/// depth-first in wire order. Handler failures become actor error state and
/// never halt sibling branches.

use crate::error::RuntimeError;
use crate::graph::node::Graph;
use crate::graph::types::{DataMap, NodeId};
use crate::nodes::NodeBehavior;
use crate::runtime::actor::{
    spawn_actor, ActorContext, ActorEvent, ActorHandle, ActorSpawn, NodeError,
};
use crate::runtime::dataflow::DataflowEngine;
use crate::runtime::RuntimeServices;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

/// Fresh execution id for a run-scoped (replayable) execution
pub fn new_execution_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Per-invocation context handed to a node's execute handler
///
/// Carries the resolved inputs, stages outputs (applied to the actor on
/// success), and records `forward` calls for the engine to propagate.
pub struct ExecCx {
    node_id: NodeId,
    kind: String,
    inputs: DataMap,
    execution_id: Option<String>,
    actor: ActorHandle,
    services: Arc<RuntimeServices>,
    forwards: Vec<String>,
    outputs: DataMap,
}

impl ExecCx {
    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn inputs(&self) -> &DataMap {
        &self.inputs
    }

    pub fn input(&self, key: &str) -> Option<&Value> {
        self.inputs.get(key)
    }

    /// Stage an output value; applied to the actor when the handler succeeds
    pub fn set_output(&mut self, key: impl Into<String>, value: Value) {
        self.outputs.insert(key.into(), value);
    }

    /// Propagate a trigger through the named output after the handler returns
    pub fn forward(&mut self, key: impl Into<String>) {
        self.forwards.push(key.into());
    }

    pub fn execution_id(&self) -> Option<&str> {
        self.execution_id.as_deref()
    }

    /// Settings snapshot of the executing actor
    pub fn settings(&self) -> DataMap {
        self.actor.context().settings
    }

    pub fn actor(&self) -> &ActorHandle {
        &self.actor
    }

    /// Shared collaborators (registry, store, module resolver, config)
    pub fn services(&self) -> &Arc<RuntimeServices> {
        &self.services
    }
}

pub struct ControlflowEngine {
    graph: Arc<RwLock<Graph>>,
    dataflow: Arc<DataflowEngine>,
    services: Arc<RuntimeServices>,
    /// Run-scoped actor replicas keyed by `{execution_id}:{node_id}`
    replays: Mutex<HashMap<String, ActorHandle>>,
}

impl ControlflowEngine {
    pub fn new(
        graph: Arc<RwLock<Graph>>,
        dataflow: Arc<DataflowEngine>,
        services: Arc<RuntimeServices>,
    ) -> Self {
        Self {
            graph,
            dataflow,
            services,
            replays: Mutex::new(HashMap::new()),
        }
    }

    /// Execute one node and propagate its forwarded triggers
    ///
    /// With an `execution_id`, actor snapshot lookup and persistence are
    /// scoped to that execution record instead of the live editing-time
    /// actor, so a historical run replays without mutating live state.
    pub async fn execute(
        &self,
        node_id: &str,
        input: Option<&str>,
        execution_id: Option<&str>,
    ) -> Result<(), RuntimeError> {
        self.execute_boxed(
            node_id.to_string(),
            input.map(Into::into),
            execution_id.map(Into::into),
        )
        .await
    }

    fn execute_boxed(
        &self,
        node_id: String,
        input: Option<String>,
        execution_id: Option<String>,
    ) -> Pin<Box<dyn Future<Output = Result<(), RuntimeError>> + Send + '_>> {
        Box::pin(async move {
            let start = std::time::Instant::now();
            let (behavior, live_actor, kind) = {
                let graph = self.graph.read().unwrap_or_else(PoisonError::into_inner);
                let node = graph
                    .node(&node_id)
                    .ok_or_else(|| RuntimeError::NodeNotFound(node_id.clone()))?;
                (node.behavior.clone(), node.actor.clone(), node.kind.clone())
            };
            tracing::info!("executing node '{}' (kind: {})", node_id, kind);

            let actor = match &execution_id {
                Some(exec) => self.replay_actor(&node_id, exec, &behavior, &live_actor).await?,
                None => live_actor,
            };

            let inputs = self.dataflow.resolve_inputs(&node_id)?;
            actor.send(ActorEvent::Run {
                inputs: Some(inputs.clone()),
            });

            let mut cx = ExecCx {
                node_id: node_id.clone(),
                kind,
                inputs,
                execution_id: execution_id.clone(),
                actor: actor.clone(),
                services: self.services.clone(),
                forwards: Vec::new(),
                outputs: DataMap::new(),
            };

            match behavior.execute(&mut cx, input.as_deref()).await {
                Ok(()) => {
                    actor.send(ActorEvent::Done {
                        outputs: cx.outputs.clone(),
                    });
                }
                Err(e) => {
                    // Production errors become actor state; propagation ends
                    // here and sibling branches stay untouched.
                    let name = match e.downcast_ref::<RuntimeError>() {
                        Some(RuntimeError::WaitTimeout { .. }) => "TimeoutError",
                        _ => "ExecutionError",
                    };
                    tracing::warn!("node '{}' execution failed: {:#}", node_id, e);
                    actor.send(ActorEvent::Fail {
                        error: NodeError::new(name, e.to_string()),
                    });
                    return Ok(());
                }
            }

            tracing::info!("node '{}' completed in {:?}", node_id, start.elapsed());

            let forwards = cx.forwards;
            for key in forwards {
                let targets: Vec<(NodeId, String)> = {
                    let graph = self.graph.read().unwrap_or_else(PoisonError::into_inner);
                    graph
                        .trigger_outgoers(&node_id, &key)
                        .into_iter()
                        .map(|c| (c.target, c.target_input))
                        .collect()
                };
                // Depth-first, in wire order: for chain A -> B -> C, B's whole
                // subtree executes before any sibling of B.
                for (target, label) in targets {
                    self.execute_boxed(target, Some(label), execution_id.clone())
                        .await?;
                }
            }
            Ok(())
        })
    }

    /// Fetch or spawn the run-scoped actor replica for `(execution_id, node)`
    ///
    /// Seeded from the snapshot stored under the scoped key (falling back to
    /// the behavior default with the live node's settings) and persisted back
    /// under the scoped key. Replicas emit no invalidation signals, so replay
    /// never disturbs the live dataflow cache.
    async fn replay_actor(
        &self,
        node_id: &str,
        execution_id: &str,
        behavior: &Arc<dyn NodeBehavior>,
        live_actor: &ActorHandle,
    ) -> Result<ActorHandle, RuntimeError> {
        let key = format!("{execution_id}:{node_id}");
        if let Some(handle) = self
            .replays
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
        {
            return Ok(handle.clone());
        }

        let snapshot = match self.services.store.load(&key).await {
            Ok(blob) => blob,
            Err(e) => {
                tracing::warn!("snapshot load for '{}' failed: {}", key, e);
                None
            }
        };
        // Without a prior scoped snapshot the replica starts from the live
        // actor's current context, so a node already walked into a non-idle
        // state (a connected module node, say) replays from that state.
        let initial = snapshot
            .and_then(|blob| serde_json::from_value::<ActorContext>(blob).ok())
            .unwrap_or_else(|| live_actor.context());

        let handle = spawn_actor(ActorSpawn {
            node_id: node_id.to_string(),
            persist_key: key.clone(),
            table: behavior.transitions(),
            initial,
            store: self.services.store.clone(),
            signals: None,
            debounce: self.services.config.persist_debounce,
        });

        let mut replays = self.replays.lock().unwrap_or_else(PoisonError::into_inner);
        // A concurrent call may have spawned the same replica; keep the first.
        let entry = replays.entry(key).or_insert_with(|| handle.clone());
        Ok(entry.clone())
    }
}

/// Pull-based memoized dataflow engine
///
/// Computes a node's outputs purely as a function of its transitively
/// connected inputs. Results are memoized in an engine-owned session cache:
/// one engine instance per live graph, never a process-wide singleton, so
/// concurrently open graphs stay isolated.

use crate::error::RuntimeError;
use crate::graph::node::Graph;
use crate::graph::types::{DataMap, NodeId};
use serde_json::Value;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard};

pub struct DataflowEngine {
    graph: Arc<RwLock<Graph>>,
    /// Per-session memoization cache, keyed by node id
    cache: Mutex<HashMap<NodeId, DataMap>>,
}

impl DataflowEngine {
    pub fn new(graph: Arc<RwLock<Graph>>) -> Self {
        Self {
            graph,
            cache: Mutex::new(HashMap::new()),
        }
    }

    fn graph(&self) -> RwLockReadGuard<'_, Graph> {
        self.graph.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Memoized fetch of one node's output map
    ///
    /// Cache hits return immediately; otherwise every feeder node is fetched
    /// recursively, the node's pure production function runs on the
    /// assembled inputs, and the result is cached for the session.
    pub fn fetch(&self, node_id: &str) -> Result<DataMap, RuntimeError> {
        let mut visiting = HashSet::new();
        self.fetch_guarded(node_id, &mut visiting)
    }

    fn fetch_guarded(
        &self,
        node_id: &str,
        visiting: &mut HashSet<NodeId>,
    ) -> Result<DataMap, RuntimeError> {
        if let Some(hit) = self
            .cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(node_id)
        {
            tracing::debug!("dataflow: cache hit for '{}'", node_id);
            return Ok(hit.clone());
        }

        // Construction already forbids dataflow cycles; a revisit here means
        // the graph was corrupted and must not be silently recursed.
        if !visiting.insert(node_id.to_string()) {
            return Err(RuntimeError::CycleDetected(node_id.to_string()));
        }

        let inputs = self.fetch_inputs_guarded(node_id, visiting)?;

        let (behavior, actor, ctx) = {
            let graph = self.graph();
            let node = graph
                .node(node_id)
                .ok_or_else(|| RuntimeError::NodeNotFound(node_id.to_string()))?;
            (node.behavior.clone(), node.actor.clone(), node.context())
        };

        let outputs = match behavior.data(node_id, &inputs, &ctx) {
            Ok(outputs) => outputs,
            Err(e) => {
                // Production errors become actor state, not engine faults.
                tracing::warn!("dataflow: production failed for '{}': {}", node_id, e);
                actor.send(crate::runtime::actor::ActorEvent::Fail {
                    error: crate::runtime::actor::NodeError::new("ProductionError", e.to_string()),
                });
                DataMap::new()
            }
        };

        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(node_id.to_string(), outputs.clone());
        visiting.remove(node_id);
        Ok(outputs)
    }

    /// Resolve one node's inputs from its incoming dataflow connections
    ///
    /// Per input key: one value per connection, pulled from the source
    /// node's fetched outputs. Multi-connection ports yield arrays, single
    /// ports the lone resolved value. Unconnected keys stay absent.
    pub fn fetch_inputs(&self, node_id: &str) -> Result<DataMap, RuntimeError> {
        let mut visiting = HashSet::new();
        visiting.insert(node_id.to_string());
        self.fetch_inputs_guarded(node_id, &mut visiting)
    }

    fn fetch_inputs_guarded(
        &self,
        node_id: &str,
        visiting: &mut HashSet<NodeId>,
    ) -> Result<DataMap, RuntimeError> {
        // Collect the resolution plan first so no lock is held while the
        // recursion re-enters the graph.
        let plan: Vec<(String, bool, Vec<(NodeId, String)>)> = {
            let graph = self.graph();
            let node = graph
                .node(node_id)
                .ok_or_else(|| RuntimeError::NodeNotFound(node_id.to_string()))?;
            node.inputs
                .iter()
                .filter(|(_, port)| !port.is_trigger())
                .map(|(key, port)| {
                    let sources = graph
                        .data_incomers(node_id, key)
                        .into_iter()
                        .map(|c| (c.source, c.source_output))
                        .collect();
                    (key.clone(), port.multiple_connections, sources)
                })
                .collect()
        };

        let mut inputs = DataMap::new();
        for (key, multiple, sources) in plan {
            if sources.is_empty() {
                continue;
            }
            let mut values = Vec::with_capacity(sources.len());
            for (source, output_key) in sources {
                let outputs = self.fetch_guarded(&source, visiting)?;
                values.push(outputs.get(&output_key).cloned().unwrap_or(Value::Null));
            }
            let resolved = if multiple {
                Value::Array(values)
            } else {
                values.into_iter().next().unwrap_or(Value::Null)
            };
            inputs.insert(key, resolved);
        }
        Ok(inputs)
    }

    /// Clear the whole session cache
    ///
    /// Must run at the start of every externally initiated top-level fetch so
    /// stale values never leak across unrelated invocations.
    pub fn reset(&self) {
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        tracing::debug!("dataflow: session cache reset");
    }

    /// Drop a single cache entry; safe concurrently with in-flight fetches
    pub fn invalidate(&self, node_id: &str) {
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(node_id);
    }

    /// Full input resolution: reset, resolve, backfill defaults
    ///
    /// Still-missing keys are backfilled from each input port's control
    /// default. Connection-shape normalization (multi ports to arrays, single
    /// ports to the lone value) already happened in `fetch_inputs`; a genuine
    /// array value travelling over one wire passes through untouched.
    pub fn resolve_inputs(&self, node_id: &str) -> Result<DataMap, RuntimeError> {
        self.reset();
        let mut inputs = self.fetch_inputs(node_id)?;

        let defaults: Vec<(String, Option<Value>)> = {
            let graph = self.graph();
            let node = graph
                .node(node_id)
                .ok_or_else(|| RuntimeError::NodeNotFound(node_id.to_string()))?;
            node.inputs
                .iter()
                .filter(|(_, port)| !port.is_trigger())
                .map(|(key, port)| {
                    let default = port.control.as_ref().and_then(|c| c.default.clone());
                    (key.clone(), default)
                })
                .collect()
        };

        for (key, default) in defaults {
            if !inputs.contains_key(&key) {
                if let Some(default) = default {
                    inputs.insert(key, default);
                }
            }
        }
        Ok(inputs)
    }

    /// Ancestor invalidation: recompute everything downstream of a change
    ///
    /// Walks the outgoing dataflow adjacency breadth-first (the nodes
    /// reachable from this one, not the whole graph), invalidating and
    /// re-fetching each descendant.
    pub fn recompute_descendants(&self, node_id: &str) {
        let order = {
            let graph = self.graph();
            let mut reachable = Vec::new();
            let mut seen = HashSet::new();
            let mut queue = VecDeque::new();
            queue.push_back(node_id.to_string());
            seen.insert(node_id.to_string());
            while let Some(current) = queue.pop_front() {
                for next in graph.data_outgoers(&current) {
                    if seen.insert(next.clone()) {
                        reachable.push(next.clone());
                        queue.push_back(next);
                    }
                }
            }
            reachable
        };

        for descendant in order {
            self.invalidate(&descendant);
            if let Err(e) = self.fetch(&descendant) {
                tracing::warn!("dataflow: recompute of '{}' failed: {}", descendant, e);
            }
        }
    }
}

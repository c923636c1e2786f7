/// Module composition support
///
/// A module is a named subgraph with designated Input and Output boundary
/// nodes. A module node mirrors the boundary ports as its own public ports
/// and delegates execution to an ephemeral instantiation of the subgraph;
/// the shared definition is never mutated.

use crate::error::RuntimeError;
use crate::graph::socket::Port;
use crate::graph::types::{DataMap, NodeId};
use crate::nodes::{NodePorts, TRIGGER_IN, TRIGGER_OUT};
use crate::runtime::{GraphRuntime, RuntimeServices};
use crate::storage::MemoryStore;
use serde_json::Value;
use std::sync::Arc;

/// Ephemeral, fully wired copy of a module's delegate graph
///
/// Rebuilt from the resolver on every update and every trigger; nothing is
/// cached per module id. Actors of the instance persist to a throwaway
/// in-memory store so delegated runs never write over live snapshots.
pub struct ModuleInstance {
    module_id: String,
    runtime: GraphRuntime,
    input_nodes: Vec<NodeId>,
    output_nodes: Vec<NodeId>,
}

impl ModuleInstance {
    /// Resolve and instantiate the delegate graph
    ///
    /// A module the resolver cannot supply is fatal to the attempted
    /// operation; there is no meaningful partial result.
    pub async fn build(
        services: &Arc<RuntimeServices>,
        module_id: &str,
    ) -> Result<Self, RuntimeError> {
        let record = services
            .resolver
            .resolve(module_id)
            .await
            .map_err(RuntimeError::Storage)?
            .ok_or_else(|| RuntimeError::ModuleNotFound(module_id.to_string()))?;

        let runtime = GraphRuntime::new(
            services.registry.clone(),
            Arc::new(MemoryStore::new()),
            services.resolver.clone(),
            services.config.clone(),
        );
        runtime.import(&record).await?;

        let (mut input_nodes, mut output_nodes) = runtime.with_graph(|g| {
            let inputs: Vec<NodeId> = g
                .nodes()
                .filter(|n| n.kind == crate::nodes::io::INPUT_KIND)
                .map(|n| n.id.clone())
                .collect();
            let outputs: Vec<NodeId> = g
                .nodes()
                .filter(|n| n.kind == crate::nodes::io::OUTPUT_KIND)
                .map(|n| n.id.clone())
                .collect();
            (inputs, outputs)
        });
        input_nodes.sort();
        output_nodes.sort();

        tracing::debug!(
            "module '{}' instantiated: {} input, {} output boundary nodes",
            module_id,
            input_nodes.len(),
            output_nodes.len()
        );

        Ok(Self {
            module_id: module_id.to_string(),
            runtime,
            input_nodes,
            output_nodes,
        })
    }

    pub fn runtime(&self) -> &GraphRuntime {
        &self.runtime
    }

    pub fn input_nodes(&self) -> &[NodeId] {
        &self.input_nodes
    }

    pub fn output_nodes(&self) -> &[NodeId] {
        &self.output_nodes
    }

    /// Verify the chosen Input boundary node exists in this instance
    pub fn ensure_input(&self, input_node: &str) -> Result<(), RuntimeError> {
        if self.input_nodes.iter().any(|id| id == input_node) {
            Ok(())
        } else {
            Err(RuntimeError::MissingBoundary {
                module: self.module_id.clone(),
                node: input_node.to_string(),
            })
        }
    }

    /// Public port set derived from the boundary nodes
    ///
    /// The module node's inputs mirror the chosen Input node's data output
    /// sockets; its outputs mirror every Output node's captured value, keyed
    /// by each Output node's configured name.
    pub fn boundary_ports(&self, input_node: &str) -> Result<NodePorts, RuntimeError> {
        self.ensure_input(input_node)?;

        let mut ports = NodePorts::default()
            .input(TRIGGER_IN, Port::trigger(TRIGGER_IN))
            .output(TRIGGER_OUT, Port::trigger(TRIGGER_OUT));

        self.runtime.with_graph(|g| {
            if let Some(node) = g.node(input_node) {
                for (key, port) in &node.outputs {
                    if !port.is_trigger() {
                        ports
                            .inputs
                            .insert(key.clone(), Port::data(key.clone(), port.socket.data_type));
                    }
                }
            }
            for output_id in &self.output_nodes {
                let Some(node) = g.node(output_id) else { continue };
                let name = output_name(&node.context().settings, output_id);
                let data_type = node
                    .inputs
                    .get("value")
                    .map(|p| p.socket.data_type)
                    .unwrap_or(crate::graph::socket::DataType::Any);
                ports.outputs.insert(name.clone(), Port::data(name, data_type));
            }
        });
        Ok(ports)
    }

    /// Read back every Output node's captured value keyed by configured name
    pub fn output_values(&self) -> DataMap {
        let mut values = DataMap::new();
        self.runtime.with_graph(|g| {
            for output_id in &self.output_nodes {
                let Some(node) = g.node(output_id) else { continue };
                let ctx = node.context();
                let name = output_name(&ctx.settings, output_id);
                let value = ctx.outputs.get(&name).cloned().unwrap_or(Value::Null);
                values.insert(name, value);
            }
        });
        values
    }
}

/// An Output boundary node's public name: its `name` setting, else its id
pub fn output_name(settings: &DataMap, node_id: &str) -> String {
    settings
        .get("name")
        .and_then(Value::as_str)
        .unwrap_or(node_id)
        .to_string()
}

/// Re-synchronize a module node's ports against its delegate graph
///
/// Reconstructs an ephemeral instance, derives the available port set from
/// the boundary nodes, and replaces the host node's ports, severing host
/// connections to ports that no longer exist upstream. An unconfigured
/// module node keeps only its base trigger ports.
pub async fn update_module(runtime: &GraphRuntime, node_id: &str) -> Result<(), RuntimeError> {
    let actor = runtime
        .actor(node_id)
        .ok_or_else(|| RuntimeError::NodeNotFound(node_id.to_string()))?;
    let settings = actor.context().settings;
    let module_id = settings.get("module").and_then(Value::as_str);
    let input_choice = settings.get("input").and_then(Value::as_str);

    let desired = match (module_id, input_choice) {
        (Some(module_id), Some(input_choice)) => {
            let instance = ModuleInstance::build(runtime.services(), module_id).await?;
            instance.boundary_ports(input_choice)?
        }
        _ => NodePorts::default()
            .input(TRIGGER_IN, Port::trigger(TRIGGER_IN))
            .output(TRIGGER_OUT, Port::trigger(TRIGGER_OUT)),
    };

    let stale: Vec<crate::graph::node::Connection> = runtime.with_graph(|g| {
        g.connections()
            .iter()
            .filter(|c| {
                (c.target == node_id && !desired.inputs.contains_key(&c.target_input))
                    || (c.source == node_id && !desired.outputs.contains_key(&c.source_output))
            })
            .cloned()
            .collect()
    });
    for conn in &stale {
        tracing::debug!(
            "module '{}': severing connection to removed port ({}:{} -> {}:{})",
            node_id,
            conn.source,
            conn.source_output,
            conn.target,
            conn.target_input
        );
        runtime.disconnect(conn);
    }

    {
        let mut graph = runtime.graph_write();
        let node = graph
            .node_mut(node_id)
            .ok_or_else(|| RuntimeError::NodeNotFound(node_id.to_string()))?;
        node.inputs = desired.inputs;
        node.outputs = desired.outputs;
    }
    Ok(())
}

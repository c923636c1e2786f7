/// Built-in node behavior library
///
/// A behavior supplies everything a node kind needs at runtime: its port
/// layout, its transition table, its pure `data` production function (for the
/// DataFlow engine) and its side-effecting `execute` handler (for the
/// ControlFlow engine).

use crate::graph::socket::Port;
use crate::graph::types::DataMap;
use crate::runtime::actor::{ActorContext, TransitionTable};
use crate::runtime::controlflow::ExecCx;
use async_trait::async_trait;
use std::collections::BTreeMap;

pub mod delay;
pub mod http;
pub mod io;
pub mod module;
pub mod script;
pub mod template;

pub use delay::DelayNode;
pub use http::HttpRequestNode;
pub use io::{InputNode, OutputNode};
pub use module::ModuleNode;
pub use script::ScriptNode;
pub use template::TemplateNode;

/// Trigger input port name shared by the built-in kinds
pub const TRIGGER_IN: &str = "exec";
/// Trigger output port name shared by the built-in kinds
pub const TRIGGER_OUT: &str = "done";

/// Port layout derived from a node's settings at construction time
#[derive(Debug, Clone, Default)]
pub struct NodePorts {
    pub inputs: BTreeMap<String, Port>,
    pub outputs: BTreeMap<String, Port>,
}

impl NodePorts {
    pub fn input(mut self, key: impl Into<String>, port: Port) -> Self {
        self.inputs.insert(key.into(), port);
        self
    }

    pub fn output(mut self, key: impl Into<String>, port: Port) -> Self {
        self.outputs.insert(key.into(), port);
        self
    }
}

/// Per-kind node contract consumed by both engines
///
/// `data` must be pure: a function of the assembled inputs and the actor
/// context only. `execute` owns side effects and trigger propagation via
/// `cx.forward`; an error return is captured into the actor's error context
/// and never propagates as an engine fault.
#[async_trait]
pub trait NodeBehavior: Send + Sync {
    /// Kind tag this behavior registers under
    fn kind(&self) -> &'static str;

    /// Port layout for a node instance with the given settings
    fn ports(&self, settings: &DataMap) -> NodePorts;

    /// State machine for this kind; canonical unless overridden
    fn transitions(&self) -> TransitionTable {
        TransitionTable::canonical()
    }

    /// Fresh default context when no prior snapshot exists
    fn initial_context(&self, settings: DataMap) -> ActorContext {
        ActorContext::with_settings(settings)
    }

    /// Pure production function for the DataFlow engine
    ///
    /// The default exposes the actor's stored outputs, which suits source
    /// nodes whose values are injected rather than computed.
    fn data(
        &self,
        node_id: &str,
        inputs: &DataMap,
        ctx: &ActorContext,
    ) -> anyhow::Result<DataMap> {
        let _ = (node_id, inputs);
        Ok(ctx.outputs.clone())
    }

    /// Side-effecting trigger handler for the ControlFlow engine
    async fn execute(&self, cx: &mut ExecCx, input: Option<&str>) -> anyhow::Result<()>;
}

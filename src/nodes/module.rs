/// Module node
///
/// Hosts a named subgraph as a single node. Its ports are mirrored from the
/// delegate graph's boundary nodes by `update_module`; here the base layout
/// is trigger-only until a module and Input boundary are chosen. Execution
/// instantiates the delegate graph, injects the host inputs into the chosen
/// Input node, runs it, and reads every Output node's captured value back.

use crate::graph::socket::Port;
use crate::graph::types::DataMap;
use crate::nodes::{NodeBehavior, NodePorts, TRIGGER_IN, TRIGGER_OUT};
use crate::runtime::actor::{wait_for_state, ActorEvent, ActorState, TransitionTable};
use crate::runtime::controlflow::ExecCx;
use crate::runtime::module::ModuleInstance;
use anyhow::anyhow;
use async_trait::async_trait;
use serde_json::Value;

pub const KIND: &str = "module";

pub struct ModuleNode;

#[async_trait]
impl NodeBehavior for ModuleNode {
    fn kind(&self) -> &'static str {
        KIND
    }

    /// Base layout only; mirrored data ports come from `update_module`
    fn ports(&self, _settings: &DataMap) -> NodePorts {
        NodePorts::default()
            .input(TRIGGER_IN, Port::trigger(TRIGGER_IN))
            .output(TRIGGER_OUT, Port::trigger(TRIGGER_OUT))
    }

    fn transitions(&self) -> TransitionTable {
        TransitionTable::module()
    }

    async fn execute(&self, cx: &mut ExecCx, _input: Option<&str>) -> anyhow::Result<()> {
        let settings = cx.settings();
        let module_id = settings
            .get("module")
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow!("module node '{}' has no module chosen", cx.node_id()))?
            .to_string();
        let input_id = settings
            .get("input")
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow!("module node '{}' has no input boundary chosen", cx.node_id()))?
            .to_string();

        let services = cx.services().clone();
        let instance = ModuleInstance::build(&services, &module_id).await?;
        instance.ensure_input(&input_id)?;

        // Host inputs become the Input boundary node's source values.
        let injected: DataMap = cx
            .inputs()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        let input_actor = instance
            .runtime()
            .actor(&input_id)
            .ok_or_else(|| anyhow!("module '{module_id}' lost boundary node '{input_id}'"))?;
        input_actor.send(ActorEvent::SetOutputs {
            outputs: injected.clone(),
        });
        // The event lands asynchronously on the actor mailbox; the delegated
        // run must not resolve inputs before it is applied.
        let mut observed = input_actor.subscribe();
        observed
            .wait_for(|ctx| injected.iter().all(|(k, v)| ctx.outputs.get(k) == Some(v)))
            .await
            .map_err(|_| anyhow!("input boundary actor '{input_id}' stopped"))?;

        // The instance is private to this invocation, so the delegated run
        // needs no scoping of its own; the host engine already scopes this
        // module node's actor when an execution id is present.
        instance.runtime().execute(&input_id, None, None).await?;
        wait_for_state(&input_actor, ActorState::Complete, &services.config).await?;

        for (name, value) in instance.output_values() {
            cx.set_output(name, value);
        }
        cx.forward(TRIGGER_OUT);
        Ok(())
    }
}

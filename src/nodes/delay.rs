/// Delay node
///
/// Suspends its own branch for a configured number of milliseconds, then
/// forwards. Because execution is cooperative, parallel branches keep
/// running while a delay is pending.

use crate::graph::socket::Port;
use crate::graph::types::DataMap;
use crate::nodes::{NodeBehavior, NodePorts, TRIGGER_IN, TRIGGER_OUT};
use crate::runtime::controlflow::ExecCx;
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

pub const DELAY_KIND: &str = "delay";

pub struct DelayNode;

#[async_trait]
impl NodeBehavior for DelayNode {
    fn kind(&self) -> &'static str {
        DELAY_KIND
    }

    fn ports(&self, _settings: &DataMap) -> NodePorts {
        NodePorts::default()
            .input(TRIGGER_IN, Port::trigger(TRIGGER_IN))
            .output(TRIGGER_OUT, Port::trigger(TRIGGER_OUT))
    }

    async fn execute(&self, cx: &mut ExecCx, _input: Option<&str>) -> anyhow::Result<()> {
        let ms = cx
            .settings()
            .get("ms")
            .and_then(Value::as_u64)
            .unwrap_or(0);
        if ms > 0 {
            tracing::debug!("delay node '{}': sleeping {}ms", cx.node_id(), ms);
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
        cx.forward(TRIGGER_OUT);
        Ok(())
    }
}

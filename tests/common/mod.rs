#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use wireflow::runtime::ExecCx;
use wireflow::{
    ActorHandle, DataMap, DataType, GraphRuntime, MemoryStore, NodeBehavior, NodePorts,
    NodeRegistry, Port, RuntimeConfig,
};

pub const TRIGGER_IN: &str = "exec";
pub const TRIGGER_OUT: &str = "done";

/// Shrunk timing knobs so suites stay fast
pub fn test_config() -> RuntimeConfig {
    RuntimeConfig {
        persist_debounce: Duration::from_millis(10),
        wait_poll: Duration::from_millis(5),
        wait_timeout: Duration::from_secs(2),
    }
}

/// Runtime over an inspectable shared store (snapshots and modules)
pub fn runtime_with(store: Arc<MemoryStore>, registry: Arc<NodeRegistry>) -> GraphRuntime {
    GraphRuntime::new(registry, store.clone(), store, test_config())
}

/// Poll an actor's context until the named output appears
pub async fn wait_for_output(actor: &ActorHandle, key: &str) -> Value {
    for _ in 0..400 {
        if let Some(value) = actor.context().outputs.get(key) {
            return value.clone();
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("output '{}' never appeared on '{}'", key, actor.node_id());
}

fn trigger_ports() -> NodePorts {
    NodePorts::default()
        .input(TRIGGER_IN, Port::trigger(TRIGGER_IN))
        .output(TRIGGER_OUT, Port::trigger(TRIGGER_OUT))
}

/// Source whose production counts invocations (memoization probe)
pub struct CountingSource {
    pub counter: Arc<AtomicUsize>,
    pub value: Value,
}

#[async_trait]
impl NodeBehavior for CountingSource {
    fn kind(&self) -> &'static str {
        "counting"
    }

    fn ports(&self, _settings: &DataMap) -> NodePorts {
        trigger_ports().output("value", Port::data("value", DataType::Number))
    }

    fn data(
        &self,
        _node_id: &str,
        _inputs: &DataMap,
        _ctx: &wireflow::ActorContext,
    ) -> anyhow::Result<DataMap> {
        self.counter.fetch_add(1, Ordering::SeqCst);
        Ok(DataMap::from([("value".to_string(), self.value.clone())]))
    }

    async fn execute(&self, cx: &mut ExecCx, _input: Option<&str>) -> anyhow::Result<()> {
        cx.set_output("value", self.value.clone());
        cx.forward(TRIGGER_OUT);
        Ok(())
    }
}

/// Trigger-only node recording the order it was executed in
pub struct Probe {
    pub log: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl NodeBehavior for Probe {
    fn kind(&self) -> &'static str {
        "probe"
    }

    fn ports(&self, _settings: &DataMap) -> NodePorts {
        trigger_ports()
    }

    async fn execute(&self, cx: &mut ExecCx, _input: Option<&str>) -> anyhow::Result<()> {
        self.log.lock().unwrap().push(cx.node_id().to_string());
        cx.forward(TRIGGER_OUT);
        Ok(())
    }
}

/// Node whose execute handler always fails
pub struct Failing;

#[async_trait]
impl NodeBehavior for Failing {
    fn kind(&self) -> &'static str {
        "failing"
    }

    fn ports(&self, _settings: &DataMap) -> NodePorts {
        trigger_ports()
    }

    async fn execute(&self, _cx: &mut ExecCx, _input: Option<&str>) -> anyhow::Result<()> {
        Err(anyhow::anyhow!("boom"))
    }
}

/// Node whose pure production always fails
pub struct BrokenSource;

#[async_trait]
impl NodeBehavior for BrokenSource {
    fn kind(&self) -> &'static str {
        "broken"
    }

    fn ports(&self, _settings: &DataMap) -> NodePorts {
        trigger_ports().output("value", Port::data("value", DataType::Any))
    }

    fn data(
        &self,
        _node_id: &str,
        _inputs: &DataMap,
        _ctx: &wireflow::ActorContext,
    ) -> anyhow::Result<DataMap> {
        Err(anyhow::anyhow!("bad value"))
    }

    async fn execute(&self, _cx: &mut ExecCx, _input: Option<&str>) -> anyhow::Result<()> {
        Err(anyhow::anyhow!("bad value"))
    }
}

/// Sink with one multi-connection port, one single port and one defaulted port
pub struct Collector;

#[async_trait]
impl NodeBehavior for Collector {
    fn kind(&self) -> &'static str {
        "collector"
    }

    fn ports(&self, _settings: &DataMap) -> NodePorts {
        trigger_ports()
            .input("many", Port::multi("many", DataType::Any))
            .input("one", Port::data("one", DataType::Any))
            .input(
                "text",
                Port::data("text", DataType::Any).with_default("text", serde_json::json!("fallback")),
            )
            .output("echo", Port::data("echo", DataType::Any))
    }

    fn data(
        &self,
        _node_id: &str,
        inputs: &DataMap,
        _ctx: &wireflow::ActorContext,
    ) -> anyhow::Result<DataMap> {
        Ok(inputs.clone())
    }

    async fn execute(&self, cx: &mut ExecCx, _input: Option<&str>) -> anyhow::Result<()> {
        for (key, value) in cx.inputs().clone() {
            cx.set_output(key, value);
        }
        cx.forward(TRIGGER_OUT);
        Ok(())
    }
}

/// Sink that only accepts string-typed wires
pub struct StringSink;

#[async_trait]
impl NodeBehavior for StringSink {
    fn kind(&self) -> &'static str {
        "string_sink"
    }

    fn ports(&self, _settings: &DataMap) -> NodePorts {
        trigger_ports().input("text", Port::data("text", DataType::String))
    }

    async fn execute(&self, cx: &mut ExecCx, _input: Option<&str>) -> anyhow::Result<()> {
        cx.forward(TRIGGER_OUT);
        Ok(())
    }
}

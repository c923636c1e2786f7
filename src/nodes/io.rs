/// Boundary nodes: Input and Output
///
/// Input nodes are pure sources whose field values are injected from outside
/// (editor widgets, or a host module node). Output nodes capture a single
/// value under a configured name; modules read their captured values back as
/// the module's public outputs.

use crate::graph::socket::{DataType, Port};
use crate::graph::types::DataMap;
use crate::nodes::{NodeBehavior, NodePorts, TRIGGER_IN, TRIGGER_OUT};
use crate::runtime::actor::ActorContext;
use crate::runtime::controlflow::ExecCx;
use crate::runtime::module::output_name;
use async_trait::async_trait;
use serde_json::Value;

pub const INPUT_KIND: &str = "input";
pub const OUTPUT_KIND: &str = "output";

/// Parse one `fields` entry: `"name:type"` shorthand or `{name, type}` object
fn parse_field(value: &Value) -> Option<(String, DataType)> {
    match value {
        Value::String(text) => {
            let (name, ty) = match text.split_once(':') {
                Some((name, ty)) => (name.trim(), ty.trim()),
                None => (text.trim(), "any"),
            };
            if name.is_empty() {
                return None;
            }
            Some((name.to_string(), parse_type(ty)))
        }
        Value::Object(map) => {
            let name = map.get("name")?.as_str()?.to_string();
            let ty = map.get("type").and_then(Value::as_str).unwrap_or("any");
            Some((name, parse_type(ty)))
        }
        _ => None,
    }
}

fn parse_type(text: &str) -> DataType {
    match text.to_ascii_lowercase().as_str() {
        "string" => DataType::String,
        "number" => DataType::Number,
        "boolean" | "bool" => DataType::Boolean,
        "object" => DataType::Object,
        _ => DataType::Any,
    }
}

/// Source node exposing one typed data output per configured field
///
/// Field values arrive through `SetOutputs` events rather than computation,
/// so the default `data` production (the actor's stored outputs) applies.
pub struct InputNode;

#[async_trait]
impl NodeBehavior for InputNode {
    fn kind(&self) -> &'static str {
        INPUT_KIND
    }

    fn ports(&self, settings: &DataMap) -> NodePorts {
        let mut ports = NodePorts::default()
            .input(TRIGGER_IN, Port::trigger(TRIGGER_IN))
            .output(TRIGGER_OUT, Port::trigger(TRIGGER_OUT));
        if let Some(Value::Array(fields)) = settings.get("fields") {
            for field in fields {
                if let Some((name, data_type)) = parse_field(field) {
                    ports.outputs.insert(name.clone(), Port::data(name, data_type));
                }
            }
        }
        ports
    }

    async fn execute(&self, cx: &mut ExecCx, _input: Option<&str>) -> anyhow::Result<()> {
        cx.forward(TRIGGER_OUT);
        Ok(())
    }
}

/// Sink node capturing one value under its configured name
pub struct OutputNode;

#[async_trait]
impl NodeBehavior for OutputNode {
    fn kind(&self) -> &'static str {
        OUTPUT_KIND
    }

    fn ports(&self, _settings: &DataMap) -> NodePorts {
        NodePorts::default()
            .input(TRIGGER_IN, Port::trigger(TRIGGER_IN))
            .input("value", Port::data("value", DataType::Any))
            .output(TRIGGER_OUT, Port::trigger(TRIGGER_OUT))
    }

    fn data(
        &self,
        node_id: &str,
        inputs: &DataMap,
        ctx: &ActorContext,
    ) -> anyhow::Result<DataMap> {
        let name = output_name(&ctx.settings, node_id);
        let value = inputs.get("value").cloned().unwrap_or(Value::Null);
        Ok(DataMap::from([(name, value)]))
    }

    async fn execute(&self, cx: &mut ExecCx, _input: Option<&str>) -> anyhow::Result<()> {
        let name = output_name(&cx.settings(), cx.node_id());
        let value = cx.input("value").cloned().unwrap_or(Value::Null);
        cx.set_output(name, value);
        cx.forward(TRIGGER_OUT);
        Ok(())
    }
}

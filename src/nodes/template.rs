/// String template node
///
/// Renders a `{{placeholder}}` template from its settings. Every distinct
/// placeholder becomes a data input port; the rendered string is the single
/// `result` output. Production is pure, so the same node works identically
/// under pull-based resolution and trigger-driven execution.

use crate::graph::socket::{DataType, Port};
use crate::graph::types::DataMap;
use crate::nodes::{NodeBehavior, NodePorts, TRIGGER_IN, TRIGGER_OUT};
use crate::runtime::actor::ActorContext;
use crate::runtime::controlflow::ExecCx;
use async_trait::async_trait;
use serde_json::Value;

pub const TEMPLATE_KIND: &str = "template";

/// Distinct placeholder names in template order
fn placeholders(template: &str) -> Vec<String> {
    let mut names = Vec::new();
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        let after = &rest[start + 2..];
        let Some(end) = after.find("}}") else { break };
        let name = after[..end].trim();
        if !name.is_empty() && !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
        rest = &after[end + 2..];
    }
    names
}

/// Substitute placeholders with input values
///
/// Strings interpolate raw (no added quotes), missing or null values render
/// empty, everything else renders as compact JSON.
fn render(template: &str, inputs: &DataMap) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        let after = &rest[start + 2..];
        let Some(end) = after.find("}}") else { break };
        out.push_str(&rest[..start]);
        let name = after[..end].trim();
        match inputs.get(name) {
            Some(Value::String(text)) => out.push_str(text),
            Some(Value::Null) | None => {}
            Some(other) => out.push_str(&other.to_string()),
        }
        rest = &after[end + 2..];
    }
    out.push_str(rest);
    out
}

pub struct TemplateNode;

impl TemplateNode {
    fn template(settings: &DataMap) -> String {
        settings
            .get("template")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    }
}

#[async_trait]
impl NodeBehavior for TemplateNode {
    fn kind(&self) -> &'static str {
        TEMPLATE_KIND
    }

    fn ports(&self, settings: &DataMap) -> NodePorts {
        let mut ports = NodePorts::default()
            .input(TRIGGER_IN, Port::trigger(TRIGGER_IN))
            .output(TRIGGER_OUT, Port::trigger(TRIGGER_OUT))
            .output("result", Port::data("result", DataType::String));
        for name in placeholders(&Self::template(settings)) {
            ports.inputs.insert(name.clone(), Port::data(name, DataType::Any));
        }
        ports
    }

    fn data(
        &self,
        _node_id: &str,
        inputs: &DataMap,
        ctx: &ActorContext,
    ) -> anyhow::Result<DataMap> {
        let rendered = render(&Self::template(&ctx.settings), inputs);
        Ok(DataMap::from([("result".to_string(), Value::String(rendered))]))
    }

    async fn execute(&self, cx: &mut ExecCx, _input: Option<&str>) -> anyhow::Result<()> {
        let rendered = render(&Self::template(&cx.settings()), cx.inputs());
        cx.set_output("result", Value::String(rendered));
        cx.forward(TRIGGER_OUT);
        Ok(())
    }
}

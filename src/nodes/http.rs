/// HTTP request node
///
/// Side-effecting by nature, so the interesting path is trigger-driven
/// execution; pull-based resolution only re-exposes the last response stored
/// in the actor context.

use crate::graph::socket::{DataType, Port};
use crate::graph::types::DataMap;
use crate::nodes::{NodeBehavior, NodePorts, TRIGGER_IN, TRIGGER_OUT};
use crate::runtime::controlflow::ExecCx;
use anyhow::{anyhow, Context};
use async_trait::async_trait;
use serde_json::{json, Value};

pub const HTTP_KIND: &str = "http";

pub struct HttpRequestNode;

#[async_trait]
impl NodeBehavior for HttpRequestNode {
    fn kind(&self) -> &'static str {
        HTTP_KIND
    }

    fn ports(&self, _settings: &DataMap) -> NodePorts {
        NodePorts::default()
            .input(TRIGGER_IN, Port::trigger(TRIGGER_IN))
            .input("body", Port::data("body", DataType::Any))
            .output(TRIGGER_OUT, Port::trigger(TRIGGER_OUT))
            .output("status", Port::data("status", DataType::Number))
            .output("data", Port::data("data", DataType::Any))
    }

    async fn execute(&self, cx: &mut ExecCx, _input: Option<&str>) -> anyhow::Result<()> {
        let settings = cx.settings();
        let url = settings
            .get("url")
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow!("http node missing 'url' setting"))?
            .to_string();
        let method = settings
            .get("method")
            .and_then(Value::as_str)
            .unwrap_or("GET")
            .to_ascii_uppercase();

        let client = reqwest::Client::new();
        let mut request = match method.as_str() {
            "GET" => client.get(&url),
            "POST" => client.post(&url),
            "PUT" => client.put(&url),
            "PATCH" => client.patch(&url),
            "DELETE" => client.delete(&url),
            other => return Err(anyhow!("unsupported HTTP method '{other}'")),
        };

        if let Some(Value::Object(headers)) = settings.get("headers") {
            for (name, value) in headers {
                if let Some(value) = value.as_str() {
                    request = request.header(name, value);
                }
            }
        }
        if matches!(method.as_str(), "POST" | "PUT" | "PATCH") {
            if let Some(body) = cx.input("body") {
                request = request.json(body);
            }
        }

        tracing::debug!("http node '{}': {} {}", cx.node_id(), method, url);
        let response = request
            .send()
            .await
            .with_context(|| format!("{method} {url}"))?;
        let status = response.status().as_u16();
        let text = response.text().await.context("reading response body")?;
        // JSON when it parses, raw text otherwise.
        let data = serde_json::from_str(&text).unwrap_or(Value::String(text));

        cx.set_output("status", json!(status));
        cx.set_output("data", data);
        cx.forward(TRIGGER_OUT);
        Ok(())
    }
}

mod common;

use common::*;
use serde_json::json;
use std::sync::Arc;
use wireflow::{
    ActorEvent, DataMap, EdgeRecord, GraphRecord, MemoryStore, NodeRecord, NodeRegistry,
};

/// Input -> Template -> Output, both as a pulled value and as a trigger run
#[tokio::test]
async fn greeting_pipeline_end_to_end() {
    let store = Arc::new(MemoryStore::new());
    let runtime = runtime_with(store, Arc::new(NodeRegistry::with_builtins()));

    let record = GraphRecord {
        nodes: vec![
            NodeRecord::new("src", "input", json!({"fields": ["name:string"]})),
            NodeRecord::new("t", "template", json!({"template": "Hello {{name}}"})),
            NodeRecord::new("sink", "output", json!({"name": "result"})),
        ],
        edges: vec![
            EdgeRecord::new("src", "name", "t", "name"),
            EdgeRecord::new("t", "result", "sink", "value"),
            EdgeRecord::new("src", "done", "t", "exec"),
            EdgeRecord::new("t", "done", "sink", "exec"),
        ],
    };
    runtime.import(&record).await.unwrap();

    runtime
        .send(
            "src",
            ActorEvent::SetOutputs {
                outputs: DataMap::from([("name".to_string(), json!("World"))]),
            },
        )
        .unwrap();
    wait_for_output(&runtime.actor("src").unwrap(), "name").await;

    // Pull path: resolving the sink renders through the whole chain.
    let pulled = runtime.resolve("sink").unwrap();
    assert_eq!(pulled["result"], json!("Hello World"));

    // Push path: triggering the source runs the chain and captures the value.
    runtime.execute("src", None, None).await.unwrap();
    let captured = wait_for_output(&runtime.actor("sink").unwrap(), "result").await;
    assert_eq!(captured, json!("Hello World"));
}

/// Changing an ancestor's outputs invalidates and recomputes descendants
///
/// Deliberately reads through `DataflowEngine::fetch` (no session reset), so
/// the test only passes if the output-change listener actually refreshed the
/// cached entries.
#[tokio::test]
async fn output_changes_refresh_descendant_cache_entries() {
    let store = Arc::new(MemoryStore::new());
    let runtime = runtime_with(store, Arc::new(NodeRegistry::with_builtins()));

    let record = GraphRecord {
        nodes: vec![
            NodeRecord::new("src", "input", json!({"fields": ["name:string"]})),
            NodeRecord::new("t", "template", json!({"template": "Hello {{name}}"})),
        ],
        edges: vec![EdgeRecord::new("src", "name", "t", "name")],
    };
    runtime.import(&record).await.unwrap();

    runtime
        .send(
            "src",
            ActorEvent::SetOutputs {
                outputs: DataMap::from([("name".to_string(), json!("One"))]),
            },
        )
        .unwrap();
    wait_for_output(&runtime.actor("src").unwrap(), "name").await;

    // Warm the session cache; subsequent fetches never reset it.
    let dataflow = runtime.dataflow();
    assert_eq!(dataflow.fetch("t").unwrap()["result"], json!("Hello One"));

    runtime
        .send(
            "src",
            ActorEvent::SetOutputs {
                outputs: DataMap::from([("name".to_string(), json!("Two"))]),
            },
        )
        .unwrap();
    for _ in 0..400 {
        if dataflow.fetch("t").unwrap()["result"] == json!("Hello Two") {
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }
    panic!("cached descendant never refreshed after ancestor change");
}

/// A Lua script node computing over pulled inputs
#[tokio::test]
async fn script_node_computes_from_wired_inputs() {
    let store = Arc::new(MemoryStore::new());
    let runtime = runtime_with(store, Arc::new(NodeRegistry::with_builtins()));

    let record = GraphRecord {
        nodes: vec![
            NodeRecord::new("src", "input", json!({"fields": ["a:number", "b:number"]})),
            NodeRecord::new(
                "calc",
                "script",
                json!({
                    "script": "return { sum = inputs.a + inputs.b }",
                    "inputs": ["a", "b"],
                    "outputs": ["sum"]
                }),
            ),
        ],
        edges: vec![
            EdgeRecord::new("src", "a", "calc", "a"),
            EdgeRecord::new("src", "b", "calc", "b"),
        ],
    };
    runtime.import(&record).await.unwrap();

    runtime
        .send(
            "src",
            ActorEvent::SetOutputs {
                outputs: DataMap::from([
                    ("a".to_string(), json!(19)),
                    ("b".to_string(), json!(23)),
                ]),
            },
        )
        .unwrap();
    wait_for_output(&runtime.actor("src").unwrap(), "a").await;

    let outputs = runtime.resolve("calc").unwrap();
    assert_eq!(outputs["sum"], json!(42));
}

mod common;

use common::*;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use wireflow::{
    wait_for_state, ActorState, Connection, EdgeRecord, GraphRecord, MemoryStore, NodeRecord,
    NodeRegistry, RuntimeError,
};

fn registry_with_counter(counter: Arc<AtomicUsize>) -> Arc<NodeRegistry> {
    let registry = NodeRegistry::with_builtins();
    registry.register(Arc::new(CountingSource {
        counter,
        value: json!(7),
    }));
    registry.register(Arc::new(Collector));
    registry.register(Arc::new(BrokenSource));
    Arc::new(registry)
}

#[tokio::test]
async fn shared_ancestor_is_produced_once_per_session() {
    let counter = Arc::new(AtomicUsize::new(0));
    let store = Arc::new(MemoryStore::new());
    let runtime = runtime_with(store, registry_with_counter(counter.clone()));

    let record = GraphRecord {
        nodes: vec![
            NodeRecord::new("src", "counting", json!({})),
            NodeRecord::new("t", "template", json!({"template": "{{a}} {{b}}"})),
        ],
        edges: vec![
            EdgeRecord::new("src", "value", "t", "a"),
            EdgeRecord::new("src", "value", "t", "b"),
        ],
    };
    runtime.import(&record).await.unwrap();

    let outputs = runtime.resolve("t").unwrap();
    assert_eq!(outputs["result"], json!("7 7"));
    assert_eq!(counter.load(Ordering::SeqCst), 1, "second wire hits the cache");

    // A fresh top-level resolve starts a new session.
    runtime.resolve("t").unwrap();
    assert_eq!(counter.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn single_ports_resolve_to_scalars_and_multi_ports_to_arrays() {
    let counter = Arc::new(AtomicUsize::new(0));
    let store = Arc::new(MemoryStore::new());
    let registry = NodeRegistry::with_builtins();
    registry.register(Arc::new(CountingSource {
        counter: counter.clone(),
        value: json!(1),
    }));
    registry.register(Arc::new(Collector));
    let runtime = runtime_with(store, Arc::new(registry));

    let record = GraphRecord {
        nodes: vec![
            NodeRecord::new("s1", "counting", json!({})),
            NodeRecord::new("s2", "counting", json!({})),
            NodeRecord::new("c", "collector", json!({})),
        ],
        edges: vec![
            EdgeRecord::new("s1", "value", "c", "many"),
            EdgeRecord::new("s2", "value", "c", "many"),
            EdgeRecord::new("s1", "value", "c", "one"),
        ],
    };
    runtime.import(&record).await.unwrap();

    let inputs = runtime.resolve_inputs("c").unwrap();
    assert_eq!(inputs["many"], json!([1, 1]));
    assert_eq!(inputs["one"], json!(1), "single port is never an array");
}

#[tokio::test]
async fn an_array_value_over_a_single_wire_stays_an_array() {
    let store = Arc::new(MemoryStore::new());
    let registry = NodeRegistry::with_builtins();
    registry.register(Arc::new(CountingSource {
        counter: Arc::new(AtomicUsize::new(0)),
        value: json!([1, 2, 3]),
    }));
    registry.register(Arc::new(Collector));
    let runtime = runtime_with(store, Arc::new(registry));

    let record = GraphRecord {
        nodes: vec![
            NodeRecord::new("s", "counting", json!({})),
            NodeRecord::new("c", "collector", json!({})),
        ],
        edges: vec![EdgeRecord::new("s", "value", "c", "one")],
    };
    runtime.import(&record).await.unwrap();

    let inputs = runtime.resolve_inputs("c").unwrap();
    assert_eq!(
        inputs["one"],
        json!([1, 2, 3]),
        "a produced array is a value, not a fan-in to unwrap"
    );
}

#[tokio::test]
async fn unconnected_port_backfills_its_control_default() {
    let store = Arc::new(MemoryStore::new());
    let registry = NodeRegistry::with_builtins();
    registry.register(Arc::new(Collector));
    let runtime = runtime_with(store, Arc::new(registry));

    let record = GraphRecord {
        nodes: vec![NodeRecord::new("c", "collector", json!({}))],
        edges: vec![],
    };
    runtime.import(&record).await.unwrap();

    let inputs = runtime.resolve_inputs("c").unwrap();
    assert_eq!(inputs["text"], json!("fallback"));
    assert!(!inputs.contains_key("one"), "no wire and no default stays absent");
}

#[tokio::test]
async fn production_failure_becomes_actor_error_state() {
    let counter = Arc::new(AtomicUsize::new(0));
    let store = Arc::new(MemoryStore::new());
    let runtime = runtime_with(store, registry_with_counter(counter));

    let record = GraphRecord {
        nodes: vec![
            NodeRecord::new("bad", "broken", json!({})),
            NodeRecord::new("t", "template", json!({"template": "[{{x}}]"})),
        ],
        edges: vec![EdgeRecord::new("bad", "value", "t", "x")],
    };
    runtime.import(&record).await.unwrap();

    // The fetch itself succeeds; the failed producer contributes nothing.
    let outputs = runtime.resolve("t").unwrap();
    assert_eq!(outputs["result"], json!("[]"));

    let actor = runtime.actor("bad").unwrap();
    wait_for_state(&actor, ActorState::Error, &test_config())
        .await
        .unwrap();
    let error = actor.context().error.unwrap();
    assert_eq!(error.name, "ProductionError");
    assert!(error.message.contains("bad value"));
}

#[tokio::test]
async fn data_cycles_are_rejected_naming_a_node() {
    let store = Arc::new(MemoryStore::new());
    let runtime = runtime_with(store, Arc::new(NodeRegistry::with_builtins()));

    let record = GraphRecord {
        nodes: vec![
            NodeRecord::new("a", "template", json!({"template": "{{x}}"})),
            NodeRecord::new("b", "template", json!({"template": "{{x}}"})),
        ],
        edges: vec![EdgeRecord::new("a", "result", "b", "x")],
    };
    runtime.import(&record).await.unwrap();

    let err = runtime
        .connect(Connection::new("b", "result", "a", "x"))
        .unwrap_err();
    match err {
        RuntimeError::CycleDetected(node) => assert!(node == "a" || node == "b"),
        other => panic!("expected CycleDetected, got {other:?}"),
    }
    // The offending edge was rolled back.
    assert_eq!(
        runtime.with_graph(|g| g.connections().len()),
        1,
        "cycle edge must not persist"
    );
}

#[tokio::test]
async fn trigger_edges_may_close_loops() {
    let store = Arc::new(MemoryStore::new());
    let registry = NodeRegistry::with_builtins();
    registry.register(Arc::new(Probe {
        log: Arc::new(std::sync::Mutex::new(Vec::new())),
    }));
    let runtime = runtime_with(store, Arc::new(registry));

    let record = GraphRecord {
        nodes: vec![
            NodeRecord::new("a", "probe", json!({})),
            NodeRecord::new("b", "probe", json!({})),
        ],
        edges: vec![EdgeRecord::new("a", "done", "b", "exec")],
    };
    runtime.import(&record).await.unwrap();

    // The reverse trigger edge would be a cycle in a data graph.
    let created = runtime
        .connect(Connection::new("b", "done", "a", "exec"))
        .unwrap();
    assert!(created);
}

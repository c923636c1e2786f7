mod common;

use common::*;
use serde_json::json;
use std::sync::Arc;
use wireflow::{
    Connection, EdgeRecord, GraphRecord, MemoryStore, NodeRecord, NodeRegistry, Notification,
    RuntimeError, SnapshotStore,
};

#[tokio::test]
async fn unknown_kinds_abort_the_import() {
    let store = Arc::new(MemoryStore::new());
    let runtime = runtime_with(store, Arc::new(NodeRegistry::with_builtins()));

    let record = GraphRecord {
        nodes: vec![NodeRecord::new("x", "definitely-not-a-kind", json!({}))],
        edges: vec![],
    };
    let err = runtime.import(&record).await.unwrap_err();
    match err {
        RuntimeError::UnknownNodeKind(kind) => assert_eq!(kind, "definitely-not-a-kind"),
        other => panic!("expected UnknownNodeKind, got {other:?}"),
    }
}

#[tokio::test]
async fn edges_to_missing_endpoints_are_skipped_not_fatal() {
    let store = Arc::new(MemoryStore::new());
    let runtime = runtime_with(store, Arc::new(NodeRegistry::with_builtins()));

    let record = GraphRecord {
        nodes: vec![
            NodeRecord::new("t", "template", json!({"template": "{{x}}"})),
            NodeRecord::new("o", "output", json!({})),
        ],
        edges: vec![
            // Valid wire.
            EdgeRecord::new("t", "result", "o", "value"),
            // Missing node and missing port respectively.
            EdgeRecord::new("ghost", "out", "o", "value"),
            EdgeRecord::new("t", "no_such_port", "o", "value"),
        ],
    };
    runtime.import(&record).await.unwrap();

    assert_eq!(runtime.with_graph(|g| g.connections().len()), 1);
    assert!(runtime.with_graph(|g| g.contains("t") && g.contains("o")));
}

#[tokio::test]
async fn import_is_idempotent_for_live_nodes() {
    let store = Arc::new(MemoryStore::new());
    let runtime = runtime_with(store, Arc::new(NodeRegistry::with_builtins()));

    let record = GraphRecord {
        nodes: vec![NodeRecord::new("t", "template", json!({"template": "hi"}))],
        edges: vec![],
    };
    runtime.import(&record).await.unwrap();
    let first = runtime.actor("t").unwrap();
    runtime.import(&record).await.unwrap();

    // The original actor survived the re-import.
    assert_eq!(runtime.with_graph(|g| g.node_ids().len()), 1);
    first.send(wireflow::ActorEvent::SetOutputs {
        outputs: wireflow::DataMap::from([("marker".to_string(), json!(true))]),
    });
    let value = wait_for_output(&runtime.actor("t").unwrap(), "marker").await;
    assert_eq!(value, json!(true));
}

#[tokio::test]
async fn incompatible_sockets_notify_instead_of_failing() {
    let store = Arc::new(MemoryStore::new());
    let registry = NodeRegistry::with_builtins();
    registry.register(Arc::new(StringSink));
    registry.register(Arc::new(CountingSource {
        counter: Arc::new(std::sync::atomic::AtomicUsize::new(0)),
        value: json!(1),
    }));
    let runtime = runtime_with(store, Arc::new(registry));

    let record = GraphRecord {
        nodes: vec![
            NodeRecord::new("n", "counting", json!({})),
            NodeRecord::new("s", "string_sink", json!({})),
        ],
        edges: vec![],
    };
    runtime.import(&record).await.unwrap();

    let mut notifications = runtime.subscribe_notifications();
    let created = runtime
        .connect(Connection::new("n", "value", "s", "text"))
        .unwrap();
    assert!(!created, "number -> string wire is rejected");
    assert_eq!(runtime.with_graph(|g| g.connections().len()), 0);
    match notifications.try_recv().unwrap() {
        Notification::IncompatibleSockets(conn) => {
            assert_eq!(conn.source, "n");
            assert_eq!(conn.target, "s");
        }
        other => panic!("expected IncompatibleSockets, got {other:?}"),
    }
}

#[tokio::test]
async fn duplicate_wires_notify_instead_of_failing() {
    let store = Arc::new(MemoryStore::new());
    let runtime = runtime_with(store, Arc::new(NodeRegistry::with_builtins()));

    let record = GraphRecord {
        nodes: vec![
            NodeRecord::new("t", "template", json!({"template": "hi"})),
            NodeRecord::new("o", "output", json!({})),
        ],
        edges: vec![EdgeRecord::new("t", "result", "o", "value")],
    };
    runtime.import(&record).await.unwrap();

    let mut notifications = runtime.subscribe_notifications();
    let created = runtime
        .connect(Connection::new("t", "result", "o", "value"))
        .unwrap();
    assert!(!created);
    assert_eq!(runtime.with_graph(|g| g.connections().len()), 1);
    assert!(matches!(
        notifications.try_recv().unwrap(),
        Notification::DuplicateConnection(_)
    ));
}

#[tokio::test]
async fn snapshots_seed_actors_but_records_own_the_settings() {
    let store = Arc::new(MemoryStore::new());
    store
        .save(
            "n1",
            json!({
                "status": "complete",
                "inputs": {},
                "outputs": {"value": "seeded"},
                "settings": {"fields": ["stale:string"]},
                "error": null
            }),
        )
        .await
        .unwrap();
    let runtime = runtime_with(store, Arc::new(NodeRegistry::with_builtins()));

    let record = GraphRecord {
        nodes: vec![NodeRecord::new(
            "n1",
            "input",
            json!({"fields": ["value:string"]}),
        )],
        edges: vec![],
    };
    runtime.import(&record).await.unwrap();

    let ctx = runtime.actor("n1").unwrap().context();
    assert_eq!(ctx.outputs["value"], json!("seeded"));
    assert_eq!(ctx.settings["fields"], json!(["value:string"]));

    // The seeded output flows through pull-based resolution.
    let outputs = runtime.resolve("n1").unwrap();
    assert_eq!(outputs["value"], json!("seeded"));
}

#[tokio::test]
async fn removing_a_node_severs_its_wires() {
    let store = Arc::new(MemoryStore::new());
    let runtime = runtime_with(store, Arc::new(NodeRegistry::with_builtins()));

    let record = GraphRecord {
        nodes: vec![
            NodeRecord::new("t", "template", json!({"template": "{{x}}"})),
            NodeRecord::new("o", "output", json!({})),
        ],
        edges: vec![
            EdgeRecord::new("t", "result", "o", "value"),
            EdgeRecord::new("t", "done", "o", "exec"),
        ],
    };
    runtime.import(&record).await.unwrap();
    assert_eq!(runtime.with_graph(|g| g.connections().len()), 2);

    assert!(runtime.remove_node("t"));
    assert_eq!(runtime.with_graph(|g| g.connections().len()), 0);
    assert!(!runtime.with_graph(|g| g.contains("t")));
}

/// Per-node actor runtime
///
/// Every node owns exactly one actor: a finite-state machine with a
/// single-threaded event mailbox, an observable context, and debounced
/// best-effort persistence. The explicit transition table replaces the
/// third-party statechart library of earlier designs while keeping the
/// deterministic single-writer semantics.

use crate::config::RuntimeConfig;
use crate::error::RuntimeError;
use crate::graph::types::{DataMap, NodeId};
use crate::runtime::RuntimeSignal;
use crate::storage::SnapshotStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;

/// Canonical actor states plus the module-composition extensions
///
/// Plain nodes only visit `Idle`, `Running`, `Complete` and `Error`.
/// `ChooseInput` and `Connected` are reachable solely through the module
/// node's transition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ActorState {
    Idle,
    Running,
    Complete,
    Error,
    ChooseInput,
    Connected,
}

/// Captured node failure, mirrored into snapshots
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeError {
    pub name: String,
    pub message: String,
}

impl NodeError {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
        }
    }
}

/// Mutable per-node context owned by the actor task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActorContext {
    pub status: ActorState,
    #[serde(default)]
    pub inputs: DataMap,
    #[serde(default)]
    pub outputs: DataMap,
    #[serde(default)]
    pub settings: DataMap,
    #[serde(default)]
    pub error: Option<NodeError>,
}

impl Default for ActorContext {
    fn default() -> Self {
        Self {
            status: ActorState::Idle,
            inputs: DataMap::new(),
            outputs: DataMap::new(),
            settings: DataMap::new(),
            error: None,
        }
    }
}

impl ActorContext {
    pub fn with_settings(settings: DataMap) -> Self {
        Self {
            settings,
            ..Default::default()
        }
    }
}

/// Events accepted by an actor mailbox
///
/// `SetOutputs`/`SetSettings` are payload-only updates: they merge data into
/// the context in any state without moving the state machine. Everything else
/// goes through the transition table.
#[derive(Debug, Clone)]
pub enum ActorEvent {
    /// Start (or restart) a run; fresh inputs replace the stored ones
    Run { inputs: Option<DataMap> },
    /// Successful completion; outputs merge into the context
    Done { outputs: DataMap },
    /// Production failure captured from the node handler
    Fail { error: NodeError },
    /// Explicit retry out of the error state
    Retry,
    /// Merge values into the output context without a state change
    SetOutputs { outputs: DataMap },
    /// Merge values into the settings map without a state change
    SetSettings { settings: DataMap },
    /// Module node: a module id was chosen
    ChooseModule,
    /// Module node: the Input boundary node was chosen
    ChooseBoundary,
    /// Module node: drop the module binding entirely
    Disconnect,
}

/// Event discriminant used as the transition-table key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Run,
    Done,
    Fail,
    Retry,
    ChooseModule,
    ChooseBoundary,
    Disconnect,
}

impl ActorEvent {
    /// Table key for this event; `None` for payload-only events
    fn kind(&self) -> Option<EventKind> {
        match self {
            ActorEvent::Run { .. } => Some(EventKind::Run),
            ActorEvent::Done { .. } => Some(EventKind::Done),
            ActorEvent::Fail { .. } => Some(EventKind::Fail),
            ActorEvent::Retry => Some(EventKind::Retry),
            ActorEvent::ChooseModule => Some(EventKind::ChooseModule),
            ActorEvent::ChooseBoundary => Some(EventKind::ChooseBoundary),
            ActorEvent::Disconnect => Some(EventKind::Disconnect),
            ActorEvent::SetOutputs { .. } | ActorEvent::SetSettings { .. } => None,
        }
    }
}

/// Per-kind state transition table
///
/// Events with no entry for the current state are ignored (logged at debug),
/// so a stale Done arriving after a Fail cannot corrupt the machine.
#[derive(Debug, Clone)]
pub struct TransitionTable {
    edges: Vec<(ActorState, EventKind, ActorState)>,
}

impl TransitionTable {
    /// Canonical cycle: idle -> running -> {complete, error}; error retries
    /// back to running; a new run event restarts from complete.
    pub fn canonical() -> Self {
        use ActorState::*;
        Self {
            edges: vec![
                (Idle, EventKind::Run, Running),
                (Running, EventKind::Done, Complete),
                (Running, EventKind::Fail, Error),
                // Pull-based production can fail a node that never ran.
                (Idle, EventKind::Fail, Error),
                (Complete, EventKind::Fail, Error),
                (Error, EventKind::Retry, Running),
                (Error, EventKind::Run, Running),
                (Complete, EventKind::Run, Running),
            ],
        }
    }

    /// Module-composition machine: idle -> chooseInput -> connected ->
    /// running -> {connected, error}, with disconnect back to idle.
    pub fn module() -> Self {
        use ActorState::*;
        Self {
            edges: vec![
                (Idle, EventKind::ChooseModule, ChooseInput),
                (ChooseInput, EventKind::ChooseBoundary, Connected),
                (Connected, EventKind::Run, Running),
                (Running, EventKind::Done, Connected),
                (Running, EventKind::Fail, Error),
                (Connected, EventKind::Fail, Error),
                (Error, EventKind::Retry, Running),
                (Error, EventKind::Run, Running),
                (ChooseInput, EventKind::Disconnect, Idle),
                (Connected, EventKind::Disconnect, Idle),
                (Error, EventKind::Disconnect, Idle),
            ],
        }
    }

    pub fn next(&self, state: ActorState, kind: EventKind) -> Option<ActorState> {
        self.edges
            .iter()
            .find(|(from, k, _)| *from == state && *k == kind)
            .map(|(_, _, to)| *to)
    }
}

/// Cheap cloneable handle to a spawned actor task
#[derive(Debug, Clone)]
pub struct ActorHandle {
    node_id: NodeId,
    tx: mpsc::UnboundedSender<ActorEvent>,
    rx: watch::Receiver<ActorContext>,
}

impl ActorHandle {
    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// Enqueue an event; dropped silently if the actor task already ended
    pub fn send(&self, event: ActorEvent) {
        if self.tx.send(event).is_err() {
            tracing::debug!("actor '{}' mailbox closed, event dropped", self.node_id);
        }
    }

    /// Snapshot of the current context
    pub fn context(&self) -> ActorContext {
        self.rx.borrow().clone()
    }

    pub fn state(&self) -> ActorState {
        self.rx.borrow().status
    }

    /// Subscribe to context updates (observer mechanism for collaborators)
    pub fn subscribe(&self) -> watch::Receiver<ActorContext> {
        self.rx.clone()
    }
}

/// Everything needed to spawn one actor task
pub struct ActorSpawn {
    pub node_id: NodeId,
    /// Snapshot key: the node id, or `{execution_id}:{node_id}` for replay
    pub persist_key: String,
    pub table: TransitionTable,
    pub initial: ActorContext,
    pub store: Arc<dyn SnapshotStore>,
    /// Live actors report output changes here; replay actors pass `None`
    pub signals: Option<mpsc::UnboundedSender<RuntimeSignal>>,
    pub debounce: Duration,
}

/// Spawn the actor task and return its handle
///
/// The task is the single writer for the node's context: events apply one at
/// a time off the mailbox, every applied transition is published to watchers
/// and scheduled for a debounced snapshot write.
pub fn spawn_actor(spawn: ActorSpawn) -> ActorHandle {
    let (tx, mailbox) = mpsc::unbounded_channel();
    let (watch_tx, watch_rx) = watch::channel(spawn.initial.clone());
    let handle = ActorHandle {
        node_id: spawn.node_id.clone(),
        tx,
        rx: watch_rx,
    };
    tokio::spawn(actor_loop(spawn, mailbox, watch_tx));
    handle
}

async fn actor_loop(
    spawn: ActorSpawn,
    mut mailbox: mpsc::UnboundedReceiver<ActorEvent>,
    watch_tx: watch::Sender<ActorContext>,
) {
    let ActorSpawn {
        node_id,
        persist_key,
        table,
        initial,
        store,
        signals,
        debounce,
    } = spawn;

    let mut ctx = initial;
    let mut persist_at: Option<Instant> = None;

    loop {
        tokio::select! {
            event = mailbox.recv() => {
                let Some(event) = event else { break };
                if apply_event(&node_id, &table, &mut ctx, event) {
                    if watch_tx.borrow().outputs != ctx.outputs {
                        if let Some(signals) = &signals {
                            let _ = signals.send(RuntimeSignal::OutputsChanged(node_id.clone()));
                        }
                    }
                    let _ = watch_tx.send(ctx.clone());
                    persist_at = Some(Instant::now() + debounce);
                }
            }
            _ = tokio::time::sleep_until(persist_at.unwrap_or_else(Instant::now)),
                if persist_at.is_some() =>
            {
                persist_at = None;
                persist(&store, &persist_key, &ctx).await;
            }
        }
    }

    // Mailbox closed: flush any pending write before the task ends.
    if persist_at.is_some() {
        persist(&store, &persist_key, &ctx).await;
    }
    tracing::debug!("actor '{}' stopped", node_id);
}

/// Apply one event to the context; returns false when the event was ignored
fn apply_event(
    node_id: &str,
    table: &TransitionTable,
    ctx: &mut ActorContext,
    event: ActorEvent,
) -> bool {
    let Some(kind) = event.kind() else {
        // Payload-only updates merge without touching the state machine.
        match event {
            ActorEvent::SetOutputs { outputs } => ctx.outputs.extend(outputs),
            ActorEvent::SetSettings { settings } => ctx.settings.extend(settings),
            _ => unreachable!("payload-only events have no table kind"),
        }
        return true;
    };

    let Some(next) = table.next(ctx.status, kind) else {
        tracing::debug!(
            "actor '{}' ignoring {:?} in state {:?}",
            node_id,
            kind,
            ctx.status
        );
        return false;
    };

    match event {
        ActorEvent::Run { inputs } => {
            if let Some(inputs) = inputs {
                ctx.inputs = inputs;
            }
            ctx.error = None;
        }
        ActorEvent::Done { outputs } => ctx.outputs.extend(outputs),
        ActorEvent::Fail { error } => {
            tracing::warn!("node '{}' failed: {} ({})", node_id, error.message, error.name);
            ctx.error = Some(error);
        }
        ActorEvent::Retry => ctx.error = None,
        ActorEvent::Disconnect => {
            ctx.outputs.clear();
            ctx.error = None;
        }
        _ => {}
    }

    tracing::debug!("actor '{}': {:?} -> {:?}", node_id, ctx.status, next);
    ctx.status = next;
    true
}

/// Best-effort snapshot write: failures are logged, never propagated
async fn persist(store: &Arc<dyn SnapshotStore>, key: &str, ctx: &ActorContext) {
    match serde_json::to_value(ctx) {
        Ok(blob) => {
            if let Err(e) = store.save(key, blob).await {
                tracing::warn!("snapshot write for '{}' failed: {}", key, e);
            }
        }
        Err(e) => tracing::warn!("snapshot for '{}' not serializable: {}", key, e),
    }
}

/// Suspend the calling flow until the actor reaches `target`
///
/// Subscribes to the actor and polls at the configured interval. Exceeding
/// the bound raises a typed timeout error; other node executions are never
/// affected and no global lock is taken.
pub async fn wait_for_state(
    handle: &ActorHandle,
    target: ActorState,
    config: &RuntimeConfig,
) -> Result<(), RuntimeError> {
    let rx = handle.subscribe();
    let deadline = Instant::now() + config.wait_timeout;
    loop {
        if rx.borrow().status == target {
            return Ok(());
        }
        if Instant::now() >= deadline {
            return Err(RuntimeError::WaitTimeout {
                node: handle.node_id().to_string(),
                target,
            });
        }
        tokio::time::sleep(config.wait_poll).await;
    }
}

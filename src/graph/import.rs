/// Node kind registry
///
/// Maps kind tags to behavior implementations for the import boundary.
/// Lock-free reads via `ArcSwap` keep hot-path lookups cheap while
/// registration swaps in a rebuilt map.

use crate::nodes::{
    DelayNode, HttpRequestNode, InputNode, ModuleNode, NodeBehavior, OutputNode, ScriptNode,
    TemplateNode,
};
use arc_swap::ArcSwap;
use std::collections::HashMap;
use std::sync::Arc;

type BehaviorMap = HashMap<String, Arc<dyn NodeBehavior>>;

pub struct NodeRegistry {
    behaviors: ArcSwap<BehaviorMap>,
}

impl NodeRegistry {
    /// Empty registry; callers register kinds explicitly
    pub fn new() -> Self {
        Self {
            behaviors: ArcSwap::from_pointee(BehaviorMap::new()),
        }
    }

    /// Registry pre-loaded with every built-in kind
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        registry.register(Arc::new(InputNode));
        registry.register(Arc::new(OutputNode));
        registry.register(Arc::new(TemplateNode));
        registry.register(Arc::new(ScriptNode));
        registry.register(Arc::new(HttpRequestNode));
        registry.register(Arc::new(DelayNode));
        registry.register(Arc::new(ModuleNode));
        registry
    }

    /// Register (or replace) a behavior under its kind tag
    pub fn register(&self, behavior: Arc<dyn NodeBehavior>) {
        let kind = behavior.kind().to_string();
        let mut next: BehaviorMap = (**self.behaviors.load()).clone();
        next.insert(kind.clone(), behavior);
        self.behaviors.store(Arc::new(next));
        tracing::debug!("registered node kind '{}'", kind);
    }

    pub fn get(&self, kind: &str) -> Option<Arc<dyn NodeBehavior>> {
        self.behaviors.load().get(kind).cloned()
    }

    pub fn kinds(&self) -> Vec<String> {
        let mut kinds: Vec<String> = self.behaviors.load().keys().cloned().collect();
        kinds.sort();
        kinds
    }
}

impl Default for NodeRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

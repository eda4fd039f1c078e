//! Maps action-type tags to processors.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::warn;

use crate::models::ActionType;
use crate::ActionProcessor;

/// Enum-keyed lookup table of processors; one processor per action type.
#[derive(Clone, Default)]
pub struct ProcessorRegistry {
    processors: HashMap<ActionType, Arc<dyn ActionProcessor>>,
}

impl ProcessorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `processor` under the type it declares, replacing any
    /// previous registration for that type.
    pub fn register(&mut self, processor: Arc<dyn ActionProcessor>) -> &mut Self {
        let action_type = processor.action_type();
        if self.processors.insert(action_type, processor).is_some() {
            warn!(%action_type, "replacing previously registered processor");
        }
        self
    }

    pub fn with(mut self, processor: Arc<dyn ActionProcessor>) -> Self {
        self.register(processor);
        self
    }

    pub fn get(&self, action_type: ActionType) -> Option<&Arc<dyn ActionProcessor>> {
        self.processors.get(&action_type)
    }

    pub fn contains(&self, action_type: ActionType) -> bool {
        self.processors.contains_key(&action_type)
    }

    pub fn len(&self) -> usize {
        self.processors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processors.is_empty()
    }
}

impl std::fmt::Debug for ProcessorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.processors.keys()).finish()
    }
}

//! Context storage.

use std::collections::HashMap;

use super::{Context, ContextDefaults};
use crate::transport::Identity;

/// Mapping from identity to its context.
///
/// Contexts are created lazily from the process-wide defaults and live
/// until the identity is revoked.
#[derive(Debug)]
pub struct ContextStore {
    defaults: ContextDefaults,
    contexts: HashMap<Identity, Context>,
}

impl ContextStore {
    /// Create an empty store.
    pub fn new(defaults: ContextDefaults) -> Self {
        Self {
            defaults,
            contexts: HashMap::new(),
        }
    }

    /// Settings new contexts start with.
    pub fn defaults(&self) -> &ContextDefaults {
        &self.defaults
    }

    pub fn get(&self, identity: Identity) -> Option<&Context> {
        self.contexts.get(&identity)
    }

    pub fn get_mut(&mut self, identity: Identity) -> Option<&mut Context> {
        self.contexts.get_mut(&identity)
    }

    /// Fetch the context of `identity`, creating it from the defaults.
    pub fn get_or_create(&mut self, identity: Identity) -> &mut Context {
        let defaults = &self.defaults;
        self.contexts
            .entry(identity)
            .or_insert_with(|| Context::new(identity, defaults))
    }

    /// Discard the context of `identity`.
    pub fn remove(&mut self, identity: Identity) -> Option<Context> {
        self.contexts.remove(&identity)
    }

    /// Identities that have a context, sorted.
    pub fn identities(&self) -> Vec<Identity> {
        let mut ids: Vec<Identity> = self.contexts.keys().copied().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }
}

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::condition::backend::QueryBackend;
use crate::condition::leaf::LeafResolverFn;
use crate::model::{FilterDefinitionError, PropertyRef};

/// A provider of one or more custom operators. Codes are case-insensitive;
/// UPPER_SNAKE_CASE is the convention.
pub trait CustomOperatorProvider<B: QueryBackend>: Send + Sync {
    /// The operator codes this provider answers for.
    fn supported_operators(&self) -> Vec<String>;

    /// Produce the deferred leaf callback for a property filtered with one
    /// of this provider's operators. Values reach the callback at resolve
    /// time through [`crate::condition::ResolvedFilter`].
    fn to_resolver(
        &self,
        property: &Arc<dyn PropertyRef>,
    ) -> Result<LeafResolverFn<B>, FilterDefinitionError>;
}

/// Custom-operator lookup service. Owned by the driver's filter context;
/// clones share the same provider table.
pub struct CustomOperators<B: QueryBackend> {
    providers: Arc<RwLock<HashMap<String, Arc<dyn CustomOperatorProvider<B>>>>>,
}

impl<B: QueryBackend> CustomOperators<B> {
    pub fn new() -> Self {
        CustomOperators {
            providers: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Register a provider under every code it supports.
    pub fn register(&self, provider: Arc<dyn CustomOperatorProvider<B>>) {
        let mut providers = self.providers.write().unwrap();
        for code in provider.supported_operators() {
            providers.insert(code.to_uppercase(), Arc::clone(&provider));
        }
    }

    pub fn lookup(&self, code: &str) -> Option<Arc<dyn CustomOperatorProvider<B>>> {
        self.providers
            .read()
            .unwrap()
            .get(&code.to_uppercase())
            .cloned()
    }

    pub fn clear(&self) {
        self.providers.write().unwrap().clear();
    }
}

impl<B: QueryBackend> Default for CustomOperators<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: QueryBackend> Clone for CustomOperators<B> {
    fn clone(&self) -> Self {
        CustomOperators {
            providers: Arc::clone(&self.providers),
        }
    }
}

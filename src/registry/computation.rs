//! Computed-field computation dispatch.
//!
//! Reflection-based method resolution in comparable systems becomes a typed
//! function table here: providers answer `(dto, field, arity)` queries with a
//! callable, and the registry memoizes the winning callable so each shape
//! resolves once per process.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use lazy_static::lazy_static;
use serde_json::Value;

use crate::projection::errors::ComputationResolutionError;

/// A resolved computation: dependency values in, computed value out.
pub type ComputeFn =
    Arc<dyn Fn(&[Value]) -> Result<Value, ComputationResolutionError> + Send + Sync>;

/// A named source of computations, searched in registration order.
pub trait ComputationProvider: Send + Sync {
    fn name(&self) -> &str;

    fn resolve(&self, dto: &str, field: &str, arity: usize) -> Option<ComputeFn>;
}

/// Table-backed provider for drivers that register closures directly.
pub struct FnComputationProvider {
    name: String,
    computations: RwLock<HashMap<(String, String), ComputeFn>>,
}

impl FnComputationProvider {
    pub fn new(name: impl Into<String>) -> Self {
        FnComputationProvider {
            name: name.into(),
            computations: RwLock::new(HashMap::new()),
        }
    }

    pub fn computation<F>(self, dto: impl Into<String>, field: impl Into<String>, f: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value, ComputationResolutionError> + Send + Sync + 'static,
    {
        self.computations
            .write()
            .unwrap()
            .insert((dto.into(), field.into()), Arc::new(f));
        self
    }
}

impl ComputationProvider for FnComputationProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn resolve(&self, dto: &str, field: &str, _arity: usize) -> Option<ComputeFn> {
        self.computations
            .read()
            .unwrap()
            .get(&(dto.to_string(), field.to_string()))
            .cloned()
    }
}

lazy_static! {
    static ref PROVIDERS: RwLock<Vec<Arc<dyn ComputationProvider>>> = RwLock::new(Vec::new());
    static ref RESOLVED: RwLock<HashMap<(String, String, usize), ComputeFn>> =
        RwLock::new(HashMap::new());
}

/// Process-wide computation service with `register` / `resolve` / `clear`.
pub struct ComputationRegistry;

impl ComputationRegistry {
    pub fn register(provider: Arc<dyn ComputationProvider>) {
        PROVIDERS.write().unwrap().push(provider);
    }

    /// Resolve a computation, memoized per `(dto, field, arity)`. A miss
    /// names every provider that was searched.
    pub fn resolve(
        dto: &str,
        field: &str,
        arity: usize,
    ) -> Result<ComputeFn, ComputationResolutionError> {
        let cache_key = (dto.to_string(), field.to_string(), arity);
        if let Some(found) = RESOLVED.read().unwrap().get(&cache_key) {
            return Ok(Arc::clone(found));
        }

        let providers = PROVIDERS.read().unwrap();
        let mut searched = Vec::with_capacity(providers.len());
        for provider in providers.iter() {
            searched.push(provider.name().to_string());
            if let Some(compute) = provider.resolve(dto, field, arity) {
                RESOLVED
                    .write()
                    .unwrap()
                    .insert(cache_key, Arc::clone(&compute));
                return Ok(compute);
            }
        }
        Err(ComputationResolutionError {
            dto: dto.to_string(),
            field: field.to_string(),
            arity,
            searched,
        })
    }

    pub fn clear() {
        PROVIDERS.write().unwrap().clear();
        RESOLVED.write().unwrap().clear();
    }
}

//! Circuit Breaker Registry
//!
//! Owns one breaker per resource name. Constructed once by the composition
//! root and handed to every component that needs a breaker.

use super::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerSnapshot};
use crate::config::ConfigError;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;

#[derive(Default)]
pub struct CircuitBreakerRegistry {
    breakers: DashMap<String, Arc<CircuitBreaker>>,
}

impl CircuitBreakerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the breaker for `config.name`, creating it on first use.
    ///
    /// Once a name is registered the rest of `config` is ignored on later calls.
    pub fn get_circuit_breaker(
        &self,
        config: CircuitBreakerConfig,
    ) -> Result<Arc<CircuitBreaker>, ConfigError> {
        if let Some(existing) = self.breakers.get(&config.name) {
            return Ok(existing.clone());
        }

        match self.breakers.entry(config.name.clone()) {
            Entry::Occupied(entry) => Ok(entry.get().clone()),
            Entry::Vacant(entry) => {
                let breaker = Arc::new(CircuitBreaker::new(config)?);
                tracing::debug!(circuit = %breaker.name(), "circuit breaker registered");
                Ok(entry.insert(breaker).clone())
            }
        }
    }

    /// Look up an already registered breaker.
    pub fn get(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.get(name).map(|b| b.clone())
    }

    pub fn names(&self) -> Vec<String> {
        self.breakers.iter().map(|e| e.key().clone()).collect()
    }

    pub fn snapshots(&self) -> Vec<CircuitBreakerSnapshot> {
        self.breakers.iter().map(|e| e.value().snapshot()).collect()
    }

    /// Force every breaker closed.
    pub fn reset_all(&self) {
        for entry in self.breakers.iter() {
            entry.value().reset();
        }
    }

    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }
}

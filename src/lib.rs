//! design-corpus Library
//!
//! Resilient loading and caching of a design-system corpus (tokens,
//! components and guidelines), exposed for integration tests and embedding.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod error;
pub mod infrastructure;

// Re-export commonly used types
pub use adapters::outbound::JsonCorpusLoader;
pub use application::{DataManager, DataManagerConfig, LoadResult};
pub use config::load_config;
pub use domain::entities::{CacheSnapshot, Component, Guideline, Token};
pub use domain::ports::{CorpusLoader, LoadOutcome, RecordError};
pub use error::{ErrorKind, ServiceError, ServiceResult};
pub use infrastructure::{
    BreakerError, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerRegistry, CircuitState,
    DataEvent,
};

//! Infrastructure Layer
//!
//! Cross-cutting concerns and infrastructure components.

pub mod breaker_registry;
pub mod circuit_breaker;
pub mod events;
pub mod file_watcher;
pub mod instrument;
pub mod shutdown;

pub use breaker_registry::CircuitBreakerRegistry;
pub use circuit_breaker::{
    BreakerError, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerSnapshot, CircuitState,
};
pub use events::{DataEvent, EventBus, SubscriptionId};
pub use file_watcher::{ChangeKind, DataWatcher, FileChange, WatchError};
pub use instrument::with_error_handling;
pub use shutdown::{shutdown_signal, ShutdownReason};

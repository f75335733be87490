//! Domain Layer
//!
//! Corpus records, the cache snapshot, and the ports the application layer
//! depends on.

pub mod entities;
pub mod ports;
pub mod value_objects;

pub use entities::{CacheSnapshot, Component, Guideline, Record, Token};
pub use value_objects::TokenCategory;

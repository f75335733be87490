//! Application Layer
//!
//! Services that orchestrate domain ports and infrastructure.

mod data_manager;

pub use data_manager::{DataManager, DataManagerConfig, LoadResult};

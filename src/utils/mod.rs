//! Utility modules

pub mod memory_storage;
pub mod recording_sink;
pub mod validation;

pub use memory_storage::*;
pub use recording_sink::*;
pub use validation::*;

//! Ledger module containing trip, registry and hand loan management

pub mod core;
pub mod hand_loan;
pub mod lifecycle;
pub mod registry;
pub mod trip;

pub use core::*;
pub use hand_loan::*;
pub use lifecycle::*;
pub use registry::*;
pub use trip::*;

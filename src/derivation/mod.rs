//! Derivation engine for trip money fields
//!
//! Every computed field on a trip (hire value, gross amount, commission and
//! the two balances) is produced here, for both the live preview and the
//! persistence path. Nothing in this module fails: raw input is coerced to
//! zero before any arithmetic.

pub mod amount;
pub mod formulas;
pub mod payment_mode;
pub mod snapshot;

pub use amount::*;
pub use formulas::*;
pub use payment_mode::*;
pub use snapshot::*;

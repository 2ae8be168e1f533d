//! # Trip Ledger
//!
//! Financial core for taxi and lorry-hire dispatch: every trip tracks what is
//! owed to the driver and what is owed by the consignor, and this crate keeps
//! the two sides derived, versioned and reportable.
//!
//! ## Features
//!
//! - **Derivation engine**: hire value, gross amount, commission and both balances from raw form input
//! - **Trip lifecycle**: guarded status transitions with driver availability side effects
//! - **Optimistic concurrency**: every trip write names the version it was computed from
//! - **Registry**: consignors and drivers with per-organization uniqueness and bulk import
//! - **Hand loans**: a recovery subledger tolerant of over-recovery
//! - **Reports**: commission, to-pay, driver/consignor ledgers, receivable aging
//! - **Reconciliation**: repair of driver statuses that drifted from trip statuses
//! - **Storage abstraction**: database-agnostic design with trait-based storage
//!
//! ## Quick Start
//!
//! ```rust
//! use trip_ledger::{DispatchLedger, LedgerConfig, RequestScope, TripForm};
//! use trip_ledger::utils::MemoryStorage;
//! use bigdecimal::BigDecimal;
//! use chrono::NaiveDate;
//!
//! let ledger = DispatchLedger::new(MemoryStorage::new(), LedgerConfig::default()).unwrap();
//! let scope = RequestScope::admin("org1");
//!
//! let form = TripForm {
//!     trip_date: NaiveDate::from_ymd_opt(2024, 5, 1),
//!     loaded_weight: 10.into(),
//!     driver_rate_per_ton: 2000.into(),
//!     loading_commission: 500.into(),
//!     billed_weight: 10.into(),
//!     consignor_rate_per_ton: 2500.into(),
//!     ..TripForm::default()
//! };
//! let preview = ledger.preview_trip(&scope, &form).unwrap();
//! assert_eq!(preview.commission, BigDecimal::from(5500));
//! ```

pub mod config;
pub mod derivation;
pub mod ledger;
pub mod reconciliation;
pub mod reports;
pub mod scope;
pub mod slip;
pub mod traits;
pub mod types;
pub mod utils;

// Re-export commonly used types
pub use config::*;
pub use derivation::*;
pub use ledger::*;
pub use reconciliation::*;
pub use reports::*;
pub use scope::*;
pub use slip::*;
pub use traits::*;
pub use types::*;

//! # Experiment Crate
//!
//! Online experiment tracking for the recommendation core:
//!
//! - **ledger**: per-(user, variant) counter rows with synchronously
//!   recomputed rates, safe under concurrent writers
//! - **performance**: per-serve measurements and the per-algorithm
//!   aggregation the dashboard reads

pub mod ledger;
pub mod performance;

pub use ledger::{ExperimentLedger, ExperimentRow};
pub use performance::{AlgorithmStats, PerformanceLog, PerformanceSample};

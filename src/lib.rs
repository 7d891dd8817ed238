//! Lottobook Backend Library
//!
//! Settlement of numbers-lottery wagers against announced draw results:
//! matching rules, rate resolution with half-price overrides, idempotent
//! outcome persistence and per-agent reporting.
//!
//! The binary in `main.rs` is a thin CLI over [`settlement::SettlementService`]
//! and [`reporting`].

pub mod config;
pub mod error;
pub mod models;
pub mod money;
pub mod reporting;
pub mod settlement;
pub mod storage;

pub use error::{SettlementError, SettlementResult};
pub use settlement::{SettlementEngine, SettlementService};
pub use storage::LotteryDb;

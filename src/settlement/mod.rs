//! Settlement
//!
//! Pure matching and rating in `rules`, `rates` and `engine`; the engine reads
//! a [`SettlementSnapshot`] captured through the provider traits and never
//! touches storage. `service` adds persistence and per-period locking.

pub mod engine;
pub mod lock;
pub mod providers;
pub mod rates;
pub mod rules;
pub mod service;

pub use engine::{outcome_id, SettlementEngine, SettlementRun, SettlementStats};
pub use lock::PeriodLocks;
pub use providers::{
    HalfPriceProvider, PeriodProvider, RateProvider, SettlementSnapshot, WagerProvider,
};
pub use rates::{resolve_rate, EffectiveRate, HalfPriceSet, RateTable};
pub use rules::{match_wager, permutations, RuleMatch};
pub use service::{SettlementReport, SettlementService};

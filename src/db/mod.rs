//! Persistence: candle/prediction store, training status table, CSV ledgers

pub mod ledger;
pub mod plan;
pub mod status;
pub mod store;

pub use status::StatusStore;
pub use store::CandleStore;

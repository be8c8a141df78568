//! Funding rate history store.
//!
//! One append-only partition per `InstrumentKey`, ordered by exchange-reported
//! `observed_at`. Reads work on `Arc` snapshots so range queries stay
//! consistent while collectors append and the retention task prunes.
//!
//! Durability comes from an optional [`ObservationJournal`]; the bundled
//! [`JsonLinesJournal`] writes day-rotated `.jsonl` files that are replayed
//! on startup.

pub mod cursor;
pub mod error;
pub mod history;
pub mod journal;
pub mod row;

pub use cursor::RangeCursor;
pub use error::{StoreError, StoreResult};
pub use history::{AppendOutcome, HistoryStore};
pub use journal::{JsonLinesJournal, ObservationJournal};
pub use row::ObservationRow;

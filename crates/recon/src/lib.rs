//! `crosswalk-recon`: statement line-item reconciliation engine.
//!
//! Pure engine crate: pulls cells through the [`store`] traits, returns
//! assignments and an audit trail. No CLI or file IO dependencies.

pub mod audit;
pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod model;
pub mod normalize;
pub mod populate;
pub mod resolve;
pub mod scope;
pub mod scorer;
pub mod store;
pub mod summary;
pub mod synonyms;
pub mod verify;

pub use config::ReconConfig;
pub use engine::{run, RunOptions};
pub use error::ReconError;
pub use model::{Assignment, AuditRecord, Origin, ReconResult, ScopedEntity};
pub use store::{CellValue, MemoryWorkbook, TabularSource, TabularStore};

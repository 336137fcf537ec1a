//! `atlas-curate`: multi-source biosensor record reconciliation engine.
//!
//! Pure engine crate: receives pre-loaded records and a versioned policy,
//! returns merged records plus a release verdict. No CLI or IO dependencies.

pub mod alias;
pub mod config;
pub mod engine;
pub mod error;
pub mod gate;
pub mod grouping;
pub mod ingest;
pub mod merge;
pub mod model;
pub mod normalize;
pub mod outlier;
pub mod quality;
pub mod summary;
pub mod units;

pub use config::CurationPolicy;
pub use engine::run;
pub use error::CurateError;
pub use ingest::{load_csv_records, IngestOutput};
pub use model::{CurationResult, GateDecision, MergedRecord, RawRecord};
pub use units::MetricUnit;

//! Endurance Load - training-load feature engineering for running activities
//!
//! Raw activity payloads become model-ready feature tables through a staged,
//! deterministic pipeline: run extraction → daily aggregation → weekly
//! aggregation with rolling load metrics → next-week labels.
//!
//! ## Modules
//!
//! - **Pure stages**: `adapters`, `features`, `daily`, `weekly`, `rolling`, `labels`
//! - **Persistence**: `storage` keeps every stage's table in SQLite
//! - **Orchestration**: `pipeline` runs the stages against a database

pub mod adapters;
pub mod config;
pub mod daily;
pub mod error;
pub mod features;
pub mod labels;
pub mod pipeline;
pub mod rolling;
pub mod storage;
pub mod types;
pub mod weekly;

pub use adapters::{ActivityAdapter, RawActivity, StravaAdapter};
pub use config::{PipelineConfig, UnknownZonePolicy};
pub use error::PipelineError;
pub use pipeline::{compute_features, extract_runs, FeaturePipeline};
pub use storage::Database;
pub use types::{
    DailyFeatures, EffortZone, FeatureTables, RollingLoad, RunRecord, StageReport, WeeklyFeatures,
    WeeklyLabel,
};

/// Crate version reported by the CLI
pub const ENDURANCE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name reported by the CLI
pub const PRODUCER_NAME: &str = "endurance-load";

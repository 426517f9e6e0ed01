//! Runtime monitors fed by the pipeline.
//!
//! All of them are safe to read from another task while the pipeline
//! writes.

mod alert;
mod rate;
mod stats;

pub use alert::{AlertEngine, AlertRule};
pub use rate::RateDetector;
pub use stats::{LevelCounts, Stats};

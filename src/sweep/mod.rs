pub mod aggregator;
pub mod orchestrator;
pub mod outcome;
pub mod pacing;
pub mod record;
pub mod space;

// Re-export common types
pub use aggregator::ResultAggregator;
pub use orchestrator::FetchOrchestrator;
pub use outcome::{CellFailure, FetchOutcome, SweepReport};
pub use record::KeywordRecord;
pub use space::{SweepCell, SweepConfig, SweepSpace, VolumeBand};

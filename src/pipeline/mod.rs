//! Disease detection and advisory pipeline
//!
//! Classification, advice synthesis and community ranking for one scan,
//! strictly in that order. Once a disease is identified every later
//! failure is absorbed into degraded content.

pub mod orchestrator;
pub mod record;

pub use orchestrator::{Orchestrator, ScanDetails, ScanOutcome, ScanPage, ScanSubmission, Stores};
pub use record::{PipelineStage, ScanRecord, ScanStatus};

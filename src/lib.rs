//! Hardpoint Flux - Batch feature extraction for hardpoint actuator breakaway tests
//!
//! Flux finds when hardpoint breakaway tests ran and turns their telemetry
//! into per-phase physical features through a deterministic pipeline:
//! command grouping → window detection → state segmentation → stiffness and
//! breakaway extraction → acceptance band classification.
//!
//! ## Modules
//!
//! - **Scan**: detect test windows from command bursts and test state telemetry
//! - **Features**: per (window, hardpoint, phase) stiffness, breakaway and statistics
//! - **Report**: acceptance statistics over a classified feature table

pub mod adapter;
pub mod breakaway;
pub mod config;
pub mod error;
pub mod features;
pub mod grouping;
pub mod pipeline;
pub mod report;
pub mod scanner;
pub mod segments;
pub mod stiffness;
pub mod store;
pub mod telemetry;
pub mod types;

pub use config::PipelineConfig;
pub use error::ComputeError;
pub use features::FeatureExtractor;
pub use pipeline::{run_hardpoint_pipeline, HardpointPipeline, PipelineOutput};
pub use scanner::{ScanResult, WindowScanner};
pub use telemetry::{CsvDirectorySource, MemorySource, TelemetrySource};
pub use types::{FeatureRow, HardpointTest, TestWindow};

/// Flux version recorded in every run manifest
pub const FLUX_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name for run manifests
pub const PRODUCER_NAME: &str = "hardpoint-flux";

//! Next-day diet, sleep and exercise recommendations for IBS patients.
//!
//! Recommendations come from a deterministic rule engine or from a text
//! generation model prompted with retrieved guideline context. The batch
//! runner stores exactly one artifact per user, evaluated day and run category.

pub mod batch;
pub mod catalog;
pub mod config;
pub mod llm;
pub mod model;
pub mod pipeline;
pub mod rag;
pub mod records;
pub mod rules;
pub mod store;
pub mod window;

pub use batch::{BatchError, BatchFlavor, BatchOptions, BatchReport, BatchRunner};
pub use config::NudgeConfig;
pub use model::{InterventionArtifact, Mode, RecommendationResult, RunCategory};
pub use pipeline::{PipelineInputs, PipelineOutcome, RecommendationPipeline};

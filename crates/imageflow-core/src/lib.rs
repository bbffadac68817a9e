//! Shared domain types, request validation, and pipeline orchestration for
//! the marketing image reconstruction and synthesis service.
//!
//! This crate has no dependency on any particular storage SDK or model
//! provider — those live behind the traits in [`traits`] and are implemented
//! by `imageflow-blobstore`, `imageflow-vision`, and `imageflow-synth`.

pub mod config;
pub mod error;
pub mod models;
pub mod orchestrator;
pub mod traits;
pub mod validate;

pub use config::Config;
pub use error::PipelineError;
pub use orchestrator::Orchestrator;

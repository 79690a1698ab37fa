//! VisLang Core - oracle-guided chart generation
//!
//! Turns a natural-language request and a tabular dataset into two
//! Vega-Lite charts and a judgment between them:
//! - Grounds the request in the dataset schema through field selection
//! - Asks a design oracle for a recommended design
//! - Generates a guided and an unguided specification concurrently, each
//!   with a self-correcting retry loop
//! - Judges the two candidates against each other
//!
//! # Example
//!
//! ```rust,ignore
//! use vislang_core::{Pipeline, PipelineConfig, PipelineRequest};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let pipeline = Pipeline::from_config(PipelineConfig::load(None)?)?;
//!
//! let request = PipelineRequest::new("Compare body mass across species", "penguins.csv");
//! let result = pipeline.run(&request).await?;
//!
//! println!("{}", result.comparison.verdict);
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod comparison;
pub mod config;
pub mod error;
pub mod generation;
pub mod pipeline;
pub mod prompts;
pub mod recommendation;
pub mod selection;
pub mod sink;
pub mod state_machine;
pub mod types;

// Re-exports for convenience
pub use comparison::{Comparator, Judgment, JudgmentResponse};
pub use config::PipelineConfig;
pub use error::{AttemptError, ConfigError, GroundingError, PipelineError, Result, SinkError};
pub use generation::{validate_spec, SpecGenerator, SpecResponse};
pub use pipeline::Pipeline;
pub use recommendation::{build_facts, extract, fingerprint, RecommendationAdapter, RecommendationOutcome};
pub use selection::{FieldSelectionResponse, FieldSelector, SelectionOutcome};
pub use sink::{call_log, log_call, Artifact, ArtifactSink, FsSink, NullSink};
pub use state_machine::{allowed_transitions, validate_transition, GenerationMachine, GenerationState, TransitionError};
pub use types::{
    Attempt, Candidate, Channel, ComparisonResult, EncodingRec, FacetRec, FieldSelection, MarkType,
    PathLabel, PathReport, PipelineRequest, PipelineResult, Recommendation, RunId, ScaleRec, Verdict,
};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for running the pipeline
    pub use crate::{
        Candidate, ComparisonResult, Pipeline, PipelineConfig, PipelineError, PipelineRequest,
        PipelineResult, Recommendation, Verdict,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

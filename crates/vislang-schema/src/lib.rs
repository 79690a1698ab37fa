//! VisLang Schema - datasets, field types and schema facts
//!
//! Turns a tabular file into:
//! - a [`Dataset`] shared read-only by every pipeline stage
//! - a [`SchemaSummary`] used in prompts and for grounding field names
//! - [`SchemaFacts`] consumed by the design oracle
//!
//! # Example
//!
//! ```rust,ignore
//! use vislang_schema::{build, load};
//!
//! let dataset = load("penguins.json", &["vega-datasets/data".into()])?;
//! let (summary, facts) = build(&dataset);
//! println!("{}", summary.column_summary());
//! ```

#![warn(unreachable_pub)]

pub mod dataset;
pub mod error;
pub mod facts;
pub mod schema;

pub use dataset::{load, normalize_name, resolve_path, Dataset, Row};
pub use error::DataFormatError;
pub use facts::{atom, attribute, build, entity, SchemaFacts};
pub use schema::{
    classify, sample_rows, DataType, FieldSummary, SchemaSummary, SemanticType,
    NOMINAL_CARDINALITY_LIMIT,
};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

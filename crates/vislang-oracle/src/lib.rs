//! VisLang Oracle - boundaries to the external collaborators
//!
//! The pipeline never reimplements a language model, a constraint solver or a
//! chart rasterizer. It talks to them through three traits:
//! - [`TextOracle`]: conversation in, raw text out
//! - [`DesignOracle`]: facts in, ranked answer sets out
//! - [`Renderer`]: specification + data in, chart object and PNG out
//!
//! Production adapters are provided for each ([`ChatCompletionsOracle`],
//! [`DesignProcess`], [`VegaLiteRenderer`]); tests substitute scripted ones.

#![warn(unreachable_pub)]

pub mod design;
pub mod error;
pub mod json;
pub mod message;
pub mod render;
pub mod text;

pub use design::{DesignModel, DesignOracle, DesignProcess};
pub use error::{DecodeError, OracleError, RenderError};
pub use json::{decode_leading, decode_object, strip_fences};
pub use message::{ChatRequest, Exchange, LabeledImage, Role, Turn};
pub use render::{bind, Chart, Renderer, VegaLiteRenderer, KNOWN_CHANNELS, KNOWN_MARKS};
pub use text::{exchange, ChatCompletionsConfig, ChatCompletionsOracle, TextOracle};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

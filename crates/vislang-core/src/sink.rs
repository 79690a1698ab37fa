//! Artifact persistence
//!
//! Each run writes named artifacts into its own directory. Names are unique
//! per call site, so concurrent writers never touch the same file. Callers
//! treat sink failures as non-fatal.

use crate::error::SinkError;
use async_trait::async_trait;
use chrono::{DateTime, Local};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::path::{Component, Path, PathBuf};
use vislang_oracle::{ChatRequest, Role};

/// Content of one artifact
#[derive(Debug, Clone, PartialEq)]
pub enum Artifact {
    /// Written as pretty JSON
    Json(Value),
    /// Written verbatim
    Text(String),
    /// Written as raw PNG bytes
    Png(Vec<u8>),
}

impl Artifact {
    /// Serialized bytes
    ///
    /// # Errors
    /// `SinkError::Serialize` if JSON encoding fails.
    pub fn to_bytes(&self) -> Result<Vec<u8>, SinkError> {
        Ok(match self {
            Self::Json(value) => serde_json::to_vec_pretty(value)?,
            Self::Text(text) => text.as_bytes().to_vec(),
            Self::Png(bytes) => bytes.clone(),
        })
    }
}

/// Destination for run artifacts
#[async_trait]
pub trait ArtifactSink: Send + Sync {
    /// Store `artifact` under `name` (may contain one `/`-separated subdirectory)
    async fn write(&self, name: &str, artifact: Artifact) -> Result<(), SinkError>;

    /// Directory holding the artifacts, if any
    fn location(&self) -> Option<PathBuf>;
}

/// Sink that discards everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

#[async_trait]
impl ArtifactSink for NullSink {
    async fn write(&self, _name: &str, _artifact: Artifact) -> Result<(), SinkError> {
        Ok(())
    }

    fn location(&self) -> Option<PathBuf> {
        None
    }
}

/// Sink writing files under a run directory
#[derive(Debug, Clone)]
pub struct FsSink {
    dir: PathBuf,
}

impl FsSink {
    /// Use an existing directory
    #[inline]
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Create `{root}/{timestamp}_{short_model}_{slug}`
    ///
    /// # Errors
    /// `SinkError::Io` if the directory cannot be created.
    pub async fn create(root: &Path, model: &str, prompt: &str) -> Result<Self, SinkError> {
        let dir = root.join(run_dir_name(Local::now(), model, prompt));
        tokio::fs::create_dir_all(&dir).await?;
        tracing::info!(dir = %dir.display(), "Created run directory");
        Ok(Self { dir })
    }

    /// Run directory
    #[inline]
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl ArtifactSink for FsSink {
    async fn write(&self, name: &str, artifact: Artifact) -> Result<(), SinkError> {
        let relative = Path::new(name);
        let contained = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        if name.is_empty() || !contained {
            return Err(SinkError::InvalidName(name.to_string()));
        }

        let path = self.dir.join(relative);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, artifact.to_bytes()?).await?;
        tracing::debug!(artifact = name, "Wrote artifact");
        Ok(())
    }

    fn location(&self) -> Option<PathBuf> {
        Some(self.dir.clone())
    }
}

static DATE_SUFFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"-\d{8,}$").unwrap_or_else(|e| unreachable!("date suffix pattern is a valid regex: {e}"))
});

/// Compact model label: `anthropic/claude-opus-4-6` → `opus46`
#[must_use]
pub fn short_model_name(model: &str) -> String {
    let name = model.split_once('/').map_or(model, |(_, rest)| rest);
    let name = name.replace("claude-", "");
    let name = DATE_SUFFIX.replace(&name, "");
    name.chars().filter(|c| *c != '-' && *c != '.').collect()
}

/// Filesystem-safe prompt prefix
#[must_use]
pub fn slug(prompt: &str) -> String {
    prompt
        .to_lowercase()
        .chars()
        .take(40)
        .map(|c| if c == ' ' { '-' } else { c })
        .filter(|c| c.is_alphanumeric() || *c == '-')
        .collect()
}

/// Run directory name
#[must_use]
pub fn run_dir_name(at: DateTime<Local>, model: &str, prompt: &str) -> String {
    format!(
        "{}_{}_{}",
        at.format("%Y-%m-%d_%H%M%S"),
        short_model_name(model),
        slug(prompt)
    )
}

/// Markdown transcript of one oracle call
#[must_use]
pub fn call_log(name: &str, request: &ChatRequest) -> String {
    let mut parts = vec![
        format!("# LLM Call: {name}\n"),
        "## System Prompt\n".to_string(),
        request.system.trim().to_string(),
        String::new(),
        "## User Prompt\n".to_string(),
        request.user.trim().to_string(),
        String::new(),
    ];

    if !request.images.is_empty() {
        parts.push("## Images\n".to_string());
        parts.extend(request.images.iter().map(|i| format!("- {}", i.label)));
        parts.push(String::new());
    }

    if !request.turns.is_empty() {
        parts.push("## Retry Messages\n".to_string());
        for turn in &request.turns {
            let title = match turn.role {
                Role::System => "System",
                Role::User => "User",
                Role::Assistant => "Assistant",
            };
            parts.push(format!("### {title}\n"));
            parts.push(turn.content.trim().to_string());
            parts.push(String::new());
        }
    }
    parts.join("\n")
}

/// Write `llm_calls/{name}_input.md` and `llm_calls/{name}_output.json`
///
/// # Errors
/// The first sink failure.
pub async fn log_call(
    sink: &dyn ArtifactSink,
    name: &str,
    request: &ChatRequest,
    response: Value,
) -> Result<(), SinkError> {
    sink.write(
        &format!("llm_calls/{name}_input.md"),
        Artifact::Text(call_log(name, request)),
    )
    .await?;
    sink.write(&format!("llm_calls/{name}_output.json"), Artifact::Json(response))
        .await
}

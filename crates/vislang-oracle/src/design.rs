//! Design oracle boundary
//!
//! The design oracle completes a partial chart specification expressed as
//! facts and returns ranked answer sets. It is consumed through
//! [`DesignOracle`]; [`DesignProcess`] runs a bridge program that speaks JSON
//! over stdin/stdout.

use crate::error::OracleError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// One ranked answer set
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DesignModel {
    /// Completed specification as a nested dict (`view` → `mark` → `encoding` …)
    #[serde(alias = "spec_dict")]
    pub spec: Value,
    /// Optimization cost vector
    #[serde(default)]
    pub cost: Vec<i64>,
    /// Soft-constraint violation counts
    #[serde(default)]
    pub violations: BTreeMap<String, u64>,
}

/// Constraint-based visualization recommender
#[async_trait]
pub trait DesignOracle: Send + Sync {
    /// Complete a partial specification, returning at most `models` ranked answers
    async fn complete_spec(
        &self,
        facts: &[String],
        models: usize,
    ) -> Result<Vec<DesignModel>, OracleError>;
}

/// Design oracle backed by an external bridge process
///
/// The process receives `{"facts": [...], "models": n}` on stdin and must
/// print a JSON array of `{spec, cost, violations}` objects on stdout.
#[derive(Debug, Clone)]
pub struct DesignProcess {
    program: String,
    args: Vec<String>,
}

impl DesignProcess {
    /// Create from a program and its arguments
    #[inline]
    #[must_use]
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Parse a whitespace-separated command line
    ///
    /// # Errors
    /// `OracleError::Process` for an empty command.
    pub fn from_command_line(command: &str) -> Result<Self, OracleError> {
        let mut parts = command.split_whitespace().map(str::to_string);
        let program = parts
            .next()
            .ok_or_else(|| OracleError::Process("empty design oracle command".into()))?;
        Ok(Self::new(program, parts.collect()))
    }
}

#[async_trait]
impl DesignOracle for DesignProcess {
    async fn complete_spec(
        &self,
        facts: &[String],
        models: usize,
    ) -> Result<Vec<DesignModel>, OracleError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| OracleError::Process(format!("failed to start {}: {e}", self.program)))?;

        let input = json!({"facts": facts, "models": models}).to_string();
        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(input.as_bytes())
                .await
                .map_err(|e| OracleError::Process(e.to_string()))?;
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| OracleError::Process(e.to_string()))?;

        if !output.status.success() {
            return Err(OracleError::Process(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }

        parse_models(&output.stdout)
    }
}

/// Decode the bridge's stdout
///
/// # Errors
/// `OracleError::InvalidResponse` when stdout is not an array of models.
pub fn parse_models(stdout: &[u8]) -> Result<Vec<DesignModel>, OracleError> {
    serde_json::from_slice(stdout).map_err(|e| OracleError::InvalidResponse(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn models_accept_spec_dict_alias() {
        let out = br#"[{"spec_dict": {"view": []}, "cost": [3, 1], "violations": {"c_d_point": 1}}]"#;
        let models = parse_models(out).unwrap();
        assert_eq!(models.len(), 1);
        assert_eq!(models[0].cost, vec![3, 1]);
        assert_eq!(models[0].violations["c_d_point"], 1);
    }

    #[test]
    fn models_default_cost_and_violations() {
        let models = parse_models(br#"[{"spec": {}}]"#).unwrap();
        assert!(models[0].cost.is_empty());
        assert!(models[0].violations.is_empty());
    }

    #[test]
    fn empty_command_is_rejected() {
        assert!(DesignProcess::from_command_line("   ").is_err());
        let p = DesignProcess::from_command_line("python -m draco_bridge").unwrap();
        assert_eq!(p.program, "python");
        assert_eq!(p.args, vec!["-m", "draco_bridge"]);
    }

    #[tokio::test]
    async fn missing_program_is_a_process_error() {
        let oracle = DesignProcess::new("/nonexistent/draco-bridge", vec![]);
        let err = oracle.complete_spec(&[], 1).await.unwrap_err();
        assert!(matches!(err, OracleError::Process(_)));
    }
}

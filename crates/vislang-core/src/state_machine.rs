//! Generation state machine
//!
//! One machine per generation path. The transition table is the only place
//! the retry policy lives; the generator asks the machine where to go next
//! and never decides on its own whether to retry.

use serde::{Deserialize, Serialize};

/// Stage of a generation path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GenerationState {
    /// Calling the oracle and decoding its answer
    Drafting,
    /// Structural checks on the returned specification
    Validating,
    /// Chart construction and rasterization
    Rendering,
    /// Corrective turn appended, about to redraft
    Correcting,
    /// Converged
    Done,
    /// Budget exhausted
    Failed,
}

impl GenerationState {
    /// Whether no further transitions are possible
    #[inline]
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

/// Illegal transition request
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("illegal generation transition {from:?} -> {to:?}")]
pub struct TransitionError {
    /// Current state
    pub from: GenerationState,
    /// Requested state
    pub to: GenerationState,
}

/// States reachable from `from` in one step
#[must_use]
pub fn allowed_transitions(from: GenerationState) -> Vec<GenerationState> {
    use GenerationState::*;
    match from {
        Drafting => vec![Validating, Correcting, Failed],
        Validating => vec![Rendering, Correcting, Failed],
        Rendering => vec![Done, Correcting, Failed],
        Correcting => vec![Drafting, Failed],
        Done | Failed => vec![],
    }
}

/// Validate a single transition
///
/// # Errors
/// `TransitionError` when `to` is not reachable from `from`.
pub fn validate_transition(from: GenerationState, to: GenerationState) -> Result<(), TransitionError> {
    if allowed_transitions(from).contains(&to) {
        Ok(())
    } else {
        Err(TransitionError { from, to })
    }
}

/// Position of one path within its retry budget
#[derive(Debug, Clone)]
pub struct GenerationMachine {
    state: GenerationState,
    attempt: usize,
    max_attempts: usize,
    history: Vec<GenerationState>,
}

impl GenerationMachine {
    /// Start drafting attempt 1 of `max_attempts`
    #[must_use]
    pub fn new(max_attempts: usize) -> Self {
        Self {
            state: GenerationState::Drafting,
            attempt: 1,
            max_attempts: max_attempts.max(1),
            history: vec![GenerationState::Drafting],
        }
    }

    /// Current state
    #[inline]
    #[must_use]
    pub fn state(&self) -> GenerationState {
        self.state
    }

    /// 1-based attempt number
    #[inline]
    #[must_use]
    pub fn attempt(&self) -> usize {
        self.attempt
    }

    /// Attempt budget
    #[inline]
    #[must_use]
    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    /// Every state visited, in order
    #[inline]
    #[must_use]
    pub fn history(&self) -> &[GenerationState] {
        &self.history
    }

    /// Whether the path has finished
    #[inline]
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Current stage passed: move to the next stage
    pub fn pass(&mut self) -> GenerationState {
        let next = match self.state {
            GenerationState::Drafting => GenerationState::Validating,
            GenerationState::Validating => GenerationState::Rendering,
            GenerationState::Rendering => GenerationState::Done,
            other => other,
        };
        self.enter(next)
    }

    /// Current stage failed: correct if budget remains, otherwise fail
    pub fn fail(&mut self) -> GenerationState {
        let next = if self.attempt < self.max_attempts {
            GenerationState::Correcting
        } else {
            GenerationState::Failed
        };
        self.enter(next)
    }

    /// Corrective turn appended: start the next attempt
    pub fn redraft(&mut self) -> GenerationState {
        let state = self.enter(GenerationState::Drafting);
        if state == GenerationState::Drafting {
            self.attempt += 1;
        }
        state
    }

    fn enter(&mut self, to: GenerationState) -> GenerationState {
        if self.state.is_terminal() {
            return self.state;
        }
        match validate_transition(self.state, to) {
            Ok(()) => self.state = to,
            Err(e) => {
                tracing::error!(error = %e, attempt = self.attempt, "Forcing generation path to Failed");
                self.state = GenerationState::Failed;
            }
        }
        self.history.push(self.state);
        self.state
    }
}

//! Runtime errors.

use std::fmt;

use tempera_carton::CompactString;
use tempera_relief::{BindingParseError, TemplateError};
use thiserror::Error;

use crate::effects::Phase;

/// Errors returned by the runtime.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("cannot write read-only property `{0}`")]
    ReadOnlyProperty(CompactString),

    #[error("property `{0}` already has a computed effect")]
    DuplicateComputed(CompactString),

    #[error("invalid method expression `{expression}`: {source}")]
    InvalidMethodExpression {
        expression: CompactString,
        #[source]
        source: BindingParseError,
    },

    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error("element already has attached DOM")]
    AlreadyAttached,

    #[error("stamped DOM does not match template metadata at node {0}")]
    StampMismatch(usize),

    #[error("no element is defined for `{0}`")]
    UndefinedElement(CompactString),

    #[error("{} effect(s) failed; first: {}", .0.len(), .0[0])]
    EffectFailures(Vec<EffectFailure>),
}

impl EngineError {
    /// Failures collected during a flush, if that is what this error is.
    pub fn failures(&self) -> &[EffectFailure] {
        match self {
            EngineError::EffectFailures(failures) => failures,
            _ => &[],
        }
    }
}

/// Error raised by a user handler (method, observer, listener or custom effect).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct HandlerError {
    message: CompactString,
}

impl HandlerError {
    pub fn new(message: impl Into<CompactString>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<&str> for HandlerError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

impl From<String> for HandlerError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

/// Result type of user handlers.
pub type HandlerResult<T = tempera_relief::Value> = Result<T, HandlerError>;

/// One failed effect invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct EffectFailure {
    pub phase: Phase,
    /// Property or path that triggered the effect.
    pub property: CompactString,
    pub error: HandlerError,
}

impl fmt::Display for EffectFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} effect for `{}`: {}", self.phase, self.property, self.error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        let failure = EffectFailure {
            phase: Phase::Observe,
            property: "count".into(),
            error: HandlerError::new("boom"),
        };
        assert_eq!(failure.to_string(), "Observe effect for `count`: boom");

        let err = EngineError::EffectFailures(vec![failure]);
        assert_eq!(
            err.to_string(),
            "1 effect(s) failed; first: Observe effect for `count`: boom"
        );
        assert_eq!(err.failures().len(), 1);
        assert!(EngineError::AlreadyAttached.failures().is_empty());
    }
}

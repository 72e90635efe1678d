//! Domain error types.
//!
//! Two families live here: [`EngineError`] for construction-time validation,
//! trading record misuse and configuration, and [`CodecError`] for descriptor
//! conversion. Evaluation-time absence (no record, no open position) is never an
//! error; it resolves to `false` inside the rule evaluator.

/// Top-level error type for rule construction, ledgers and configuration.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EngineError {
    #[error("invalid rule: {reason}")]
    RuleInvalid { reason: String },

    #[error("{unit} must be in range {range}, got {value}")]
    CalendarValue {
        unit: &'static str,
        range: &'static str,
        value: i64,
    },

    #[error("invalid trade: {reason}")]
    TradeInvalid { reason: String },

    #[error("cannot parse number from {input:?}")]
    NumParse { input: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },
}

impl EngineError {
    pub(crate) fn rule(reason: impl Into<String>) -> Self {
        EngineError::RuleInvalid {
            reason: reason.into(),
        }
    }
}

/// Errors raised while converting between rules and descriptors.
///
/// [`CodecError::Unsupported`] is a capability signal: the rule exists and is
/// valid but has no descriptor form. The remaining variants are hard failures.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("{kind} is not supported by the descriptor codec")]
    Unsupported { kind: String },

    #[error("unknown component type {0:?}")]
    UnknownType(String),

    #[error("descriptor has no type")]
    MissingType,

    #[error("malformed {kind} descriptor: {reason}")]
    Malformed { kind: String, reason: String },

    #[error(transparent)]
    InvalidRule(#[from] EngineError),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl CodecError {
    pub(crate) fn malformed(kind: &str, reason: impl Into<String>) -> Self {
        CodecError::Malformed {
            kind: kind.to_string(),
            reason: reason.into(),
        }
    }

    /// True when the failure only means "this kind has no descriptor form".
    pub fn is_unsupported(&self) -> bool {
        matches!(self, CodecError::Unsupported { .. })
    }
}

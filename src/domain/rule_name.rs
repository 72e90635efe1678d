//! Rule naming.
//!
//! Every rule answers to a name: the custom label a caller assigned, or else a
//! structural default summary such as
//!
//! ```json
//! {"type":"AndRule","components":["entry",{"type":"FixedRule"}]}
//! ```
//!
//! where each component is either the child's custom label or the child's own
//! summary. The default is computed lazily, at most once per rule until it is
//! reset, and concurrent first callers all observe the same value.

use serde::Serialize;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum SummaryComponent {
    Label(String),
    Summary(Arc<RuleSummary>),
}

/// Structural default label of a rule.
#[derive(Debug, Serialize)]
pub struct RuleSummary {
    #[serde(rename = "type")]
    kind: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    components: Vec<SummaryComponent>,
    #[serde(skip)]
    text: String,
}

impl RuleSummary {
    pub fn new(kind: impl Into<String>, components: Vec<SummaryComponent>) -> Self {
        let mut summary = Self {
            kind: kind.into(),
            components,
            text: String::new(),
        };
        summary.text =
            serde_json::to_string(&summary).unwrap_or_else(|_| summary.kind.clone());
        summary
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn components(&self) -> &[SummaryComponent] {
        &self.components
    }

    /// JSON text of the summary.
    pub fn as_str(&self) -> &str {
        &self.text
    }
}

#[derive(Debug, Default)]
pub struct RuleName {
    custom: RwLock<Option<String>>,
    default: Mutex<Option<Arc<RuleSummary>>>,
}

impl RuleName {
    pub fn custom(&self) -> Option<String> {
        self.custom
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Sets the custom label. `None` or a blank string falls back to the
    /// default summary. Any memoized default is dropped.
    pub fn set_custom(&self, name: Option<&str>) {
        let name = name.filter(|s| !s.trim().is_empty()).map(str::to_string);
        *self.custom.write().unwrap_or_else(PoisonError::into_inner) = name;
        self.reset_default();
    }

    /// Returns the memoized default, running `compute` only if none is stored.
    ///
    /// The lock is held across `compute`, so racing first callers wait for the
    /// single computation instead of repeating it.
    pub fn default_or_compute<F>(&self, compute: F) -> Arc<RuleSummary>
    where
        F: FnOnce() -> RuleSummary,
    {
        let mut slot = self.default.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(summary) = slot.as_ref() {
            return Arc::clone(summary);
        }
        let summary = Arc::new(compute());
        *slot = Some(Arc::clone(&summary));
        summary
    }

    pub fn reset_default(&self) {
        *self.default.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

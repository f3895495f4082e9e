use serde::Serialize;

use crate::types::ElementKindTag;

const MAX_FINDINGS: usize = 32;

/// Indicates the severity level of a validation finding.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Suspicious but consistent state, such as an empty store.
    Warning,
    /// Index/identifier mismatch or other integrity failure.
    Problem,
}

/// Represents a single issue discovered during validation.
#[derive(Clone, Debug, Serialize)]
pub struct Finding {
    /// The severity level of this finding.
    pub severity: Severity,
    /// Human-readable description of the issue.
    pub message: String,
}

/// Statistics collected while validating a store.
#[derive(Clone, Debug, Default, Serialize)]
pub struct ValidationCounts {
    /// Identifier slots inspected, slot 0 excluded.
    pub slots: u64,
    /// Slots holding a valid identifier.
    pub live: u64,
    /// Mappings held by the identifier index.
    pub indexed: u64,
}

/// Result of [`super::ElementStore::validator`].
#[derive(Clone, Debug, Serialize)]
pub struct ValidationReport {
    /// Store that was checked.
    pub store: String,
    /// Kind of the store.
    pub kind: ElementKindTag,
    /// Findings, capped; `truncated` counts the ones dropped.
    pub findings: Vec<Finding>,
    /// Findings beyond the cap.
    pub truncated: u64,
    /// What was examined.
    pub counts: ValidationCounts,
}

impl ValidationReport {
    pub(crate) fn new(store: impl Into<String>, kind: ElementKindTag) -> Self {
        Self {
            store: store.into(),
            kind,
            findings: Vec::new(),
            truncated: 0,
            counts: ValidationCounts::default(),
        }
    }

    pub(crate) fn warning(&mut self, message: impl Into<String>) {
        self.push(Severity::Warning, message.into());
    }

    pub(crate) fn problem(&mut self, message: impl Into<String>) {
        self.push(Severity::Problem, message.into());
    }

    fn push(&mut self, severity: Severity, message: String) {
        if self.findings.len() < MAX_FINDINGS {
            self.findings.push(Finding { severity, message });
        } else {
            self.truncated += 1;
        }
    }

    /// True when no finding is a [`Severity::Problem`].
    pub fn is_consistent(&self) -> bool {
        !self
            .findings
            .iter()
            .any(|finding| finding.severity == Severity::Problem)
    }

    /// Findings of the given severity.
    pub fn with_severity(&self, severity: Severity) -> impl Iterator<Item = &Finding> {
        self.findings
            .iter()
            .filter(move |finding| finding.severity == severity)
    }
}

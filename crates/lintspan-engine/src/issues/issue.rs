use std::fmt;
use std::ops::Range;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::text::{Revision, SnapshotSpan, SpanTrackingMode};

/// Issue severity, ordered from most to least severe
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    #[default]
    Warning,
    Message,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Message => "message",
        })
    }
}

/// Analyzer finding as delivered by the external analysis driver
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    /// Byte range in the revision the analyzer looked at
    pub range: Range<usize>,
    pub rule_id: String,
    #[serde(default)]
    pub severity: Severity,
    pub message: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub help_link: Option<String>,
    /// Longer explanation shown in expandable detail rows
    #[serde(default)]
    pub details: Option<String>,
}

impl Issue {
    pub fn new(range: Range<usize>, rule_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            range,
            rule_id: rule_id.into(),
            severity: Severity::default(),
            message: message.into(),
            category: None,
            help_link: None,
            details: None,
        }
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_help_link(mut self, help_link: impl Into<String>) -> Self {
        self.help_link = Some(help_link.into());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

/// An issue bound to a span of one revision.
///
/// Markers are frozen once their snapshot is published; carrying one forward
/// produces a new marker on the later revision sharing the same payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueMarker {
    span: SnapshotSpan,
    issue: Arc<Issue>,
}

impl IssueMarker {
    /// Bind `issue` to its range on `revision`.
    ///
    /// Returns `None` for ranges that are empty or fall outside the revision.
    pub fn new(revision: &Revision, issue: Issue) -> Option<Self> {
        let span = SnapshotSpan::new(revision.clone(), issue.range.clone())?;
        if span.is_empty() {
            return None;
        }
        Some(Self {
            span,
            issue: Arc::new(issue),
        })
    }

    pub fn span(&self) -> &SnapshotSpan {
        &self.span
    }

    pub fn issue(&self) -> &Issue {
        &self.issue
    }

    pub fn shared_issue(&self) -> Arc<Issue> {
        self.issue.clone()
    }

    /// Carry this marker onto a later revision.
    ///
    /// Edges are tracked exclusively so text typed right next to the marker never
    /// becomes part of it. A marker whose length changes (an edit landed inside it),
    /// that collapses to nothing, or that cannot reach `revision` is invalidated.
    pub fn translate_to(&self, revision: &Revision) -> Option<IssueMarker> {
        let translation = self
            .span
            .translate_to(revision, SpanTrackingMode::EdgeExclusive)?;
        if !translation.preserves_length() || translation.span.is_empty() {
            return None;
        }
        Some(IssueMarker {
            span: translation.span,
            issue: self.issue.clone(),
        })
    }
}

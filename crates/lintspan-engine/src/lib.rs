pub mod document;
pub mod issues;
pub mod registry;
pub mod settings;
pub mod tagger;
pub mod text;
pub mod tracker;

// Re-export key types for easier usage
pub use document::DocumentId;
pub use issues::{FieldValue, Issue, IssueMarker, IssuesSnapshot, Severity, SnapshotFactory, TableField};
pub use registry::{IssueRegistry, SinkId, SinkSubscription, TableDataSink};
pub use settings::ProviderSettings;
pub use tagger::{IssueTag, IssueTagger, TaggerId, TagsChangedHandler};
pub use text::{NormalizedSpans, Revision, SnapshotSpan, SpanTrackingMode, TextBuffer, TextEdit, TextError, TextSource};
pub use tracker::IssueTracker;

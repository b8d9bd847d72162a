//! Issue payloads, the markers binding them to text, and versioned snapshots.

pub mod factory;
pub mod fields;
pub mod issue;
pub mod snapshot;

pub use factory::{Published, SnapshotFactory};
pub use fields::{FieldValue, TableField};
pub use issue::{Issue, IssueMarker, Severity};
pub use snapshot::IssuesSnapshot;

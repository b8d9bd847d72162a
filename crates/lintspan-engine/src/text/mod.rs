//! Text revisions, edit-robust spans and the in-memory mutation source.
//!
//! A [`Revision`] is an immutable rope plus a write-once link to the change that
//! produced its successor. Offsets and spans move between revisions through the
//! recorded `xi_rope::Delta`s using `xi_rope`'s interval transformer, so any span can
//! be carried onto any later revision of the same buffer.

pub mod buffer;
pub mod revision;
pub mod span;

pub use buffer::{ChangeListener, ListenerId, TextBuffer, TextChange, TextEdit, TextError, TextSource};
pub use revision::{BufferId, Change, Edit, PointTrackingMode, Revision};
pub use span::{NormalizedSpans, SnapshotSpan, SpanTrackingMode, Translation};

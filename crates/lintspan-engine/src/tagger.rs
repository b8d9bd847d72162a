use std::fmt;
use std::ops::Range;
use std::sync::Arc;

use parking_lot::Mutex;
use uuid::Uuid;

use crate::document::DocumentId;
use crate::issues::{Issue, IssuesSnapshot, Severity};
use crate::registry::IssueRegistry;
use crate::text::{NormalizedSpans, SnapshotSpan, SpanTrackingMode};
use crate::tracker::IssueTracker;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct TaggerId(Uuid);

/// Called with the region of the document whose decorations may have changed
pub type TagsChangedHandler = Arc<dyn Fn(&SnapshotSpan) + Send + Sync>;

/// A decoration for one issue marker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueTag {
    pub span: SnapshotSpan,
    pub severity: Severity,
    pub issue: Arc<Issue>,
}

/// Tracker-facing half of a tagger: the last announced snapshot and its handlers
pub(crate) struct TaggerCore {
    id: TaggerId,
    last: Mutex<Arc<IssuesSnapshot>>,
    handlers: Mutex<Vec<TagsChangedHandler>>,
}

impl TaggerCore {
    pub(crate) fn new(baseline: Arc<IssuesSnapshot>) -> Self {
        Self {
            id: TaggerId(Uuid::new_v4()),
            last: Mutex::new(baseline),
            handlers: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn id(&self) -> TaggerId {
        self.id
    }

    pub(crate) fn snapshot(&self) -> Arc<IssuesSnapshot> {
        self.last.lock().clone()
    }

    pub(crate) fn reset(&self, baseline: Arc<IssuesSnapshot>) {
        *self.last.lock() = baseline;
    }

    fn subscribe(&self, handler: TagsChangedHandler) {
        self.handlers.lock().push(handler);
    }

    /// Adopt `snapshot` and raise at most one region-changed signal.
    ///
    /// The region covers the previous markers carried onto the new revision plus every
    /// new marker. Nothing is raised when that region is empty or when every marker
    /// kept its span and payload.
    pub(crate) fn update(&self, snapshot: &Arc<IssuesSnapshot>) {
        let previous = {
            let mut last = self.last.lock();
            if snapshot.version() <= last.version() {
                return;
            }
            std::mem::replace(&mut *last, snapshot.clone())
        };

        if unchanged(&previous, snapshot) {
            return;
        }
        let Some(region) = changed_region(&previous, snapshot) else {
            return;
        };
        let Some(span) = SnapshotSpan::new(snapshot.revision().clone(), region) else {
            return;
        };

        let handlers = self.handlers.lock().clone();
        for handler in handlers {
            handler(&span);
        }
    }
}

/// True when every previous marker reappears, in order, on the same range
fn unchanged(previous: &IssuesSnapshot, current: &IssuesSnapshot) -> bool {
    previous.count() == current.count()
        && previous
            .markers()
            .iter()
            .zip(current.markers())
            .all(|(before, after)| {
                before.span().range() == after.span().range() && before.issue() == after.issue()
            })
}

/// Smallest range covering the previous markers (grown over edits at their edges)
/// and the current markers
fn changed_region(previous: &IssuesSnapshot, current: &IssuesSnapshot) -> Option<Range<usize>> {
    let carried = previous.markers().iter().filter_map(|marker| {
        marker
            .span()
            .translate_to(current.revision(), SpanTrackingMode::EdgeInclusive)
            .map(|translation| translation.span.range())
    });
    let fresh = current.markers().iter().map(|marker| marker.span().range());

    let region = carried.chain(fresh).reduce(|region, range| {
        region.start.min(range.start)..region.end.max(range.end)
    })?;
    (region.start < region.end).then_some(region)
}

/// A view's binding to the issues of one document.
///
/// Created by [`IssueRegistry::attach_observer`]; all taggers of a document share one
/// tracker. Dropping the tagger detaches it, and the tracker stops when its last
/// tagger goes away.
pub struct IssueTagger {
    core: Arc<TaggerCore>,
    tracker: Arc<IssueTracker>,
    registry: IssueRegistry,
}

impl IssueTagger {
    pub(crate) fn new(
        core: Arc<TaggerCore>,
        tracker: Arc<IssueTracker>,
        registry: IssueRegistry,
    ) -> Self {
        Self {
            core,
            tracker,
            registry,
        }
    }

    pub fn id(&self) -> TaggerId {
        self.core.id()
    }

    pub fn document(&self) -> &DocumentId {
        self.tracker.document()
    }

    pub fn tracker(&self) -> &Arc<IssueTracker> {
        &self.tracker
    }

    /// The last snapshot announced to this tagger
    pub fn snapshot(&self) -> Arc<IssuesSnapshot> {
        self.core.snapshot()
    }

    /// Register a handler for region-changed signals
    pub fn on_tags_changed(&self, handler: impl Fn(&SnapshotSpan) + Send + Sync + 'static) {
        self.core.subscribe(Arc::new(handler));
    }

    /// Markers of the last announced snapshot touching any of `spans`.
    ///
    /// `spans` may be on an older revision than the snapshot; they are carried forward
    /// first. Spans from a newer revision yield nothing until that revision is announced.
    pub fn tags(&self, spans: &NormalizedSpans) -> Vec<IssueTag> {
        let snapshot = self.core.snapshot();
        let Some(spans) = spans.translate_to(snapshot.revision(), SpanTrackingMode::EdgeInclusive)
        else {
            return Vec::new();
        };

        snapshot
            .markers()
            .iter()
            .filter(|marker| spans.intersects_with(&marker.span().range()))
            .map(|marker| IssueTag {
                span: marker.span().clone(),
                severity: marker.issue().severity,
                issue: marker.shared_issue(),
            })
            .collect()
    }
}

impl Drop for IssueTagger {
    fn drop(&mut self) {
        self.registry.detach(&self.tracker, self.core.id());
    }
}

impl fmt::Debug for IssueTagger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IssueTagger")
            .field("id", &self.core.id())
            .field("document", self.tracker.document())
            .field("version", &self.core.snapshot().version())
            .finish()
    }
}

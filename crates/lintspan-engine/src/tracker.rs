use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::document::DocumentId;
use crate::issues::{Issue, IssueMarker, IssuesSnapshot, Published, SnapshotFactory};
use crate::registry::RegistryShared;
use crate::settings::ProviderSettings;
use crate::tagger::{TaggerCore, TaggerId};
use crate::text::{ListenerId, NormalizedSpans, Revision, SpanTrackingMode, TextChange, TextSource};

/// Live per-document state that turns text mutations into issue snapshots.
///
/// A tracker is active while at least one tagger is attached: it is then subscribed
/// to its text source and registered with the registry. Every mutation carries the
/// current markers onto the new revision (markers an edit landed inside are dropped),
/// publishes the next snapshot, and grows the dirty region the analyzer re-scans.
pub struct IssueTracker {
    document: DocumentId,
    source: Arc<dyn TextSource>,
    factory: Arc<SnapshotFactory>,
    registry: Weak<RegistryShared>,
    state: Mutex<TrackerState>,
}

struct TrackerState {
    revision: Revision,
    dirty: NormalizedSpans,
    taggers: Vec<Arc<TaggerCore>>,
    subscription: Option<ListenerId>,
}

impl IssueTracker {
    pub(crate) fn new(
        document: DocumentId,
        source: Arc<dyn TextSource>,
        settings: Arc<ProviderSettings>,
        registry: Weak<RegistryShared>,
    ) -> Self {
        let revision = source.current_revision();
        let factory = SnapshotFactory::new(document.clone(), settings, revision.clone());
        Self {
            document,
            source,
            factory,
            registry,
            state: Mutex::new(TrackerState {
                dirty: NormalizedSpans::full(revision.clone()),
                revision,
                taggers: Vec::new(),
                subscription: None,
            }),
        }
    }

    pub fn document(&self) -> &DocumentId {
        &self.document
    }

    pub fn factory(&self) -> &Arc<SnapshotFactory> {
        &self.factory
    }

    pub fn latest_snapshot(&self) -> Arc<IssuesSnapshot> {
        self.factory.current_snapshot()
    }

    /// Revision the latest snapshot's markers are expressed against
    pub fn current_revision(&self) -> Revision {
        self.state.lock().revision.clone()
    }

    pub fn is_active(&self) -> bool {
        self.state.lock().subscription.is_some()
    }

    pub fn tagger_count(&self) -> usize {
        self.state.lock().taggers.len()
    }

    /// Accumulated regions that may need re-analysis
    pub fn dirty_region(&self) -> NormalizedSpans {
        self.state.lock().dirty.clone()
    }

    /// Read and clear the dirty region
    pub fn take_dirty_region(&self) -> NormalizedSpans {
        let mut state = self.state.lock();
        let empty = NormalizedSpans::empty(state.revision.clone());
        std::mem::replace(&mut state.dirty, empty)
    }

    /// Attach a tagger, activating the tracker if it is the first.
    ///
    /// Returns true when this call activated the tracker. The tagger's baseline is the
    /// latest snapshot. Called with the registry lock held.
    pub(crate) fn add_tagger(self: &Arc<Self>, tagger: Arc<TaggerCore>) -> bool {
        let mut state = self.state.lock();
        let activated = state.taggers.is_empty();
        if activated {
            debug_assert!(state.subscription.is_none(), "tracker activated twice");
            let tracker = Arc::downgrade(self);
            let id = self.source.subscribe(Arc::new(move |change: &TextChange| {
                if let Some(tracker) = tracker.upgrade() {
                    tracker.on_text_change(change);
                }
            }));
            state.subscription = Some(id);
            state.dirty = NormalizedSpans::full(state.revision.clone());
            log::debug!("{}: tracker activated", self.document);
        }

        tagger.reset(self.factory.current_snapshot());
        state.taggers.push(tagger);
        activated
    }

    /// Detach a tagger, deactivating the tracker if it was the last.
    ///
    /// Returns `None` if the tagger was not attached, otherwise whether this call
    /// deactivated the tracker. Called with the registry lock held.
    pub(crate) fn remove_tagger(&self, id: TaggerId) -> Option<bool> {
        let mut state = self.state.lock();
        let position = state.taggers.iter().position(|tagger| tagger.id() == id)?;
        state.taggers.remove(position);
        if !state.taggers.is_empty() {
            return Some(false);
        }

        if let Some(subscription) = state.subscription.take() {
            self.source.unsubscribe(subscription);
        }
        log::debug!("{}: tracker deactivated", self.document);
        Some(true)
    }

    /// Process edits that happened between reading the source and subscribing to it
    pub(crate) fn catch_up(&self) {
        let current = self.source.current_revision();
        self.advance_to(&current);
    }

    fn on_text_change(&self, change: &TextChange) {
        self.advance_to(&change.after);
    }

    fn advance_to(&self, target: &Revision) {
        let (published, taggers) = {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            if state.subscription.is_none() || target.number() <= state.revision.number() {
                return;
            }
            let Some(changes) = state.revision.changes_to(target) else {
                log::warn!(
                    "{}: cannot reach revision {} from {}",
                    self.document,
                    target.number(),
                    state.revision.number()
                );
                return;
            };

            for change in changes {
                if let Some(mut dirty) = state
                    .dirty
                    .translate_to(change.revision(), SpanTrackingMode::EdgeInclusive)
                {
                    for edit in change.edits() {
                        dirty.union(edit.new.clone());
                    }
                    state.dirty = dirty;
                }
            }

            let previous = self.factory.current_snapshot();
            let mut markers = Vec::with_capacity(previous.count());
            let mut forward = Vec::with_capacity(previous.count());
            for marker in previous.markers() {
                match marker.translate_to(target) {
                    Some(carried) => {
                        forward.push(Some(markers.len()));
                        markers.push(carried);
                    }
                    None => {
                        log::trace!(
                            "{}: dropped {} at {:?}",
                            self.document,
                            marker.issue().rule_id,
                            marker.span().range()
                        );
                        forward.push(None);
                    }
                }
            }

            state.revision = target.clone();
            let published = self.factory.publish(target.clone(), markers, Some(forward));
            (published, state.taggers.clone())
        };

        self.announce(published, taggers);
    }

    /// Replace every marker with `issues`, expressed against the current revision.
    ///
    /// Issues whose range is empty or out of bounds are skipped. Marker identity is not
    /// carried over: no index of the previous snapshot translates into the new one.
    pub fn update_issues(&self, issues: Vec<Issue>) -> Arc<IssuesSnapshot> {
        let (published, taggers) = {
            let state = self.state.lock();
            let markers = issues
                .into_iter()
                .filter_map(|issue| {
                    let range = issue.range.clone();
                    let marker = IssueMarker::new(&state.revision, issue);
                    if marker.is_none() {
                        log::warn!(
                            "{}: ignoring issue at {:?}, document length is {}",
                            self.document,
                            range,
                            state.revision.len()
                        );
                    }
                    marker
                })
                .collect();
            let published = self.factory.publish(state.revision.clone(), markers, None);
            (published, state.taggers.clone())
        };

        let current = published.current.clone();
        self.announce(published, taggers);
        current
    }

    fn announce(&self, published: Published, taggers: Vec<Arc<TaggerCore>>) {
        for tagger in &taggers {
            tagger.update(&published.current);
        }
        if let Some(registry) = self.registry.upgrade() {
            registry.document_changed(self);
        }
    }
}

impl Drop for IssueTracker {
    fn drop(&mut self) {
        if let Some(subscription) = self.state.get_mut().subscription.take() {
            self.source.unsubscribe(subscription);
        }
    }
}

impl fmt::Debug for IssueTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("IssueTracker")
            .field("document", &self.document)
            .field("revision", &state.revision.number())
            .field("version", &self.factory.current_version())
            .field("taggers", &state.taggers.len())
            .field("active", &state.subscription.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::text::TextBuffer;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn tracker(buffer: &TextBuffer) -> Arc<IssueTracker> {
        Arc::new(IssueTracker::new(
            DocumentId::from("main.rs"),
            Arc::new(buffer.clone()),
            Arc::new(ProviderSettings::default()),
            Weak::new(),
        ))
    }

    fn active(buffer: &TextBuffer) -> (Arc<IssueTracker>, Arc<TaggerCore>) {
        let tracker = tracker(buffer);
        let tagger = Arc::new(TaggerCore::new(tracker.latest_snapshot()));
        assert!(tracker.add_tagger(tagger.clone()));
        (tracker, tagger)
    }

    fn ranges(snapshot: &IssuesSnapshot) -> Vec<std::ops::Range<usize>> {
        snapshot.markers().iter().map(|m| m.span().range()).collect()
    }

    #[test]
    fn test_activation_subscribes_once() {
        let buffer = TextBuffer::new("abc");
        let (tracker, _first) = active(&buffer);
        let second = Arc::new(TaggerCore::new(tracker.latest_snapshot()));

        assert!(!tracker.add_tagger(second.clone()));
        assert!(tracker.is_active());
        assert_eq!(buffer.listener_count(), 1);
        assert_eq!(tracker.dirty_region().ranges(), &[0..3]);

        assert_eq!(tracker.remove_tagger(second.id()), Some(false));
        assert_eq!(buffer.listener_count(), 1);
    }

    #[test]
    fn test_last_tagger_unsubscribes() {
        let buffer = TextBuffer::new("abc");
        let (tracker, tagger) = active(&buffer);

        assert_eq!(tracker.remove_tagger(tagger.id()), Some(true));
        assert!(!tracker.is_active());
        assert_eq!(buffer.listener_count(), 0);
        assert_eq!(tracker.remove_tagger(tagger.id()), None);

        buffer.insert(0, "z").unwrap();
        assert_eq!(tracker.latest_snapshot().version(), 0);
    }

    #[test]
    fn test_inactive_tracker_ignores_edits() {
        let buffer = TextBuffer::new("abc");
        let tracker = tracker(&buffer);

        tracker.advance_to(&buffer.insert(0, "z").unwrap());

        assert_eq!(tracker.latest_snapshot().version(), 0);
    }

    #[rstest]
    #[case::inside(12, None)]
    #[case::after(30, Some(10..15))]
    #[case::before(2, Some(13..18))]
    #[case::at_start(10, Some(13..18))]
    #[case::at_end(15, Some(10..15))]
    fn test_markers_follow_insertions(
        #[case] at: usize,
        #[case] expected: Option<std::ops::Range<usize>>,
    ) {
        let buffer = TextBuffer::new(&"x".repeat(40));
        let (tracker, _tagger) = active(&buffer);
        tracker.update_issues(vec![Issue::new(10..15, "R1", "marker")]);

        buffer.insert(at, "abc").unwrap();

        let latest = tracker.latest_snapshot();
        assert_eq!(latest.version(), 2);
        assert_eq!(ranges(&latest), expected.into_iter().collect::<Vec<_>>());
    }

    #[test]
    fn test_deleting_marker_text_drops_it() {
        let buffer = TextBuffer::new("let unused = 1;\nlet kept = 2;\n");
        let (tracker, _tagger) = active(&buffer);
        let before = tracker.update_issues(vec![
            Issue::new(4..10, "S1481", "unused"),
            Issue::new(20..24, "S1481", "kept"),
        ]);

        buffer.delete(0..16).unwrap();

        let after = tracker.latest_snapshot();
        assert_eq!(ranges(&after), vec![4..8]);
        assert_eq!(after.marker(0).unwrap().span().text(), "kept");
        assert_eq!(before.next_index(0), None);
        assert_eq!(before.next_index(1), Some(0));
    }

    #[test]
    fn test_dirty_region_accumulates_edits() {
        let buffer = TextBuffer::new(&"x".repeat(40));
        let (tracker, _tagger) = active(&buffer);
        assert_eq!(tracker.take_dirty_region().ranges(), &[0..40]);

        buffer.insert(5, "ab").unwrap();
        buffer.replace(20..22, "cdef").unwrap();
        buffer.insert(7, "g").unwrap();

        let dirty = tracker.take_dirty_region();
        assert_eq!(dirty.revision(), &buffer.current_revision());
        assert_eq!(dirty.ranges(), &[5..8, 21..25]);
        assert!(tracker.dirty_region().is_empty());
    }

    #[test]
    fn test_deletion_leaves_empty_dirty_range() {
        let buffer = TextBuffer::new(&"x".repeat(20));
        let (tracker, _tagger) = active(&buffer);
        tracker.take_dirty_region();

        buffer.delete(5..10).unwrap();

        assert_eq!(tracker.dirty_region().ranges(), &[5..5]);
    }

    #[test]
    fn test_update_issues_skips_invalid_ranges() {
        let buffer = TextBuffer::new("abcdef");
        let (tracker, _tagger) = active(&buffer);

        let snapshot = tracker.update_issues(vec![
            Issue::new(0..2, "R1", "ok"),
            Issue::new(3..3, "R2", "empty"),
            Issue::new(4..20, "R3", "past the end"),
        ]);

        assert_eq!(snapshot.count(), 1);
        assert_eq!(snapshot.marker(0).unwrap().issue().rule_id, "R1");
    }

    #[test]
    fn test_catch_up_processes_missed_edits() {
        let buffer = TextBuffer::new(&"x".repeat(20));
        let tracker = tracker(&buffer);
        let tagger = Arc::new(TaggerCore::new(tracker.latest_snapshot()));
        tracker.update_issues(vec![Issue::new(10..12, "R1", "m")]);

        // Edit lands before the tracker subscribes
        buffer.insert(0, "ab").unwrap();
        tracker.add_tagger(tagger);
        tracker.catch_up();

        assert_eq!(tracker.current_revision(), buffer.current_revision());
        assert_eq!(ranges(&tracker.latest_snapshot()), vec![12..14]);
    }

    #[test]
    fn test_drop_unsubscribes() {
        let buffer = TextBuffer::new("abc");
        let (tracker, _tagger) = active(&buffer);

        drop(tracker);

        assert_eq!(buffer.listener_count(), 0);
    }
}

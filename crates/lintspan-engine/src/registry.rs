use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use uuid::Uuid;

use crate::document::DocumentId;
use crate::issues::{Issue, SnapshotFactory};
use crate::settings::ProviderSettings;
use crate::tagger::{IssueTagger, TaggerCore, TaggerId};
use crate::text::{NormalizedSpans, TextSource};
use crate::tracker::IssueTracker;

/// Consumer of the issue tables of every tracked document.
///
/// Callbacks run with the registry lock held: they must return quickly and must not
/// call back into the registry. Snapshots are pulled from the factory.
pub trait TableDataSink: Send + Sync {
    /// A document became tracked, or the sink was just added and the document already was
    fn add_factory(&self, factory: &Arc<SnapshotFactory>);

    /// A document stopped being tracked
    fn remove_factory(&self, factory: &Arc<SnapshotFactory>);

    /// The document published a new snapshot
    fn snapshots_changed(&self, factory: &Arc<SnapshotFactory>);
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct SinkId(Uuid);

/// Keeps a sink registered until dropped
#[must_use = "the sink is removed when the subscription is dropped"]
pub struct SinkSubscription {
    id: SinkId,
    registry: Weak<RegistryShared>,
}

impl SinkSubscription {
    pub fn id(&self) -> SinkId {
        self.id
    }
}

impl Drop for SinkSubscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.remove_sink(self.id);
        }
    }
}

impl fmt::Debug for SinkSubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SinkSubscription").field(&self.id).finish()
    }
}

/// Hub connecting document trackers with table sinks.
///
/// One lock guards both the document map and the sink list, so tracker activation,
/// deactivation and every sink callback are serialized. Clones share the same state.
#[derive(Clone)]
pub struct IssueRegistry {
    shared: Arc<RegistryShared>,
}

pub(crate) struct RegistryShared {
    settings: Arc<ProviderSettings>,
    state: Mutex<RegistryState>,
}

#[derive(Default)]
struct RegistryState {
    trackers: HashMap<DocumentId, Arc<IssueTracker>>,
    sinks: Vec<(SinkId, Arc<dyn TableDataSink>)>,
}

impl RegistryState {
    fn is_registered(&self, tracker: &IssueTracker) -> bool {
        self.trackers
            .get(tracker.document())
            .is_some_and(|registered| std::ptr::eq(registered.as_ref(), tracker))
    }
}

impl IssueRegistry {
    pub fn new(settings: ProviderSettings) -> Self {
        Self {
            shared: Arc::new(RegistryShared {
                settings: Arc::new(settings),
                state: Mutex::new(RegistryState::default()),
            }),
        }
    }

    pub fn settings(&self) -> &ProviderSettings {
        &self.shared.settings
    }

    /// Bind a view to `document`, starting its tracker if no other view has.
    ///
    /// Views of the same document share one tracker; `source` is only used when the
    /// tracker is created.
    pub fn attach_observer(&self, document: DocumentId, source: Arc<dyn TextSource>) -> IssueTagger {
        let (tracker, core, activated) = {
            let mut state = self.shared.state.lock();
            let tracker = match state.trackers.get(&document) {
                Some(tracker) => tracker.clone(),
                None => Arc::new(IssueTracker::new(
                    document.clone(),
                    source,
                    self.shared.settings.clone(),
                    Arc::downgrade(&self.shared),
                )),
            };

            let core = Arc::new(TaggerCore::new(tracker.latest_snapshot()));
            let activated = tracker.add_tagger(core.clone());
            if activated {
                state.trackers.insert(document, tracker.clone());
                for (_, sink) in &state.sinks {
                    sink.add_factory(tracker.factory());
                }
            }
            (tracker, core, activated)
        };

        if activated {
            tracker.catch_up();
        }
        IssueTagger::new(core, tracker, self.clone())
    }

    /// Detach a view. Same as dropping the tagger.
    pub fn detach_observer(&self, tagger: IssueTagger) {
        drop(tagger);
    }

    pub(crate) fn detach(&self, tracker: &Arc<IssueTracker>, tagger: TaggerId) {
        let mut state = self.shared.state.lock();
        match tracker.remove_tagger(tagger) {
            None => {
                log::error!(
                    "{}: detaching tagger {:?} that is not attached",
                    tracker.document(),
                    tagger
                );
                debug_assert!(false, "tagger detached twice");
            }
            Some(false) => {}
            Some(true) => {
                if state.is_registered(tracker) {
                    state.trackers.remove(tracker.document());
                    for (_, sink) in &state.sinks {
                        sink.remove_factory(tracker.factory());
                    }
                } else {
                    log::error!("{}: deactivated tracker was not registered", tracker.document());
                    debug_assert!(false, "deactivated tracker was not registered");
                }
            }
        }
    }

    /// Register `sink` and replay every tracked document to it
    pub fn add_sink(&self, sink: Arc<dyn TableDataSink>) -> SinkSubscription {
        let id = SinkId(Uuid::new_v4());
        let mut state = self.shared.state.lock();
        for tracker in state.trackers.values() {
            sink.add_factory(tracker.factory());
        }
        state.sinks.push((id, sink));
        log::debug!(
            "sink {:?} added, replayed {} documents",
            id,
            state.trackers.len()
        );

        SinkSubscription {
            id,
            registry: Arc::downgrade(&self.shared),
        }
    }

    /// Unregister a sink. Same as dropping the subscription.
    pub fn remove_sink(&self, subscription: SinkSubscription) {
        drop(subscription);
    }

    pub fn sink_count(&self) -> usize {
        self.shared.state.lock().sinks.len()
    }

    /// Replace the issues of `document`. Returns false if the document is not tracked.
    pub fn update_external_markers(&self, document: &DocumentId, issues: Vec<Issue>) -> bool {
        let Some(tracker) = self.tracker(document) else {
            log::debug!("{document}: not tracked, ignoring {} issues", issues.len());
            return false;
        };
        tracker.update_issues(issues);
        true
    }

    pub fn dirty_region(&self, document: &DocumentId) -> Option<NormalizedSpans> {
        Some(self.tracker(document)?.dirty_region())
    }

    /// Read and clear the region of `document` that needs re-analysis
    pub fn take_dirty_region(&self, document: &DocumentId) -> Option<NormalizedSpans> {
        Some(self.tracker(document)?.take_dirty_region())
    }

    pub fn tracker(&self, document: &DocumentId) -> Option<Arc<IssueTracker>> {
        self.shared.state.lock().trackers.get(document).cloned()
    }

    /// Documents with at least one attached view, sorted
    pub fn tracked_documents(&self) -> Vec<DocumentId> {
        let mut documents: Vec<DocumentId> =
            self.shared.state.lock().trackers.keys().cloned().collect();
        documents.sort();
        documents
    }
}

impl Default for IssueRegistry {
    fn default() -> Self {
        Self::new(ProviderSettings::default())
    }
}

impl fmt::Debug for IssueRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("IssueRegistry")
            .field("trackers", &state.trackers.len())
            .field("sinks", &state.sinks.len())
            .finish()
    }
}

impl RegistryShared {
    /// Forward a published snapshot to every sink, if `tracker` is still registered
    pub(crate) fn document_changed(&self, tracker: &IssueTracker) {
        let state = self.state.lock();
        if !state.is_registered(tracker) {
            return;
        }
        for (_, sink) in &state.sinks {
            sink.snapshots_changed(tracker.factory());
        }
    }

    fn remove_sink(&self, id: SinkId) {
        let mut state = self.state.lock();
        state.sinks.retain(|(sink, _)| *sink != id);
        log::debug!("sink {:?} removed", id);
    }
}

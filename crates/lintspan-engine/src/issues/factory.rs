use std::collections::VecDeque;
use std::sync::{Arc, Weak};

use parking_lot::RwLock;

use crate::document::DocumentId;
use crate::issues::{IssueMarker, IssuesSnapshot};
use crate::settings::ProviderSettings;
use crate::text::Revision;

/// Result of publishing a new snapshot
#[derive(Debug, Clone)]
pub struct Published {
    pub previous: Arc<IssuesSnapshot>,
    pub current: Arc<IssuesSnapshot>,
}

/// Owner of a document's snapshot history.
///
/// The history is an arena indexed by version holding each version's forward index
/// map and a weak handle to its snapshot. Only the current snapshot is kept alive
/// here; older ones are freed once no tracker, tagger or sink holds them, while index
/// translation keeps working through the retained maps. The settings' `history_limit`
/// bounds how many versions are retained; index translation across evicted versions
/// fails.
pub struct SnapshotFactory {
    document: DocumentId,
    settings: Arc<ProviderSettings>,
    this: Weak<SnapshotFactory>,
    history: RwLock<History>,
}

struct Entry {
    snapshot: Weak<IssuesSnapshot>,
    /// Set when the version is superseded
    forward: Option<Arc<[Option<usize>]>>,
}

struct History {
    current: Arc<IssuesSnapshot>,
    /// Oldest first, always ends with the entry of `current`
    retained: VecDeque<Entry>,
    first_version: u64,
}

impl History {
    fn get(&self, version: u64) -> Option<&Entry> {
        let offset = usize::try_from(version.checked_sub(self.first_version)?).ok()?;
        self.retained.get(offset)
    }

    fn next_index(&self, version: u64, index: usize) -> Option<usize> {
        self.get(version)?.forward.as_ref()?.get(index).copied().flatten()
    }
}

impl SnapshotFactory {
    /// Start a history with the empty snapshot (version 0) on `revision`
    pub(crate) fn new(
        document: DocumentId,
        settings: Arc<ProviderSettings>,
        revision: Revision,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| {
            let initial = Arc::new(IssuesSnapshot::new(
                document.clone(),
                0,
                revision,
                Vec::new(),
                settings.clone(),
                this.clone(),
            ));
            SnapshotFactory {
                document,
                settings,
                this: this.clone(),
                history: RwLock::new(History {
                    retained: VecDeque::from([Entry {
                        snapshot: Arc::downgrade(&initial),
                        forward: None,
                    }]),
                    current: initial,
                    first_version: 0,
                }),
            }
        })
    }

    pub fn document(&self) -> &DocumentId {
        &self.document
    }

    pub fn current_version(&self) -> u64 {
        self.history.read().current.version()
    }

    pub fn current_snapshot(&self) -> Arc<IssuesSnapshot> {
        self.history.read().current.clone()
    }

    /// A snapshot by version, while retained and still held somewhere
    pub fn snapshot(&self, version: u64) -> Option<Arc<IssuesSnapshot>> {
        self.history.read().get(version)?.snapshot.upgrade()
    }

    pub fn retained_versions(&self) -> usize {
        self.history.read().retained.len()
    }

    /// Publish `markers` on `revision` as the next version.
    ///
    /// `forward` maps each marker of the current snapshot to its index in the new one;
    /// `None` means no marker identity carries over.
    pub(crate) fn publish(
        &self,
        revision: Revision,
        markers: Vec<IssueMarker>,
        forward: Option<Vec<Option<usize>>>,
    ) -> Published {
        let mut history = self.history.write();
        let previous = history.current.clone();

        let current = Arc::new(IssuesSnapshot::new(
            self.document.clone(),
            previous.version() + 1,
            revision,
            markers,
            self.settings.clone(),
            self.this.clone(),
        ));
        let forward: Arc<[Option<usize>]> = forward
            .unwrap_or_else(|| vec![None; previous.count()])
            .into();
        previous.link_forward(forward.clone());
        if let Some(entry) = history.retained.back_mut() {
            entry.forward = Some(forward);
        }

        history.retained.push_back(Entry {
            snapshot: Arc::downgrade(&current),
            forward: None,
        });
        history.current = current.clone();
        if let Some(limit) = self.settings.history_limit {
            while history.retained.len() > limit.max(1) {
                history.retained.pop_front();
                history.first_version += 1;
            }
        }

        log::debug!(
            "{}: published snapshot {} with {} issues",
            self.document,
            current.version(),
            current.count()
        );

        Published { previous, current }
    }

    /// Follow forward maps from `index` at `from` up to version `to`
    pub(crate) fn translate_index(&self, from: u64, index: usize, to: u64) -> Option<usize> {
        let history = self.history.read();
        (from..to).try_fold(index, |index, version| history.next_index(version, index))
    }
}

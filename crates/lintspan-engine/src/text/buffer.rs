use std::ops::Range;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use xi_rope::delta::Builder;
use xi_rope::{Delta, Rope, RopeInfo};

use crate::text::{BufferId, Edit, Revision};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TextError {
    #[error("Edit range {start}..{end} is outside the document (length {len})")]
    OutOfBounds { start: usize, end: usize, len: usize },
    #[error("Edit at {start}..{end} overlaps or precedes the previous edit")]
    Unordered { start: usize, end: usize },
    #[error("Delta expects a base of {expected} bytes but the document has {actual}")]
    StaleDelta { expected: usize, actual: usize },
}

/// A requested replacement, expressed against the current revision
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextEdit {
    pub range: Range<usize>,
    pub text: String,
}

impl TextEdit {
    pub fn insert(at: usize, text: impl Into<String>) -> Self {
        Self {
            range: at..at,
            text: text.into(),
        }
    }

    pub fn delete(range: Range<usize>) -> Self {
        Self {
            range,
            text: String::new(),
        }
    }
}

/// Mutation event delivered to subscribers: `before` became `after` through `edits`
#[derive(Debug, Clone)]
pub struct TextChange {
    pub before: Revision,
    pub after: Revision,
    pub edits: Arc<[Edit]>,
}

pub type ChangeListener = Arc<dyn Fn(&TextChange) + Send + Sync>;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(Uuid);

/// A stream of document mutations that trackers subscribe to
pub trait TextSource: Send + Sync {
    fn current_revision(&self) -> Revision;

    fn subscribe(&self, listener: ChangeListener) -> ListenerId;

    /// Returns false if `id` was not subscribed
    fn unsubscribe(&self, id: ListenerId) -> bool;
}

/// In-memory mutable text document.
///
/// Every edit produces a new [`Revision`] and is delivered synchronously, on the
/// editing thread, to all subscribed listeners. Listeners run without any buffer
/// lock held, so they may read the buffer (or subscribe/unsubscribe) freely.
#[derive(Clone)]
pub struct TextBuffer {
    inner: Arc<BufferInner>,
}

struct BufferInner {
    id: BufferId,
    current: Mutex<Revision>,
    listeners: Mutex<Vec<(ListenerId, ChangeListener)>>,
}

impl TextBuffer {
    pub fn new(text: &str) -> Self {
        let id = BufferId::new();
        Self {
            inner: Arc::new(BufferInner {
                id,
                current: Mutex::new(Revision::initial(id, Rope::from(text))),
                listeners: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn id(&self) -> BufferId {
        self.inner.id
    }

    pub fn text(&self) -> String {
        self.inner.current.lock().text().to_string()
    }

    pub fn len(&self) -> usize {
        self.inner.current.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn insert(&self, at: usize, text: &str) -> Result<Revision, TextError> {
        self.apply_edits(&[TextEdit::insert(at, text)])
    }

    pub fn delete(&self, range: Range<usize>) -> Result<Revision, TextError> {
        self.apply_edits(&[TextEdit::delete(range)])
    }

    pub fn replace(&self, range: Range<usize>, text: &str) -> Result<Revision, TextError> {
        self.apply_edits(&[TextEdit {
            range,
            text: text.to_string(),
        }])
    }

    /// Apply several non-overlapping edits, in document order, as one change
    pub fn apply_edits(&self, edits: &[TextEdit]) -> Result<Revision, TextError> {
        let change = {
            let mut current = self.inner.current.lock();
            let len = current.len();

            let mut builder = Builder::new(len);
            let mut last_end = 0;
            for edit in edits {
                let Range { start, end } = edit.range;
                if start > end || end > len {
                    return Err(TextError::OutOfBounds { start, end, len });
                }
                if start < last_end {
                    return Err(TextError::Unordered { start, end });
                }
                builder.replace(start..end, Rope::from(edit.text.as_str()));
                last_end = end;
            }

            self.advance(&mut current, builder.build())
        };

        self.deliver(&change);
        Ok(change.after)
    }

    /// Apply a prebuilt delta against the current revision
    pub fn apply(&self, delta: Delta<RopeInfo>) -> Result<Revision, TextError> {
        let change = {
            let mut current = self.inner.current.lock();
            if delta.base_len != current.len() {
                return Err(TextError::StaleDelta {
                    expected: delta.base_len,
                    actual: current.len(),
                });
            }
            self.advance(&mut current, delta)
        };

        self.deliver(&change);
        Ok(change.after)
    }

    fn advance(&self, current: &mut Revision, delta: Delta<RopeInfo>) -> TextChange {
        let before = current.clone();
        let after = before.advance(delta);
        let edits = before
            .next_change()
            .map(|change| Arc::from(change.edits()))
            .unwrap_or_else(|| Arc::from(Vec::new()));
        *current = after.clone();

        TextChange {
            before,
            after,
            edits,
        }
    }

    fn deliver(&self, change: &TextChange) {
        let listeners: Vec<ChangeListener> = self
            .inner
            .listeners
            .lock()
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();

        log::trace!(
            "buffer {:?} revision {} -> {} ({} edits, {} listeners)",
            self.inner.id,
            change.before.number(),
            change.after.number(),
            change.edits.len(),
            listeners.len()
        );

        for listener in listeners {
            listener(change);
        }
    }

    pub fn listener_count(&self) -> usize {
        self.inner.listeners.lock().len()
    }
}

impl TextSource for TextBuffer {
    fn current_revision(&self) -> Revision {
        self.inner.current.lock().clone()
    }

    fn subscribe(&self, listener: ChangeListener) -> ListenerId {
        let id = ListenerId(Uuid::new_v4());
        self.inner.listeners.lock().push((id, listener));
        id
    }

    fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut listeners = self.inner.listeners.lock();
        let before = listeners.len();
        listeners.retain(|(listener_id, _)| *listener_id != id);
        listeners.len() != before
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_edits_produce_new_revisions() {
        let buffer = TextBuffer::new("Hello World");
        let r0 = buffer.current_revision();

        let r1 = buffer.insert(5, ",").unwrap();
        let r2 = buffer.replace(7..12, "there").unwrap();

        assert_eq!(buffer.text(), "Hello, there");
        assert_eq!(r0.number(), 0);
        assert_eq!(r1.number(), 1);
        assert_eq!(r2.number(), 2);
        assert_eq!(r0.text().to_string(), "Hello World");
        assert_eq!(buffer.current_revision(), r2);
    }

    #[test]
    fn test_rejects_out_of_bounds_edit() {
        let buffer = TextBuffer::new("abc");

        let result = buffer.delete(2..10);

        assert_eq!(
            result.unwrap_err(),
            TextError::OutOfBounds {
                start: 2,
                end: 10,
                len: 3
            }
        );
        assert_eq!(buffer.current_revision().number(), 0);
    }

    #[test]
    fn test_rejects_unordered_edits() {
        let buffer = TextBuffer::new("abcdefgh");

        let result = buffer.apply_edits(&[TextEdit::delete(4..6), TextEdit::insert(1, "z")]);

        assert_eq!(result.unwrap_err(), TextError::Unordered { start: 1, end: 1 });
        assert_eq!(buffer.text(), "abcdefgh");
    }

    #[test]
    fn test_rejects_stale_delta() {
        let buffer = TextBuffer::new("abc");
        let delta = Builder::<RopeInfo>::new(10).build();

        assert_eq!(
            buffer.apply(delta).unwrap_err(),
            TextError::StaleDelta {
                expected: 10,
                actual: 3
            }
        );
    }

    #[test]
    fn test_listeners_receive_changes_until_unsubscribed() {
        let buffer = TextBuffer::new("abc");
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        let id = buffer.subscribe(Arc::new(move |change: &TextChange| {
            assert_eq!(change.after.number(), change.before.number() + 1);
            seen.fetch_add(1, Ordering::SeqCst);
        }));

        buffer.insert(0, "x").unwrap();
        buffer.insert(0, "y").unwrap();
        assert!(buffer.unsubscribe(id));
        buffer.insert(0, "z").unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(!buffer.unsubscribe(id));
        assert_eq!(buffer.listener_count(), 0);
    }

    #[test]
    fn test_change_carries_edit_list() {
        let buffer = TextBuffer::new("aaaa bbbb");
        let captured = Arc::new(Mutex::new(Vec::new()));
        let sink = captured.clone();
        buffer.subscribe(Arc::new(move |change: &TextChange| {
            sink.lock().extend(change.edits.iter().cloned());
        }));

        buffer
            .apply_edits(&[TextEdit::delete(0..2), TextEdit::insert(5, "cc")])
            .unwrap();

        assert_eq!(
            captured.lock().clone(),
            vec![
                Edit {
                    old: 0..2,
                    new: 0..0
                },
                Edit {
                    old: 5..5,
                    new: 3..5
                },
            ]
        );
    }

    #[test]
    fn test_listener_may_read_buffer() {
        let buffer = TextBuffer::new("abc");
        let reader = buffer.clone();
        let observed = Arc::new(Mutex::new(String::new()));
        let out = observed.clone();
        buffer.subscribe(Arc::new(move |_: &TextChange| {
            *out.lock() = reader.text();
        }));

        buffer.insert(3, "d").unwrap();

        assert_eq!(observed.lock().as_str(), "abcd");
    }
}

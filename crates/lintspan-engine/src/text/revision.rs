use std::fmt;
use std::ops::Range;
use std::sync::{Arc, OnceLock};

use uuid::Uuid;
use xi_rope::delta::{DeltaElement, Transformer};
use xi_rope::{Delta, Rope, RopeInfo};

/// Identity of one text buffer. Revisions of different buffers never translate into each other.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct BufferId(pub Uuid);

impl BufferId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for BufferId {
    fn default() -> Self {
        Self::new()
    }
}

/// How a single offset moves when text is inserted exactly at it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointTrackingMode {
    /// Stay before the inserted text
    Negative,
    /// Move after the inserted text
    Positive,
}

impl PointTrackingMode {
    fn after(self) -> bool {
        matches!(self, PointTrackingMode::Positive)
    }
}

/// One replaced region of a change.
///
/// `old` is expressed against the revision before the change, `new` against the
/// revision after it. Pure insertions have an empty `old`, pure deletions an empty `new`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edit {
    pub old: Range<usize>,
    pub new: Range<usize>,
}

impl Edit {
    /// Signed length difference introduced by this edit
    pub fn len_delta(&self) -> isize {
        self.new.len() as isize - self.old.len() as isize
    }
}

/// The step from one revision to its successor
pub struct Change {
    delta: Delta<RopeInfo>,
    edits: Arc<[Edit]>,
    revision: Revision,
}

impl Change {
    pub fn delta(&self) -> &Delta<RopeInfo> {
        &self.delta
    }

    /// Edits in document order
    pub fn edits(&self) -> &[Edit] {
        &self.edits
    }

    /// The revision this change produced
    pub fn revision(&self) -> &Revision {
        &self.revision
    }
}

/// Immutable text content of a buffer at one point in time.
///
/// Every revision knows the change that produced its successor (set once, when the
/// successor is created), so any revision can be translated forward to any later
/// revision of the same buffer by walking that chain.
#[derive(Clone)]
pub struct Revision {
    inner: Arc<RevisionInner>,
}

struct RevisionInner {
    buffer: BufferId,
    number: u64,
    text: Rope,
    next: OnceLock<Change>,
}

impl Revision {
    pub(crate) fn initial(buffer: BufferId, text: Rope) -> Self {
        Self {
            inner: Arc::new(RevisionInner {
                buffer,
                number: 0,
                text,
                next: OnceLock::new(),
            }),
        }
    }

    /// Create the successor of this revision by applying `delta`.
    ///
    /// Only the owning buffer calls this, and only on its current revision.
    pub(crate) fn advance(&self, delta: Delta<RopeInfo>) -> Revision {
        let next = Revision {
            inner: Arc::new(RevisionInner {
                buffer: self.inner.buffer,
                number: self.inner.number + 1,
                text: delta.apply(&self.inner.text),
                next: OnceLock::new(),
            }),
        };
        let edits: Arc<[Edit]> = edits_from_delta(&delta).into();
        let linked = self.inner.next.set(Change {
            delta,
            edits,
            revision: next.clone(),
        });
        debug_assert!(linked.is_ok(), "revision advanced twice");
        next
    }

    pub fn buffer_id(&self) -> BufferId {
        self.inner.buffer
    }

    /// Position of this revision in its buffer's history, starting at 0
    pub fn number(&self) -> u64 {
        self.inner.number
    }

    pub fn text(&self) -> &Rope {
        &self.inner.text
    }

    pub fn len(&self) -> usize {
        self.inner.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The change leading to the next revision, once one exists
    pub fn next_change(&self) -> Option<&Change> {
        self.inner.next.get()
    }

    /// All changes between `self` and `target`, oldest first.
    ///
    /// Returns `None` when `target` belongs to another buffer, is older than `self`,
    /// or has not been reached yet from this revision.
    pub fn changes_to<'a>(&'a self, target: &Revision) -> Option<Vec<&'a Change>> {
        if self.inner.buffer != target.inner.buffer || self.inner.number > target.inner.number {
            return None;
        }

        let mut changes = Vec::new();
        let mut current = self;
        while current.inner.number < target.inner.number {
            let change = current.inner.next.get()?;
            changes.push(change);
            current = &change.revision;
        }
        Some(changes)
    }

    /// Map an offset in this revision onto `target`
    pub fn translate_offset(
        &self,
        offset: usize,
        target: &Revision,
        mode: PointTrackingMode,
    ) -> Option<usize> {
        let mut offset = offset.min(self.len());
        for change in self.changes_to(target)? {
            let mut transformer = Transformer::new(&change.delta);
            offset = transformer.transform(offset, mode.after());
        }
        Some(offset)
    }

    /// Zero-based line containing `offset`
    pub fn line_of_offset(&self, offset: usize) -> usize {
        self.inner.text.line_of_offset(offset.min(self.len()))
    }

    /// Offset of the first character of `line`
    pub fn offset_of_line(&self, line: usize) -> usize {
        self.inner.text.offset_of_line(line)
    }
}

impl PartialEq for Revision {
    fn eq(&self, other: &Self) -> bool {
        self.inner.buffer == other.inner.buffer && self.inner.number == other.inner.number
    }
}

impl Eq for Revision {}

impl fmt::Debug for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Revision")
            .field("buffer", &self.inner.buffer)
            .field("number", &self.inner.number)
            .field("len", &self.len())
            .finish()
    }
}

/// Derive the ordered edit list of a delta.
///
/// A gap between two copies is a deletion, inserted text at the same point turns it into
/// a replacement; consecutive operations at one point collapse into a single edit.
pub(crate) fn edits_from_delta(delta: &Delta<RopeInfo>) -> Vec<Edit> {
    let mut edits = Vec::new();
    let mut old_pos = 0;
    let mut new_pos = 0;
    let mut inserted = 0;

    for element in &delta.els {
        match element {
            DeltaElement::Copy(from, to) => {
                if *from > old_pos || inserted > 0 {
                    edits.push(Edit {
                        old: old_pos..*from,
                        new: new_pos..new_pos + inserted,
                    });
                    new_pos += inserted;
                    inserted = 0;
                }
                new_pos += to - from;
                old_pos = *to;
            }
            DeltaElement::Insert(text) => inserted += text.len(),
        }
    }

    if old_pos < delta.base_len || inserted > 0 {
        edits.push(Edit {
            old: old_pos..delta.base_len,
            new: new_pos..new_pos + inserted,
        });
    }

    edits
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use xi_rope::delta::Builder;

    fn revision(text: &str) -> Revision {
        Revision::initial(BufferId::new(), Rope::from(text))
    }

    fn replace(base: &Revision, range: Range<usize>, text: &str) -> Delta<RopeInfo> {
        let mut builder = Builder::new(base.len());
        builder.replace(range, Rope::from(text));
        builder.build()
    }

    #[test]
    fn test_edits_from_insertion() {
        let base = revision("Hello World");
        let delta = replace(&base, 5..5, " there");

        assert_eq!(
            edits_from_delta(&delta),
            vec![Edit {
                old: 5..5,
                new: 5..11
            }]
        );
    }

    #[test]
    fn test_edits_from_deletion_at_end() {
        let base = revision("Hello World");
        let mut builder = Builder::new(base.len());
        builder.delete(5..11);
        let delta = builder.build();

        assert_eq!(
            edits_from_delta(&delta),
            vec![Edit {
                old: 5..11,
                new: 5..5
            }]
        );
    }

    #[test]
    fn test_edits_from_multiple_replacements() {
        let base = revision("aaaa bbbb cccc");
        let mut builder = Builder::new(base.len());
        builder.replace(0..4, Rope::from("x"));
        builder.replace(10..14, Rope::from("zzzzzz"));
        let delta = builder.build();

        let edits = edits_from_delta(&delta);
        assert_eq!(
            edits,
            vec![
                Edit {
                    old: 0..4,
                    new: 0..1
                },
                Edit {
                    old: 10..14,
                    new: 7..13
                },
            ]
        );
        assert_eq!(edits[0].len_delta(), -3);
        assert_eq!(edits[1].len_delta(), 2);
    }

    #[test]
    fn test_advance_links_successor_once() {
        let base = revision("abc");
        let next = base.advance(replace(&base, 1..1, "XY"));

        assert_eq!(next.number(), 1);
        assert_eq!(next.text().to_string(), "aXYbc");
        let change = base.next_change().expect("successor linked");
        assert_eq!(change.revision(), &next);
        assert_eq!(change.edits().len(), 1);
        assert!(next.next_change().is_none());
    }

    #[test]
    fn test_changes_to_walks_forward_only() {
        let r0 = revision("abc");
        let r1 = r0.advance(replace(&r0, 0..0, "1"));
        let r2 = r1.advance(replace(&r1, 0..0, "2"));

        assert_eq!(r0.changes_to(&r2).map(|c| c.len()), Some(2));
        assert_eq!(r0.changes_to(&r0).map(|c| c.len()), Some(0));
        assert!(r2.changes_to(&r0).is_none());
        assert!(r0.changes_to(&revision("abc")).is_none());
    }

    #[test]
    fn test_translate_offset_tracking_modes() {
        let r0 = revision("0123456789");
        let r1 = r0.advance(replace(&r0, 4..4, "abc"));

        assert_eq!(r0.translate_offset(4, &r1, PointTrackingMode::Negative), Some(4));
        assert_eq!(r0.translate_offset(4, &r1, PointTrackingMode::Positive), Some(7));
        assert_eq!(r0.translate_offset(2, &r1, PointTrackingMode::Positive), Some(2));
        assert_eq!(r0.translate_offset(8, &r1, PointTrackingMode::Negative), Some(11));
    }

    #[test]
    fn test_line_and_offset_lookup() {
        let r0 = revision("first\nsecond\nthird");

        assert_eq!(r0.line_of_offset(0), 0);
        assert_eq!(r0.line_of_offset(8), 1);
        assert_eq!(r0.offset_of_line(2), 13);
        assert_eq!(r0.line_of_offset(1000), 2);
    }
}

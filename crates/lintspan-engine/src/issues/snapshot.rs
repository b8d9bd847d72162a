use std::fmt;
use std::sync::{Arc, OnceLock, Weak};

use crate::document::DocumentId;
use crate::issues::{FieldValue, IssueMarker, SnapshotFactory, TableField};
use crate::settings::ProviderSettings;
use crate::text::Revision;

/// Immutable, versioned set of issue markers for one revision of a document.
///
/// Snapshots of a document form a chain by version. When a snapshot is superseded
/// its forward index map is written exactly once: for every marker, the index of the
/// marker carrying it in the next snapshot, or nothing if it did not survive. The
/// markers themselves never change after publication, so snapshots can be read from
/// any thread without locking.
pub struct IssuesSnapshot {
    document: DocumentId,
    version: u64,
    revision: Revision,
    markers: Vec<IssueMarker>,
    settings: Arc<ProviderSettings>,
    factory: Weak<SnapshotFactory>,
    forward: OnceLock<Arc<[Option<usize>]>>,
}

impl IssuesSnapshot {
    pub(crate) fn new(
        document: DocumentId,
        version: u64,
        revision: Revision,
        markers: Vec<IssueMarker>,
        settings: Arc<ProviderSettings>,
        factory: Weak<SnapshotFactory>,
    ) -> Self {
        Self {
            document,
            version,
            revision,
            markers,
            settings,
            factory,
            forward: OnceLock::new(),
        }
    }

    pub fn document(&self) -> &DocumentId {
        &self.document
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn count(&self) -> usize {
        self.markers.len()
    }

    /// Revision every marker span is expressed against
    pub fn revision(&self) -> &Revision {
        &self.revision
    }

    pub fn markers(&self) -> &[IssueMarker] {
        &self.markers
    }

    pub fn marker(&self, index: usize) -> Option<&IssueMarker> {
        self.markers.get(index)
    }

    pub(crate) fn link_forward(&self, forward: Arc<[Option<usize>]>) {
        debug_assert_eq!(forward.len(), self.markers.len());
        let linked = self.forward.set(forward);
        debug_assert!(linked.is_ok(), "snapshot {} superseded twice", self.version);
    }

    /// True once a later snapshot has been published
    pub fn is_superseded(&self) -> bool {
        self.forward.get().is_some()
    }

    /// Index of the marker carrying `index` in the next snapshot
    pub fn next_index(&self, index: usize) -> Option<usize> {
        self.forward.get()?.get(index).copied().flatten()
    }

    /// The snapshot published right after this one, while something still holds it
    pub fn next_snapshot(&self) -> Option<Arc<IssuesSnapshot>> {
        if !self.is_superseded() {
            return None;
        }
        self.factory.upgrade()?.snapshot(self.version + 1)
    }

    /// Map a marker index of this snapshot onto `target`, a later snapshot of the same document.
    ///
    /// Follows the forward index maps hop by hop. Returns `None` when the marker was
    /// invalidated or replaced on the way, when `target` is older or belongs to another
    /// document, or when an intermediate version is no longer retained.
    pub fn translate_index(&self, index: usize, target: &IssuesSnapshot) -> Option<usize> {
        if index >= self.count()
            || !Weak::ptr_eq(&self.factory, &target.factory)
            || target.version < self.version
        {
            return None;
        }
        if target.version == self.version {
            return Some(index);
        }

        let index = self.next_index(index)?;
        if target.version == self.version + 1 {
            return Some(index);
        }
        self.factory
            .upgrade()?
            .translate_index(self.version + 1, index, target.version)
    }

    /// Typed value of `field` for the marker at `index`.
    ///
    /// `None` for out-of-range indices and for fields this source does not provide.
    pub fn value(&self, index: usize, field: TableField) -> Option<FieldValue> {
        let marker = self.markers.get(index)?;
        let issue = marker.issue();

        let value = match field {
            TableField::DocumentName => FieldValue::Text(self.document.to_string()),
            TableField::ErrorCategory => FieldValue::Text(
                issue
                    .category
                    .clone()
                    .unwrap_or_else(|| self.settings.default_category.clone()),
            ),
            TableField::ErrorSource => FieldValue::Text(self.settings.source_name.clone()),
            TableField::Line => FieldValue::Number(marker.span().line()),
            TableField::Column => FieldValue::Number(marker.span().column()),
            TableField::Text => FieldValue::Text(issue.message.clone()),
            TableField::ErrorSeverity => FieldValue::Severity(issue.severity),
            TableField::BuildTool => FieldValue::Text(self.settings.build_tool.clone()),
            TableField::ErrorCode => FieldValue::Text(issue.rule_id.clone()),
            TableField::ErrorCodeToolTip | TableField::HelpLink => FieldValue::Text(
                issue
                    .help_link
                    .clone()
                    .unwrap_or_else(|| self.settings.help_link(&issue.rule_id)),
            ),
            TableField::ProjectName | TableField::ProjectGuid => return None,
        };
        Some(value)
    }

    /// Look a value up by column key name
    pub fn try_get_value(&self, index: usize, key: &str) -> Option<FieldValue> {
        self.value(index, TableField::from_key(key)?)
    }

    pub fn can_create_details(&self, index: usize) -> bool {
        index < self.count()
    }

    /// Expanded description for detail rows
    pub fn details(&self, index: usize) -> Option<String> {
        let issue = self.markers.get(index)?.issue();
        Some(
            issue
                .details
                .clone()
                .unwrap_or_else(|| format!("{}: {}", issue.rule_id, issue.message)),
        )
    }
}

impl fmt::Debug for IssuesSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IssuesSnapshot")
            .field("document", &self.document)
            .field("version", &self.version)
            .field("revision", &self.revision.number())
            .field("markers", &self.markers.len())
            .field("superseded", &self.is_superseded())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::issues::{Issue, Severity};
    use crate::text::{TextBuffer, TextSource};
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;

    const SOURCE: &str = "fn main() {\n    let x = 1;\n    let y = 2;\n}\n";

    fn published(settings: ProviderSettings) -> (TextBuffer, Arc<SnapshotFactory>, Arc<IssuesSnapshot>) {
        let buffer = TextBuffer::new(SOURCE);
        let revision = buffer.current_revision();
        let factory = SnapshotFactory::new(
            DocumentId::from("src/main.rs"),
            Arc::new(settings),
            revision.clone(),
        );
        let markers = [
            Issue::new(20..21, "S1481", "Remove the unused local variable x")
                .with_severity(Severity::Error)
                .with_category("Bug"),
            Issue::new(35..36, "S1481", "Remove the unused local variable y")
                .with_details("Unused locals make code harder to read."),
        ]
        .into_iter()
        .filter_map(|issue| IssueMarker::new(&revision, issue))
        .collect();
        let snapshot = factory.publish(revision, markers, None).current;
        (buffer, factory, snapshot)
    }

    #[test]
    fn test_field_table() {
        let (_buffer, _factory, snapshot) = published(ProviderSettings::default());

        let rows: Vec<BTreeMap<&str, FieldValue>> = (0..snapshot.count())
            .map(|index| {
                TableField::ALL
                    .into_iter()
                    .filter(|field| {
                        !matches!(field, TableField::HelpLink | TableField::ErrorCodeToolTip)
                    })
                    .filter_map(|field| Some((field.key(), snapshot.value(index, field)?)))
                    .collect()
            })
            .collect();

        insta::assert_yaml_snapshot!(rows, @r"
- buildtool: lintspan
  column: 8
  documentname: src/main.rs
  errorcategory: Bug
  errorcode: S1481
  errorseverity: error
  errorsource: lintspan
  line: 1
  text: Remove the unused local variable x
- buildtool: lintspan
  column: 8
  documentname: src/main.rs
  errorcategory: Code Smell
  errorcode: S1481
  errorseverity: warning
  errorsource: lintspan
  line: 2
  text: Remove the unused local variable y
");
    }

    #[test]
    fn test_help_link_prefers_issue_link() {
        let (buffer, factory, _) = published(ProviderSettings::default());
        let revision = buffer.current_revision();
        let marker = IssueMarker::new(
            &revision,
            Issue::new(0..2, "S100", "Rename").with_help_link("https://example.com/S100"),
        )
        .unwrap();
        let snapshot = factory.publish(revision, vec![marker], None).current;

        assert_eq!(
            snapshot.value(0, TableField::HelpLink),
            Some(FieldValue::Text("https://example.com/S100".to_string()))
        );
    }

    #[test]
    fn test_help_link_falls_back_to_template() {
        let (_buffer, _factory, snapshot) = published(ProviderSettings {
            help_link_template: "https://rules.example/{rule_id}.html".to_string(),
            ..ProviderSettings::default()
        });

        assert_eq!(
            snapshot.value(0, TableField::ErrorCodeToolTip),
            Some(FieldValue::Text("https://rules.example/S1481.html".to_string()))
        );
    }

    #[test]
    fn test_lookup_not_found_cases() {
        let (_buffer, _factory, snapshot) = published(ProviderSettings::default());

        assert_eq!(snapshot.value(2, TableField::Line), None);
        assert_eq!(snapshot.value(0, TableField::ProjectName), None);
        assert_eq!(snapshot.value(0, TableField::ProjectGuid), None);
        assert_eq!(snapshot.try_get_value(0, "suppressionstate"), None);
        assert_eq!(
            snapshot.try_get_value(0, "ErrorCode"),
            Some(FieldValue::Text("S1481".to_string()))
        );
    }

    #[test]
    fn test_details() {
        let (_buffer, _factory, snapshot) = published(ProviderSettings::default());

        assert_eq!(
            snapshot.details(0).as_deref(),
            Some("S1481: Remove the unused local variable x")
        );
        assert_eq!(
            snapshot.details(1).as_deref(),
            Some("Unused locals make code harder to read.")
        );
        assert!(snapshot.can_create_details(1));
        assert_eq!(snapshot.details(2), None);
        assert!(!snapshot.can_create_details(2));
    }

    #[test]
    fn test_translate_index_to_self_and_bad_targets() {
        let (buffer, factory, snapshot) = published(ProviderSettings::default());
        let revision = buffer.current_revision();
        let marker = IssueMarker::new(&revision, Issue::new(0..2, "S100", "Rename")).unwrap();
        let newer = factory.publish(revision, vec![marker], None).current;

        assert_eq!(snapshot.translate_index(1, &snapshot), Some(1));
        assert_eq!(snapshot.translate_index(5, &snapshot), None);
        // Older target
        assert_eq!(newer.translate_index(0, &snapshot), None);

        let (_other_buffer, _other_factory, foreign) = published(ProviderSettings::default());
        assert_eq!(snapshot.translate_index(0, &foreign), None);
    }

    #[test]
    fn test_replacement_does_not_carry_identity() {
        let (buffer, factory, first) = published(ProviderSettings::default());
        let revision = buffer.current_revision();
        let marker = IssueMarker::new(&revision, Issue::new(20..21, "S1481", "again")).unwrap();

        let second = factory.publish(revision, vec![marker], None).current;

        assert!(first.is_superseded());
        assert_eq!(first.next_index(0), None);
        assert_eq!(first.translate_index(0, &second), None);
        assert_eq!(
            first.next_snapshot().map(|s| s.version()),
            Some(second.version())
        );
    }
}

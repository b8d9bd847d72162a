use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, anyhow, bail};
use lintspan_config::Config;
use lintspan_engine::{
    DocumentId, Issue, IssueRegistry, IssueTagger, NormalizedSpans, SnapshotFactory,
    SnapshotSpan, TableDataSink, TextBuffer,
};
use parking_lot::Mutex;
use serde::Deserialize;

use crate::table;

/// A scripted editing session
#[derive(Debug, Deserialize)]
pub struct Session {
    #[serde(default)]
    pub documents: Vec<DocumentSpec>,
    #[serde(default)]
    pub steps: Vec<Step>,
}

#[derive(Debug, Deserialize)]
pub struct DocumentSpec {
    pub path: PathBuf,
    pub text: String,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Step {
    Attach { view: String, document: PathBuf },
    Detach { view: String },
    Insert { document: PathBuf, at: usize, text: String },
    Delete { document: PathBuf, start: usize, end: usize },
    Replace { document: PathBuf, start: usize, end: usize, text: String },
    Issues { document: PathBuf, #[serde(default)] issues: Vec<Issue> },
    TakeDirty { document: PathBuf },
}

impl Session {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read session file {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Invalid session file {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }
}

type Transcript = Arc<Mutex<Vec<String>>>;

/// Records table notifications in the transcript
struct PrintingSink {
    out: Transcript,
}

impl TableDataSink for PrintingSink {
    fn add_factory(&self, factory: &Arc<SnapshotFactory>) {
        self.out
            .lock()
            .push(format!("table: tracking {}", factory.document()));
    }

    fn remove_factory(&self, factory: &Arc<SnapshotFactory>) {
        self.out
            .lock()
            .push(format!("table: stopped tracking {}", factory.document()));
    }

    fn snapshots_changed(&self, factory: &Arc<SnapshotFactory>) {
        let snapshot = factory.current_snapshot();
        self.out.lock().push(format!(
            "table: {} now at version {} with {} issues",
            factory.document(),
            snapshot.version(),
            snapshot.count()
        ));
    }
}

struct OpenDocument {
    id: DocumentId,
    buffer: TextBuffer,
}

/// Replays a session against a fresh registry
pub struct Replay {
    registry: IssueRegistry,
    config: Config,
    documents: HashMap<PathBuf, OpenDocument>,
    views: HashMap<String, IssueTagger>,
    out: Transcript,
}

impl Replay {
    pub fn new(config: Config) -> Self {
        Self {
            registry: IssueRegistry::new(table::provider_settings(&config)),
            config,
            documents: HashMap::new(),
            views: HashMap::new(),
            out: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Run every step and return the transcript, ending with the error table
    pub fn run(mut self, session: &Session) -> Result<Vec<String>> {
        let _subscription = self.registry.add_sink(Arc::new(PrintingSink {
            out: self.out.clone(),
        }));

        for spec in &session.documents {
            let id = DocumentId::new(self.config.resolve_document(&spec.path));
            log::debug!("opened {id} ({} bytes)", spec.text.len());
            self.documents.insert(
                spec.path.clone(),
                OpenDocument {
                    id,
                    buffer: TextBuffer::new(&spec.text),
                },
            );
        }

        for (number, step) in session.steps.iter().enumerate() {
            self.step(step)
                .with_context(|| format!("Step {} ({step:?}) failed", number + 1))?;
        }

        let mut out = std::mem::take(&mut *self.out.lock());
        out.extend(table::render(&self.registry));
        Ok(out)
    }

    fn step(&mut self, step: &Step) -> Result<()> {
        match step {
            Step::Attach { view, document } => {
                if self.views.contains_key(view) {
                    bail!("view '{view}' is already attached");
                }
                let open = self.document(document)?;
                let tagger = self
                    .registry
                    .attach_observer(open.id.clone(), Arc::new(open.buffer.clone()));
                let out = self.out.clone();
                let name = view.clone();
                tagger.on_tags_changed(move |span: &SnapshotSpan| {
                    out.lock().push(format!(
                        "[{name}] region changed {}..{} at revision {}",
                        span.start(),
                        span.end(),
                        span.revision().number()
                    ));
                });
                self.views.insert(view.clone(), tagger);
            }
            Step::Detach { view } => {
                let tagger = self
                    .views
                    .remove(view)
                    .ok_or_else(|| anyhow!("view '{view}' is not attached"))?;
                self.registry.detach_observer(tagger);
            }
            Step::Insert { document, at, text } => {
                self.document(document)?.buffer.insert(*at, text)?;
            }
            Step::Delete {
                document,
                start,
                end,
            } => {
                self.document(document)?.buffer.delete(*start..*end)?;
            }
            Step::Replace {
                document,
                start,
                end,
                text,
            } => {
                self.document(document)?
                    .buffer
                    .replace(*start..*end, text)?;
            }
            Step::Issues { document, issues } => {
                let id = self.document(document)?.id.clone();
                if !self.registry.update_external_markers(&id, issues.clone()) {
                    self.out
                        .lock()
                        .push(format!("issues for {id} ignored, no view is open"));
                }
            }
            Step::TakeDirty { document } => {
                let id = self.document(document)?.id.clone();
                let line = match self.registry.take_dirty_region(&id) {
                    Some(dirty) => format!("dirty {id}: {}", describe(&dirty)),
                    None => format!("dirty {id}: not tracked"),
                };
                self.out.lock().push(line);
            }
        }
        Ok(())
    }

    fn document(&self, path: &Path) -> Result<&OpenDocument> {
        self.documents
            .get(path)
            .ok_or_else(|| anyhow!("unknown document {}", path.display()))
    }
}

fn describe(spans: &NormalizedSpans) -> String {
    if spans.is_empty() {
        return "clean".to_string();
    }
    spans
        .iter()
        .map(|range| format!("{}..{}", range.start, range.end))
        .collect::<Vec<_>>()
        .join(", ")
}

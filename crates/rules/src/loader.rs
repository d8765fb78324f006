//! Filesystem document loader with hot-reload via `notify` watcher.
//!
//! Watches the rules directory for YAML/JSON file changes (create, modify,
//! delete) and reloads affected documents into the in-memory store. A file
//! that fails to parse during hot-reload keeps its previous version.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use notify::{
    event::{CreateKind, ModifyKind, RemoveKind},
    Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher,
};
use tracing::{info, warn};

use verdict_core::MatrixConfig;

use crate::schema::{DocumentEnvelope, RuleDocument, RuleSet};

// ── Error type ──────────────────────────────────────────────────────

/// Errors that can occur during document loading and management.
#[derive(Debug, thiserror::Error)]
pub enum RuleError {
    /// Filesystem I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML/JSON parse or deserialization error.
    #[error("Parse error: {0}")]
    Parse(String),

    /// Document validation error (e.g. missing required fields).
    #[error("Validation error: {0}")]
    Validation(String),

    /// Filesystem watcher error.
    #[error("Notify watcher error: {0}")]
    Notify(#[from] notify::Error),
}

/// Result alias for loader operations.
pub type Result<T> = std::result::Result<T, RuleError>;

// ── Load result types ───────────────────────────────────────────────

/// Outcome of loading a single document file.
#[derive(Debug)]
pub struct LoadResult {
    /// Path to the file that was loaded.
    pub path: PathBuf,
    /// Status of the load attempt.
    pub status: LoadStatus,
}

/// Status of a single file load attempt.
#[derive(Debug)]
pub enum LoadStatus {
    /// Document was successfully loaded.
    Loaded { doc_id: String },
    /// File was skipped (dotfile, unsupported extension, directory).
    Skipped { reason: String },
    /// Parse or validation error occurred.
    Failed { error: String },
}

// ── Document loader ─────────────────────────────────────────────────

type DocumentStore = Arc<RwLock<HashMap<String, RuleDocument>>>;

fn is_document_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e == "yml" || e == "yaml" || e == "json")
        .unwrap_or(false)
}

/// Parse one file into a document. YAML is a superset of JSON, so both
/// extensions go through the same parser.
fn parse_document(contents: &str) -> Result<RuleDocument> {
    let envelope: DocumentEnvelope =
        serde_yaml::from_str(contents).map_err(|e| RuleError::Parse(e.to_string()))?;

    if envelope.metadata.id.is_empty() {
        return Err(RuleError::Validation(
            "document metadata.id must not be empty".to_string(),
        ));
    }

    envelope.parse_full().map_err(RuleError::Parse)
}

/// Filesystem-backed document loader with optional hot-reload.
///
/// Scans a directory for `*.yml` / `*.yaml` / `*.json` files, deserializes
/// them into [`RuleDocument`]s, and maintains an in-memory map keyed by
/// `metadata.id`. An optional `notify` watcher can be started to pick up
/// changes automatically.
pub struct RuleLoader {
    /// Directory containing document files.
    rules_dir: PathBuf,
    /// In-memory document store keyed by `metadata.id`.
    docs: DocumentStore,
    /// Active filesystem watcher (held to keep it alive).
    _watcher: Option<RecommendedWatcher>,
}

impl RuleLoader {
    /// Create a new loader for the given directory.
    ///
    /// Creates the directory (and parents) if it does not exist.
    pub fn new(rules_dir: PathBuf) -> Self {
        if !rules_dir.exists() {
            if let Err(e) = fs::create_dir_all(&rules_dir) {
                warn!(path = %rules_dir.display(), error = %e, "failed to create rules directory");
            }
        }
        Self {
            rules_dir,
            docs: Arc::new(RwLock::new(HashMap::new())),
            _watcher: None,
        }
    }

    /// Scan the rules directory and load all document files.
    ///
    /// Dotfiles are skipped. Parse errors are reported per-file but do not
    /// abort the scan.
    pub fn load_all(&self) -> Result<Vec<LoadResult>> {
        let mut results = Vec::new();

        let mut entries: Vec<PathBuf> = fs::read_dir(&self.rules_dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .collect();
        // Deterministic load order regardless of directory iteration order.
        entries.sort();

        for path in entries {
            if path.is_dir() {
                continue;
            }

            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                if name.starts_with('.') {
                    results.push(LoadResult {
                        path,
                        status: LoadStatus::Skipped {
                            reason: "dotfile".to_string(),
                        },
                    });
                    continue;
                }
            }

            if !is_document_file(&path) {
                results.push(LoadResult {
                    path,
                    status: LoadStatus::Skipped {
                        reason: "not a YAML or JSON file".to_string(),
                    },
                });
                continue;
            }

            match self.load_file(&path) {
                Ok(doc) => {
                    let doc_id = doc.metadata().id.clone();
                    info!(doc_id = %doc_id, kind = %doc.kind(), path = %path.display(), "loaded document");
                    self.docs
                        .write()
                        .expect("document lock poisoned")
                        .insert(doc_id.clone(), doc);
                    results.push(LoadResult {
                        path,
                        status: LoadStatus::Loaded { doc_id },
                    });
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "failed to load document file");
                    results.push(LoadResult {
                        path,
                        status: LoadStatus::Failed {
                            error: e.to_string(),
                        },
                    });
                }
            }
        }

        Ok(results)
    }

    /// Parse a single file into a [`RuleDocument`].
    pub fn load_file(&self, path: &Path) -> Result<RuleDocument> {
        let contents = fs::read_to_string(path)?;
        parse_document(&contents)
    }

    /// Start a filesystem watcher with 500ms debounce.
    ///
    /// On file create/modify the document is re-parsed and upserted.
    /// On file delete the document is removed from the in-memory map.
    /// Parse errors are logged as warnings; the previous version is kept.
    pub fn watch(&mut self) -> Result<()> {
        let docs = Arc::clone(&self.docs);

        let mut watcher =
            notify::recommended_watcher(move |res: std::result::Result<Event, notify::Error>| {
                match res {
                    Ok(event) => handle_fs_event(&event, &docs),
                    Err(e) => warn!(error = %e, "filesystem watcher error"),
                }
            })?;

        watcher.watch(&self.rules_dir, RecursiveMode::NonRecursive)?;
        let _ = watcher
            .configure(notify::Config::default().with_poll_interval(Duration::from_millis(500)));

        info!(path = %self.rules_dir.display(), "watching rules directory for changes");
        self._watcher = Some(watcher);
        Ok(())
    }

    /// Get a clone of the shared document map.
    pub fn documents(&self) -> Arc<RwLock<HashMap<String, RuleDocument>>> {
        Arc::clone(&self.docs)
    }

    /// Compile the current documents into a [`RuleSet`].
    ///
    /// Documents are ordered by ID so the compiled set is deterministic;
    /// evaluation order within a priority tier follows this ordering.
    pub fn rule_set(&self) -> RuleSet {
        let guard = self.docs.read().expect("document lock poisoned");
        let mut ids: Vec<&String> = guard.keys().collect();
        ids.sort();
        let docs: Vec<&RuleDocument> = ids.iter().map(|id| &guard[id.as_str()]).collect();
        RuleSet::from_documents(docs)
    }

    /// Compile the matrix configuration, if a matrix document is present.
    ///
    /// When several enabled matrix documents exist, the lexicographically
    /// first ID wins and the rest are reported with a warning.
    pub fn matrix(&self) -> Option<MatrixConfig> {
        let guard = self.docs.read().expect("document lock poisoned");
        let mut matrices: Vec<(&String, &crate::matrix_doc::MatrixDocument)> = guard
            .iter()
            .filter(|(_, doc)| doc.metadata().enabled)
            .filter_map(|(id, doc)| doc.as_matrix().map(|m| (id, m)))
            .collect();
        matrices.sort_by(|a, b| a.0.cmp(b.0));

        if matrices.len() > 1 {
            let extra: Vec<&str> = matrices[1..].iter().map(|(id, _)| id.as_str()).collect();
            warn!(
                chosen = %matrices[0].0,
                ignored = ?extra,
                "multiple enabled matrix documents, using the first by ID"
            );
        }

        matrices.first().map(|(_, doc)| doc.compile())
    }

    /// Atomically write a document to a YAML file.
    ///
    /// Writes to a `.tmp` file first, then renames to the final path to
    /// avoid partial writes on crash. The in-memory map is updated too.
    pub fn write_document(&self, doc: &RuleDocument) -> Result<PathBuf> {
        let id = doc.metadata().id.clone();
        let final_path = self.rules_dir.join(format!("{}.yml", id));
        let tmp_path = self.rules_dir.join(format!(".{}.tmp", id));

        let yaml = match doc {
            RuleDocument::Rule(rule) => serde_yaml::to_string(rule),
            RuleDocument::Composition(comp) => serde_yaml::to_string(comp),
            RuleDocument::Matrix(matrix) => serde_yaml::to_string(matrix),
        }
        .map_err(|e| RuleError::Parse(e.to_string()))?;

        fs::write(&tmp_path, yaml)?;
        fs::rename(&tmp_path, &final_path)?;

        info!(doc_id = %id, path = %final_path.display(), "wrote document file");

        self.docs
            .write()
            .expect("document lock poisoned")
            .insert(id, doc.clone());

        Ok(final_path)
    }

    /// Delete a document file by ID.
    ///
    /// Removes both the file and the in-memory entry.
    pub fn delete_document(&self, id: &str) -> Result<()> {
        let candidates = [
            self.rules_dir.join(format!("{}.yml", id)),
            self.rules_dir.join(format!("{}.yaml", id)),
            self.rules_dir.join(format!("{}.json", id)),
        ];

        let mut removed = false;
        for path in &candidates {
            if path.exists() {
                fs::remove_file(path)?;
                removed = true;
                break;
            }
        }

        if !removed {
            return Err(RuleError::Validation(format!(
                "no document file found for id '{}'",
                id
            )));
        }

        self.docs
            .write()
            .expect("document lock poisoned")
            .remove(id);

        info!(doc_id = %id, "deleted document");
        Ok(())
    }
}

// ── Filesystem event handler ────────────────────────────────────────

/// Handle a single filesystem event from the notify watcher.
fn handle_fs_event(event: &Event, docs: &DocumentStore) {
    for path in &event.paths {
        if !is_document_file(path) {
            continue;
        }

        // Skip dotfiles (including our .tmp files).
        if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            if name.starts_with('.') {
                continue;
            }
        }

        match &event.kind {
            EventKind::Create(CreateKind::File)
            | EventKind::Modify(ModifyKind::Data(_))
            | EventKind::Modify(ModifyKind::Name(_)) => {
                match fs::read_to_string(path)
                    .map_err(RuleError::from)
                    .and_then(|s| parse_document(&s))
                {
                    Ok(doc) => {
                        let doc_id = doc.metadata().id.clone();
                        info!(doc_id = %doc_id, path = %path.display(), "hot-reloaded document");
                        docs.write()
                            .expect("document lock poisoned")
                            .insert(doc_id, doc);
                    }
                    Err(e) => {
                        warn!(
                            path = %path.display(),
                            error = %e,
                            "failed to parse document during hot-reload, keeping previous version"
                        );
                    }
                }
            }
            EventKind::Remove(RemoveKind::File) => {
                remove_document_by_path(docs, path);
            }
            _ => {}
        }
    }
}

/// Remove a document from the map given its file path.
///
/// Derives the document ID from the filename stem. Best-effort: if the ID
/// differs from the filename, the next `load_all` reconciles.
fn remove_document_by_path(docs: &DocumentStore, path: &Path) -> Option<RuleDocument> {
    let stem = path.file_stem()?.to_str()?;
    let removed = docs.write().expect("document lock poisoned").remove(stem);
    if removed.is_some() {
        info!(doc_id = %stem, path = %path.display(), "removed document after file deletion");
    }
    removed
}

// ── Tests ───────────────────────────────────────────────────────────

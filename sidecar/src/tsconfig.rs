//! Project config discovery and the file → config index.
//!
//! A root directory usually holds several `tsconfig.json` files that refer to
//! each other. [`ConfigResolver::initialize`] asks the sidecar to interpret
//! each of them, follows references breadth-first, and records which config
//! governs which source file.

use std::collections::{HashMap, HashSet, VecDeque};
use std::future::Future;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use ignore::WalkBuilder;
use tokio_util::sync::CancellationToken;

use crate::error::BridgeError;
use crate::protocol::ParsedConfig;

pub const PROJECT_CONFIG_FILE_NAME: &str = "tsconfig.json";

const EXCLUDED_DIR: &str = "node_modules";

/// What the resolver needs from the sidecar.
pub trait ProjectConfigSource: Send + Sync {
    fn start(&self) -> impl Future<Output = bool> + Send;
    fn new_session(&self) -> impl Future<Output = bool> + Send;
    fn parse_config(&self, path: &Path) -> impl Future<Output = Option<ParsedConfig>> + Send;
}

/// Finds project config files below a root.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConfigLocator;

impl ConfigLocator {
    /// Every `tsconfig.json` below `base`, skipping `node_modules`, sorted.
    #[must_use]
    pub fn locate(base: &Path) -> Vec<PathBuf> {
        let walker = WalkBuilder::new(base)
            .standard_filters(false)
            .filter_entry(|entry| entry.file_name() != EXCLUDED_DIR)
            .build();

        let mut found: Vec<PathBuf> = walker
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    tracing::debug!("Skipping unreadable entry: {e}");
                    None
                }
            })
            .filter(|entry| entry.file_type().is_some_and(|ft| ft.is_file()))
            .filter(|entry| entry.file_name() == PROJECT_CONFIG_FILE_NAME)
            .map(ignore::DirEntry::into_path)
            .collect();
        found.sort();
        found
    }
}

/// One interpreted project config.
#[derive(Debug)]
pub struct ProjectConfig {
    pub path: PathBuf,
    pub files: Vec<PathBuf>,
    pub references: Vec<PathBuf>,
    pub error: Option<BridgeError>,
}

/// All configs found by one traversal, in visit order.
#[derive(Debug, Default)]
pub struct ConfigGraph {
    configs: Vec<ProjectConfig>,
    by_path: HashMap<String, usize>,
    file_index: HashMap<String, usize>,
}

impl ConfigGraph {
    /// Add a config. The first config listing a file governs it.
    fn insert(&mut self, config: ProjectConfig) {
        let index = self.configs.len();
        self.by_path.entry(path_key(&config.path)).or_insert(index);
        for file in &config.files {
            self.file_index.entry(path_key(file)).or_insert(index);
        }
        self.configs.push(config);
    }

    #[must_use]
    pub fn configs(&self) -> &[ProjectConfig] {
        &self.configs
    }

    #[must_use]
    pub fn get(&self, config_path: &Path) -> Option<&ProjectConfig> {
        self.by_path
            .get(&path_key(config_path))
            .map(|&index| &self.configs[index])
    }

    /// The config governing `file`, if any.
    #[must_use]
    pub fn find_config_file(&self, file: &Path) -> Option<&Path> {
        self.file_index
            .get(&path_key(file))
            .map(|&index| self.configs[index].path.as_path())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.configs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.configs.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitializeOutcome {
    /// The graph was rebuilt with this many configs.
    Completed(usize),
    /// A newer build or the caller cancelled this one; nothing was committed.
    Cancelled,
    SidecarUnavailable,
}

pub struct ConfigResolver<S> {
    source: Arc<S>,
    graph: RwLock<Arc<ConfigGraph>>,
    current: Mutex<Option<(u64, CancellationToken)>>,
    next_run: AtomicU64,
}

impl<S: ProjectConfigSource> ConfigResolver<S> {
    #[must_use]
    pub fn new(source: Arc<S>) -> Self {
        Self {
            source,
            graph: RwLock::new(Arc::new(ConfigGraph::default())),
            current: Mutex::new(None),
            next_run: AtomicU64::new(0),
        }
    }

    /// Rebuild the graph for `base`, replacing any previous one.
    ///
    /// Starting a new build cancels the one in flight. Only a build that
    /// finishes uncancelled commits its graph.
    pub async fn initialize(&self, base: &Path, cancel: CancellationToken) -> InitializeOutcome {
        let run_id = self.next_run.fetch_add(1, Ordering::Relaxed);
        let run = cancel.child_token();
        {
            let mut current = self.lock_current();
            if let Some((_, previous)) = current.replace((run_id, run.clone())) {
                previous.cancel();
            }
            self.replace_graph(ConfigGraph::default());
        }

        let root = base.to_path_buf();
        let located = match tokio::task::spawn_blocking(move || ConfigLocator::locate(&root)).await
        {
            Ok(located) => located,
            Err(e) => {
                tracing::error!("Project config search failed: {e}");
                Vec::new()
            }
        };
        tracing::info!(
            root = %base.display(),
            found = located.len(),
            "Located project configs"
        );

        if !self.source.start().await || !self.source.new_session().await {
            tracing::warn!("Sidecar did not start; project configs are unavailable");
            self.finish(run_id);
            return InitializeOutcome::SidecarUnavailable;
        }

        let Some(graph) = self.traverse(located, &run).await else {
            tracing::debug!(root = %base.display(), "Project config build cancelled");
            return InitializeOutcome::Cancelled;
        };

        let mut current = self.lock_current();
        if run.is_cancelled() {
            return InitializeOutcome::Cancelled;
        }
        let count = graph.len();
        self.replace_graph(graph);
        if current.as_ref().is_some_and(|(id, _)| *id == run_id) {
            *current = None;
        }
        tracing::info!(configs = count, "Project config graph ready");
        InitializeOutcome::Completed(count)
    }

    /// Breadth-first traversal. `None` when cancelled.
    async fn traverse(
        &self,
        located: Vec<PathBuf>,
        run: &CancellationToken,
    ) -> Option<ConfigGraph> {
        let mut graph = ConfigGraph::default();
        let mut worklist: VecDeque<PathBuf> = located.into_iter().map(|p| canonical(&p)).collect();
        let mut processed: HashSet<String> = HashSet::new();

        while let Some(path) = worklist.pop_front() {
            if !processed.insert(path_key(&path)) {
                continue;
            }

            let parsed = tokio::select! {
                biased;
                () = run.cancelled() => return None,
                parsed = self.source.parse_config(&path) => parsed,
            };

            let config = project_config(path, parsed).await;
            if !config.references.is_empty() {
                tracing::debug!(
                    config = %config.path.display(),
                    references = ?config.references,
                    "Adding referenced project configs"
                );
                worklist.extend(config.references.iter().cloned());
            }
            graph.insert(config);
        }
        Some(graph)
    }

    /// The config governing `file` in the current graph.
    #[must_use]
    pub fn find_config_file(&self, file: &Path) -> Option<PathBuf> {
        self.configs().find_config_file(file).map(Path::to_path_buf)
    }

    /// Drop the graph and cancel any build in flight.
    pub fn reset(&self) {
        let mut current = self.lock_current();
        if let Some((_, run)) = current.take() {
            run.cancel();
        }
        self.replace_graph(ConfigGraph::default());
    }

    #[must_use]
    pub fn configs(&self) -> Arc<ConfigGraph> {
        Arc::clone(&self.graph.read().unwrap_or_else(PoisonError::into_inner))
    }

    fn replace_graph(&self, graph: ConfigGraph) {
        *self.graph.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(graph);
    }

    fn lock_current(&self) -> MutexGuard<'_, Option<(u64, CancellationToken)>> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn finish(&self, run_id: u64) {
        let mut current = self.lock_current();
        if current.as_ref().is_some_and(|(id, _)| *id == run_id) {
            *current = None;
        }
    }
}

async fn project_config(path: PathBuf, parsed: Option<ParsedConfig>) -> ProjectConfig {
    let Some(parsed) = parsed else {
        return ProjectConfig {
            error: Some(BridgeError::ConfigParse {
                path: path.clone(),
                message: "sidecar did not answer".to_string(),
            }),
            path,
            files: Vec::new(),
            references: Vec::new(),
        };
    };

    let dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
    let resolve = |p: &PathBuf| canonical(&dir.join(p));
    let error = parsed.error.map(|error| {
        tracing::warn!(config = %path.display(), "{}", error.message);
        BridgeError::ConfigParse {
            path: path.clone(),
            message: error.message,
        }
    });
    let mut references = Vec::with_capacity(parsed.references.len());
    for reference in &parsed.references {
        references.push(reference_config(resolve(reference)).await);
    }

    ProjectConfig {
        files: parsed.files.iter().map(resolve).collect(),
        references,
        error,
        path,
    }
}

/// A reference naming a directory means the config file inside it.
async fn reference_config(reference: PathBuf) -> PathBuf {
    match tokio::fs::metadata(&reference).await {
        Ok(metadata) if metadata.is_dir() => reference.join(PROJECT_CONFIG_FILE_NAME),
        _ => reference,
    }
}

/// Absolute, lexically normalized form of `path`.
fn canonical(path: &Path) -> PathBuf {
    let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    normalize_path(&absolute)
}

fn normalize_path(path: &Path) -> PathBuf {
    let mut out = Vec::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                if matches!(out.last(), Some(Component::Normal(_))) {
                    out.pop();
                }
            }
            Component::CurDir => {}
            other => out.push(other),
        }
    }
    out.iter().collect()
}

/// Case-insensitive lookup key for a path.
fn path_key(path: &Path) -> String {
    canonical(path).to_string_lossy().to_lowercase()
}

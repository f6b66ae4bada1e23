// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! File system watching for hot reload.
//!
//! Events are debounced and reduced to a list of [`Change`]s. Adding or
//! removing a view regenerates the view registry; any other source change
//! only invalidates the entry runtime.

use crate::server::DevState;
use kiln::sync::views::write_views;
use kiln::{ArtifactWriter, Manifest};
use notify::event::{ModifyKind, RenameMode};
use notify::{EventKind, RecommendedWatcher, RecursiveMode};
use notify_debouncer_full::{new_debouncer, DebouncedEvent, Debouncer, RecommendedCache};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Debounce window.
const DEBOUNCE: Duration = Duration::from_millis(100);

/// What happened to a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// The file appeared.
    Added,
    /// The file disappeared.
    Removed,
    /// The file's contents changed.
    Modified,
}

/// A single file change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
    /// Absolute path.
    pub path: PathBuf,
    /// Kind of change.
    pub kind: ChangeKind,
}

impl Change {
    /// Creates a change.
    pub fn new(path: impl Into<PathBuf>, kind: ChangeKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }
}

/// Reduces a debounced event to changes. Access events are dropped.
pub fn classify(event: &DebouncedEvent) -> Vec<Change> {
    let paths = &event.paths;
    let all = |kind: ChangeKind| -> Vec<Change> { paths.iter().map(|p| Change::new(p, kind)).collect() };

    match event.kind {
        EventKind::Create(_) => all(ChangeKind::Added),
        EventKind::Remove(_) => all(ChangeKind::Removed),
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => all(ChangeKind::Removed),
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => all(ChangeKind::Added),
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) if paths.len() == 2 => vec![
            Change::new(&paths[0], ChangeKind::Removed),
            Change::new(&paths[1], ChangeKind::Added),
        ],
        EventKind::Modify(ModifyKind::Name(_)) => paths
            .iter()
            .map(|p| {
                let kind = if p.exists() {
                    ChangeKind::Added
                } else {
                    ChangeKind::Removed
                };
                Change::new(p, kind)
            })
            .collect(),
        EventKind::Modify(_) | EventKind::Any | EventKind::Other => all(ChangeKind::Modified),
        EventKind::Access(_) => Vec::new(),
    }
}

/// Watches directories and reports debounced changes.
pub struct FileWatcher {
    #[allow(dead_code)]
    debouncer: Debouncer<RecommendedWatcher, RecommendedCache>,
}

impl FileWatcher {
    /// Creates a watcher over `paths`. Missing directories are skipped.
    ///
    /// `on_change` runs on the watcher thread with the changes of one
    /// debounce window.
    pub fn new<F>(paths: &[PathBuf], on_change: F) -> anyhow::Result<Self>
    where
        F: Fn(Vec<Change>) + Send + 'static,
    {
        let mut debouncer = new_debouncer(
            DEBOUNCE,
            None,
            move |result: Result<Vec<DebouncedEvent>, Vec<notify::Error>>| match result {
                Ok(events) => {
                    let changes: Vec<Change> = events.iter().flat_map(classify).collect();
                    if !changes.is_empty() {
                        on_change(changes);
                    }
                }
                Err(errors) => {
                    for error in errors {
                        tracing::warn!("Watch error: {}", error);
                    }
                }
            },
        )?;

        for path in paths {
            if path.is_dir() {
                debouncer.watch(path, RecursiveMode::Recursive)?;
                tracing::debug!("Watching {}", path.display());
            }
        }

        Ok(Self { debouncer })
    }
}

/// Directories the development server watches.
pub fn watch_roots(state: &DevState) -> Vec<PathBuf> {
    let src = state.config.root.join("src");
    let mut roots = vec![src.clone()];
    if !state.config.files.views.starts_with(&src) {
        roots.push(state.config.files.views.clone());
    }
    roots
}

/// What [`apply_changes`] did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Reload {
    /// The view registry was regenerated.
    pub views: bool,
    /// The entry runtime was invalidated.
    pub entry: bool,
}

fn is_view_change(state: &DevState, change: &Change) -> bool {
    change.kind != ChangeKind::Modified
        && change.path.starts_with(&state.config.files.views)
        && state.config.is_view_file(&change.path)
}

fn is_source_change(root: &Path, change: &Change) -> bool {
    change.path.starts_with(root.join("src"))
}

/// Reacts to a batch of changes.
///
/// View additions and removals rescan the views, rewrite `views.js` and swap
/// the in-memory manifest. Changes under `src/` invalidate the loader so the
/// next request reloads the entry.
pub async fn apply_changes(
    state: &DevState,
    writer: &ArtifactWriter,
    changes: &[Change],
) -> kiln::Result<Reload> {
    let mut reload = Reload::default();

    if changes.iter().any(|c| is_view_change(state, c)) {
        let manifest = Manifest::collect(&state.config)?;
        write_views(
            writer,
            &state.config.generated_dir(),
            &state.config,
            &manifest.views,
        )?;
        tracing::debug!("View registry now has {} views", manifest.views.len());
        state.manifest.store(Arc::new(manifest));
        reload.views = true;
    }

    if changes.iter().any(|c| is_source_change(&state.config.root, c)) {
        state.loader.invalidate().await;
        reload.entry = true;
    }

    Ok(reload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use kiln::{ArtifactCache, Config, EntryHandler, KilnError, ModuleLoader, ValidatedConfig};
    use notify::event::CreateKind;
    use notify::Event;
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;
    use tempfile::tempdir;

    #[derive(Default)]
    struct CountingLoader {
        invalidations: AtomicUsize,
    }

    #[async_trait]
    impl ModuleLoader for CountingLoader {
        async fn load_entry(&self) -> kiln::Result<Arc<dyn EntryHandler>> {
            Err(KilnError::BuildState("not used".into()))
        }

        async fn invalidate(&self) {
            self.invalidations.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn state(root: &Path) -> (DevState, Arc<CountingLoader>) {
        let config = Arc::new(ValidatedConfig::resolve(Config::default(), root).unwrap());
        let manifest = Manifest::collect(&config).unwrap();
        let loader = Arc::new(CountingLoader::default());
        (DevState::new(config, manifest, loader.clone()), loader)
    }

    #[test]
    fn test_classify_rename_both() {
        let event = DebouncedEvent::new(
            Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::Both)))
                .add_path(PathBuf::from("/p/a.html"))
                .add_path(PathBuf::from("/p/b.html")),
            Instant::now(),
        );
        assert_eq!(
            classify(&event),
            vec![
                Change::new("/p/a.html", ChangeKind::Removed),
                Change::new("/p/b.html", ChangeKind::Added),
            ]
        );
    }

    #[test]
    fn test_classify_create() {
        let event = DebouncedEvent::new(
            Event::new(EventKind::Create(CreateKind::File)).add_path(PathBuf::from("/p/a.html")),
            Instant::now(),
        );
        assert_eq!(classify(&event), vec![Change::new("/p/a.html", ChangeKind::Added)]);
    }

    #[tokio::test]
    async fn test_added_view_updates_registry() {
        let dir = tempdir().unwrap();
        let views = dir.path().join("src/views");
        fs::create_dir_all(&views).unwrap();
        fs::write(views.join("index.html"), "<h1>home</h1>").unwrap();

        let (state, loader) = state(dir.path());
        assert_eq!(state.manifest.load().views.len(), 1);

        fs::write(views.join("about.html"), "<h1>about</h1>").unwrap();
        let writer = ArtifactWriter::new(ArtifactCache::new());
        let reload = apply_changes(
            &state,
            &writer,
            &[Change::new(views.join("about.html"), ChangeKind::Added)],
        )
        .await
        .unwrap();

        assert_eq!(reload, Reload { views: true, entry: true });
        assert_eq!(state.manifest.load().views.len(), 2);
        assert!(state.manifest.load().view("about.html").is_some());
        let registry = fs::read_to_string(state.config.generated_dir().join("views.js")).unwrap();
        assert!(registry.contains("\"about.html\""));
        assert_eq!(loader.invalidations.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_modified_source_only_invalidates() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("src/views")).unwrap();
        fs::write(dir.path().join("src/server.js"), "export default {};").unwrap();

        let (state, loader) = state(dir.path());
        let writer = ArtifactWriter::new(ArtifactCache::new());
        let reload = apply_changes(
            &state,
            &writer,
            &[Change::new(dir.path().join("src/server.js"), ChangeKind::Modified)],
        )
        .await
        .unwrap();

        assert_eq!(reload, Reload { views: false, entry: true });
        assert_eq!(writer.write_count(), 0);
        assert_eq!(loader.invalidations.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_changes_outside_src_are_ignored() {
        let dir = tempdir().unwrap();
        let (state, loader) = state(dir.path());
        let writer = ArtifactWriter::new(ArtifactCache::new());
        let reload = apply_changes(
            &state,
            &writer,
            &[Change::new(dir.path().join("static/logo.png"), ChangeKind::Added)],
        )
        .await
        .unwrap();

        assert_eq!(reload, Reload::default());
        assert_eq!(loader.invalidations.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_file_watcher_reports_new_file() {
        let dir = tempdir().unwrap();
        let (tx, rx) = std::sync::mpsc::channel();
        let _watcher = FileWatcher::new(&[dir.path().to_path_buf()], move |changes| {
            let _ = tx.send(changes);
        })
        .unwrap();

        fs::write(dir.path().join("about.html"), "<h1>about</h1>").unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        let mut seen = Vec::new();
        while Instant::now() < deadline && !seen.iter().any(|c: &Change| c.path.ends_with("about.html")) {
            if let Ok(changes) = rx.recv_timeout(Duration::from_millis(200)) {
                seen.extend(changes);
            }
        }
        assert!(seen.iter().any(|c| c.path.ends_with("about.html")));
    }
}

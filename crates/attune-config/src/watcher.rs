//! Hot reload of file-backed configuration.
//!
//! The core loader never refreshes on its own. [`FileWatcher`] is the opt-in
//! way to follow a [`LocalFile`] source: it listens for filesystem events
//! through `notify`, debounces them and, when built with
//! [`reload_on_change`](FileWatcherBuilder::reload_on_change), calls
//! [`Config::reload_config`] on tokio's blocking pool.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use attune_config::{option, Config, FileWatcher, LocalFile, ValueType};
//!
//! # async fn example() -> Result<(), attune_config::ConfigError> {
//! let source = LocalFile::new("/etc/app/app.env");
//! let config = Arc::new(
//!     Config::builder("App")
//!         .prefix("APP_")
//!         .option("WORKERS", option().datatype(ValueType::Int).default(4))
//!         .source(source.clone())
//!         .build()?,
//! );
//!
//! let mut watcher = FileWatcher::new()
//!     .with_debounce(Duration::from_millis(250))
//!     .watch_source(&source)?
//!     .reload_on_change(Arc::clone(&config))
//!     .build()?;
//!
//! tokio::spawn(async move {
//!     watcher.run().await.ok();
//! });
//! # Ok(())
//! # }
//! ```
//!
//! A failed reload is logged and leaves the previously committed values in
//! place.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::ConfigError;
use crate::schema::Config;
use crate::source::LocalFile;

/// A debounced change to a watched file.
#[derive(Debug, Clone)]
pub struct FileChangeEvent {
    /// Path to the changed file.
    pub path: PathBuf,
    /// Kind of change.
    pub kind: FileChangeKind,
    /// When the change was seen.
    pub timestamp: Instant,
}

/// Kind of file change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileChangeKind {
    /// File was created.
    Created,
    /// File was modified.
    Modified,
    /// File was deleted.
    Deleted,
}

impl From<&EventKind> for FileChangeKind {
    fn from(kind: &EventKind) -> Self {
        match kind {
            EventKind::Create(_) => FileChangeKind::Created,
            EventKind::Remove(_) => FileChangeKind::Deleted,
            _ => FileChangeKind::Modified,
        }
    }
}

type ChangeCallback = Arc<dyn Fn(&FileChangeEvent) + Send + Sync>;

/// Builder for a [`FileWatcher`].
#[must_use]
pub struct FileWatcherBuilder {
    paths: Vec<PathBuf>,
    debounce: Duration,
    callback: Option<ChangeCallback>,
    reload_target: Option<Arc<Config>>,
}

impl FileWatcherBuilder {
    /// Create a new builder with a 500ms debounce.
    pub fn new() -> Self {
        Self {
            paths: Vec::new(),
            debounce: Duration::from_millis(500),
            callback: None,
            reload_target: None,
        }
    }

    /// Changes to the same path within `duration` are coalesced.
    pub fn with_debounce(mut self, duration: Duration) -> Self {
        self.debounce = duration;
        self
    }

    /// Watch `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the path does not exist.
    pub fn watch_path<P: AsRef<Path>>(mut self, path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("path does not exist: {}", path.display()),
            )));
        }
        self.paths.push(path.to_path_buf());
        Ok(self)
    }

    /// Watch `path` if it exists.
    pub fn watch_path_optional<P: AsRef<Path>>(mut self, path: P) -> Self {
        let path = path.as_ref();
        if path.exists() {
            self.paths.push(path.to_path_buf());
        }
        self
    }

    /// Watch the file behind a [`LocalFile`] source.
    ///
    /// # Errors
    ///
    /// Returns an error if the file does not exist.
    pub fn watch_source(self, source: &LocalFile) -> Result<Self, ConfigError> {
        self.watch_path(source.path())
    }

    /// Invoke `callback` for every debounced change.
    pub fn on_change<F>(mut self, callback: F) -> Self
    where
        F: Fn(&FileChangeEvent) + Send + Sync + 'static,
    {
        self.callback = Some(Arc::new(callback));
        self
    }

    /// Reload `config` for every debounced change.
    pub fn reload_on_change(mut self, config: Arc<Config>) -> Self {
        self.reload_target = Some(config);
        self
    }

    /// Start watching.
    ///
    /// # Errors
    ///
    /// Returns an error if no paths are configured or the platform watcher
    /// cannot be created.
    pub fn build(self) -> Result<FileWatcher, ConfigError> {
        if self.paths.is_empty() {
            return Err(ConfigError::watch("no paths configured for file watcher"));
        }

        let (tx, rx) = mpsc::channel(100);

        let mut watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
            if let Ok(event) = res {
                // The receiver may already be gone.
                let _ = tx.blocking_send(event);
            }
        })
        .map_err(|e| ConfigError::watch(format!("failed to create file watcher: {e}")))?;

        for path in &self.paths {
            watcher
                .watch(path, RecursiveMode::NonRecursive)
                .map_err(|e| ConfigError::watch(format!("failed to watch {}: {e}", path.display())))?;
        }

        Ok(FileWatcher {
            _watcher: watcher,
            rx,
            debounce: self.debounce,
            callback: self.callback,
            reload_target: self.reload_target,
            last_event: None,
        })
    }
}

impl Default for FileWatcherBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Watches configuration files and reacts to changes.
pub struct FileWatcher {
    _watcher: RecommendedWatcher,
    rx: mpsc::Receiver<Event>,
    debounce: Duration,
    callback: Option<ChangeCallback>,
    reload_target: Option<Arc<Config>>,
    last_event: Option<(PathBuf, Instant)>,
}

impl FileWatcher {
    /// Create a new file watcher builder.
    #[allow(clippy::new_ret_no_self)]
    pub fn new() -> FileWatcherBuilder {
        FileWatcherBuilder::new()
    }

    /// Process events until the watcher shuts down, invoking the callback
    /// and reloading the target config for each change.
    pub async fn run(&mut self) -> Result<(), ConfigError> {
        while let Some(event) = self.rx.recv().await {
            if let Some(change) = self.process_event(event) {
                self.dispatch(&change);
            }
        }
        Ok(())
    }

    /// A pending change, if any. Does not wait and does not dispatch.
    pub async fn poll(&mut self) -> Option<FileChangeEvent> {
        match self.rx.try_recv() {
            Ok(event) => self.process_event(event),
            Err(_) => None,
        }
    }

    /// Wait for the next change. Does not dispatch.
    pub async fn next(&mut self) -> Option<FileChangeEvent> {
        while let Some(event) = self.rx.recv().await {
            if let Some(change) = self.process_event(event) {
                return Some(change);
            }
        }
        None
    }

    fn dispatch(&self, change: &FileChangeEvent) {
        debug!(path = %change.path.display(), kind = ?change.kind, "configuration file changed");

        if let Some(callback) = &self.callback {
            callback(change);
        }

        if let Some(config) = &self.reload_target {
            let config = Arc::clone(config);
            let path = change.path.clone();
            tokio::task::spawn_blocking(move || match config.reload_config() {
                Ok(()) => info!(
                    config = %config.name(),
                    path = %path.display(),
                    generation = config.generation(),
                    "reloaded configuration after file change"
                ),
                Err(e) => warn!(
                    config = %config.name(),
                    path = %path.display(),
                    error = %e,
                    "failed to reload configuration after file change"
                ),
            });
        }
    }

    fn process_event(&mut self, event: Event) -> Option<FileChangeEvent> {
        match event.kind {
            EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_) => {}
            _ => return None,
        }

        let path = event.paths.first()?.clone();

        let now = Instant::now();
        if let Some((last_path, last_time)) = &self.last_event {
            if last_path == &path && now.duration_since(*last_time) < self.debounce {
                return None;
            }
        }
        self.last_event = Some((path.clone(), now));

        Some(FileChangeEvent {
            path,
            kind: FileChangeKind::from(&event.kind),
            timestamp: now,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::option::option;
    use crate::types::ValueType;
    use notify::event::{CreateKind, DataChange, ModifyKind, RemoveKind};
    use std::fs;
    use tempfile::TempDir;
    use tokio::time::{sleep, timeout};

    fn modify_event(path: &Path) -> Event {
        Event::new(EventKind::Modify(ModifyKind::Data(DataChange::Any))).add_path(path.to_path_buf())
    }

    fn watcher_for(path: &Path, debounce: Duration) -> FileWatcher {
        FileWatcher::new()
            .with_debounce(debounce)
            .watch_path(path)
            .unwrap()
            .build()
            .unwrap()
    }

    #[test]
    fn test_file_change_kind_from_event_kind() {
        assert_eq!(
            FileChangeKind::from(&EventKind::Create(CreateKind::File)),
            FileChangeKind::Created
        );
        assert_eq!(
            FileChangeKind::from(&EventKind::Modify(ModifyKind::Data(DataChange::Any))),
            FileChangeKind::Modified
        );
        assert_eq!(
            FileChangeKind::from(&EventKind::Remove(RemoveKind::File)),
            FileChangeKind::Deleted
        );
    }

    #[test]
    fn test_watch_path_not_found() {
        let err = FileWatcherBuilder::new().watch_path("/nonexistent/app.env").err().unwrap();
        match err {
            ConfigError::Io(e) => assert_eq!(e.kind(), std::io::ErrorKind::NotFound),
            other => panic!("expected Io error, got {other:?}"),
        }
    }

    #[test]
    fn test_watch_path_optional_not_found() {
        let builder = FileWatcherBuilder::new().watch_path_optional("/nonexistent/app.env");
        assert!(builder.paths.is_empty());
    }

    #[test]
    fn test_build_no_paths() {
        let err = FileWatcherBuilder::new().build().err().unwrap();
        assert!(matches!(err, ConfigError::Watch { .. }));
    }

    #[test]
    fn test_watch_source() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.env");
        fs::write(&path, "APP_A=1\n").unwrap();

        let builder = FileWatcherBuilder::new().watch_source(&LocalFile::new(&path)).unwrap();
        assert_eq!(builder.paths, vec![path]);
    }

    #[tokio::test]
    async fn test_debounce_coalesces_repeated_events() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.env");
        fs::write(&path, "APP_A=1\n").unwrap();

        let mut watcher = watcher_for(&path, Duration::from_secs(60));
        assert!(watcher.process_event(modify_event(&path)).is_some());
        assert!(watcher.process_event(modify_event(&path)).is_none());

        let other = dir.path().join("other.env");
        assert!(watcher.process_event(modify_event(&other)).is_some());
    }

    #[tokio::test]
    async fn test_access_events_are_ignored() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.env");
        fs::write(&path, "APP_A=1\n").unwrap();

        let mut watcher = watcher_for(&path, Duration::from_millis(10));
        let access = Event::new(EventKind::Access(notify::event::AccessKind::Any)).add_path(path.clone());
        assert!(watcher.process_event(access).is_none());
    }

    #[tokio::test]
    async fn test_dispatch_reloads_config() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.env");
        fs::write(&path, "APP_WORKERS=1\n").unwrap();

        let config = Arc::new(
            Config::builder("App")
                .prefix("APP_")
                .option("WORKERS", option().datatype(ValueType::Int))
                .source(LocalFile::new(&path))
                .build()
                .unwrap(),
        );
        let watcher = FileWatcher::new()
            .watch_path(&path)
            .unwrap()
            .reload_on_change(Arc::clone(&config))
            .build()
            .unwrap();

        fs::write(&path, "APP_WORKERS=8\n").unwrap();
        watcher.dispatch(&FileChangeEvent {
            path: path.clone(),
            kind: FileChangeKind::Modified,
            timestamp: Instant::now(),
        });

        let reloaded = timeout(Duration::from_secs(5), async {
            while config.generation() < 2 {
                sleep(Duration::from_millis(10)).await;
            }
        })
        .await;
        assert!(reloaded.is_ok());
        assert_eq!(config.get::<i64>("WORKERS").unwrap(), 8);
    }

    #[tokio::test]
    async fn test_failed_reload_keeps_values() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.env");
        fs::write(&path, "APP_WORKERS=1\n").unwrap();

        let config = Arc::new(
            Config::builder("App")
                .prefix("APP_")
                .option("WORKERS", option().datatype(ValueType::Int))
                .source(LocalFile::new(&path))
                .build()
                .unwrap(),
        );
        let calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let watcher = FileWatcher::new()
            .watch_path(&path)
            .unwrap()
            .on_change(move |_| {
                counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            })
            .reload_on_change(Arc::clone(&config))
            .build()
            .unwrap();

        fs::write(&path, "APP_WORKERS=many\n").unwrap();
        watcher.dispatch(&FileChangeEvent {
            path: path.clone(),
            kind: FileChangeKind::Modified,
            timestamp: Instant::now(),
        });
        sleep(Duration::from_millis(200)).await;

        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert_eq!(config.generation(), 1);
        assert_eq!(config.get::<i64>("WORKERS").unwrap(), 1);
    }

    #[tokio::test]
    async fn test_file_change_detection() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.env");
        fs::write(&path, "APP_A=1\n").unwrap();
        let canonical = path.canonicalize().unwrap();

        let mut watcher = watcher_for(&path, Duration::from_millis(50));
        sleep(Duration::from_millis(100)).await;
        fs::write(&path, "APP_A=2\n").unwrap();

        match timeout(Duration::from_secs(2), watcher.next()).await {
            Ok(Some(event)) => {
                let seen = event.path.canonicalize().unwrap_or(event.path);
                assert_eq!(seen, canonical);
            }
            // Filesystem notifications are not guaranteed on every CI host.
            Ok(None) | Err(_) => {}
        }
    }
}

//! Source change watching for development reload

use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::BTreeSet;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Quiet period after the last change before a batch is released
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(100);

/// Directory names whose contents never trigger a reload
const IGNORED_DIRS: &[&str] = &[".git", "target", "__pycache__", "node_modules"];

/// Watches source directories and yields debounced batches of changed paths
pub struct SourceWatcher {
    // Dropping the watcher stops event delivery
    _watcher: RecommendedWatcher,
    rx: mpsc::UnboundedReceiver<PathBuf>,
    extensions: Vec<String>,
    debounce: Duration,
    // Batch state lives here so a cancelled `next_batch` loses nothing
    pending: BTreeSet<PathBuf>,
    last_change: Option<Instant>,
}

impl SourceWatcher {
    /// Watches every directory in `dirs` recursively. Only files whose
    /// extension is in `extensions` are reported; an empty list reports all.
    pub fn new(dirs: &[PathBuf], extensions: &[String]) -> Result<Self, notify::Error> {
        let (tx, rx) = mpsc::unbounded_channel();

        let mut watcher = RecommendedWatcher::new(
            move |res: Result<Event, notify::Error>| match res {
                Ok(event) => {
                    if matches!(event.kind, EventKind::Access(_)) {
                        return;
                    }
                    for path in event.paths {
                        let _ = tx.send(path);
                    }
                }
                Err(e) => warn!("File watch error: {}", e),
            },
            Config::default(),
        )?;

        for dir in dirs {
            watcher.watch(dir, RecursiveMode::Recursive)?;
            debug!("Watching {} for changes", dir.display());
        }

        Ok(Self {
            _watcher: watcher,
            rx,
            extensions: extensions
                .iter()
                .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
            debounce: DEFAULT_DEBOUNCE,
            pending: BTreeSet::new(),
            last_change: None,
        })
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Waits for the next relevant change, then collects further changes until
    /// the watcher has been quiet for the debounce period. Returns `None` once
    /// the watcher has shut down with nothing pending.
    ///
    /// Cancel-safe: changes seen by a dropped call are returned by the next one.
    pub async fn next_batch(&mut self) -> Option<Vec<PathBuf>> {
        loop {
            let received = match self.last_change {
                None => self.rx.recv().await,
                Some(last) => match tokio::time::timeout_at(last + self.debounce, self.rx.recv()).await {
                    Ok(received) => received,
                    Err(_) => return Some(self.take_pending()),
                },
            };

            match received {
                Some(path) => {
                    if is_relevant(&path, &self.extensions) {
                        self.pending.insert(path);
                        self.last_change = Some(Instant::now());
                    }
                }
                None if self.pending.is_empty() => return None,
                None => return Some(self.take_pending()),
            }
        }
    }

    fn take_pending(&mut self) -> Vec<PathBuf> {
        self.last_change = None;
        std::mem::take(&mut self.pending).into_iter().collect()
    }
}

/// Whether a change to `path` should trigger a reload
pub fn is_relevant(path: &Path, extensions: &[String]) -> bool {
    let in_ignored_dir = path.components().any(|c| match c {
        Component::Normal(name) => name
            .to_str()
            .map(|n| IGNORED_DIRS.contains(&n))
            .unwrap_or(false),
        _ => false,
    });
    if in_ignored_dir {
        return false;
    }

    if extensions.is_empty() {
        return true;
    }

    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| extensions.iter().any(|x| x.eq_ignore_ascii_case(e)))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn exts(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_relevant_extension() {
        let exts = exts(&["py", "toml"]);
        assert!(is_relevant(Path::new("/app/src/main.py"), &exts));
        assert!(is_relevant(Path::new("/app/pyproject.toml"), &exts));
        assert!(!is_relevant(Path::new("/app/README.md"), &exts));
        assert!(!is_relevant(Path::new("/app/Makefile"), &exts));
    }

    #[test]
    fn test_ignored_directories() {
        let exts = exts(&["py"]);
        assert!(!is_relevant(Path::new("/app/__pycache__/main.py"), &exts));
        assert!(!is_relevant(Path::new("/app/.git/hooks/pre-commit.py"), &exts));
        assert!(!is_relevant(Path::new("/app/node_modules/x/y.py"), &exts));
    }

    #[test]
    fn test_empty_extension_list_matches_all() {
        assert!(is_relevant(Path::new("/app/Makefile"), &[]));
    }

    #[tokio::test]
    async fn test_next_batch_reports_change() {
        let dir = TempDir::new().unwrap();
        let mut watcher = SourceWatcher::new(&[dir.path().to_path_buf()], &exts(&["py"]))
            .unwrap()
            .with_debounce(Duration::from_millis(50));

        let file = dir.path().join("main.py");
        tokio::time::sleep(Duration::from_millis(100)).await;
        std::fs::write(&file, "app = 1\n").unwrap();

        let batch = tokio::time::timeout(Duration::from_secs(10), watcher.next_batch())
            .await
            .expect("change should be observed")
            .unwrap();
        assert!(batch.iter().any(|p| p.ends_with("main.py")));
    }

    #[tokio::test]
    async fn test_cancelled_wait_keeps_pending_change() {
        let dir = TempDir::new().unwrap();
        let mut watcher = SourceWatcher::new(&[dir.path().to_path_buf()], &exts(&["py"]))
            .unwrap()
            .with_debounce(Duration::from_millis(500));

        tokio::time::sleep(Duration::from_millis(100)).await;
        std::fs::write(dir.path().join("main.py"), "app = 1\n").unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;

        // The caller gives up mid-debounce, as a select! with another branch does
        let first = tokio::time::timeout(Duration::from_millis(50), watcher.next_batch()).await;
        assert!(first.is_err(), "debounce should still be running");

        let batch = tokio::time::timeout(Duration::from_secs(10), watcher.next_batch())
            .await
            .expect("pending change should survive cancellation")
            .unwrap();
        assert!(batch.iter().any(|p| p.ends_with("main.py")));
    }
}

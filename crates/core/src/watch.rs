//! Directory watching with per-path debouncing
//!
//! Scanners and copy tools write a file in many small steps. The watcher
//! waits until a path has been quiet for a while and then reports it once.
//!
//! ```text
//! notify backend ──→ unbounded channel ──→ debounce loop ──→ on_ready(path)
//!                                          (one timer per path)
//! ```
//!
//! All timer bookkeeping happens inside the debounce loop, so the path table
//! needs no locking.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher as _};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::time::{DelayQueue, delay_queue};
use tracing::{debug, info, trace, warn};

use crate::error::{Error, Result};

/// Smallest accepted quiet period
pub const MIN_QUIET_PERIOD: Duration = Duration::from_millis(100);

/// Default quiet period
pub const DEFAULT_QUIET_PERIOD: Duration = Duration::from_secs(1);

/// One countdown per path, reset on every new notification
pub struct Debouncer {
    quiet: Duration,
    timers: DelayQueue<PathBuf>,
    keys: HashMap<PathBuf, delay_queue::Key>,
}

impl Debouncer {
    /// Create a debouncer with the given quiet period
    #[must_use]
    pub fn new(quiet: Duration) -> Self {
        Self {
            quiet,
            timers: DelayQueue::new(),
            keys: HashMap::new(),
        }
    }

    /// Arm the countdown for `path`, or restart it if already armed
    pub fn touch(&mut self, path: PathBuf) {
        if let Some(key) = self.keys.get(&path) {
            self.timers.reset(key, self.quiet);
        } else {
            let key = self.timers.insert(path.clone(), self.quiet);
            self.keys.insert(path, key);
        }
    }

    /// Number of live countdowns
    #[must_use]
    pub fn armed(&self) -> usize {
        self.keys.len()
    }

    /// Check whether `path` has a live countdown
    #[must_use]
    pub fn is_armed(&self, path: &Path) -> bool {
        self.keys.contains_key(path)
    }

    /// Check if no countdown is live
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Wait for the next countdown to run out.
    ///
    /// Returns `None` immediately when nothing is armed.
    pub async fn next_ready(&mut self) -> Option<PathBuf> {
        let expired = std::future::poll_fn(|cx| self.timers.poll_expired(cx)).await?;
        let path = expired.into_inner();
        self.keys.remove(&path);
        Some(path)
    }
}

/// Paths of `event` that count as "being written"
fn written_paths(event: &Event) -> &[PathBuf] {
    match event.kind {
        EventKind::Create(_) | EventKind::Modify(ModifyKind::Data(_) | ModifyKind::Any) => {
            &event.paths
        }
        // Moved into the directory; the destination is the last path
        EventKind::Modify(ModifyKind::Name(RenameMode::To | RenameMode::Both)) => event
            .paths
            .last()
            .map(std::slice::from_ref)
            .unwrap_or_default(),
        _ => &[],
    }
}

/// Run the debounce loop over a stream of raw notifications.
///
/// Ends when `cancel` fires or the event stream closes. Countdowns still
/// running at that point are dropped without calling `on_ready`.
pub async fn debounce_events<F>(
    mut events: mpsc::UnboundedReceiver<notify::Result<Event>>,
    quiet: Duration,
    cancel: CancellationToken,
    mut on_ready: F,
) where
    F: FnMut(PathBuf),
{
    let mut debouncer = Debouncer::new(quiet);

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                debug!(abandoned = debouncer.armed(), "Stopping watcher");
                break;
            }
            Some(path) = debouncer.next_ready(), if !debouncer.is_empty() => {
                trace!(path = %path.display(), "Path is quiet");
                on_ready(path);
            }
            event = events.recv() => match event {
                Some(Ok(event)) => {
                    for path in written_paths(&event) {
                        trace!(path = %path.display(), kind = ?event.kind, "New event");
                        debouncer.touch(path.clone());
                    }
                }
                Some(Err(e)) => warn!(error = %e, "Watch error"),
                None => break,
            },
        }
    }
}

/// Running directory watch. Dropping it detaches from the directory.
pub struct DirWatcher {
    _watcher: RecommendedWatcher,
    task: JoinHandle<()>,
}

impl DirWatcher {
    /// Wait for the debounce loop to finish after cancellation
    pub async fn join(self) {
        let Self { _watcher, task } = self;
        drop(_watcher);
        if let Err(e) = task.await {
            warn!(error = %e, "Watcher task failed");
        }
    }
}

/// Watch `dir` (not recursively) and call `on_ready` once per quiet burst.
///
/// Must be called from within a Tokio runtime.
///
/// # Errors
/// Returns [`Error::WatchSetup`] if the notification backend cannot be
/// created or attached to `dir`.
pub fn watch_dir<F>(
    dir: &Path,
    quiet: Duration,
    cancel: CancellationToken,
    on_ready: F,
) -> Result<DirWatcher>
where
    F: FnMut(PathBuf) + Send + 'static,
{
    let setup_err = |source| Error::WatchSetup {
        path: dir.to_path_buf(),
        source,
    };

    let (tx, rx) = mpsc::unbounded_channel();
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
        let _ = tx.send(res);
    })
    .map_err(setup_err)?;
    watcher
        .watch(dir, RecursiveMode::NonRecursive)
        .map_err(setup_err)?;

    let task = tokio::spawn(debounce_events(rx, quiet, cancel, on_ready));
    info!(dir = %dir.display(), quiet = ?quiet, "Started watcher");

    Ok(DirWatcher {
        _watcher: watcher,
        task,
    })
}

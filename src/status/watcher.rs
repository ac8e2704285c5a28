//! Background watcher that turns status file writes into change events.
//!
//! Raw file-system notifications restart a debounce timer. When the timer
//! fires the file is re-read; a snapshot that parses and differs meaningfully
//! from the last one is delivered to the listener.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::delta::{StatusDelta, has_significant_change};
use super::record::StatusRecord;
use crate::error::Result;

/// Debounce applied when none is configured
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(2000);

#[derive(Debug, Clone)]
pub struct WatcherConfig {
    pub debounce: Duration,
    /// When false, every parsed write is an event
    pub notify_only_meaningful: bool,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            debounce: DEFAULT_DEBOUNCE,
            notify_only_meaningful: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatcherState {
    Idle,
    Watching,
    Stopped,
}

/// A significant change to the status file
#[derive(Debug, Clone, PartialEq)]
pub struct StatusChange {
    pub previous: Option<StatusRecord>,
    pub current: StatusRecord,
    pub delta: StatusDelta,
    pub timestamp: DateTime<Utc>,
}

pub struct StatusWatcher {
    path: PathBuf,
    config: WatcherConfig,
    state: WatcherState,
    listener: Option<mpsc::UnboundedSender<StatusChange>>,
    fs_watcher: Option<RecommendedWatcher>,
    raw_tx: Option<mpsc::UnboundedSender<()>>,
    stop_tx: Option<watch::Sender<bool>>,
    task: Option<JoinHandle<()>>,
}

impl StatusWatcher {
    pub fn new(
        path: impl Into<PathBuf>,
        config: WatcherConfig,
        listener: mpsc::UnboundedSender<StatusChange>,
    ) -> Self {
        Self {
            path: path.into(),
            config,
            state: WatcherState::Idle,
            listener: Some(listener),
            fs_watcher: None,
            raw_tx: None,
            stop_tx: None,
            task: None,
        }
    }

    /// Create a watcher together with the receiving end of its events
    pub fn channel(path: impl Into<PathBuf>, config: WatcherConfig) -> (Self, mpsc::UnboundedReceiver<StatusChange>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(path, config, tx), rx)
    }

    pub fn state(&self) -> WatcherState {
        self.state
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Begin watching. Must be called inside a tokio runtime.
    ///
    /// A no-op unless the watcher is idle. A missing parent directory is not
    /// an error; the watcher simply never fires.
    pub fn start(&mut self) -> Result<()> {
        if self.state != WatcherState::Idle {
            return Ok(());
        }
        let Some(listener) = self.listener.clone() else {
            return Ok(());
        };

        let previous = StatusRecord::try_load(&self.path);
        let (raw_tx, raw_rx) = mpsc::unbounded_channel();
        let (stop_tx, stop_rx) = watch::channel(false);

        let file_name = self.path.file_name().map(|n| n.to_os_string());
        let event_tx = raw_tx.clone();
        let mut fs_watcher = RecommendedWatcher::new(
            move |res: std::result::Result<notify::Event, notify::Error>| match res {
                Ok(event) => {
                    let relevant = matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_) | EventKind::Any)
                        && event
                            .paths
                            .iter()
                            .any(|p| p.file_name().map(|n| n.to_os_string()) == file_name);
                    if relevant {
                        let _ = event_tx.send(());
                    }
                }
                Err(e) => log::debug!("Status watch error: {}", e),
            },
            notify::Config::default(),
        )?;

        let parent = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        if let Err(e) = fs_watcher.watch(parent, RecursiveMode::NonRecursive) {
            if parent.exists() {
                return Err(e.into());
            }
            log::debug!("Status directory {} does not exist yet: {}", parent.display(), e);
        }

        let task = tokio::spawn(debounce_loop(
            self.path.clone(),
            self.config.clone(),
            previous,
            raw_rx,
            stop_rx,
            listener,
        ));

        self.fs_watcher = Some(fs_watcher);
        self.raw_tx = Some(raw_tx);
        self.stop_tx = Some(stop_tx);
        self.task = Some(task);
        self.state = WatcherState::Watching;
        log::debug!("Watching {}", self.path.display());
        Ok(())
    }

    /// Stop watching. Cancels the pending timer, then closes the
    /// subscription, then detaches the listener.
    pub fn stop(&mut self) {
        if self.state == WatcherState::Stopped {
            return;
        }

        if let Some(stop_tx) = self.stop_tx.take() {
            stop_tx.send_replace(true);
        }
        self.fs_watcher = None;
        self.raw_tx = None;
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.listener = None;

        self.state = WatcherState::Stopped;
        log::debug!("Stopped watching {}", self.path.display());
    }

    /// Inject a raw notification, as the file-system callback would
    #[cfg(test)]
    fn trigger(&self) {
        if let Some(tx) = &self.raw_tx {
            let _ = tx.send(());
        }
    }
}

impl Drop for StatusWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn debounce_loop(
    path: PathBuf,
    config: WatcherConfig,
    mut previous: Option<StatusRecord>,
    mut raw_rx: mpsc::UnboundedReceiver<()>,
    mut stop_rx: watch::Receiver<bool>,
    listener: mpsc::UnboundedSender<StatusChange>,
) {
    let mut deadline: Option<Instant> = None;

    loop {
        tokio::select! {
            biased;

            _ = stop_rx.changed() => break,
            raw = raw_rx.recv() => match raw {
                Some(()) => deadline = Some(Instant::now() + config.debounce),
                None => break,
            },
            _ = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                deadline = None;
                if let Some(change) = evaluate(&path, &mut previous, config.notify_only_meaningful)
                    && listener.send(change).is_err()
                {
                    break;
                }
            }
        }
    }
}

/// Re-read the file and produce a change if it is significant.
fn evaluate(path: &Path, previous: &mut Option<StatusRecord>, only_meaningful: bool) -> Option<StatusChange> {
    let Some(current) = StatusRecord::try_load(path) else {
        log::debug!("Skipping unreadable status snapshot at {}", path.display());
        return None;
    };

    if !has_significant_change(previous.as_ref(), &current, only_meaningful) {
        return None;
    }

    let delta = StatusDelta::between(previous.as_ref(), &current);
    Some(StatusChange {
        previous: previous.replace(current.clone()),
        current,
        delta,
        timestamp: Utc::now(),
    })
}

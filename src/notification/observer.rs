//! Turns controller events and status changes into notifications.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;

use super::http::{NotificationOptions, Notifier};
use crate::domain::{LoopEvent, event_types};
use crate::runner::LoopObserver;
use crate::status::StatusChange;

/// Notification categories that can be enabled in configuration
pub mod categories {
    pub const START: &str = "start";
    pub const ITERATION: &str = "iteration";
    pub const MILESTONE: &str = "milestone";
    pub const COMPLETION: &str = "completion";
    pub const STAGNATION: &str = "stagnation";
    pub const MAX_ITERATIONS: &str = "max_iterations";
    pub const INTERRUPTED: &str = "interrupted";
    pub const ERROR: &str = "error";
    pub const FAILED: &str = "failed";
    pub const PROGRESS: &str = "progress";
}

/// Categories sent when configuration names none
pub fn default_events() -> Vec<String> {
    [
        categories::MILESTONE,
        categories::COMPLETION,
        categories::STAGNATION,
        categories::MAX_ITERATIONS,
        categories::ERROR,
        categories::PROGRESS,
    ]
    .iter()
    .map(|c| c.to_string())
    .collect()
}

/// Category of a controller event, None for events never notified
pub fn category_for(event_type: &str) -> Option<&'static str> {
    match event_type {
        event_types::RUN_STARTED => Some(categories::START),
        event_types::ITERATION_COMPLETE => Some(categories::ITERATION),
        event_types::MILESTONE => Some(categories::MILESTONE),
        event_types::RUN_COMPLETE => Some(categories::COMPLETION),
        event_types::RUN_STAGNANT => Some(categories::STAGNATION),
        event_types::RUN_MAX_ITERATIONS => Some(categories::MAX_ITERATIONS),
        event_types::RUN_INTERRUPTED => Some(categories::INTERRUPTED),
        event_types::ERROR => Some(categories::ERROR),
        event_types::RUN_FAILED => Some(categories::FAILED),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationSettings {
    pub url: String,
    pub priority: Option<String>,
    pub tags: Vec<String>,
    /// Enabled categories
    pub events: Vec<String>,
}

impl NotificationSettings {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            priority: None,
            tags: vec!["robot".to_string()],
            events: default_events(),
        }
    }

    pub fn is_enabled(&self, category: &str) -> bool {
        self.events.iter().any(|e| e == category)
    }
}

struct Message {
    category: &'static str,
    title: String,
    body: String,
    urgent: bool,
}

/// Sends enabled notifications on spawned tasks so the caller never waits
pub struct NotificationObserver {
    notifier: Arc<dyn Notifier>,
    settings: NotificationSettings,
    task: String,
    pending: Mutex<Vec<JoinHandle<bool>>>,
}

impl NotificationObserver {
    pub fn new(notifier: Arc<dyn Notifier>, settings: NotificationSettings, task: impl Into<String>) -> Self {
        Self {
            notifier,
            settings,
            task: task.into(),
            pending: Mutex::new(Vec::new()),
        }
    }

    pub fn settings(&self) -> &NotificationSettings {
        &self.settings
    }

    /// Notify about a significant status file change
    pub fn on_status_change(&self, change: &StatusChange) {
        let current = &change.current;
        let title = if current.complete && change.delta.completion_status_changed {
            "wiggum: status complete"
        } else {
            "wiggum: progress"
        };
        let mut body = match current.progress {
            Some(progress) => format!("{}/{} done", progress.completed, progress.total),
            None => "Status updated".to_string(),
        };
        if let Some(summary) = &current.summary {
            body.push_str(": ");
            body.push_str(summary);
        }
        self.dispatch(Message {
            category: categories::PROGRESS,
            title: title.to_string(),
            body,
            urgent: false,
        });
    }

    /// Wait for in-flight sends; returns how many were delivered
    pub async fn flush(&self, timeout: Duration) -> usize {
        let handles = std::mem::take(&mut *self.pending.lock().unwrap_or_else(|e| e.into_inner()));
        let waiting = handles.len();
        let delivered = async move {
            let mut delivered = 0;
            for handle in handles {
                if let Ok(true) = handle.await {
                    delivered += 1;
                }
            }
            delivered
        };
        match tokio::time::timeout(timeout, delivered).await {
            Ok(delivered) => delivered,
            Err(_) => {
                log::warn!("Gave up waiting on {} notification(s)", waiting);
                0
            }
        }
    }

    fn message_for(&self, event: &LoopEvent) -> Option<Message> {
        let category = category_for(&event.event_type)?;
        let iteration = event.iteration.unwrap_or(0);
        let payload = &event.payload;
        let (title, body, urgent) = match category {
            categories::START => (
                "wiggum: started".to_string(),
                format!(
                    "Started {} run ({} iterations max): {}",
                    payload["mode"].as_str().unwrap_or("loop"),
                    payload["max_iterations"],
                    self.task
                ),
                false,
            ),
            categories::ITERATION => {
                let remaining = payload["remaining"]
                    .as_u64()
                    .map(|n| format!(", {} remaining", n))
                    .unwrap_or_default();
                (
                    "wiggum: iteration".to_string(),
                    format!("Iteration {} done{}", iteration, remaining),
                    false,
                )
            }
            categories::MILESTONE => (
                "wiggum: milestone".to_string(),
                format!("Reached iteration {}: {}", iteration, self.task),
                false,
            ),
            categories::COMPLETION => (
                "wiggum: complete".to_string(),
                format!("Complete after {} iterations: {}", iteration, self.task),
                false,
            ),
            categories::STAGNATION => (
                "wiggum: stopped".to_string(),
                format!(
                    "No work reported for {} iterations; stopped after {}: {}",
                    payload["no_work_streak"], iteration, self.task
                ),
                false,
            ),
            categories::MAX_ITERATIONS => (
                "wiggum: out of iterations".to_string(),
                format!("Reached {} iterations without completing: {}", iteration, self.task),
                false,
            ),
            categories::INTERRUPTED => (
                "wiggum: interrupted".to_string(),
                format!("Interrupted after {} iterations: {}", iteration, self.task),
                false,
            ),
            categories::ERROR => (
                "wiggum: error".to_string(),
                format!(
                    "Iteration {} failed: {}",
                    iteration,
                    payload["message"].as_str().unwrap_or("unknown error")
                ),
                true,
            ),
            categories::FAILED => (
                "wiggum: failed".to_string(),
                format!("Run failed after {} iterations: {}", iteration, self.task),
                true,
            ),
            _ => return None,
        };
        Some(Message {
            category,
            title,
            body,
            urgent,
        })
    }

    fn dispatch(&self, message: Message) {
        if !self.settings.is_enabled(message.category) {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            log::warn!("No async runtime; dropping {} notification", message.category);
            return;
        };

        let priority = if message.urgent {
            Some("high".to_string())
        } else {
            self.settings.priority.clone()
        };
        let options = NotificationOptions {
            url: self.settings.url.clone(),
            title: Some(message.title),
            priority,
            tags: self.settings.tags.clone(),
        };
        let notifier = self.notifier.clone();
        let body = message.body;
        let handle = runtime.spawn(async move { notifier.send(&body, &options).await });

        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        pending.retain(|h| !h.is_finished());
        pending.push(handle);
    }
}

impl LoopObserver for NotificationObserver {
    fn on_event(&self, event: &LoopEvent) {
        if let Some(message) = self.message_for(event) {
            self.dispatch(message);
        }
    }
}

//! Push notifications for run progress
//!
//! This module provides:
//! - Notifier / HttpNotifier: message delivery
//! - NotificationObserver: maps controller events and status changes to messages

pub mod http;
pub mod observer;

pub use http::{DEFAULT_NOTIFY_TIMEOUT, HttpNotifier, NotificationOptions, Notifier};
pub use observer::{NotificationObserver, NotificationSettings, categories, category_for, default_events};

//! Shutdown requests from outside the controller (Ctrl-C, signals).

use std::sync::Arc;

use tokio::sync::watch;

/// Counts shutdown requests. The first asks for a graceful stop; the second
/// escalates to a forced kill.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    requests: Arc<watch::Sender<u32>>,
}

impl Default for ShutdownHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownHandle {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(0);
        Self { requests: Arc::new(tx) }
    }

    /// Record a request; returns the total so far
    pub fn request(&self) -> u32 {
        let mut total = 0;
        self.requests.send_modify(|count| {
            *count += 1;
            total = *count;
        });
        total
    }

    pub fn count(&self) -> u32 {
        *self.requests.borrow()
    }

    pub fn is_requested(&self) -> bool {
        self.count() >= 1
    }

    /// Resolves once at least one request was made
    pub async fn requested(&self) {
        self.wait_for_count(1).await
    }

    /// Resolves once a second request was made
    pub async fn escalated(&self) {
        self.wait_for_count(2).await
    }

    async fn wait_for_count(&self, n: u32) {
        let mut rx = self.requests.subscribe();
        // The sender lives in self, so the channel cannot close here
        let _ = rx.wait_for(|count| *count >= n).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_request_counts() {
        let handle = ShutdownHandle::new();
        assert!(!handle.is_requested());
        assert_eq!(handle.request(), 1);
        assert_eq!(handle.clone().request(), 2);
        assert_eq!(handle.count(), 2);
        assert!(handle.is_requested());
    }

    #[tokio::test]
    async fn test_requested_resolves_after_request() {
        let handle = ShutdownHandle::new();
        let waiter = handle.clone();
        let task = tokio::spawn(async move { waiter.requested().await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!task.is_finished());
        handle.request();
        tokio::time::timeout(Duration::from_secs(1), task).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_escalated_needs_second_request() {
        let handle = ShutdownHandle::new();
        handle.request();

        let pending = tokio::time::timeout(Duration::from_millis(30), handle.escalated()).await;
        assert!(pending.is_err());

        handle.request();
        tokio::time::timeout(Duration::from_secs(1), handle.escalated()).await.unwrap();
    }
}

//! HTTP notification delivery (ntfy-compatible).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use crate::error::{Result, WiggumError};

/// Default request timeout for one notification
pub const DEFAULT_NOTIFY_TIMEOUT: Duration = Duration::from_secs(10);

/// Where and how to deliver one message
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotificationOptions {
    pub url: String,
    pub title: Option<String>,
    pub priority: Option<String>,
    pub tags: Vec<String>,
}

/// Sends notifications. Delivery failures are reported, never raised.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Returns true when the target accepted the message
    async fn send(&self, message: &str, options: &NotificationOptions) -> bool;
}

/// POSTs the message as the request body with `Title`, `Priority` and `Tags` headers
pub struct HttpNotifier {
    client: Client,
}

impl HttpNotifier {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| WiggumError::Notification(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self::with_client(client))
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    async fn post(&self, message: &str, options: &NotificationOptions) -> Result<()> {
        let mut request = self.client.post(&options.url).body(message.to_string());
        if let Some(title) = &options.title {
            request = request.header("Title", title);
        }
        if let Some(priority) = &options.priority {
            request = request.header("Priority", priority);
        }
        if !options.tags.is_empty() {
            request = request.header("Tags", options.tags.join(","));
        }

        let response = request
            .send()
            .await
            .map_err(|e| WiggumError::Notification(format!("Request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(WiggumError::Notification(format!(
                "{} returned {}",
                options.url, status
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl Notifier for HttpNotifier {
    async fn send(&self, message: &str, options: &NotificationOptions) -> bool {
        match self.post(message, options).await {
            Ok(()) => {
                log::debug!("Notification sent to {}", options.url);
                true
            }
            Err(e) => {
                log::warn!("{}", e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::sync::oneshot;

    fn content_length(head: &str) -> usize {
        head.lines()
            .find_map(|line| {
                let (name, value) = line.split_once(':')?;
                if name.eq_ignore_ascii_case("content-length") {
                    value.trim().parse().ok()
                } else {
                    None
                }
            })
            .unwrap_or(0)
    }

    fn local_notifier() -> HttpNotifier {
        let client = Client::builder()
            .timeout(Duration::from_secs(5))
            .no_proxy()
            .build()
            .unwrap();
        HttpNotifier::with_client(client)
    }

    /// Accepts one request, answers with `status_line`, hands back the lowercased request
    async fn serve_once(status_line: &'static str) -> (String, oneshot::Receiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/wiggum", listener.local_addr().unwrap());
        let (tx, rx) = oneshot::channel();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            let mut chunk = [0u8; 1024];
            loop {
                let n = socket.read(&mut chunk).await.unwrap();
                if n == 0 {
                    break;
                }
                buf.extend_from_slice(&chunk[..n]);
                let text = String::from_utf8_lossy(&buf).to_string();
                if let Some(end) = text.find("\r\n\r\n")
                    && buf.len() >= end + 4 + content_length(&text[..end])
                {
                    break;
                }
            }
            let response = format!("{}\r\ncontent-length: 0\r\nconnection: close\r\n\r\n", status_line);
            socket.write_all(response.as_bytes()).await.unwrap();
            let _ = tx.send(String::from_utf8_lossy(&buf).to_lowercase());
        });

        (url, rx)
    }

    #[tokio::test]
    async fn test_send_posts_body_and_headers() {
        let (url, rx) = serve_once("HTTP/1.1 200 OK").await;
        let notifier = local_notifier();
        let options = NotificationOptions {
            url,
            title: Some("Done".to_string()),
            priority: Some("high".to_string()),
            tags: vec!["robot".to_string(), "tada".to_string()],
        };

        assert!(notifier.send("hello there", &options).await);

        let request = rx.await.unwrap();
        assert!(request.starts_with("post /wiggum"));
        assert!(request.contains("title: done"));
        assert!(request.contains("priority: high"));
        assert!(request.contains("tags: robot,tada"));
        assert!(request.ends_with("hello there"));
    }

    #[tokio::test]
    async fn test_send_without_optional_headers() {
        let (url, rx) = serve_once("HTTP/1.1 200 OK").await;
        let notifier = local_notifier();
        let options = NotificationOptions {
            url,
            ..Default::default()
        };

        assert!(notifier.send("plain", &options).await);
        let request = rx.await.unwrap();
        assert!(!request.contains("title:"));
        assert!(!request.contains("tags:"));
    }

    #[tokio::test]
    async fn test_send_reports_error_status() {
        let (url, _rx) = serve_once("HTTP/1.1 500 Internal Server Error").await;
        let notifier = local_notifier();
        let options = NotificationOptions {
            url,
            ..Default::default()
        };
        assert!(!notifier.send("boom", &options).await);
    }

    #[tokio::test]
    async fn test_send_to_closed_port_fails() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/", listener.local_addr().unwrap());
        drop(listener);

        let notifier = local_notifier();
        let options = NotificationOptions {
            url,
            ..Default::default()
        };
        assert!(!notifier.send("nobody home", &options).await);
    }
}

//! Network observation for automated pages.
//!
//! Each page publishes its request/response traffic on a [`NetworkTap`].
//! Consumers register a [`RequestObserver`]; dropping the observer removes the
//! registration, so observation is always scoped to the caller.

use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;

/// Buffered events per observer before the slowest one starts lagging.
const TAP_CAPACITY: usize = 256;

/// Traffic seen by a page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkEvent {
    /// An outgoing request, with lower-cased header names
    Request {
        url: String,
        method: String,
        headers: HashMap<String, String>,
    },
    /// A received response
    Response { url: String, status: u16 },
}

impl NetworkEvent {
    /// Build a request event, normalising header names to lower case.
    pub fn request(
        url: impl Into<String>,
        method: impl Into<String>,
        headers: impl IntoIterator<Item = (String, String)>,
    ) -> Self {
        Self::Request {
            url: url.into(),
            method: method.into(),
            headers: headers
                .into_iter()
                .map(|(name, value)| (name.to_ascii_lowercase(), value))
                .collect(),
        }
    }

    /// Value of a request header (case-insensitive), if this is a request carrying it.
    pub fn header(&self, name: &str) -> Option<&str> {
        match self {
            Self::Request { headers, .. } => headers
                .get(&name.to_ascii_lowercase())
                .map(String::as_str)
                .filter(|value| !value.is_empty()),
            Self::Response { .. } => None,
        }
    }
}

/// Per-page broadcast point for network events.
#[derive(Debug, Clone)]
pub struct NetworkTap {
    tx: broadcast::Sender<NetworkEvent>,
}

impl Default for NetworkTap {
    fn default() -> Self {
        Self::new()
    }
}

impl NetworkTap {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(TAP_CAPACITY);
        Self { tx }
    }

    /// Publish an event to every registered observer.
    pub fn publish(&self, event: NetworkEvent) {
        // No observers is the common case between captures.
        let _ = self.tx.send(event);
    }

    /// Register a new observer. Only events published afterwards are seen.
    pub fn subscribe(&self) -> RequestObserver {
        RequestObserver {
            rx: self.tx.subscribe(),
        }
    }

    /// Number of live observers.
    pub fn observer_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

/// Scoped registration on a page's network traffic.
#[derive(Debug)]
pub struct RequestObserver {
    rx: broadcast::Receiver<NetworkEvent>,
}

impl RequestObserver {
    /// Next event, `None` once the page is gone.
    pub async fn next_event(&mut self) -> Option<NetworkEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!("Network observer lagged, skipped {} events", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Wait until a request carrying `header` is seen, or `timeout` elapses.
    pub async fn wait_for_header(&mut self, header: &str, timeout: Duration) -> Option<String> {
        let deadline = Instant::now() + timeout;
        loop {
            let event = tokio::time::timeout_at(deadline, self.next_event())
                .await
                .ok()??;
            if let Some(value) = event.header(header) {
                return Some(value.to_string());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request_with(name: &str, value: &str) -> NetworkEvent {
        NetworkEvent::request(
            "https://shop.test/api",
            "PUT",
            vec![(name.to_string(), value.to_string())],
        )
    }

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let event = request_with("Anti-CsrfToken-A2Z", "tok");
        assert_eq!(event.header("anti-csrftoken-a2z"), Some("tok"));
        assert_eq!(event.header("ANTI-CSRFTOKEN-A2Z"), Some("tok"));
        assert_eq!(event.header("x-other"), None);
    }

    #[test]
    fn test_empty_header_value_is_ignored() {
        let event = request_with("anti-csrftoken-a2z", "");
        assert_eq!(event.header("anti-csrftoken-a2z"), None);
    }

    #[tokio::test]
    async fn test_wait_for_header_sees_later_event() {
        let tap = NetworkTap::new();
        let mut observer = tap.subscribe();

        let publisher = tap.clone();
        tokio::spawn(async move {
            publisher.publish(NetworkEvent::Response {
                url: "https://shop.test/".to_string(),
                status: 200,
            });
            publisher.publish(request_with("anti-csrftoken-a2z", "tok"));
        });

        let value = observer
            .wait_for_header("anti-csrftoken-a2z", Duration::from_secs(1))
            .await;
        assert_eq!(value.as_deref(), Some("tok"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_header_times_out() {
        let tap = NetworkTap::new();
        let mut observer = tap.subscribe();
        let value = observer
            .wait_for_header("anti-csrftoken-a2z", Duration::from_secs(10))
            .await;
        assert!(value.is_none());
        drop(tap);
    }

    #[test]
    fn test_observers_are_scoped_to_their_owner() {
        let tap = NetworkTap::new();
        {
            let _first = tap.subscribe();
            let _second = tap.subscribe();
            assert_eq!(tap.observer_count(), 2);
            tap.publish(request_with("anti-csrftoken-a2z", "tok"));
        }
        assert_eq!(tap.observer_count(), 0);
    }
}

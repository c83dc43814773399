//! Best-effort fan-out over all configured alert channels.

use std::sync::Arc;
use std::time::Instant;

use tracing::{info, warn};

use crate::traits::{DispatchResult, Notification, Notifier, NotifyError};

/// Sends each alert to every configured channel. Delivery failures are
/// logged and reported per channel, never propagated: an undeliverable
/// alert must not fail the job that raised it.
#[derive(Default)]
pub struct AlertDispatcher {
    channels: Vec<Arc<dyn Notifier>>,
}

impl AlertDispatcher {
    pub fn new(channels: Vec<Arc<dyn Notifier>>) -> Self {
        Self { channels }
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Deliver to all channels, collecting per-channel outcomes.
    pub async fn send_all(&self, notification: &Notification) -> Vec<DispatchResult> {
        if self.channels.is_empty() {
            warn!(
                subject = %notification.subject,
                "no alert channels configured; alert dropped"
            );
            return Vec::new();
        }

        let mut results = Vec::with_capacity(self.channels.len());
        for channel in &self.channels {
            let started = Instant::now();
            let outcome = channel.send(notification).await;
            let duration_ms = started.elapsed().as_millis() as u64;
            match &outcome {
                Ok(()) => info!(
                    channel = channel.channel_name(),
                    duration_ms, "alert dispatched"
                ),
                Err(e) => warn!(
                    channel = channel.channel_name(),
                    duration_ms, "alert delivery failed: {e}"
                ),
            }
            results.push(DispatchResult {
                channel: channel.channel_name().to_string(),
                success: outcome.is_ok(),
                error: outcome.err().map(|e| e.to_string()),
                duration_ms,
            });
        }
        results
    }
}

#[async_trait::async_trait]
impl Notifier for AlertDispatcher {
    /// Fan out; always succeeds from the caller's point of view.
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        self.send_all(notification).await;
        Ok(())
    }

    fn channel_name(&self) -> &str {
        "dispatcher"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct RecordingChannel {
        name: &'static str,
        sent: AtomicUsize,
        fail: bool,
    }

    #[async_trait::async_trait]
    impl Notifier for RecordingChannel {
        async fn send(&self, _notification: &Notification) -> Result<(), NotifyError> {
            self.sent.fetch_add(1, Ordering::Relaxed);
            if self.fail {
                Err(NotifyError::Smtp("refused".to_string()))
            } else {
                Ok(())
            }
        }

        fn channel_name(&self) -> &str {
            self.name
        }
    }

    #[tokio::test]
    async fn fans_out_to_all_channels() {
        let a = Arc::new(RecordingChannel { name: "a", sent: AtomicUsize::new(0), fail: false });
        let b = Arc::new(RecordingChannel { name: "b", sent: AtomicUsize::new(0), fail: false });
        let dispatcher = AlertDispatcher::new(vec![a.clone(), b.clone()]);

        let results = dispatcher
            .send_all(&Notification::new("s", "b"))
            .await;

        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.success));
        assert_eq!(a.sent.load(Ordering::Relaxed), 1);
        assert_eq!(b.sent.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn one_failing_channel_does_not_stop_the_rest() {
        let bad = Arc::new(RecordingChannel { name: "bad", sent: AtomicUsize::new(0), fail: true });
        let good = Arc::new(RecordingChannel { name: "good", sent: AtomicUsize::new(0), fail: false });
        let dispatcher = AlertDispatcher::new(vec![bad, good.clone()]);

        let results = dispatcher
            .send_all(&Notification::new("s", "b"))
            .await;

        assert_eq!(results.len(), 2);
        assert!(!results[0].success);
        assert!(results[0].error.as_deref().unwrap().contains("refused"));
        assert!(results[1].success);
        assert_eq!(good.sent.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn notifier_impl_never_errors() {
        let bad = Arc::new(RecordingChannel { name: "bad", sent: AtomicUsize::new(0), fail: true });
        let dispatcher = AlertDispatcher::new(vec![bad]);
        assert!(dispatcher.send(&Notification::new("s", "b")).await.is_ok());
    }
}

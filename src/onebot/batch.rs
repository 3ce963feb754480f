//! Sequential batched sending.
//!
//! Messages go out one at a time with a configurable pause between sends so
//! the endpoint is never flooded. Each message gets its own verdict; a
//! failure never stops the batch and nothing is retried.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::Transport;

/// Pacing policy for batched sends.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct SendPolicy {
    /// Minimum pause between consecutive sends. Zero disables pacing, which
    /// keeps tests real-time free.
    pub min_send_interval_ms: u64,
}

impl Default for SendPolicy {
    fn default() -> Self {
        Self {
            min_send_interval_ms: 500,
        }
    }
}

/// Whether a message goes to a friend or a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Private,
    Group,
}

/// One message queued for sending.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutgoingMessage {
    pub kind: MessageKind,
    pub target_id: String,
    pub text: String,
    /// Users to mention; only meaningful for group messages.
    #[serde(default)]
    pub at_users: Vec<String>,
}

impl OutgoingMessage {
    pub fn private(target_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            kind: MessageKind::Private,
            target_id: target_id.into(),
            text: text.into(),
            at_users: Vec::new(),
        }
    }

    pub fn group(
        target_id: impl Into<String>,
        text: impl Into<String>,
        at_users: Vec<String>,
    ) -> Self {
        Self {
            kind: MessageKind::Group,
            target_id: target_id.into(),
            text: text.into(),
            at_users,
        }
    }
}

/// Per-message verdict of a batch run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendReport {
    /// Zero-based index of the message in the batch.
    pub index: usize,
    pub target_id: String,
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
}

/// Sends every message in order, pausing per the policy between sends.
pub async fn send_batch(
    transport: &dyn Transport,
    messages: &[OutgoingMessage],
    policy: &SendPolicy,
) -> Vec<SendReport> {
    let mut reports = Vec::with_capacity(messages.len());

    for (index, message) in messages.iter().enumerate() {
        if index > 0 && policy.min_send_interval_ms > 0 {
            tokio::time::sleep(Duration::from_millis(policy.min_send_interval_ms)).await;
        }

        let started = Instant::now();
        let outcome = match message.kind {
            MessageKind::Private => {
                transport
                    .send_private(&message.target_id, &message.text)
                    .await
            }
            MessageKind::Group => {
                transport
                    .send_group(&message.target_id, &message.text, &message.at_users)
                    .await
            }
        };
        let duration_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(()) => reports.push(SendReport {
                index,
                target_id: message.target_id.clone(),
                ok: true,
                error: None,
                duration_ms,
            }),
            Err(e) => {
                warn!(index, target_id = %message.target_id, "send failed: {e}");
                reports.push(SendReport {
                    index,
                    target_id: message.target_id.clone(),
                    ok: false,
                    error: Some(e.to_string()),
                    duration_ms,
                });
            }
        }
    }

    reports
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Result, SnapError};
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Records sends and fails on configured targets.
    struct RecordingTransport {
        sent: Mutex<Vec<(MessageKind, String, String)>>,
        fail_target: Option<String>,
    }

    impl RecordingTransport {
        fn new(fail_target: Option<&str>) -> Self {
            Self {
                sent: Mutex::new(Vec::new()),
                fail_target: fail_target.map(|s| s.to_string()),
            }
        }
    }

    #[async_trait]
    impl Transport for RecordingTransport {
        async fn send_private(&self, user_id: &str, text: &str) -> Result<()> {
            if self.fail_target.as_deref() == Some(user_id) {
                return Err(SnapError::Transport("rejected".to_string()));
            }
            self.sent.lock().expect("lock").push((
                MessageKind::Private,
                user_id.to_string(),
                text.to_string(),
            ));
            Ok(())
        }

        async fn send_group(&self, group_id: &str, text: &str, at_users: &[String]) -> Result<()> {
            if self.fail_target.as_deref() == Some(group_id) {
                return Err(SnapError::Transport("rejected".to_string()));
            }
            let rendered = crate::cq::format_at_message(at_users, text);
            self.sent.lock().expect("lock").push((
                MessageKind::Group,
                group_id.to_string(),
                rendered,
            ));
            Ok(())
        }
    }

    fn no_pause() -> SendPolicy {
        SendPolicy {
            min_send_interval_ms: 0,
        }
    }

    #[tokio::test]
    async fn test_batch_all_succeed() {
        let transport = RecordingTransport::new(None);
        let messages = vec![
            OutgoingMessage::private("1", "hello"),
            OutgoingMessage::group("g1", "meeting", vec!["1".to_string(), "2".to_string()]),
        ];

        let reports = send_batch(&transport, &messages, &no_pause()).await;
        assert_eq!(reports.len(), 2);
        assert!(reports.iter().all(|r| r.ok));
        assert_eq!(reports[0].index, 0);
        assert_eq!(reports[1].index, 1);

        let sent = transport.sent.lock().expect("lock");
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[1].2, "[CQ:at,qq=1] [CQ:at,qq=2] meeting");
    }

    #[tokio::test]
    async fn test_batch_failure_does_not_stop_the_rest() {
        let transport = RecordingTransport::new(Some("2"));
        let messages = vec![
            OutgoingMessage::private("1", "a"),
            OutgoingMessage::private("2", "b"),
            OutgoingMessage::private("3", "c"),
        ];

        let reports = send_batch(&transport, &messages, &no_pause()).await;
        assert_eq!(reports.len(), 3);
        assert!(reports[0].ok);
        assert!(!reports[1].ok);
        assert!(reports[1].error.as_deref().unwrap_or("").contains("rejected"));
        assert!(reports[2].ok);

        let sent = transport.sent.lock().expect("lock");
        assert_eq!(sent.len(), 2);
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let transport = RecordingTransport::new(None);
        let reports = send_batch(&transport, &[], &SendPolicy::default()).await;
        assert!(reports.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_policy_paces_between_sends() {
        let transport = RecordingTransport::new(None);
        let messages = vec![
            OutgoingMessage::private("1", "a"),
            OutgoingMessage::private("2", "b"),
        ];
        let policy = SendPolicy {
            min_send_interval_ms: 500,
        };

        let started = tokio::time::Instant::now();
        let reports = send_batch(&transport, &messages, &policy).await;
        assert_eq!(reports.len(), 2);
        // One pause between two sends; virtual time advances through it.
        assert!(started.elapsed() >= Duration::from_millis(500));
    }
}

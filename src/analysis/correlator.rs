use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use rand::Rng;
use tokio::time::{sleep, Instant};

use crate::{
    analysis::transport::MessageTransport,
    error::{AnalysisError, TransportError},
    models::{AnalysisRequest, AnalysisResult, InboxMessage},
};

pub const DEFAULT_REQUEST_TEMPLATE: &str = "@{bot} analyze {target}";

const MIN_TARGET_LEN: usize = 32;

/// Timing of the WAITING state.
#[derive(Debug, Clone)]
pub struct PollPolicy {
    /// Sleep after sending, before the first poll
    pub settle_delay: Duration,
    pub poll_interval: Duration,
    /// Random extra wait of up to this much added to every poll interval
    pub jitter: Duration,
    /// Measured from the first poll
    pub timeout: Duration,
    /// How many of the newest thread messages are inspected per poll
    pub history_limit: usize,
}

impl Default for PollPolicy {
    fn default() -> Self {
        PollPolicy {
            settle_delay: Duration::from_secs(10),
            poll_interval: Duration::from_secs(2),
            jitter: Duration::from_millis(500),
            timeout: Duration::from_secs(60),
            history_limit: 5,
        }
    }
}

impl PollPolicy {
    fn sample_jitter(&self) -> Duration {
        let max = self.jitter.as_millis() as u64;
        if max == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(0..=max))
    }
}

/// How often the whole send+wait cycle is repeated.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 3,
            backoff: Duration::from_secs(5),
        }
    }
}

/// State for one correlation attempt. A message is a reply to the request
/// only when every predicate holds.
#[derive(Debug, Clone)]
pub struct CorrelationWindow {
    pub target: String,
    pub chat_id: i64,
    pub expected_sender: String,
    pub thread_id: Option<i32>,
    pub reply_to: i32,
    pub start: DateTime<Utc>,
    pub timeout: Duration,
    pub poll_interval: Duration,
}

impl CorrelationWindow {
    pub fn open(
        chat_id: i64,
        request: &AnalysisRequest,
        expected_sender: &str,
        poll: &PollPolicy,
    ) -> Self {
        CorrelationWindow {
            target: request.target.clone(),
            chat_id,
            expected_sender: normalize_username(expected_sender).to_string(),
            thread_id: request.thread_id,
            reply_to: request.message_id,
            start: request.sent_at,
            timeout: poll.timeout,
            poll_interval: poll.poll_interval,
        }
    }

    pub fn accepts(&self, message: &InboxMessage) -> bool {
        let from_expected_sender = message
            .sender
            .as_deref()
            .map(|sender| normalize_username(sender).eq_ignore_ascii_case(&self.expected_sender))
            .unwrap_or(false);

        from_expected_sender
            && message.chat_id == self.chat_id
            && (self.thread_id.is_none() || message.thread_id == self.thread_id)
            && message.reply_to == Some(self.reply_to)
            && message.timestamp >= self.start
    }
}

fn normalize_username(name: &str) -> &str {
    name.trim().trim_start_matches('@')
}

/// Shape check applied before anything is sent.
pub fn is_valid_target(target: &str) -> bool {
    target.len() >= MIN_TARGET_LEN && target.chars().all(|c| c.is_ascii_alphanumeric())
}

enum Attempt {
    Matched(String),
    TimedOut,
    Failed(TransportError),
}

/// Sends an analysis request to the upstream bot and waits for its reply.
///
/// SENDING → WAITING → MATCHED | TIMED_OUT | SEND_FAILED, repeated per the
/// retry policy. Every outcome is returned as an [`AnalysisResult`].
pub struct ReplyCorrelator<T: MessageTransport> {
    transport: Arc<T>,
    chat_id: i64,
    thread_id: Option<i32>,
    expected_sender: String,
    request_template: String,
    poll: PollPolicy,
    retry: RetryPolicy,
}

impl<T: MessageTransport> ReplyCorrelator<T> {
    pub fn new(
        transport: Arc<T>,
        chat_id: i64,
        thread_id: Option<i32>,
        expected_sender: &str,
    ) -> Self {
        ReplyCorrelator {
            transport,
            chat_id,
            thread_id,
            expected_sender: normalize_username(expected_sender).to_string(),
            request_template: DEFAULT_REQUEST_TEMPLATE.to_string(),
            poll: PollPolicy::default(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_request_template(mut self, template: &str) -> Self {
        self.request_template = template.to_string();
        self
    }

    pub fn with_poll_policy(mut self, poll: PollPolicy) -> Self {
        self.poll = poll;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn render_request(&self, target: &str) -> String {
        self.request_template
            .replace("{bot}", &self.expected_sender)
            .replace("{target}", target)
    }

    pub async fn analyze(&self, target: &str) -> AnalysisResult {
        if !is_valid_target(target) {
            warn!("Refusing to send malformed target: {}", target);
            return AnalysisResult::failed(target, AnalysisError::InvalidTarget(target.to_string()));
        }

        let attempts = self.retry.attempts();
        for attempt in 1..=attempts {
            let error = match self.attempt(target).await {
                Attempt::Matched(text) => {
                    info!("Reply matched for {} on attempt {}", target, attempt);
                    return AnalysisResult::success(target, text);
                }
                Attempt::TimedOut => AnalysisError::Timeout {
                    attempts: attempt,
                    timeout: self.poll.timeout,
                },
                Attempt::Failed(source) => AnalysisError::Transport {
                    attempts: attempt,
                    source,
                },
            };

            if attempt == attempts {
                warn!("Giving up on {}: {}", target, error);
                return match error {
                    AnalysisError::Timeout { .. } => AnalysisResult::pending(target, error),
                    _ => AnalysisResult::failed(target, error),
                };
            }

            info!(
                "Attempt {}/{} for {} failed ({}), retrying in {:?}",
                attempt, attempts, target, error, self.retry.backoff
            );
            sleep(self.retry.backoff).await;
        }

        // attempts() is never zero, the loop always returns
        AnalysisResult::pending(
            target,
            AnalysisError::Timeout {
                attempts,
                timeout: self.poll.timeout,
            },
        )
    }

    async fn attempt(&self, target: &str) -> Attempt {
        let text = self.render_request(target);
        let sent = match self.transport.send(self.chat_id, self.thread_id, &text).await {
            Ok(sent) => sent,
            Err(e) => {
                warn!("Failed to send analysis request for {}: {}", target, e);
                return Attempt::Failed(e);
            }
        };
        let request = AnalysisRequest {
            target: target.to_string(),
            message_id: sent.id,
            thread_id: self.thread_id,
            sent_at: sent.timestamp,
        };
        debug!(
            "Sent request {} for {} at {}",
            request.message_id, request.target, request.sent_at
        );

        let window = CorrelationWindow::open(self.chat_id, &request, &self.expected_sender, &self.poll);
        self.wait_for_reply(&window).await
    }

    async fn wait_for_reply(&self, window: &CorrelationWindow) -> Attempt {
        sleep(self.poll.settle_delay).await;
        let deadline = Instant::now() + window.timeout;

        loop {
            match self
                .transport
                .recent_messages(self.chat_id, self.thread_id, self.poll.history_limit)
                .await
            {
                Ok(messages) => {
                    if let Some(reply) = messages.iter().find(|m| window.accepts(m)) {
                        debug!("Message {} answers request {} for {}", reply.id, window.reply_to, window.target);
                        return Attempt::Matched(reply.text.clone());
                    }
                }
                Err(e) => {
                    warn!(
                        "Failed to read thread while waiting for reply to {} ({}): {}",
                        window.reply_to, window.target, e
                    );
                    return Attempt::Failed(e);
                }
            }

            if Instant::now() >= deadline {
                debug!("No reply for {} within {:?}", window.target, window.timeout);
                return Attempt::TimedOut;
            }
            sleep(window.poll_interval + self.poll.sample_jitter()).await;
        }
    }
}

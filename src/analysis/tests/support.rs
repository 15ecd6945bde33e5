use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use crate::{
    analysis::{
        correlator::{PollPolicy, ReplyCorrelator, RetryPolicy},
        transport::MessageTransport,
    },
    error::TransportError,
    models::{InboxMessage, SentMessage},
};

pub const CHAT: i64 = -1001234567890;
pub const THREAD: Option<i32> = Some(42);
pub const BOT: &str = "AgentScarlettBot";

type Responder =
    Box<dyn Fn(usize, &[SentMessage]) -> Result<Vec<InboxMessage>, TransportError> + Send + Sync>;

/// In-memory transport whose thread contents are produced by a closure of
/// (poll index, messages sent so far).
pub struct ScriptedTransport {
    sent: Mutex<Vec<(String, SentMessage)>>,
    next_id: AtomicI32,
    polls: AtomicUsize,
    failing_sends: AtomicUsize,
    thread_id: Option<i32>,
    responder: Responder,
}

impl ScriptedTransport {
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(usize, &[SentMessage]) -> Result<Vec<InboxMessage>, TransportError>
            + Send
            + Sync
            + 'static,
    {
        ScriptedTransport {
            sent: Mutex::new(Vec::new()),
            next_id: AtomicI32::new(100),
            polls: AtomicUsize::new(0),
            failing_sends: AtomicUsize::new(0),
            thread_id: THREAD,
            responder: Box::new(responder),
        }
    }

    /// A thread nobody ever answers in.
    pub fn silent() -> Self {
        Self::new(|_, _| Ok(Vec::new()))
    }

    /// The next `n` sends fail.
    pub fn fail_sends(self, n: usize) -> Self {
        self.failing_sends.store(n, Ordering::SeqCst);
        self
    }

    /// Requests are expected in this thread instead of `THREAD`.
    pub fn in_thread(mut self, thread_id: Option<i32>) -> Self {
        self.thread_id = thread_id;
        self
    }

    pub fn sent_texts(&self) -> Vec<String> {
        self.sent.lock().unwrap().iter().map(|(t, _)| t.clone()).collect()
    }

    pub fn send_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    pub fn poll_count(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MessageTransport for ScriptedTransport {
    async fn send(
        &self,
        chat_id: i64,
        thread_id: Option<i32>,
        text: &str,
    ) -> Result<SentMessage, TransportError> {
        assert_eq!(chat_id, CHAT);
        assert_eq!(thread_id, self.thread_id);

        let remaining = self.failing_sends.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failing_sends.store(remaining - 1, Ordering::SeqCst);
            return Err(TransportError::Send("flood wait".to_string()));
        }

        let sent = SentMessage {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            timestamp: Utc::now(),
        };
        self.sent.lock().unwrap().push((text.to_string(), sent));
        Ok(sent)
    }

    async fn recent_messages(
        &self,
        _chat_id: i64,
        _thread_id: Option<i32>,
        _limit: usize,
    ) -> Result<Vec<InboxMessage>, TransportError> {
        let poll = self.polls.fetch_add(1, Ordering::SeqCst);
        let sent: Vec<SentMessage> = self.sent.lock().unwrap().iter().map(|(_, s)| *s).collect();
        (self.responder)(poll, &sent)
    }
}

pub fn reply_to(sent: &SentMessage, sender: &str, text: &str) -> InboxMessage {
    InboxMessage {
        id: sent.id + 1000,
        chat_id: CHAT,
        thread_id: THREAD,
        sender: Some(sender.to_string()),
        text: text.to_string(),
        timestamp: sent.timestamp + chrono::Duration::seconds(1),
        reply_to: Some(sent.id),
    }
}

pub fn fast_poll() -> PollPolicy {
    PollPolicy {
        settle_delay: Duration::ZERO,
        poll_interval: Duration::from_millis(1),
        jitter: Duration::ZERO,
        timeout: Duration::from_millis(10),
        history_limit: 5,
    }
}

pub fn fast_retry(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        backoff: Duration::from_millis(1),
    }
}

pub fn correlator(transport: Arc<ScriptedTransport>, max_attempts: u32) -> ReplyCorrelator<ScriptedTransport> {
    ReplyCorrelator::new(transport, CHAT, THREAD, BOT)
        .with_poll_policy(fast_poll())
        .with_retry_policy(fast_retry(max_attempts))
}

pub fn address(seed: char) -> String {
    std::iter::repeat(seed).take(44).collect()
}

use serde::{Serialize, Deserialize};
use chrono::{DateTime, Utc};

use crate::error::AnalysisError;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub enum TweetType {
    Original,
    Reply,
    Retweet,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Tweet {
    pub internal_id: u64,
    pub twitter_id: Option<String>,
    pub text: String,
    // Action that produced the post, e.g. "COOKIE_THREAD"
    pub source: String,
    pub timestamp: DateTime<Utc>,
    pub tweet_type: TweetType,
    pub reply_to: Option<String>,
}

#[derive(Serialize, Deserialize, Default)]
pub struct Memory {
    pub tweets: Vec<Tweet>,
    pub next_id: u64,
    pub last_batch: Option<DateTime<Utc>>,
    pub debug_mode: bool,
    pub tweet_mode: bool
}

/// A message as seen in the analysis thread. Only the fields the
/// correlator matches on, independent of the messaging SDK.
#[derive(Debug, Clone, PartialEq)]
pub struct InboxMessage {
    pub id: i32,
    pub chat_id: i64,
    pub thread_id: Option<i32>,
    pub sender: Option<String>,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    pub reply_to: Option<i32>,
}

/// Platform acknowledgement of an outbound message.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SentMessage {
    pub id: i32,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub target: String,
    pub message_id: i32,
    pub thread_id: Option<i32>,
    pub sent_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisStatus {
    Success,
    Pending,
    Error,
}

#[derive(Debug, Clone)]
pub struct AnalysisResult {
    pub target: String,
    pub status: AnalysisStatus,
    pub response: Option<String>,
    pub error: Option<AnalysisError>,
}

impl AnalysisResult {
    pub fn success(target: &str, response: String) -> Self {
        AnalysisResult {
            target: target.to_string(),
            status: AnalysisStatus::Success,
            response: Some(response),
            error: None,
        }
    }

    pub fn pending(target: &str, error: AnalysisError) -> Self {
        AnalysisResult {
            target: target.to_string(),
            status: AnalysisStatus::Pending,
            response: None,
            error: Some(error),
        }
    }

    pub fn failed(target: &str, error: AnalysisError) -> Self {
        AnalysisResult {
            target: target.to_string(),
            status: AnalysisStatus::Error,
            response: None,
            error: Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == AnalysisStatus::Success
    }

    /// Text that stands for this result in an aggregate summary.
    pub fn summary_line(&self) -> String {
        match (&self.status, &self.response) {
            (AnalysisStatus::Success, Some(response)) => response.clone(),
            _ => format!("Failed to analyze {}", self.target),
        }
    }
}

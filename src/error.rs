//! Error values used inside the analysis pipeline.

use std::time::Duration;

use thiserror::Error;

/// Failures raised by a messaging transport
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// Sending the outbound request failed
    #[error("send failed: {0}")]
    Send(String),

    /// Reading the thread history failed
    #[error("poll failed: {0}")]
    Poll(String),
}

/// Why an analysis did not produce a reply
#[derive(Debug, Clone, Error)]
pub enum AnalysisError {
    /// Target failed the shape check, nothing was sent
    #[error("invalid target `{0}`: expected at least 32 alphanumeric characters")]
    InvalidTarget(String),

    /// Transport kept failing until the retry bound was hit
    #[error("transport failure after {attempts} attempt(s): {source}")]
    Transport {
        attempts: u32,
        #[source]
        source: TransportError,
    },

    /// No qualifying reply arrived in any attempt
    #[error("no response within {timeout:?} after {attempts} attempt(s)")]
    Timeout { attempts: u32, timeout: Duration },
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("a batch is already running")]
    AlreadyRunning,
}

#[derive(Debug, Error)]
pub enum ExtractorError {
    #[error("invalid address pattern: {0}")]
    Pattern(#[from] regex::Error),
}

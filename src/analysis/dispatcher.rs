use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use log::{info, warn};
use rand::Rng;
use tokio::time::sleep;

use crate::{
    analysis::{correlator::ReplyCorrelator, transport::MessageTransport},
    error::DispatchError,
    models::AnalysisResult,
};

/// Single-slot mutual exclusion for multi-step handlers.
#[derive(Debug, Default)]
pub struct RunGuard {
    running: AtomicBool,
}

/// Held while a batch runs; releases the guard on drop.
#[derive(Debug)]
pub struct RunPermit<'a> {
    guard: &'a RunGuard,
}

impl RunGuard {
    pub fn new() -> Self {
        RunGuard::default()
    }

    pub fn try_acquire(&self) -> Option<RunPermit<'_>> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RunPermit { guard: self })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

impl Drop for RunPermit<'_> {
    fn drop(&mut self) {
        self.guard.running.store(false, Ordering::Release);
    }
}

/// Randomized pause between consecutive requests. Never zero.
#[derive(Debug, Clone)]
pub struct DelayPolicy {
    min: Duration,
    max: Duration,
}

impl DelayPolicy {
    pub fn new(min: Duration, max: Duration) -> Self {
        let min = min.max(Duration::from_millis(1));
        let max = max.max(min);
        DelayPolicy { min, max }
    }

    pub fn from_secs(min: u64, max: u64) -> Self {
        Self::new(Duration::from_secs(min), Duration::from_secs(max))
    }

    pub fn bounds(&self) -> (Duration, Duration) {
        (self.min, self.max)
    }

    pub fn sample(&self) -> Duration {
        let min = self.min.as_millis() as u64;
        let max = self.max.as_millis() as u64;
        Duration::from_millis(rand::thread_rng().gen_range(min..=max))
    }
}

#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    pub results: Vec<AnalysisResult>,
}

impl BatchReport {
    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn successes(&self) -> impl Iterator<Item = &AnalysisResult> {
        self.results.iter().filter(|r| r.is_success())
    }

    pub fn failure_count(&self) -> usize {
        self.results.iter().filter(|r| !r.is_success()).count()
    }

    /// One entry per result, in input order.
    pub fn summary_lines(&self) -> Vec<String> {
        self.results.iter().map(AnalysisResult::summary_line).collect()
    }

    pub fn summary(&self) -> String {
        self.summary_lines().join("\n\n")
    }
}

/// Runs the correlator over a list of targets, one at a time.
///
/// Requests are never issued concurrently: the correlator matches on the
/// newest messages of a shared thread, so two outstanding requests could
/// claim the same reply.
pub struct SequentialDispatcher<T: MessageTransport> {
    correlator: ReplyCorrelator<T>,
    delay: DelayPolicy,
    guard: RunGuard,
}

impl<T: MessageTransport> SequentialDispatcher<T> {
    pub fn new(correlator: ReplyCorrelator<T>, delay: DelayPolicy) -> Self {
        SequentialDispatcher {
            correlator,
            delay,
            guard: RunGuard::new(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.guard.is_running()
    }

    /// Claims the guard for a multi-step handler. The guard stays held
    /// until the returned batch is dropped.
    pub fn begin(&self) -> Result<Batch<'_, T>, DispatchError> {
        match self.guard.try_acquire() {
            Some(permit) => Ok(Batch {
                dispatcher: self,
                _permit: permit,
            }),
            None => {
                info!("Batch already running, skipping...");
                Err(DispatchError::AlreadyRunning)
            }
        }
    }

    pub async fn run_batch(&self, targets: &[String]) -> Result<BatchReport, DispatchError> {
        let batch = self.begin()?;
        Ok(batch.analyze_all(targets).await)
    }
}

pub struct Batch<'a, T: MessageTransport> {
    dispatcher: &'a SequentialDispatcher<T>,
    _permit: RunPermit<'a>,
}

impl<T: MessageTransport> Batch<'_, T> {
    pub async fn analyze_one(&self, target: &str) -> AnalysisResult {
        self.dispatcher.correlator.analyze(target).await
    }

    pub async fn analyze_all(&self, targets: &[String]) -> BatchReport {
        let mut report = BatchReport {
            results: Vec::with_capacity(targets.len()),
        };

        for (i, target) in targets.iter().enumerate() {
            let result = self.analyze_one(target).await;
            if result.is_success() {
                info!("Analysis complete for {}", target);
            } else {
                warn!(
                    "Failed to analyze {}: {}",
                    target,
                    result
                        .error
                        .as_ref()
                        .map(|e| e.to_string())
                        .unwrap_or_else(|| "no response".to_string())
                );
            }
            report.results.push(result);

            if i + 1 < targets.len() {
                let delay = self.dispatcher.delay.sample();
                info!("Waiting {:.1}s before next request...", delay.as_secs_f64());
                sleep(delay).await;
            }
        }

        report
    }
}

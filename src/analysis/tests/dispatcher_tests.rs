use std::sync::Arc;
use std::time::Duration;

use super::support::{self, address, reply_to, ScriptedTransport, BOT};
use crate::{
    analysis::dispatcher::{DelayPolicy, RunGuard, SequentialDispatcher},
    error::DispatchError,
    models::AnalysisStatus,
};

fn dispatcher(transport: Arc<ScriptedTransport>, attempts: u32) -> SequentialDispatcher<ScriptedTransport> {
    SequentialDispatcher::new(
        support::correlator(transport, attempts),
        DelayPolicy::new(Duration::from_millis(1), Duration::from_millis(3)),
    )
}

#[tokio::test]
async fn test_one_result_per_target_in_order() {
    // Only the first request ever gets an answer.
    let transport = Arc::new(ScriptedTransport::new(|_, sent| {
        if sent.len() == 1 {
            Ok(vec![reply_to(&sent[0], BOT, "first report")])
        } else {
            Ok(Vec::new())
        }
    }));
    let dispatcher = dispatcher(transport.clone(), 1);
    let targets = vec![address('A'), "short".to_string(), address('B')];

    let report = dispatcher.run_batch(&targets).await.unwrap();

    assert_eq!(report.len(), targets.len());
    let order: Vec<&str> = report.results.iter().map(|r| r.target.as_str()).collect();
    assert_eq!(order, targets.iter().map(String::as_str).collect::<Vec<_>>());
    assert_eq!(report.results[0].status, AnalysisStatus::Success);
    assert_eq!(report.results[1].status, AnalysisStatus::Error);
    assert_eq!(report.results[2].status, AnalysisStatus::Pending);
    assert_eq!(report.failure_count(), 2);
    assert_eq!(transport.send_count(), 2);

    assert_eq!(
        report.summary_lines(),
        vec![
            "first report".to_string(),
            "Failed to analyze short".to_string(),
            format!("Failed to analyze {}", address('B')),
        ]
    );
}

#[tokio::test]
async fn test_empty_batch() {
    let transport = Arc::new(ScriptedTransport::silent());
    let dispatcher = dispatcher(transport.clone(), 1);

    let report = dispatcher.run_batch(&[]).await.unwrap();

    assert!(report.is_empty());
    assert_eq!(report.summary(), "");
    assert_eq!(transport.send_count(), 0);
}

#[tokio::test]
async fn test_batch_rejected_while_guard_held() {
    let transport = Arc::new(ScriptedTransport::silent());
    let dispatcher = dispatcher(transport.clone(), 1);
    let targets = vec![address('A'), address('B')];

    let held = dispatcher.begin().unwrap();
    assert!(dispatcher.is_running());

    let second = dispatcher.run_batch(&targets).await;
    assert!(matches!(second, Err(DispatchError::AlreadyRunning)));
    assert_eq!(transport.send_count(), 0);

    drop(held);
    assert!(!dispatcher.is_running());
    let report = dispatcher.run_batch(&targets).await.unwrap();
    assert_eq!(report.len(), 2);
    assert_eq!(transport.send_count(), 2);
}

#[tokio::test]
async fn test_overlapping_batches_only_one_runs() {
    let transport = Arc::new(ScriptedTransport::silent());
    let dispatcher = dispatcher(transport.clone(), 1);
    let targets = vec![address('A'), address('B')];

    let (first, second) = tokio::join!(dispatcher.run_batch(&targets), dispatcher.run_batch(&targets));

    assert!(first.is_ok());
    assert!(matches!(second, Err(DispatchError::AlreadyRunning)));
    assert_eq!(transport.send_count(), targets.len());
}

#[test]
fn test_guard_is_single_slot() {
    let guard = RunGuard::new();
    let permit = guard.try_acquire();
    assert!(permit.is_some());
    assert!(guard.try_acquire().is_none());
    drop(permit);
    assert!(guard.try_acquire().is_some());
}

#[test]
fn test_delay_is_positive_and_bounded() {
    let policy = DelayPolicy::new(Duration::from_millis(10), Duration::from_millis(30));
    for _ in 0..200 {
        let d = policy.sample();
        assert!(d >= Duration::from_millis(10) && d <= Duration::from_millis(30));
    }

    let zero = DelayPolicy::new(Duration::ZERO, Duration::ZERO);
    for _ in 0..50 {
        assert!(zero.sample() > Duration::ZERO);
    }

    let inverted = DelayPolicy::from_secs(5, 1);
    let (min, max) = inverted.bounds();
    assert_eq!(min, Duration::from_secs(5));
    assert_eq!(max, Duration::from_secs(5));
}

mod common;

use std::sync::atomic::Ordering;
use std::time::Duration;

use common::{
    extract_settings, init_logging, item_html, limits, walk_settings, FeedLog, ScriptedFeed,
    ScriptedLauncher,
};
use harvester_core::StopReason;
use harvester_engine::{
    ResilientRunner, RetrySettings, SessionController, SessionError, SessionFailureKind,
    SessionGuard, SqliteFeedStore, WalkReport,
};
use pretty_assertions::assert_eq;
use tokio_util::sync::CancellationToken;

fn items() -> Vec<String> {
    vec![
        item_html("a1", "one", "Jul 06, 2025, 10:00 AM"),
        item_html("a2", "two", "Jul 06, 2025, 09:00 AM"),
        item_html("a3", "three", "Jul 05, 2025, 10:00 AM"),
        item_html("a4", "four", "Jul 05, 2025, 09:00 AM"),
    ]
}

fn controller(launcher: ScriptedLauncher) -> SessionController {
    SessionController::new(
        Box::new(launcher),
        extract_settings(),
        walk_settings(limits(30, 2, 3)),
    )
    .with_seed(7)
}

fn retry(max_attempts: u32) -> RetrySettings {
    RetrySettings {
        max_attempts,
        retry_delay: Duration::ZERO,
    }
}

#[tokio::test]
async fn session_is_released_once_when_the_walk_fails_midway() {
    init_logging();
    let log = FeedLog::default();
    let feed_log = log.clone();
    let launcher = ScriptedLauncher::new(move |_| {
        Ok(ScriptedFeed::paged(items(), 2, 2)
            .failing_at(2)
            .with_log(feed_log.clone()))
    });
    let store = SqliteFeedStore::in_memory().await.unwrap();

    let err = controller(launcher)
        .harvest(&store, None, &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(err.kind, SessionFailureKind::Browser);
    assert_eq!(log.opened(), 1);
    assert_eq!(log.releases(), 1);
    // Records from the round before the failure are kept.
    assert_eq!(store.record_count().await.unwrap(), 2);
}

#[tokio::test]
async fn session_is_released_when_opening_the_feed_times_out() {
    init_logging();
    let log = FeedLog::default();
    let feed_log = log.clone();
    let launcher = ScriptedLauncher::new(move |_| {
        Ok(ScriptedFeed::fixed(items())
            .failing_open(SessionFailureKind::NavigationTimeout)
            .with_log(feed_log.clone()))
    });
    let store = SqliteFeedStore::in_memory().await.unwrap();

    let err = controller(launcher)
        .harvest(&store, None, &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(err.kind, SessionFailureKind::NavigationTimeout);
    assert_eq!(log.releases(), 1);
    assert_eq!(store.record_count().await.unwrap(), 0);
}

#[tokio::test]
async fn runner_retries_after_a_failed_session() {
    init_logging();
    let log = FeedLog::default();
    let feed_log = log.clone();
    let launcher = ScriptedLauncher::new(move |attempt| {
        if attempt == 1 {
            return Err(SessionError::new(
                SessionFailureKind::Launch,
                "browser binary missing",
            ));
        }
        Ok(ScriptedFeed::fixed(items()).with_log(feed_log.clone()))
    });
    let acquisitions = launcher.acquisitions.clone();
    let store = SqliteFeedStore::in_memory().await.unwrap();

    let report = ResilientRunner::new(controller(launcher), retry(3))
        .run(&store, None, &CancellationToken::new())
        .await;

    assert_eq!(acquisitions.load(Ordering::SeqCst), 2);
    assert_eq!(report.inserted.len(), 4);
    assert_eq!(report.stop_reason, Some(StopReason::Exhausted));
    assert_eq!(log.releases(), 1);
}

#[tokio::test]
async fn a_retry_after_a_midway_failure_reports_every_stored_record() {
    init_logging();
    let log = FeedLog::default();
    let feed_log = log.clone();
    let launcher = ScriptedLauncher::new(move |attempt| {
        let feed = ScriptedFeed::paged(items(), 2, 2).with_log(feed_log.clone());
        Ok(if attempt == 1 { feed.failing_at(2) } else { feed })
    });
    let store = SqliteFeedStore::in_memory().await.unwrap();

    let report = ResilientRunner::new(controller(launcher), retry(3))
        .run(&store, None, &CancellationToken::new())
        .await;

    let ids: Vec<_> = report
        .inserted
        .iter()
        .map(|record| record.external_id.as_str())
        .collect();
    assert_eq!(ids, vec!["a1", "a2", "a3", "a4"]);
    assert_eq!(report.stop_reason, Some(StopReason::Exhausted));
    assert_eq!(store.record_count().await.unwrap(), 4);
    assert_eq!(log.releases(), 2);
}

#[tokio::test]
async fn records_from_failed_attempts_survive_exhausted_retries() {
    init_logging();
    let launcher =
        ScriptedLauncher::new(|_| Ok(ScriptedFeed::paged(items(), 2, 2).failing_at(2)));
    let acquisitions = launcher.acquisitions.clone();
    let store = SqliteFeedStore::in_memory().await.unwrap();

    let report = ResilientRunner::new(controller(launcher), retry(3))
        .run(&store, None, &CancellationToken::new())
        .await;

    assert_eq!(acquisitions.load(Ordering::SeqCst), 3);
    let ids: Vec<_> = report
        .inserted
        .iter()
        .map(|record| record.external_id.as_str())
        .collect();
    assert_eq!(ids, vec!["a1", "a2"]);
    assert_eq!(report.stop_reason, None);
    assert_eq!(store.record_count().await.unwrap(), 2);
}

#[tokio::test]
async fn failed_session_leaves_its_records_in_the_report() {
    init_logging();
    let launcher = ScriptedLauncher::new(|_| Ok(ScriptedFeed::paged(items(), 2, 2).failing_at(2)));
    let store = SqliteFeedStore::in_memory().await.unwrap();
    let mut report = WalkReport::default();

    let err = controller(launcher)
        .harvest_into(&store, None, &CancellationToken::new(), &mut report)
        .await
        .unwrap_err();

    assert_eq!(err.kind, SessionFailureKind::Browser);
    assert_eq!(report.inserted.len(), 2);
    assert_eq!(report.iterations, 1);
    assert_eq!(report.stop_reason, None);
}

#[tokio::test]
async fn exhausted_retries_yield_an_empty_report() {
    init_logging();
    let launcher = ScriptedLauncher::new(|_| {
        Err(SessionError::new(SessionFailureKind::Launch, "no browser"))
    });
    let acquisitions = launcher.acquisitions.clone();
    let store = SqliteFeedStore::in_memory().await.unwrap();

    let report = ResilientRunner::new(controller(launcher), retry(3))
        .run(&store, None, &CancellationToken::new())
        .await;

    assert_eq!(acquisitions.load(Ordering::SeqCst), 3);
    assert!(report.is_empty());
    assert_eq!(report.stop_reason, None);
}

#[tokio::test]
async fn cancellation_stops_retrying() {
    init_logging();
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    let launcher = ScriptedLauncher::new(move |_| {
        trigger.cancel();
        Err(SessionError::new(SessionFailureKind::Launch, "no browser"))
    });
    let acquisitions = launcher.acquisitions.clone();
    let store = SqliteFeedStore::in_memory().await.unwrap();

    let runner = ResilientRunner::new(
        controller(launcher),
        RetrySettings {
            max_attempts: 5,
            retry_delay: Duration::from_secs(3600),
        },
    );
    let report = tokio::time::timeout(Duration::from_secs(5), runner.run(&store, None, &cancel))
        .await
        .expect("runner should not sleep through a cancellation");

    assert_eq!(acquisitions.load(Ordering::SeqCst), 1);
    assert!(report.is_empty());
}

#[tokio::test]
async fn dropped_guard_still_releases_its_session() {
    init_logging();
    let log = FeedLog::default();
    let guard = SessionGuard::new(Box::new(ScriptedFeed::fixed(items()).with_log(log.clone())));
    drop(guard);

    for _ in 0..10 {
        if log.releases() == 1 {
            break;
        }
        tokio::task::yield_now().await;
    }
    assert_eq!(log.releases(), 1);
}

#[tokio::test]
async fn explicit_release_happens_exactly_once() {
    init_logging();
    let log = FeedLog::default();
    let mut guard = SessionGuard::new(Box::new(ScriptedFeed::fixed(items()).with_log(log.clone())));
    assert!(guard.session_mut().is_ok());
    guard.release().await.unwrap();
    tokio::task::yield_now().await;
    assert_eq!(log.releases(), 1);
}

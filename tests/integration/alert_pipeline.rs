//! Integration tests for collection → evaluation → dedup → dispatch
//!
//! These tests verify that:
//! - A violated threshold becomes exactly one notification per window
//! - Concurrent identical candidates are dispatched once
//! - A failed delivery can be retried in the same window
//! - Minimum severities route alerts to the right channels

use std::sync::Arc;

use chrono::{Duration, Utc};
use futures::future::join_all;
use site_monitoring::{
    alerts::{
        AlertDeduplicator, AlertEvent, AlertPipeline, AlertWindow, ChannelOutcome, PipelineOutcome,
        Severity,
    },
    monitors::thresholds::evaluate_snapshot,
    store::{KeyedStore, MemoryStore},
};

use crate::helpers::{FakeSystem, RecordingChannel, TestBedBuilder, dispatcher, test_bed};

#[tokio::test]
async fn test_disk_over_threshold_alerts_once_per_window() {
    let bed = TestBedBuilder::new()
        .system(FakeSystem::with_disk(92.0))
        .build();
    let context = &bed.context;

    let snapshot = context.collector.collect().await;
    let events = evaluate_snapshot(&snapshot, &context.config.thresholds);
    assert_eq!(events.len(), 1, "{events:?}");
    assert_eq!(events[0].alert_type, "disk_usage");
    assert_eq!(events[0].severity, Severity::Warning);
    assert_eq!(events[0].context["path"], "/srv/site");

    let outcomes = context.pipeline.process_all(&events).await;
    assert!(!outcomes[0].is_suppressed());
    assert_eq!(bed.channel.sent_types(), vec!["disk_usage"]);

    // the next collection in the same window finds the claim
    let snapshot = context.collector.collect().await;
    let events = evaluate_snapshot(&snapshot, &context.config.thresholds);
    let outcomes = context.pipeline.process_all(&events).await;
    assert!(outcomes[0].is_suppressed());
    assert_eq!(bed.channel.sent().len(), 1);
}

#[tokio::test]
async fn test_disk_far_over_threshold_is_critical() {
    let bed = TestBedBuilder::new()
        .system(FakeSystem::with_disk(99.5))
        .build();

    let snapshot = bed.context.collector.collect().await;
    let events = evaluate_snapshot(&snapshot, &bed.context.config.thresholds);
    assert_eq!(events[0].severity, Severity::Critical);
}

#[tokio::test]
async fn test_healthy_snapshot_sends_nothing() {
    let bed = test_bed();

    let snapshot = bed.context.collector.collect().await;
    let events = evaluate_snapshot(&snapshot, &bed.context.config.thresholds);
    assert!(events.is_empty(), "{events:?}");
    assert_eq!(bed.channel.attempts(), 0);
}

#[tokio::test]
async fn test_concurrent_identical_candidates_dispatch_once() {
    let bed = test_bed();
    let event = AlertEvent::new("disk_usage", Severity::Warning, "Disk usage is 92.0%", Utc::now());

    let outcomes = join_all((0..8).map(|_| bed.context.pipeline.process(&event))).await;

    let dispatched = outcomes.iter().filter(|o| !o.is_suppressed()).count();
    assert_eq!(dispatched, 1);
    assert_eq!(bed.channel.sent().len(), 1);
}

#[tokio::test]
async fn test_concurrent_pipelines_sharing_a_store_dispatch_once() {
    // two processes, one shared store
    let store: Arc<dyn KeyedStore> = Arc::new(MemoryStore::new());
    let window = AlertWindow::new(std::time::Duration::from_secs(900), std::time::Duration::from_secs(60));
    let web = RecordingChannel::new("web");
    let worker = RecordingChannel::new("worker");
    let pipelines = [
        AlertPipeline::new(
            AlertDeduplicator::new(store.clone(), window),
            dispatcher(&[(web.clone(), None)]),
        ),
        AlertPipeline::new(
            AlertDeduplicator::new(store.clone(), window),
            dispatcher(&[(worker.clone(), None)]),
        ),
    ];
    let event = AlertEvent::new("high_error_rate", Severity::Critical, "50 errors", Utc::now());

    join_all(pipelines.iter().map(|pipeline| pipeline.process(&event))).await;

    assert_eq!(web.sent().len() + worker.sent().len(), 1);
}

#[tokio::test]
async fn test_failed_delivery_is_retried_in_the_same_window() {
    let bed = test_bed();
    let event = AlertEvent::new("cache_unavailable", Severity::Critical, "cache down", Utc::now());

    bed.channel.set_failing(true);
    let outcome = bed.context.pipeline.process(&event).await;
    let report = outcome.report().unwrap();
    assert!(report.all_failed());
    assert!(matches!(report.outcome("recording"), Some(ChannelOutcome::Error(_))));

    bed.channel.set_failing(false);
    let outcome = bed.context.pipeline.process(&event).await;
    assert!(!outcome.is_suppressed());
    assert_eq!(bed.channel.sent().len(), 1);
    assert_eq!(bed.channel.attempts(), 2);
}

#[tokio::test]
async fn test_next_window_alerts_again() {
    let bed = test_bed();
    let now = Utc::now();
    let event = AlertEvent::new("memory_usage", Severity::Warning, "Memory usage high", now);
    let later = AlertEvent::new(
        "memory_usage",
        Severity::Warning,
        "Memory usage high",
        now + Duration::minutes(15),
    );

    assert!(!bed.context.pipeline.process(&event).await.is_suppressed());
    assert!(!bed.context.pipeline.process(&later).await.is_suppressed());
    assert_eq!(bed.channel.sent().len(), 2);
}

#[tokio::test]
async fn test_min_severity_routes_alerts() {
    let store: Arc<dyn KeyedStore> = Arc::new(MemoryStore::new());
    let everything = RecordingChannel::new("everything");
    let pager = RecordingChannel::new("pager");
    let pipeline = AlertPipeline::new(
        AlertDeduplicator::new(
            store,
            AlertWindow::new(std::time::Duration::from_secs(900), std::time::Duration::ZERO),
        ),
        dispatcher(&[
            (everything.clone(), None),
            (pager.clone(), Some(Severity::Critical)),
        ]),
    );
    let now = Utc::now();

    pipeline
        .process(&AlertEvent::new("disk_usage", Severity::Warning, "disk", now))
        .await;
    pipeline
        .process(&AlertEvent::new("database_unavailable", Severity::Critical, "db", now))
        .await;

    assert_eq!(everything.sent_types(), vec!["disk_usage", "database_unavailable"]);
    assert_eq!(pager.sent_types(), vec!["database_unavailable"]);
}

#[tokio::test]
async fn test_alert_no_channel_accepts_keeps_window_open() {
    let store: Arc<dyn KeyedStore> = Arc::new(MemoryStore::new());
    let pager = RecordingChannel::new("pager");
    let pipeline = AlertPipeline::new(
        AlertDeduplicator::new(
            store.clone(),
            AlertWindow::new(std::time::Duration::from_secs(900), std::time::Duration::ZERO),
        ),
        dispatcher(&[(pager.clone(), Some(Severity::Critical))]),
    );

    let event = AlertEvent::new("disk_usage", Severity::Info, "disk", Utc::now());
    let outcome = pipeline.process(&event).await;

    let PipelineOutcome::Dispatched { key, report } = outcome else {
        panic!("expected a dispatch");
    };
    assert!(report.is_empty());
    assert!(store.get(&key).await.unwrap().is_none());
    assert!(pager.sent().is_empty());
}

#[tokio::test]
async fn test_warning_then_critical_in_same_window_reaches_pager() {
    let store: Arc<dyn KeyedStore> = Arc::new(MemoryStore::new());
    let pager = RecordingChannel::new("pager");
    let pipeline = AlertPipeline::new(
        AlertDeduplicator::new(
            store,
            AlertWindow::new(std::time::Duration::from_secs(900), std::time::Duration::ZERO),
        ),
        dispatcher(&[(pager.clone(), Some(Severity::Critical))]),
    );
    let now = Utc::now();

    let warning = pipeline
        .process(&AlertEvent::new("disk_usage", Severity::Warning, "disk at 92%", now))
        .await;
    let critical = pipeline
        .process(&AlertEvent::new("disk_usage", Severity::Critical, "disk at 99%", now))
        .await;
    let repeat = pipeline
        .process(&AlertEvent::new("disk_usage", Severity::Critical, "disk at 99%", now))
        .await;

    assert!(!warning.is_suppressed());
    assert!(!critical.is_suppressed());
    assert!(repeat.is_suppressed());
    assert_eq!(pager.sent_types(), vec!["disk_usage"]);
}

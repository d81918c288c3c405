//! Integration tests for probes and the health checker
//!
//! These tests verify that:
//! - One failing probe never hides the results of the others
//! - Slow and hanging probes land in the right tier
//! - The overall status is the worst component status

use std::time::Duration;

use site_monitoring::{
    HealthStatus,
    monitors::{Component, thresholds::evaluate_snapshot},
};

use crate::helpers::{FakeDatabase, FakeSystem, TestBedBuilder, test_bed};

#[tokio::test]
async fn test_database_failure_keeps_other_probes() {
    let bed = test_bed();
    bed.database.set_down(true);

    let snapshot = bed.context.collector.collect().await;
    assert_eq!(snapshot.database.error(), Some("connection refused"));
    assert!(snapshot.cache.is_ok());
    assert!(snapshot.disk.is_ok());
    assert!(snapshot.memory.is_ok());
    assert!(snapshot.queue.is_ok());

    let events = evaluate_snapshot(&snapshot, &bed.context.config.thresholds);
    let types: Vec<_> = events.iter().map(|e| e.alert_type.as_str()).collect();
    assert_eq!(types, vec!["database_unavailable"]);
}

#[tokio::test]
async fn test_snapshot_serializes_failed_probe_as_error() {
    let bed = test_bed();
    bed.database.set_down(true);

    let snapshot = bed.context.collector.collect().await;
    let value = serde_json::to_value(&snapshot).unwrap();

    assert_eq!(value["database"], serde_json::json!({ "error": "connection refused" }));
    assert_eq!(value["cache"]["driver"], "memory");
    assert_eq!(value["disk"]["path"], "/srv/site");
}

#[tokio::test]
async fn test_healthy_report() {
    let bed = test_bed();

    let report = bed.context.checker.check().await;

    assert_eq!(report.overall_status, HealthStatus::Healthy);
    assert_eq!(report.environment, "testing");
    let names: Vec<_> = report.checks.keys().map(String::as_str).collect();
    assert_eq!(names, vec!["cache", "database", "disk", "queue"]);
}

#[tokio::test]
async fn test_failed_database_makes_report_unhealthy() {
    let bed = test_bed();
    bed.database.set_down(true);

    let report = bed.context.checker.check().await;

    assert_eq!(report.overall_status, HealthStatus::Unhealthy);
    let database = &report.checks["database"];
    assert_eq!(database.status, HealthStatus::Unhealthy);
    assert!(database.message.contains("connection refused"), "{}", database.message);
    assert_eq!(report.checks["cache"].status, HealthStatus::Healthy);
}

#[tokio::test]
async fn test_disk_tiers() {
    for (used, expected) in [
        (50.0, HealthStatus::Healthy),
        (85.0, HealthStatus::Warning),
        (97.0, HealthStatus::Unhealthy),
    ] {
        let bed = TestBedBuilder::new()
            .system(FakeSystem::with_disk(used))
            .build();

        let check = bed.context.checker.check_component(Component::Disk).await;
        assert_eq!(check.status, expected, "disk at {used}%");
        assert_eq!(check.details["path"], "/srv/site");
    }
}

#[tokio::test]
async fn test_warning_component_makes_report_warning() {
    let bed = TestBedBuilder::new()
        .system(FakeSystem::with_disk(85.0))
        .build();

    let report = bed.context.checker.check().await;
    assert_eq!(report.overall_status, HealthStatus::Warning);
}

#[tokio::test(start_paused = true)]
async fn test_slow_database_is_warning() {
    let bed = TestBedBuilder::new()
        .database(FakeDatabase::slow(Duration::from_millis(300)))
        .config(|config| config.health.optional_components.clear())
        .build();

    let check = bed.context.checker.check_component(Component::Database).await;

    assert_eq!(check.status, HealthStatus::Warning);
    assert!(check.response_time_ms.unwrap() >= 300.0);
    assert!(check.message.contains("slowly"), "{}", check.message);
}

#[tokio::test(start_paused = true)]
async fn test_hanging_database_times_out() {
    let bed = TestBedBuilder::new()
        .database(FakeDatabase::slow(Duration::from_secs(30)))
        .config(|config| {
            config.health.optional_components.clear();
            config.health.probe_timeout_ms = 500;
        })
        .build();

    let report = bed.context.checker.check().await;

    let database = &report.checks["database"];
    assert_eq!(database.status, HealthStatus::Unhealthy);
    assert_eq!(database.details["error"], "probe timed out after 500ms");
    assert_eq!(report.checks["cache"].status, HealthStatus::Healthy);
}

#[tokio::test]
async fn test_queue_backlog_and_failed_jobs() {
    let bed = TestBedBuilder::new().queue(10, 0).build();
    let check = bed.context.checker.check_component(Component::Queue).await;
    assert_eq!(check.status, HealthStatus::Healthy);
    assert_eq!(check.details["pending"], 10);

    let bed = TestBedBuilder::new().queue(10, 3).build();
    let check = bed.context.checker.check_component(Component::Queue).await;
    assert_eq!(check.status, HealthStatus::Warning);
    assert_eq!(check.message, "Queue has 3 failed jobs");

    let bed = TestBedBuilder::new().queue(5000, 0).build();
    let check = bed.context.checker.check_component(Component::Queue).await;
    assert_eq!(check.status, HealthStatus::Unhealthy);
}

#[tokio::test]
async fn test_memory_check_uses_limit() {
    let bed = test_bed();

    // 128MB of 1024MB
    let check = bed.context.checker.check_component(Component::Memory).await;
    assert_eq!(check.status, HealthStatus::Healthy);
    assert_eq!(check.details["used_percent"], 12.5);
}

#[tokio::test]
async fn test_component_outside_configured_set_can_be_checked() {
    let bed = TestBedBuilder::new()
        .config(|config| config.health.optional_components.clear())
        .build();

    assert_eq!(
        bed.context.checker.components(),
        &[Component::Database, Component::Cache]
    );
    let check = bed.context.checker.check_component(Component::Disk).await;
    assert_eq!(check.name, "disk");
}

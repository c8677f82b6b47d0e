//! ---
//! vigil_section: "08-service-level-objectives"
//! vigil_subsection: "module"
//! vigil_type: "source"
//! vigil_scope: "code"
//! vigil_description: "Rolling-window SLO tracking and error-budget classification."
//! vigil_version: "v0.0.0-prealpha"
//! vigil_owner: "tbd"
//! ---
use std::sync::Arc;
use std::time::Duration;

use vigil_common::time::ManualClock;
use vigil_metrics::{encode_text, new_registry};
use vigil_slo::{SloDefinition, SloMetrics, SloStatus, SloThresholds, SloTracker};

fn scan_route() -> SloDefinition {
    SloDefinition::new("/api/scan", 0.995, Duration::from_secs(60)).unwrap()
}

#[test]
fn budget_burn_moves_route_through_statuses() {
    let clock = ManualClock::new();
    let thresholds = SloThresholds::new(0.3, 0.8).unwrap();
    let tracker = SloTracker::new(thresholds).with_clock(clock.shared());
    tracker.define_slo(scan_route());

    for _ in 0..999 {
        tracker.record_request("/api/scan", true).unwrap();
    }
    tracker.record_request("/api/scan", false).unwrap();
    let report = tracker.check_slo("/api/scan").unwrap();
    assert!((report.success_rate - 0.999).abs() < 1e-12);
    assert!((report.error_budget_remaining - 0.8).abs() < 1e-9);
    assert_eq!(report.status, SloStatus::Healthy);

    tracker.record_request("/api/scan", false).unwrap();
    let report = tracker.check_slo("/api/scan").unwrap();
    assert_eq!(report.total_requests, 1001);
    assert!((report.error_budget_remaining - 0.6).abs() < 0.01);
    assert_eq!(report.status, SloStatus::Warning);
}

#[test]
fn default_thresholds_keep_forty_percent_burn_healthy() {
    let tracker = SloTracker::default();
    tracker.define_slo(scan_route());
    for i in 0..1000 {
        tracker.record_request("/api/scan", i >= 2).unwrap();
    }
    let report = tracker.check_slo("/api/scan").unwrap();
    assert!((report.error_budget_remaining - 0.6).abs() < 1e-9);
    assert_eq!(report.status, SloStatus::Healthy);

    tracker.record_request("/api/scan", false).unwrap();
    let report = tracker.check_slo("/api/scan").unwrap();
    assert_eq!(report.status, SloStatus::Warning);
}

#[test]
fn concurrent_recorders_are_all_counted() {
    let tracker = Arc::new(SloTracker::default());
    tracker.define_slo(scan_route());

    let handles: Vec<_> = (0..8)
        .map(|worker| {
            let tracker = tracker.clone();
            std::thread::spawn(move || {
                for i in 0..250 {
                    tracker
                        .record_request("/api/scan", !(worker == 0 && i < 2))
                        .unwrap();
                    if i % 50 == 0 {
                        tracker.check_slo("/api/scan").unwrap();
                    }
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let report = tracker.check_slo("/api/scan").unwrap();
    assert_eq!(report.total_requests, 2000);
    assert_eq!(report.failed_requests, 2);
}

#[test]
fn checks_publish_gauges() {
    let registry = new_registry();
    let metrics = SloMetrics::new(registry.clone()).unwrap();
    let tracker = SloTracker::default().with_metrics(metrics);
    tracker.define_slo(scan_route());
    tracker.record_request("/api/scan", true).unwrap();
    tracker.record_request("/api/scan", false).unwrap();
    tracker.check_all_slos();

    let text = encode_text(&registry).unwrap();
    assert!(text.contains("vigil_slo_requests_total{outcome=\"failure\",route=\"/api/scan\"} 1"));
    assert!(text.contains("vigil_slo_success_rate{route=\"/api/scan\"} 0.5"));
    assert!(text.contains("vigil_slo_error_budget_remaining{route=\"/api/scan\"} 0"));
}

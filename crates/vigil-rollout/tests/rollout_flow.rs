//! ---
//! vigil_section: "09-staged-rollout"
//! vigil_subsection: "module"
//! vigil_type: "source"
//! vigil_scope: "code"
//! vigil_description: "Deterministic traffic split and rollout progression rule."
//! vigil_version: "v0.0.0-prealpha"
//! vigil_owner: "tbd"
//! ---
use std::time::Duration;

use vigil_common::config::RolloutConfig;
use vigil_rollout::{
    RolloutDecision, RolloutError, RolloutManager, RolloutMetrics, VersionChoice,
};

fn manager() -> RolloutManager {
    let config: RolloutConfig = toml::from_str(
        r#"
        rollback_error_rate = 0.02
        min_stage_duration_secs = 60
        min_stage_requests = 50

        [[stages]]
        label = "canary"
        traffic_percentage = 5

        [[stages]]
        label = "half"
        traffic_percentage = 50

        [[stages]]
        label = "full"
        traffic_percentage = 100
        "#,
    )
    .unwrap();
    config.validate().unwrap();
    RolloutManager::from_config(&config, None).unwrap()
}

#[test]
fn walks_the_ladder_to_completion() {
    let manager = manager();
    let mut stage = manager.stages().first().label.clone();
    let mut visited = vec![stage.clone()];
    loop {
        let percentage = manager.stages().get(&stage).unwrap().traffic_percentage;
        let snapshot = RolloutMetrics::new(stage.clone(), percentage)
            .with_requests(500, 5)
            .with_duration(Duration::from_secs(120));
        match manager.evaluate(&snapshot).unwrap() {
            RolloutDecision::Advance { next } => {
                stage = next;
                visited.push(stage.clone());
            }
            RolloutDecision::Complete => break,
            other => panic!("unexpected decision {other:?}"),
        }
    }
    assert_eq!(visited, vec!["canary", "half", "full"]);
}

#[test]
fn canary_with_elevated_errors_rolls_back() {
    let manager = manager();
    let snapshot = RolloutMetrics::new("canary", 5)
        .with_requests(100, 3)
        .with_duration(Duration::from_secs(5));
    assert_eq!(manager.evaluate(&snapshot).unwrap(), RolloutDecision::Rollback);
}

#[test]
fn canary_share_tracks_percentage() {
    let manager = manager();
    let new = (0..2_000)
        .filter(|i| {
            manager.assign("canary", &format!("req-{i}")).unwrap() == VersionChoice::New
        })
        .count();
    assert!((40..=160).contains(&new), "got {new} of 2000");
    assert_eq!(
        manager.assign("beta", "req-1"),
        Err(RolloutError::UnknownStage("beta".into()))
    );
}

#[test]
fn snapshot_decodes_from_aggregator_json() {
    let snapshot: RolloutMetrics = serde_json::from_str(
        r#"{"stage":"half","traffic_percentage":50,"total_requests":40,"failed_requests":0,"duration_ms":600000}"#,
    )
    .unwrap();
    assert_eq!(snapshot.duration, Duration::from_secs(600));
    assert_eq!(manager().evaluate(&snapshot).unwrap(), RolloutDecision::Hold);
}

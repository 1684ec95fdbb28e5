//! Load-shedding scenarios against the fully wired core.

mod common;

use std::collections::HashSet;

use microgrid_dr::audit::{EventKind, Severity};
use microgrid_dr::devices::DeviceState;
use microgrid_dr::error::PlanError;

use common::{device, harness};

#[tokio::test]
async fn two_devices_cover_the_target() {
    let h = harness([device("d1", 1500.0, 5), device("d2", 2000.0, 4)]);

    let result = h.services.shedder.shed(3.0).await.unwrap();

    assert!(result.success);
    assert_eq!(result.remaining_reduction_needed_kw, 0.0);
    let ids: Vec<&str> = result.shed_commands.iter().map(|c| c.device_id.as_str()).collect();
    assert_eq!(ids, ["d1", "d2"]);
    for id in ids {
        assert_eq!(h.directory.get(id).await.unwrap().current_state, DeviceState::Off);
    }
}

#[tokio::test]
async fn single_device_leaves_a_shortfall() {
    let h = harness([device("d1", 1000.0, 5)]);

    let result = h.services.shedder.shed(2.0).await.unwrap();

    assert!(!result.success);
    assert_eq!(result.remaining_reduction_needed_kw, 1.0);
    assert_eq!(result.shed_commands.len(), 1);
    assert_eq!(result.shed_commands[0].device_id, "d1");
    assert_eq!(result.shed_commands[0].expected_reduction_watts, 1000.0);
}

#[tokio::test]
async fn critical_load_is_never_touched() {
    let h = harness([device("critical", 5000.0, 1), device("noncritical", 1000.0, 5)]);

    let result = h.services.shedder.shed(2.0).await.unwrap();

    assert!(!result.success);
    assert_eq!(result.remaining_reduction_needed_kw, 1.0);
    assert_eq!(result.shed_commands.len(), 1);
    assert_eq!(result.shed_commands[0].device_id, "noncritical");
    assert_eq!(
        h.directory.get("critical").await.unwrap().current_state,
        DeviceState::On
    );
}

#[tokio::test]
async fn shortfall_equals_target_minus_sheddable_capacity() {
    // levels 3..=5 are sheddable, 1 and 2 are not
    let fleet = || {
        [
            device("a", 400.0, 5),
            device("b", 600.0, 4),
            device("c", 1000.0, 3),
            device("d", 9000.0, 2),
            device("e", 9000.0, 1),
        ]
    };
    let capacity_kw = 2.0;

    for target in [0.5, 1.0, 2.0] {
        let h = harness(fleet());
        let result = h.services.shedder.shed(target).await.unwrap();
        assert!(result.success, "target {target} should be covered");
        assert_eq!(result.remaining_reduction_needed_kw, 0.0);
    }

    for target in [2.5, 7.0] {
        let h = harness(fleet());
        let result = h.services.shedder.shed(target).await.unwrap();
        assert!(!result.success, "target {target} exceeds capacity");
        assert!((result.remaining_reduction_needed_kw - (target - capacity_kw)).abs() < 1e-9);
        assert!(result.shed_commands.iter().all(|c| c.priority >= 3));
    }
}

#[tokio::test]
async fn target_equal_to_capacity_is_met_exactly() {
    for (ratings, target) in [
        (vec![100.0, 1915.0], 2.015),
        (vec![100.0, 200.0], 0.3),
        (vec![333.0, 333.0, 334.0], 1.0),
        (vec![700.0, 110.0], 0.81),
    ] {
        let fleet: Vec<_> = ratings
            .iter()
            .enumerate()
            .map(|(i, w)| device(&format!("d{i}"), *w, 5))
            .collect();
        let h = harness(fleet);

        let result = h.services.shedder.shed(target).await.unwrap();

        assert!(result.success, "target {target} should be covered by {ratings:?}");
        assert_eq!(result.remaining_reduction_needed_kw, 0.0);
        assert_eq!(result.shed_commands.len(), ratings.len());
    }
}

#[tokio::test]
async fn off_and_uncontrollable_devices_are_ignored() {
    let h = harness([
        device("off", 800.0, 5).with_state(DeviceState::Off),
        device("manual", 800.0, 5).with_controllable(false),
        device("standby", 800.0, 5).with_state(DeviceState::Standby),
        device("live", 300.0, 4),
    ]);

    let result = h.services.shedder.shed(1.0).await.unwrap();

    let ids: Vec<&str> = result.shed_commands.iter().map(|c| c.device_id.as_str()).collect();
    assert_eq!(ids, ["live"]);
    assert!((result.remaining_reduction_needed_kw - 0.7).abs() < 1e-9);
}

#[tokio::test]
async fn second_pass_finds_nothing_left() {
    let h = harness([device("d1", 1500.0, 5)]);

    h.services.shedder.shed(1.0).await.unwrap();
    let again = h.services.shedder.shed(1.0).await.unwrap();

    assert!(again.shed_commands.is_empty());
    assert!(!again.success);
    assert_eq!(again.remaining_reduction_needed_kw, 1.0);
}

#[tokio::test]
async fn non_positive_target_is_rejected_without_side_effects() {
    let h = harness([device("d1", 1500.0, 5)]);

    for target in [0.0, -3.0, f64::NAN] {
        let err = h.services.shedder.shed(target).await.unwrap_err();
        assert!(matches!(err, PlanError::InvalidTarget(_)));
    }
    assert_eq!(h.directory.get("d1").await.unwrap().current_state, DeviceState::On);
    assert!(h.log.is_empty().await);
}

#[tokio::test]
async fn every_pass_leaves_one_summary_event() {
    let h = harness([device("d1", 1500.0, 5), device("d2", 2000.0, 4)]);

    h.services.shedder.shed(3.0).await.unwrap();

    let events = h.log.snapshot().await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].device_id, "system");
    assert_eq!(events[0].event_type, EventKind::LoadShed);
    assert_eq!(events[0].severity, Severity::Info);
    assert_eq!(
        events[0].message,
        "Load shedding initiated. Target: 3kW, Actual: 3.5kW, Devices affected: d1, d2"
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_passes_never_shed_a_device_twice() {
    let fleet: Vec<_> = (0..40)
        .map(|i| device(&format!("dev-{i:02}"), 250.0, 3 + (i % 3) as u8))
        .collect();
    let h = harness(fleet);

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let services = h.services.clone();
        tasks.push(tokio::spawn(async move { services.shedder.shed(2.0).await }));
    }

    let mut seen = HashSet::new();
    let mut total = 0;
    for task in tasks {
        let result = task.await.unwrap().unwrap();
        for cmd in result.shed_commands {
            assert!(seen.insert(cmd.device_id.clone()), "{} shed twice", cmd.device_id);
            total += 1;
        }
    }

    // demand (8 passes x 8 devices) exceeds the fleet, so every device goes
    assert_eq!(total, 40);
    for id in &seen {
        assert_eq!(h.directory.get(id).await.unwrap().current_state, DeviceState::Off);
    }
}

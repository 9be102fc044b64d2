//! # Redo Drain and Record Maintenance Tests

#![allow(clippy::unwrap_used, clippy::panic)]

mod common;

use common::{fake_manager, publish_default, records};
use erepo_core::RedoSummary;
use serde_json::json;

#[test]
fn drain_without_engine_is_empty() {
    let (manager, _backend, _dir, _target) = fake_manager();

    assert_eq!(manager.drain_redos(true), RedoSummary::default());
}

#[test]
fn empty_queue_returns_immediately() {
    let (manager, _backend, _dir, target) = fake_manager();
    manager.ensure_fully_ready(&target).expect("full");

    let summary = manager.drain_redos(true);

    assert_eq!(summary.initial_pending, 0);
    assert_eq!(summary.processed, 0);
    assert!(summary.converged);
}

#[test]
fn pending_items_are_all_processed() {
    let (manager, backend, _dir, target) = fake_manager();
    manager.ensure_fully_ready(&target).expect("full");
    backend
        .state()
        .redo
        .extend(["a", "b", "c"].map(String::from));

    let summary = manager.drain_redos(true);

    assert_eq!(summary.initial_pending, 3);
    assert_eq!(summary.processed, 3);
    assert_eq!(summary.succeeded, 3);
    assert!(summary.converged);
    assert!(backend.state().redo.is_empty());
}

#[test]
fn non_converging_queue_gives_up_after_bound() {
    let (manager, backend, _dir, target) = fake_manager();
    manager.ensure_fully_ready(&target).expect("full");
    {
        let mut state = backend.state();
        state.sticky_redo = true;
        state.redo.extend(["a", "b"].map(String::from));
    }

    let summary = manager.drain_redos(true);

    assert_eq!(summary.initial_pending, 2);
    assert_eq!(summary.processed, 10);
    assert!(!summary.converged);
}

#[test]
fn fetch_failures_are_counted() {
    let (manager, backend, _dir, target) = fake_manager();
    manager.ensure_fully_ready(&target).expect("full");
    {
        let mut state = backend.state();
        state.fail_redo_fetch = true;
        state.redo.push_back("stuck".to_string());
    }

    let summary = manager.drain_redos(true);

    assert_eq!(summary.fetch_failed, 5);
    assert_eq!(summary.succeeded, 0);
    assert!(!summary.converged);
}

#[test]
fn delete_and_reevaluate_report_missing_records() {
    let (manager, backend, _dir, target) = fake_manager();
    publish_default(&backend, &["TEST"]);
    manager
        .load_records(
            &target,
            records(vec![json!({"RECORD_ID": "1", "DATA_SOURCE": "TEST"})]),
            None,
            true,
        )
        .expect("load");

    assert!(manager.reevaluate_record(&target, "TEST", "1", true).expect("reevaluate"));
    assert!(manager.delete_record(&target, "TEST", "1", true).expect("delete"));
    assert!(!manager.delete_record(&target, "TEST", "1", true).expect("delete again"));
    assert!(!manager.reevaluate_record(&target, "TEST", "1", true).expect("reevaluate gone"));
}

#[test]
fn entity_lookup_parses_engine_response() {
    let (manager, backend, _dir, target) = fake_manager();
    publish_default(&backend, &["TEST"]);
    manager
        .load_records(
            &target,
            records(vec![json!({"RECORD_ID": "9", "DATA_SOURCE": "TEST"})]),
            None,
            true,
        )
        .expect("load");

    let entity = manager.entity_by_record(&target, "TEST", "9").expect("entity");
    assert_eq!(entity["RECORD_ID"], json!("9"));

    let err = manager
        .entity_by_record(&target, "TEST", "missing")
        .expect_err("unknown");
    assert_eq!(err.native_code(), Some(common::UNKNOWN_RECORD));
}

#[test]
fn purge_goes_through_diagnostics() {
    let (manager, backend, _dir, target) = fake_manager();

    manager.purge_repository(&target).expect("purge");

    assert_eq!(backend.state().purges, 1);
}

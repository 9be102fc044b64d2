//! # Data Source Reconciliation Tests

#![allow(clippy::unwrap_used, clippy::panic)]

mod common;

use common::{fake_manager, publish_default};
use erepo_core::{ConfigId, RepoError};

#[test]
fn nothing_missing_is_a_no_op() {
    let (manager, backend, _dir, target) = fake_manager();
    publish_default(&backend, &["TEST", "CUSTOMERS"]);

    let (id, _) = manager
        .ensure_data_sources(&target, ["CUSTOMERS"], true)
        .expect("reconcile");

    assert_eq!(id, ConfigId(1));
    let state = backend.state();
    assert_eq!(state.registrations, 0);
    assert_eq!(state.default_updates, 0);
    assert_eq!(state.inits("engine"), 1);
    assert!(state.handles.is_empty());
}

#[test]
fn missing_codes_are_published_once_and_engine_restarted() {
    let (manager, backend, _dir, target) = fake_manager();
    publish_default(&backend, &["TEST"]);

    let (id, document) = manager
        .ensure_data_sources(&target, ["CUSTOMERS", "WATCHLIST", "TEST"], true)
        .expect("reconcile");

    assert_eq!(id, ConfigId(2));
    assert!(document.contains("CUSTOMERS"));
    assert!(document.contains("WATCHLIST"));

    let state = backend.state();
    assert_eq!(state.registrations, 1);
    assert_eq!(state.default_config, Some(2));
    assert_eq!(state.inits("engine"), 2);
    assert_eq!(state.destroys("engine"), 1);
    assert_eq!(state.inits("config"), 1);
    assert!(state.handles.is_empty());
}

#[test]
fn reconciling_twice_registers_once() {
    let (manager, backend, _dir, target) = fake_manager();
    publish_default(&backend, &["TEST"]);

    let first = manager
        .ensure_data_sources(&target, ["CUSTOMERS"], true)
        .expect("first");
    let second = manager
        .ensure_data_sources(&target, ["CUSTOMERS"], true)
        .expect("second");

    assert_eq!(first, second);
    assert_eq!(backend.state().registrations, 1);
}

#[test]
fn blank_codes_are_ignored() {
    let (manager, backend, _dir, target) = fake_manager();
    publish_default(&backend, &["TEST"]);

    manager
        .ensure_data_sources(&target, ["", "  "], true)
        .expect("reconcile");

    assert_eq!(backend.state().registrations, 0);
}

#[test]
fn without_a_default_a_configuration_is_published() {
    let (manager, backend, _dir, target) = fake_manager();

    let (id, document) = manager
        .ensure_data_sources(&target, Vec::<String>::new(), true)
        .expect("reconcile");

    assert_eq!(id, ConfigId(1));
    assert!(document.contains("TEST"));
    assert_eq!(backend.state().default_config, Some(1));
}

#[test]
fn unreadable_default_leaves_no_open_handle() {
    let (manager, backend, _dir, target) = fake_manager();
    publish_default(&backend, &["TEST"]);
    let config_id = backend.state().default_config.expect("default");
    backend
        .state()
        .configs
        .insert(config_id, "not json".to_string());

    let err = manager
        .ensure_data_sources(&target, ["CUSTOMERS"], true)
        .expect_err("bad document");

    assert!(matches!(err, RepoError::Native { operation: "load_config", .. }));
    let state = backend.state();
    assert_eq!(state.registrations, 0);
    assert!(state.handles.is_empty());
}

#[test]
fn registered_sources_and_default_config_read_the_catalog() {
    let (manager, backend, _dir, target) = fake_manager();

    assert!(manager.default_config(&target).expect("default").is_none());
    assert!(manager
        .registered_data_sources(&target)
        .expect("sources")
        .is_empty());

    publish_default(&backend, &["TEST", "CUSTOMERS"]);
    let codes = manager.registered_data_sources(&target).expect("sources");
    assert!(codes.contains("CUSTOMERS"));
    assert_eq!(
        manager.default_config(&target).expect("default").map(|(id, _)| id),
        Some(ConfigId(1))
    );
    assert!(backend.state().handles.is_empty());
}

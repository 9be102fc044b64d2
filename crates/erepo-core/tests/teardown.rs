//! # Repository Teardown Tests
//!
//! These tests change `EREPO_PRESERVE_REPOSITORY`, so they live in their own
//! binary and hold `ENV_MUTEX` for their whole duration.

#![allow(clippy::unwrap_used, clippy::panic)]

mod common;

use common::fake_manager;
use erepo_core::TierStatus;
use erepo_core::primitives::PRESERVE_REPOSITORY_ENV;
use std::sync::{Mutex, MutexGuard};

/// Serializes tests that modify the process environment.
static ENV_MUTEX: Mutex<()> = Mutex::new(());

/// Holds the mutex and clears the variable on drop.
struct EnvGuard {
    _guard: MutexGuard<'static, ()>,
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        // SAFETY: Tests run sequentially under ENV_MUTEX, so no concurrent env access.
        unsafe { std::env::remove_var(PRESERVE_REPOSITORY_ENV) };
    }
}

fn preserve(value: Option<&str>) -> EnvGuard {
    let guard = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    // SAFETY: Tests run sequentially under ENV_MUTEX, so no concurrent env access.
    unsafe {
        match value {
            Some(value) => std::env::set_var(PRESERVE_REPOSITORY_ENV, value),
            None => std::env::remove_var(PRESERVE_REPOSITORY_ENV),
        }
    }
    EnvGuard { _guard: guard }
}

#[test]
fn preserved_repository_survives_destroy_but_releases_tiers() {
    let _env = preserve(Some("yes"));
    let (manager, backend, dir, target) = fake_manager();
    manager.ensure_fully_ready(&target).expect("full");

    assert!(!manager.destroy_repository(dir.path()).expect("destroy"));

    assert!(dir.path().is_dir());
    assert_eq!(manager.tier_status(), TierStatus::default());
    let state = backend.state();
    for surface in ["config", "catalog", "engine", "diagnostics"] {
        assert_eq!(state.destroys(surface), 1, "{surface}");
    }
}

#[test]
fn falsy_preserve_value_still_removes_the_directory() {
    let _env = preserve(Some("0"));
    let (manager, _backend, dir, target) = fake_manager();
    manager.ensure_fully_ready(&target).expect("full");

    assert!(manager.destroy_repository(dir.path()).expect("destroy"));
    assert!(!dir.path().exists());
    assert_eq!(manager.tier_status(), TierStatus::default());
}

#[test]
fn unset_preserve_removes_the_directory() {
    let _env = preserve(None);
    let (manager, _backend, dir, _target) = fake_manager();

    assert!(manager.destroy_repository(dir.path()).expect("destroy"));
    assert!(!dir.path().exists());
}

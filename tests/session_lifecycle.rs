//! Integration tests for the session manager
//!
//! These tests verify the session manager correctly:
//! - Keeps at most one session open
//! - Validates indices, timeouts and read budgets
//! - Leaves the previous timeout in place on a rejected change
//! - Produces the same catalog on repeated discovery

use std::time::Duration;

use scpi_ctl::catalog::ResourceCatalog;
use scpi_ctl::constants::limits;
use scpi_ctl::session::{SessionConfig, SessionManager};
use scpi_ctl::simulated::{SimulatedAnalyzer, IDENTITY, STATUS_RESOURCE_NOT_FOUND};
use scpi_ctl::types::ResourceDescriptor;
use scpi_ctl::Error;

fn manager() -> SessionManager<SimulatedAnalyzer> {
    SessionManager::discover(SimulatedAnalyzer::new(), SessionConfig::default())
        .expect("discovery against the simulator")
}

/// Test that open followed by close leaves no active session, for every index
#[test]
fn test_open_close_every_index() {
    let mut manager = manager();

    for index in 0..manager.catalog().len() {
        assert_eq!(manager.open(index).unwrap().identity(), Some(IDENTITY));
        assert_eq!(manager.active_index(), Some(index));

        manager.close();
        assert_eq!(manager.active_index(), None);
        assert_eq!(manager.transport().open_sessions(), 0);
    }
}

/// Test that switching resources closes the previous session first
#[test]
fn test_switching_never_holds_two_sessions() {
    let mut analyzer = SimulatedAnalyzer::new();
    let catalog = ResourceCatalog::discover(&mut analyzer).unwrap();
    let mut manager = SessionManager::new(analyzer, catalog, SessionConfig::default());

    manager.open(0).unwrap();
    manager.open(1).unwrap();
    manager.open(2).unwrap();
    manager.open(2).unwrap();

    assert_eq!(manager.active_index(), Some(2));
    assert_eq!(manager.transport().open_sessions(), 1);
    assert_eq!(manager.transport().max_open_sessions(), 1);
}

/// Test that every timeout inside the bounds is accepted and retrievable
#[test]
fn test_timeout_within_bounds() {
    let mut manager = manager();
    manager.open(0).unwrap();

    for ms in [limits::TIMEOUT_MIN_MS, 2000, 12_345, limits::TIMEOUT_MAX_MS] {
        manager.set_timeout(ms).unwrap();
        assert_eq!(manager.timeout_ms(), Some(ms));
        assert_eq!(
            manager.transport().applied_timeout(),
            Some(Duration::from_millis(u64::from(ms)))
        );
    }
}

/// Test that a rejected timeout leaves the previous one unchanged
#[test]
fn test_timeout_outside_bounds() {
    let mut manager = manager();
    manager.open(0).unwrap();
    manager.set_timeout(5000).unwrap();

    for ms in [0, 999, 25_001, u32::MAX] {
        let err = manager.set_timeout(ms).unwrap_err();
        assert!(matches!(err, Error::Validation { min: 1000, max: 25000, .. }));
        assert_eq!(manager.timeout_ms(), Some(5000));
    }
    assert_eq!(
        manager.transport().applied_timeout(),
        Some(Duration::from_millis(5000))
    );
}

/// Test that a timeout needs an open session
#[test]
fn test_timeout_without_session() {
    let mut manager = manager();
    assert!(matches!(manager.set_timeout(2000), Err(Error::NoActiveSession)));
}

/// Test that a resource refusing to open is a session error and leaves nothing open
#[test]
fn test_open_failure_is_session_error() {
    let analyzer = SimulatedAnalyzer::new();
    let catalog = ResourceCatalog::from_resources(vec![
        ResourceDescriptor::new("USB0::0x2A8D::0x1B0B::SIM0001::INSTR"),
        ResourceDescriptor::new("GPIB0::99::INSTR"),
    ]);
    let mut manager = SessionManager::new(analyzer, catalog, SessionConfig::default());

    manager.open(0).unwrap();
    let err = manager.open(1).unwrap_err();

    assert!(matches!(err, Error::Session { operation: "open", .. }));
    assert_eq!(err.status_code(), Some(STATUS_RESOURCE_NOT_FOUND));
    assert_eq!(manager.active_index(), None);
    assert_eq!(manager.transport().open_sessions(), 0);
}

/// Test that out-of-range indices are rejected
#[test]
fn test_open_rejects_bad_index() {
    let mut manager = manager();
    assert!(matches!(
        manager.open(7),
        Err(Error::Validation { value: 7, min: 0, max: 2 })
    ));
    assert_eq!(manager.active_index(), None);
}

/// Test that discovery twice yields the same catalog
#[test]
fn test_discovery_is_idempotent() {
    let mut analyzer = SimulatedAnalyzer::new().with_unreachable("ASRL9::INSTR");

    let first = ResourceCatalog::discover(&mut analyzer).unwrap();
    let second = ResourceCatalog::discover(&mut analyzer).unwrap();

    assert_eq!(first.len(), second.len());
    assert_eq!(first, second);
}

/// Test that the configured defaults reach a new session
#[test]
fn test_configured_defaults() {
    let config = SessionConfig {
        default_timeout_ms: 7000,
        default_read_bytes: 16,
        ..SessionConfig::default()
    };
    let mut manager = SessionManager::discover(SimulatedAnalyzer::new(), config).unwrap();

    // identification reads only the first 16 bytes; the session still opens
    let identification = manager.open(0).unwrap();
    assert_eq!(identification.identity(), Some(&IDENTITY[..16]));
    assert_eq!(manager.timeout_ms(), Some(7000));
    assert_eq!(manager.read_budget(), Some(16));
}

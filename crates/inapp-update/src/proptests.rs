//! Property-based tests for inapp-update.
//!
//! # Properties Tested
//!
//! - Status lookup by id is total
//! - Install states reach the observer filtered and in order
//! - Mode resolution never widens an immediate request
//! - Snapshot status follows the latest install state

#![cfg(test)]

use std::sync::Arc;

use proptest::prelude::*;

use crate::config::UpdateConfig;
use crate::harness::{FakeUpdateOracle, RecordingObserver};
use crate::session::UpdateSession;
use crate::status::{
    AllowedModes, AppUpdateInfo, InstallState, InstallStatus, StatusSnapshot, UpdateMode,
    UpdateStatus,
};

// =============================================================================
// Generators
// =============================================================================

/// Any install status, including codes this crate does not know.
fn arb_install_status() -> impl Strategy<Value = InstallStatus> {
    prop_oneof![
        Just(InstallStatus::Unknown),
        Just(InstallStatus::Pending),
        Just(InstallStatus::Downloading),
        Just(InstallStatus::Installing),
        Just(InstallStatus::Installed),
        Just(InstallStatus::Failed),
        Just(InstallStatus::Canceled),
        Just(InstallStatus::Downloaded),
        (12i32..1000).prop_map(InstallStatus::Other),
    ]
}

fn arb_mode() -> impl Strategy<Value = UpdateMode> {
    prop_oneof![Just(UpdateMode::Flexible), Just(UpdateMode::Immediate)]
}

fn arb_allowed_modes() -> impl Strategy<Value = AllowedModes> {
    (any::<bool>(), any::<bool>()).prop_map(|(flexible, immediate)| AllowedModes {
        flexible,
        immediate,
    })
}

// =============================================================================
// Status ids
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    /// Every integer maps to some status; only known ids map to a non-Unknown one.
    #[test]
    fn prop_status_from_id_total(id in any::<i32>()) {
        let status = UpdateStatus::from_id(id);
        if UpdateStatus::ALL.iter().any(|s| s.id() == id) {
            prop_assert_eq!(status.id(), id);
        } else {
            prop_assert_eq!(status, UpdateStatus::Unknown);
        }
    }

    /// Install status codes survive a trip through their numeric form.
    #[test]
    fn prop_install_status_code_stable(status in arb_install_status()) {
        prop_assert_eq!(InstallStatus::from_code(status.code()), status);
    }
}

// =============================================================================
// Install-state forwarding
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// The observer sees exactly the meaningful subsequence of pushed states,
    /// once each, in push order.
    #[test]
    fn prop_forwarded_statuses_preserve_order(
        pushes in prop::collection::vec(arb_install_status(), 0..40)
    ) {
        let oracle = Arc::new(FakeUpdateOracle::new(AppUpdateInfo::not_available()));
        let observer = Arc::new(RecordingObserver::new());
        let config = UpdateConfig::builder().check_on_create(false).build();
        let mut session = UpdateSession::new(config, oracle.clone())
            .with_observer(observer.clone());
        session.attach();

        for status in &pushes {
            oracle.push_install_state(InstallState::new(*status));
        }
        prop_assert_eq!(session.process_pending(), pushes.len());

        let expected: Vec<UpdateStatus> = pushes
            .iter()
            .filter_map(|s| UpdateStatus::from_install_status(*s))
            .collect();
        prop_assert_eq!(observer.statuses(), expected);
    }

    /// Snapshot status follows the most recent push, not an earlier one.
    #[test]
    fn prop_snapshot_follows_latest_push(
        pushes in prop::collection::vec(arb_install_status(), 1..20)
    ) {
        let mut snapshot = StatusSnapshot::default();
        for status in &pushes {
            snapshot.set_install_state(InstallState::new(*status));
        }

        let latest = pushes[pushes.len() - 1];
        let expected = UpdateStatus::from_install_status(latest).unwrap_or(UpdateStatus::Unknown);
        prop_assert_eq!(snapshot.status(), expected);
    }
}

// =============================================================================
// Mode resolution
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// A resolved mode is always permitted; flexible may fall back to
    /// immediate, immediate never falls back to flexible.
    #[test]
    fn prop_resolved_mode_is_allowed(
        requested in arb_mode(),
        allowed in arb_allowed_modes(),
    ) {
        let info = AppUpdateInfo::available(1, allowed);
        match info.resolve_mode(requested) {
            Some(mode) => {
                prop_assert!(info.is_update_type_allowed(mode));
                if requested == UpdateMode::Immediate {
                    prop_assert_eq!(mode, UpdateMode::Immediate);
                }
                if requested == UpdateMode::Flexible && allowed.flexible {
                    prop_assert_eq!(mode, UpdateMode::Flexible);
                }
            }
            None => {
                prop_assert!(!allowed.immediate);
                prop_assert!(requested == UpdateMode::Immediate || !allowed.flexible);
            }
        }
    }
}

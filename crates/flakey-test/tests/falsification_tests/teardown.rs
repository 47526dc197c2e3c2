//! Falsification Tests: Category B - Device Lifecycle and Teardown (F011-F020)
//!
//! # Toyota Way: Muda (無駄) Elimination
//! A test run must not leak images, loop devices or mapper nodes.

use std::path::Path;
use std::process::Command;
use std::time::Duration;

use flakey_core::{Direction, FaultMode, FeatureOptions, FlakeyConfig, FsType};
use flakey_dm::{DeviceState, FaultInjector, Flakey, LinuxBackend};
use flakey_platform::{dmsetup, loopdev};

use super::host_unavailable;

fn small_config() -> FlakeyConfig {
    FlakeyConfig {
        image_size: 512 * 1024 * 1024,
        ..FlakeyConfig::default()
    }
}

fn init(name: &str, store: &Path, fs_type: FsType) -> Flakey {
    Flakey::init_with(LinuxBackend, name, store, fs_type, &small_config()).unwrap()
}

fn loop_bound(path: &Path) -> bool {
    let name = path.file_name().unwrap().to_string_lossy().into_owned();
    Path::new("/sys/block").join(name).join("loop/backing_file").exists()
}

// =============================================================================
// F011-F015: Acquire and release
// =============================================================================

/// F011: init then teardown leaves nothing behind, for every filesystem
///
/// # Falsification Attempt
/// After teardown look for the image, the loop binding and the mapper node.
/// Filesystems whose mkfs is missing are skipped one by one.
#[test]
fn f011_teardown_leaves_nothing() {
    if host_unavailable("f011", &[]) {
        return;
    }
    for fs_type in FsType::ALL {
        let mkfs = fs_type.mkfs_command();
        if !flakey_test::missing_commands(&[&mkfs]).is_empty() {
            eprintln!("skipping f011 for {fs_type}: requires {mkfs}");
            continue;
        }
        let store = tempfile::tempdir().unwrap();
        let name = format!("f011-{fs_type}");
        let mut flakey = init(&name, store.path(), fs_type);

        let image = flakey.image_path().to_path_buf();
        let loop_path = flakey.loop_device().path().to_path_buf();
        assert!(image.exists(), "F011 FALSIFIED: image missing after init");
        assert!(
            flakey.device_path().exists(),
            "F011 FALSIFIED: mapper node missing after init"
        );

        flakey.teardown().unwrap();
        assert!(!image.exists(), "F011 FALSIFIED: {fs_type} image leaked");
        assert!(
            !dmsetup::device_exists(&name),
            "F011 FALSIFIED: {fs_type} mapper device leaked"
        );
        assert!(
            !loop_bound(&loop_path),
            "F011 FALSIFIED: {} still bound",
            loop_path.display()
        );
    }
}

/// F012: teardown is idempotent
///
/// # Falsification Attempt
/// Call teardown three times.
#[test]
fn f012_teardown_idempotent() {
    if host_unavailable("f012", &[FsType::Ext4]) {
        return;
    }
    let store = tempfile::tempdir().unwrap();
    let mut flakey = init("f012", store.path(), FsType::Ext4);

    for attempt in 1..=3 {
        assert!(
            flakey.teardown().is_ok(),
            "F012 FALSIFIED: teardown #{attempt} failed"
        );
    }
    assert_eq!(flakey.state(), DeviceState::Removed);
}

/// F013: teardown tolerates resources removed behind its back
///
/// # Falsification Attempt
/// Remove the mapper device, detach the loop device and delete the image by
/// hand, then tear down.
#[test]
fn f013_teardown_tolerates_external_removal() {
    if host_unavailable("f013", &[FsType::Ext4]) {
        return;
    }
    let store = tempfile::tempdir().unwrap();
    let mut flakey = init("f013", store.path(), FsType::Ext4);

    let status = Command::new("dmsetup")
        .args(["remove", "f013"])
        .status()
        .unwrap();
    assert!(status.success());
    assert!(loopdev::detach(flakey.loop_device().path()).unwrap());
    std::fs::remove_file(flakey.image_path()).unwrap();

    assert!(
        flakey.teardown().is_ok(),
        "F013 FALSIFIED: teardown failed on already-removed resources"
    );
}

/// F014: a taken name fails init without leaking
///
/// # Falsification Attempt
/// Init the same name twice from different stores.
#[test]
fn f014_taken_name_does_not_leak() {
    if host_unavailable("f014", &[FsType::Ext4]) {
        return;
    }
    let first_store = tempfile::tempdir().unwrap();
    let second_store = tempfile::tempdir().unwrap();
    let mut first = init("f014", first_store.path(), FsType::Ext4);

    let err = Flakey::init_with(
        LinuxBackend,
        "f014",
        second_store.path(),
        FsType::Ext4,
        &small_config(),
    )
    .unwrap_err();
    assert!(
        matches!(err, flakey_core::Error::AlreadyExists { .. }),
        "F014 FALSIFIED: expected AlreadyExists, got {err}"
    );
    assert!(
        !second_store.path().join("f014.img").exists(),
        "F014 FALSIFIED: second image leaked"
    );
    assert_eq!(
        first.state(),
        DeviceState::Active,
        "F014 FALSIFIED: first controller disturbed"
    );
    first.teardown().unwrap();
}

/// F015: dropping a controller releases its resources
///
/// # Falsification Attempt
/// Drop without calling teardown.
#[test]
fn f015_drop_releases() {
    if host_unavailable("f015", &[FsType::Ext4]) {
        return;
    }
    let store = tempfile::tempdir().unwrap();
    let image = {
        let flakey = init("f015", store.path(), FsType::Ext4);
        flakey.image_path().to_path_buf()
    };
    assert!(!image.exists(), "F015 FALSIFIED: image survived drop");
    assert!(
        !dmsetup::device_exists("f015"),
        "F015 FALSIFIED: mapper device survived drop"
    );
}

// =============================================================================
// F016-F020: Mode transitions on a live device
// =============================================================================

/// F016: the kernel holds the table the controller loaded
///
/// # Falsification Attempt
/// Cycle through every mode and read the live table after each.
#[test]
fn f016_live_table_follows_transitions() {
    if host_unavailable("f016", &[FsType::Ext4]) {
        return;
    }
    let store = tempfile::tempdir().unwrap();
    let mut flakey = init("f016", store.path(), FsType::Ext4);
    let opts = FeatureOptions::new().interval(Duration::from_secs(30));

    assert_eq!(flakey.live_table().unwrap().mode(), Some(FaultMode::Allow));

    flakey.drop_writes(opts).unwrap();
    let live = flakey.live_table().unwrap();
    assert_eq!(live.mode(), Some(FaultMode::DropWrites), "F016 FALSIFIED");
    assert_eq!(live.down_secs, 30, "F016 FALSIFIED");
    assert_eq!(live.sectors, flakey.sectors(), "F016 FALSIFIED");

    flakey.error_writes(opts).unwrap();
    assert_eq!(
        flakey.live_table().unwrap().mode(),
        Some(FaultMode::ErrorWrites),
        "F016 FALSIFIED"
    );

    flakey.allow_writes(opts).unwrap();
    assert_eq!(
        flakey.live_table().unwrap().mode(),
        Some(FaultMode::Allow),
        "F016 FALSIFIED"
    );
    flakey.teardown().unwrap();
}

/// F017: unimplemented modes leave the live table untouched
///
/// # Falsification Attempt
/// Request each unimplemented mode while in drop mode.
#[test]
fn f017_unimplemented_modes_do_not_touch_device() {
    if host_unavailable("f017", &[FsType::Ext4]) {
        return;
    }
    let store = tempfile::tempdir().unwrap();
    let mut flakey = init("f017", store.path(), FsType::Ext4);
    let opts = FeatureOptions::new();
    flakey.drop_writes(opts).unwrap();
    let before = flakey.live_table().unwrap();

    assert!(flakey.error_reads(opts).unwrap_err().is_not_implemented());
    assert!(
        flakey
            .corrupt_bio_byte(32, Direction::Write, 0, 0, opts)
            .unwrap_err()
            .is_not_implemented()
    );
    assert!(
        flakey
            .random_read_corrupt(1, opts)
            .unwrap_err()
            .is_not_implemented()
    );
    assert!(
        flakey
            .random_write_corrupt(1, opts)
            .unwrap_err()
            .is_not_implemented()
    );

    assert_eq!(
        flakey.live_table().unwrap(),
        before,
        "F017 FALSIFIED: live table changed"
    );
    flakey.teardown().unwrap();
}

/// F018: the device is exactly as large as the image
///
/// # Falsification Attempt
/// Compare the loop device size against the configured image size.
#[test]
fn f018_device_size_matches_image() {
    if host_unavailable("f018", &[FsType::Ext4]) {
        return;
    }
    let store = tempfile::tempdir().unwrap();
    let mut flakey = init("f018", store.path(), FsType::Ext4);
    assert_eq!(
        flakey.sectors() * flakey_core::SECTOR_SIZE,
        small_config().image_size,
        "F018 FALSIFIED"
    );
    flakey.teardown().unwrap();
}

/// F019: transitions after teardown are refused
///
/// # Falsification Attempt
/// Tear down, then ask for drop mode.
#[test]
fn f019_transition_after_teardown_refused() {
    if host_unavailable("f019", &[FsType::Ext4]) {
        return;
    }
    let store = tempfile::tempdir().unwrap();
    let mut flakey = init("f019", store.path(), FsType::Ext4);
    flakey.teardown().unwrap();

    let err = flakey.drop_writes(FeatureOptions::new()).unwrap_err();
    assert!(
        matches!(err, flakey_core::Error::InvalidState(_)),
        "F019 FALSIFIED: got {err}"
    );
    assert!(!dmsetup::device_exists("f019"));
}

/// F020: the default interval reaches the kernel
///
/// # Falsification Attempt
/// Init with a 45s default and read the drop table back.
#[test]
fn f020_configured_interval_reaches_kernel() {
    if host_unavailable("f020", &[FsType::Ext4]) {
        return;
    }
    let store = tempfile::tempdir().unwrap();
    let config = FlakeyConfig {
        interval: Duration::from_secs(45),
        ..small_config()
    };
    let mut flakey =
        Flakey::init_with(LinuxBackend, "f020", store.path(), FsType::Ext4, &config).unwrap();

    flakey.drop_writes(FeatureOptions::new()).unwrap();
    assert_eq!(
        flakey.live_table().unwrap().down_secs,
        45,
        "F020 FALSIFIED"
    );
    flakey.teardown().unwrap();
}

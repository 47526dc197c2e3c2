//! Falsification Tests: Category C - Power Failure (F021-F030)
//!
//! # Toyota Way: Genchi Genbutsu (現地現物)
//! Pull the plug on a real filesystem and look at what is left.

use std::fs::{File, OpenOptions};
use std::io::ErrorKind;
use std::os::unix::fs::FileExt;
use std::path::Path;
use std::time::Duration;

use flakey_core::{FeatureOptions, FlakeyConfig, FsType};
use flakey_dm::FaultInjector;
use flakey_test::{FlakeyFixture, Stage, Workload};

use super::host_unavailable;

const BLOCK: usize = 4096;

fn block(fill: u8) -> Vec<u8> {
    vec![fill; BLOCK]
}

fn write_block(path: &Path, offset: u64, data: &[u8], fsync: bool) {
    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(false)
        .open(path)
        .unwrap();
    file.write_all_at(data, offset).unwrap();
    if fsync {
        file.sync_all().unwrap();
    }
}

/// Reads one block, or `None` if the file is missing or too short.
fn read_block(path: &Path, offset: u64) -> Option<Vec<u8>> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::NotFound => return None,
        Err(e) => panic!("open {}: {e}", path.display()),
    };
    let mut buf = block(0);
    match file.read_exact_at(&mut buf, offset) {
        Ok(()) => Some(buf),
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => None,
        Err(e) => panic!("read {}: {e}", path.display()),
    }
}

// =============================================================================
// F021-F025: Durability
// =============================================================================

/// F021: fsynced writes survive, unsynced writes do not
///
/// # Falsification Attempt
/// 10 GiB ext4 device: fsync 4 KiB at 0, cut power, read it; write 4 KiB at
/// 4096 without fsync, cut power, look for it.
#[test]
fn f021_synced_survives_unsynced_lost() {
    if host_unavailable("f021", &[FsType::Ext4]) {
        return;
    }
    let mut fixture = FlakeyFixture::new("f021", FsType::Ext4, "").unwrap();
    let data = fixture.root_fs().join("data");

    let synced = block(b'a');
    write_block(&data, 0, &synced, true);
    fixture.power_failure(None).unwrap();
    assert_eq!(
        read_block(&data, 0).as_deref(),
        Some(synced.as_slice()),
        "F021 FALSIFIED: fsynced block lost"
    );

    let unsynced = block(b'b');
    write_block(&data, BLOCK as u64, &unsynced, false);
    fixture.power_failure(None).unwrap();
    assert_ne!(
        read_block(&data, BLOCK as u64).as_deref(),
        Some(unsynced.as_slice()),
        "F021 FALSIFIED: unsynced block survived power failure"
    );
    assert_eq!(
        read_block(&data, 0).as_deref(),
        Some(synced.as_slice()),
        "F021 FALSIFIED: earlier fsynced block damaged"
    );

    fixture.close().unwrap();
}

/// F022: unsynced files do not survive on xfs either
///
/// # Falsification Attempt
/// Create a file without fsync on xfs and cut power.
#[test]
fn f022_unsynced_file_lost_on_xfs() {
    if host_unavailable("f022", &[FsType::Xfs]) {
        return;
    }
    let config = FlakeyConfig {
        image_size: 1024 * 1024 * 1024,
        ..FlakeyConfig::default()
    };
    let mut fixture = FlakeyFixture::with_config("f022", FsType::Xfs, "", &config).unwrap();
    let path = fixture.root_fs().join("volatile");

    write_block(&path, 0, &block(b'x'), false);
    fixture.power_failure(None).unwrap();
    assert_ne!(
        read_block(&path, 0),
        Some(block(b'x')),
        "F022 FALSIFIED: unsynced xfs data survived"
    );
    fixture.close().unwrap();
}

/// F023: a sync_fs transition persists pending writes
///
/// # Falsification Attempt
/// Write without fsync, switch modes with sync_fs, then cut power.
#[test]
fn f023_sync_fs_transition_persists() {
    if host_unavailable("f023", &[FsType::Ext4]) {
        return;
    }
    let mut fixture = FlakeyFixture::new("f023", FsType::Ext4, "").unwrap();
    let path = fixture.root_fs().join("flushed");

    write_block(&path, 0, &block(b'f'), false);
    fixture
        .flakey_mut()
        .allow_writes(FeatureOptions::new().sync_fs(true))
        .unwrap();
    fixture.power_failure(None).unwrap();

    assert_eq!(
        read_block(&path, 0),
        Some(block(b'f')),
        "F023 FALSIFIED: sync_fs did not flush before the swap"
    );
    fixture.close().unwrap();
}

/// F024: writes under error_writes fail and leave the device unchanged
///
/// # Falsification Attempt
/// Switch to error_writes, write and fsync; expect an I/O error.
#[test]
fn f024_error_writes_fail_fsync() {
    if host_unavailable("f024", &[FsType::Ext4]) {
        return;
    }
    let mut fixture = FlakeyFixture::new("f024", FsType::Ext4, "").unwrap();
    let path = fixture.root_fs().join("doomed");

    fixture
        .flakey_mut()
        .error_writes(FeatureOptions::new().sync_fs(true))
        .unwrap();
    let fsynced = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(false)
        .open(&path)
        .and_then(|f| f.write_all_at(&block(b'e'), 0).and_then(|()| f.sync_all()));
    assert!(
        fsynced.is_err(),
        "F024 FALSIFIED: fsync succeeded under error_writes"
    );

    fixture.power_failure(None).unwrap();
    assert_ne!(
        read_block(&path, 0),
        Some(block(b'e')),
        "F024 FALSIFIED: failed write reached the device"
    );
    fixture.close().unwrap();
}

/// F025: power failure can remount with different options
///
/// # Falsification Attempt
/// Remount with an override and check the filesystem is usable.
#[test]
fn f025_remount_with_override() {
    if host_unavailable("f025", &[FsType::Ext4]) {
        return;
    }
    let mut fixture = FlakeyFixture::new("f025", FsType::Ext4, "").unwrap();
    fixture.power_failure(Some("nodelalloc")).unwrap();

    let path = fixture.root_fs().join("after");
    write_block(&path, 0, &block(b'n'), true);
    assert_eq!(read_block(&path, 0), Some(block(b'n')), "F025 FALSIFIED");
    assert_eq!(fixture.mount_options(), "");
    fixture.close().unwrap();
}

// =============================================================================
// F026-F030: Protocol
// =============================================================================

/// F026: the device is back in allow mode after a power failure
///
/// # Falsification Attempt
/// Read the live table after simulating.
#[test]
fn f026_allow_mode_after_power_failure() {
    if host_unavailable("f026", &[FsType::Ext4]) {
        return;
    }
    let mut fixture = FlakeyFixture::new("f026", FsType::Ext4, "").unwrap();
    fixture.power_failure(None).unwrap();
    assert_eq!(
        fixture.flakey().live_table().unwrap().mode(),
        Some(flakey_core::FaultMode::Allow),
        "F026 FALSIFIED"
    );
    fixture.close().unwrap();
}

/// F027: a busy mount point makes the unmount stage fail, not hang
///
/// # Falsification Attempt
/// Hold a file open inside the mount with a two-attempt unmount budget.
#[test]
fn f027_busy_unmount_reports_stage() {
    if host_unavailable("f027", &[FsType::Ext4]) {
        return;
    }
    let config = FlakeyConfig {
        unmount: flakey_core::UnmountPolicy {
            attempts: 2,
            backoff: Duration::from_millis(10),
        },
        ..FlakeyConfig::default()
    };
    let mut fixture = FlakeyFixture::with_config("f027", FsType::Ext4, "", &config).unwrap();

    let pinned_path = fixture.root_fs().join("pinned");
    write_block(&pinned_path, 0, &block(b'p'), true);
    let pinned = File::open(&pinned_path).unwrap();

    let err = fixture.power_failure(None).unwrap_err();
    assert_eq!(
        err.failed_stage(),
        Some(Stage::Unmount),
        "F027 FALSIFIED: got {err}"
    );

    drop(pinned);
    fixture
        .flakey_mut()
        .allow_writes(FeatureOptions::new())
        .unwrap();
    fixture.close().unwrap();
}

/// F028: a killed workload does not corrupt the filesystem
///
/// # Falsification Attempt
/// Append in a loop, kill after one second, cut power, look for stale
/// zeroes in the file.
#[tokio::test]
async fn f028_workload_then_power_failure() {
    if host_unavailable("f028", &[FsType::Ext4]) {
        return;
    }
    let mut fixture = FlakeyFixture::new("f028", FsType::Ext4, "").unwrap();
    let log = fixture.root_fs().join("log");

    let output = Workload::new("sh")
        .arg("-c")
        .arg(format!(
            "while :; do echo entry >> '{}'; done",
            log.display()
        ))
        .run_for(Duration::from_secs(1))
        .await
        .unwrap();
    assert!(output.killed, "F028 FALSIFIED: workload exited on its own");

    fixture.power_failure(None).unwrap();
    if let Ok(contents) = std::fs::read(&log) {
        assert!(
            !contents.contains(&0),
            "F028 FALSIFIED: zero-filled blocks in log after power failure"
        );
    }
    fixture.close().unwrap();
}

/// F029: repeated power failures are stable
///
/// # Falsification Attempt
/// Cut power five times in a row, syncing a new block each round.
#[test]
fn f029_repeated_power_failures() {
    if host_unavailable("f029", &[FsType::Ext4]) {
        return;
    }
    let mut fixture = FlakeyFixture::new("f029", FsType::Ext4, "").unwrap();
    let data = fixture.root_fs().join("rounds");

    for round in 0..5u8 {
        write_block(&data, u64::from(round) * BLOCK as u64, &block(round), true);
        fixture.power_failure(None).unwrap();
        for earlier in 0..=round {
            assert_eq!(
                read_block(&data, u64::from(earlier) * BLOCK as u64),
                Some(block(earlier)),
                "F029 FALSIFIED: round {round} lost block {earlier}"
            );
        }
    }
    fixture.close().unwrap();
}

/// F030: closing the fixture removes the device
///
/// # Falsification Attempt
/// Close and look for the mapper node.
#[test]
fn f030_fixture_close_removes_device() {
    if host_unavailable("f030", &[FsType::Ext4]) {
        return;
    }
    let fixture = FlakeyFixture::new("f030", FsType::Ext4, "").unwrap();
    let device = fixture.flakey().device_path();
    fixture.close().unwrap();
    assert!(!device.exists(), "F030 FALSIFIED: mapper node survived close");
}

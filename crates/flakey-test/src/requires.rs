//! Host prerequisite probes.
//!
//! Flakey suites need root, the loop and dm-flakey modules, `dmsetup` and
//! the `mkfs` tools. These helpers let a test bail out cleanly instead of
//! failing on an unprivileged CI runner.

use std::env;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use flakey_core::FsType;
use flakey_platform::command;
use flakey_platform::dmsetup::DMSETUP;

/// Misc devices registered with the kernel.
const PROC_MISC: &str = "/proc/misc";

/// Present once `dm-flakey` is loaded as a module.
const DM_FLAKEY_MODULE: &str = "/sys/module/dm_flakey";

/// True when running with an effective UID of 0.
#[must_use]
pub fn requires_root() -> bool {
    nix::unistd::Uid::effective().is_root()
}

/// Commands a flakey controller shells out to for `fs_types`.
#[must_use]
pub fn required_commands(fs_types: &[FsType]) -> Vec<String> {
    std::iter::once(DMSETUP.to_string())
        .chain(fs_types.iter().map(|fs| fs.mkfs_command()))
        .collect()
}

/// The subset of `commands` that cannot be found on `PATH`.
#[must_use]
pub fn missing_commands<S: AsRef<str>>(commands: &[S]) -> Vec<String> {
    commands
        .iter()
        .map(AsRef::<str>::as_ref)
        .filter(|cmd| !on_path(cmd))
        .map(String::from)
        .collect()
}

/// Why a host suite cannot run here, or `None` if it can.
#[must_use]
pub fn skip_reason(fs_types: &[FsType]) -> Option<String> {
    if !requires_root() {
        return Some("requires root".to_string());
    }
    let missing = missing_commands(&required_commands(fs_types));
    if !missing.is_empty() {
        return Some(format!("requires {}", missing.join(", ")));
    }
    if !device_mapper_available() {
        return Some("requires the device-mapper driver".to_string());
    }
    if !flakey_target_available() {
        return Some("requires the dm-flakey target".to_string());
    }
    None
}

/// True when the kernel has a device-mapper driver.
///
/// A `/dev/mapper/control` node can exist without a driver behind it, so
/// this reads `/proc/misc`, falling back to `dmsetup version` (which loads
/// `dm-mod` on demand and fails without a driver).
#[must_use]
pub fn device_mapper_available() -> bool {
    if std::fs::read_to_string(PROC_MISC).is_ok_and(|misc| lists_device_mapper(&misc)) {
        return true;
    }
    command::run(DMSETUP, ["version"], "query driver of", "device-mapper").is_ok()
}

/// True when the `flakey` target is loaded, built in, or loadable on demand.
#[must_use]
pub fn flakey_target_available() -> bool {
    if command::run(DMSETUP, ["targets"], "list targets of", "device-mapper")
        .is_ok_and(|targets| lists_flakey_target(&targets))
    {
        return true;
    }
    if Path::new(DM_FLAKEY_MODULE).exists() {
        return true;
    }
    let Ok(release) = std::fs::read_to_string("/proc/sys/kernel/osrelease") else {
        return false;
    };
    let modules = Path::new("/lib/modules").join(release.trim());
    ["modules.dep", "modules.builtin"].iter().any(|index| {
        std::fs::read_to_string(modules.join(index)).is_ok_and(|list| lists_flakey_module(&list))
    })
}

fn lists_device_mapper(proc_misc: &str) -> bool {
    proc_misc
        .lines()
        .any(|line| line.split_whitespace().nth(1) == Some("device-mapper"))
}

fn lists_flakey_target(dmsetup_targets: &str) -> bool {
    dmsetup_targets
        .lines()
        .any(|line| line.split_whitespace().next() == Some("flakey"))
}

fn lists_flakey_module(index: &str) -> bool {
    index.lines().any(|line| line.contains("/dm-flakey.ko"))
}

fn on_path(cmd: &str) -> bool {
    if cmd.contains('/') {
        return is_executable(Path::new(cmd));
    }
    env::var_os("PATH")
        .is_some_and(|paths| env::split_paths(&paths).any(|dir| is_executable(&dir.join(cmd))))
}

fn is_executable(path: &Path) -> bool {
    path.metadata()
        .is_ok_and(|m| m.is_file() && (m.permissions().mode() & 0o111) != 0)
}

//! Loop device binding.
//!
//! Talks to `/dev/loop-control` and the loop block devices directly with
//! ioctls rather than shelling out to `losetup`.

use std::fs::{File, OpenOptions};
use std::io;
use std::os::fd::AsRawFd;
use std::path::{Path, PathBuf};

use flakey_core::{Error, Result, SECTOR_SIZE};

use crate::sys::{
    BLKGETSIZE64, LOOP_CLR_FD, LOOP_CONTROL_DEV, LOOP_CTL_GET_FREE, LOOP_SET_FD, loop_device_path,
};

/// Another process can grab the index between GET_FREE and SET_FD.
const ATTACH_ATTEMPTS: u32 = 3;

/// A loop device bound to a backing image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopDevice {
    path: PathBuf,
    sectors: u64,
}

impl LoopDevice {
    /// Describes an already attached loop device.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, sectors: u64) -> Self {
        Self {
            path: path.into(),
            sectors,
        }
    }

    /// Block device path, e.g. `/dev/loop0`.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Size in 512-byte sectors, queried once at attach time.
    #[must_use]
    pub const fn sectors(&self) -> u64 {
        self.sectors
    }
}

/// Binds `image` to a free loop device and reads its size.
///
/// # Errors
/// - [`Error::NoFreeLoopDevice`] if the kernel has no free loop device
/// - [`Error::Io`] if the backing file or the loop device cannot be opened
pub fn attach(image: &Path) -> Result<LoopDevice> {
    let backing =
        open_rw(image).map_err(|e| Error::io("open backing file", image.display(), e))?;
    let control =
        open_rw(Path::new(LOOP_CONTROL_DEV)).map_err(|e| Error::io("open", LOOP_CONTROL_DEV, e))?;

    let mut attempt = 0;
    loop {
        attempt += 1;

        let index = free_index(&control)?;
        let path = loop_device_path(index);
        let device =
            open_rw(Path::new(&path)).map_err(|e| Error::io("open loop device", &path, e))?;

        // SAFETY: both descriptors are open for the duration of the call and
        // LOOP_SET_FD takes the backing fd by value.
        let rc = unsafe { libc::ioctl(device.as_raw_fd(), LOOP_SET_FD as _, backing.as_raw_fd()) };
        if rc == 0 {
            let sectors = match size_of_device(&device, &path) {
                Ok(sectors) => sectors,
                Err(e) => {
                    clear(&device);
                    return Err(e);
                }
            };
            tracing::info!("attached {} to {path} ({sectors} sectors)", image.display());
            return Ok(LoopDevice::new(path, sectors));
        }

        let err = io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::EBUSY) && attempt < ATTACH_ATTEMPTS {
            tracing::warn!("{path} was taken before it could be bound, retrying");
            continue;
        }
        return Err(Error::io("bind loop device", &path, err));
    }
}

/// Unbinds a loop device.
///
/// Returns `Ok(false)` if it was already detached or no longer exists.
pub fn detach(path: &Path) -> Result<bool> {
    let device = match OpenOptions::new().read(true).open(path) {
        Ok(device) => device,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(Error::io("open loop device", path.display(), e)),
    };

    // SAFETY: fd is open; LOOP_CLR_FD takes no argument.
    let rc = unsafe { libc::ioctl(device.as_raw_fd(), LOOP_CLR_FD as _, 0) };
    if rc == 0 {
        tracing::info!("detached {}", path.display());
        return Ok(true);
    }

    let err = io::Error::last_os_error();
    if err.raw_os_error() == Some(libc::ENXIO) {
        tracing::debug!("{} already detached", path.display());
        return Ok(false);
    }
    Err(Error::io("detach loop device", path.display(), err))
}

/// Size of a block device in 512-byte sectors.
pub fn size_in_sectors(path: &Path) -> Result<u64> {
    let device =
        File::open(path).map_err(|e| Error::io("open block device", path.display(), e))?;
    size_of_device(&device, &path.display().to_string())
}

fn size_of_device(device: &File, path: &str) -> Result<u64> {
    let mut bytes: u64 = 0;
    // SAFETY: BLKGETSIZE64 writes a single u64 through the pointer.
    let rc = unsafe {
        libc::ioctl(
            device.as_raw_fd(),
            BLKGETSIZE64 as _,
            std::ptr::from_mut(&mut bytes),
        )
    };
    if rc != 0 {
        return Err(Error::io("query size of", path, io::Error::last_os_error()));
    }
    Ok(bytes / SECTOR_SIZE)
}

fn free_index(control: &File) -> Result<u32> {
    // SAFETY: fd is open; LOOP_CTL_GET_FREE takes no argument.
    let rc = unsafe { libc::ioctl(control.as_raw_fd(), LOOP_CTL_GET_FREE as _) };
    if rc < 0 {
        return Err(Error::NoFreeLoopDevice(io::Error::last_os_error()));
    }
    Ok(rc as u32)
}

fn clear(device: &File) {
    // SAFETY: fd is open; LOOP_CLR_FD takes no argument.
    let rc = unsafe { libc::ioctl(device.as_raw_fd(), LOOP_CLR_FD as _, 0) };
    if rc != 0 {
        tracing::warn!(
            "failed to unbind loop device after error: {}",
            io::Error::last_os_error()
        );
    }
}

fn open_rw(path: &Path) -> io::Result<File> {
    OpenOptions::new().read(true).write(true).open(path)
}

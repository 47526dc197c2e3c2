//! Raw loop and block-device kernel interface definitions
//!
//! Values from Linux include/uapi/linux/loop.h and include/uapi/linux/fs.h.

// ============================================================================
// ioctl encoding helpers (match kernel _IO/_IOR macros)
// ============================================================================

const fn _io(ty: u32, nr: u32) -> u32 {
    (ty << 8) | nr
}

const fn _ior(ty: u32, nr: u32, sz: usize) -> u32 {
    (2 << 30) | ((sz as u32) << 16) | (ty << 8) | nr
}

// ============================================================================
// Loop device ioctls
// ============================================================================

const LOOP_MAGIC: u32 = 0x4C;

/// Bind a file descriptor to a loop device - 0x4C00
pub const LOOP_SET_FD: u32 = _io(LOOP_MAGIC, 0x00);

/// Unbind a loop device - 0x4C01
pub const LOOP_CLR_FD: u32 = _io(LOOP_MAGIC, 0x01);

/// Ask /dev/loop-control for a free index - 0x4C82
pub const LOOP_CTL_GET_FREE: u32 = _io(LOOP_MAGIC, 0x82);

// ============================================================================
// Block device ioctls
// ============================================================================

const BLK_MAGIC: u32 = 0x12;

/// Device size in bytes - _IOR(0x12, 114, size_t)
pub const BLKGETSIZE64: u32 = _ior(BLK_MAGIC, 114, size_of::<usize>());

// ============================================================================
// Constants
// ============================================================================

/// Path to the loop control device
pub const LOOP_CONTROL_DEV: &str = "/dev/loop-control";

/// Prefix for loop block devices
pub const LOOP_DEV_PREFIX: &str = "/dev/loop";

/// Build the block device path for a loop index.
#[must_use]
pub fn loop_device_path(index: u32) -> String {
    format!("{LOOP_DEV_PREFIX}{index}")
}

// ============================================================================
// Tests
// ============================================================================

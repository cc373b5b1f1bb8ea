//! Block Device Contract
//!
//! The driver sits on top of an already-configured partition: the device is
//! positioned at the start of the volume and sized to cover it. All offsets
//! handed to the device are sector numbers relative to the partition start;
//! transfer lengths are byte counts taken from the buffer.
//!
//! Reads are synchronous and may block the calling thread until the
//! underlying storage completes. The driver never retries a failed read.

use core::fmt;

/// Failure reported by a partition device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiskError {
    /// The transfer failed at the hardware or transport level.
    Io,
    /// The request fell outside the partition.
    OutOfRange,
}

impl fmt::Display for DiskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiskError::Io => write!(f, "disk I/O error"),
            DiskError::OutOfRange => write!(f, "read beyond end of partition"),
        }
    }
}

/// Raw sector-addressed read access to one partition.
///
/// Implementations handle their own locking; the driver may issue reads from
/// any kernel thread. All arithmetic on offsets and sizes is unsigned 64-bit.
pub trait PartitionDevice: Send + Sync {
    /// Bytes per device block (sector), typically 512.
    fn block_size(&self) -> u64;

    /// Read `buffer.len()` bytes starting at sector `lba`.
    fn read(&self, lba: u64, buffer: &mut [u8]) -> Result<(), DiskError>;
}

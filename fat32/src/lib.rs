//! FAT32 Filesystem Driver
//!
//! Read-only FAT32 support for the kernel VFS: volume detection, mounting,
//! cluster-chain resolution through the File Allocation Table, directory
//! enumeration with long-filename reconstruction, and bounded file reads.
//!
//! The driver is layered bottom-up:
//! - [`block`]: the sector-addressed partition contract the driver reads
//!   through.
//! - [`bpb`]: boot-record parsing and the FAT32 detection predicate.
//! - [`dir`]: 32-byte directory-record decoding and long-name assembly.
//! - [`vfs`]: the node handle and per-volume operation set the VFS
//!   dispatches through.
//! - [`volume`]: the mount context tying it all together, plus the driver
//!   mount table.
//!
//! A typical embedding probes with [`identify`], mounts with
//! [`mount_volume`], registers the returned volume's
//! [`mount_dirent`](Fat32Volume::mount_dirent) in its namespace, and then
//! drives everything else through [`FileNode`] methods.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod block;
pub mod bpb;
pub mod dir;
pub mod vfs;
pub mod volume;

pub use block::{DiskError, PartitionDevice};
pub use vfs::{DirEntry, FileKind, FileNode, FsError, NodeFlags, VolumeOps};
pub use volume::{get_mount, identify, mount_count, mount_volume, Fat32Volume};

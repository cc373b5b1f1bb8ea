//! VFS Node Contract
//!
//! The types through which the generic VFS layer talks to a filesystem
//! driver: node handles, directory-entry results, and the per-volume
//! operation set.
//!
//! The seam is a capability trait, [`VolumeOps`], and each node carries a
//! weak back-reference to its volume. A node whose volume has been torn
//! down reports [`FsError::NotMounted`] instead of dereferencing freed
//! state.

use alloc::string::String;
use alloc::sync::{Arc, Weak};
use core::fmt;

/// Longest accepted node name, in bytes.
pub const MAX_NAME: usize = 255;

/// Clamp a name to [`MAX_NAME`] bytes without splitting a multi-byte
/// character.
pub(crate) fn truncate_name(name: &mut String) {
    if name.len() <= MAX_NAME {
        return;
    }
    let mut end = MAX_NAME;
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    name.truncate(end);
}

/// Driver error taxonomy.
///
/// "Not found" is deliberately absent: end-of-directory and a missed name
/// lookup are reported as `Ok(None)` by the operations that can produce
/// them, never as an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsError {
    /// A device read failed.
    Io,
    /// On-disk structures are inconsistent (cycle in a cluster chain,
    /// unterminated directory).
    Corrupted,
    /// Directory operation on a non-directory node.
    NotDirectory,
    /// The operation is not implemented by this filesystem.
    NotSupported,
    /// The node's volume is no longer mounted.
    NotMounted,
    /// Caller-supplied argument out of range.
    InvalidParameter,
}

impl fmt::Display for FsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FsError::Io => write!(f, "disk I/O error"),
            FsError::Corrupted => write!(f, "corrupt filesystem structure"),
            FsError::NotDirectory => write!(f, "not a directory"),
            FsError::NotSupported => write!(f, "operation not supported"),
            FsError::NotMounted => write!(f, "volume not mounted"),
            FsError::InvalidParameter => write!(f, "invalid parameter"),
        }
    }
}

impl From<crate::block::DiskError> for FsError {
    fn from(_: crate::block::DiskError) -> Self {
        FsError::Io
    }
}

bitflags::bitflags! {
    /// Node classification bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct NodeFlags: u32 {
        const FILE = 0x0001;
        const DIRECTORY = 0x0002;
        const MOUNT_POINT = 0x0008;
    }
}

/// Entry type as reported to directory enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    File,
    Directory,
}

/// One result of directory enumeration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    /// Entry name (long name when present, 8.3 otherwise).
    pub name: String,
    /// Starting cluster of the entry's data.
    pub inode: u32,
    pub kind: FileKind,
}

/// Per-filesystem operation set, dispatched through a node's volume
/// back-reference.
pub trait VolumeOps: Send + Sync {
    /// Read up to `buffer.len()` bytes of `node` starting at `offset`.
    /// Returns the number of bytes transferred; zero for directory nodes,
    /// nodes with inode 0, and short reads.
    fn read(&self, node: &FileNode, offset: u64, buffer: &mut [u8]) -> Result<usize, FsError>;

    /// Write is not implemented by any filesystem in this driver; it must
    /// fail, never silently truncate or corrupt.
    fn write(&self, node: &FileNode, offset: u64, buffer: &[u8]) -> Result<usize, FsError>;

    /// Per-open bookkeeping. This driver tracks no open state.
    fn open(&self, node: &FileNode, flags: u32) -> Result<(), FsError>;

    /// Release per-open bookkeeping.
    fn close(&self, node: &FileNode) -> Result<(), FsError>;

    /// Return the `index`-th real entry of the directory `node`, or
    /// `Ok(None)` once `index` is past the last entry.
    fn read_dir(&self, node: &FileNode, index: usize) -> Result<Option<DirEntry>, FsError>;

    /// Look `name` up in the directory `node`. `Ok(None)` when no entry
    /// matches.
    fn find_dir(self: Arc<Self>, node: &FileNode, name: &str)
        -> Result<Option<Arc<FileNode>>, FsError>;
}

/// VFS-facing handle to one file or directory.
///
/// Nodes are created on lookup and never cached by the driver; the single
/// exception is the volume's mount-point node, which is a singleton for the
/// lifetime of the mount.
pub struct FileNode {
    /// Node name within its parent directory.
    pub name: String,
    /// Starting cluster. 0 is the root sentinel.
    pub inode: u32,
    /// File size in bytes (0 for directories).
    pub size: u32,
    pub flags: NodeFlags,
    volume: Weak<dyn VolumeOps>,
}

impl FileNode {
    pub fn new(
        name: &str,
        inode: u32,
        size: u32,
        flags: NodeFlags,
        volume: Weak<dyn VolumeOps>,
    ) -> Self {
        let mut name = String::from(name);
        truncate_name(&mut name);
        Self { name, inode, size, flags, volume }
    }

    pub fn is_directory(&self) -> bool {
        self.flags.contains(NodeFlags::DIRECTORY)
    }

    fn volume(&self) -> Result<Arc<dyn VolumeOps>, FsError> {
        self.volume.upgrade().ok_or(FsError::NotMounted)
    }

    pub fn read(&self, offset: u64, buffer: &mut [u8]) -> Result<usize, FsError> {
        self.volume()?.read(self, offset, buffer)
    }

    pub fn write(&self, offset: u64, buffer: &[u8]) -> Result<usize, FsError> {
        self.volume()?.write(self, offset, buffer)
    }

    pub fn open(&self, flags: u32) -> Result<(), FsError> {
        self.volume()?.open(self, flags)
    }

    pub fn close(&self) -> Result<(), FsError> {
        self.volume()?.close(self)
    }

    pub fn read_dir(&self, index: usize) -> Result<Option<DirEntry>, FsError> {
        self.volume()?.read_dir(self, index)
    }

    pub fn find_dir(&self, name: &str) -> Result<Option<Arc<FileNode>>, FsError> {
        self.volume()?.find_dir(self, name)
    }
}

impl PartialEq for FileNode {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.inode == other.inode
            && self.size == other.size
            && self.flags == other.flags
    }
}

impl fmt::Debug for FileNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileNode")
            .field("name", &self.name)
            .field("inode", &self.inode)
            .field("size", &self.size)
            .field("flags", &self.flags)
            .finish()
    }
}

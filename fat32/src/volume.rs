//! FAT32 Volume
//!
//! The mount context for one FAT32 partition: boot-record geometry,
//! cluster-to-sector translation, cluster-chain resolution through the
//! File Allocation Table, and the node operations the VFS dispatches.
//!
//! There is deliberately no chain or directory cache: every operation
//! re-walks the FAT with its own scratch buffers, so repeated lookups
//! re-read the device but can never serve stale data. The only state a
//! volume keeps is its immutable geometry and the singleton mount-point
//! node.

use alloc::collections::BTreeSet;
use alloc::string::String;
use alloc::sync::{Arc, Weak};
use alloc::vec;
use alloc::vec::Vec;

use log::{info, warn};
use spin::RwLock;

use crate::block::PartitionDevice;
use crate::bpb::{cluster_values, Fat32BootSector, BOOT_SECTOR_SIZE};
use crate::dir::DirScanner;
use crate::vfs::{DirEntry, FileKind, FileNode, FsError, NodeFlags, VolumeOps};

/// Granularity of FAT table reads. One block is read and held for the
/// duration of a single chain walk; consecutive clusters whose entries
/// share a block cost no extra device reads.
pub const FAT_BLOCK_SIZE: usize = 4096;

/// Probe a partition for a FAT32 filesystem.
///
/// Pure query: nothing is retained and no state is mutated. The tri-state
/// outcome is `Ok(true)` (FAT32), `Ok(false)` (not FAT32), or `Err` when
/// the boot sector cannot be read at all.
pub fn identify(device: &dyn PartitionDevice) -> Result<bool, FsError> {
    let mut sector = vec![0u8; BOOT_SECTOR_SIZE];
    if let Err(err) = device.read(0, &mut sector) {
        warn!("fat32: identify: boot record read failed: {}", err);
        return Err(FsError::Io);
    }
    Ok(Fat32BootSector::from_bytes(&sector).map(|b| b.is_fat32()).unwrap_or(false))
}

/// One mounted FAT32 volume.
pub struct Fat32Volume {
    device: Arc<dyn PartitionDevice>,
    boot: Fat32BootSector,
    /// Device block size in bytes.
    block_size: u64,
    /// Bytes per cluster.
    cluster_size: u64,
    root_cluster: u32,
    /// Singleton mount-point node; every lookup that resolves to the root
    /// directory returns this same node.
    root: Arc<FileNode>,
    mount_dirent: DirEntry,
}

/// Result of reading a cluster chain into memory.
struct ChainRead {
    /// Cluster-granular data, indexed by logical offset.
    data: Vec<u8>,
    /// Length of the full chain, even when fewer clusters were read.
    chain_clusters: usize,
}

impl Fat32Volume {
    /// Read the boot record and build the mount context. A volume that
    /// fails here is never constructed, so no unusable mount-point node
    /// can escape.
    pub fn mount(device: Arc<dyn PartitionDevice>, name: &str) -> Result<Arc<Self>, FsError> {
        let mut sector = vec![0u8; BOOT_SECTOR_SIZE];
        if let Err(err) = device.read(0, &mut sector) {
            warn!("fat32: disk error reading volume boot record: {}", err);
            return Err(FsError::Io);
        }
        let boot = Fat32BootSector::from_bytes(&sector).ok_or(FsError::Corrupted)?;

        let block_size = device.block_size();
        if boot.bpb.sectors_per_cluster == 0
            || block_size == 0
            || FAT_BLOCK_SIZE as u64 % block_size != 0
        {
            warn!("fat32: rejecting volume with unusable geometry");
            return Err(FsError::Corrupted);
        }

        let cluster_size = boot.bpb.sectors_per_cluster as u64 * block_size;
        let root_cluster = boot.ebr.root_cluster();

        let signature = boot.ebr.signature;
        info!(
            "fat32: initializing volume \"{}\": signature {:#04x}, oem \"{}\", label \"{}\", {} MB",
            name,
            signature,
            boot.oem_str(),
            boot.ebr.volume_label_str(),
            boot.bpb.large_sector_count() as u64 * block_size / 1024 / 1024,
        );

        let mount_dirent = DirEntry {
            name: String::from(name),
            inode: root_cluster,
            kind: FileKind::Directory,
        };

        Ok(Arc::new_cyclic(|me: &Weak<Fat32Volume>| {
            let root = Arc::new(FileNode::new(
                name,
                root_cluster,
                0,
                NodeFlags::DIRECTORY | NodeFlags::MOUNT_POINT,
                me.clone(),
            ));
            Fat32Volume {
                device,
                boot,
                block_size,
                cluster_size,
                root_cluster,
                root,
                mount_dirent,
            }
        }))
    }

    /// The volume's mount-point node.
    pub fn root_node(&self) -> Arc<FileNode> {
        self.root.clone()
    }

    /// Directory-entry description of the mount point, for namespace
    /// registration by the embedding VFS.
    pub fn mount_dirent(&self) -> DirEntry {
        self.mount_dirent.clone()
    }

    pub fn cluster_size(&self) -> u64 {
        self.cluster_size
    }

    /// Partition-relative sector of a data cluster. Clusters 0 and 1 are
    /// reserved by the format and never reach this function; cluster 2 maps
    /// to the first data sector.
    fn cluster_to_lba(&self, cluster: u32) -> u64 {
        let bpb = &self.boot.bpb;
        bpb.reserved_sectors() as u64
            + bpb.fat_count as u64 * self.boot.ebr.sectors_per_fat() as u64
            + (cluster as u64 - 2) * bpb.sectors_per_cluster as u64
    }

    /// Walk the FAT from `start`, returning the ordered cluster sequence.
    ///
    /// The chain ends at the first free entry or end-of-chain sentinel. A
    /// chain that revisits a cluster, or steps onto a reserved cluster,
    /// is corrupt and terminates the walk with an error instead of looping.
    fn cluster_chain(&self, start: u32) -> Result<Vec<u32>, FsError> {
        let reserved = self.boot.bpb.reserved_sectors() as u64;
        let sectors_per_block = FAT_BLOCK_SIZE as u64 / self.block_size;
        let entries_per_block = FAT_BLOCK_SIZE / 4;

        let mut chain = Vec::new();
        let mut visited = BTreeSet::new();
        let mut block_buf = vec![0u8; FAT_BLOCK_SIZE];
        let mut cached_block: Option<u64> = None;
        let mut cluster = start;

        loop {
            if cluster < 2 {
                warn!("fat32: cluster chain stepped onto reserved cluster {}", cluster);
                return Err(FsError::Corrupted);
            }
            if !visited.insert(cluster) {
                warn!("fat32: cluster chain revisits cluster {}", cluster);
                return Err(FsError::Corrupted);
            }
            chain.push(cluster);

            let block = cluster as u64 * 4 / FAT_BLOCK_SIZE as u64;
            if cached_block != Some(block) {
                self.device.read(reserved + block * sectors_per_block, &mut block_buf)?;
                cached_block = Some(block);
            }
            let offset = (cluster as usize % entries_per_block) * 4;
            let entry = u32::from_le_bytes([
                block_buf[offset],
                block_buf[offset + 1],
                block_buf[offset + 2],
                block_buf[offset + 3],
            ]);

            // Top 4 bits are reserved; only the low 28 address a cluster.
            let next = entry & cluster_values::CLUSTER_MASK;
            if cluster_values::is_free(next) || cluster_values::is_end_of_chain(next) {
                break;
            }
            cluster = next;
        }

        Ok(chain)
    }

    /// Read a cluster chain into one contiguous buffer.
    ///
    /// Cluster 0 is the root sentinel and is substituted before
    /// resolution. With a `limit`, only the clusters needed to cover that
    /// many bytes are read; the full chain length is still reported so
    /// callers can detect short reads. A failed read of any constituent
    /// cluster fails the whole call.
    fn read_chain(&self, start: u32, limit: Option<u64>) -> Result<ChainRead, FsError> {
        let start = if start == 0 { self.root_cluster } else { start };
        let chain = self.cluster_chain(start)?;

        let cluster_size = self.cluster_size as usize;
        let read_count = match limit {
            Some(bytes) => (bytes.div_ceil(self.cluster_size) as usize).min(chain.len()),
            None => chain.len(),
        };

        let mut data = vec![0u8; read_count * cluster_size];
        for (i, &cluster) in chain[..read_count].iter().enumerate() {
            let offset = i * cluster_size;
            self.device
                .read(self.cluster_to_lba(cluster), &mut data[offset..offset + cluster_size])?;
        }

        Ok(ChainRead { data, chain_clusters: chain.len() })
    }
}

impl VolumeOps for Fat32Volume {
    fn read(&self, node: &FileNode, offset: u64, buffer: &mut [u8]) -> Result<usize, FsError> {
        // Directories and the root sentinel are not readable as byte
        // streams; report zero bytes without touching the device.
        if node.inode == 0 || node.is_directory() {
            return Ok(0);
        }
        if buffer.is_empty() {
            return Ok(0);
        }

        let end = offset
            .checked_add(buffer.len() as u64)
            .ok_or(FsError::InvalidParameter)?;
        let read = self.read_chain(node.inode, Some(end))?;

        // Short read: the chain cannot cover the request. Zero bytes, not
        // a partially filled buffer.
        if (read.chain_clusters as u64) * self.cluster_size < end {
            return Ok(0);
        }

        buffer.copy_from_slice(&read.data[offset as usize..end as usize]);
        Ok(buffer.len())
    }

    fn write(&self, _node: &FileNode, _offset: u64, _buffer: &[u8]) -> Result<usize, FsError> {
        Err(FsError::NotSupported)
    }

    fn open(&self, _node: &FileNode, _flags: u32) -> Result<(), FsError> {
        Ok(())
    }

    fn close(&self, _node: &FileNode) -> Result<(), FsError> {
        Ok(())
    }

    fn read_dir(&self, node: &FileNode, index: usize) -> Result<Option<DirEntry>, FsError> {
        if !node.is_directory() {
            return Err(FsError::NotDirectory);
        }
        let read = self.read_chain(node.inode, None)?;

        let mut seen = 0;
        for entry in DirScanner::new(&read.data) {
            let entry = entry?;
            if seen == index {
                return Ok(Some(DirEntry {
                    name: entry.name,
                    inode: entry.first_cluster,
                    kind: if entry.is_directory { FileKind::Directory } else { FileKind::File },
                }));
            }
            seen += 1;
        }
        Ok(None)
    }

    fn find_dir(
        self: Arc<Self>,
        node: &FileNode,
        name: &str,
    ) -> Result<Option<Arc<FileNode>>, FsError> {
        if !node.is_directory() {
            return Err(FsError::NotDirectory);
        }
        let read = self.read_chain(node.inode, None)?;

        for entry in DirScanner::new(&read.data) {
            let entry = entry?;
            if entry.name != name {
                continue;
            }

            // The root directory is addressed as cluster 0 in some
            // contexts; either spelling resolves to the singleton
            // mount-point node, never a fresh directory object.
            if entry.first_cluster == 0 || entry.first_cluster == self.root_cluster {
                return Ok(Some(self.root.clone()));
            }

            let flags = if entry.is_directory { NodeFlags::DIRECTORY } else { NodeFlags::FILE };
            return Ok(Some(Arc::new(FileNode::new(
                &entry.name,
                entry.first_cluster,
                entry.size,
                flags,
                Arc::<Self>::downgrade(&self),
            ))));
        }
        Ok(None)
    }
}

// ============================================================================
// Driver mount table
// ============================================================================

static MOUNTS: RwLock<Vec<Arc<Fat32Volume>>> = RwLock::new(Vec::new());

/// Mount `device` and register the volume with the driver's mount table.
/// Registration of the mount point into the VFS namespace stays with the
/// caller.
pub fn mount_volume(
    device: Arc<dyn PartitionDevice>,
    name: &str,
) -> Result<Arc<Fat32Volume>, FsError> {
    let volume = Fat32Volume::mount(device, name)?;
    MOUNTS.write().push(volume.clone());
    Ok(volume)
}

/// Number of volumes this driver has mounted.
pub fn mount_count() -> usize {
    MOUNTS.read().len()
}

/// Mounted volume by mount-table index.
pub fn get_mount(index: usize) -> Option<Arc<Fat32Volume>> {
    MOUNTS.read().get(index).cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::DiskError;
    use crate::bpb::tests::boot_sector_bytes;
    use crate::dir::tests::{lfn_fragment, short_entry};
    use crate::dir::{file_attr, DIR_ENTRY_SIZE};
    use core::sync::atomic::{AtomicUsize, Ordering};
    use std::io::{Read as _, Write as _};

    // ── In-memory partition ──────────────────────────────────────────────

    struct RamDisk {
        data: Vec<u8>,
        reads: AtomicUsize,
    }

    impl RamDisk {
        fn new(data: Vec<u8>) -> Self {
            Self { data, reads: AtomicUsize::new(0) }
        }

        fn reads(&self) -> usize {
            self.reads.load(Ordering::Relaxed)
        }
    }

    impl PartitionDevice for RamDisk {
        fn block_size(&self) -> u64 {
            512
        }

        fn read(&self, lba: u64, buffer: &mut [u8]) -> Result<(), DiskError> {
            self.reads.fetch_add(1, Ordering::Relaxed);
            let off = (lba * 512) as usize;
            let end = off.checked_add(buffer.len()).ok_or(DiskError::OutOfRange)?;
            if end > self.data.len() {
                return Err(DiskError::OutOfRange);
            }
            buffer.copy_from_slice(&self.data[off..end]);
            Ok(())
        }
    }

    // ── Synthetic image: 512 B sectors, 1 sector/cluster, 32 reserved
    //    sectors, 2 FATs of 16 sectors → data starts at sector 64 ───────────

    const RESERVED: usize = 32;
    const DATA_START: usize = 64;
    const TOTAL_SECTORS: usize = 192;
    const EOC: u32 = 0x0FFF_FFFF;

    fn blank_image() -> Vec<u8> {
        let mut img = vec![0u8; TOTAL_SECTORS * 512];
        let boot = boot_sector_bytes(0x29, TOTAL_SECTORS as u32, 1, RESERVED as u16, 2, 16, 2);
        img[..512].copy_from_slice(&boot);
        img
    }

    fn set_fat(img: &mut [u8], cluster: u32, value: u32) {
        let off = RESERVED * 512 + cluster as usize * 4;
        img[off..off + 4].copy_from_slice(&value.to_le_bytes());
    }

    fn cluster_offset(cluster: u32) -> usize {
        (DATA_START + cluster as usize - 2) * 512
    }

    fn write_root_dir(img: &mut [u8], records: &[[u8; DIR_ENTRY_SIZE]]) {
        set_fat(img, 2, EOC);
        let base = cluster_offset(2);
        for (i, rec) in records.iter().enumerate() {
            img[base + i * DIR_ENTRY_SIZE..base + (i + 1) * DIR_ENTRY_SIZE].copy_from_slice(rec);
        }
    }

    /// Image whose root holds one long-named file at clusters 5→6.
    fn image_with_report(size: u32) -> Vec<u8> {
        let mut img = blank_image();
        write_root_dir(
            &mut img,
            &[
                lfn_fragment(0x42, "ort.txt"),
                lfn_fragment(0x01, "quarterly-rep"),
                short_entry(b"REPORT  ", b"TXT", 0x20, 5, size),
            ],
        );
        set_fat(&mut img, 5, 6);
        set_fat(&mut img, 6, EOC);
        for i in 0..1024usize {
            img[cluster_offset(5) + i] = (i % 251) as u8;
        }
        img
    }

    fn mount_image(img: Vec<u8>) -> Arc<Fat32Volume> {
        Fat32Volume::mount(Arc::new(RamDisk::new(img)), "fat").unwrap()
    }

    // ── identify ─────────────────────────────────────────────────────────

    #[test]
    fn test_identify_fat32() {
        let disk = RamDisk::new(blank_image());
        assert_eq!(identify(&disk), Ok(true));
    }

    #[test]
    fn test_identify_blank_disk() {
        let disk = RamDisk::new(vec![0u8; 1024 * 1024]);
        assert_eq!(identify(&disk), Ok(false));
    }

    #[test]
    fn test_identify_disk_error() {
        let disk = RamDisk::new(vec![0u8; 100]);
        assert_eq!(identify(&disk), Err(FsError::Io));
    }

    // ── mount ────────────────────────────────────────────────────────────

    #[test]
    fn test_mount_builds_root_node() {
        let vol = mount_image(blank_image());
        let root = vol.root_node();
        assert_eq!(root.inode, 2);
        assert!(root.flags.contains(NodeFlags::DIRECTORY | NodeFlags::MOUNT_POINT));
        assert_eq!(root.name, "fat");
        assert_eq!(vol.cluster_size(), 512);

        let dirent = vol.mount_dirent();
        assert_eq!(dirent.inode, 2);
        assert_eq!(dirent.kind, FileKind::Directory);
    }

    #[test]
    fn test_mount_disk_error() {
        let result = Fat32Volume::mount(Arc::new(RamDisk::new(vec![0u8; 64])), "bad");
        assert!(matches!(result, Err(FsError::Io)));
    }

    #[test]
    fn test_mount_rejects_zero_cluster_geometry() {
        let mut img = blank_image();
        img[13] = 0; // sectors per cluster
        let result = Fat32Volume::mount(Arc::new(RamDisk::new(img)), "bad");
        assert!(matches!(result, Err(FsError::Corrupted)));
    }

    // ── cluster chains ───────────────────────────────────────────────────

    #[test]
    fn test_cluster_chain_sequence() {
        let mut img = blank_image();
        set_fat(&mut img, 5, 6);
        set_fat(&mut img, 6, 7);
        set_fat(&mut img, 7, EOC);
        let vol = mount_image(img);
        assert_eq!(vol.cluster_chain(5).unwrap(), vec![5, 6, 7]);
    }

    #[test]
    fn test_cluster_chain_masks_reserved_bits() {
        let mut img = blank_image();
        set_fat(&mut img, 5, 0xF000_0006); // top nibble must be ignored
        set_fat(&mut img, 6, EOC);
        let vol = mount_image(img);
        assert_eq!(vol.cluster_chain(5).unwrap(), vec![5, 6]);
    }

    #[test]
    fn test_cluster_chain_stops_at_free_entry() {
        let mut img = blank_image();
        set_fat(&mut img, 9, 10);
        // cluster 10's entry left zero
        let vol = mount_image(img);
        assert_eq!(vol.cluster_chain(9).unwrap(), vec![9, 10]);
    }

    #[test]
    fn test_cluster_chain_cycle_is_corruption() {
        let mut img = blank_image();
        set_fat(&mut img, 5, 6);
        set_fat(&mut img, 6, 5);
        let vol = mount_image(img);
        assert_eq!(vol.cluster_chain(5), Err(FsError::Corrupted));
    }

    #[test]
    fn test_cluster_chain_reserved_cluster_is_corruption() {
        let mut img = blank_image();
        set_fat(&mut img, 5, 1);
        let vol = mount_image(img);
        assert_eq!(vol.cluster_chain(5), Err(FsError::Corrupted));
    }

    #[test]
    fn test_chain_walk_caches_fat_block() {
        let mut img = blank_image();
        set_fat(&mut img, 5, 6);
        set_fat(&mut img, 6, 7);
        set_fat(&mut img, 7, EOC);
        let disk = Arc::new(RamDisk::new(img));
        let vol = Fat32Volume::mount(disk.clone(), "fat").unwrap();

        let before = disk.reads();
        vol.cluster_chain(5).unwrap();
        // All three FAT entries live in the same 4 KiB block.
        assert_eq!(disk.reads() - before, 1);
    }

    // ── file reads ───────────────────────────────────────────────────────

    #[test]
    fn test_read_file_contents() {
        let vol = mount_image(image_with_report(1000));
        let node = vol.root_node().find_dir("quarterly-report.txt").unwrap().unwrap();
        assert_eq!(node.inode, 5);
        assert_eq!(node.size, 1000);
        assert!(!node.is_directory());

        let mut buf = vec![0u8; 1000];
        assert_eq!(node.read(0, &mut buf).unwrap(), 1000);
        for (i, &b) in buf.iter().enumerate() {
            assert_eq!(b, (i % 251) as u8);
        }
    }

    #[test]
    fn test_read_at_offset() {
        let vol = mount_image(image_with_report(1000));
        let node = vol.root_node().find_dir("quarterly-report.txt").unwrap().unwrap();

        let mut buf = vec![0u8; 100];
        assert_eq!(node.read(600, &mut buf).unwrap(), 100);
        for (i, &b) in buf.iter().enumerate() {
            assert_eq!(b, ((600 + i) % 251) as u8);
        }
    }

    #[test]
    fn test_short_read_reports_zero_bytes() {
        let vol = mount_image(image_with_report(1000));
        let node = vol.root_node().find_dir("quarterly-report.txt").unwrap().unwrap();

        // The chain covers 1024 bytes; asking for more must transfer none.
        let mut buf = vec![0u8; 2048];
        assert_eq!(node.read(0, &mut buf).unwrap(), 0);
        assert!(buf.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_read_refuses_directory_and_root_sentinel() {
        let img = image_with_report(1000);
        let disk = Arc::new(RamDisk::new(img));
        let vol = Fat32Volume::mount(disk.clone(), "fat").unwrap();

        let before = disk.reads();
        let mut buf = [0u8; 16];
        assert_eq!(vol.root_node().read(0, &mut buf).unwrap(), 0);

        let zero = FileNode::new("zero", 0, 16, NodeFlags::FILE, Arc::<Fat32Volume>::downgrade(&vol));
        assert_eq!(zero.read(0, &mut buf).unwrap(), 0);
        // Neither refusal may touch the device.
        assert_eq!(disk.reads(), before);
    }

    #[test]
    fn test_read_failure_propagates() {
        // Chain points into clusters past the end of the image.
        let mut img = blank_image();
        write_root_dir(&mut img, &[short_entry(b"DEEP    ", b"BIN", 0x20, 150, 512)]);
        set_fat(&mut img, 150, EOC);
        let vol = mount_image(img);
        let node = vol.root_node().find_dir("DEEP.BIN").unwrap().unwrap();
        let mut buf = [0u8; 512];
        assert_eq!(node.read(0, &mut buf), Err(FsError::Io));
    }

    // ── directory operations ─────────────────────────────────────────────

    #[test]
    fn test_read_dir_prefers_long_name() {
        let vol = mount_image(image_with_report(1000));
        let entry = vol.root_node().read_dir(0).unwrap().unwrap();
        assert_eq!(entry.name, "quarterly-report.txt");
        assert_eq!(entry.inode, 5);
        assert_eq!(entry.kind, FileKind::File);
    }

    #[test]
    fn test_read_dir_past_end() {
        let vol = mount_image(image_with_report(1000));
        assert_eq!(vol.root_node().read_dir(1).unwrap(), None);
        assert_eq!(vol.root_node().read_dir(17).unwrap(), None);
    }

    #[test]
    fn test_read_dir_index_counts_real_entries_only() {
        let mut img = blank_image();
        write_root_dir(
            &mut img,
            &[
                short_entry(b"VOLLABEL", b"   ", file_attr::ATTR_VOLUME_ID, 0, 0),
                lfn_fragment(0x41, "alpha.txt"),
                short_entry(b"ALPHA   ", b"TXT", 0x20, 5, 1),
                short_entry(b"BETA    ", b"TXT", 0x20, 6, 2),
            ],
        );
        let vol = mount_image(img);
        assert_eq!(vol.root_node().read_dir(0).unwrap().unwrap().name, "alpha.txt");
        assert_eq!(vol.root_node().read_dir(1).unwrap().unwrap().name, "BETA.TXT");
        assert_eq!(vol.root_node().read_dir(2).unwrap(), None);
    }

    #[test]
    fn test_unterminated_directory_is_corruption() {
        let mut img = blank_image();
        // Fill the root cluster with 16 real records and no terminator.
        let records: Vec<[u8; DIR_ENTRY_SIZE]> =
            (0..16).map(|i| short_entry(b"FILE    ", b"BIN", 0x20, 20 + i, 1)).collect();
        write_root_dir(&mut img, &records);
        let vol = mount_image(img);
        assert_eq!(vol.root_node().read_dir(0).unwrap().unwrap().name, "FILE.BIN");
        assert_eq!(vol.root_node().read_dir(16), Err(FsError::Corrupted));
    }

    #[test]
    fn test_find_dir_miss_is_none() {
        let vol = mount_image(image_with_report(1000));
        assert_eq!(vol.root_node().find_dir("nosuch.txt").unwrap(), None);
    }

    #[test]
    fn test_find_dir_name_match_is_exact() {
        let vol = mount_image(image_with_report(1000));
        // Names compare as stored on disk.
        assert!(vol.root_node().find_dir("QUARTERLY-REPORT.TXT").unwrap().is_none());
    }

    #[test]
    fn test_find_dir_root_resolves_to_singleton() {
        let mut img = blank_image();
        write_root_dir(
            &mut img,
            &[
                short_entry(b"ROOTLINK", b"   ", file_attr::ATTR_DIRECTORY, 2, 0),
                short_entry(b"ZEROLINK", b"   ", file_attr::ATTR_DIRECTORY, 0, 0),
            ],
        );
        let vol = mount_image(img);
        let root = vol.root_node();

        let by_cluster = root.find_dir("ROOTLINK").unwrap().unwrap();
        assert!(Arc::ptr_eq(&root, &by_cluster));

        let by_sentinel = root.find_dir("ZEROLINK").unwrap().unwrap();
        assert!(Arc::ptr_eq(&root, &by_sentinel));
    }

    #[test]
    fn test_find_dir_on_file_node() {
        let vol = mount_image(image_with_report(1000));
        let node = vol.root_node().find_dir("quarterly-report.txt").unwrap().unwrap();
        assert_eq!(node.find_dir("anything"), Err(FsError::NotDirectory));
        assert_eq!(node.read_dir(0), Err(FsError::NotDirectory));
    }

    #[test]
    fn test_subdirectory_traversal() {
        let mut img = blank_image();
        write_root_dir(&mut img, &[short_entry(b"APPS    ", b"   ", file_attr::ATTR_DIRECTORY, 8, 0)]);
        set_fat(&mut img, 8, EOC);
        let base = cluster_offset(8);
        let inner = short_entry(b"TOOL    ", b"ELF", 0x20, 9, 4);
        img[base..base + DIR_ENTRY_SIZE].copy_from_slice(&inner);
        set_fat(&mut img, 9, EOC);
        img[cluster_offset(9)..cluster_offset(9) + 4].copy_from_slice(b"exec");

        let vol = mount_image(img);
        let apps = vol.root_node().find_dir("APPS").unwrap().unwrap();
        assert!(apps.is_directory());

        let tool = apps.find_dir("TOOL.ELF").unwrap().unwrap();
        let mut buf = [0u8; 4];
        assert_eq!(tool.read(0, &mut buf).unwrap(), 4);
        assert_eq!(&buf, b"exec");
    }

    // ── operation table ──────────────────────────────────────────────────

    #[test]
    fn test_write_fails_loudly() {
        let vol = mount_image(image_with_report(1000));
        let node = vol.root_node().find_dir("quarterly-report.txt").unwrap().unwrap();
        assert_eq!(node.write(0, b"data"), Err(FsError::NotSupported));
    }

    #[test]
    fn test_open_close_are_noops() {
        let vol = mount_image(blank_image());
        let root = vol.root_node();
        assert_eq!(root.open(0), Ok(()));
        assert_eq!(root.close(), Ok(()));
    }

    #[test]
    fn test_node_outliving_volume() {
        let vol = mount_image(image_with_report(1000));
        let node = vol.root_node().find_dir("quarterly-report.txt").unwrap().unwrap();
        drop(vol);
        let mut buf = [0u8; 4];
        assert_eq!(node.read(0, &mut buf), Err(FsError::NotMounted));
    }

    // ── mount table ──────────────────────────────────────────────────────

    #[test]
    fn test_mount_table_registration() {
        let vol = mount_volume(Arc::new(RamDisk::new(blank_image())), "tracked").unwrap();
        let count = mount_count();
        assert!(count >= 1);
        let registered =
            (0..count).filter_map(get_mount).any(|m| Arc::ptr_eq(&m, &vol));
        assert!(registered);
        assert!(get_mount(count + 10).is_none());
    }

    // ── cross-checks against fatfs-formatted images ──────────────────────

    /// Format a real FAT32 volume in memory with `fatfs`. With the Fat32
    /// type hint fatfs picks 512-byte clusters, so FAT32's minimum of
    /// 65 525 data clusters needs ~34 MB; use 40 MB.
    fn fatfs_image() -> Vec<u8> {
        let mut cursor = std::io::Cursor::new(vec![0u8; 40 * 1024 * 1024]);
        fatfs::format_volume(
            &mut cursor,
            fatfs::FormatVolumeOptions::new().fat_type(fatfs::FatType::Fat32),
        )
        .expect("format_volume failed");
        cursor.into_inner()
    }

    fn fatfs_image_with(files: &[(&str, &[u8])]) -> Vec<u8> {
        let mut img = fatfs_image();
        {
            let mut cursor = std::io::Cursor::new(&mut img);
            let fs = fatfs::FileSystem::new(&mut cursor, fatfs::FsOptions::new()).unwrap();
            for (name, content) in files {
                let mut f = fs.root_dir().create_file(name).unwrap();
                f.write_all(content).unwrap();
            }
        }
        img
    }

    #[test]
    fn test_fatfs_identify() {
        let disk = RamDisk::new(fatfs_image());
        assert_eq!(identify(&disk), Ok(true));
    }

    #[test]
    fn test_fatfs_long_name_lookup_and_read() {
        let content: Vec<u8> = (0..5000u32).map(|i| (i % 241) as u8).collect();
        let img = fatfs_image_with(&[("a-rather-long-file-name.bin", &content)]);
        let vol = mount_image(img);

        let node = vol.root_node().find_dir("a-rather-long-file-name.bin").unwrap().unwrap();
        assert_eq!(node.size as usize, content.len());

        let mut buf = vec![0u8; content.len()];
        assert_eq!(node.read(0, &mut buf).unwrap(), content.len());
        assert_eq!(buf, content);
    }

    #[test]
    fn test_fatfs_enumeration_sees_all_files() {
        let img = fatfs_image_with(&[
            ("FIRST.TXT", b"1" as &[u8]),
            ("SECOND.TXT", b"2"),
            ("third-long-filename.txt", b"3"),
        ]);
        let vol = mount_image(img);
        let root = vol.root_node();

        let mut names = Vec::new();
        let mut index = 0;
        while let Some(entry) = root.read_dir(index).unwrap() {
            names.push(entry.name);
            index += 1;
        }
        for expected in ["FIRST.TXT", "SECOND.TXT", "third-long-filename.txt"] {
            assert!(names.iter().any(|n| n == expected), "missing {expected} in {names:?}");
        }
    }

    #[test]
    fn test_fatfs_subdirectory() {
        let mut img = fatfs_image();
        {
            let mut cursor = std::io::Cursor::new(&mut img);
            let fs = fatfs::FileSystem::new(&mut cursor, fatfs::FsOptions::new()).unwrap();
            let dir = fs.root_dir().create_dir("apps").unwrap();
            let mut f = dir.create_file("tool.cfg").unwrap();
            f.write_all(b"threads=4\n").unwrap();
        }
        let vol = mount_image(img);

        let apps = vol.root_node().find_dir("apps").unwrap().unwrap();
        assert!(apps.is_directory());
        let cfg = apps.find_dir("tool.cfg").unwrap().unwrap();
        let mut buf = vec![0u8; cfg.size as usize];
        assert_eq!(cfg.read(0, &mut buf).unwrap(), buf.len());
        assert_eq!(&buf, b"threads=4\n");
    }

    #[test]
    fn test_fatfs_contents_match_reference_reader() {
        let content: Vec<u8> = (0..10_000u32).map(|i| (i ^ 0x5A) as u8).collect();
        let mut img = fatfs_image_with(&[("CROSS.BIN", &content)]);

        let reference = {
            let mut cursor = std::io::Cursor::new(&mut img);
            let fs = fatfs::FileSystem::new(&mut cursor, fatfs::FsOptions::new()).unwrap();
            let mut f = fs.root_dir().open_file("CROSS.BIN").unwrap();
            let mut buf = Vec::new();
            f.read_to_end(&mut buf).unwrap();
            buf
        };

        let vol = mount_image(img);
        let node = vol.root_node().find_dir("CROSS.BIN").unwrap().unwrap();
        let mut buf = vec![0u8; node.size as usize];
        assert_eq!(node.read(0, &mut buf).unwrap(), buf.len());
        assert_eq!(buf, reference);
    }
}

//! FAT32 Boot Record
//!
//! The first sector of the partition carries the BIOS Parameter Block and,
//! for FAT32, an Extended Boot Record. Together they describe the volume
//! geometry everything else derives from.
//!
//! # Boot Sector Layout (512 bytes)
//! - Bytes 0-2: Jump instruction
//! - Bytes 3-10: OEM identifier
//! - Bytes 11-35: BIOS Parameter Block
//! - Bytes 36-89: Extended Boot Record (FAT32)
//! - Bytes 90-509: Boot code
//! - Bytes 510-511: Signature (0x55, 0xAA)

/// Boot sector size in bytes.
pub const BOOT_SECTOR_SIZE: usize = 512;

/// Standard FAT32 cluster-count threshold. A volume with this many data
/// clusters or fewer is FAT16 (or smaller), whatever its signature claims.
pub const MIN_FAT32_CLUSTERS: u32 = 65525;

/// BIOS Parameter Block (bytes 11-35 of the boot sector).
#[repr(C, packed)]
#[derive(Clone, Copy)]
pub struct BiosParameterBlock {
    pub bytes_per_sector: u16,
    pub sectors_per_cluster: u8,
    pub reserved_sectors: u16,
    pub fat_count: u8,
    /// Root directory entries; always 0 on FAT32.
    pub root_entry_count: u16,
    /// 16-bit total sector count; 0 on FAT32.
    pub total_sectors_16: u16,
    pub media_type: u8,
    /// 16-bit sectors per FAT; 0 on FAT32.
    pub sectors_per_fat_16: u16,
    pub sectors_per_track: u16,
    pub head_count: u16,
    pub hidden_sectors: u32,
    /// 32-bit total sector count, the authoritative one on FAT32.
    pub large_sector_count: u32,
}

impl BiosParameterBlock {
    pub fn bytes_per_sector(&self) -> u16 {
        u16::from_le(self.bytes_per_sector)
    }

    pub fn reserved_sectors(&self) -> u16 {
        u16::from_le(self.reserved_sectors)
    }

    pub fn large_sector_count(&self) -> u32 {
        u32::from_le(self.large_sector_count)
    }
}

/// FAT32 Extended Boot Record (bytes 36-89 of the boot sector).
#[repr(C, packed)]
#[derive(Clone, Copy)]
pub struct ExtendedBootRecord {
    /// Sectors per FAT (32-bit).
    pub sectors_per_fat: u32,
    pub ext_flags: u16,
    pub fs_version: u16,
    /// First cluster of the root directory.
    pub root_cluster: u32,
    pub fsinfo_sector: u16,
    pub backup_boot_sector: u16,
    pub reserved: [u8; 12],
    pub drive_number: u8,
    pub reserved1: u8,
    /// Extended boot signature; 0x28 or 0x29 on a valid volume.
    pub signature: u8,
    pub volume_serial: u32,
    /// Volume label, space-padded.
    pub volume_label: [u8; 11],
    /// Filesystem type string ("FAT32   ").
    pub fs_type: [u8; 8],
}

impl ExtendedBootRecord {
    pub fn sectors_per_fat(&self) -> u32 {
        u32::from_le(self.sectors_per_fat)
    }

    pub fn root_cluster(&self) -> u32 {
        u32::from_le(self.root_cluster)
    }

    /// Volume label with the space padding stripped.
    pub fn volume_label_str(&self) -> &str {
        let len = self
            .volume_label
            .iter()
            .rposition(|&b| b != b' ')
            .map(|p| p + 1)
            .unwrap_or(0);
        core::str::from_utf8(&self.volume_label[..len]).unwrap_or("")
    }
}

/// Complete FAT32 boot sector.
#[repr(C, packed)]
#[derive(Clone, Copy)]
pub struct Fat32BootSector {
    pub jump: [u8; 3],
    pub oem: [u8; 8],
    pub bpb: BiosParameterBlock,
    pub ebr: ExtendedBootRecord,
    pub boot_code: [u8; 420],
    pub signature: [u8; 2],
}

const _: () = assert!(core::mem::size_of::<Fat32BootSector>() == BOOT_SECTOR_SIZE);

impl Fat32BootSector {
    /// Copy a boot sector out of a raw sector buffer. `None` when the
    /// buffer is shorter than a sector.
    pub fn from_bytes(buf: &[u8]) -> Option<Self> {
        if buf.len() < BOOT_SECTOR_SIZE {
            return None;
        }
        // Alignment is 1 (packed), but go through read_unaligned anyway;
        // the source is an arbitrary byte buffer.
        Some(unsafe { core::ptr::read_unaligned(buf.as_ptr() as *const Fat32BootSector) })
    }

    /// OEM identifier with trailing padding stripped.
    pub fn oem_str(&self) -> &str {
        let len = self
            .oem
            .iter()
            .rposition(|&b| b != b' ' && b != 0)
            .map(|p| p + 1)
            .unwrap_or(0);
        core::str::from_utf8(&self.oem[..len]).unwrap_or("")
    }

    /// Data clusters on the volume: total sectors minus the reserved and
    /// FAT regions, divided by the cluster size.
    pub fn data_cluster_count(&self) -> u32 {
        let spc = self.bpb.sectors_per_cluster as u32;
        if spc == 0 {
            return 0;
        }
        let overhead = self.bpb.reserved_sectors() as u32
            + self.ebr.sectors_per_fat() * self.bpb.fat_count as u32;
        let data_sectors = self.bpb.large_sector_count().saturating_sub(overhead);
        data_sectors / spc
    }

    /// The FAT32 detection predicate: a valid extended-boot-record
    /// signature and more data clusters than FAT16 can address.
    pub fn is_fat32(&self) -> bool {
        matches!(self.ebr.signature, 0x28 | 0x29) && self.data_cluster_count() > MIN_FAT32_CLUSTERS
    }
}

/// FAT table entry values.
///
/// Entries are 32-bit little-endian; the top 4 bits are reserved and must
/// be masked off before interpretation.
pub mod cluster_values {
    /// Mask for the 28 significant bits.
    pub const CLUSTER_MASK: u32 = 0x0FFF_FFFF;
    /// Free cluster.
    pub const FREE: u32 = 0x0000_0000;
    /// End-of-chain sentinel range starts here.
    pub const EOC_MIN: u32 = 0x0FFF_FFF8;

    /// Entry terminates its chain.
    pub fn is_end_of_chain(entry: u32) -> bool {
        (entry & CLUSTER_MASK) >= EOC_MIN
    }

    /// Entry marks a free cluster.
    pub fn is_free(entry: u32) -> bool {
        (entry & CLUSTER_MASK) == FREE
    }
}

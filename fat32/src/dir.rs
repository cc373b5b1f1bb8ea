//! FAT32 Directory Entry Decoding
//!
//! A directory is a cluster chain of consecutive 32-byte records. Each
//! record is classified as end-of-directory, deleted, a long-filename
//! fragment, a volume-label pseudo-entry, or a real short (8.3) entry.
//!
//! # Long File Names (LFN)
//! A long name is stored as a run of fragment records immediately before
//! its short entry, each holding up to 13 UTF-16 characters, in reverse
//! order: the fragment nearest the short entry carries the first 13
//! characters. Reconstruction therefore walks the run back-to-front.

use alloc::string::String;
use alloc::vec::Vec;

use crate::vfs::{truncate_name, FsError};

/// Directory record size.
pub const DIR_ENTRY_SIZE: usize = 32;

/// Characters carried by one LFN fragment.
pub const LFN_CHARS_PER_ENTRY: usize = 13;

/// File attribute bits.
pub mod file_attr {
    pub const ATTR_READ_ONLY: u8 = 0x01;
    pub const ATTR_HIDDEN: u8 = 0x02;
    pub const ATTR_SYSTEM: u8 = 0x04;
    pub const ATTR_VOLUME_ID: u8 = 0x08;
    pub const ATTR_DIRECTORY: u8 = 0x10;
    pub const ATTR_ARCHIVE: u8 = 0x20;
    /// All four name-type bits set marks a long-filename fragment.
    pub const ATTR_LFN: u8 = ATTR_READ_ONLY | ATTR_HIDDEN | ATTR_SYSTEM | ATTR_VOLUME_ID;
    /// Mask for LFN detection.
    pub const ATTR_LFN_MASK: u8 = 0x3F;
}

/// Special first-byte values of the name field.
pub mod entry_status {
    /// Entry deleted / unused.
    pub const FREE: u8 = 0xE5;
    /// Entry unused and no entries follow.
    pub const END: u8 = 0x00;
    /// Stand-in for a real first byte of 0xE5.
    pub const KANJI: u8 = 0x05;
}

/// Short (8.3) directory entry, bit-exact with the on-disk record.
#[repr(C, packed)]
#[derive(Clone, Copy)]
pub struct RawDirEntry {
    /// File name, space-padded.
    pub name: [u8; 8],
    /// Extension, space-padded.
    pub ext: [u8; 3],
    pub attr: u8,
    pub nt_res: u8,
    pub create_time_tenth: u8,
    pub create_time: u16,
    pub create_date: u16,
    pub access_date: u16,
    /// High 16 bits of the starting cluster.
    pub cluster_hi: u16,
    pub modify_time: u16,
    pub modify_date: u16,
    /// Low 16 bits of the starting cluster.
    pub cluster_lo: u16,
    pub file_size: u32,
}

const _: () = assert!(core::mem::size_of::<RawDirEntry>() == DIR_ENTRY_SIZE);

impl RawDirEntry {
    /// Copy a record out of a raw buffer. `None` when the buffer is
    /// shorter than one record.
    pub fn from_bytes(buf: &[u8]) -> Option<Self> {
        if buf.len() < DIR_ENTRY_SIZE {
            return None;
        }
        Some(unsafe { core::ptr::read_unaligned(buf.as_ptr() as *const RawDirEntry) })
    }

    /// End of directory: no entry here and none after.
    pub fn is_end(&self) -> bool {
        self.name[0] == entry_status::END
    }

    /// Deleted or never-used entry.
    pub fn is_free(&self) -> bool {
        self.name[0] == entry_status::FREE
    }

    /// Long-filename fragment rather than a real entry.
    pub fn is_lfn(&self) -> bool {
        (self.attr & file_attr::ATTR_LFN_MASK) == file_attr::ATTR_LFN
    }

    /// Volume-label pseudo-entry.
    pub fn is_volume_label(&self) -> bool {
        (self.attr & file_attr::ATTR_VOLUME_ID) != 0 && !self.is_lfn()
    }

    pub fn is_directory(&self) -> bool {
        (self.attr & file_attr::ATTR_DIRECTORY) != 0
    }

    /// Starting cluster, combined from the split high/low words.
    pub fn first_cluster(&self) -> u32 {
        ((u16::from_le(self.cluster_hi) as u32) << 16) | u16::from_le(self.cluster_lo) as u32
    }

    pub fn file_size(&self) -> u32 {
        u32::from_le(self.file_size)
    }

    /// Synthesize the 8.3 display name: name with trailing pad spaces
    /// stripped, then `.` and the extension when the extension field is
    /// non-blank.
    pub fn short_name(&self) -> String {
        let mut out = String::new();
        let name_len = self.name.iter().rposition(|&b| b != b' ').map_or(0, |p| p + 1);
        for (i, &b) in self.name[..name_len].iter().enumerate() {
            let b = if i == 0 && b == entry_status::KANJI { 0xE5 } else { b };
            out.push(b as char);
        }
        let ext_len = self.ext.iter().rposition(|&b| b != b' ').map_or(0, |p| p + 1);
        if ext_len > 0 {
            out.push('.');
            for &b in &self.ext[..ext_len] {
                out.push(b as char);
            }
        }
        out
    }
}

/// Long-filename fragment record, bit-exact with the on-disk record.
#[repr(C, packed)]
#[derive(Clone, Copy)]
pub struct LfnEntry {
    /// Sequence number; bit 6 marks the last fragment of the run.
    pub sequence: u8,
    /// Characters 1-5.
    pub name1: [u16; 5],
    /// Always `ATTR_LFN`.
    pub attr: u8,
    pub entry_type: u8,
    /// Checksum of the companion short name.
    pub checksum: u8,
    /// Characters 6-11.
    pub name2: [u16; 6],
    /// Always 0.
    pub cluster: u16,
    /// Characters 12-13.
    pub name3: [u16; 2],
}

const _: () = assert!(core::mem::size_of::<LfnEntry>() == DIR_ENTRY_SIZE);

impl LfnEntry {
    pub fn from_bytes(buf: &[u8]) -> Option<Self> {
        if buf.len() < DIR_ENTRY_SIZE {
            return None;
        }
        Some(unsafe { core::ptr::read_unaligned(buf.as_ptr() as *const LfnEntry) })
    }

    /// The fragment's UTF-16 units in name order.
    pub fn chars(&self) -> [u16; LFN_CHARS_PER_ENTRY] {
        let mut units = [0u16; LFN_CHARS_PER_ENTRY];
        // Unaligned reads: the struct is packed.
        unsafe {
            let name1: [u16; 5] = core::ptr::read_unaligned(core::ptr::addr_of!(self.name1));
            let name2: [u16; 6] = core::ptr::read_unaligned(core::ptr::addr_of!(self.name2));
            let name3: [u16; 2] = core::ptr::read_unaligned(core::ptr::addr_of!(self.name3));
            units[0..5].copy_from_slice(&name1);
            units[5..11].copy_from_slice(&name2);
            units[11..13].copy_from_slice(&name3);
        }
        for u in units.iter_mut() {
            *u = u16::from_le(*u);
        }
        units
    }
}

/// One real directory entry with its name fully reconstructed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedEntry {
    pub name: String,
    pub first_cluster: u32,
    pub size: u32,
    pub is_directory: bool,
}

/// Walks a directory buffer record by record, yielding each real entry
/// with its long name reconstructed from any preceding fragment run.
///
/// Deleted and volume-label records reset an in-progress fragment run;
/// neither consumes an enumeration slot. Iteration ends cleanly at the
/// first zero record; a buffer that runs out before the terminator yields
/// [`FsError::Corrupted`].
pub struct DirScanner<'a> {
    buf: &'a [u8],
    index: usize,
    lfn_run: usize,
    done: bool,
}

impl<'a> DirScanner<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, index: 0, lfn_run: 0, done: false }
    }

    fn record(&self, index: usize) -> Option<RawDirEntry> {
        RawDirEntry::from_bytes(self.buf.get(index * DIR_ENTRY_SIZE..)?)
    }

    /// Concatenate the fragment run ending just before `entry_index`.
    /// Fragments are stored in reverse order, so the record immediately
    /// preceding the short entry holds the first 13 characters.
    fn long_name(&self, entry_index: usize, run: usize) -> String {
        let mut units: Vec<u16> = Vec::with_capacity(run * LFN_CHARS_PER_ENTRY);
        for k in 1..=run {
            let Some(frag) = self
                .buf
                .get((entry_index - k) * DIR_ENTRY_SIZE..)
                .and_then(LfnEntry::from_bytes)
            else {
                break;
            };
            for unit in frag.chars() {
                if unit == 0x0000 || unit == 0xFFFF {
                    break;
                }
                units.push(unit);
            }
        }
        let mut name: String = char::decode_utf16(units.into_iter())
            .map(|c| c.unwrap_or(char::REPLACEMENT_CHARACTER))
            .collect();
        truncate_name(&mut name);
        name
    }
}

impl<'a> Iterator for DirScanner<'a> {
    type Item = Result<DecodedEntry, FsError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        loop {
            let index = self.index;
            let Some(rec) = self.record(index) else {
                // Ran off the end of the chain without a terminating zero
                // record: the directory is corrupt.
                self.done = true;
                return Some(Err(FsError::Corrupted));
            };
            self.index += 1;

            if rec.is_end() {
                self.done = true;
                return None;
            }
            if rec.is_free() {
                self.lfn_run = 0;
                continue;
            }
            if rec.is_lfn() {
                self.lfn_run += 1;
                continue;
            }
            if rec.is_volume_label() {
                self.lfn_run = 0;
                continue;
            }

            let run = self.lfn_run.min(index);
            self.lfn_run = 0;
            let name = if run > 0 { self.long_name(index, run) } else { rec.short_name() };
            return Some(Ok(DecodedEntry {
                name,
                first_cluster: rec.first_cluster(),
                size: rec.file_size(),
                is_directory: rec.is_directory(),
            }));
        }
    }
}

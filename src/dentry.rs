//! Directory entry classification and typed record views.
//!
//! Every exFAT directory entry is 32 bytes and its first byte alone selects
//! the layout. Classification runs at two levels: `Basic` looks only at the
//! type byte, `Strict` adds the type-specific structural checks needed before
//! a record's fields are trusted.

use serde::Serialize;

use crate::boot::VolumeGeometry;
use crate::bytes::{all_zero, u16_at, u32_at, u64_at};
use crate::timestamp::ExfatTimestamp;

/// Size of every directory entry
pub const DENTRY_SIZE: usize = 32;

/// Up to 15 UTF-16 characters fit in one file name entry
pub const MAX_FILE_NAME_SEGMENT_LENGTH: usize = 15;

/// Up to 15 UTF-16 characters in a volume label entry
pub const MAX_VOLUME_LABEL_LEN: usize = 15;

/// Secondary entries of a file: one stream and 1 to 17 name entries
pub const MIN_SECONDARY_COUNT: u8 = 2;
pub const MAX_SECONDARY_COUNT: u8 = 18;

/// General secondary flags
pub const ALLOCATION_POSSIBLE_MASK: u8 = 0x01;
pub const NO_FAT_CHAIN_MASK: u8 = 0x02;

/// High bit of the type byte marks an in-use entry
pub const IN_USE_MASK: u8 = 0x80;

/// A raw directory entry
pub type RawDentry = [u8; DENTRY_SIZE];

/// Entry type byte values
pub mod entry_type {
    pub const UNUSED: u8 = 0x00;
    pub const VOLUME_LABEL: u8 = 0x83;
    pub const VOLUME_LABEL_EMPTY: u8 = 0x03;
    pub const VOLUME_GUID: u8 = 0xA0;
    pub const ALLOC_BITMAP: u8 = 0x81;
    pub const UPCASE_TABLE: u8 = 0x82;
    pub const TEX_FAT: u8 = 0xA1;
    pub const ACT: u8 = 0xE2;
    pub const FILE: u8 = 0x85;
    pub const DELETED_FILE: u8 = 0x05;
    pub const FILE_STREAM: u8 = 0xC0;
    pub const DELETED_FILE_STREAM: u8 = 0x40;
    pub const FILE_NAME: u8 = 0xC1;
    pub const DELETED_FILE_NAME: u8 = 0x41;
}

/// Validation level for `classify`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strictness {
    /// Type byte only
    Basic,
    /// Type byte plus type-specific structural checks
    Strict,
}

/// Directory entry kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DentryType {
    Unused,
    VolumeLabel,
    VolumeLabelEmpty,
    VolumeGuid,
    AllocBitmap,
    UpcaseTable,
    TexFat,
    AccessControlTable,
    File,
    DeletedFile,
    FileStream,
    DeletedFileStream,
    FileName,
    DeletedFileName,
}

impl DentryType {
    /// Map a type byte to a known entry kind
    pub fn from_byte(byte: u8) -> Option<Self> {
        use entry_type::*;
        let ty = match byte {
            UNUSED => DentryType::Unused,
            VOLUME_LABEL => DentryType::VolumeLabel,
            VOLUME_LABEL_EMPTY => DentryType::VolumeLabelEmpty,
            VOLUME_GUID => DentryType::VolumeGuid,
            ALLOC_BITMAP => DentryType::AllocBitmap,
            UPCASE_TABLE => DentryType::UpcaseTable,
            TEX_FAT => DentryType::TexFat,
            ACT => DentryType::AccessControlTable,
            FILE => DentryType::File,
            DELETED_FILE => DentryType::DeletedFile,
            FILE_STREAM => DentryType::FileStream,
            DELETED_FILE_STREAM => DentryType::DeletedFileStream,
            FILE_NAME => DentryType::FileName,
            DELETED_FILE_NAME => DentryType::DeletedFileName,
            _ => return None,
        };
        Some(ty)
    }

    pub fn as_byte(self) -> u8 {
        use entry_type::*;
        match self {
            DentryType::Unused => UNUSED,
            DentryType::VolumeLabel => VOLUME_LABEL,
            DentryType::VolumeLabelEmpty => VOLUME_LABEL_EMPTY,
            DentryType::VolumeGuid => VOLUME_GUID,
            DentryType::AllocBitmap => ALLOC_BITMAP,
            DentryType::UpcaseTable => UPCASE_TABLE,
            DentryType::TexFat => TEX_FAT,
            DentryType::AccessControlTable => ACT,
            DentryType::File => FILE,
            DentryType::DeletedFile => DELETED_FILE,
            DentryType::FileStream => FILE_STREAM,
            DentryType::DeletedFileStream => DELETED_FILE_STREAM,
            DentryType::FileName => FILE_NAME,
            DentryType::DeletedFileName => DELETED_FILE_NAME,
        }
    }

    /// Deleted file, stream and name entries
    pub fn is_deleted(self) -> bool {
        matches!(
            self,
            DentryType::DeletedFile | DentryType::DeletedFileStream | DentryType::DeletedFileName
        )
    }

    pub fn is_file(self) -> bool {
        matches!(self, DentryType::File | DentryType::DeletedFile)
    }

    pub fn is_stream(self) -> bool {
        matches!(self, DentryType::FileStream | DentryType::DeletedFileStream)
    }

    pub fn is_name(self) -> bool {
        matches!(self, DentryType::FileName | DentryType::DeletedFileName)
    }

    /// Entries only found in the root directory
    pub fn is_root_only(self) -> bool {
        matches!(
            self,
            DentryType::VolumeLabel
                | DentryType::VolumeLabelEmpty
                | DentryType::VolumeGuid
                | DentryType::AllocBitmap
                | DentryType::UpcaseTable
                | DentryType::TexFat
                | DentryType::AccessControlTable
        )
    }

    pub fn label(self) -> &'static str {
        match self {
            DentryType::Unused => "unused",
            DentryType::VolumeLabel => "volume label",
            DentryType::VolumeLabelEmpty => "empty volume label",
            DentryType::VolumeGuid => "volume GUID",
            DentryType::AllocBitmap => "allocation bitmap",
            DentryType::UpcaseTable => "up-case table",
            DentryType::TexFat => "TexFAT",
            DentryType::AccessControlTable => "access control table",
            DentryType::File => "file",
            DentryType::DeletedFile => "deleted file",
            DentryType::FileStream => "file stream",
            DentryType::DeletedFileStream => "deleted file stream",
            DentryType::FileName => "file name",
            DentryType::DeletedFileName => "deleted file name",
        }
    }
}

impl std::fmt::Display for DentryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (0x{:02X})", self.label(), self.as_byte())
    }
}

/// Borrow the first 32 bytes of a buffer as a directory entry.
pub fn raw_dentry(data: &[u8]) -> Option<&RawDentry> {
    data.get(..DENTRY_SIZE)?.try_into().ok()
}

/// Classify a raw record, or `None` when it is not a directory entry.
pub fn classify(
    record: &RawDentry,
    geometry: &VolumeGeometry,
    strictness: Strictness,
) -> Option<DentryType> {
    let ty = DentryType::from_byte(record[0])?;
    if strictness == Strictness::Strict && !passes_strict_checks(ty, record, geometry) {
        log::trace!("{} failed strict validation", ty);
        return None;
    }
    Some(ty)
}

fn passes_strict_checks(ty: DentryType, record: &RawDentry, geometry: &VolumeGeometry) -> bool {
    match ty {
        DentryType::Unused | DentryType::TexFat | DentryType::AccessControlTable => true,
        DentryType::VolumeLabel => {
            let count = record[1] as usize;
            (1..=MAX_VOLUME_LABEL_LEN).contains(&count)
        }
        DentryType::VolumeLabelEmpty => record[1] == 0 && all_zero(&record[2..]),
        DentryType::VolumeGuid => VolumeGuidDentry::parse(record).secondary_count == 0,
        DentryType::AllocBitmap => AllocBitmapDentry::parse(record).is_consistent(geometry),
        DentryType::UpcaseTable => UpcaseTableDentry::parse(record).is_consistent(geometry),
        DentryType::File | DentryType::DeletedFile => {
            FileDentry::parse(record).is_consistent()
        }
        DentryType::FileStream | DentryType::DeletedFileStream => {
            StreamDentry::parse(record).is_consistent(geometry)
        }
        DentryType::FileName | DentryType::DeletedFileName => NameDentry::parse(record).flags == 0,
    }
}

/// Whether the reserved regions of a record are zero.
///
/// A non-zero reserved region is a tamper or corruption signal only.
pub fn reserved_bytes_zero(ty: DentryType, record: &RawDentry) -> bool {
    match ty {
        DentryType::File | DentryType::DeletedFile => {
            all_zero(&record[6..8]) && all_zero(&record[25..32])
        }
        DentryType::FileStream | DentryType::DeletedFileStream => {
            record[2] == 0 && all_zero(&record[6..8]) && all_zero(&record[16..20])
        }
        DentryType::AllocBitmap => all_zero(&record[2..20]),
        DentryType::UpcaseTable => all_zero(&record[1..4]) && all_zero(&record[8..20]),
        DentryType::VolumeGuid => all_zero(&record[22..32]),
        DentryType::TexFat | DentryType::AccessControlTable => all_zero(&record[1..]),
        DentryType::Unused => all_zero(&record[1..]),
        DentryType::VolumeLabel
        | DentryType::VolumeLabelEmpty
        | DentryType::FileName
        | DentryType::DeletedFileName => true,
    }
}

fn cluster_run_fits(geometry: &VolumeGeometry, first_cluster: u32, length: u64) -> bool {
    if !geometry.is_cluster_in_range(first_cluster as u64) {
        return false;
    }
    let clusters = length.div_ceil(geometry.cluster_size());
    let available = geometry.last_cluster() - first_cluster as u64 + 1;
    clusters <= available
}

bitflags::bitflags! {
    /// File attribute flags of a file directory entry
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
    pub struct FileAttributes: u16 {
        const READ_ONLY = 0x0001;
        const HIDDEN = 0x0002;
        const SYSTEM = 0x0004;
        const DIRECTORY = 0x0010;
        const ARCHIVE = 0x0020;
    }
}

impl FileAttributes {
    pub fn is_directory(&self) -> bool {
        self.contains(FileAttributes::DIRECTORY)
    }

    /// Short attribute string in `istat` style, e.g. "Directory, Hidden"
    pub fn describe(&self) -> String {
        let mut parts = vec![if self.is_directory() {
            "Directory"
        } else {
            "File"
        }];
        if self.contains(FileAttributes::READ_ONLY) {
            parts.push("Read Only");
        }
        if self.contains(FileAttributes::HIDDEN) {
            parts.push("Hidden");
        }
        if self.contains(FileAttributes::SYSTEM) {
            parts.push("System");
        }
        if self.contains(FileAttributes::ARCHIVE) {
            parts.push("Archive");
        }
        parts.join(", ")
    }
}

/// Primary entry of a file entry set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileDentry {
    pub entry_type: u8,
    pub secondary_count: u8,
    pub checksum: u16,
    pub raw_attributes: u16,
    pub created: ExfatTimestamp,
    pub modified: ExfatTimestamp,
    pub accessed: ExfatTimestamp,
}

impl FileDentry {
    pub fn parse(record: &RawDentry) -> Self {
        Self {
            entry_type: record[0],
            secondary_count: record[1],
            checksum: u16_at(record, 2),
            raw_attributes: u16_at(record, 4),
            created: ExfatTimestamp::new(u16_at(record, 10), u16_at(record, 8), record[20], record[22]),
            modified: ExfatTimestamp::new(u16_at(record, 14), u16_at(record, 12), record[21], record[23]),
            accessed: ExfatTimestamp::new(u16_at(record, 18), u16_at(record, 16), 0, record[24]),
        }
    }

    pub fn attributes(&self) -> FileAttributes {
        FileAttributes::from_bits_truncate(self.raw_attributes)
    }

    /// Number of file name entries the set declares
    pub fn name_entry_count(&self) -> usize {
        (self.secondary_count as usize).saturating_sub(1)
    }

    fn is_consistent(&self) -> bool {
        (MIN_SECONDARY_COUNT..=MAX_SECONDARY_COUNT).contains(&self.secondary_count)
            && FileAttributes::from_bits(self.raw_attributes).is_some()
    }
}

/// Stream extension entry, the first secondary of a file entry set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamDentry {
    pub entry_type: u8,
    pub flags: u8,
    pub name_length: u8,
    pub name_hash: u16,
    pub valid_data_length: u64,
    pub first_cluster: u32,
    pub data_length: u64,
}

impl StreamDentry {
    pub fn parse(record: &RawDentry) -> Self {
        Self {
            entry_type: record[0],
            flags: record[1],
            name_length: record[3],
            name_hash: u16_at(record, 4),
            valid_data_length: u64_at(record, 8),
            first_cluster: u32_at(record, 20),
            data_length: u64_at(record, 24),
        }
    }

    pub fn allocation_possible(&self) -> bool {
        self.flags & ALLOCATION_POSSIBLE_MASK != 0
    }

    /// Clusters are contiguous from the first cluster; the FAT is not used
    pub fn no_fat_chain(&self) -> bool {
        self.flags & NO_FAT_CHAIN_MASK != 0
    }

    fn is_consistent(&self, geometry: &VolumeGeometry) -> bool {
        if self.flags & !(ALLOCATION_POSSIBLE_MASK | NO_FAT_CHAIN_MASK) != 0 {
            return false;
        }
        if !self.allocation_possible() || self.first_cluster == 0 {
            // No allocation yet: nothing may be stored.
            return self.first_cluster == 0 && self.data_length == 0;
        }
        cluster_run_fits(geometry, self.first_cluster, self.data_length)
    }
}

/// File name extension entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NameDentry {
    pub entry_type: u8,
    pub flags: u8,
    pub chars: [u16; MAX_FILE_NAME_SEGMENT_LENGTH],
}

impl NameDentry {
    pub fn parse(record: &RawDentry) -> Self {
        let mut chars = [0u16; MAX_FILE_NAME_SEGMENT_LENGTH];
        for (i, ch) in chars.iter_mut().enumerate() {
            *ch = u16_at(record, 2 + i * 2);
        }
        Self {
            entry_type: record[0],
            flags: record[1],
            chars,
        }
    }
}

/// Allocation bitmap entry; two of them on TexFAT volumes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocBitmapDentry {
    pub flags: u8,
    pub first_cluster: u32,
    pub length: u64,
}

impl AllocBitmapDentry {
    pub fn parse(record: &RawDentry) -> Self {
        Self {
            flags: record[1],
            first_cluster: u32_at(record, 20),
            length: u64_at(record, 24),
        }
    }

    /// Bit 0 of the flags selects the second bitmap
    pub fn is_second_bitmap(&self) -> bool {
        self.flags & 0x01 != 0
    }

    fn is_consistent(&self, geometry: &VolumeGeometry) -> bool {
        let needed = (geometry.cluster_count as u64).div_ceil(8);
        self.flags & !0x01 == 0
            && self.length >= needed
            && cluster_run_fits(geometry, self.first_cluster, self.length)
    }
}

/// Up-case table entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpcaseTableDentry {
    pub table_checksum: u32,
    pub first_cluster: u32,
    pub length: u64,
}

impl UpcaseTableDentry {
    pub fn parse(record: &RawDentry) -> Self {
        Self {
            table_checksum: u32_at(record, 4),
            first_cluster: u32_at(record, 20),
            length: u64_at(record, 24),
        }
    }

    fn is_consistent(&self, geometry: &VolumeGeometry) -> bool {
        self.length > 0 && cluster_run_fits(geometry, self.first_cluster, self.length)
    }
}

/// Volume label entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VolumeLabelDentry {
    pub char_count: u8,
    pub chars: [u16; MAX_VOLUME_LABEL_LEN],
}

impl VolumeLabelDentry {
    pub fn parse(record: &RawDentry) -> Self {
        let mut chars = [0u16; MAX_VOLUME_LABEL_LEN];
        for (i, ch) in chars.iter_mut().enumerate() {
            *ch = u16_at(record, 2 + i * 2);
        }
        Self {
            char_count: record[1],
            chars,
        }
    }

    pub fn label(&self) -> String {
        let count = (self.char_count as usize).min(MAX_VOLUME_LABEL_LEN);
        String::from_utf16_lossy(&self.chars[..count])
    }
}

/// Volume GUID entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VolumeGuidDentry {
    pub secondary_count: u8,
    pub checksum: u16,
    pub flags: u16,
    pub guid: [u8; 16],
}

impl VolumeGuidDentry {
    pub fn parse(record: &RawDentry) -> Self {
        let mut guid = [0u8; 16];
        guid.copy_from_slice(&record[6..22]);
        Self {
            secondary_count: record[1],
            checksum: u16_at(record, 2),
            flags: u16_at(record, 4),
            guid,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::boot::tests::test_geometry;

    pub(crate) fn file_record(secondary_count: u8, attributes: u16) -> RawDentry {
        let mut record = [0u8; DENTRY_SIZE];
        record[0] = entry_type::FILE;
        record[1] = secondary_count;
        record[4..6].copy_from_slice(&attributes.to_le_bytes());
        record
    }

    pub(crate) fn stream_record(flags: u8, name_length: u8, first_cluster: u32, data_length: u64) -> RawDentry {
        let mut record = [0u8; DENTRY_SIZE];
        record[0] = entry_type::FILE_STREAM;
        record[1] = flags;
        record[3] = name_length;
        record[8..16].copy_from_slice(&data_length.to_le_bytes());
        record[20..24].copy_from_slice(&first_cluster.to_le_bytes());
        record[24..32].copy_from_slice(&data_length.to_le_bytes());
        record
    }

    pub(crate) fn name_record(chars: &[u16]) -> RawDentry {
        let mut record = [0u8; DENTRY_SIZE];
        record[0] = entry_type::FILE_NAME;
        for (i, ch) in chars.iter().take(MAX_FILE_NAME_SEGMENT_LENGTH).enumerate() {
            record[2 + i * 2..4 + i * 2].copy_from_slice(&ch.to_le_bytes());
        }
        record
    }

    pub(crate) fn bitmap_record(first_cluster: u32, length: u64) -> RawDentry {
        let mut record = [0u8; DENTRY_SIZE];
        record[0] = entry_type::ALLOC_BITMAP;
        record[20..24].copy_from_slice(&first_cluster.to_le_bytes());
        record[24..32].copy_from_slice(&length.to_le_bytes());
        record
    }

    #[test]
    fn test_unknown_types_rejected_at_both_levels() {
        let geometry = test_geometry();
        for byte in 0u8..=0xFF {
            let mut record = [0u8; DENTRY_SIZE];
            record[0] = byte;
            let known = DentryType::from_byte(byte).is_some();
            if !known {
                assert_eq!(classify(&record, &geometry, Strictness::Basic), None);
                assert_eq!(classify(&record, &geometry, Strictness::Strict), None);
            }
        }
        assert_eq!(DentryType::from_byte(0xFF), None);
    }

    #[test]
    fn test_type_byte_round_trip() {
        for byte in [0x00, 0x83, 0x03, 0xA0, 0x81, 0x82, 0xA1, 0xE2, 0x85, 0x05, 0xC0, 0x40, 0xC1, 0x41] {
            let ty = DentryType::from_byte(byte).unwrap();
            assert_eq!(ty.as_byte(), byte);
            assert_eq!(ty.is_deleted(), byte & IN_USE_MASK == 0 && byte != 0 && !ty.is_root_only());
        }
    }

    #[test]
    fn test_file_secondary_count_strict() {
        let geometry = test_geometry();
        let basic_only = file_record(1, 0);
        assert_eq!(classify(&basic_only, &geometry, Strictness::Basic), Some(DentryType::File));
        assert_eq!(classify(&basic_only, &geometry, Strictness::Strict), None);

        assert_eq!(classify(&file_record(19, 0), &geometry, Strictness::Strict), None);
        assert_eq!(
            classify(&file_record(18, 0x10), &geometry, Strictness::Strict),
            Some(DentryType::File)
        );
        // Unknown attribute bit
        assert_eq!(classify(&file_record(3, 0x0100), &geometry, Strictness::Strict), None);
    }

    #[test]
    fn test_deleted_variants_classify_alike() {
        let geometry = test_geometry();
        let mut record = file_record(3, 0x20);
        record[0] = entry_type::DELETED_FILE;
        assert_eq!(
            classify(&record, &geometry, Strictness::Strict),
            Some(DentryType::DeletedFile)
        );
        record[1] = 0;
        assert_eq!(classify(&record, &geometry, Strictness::Strict), None);
    }

    #[test]
    fn test_stream_strict_checks() {
        let geometry = test_geometry();
        let ok = stream_record(0x03, 5, 10, 1024);
        assert_eq!(classify(&ok, &geometry, Strictness::Strict), Some(DentryType::FileStream));

        // Empty file without allocation
        let empty = stream_record(0x01, 5, 0, 0);
        assert!(classify(&empty, &geometry, Strictness::Strict).is_some());

        // Data without a first cluster
        let bad = stream_record(0x01, 5, 0, 512);
        assert_eq!(classify(&bad, &geometry, Strictness::Strict), None);
        assert!(classify(&bad, &geometry, Strictness::Basic).is_some());

        // Allocation not possible but a cluster is recorded
        let bad = stream_record(0x00, 5, 10, 512);
        assert_eq!(classify(&bad, &geometry, Strictness::Strict), None);

        // Cluster beyond the heap
        let bad = stream_record(0x01, 5, 66, 512);
        assert_eq!(classify(&bad, &geometry, Strictness::Strict), None);

        // Run longer than the heap
        let bad = stream_record(0x03, 5, 60, 512 * 10);
        assert_eq!(classify(&bad, &geometry, Strictness::Strict), None);

        // Unknown flag bit
        let bad = stream_record(0x05, 5, 10, 512);
        assert_eq!(classify(&bad, &geometry, Strictness::Strict), None);
    }

    #[test]
    fn test_name_flags_strict() {
        let geometry = test_geometry();
        let mut record = name_record(&[b'a' as u16]);
        assert_eq!(classify(&record, &geometry, Strictness::Strict), Some(DentryType::FileName));
        record[1] = 0x01;
        assert_eq!(classify(&record, &geometry, Strictness::Strict), None);
        assert_eq!(classify(&record, &geometry, Strictness::Basic), Some(DentryType::FileName));
    }

    #[test]
    fn test_bitmap_strict_checks() {
        let geometry = test_geometry();
        let ok = bitmap_record(2, 8);
        assert_eq!(classify(&ok, &geometry, Strictness::Strict), Some(DentryType::AllocBitmap));
        // Too short for 64 clusters
        assert_eq!(classify(&bitmap_record(2, 7), &geometry, Strictness::Strict), None);
        assert_eq!(classify(&bitmap_record(1, 8), &geometry, Strictness::Strict), None);
        assert!(!AllocBitmapDentry::parse(&ok).is_second_bitmap());
    }

    #[test]
    fn test_volume_label() {
        let geometry = test_geometry();
        let mut record = [0u8; DENTRY_SIZE];
        record[0] = entry_type::VOLUME_LABEL;
        record[1] = 3;
        for (i, ch) in "USB".encode_utf16().enumerate() {
            record[2 + i * 2..4 + i * 2].copy_from_slice(&ch.to_le_bytes());
        }
        assert_eq!(classify(&record, &geometry, Strictness::Strict), Some(DentryType::VolumeLabel));
        assert_eq!(VolumeLabelDentry::parse(&record).label(), "USB");

        record[1] = 16;
        assert_eq!(classify(&record, &geometry, Strictness::Strict), None);

        let mut empty = [0u8; DENTRY_SIZE];
        empty[0] = entry_type::VOLUME_LABEL_EMPTY;
        assert_eq!(
            classify(&empty, &geometry, Strictness::Strict),
            Some(DentryType::VolumeLabelEmpty)
        );
    }

    #[test]
    fn test_reserved_bytes() {
        let mut record = file_record(3, 0);
        assert!(reserved_bytes_zero(DentryType::File, &record));
        record[30] = 0xAA;
        assert!(!reserved_bytes_zero(DentryType::File, &record));
    }

    #[test]
    fn test_file_dentry_fields() {
        let mut record = file_record(3, 0x0031);
        record[2..4].copy_from_slice(&0xBEEFu16.to_le_bytes());
        record[20] = 55;
        record[24] = 0x84;
        let file = FileDentry::parse(&record);
        assert_eq!(file.checksum, 0xBEEF);
        assert_eq!(file.name_entry_count(), 2);
        assert!(file.attributes().is_directory());
        assert_eq!(file.attributes().describe(), "Directory, Read Only, Archive");
        assert_eq!(file.created.increment_10ms, 55);
        assert_eq!(file.accessed.increment_10ms, 0);
        assert_eq!(file.accessed.utc_offset, 0x84);
    }
}

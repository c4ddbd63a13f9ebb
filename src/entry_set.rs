//! File entry-set assembly.
//!
//! A file entry set is a file entry, one stream extension entry and up to 17
//! file name entries, stored back to back. Assembly turns such a set into a
//! [`FileDescriptor`]. Structural problems fail the set; integrity problems
//! (checksum, name length, reserved bytes) are recorded on the descriptor and
//! left to the caller.

use serde::Serialize;

use crate::boot::VolumeGeometry;
use crate::dentry::{
    classify, raw_dentry, reserved_bytes_zero, DentryType, FileAttributes, FileDentry, NameDentry,
    RawDentry, Strictness, StreamDentry, DENTRY_SIZE, MAX_FILE_NAME_SEGMENT_LENGTH,
    MAX_SECONDARY_COUNT, MIN_SECONDARY_COUNT,
};
use crate::error::{ExfatError, IntegrityWarning, Result};
use crate::timestamp::ExfatTimestamp;

/// Cap on the UTF-8 length of a decoded name
pub const MAX_NAME_LEN_UTF8: usize = 1024;

/// Contiguous clusters of a file stored without a FAT chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ClusterRun {
    pub first: u32,
    pub count: u64,
}

impl ClusterRun {
    pub fn clusters(&self) -> impl Iterator<Item = u64> {
        let first = self.first as u64;
        first..first + self.count
    }
}

/// Where a file's data lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Allocation {
    /// No clusters allocated
    Empty,
    /// `count` clusters from `first`, the FAT is not consulted
    Contiguous(ClusterRun),
    /// Clusters must be followed through the FAT
    FatChain { first_cluster: u32 },
}

impl Allocation {
    pub fn new(first_cluster: u32, data_length: u64, no_fat_chain: bool, cluster_size: u64) -> Self {
        if first_cluster == 0 {
            return Allocation::Empty;
        }
        if no_fat_chain {
            Allocation::Contiguous(ClusterRun {
                first: first_cluster,
                count: data_length.div_ceil(cluster_size.max(1)),
            })
        } else {
            Allocation::FatChain { first_cluster }
        }
    }

    pub fn first_cluster(&self) -> Option<u32> {
        match self {
            Allocation::Empty => None,
            Allocation::Contiguous(run) => Some(run.first),
            Allocation::FatChain { first_cluster } => Some(*first_cluster),
        }
    }
}

/// File metadata reconstructed from an entry set.
///
/// Valid only for the read that produced it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileDescriptor {
    pub name: String,
    pub entry_type: DentryType,
    pub attributes: FileAttributes,
    pub data_length: u64,
    pub valid_data_length: u64,
    pub created: ExfatTimestamp,
    pub modified: ExfatTimestamp,
    pub accessed: ExfatTimestamp,
    pub first_cluster: u32,
    pub no_fat_chain: bool,
    pub allocation: Allocation,
    pub secondary_count: u8,
    pub stored_checksum: u16,
    /// `None` until the whole entry set has been seen
    pub computed_checksum: Option<u16>,
    /// In-use entry in an allocated cluster
    pub is_allocated: bool,
    /// Secondary entries ran past the available records
    pub truncated: bool,
    pub warnings: Vec<IntegrityWarning>,
}

impl FileDescriptor {
    /// Descriptor holding only what the file entry itself records.
    pub fn from_file_record(file: &FileDentry, entry_type: DentryType) -> Self {
        Self {
            name: String::new(),
            entry_type,
            attributes: file.attributes(),
            data_length: 0,
            valid_data_length: 0,
            created: file.created,
            modified: file.modified,
            accessed: file.accessed,
            first_cluster: 0,
            no_fat_chain: false,
            allocation: Allocation::Empty,
            secondary_count: file.secondary_count,
            stored_checksum: file.checksum,
            computed_checksum: None,
            is_allocated: !entry_type.is_deleted(),
            truncated: false,
            warnings: Vec::new(),
        }
    }

    pub fn is_directory(&self) -> bool {
        self.attributes.is_directory()
    }

    pub fn checksum_ok(&self) -> bool {
        self.computed_checksum == Some(self.stored_checksum)
    }

    /// Any integrity warning or truncation
    pub fn is_suspect(&self) -> bool {
        self.truncated || !self.warnings.is_empty()
    }
}

/// Entry-set checksum: a rotate-right-and-add over every byte of the set,
/// skipping the checksum field (bytes 2 and 3 of the first entry).
pub fn entry_set_checksum(entries: &[u8]) -> u16 {
    entries
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != 2 && *i != 3)
        .fold(0u16, |checksum, (_, &byte)| {
            checksum.rotate_right(1).wrapping_add(byte as u16)
        })
}

/// Decode UTF-16LE code units, capping the UTF-8 result at `max_len` bytes.
///
/// Unpaired surrogates become U+FFFD. Returns the name and whether it was cut.
pub fn decode_utf16_name(units: &[u16], max_len: usize) -> (String, bool) {
    let mut name = String::with_capacity(units.len().min(max_len));
    for ch in char::decode_utf16(units.iter().copied()) {
        let ch = ch.unwrap_or(char::REPLACEMENT_CHARACTER);
        if name.len() + ch.len_utf8() > max_len {
            return (name, true);
        }
        name.push(ch);
    }
    (name, false)
}

fn expected_secondary(index: usize, deleted: bool) -> (DentryType, &'static str) {
    match (index, deleted) {
        (0, false) => (DentryType::FileStream, "file stream"),
        (0, true) => (DentryType::DeletedFileStream, "deleted file stream"),
        (_, false) => (DentryType::FileName, "file name"),
        (_, true) => (DentryType::DeletedFileName, "deleted file name"),
    }
}

fn describe_record(record: &RawDentry, geometry: &VolumeGeometry) -> String {
    match classify(record, geometry, Strictness::Basic) {
        Some(ty) => match classify(record, geometry, Strictness::Strict) {
            Some(_) => ty.to_string(),
            None => format!("{} failing validation", ty),
        },
        None => format!("non-entry byte 0x{:02X}", record[0]),
    }
}

/// Secondary record `index` of a set, checked against the type it must have.
fn secondary_record<'a>(
    geometry: &VolumeGeometry,
    following: &'a [u8],
    index: usize,
    secondary_count: usize,
    deleted: bool,
) -> Result<&'a RawDentry> {
    let record = following
        .get(index * DENTRY_SIZE..)
        .and_then(raw_dentry)
        .ok_or(ExfatError::TruncatedEntrySet {
            expected: secondary_count,
            available: following.len() / DENTRY_SIZE,
        })?;
    let (expected, expected_name) = expected_secondary(index, deleted);
    if classify(record, geometry, Strictness::Strict) != Some(expected) {
        return Err(ExfatError::UnexpectedEntry {
            index: index + 1,
            expected: expected_name,
            found: describe_record(record, geometry),
        });
    }
    Ok(record)
}

/// Assemble a file entry set.
///
/// `following` holds the records after `file_record`; exactly the advertised
/// number of secondaries is consumed and anything after them is ignored. A
/// deleted file entry requires deleted secondaries and vice versa.
pub fn assemble(
    geometry: &VolumeGeometry,
    file_record: &RawDentry,
    following: &[u8],
    max_name_len: usize,
) -> Result<FileDescriptor> {
    let entry_type = match classify(file_record, geometry, Strictness::Basic) {
        Some(ty) if ty.is_file() => ty,
        _ => {
            return Err(ExfatError::UnexpectedEntry {
                index: 0,
                expected: "file",
                found: describe_record(file_record, geometry),
            })
        }
    };

    let file = FileDentry::parse(file_record);
    if !(MIN_SECONDARY_COUNT..=MAX_SECONDARY_COUNT).contains(&file.secondary_count) {
        return Err(ExfatError::SecondaryCountOutOfRange(file.secondary_count));
    }

    let deleted = entry_type.is_deleted();
    let secondary_count = file.secondary_count as usize;

    let secondary =
        |index| secondary_record(geometry, following, index, secondary_count, deleted);
    let stream_record = secondary(0)?;
    let stream = StreamDentry::parse(stream_record);
    let names = (1..secondary_count)
        .map(|index| secondary(index).map(NameDentry::parse))
        .collect::<Result<Vec<_>>>()?;

    let mut descriptor = FileDescriptor::from_file_record(&file, entry_type);
    let warnings = &mut descriptor.warnings;

    if !reserved_bytes_zero(entry_type, file_record) {
        warnings.push(IntegrityWarning::ReservedBytesNotZero {
            region: "file entry",
        });
    }
    if !reserved_bytes_zero(expected_secondary(0, deleted).0, stream_record) {
        warnings.push(IntegrityWarning::ReservedBytesNotZero {
            region: "stream extension entry",
        });
    }

    // Name: only the first name_length units count, later padding is ignored.
    let name_length = stream.name_length as usize;
    if name_length == 0 {
        warnings.push(IntegrityWarning::UnnamedFile);
    }
    if name_length.div_ceil(MAX_FILE_NAME_SEGMENT_LENGTH) != names.len() {
        warnings.push(IntegrityWarning::NameLengthMismatch {
            declared: name_length,
            name_entries: names.len(),
        });
    }
    let units: Vec<u16> = names
        .iter()
        .flat_map(|name| name.chars)
        .take(name_length)
        .collect();
    let (name, cut) = decode_utf16_name(&units, max_name_len);
    if cut {
        warnings.push(IntegrityWarning::NameTruncated {
            max_len: max_name_len,
        });
    }
    descriptor.name = name;

    let set_len = (secondary_count + 1) * DENTRY_SIZE;
    let mut set_bytes = Vec::with_capacity(set_len);
    set_bytes.extend_from_slice(file_record);
    set_bytes.extend_from_slice(&following[..secondary_count * DENTRY_SIZE]);
    let computed = entry_set_checksum(&set_bytes);
    if computed != file.checksum {
        log::warn!(
            "entry set '{}' checksum mismatch: stored 0x{:04X}, computed 0x{:04X}",
            descriptor.name,
            file.checksum,
            computed
        );
        descriptor.warnings.push(IntegrityWarning::ChecksumMismatch {
            stored: file.checksum,
            computed,
        });
    }
    descriptor.computed_checksum = Some(computed);

    if stream.valid_data_length > stream.data_length {
        descriptor
            .warnings
            .push(IntegrityWarning::ValidDataLengthExceedsDataLength {
                valid: stream.valid_data_length,
                data: stream.data_length,
            });
    }

    descriptor.data_length = stream.data_length;
    descriptor.valid_data_length = stream.valid_data_length;
    descriptor.first_cluster = stream.first_cluster;
    descriptor.no_fat_chain = stream.no_fat_chain();
    descriptor.allocation = Allocation::new(
        stream.first_cluster,
        stream.data_length,
        stream.no_fat_chain(),
        geometry.cluster_size(),
    );

    Ok(descriptor)
}

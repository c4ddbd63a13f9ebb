//! Directory listing.
//!
//! [`scan_directory`] walks a buffer of directory records with an explicit
//! [`ScanCursor`], turning file entry sets and root-only entries into
//! [`ListingEntry`] values. Which entries surface is decided by a
//! [`SelectionPolicy`]; entries that are filtered out still have their
//! secondary records consumed so the cursor never lands inside an entry set.

use serde::{Deserialize, Serialize};

use crate::boot::VolumeGeometry;
use crate::dentry::{
    classify, raw_dentry, DentryType, FileDentry, RawDentry, Strictness, VolumeLabelDentry,
    DENTRY_SIZE,
};
use crate::entry_set::{assemble, FileDescriptor};
use crate::error::{ExfatError, Result};
use crate::inode::{location_to_inum, DentryLocation, SpecialEntry};
use crate::types::{Inum, ListingConfig};

/// Which directory entries a scan surfaces.
///
/// The default surfaces in-use entries in allocated clusters only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionPolicy {
    /// Never-used (type 0x00) slots
    #[serde(default)]
    pub include_unused: bool,
    /// Deleted file entry sets
    #[serde(default)]
    pub include_deleted: bool,
    /// Entries stored in clusters the bitmap marks free
    #[serde(default)]
    pub include_unallocated_clusters: bool,
}

impl SelectionPolicy {
    pub fn allocated_only() -> Self {
        Self::default()
    }

    /// Deleted entries in allocated directory clusters
    pub fn orphan_recovery() -> Self {
        Self {
            include_deleted: true,
            ..Self::default()
        }
    }

    /// Everything that still parses, wherever it lives
    pub fn carving() -> Self {
        Self {
            include_unused: true,
            include_deleted: true,
            include_unallocated_clusters: true,
        }
    }

    /// Whether an entry with the given state is surfaced
    pub fn accepts(&self, ty: DentryType, cluster_allocated: bool) -> bool {
        if !cluster_allocated && !self.include_unallocated_clusters {
            return false;
        }
        match ty {
            DentryType::Unused => self.include_unused,
            ty if ty.is_deleted() => self.include_deleted,
            _ => true,
        }
    }
}

/// Backing location of one chunk of a directory buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChunkInfo {
    /// First sector of the chunk
    pub sector: u64,
    /// Allocation state of the cluster holding the chunk
    pub allocated: bool,
}

/// One result of a directory scan
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ListingEntry {
    pub name: String,
    pub inum: Inum,
    pub kind: DentryType,
    /// In-use entry in an allocated cluster
    pub allocated: bool,
    /// Present for file entry sets, partial when the set was truncated
    #[serde(skip_serializing_if = "Option::is_none")]
    pub descriptor: Option<Box<FileDescriptor>>,
}

impl ListingEntry {
    pub fn is_directory(&self) -> bool {
        self.descriptor
            .as_ref()
            .is_some_and(|descriptor| descriptor.is_directory())
    }
}

/// Record index into a directory buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanCursor {
    index: usize,
    total: usize,
}

impl ScanCursor {
    pub fn new(total_records: usize) -> Self {
        Self {
            index: 0,
            total: total_records,
        }
    }

    pub fn position(&self) -> usize {
        self.index
    }

    pub fn remaining(&self) -> usize {
        self.total - self.index
    }

    pub fn is_done(&self) -> bool {
        self.index >= self.total
    }

    /// Move forward `records`, stopping at the end of the buffer.
    pub fn advance(&mut self, records: usize) {
        self.index = self.index.saturating_add(records).min(self.total);
    }

    pub fn finish(&mut self) {
        self.index = self.total;
    }
}

/// A directory buffer split into equally sized chunks.
struct DirectoryBuffer<'a> {
    buf: &'a [u8],
    chunks: &'a [ChunkInfo],
    chunk_size: usize,
}

impl<'a> DirectoryBuffer<'a> {
    fn new(buf: &'a [u8], chunks: &'a [ChunkInfo]) -> Result<Self> {
        if buf.len() % DENTRY_SIZE != 0 {
            return Err(ExfatError::BadDirectoryBuffer(format!(
                "length {} is not a multiple of {}",
                buf.len(),
                DENTRY_SIZE
            )));
        }
        if buf.is_empty() {
            return Ok(Self {
                buf,
                chunks,
                chunk_size: DENTRY_SIZE,
            });
        }
        if chunks.is_empty() || buf.len() % chunks.len() != 0 {
            return Err(ExfatError::BadDirectoryBuffer(format!(
                "{} bytes cannot be split into {} chunks",
                buf.len(),
                chunks.len()
            )));
        }
        let chunk_size = buf.len() / chunks.len();
        if chunk_size % DENTRY_SIZE != 0 {
            return Err(ExfatError::BadDirectoryBuffer(format!(
                "chunk size {} is not a whole number of records",
                chunk_size
            )));
        }
        Ok(Self {
            buf,
            chunks,
            chunk_size,
        })
    }

    fn record_count(&self) -> usize {
        self.buf.len() / DENTRY_SIZE
    }

    fn record(&self, index: usize) -> Option<&'a RawDentry> {
        self.buf.get(index * DENTRY_SIZE..).and_then(raw_dentry)
    }

    /// Records after `index`, up to the end of the buffer
    fn following(&self, index: usize) -> &'a [u8] {
        self.buf.get((index + 1) * DENTRY_SIZE..).unwrap_or(&[])
    }

    fn chunk(&self, index: usize) -> Option<&'a ChunkInfo> {
        self.chunks.get(index * DENTRY_SIZE / self.chunk_size)
    }

    fn inum(&self, geometry: &VolumeGeometry, index: usize) -> Result<Inum> {
        let chunk = self.chunk(index).ok_or_else(|| {
            ExfatError::BadDirectoryBuffer(format!("record {} has no chunk", index))
        })?;
        let within = (index * DENTRY_SIZE % self.chunk_size) as u64;
        let location = DentryLocation {
            sector: chunk.sector + within / geometry.bytes_per_sector(),
            slot: (within % geometry.bytes_per_sector()) / DENTRY_SIZE as u64,
        };
        location_to_inum(geometry, location)
    }
}

/// Outcome of examining the record under the cursor
struct Step {
    entry: Option<ListingEntry>,
    consumed: Consumed,
}

enum Consumed {
    Records(usize),
    Rest,
}

impl Step {
    fn skip() -> Self {
        Self {
            entry: None,
            consumed: Consumed::Records(1),
        }
    }
}

/// Scan a directory buffer.
///
/// `chunks` describes equal slices of `buf` in order. Fails only when the
/// buffer cannot be split into whole records; damaged entries are skipped or
/// surfaced according to `config`.
pub fn scan_directory(
    geometry: &VolumeGeometry,
    buf: &[u8],
    chunks: &[ChunkInfo],
    config: &ListingConfig,
) -> Result<Vec<ListingEntry>> {
    let dir = DirectoryBuffer::new(buf, chunks)?;
    let mut cursor = ScanCursor::new(dir.record_count());
    let mut entries = Vec::new();

    while !cursor.is_done() {
        let step = scan_record(geometry, &dir, cursor.position(), config)?;
        if let Some(entry) = step.entry {
            entries.push(entry);
        }
        match step.consumed {
            Consumed::Records(count) => cursor.advance(count),
            Consumed::Rest => cursor.finish(),
        }
    }

    log::debug!(
        "scanned {} records in {} chunks, {} entries",
        dir.record_count(),
        chunks.len(),
        entries.len()
    );
    Ok(entries)
}

fn scan_record(
    geometry: &VolumeGeometry,
    dir: &DirectoryBuffer<'_>,
    index: usize,
    config: &ListingConfig,
) -> Result<Step> {
    let (Some(record), Some(chunk)) = (dir.record(index), dir.chunk(index)) else {
        return Ok(Step {
            entry: None,
            consumed: Consumed::Rest,
        });
    };
    let Some(ty) = classify(record, geometry, Strictness::Basic) else {
        return Ok(Step::skip());
    };

    match ty {
        DentryType::Unused => {
            if !config.policy.accepts(ty, chunk.allocated) {
                return Ok(Step::skip());
            }
            Ok(Step {
                entry: Some(ListingEntry {
                    name: String::new(),
                    inum: dir.inum(geometry, index)?,
                    kind: ty,
                    allocated: false,
                    descriptor: None,
                }),
                consumed: Consumed::Records(1),
            })
        }
        ty if ty.is_root_only() => {
            if classify(record, geometry, Strictness::Strict).is_none()
                || !config.policy.accepts(ty, chunk.allocated)
            {
                return Ok(Step::skip());
            }
            let name = match SpecialEntry::from_type(ty) {
                Some(special) => special.name().to_string(),
                None => VolumeLabelDentry::parse(record).label(),
            };
            Ok(Step {
                entry: Some(ListingEntry {
                    name,
                    inum: dir.inum(geometry, index)?,
                    kind: ty,
                    allocated: chunk.allocated,
                    descriptor: None,
                }),
                consumed: Consumed::Records(1),
            })
        }
        ty if ty.is_file() => scan_file(geometry, dir, index, record, ty, chunk, config),
        // Stream or name entry outside an entry set
        _ => Ok(Step::skip()),
    }
}

fn scan_file(
    geometry: &VolumeGeometry,
    dir: &DirectoryBuffer<'_>,
    index: usize,
    record: &RawDentry,
    ty: DentryType,
    chunk: &ChunkInfo,
    config: &ListingConfig,
) -> Result<Step> {
    if classify(record, geometry, Strictness::Strict).is_none() {
        return Ok(Step::skip());
    }

    let (mut descriptor, consumed) =
        match assemble(geometry, record, dir.following(index), config.max_name_len) {
            Ok(descriptor) => {
                let consumed = Consumed::Records(1 + descriptor.secondary_count as usize);
                (descriptor, consumed)
            }
            Err(ExfatError::TruncatedEntrySet {
                expected,
                available,
            }) => {
                log::warn!(
                    "entry set at record {} truncated: {} secondaries declared, {} in buffer",
                    index,
                    expected,
                    available
                );
                let mut partial = FileDescriptor::from_file_record(&FileDentry::parse(record), ty);
                partial.truncated = true;
                (partial, Consumed::Rest)
            }
            Err(err) => {
                log::debug!("skipping file entry at record {}: {}", index, err);
                return Ok(Step::skip());
            }
        };

    descriptor.is_allocated = descriptor.is_allocated && chunk.allocated;

    let keep = config.policy.accepts(ty, chunk.allocated)
        && (config.keep_bad_checksums
            || descriptor.truncated
            || descriptor.checksum_ok());
    let entry = if keep {
        Some(ListingEntry {
            name: descriptor.name.clone(),
            inum: dir.inum(geometry, index)?,
            kind: ty,
            allocated: descriptor.is_allocated,
            descriptor: Some(Box::new(descriptor)),
        })
    } else {
        None
    };

    Ok(Step { entry, consumed })
}

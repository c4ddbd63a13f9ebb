//! Inode resolution.
//!
//! Inode numbers follow the FAT-family scheme: the root directory is inode 2
//! and every 32-byte slot of the cluster heap gets an inode number counted
//! from 3 at the first heap sector.

use serde::Serialize;

use crate::bitmap::AllocationOracle;
use crate::boot::VolumeGeometry;
use crate::dentry::{
    classify, raw_dentry, AllocBitmapDentry, DentryType, FileAttributes, FileDentry, RawDentry,
    Strictness, UpcaseTableDentry, VolumeGuidDentry, VolumeLabelDentry, DENTRY_SIZE,
    MAX_SECONDARY_COUNT,
};
use crate::disk::ImageSource;
use crate::entry_set::{assemble, FileDescriptor, MAX_NAME_LEN_UTF8};
use crate::error::{ExfatError, Result};
use crate::fat::next_directory_cluster;
use crate::types::Inum;

pub const ROOT_INUM: Inum = Inum(2);
pub const FIRST_NORMAL_INUM: Inum = Inum(3);

/// Physical location of one directory entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DentryLocation {
    pub sector: u64,
    /// Entry index within the sector
    pub slot: u64,
}

impl DentryLocation {
    pub fn byte_offset(&self, geometry: &VolumeGeometry) -> u64 {
        (self.sector << geometry.bytes_per_sector_shift) + self.slot * DENTRY_SIZE as u64
    }
}

fn dentries_per_sector(geometry: &VolumeGeometry) -> u64 {
    geometry.bytes_per_sector() / DENTRY_SIZE as u64
}

fn last_heap_sector(geometry: &VolumeGeometry) -> u64 {
    geometry.cluster_heap_offset as u64
        + ((geometry.cluster_count as u64) << geometry.sectors_per_cluster_shift)
        - 1
}

/// Highest inode number backed by a directory entry slot
pub fn last_inum(geometry: &VolumeGeometry) -> Inum {
    let sectors = last_heap_sector(geometry) - geometry.cluster_heap_offset as u64 + 1;
    Inum(sectors * dentries_per_sector(geometry) + FIRST_NORMAL_INUM.0 - 1)
}

fn inode_out_of_range(geometry: &VolumeGeometry, inum: u64) -> ExfatError {
    ExfatError::InodeOutOfRange {
        inum,
        first: FIRST_NORMAL_INUM.0,
        last: last_inum(geometry).0,
    }
}

/// Map an ordinary inode number to the slot holding its entry.
pub fn inum_to_location(geometry: &VolumeGeometry, inum: Inum) -> Result<DentryLocation> {
    if inum < FIRST_NORMAL_INUM || inum > last_inum(geometry) {
        return Err(inode_out_of_range(geometry, inum.0));
    }
    let index = inum.0 - FIRST_NORMAL_INUM.0;
    let per_sector = dentries_per_sector(geometry);
    Ok(DentryLocation {
        sector: geometry.cluster_heap_offset as u64 + index / per_sector,
        slot: index % per_sector,
    })
}

/// Map a slot in the cluster heap to its inode number.
pub fn location_to_inum(geometry: &VolumeGeometry, location: DentryLocation) -> Result<Inum> {
    let per_sector = dentries_per_sector(geometry);
    let heap_sector = location
        .sector
        .checked_sub(geometry.cluster_heap_offset as u64)
        .filter(|_| location.sector <= last_heap_sector(geometry) && location.slot < per_sector)
        .ok_or_else(|| ExfatError::InvalidArgument(format!(
            "sector {} slot {} is not a directory entry slot in the cluster heap",
            location.sector, location.slot
        )))?;
    Ok(Inum(heap_sector * per_sector + location.slot + FIRST_NORMAL_INUM.0))
}

/// Root-directory-only entries surfaced as named virtual files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SpecialEntry {
    VolumeGuid,
    AllocBitmap,
    UpcaseTable,
    TexFat,
    AccessControlTable,
}

impl SpecialEntry {
    pub fn from_type(ty: DentryType) -> Option<Self> {
        match ty {
            DentryType::VolumeGuid => Some(SpecialEntry::VolumeGuid),
            DentryType::AllocBitmap => Some(SpecialEntry::AllocBitmap),
            DentryType::UpcaseTable => Some(SpecialEntry::UpcaseTable),
            DentryType::TexFat => Some(SpecialEntry::TexFat),
            DentryType::AccessControlTable => Some(SpecialEntry::AccessControlTable),
            _ => None,
        }
    }

    /// Synthetic file name, `$`-prefixed so it cannot clash with a real name
    pub fn name(self) -> &'static str {
        match self {
            SpecialEntry::VolumeGuid => "$VOLUME_GUID",
            SpecialEntry::AllocBitmap => "$ALLOC_BITMAP",
            SpecialEntry::UpcaseTable => "$UPCASE_TABLE",
            SpecialEntry::TexFat => "$TEX_FAT",
            SpecialEntry::AccessControlTable => "$ACT",
        }
    }
}

/// A special entry reconstructed from its single record
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SpecialInode {
    pub kind: SpecialEntry,
    pub name: &'static str,
    pub first_cluster: Option<u32>,
    pub data_length: Option<u64>,
    pub guid: Option<[u8; 16]>,
}

impl SpecialInode {
    pub fn from_record(kind: SpecialEntry, record: &RawDentry) -> Self {
        let (first_cluster, data_length, guid) = match kind {
            SpecialEntry::AllocBitmap => {
                let bitmap = AllocBitmapDentry::parse(record);
                (Some(bitmap.first_cluster), Some(bitmap.length), None)
            }
            SpecialEntry::UpcaseTable => {
                let table = UpcaseTableDentry::parse(record);
                (Some(table.first_cluster), Some(table.length), None)
            }
            SpecialEntry::VolumeGuid => (None, None, Some(VolumeGuidDentry::parse(record).guid)),
            SpecialEntry::TexFat | SpecialEntry::AccessControlTable => (None, None, None),
        };
        Self {
            kind,
            name: kind.name(),
            first_cluster,
            data_length,
            guid,
        }
    }
}

/// What an inode number resolves to
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "resolved", rename_all = "snake_case")]
pub enum ResolvedInode {
    /// The root directory has no entry of its own
    RootDirectory { first_cluster: u32 },
    Special(SpecialInode),
    VolumeLabel { label: String },
    File(Box<FileDescriptor>),
}

/// Resolves inode numbers against one volume.
pub struct InodeResolver<'a, S: ImageSource + ?Sized> {
    geometry: &'a VolumeGeometry,
    source: &'a S,
    oracle: Option<&'a AllocationOracle>,
    max_name_len: usize,
}

impl<'a, S: ImageSource + ?Sized> InodeResolver<'a, S> {
    pub fn new(geometry: &'a VolumeGeometry, source: &'a S) -> Self {
        Self {
            geometry,
            source,
            oracle: None,
            max_name_len: MAX_NAME_LEN_UTF8,
        }
    }

    /// Use the allocation bitmap to decide whether a file is allocated
    pub fn with_oracle(mut self, oracle: &'a AllocationOracle) -> Self {
        self.oracle = Some(oracle);
        self
    }

    pub fn with_max_name_len(mut self, max_name_len: usize) -> Self {
        self.max_name_len = max_name_len;
        self
    }

    fn read_record(&self, inum: Inum) -> Result<(DentryLocation, RawDentry)> {
        let location = inum_to_location(self.geometry, inum)?;
        let bytes = self
            .source
            .read_at(location.byte_offset(self.geometry), DENTRY_SIZE)?;
        let record = raw_dentry(bytes)
            .copied()
            .ok_or_else(|| inode_out_of_range(self.geometry, inum.0))?;
        Ok((location, record))
    }

    /// Whether the cluster holding an entry slot is allocated.
    ///
    /// Without an oracle every slot counts as allocated.
    fn slot_allocated(&self, location: DentryLocation) -> Result<bool> {
        let Some(oracle) = self.oracle else {
            return Ok(true);
        };
        match self.geometry.sector_to_cluster(location.sector) {
            Some(cluster) => oracle.is_cluster_allocated(self.geometry, self.source, cluster),
            None => Ok(false),
        }
    }

    /// Resolve an inode to a special entry, volume label or file.
    pub fn resolve(&self, inum: Inum) -> Result<ResolvedInode> {
        if inum == ROOT_INUM {
            return Ok(ResolvedInode::RootDirectory {
                first_cluster: self.geometry.root_dir_cluster,
            });
        }

        let (location, record) = self.read_record(inum)?;
        let ty = classify(&record, self.geometry, Strictness::Basic)
            .ok_or(ExfatError::NotAFileEntry(inum.0))?;

        if ty.is_stream() {
            return Err(ExfatError::OrphanStream(inum.0));
        }

        if ty.is_root_only() {
            if classify(&record, self.geometry, Strictness::Strict).is_none() {
                return Err(ExfatError::NotAFileEntry(inum.0));
            }
            return Ok(match SpecialEntry::from_type(ty) {
                Some(kind) => ResolvedInode::Special(SpecialInode::from_record(kind, &record)),
                None => ResolvedInode::VolumeLabel {
                    label: VolumeLabelDentry::parse(&record).label(),
                },
            });
        }

        if !ty.is_file() {
            return Err(ExfatError::NotAFileEntry(inum.0));
        }

        let descriptor = self.assemble_at(inum, location, &record)?;
        Ok(ResolvedInode::File(Box::new(descriptor)))
    }

    /// Records after the entry at `location`, up to a full secondary run.
    ///
    /// Reading continues into the next directory cluster when the set crosses
    /// a cluster boundary; it stops at the end of the directory or the image.
    fn read_secondaries(&self, location: DentryLocation) -> Result<Vec<u8>> {
        let wanted = MAX_SECONDARY_COUNT as usize * DENTRY_SIZE;
        let cluster_size = self.geometry.cluster_size();
        let mut following = Vec::with_capacity(wanted);
        let mut from = Some(location.byte_offset(self.geometry) + DENTRY_SIZE as u64);
        let mut cluster = self.geometry.sector_to_cluster(location.sector);

        while let Some(current) = cluster {
            let Some(start) = self.geometry.cluster_to_byte_offset(current) else {
                break;
            };
            let end = (start + cluster_size).min(self.source.size());
            let offset = from.take().unwrap_or(start);
            let len = end.saturating_sub(offset).min((wanted - following.len()) as u64) as usize;
            if len > 0 {
                following.extend_from_slice(self.source.read_at(offset, len)?);
            }
            if following.len() >= wanted || end < start + cluster_size {
                break;
            }
            cluster = next_directory_cluster(self.geometry, self.source, current)?;
        }
        Ok(following)
    }

    fn assemble_at(
        &self,
        inum: Inum,
        location: DentryLocation,
        record: &RawDentry,
    ) -> Result<FileDescriptor> {
        let following = self.read_secondaries(location)?;
        let mut descriptor = match assemble(self.geometry, record, &following, self.max_name_len) {
            Ok(descriptor) => descriptor,
            Err(ExfatError::TruncatedEntrySet {
                expected,
                available,
            }) => {
                log::warn!(
                    "inode {}: entry set truncated ({} of {} secondaries)",
                    inum,
                    available,
                    expected
                );
                let mut partial = FileDescriptor::from_file_record(
                    &FileDentry::parse(record),
                    classify(record, self.geometry, Strictness::Basic)
                        .ok_or(ExfatError::NotAFileEntry(inum.0))?,
                );
                partial.truncated = true;
                partial
            }
            Err(err) => return Err(err),
        };

        descriptor.is_allocated = descriptor.is_allocated && self.slot_allocated(location)?;
        Ok(descriptor)
    }

    /// File attributes of an inode without assembling its entry set.
    pub fn attribute_flags(&self, inum: Inum) -> Result<FileAttributes> {
        if inum == ROOT_INUM {
            return Ok(FileAttributes::DIRECTORY);
        }
        let (_, record) = self.read_record(inum)?;
        match classify(&record, self.geometry, Strictness::Basic) {
            Some(ty) if ty.is_file() => Ok(FileDentry::parse(&record).attributes()),
            Some(ty) if ty.is_root_only() => Ok(FileAttributes::SYSTEM | FileAttributes::HIDDEN),
            Some(ty) if ty.is_stream() => Err(ExfatError::OrphanStream(inum.0)),
            _ => Err(ExfatError::NotAFileEntry(inum.0)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boot::tests::test_geometry;
    use crate::dentry::entry_type;
    use crate::dentry::tests::bitmap_record;
    use crate::entry_set::tests::build_entry_set;

    /// Image of the test volume with `records` written at sector 32 (cluster 2).
    fn image_with(records: &[u8]) -> Vec<u8> {
        let mut image = vec![0u8; 128 * 512];
        image[32 * 512..32 * 512 + records.len()].copy_from_slice(records);
        image
    }

    #[test]
    fn test_inum_location_mapping() {
        let geometry = test_geometry();
        let location = inum_to_location(&geometry, Inum(3)).unwrap();
        assert_eq!(location, DentryLocation { sector: 32, slot: 0 });

        let location = inum_to_location(&geometry, Inum(3 + 16 + 5)).unwrap();
        assert_eq!(location, DentryLocation { sector: 33, slot: 5 });
        assert_eq!(location_to_inum(&geometry, location).unwrap(), Inum(24));

        // 64 heap sectors, 16 slots each
        assert_eq!(last_inum(&geometry), Inum(64 * 16 + 2));
        assert!(inum_to_location(&geometry, Inum(64 * 16 + 2)).is_ok());
        let err = inum_to_location(&geometry, Inum(64 * 16 + 3)).unwrap_err();
        assert!(err.is_range());
        assert!(inum_to_location(&geometry, Inum(1)).unwrap_err().is_range());

        assert!(location_to_inum(&geometry, DentryLocation { sector: 31, slot: 0 }).is_err());
        assert!(location_to_inum(&geometry, DentryLocation { sector: 32, slot: 16 }).is_err());
    }

    #[test]
    fn test_resolve_file() {
        let geometry = test_geometry();
        let image = image_with(&build_entry_set("report.pdf", 0x21, 10, 2048, 0x01));
        let resolver = InodeResolver::new(&geometry, &image);

        match resolver.resolve(Inum(3)).unwrap() {
            ResolvedInode::File(descriptor) => {
                assert_eq!(descriptor.name, "report.pdf");
                assert_eq!(descriptor.data_length, 2048);
                assert!(descriptor.checksum_ok());
                assert!(descriptor.is_allocated);
            }
            other => panic!("expected file, got {:?}", other),
        }

        let flags = resolver.attribute_flags(Inum(3)).unwrap();
        assert!(flags.contains(FileAttributes::READ_ONLY | FileAttributes::ARCHIVE));
        assert!(!flags.is_directory());
    }

    #[test]
    fn test_resolve_rejects_stream_and_name() {
        let geometry = test_geometry();
        let image = image_with(&build_entry_set("report.pdf", 0x20, 10, 2048, 0x01));
        let resolver = InodeResolver::new(&geometry, &image);

        assert!(matches!(resolver.resolve(Inum(4)), Err(ExfatError::OrphanStream(4))));
        assert!(matches!(resolver.resolve(Inum(5)), Err(ExfatError::NotAFileEntry(5))));
        // Unused slot
        assert!(matches!(resolver.resolve(Inum(6)), Err(ExfatError::NotAFileEntry(6))));
        assert!(resolver.resolve(Inum(100_000)).unwrap_err().is_range());
    }

    #[test]
    fn test_resolve_special_entries() {
        let geometry = test_geometry();
        let mut records = Vec::new();
        records.extend_from_slice(&bitmap_record(2, 8));
        let mut guid = [0u8; DENTRY_SIZE];
        guid[0] = entry_type::VOLUME_GUID;
        guid[6..22].copy_from_slice(&[0xAB; 16]);
        records.extend_from_slice(&guid);
        let mut label = [0u8; DENTRY_SIZE];
        label[0] = entry_type::VOLUME_LABEL;
        label[1] = 4;
        for (i, ch) in "DATA".encode_utf16().enumerate() {
            label[2 + i * 2..4 + i * 2].copy_from_slice(&ch.to_le_bytes());
        }
        records.extend_from_slice(&label);
        let mut tex_fat = [0u8; DENTRY_SIZE];
        tex_fat[0] = entry_type::TEX_FAT;
        records.extend_from_slice(&tex_fat);
        let mut act = [0u8; DENTRY_SIZE];
        act[0] = entry_type::ACT;
        records.extend_from_slice(&act);
        let image = image_with(&records);
        let resolver = InodeResolver::new(&geometry, &image);

        match resolver.resolve(Inum(3)).unwrap() {
            ResolvedInode::Special(special) => {
                assert_eq!(special.name, "$ALLOC_BITMAP");
                assert_eq!(special.first_cluster, Some(2));
                assert_eq!(special.data_length, Some(8));
            }
            other => panic!("expected bitmap, got {:?}", other),
        }
        match resolver.resolve(Inum(4)).unwrap() {
            ResolvedInode::Special(special) => {
                assert_eq!(special.kind, SpecialEntry::VolumeGuid);
                assert_eq!(special.guid, Some([0xAB; 16]));
            }
            other => panic!("expected GUID, got {:?}", other),
        }
        assert_eq!(
            resolver.resolve(Inum(5)).unwrap(),
            ResolvedInode::VolumeLabel {
                label: "DATA".to_string()
            }
        );
        for (inum, kind, name) in [
            (6, SpecialEntry::TexFat, "$TEX_FAT"),
            (7, SpecialEntry::AccessControlTable, "$ACT"),
        ] {
            match resolver.resolve(Inum(inum)).unwrap() {
                ResolvedInode::Special(special) => {
                    assert_eq!(special.kind, kind);
                    assert_eq!(special.name, name);
                    assert_eq!(special.first_cluster, None);
                }
                other => panic!("expected {}, got {:?}", name, other),
            }
            let flags = resolver.attribute_flags(Inum(inum)).unwrap();
            assert_eq!(flags, FileAttributes::SYSTEM | FileAttributes::HIDDEN);
        }
        assert_eq!(
            resolver.resolve(ROOT_INUM).unwrap(),
            ResolvedInode::RootDirectory { first_cluster: 4 }
        );
        assert!(resolver.attribute_flags(ROOT_INUM).unwrap().is_directory());
    }

    #[test]
    fn test_resolve_truncated_at_image_end() {
        let geometry = test_geometry();
        let set = build_entry_set("tail", 0x20, 0, 0, 0x01);
        // Image cut right after the last heap sector, file entry in its last slot
        let mut image = vec![0u8; 96 * 512];
        let last = image.len() - DENTRY_SIZE;
        image[last..].copy_from_slice(&set[..DENTRY_SIZE]);
        let resolver = InodeResolver::new(&geometry, &image);

        match resolver.resolve(last_inum(&geometry)).unwrap() {
            ResolvedInode::File(descriptor) => {
                assert!(descriptor.truncated);
                assert!(descriptor.computed_checksum.is_none());
                assert!(descriptor.name.is_empty());
            }
            other => panic!("expected partial file, got {:?}", other),
        }
    }

    fn set_fat(image: &mut [u8], geometry: &VolumeGeometry, cluster: u32, next: u32) {
        let at = geometry.fat_byte_offset() as usize + cluster as usize * 4;
        image[at..at + 4].copy_from_slice(&next.to_le_bytes());
    }

    /// File entry in the last slot of cluster 4, secondaries at the start of `next`.
    fn split_set_image(geometry: &VolumeGeometry, next: u32) -> Vec<u8> {
        let set = build_entry_set("split.txt", 0x20, 20, 100, 0x01);
        let mut image = vec![0u8; 128 * 512];
        let last_slot = geometry.cluster_to_byte_offset(4).unwrap() as usize + 15 * DENTRY_SIZE;
        image[last_slot..last_slot + DENTRY_SIZE].copy_from_slice(&set[..DENTRY_SIZE]);
        let start = geometry.cluster_to_byte_offset(next as u64).unwrap() as usize;
        image[start..start + set.len() - DENTRY_SIZE].copy_from_slice(&set[DENTRY_SIZE..]);
        image
    }

    #[test]
    fn test_resolve_set_split_across_clusters() {
        let geometry = test_geometry();
        let mut image = split_set_image(&geometry, 7);
        set_fat(&mut image, &geometry, 4, 7);
        set_fat(&mut image, &geometry, 7, 0xFFFF_FFFF);

        let inum = location_to_inum(&geometry, DentryLocation { sector: 34, slot: 15 }).unwrap();
        assert_eq!(inum, Inum(50));
        let resolver = InodeResolver::new(&geometry, &image);
        match resolver.resolve(inum).unwrap() {
            ResolvedInode::File(descriptor) => {
                assert_eq!(descriptor.name, "split.txt");
                assert_eq!(descriptor.data_length, 100);
                assert!(descriptor.checksum_ok());
                assert!(!descriptor.truncated);
            }
            other => panic!("expected file, got {:?}", other),
        }

        // Directory ends with cluster 4
        set_fat(&mut image, &geometry, 4, 0xFFFF_FFFF);
        let resolver = InodeResolver::new(&geometry, &image);
        match resolver.resolve(inum).unwrap() {
            ResolvedInode::File(descriptor) => {
                assert!(descriptor.truncated);
                assert!(descriptor.name.is_empty());
            }
            other => panic!("expected partial file, got {:?}", other),
        }
    }

    #[test]
    fn test_resolve_set_in_contiguous_directory() {
        let geometry = test_geometry();
        // No FAT entries: the directory continues in cluster 5
        let image = split_set_image(&geometry, 5);
        let resolver = InodeResolver::new(&geometry, &image);
        match resolver.resolve(Inum(50)).unwrap() {
            ResolvedInode::File(descriptor) => {
                assert_eq!(descriptor.name, "split.txt");
                assert!(descriptor.checksum_ok());
            }
            other => panic!("expected file, got {:?}", other),
        }
    }

    #[test]
    fn test_allocation_from_oracle() {
        let geometry = test_geometry();
        let mut records = Vec::new();
        records.extend_from_slice(&build_entry_set("kept", 0x20, 0, 0, 0x01));
        let mut image = image_with(&records);
        // Bitmap in cluster 3 (sector 33); nothing allocated
        let bitmap = AllocBitmapDentry::parse(&bitmap_record(3, 8));
        let oracle = AllocationOracle::new(bitmap);
        let resolver = InodeResolver::new(&geometry, &image).with_oracle(&oracle);
        match resolver.resolve(Inum(3)).unwrap() {
            ResolvedInode::File(descriptor) => assert!(!descriptor.is_allocated),
            other => panic!("expected file, got {:?}", other),
        }

        // Mark cluster 2 allocated
        image[33 * 512] = 0x01;
        let resolver = InodeResolver::new(&geometry, &image).with_oracle(&oracle);
        match resolver.resolve(Inum(3)).unwrap() {
            ResolvedInode::File(descriptor) => assert!(descriptor.is_allocated),
            other => panic!("expected file, got {:?}", other),
        }
    }
}

//! Volume boot record interpretation.

use serde::Serialize;

use crate::bytes::{all_zero, u16_at, u32_at, u64_at};
use crate::error::{ExfatError, IntegrityWarning, Result};

/// Size of the boot record structure, regardless of sector size
pub const BOOT_RECORD_SIZE: usize = 512;

/// File system name tag at offset 3
pub const EXFAT_FS_NAME: &[u8; 8] = b"EXFAT   ";

/// Trailing boot signature
pub const BOOT_SIGNATURE: [u8; 2] = [0x55, 0xAA];

/// The first cluster of the cluster heap
pub const FIRST_CLUSTER: u32 = 2;

/// The backup boot region starts 12 sectors into the volume
pub const BACKUP_BOOT_SECTOR: u64 = 12;

const MAX_CLUSTER_SIZE_SHIFT: u8 = 25;
const MIN_FAT_OFFSET_SECTORS: u32 = 24;
const MAX_CLUSTER_COUNT: u32 = 0xFFFF_FFF5;

/// Boot sector field offsets
const BS_JUMP_BOOT: usize = 0;
const BS_FILE_SYSTEM_NAME: usize = 3;
const BS_MUST_BE_ZERO: usize = 11;
const BS_PARTITION_OFFSET: usize = 64;
const BS_VOLUME_LENGTH: usize = 72;
const BS_FAT_OFFSET: usize = 80;
const BS_FAT_LENGTH: usize = 84;
const BS_CLUSTER_HEAP_OFFSET: usize = 88;
const BS_CLUSTER_COUNT: usize = 92;
const BS_FIRST_CLUSTER_OF_ROOT: usize = 96;
const BS_VOLUME_SERIAL: usize = 100;
const BS_FS_REVISION: usize = 104;
const BS_VOLUME_FLAGS: usize = 106;
const BS_BYTES_PER_SECTOR_SHIFT: usize = 108;
const BS_SECTORS_PER_CLUSTER_SHIFT: usize = 109;
const BS_NUMBER_OF_FATS: usize = 110;
const BS_DRIVE_SELECT: usize = 111;
const BS_PERCENT_IN_USE: usize = 112;
const BS_RESERVED: usize = 113;
const BS_BOOT_CODE: usize = 120;
const BS_SIGNATURE: usize = 510;

const VOLUME_FLAG_ACTIVE_FAT: u16 = 0x0001;
const VOLUME_FLAG_VOLUME_DIRTY: u16 = 0x0002;
const VOLUME_FLAG_MEDIA_FAILURE: u16 = 0x0004;

/// Validated geometry of an exFAT volume.
///
/// Immutable once parsed; safe to share between any number of readers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VolumeGeometry {
    #[serde(skip)]
    pub jump_boot: [u8; 3],
    #[serde(skip)]
    pub must_be_zero: [u8; 53],
    pub partition_offset: u64,
    pub volume_length: u64,
    pub fat_offset: u32,
    pub fat_length: u32,
    pub cluster_heap_offset: u32,
    pub cluster_count: u32,
    pub root_dir_cluster: u32,
    pub volume_serial: u32,
    pub fs_revision: u16,
    pub volume_flags: u16,
    pub bytes_per_sector_shift: u8,
    pub sectors_per_cluster_shift: u8,
    pub number_of_fats: u8,
    pub drive_select: u8,
    pub percent_in_use: u8,
    #[serde(skip)]
    pub reserved: [u8; 7],
    /// Opaque boot code, kept only to reproduce the record
    #[serde(skip)]
    pub boot_code: Vec<u8>,
    pub warnings: Vec<IntegrityWarning>,
}

impl VolumeGeometry {
    /// Parse and validate a boot record.
    ///
    /// `device_len`, when known, is the byte length of the device or image
    /// holding the volume; a volume claiming to be longer is rejected.
    pub fn parse(sector: &[u8], device_len: Option<u64>) -> Result<Self> {
        let record: &[u8; BOOT_RECORD_SIZE] = sector
            .get(..BOOT_RECORD_SIZE)
            .and_then(|bytes| bytes.try_into().ok())
            .ok_or_else(|| {
                ExfatError::InvalidBootRecord(format!(
                    "need {} bytes, got {}",
                    BOOT_RECORD_SIZE,
                    sector.len()
                ))
            })?;

        if &record[BS_FILE_SYSTEM_NAME..BS_FILE_SYSTEM_NAME + 8] != EXFAT_FS_NAME {
            return Err(ExfatError::InvalidBootRecord(
                "file system name is not EXFAT".to_string(),
            ));
        }

        if record[BS_SIGNATURE..BS_SIGNATURE + 2] != BOOT_SIGNATURE {
            return Err(ExfatError::InvalidBootRecord(format!(
                "bad boot signature {:02X}{:02X}",
                record[BS_SIGNATURE],
                record[BS_SIGNATURE + 1]
            )));
        }

        let mut jump_boot = [0u8; 3];
        jump_boot.copy_from_slice(&record[BS_JUMP_BOOT..BS_JUMP_BOOT + 3]);
        let mut must_be_zero = [0u8; 53];
        must_be_zero.copy_from_slice(&record[BS_MUST_BE_ZERO..BS_PARTITION_OFFSET]);
        let mut reserved = [0u8; 7];
        reserved.copy_from_slice(&record[BS_RESERVED..BS_BOOT_CODE]);

        let geometry = Self {
            jump_boot,
            must_be_zero,
            partition_offset: u64_at(record, BS_PARTITION_OFFSET),
            volume_length: u64_at(record, BS_VOLUME_LENGTH),
            fat_offset: u32_at(record, BS_FAT_OFFSET),
            fat_length: u32_at(record, BS_FAT_LENGTH),
            cluster_heap_offset: u32_at(record, BS_CLUSTER_HEAP_OFFSET),
            cluster_count: u32_at(record, BS_CLUSTER_COUNT),
            root_dir_cluster: u32_at(record, BS_FIRST_CLUSTER_OF_ROOT),
            volume_serial: u32_at(record, BS_VOLUME_SERIAL),
            fs_revision: u16_at(record, BS_FS_REVISION),
            volume_flags: u16_at(record, BS_VOLUME_FLAGS),
            bytes_per_sector_shift: record[BS_BYTES_PER_SECTOR_SHIFT],
            sectors_per_cluster_shift: record[BS_SECTORS_PER_CLUSTER_SHIFT],
            number_of_fats: record[BS_NUMBER_OF_FATS],
            drive_select: record[BS_DRIVE_SELECT],
            percent_in_use: record[BS_PERCENT_IN_USE],
            reserved,
            boot_code: record[BS_BOOT_CODE..BS_SIGNATURE].to_vec(),
            warnings: Vec::new(),
        };

        geometry.validate(device_len)?;
        Ok(geometry.with_warnings())
    }

    fn validate(&self, device_len: Option<u64>) -> Result<()> {
        if !(9..=12).contains(&self.bytes_per_sector_shift) {
            return Err(ExfatError::InvalidGeometry(format!(
                "bytes per sector shift {} outside 9..=12",
                self.bytes_per_sector_shift
            )));
        }

        if self.bytes_per_sector_shift + self.sectors_per_cluster_shift > MAX_CLUSTER_SIZE_SHIFT {
            return Err(ExfatError::InvalidGeometry(format!(
                "cluster size 2^{} exceeds 32 MiB",
                self.bytes_per_sector_shift + self.sectors_per_cluster_shift
            )));
        }

        if !(1..=2).contains(&self.number_of_fats) {
            return Err(ExfatError::InvalidGeometry(format!(
                "number of FATs {} is not 1 or 2",
                self.number_of_fats
            )));
        }

        if self.fat_offset < MIN_FAT_OFFSET_SECTORS {
            return Err(ExfatError::InvalidGeometry(format!(
                "FAT offset {} overlaps the boot regions",
                self.fat_offset
            )));
        }

        if self.cluster_count == 0 || self.cluster_count > MAX_CLUSTER_COUNT {
            return Err(ExfatError::InvalidGeometry(format!(
                "cluster count {} out of range",
                self.cluster_count
            )));
        }

        let fat_bytes_needed = (self.cluster_count as u64 + 2) * 4;
        if (self.fat_length as u64) << self.bytes_per_sector_shift < fat_bytes_needed {
            return Err(ExfatError::InvalidGeometry(format!(
                "FAT length {} sectors cannot hold {} clusters",
                self.fat_length, self.cluster_count
            )));
        }

        let fats_end = self.fat_offset as u64 + self.fat_length as u64 * self.number_of_fats as u64;
        if fats_end > self.cluster_heap_offset as u64 {
            return Err(ExfatError::InvalidGeometry(format!(
                "FAT region ends at sector {} past cluster heap offset {}",
                fats_end, self.cluster_heap_offset
            )));
        }

        let heap_sectors = (self.cluster_count as u64) << self.sectors_per_cluster_shift;
        let heap_end = (self.cluster_heap_offset as u64)
            .checked_add(heap_sectors)
            .ok_or_else(|| ExfatError::InvalidGeometry("cluster heap overflows".to_string()))?;
        if heap_end > self.volume_length {
            return Err(ExfatError::InvalidGeometry(format!(
                "cluster heap ends at sector {} past volume length {}",
                heap_end, self.volume_length
            )));
        }

        if !self.is_cluster_in_range(self.root_dir_cluster as u64) {
            return Err(ExfatError::InvalidGeometry(format!(
                "root directory cluster {} out of range",
                self.root_dir_cluster
            )));
        }

        if let Some(device_len) = device_len {
            let volume_bytes = self
                .volume_length
                .checked_mul(self.bytes_per_sector())
                .ok_or_else(|| ExfatError::InvalidGeometry("volume length overflows".to_string()))?;
            if volume_bytes > device_len {
                return Err(ExfatError::InvalidGeometry(format!(
                    "volume length {} bytes exceeds device extent {}",
                    volume_bytes, device_len
                )));
            }
        }

        Ok(())
    }

    fn with_warnings(mut self) -> Self {
        let mut warnings = Vec::new();
        if !all_zero(&self.must_be_zero) {
            log::warn!("boot record must-be-zero region is not zero");
            warnings.push(IntegrityWarning::ReservedBytesNotZero {
                region: "boot record must-be-zero",
            });
        }
        if self.media_failure() {
            warnings.push(IntegrityWarning::MediaFailure);
        }
        if self.volume_dirty() {
            warnings.push(IntegrityWarning::VolumeDirty);
        }
        self.warnings = warnings;
        self
    }

    /// Re-encode the 512-byte boot record.
    pub fn encode(&self) -> [u8; BOOT_RECORD_SIZE] {
        let mut record = [0u8; BOOT_RECORD_SIZE];
        record[BS_JUMP_BOOT..BS_JUMP_BOOT + 3].copy_from_slice(&self.jump_boot);
        record[BS_FILE_SYSTEM_NAME..BS_FILE_SYSTEM_NAME + 8].copy_from_slice(EXFAT_FS_NAME);
        record[BS_MUST_BE_ZERO..BS_PARTITION_OFFSET].copy_from_slice(&self.must_be_zero);
        record[BS_PARTITION_OFFSET..BS_PARTITION_OFFSET + 8]
            .copy_from_slice(&self.partition_offset.to_le_bytes());
        record[BS_VOLUME_LENGTH..BS_VOLUME_LENGTH + 8]
            .copy_from_slice(&self.volume_length.to_le_bytes());
        record[BS_FAT_OFFSET..BS_FAT_OFFSET + 4].copy_from_slice(&self.fat_offset.to_le_bytes());
        record[BS_FAT_LENGTH..BS_FAT_LENGTH + 4].copy_from_slice(&self.fat_length.to_le_bytes());
        record[BS_CLUSTER_HEAP_OFFSET..BS_CLUSTER_HEAP_OFFSET + 4]
            .copy_from_slice(&self.cluster_heap_offset.to_le_bytes());
        record[BS_CLUSTER_COUNT..BS_CLUSTER_COUNT + 4]
            .copy_from_slice(&self.cluster_count.to_le_bytes());
        record[BS_FIRST_CLUSTER_OF_ROOT..BS_FIRST_CLUSTER_OF_ROOT + 4]
            .copy_from_slice(&self.root_dir_cluster.to_le_bytes());
        record[BS_VOLUME_SERIAL..BS_VOLUME_SERIAL + 4]
            .copy_from_slice(&self.volume_serial.to_le_bytes());
        record[BS_FS_REVISION..BS_FS_REVISION + 2].copy_from_slice(&self.fs_revision.to_le_bytes());
        record[BS_VOLUME_FLAGS..BS_VOLUME_FLAGS + 2]
            .copy_from_slice(&self.volume_flags.to_le_bytes());
        record[BS_BYTES_PER_SECTOR_SHIFT] = self.bytes_per_sector_shift;
        record[BS_SECTORS_PER_CLUSTER_SHIFT] = self.sectors_per_cluster_shift;
        record[BS_NUMBER_OF_FATS] = self.number_of_fats;
        record[BS_DRIVE_SELECT] = self.drive_select;
        record[BS_PERCENT_IN_USE] = self.percent_in_use;
        record[BS_RESERVED..BS_BOOT_CODE].copy_from_slice(&self.reserved);
        let code_len = self.boot_code.len().min(BS_SIGNATURE - BS_BOOT_CODE);
        record[BS_BOOT_CODE..BS_BOOT_CODE + code_len].copy_from_slice(&self.boot_code[..code_len]);
        record[BS_SIGNATURE..BS_SIGNATURE + 2].copy_from_slice(&BOOT_SIGNATURE);
        record
    }

    pub fn bytes_per_sector(&self) -> u64 {
        1u64 << self.bytes_per_sector_shift
    }

    pub fn sectors_per_cluster(&self) -> u64 {
        1u64 << self.sectors_per_cluster_shift
    }

    pub fn cluster_size(&self) -> u64 {
        self.bytes_per_sector() << self.sectors_per_cluster_shift
    }

    /// Highest valid cluster address
    pub fn last_cluster(&self) -> u64 {
        self.cluster_count as u64 + FIRST_CLUSTER as u64 - 1
    }

    pub fn is_cluster_in_range(&self, cluster: u64) -> bool {
        (FIRST_CLUSTER as u64..=self.last_cluster()).contains(&cluster)
    }

    /// Byte offset of the FAT selected by the active-FAT flag
    pub fn fat_byte_offset(&self) -> u64 {
        let fat_index = if self.active_fat() == 1 && self.number_of_fats == 2 {
            1
        } else {
            0
        };
        (self.fat_offset as u64 + fat_index * self.fat_length as u64) << self.bytes_per_sector_shift
    }

    pub fn cluster_heap_byte_offset(&self) -> u64 {
        (self.cluster_heap_offset as u64) << self.bytes_per_sector_shift
    }

    /// First sector of a cluster, or `None` outside the heap.
    pub fn cluster_to_sector(&self, cluster: u64) -> Option<u64> {
        if !self.is_cluster_in_range(cluster) {
            return None;
        }
        Some(
            self.cluster_heap_offset as u64
                + ((cluster - FIRST_CLUSTER as u64) << self.sectors_per_cluster_shift),
        )
    }

    /// Cluster holding a sector, or `None` outside the heap.
    pub fn sector_to_cluster(&self, sector: u64) -> Option<u64> {
        let heap_sector = sector.checked_sub(self.cluster_heap_offset as u64)?;
        let cluster = (heap_sector >> self.sectors_per_cluster_shift) + FIRST_CLUSTER as u64;
        self.is_cluster_in_range(cluster).then_some(cluster)
    }

    pub fn cluster_to_byte_offset(&self, cluster: u64) -> Option<u64> {
        self.cluster_to_sector(cluster)
            .map(|sector| sector << self.bytes_per_sector_shift)
    }

    /// Last sector of the volume
    pub fn last_sector(&self) -> u64 {
        self.volume_length.saturating_sub(1)
    }

    /// Index of the active FAT (0 or 1)
    pub fn active_fat(&self) -> u8 {
        (self.volume_flags & VOLUME_FLAG_ACTIVE_FAT) as u8
    }

    pub fn volume_dirty(&self) -> bool {
        self.volume_flags & VOLUME_FLAG_VOLUME_DIRTY != 0
    }

    pub fn media_failure(&self) -> bool {
        self.volume_flags & VOLUME_FLAG_MEDIA_FAILURE != 0
    }
}

/// Locate a usable boot record, falling back to the backup boot region.
///
/// `data` is the start of the volume; it only needs to reach the backup
/// boot record.
pub fn find_boot_sector(data: &[u8], device_len: Option<u64>) -> Option<VolumeGeometry> {
    match VolumeGeometry::parse(data, device_len) {
        Ok(geometry) => return Some(geometry),
        Err(err) => log::debug!("main boot record rejected: {}", err),
    }

    for shift in 9u8..=12 {
        let offset = usize::try_from(BACKUP_BOOT_SECTOR << shift).ok()?;
        let Some(backup) = data.get(offset..) else {
            break;
        };
        match VolumeGeometry::parse(backup, device_len) {
            Ok(geometry) if geometry.bytes_per_sector_shift == shift => {
                log::warn!("using backup boot record at offset {:#x}", offset);
                return Some(geometry);
            }
            Ok(_) => continue,
            Err(err) => log::debug!("backup boot record at {:#x} rejected: {}", offset, err),
        }
    }

    None
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// 512-byte sectors, 512-byte clusters, 64 clusters.
    pub(crate) fn build_boot_sector() -> Vec<u8> {
        let mut data = vec![0u8; BOOT_RECORD_SIZE];
        data[0..3].copy_from_slice(&[0xEB, 0x76, 0x90]);
        data[BS_FILE_SYSTEM_NAME..BS_FILE_SYSTEM_NAME + 8].copy_from_slice(EXFAT_FS_NAME);
        data[BS_VOLUME_LENGTH..BS_VOLUME_LENGTH + 8].copy_from_slice(&128u64.to_le_bytes());
        data[BS_FAT_OFFSET..BS_FAT_OFFSET + 4].copy_from_slice(&24u32.to_le_bytes());
        data[BS_FAT_LENGTH..BS_FAT_LENGTH + 4].copy_from_slice(&8u32.to_le_bytes());
        data[BS_CLUSTER_HEAP_OFFSET..BS_CLUSTER_HEAP_OFFSET + 4]
            .copy_from_slice(&32u32.to_le_bytes());
        data[BS_CLUSTER_COUNT..BS_CLUSTER_COUNT + 4].copy_from_slice(&64u32.to_le_bytes());
        data[BS_FIRST_CLUSTER_OF_ROOT..BS_FIRST_CLUSTER_OF_ROOT + 4]
            .copy_from_slice(&4u32.to_le_bytes());
        data[BS_VOLUME_SERIAL..BS_VOLUME_SERIAL + 4].copy_from_slice(&0x1234_ABCDu32.to_le_bytes());
        data[BS_FS_REVISION..BS_FS_REVISION + 2].copy_from_slice(&0x0100u16.to_le_bytes());
        data[BS_BYTES_PER_SECTOR_SHIFT] = 9;
        data[BS_SECTORS_PER_CLUSTER_SHIFT] = 0;
        data[BS_NUMBER_OF_FATS] = 1;
        data[BS_DRIVE_SELECT] = 0x80;
        data[BS_BOOT_CODE] = 0xF4;
        data[BS_SIGNATURE..BS_SIGNATURE + 2].copy_from_slice(&BOOT_SIGNATURE);
        data
    }

    pub(crate) fn test_geometry() -> VolumeGeometry {
        VolumeGeometry::parse(&build_boot_sector(), None).unwrap()
    }

    #[test]
    fn test_parse_geometry() {
        let geometry = test_geometry();
        assert_eq!(geometry.bytes_per_sector(), 512);
        assert_eq!(geometry.cluster_size(), 512);
        assert_eq!(geometry.fat_byte_offset(), 24 * 512);
        assert_eq!(geometry.cluster_heap_byte_offset(), 32 * 512);
        assert_eq!(geometry.last_cluster(), 65);
        assert_eq!(geometry.root_dir_cluster, 4);
        assert_eq!(geometry.volume_serial, 0x1234_ABCD);
        assert!(geometry.warnings.is_empty());
    }

    #[test]
    fn test_encode_round_trip() {
        let original = build_boot_sector();
        let geometry = VolumeGeometry::parse(&original, None).unwrap();
        assert_eq!(&geometry.encode()[..], &original[..]);
    }

    #[test]
    fn test_bad_signature_is_fatal() {
        let mut data = build_boot_sector();
        data[BS_SIGNATURE] = 0;
        let err = VolumeGeometry::parse(&data, None).unwrap_err();
        assert!(err.is_fatal_to_mount());
    }

    #[test]
    fn test_bad_fs_name() {
        let mut data = build_boot_sector();
        data[BS_FILE_SYSTEM_NAME..BS_FILE_SYSTEM_NAME + 8].copy_from_slice(b"NTFS    ");
        assert!(matches!(
            VolumeGeometry::parse(&data, None),
            Err(ExfatError::InvalidBootRecord(_))
        ));
    }

    #[test]
    fn test_short_sector() {
        let data = build_boot_sector();
        assert!(VolumeGeometry::parse(&data[..200], None).is_err());
    }

    #[test]
    fn test_impossible_geometry() {
        let mut data = build_boot_sector();
        data[BS_BYTES_PER_SECTOR_SHIFT] = 13;
        assert!(matches!(
            VolumeGeometry::parse(&data, None),
            Err(ExfatError::InvalidGeometry(_))
        ));

        let mut data = build_boot_sector();
        data[BS_CLUSTER_COUNT..BS_CLUSTER_COUNT + 4].copy_from_slice(&1000u32.to_le_bytes());
        assert!(matches!(
            VolumeGeometry::parse(&data, None),
            Err(ExfatError::InvalidGeometry(_))
        ));

        let mut data = build_boot_sector();
        data[BS_SECTORS_PER_CLUSTER_SHIFT] = 20;
        assert!(VolumeGeometry::parse(&data, None).is_err());
    }

    #[test]
    fn test_device_extent() {
        let data = build_boot_sector();
        assert!(VolumeGeometry::parse(&data, Some(128 * 512)).is_ok());
        assert!(matches!(
            VolumeGeometry::parse(&data, Some(127 * 512)),
            Err(ExfatError::InvalidGeometry(_))
        ));
    }

    #[test]
    fn test_must_be_zero_is_warning() {
        let mut data = build_boot_sector();
        data[BS_MUST_BE_ZERO + 4] = 0x41;
        let geometry = VolumeGeometry::parse(&data, None).unwrap();
        assert_eq!(
            geometry.warnings,
            vec![IntegrityWarning::ReservedBytesNotZero {
                region: "boot record must-be-zero"
            }]
        );
        assert_eq!(&geometry.encode()[..], &data[..]);
    }

    #[test]
    fn test_volume_flags() {
        let mut data = build_boot_sector();
        data[BS_VOLUME_FLAGS..BS_VOLUME_FLAGS + 2].copy_from_slice(&0x0005u16.to_le_bytes());
        data[BS_NUMBER_OF_FATS] = 2;
        data[BS_FAT_LENGTH..BS_FAT_LENGTH + 4].copy_from_slice(&4u32.to_le_bytes());
        let geometry = VolumeGeometry::parse(&data, None).unwrap();
        assert_eq!(geometry.active_fat(), 1);
        assert!(geometry.media_failure());
        assert!(!geometry.volume_dirty());
        assert_eq!(geometry.fat_byte_offset(), 28 * 512);
        assert!(geometry.warnings.contains(&IntegrityWarning::MediaFailure));
    }

    #[test]
    fn test_cluster_sector_mapping() {
        let geometry = test_geometry();
        assert_eq!(geometry.cluster_to_sector(2), Some(32));
        assert_eq!(geometry.cluster_to_sector(1), None);
        assert_eq!(geometry.cluster_to_sector(66), None);
        assert_eq!(geometry.sector_to_cluster(40), Some(10));
        assert_eq!(geometry.sector_to_cluster(31), None);
        assert_eq!(geometry.last_sector(), 127);
    }

    #[test]
    fn test_find_backup_boot_sector() {
        let mut image = vec![0u8; 128 * 512];
        let boot = build_boot_sector();
        let backup = 12 * 512;
        image[backup..backup + 512].copy_from_slice(&boot);
        let device_len = Some(image.len() as u64);
        let geometry =
            find_boot_sector(&image, device_len).expect("backup boot record should be found");
        assert_eq!(geometry.cluster_count, 64);

        image[..512].copy_from_slice(&boot);
        assert!(find_boot_sector(&image, device_len).is_some());
        assert!(find_boot_sector(&image[..256], device_len).is_none());
        // Volume claims more sectors than the device holds
        assert!(find_boot_sector(&image, Some(512)).is_none());
    }
}

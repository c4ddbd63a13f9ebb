//! A mounted exFAT volume.
//!
//! Binds the geometry, allocation bitmap and image source together and runs
//! the directory and inode operations against them.

use std::sync::Arc;

use crate::bitmap::AllocationOracle;
use crate::boot::{find_boot_sector, VolumeGeometry, BACKUP_BOOT_SECTOR};
use crate::dentry::{classify, raw_dentry, DentryType, Strictness, VolumeLabelDentry, DENTRY_SIZE};
use crate::disk::ImageSource;
use crate::entry_set::{Allocation, FileDescriptor};
use crate::error::{ExfatError, IntegrityWarning, Result};
use crate::fat::{allocation_clusters, read_clusters, ClusterList};
use crate::inode::{InodeResolver, ResolvedInode};
use crate::scan::{scan_directory, ChunkInfo, ListingEntry};
use crate::types::{Inum, ListingConfig};

/// Directory contents gathered from the image
#[derive(Debug, Clone)]
pub struct DirectoryData {
    pub data: Vec<u8>,
    /// One entry per sector of `data`
    pub chunks: Vec<ChunkInfo>,
    /// Damage to the directory's cluster chain
    pub warnings: Vec<IntegrityWarning>,
}

pub struct ExfatVolume<S: ImageSource> {
    source: S,
    geometry: VolumeGeometry,
    oracle: AllocationOracle,
    config: ListingConfig,
}

impl<S: ImageSource> ExfatVolume<S> {
    /// Parse the boot record and locate the allocation bitmap.
    pub fn open(source: S, config: ListingConfig) -> Result<Self> {
        let device_len = source.size();
        let boot_region_len = device_len.min((BACKUP_BOOT_SECTOR + 1) << 12) as usize;
        let boot_region = source.read_at(0, boot_region_len)?;
        let geometry = find_boot_sector(boot_region, Some(device_len)).ok_or_else(|| {
            ExfatError::InvalidBootRecord("no valid main or backup boot record".to_string())
        })?;
        for warning in &geometry.warnings {
            log::warn!("boot record: {}", warning);
        }

        let root = Self::root_allocation(&geometry);
        let ClusterList { clusters, warnings } =
            allocation_clusters(&geometry, &source, &root, config.max_dir_clusters)?;
        for warning in &warnings {
            log::warn!("root directory: {}", warning);
        }
        let root_bytes = read_clusters(
            &geometry,
            &source,
            &clusters,
            clusters.len() as u64 * geometry.cluster_size(),
        )?;
        let oracle = AllocationOracle::locate(&root_bytes, &geometry)?;
        let cache = oracle.load(&geometry, &source)?;
        let oracle = oracle.with_cache(cache);

        log::info!(
            "exFAT volume: {} clusters of {} bytes, root at cluster {}",
            geometry.cluster_count,
            geometry.cluster_size(),
            geometry.root_dir_cluster
        );

        Ok(Self {
            source,
            geometry,
            oracle,
            config,
        })
    }

    fn root_allocation(geometry: &VolumeGeometry) -> Allocation {
        Allocation::FatChain {
            first_cluster: geometry.root_dir_cluster,
        }
    }

    pub fn geometry(&self) -> &VolumeGeometry {
        &self.geometry
    }

    pub fn oracle(&self) -> &AllocationOracle {
        &self.oracle
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn config(&self) -> &ListingConfig {
        &self.config
    }

    /// Allocated clusters according to the bitmap
    pub fn allocated_cluster_count(&self) -> Result<u64> {
        let bitmap: Arc<[u8]> = self.oracle.load(&self.geometry, &self.source)?;
        Ok(AllocationOracle::allocated_cluster_count(
            &bitmap,
            self.geometry.cluster_count,
        ))
    }

    /// Gather a directory's clusters with per-sector allocation state.
    pub fn read_directory(&self, allocation: &Allocation) -> Result<DirectoryData> {
        let ClusterList { clusters, warnings } = allocation_clusters(
            &self.geometry,
            &self.source,
            allocation,
            self.config.max_dir_clusters,
        )?;
        for warning in &warnings {
            log::warn!("directory at cluster {:?}: {}", allocation.first_cluster(), warning);
        }
        let cluster_size = self.geometry.cluster_size();
        let data = read_clusters(
            &self.geometry,
            &self.source,
            &clusters,
            clusters.len() as u64 * cluster_size,
        )?;

        let sectors_per_cluster = self.geometry.sectors_per_cluster();
        let mut chunks = Vec::with_capacity(clusters.len() * sectors_per_cluster as usize);
        for &cluster in &clusters {
            let allocated = self
                .oracle
                .is_cluster_allocated(&self.geometry, &self.source, cluster)?;
            let Some(first_sector) = self.geometry.cluster_to_sector(cluster) else {
                continue;
            };
            chunks.extend((0..sectors_per_cluster).map(|i| ChunkInfo {
                sector: first_sector + i,
                allocated,
            }));
        }

        Ok(DirectoryData {
            data,
            chunks,
            warnings,
        })
    }

    fn scan(&self, allocation: &Allocation) -> Result<Vec<ListingEntry>> {
        let dir = self.read_directory(allocation)?;
        scan_directory(&self.geometry, &dir.data, &dir.chunks, &self.config)
    }

    pub fn list_root(&self) -> Result<Vec<ListingEntry>> {
        self.scan(&Self::root_allocation(&self.geometry))
    }

    /// List the directory with inode number `inum`.
    pub fn list_directory(&self, inum: Inum) -> Result<Vec<ListingEntry>> {
        match self.resolve(inum)? {
            ResolvedInode::RootDirectory { .. } => self.list_root(),
            ResolvedInode::File(descriptor) if descriptor.is_directory() => {
                self.scan(&self.directory_allocation(&descriptor))
            }
            _ => Err(ExfatError::NotFound(format!("inode {} is not a directory", inum))),
        }
    }

    /// Where a directory's records live.
    ///
    /// A deleted directory's FAT entries are zeroed, so its chain is read as a
    /// contiguous run of `data_length` bytes.
    pub fn directory_allocation(&self, descriptor: &FileDescriptor) -> Allocation {
        match descriptor.allocation {
            Allocation::FatChain { first_cluster } if !descriptor.is_allocated => Allocation::new(
                first_cluster,
                descriptor.data_length,
                true,
                self.geometry.cluster_size(),
            ),
            allocation => allocation,
        }
    }

    pub fn resolve(&self, inum: Inum) -> Result<ResolvedInode> {
        self.resolver().resolve(inum)
    }

    pub fn resolver(&self) -> InodeResolver<'_, S> {
        InodeResolver::new(&self.geometry, &self.source)
            .with_oracle(&self.oracle)
            .with_max_name_len(self.config.max_name_len)
    }

    /// Clusters holding a file's data
    pub fn file_clusters(&self, descriptor: &FileDescriptor) -> Result<ClusterList> {
        let limit = self.geometry.cluster_count as usize;
        allocation_clusters(&self.geometry, &self.source, &descriptor.allocation, limit)
    }

    /// Volume label from the root directory, if one is set.
    pub fn volume_label(&self) -> Result<Option<String>> {
        let dir = self.read_directory(&Self::root_allocation(&self.geometry))?;
        for chunk in dir.data.chunks_exact(DENTRY_SIZE) {
            let Some(record) = raw_dentry(chunk) else {
                continue;
            };
            match classify(record, &self.geometry, Strictness::Strict) {
                Some(DentryType::VolumeLabel) => {
                    return Ok(Some(VolumeLabelDentry::parse(record).label()))
                }
                Some(DentryType::VolumeLabelEmpty) => return Ok(None),
                _ => {}
            }
        }
        Ok(None)
    }
}

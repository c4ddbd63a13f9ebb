//! FAT chain traversal and cluster reads.

use std::collections::HashSet;

use crate::boot::{VolumeGeometry, FIRST_CLUSTER};
use crate::disk::ImageSource;
use crate::entry_set::Allocation;
use crate::error::{ExfatError, IntegrityWarning, Result};

/// FAT entry marking a bad cluster
pub const FAT_BAD_CLUSTER: u32 = 0xFFFF_FFF7;

/// FAT entries at or above this value end a chain
pub const FAT_END_OF_CHAIN: u32 = 0xFFFF_FFF8;

/// FAT entry of a free cluster
pub const FAT_FREE_CLUSTER: u32 = 0;

/// Read the FAT entry for `cluster` from the active FAT.
pub fn fat_entry<S: ImageSource + ?Sized>(
    geometry: &VolumeGeometry,
    source: &S,
    cluster: u64,
) -> Result<u32> {
    if !geometry.is_cluster_in_range(cluster) {
        return Err(ExfatError::ClusterOutOfRange {
            cluster,
            first: FIRST_CLUSTER as u64,
            last: geometry.last_cluster(),
        });
    }
    let bytes = source.read_at(geometry.fat_byte_offset() + cluster * 4, 4)?;
    crate::bytes::read_u32_le(bytes, 0)
        .ok_or_else(|| ExfatError::Parse(format!("short FAT entry for cluster {}", cluster)))
}

/// Iterator over the clusters of a FAT chain.
///
/// Stops at an end-of-chain or bad-cluster marker, when a cluster repeats, or
/// at a link outside the heap. A broken link is kept as a warning, see
/// [`ClusterChain::broken_link`]. Only failed image reads come back as errors.
pub struct ClusterChain<'a, S: ImageSource + ?Sized> {
    geometry: &'a VolumeGeometry,
    source: &'a S,
    previous: Option<u64>,
    next: Option<u64>,
    visited: HashSet<u64>,
    broken: Option<IntegrityWarning>,
}

impl<'a, S: ImageSource + ?Sized> ClusterChain<'a, S> {
    pub fn new(geometry: &'a VolumeGeometry, source: &'a S, first_cluster: u32) -> Self {
        Self {
            geometry,
            source,
            previous: None,
            next: (first_cluster != 0).then_some(first_cluster as u64),
            visited: HashSet::new(),
            broken: None,
        }
    }

    /// Set once the chain has ended on a link outside the heap
    pub fn broken_link(&self) -> Option<&IntegrityWarning> {
        self.broken.as_ref()
    }
}

impl<S: ImageSource + ?Sized> Iterator for ClusterChain<'_, S> {
    type Item = Result<u64>;

    fn next(&mut self) -> Option<Self::Item> {
        let cluster = self.next.take()?;

        if !self.geometry.is_cluster_in_range(cluster) {
            log::warn!(
                "FAT chain breaks after cluster {:?}: link {} is outside the heap",
                self.previous,
                cluster
            );
            self.broken = Some(IntegrityWarning::BrokenClusterChain {
                after: self.previous,
                link: cluster,
            });
            return None;
        }
        if !self.visited.insert(cluster) {
            log::warn!("FAT chain loops back to cluster {}", cluster);
            return None;
        }

        match fat_entry(self.geometry, self.source, cluster) {
            Ok(entry) if entry >= FAT_END_OF_CHAIN => {}
            Ok(FAT_BAD_CLUSTER) => {
                log::warn!("FAT chain reaches bad cluster after {}", cluster);
            }
            Ok(entry) => self.next = Some(entry as u64),
            Err(err) => return Some(Err(err)),
        }
        self.previous = Some(cluster);
        Some(Ok(cluster))
    }
}

/// Clusters gathered for an allocation, with any damage found on the way
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClusterList {
    pub clusters: Vec<u64>,
    pub warnings: Vec<IntegrityWarning>,
}

/// Clusters backing an allocation, at most `limit` of them.
///
/// A damaged chain or a run past the heap yields the clusters that are still
/// usable plus a warning.
pub fn allocation_clusters<S: ImageSource + ?Sized>(
    geometry: &VolumeGeometry,
    source: &S,
    allocation: &Allocation,
    limit: usize,
) -> Result<ClusterList> {
    match allocation {
        Allocation::Empty => Ok(ClusterList::default()),
        Allocation::Contiguous(run) => {
            let wanted = run.count.min(limit as u64) as usize;
            let clusters: Vec<u64> = run
                .clusters()
                .take(wanted)
                .take_while(|&cluster| geometry.is_cluster_in_range(cluster))
                .collect();
            let mut warnings = Vec::new();
            if clusters.len() < wanted {
                log::warn!(
                    "contiguous run of {} clusters from {} leaves the heap",
                    run.count,
                    run.first
                );
                warnings.push(IntegrityWarning::ClusterRunPastHeap {
                    first: run.first,
                    count: run.count,
                });
            }
            Ok(ClusterList { clusters, warnings })
        }
        Allocation::FatChain { first_cluster } => {
            let mut chain = ClusterChain::new(geometry, source, *first_cluster);
            let clusters = chain.by_ref().take(limit).collect::<Result<Vec<_>>>()?;
            let warnings = chain.broken_link().cloned().into_iter().collect();
            Ok(ClusterList { clusters, warnings })
        }
    }
}

/// Cluster that continues a directory after `cluster`.
///
/// Follows the FAT link when it points into the heap. A free FAT entry means
/// the directory is contiguous or deleted, so the next cluster on disk is
/// used. End-of-chain and bad markers return `None`.
pub fn next_directory_cluster<S: ImageSource + ?Sized>(
    geometry: &VolumeGeometry,
    source: &S,
    cluster: u64,
) -> Result<Option<u64>> {
    let next = match fat_entry(geometry, source, cluster)? {
        FAT_FREE_CLUSTER => cluster + 1,
        entry => entry as u64,
    };
    Ok(geometry.is_cluster_in_range(next).then_some(next))
}

/// Read the contents of `clusters`, capped at `len` bytes.
pub fn read_clusters<S: ImageSource + ?Sized>(
    geometry: &VolumeGeometry,
    source: &S,
    clusters: &[u64],
    len: u64,
) -> Result<Vec<u8>> {
    let cluster_size = geometry.cluster_size();
    let mut remaining = len;
    let mut data = Vec::new();

    for &cluster in clusters {
        if remaining == 0 {
            break;
        }
        let offset = geometry
            .cluster_to_byte_offset(cluster)
            .ok_or(ExfatError::ClusterOutOfRange {
                cluster,
                first: FIRST_CLUSTER as u64,
                last: geometry.last_cluster(),
            })?;
        let chunk = remaining.min(cluster_size) as usize;
        data.extend_from_slice(source.read_at(offset, chunk)?);
        remaining -= chunk as u64;
    }

    Ok(data)
}

//! Cluster allocation state from the allocation bitmap.

use std::sync::Arc;

use crate::boot::{VolumeGeometry, FIRST_CLUSTER};
use crate::dentry::{classify, raw_dentry, AllocBitmapDentry, DentryType, Strictness, DENTRY_SIZE};
use crate::disk::ImageSource;
use crate::error::{ExfatError, Result};

/// Answers "is cluster N allocated?" from the allocation bitmap.
///
/// The bitmap is read from the image on every query unless a cached copy
/// has been attached with [`AllocationOracle::with_cache`]. Keeping a shared
/// cache consistent with the image is the caller's job.
#[derive(Debug, Clone)]
pub struct AllocationOracle {
    bitmap: AllocBitmapDentry,
    second_bitmap: Option<AllocBitmapDentry>,
    cache: Option<Arc<[u8]>>,
}

impl AllocationOracle {
    pub fn new(bitmap: AllocBitmapDentry) -> Self {
        Self {
            bitmap,
            second_bitmap: None,
            cache: None,
        }
    }

    /// Find the allocation bitmap entries in a root directory buffer.
    ///
    /// The first bitmap (flag bit 0 clear) is used; the second one only
    /// exists on TexFAT volumes and is recorded for reporting.
    pub fn locate(root_dir: &[u8], geometry: &VolumeGeometry) -> Result<Self> {
        let mut first = None;
        let mut second = None;

        for chunk in root_dir.chunks_exact(DENTRY_SIZE) {
            let Some(record) = raw_dentry(chunk) else {
                continue;
            };
            if classify(record, geometry, Strictness::Strict) != Some(DentryType::AllocBitmap) {
                continue;
            }
            let bitmap = AllocBitmapDentry::parse(record);
            if bitmap.is_second_bitmap() {
                second.get_or_insert(bitmap);
            } else {
                first.get_or_insert(bitmap);
            }
            if first.is_some() && second.is_some() {
                break;
            }
        }

        // A lone entry flagged as second bitmap is still the only map we have.
        let bitmap = match first {
            Some(bitmap) => bitmap,
            None => second.take().ok_or(ExfatError::NoAllocationBitmap)?,
        };
        log::debug!(
            "allocation bitmap at cluster {}, {} bytes",
            bitmap.first_cluster,
            bitmap.length
        );

        Ok(Self {
            bitmap,
            second_bitmap: second,
            cache: None,
        })
    }

    pub fn bitmap(&self) -> &AllocBitmapDentry {
        &self.bitmap
    }

    pub fn second_bitmap(&self) -> Option<&AllocBitmapDentry> {
        self.second_bitmap.as_ref()
    }

    /// Attach a cached copy of the bitmap bytes.
    pub fn with_cache(mut self, cache: Arc<[u8]>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Read the whole bitmap from the image.
    ///
    /// The bitmap is assumed to be stored contiguously from its first cluster.
    pub fn load<S: ImageSource + ?Sized>(
        &self,
        geometry: &VolumeGeometry,
        source: &S,
    ) -> Result<Arc<[u8]>> {
        let offset = self.bitmap_byte_offset(geometry)?;
        let len = usize::try_from(self.bitmap.length).map_err(|_| {
            ExfatError::InvalidArgument(format!("bitmap length {} too large", self.bitmap.length))
        })?;
        Ok(Arc::from(source.read_at(offset, len)?))
    }

    fn bitmap_byte_offset(&self, geometry: &VolumeGeometry) -> Result<u64> {
        geometry
            .cluster_to_byte_offset(self.bitmap.first_cluster as u64)
            .ok_or(ExfatError::ClusterOutOfRange {
                cluster: self.bitmap.first_cluster as u64,
                first: FIRST_CLUSTER as u64,
                last: geometry.last_cluster(),
            })
    }

    /// Allocation state of a cluster.
    ///
    /// Addresses before the first cluster, past the last cluster, or past the
    /// stated bitmap length are range failures whatever the bitmap says.
    pub fn is_cluster_allocated<S: ImageSource + ?Sized>(
        &self,
        geometry: &VolumeGeometry,
        source: &S,
        cluster: u64,
    ) -> Result<bool> {
        let out_of_range = || ExfatError::ClusterOutOfRange {
            cluster,
            first: FIRST_CLUSTER as u64,
            last: geometry.last_cluster(),
        };

        if !geometry.is_cluster_in_range(cluster) {
            return Err(out_of_range());
        }

        let index = cluster - FIRST_CLUSTER as u64;
        let byte_index = index / 8;
        if byte_index >= self.bitmap.length {
            return Err(out_of_range());
        }

        let byte = match &self.cache {
            Some(cache) => *cache.get(byte_index as usize).ok_or_else(out_of_range)?,
            None => {
                let offset = self.bitmap_byte_offset(geometry)? + byte_index;
                source.read_at(offset, 1)?[0]
            }
        };

        Ok((byte >> (index % 8)) & 1 == 1)
    }

    /// Count allocated clusters in a loaded bitmap.
    pub fn allocated_cluster_count(bitmap: &[u8], cluster_count: u32) -> u64 {
        let full_bytes = (cluster_count / 8) as usize;
        let remaining_bits = (cluster_count % 8) as u8;

        let mut count: u64 = bitmap[..full_bytes.min(bitmap.len())]
            .iter()
            .map(|byte| byte.count_ones() as u64)
            .sum();

        if remaining_bits > 0 && full_bytes < bitmap.len() {
            let mask = (1u8 << remaining_bits) - 1;
            count += (bitmap[full_bytes] & mask).count_ones() as u64;
        }

        count
    }
}

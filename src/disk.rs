use crate::error::{ExfatError, Result};
use memmap2::Mmap;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;

/// Raw byte access to a volume image, keyed by physical byte offset.
///
/// Offsets are relative to the start of the exFAT volume (the boot record).
pub trait ImageSource {
    /// Total size of the image in bytes
    fn size(&self) -> u64;

    /// Bounds-checked read of `len` bytes at `offset`
    fn read_at(&self, offset: u64, len: usize) -> Result<&[u8]>;
}

fn checked_range(offset: u64, len: usize, image_size: u64) -> Result<(usize, usize)> {
    if offset >= image_size && len > 0 {
        return Err(ExfatError::InvalidOffset { offset, image_size });
    }

    let end = offset
        .checked_add(len as u64)
        .filter(|&end| end <= image_size)
        .ok_or(ExfatError::InvalidSize {
            offset,
            size: len as u64,
            image_size,
        })?;

    let start = usize::try_from(offset).map_err(|_| ExfatError::InvalidOffset { offset, image_size })?;
    let end = usize::try_from(end).map_err(|_| ExfatError::InvalidSize {
        offset,
        size: len as u64,
        image_size,
    })?;
    Ok((start, end))
}

impl ImageSource for [u8] {
    fn size(&self) -> u64 {
        self.len() as u64
    }

    fn read_at(&self, offset: u64, len: usize) -> Result<&[u8]> {
        let (start, end) = checked_range(offset, len, self.len() as u64)?;
        Ok(&self[start..end])
    }
}

impl ImageSource for Vec<u8> {
    fn size(&self) -> u64 {
        self.as_slice().size()
    }

    fn read_at(&self, offset: u64, len: usize) -> Result<&[u8]> {
        self.as_slice().read_at(offset, len)
    }
}

/// Zero-copy memory-mapped disk image with shared ownership
#[derive(Clone)]
pub struct DiskImage {
    mmap: Arc<Mmap>,
    volume_offset: u64,
}

impl DiskImage {
    /// Open a disk image file with memory mapping
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ExfatError::FileNotFound(path.display().to_string())
            } else {
                ExfatError::Io(e)
            }
        })?;

        // Read-only mapping; concurrent modification of the image is the caller's concern.
        let mmap = unsafe {
            Mmap::map(&file).map_err(|e| ExfatError::Mmap(format!("Failed to mmap file: {}", e)))?
        };

        log::debug!("mapped {} ({} bytes)", path.display(), mmap.len());

        Ok(Self {
            mmap: Arc::new(mmap),
            volume_offset: 0,
        })
    }

    /// Treat the volume as starting `offset` bytes into the image (partitioned disks).
    pub fn with_volume_offset(mut self, offset: u64) -> Result<Self> {
        let image_size = self.mmap.len() as u64;
        if offset >= image_size {
            return Err(ExfatError::InvalidOffset { offset, image_size });
        }
        self.volume_offset = offset;
        Ok(self)
    }
}

impl ImageSource for DiskImage {
    fn size(&self) -> u64 {
        self.mmap.len() as u64 - self.volume_offset
    }

    fn read_at(&self, offset: u64, len: usize) -> Result<&[u8]> {
        let volume = &self.mmap[self.volume_offset as usize..];
        volume.read_at(offset, len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_slice_source_bounds() {
        let data = vec![1u8, 2, 3, 4];
        assert_eq!(data.read_at(1, 2).unwrap(), &[2, 3]);
        assert_eq!(data.read_at(0, 4).unwrap().len(), 4);
        assert!(matches!(
            data.read_at(4, 1),
            Err(ExfatError::InvalidOffset { .. })
        ));
        assert!(matches!(
            data.read_at(2, 3),
            Err(ExfatError::InvalidSize { .. })
        ));
        assert!(data.read_at(u64::MAX, 2).is_err());
    }

    #[test]
    fn test_disk_image_open_and_read() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"0123456789").unwrap();
        file.flush().unwrap();

        let disk = DiskImage::open(file.path()).unwrap();
        assert_eq!(disk.size(), 10);
        assert_eq!(disk.read_at(2, 3).unwrap(), b"234");
        assert!(disk.read_at(8, 3).unwrap_err().is_range());

        let shifted = disk.with_volume_offset(4).unwrap();
        assert_eq!(shifted.size(), 6);
        assert_eq!(shifted.read_at(0, 2).unwrap(), b"45");
    }

    #[test]
    fn test_disk_image_missing_file() {
        let err = DiskImage::open("/nonexistent/volume.img").err().unwrap();
        assert!(matches!(err, ExfatError::FileNotFound(_)));
    }
}

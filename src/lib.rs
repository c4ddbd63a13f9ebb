//! exFAT directory-entry interpretation and file metadata reconstruction.
//!
//! The library reads exFAT volume images for forensic analysis:
//! - Boot record parsing into a validated volume geometry
//! - Two-level directory entry classification
//! - Cluster allocation lookups against the allocation bitmap
//! - File entry-set assembly with name decoding and checksum verification
//! - Inode resolution and directory listing with selection policies
//!
//! Damaged input never panics: structural problems come back as
//! [`ExfatError`], integrity problems as [`IntegrityWarning`] values carried
//! by the results.

pub mod bitmap;
pub mod boot;
mod bytes;
pub mod cli;
pub mod dentry;
pub mod disk;
pub mod entry_set;
pub mod error;
pub mod fat;
pub mod inode;
pub mod scan;
pub mod timestamp;
pub mod types;
pub mod volume;

// Re-export commonly used types
pub use bitmap::AllocationOracle;
pub use boot::{find_boot_sector, VolumeGeometry};
pub use dentry::{classify, DentryType, FileAttributes, Strictness};
pub use disk::{DiskImage, ImageSource};
pub use entry_set::{assemble, entry_set_checksum, Allocation, ClusterRun, FileDescriptor};
pub use error::{ExfatError, IntegrityWarning, Result};
pub use inode::{InodeResolver, ResolvedInode, SpecialEntry};
pub use scan::{scan_directory, ChunkInfo, ListingEntry, SelectionPolicy};
pub use types::{Inum, ListingConfig};
pub use volume::ExfatVolume;

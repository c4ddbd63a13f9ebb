use serde::Serialize;
use thiserror::Error;

/// Main error type for exFAT metadata reconstruction
#[derive(Error, Debug)]
pub enum ExfatError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Memory mapping error: {0}")]
    Mmap(String),

    #[error("Invalid offset: requested offset {offset} exceeds image size {image_size}")]
    InvalidOffset { offset: u64, image_size: u64 },

    #[error("Invalid size: requested size {size} at offset {offset} exceeds image bounds (image size: {image_size})")]
    InvalidSize {
        offset: u64,
        size: u64,
        image_size: u64,
    },

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid boot record: {0}")]
    InvalidBootRecord(String),

    #[error("Invalid volume geometry: {0}")]
    InvalidGeometry(String),

    #[error("Unexpected directory entry at set index {index}: expected {expected}, found {found}")]
    UnexpectedEntry {
        index: usize,
        expected: &'static str,
        found: String,
    },

    #[error("Secondary entries count {0} outside of [2, 18]")]
    SecondaryCountOutOfRange(u8),

    #[error("Entry set truncated: {expected} secondary entries declared, {available} available")]
    TruncatedEntrySet { expected: usize, available: usize },

    #[error("Bad directory buffer: {0}")]
    BadDirectoryBuffer(String),

    #[error("Inode {0} is a file stream entry without its file entry")]
    OrphanStream(u64),

    #[error("Inode {0} is not a file or special directory entry")]
    NotAFileEntry(u64),

    #[error("Cluster {cluster} outside of cluster heap [{first}, {last}]")]
    ClusterOutOfRange { cluster: u64, first: u64, last: u64 },

    #[error("Inode {inum} outside of inode range [{first}, {last}]")]
    InodeOutOfRange { inum: u64, first: u64, last: u64 },

    #[error("No allocation bitmap entry in root directory")]
    NoAllocationBitmap,

    #[error("Not found: {0}")]
    NotFound(String),
}

impl ExfatError {
    /// True for errors that make the whole volume uninterpretable.
    pub fn is_fatal_to_mount(&self) -> bool {
        matches!(
            self,
            ExfatError::InvalidBootRecord(_) | ExfatError::InvalidGeometry(_)
        )
    }

    /// True for errors that reject a single out-of-bounds query.
    pub fn is_range(&self) -> bool {
        matches!(
            self,
            ExfatError::ClusterOutOfRange { .. }
                | ExfatError::InodeOutOfRange { .. }
                | ExfatError::InvalidOffset { .. }
                | ExfatError::InvalidSize { .. }
        )
    }
}

/// Recoverable integrity problems.
///
/// These never abort an operation; they travel with the produced geometry or
/// descriptor so the caller can decide whether to keep suspect data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IntegrityWarning {
    /// A region that must be zero is not
    ReservedBytesNotZero { region: &'static str },

    /// Entry-set checksum does not match the stored value
    ChecksumMismatch { stored: u16, computed: u16 },

    /// Stream entry name length disagrees with the number of name entries
    NameLengthMismatch { declared: usize, name_entries: usize },

    /// Entry set has no name entries
    UnnamedFile,

    /// Decoded name was cut at the output length cap
    NameTruncated { max_len: usize },

    /// Valid data length is larger than the data length
    ValidDataLengthExceedsDataLength { valid: u64, data: u64 },

    /// FAT chain links to a cluster outside the heap; `after` is the last
    /// good cluster, `None` when the chain starts outside the heap
    BrokenClusterChain { after: Option<u64>, link: u64 },

    /// Contiguous run extends past the last heap cluster
    ClusterRunPastHeap { first: u32, count: u64 },

    /// Boot record flags report a media failure
    MediaFailure,

    /// Boot record flags report an unclean unmount
    VolumeDirty,
}

impl std::fmt::Display for IntegrityWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IntegrityWarning::ReservedBytesNotZero { region } => {
                write!(f, "reserved region '{}' is not zero", region)
            }
            IntegrityWarning::ChecksumMismatch { stored, computed } => write!(
                f,
                "entry set checksum mismatch: stored 0x{:04X}, computed 0x{:04X}",
                stored, computed
            ),
            IntegrityWarning::NameLengthMismatch {
                declared,
                name_entries,
            } => write!(
                f,
                "name length {} does not fit {} name entries",
                declared, name_entries
            ),
            IntegrityWarning::UnnamedFile => write!(f, "stream extension declares an empty name"),
            IntegrityWarning::NameTruncated { max_len } => {
                write!(f, "name truncated to {} bytes", max_len)
            }
            IntegrityWarning::ValidDataLengthExceedsDataLength { valid, data } => write!(
                f,
                "valid data length {} exceeds data length {}",
                valid, data
            ),
            IntegrityWarning::BrokenClusterChain {
                after: Some(cluster),
                link,
            } => write!(
                f,
                "FAT chain breaks after cluster {}: link {} is outside the cluster heap",
                cluster, link
            ),
            IntegrityWarning::BrokenClusterChain { after: None, link } => {
                write!(f, "chain starts at cluster {} outside the cluster heap", link)
            }
            IntegrityWarning::ClusterRunPastHeap { first, count } => write!(
                f,
                "{} clusters from cluster {} run past the cluster heap",
                count, first
            ),
            IntegrityWarning::MediaFailure => write!(f, "volume flags report a media failure"),
            IntegrityWarning::VolumeDirty => write!(f, "volume flags report a dirty volume"),
        }
    }
}

/// Result type alias for exFAT operations
pub type Result<T> = std::result::Result<T, ExfatError>;

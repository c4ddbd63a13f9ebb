use serde::{Deserialize, Serialize};

use crate::scan::SelectionPolicy;

/// Inode number in the host framework's FAT-family numbering
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Inum(pub u64);

impl Inum {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for Inum {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Directory listing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListingConfig {
    /// Which entries the scanner surfaces
    pub policy: SelectionPolicy,

    /// Keep descriptors whose entry-set checksum does not verify
    pub keep_bad_checksums: bool,

    /// Cap on decoded UTF-8 name length in bytes
    pub max_name_len: usize,

    /// Cap on clusters gathered for one directory
    pub max_dir_clusters: usize,
}

impl Default for ListingConfig {
    fn default() -> Self {
        Self {
            policy: SelectionPolicy::default(),
            keep_bad_checksums: true,
            max_name_len: crate::entry_set::MAX_NAME_LEN_UTF8,
            max_dir_clusters: 4096,
        }
    }
}

impl ListingConfig {
    pub fn with_policy(policy: SelectionPolicy) -> Self {
        Self {
            policy,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inum_display() {
        assert_eq!(Inum::new(163).to_string(), "163");
        assert_eq!(serde_json::to_string(&Inum(42)).unwrap(), "42");
    }

    #[test]
    fn test_listing_config_defaults() {
        let config = ListingConfig::default();
        assert!(config.keep_bad_checksums);
        assert_eq!(config.max_name_len, 1024);
        assert!(!config.policy.include_deleted);
    }
}

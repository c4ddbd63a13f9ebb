use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::scan::SelectionPolicy;
use crate::types::{Inum, ListingConfig};

/// exFAT metadata reconstruction for forensic images
#[derive(Parser, Debug, Clone)]
#[command(name = "exfat-forensics")]
#[command(version = "0.1.0")]
#[command(about = "Reconstruct exFAT file metadata from raw volume images", long_about = None)]
pub struct Args {
    /// Volume or disk image file
    #[arg(value_name = "IMAGE")]
    pub image: PathBuf,

    /// Byte offset of the exFAT volume inside the image
    #[arg(short = 'o', long = "offset", default_value = "0")]
    pub offset: u64,

    /// Print results as JSON
    #[arg(long = "json", global = true)]
    pub json: bool,

    /// Maximum decoded name length in bytes
    #[arg(long = "max-name-len", default_value = "1024")]
    pub max_name_len: usize,

    /// Maximum clusters read for one directory
    #[arg(long = "max-dir-clusters", default_value = "4096")]
    pub max_dir_clusters: usize,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Show boot record geometry and volume details
    Fsstat,

    /// List a directory (the root directory by default)
    Ls {
        /// Directory inode number
        #[arg(value_name = "INUM")]
        inum: Option<u64>,

        /// Include deleted entries
        #[arg(short = 'd', long = "deleted")]
        deleted: bool,

        /// Include entries in unallocated clusters
        #[arg(long = "slack")]
        slack: bool,

        /// Include never-used slots
        #[arg(long = "unused")]
        unused: bool,

        /// Drop entries whose entry-set checksum does not verify
        #[arg(long = "verified-only")]
        verified_only: bool,
    },

    /// Show the metadata of one inode
    Istat {
        #[arg(value_name = "INUM")]
        inum: u64,
    },
}

impl Args {
    /// Validate the arguments
    pub fn validate(&self) -> Result<(), String> {
        if self.image.as_os_str().is_empty() {
            return Err("Image path cannot be empty".to_string());
        }

        if self.max_name_len == 0 {
            return Err("max-name-len must be greater than 0".to_string());
        }

        if self.max_dir_clusters == 0 {
            return Err("max-dir-clusters must be greater than 0".to_string());
        }

        match &self.command {
            Command::Ls { inum: Some(inum), .. } | Command::Istat { inum } if *inum < 2 => {
                Err(format!("inode {} is below the root directory inode 2", inum))
            }
            _ => Ok(()),
        }
    }

    /// Listing configuration for the selected command
    pub fn listing_config(&self) -> ListingConfig {
        let mut config = ListingConfig {
            max_name_len: self.max_name_len,
            max_dir_clusters: self.max_dir_clusters,
            ..ListingConfig::default()
        };
        if let Command::Ls {
            deleted,
            slack,
            unused,
            verified_only,
            ..
        } = &self.command
        {
            config.policy = SelectionPolicy {
                include_unused: *unused,
                include_deleted: *deleted,
                include_unallocated_clusters: *slack,
            };
            config.keep_bad_checksums = !verified_only;
        }
        config
    }

    pub fn target_inum(&self) -> Option<Inum> {
        match &self.command {
            Command::Ls { inum, .. } => inum.map(Inum),
            Command::Istat { inum } => Some(Inum(*inum)),
            Command::Fsstat => None,
        }
    }
}

use anyhow::{Context, Result};
use clap::Parser;

use exfat_forensics::cli::{Args, Command};
use exfat_forensics::disk::DiskImage;
use exfat_forensics::inode::ResolvedInode;
use exfat_forensics::scan::ListingEntry;
use exfat_forensics::volume::ExfatVolume;
use exfat_forensics::{FileDescriptor, Inum};

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    if let Err(e) = run() {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let args = Args::parse();

    if let Err(e) = args.validate() {
        eprintln!("Invalid arguments: {}", e);
        std::process::exit(2);
    }

    let disk = DiskImage::open(&args.image)
        .with_context(|| format!("opening {}", args.image.display()))?;
    let disk = if args.offset > 0 {
        disk.with_volume_offset(args.offset)?
    } else {
        disk
    };
    let volume = ExfatVolume::open(disk, args.listing_config())
        .with_context(|| format!("mounting exFAT volume in {}", args.image.display()))?;

    match &args.command {
        Command::Fsstat => fsstat(&volume, args.json),
        Command::Ls { .. } => {
            let entries = match args.target_inum() {
                Some(inum) => volume.list_directory(inum)?,
                None => volume.list_root()?,
            };
            if args.json {
                println!("{}", serde_json::to_string_pretty(&entries)?);
            } else {
                for entry in &entries {
                    println!("{}", format_listing(entry));
                }
            }
            Ok(())
        }
        Command::Istat { inum } => istat(&volume, Inum(*inum), args.json),
    }
}

fn fsstat(volume: &ExfatVolume<DiskImage>, json: bool) -> Result<()> {
    let geometry = volume.geometry();
    let label = volume.volume_label()?;
    let allocated = volume.allocated_cluster_count()?;

    if json {
        let report = serde_json::json!({
            "geometry": geometry,
            "volume_label": label,
            "allocated_clusters": allocated,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("FILE SYSTEM INFORMATION");
    println!("{}", "-".repeat(44));
    println!("File System Type:      exFAT");
    println!("Volume Serial Number:  {:04X}-{:04X}", geometry.volume_serial >> 16, geometry.volume_serial & 0xFFFF);
    println!("Volume Label:          {}", label.as_deref().unwrap_or(""));
    println!("File System Revision:  {}.{:02}", geometry.fs_revision >> 8, geometry.fs_revision & 0xFF);
    println!();
    println!("METADATA INFORMATION");
    println!("{}", "-".repeat(44));
    println!("Sector Size:           {}", geometry.bytes_per_sector());
    println!("Cluster Size:          {}", geometry.cluster_size());
    println!("Volume Length:         {} sectors", geometry.volume_length);
    println!("Volume Range:          0 - {}", geometry.last_sector());
    println!("FAT Offset:            sector {}", geometry.fat_offset);
    println!("FAT Length:            {} sectors", geometry.fat_length);
    println!("Number of FATs:        {} (active: {})", geometry.number_of_fats, geometry.active_fat());
    println!("Cluster Heap Offset:   sector {}", geometry.cluster_heap_offset);
    println!("Cluster Range:         2 - {}", geometry.last_cluster());
    println!("Root Directory:        cluster {}", geometry.root_dir_cluster);
    let bitmap = volume.oracle().bitmap();
    println!("Allocation Bitmap:     cluster {}, {} bytes", bitmap.first_cluster, bitmap.length);
    if let Some(second) = volume.oracle().second_bitmap() {
        println!("Second Bitmap:         cluster {}, {} bytes", second.first_cluster, second.length);
    }
    println!(
        "Allocated Clusters:    {} of {} ({}% reported in boot record)",
        allocated, geometry.cluster_count, geometry.percent_in_use
    );
    for warning in &geometry.warnings {
        println!("Warning:               {}", warning);
    }
    Ok(())
}

fn format_listing(entry: &ListingEntry) -> String {
    let kind = if entry.is_directory() { "d/d" } else { "r/r" };
    let deleted = if entry.allocated { "" } else { "* " };
    let suspect = match &entry.descriptor {
        Some(descriptor) if descriptor.truncated => " (truncated)",
        Some(descriptor) if !descriptor.warnings.is_empty() => " (suspect)",
        _ => "",
    };
    format!("{} {}{}:\t{}{}", kind, deleted, entry.inum, entry.name, suspect)
}

fn istat(volume: &ExfatVolume<DiskImage>, inum: Inum, json: bool) -> Result<()> {
    let resolved = volume.resolve(inum)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&resolved)?);
        return Ok(());
    }

    println!("Entry: {}", inum);
    match &resolved {
        ResolvedInode::RootDirectory { first_cluster } => {
            println!("Name: (root directory)");
            println!("First Cluster: {}", first_cluster);
        }
        ResolvedInode::VolumeLabel { label } => {
            println!("Name: $VOLUME_LABEL");
            println!("Label: {}", label);
        }
        ResolvedInode::Special(special) => {
            println!("Name: {}", special.name);
            if let Some(cluster) = special.first_cluster {
                println!("First Cluster: {}", cluster);
            }
            if let Some(length) = special.data_length {
                println!("Size: {}", length);
            }
            if let Some(guid) = special.guid {
                let hex: String = guid.iter().map(|b| format!("{:02X}", b)).collect();
                println!("GUID: {}", hex);
            }
        }
        ResolvedInode::File(descriptor) => print_descriptor(volume, descriptor)?,
    }
    Ok(())
}

fn print_descriptor(volume: &ExfatVolume<DiskImage>, descriptor: &FileDescriptor) -> Result<()> {
    println!("{}", if descriptor.is_allocated { "Allocated" } else { "Not Allocated" });
    println!("Name: {}", descriptor.name);
    println!("File Attributes: {}", descriptor.attributes.describe());
    println!("Size: {}", descriptor.data_length);
    println!("Valid Data Length: {}", descriptor.valid_data_length);
    println!("Secondary Entries: {}", descriptor.secondary_count);
    match descriptor.computed_checksum {
        Some(computed) if computed == descriptor.stored_checksum => {
            println!("Checksum: 0x{:04X} (verified)", computed)
        }
        Some(computed) => println!(
            "Checksum: 0x{:04X} (computed 0x{:04X}, MISMATCH)",
            descriptor.stored_checksum, computed
        ),
        None => println!("Checksum: 0x{:04X} (not verified)", descriptor.stored_checksum),
    }
    println!();
    println!("Created:  {}", descriptor.created);
    println!("Modified: {}", descriptor.modified);
    println!("Accessed: {}", descriptor.accessed);
    for warning in &descriptor.warnings {
        println!("Warning: {}", warning);
    }
    if descriptor.truncated {
        println!("Warning: entry set truncated, only file entry fields are available");
        return Ok(());
    }

    println!();
    println!("Clusters{}:", if descriptor.no_fat_chain { " (contiguous)" } else { "" });
    match volume.file_clusters(descriptor) {
        Ok(list) => {
            for row in list.clusters.chunks(8) {
                let line: Vec<String> = row.iter().map(|c| c.to_string()).collect();
                println!("{}", line.join(" "));
            }
            for warning in &list.warnings {
                println!("Warning: {}", warning);
            }
        }
        Err(e) => println!("(cannot follow allocation: {})", e),
    }
    Ok(())
}

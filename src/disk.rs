use crate::boot_sector::{BootSector, BOOT_SECTOR_SIZE};
use crate::cluster_io::ClusterIo;
use crate::common::{FatError, FatResult, DIR_ENTRY_SIZE};
use crate::directory::{decode_entries, find_free_slot, validate_short_name, Attributes, DirEntry};
use crate::fat::FatTable;
use crate::storage::Storage;
use crate::walker::{read_directory, read_region, DirLocation, TreeEntry, TreeWalker};
use chrono::NaiveDateTime;
use log::{debug, info, warn};
use std::fmt::{Display, Formatter};

/// An open FAT12 volume.
///
/// Holds the parsed boot sector and one decoded FAT for its whole lifetime.
/// Writes stage their FAT changes on a copy and only replace the in-memory
/// table once every FAT copy on storage has been rewritten.
#[derive(Debug)]
pub struct FatDisk<S: Storage> {
    storage: S,
    boot: BootSector,
    fat: FatTable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeInfo {
    pub oem_name: String,
    pub label: Option<String>,
    pub total_bytes: u64,
    pub free_bytes: u64,
    pub fat_copies: u8,
    pub sectors_per_fat: u16,
    pub file_count: usize,
}

impl Display for VolumeInfo {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "OS Name: {}", self.oem_name)?;
        writeln!(f, "Label of the disk: {}", self.label.as_deref().unwrap_or("No Label"))?;
        writeln!(f, "Total size of the disk: {} bytes", self.total_bytes)?;
        writeln!(f, "Free size of the disk: {} bytes", self.free_bytes)?;
        writeln!(f, "The number of files in the root directory: {}", self.file_count)?;
        writeln!(f, "Number of FAT copies: {}", self.fat_copies)?;
        write!(f, "Sectors per FAT: {}", self.sectors_per_fat)
    }
}

impl<S: Storage> FatDisk<S> {
    pub fn open(mut storage: S) -> FatResult<Self> {
        let raw = storage.read_at(0, BOOT_SECTOR_SIZE)?;
        let boot = BootSector::parse(&raw)?;
        info!("opened volume: {}", boot);

        let raw_fat = storage.read_at(boot.fat_offset(0), boot.fat_bytes())?;
        for copy in 1..boot.num_fats {
            if storage.read_at(boot.fat_offset(copy), boot.fat_bytes())? != raw_fat {
                warn!("FAT copy {} differs from copy 0, using copy 0", copy);
            }
        }
        let fat = FatTable::decode(&raw_fat).with_cluster_count(boot.cluster_count());
        debug!("decoded {} FAT entries, {} free clusters", fat.len(), fat.free_count());

        Ok(Self { storage, boot, fat })
    }

    pub fn boot_sector(&self) -> &BootSector {
        &self.boot
    }

    pub fn fat(&self) -> &FatTable {
        &self.fat
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn into_inner(self) -> S {
        self.storage
    }

    pub fn list_tree(&mut self) -> TreeWalker<'_, S> {
        TreeWalker::new(&mut self.storage, &self.boot, &self.fat)
    }

    pub fn root_entries(&mut self) -> FatResult<Vec<DirEntry>> {
        read_directory(&mut self.storage, &self.boot, &self.fat, DirLocation::Root)
    }

    /// Resolves a `/`-separated path, case-insensitively, from the root.
    pub fn find(&mut self, path: &str) -> FatResult<TreeEntry> {
        let not_found = || FatError::NotFound(path.to_string());
        let components: Vec<&str> = path.split(['/', '\\']).filter(|c| !c.is_empty()).collect();
        let (last, parents) = components.split_last().ok_or_else(not_found)?;

        let mut location = DirLocation::Root;
        let mut resolved = String::new();
        for (depth, component) in parents.iter().chain(Some(last)).enumerate() {
            let entry = read_directory(&mut self.storage, &self.boot, &self.fat, location)?
                .into_iter()
                .find(|e| !e.is_volume_label() && !e.is_long_name() && !e.is_dot() && e.matches(component))
                .ok_or_else(not_found)?;
            resolved = format!("{}/{}", resolved, entry.name());

            if depth == parents.len() {
                return Ok(TreeEntry { path: resolved, entry, depth });
            }
            if !entry.is_directory() || !entry.has_valid_cluster() {
                return Err(not_found());
            }
            location = DirLocation::Cluster(entry.first_cluster);
        }
        Err(not_found())
    }

    pub fn extract_file(&mut self, path: &str) -> FatResult<Vec<u8>> {
        let TreeEntry { path: resolved, entry, .. } = self.find(path)?;
        if entry.is_directory() {
            return Err(FatError::IsADirectory(resolved));
        }
        debug!("extracting {} ({} bytes from cluster {})", resolved, entry.size, entry.first_cluster);
        ClusterIo::new(&mut self.storage, &self.boot).read_file(&self.fat, entry.first_cluster, entry.size)
    }

    pub fn insert_file(&mut self, path: &str, data: &[u8]) -> FatResult<()> {
        self.insert_file_at(path, data, chrono::Local::now().naive_local())
    }

    /// Stores `data` as a new root-directory file stamped with `timestamp`.
    pub fn insert_file_at(&mut self, path: &str, data: &[u8], timestamp: NaiveDateTime) -> FatResult<()> {
        let name = path.trim_start_matches(['/', '\\']);
        validate_short_name(name)?;
        let size = u32::try_from(data.len()).map_err(|_| FatError::OutOfSpace {
            needed: data.len().div_ceil(self.boot.cluster_size()),
            free: self.fat.free_count(),
        })?;
        let mut entry = DirEntry::new(name, Attributes::new().with_archive(true), 0, size, timestamp);

        let region = read_region(&mut self.storage, &self.boot, &self.fat, DirLocation::Root)?;
        let capacity = self.boot.root_entry_count as usize;
        let existing = decode_entries(&region, capacity)?;
        if existing.iter().any(|e| !e.is_volume_label() && !e.is_long_name() && e.name() == entry.name()) {
            return Err(FatError::AlreadyExists(entry.name()));
        }
        let slot = find_free_slot(&region, capacity).ok_or(FatError::DirectoryFull)?;

        let mut staged = self.fat.clone();
        let first = ClusterIo::new(&mut self.storage, &self.boot).write_file(&mut staged, data)?;
        entry.first_cluster = first.unwrap_or(0);

        let offset = self.boot.root_dir_offset() + (slot * DIR_ENTRY_SIZE) as u64;
        self.storage.write_at(offset, &entry.to_bytes()?)?;
        self.write_fat(&staged)?;
        self.fat = staged;

        info!("inserted {} ({} bytes) at root slot {}, first cluster {}", entry.name(), size, slot, entry.first_cluster);
        Ok(())
    }

    /// Writes `table` to every FAT copy.
    fn write_fat(&mut self, table: &FatTable) -> FatResult<()> {
        let raw = table.encode();
        for copy in 0..self.boot.num_fats {
            self.storage.write_at(self.boot.fat_offset(copy), &raw)?;
        }
        Ok(())
    }

    pub fn info(&mut self) -> FatResult<VolumeInfo> {
        let root = self.root_entries()?;
        let label = root
            .iter()
            .find(|e| e.is_volume_label())
            .map(|e| e.label())
            .or_else(|| self.boot.volume_label());
        // subdirectories count too; empty files and labels have no cluster
        let file_count = root
            .iter()
            .filter(|e| !e.is_volume_label() && !e.is_long_name() && e.has_valid_cluster())
            .count();

        Ok(VolumeInfo {
            oem_name: self.boot.oem_name(),
            label,
            total_bytes: self.boot.total_bytes(),
            free_bytes: (self.fat.free_count() * self.boot.cluster_size()) as u64,
            fat_copies: self.boot.num_fats,
            sectors_per_fat: self.boot.sectors_per_fat,
            file_count,
        })
    }
}

use crate::common::{padded_str, FatError, FatResult, DIR_ENTRY_SIZE, MAX_CLUSTER_BYTES};
use binrw::{BinRead, BinWrite};
use std::fmt::{Display, Formatter};
use std::io::Cursor;

pub const BOOT_SECTOR_SIZE: usize = 512;
const BPB_LEN: usize = 62;
const EXTENDED_BOOT_SIGNATURE: u8 = 0x29;

/// boot sector with the BIOS parameter block
#[derive(Debug, Clone, PartialEq, Eq, BinRead, BinWrite)]
#[brw(little)]
pub struct BootSector {
    // Jump instruction (3 bytes): x86 jump over the BPB to the boot code.
    pub jump: [u8; 3],
    // OEM Name (8 bytes): space-padded name of the formatting system.
    pub oem_name: [u8; 8],
    // Bytes Per Sector (2 bytes): power of two, 512 on every floppy format.
    pub bytes_per_sector: u16,
    // Sectors Per Cluster (1 byte): power of two, allocation unit size.
    pub sectors_per_cluster: u8,
    // Reserved Sectors (2 bytes): sectors before the first FAT, including this one.
    pub reserved_sectors: u16,
    // Number of FATs (1 byte): copies of the allocation table, all kept identical.
    pub num_fats: u8,
    // Root Entry Count (2 bytes): fixed number of 32-byte slots in the root directory.
    pub root_entry_count: u16,
    // Total Sectors (2 bytes): 0 means the 32-bit field below holds the count.
    pub total_sectors_16: u16,
    // Media Descriptor (1 byte): also stored in the low byte of FAT entry 0.
    pub media_descriptor: u8,
    // Sectors Per FAT (2 bytes): size of one FAT copy.
    pub sectors_per_fat: u16,
    pub sectors_per_track: u16,
    pub num_heads: u16,
    pub hidden_sectors: u32,
    // Total Sectors (4 bytes): only consulted when the 16-bit field is 0.
    pub total_sectors_32: u32,
    pub drive_number: u8,
    pub reserved: u8,
    // Extended Boot Signature (1 byte): 0x29 when the three fields below are valid.
    pub boot_signature: u8,
    pub volume_id: u32,
    pub volume_label: [u8; 11],
    pub fs_type: [u8; 8],
}

impl BootSector {
    pub fn parse(bytes: &[u8]) -> FatResult<Self> {
        if bytes.len() < BPB_LEN {
            return Err(FatError::MalformedBootSector(format!(
                "{} bytes, need at least {}",
                bytes.len(),
                BPB_LEN
            )));
        }
        let boot = BootSector::read_le(&mut Cursor::new(&bytes[..BPB_LEN]))?;
        boot.validate()?;
        Ok(boot)
    }

    fn validate(&self) -> FatResult<()> {
        let malformed = |msg: String| -> FatResult<()> { Err(FatError::MalformedBootSector(msg)) };

        if !self.bytes_per_sector.is_power_of_two() {
            return malformed(format!("bytes per sector {}", self.bytes_per_sector));
        }
        if self.sectors_per_fat == 0 {
            return malformed("sectors per FAT is 0".to_string());
        }
        if !self.sectors_per_cluster.is_power_of_two() {
            return malformed(format!("sectors per cluster {}", self.sectors_per_cluster));
        }
        if self.num_fats == 0 {
            return malformed("no FAT copies".to_string());
        }
        if self.cluster_size() > MAX_CLUSTER_BYTES {
            return malformed(format!("cluster size {}", self.cluster_size()));
        }
        if (self.root_entry_count as usize * DIR_ENTRY_SIZE) % self.bytes_per_sector as usize != 0 {
            return malformed(format!(
                "root entry count {} does not fill whole sectors",
                self.root_entry_count
            ));
        }
        if self.data_start_sector() > self.total_sectors() {
            return malformed(format!(
                "data region starts at sector {} past the end of the volume",
                self.data_start_sector()
            ));
        }
        Ok(())
    }

    pub fn oem_name(&self) -> String {
        padded_str(&self.oem_name)
    }

    /// Label from the extended BPB, if the extended signature is present.
    pub fn volume_label(&self) -> Option<String> {
        if self.boot_signature != EXTENDED_BOOT_SIGNATURE {
            return None;
        }
        let label = padded_str(&self.volume_label);
        if label.is_empty() || label == "NO NAME" {
            None
        } else {
            Some(label)
        }
    }

    pub fn total_sectors(&self) -> u32 {
        if self.total_sectors_16 != 0 {
            self.total_sectors_16 as u32
        } else {
            self.total_sectors_32
        }
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_sectors() as u64 * self.bytes_per_sector as u64
    }

    pub fn cluster_size(&self) -> usize {
        self.bytes_per_sector as usize * self.sectors_per_cluster as usize
    }

    pub fn fat_start_sector(&self) -> u32 {
        self.reserved_sectors as u32
    }

    pub fn fat_bytes(&self) -> usize {
        self.sectors_per_fat as usize * self.bytes_per_sector as usize
    }

    /// Byte offset of FAT copy `index`.
    pub fn fat_offset(&self, index: u8) -> u64 {
        let sector = self.fat_start_sector() + index as u32 * self.sectors_per_fat as u32;
        sector as u64 * self.bytes_per_sector as u64
    }

    pub fn root_dir_start_sector(&self) -> u32 {
        self.reserved_sectors as u32 + self.num_fats as u32 * self.sectors_per_fat as u32
    }

    pub fn root_dir_sectors(&self) -> u32 {
        (self.root_entry_count as u32 * DIR_ENTRY_SIZE as u32).div_ceil(self.bytes_per_sector as u32)
    }

    pub fn root_dir_offset(&self) -> u64 {
        self.root_dir_start_sector() as u64 * self.bytes_per_sector as u64
    }

    pub fn root_dir_bytes(&self) -> usize {
        self.root_dir_sectors() as usize * self.bytes_per_sector as usize
    }

    pub fn data_start_sector(&self) -> u32 {
        self.root_dir_start_sector() + self.root_dir_sectors()
    }

    /// Number of data clusters backed by sectors on the volume.
    pub fn cluster_count(&self) -> u32 {
        self.total_sectors().saturating_sub(self.data_start_sector()) / self.sectors_per_cluster as u32
    }

    /// Byte offset of data cluster `cluster` (numbering starts at 2).
    pub fn cluster_offset(&self, cluster: u16) -> u64 {
        let sector = self.data_start_sector() as u64
            + (cluster as u64).saturating_sub(2) * self.sectors_per_cluster as u64;
        sector * self.bytes_per_sector as u64
    }
}

impl Display for BootSector {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "oem: {}, bytes/sector: {}, sectors/cluster: {}, fats: {} x {} sectors, root entries: {}, total sectors: {}",
            self.oem_name(),
            self.bytes_per_sector,
            self.sectors_per_cluster,
            self.num_fats,
            self.sectors_per_fat,
            self.root_entry_count,
            self.total_sectors()
        )
    }
}

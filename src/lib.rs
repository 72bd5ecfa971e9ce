pub mod boot_sector;
pub mod cluster_io;
pub mod common;
pub mod directory;
pub mod disk;
pub mod fat;
pub mod storage;
pub mod walker;

pub use boot_sector::BootSector;
pub use common::{ClusterValue, FatError, FatResult};
pub use directory::{Attributes, DirEntry, DirSlot};
pub use disk::{FatDisk, VolumeInfo};
pub use fat::FatTable;
pub use storage::Storage;
pub use walker::{DirLocation, TreeEntry, TreeWalker};

use std::fmt::{Display, Formatter};
use thiserror::Error;

pub const FREE_CLUSTER: u16 = 0x000;
pub const RESERVED_CLUSTER: u16 = 0x001;
pub const FIRST_DATA_CLUSTER: u16 = 0x002;
pub const MAX_DATA_CLUSTER: u16 = 0xFEF;
pub const BAD_CLUSTER: u16 = 0xFF7;
pub const END_OF_CHAIN_MIN: u16 = 0xFF8;
pub const END_OF_CHAIN: u16 = 0xFFF;

pub const DIR_ENTRY_SIZE: usize = 32;
pub const MAX_CLUSTER_BYTES: usize = 32768;

/// 0x000 Free cluster.
///
/// 0x001 Reserved, never allocated.
///
/// 0x002 - 0xFEF Pointer to the next cluster of the chain.
///
/// 0xFF0 - 0xFF6 Reserved values.
///
/// 0xFF7 Bad cluster.
///
/// 0xFF8 - 0xFFF End of a cluster chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterValue {
    Free,
    Reserved,
    Next(u16),
    ReservedRange(u16),
    Bad,
    EndOfChain(u16),
}

impl From<u16> for ClusterValue {
    fn from(value: u16) -> Self {
        match value & 0x0FFF {
            FREE_CLUSTER => ClusterValue::Free,
            RESERVED_CLUSTER => ClusterValue::Reserved,
            v @ FIRST_DATA_CLUSTER..=MAX_DATA_CLUSTER => ClusterValue::Next(v),
            BAD_CLUSTER => ClusterValue::Bad,
            v @ END_OF_CHAIN_MIN..=END_OF_CHAIN => ClusterValue::EndOfChain(v),
            v => ClusterValue::ReservedRange(v),
        }
    }
}

impl Display for ClusterValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ClusterValue::Free => write!(f, "Free"),
            ClusterValue::Reserved => write!(f, "Reserved"),
            ClusterValue::Next(v) => write!(f, "{}", v),
            ClusterValue::ReservedRange(v) => write!(f, "Reserved({:#05X})", v),
            ClusterValue::Bad => write!(f, "Bad"),
            ClusterValue::EndOfChain(_) => write!(f, "EndOfChain"),
        }
    }
}

#[derive(Debug, Error)]
pub enum FatError {
    #[error("Malformed boot sector: {0}")]
    MalformedBootSector(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(#[from] binrw::Error),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Is a directory: {0}")]
    IsADirectory(String),
    #[error("Broken cluster chain at cluster {cluster} (entry {value:#05X})")]
    BrokenChain { cluster: u16, value: u16 },
    #[error("Cluster chain ends after {read} of {expected} bytes")]
    TruncatedChain { expected: u32, read: u32 },
    #[error("Out of space: {needed} clusters needed, {free} free")]
    OutOfSpace { needed: usize, free: usize },
    #[error("Directory full")]
    DirectoryFull,
    #[error("Name too long for 8.3 format: {0}")]
    NameTooLong(String),
    #[error("Invalid 8.3 name: {0}")]
    InvalidName(String),
    #[error("Already exists: {0}")]
    AlreadyExists(String),
}

pub type FatResult<T> = Result<T, FatError>;

/// Renders a space-padded on-disk text field.
pub fn padded_str(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).trim_end_matches([' ', '\0']).to_string()
}

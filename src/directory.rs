use crate::common::{padded_str, FatError, FatResult, DIR_ENTRY_SIZE};
use binrw::{BinRead, BinWrite};
use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use modular_bitfield::prelude::*;
use std::fmt::{Display, Formatter};
use std::io::Cursor;

/// directory entry, 32 bytes, shared by the root directory and subdirectories

pub const END_OF_DIRECTORY: u8 = 0x00;
pub const DELETED_ENTRY: u8 = 0xE5;
const LONG_NAME_ATTRIBUTES: u8 = 0x0F;
const NAME_LEN: usize = 8;
const EXTENSION_LEN: usize = 3;
const ILLEGAL_NAME_CHARS: &[char] = &['"', '*', '+', ',', '.', '/', ':', ';', '<', '=', '>', '?', '[', '\\', ']', '|'];

#[bitfield(bits = 8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attributes {
    pub read_only: bool,
    pub hidden: bool,
    pub system: bool,
    pub volume_label: bool,
    pub directory: bool,
    pub archive: bool,
    #[skip]
    __: B2,
}

impl Attributes {
    pub fn bits(&self) -> u8 {
        self.into_bytes()[0]
    }
}

impl Display for Attributes {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let flags = [
            (self.read_only(), 'R'),
            (self.hidden(), 'H'),
            (self.system(), 'S'),
            (self.volume_label(), 'V'),
            (self.directory(), 'D'),
            (self.archive(), 'A'),
        ];
        for (set, c) in flags {
            write!(f, "{}", if set { c } else { '-' })?;
        }
        Ok(())
    }
}

/// DOS date: bits 0-4 day, 5-8 month, 9-15 years since 1980.
#[bitfield(bits = 16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FatDate {
    pub day: B5,
    pub month: B4,
    pub year: B7,
}

impl FatDate {
    pub fn from_date(date: NaiveDate) -> Self {
        let year = (date.year() - 1980).clamp(0, 127) as u8;
        FatDate::new()
            .with_day(date.day() as u8)
            .with_month(date.month() as u8)
            .with_year(year)
    }

    pub fn to_date(&self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(1980 + self.year() as i32, self.month() as u32, self.day() as u32)
    }

    fn from_word(word: u16) -> Self {
        FatDate::from_bytes(word.to_le_bytes())
    }

    fn word(&self) -> u16 {
        u16::from_le_bytes(self.into_bytes())
    }
}

impl Display for FatDate {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:04}-{:02}-{:02}", 1980 + self.year() as u32, self.month(), self.day())
    }
}

/// DOS time: bits 0-4 seconds/2, 5-10 minute, 11-15 hour.
#[bitfield(bits = 16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FatTime {
    pub double_seconds: B5,
    pub minute: B6,
    pub hour: B5,
}

impl FatTime {
    pub fn from_time(time: NaiveTime) -> Self {
        FatTime::new()
            .with_double_seconds((time.second().min(59) / 2) as u8)
            .with_minute(time.minute() as u8)
            .with_hour(time.hour() as u8)
    }

    pub fn to_time(&self) -> Option<NaiveTime> {
        NaiveTime::from_hms_opt(self.hour() as u32, self.minute() as u32, self.double_seconds() as u32 * 2)
    }

    fn from_word(word: u16) -> Self {
        FatTime::from_bytes(word.to_le_bytes())
    }

    fn word(&self) -> u16 {
        u16::from_le_bytes(self.into_bytes())
    }
}

impl Display for FatTime {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:02}:{:02}:{:02}", self.hour(), self.minute(), self.double_seconds() as u32 * 2)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, BinRead, BinWrite)]
#[brw(little)]
pub struct DirEntry {
    // Name (8 bytes): upper-case, space-padded. 0x00 ends the directory, 0xE5 marks a deleted slot.
    pub name: [u8; 8],
    // Extension (3 bytes): upper-case, space-padded.
    pub extension: [u8; 3],
    #[br(map = |b: u8| Attributes::from_bytes([b]))]
    #[bw(map = |a: &Attributes| a.bits())]
    pub attributes: Attributes,
    pub reserved: u8,
    pub creation_tenths: u8,
    #[br(map = FatTime::from_word)]
    #[bw(map = |t: &FatTime| t.word())]
    pub creation_time: FatTime,
    #[br(map = FatDate::from_word)]
    #[bw(map = |d: &FatDate| d.word())]
    pub creation_date: FatDate,
    #[br(map = FatDate::from_word)]
    #[bw(map = |d: &FatDate| d.word())]
    pub access_date: FatDate,
    // High word of the first cluster, always 0 on FAT12.
    pub first_cluster_high: u16,
    #[br(map = FatTime::from_word)]
    #[bw(map = |t: &FatTime| t.word())]
    pub write_time: FatTime,
    #[br(map = FatDate::from_word)]
    #[bw(map = |d: &FatDate| d.word())]
    pub write_date: FatDate,
    // First Cluster (2 bytes): 0 for empty files; 0 and 1 never start a chain.
    pub first_cluster: u16,
    // File Size (4 bytes): ignored for directories.
    pub size: u32,
}

impl Display for DirEntry {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "name: {},\tattributes: {},\tcluster: {},\tsize: {},\tmodified: {} {}",
            self.name(),
            self.attributes,
            self.first_cluster,
            self.size,
            self.write_date,
            self.write_time
        )
    }
}

impl DirEntry {
    pub fn new(name: &str, attributes: Attributes, cluster: u16, size: u32, timestamp: NaiveDateTime) -> Self {
        let (name, extension) = pack_short_name(name);
        let date = FatDate::from_date(timestamp.date());
        let time = FatTime::from_time(timestamp.time());
        Self {
            name,
            extension,
            attributes,
            reserved: 0,
            creation_tenths: 0,
            creation_time: time,
            creation_date: date,
            access_date: date,
            first_cluster_high: 0,
            write_time: time,
            write_date: date,
            first_cluster: cluster,
            size,
        }
    }

    pub fn encode(
        name: &str,
        attributes: Attributes,
        cluster: u16,
        size: u32,
        timestamp: NaiveDateTime,
    ) -> FatResult<[u8; DIR_ENTRY_SIZE]> {
        Self::new(name, attributes, cluster, size, timestamp).to_bytes()
    }

    pub fn to_bytes(&self) -> FatResult<[u8; DIR_ENTRY_SIZE]> {
        let mut cursor = Cursor::new([0u8; DIR_ENTRY_SIZE]);
        self.write_le(&mut cursor)?;
        Ok(cursor.into_inner())
    }

    /// `NAME.EXT`, or `NAME` when the extension is blank.
    pub fn name(&self) -> String {
        let name = padded_str(&self.name);
        let extension = padded_str(&self.extension);
        if extension.is_empty() {
            name
        } else {
            format!("{}.{}", name, extension)
        }
    }

    /// Volume labels use all eleven bytes without a dot.
    pub fn label(&self) -> String {
        let mut raw = self.name.to_vec();
        raw.extend_from_slice(&self.extension);
        padded_str(&raw)
    }

    pub fn matches(&self, query: &str) -> bool {
        self.name() == query.to_ascii_uppercase()
    }

    pub fn is_directory(&self) -> bool {
        self.attributes.directory() && !self.is_long_name()
    }

    pub fn is_volume_label(&self) -> bool {
        self.attributes.volume_label() && !self.is_long_name()
    }

    /// VFAT long-name fragment; not interpreted.
    pub fn is_long_name(&self) -> bool {
        self.attributes.bits() & 0x3F == LONG_NAME_ATTRIBUTES
    }

    pub fn is_dot(&self) -> bool {
        let name = self.name();
        name == "." || name == ".."
    }

    /// First cluster 0 or 1 cannot start a chain.
    pub fn has_valid_cluster(&self) -> bool {
        self.first_cluster > 1
    }

    pub fn modified(&self) -> Option<NaiveDateTime> {
        Some(self.write_date.to_date()?.and_time(self.write_time.to_time()?))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirSlot {
    Entry(DirEntry),
    Deleted,
    EndOfDirectory,
}

impl DirSlot {
    pub fn decode(bytes: &[u8]) -> FatResult<Self> {
        match bytes.first() {
            Some(&END_OF_DIRECTORY) => Ok(DirSlot::EndOfDirectory),
            Some(&DELETED_ENTRY) => Ok(DirSlot::Deleted),
            _ => Ok(DirSlot::Entry(DirEntry::read_le(&mut Cursor::new(bytes))?)),
        }
    }
}

/// Live entries of a directory region, up to `capacity` slots or the end marker.
pub fn decode_entries(region: &[u8], capacity: usize) -> FatResult<Vec<DirEntry>> {
    let mut entries = vec![];
    for slot in region.chunks_exact(DIR_ENTRY_SIZE).take(capacity) {
        match DirSlot::decode(slot)? {
            DirSlot::EndOfDirectory => break,
            DirSlot::Deleted => continue,
            DirSlot::Entry(entry) => entries.push(entry),
        }
    }
    Ok(entries)
}

/// Index of the first slot that is unused or deleted.
pub fn find_free_slot(region: &[u8], capacity: usize) -> Option<usize> {
    region
        .chunks_exact(DIR_ENTRY_SIZE)
        .take(capacity)
        .position(|slot| slot[0] == END_OF_DIRECTORY || slot[0] == DELETED_ENTRY)
}

/// Splits on the last `.`, upper-cases, pads or truncates to 8 + 3 bytes.
pub fn pack_short_name(name: &str) -> ([u8; NAME_LEN], [u8; EXTENSION_LEN]) {
    let (base, extension) = name.rsplit_once('.').unwrap_or((name, ""));
    let mut packed_name = [b' '; NAME_LEN];
    let mut packed_extension = [b' '; EXTENSION_LEN];
    for (dst, src) in packed_name.iter_mut().zip(base.bytes()) {
        *dst = src.to_ascii_uppercase();
    }
    for (dst, src) in packed_extension.iter_mut().zip(extension.bytes()) {
        *dst = src.to_ascii_uppercase();
    }
    (packed_name, packed_extension)
}

pub fn validate_short_name(name: &str) -> FatResult<()> {
    let (base, extension) = name.rsplit_once('.').unwrap_or((name, ""));
    if base.is_empty() {
        return Err(FatError::InvalidName(name.to_string()));
    }
    let legal = |c: char| c.is_ascii_graphic() && !ILLEGAL_NAME_CHARS.contains(&c);
    if !base.chars().chain(extension.chars()).all(legal) {
        return Err(FatError::InvalidName(name.to_string()));
    }
    if base.len() > NAME_LEN || extension.len() > EXTENSION_LEN {
        return Err(FatError::NameTooLong(name.to_string()));
    }
    Ok(())
}

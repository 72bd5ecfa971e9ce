#![allow(dead_code)]

use chrono::{NaiveDate, NaiveDateTime};
use rust_fat12::fat::{decode_entries, encode_entries};
use rust_fat12::{Attributes, DirEntry, FatDisk};
use std::io::Cursor;

pub const SECTOR: usize = 512;
pub const TOTAL_SECTORS: usize = 2880;
pub const SECTORS_PER_FAT: usize = 9;
pub const FAT_BYTES: usize = SECTORS_PER_FAT * SECTOR;
pub const ROOT_OFFSET: usize = 19 * SECTOR;
pub const DATA_SECTOR: usize = 33;
pub const DATA_CLUSTERS: usize = 2847;

/// Freshly formatted 1.44 MB floppy: 1 reserved sector, 2 FATs of 9 sectors,
/// 224 root entries, one sector per cluster.
pub fn floppy() -> Vec<u8> {
    let mut img = vec![0u8; TOTAL_SECTORS * SECTOR];
    img[0..3].copy_from_slice(&[0xEB, 0x3C, 0x90]);
    img[3..11].copy_from_slice(b"MSDOS5.0");
    img[11..13].copy_from_slice(&512u16.to_le_bytes());
    img[13] = 1;
    img[14..16].copy_from_slice(&1u16.to_le_bytes());
    img[16] = 2;
    img[17..19].copy_from_slice(&224u16.to_le_bytes());
    img[19..21].copy_from_slice(&(TOTAL_SECTORS as u16).to_le_bytes());
    img[21] = 0xF0;
    img[22..24].copy_from_slice(&(SECTORS_PER_FAT as u16).to_le_bytes());
    img[24..26].copy_from_slice(&18u16.to_le_bytes());
    img[26..28].copy_from_slice(&2u16.to_le_bytes());
    img[38] = 0x29;
    img[39..43].copy_from_slice(&0x1234_5678u32.to_le_bytes());
    img[43..54].copy_from_slice(b"NO NAME    ");
    img[54..62].copy_from_slice(b"FAT12   ");
    img[510] = 0x55;
    img[511] = 0xAA;
    for copy in 0..2 {
        let offset = fat_offset(copy);
        img[offset..offset + 3].copy_from_slice(&[0xF0, 0xFF, 0xFF]);
    }
    img
}

pub fn open(img: Vec<u8>) -> FatDisk<Cursor<Vec<u8>>> {
    FatDisk::open(Cursor::new(img)).unwrap()
}

pub fn fat_offset(copy: usize) -> usize {
    (1 + copy * SECTORS_PER_FAT) * SECTOR
}

pub fn fat_region(img: &[u8], copy: usize) -> &[u8] {
    &img[fat_offset(copy)..fat_offset(copy) + FAT_BYTES]
}

pub fn fat_entries(img: &[u8]) -> Vec<u16> {
    decode_entries(fat_region(img, 0))
}

/// Sets FAT entries in both copies.
pub fn set_fat(img: &mut [u8], values: &[(u16, u16)]) {
    let mut entries = fat_entries(img);
    for &(cluster, value) in values {
        entries[cluster as usize] = value;
    }
    let raw = encode_entries(&entries);
    for copy in 0..2 {
        let offset = fat_offset(copy);
        img[offset..offset + raw.len()].copy_from_slice(&raw);
    }
}

pub fn cluster_offset(cluster: u16) -> usize {
    (DATA_SECTOR + cluster as usize - 2) * SECTOR
}

pub fn stamp() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2023, 11, 2).unwrap().and_hms_opt(9, 30, 12).unwrap()
}

pub fn file_entry(name: &str, cluster: u16, size: u32) -> [u8; 32] {
    DirEntry::encode(name, Attributes::new().with_archive(true), cluster, size, stamp()).unwrap()
}

pub fn dir_entry(name: &str, cluster: u16) -> [u8; 32] {
    DirEntry::encode(name, Attributes::new().with_directory(true), cluster, 0, stamp()).unwrap()
}

/// `.` or `..` entry; `name` is written verbatim into the 11-byte name field.
pub fn dot_entry(name: &[u8], cluster: u16) -> [u8; 32] {
    let mut raw = dir_entry("X", cluster);
    raw[0..11].copy_from_slice(b"           ");
    raw[..name.len()].copy_from_slice(name);
    raw
}

pub fn write_root_slot(img: &mut [u8], slot: usize, raw: &[u8; 32]) {
    let offset = ROOT_OFFSET + slot * 32;
    img[offset..offset + 32].copy_from_slice(raw);
}

pub fn write_dir_slot(img: &mut [u8], cluster: u16, slot: usize, raw: &[u8; 32]) {
    let offset = cluster_offset(cluster) + slot * 32;
    img[offset..offset + 32].copy_from_slice(raw);
}

pub fn write_data(img: &mut [u8], cluster: u16, data: &[u8]) {
    let offset = cluster_offset(cluster);
    img[offset..offset + data.len()].copy_from_slice(data);
}

pub fn paths(disk: &mut FatDisk<Cursor<Vec<u8>>>) -> Vec<String> {
    disk.list_tree().map(|e| e.unwrap().path).collect()
}

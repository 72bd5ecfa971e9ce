use crate::common::{
    ClusterValue, FatError, FatResult, END_OF_CHAIN, FIRST_DATA_CLUSTER, FREE_CLUSTER, MAX_DATA_CLUSTER,
};
use log::debug;
use modular_bitfield::prelude::*;

/// Two 12-bit FAT entries packed into three bytes.
///
/// `even` takes byte 0 and the low nibble of byte 1, `odd` takes the high
/// nibble of byte 1 and byte 2.
#[bitfield(bits = 24)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryPair {
    pub even: B12,
    pub odd: B12,
}

pub fn decode_entries(raw: &[u8]) -> Vec<u16> {
    let mut entries = Vec::with_capacity(raw.len() * 2 / 3);
    let mut groups = raw.chunks_exact(3);
    for group in &mut groups {
        let pair = EntryPair::from_bytes([group[0], group[1], group[2]]);
        entries.push(pair.even());
        entries.push(pair.odd());
    }
    // two trailing bytes still hold one whole entry
    if let [b0, b1] = groups.remainder() {
        entries.push(EntryPair::from_bytes([*b0, *b1, 0]).even());
    }
    entries
}

pub fn encode_entries(entries: &[u16]) -> Vec<u8> {
    let mut raw = Vec::with_capacity((entries.len() * 12).div_ceil(8));
    for pair in entries.chunks(2) {
        match pair {
            [even, odd] => {
                let packed = EntryPair::new().with_even(even & 0x0FFF).with_odd(odd & 0x0FFF);
                raw.extend_from_slice(&packed.into_bytes());
            }
            [even] => {
                let packed = EntryPair::new().with_even(even & 0x0FFF);
                raw.extend_from_slice(&packed.into_bytes()[..2]);
            }
            _ => unreachable!(),
        }
    }
    raw
}

/// Highest cluster number plus one; 0xFF0 and up are markers, not clusters.
const CLUSTER_CEILING: usize = MAX_DATA_CLUSTER as usize + 1;

/// In-memory copy of one FAT.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FatTable {
    entries: Vec<u16>,
    cluster_limit: usize,
    // bytes past the last whole entry, kept so encode reproduces them
    trailer: Vec<u8>,
}

impl FatTable {
    pub fn new(entries: Vec<u16>) -> Self {
        let cluster_limit = entries.len().min(CLUSTER_CEILING);
        Self { entries, cluster_limit, trailer: vec![] }
    }

    pub fn decode(raw: &[u8]) -> Self {
        let trailer = raw[raw.len() - raw.len() % 3..].to_vec();
        Self { trailer, ..Self::new(decode_entries(raw)) }
    }

    /// Same length as the region this table was decoded from.
    pub fn encode(&self) -> Vec<u8> {
        let mut raw = encode_entries(&self.entries);
        match self.trailer.as_slice() {
            // high nibble of the last byte lies past the final entry
            [_, high] => {
                if let Some(last) = raw.last_mut() {
                    *last = (*last & 0x0F) | (high & 0xF0);
                }
            }
            [byte] => raw.push(*byte),
            _ => {}
        }
        raw
    }

    /// Restricts allocation to clusters that have backing data sectors.
    pub fn with_cluster_count(mut self, cluster_count: u32) -> Self {
        self.cluster_limit = self
            .entries
            .len()
            .min(cluster_count as usize + FIRST_DATA_CLUSTER as usize)
            .min(CLUSTER_CEILING);
        self
    }

    pub fn entries(&self) -> &[u16] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn cluster_limit(&self) -> usize {
        self.cluster_limit
    }

    pub fn get(&self, cluster: u16) -> Option<u16> {
        self.entries.get(cluster as usize).copied()
    }

    pub fn value(&self, cluster: u16) -> Option<ClusterValue> {
        self.get(cluster).map(ClusterValue::from)
    }

    fn in_data_range(&self, cluster: u16) -> bool {
        cluster >= FIRST_DATA_CLUSTER && (cluster as usize) < self.cluster_limit
    }

    /// Fails unless `cluster` names an allocatable data cluster.
    pub fn check_cluster(&self, cluster: u16) -> FatResult<()> {
        if self.in_data_range(cluster) {
            Ok(())
        } else {
            Err(FatError::BrokenChain { cluster, value: self.get(cluster).unwrap_or(FREE_CLUSTER) })
        }
    }

    pub fn next_cluster(&self, cluster: u16) -> FatResult<Option<u16>> {
        self.check_cluster(cluster)?;
        let value = self.entries[cluster as usize];
        match ClusterValue::from(value) {
            ClusterValue::Next(next) if self.in_data_range(next) => Ok(Some(next)),
            ClusterValue::EndOfChain(_) => Ok(None),
            _ => Err(FatError::BrokenChain { cluster, value }),
        }
    }

    /// Lazily walks the chain starting at `first`.
    pub fn walk(&self, first: u16) -> ChainWalk<'_> {
        ChainWalk { fat: self, state: WalkState::Start(first), visited: vec![false; self.cluster_limit] }
    }

    /// Every cluster of the chain starting at `first`, in order.
    pub fn chain(&self, first: u16) -> FatResult<Vec<u16>> {
        self.walk(first).collect()
    }

    pub fn find_free_cluster(&self) -> Option<u16> {
        (FIRST_DATA_CLUSTER as usize..self.cluster_limit)
            .find(|&i| self.entries[i] == FREE_CLUSTER)
            .map(|i| i as u16)
    }

    pub fn free_count(&self) -> usize {
        self.entries
            .iter()
            .take(self.cluster_limit)
            .skip(FIRST_DATA_CLUSTER as usize)
            .filter(|&&v| v == FREE_CLUSTER)
            .count()
    }

    pub fn mark_end_of_chain(&mut self, cluster: u16) -> FatResult<()> {
        self.check_cluster(cluster)?;
        self.entries[cluster as usize] = END_OF_CHAIN;
        Ok(())
    }

    /// Links `new` after `tail` and terminates the chain at `new`.
    /// Both clusters are checked before either entry is touched.
    pub fn extend_chain(&mut self, tail: u16, new: u16) -> FatResult<()> {
        self.check_cluster(tail)?;
        self.check_cluster(new)?;
        debug!("extending chain {} -> {}", tail, new);
        self.entries[tail as usize] = new;
        self.entries[new as usize] = END_OF_CHAIN;
        Ok(())
    }
}

enum WalkState {
    Start(u16),
    After(u16),
    Done,
}

/// Iterator over the clusters of one chain.
///
/// The link out of a cluster is only looked at when the following cluster is
/// asked for. A link that is free, reserved, bad, out of range, or that comes
/// back to a cluster already yielded ends the walk with `BrokenChain`.
pub struct ChainWalk<'a> {
    fat: &'a FatTable,
    state: WalkState,
    visited: Vec<bool>,
}

impl Iterator for ChainWalk<'_> {
    type Item = FatResult<u16>;

    fn next(&mut self) -> Option<Self::Item> {
        let step = match std::mem::replace(&mut self.state, WalkState::Done) {
            WalkState::Start(first) => self.fat.check_cluster(first).map(|_| Some(first)),
            WalkState::After(prev) => self.fat.next_cluster(prev),
            WalkState::Done => return None,
        };
        let cluster = match step {
            Ok(Some(cluster)) => cluster,
            Ok(None) => return None,
            Err(e) => return Some(Err(e)),
        };
        if std::mem::replace(&mut self.visited[cluster as usize], true) {
            return Some(Err(FatError::BrokenChain { cluster, value: self.fat.entries[cluster as usize] }));
        }
        self.state = WalkState::After(cluster);
        Some(Ok(cluster))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_three_byte_groups() {
        // entry 0 = 0xFF0, entry 1 = 0xFFF, entry 2 = 0x003, entry 3 = 0x004
        let raw = [0xF0, 0xFF, 0xFF, 0x03, 0x40, 0x00];
        assert_eq!(decode_entries(&raw), vec![0xFF0, 0xFFF, 0x003, 0x004]);
    }

    #[test]
    fn differs_from_flat_16_bit_reading() {
        let raw = [0x03, 0x40, 0x00, 0xFF, 0x0F, 0x00];
        let entries = decode_entries(&raw);
        assert_eq!(entries, vec![0x003, 0x004, 0xFFF, 0x000]);
        let flat: Vec<u16> = raw.chunks(2).map(|c| u16::from_le_bytes([c[0], c[1]])).collect();
        assert_ne!(flat[1], entries[1]);
    }

    #[test]
    fn decode_then_encode_is_identity() {
        let raw: Vec<u8> = (0..=255u8).cycle().take(4608).collect();
        assert_eq!(encode_entries(&decode_entries(&raw)), raw);
    }

    #[test]
    fn encode_then_decode_is_identity() {
        let entries: Vec<u16> = (0..3072u64).map(|i| ((i * 2654435761) % 4096) as u16).collect();
        let raw = encode_entries(&entries);
        assert_eq!(raw.len(), 4608);
        assert_eq!(decode_entries(&raw), entries);
    }

    #[test]
    fn odd_entry_count_uses_two_bytes() {
        let entries = vec![0xABC, 0x123, 0x456];
        let raw = encode_entries(&entries);
        assert_eq!(raw.len(), 5);
        assert_eq!(decode_entries(&raw), entries);
        // 512 bytes is not a multiple of three
        assert_eq!(decode_entries(&[0u8; 512]).len(), 341);
    }

    #[test]
    fn end_of_chain_markers_end_the_chain() {
        let mut entries = vec![0xFF0, 0xFFF];
        entries.extend(0xFF8..=0xFFF);
        let fat = FatTable::new(entries);
        for cluster in 2..fat.len() as u16 {
            assert_eq!(fat.next_cluster(cluster).unwrap(), None);
        }
    }

    #[test]
    fn follows_and_rejects_links() {
        let fat = FatTable::new(vec![0xFF0, 0xFFF, 0x003, 0x005, 0x000, 0xFFF, 0x001, 0xFF7, 0x009]);
        assert_eq!(fat.next_cluster(2).unwrap(), Some(3));
        assert_eq!(fat.chain(2).unwrap(), vec![2, 3, 5]);
        assert!(matches!(fat.next_cluster(4), Err(FatError::BrokenChain { cluster: 4, value: 0 })));
        assert!(matches!(fat.next_cluster(6), Err(FatError::BrokenChain { value: 1, .. })));
        assert!(matches!(fat.next_cluster(7), Err(FatError::BrokenChain { value: 0xFF7, .. })));
        // points past the table
        assert!(matches!(fat.next_cluster(8), Err(FatError::BrokenChain { .. })));
        assert!(matches!(fat.next_cluster(0), Err(FatError::BrokenChain { .. })));
    }

    #[test]
    fn detects_cycles() {
        let fat = FatTable::new(vec![0xFF0, 0xFFF, 0x003, 0x002]);
        assert!(matches!(fat.chain(2), Err(FatError::BrokenChain { cluster: 2, value: 3 })));

        // loop that does not pass through the first cluster
        let fat = FatTable::new(vec![0xFF0, 0xFFF, 0x003, 0x004, 0x003]);
        assert!(matches!(fat.chain(2), Err(FatError::BrokenChain { cluster: 3, value: 4 })));
    }

    #[test]
    fn walk_stops_before_an_unread_link() {
        let fat = FatTable::new(vec![0xFF0, 0xFFF, 0x003, 0x000]);
        let mut walk = fat.walk(2);
        assert_eq!(walk.next().unwrap().unwrap(), 2);
        assert_eq!(walk.next().unwrap().unwrap(), 3);
        assert!(matches!(walk.next(), Some(Err(FatError::BrokenChain { cluster: 3, value: 0 }))));
        assert!(walk.next().is_none());
    }

    #[test]
    fn table_round_trips_lengths_not_divisible_by_three() {
        for len in [512usize, 511, 1024, 4608] {
            let raw: Vec<u8> = (0..len).map(|i| (i * 31 % 256) as u8 | 0x80).collect();
            let fat = FatTable::decode(&raw);
            assert_eq!(fat.len(), len * 2 / 3);
            assert_eq!(fat.encode(), raw, "length {}", len);
        }
    }

    #[test]
    fn trailing_nibble_survives_a_change() {
        let raw = [0xF0, 0xFF, 0xFF, 0x00, 0xA0];
        let mut fat = FatTable::decode(&raw);
        assert_eq!(fat.entries(), &[0xFF0, 0xFFF, 0x000]);
        fat.mark_end_of_chain(2).unwrap();
        assert_eq!(fat.encode(), vec![0xF0, 0xFF, 0xFF, 0xFF, 0xAF]);
    }

    #[test]
    fn markers_are_never_allocated() {
        let mut entries = vec![END_OF_CHAIN; 5000];
        entries[0xFF0] = FREE_CLUSTER;
        entries[0xFF8] = FREE_CLUSTER;
        entries[4999] = FREE_CLUSTER;
        let fat = FatTable::new(entries.clone()).with_cluster_count(4900);
        assert_eq!(fat.cluster_limit(), 0xFF0);
        assert_eq!(fat.find_free_cluster(), None);
        assert_eq!(fat.free_count(), 0);
        assert_eq!(FatTable::new(entries).cluster_limit(), 0xFF0);
    }

    #[test]
    fn finds_lowest_free_cluster() {
        let fat = FatTable::new(vec![0x000, 0x000, 0xFFF, 0x000, 0x000]);
        assert_eq!(fat.find_free_cluster(), Some(3));
        assert_eq!(fat.free_count(), 2);

        let full = FatTable::new(vec![0xFF0, 0xFFF, 0xFFF, 0xFFF]);
        assert_eq!(full.find_free_cluster(), None);
        assert_eq!(full.free_count(), 0);
    }

    #[test]
    fn cluster_count_limits_allocation() {
        let fat = FatTable::new(vec![0xFF0, 0xFFF, 0xFFF, 0x000, 0x000]).with_cluster_count(1);
        assert_eq!(fat.cluster_limit(), 3);
        assert_eq!(fat.find_free_cluster(), None);
        assert_eq!(fat.free_count(), 0);
    }

    #[test]
    fn extends_chain() {
        let mut fat = FatTable::new(vec![0xFF0, 0xFFF, 0x000, 0x000, 0x000]);
        fat.mark_end_of_chain(2).unwrap();
        fat.extend_chain(2, 4).unwrap();
        assert_eq!(fat.entries(), &[0xFF0, 0xFFF, 0x004, 0x000, 0xFFF]);
        assert_eq!(fat.chain(2).unwrap(), vec![2, 4]);

        let before = fat.clone();
        assert!(fat.extend_chain(4, 9).is_err());
        assert_eq!(fat, before);
    }
}

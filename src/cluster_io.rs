use crate::boot_sector::BootSector;
use crate::common::{FatError, FatResult};
use crate::fat::FatTable;
use crate::storage::Storage;
use log::{debug, warn};

/// Reads and writes byte streams along cluster chains.
pub struct ClusterIo<'a, S: Storage> {
    storage: &'a mut S,
    boot: &'a BootSector,
}

impl<'a, S: Storage> ClusterIo<'a, S> {
    pub fn new(storage: &'a mut S, boot: &'a BootSector) -> Self {
        Self { storage, boot }
    }

    fn read_cluster(&mut self, cluster: u16) -> FatResult<Vec<u8>> {
        self.storage.read_at(self.boot.cluster_offset(cluster), self.boot.cluster_size())
    }

    /// First `size` bytes of the chain starting at `first`.
    pub fn read_file(&mut self, fat: &FatTable, first: u16, size: u32) -> FatResult<Vec<u8>> {
        let cluster_size = self.boot.cluster_size();
        let size = size as usize;
        if size == 0 {
            return Ok(vec![]);
        }

        // a chain can't be longer than the table, whatever the entry claims
        let mut data = Vec::with_capacity(size.min(fat.cluster_limit() * cluster_size));
        let mut walk = fat.walk(first);
        while data.len() < size {
            let cluster = match walk.next() {
                Some(cluster) => cluster?,
                None => {
                    return Err(FatError::TruncatedChain { expected: size as u32, read: data.len() as u32 });
                }
            };
            let buf = self.read_cluster(cluster)?;
            let remaining = size - data.len();
            data.extend_from_slice(&buf[..remaining.min(cluster_size)]);
        }

        if let Some(Ok(next)) = walk.next() {
            warn!("chain from cluster {} continues past file end at {}", first, next);
        }
        Ok(data)
    }

    /// Every byte of every cluster in the chain, for directory contents.
    pub fn read_chain(&mut self, fat: &FatTable, first: u16) -> FatResult<Vec<u8>> {
        let chain = fat.chain(first)?;
        let mut data = Vec::with_capacity(chain.len() * self.boot.cluster_size());
        for cluster in chain {
            data.extend(self.read_cluster(cluster)?);
        }
        Ok(data)
    }

    /// Allocates a fresh chain in `fat` and writes `data` into it.
    ///
    /// `fat` is expected to be a staging copy: on `OutOfSpace` nothing has been
    /// allocated, on a storage error the caller discards it. Returns the first
    /// cluster, or `None` when `data` is empty and no cluster was needed.
    pub fn write_file(&mut self, fat: &mut FatTable, data: &[u8]) -> FatResult<Option<u16>> {
        let cluster_size = self.boot.cluster_size();
        let needed = data.len().div_ceil(cluster_size);
        let free = fat.free_count();
        if needed > free {
            return Err(FatError::OutOfSpace { needed, free });
        }

        let mut first = None;
        let mut tail = None;
        for chunk in data.chunks(cluster_size) {
            let cluster = fat.find_free_cluster().ok_or(FatError::OutOfSpace { needed, free })?;
            match tail {
                Some(prev) => fat.extend_chain(prev, cluster)?,
                None => fat.mark_end_of_chain(cluster)?,
            }
            self.storage.write_at(self.boot.cluster_offset(cluster), chunk)?;
            first.get_or_insert(cluster);
            tail = Some(cluster);
        }

        debug!("wrote {} bytes into {} clusters starting at {:?}", data.len(), needed, first);
        Ok(first)
    }
}

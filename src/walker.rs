use crate::boot_sector::BootSector;
use crate::cluster_io::ClusterIo;
use crate::common::{FatError, FatResult};
use crate::directory::{decode_entries, DirEntry};
use crate::fat::FatTable;
use crate::storage::Storage;
use log::{debug, warn};
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirLocation {
    Root,
    Cluster(u16),
}

/// Raw directory contents: the fixed root region or a cluster chain.
pub fn read_region<S: Storage>(
    storage: &mut S,
    boot: &BootSector,
    fat: &FatTable,
    location: DirLocation,
) -> FatResult<Vec<u8>> {
    match location {
        DirLocation::Root => storage.read_at(boot.root_dir_offset(), boot.root_dir_bytes()),
        DirLocation::Cluster(first) => ClusterIo::new(storage, boot).read_chain(fat, first),
    }
}

/// Live entries of one directory, `.` and `..` included.
pub fn read_directory<S: Storage>(
    storage: &mut S,
    boot: &BootSector,
    fat: &FatTable,
    location: DirLocation,
) -> FatResult<Vec<DirEntry>> {
    let region = read_region(storage, boot, fat, location)?;
    let capacity = match location {
        DirLocation::Root => boot.root_entry_count as usize,
        DirLocation::Cluster(_) => usize::MAX,
    };
    decode_entries(&region, capacity)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    pub path: String,
    pub entry: DirEntry,
    pub depth: usize,
}

impl TreeEntry {
    pub fn is_directory(&self) -> bool {
        self.entry.is_directory()
    }
}

impl Display for TreeEntry {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {:<10} {:<20} {} {}",
            if self.is_directory() { 'D' } else { 'F' },
            self.entry.size,
            self.path,
            self.entry.write_date,
            self.entry.write_time
        )
    }
}

struct Frame {
    cluster: Option<u16>,
    path: String,
    entries: std::vec::IntoIter<DirEntry>,
}

/// Depth-first, pre-order walk over the directory tree.
///
/// Directories are loaded one at a time as the walk descends into them.
/// After an error the walker yields it once and then ends.
pub struct TreeWalker<'a, S: Storage> {
    storage: &'a mut S,
    boot: &'a BootSector,
    fat: &'a FatTable,
    stack: Vec<Frame>,
    started: bool,
    pending: Option<FatError>,
    done: bool,
}

impl<'a, S: Storage> TreeWalker<'a, S> {
    pub fn new(storage: &'a mut S, boot: &'a BootSector, fat: &'a FatTable) -> Self {
        Self { storage, boot, fat, stack: vec![], started: false, pending: None, done: false }
    }

    fn load(&mut self, location: DirLocation, path: String) -> FatResult<Frame> {
        debug!("reading directory {:?} at {:?}", path, location);
        let entries = read_directory(self.storage, self.boot, self.fat, location)?;
        let cluster = match location {
            DirLocation::Root => None,
            DirLocation::Cluster(c) => Some(c),
        };
        Ok(Frame { cluster, path, entries: entries.into_iter() })
    }

    fn fail(&mut self, err: FatError) -> Option<FatResult<TreeEntry>> {
        self.done = true;
        self.stack.clear();
        Some(Err(err))
    }

    fn should_descend(&self, entry: &DirEntry, path: &str) -> bool {
        if !entry.is_directory() {
            return false;
        }
        if !entry.has_valid_cluster() {
            warn!("directory {} has invalid first cluster {}", path, entry.first_cluster);
            return false;
        }
        if self.stack.iter().any(|f| f.cluster == Some(entry.first_cluster)) {
            warn!("directory {} loops back to cluster {}", path, entry.first_cluster);
            return false;
        }
        true
    }
}

impl<S: Storage> Iterator for TreeWalker<'_, S> {
    type Item = FatResult<TreeEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if let Some(err) = self.pending.take() {
            return self.fail(err);
        }
        if !self.started {
            self.started = true;
            match self.load(DirLocation::Root, String::new()) {
                Ok(frame) => self.stack.push(frame),
                Err(err) => return self.fail(err),
            }
        }

        loop {
            let depth = self.stack.len().checked_sub(1)?;
            let frame = self.stack.last_mut()?;
            let Some(entry) = frame.entries.next() else {
                self.stack.pop();
                continue;
            };
            if entry.is_dot() || entry.is_volume_label() || entry.is_long_name() {
                continue;
            }

            let path = format!("{}/{}", frame.path, entry.name());
            if self.should_descend(&entry, &path) {
                match self.load(DirLocation::Cluster(entry.first_cluster), path.clone()) {
                    Ok(frame) => self.stack.push(frame),
                    Err(err) => self.pending = Some(err),
                }
            }
            return Some(Ok(TreeEntry { path, entry, depth }));
        }
    }
}

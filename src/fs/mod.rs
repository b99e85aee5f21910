//! File system assembly.
//!
//! One [`FileSystem`] value per device ties the layers together:
//!   + BufferCache: write-back cache of device sectors, CLOCK eviction.
//!   + FreeMap: bitmap allocator handing out single sectors.
//!   + Inodes: extensible files over direct/indirect/double-indirect maps.
//!
//! Sector 0 holds the free-map file's inode and sector 1 the root
//! directory's; everything else is allocated dynamically. The directory
//! layer, path resolution, and system calls live outside this crate and
//! consume the inode API.

mod freemap;
mod inode;

pub use freemap::FreeMap;
pub use inode::Inode;

use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;

use log::debug;
use spin::Mutex;

use crate::bio::BufferCache;
use crate::block_dev::BlockDevice;
use crate::param::{FREE_MAP_SECTOR, ROOT_DIR_SECTOR};

/// Failures surfaced by the engine. Everything else is reported through
/// byte counts (short or zero I/O) or sentinels (translator misses).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The free map has no sector to give.
    NoSpace,
    /// Requested size exceeds what the block map can address.
    TooLarge,
}

/// Registry of open inodes: at most one live [`Inode`] per sector.
pub(crate) type Itable = Mutex<Vec<Arc<Inode>>>;

/// A file system over one block device: the cache, the free map, and the
/// open-inode table as a single value. At most one instance per device.
pub struct FileSystem {
    pub(crate) dev: Arc<dyn BlockDevice>,
    pub(crate) cache: BufferCache,
    pub(crate) freemap: FreeMap,
    pub(crate) itable: Itable,
}

impl FileSystem {
    /// Formats `dev` with a fresh file system: an empty free map persisted
    /// as a file at sector 0 and a root directory inode at sector 1.
    pub fn format(dev: Arc<dyn BlockDevice>) -> Result<Self, Error> {
        debug!("fs: formatting device of {} sectors", dev.sector_count());
        let fs = Self::assemble(dev);
        fs.freemap.mark(FREE_MAP_SECTOR);
        fs.freemap.mark(ROOT_DIR_SECTOR);

        fs.create_inode(FREE_MAP_SECTOR, fs.freemap.image_len() as i32, false)?;
        fs.create_inode(ROOT_DIR_SECTOR, 0, true)?;
        fs.sync_free_map();
        Ok(fs)
    }

    /// Opens a previously formatted device, reading the free map back from
    /// its file.
    pub fn load(dev: Arc<dyn BlockDevice>) -> Self {
        let fs = Self::assemble(dev);

        let inode = fs.open_inode(FREE_MAP_SECTOR);
        let mut image = vec![0u8; fs.freemap.image_len()];
        let n = fs.read_at(&inode, &mut image, 0);
        assert_eq!(n, image.len(), "short free-map file");
        fs.freemap.restore_image(&image);
        fs.close_inode(inode);
        fs
    }

    fn assemble(dev: Arc<dyn BlockDevice>) -> Self {
        let nsectors = dev.sector_count();
        Self {
            cache: BufferCache::new(dev.clone()),
            freemap: FreeMap::new(nsectors),
            itable: Mutex::new(Vec::new()),
            dev,
        }
    }

    /// Writes the free map's current image into its file.
    fn sync_free_map(&self) {
        let image = self.freemap.save_image();
        let inode = self.open_inode(FREE_MAP_SECTOR);
        let n = self.write_at(&inode, &image, 0);
        assert_eq!(n, image.len(), "short free-map write");
        self.close_inode(inode);
    }

    /// Flushes all state to the device: the free-map file and every dirty
    /// cache frame. Call before dropping the file system.
    pub fn close(&self) {
        self.sync_free_map();
        self.cache.flush_all();
    }

    /// The buffer cache, for introspection (hit rate, reset).
    pub fn cache(&self) -> &BufferCache {
        &self.cache
    }

    /// The free-space map.
    pub fn free_map(&self) -> &FreeMap {
        &self.freemap
    }

    /// The device underneath, with its I/O counters.
    pub fn device(&self) -> &Arc<dyn BlockDevice> {
        &self.dev
    }
}

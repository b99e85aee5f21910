//! Inodes.
//!
//! An inode describes a single unnamed file. The on-disk image
//! ([`InodeDisk`]) is exactly one sector and holds the file's length, a
//! directory flag, and the block map: 100 direct sector pointers, one
//! single-indirect sector (128 more pointers), and one double-indirect
//! sector (128 pointers to indirect sectors). A pointer value of 0 means
//! the slot is unallocated. Every live pointer references a sector owned
//! exclusively by its inode and marked allocated in the free map.
//!
//! The file system keeps a table of open inodes so that opening a sector
//! twice yields the same in-memory object. An [`Inode`] pairs the cached
//! disk image with bookkeeping that never reaches disk: the number of
//! openers, the deny-write count, and the removed flag. The last close of a
//! removed inode returns all of its sectors, and the sector of the image
//! itself, to the free map.
//!
//! Growth and shrinkage go through [`InodeDisk::resize`], which walks each
//! tier of the block map and allocates or releases slots so the map covers
//! exactly the requested length; the indirect and double-indirect sectors
//! are created lazily and released when their tier empties. Writes past end
//! of file resize implicitly; reads clip at end of file and never extend.
//!
//! Lock order is table, then inode, then everything the cache and free map
//! take internally. Each inode's bookkeeping and image sit behind the
//! inode's own lock, so concurrent operations on one file serialize.

use alloc::sync::Arc;

use core::mem;

use log::debug;
use spin::Mutex;
use static_assertions::const_assert;
use zerocopy::{AsBytes, FromBytes, FromZeroes};

use super::{Error, FileSystem};
use crate::param::{MAXFILE, NDIRECT, NINDIRECT, SECTOR_SIZE};

/// Identifies an inode image.
const INODE_MAGIC: u32 = 0x494e_4f44;

/// On-disk inode. Exactly one sector, so an image moves through the buffer
/// cache as a whole sector. Field order is the on-disk format.
#[repr(C)]
#[derive(Clone, AsBytes, FromBytes, FromZeroes)]
pub struct InodeDisk {
    /// Direct data sector pointers; 0 means unallocated.
    direct: [u32; NDIRECT],
    /// Sector holding 128 direct pointers, or 0.
    indirect: u32,
    /// Sector holding 128 indirect-sector pointers, or 0.
    double_indirect: u32,
    /// File length in bytes.
    length: i32,
    /// Must be `INODE_MAGIC`.
    magic: u32,
    /// Nonzero if this inode describes a directory.
    dir: u8,
    pad: [u8; 3],
    unused: [u32; 23],
}

const_assert!(mem::size_of::<InodeDisk>() == SECTOR_SIZE);

/// The image of an indirect or double-indirect sector: 128 sector pointers.
#[repr(C)]
#[derive(AsBytes, FromBytes, FromZeroes)]
struct IndirectBlock {
    entries: [u32; NINDIRECT],
}

const_assert!(mem::size_of::<IndirectBlock>() == SECTOR_SIZE);

/// Sectors needed to hold `size` bytes.
fn bytes_to_sectors(size: i32) -> usize {
    (size as usize + SECTOR_SIZE - 1) / SECTOR_SIZE
}

impl InodeDisk {
    /// A fresh zero-length image.
    fn new(dir: bool) -> Self {
        let mut disk = Self::new_zeroed();
        disk.magic = INODE_MAGIC;
        disk.dir = dir as u8;
        disk
    }

    /// Grows or shrinks the block map to cover `size` bytes, then records
    /// the new length.
    ///
    /// Each tier is walked slot by slot: a slot whose starting offset lies
    /// at or past `size` is released and zeroed; a slot `size` reaches that
    /// is still empty gets a fresh sector, zero-filled through the cache.
    /// The indirect and double-indirect sectors are created only when their
    /// tier is needed and released once the final `size` no longer needs
    /// them.
    ///
    /// On allocation failure the walk stops where it stands: sectors
    /// already acquired by this call are kept in the map and the length is
    /// left unchanged.
    pub(crate) fn resize(&mut self, fs: &FileSystem, size: i32) -> Result<(), Error> {
        if size < 0 || size as usize > MAXFILE * SECTOR_SIZE {
            return Err(Error::TooLarge);
        }
        debug!("inode: resize {} -> {} bytes", self.length, size);

        let zeros = [0u8; SECTOR_SIZE];

        // Direct tier.
        for i in 0..NDIRECT {
            let threshold = (i * SECTOR_SIZE) as i32;
            if size <= threshold && self.direct[i] != 0 {
                fs.freemap.release(self.direct[i]);
                self.direct[i] = 0;
            } else if size > threshold && self.direct[i] == 0 {
                self.direct[i] = fs.freemap.allocate().ok_or(Error::NoSpace)?;
                fs.cache.write(self.direct[i], &zeros, 0);
            }
        }

        // Nothing past the direct tier, and none needed.
        if self.indirect == 0 && size <= (NDIRECT * SECTOR_SIZE) as i32 {
            self.length = size;
            return Ok(());
        }

        // Single-indirect tier.
        let mut block = IndirectBlock::new_zeroed();
        if self.indirect == 0 {
            self.indirect = fs.freemap.allocate().ok_or(Error::NoSpace)?;
            fs.cache.write(self.indirect, &zeros, 0);
        } else {
            fs.cache.read(self.indirect, block.as_bytes_mut(), 0);
        }

        for j in 0..NINDIRECT {
            let threshold = ((NDIRECT + j) * SECTOR_SIZE) as i32;
            if size <= threshold && block.entries[j] != 0 {
                fs.freemap.release(block.entries[j]);
                block.entries[j] = 0;
            } else if size > threshold && block.entries[j] == 0 {
                block.entries[j] = fs.freemap.allocate().ok_or(Error::NoSpace)?;
                fs.cache.write(block.entries[j], &zeros, 0);
            }
        }

        fs.cache.write(self.indirect, block.as_bytes(), 0);

        if size <= (NDIRECT * SECTOR_SIZE) as i32 {
            fs.freemap.release(self.indirect);
            self.indirect = 0;
        }

        // Nothing past the single-indirect tier, and none needed.
        if self.double_indirect == 0 && size <= ((NDIRECT + NINDIRECT) * SECTOR_SIZE) as i32 {
            self.length = size;
            return Ok(());
        }

        // Double-indirect tier.
        let mut outer = IndirectBlock::new_zeroed();
        if self.double_indirect == 0 {
            self.double_indirect = fs.freemap.allocate().ok_or(Error::NoSpace)?;
            fs.cache.write(self.double_indirect, &zeros, 0);
        } else {
            fs.cache.read(self.double_indirect, outer.as_bytes_mut(), 0);
        }

        for i in 0..NINDIRECT {
            let tier_base = ((NDIRECT + NINDIRECT + NINDIRECT * i) * SECTOR_SIZE) as i32;
            let mut inner = IndirectBlock::new_zeroed();

            if outer.entries[i] != 0 {
                fs.cache.read(outer.entries[i], inner.as_bytes_mut(), 0);
            } else {
                // No second-level sector here yet; only needed when `size`
                // reaches into this tier.
                if size <= tier_base {
                    continue;
                }
                outer.entries[i] = fs.freemap.allocate().ok_or(Error::NoSpace)?;
                fs.cache.write(outer.entries[i], &zeros, 0);
            }

            for j in 0..NINDIRECT {
                let threshold = tier_base + (j * SECTOR_SIZE) as i32;
                if size <= threshold && inner.entries[j] != 0 {
                    fs.freemap.release(inner.entries[j]);
                    inner.entries[j] = 0;
                } else if size > threshold && inner.entries[j] == 0 {
                    inner.entries[j] = fs.freemap.allocate().ok_or(Error::NoSpace)?;
                    fs.cache.write(inner.entries[j], &zeros, 0);
                }
            }

            fs.cache.write(outer.entries[i], inner.as_bytes(), 0);

            // The second-level sector goes once no leaf under it is live.
            if size <= tier_base {
                fs.freemap.release(outer.entries[i]);
                outer.entries[i] = 0;
            }
        }

        fs.cache.write(self.double_indirect, outer.as_bytes(), 0);

        if size <= ((NDIRECT + NINDIRECT) * SECTOR_SIZE) as i32 {
            fs.freemap.release(self.double_indirect);
            self.double_indirect = 0;
        }

        self.length = size;
        Ok(())
    }

    /// Releases every sector the map references, then the indirect and
    /// double-indirect sectors themselves, leaving an empty map of length 0.
    pub(crate) fn dealloc(&mut self, fs: &FileSystem) {
        for i in 0..NDIRECT {
            if self.direct[i] != 0 {
                fs.freemap.release(self.direct[i]);
                self.direct[i] = 0;
            }
        }

        if self.indirect != 0 {
            let mut block = IndirectBlock::new_zeroed();
            fs.cache.read(self.indirect, block.as_bytes_mut(), 0);
            for entry in block.entries.iter() {
                if *entry != 0 {
                    fs.freemap.release(*entry);
                }
            }
            fs.freemap.release(self.indirect);
            self.indirect = 0;
        }

        if self.double_indirect != 0 {
            let mut outer = IndirectBlock::new_zeroed();
            fs.cache.read(self.double_indirect, outer.as_bytes_mut(), 0);
            for entry in outer.entries.iter() {
                if *entry != 0 {
                    let mut inner = IndirectBlock::new_zeroed();
                    fs.cache.read(*entry, inner.as_bytes_mut(), 0);
                    for leaf in inner.entries.iter() {
                        if *leaf != 0 {
                            fs.freemap.release(*leaf);
                        }
                    }
                    fs.freemap.release(*entry);
                }
            }
            fs.freemap.release(self.double_indirect);
            self.double_indirect = 0;
        }

        self.length = 0;
    }

    /// Device sector holding byte offset `pos`, or `None` when `pos` lies
    /// outside the file.
    pub(crate) fn byte_to_sector(&self, fs: &FileSystem, pos: i32) -> Option<u32> {
        if pos < 0 || pos >= self.length {
            return None;
        }
        let n = pos as usize / SECTOR_SIZE;

        if n < NDIRECT {
            return Some(self.direct[n]);
        }

        let mut block = IndirectBlock::new_zeroed();
        if n < NDIRECT + NINDIRECT {
            fs.cache.read(self.indirect, block.as_bytes_mut(), 0);
            return Some(block.entries[n - NDIRECT]);
        }

        fs.cache.read(self.double_indirect, block.as_bytes_mut(), 0);
        let idx = n - NDIRECT - NINDIRECT;
        let second = block.entries[idx / NINDIRECT];
        fs.cache.read(second, block.as_bytes_mut(), 0);
        Some(block.entries[idx % NINDIRECT])
    }
}

/// In-memory inode: the table's cached copy of an on-disk image plus the
/// open-time bookkeeping that never reaches disk.
pub struct Inode {
    /// Sector of the on-disk image; doubles as the inode number.
    sector: u32,
    inner: Mutex<InodeInner>,
}

struct InodeInner {
    /// Number of openers.
    open_count: u32,
    /// 0: writes ok, >0: writes denied.
    deny_write_count: u32,
    /// Deleted once the last opener closes.
    removed: bool,
    /// Cached copy of the on-disk image.
    disk: InodeDisk,
}

impl Inode {
    /// The inode's number: the sector its image lives in.
    pub fn inumber(&self) -> u32 {
        self.sector
    }

    /// Current file length in bytes.
    pub fn length(&self) -> i32 {
        self.inner.lock().disk.length
    }

    /// Whether the inode describes a directory.
    pub fn is_dir(&self) -> bool {
        self.inner.lock().disk.dir != 0
    }

    /// Number of openers holding this inode.
    pub fn open_count(&self) -> u32 {
        self.inner.lock().open_count
    }

    /// Takes another open reference to an already open inode.
    pub fn reopen(&self) {
        self.inner.lock().open_count += 1;
    }

    /// Disables writes. May be called at most once per opener.
    pub fn deny_write(&self) {
        let mut inner = self.inner.lock();
        inner.deny_write_count += 1;
        assert!(inner.deny_write_count <= inner.open_count);
    }

    /// Re-enables writes. Must be called once by each opener that called
    /// `deny_write`, before closing.
    pub fn allow_write(&self) {
        let mut inner = self.inner.lock();
        assert!(inner.deny_write_count > 0);
        assert!(inner.deny_write_count <= inner.open_count);
        inner.deny_write_count -= 1;
    }
}

impl FileSystem {
    /// Initializes a `length`-byte inode image and writes it to `sector`.
    /// The caller owns `sector` (the directory layer takes it from the free
    /// map). Data sectors are allocated immediately and zero-filled.
    ///
    /// On failure, sectors already allocated by the partial resize are not
    /// returned.
    pub fn create_inode(&self, sector: u32, length: i32, dir: bool) -> Result<(), Error> {
        assert!(length >= 0);
        debug!("inode: create sector {} length {}", sector, length);

        let mut disk = InodeDisk::new(dir);
        disk.resize(self, length)?;

        // Zero every data sector of the fresh image, not just the ones the
        // resize allocated.
        let zeros = [0u8; SECTOR_SIZE];
        for i in 0..bytes_to_sectors(length) {
            let s = disk
                .byte_to_sector(self, (i * SECTOR_SIZE) as i32)
                .expect("create_inode: unmapped sector");
            self.cache.write(s, &zeros, 0);
        }

        self.cache.write(sector, disk.as_bytes(), 0);
        Ok(())
    }

    /// Returns the in-memory inode for `sector`, reading the image through
    /// the cache on first open. Opening a sector that is already open
    /// returns the same object with its open count bumped.
    pub fn open_inode(&self, sector: u32) -> Arc<Inode> {
        let mut table = self.itable.lock();
        if let Some(inode) = table.iter().find(|i| i.sector == sector) {
            inode.reopen();
            return inode.clone();
        }

        let mut disk = InodeDisk::new_zeroed();
        self.cache.read(sector, disk.as_bytes_mut(), 0);
        let inode = Arc::new(Inode {
            sector,
            inner: Mutex::new(InodeInner {
                open_count: 1,
                deny_write_count: 0,
                removed: false,
                disk,
            }),
        });
        table.push(inode.clone());
        inode
    }

    /// Drops one open reference. The last close removes the inode from the
    /// table; if it was removed, its data sectors and its own sector go
    /// back to the free map.
    pub fn close_inode(&self, inode: Arc<Inode>) {
        let mut table = self.itable.lock();
        let mut inner = inode.inner.lock();
        inner.open_count -= 1;
        if inner.open_count > 0 {
            return;
        }

        table.retain(|i| !Arc::ptr_eq(i, &inode));
        if inner.removed {
            let InodeInner { ref mut disk, .. } = *inner;
            disk.dealloc(self);
            self.freemap.release(inode.sector);
        }
    }

    /// Marks `inode` for deletion at its last close. Deletes immediately if
    /// nothing holds it open.
    pub fn remove_inode(&self, inode: &Arc<Inode>) {
        let mut table = self.itable.lock();
        let mut inner = inode.inner.lock();
        inner.removed = true;
        if inner.open_count == 0 {
            table.retain(|i| !Arc::ptr_eq(i, inode));
            let InodeInner { ref mut disk, .. } = *inner;
            disk.dealloc(self);
            self.freemap.release(inode.sector);
        }
    }

    /// Grows or shrinks the file in place and persists the updated image.
    pub fn resize_inode(&self, inode: &Inode, size: i32) -> Result<(), Error> {
        let mut inner = inode.inner.lock();
        let InodeInner { ref mut disk, .. } = *inner;
        disk.resize(self, size)?;
        self.cache.write(inode.sector, disk.as_bytes(), 0);
        Ok(())
    }

    /// Copies up to `dst.len()` bytes starting at byte `offset` of the file
    /// into `dst`. Returns the number of bytes read, clipped at end of
    /// file; never extends.
    pub fn read_at(&self, inode: &Inode, dst: &mut [u8], offset: i32) -> usize {
        let inner = inode.inner.lock();

        let mut offset = offset;
        let mut size = dst.len();
        let mut bytes_read = 0usize;

        while size > 0 {
            let sector = match inner.disk.byte_to_sector(self, offset) {
                Some(s) => s,
                None => break,
            };
            let sector_ofs = offset as usize % SECTOR_SIZE;

            // Bytes left in the file, bytes left in the sector, lesser of
            // the two; then no more than asked for.
            let inode_left = (inner.disk.length - offset) as usize;
            let sector_left = SECTOR_SIZE - sector_ofs;
            let chunk = size.min(sector_left).min(inode_left);
            if chunk == 0 {
                break;
            }

            self.cache
                .read(sector, &mut dst[bytes_read..bytes_read + chunk], sector_ofs);

            size -= chunk;
            offset += chunk as i32;
            bytes_read += chunk;
        }

        bytes_read
    }

    /// Copies `src` into the file starting at byte `offset`, growing the
    /// file first when the write lands past end of file. Returns the number
    /// of bytes written: 0 when the growth fails or writes are denied. The
    /// growth happens even for a denied write.
    pub fn write_at(&self, inode: &Inode, src: &[u8], offset: i32) -> usize {
        let mut inner = inode.inner.lock();

        let end = offset + src.len() as i32;
        if end > inner.disk.length {
            let InodeInner { ref mut disk, .. } = *inner;
            if disk.resize(self, end).is_err() {
                return 0;
            }
        }

        if inner.deny_write_count > 0 {
            return 0;
        }

        let mut offset = offset;
        let mut size = src.len();
        let mut bytes_written = 0usize;

        while size > 0 {
            let sector = match inner.disk.byte_to_sector(self, offset) {
                Some(s) => s,
                None => break,
            };
            let sector_ofs = offset as usize % SECTOR_SIZE;

            let inode_left = (inner.disk.length - offset) as usize;
            let sector_left = SECTOR_SIZE - sector_ofs;
            let chunk = size.min(sector_left).min(inode_left);
            if chunk == 0 {
                break;
            }

            self.cache
                .write(sector, &src[bytes_written..bytes_written + chunk], sector_ofs);

            size -= chunk;
            offset += chunk as i32;
            bytes_written += chunk;
        }

        // Persist the image: the growth above may have changed the map even
        // when no payload byte moved.
        self.cache.write(inode.sector, inner.disk.as_bytes(), 0);

        bytes_written
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block_dev::MemoryDisk;

    fn fs(nsectors: u32) -> FileSystem {
        FileSystem::format(Arc::new(MemoryDisk::new(nsectors))).unwrap()
    }

    fn new_file(fs: &FileSystem, length: i32) -> u32 {
        let sector = fs.free_map().allocate().unwrap();
        fs.create_inode(sector, length, false).unwrap();
        sector
    }

    #[test]
    fn disk_image_is_one_sector() {
        assert_eq!(mem::size_of::<InodeDisk>(), SECTOR_SIZE);
        assert_eq!(mem::size_of::<IndirectBlock>(), SECTOR_SIZE);
    }

    #[test]
    fn create_sets_magic_and_dir_flag() {
        let fs = fs(256);
        let s = fs.free_map().allocate().unwrap();
        fs.create_inode(s, 0, true).unwrap();

        let inode = fs.open_inode(s);
        assert!(inode.is_dir());
        assert_eq!(inode.length(), 0);
        assert_eq!(inode.inner.lock().disk.magic, INODE_MAGIC);
        fs.close_inode(inode);
    }

    #[test]
    fn grow_stays_direct_until_direct_tier_full() {
        let fs = fs(512);
        let s = new_file(&fs, (NDIRECT * SECTOR_SIZE) as i32);
        let inode = fs.open_inode(s);
        assert_eq!(inode.inner.lock().disk.indirect, 0);

        fs.resize_inode(&inode, (NDIRECT * SECTOR_SIZE) as i32 + 1)
            .unwrap();
        assert_ne!(inode.inner.lock().disk.indirect, 0);
        fs.close_inode(inode);
    }

    #[test]
    fn shrink_releases_indirect_sector() {
        let fs = fs(512);
        let s = new_file(&fs, ((NDIRECT + 4) * SECTOR_SIZE) as i32);
        let inode = fs.open_inode(s);
        assert_ne!(inode.inner.lock().disk.indirect, 0);

        fs.resize_inode(&inode, SECTOR_SIZE as i32).unwrap();
        let inner = inode.inner.lock();
        assert_eq!(inner.disk.indirect, 0);
        assert_ne!(inner.disk.direct[0], 0);
        assert_eq!(inner.disk.direct[1], 0);
        drop(inner);
        fs.close_inode(inode);
    }

    #[test]
    fn double_indirect_appears_past_228_sectors() {
        let fs = fs(1024);
        let s = new_file(&fs, ((NDIRECT + NINDIRECT) * SECTOR_SIZE) as i32);
        let inode = fs.open_inode(s);
        assert_eq!(inode.inner.lock().disk.double_indirect, 0);

        fs.resize_inode(&inode, ((NDIRECT + NINDIRECT) * SECTOR_SIZE) as i32 + 1)
            .unwrap();
        assert_ne!(inode.inner.lock().disk.double_indirect, 0);

        fs.resize_inode(&inode, ((NDIRECT + NINDIRECT) * SECTOR_SIZE) as i32)
            .unwrap();
        assert_eq!(inode.inner.lock().disk.double_indirect, 0);
        fs.close_inode(inode);
    }

    #[test]
    fn resize_rejects_over_capacity() {
        let fs = fs(256);
        let s = new_file(&fs, 0);
        let inode = fs.open_inode(s);
        let too_big = (MAXFILE * SECTOR_SIZE) as i32 + 1;
        assert_eq!(fs.resize_inode(&inode, too_big), Err(Error::TooLarge));
        assert_eq!(inode.length(), 0);
        fs.close_inode(inode);
    }

    #[test]
    fn resize_fails_without_rollback_when_map_exhausted() {
        let fs = fs(64);
        let s = new_file(&fs, 0);
        let inode = fs.open_inode(s);

        let before = fs.free_map().allocated_count();
        // More sectors than the device has left.
        let res = fs.resize_inode(&inode, (200 * SECTOR_SIZE) as i32);
        assert_eq!(res, Err(Error::NoSpace));
        assert_eq!(inode.length(), 0);
        // The partial allocations stay claimed.
        assert!(fs.free_map().allocated_count() > before);
        fs.close_inode(inode);
    }

    #[test]
    fn translator_walks_all_tiers() {
        let fs = fs(2048);
        let len = ((NDIRECT + NINDIRECT + 3) * SECTOR_SIZE) as i32;
        let s = new_file(&fs, len);
        let inode = fs.open_inode(s);
        let inner = inode.inner.lock();

        let direct = inner.disk.byte_to_sector(&fs, 0).unwrap();
        assert_eq!(direct, inner.disk.direct[0]);

        assert!(inner
            .disk
            .byte_to_sector(&fs, (NDIRECT * SECTOR_SIZE) as i32)
            .is_some());
        assert!(inner
            .disk
            .byte_to_sector(&fs, ((NDIRECT + NINDIRECT) * SECTOR_SIZE) as i32)
            .is_some());

        assert_eq!(inner.disk.byte_to_sector(&fs, len), None);
        assert_eq!(inner.disk.byte_to_sector(&fs, -1), None);
        drop(inner);
        fs.close_inode(inode);
    }

    #[test]
    fn open_twice_returns_same_object() {
        let fs = fs(256);
        let s = new_file(&fs, 0);
        let a = fs.open_inode(s);
        let b = fs.open_inode(s);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.open_count(), 2);

        fs.close_inode(b);
        assert_eq!(a.open_count(), 1);
        fs.close_inode(a);
    }

    #[test]
    fn remove_frees_sectors_at_last_close() {
        let fs = fs(512);
        let baseline = fs.free_map().allocated_count();

        let s = fs.free_map().allocate().unwrap();
        fs.create_inode(s, (20 * SECTOR_SIZE) as i32, false).unwrap();
        let inode = fs.open_inode(s);
        assert!(fs.free_map().allocated_count() > baseline);

        fs.remove_inode(&inode);
        // Still open: nothing released yet.
        assert!(fs.free_map().allocated_count() > baseline);

        fs.close_inode(inode);
        assert_eq!(fs.free_map().allocated_count(), baseline);
    }

    #[test]
    fn free_map_file_reload_preserves_allocations() {
        let dev = Arc::new(MemoryDisk::new(256));
        let fs = FileSystem::format(dev.clone()).unwrap();
        let s = new_file(&fs, (4 * SECTOR_SIZE) as i32);
        let count = fs.free_map().allocated_count();
        fs.close();

        let fs = FileSystem::load(dev);
        assert_eq!(fs.free_map().allocated_count(), count);
        let inode = fs.open_inode(s);
        assert_eq!(inode.length(), (4 * SECTOR_SIZE) as i32);
        fs.close_inode(inode);
    }

    #[test]
    fn deny_write_is_a_counter() {
        let fs = fs(256);
        let s = new_file(&fs, 0);
        let inode = fs.open_inode(s);
        inode.reopen();

        inode.deny_write();
        inode.deny_write();
        assert_eq!(fs.write_at(&inode, b"x", 0), 0);
        inode.allow_write();
        assert_eq!(fs.write_at(&inode, b"x", 0), 0);
        inode.allow_write();
        assert_eq!(fs.write_at(&inode, b"x", 0), 1);

        fs.close_inode(inode.clone());
        fs.close_inode(inode);
    }
}

//! Buffer cache.
//!
//! The buffer cache is a fixed pool of sector-sized frames holding cached
//! copies of device sectors. Caching reduces the number of device reads, and
//! a frame is the synchronization point for a sector shared by multiple
//! threads: no two valid frames ever hold the same sector.
//!
//! The cache is write-back. A write dirties the frame and returns; dirty
//! frames reach the device only when they are evicted or when `flush_all`
//! runs. Eviction is second-chance (CLOCK): a hand sweeps the frame table
//! cyclically, clearing accessed bits, and claims the first frame whose bit
//! is already clear. Frames that have never held a sector are claimed first,
//! with no eviction.
//!
//! Two levels of locking:
//! * the control lock guards the frame table: sector assignments,
//!   valid/dirty/accessed bits, the clock hand, and the hit/miss counters;
//! * one lock per frame guards that frame's 512-byte payload.
//!
//! Device I/O and payload copies happen with the control lock released and
//! only the frame lock held, so threads working on different frames proceed
//! in parallel. The frame lock is taken while the control lock is still
//! held: repurposing a frame requires its lock, so a frame cannot be
//! reassigned between the moment a thread claims it and the moment the
//! thread is done with its payload. A frame-lock holder never takes the
//! control lock.

use alloc::sync::Arc;

use array_macro::array;
use log::trace;
use spin::Mutex;

use crate::block_dev::BlockDevice;
use crate::param::{NBUF, SECTOR_SIZE};

/// Sector value of a frame that has never been assigned.
const NO_SECTOR: u32 = u32::MAX;

/// Per-frame state guarded by the control lock.
struct FrameMeta {
    sector: u32,
    /// Frame holds a sector's contents.
    valid: bool,
    /// Contents differ from the device; must be written back before reuse.
    dirty: bool,
    /// Second-chance bit, set on every hit and claim.
    accessed: bool,
}

impl FrameMeta {
    const fn new() -> Self {
        Self {
            sector: NO_SECTOR,
            valid: false,
            dirty: false,
            accessed: false,
        }
    }

    /// Binds this frame to `sector`, fresh.
    fn assign(&mut self, sector: u32) {
        self.sector = sector;
        self.valid = true;
        self.dirty = false;
        self.accessed = true;
    }
}

/// Frame table, clock hand, and lookup statistics.
struct CacheCtrl {
    meta: [FrameMeta; NBUF],
    /// Clock hand; always a valid index into `meta`.
    hand: usize,
    hits: u64,
    misses: u64,
}

impl CacheCtrl {
    /// Index of the valid frame holding `sector`, if cached.
    fn find(&self, sector: u32) -> Option<usize> {
        self.meta.iter().position(|m| m.valid && m.sector == sector)
    }

    /// Claims a frame for `sector`: an invalid frame if one exists,
    /// otherwise the first frame the clock hand reaches whose accessed bit
    /// is clear (clearing set bits along the way). The hand advances one
    /// past an evicted frame. Returns the frame index and, when the victim
    /// was dirty, the sector it must be written back to.
    fn claim(&mut self, sector: u32) -> (usize, Option<u32>) {
        if let Some(i) = self.meta.iter().position(|m| !m.valid) {
            self.meta[i].assign(sector);
            return (i, None);
        }

        loop {
            let i = self.hand;
            if self.meta[i].accessed {
                self.meta[i].accessed = false;
                self.hand = (self.hand + 1) % NBUF;
            } else {
                let writeback = if self.meta[i].dirty {
                    Some(self.meta[i].sector)
                } else {
                    None
                };
                trace!("bio: evict frame {} ({} -> {})", i, self.meta[i].sector, sector);
                self.meta[i].assign(sector);
                self.hand = (self.hand + 1) % NBUF;
                return (i, writeback);
            }
        }
    }
}

/// A frame's payload, guarded by the per-frame lock.
struct FrameData {
    bytes: [u8; SECTOR_SIZE],
}

/// Write-back cache of [`NBUF`] sector frames with CLOCK eviction.
///
/// All file system I/O goes through here; nothing above this layer touches
/// the device.
pub struct BufferCache {
    dev: Arc<dyn BlockDevice>,
    ctrl: Mutex<CacheCtrl>,
    frames: [Mutex<FrameData>; NBUF],
}

impl BufferCache {
    /// A cache of [`NBUF`] empty frames in front of `dev`.
    pub fn new(dev: Arc<dyn BlockDevice>) -> Self {
        Self {
            dev,
            ctrl: Mutex::new(CacheCtrl {
                meta: array![_ => FrameMeta::new(); NBUF],
                hand: 0,
                hits: 0,
                misses: 0,
            }),
            frames: array![_ => Mutex::new(FrameData { bytes: [0; SECTOR_SIZE] }); NBUF],
        }
    }

    /// Copies `dst.len()` bytes of `sector`, starting `offset` bytes into
    /// the sector, out of the cache. Loads the sector from the device on a
    /// miss. `offset + dst.len()` must not cross the sector boundary.
    pub fn read(&self, sector: u32, dst: &mut [u8], offset: usize) {
        debug_assert!(offset + dst.len() <= SECTOR_SIZE);

        let mut ctrl = self.ctrl.lock();
        match ctrl.find(sector) {
            Some(i) => {
                ctrl.meta[i].accessed = true;
                ctrl.hits += 1;
                let frame = self.frames[i].lock();
                drop(ctrl);
                dst.copy_from_slice(&frame.bytes[offset..offset + dst.len()]);
            }
            None => {
                ctrl.misses += 1;
                let (i, writeback) = ctrl.claim(sector);
                let mut frame = self.frames[i].lock();
                drop(ctrl);
                if let Some(old) = writeback {
                    self.dev.write_sector(old, &frame.bytes);
                }
                self.dev.read_sector(sector, &mut frame.bytes);
                dst.copy_from_slice(&frame.bytes[offset..offset + dst.len()]);
            }
        }
    }

    /// Copies `src` into `sector` at `offset`, dirtying the frame. A miss
    /// claims a frame without reading the device: the payload overwrites
    /// it. `offset + src.len()` must not cross the sector boundary.
    pub fn write(&self, sector: u32, src: &[u8], offset: usize) {
        debug_assert!(offset + src.len() <= SECTOR_SIZE);

        let mut ctrl = self.ctrl.lock();
        match ctrl.find(sector) {
            Some(i) => {
                ctrl.meta[i].accessed = true;
                ctrl.meta[i].dirty = true;
                let mut frame = self.frames[i].lock();
                drop(ctrl);
                frame.bytes[offset..offset + src.len()].copy_from_slice(src);
            }
            None => {
                let (i, writeback) = ctrl.claim(sector);
                ctrl.meta[i].dirty = true;
                let mut frame = self.frames[i].lock();
                drop(ctrl);
                if let Some(old) = writeback {
                    self.dev.write_sector(old, &frame.bytes);
                }
                frame.bytes[offset..offset + src.len()].copy_from_slice(src);
            }
        }
    }

    /// Writes every valid, dirty frame back to the device and clears its
    /// dirty bit.
    pub fn flush_all(&self) {
        for i in 0..NBUF {
            let mut ctrl = self.ctrl.lock();
            if ctrl.meta[i].valid && ctrl.meta[i].dirty {
                ctrl.meta[i].dirty = false;
                let sector = ctrl.meta[i].sector;
                let frame = self.frames[i].lock();
                drop(ctrl);
                self.dev.write_sector(sector, &frame.bytes);
            }
        }
    }

    /// Flushes, then invalidates every frame. Test hook for measuring
    /// cold-cache behavior.
    pub fn reset(&self) {
        self.flush_all();
        let mut ctrl = self.ctrl.lock();
        for m in ctrl.meta.iter_mut() {
            m.valid = false;
            m.dirty = false;
            m.accessed = false;
        }
    }

    /// Fraction of `read` lookups served from a frame since the last
    /// `reset_stats`; 0 when nothing has been read.
    pub fn hit_rate(&self) -> f64 {
        let ctrl = self.ctrl.lock();
        let total = ctrl.hits + ctrl.misses;
        if total == 0 {
            0.0
        } else {
            ctrl.hits as f64 / total as f64
        }
    }

    /// `read` lookups served from a frame since the last `reset_stats`.
    pub fn hits(&self) -> u64 {
        self.ctrl.lock().hits
    }

    /// `read` lookups that went to the device since the last `reset_stats`.
    pub fn misses(&self) -> u64 {
        self.ctrl.lock().misses
    }

    /// Clears the hit/miss counters.
    pub fn reset_stats(&self) {
        let mut ctrl = self.ctrl.lock();
        ctrl.hits = 0;
        ctrl.misses = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block_dev::MemoryDisk;

    fn cache(nsectors: u32) -> (Arc<MemoryDisk>, BufferCache) {
        let dev = Arc::new(MemoryDisk::new(nsectors));
        let cache = BufferCache::new(dev.clone());
        (dev, cache)
    }

    #[test]
    fn write_then_read_coheres() {
        let (_dev, cache) = cache(128);
        let payload = [0x5au8; SECTOR_SIZE];
        cache.write(7, &payload, 0);
        cache.flush_all();

        let mut out = [0u8; SECTOR_SIZE];
        cache.read(7, &mut out, 0);
        assert_eq!(payload[..], out[..]);
    }

    #[test]
    fn flush_clears_dirty_bits() {
        let (dev, cache) = cache(128);
        for s in 0..10u32 {
            cache.write(s, &[s as u8; SECTOR_SIZE], 0);
        }
        cache.flush_all();
        let after_first = dev.write_count();
        assert_eq!(after_first, 10);

        // Every frame is clean now, so a second flush writes nothing.
        cache.flush_all();
        assert_eq!(dev.write_count(), after_first);
    }

    #[test]
    fn eviction_writes_back_dirty_victim() {
        let (dev, cache) = cache(256);
        // Fill all frames with dirty sectors, then touch one more.
        for s in 0..NBUF as u32 {
            cache.write(s, &[1u8; SECTOR_SIZE], 0);
        }
        assert_eq!(dev.write_count(), 0);
        cache.write(NBUF as u32, &[2u8; SECTOR_SIZE], 0);
        assert_eq!(dev.write_count(), 1);
    }

    #[test]
    fn evicted_sector_survives_on_device() {
        let (_dev, cache) = cache(256);
        for s in 0..=NBUF as u32 {
            cache.write(s, &[(s + 1) as u8; SECTOR_SIZE], 0);
        }
        // Sector 0 was evicted to make room; reading it again must load the
        // written-back copy.
        let mut out = [0xffu8; SECTOR_SIZE];
        cache.read(0, &mut out, 0);
        assert!(out.iter().all(|b| *b == 1));
    }

    #[test]
    fn partial_read_and_write_within_sector() {
        let (_dev, cache) = cache(16);
        cache.write(3, &[0u8; SECTOR_SIZE], 0);
        cache.write(3, b"abcd", 100);

        let mut out = [0u8; 4];
        cache.read(3, &mut out, 100);
        assert_eq!(&out, b"abcd");

        let mut whole = [0u8; SECTOR_SIZE];
        cache.read(3, &mut whole, 0);
        assert_eq!(&whole[100..104], b"abcd");
        assert_eq!(whole[99], 0);
        assert_eq!(whole[104], 0);
    }

    #[test]
    fn hit_rate_improves_when_warm() {
        let (_dev, cache) = cache(64);
        for s in 0..20u32 {
            cache.write(s, &[0u8; SECTOR_SIZE], 0);
        }
        cache.reset();
        cache.reset_stats();

        let mut buf = [0u8; SECTOR_SIZE];
        for s in 0..20u32 {
            cache.read(s, &mut buf, 0);
        }
        let cold = cache.hit_rate();

        cache.reset_stats();
        for s in 0..20u32 {
            cache.read(s, &mut buf, 0);
        }
        let hot = cache.hit_rate();

        assert!(hot > cold, "hot {} <= cold {}", hot, cold);
        assert_eq!(cache.hits(), 20);
        assert_eq!(cache.misses(), 0);
    }

    #[test]
    fn reset_invalidates_frames() {
        let (dev, cache) = cache(64);
        cache.write(5, &[9u8; SECTOR_SIZE], 0);
        cache.reset();
        assert_eq!(dev.write_count(), 1);

        cache.reset_stats();
        let mut buf = [0u8; SECTOR_SIZE];
        cache.read(5, &mut buf, 0);
        assert_eq!(cache.misses(), 1);
        assert_eq!(buf[0], 9);
    }

    #[test]
    fn parallel_readers_on_distinct_sectors() {
        use std::sync::Arc as StdArc;
        use std::thread;
        use std::vec::Vec;

        let dev = StdArc::new(MemoryDisk::new(256));
        let cache = StdArc::new(BufferCache::new(dev));
        for s in 0..128u32 {
            cache.write(s, &[(s % 251) as u8; SECTOR_SIZE], 0);
        }
        cache.reset();

        let mut handles = Vec::new();
        for t in 0..4u32 {
            let cache = cache.clone();
            handles.push(thread::spawn(move || {
                let mut buf = [0u8; SECTOR_SIZE];
                for round in 0..50u32 {
                    let s = (t * 31 + round) % 128;
                    cache.read(s, &mut buf, 0);
                    assert!(buf.iter().all(|b| *b == (s % 251) as u8));
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
    }
}

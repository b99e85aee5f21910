//! clockfs: an OS-course file system engine.
//!
//! The crate implements the disk-facing core of a hobby file system: a
//! write-back buffer cache with second-chance (CLOCK) eviction in front of a
//! fixed-size block device, and an inode layer giving extensible files
//! through direct, single-indirect, and double-indirect sector maps. The
//! layers above it (system calls, path resolution, directories) and below it
//! (the device driver) are out of scope; the crate consumes a [`BlockDevice`]
//! and serves the inode and file I/O API.
//!
//! ```
//! use std::sync::Arc;
//! use clockfs::{FileSystem, MemoryDisk};
//!
//! let fs = FileSystem::format(Arc::new(MemoryDisk::new(1024))).unwrap();
//!
//! let sector = fs.free_map().allocate().unwrap();
//! fs.create_inode(sector, 0, false).unwrap();
//!
//! let file = fs.open_inode(sector);
//! assert_eq!(fs.write_at(&file, b"hello", 0), 5);
//!
//! let mut buf = [0u8; 5];
//! assert_eq!(fs.read_at(&file, &mut buf, 0), 5);
//! assert_eq!(&buf, b"hello");
//! fs.close_inode(file);
//!
//! fs.close();
//! ```

#![no_std]
#![warn(rust_2018_idioms)]
#![deny(unused_import_braces)]

extern crate alloc;

#[cfg(test)]
extern crate std;

pub mod bio;
pub mod block_dev;
pub mod fs;
pub mod param;

pub use bio::BufferCache;
pub use block_dev::{BlockDevice, MemoryDisk};
pub use fs::{Error, FileSystem, FreeMap, Inode};

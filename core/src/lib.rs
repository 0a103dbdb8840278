// Copyright 2026 The hidefs Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Encrypted, plausibly-deniable block storage: two independent namespaces (cover and
//! hidden) sharing one backing file, such that observing the raw file or compelling
//! disclosure of the cover key cannot prove a hidden aspect exists.
//!
//! This crate is the storage core only — it has no notion of POSIX paths, `errno`, or
//! mount points. `hidefs-fuse` is the adaptor that turns this into a mounted
//! filesystem; everything here is reachable from a plain `Buffer` handle.
//!
//! The on-disk root of each aspect is always logical block `0`, a [`dir::Dir`]. There
//! is no separate superblock beyond the two mapping tables [`disk::Disk`] maintains.

pub mod aspect;
pub mod blockfile;
pub mod blocktree;
pub mod buffer;
pub mod consts;
pub mod crypto;
pub mod dir;
pub mod disk;
pub mod error;
pub mod file;

pub use aspect::{Aspect, BlockId, LogicalId};
pub use buffer::{Buffer, BlockAccessor, OperationHandle, SlotCounts};
pub use dir::Dir;
pub use error::{Error, Result};
pub use file::File;

/// The logical id both aspects' root directory lives at. Fixed by convention, not
/// stored anywhere on disk; `Buffer::open` simply trusts it was allocated first.
pub const ROOT_BLOCK_ID: BlockId = 0;

/// Formats a fresh backing file of `total_slots` physical slots and initializes both
/// aspect roots, leaving the buffer flushed and ready to mount: allocate and flush the
/// cover and hidden root directories so that logical id 0 exists in both aspects
/// before anything else is ever created.
pub fn format(
    path: &std::path::Path,
    cover_key: &[u8],
    hidden_key: &[u8],
    total_slots: u32,
    cache_size: usize,
) -> Result<Buffer> {
    let buffer = Buffer::create(path, cover_key, hidden_key, total_slots, cache_size)?;
    {
        let op = buffer.operation(Aspect::Cover, 4);
        let cover_root = Dir::create(&buffer, Aspect::Cover)?;
        assert_eq!(cover_root.id().1, ROOT_BLOCK_ID, "cover root must be the first cover allocation");
        drop(cover_root);
        drop(op);
    }
    {
        let op = buffer.operation(Aspect::Hidden, 4);
        let hidden_root = Dir::create(&buffer, Aspect::Hidden)?;
        assert_eq!(hidden_root.id().1, ROOT_BLOCK_ID, "hidden root must be the first hidden allocation");
        drop(hidden_root);
        drop(op);
    }
    buffer.flush()?;
    Ok(buffer)
}

/// Opens an existing backing file. Thin rename of `Buffer::open` kept at the crate
/// root so callers can `hidefs_core::open(...)` without reaching into `buffer`.
pub fn open(
    path: &std::path::Path,
    cover_key: &[u8],
    hidden_key: &[u8],
    cache_size: usize,
) -> Result<Buffer> {
    Buffer::open(path, cover_key, hidden_key, cache_size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use consts::KEY_SIZE;
    use tempfile::NamedTempFile;

    #[test]
    fn format_leaves_both_roots_readable() {
        let tmp = NamedTempFile::new().unwrap();
        std::fs::remove_file(tmp.path()).ok();
        let cover_key = [5u8; KEY_SIZE];
        let hidden_key = [6u8; KEY_SIZE];
        format(tmp.path(), &cover_key, &hidden_key, 256, 16).unwrap();

        let buf = open(tmp.path(), &cover_key, &hidden_key, 16).unwrap();
        let op = buf.operation(Aspect::Cover, 4);
        let cover_root = Dir::open(&buf, Aspect::Cover, ROOT_BLOCK_ID);
        assert!(cover_root.is_empty());
        drop(cover_root);
        drop(op);

        let op = buf.operation(Aspect::Hidden, 4);
        let hidden_root = Dir::open(&buf, Aspect::Hidden, ROOT_BLOCK_ID);
        assert!(hidden_root.is_empty());
        drop(hidden_root);
        drop(op);
    }
}

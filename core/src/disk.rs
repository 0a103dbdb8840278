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

//! Raw slot I/O over the backing file, and the layout arithmetic that splits it into
//! the cover mapping table, the hidden mapping table, and the data region.

use std::fs::{File, OpenOptions};
use std::os::unix::fs::FileExt;
use std::path::Path;

use parking_lot::Mutex;
use rand::rngs::OsRng;
use rand::RngCore;

use crate::aspect::Aspect;
use crate::consts::{KEY_SIZE, MAPPING_ENTRIES_PER_BLOCK, PHYSICAL_BLOCK_SIZE};
use crate::crypto;
use crate::error::{Error, Result};

/// Computes M, the number of logical blocks each mapping table occupies, for a backing
/// file holding `total_slots` physical slots: the smallest M such that the data region
/// plus both tables (2·M slots) still fits.
pub fn mapping_blocks_for(total_slots: u32) -> u32 {
    let per_table_and_data = MAPPING_ENTRIES_PER_BLOCK + 2;
    (total_slots + per_table_and_data - 1) / per_table_and_data
}

/// The backing file, guarded by a single mutex: every physical read or write to it is
/// serialized, matching the one-disk-mutex model (concurrent operations contend on the
/// buffer cache, not on the file itself).
pub struct Disk {
    file: Mutex<File>,
    cover_key: [u8; KEY_SIZE],
    hidden_key: [u8; KEY_SIZE],
    total_slots: u32,
    mapping_blocks: u32,
}

impl Disk {
    /// Creates a fresh backing file of `total_slots` physical slots, each filled with
    /// random bytes so that an unformatted disk is indistinguishable from a formatted
    /// one until mapping tables are written over it.
    pub fn create(path: &Path, total_slots: u32) -> Result<()> {
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)?;
        let mut rng = OsRng;
        let mut buf = vec![0u8; PHYSICAL_BLOCK_SIZE as usize];
        for slot in 0..total_slots {
            rng.fill_bytes(&mut buf);
            file.write_all_at(&buf, slot as u64 * PHYSICAL_BLOCK_SIZE as u64)?;
        }
        Ok(())
    }

    pub fn open(path: &Path, cover_key: &[u8], hidden_key: &[u8]) -> Result<Self> {
        let cover_key = to_key(cover_key)?;
        let hidden_key = to_key(hidden_key)?;

        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let size = file.metadata()?.len();
        if size % PHYSICAL_BLOCK_SIZE as u64 != 0 {
            return Err(Error::MisalignedFileSize {
                size,
                block: PHYSICAL_BLOCK_SIZE,
            });
        }
        let total_slots = (size / PHYSICAL_BLOCK_SIZE as u64) as u32;
        let mapping_blocks = mapping_blocks_for(total_slots);

        Ok(Self {
            file: Mutex::new(file),
            cover_key,
            hidden_key,
            total_slots,
            mapping_blocks,
        })
    }

    pub fn total_slots(&self) -> u32 {
        self.total_slots
    }

    /// M: logical blocks occupied by each aspect's mapping table.
    pub fn mapping_blocks(&self) -> u32 {
        self.mapping_blocks
    }

    /// Number of physical slots available for data, after both mapping tables.
    pub fn data_slots(&self) -> u32 {
        self.total_slots - 2 * self.mapping_blocks
    }

    /// Maps a slot index within the data region (`0..data_slots()`) to its absolute
    /// physical slot number.
    pub fn data_slot_to_physical(&self, data_slot: u32) -> u32 {
        2 * self.mapping_blocks + data_slot
    }

    pub fn physical_to_data_slot(&self, physical: u32) -> u32 {
        physical - 2 * self.mapping_blocks
    }

    /// Physical slot holding entry `i` of the mapping table for `aspect`.
    pub fn mapping_table_slot(&self, aspect: Aspect, i: u32) -> u32 {
        match aspect {
            Aspect::Cover => i,
            Aspect::Hidden => self.mapping_blocks + i,
        }
    }

    fn key_for(&self, aspect: Aspect) -> &[u8; KEY_SIZE] {
        match aspect {
            Aspect::Cover => &self.cover_key,
            Aspect::Hidden => &self.hidden_key,
        }
    }

    /// Reads and decrypts physical slot `slot` under `aspect`'s key. The caller is
    /// responsible for knowing which aspect actually owns the slot; decrypting with the
    /// wrong key silently yields garbage rather than failing.
    pub fn read_slot(&self, slot: u32, aspect: Aspect) -> Result<Vec<u8>> {
        assert!(slot < self.total_slots, "slot {slot} out of range");
        let mut raw = vec![0u8; PHYSICAL_BLOCK_SIZE as usize];
        self.file
            .lock()
            .read_exact_at(&mut raw, slot as u64 * PHYSICAL_BLOCK_SIZE as u64)?;
        Ok(crypto::decrypt_slot(self.key_for(aspect), &raw))
    }

    /// Encrypts `plaintext` under `aspect`'s key with a fresh IV and writes it to
    /// physical slot `slot`.
    pub fn write_slot(&self, slot: u32, aspect: Aspect, plaintext: &[u8]) -> Result<()> {
        assert!(slot < self.total_slots, "slot {slot} out of range");
        let mut rng = OsRng;
        let raw = crypto::encrypt_slot(self.key_for(aspect), plaintext, &mut rng);
        self.file
            .lock()
            .write_all_at(&raw, slot as u64 * PHYSICAL_BLOCK_SIZE as u64)?;
        Ok(())
    }
}

fn to_key(bytes: &[u8]) -> Result<[u8; KEY_SIZE]> {
    bytes.try_into().map_err(|_| Error::BadKeySize {
        expected: KEY_SIZE,
        got: bytes.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn mapping_blocks_computation() {
        assert_eq!(mapping_blocks_for(0), 0);
        assert_eq!(mapping_blocks_for(1), 1);
        assert_eq!(mapping_blocks_for(1022 + 2), 1);
        assert_eq!(mapping_blocks_for(1023 + 2), 2);
    }

    #[test]
    fn create_then_open_roundtrips_slots() {
        let tmp = NamedTempFile::new().unwrap();
        std::fs::remove_file(tmp.path()).ok();
        Disk::create(tmp.path(), 16).unwrap();
        let disk = Disk::open(tmp.path(), &[1u8; KEY_SIZE], &[2u8; KEY_SIZE]).unwrap();
        assert_eq!(disk.total_slots(), 16);

        let data = vec![0x42u8; crate::consts::LOGICAL_BLOCK_SIZE as usize];
        let slot = disk.data_slot_to_physical(0);
        disk.write_slot(slot, Aspect::Cover, &data).unwrap();
        let back = disk.read_slot(slot, Aspect::Cover).unwrap();
        assert_eq!(back, data);

        let garbled = disk.read_slot(slot, Aspect::Hidden).unwrap();
        assert_ne!(garbled, data);
    }

    #[test]
    fn rejects_misaligned_file() {
        let tmp = NamedTempFile::new().unwrap();
        tmp.as_file().set_len(100).unwrap();
        let err = Disk::open(tmp.path(), &[0u8; KEY_SIZE], &[0u8; KEY_SIZE]).unwrap_err();
        assert!(matches!(err, Error::MisalignedFileSize { .. }));
    }

    #[test]
    fn rejects_bad_key_size() {
        let tmp = NamedTempFile::new().unwrap();
        std::fs::remove_file(tmp.path()).ok();
        Disk::create(tmp.path(), 4).unwrap();
        let err = Disk::open(tmp.path(), &[0u8; 4], &[0u8; KEY_SIZE]).unwrap_err();
        assert!(matches!(err, Error::BadKeySize { .. }));
    }
}

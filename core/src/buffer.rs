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

//! The block cache, allocator and deniability-preserving flush engine. Every other
//! component reaches the backing file only through here.
//!
//! `flush` is not atomic: it writes every dirty entry and both mapping tables as a
//! sequence of ordinary file writes with no journal or write-ahead log. A crash
//! between the last data write and the mapping-table rewrite leaves the tables
//! pointing at stale physical slots. This is an accepted limitation, not a bug to
//! fix here — recovering from it would mean adding a journal, which this design
//! doesn't have.

use std::cell::UnsafeCell;
use std::collections::{HashMap, HashSet, VecDeque};
use std::thread::ThreadId;
use std::time::Duration;

use lock_api::{RawMutex as _, RawMutexTimed as _};
use parking_lot::{Condvar, Mutex, RawMutex};
use rand::rngs::OsRng;
use rand::seq::SliceRandom;
use rand::RngCore;

use crate::aspect::{Aspect, BlockId, LogicalId};
use crate::consts::{CACHE_WAIT_TIMEOUT_SECS, LOGICAL_BLOCK_SIZE, NO_BLOCK_ASSIGNED, VIRTUAL};
use crate::disk::Disk;
use crate::error::{Error, Result};

fn read_mapping_table(disk: &Disk, aspect: Aspect) -> Result<Vec<u32>> {
    let per_block = crate::consts::MAPPING_ENTRIES_PER_BLOCK;
    let mut entries = Vec::with_capacity((disk.mapping_blocks() * per_block) as usize);
    for i in 0..disk.mapping_blocks() {
        let slot = disk.mapping_table_slot(aspect, i);
        let block = disk.read_slot(slot, aspect)?;
        for chunk in block.chunks_exact(4) {
            entries.push(u32::from_le_bytes(chunk.try_into().unwrap()));
        }
    }
    entries.truncate(disk.data_slots() as usize);
    Ok(entries)
}

fn write_mapping_table(disk: &Disk, aspect: Aspect, entries: &[u32]) -> Result<()> {
    let per_block = crate::consts::MAPPING_ENTRIES_PER_BLOCK as usize;
    for i in 0..disk.mapping_blocks() {
        let mut block = vec![0xFFu8; LOGICAL_BLOCK_SIZE as usize];
        let start = i as usize * per_block;
        for (j, &entry) in entries.iter().skip(start).take(per_block).enumerate() {
            block[j * 4..j * 4 + 4].copy_from_slice(&entry.to_le_bytes());
        }
        let slot = disk.mapping_table_slot(aspect, i);
        disk.write_slot(slot, aspect, &block)?;
    }
    Ok(())
}

#[derive(Default, Clone, Copy)]
struct BlockMappingInfo {
    physical_slot: Option<u32>,
    cache_index: Option<usize>,
}

struct CacheEntryData {
    logical: Option<LogicalId>,
    payload: Vec<u8>,
    dirty: bool,
}

/// One cache slot. The baton is locked by `get`/`allocate` before the accessor is
/// handed back, and unlocked only when the accessor drops; the payload is only ever
/// touched by whoever currently holds the baton, which is why `Sync` is safe here.
struct CacheEntry {
    baton: RawMutex,
    data: UnsafeCell<CacheEntryData>,
}

unsafe impl Sync for CacheEntry {}

impl CacheEntry {
    fn new() -> Self {
        Self {
            baton: RawMutex::INIT,
            data: UnsafeCell::new(CacheEntryData {
                logical: None,
                payload: vec![0u8; LOGICAL_BLOCK_SIZE as usize],
                dirty: false,
            }),
        }
    }
}

struct OpState {
    aspect: Aspect,
    max_blocks: usize,
    touched: HashSet<BlockId>,
}

struct BufferState {
    cover_map: HashMap<BlockId, BlockMappingInfo>,
    hidden_map: HashMap<BlockId, BlockMappingInfo>,
    next_cover_id: BlockId,
    next_hidden_id: BlockId,
    lru: VecDeque<usize>,
    virtual_list: Vec<u32>,
    unallocated_list: Vec<u32>,
    cover_activity: u32,
    hidden_activity: u32,
    pending_cover_frees: u32,
    pending_hidden_frees: u32,
    reserved_cache_space: usize,
    flush_pending: bool,
    live_operations: usize,
    operations: HashMap<ThreadId, OpState>,
}

impl BufferState {
    fn map(&self, aspect: Aspect) -> &HashMap<BlockId, BlockMappingInfo> {
        match aspect {
            Aspect::Cover => &self.cover_map,
            Aspect::Hidden => &self.hidden_map,
        }
    }

    fn map_mut(&mut self, aspect: Aspect) -> &mut HashMap<BlockId, BlockMappingInfo> {
        match aspect {
            Aspect::Cover => &mut self.cover_map,
            Aspect::Hidden => &mut self.hidden_map,
        }
    }
}

/// Snapshot of the five counted roles a data slot can play, for `statfs` and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotCounts {
    pub allocated_cover: u32,
    pub allocated_hidden: u32,
    pub virtual_slots: u32,
    pub unallocated: u32,
    pub mapping_blocks: u32,
}

pub struct Buffer {
    disk: Disk,
    cache: Vec<CacheEntry>,
    state: Mutex<BufferState>,
    flush_cv: Condvar,
    drain_cv: Condvar,
}

impl Buffer {
    /// Formats a brand-new backing file: random-filled slots, both mapping tables set
    /// to all-unassigned. Callers still need to allocate and initialize directory
    /// roots before the filesystem is usable; see `hidefs_core::format`.
    pub fn create(
        path: &std::path::Path,
        cover_key: &[u8],
        hidden_key: &[u8],
        total_slots: u32,
        cache_size: usize,
    ) -> Result<Self> {
        Disk::create(path, total_slots)?;
        let disk = Disk::open(path, cover_key, hidden_key)?;
        let blank = vec![NO_BLOCK_ASSIGNED; disk.data_slots() as usize];
        write_mapping_table(&disk, Aspect::Cover, &blank)?;
        write_mapping_table(&disk, Aspect::Hidden, &blank)?;
        Self::from_disk(disk, cache_size)
    }

    pub fn open(path: &std::path::Path, cover_key: &[u8], hidden_key: &[u8], cache_size: usize) -> Result<Self> {
        let disk = Disk::open(path, cover_key, hidden_key)?;
        Self::from_disk(disk, cache_size)
    }

    fn from_disk(disk: Disk, cache_size: usize) -> Result<Self> {
        let data_slots = disk.data_slots();
        let cover_table = read_mapping_table(&disk, Aspect::Cover)?;
        let hidden_table = read_mapping_table(&disk, Aspect::Hidden)?;

        let mut cover_map = HashMap::new();
        let mut hidden_map = HashMap::new();
        let mut virtual_list = Vec::new();
        let mut unallocated_list = Vec::new();
        let mut max_cover: Option<BlockId> = None;
        let mut max_hidden: Option<BlockId> = None;

        for slot in 0..data_slots {
            let c = cover_table[slot as usize];
            let h = hidden_table[slot as usize];
            if c == NO_BLOCK_ASSIGNED {
                unallocated_list.push(slot);
            } else if c == VIRTUAL {
                if h == NO_BLOCK_ASSIGNED {
                    virtual_list.push(slot);
                } else {
                    hidden_map.insert(h, BlockMappingInfo { physical_slot: Some(slot), cache_index: None });
                    max_hidden = Some(max_hidden.map_or(h, |m| m.max(h)));
                }
            } else {
                cover_map.insert(c, BlockMappingInfo { physical_slot: Some(slot), cache_index: None });
                max_cover = Some(max_cover.map_or(c, |m| m.max(c)));
            }
        }

        let cache = (0..cache_size).map(|_| CacheEntry::new()).collect();
        let lru = (0..cache_size).collect();

        Ok(Self {
            disk,
            cache,
            state: Mutex::new(BufferState {
                cover_map,
                hidden_map,
                next_cover_id: max_cover.map_or(0, |m| m + 1),
                next_hidden_id: max_hidden.map_or(0, |m| m + 1),
                lru,
                virtual_list,
                unallocated_list,
                cover_activity: 0,
                hidden_activity: 0,
                pending_cover_frees: 0,
                pending_hidden_frees: 0,
                reserved_cache_space: 0,
                flush_pending: false,
                live_operations: 0,
                operations: HashMap::new(),
            }),
            flush_cv: Condvar::new(),
            drain_cv: Condvar::new(),
        })
    }

    pub fn cache_size(&self) -> usize {
        self.cache.len()
    }

    fn check_operation(&self, state: &mut BufferState, aspect: Aspect, id: BlockId) {
        let tid = std::thread::current().id();
        let op = state
            .operations
            .get_mut(&tid)
            .expect("block access outside a declared operation");
        assert_eq!(op.aspect, aspect, "operation aspect mismatch");
        if !op.touched.contains(&id) {
            assert!(
                op.touched.len() < op.max_blocks,
                "operation exceeded its reserved block budget"
            );
            op.touched.insert(id);
        }
    }

    fn evict_for(&self, state: &mut BufferState, aspect: Aspect, id: BlockId) -> usize {
        let idx = state
            .lru
            .pop_front()
            .expect("cache exhausted without an active operation budget");
        let entry = &self.cache[idx];
        entry.baton.lock();
        let old_logical = unsafe { (*entry.data.get()).logical };
        if let Some((old_aspect, old_id)) = old_logical {
            if let Some(info) = state.map_mut(old_aspect).get_mut(&old_id) {
                info.cache_index = None;
            }
        }
        unsafe {
            (*entry.data.get()).logical = Some((aspect, id));
        }
        state.map_mut(aspect).get_mut(&id).unwrap().cache_index = Some(idx);
        idx
    }

    /// Returns a handle to an already-allocated logical block. Panics if the id is
    /// unmapped (a caller bug) or if the cache entry's baton can't be acquired within
    /// the wait budget (contention that never resolves).
    pub fn get(&self, aspect: Aspect, id: BlockId) -> BlockAccessor<'_> {
        let mut state = self.state.lock();
        self.check_operation(&mut state, aspect, id);
        let existing = state
            .map(aspect)
            .get(&id)
            .expect("get on unmapped logical id")
            .cache_index;

        if let Some(idx) = existing {
            drop(state);
            let entry = &self.cache[idx];
            if !entry
                .baton
                .try_lock_for(Duration::from_secs(CACHE_WAIT_TIMEOUT_SECS))
            {
                panic!("timed out waiting for a contended cache entry");
            }
            return BlockAccessor { buffer: self, index: idx, logical: (aspect, id) };
        }

        let physical_slot = state.map(aspect).get(&id).unwrap().physical_slot;
        let idx = self.evict_for(&mut state, aspect, id);
        drop(state);

        let payload = match physical_slot {
            Some(slot) => self
                .disk
                .read_slot(self.disk.data_slot_to_physical(slot), aspect)
                .expect("backing file read failed"),
            None => vec![0u8; LOGICAL_BLOCK_SIZE as usize],
        };
        let entry = &self.cache[idx];
        unsafe {
            let data = &mut *entry.data.get();
            data.payload = payload;
            data.dirty = false;
        }
        BlockAccessor { buffer: self, index: idx, logical: (aspect, id) }
    }

    /// Assigns a fresh logical id for `aspect` and returns a dirty, zero-filled
    /// accessor. Fails if granting it would push `allocated_hidden` past
    /// `allocated_cover`, or would commit more logical blocks than the backing file
    /// has data slots for.
    pub fn allocate(&self, aspect: Aspect) -> Result<BlockAccessor<'_>> {
        let mut state = self.state.lock();
        match aspect {
            Aspect::Cover => {
                if 2 * (state.cover_map.len() as u64 + 1) > self.disk.data_slots() as u64 {
                    return Err(Error::Full);
                }
            }
            Aspect::Hidden => {
                if state.hidden_map.len() + 1 > state.cover_map.len() {
                    return Err(Error::HiddenParityLimit);
                }
            }
        }
        let id = match aspect {
            Aspect::Cover => {
                let id = state.next_cover_id;
                state.next_cover_id += 1;
                id
            }
            Aspect::Hidden => {
                let id = state.next_hidden_id;
                state.next_hidden_id += 1;
                id
            }
        };
        state
            .map_mut(aspect)
            .insert(id, BlockMappingInfo { physical_slot: None, cache_index: None });
        self.check_operation(&mut state, aspect, id);
        let idx = self.evict_for(&mut state, aspect, id);
        match aspect {
            Aspect::Cover => state.cover_activity += 1,
            Aspect::Hidden => state.hidden_activity += 1,
        }
        drop(state);

        let entry = &self.cache[idx];
        unsafe {
            let data = &mut *entry.data.get();
            data.payload.iter_mut().for_each(|b| *b = 0);
            data.dirty = true;
        }
        log::debug!("allocate {aspect:?}:{id}");
        Ok(BlockAccessor { buffer: self, index: idx, logical: (aspect, id) })
    }

    /// Removes the mapping for `id` and frees its cache entry and physical slot (if
    /// any). A hidden slot demotes to virtual rather than being freed outright, which
    /// keeps `allocated_hidden + virtual == allocated_cover` true without waiting for
    /// the next flush to notice.
    pub fn deallocate(&self, aspect: Aspect, id: BlockId) {
        log::debug!("deallocate {aspect:?}:{id}");
        let mut state = self.state.lock();
        self.check_operation(&mut state, aspect, id);
        let info = state
            .map_mut(aspect)
            .remove(&id)
            .expect("deallocate on unmapped logical id");

        if let Some(cache_idx) = info.cache_index {
            let entry = &self.cache[cache_idx];
            unsafe {
                let data = &mut *entry.data.get();
                data.logical = None;
                data.dirty = false;
            }
            state.lru.push_back(cache_idx);
        }

        if let Some(slot) = info.physical_slot {
            match aspect {
                Aspect::Cover => {
                    state.unallocated_list.push(slot);
                    state.pending_cover_frees += 1;
                }
                Aspect::Hidden => {
                    state.virtual_list.push(slot);
                    state.pending_hidden_frees += 1;
                }
            }
        }
    }

    /// Begins a thread-scoped operation reserving up to `max_blocks` cache slots,
    /// pure to `aspect`. New operations park while a flush is pending; the reservation
    /// is released automatically when the returned handle drops.
    pub fn operation(&self, aspect: Aspect, max_blocks: usize) -> OperationHandle<'_> {
        let mut state = self.state.lock();
        loop {
            if !state.flush_pending && state.reserved_cache_space + max_blocks <= self.cache.len() {
                break;
            }
            self.flush_cv.wait(&mut state);
        }
        state.reserved_cache_space += max_blocks;
        state.live_operations += 1;
        let tid = std::thread::current().id();
        state.operations.insert(tid, OpState { aspect, max_blocks, touched: HashSet::new() });
        OperationHandle { buffer: self }
    }

    fn end_operation(&self) {
        let mut state = self.state.lock();
        let tid = std::thread::current().id();
        if let Some(op) = state.operations.remove(&tid) {
            state.reserved_cache_space -= op.max_blocks;
        }
        state.live_operations -= 1;
        if state.live_operations == 0 {
            self.drain_cv.notify_one();
        }
        self.flush_cv.notify_all();
    }

    /// Runs the deniability-preserving flush protocol: writes every dirty block to a
    /// fresh, uniformly random physical slot, injects balancing virtual or rehomed
    /// writes so the hidden aspect never trails the cover aspect's write count, and
    /// unconditionally rewrites both mapping tables. Waits for in-flight operations to
    /// drain first, and blocks new operations from starting until it's done.
    pub fn flush(&self) -> Result<()> {
        log::trace!("flush: waiting for live operations to drain");
        let mut state = self.state.lock();
        state.flush_pending = true;
        while state.live_operations > 0 {
            self.drain_cv.wait(&mut state);
        }

        enum Job {
            Entry { entry_idx: usize, aspect: Aspect, logical: BlockId, old_slot: Option<u32> },
            VirtualReuse { old_slot: u32 },
            VirtualFresh,
            Rehome { logical: BlockId, old_slot: u32, plaintext: Vec<u8> },
        }

        let mut jobs = Vec::new();
        let mut cover_dirty = 0u32;
        let mut hidden_dirty = 0u32;
        for (idx, entry) in self.cache.iter().enumerate() {
            let (logical, dirty) = unsafe {
                let data = &*entry.data.get();
                (data.logical, data.dirty)
            };
            if !dirty {
                continue;
            }
            let Some((aspect, id)) = logical else { continue };
            let old_slot = state.map(aspect).get(&id).and_then(|i| i.physical_slot);
            match aspect {
                Aspect::Cover => cover_dirty += 1,
                Aspect::Hidden => hidden_dirty += 1,
            }
            jobs.push(Job::Entry { entry_idx: idx, aspect, logical: id, old_slot });
        }

        let cover_activity = cover_dirty + state.pending_cover_frees;
        let hidden_activity = hidden_dirty + state.pending_hidden_frees;
        let delta = cover_activity as i64 - hidden_activity as i64;

        if delta > 0 {
            let mut need = delta as usize;
            while need > 0 {
                if let Some(slot) = state.virtual_list.pop() {
                    jobs.push(Job::VirtualReuse { old_slot: slot });
                    need -= 1;
                } else {
                    break;
                }
            }
            if need > 0 {
                let touched: HashSet<BlockId> = jobs
                    .iter()
                    .filter_map(|j| match j {
                        Job::Entry { aspect: Aspect::Hidden, logical, .. } => Some(*logical),
                        _ => None,
                    })
                    .collect();
                let candidates: Vec<(BlockId, u32)> = state
                    .hidden_map
                    .iter()
                    .filter_map(|(id, info)| {
                        info.physical_slot.filter(|_| !touched.contains(id)).map(|s| (*id, s))
                    })
                    .take(need)
                    .collect();
                for (logical, old_slot) in candidates {
                    let plaintext = self
                        .disk
                        .read_slot(self.disk.data_slot_to_physical(old_slot), Aspect::Hidden)
                        .expect("backing file read failed");
                    jobs.push(Job::Rehome { logical, old_slot, plaintext });
                    need -= 1;
                }
            }
            assert_eq!(need, 0, "not enough virtual or rehomable hidden slots to balance parity");
        } else if delta < 0 {
            for _ in 0..(-delta) {
                jobs.push(Job::VirtualFresh);
            }
        }

        for job in &jobs {
            let old_slot = match job {
                Job::Entry { old_slot, .. } => *old_slot,
                Job::VirtualReuse { old_slot } => Some(*old_slot),
                Job::Rehome { old_slot, .. } => Some(*old_slot),
                Job::VirtualFresh => None,
            };
            if let Some(slot) = old_slot {
                state.unallocated_list.push(slot);
            }
        }

        let mut rng = OsRng;
        state.unallocated_list.shuffle(&mut rng);
        assert!(
            jobs.len() <= state.unallocated_list.len(),
            "not enough free physical slots to place this flush's writes"
        );
        let free_slots: Vec<u32> = state.unallocated_list.split_off(state.unallocated_list.len() - jobs.len());
        let jobs_len = jobs.len();

        for (job, new_slot) in jobs.into_iter().zip(free_slots) {
            match job {
                Job::Entry { entry_idx, aspect, logical, .. } => {
                    let entry = &self.cache[entry_idx];
                    let payload = unsafe { (*entry.data.get()).payload.clone() };
                    self.disk
                        .write_slot(self.disk.data_slot_to_physical(new_slot), aspect, &payload)
                        .expect("backing file write failed");
                    unsafe {
                        (*entry.data.get()).dirty = false;
                    }
                    state.lru.push_back(entry_idx);
                    state.map_mut(aspect).get_mut(&logical).unwrap().physical_slot = Some(new_slot);
                }
                Job::VirtualReuse { .. } | Job::VirtualFresh => {
                    let mut payload = vec![0u8; LOGICAL_BLOCK_SIZE as usize];
                    rng.fill_bytes(&mut payload);
                    self.disk
                        .write_slot(self.disk.data_slot_to_physical(new_slot), Aspect::Hidden, &payload)
                        .expect("backing file write failed");
                    state.virtual_list.push(new_slot);
                }
                Job::Rehome { logical, plaintext, .. } => {
                    self.disk
                        .write_slot(self.disk.data_slot_to_physical(new_slot), Aspect::Hidden, &plaintext)
                        .expect("backing file write failed");
                    state.hidden_map.get_mut(&logical).unwrap().physical_slot = Some(new_slot);
                }
            }
        }

        let data_slots = self.disk.data_slots() as usize;
        let mut cover_table = vec![NO_BLOCK_ASSIGNED; data_slots];
        let mut hidden_table = vec![NO_BLOCK_ASSIGNED; data_slots];
        for (&id, info) in &state.cover_map {
            if let Some(slot) = info.physical_slot {
                cover_table[slot as usize] = id;
            }
        }
        for (&id, info) in &state.hidden_map {
            if let Some(slot) = info.physical_slot {
                cover_table[slot as usize] = VIRTUAL;
                hidden_table[slot as usize] = id;
            }
        }
        for &slot in &state.virtual_list {
            cover_table[slot as usize] = VIRTUAL;
        }
        write_mapping_table(&self.disk, Aspect::Cover, &cover_table)?;
        write_mapping_table(&self.disk, Aspect::Hidden, &hidden_table)?;

        state.cover_activity = 0;
        state.hidden_activity = 0;
        state.pending_cover_frees = 0;
        state.pending_hidden_frees = 0;
        state.flush_pending = false;
        self.flush_cv.notify_all();
        log::debug!(
            "flush complete: {} entry writes, {} balancing jobs",
            cover_dirty + hidden_dirty,
            jobs_len,
        );
        Ok(())
    }

    /// Role counts across every data slot, for `statfs` and invariant checks. Never
    /// called from inside a flush (it only reads settled, not in-flight, state).
    pub fn slot_counts(&self) -> SlotCounts {
        let state = self.state.lock();
        SlotCounts {
            allocated_cover: state.cover_map.len() as u32,
            allocated_hidden: state.hidden_map.len() as u32,
            virtual_slots: state.virtual_list.len() as u32,
            unallocated: state.unallocated_list.len() as u32,
            mapping_blocks: self.disk.mapping_blocks(),
        }
    }

    /// Checks the deniability parity invariants. Intended for tests and optional
    /// debug-mode assertions after mutating operations.
    pub fn check_invariants(&self) {
        let state = self.state.lock();
        let cover = state.cover_map.len() as u32;
        let hidden = state.hidden_map.len() as u32;
        let virt = state.virtual_list.len() as u32;
        assert!(hidden <= cover, "allocated_hidden ({hidden}) exceeds allocated_cover ({cover})");
        assert_eq!(hidden + virt, cover, "hidden + virtual != cover");
        let total = cover as u64 + hidden as u64 + virt as u64 + state.unallocated_list.len() as u64;
        assert_eq!(total, self.disk.data_slots() as u64, "slot accounting doesn't cover all data slots");
    }
}

/// A move-only, scope-released handle to one exclusively-owned cache entry.
pub struct BlockAccessor<'a> {
    buffer: &'a Buffer,
    index: usize,
    logical: LogicalId,
}

impl<'a> BlockAccessor<'a> {
    pub fn logical_id(&self) -> LogicalId {
        self.logical
    }

    pub fn read(&self) -> &[u8] {
        let entry = &self.buffer.cache[self.index];
        unsafe { &(*entry.data.get()).payload }
    }

    /// Marks the block dirty and returns a mutable view of its payload.
    pub fn write(&mut self) -> &mut [u8] {
        let entry = &self.buffer.cache[self.index];
        let first_write = unsafe {
            let data = &mut *entry.data.get();
            let was_dirty = data.dirty;
            data.dirty = true;
            !was_dirty
        };
        if first_write {
            let mut state = self.buffer.state.lock();
            match self.logical.0 {
                Aspect::Cover => state.cover_activity += 1,
                Aspect::Hidden => state.hidden_activity += 1,
            }
        }
        let entry = &self.buffer.cache[self.index];
        unsafe { &mut (*entry.data.get()).payload }
    }
}

impl Drop for BlockAccessor<'_> {
    fn drop(&mut self) {
        let entry = &self.buffer.cache[self.index];
        let dirty = unsafe { (*entry.data.get()).dirty };
        unsafe {
            entry.baton.unlock();
        }
        if !dirty {
            let mut state = self.buffer.state.lock();
            state.lru.push_back(self.index);
        }
    }
}

/// RAII guard for a reserved operation slot. Releasing it (by drop) allows a pending
/// flush to proceed once every live operation has done the same.
pub struct OperationHandle<'a> {
    buffer: &'a Buffer,
}

impl Drop for OperationHandle<'_> {
    fn drop(&mut self) {
        self.buffer.end_operation();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::KEY_SIZE;
    use tempfile::NamedTempFile;

    fn fresh_buffer(slots: u32, cache_size: usize) -> Buffer {
        let tmp = NamedTempFile::new().unwrap();
        std::fs::remove_file(tmp.path()).ok();
        Buffer::create(tmp.path(), &[1u8; KEY_SIZE], &[2u8; KEY_SIZE], slots, cache_size).unwrap()
    }

    #[test]
    fn allocate_write_read_roundtrip() {
        let buf = fresh_buffer(64, 8);
        let id = {
            let op = buf.operation(Aspect::Cover, 4);
            let mut acc = buf.allocate(Aspect::Cover).unwrap();
            acc.write().copy_from_slice(&vec![0x7Au8; LOGICAL_BLOCK_SIZE as usize]);
            let id = acc.logical_id().1;
            drop(acc);
            drop(op);
            id
        };
        buf.flush().unwrap();

        let op = buf.operation(Aspect::Cover, 1);
        let acc = buf.get(Aspect::Cover, id);
        assert_eq!(acc.read(), &vec![0x7Au8; LOGICAL_BLOCK_SIZE as usize][..]);
        drop(acc);
        drop(op);
    }

    #[test]
    fn hidden_allocation_capped_by_cover_count() {
        let buf = fresh_buffer(64, 8);
        let op = buf.operation(Aspect::Hidden, 1);
        let err = buf.allocate(Aspect::Hidden).unwrap_err();
        assert!(matches!(err, Error::HiddenParityLimit));
        drop(op);
    }

    #[test]
    fn invariants_hold_after_flush_cycles() {
        let buf = fresh_buffer(128, 8);
        for _ in 0..3 {
            let op = buf.operation(Aspect::Cover, 4);
            let mut acc = buf.allocate(Aspect::Cover).unwrap();
            acc.write()[0] = 1;
            drop(acc);
            drop(op);
            buf.flush().unwrap();
            buf.check_invariants();
        }

        let op = buf.operation(Aspect::Hidden, 2);
        let mut acc = buf.allocate(Aspect::Hidden).unwrap();
        acc.write()[0] = 2;
        drop(acc);
        drop(op);
        buf.flush().unwrap();
        buf.check_invariants();
    }

    #[test]
    fn reopen_after_flush_preserves_contents() {
        let tmp = NamedTempFile::new().unwrap();
        std::fs::remove_file(tmp.path()).ok();
        let cover_key = [9u8; KEY_SIZE];
        let hidden_key = [8u8; KEY_SIZE];
        let id;
        {
            let buf = Buffer::create(tmp.path(), &cover_key, &hidden_key, 64, 8).unwrap();
            let op = buf.operation(Aspect::Cover, 2);
            let mut acc = buf.allocate(Aspect::Cover).unwrap();
            acc.write().copy_from_slice(&vec![0x11u8; LOGICAL_BLOCK_SIZE as usize]);
            id = acc.logical_id().1;
            drop(acc);
            drop(op);
            buf.flush().unwrap();
        }

        let buf = Buffer::open(tmp.path(), &cover_key, &hidden_key, 8).unwrap();
        let op = buf.operation(Aspect::Cover, 1);
        let acc = buf.get(Aspect::Cover, id);
        assert_eq!(acc.read(), &vec![0x11u8; LOGICAL_BLOCK_SIZE as usize][..]);
        drop(acc);
        drop(op);
    }
}

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

//! An append-only stack of 32-bit child-block ids, addressed in mixed radix (K, B, B,
//! …). `K` values live inline in the owning header block; beyond that, a chain of
//! all-pointer blocks with branching factor `B` takes over, growing or shrinking a
//! level whenever the count crosses `K·B^L`.

use crate::aspect::{Aspect, BlockId};
use crate::buffer::Buffer;
use crate::consts::{NO_BLOCK, NUM_HEADER_BLOCK_TREE_ENTRIES, NUM_TREE_BLOCK_TREE_ENTRIES};

use crate::buffer::BlockAccessor;

/// Digits of `n` in mixed radix (B, B, …, K), least-significant first. `res.last()`
/// indexes the header's K inline slots; everything before it indexes a chain of
/// B-ary interior or leaf nodes.
fn levels(mut n: u32) -> Vec<u32> {
    let mut res = Vec::new();
    while n >= NUM_HEADER_BLOCK_TREE_ENTRIES {
        res.push(n % NUM_TREE_BLOCK_TREE_ENTRIES);
        n /= NUM_TREE_BLOCK_TREE_ENTRIES;
    }
    res.push(n);
    res
}

/// View over a block tree rooted at byte `offset` of an already-held header accessor.
/// Borrowing the header mutably means a `BlockTree` can't outlive the operation that
/// produced its header handle, matching the tree's actual lifetime as part of a
/// BlockFile or Directory header.
pub struct BlockTree<'h, 'b> {
    buffer: &'b Buffer,
    aspect: Aspect,
    header: &'h mut BlockAccessor<'b>,
    offset: u32,
}

impl<'h, 'b> BlockTree<'h, 'b> {
    pub fn new(buffer: &'b Buffer, aspect: Aspect, header: &'h mut BlockAccessor<'b>, offset: u32) -> Self {
        Self { buffer, aspect, header, offset }
    }

    pub fn number_of_blocks(&self) -> u32 {
        let idx = self.offset as usize;
        u32::from_le_bytes(self.header.read()[idx..idx + 4].try_into().unwrap())
    }

    fn set_number_of_blocks(&mut self, n: u32) {
        let idx = self.offset as usize;
        self.header.write()[idx..idx + 4].copy_from_slice(&n.to_le_bytes());
    }

    fn read_header_slot(&self, i: u32) -> u32 {
        let idx = (self.offset + 4 + 4 * i) as usize;
        u32::from_le_bytes(self.header.read()[idx..idx + 4].try_into().unwrap())
    }

    fn write_header_slot(&mut self, i: u32, v: u32) {
        let idx = (self.offset + 4 + 4 * i) as usize;
        self.header.write()[idx..idx + 4].copy_from_slice(&v.to_le_bytes());
    }

    fn clear_header_slots(&mut self) {
        for i in 0..NUM_HEADER_BLOCK_TREE_ENTRIES {
            self.write_header_slot(i, NO_BLOCK);
        }
    }

    /// Appends `value`, growing the tree a level if `numberOfBlocks` is about to cross
    /// `K·B^L`.
    pub fn add(&mut self, value: u32) {
        let n = self.number_of_blocks();
        let path = levels(n);
        let mut before_path = if n == 0 { Vec::new() } else { levels(n - 1) };
        self.set_number_of_blocks(n + 1);

        if path.len() == 1 {
            self.write_header_slot(path[0], value);
            return;
        }

        if path.len() != before_path.len() {
            let existing: Vec<u32> = (0..NUM_HEADER_BLOCK_TREE_ENTRIES).map(|i| self.read_header_slot(i)).collect();
            let new_id = {
                let mut node = self.buffer.allocate(self.aspect).expect("block tree node allocation failed");
                let payload = node.write();
                for (i, &v) in existing.iter().enumerate() {
                    payload[i * 4..i * 4 + 4].copy_from_slice(&v.to_le_bytes());
                }
                for i in NUM_HEADER_BLOCK_TREE_ENTRIES as usize..NUM_TREE_BLOCK_TREE_ENTRIES as usize {
                    payload[i * 4..i * 4 + 4].copy_from_slice(&NO_BLOCK.to_le_bytes());
                }
                node.logical_id().1
            };
            self.clear_header_slots();
            self.write_header_slot(0, new_id);
            before_path.push(0);
        }

        let mut need_to_allocate = false;
        let header_pos = *path.last().unwrap();
        let mut block_id = if header_pos != *before_path.last().unwrap() {
            need_to_allocate = true;
            let new_id = self.buffer.allocate(self.aspect).expect("block tree node allocation failed").logical_id().1;
            self.write_header_slot(header_pos, new_id);
            new_id
        } else {
            self.read_header_slot(header_pos)
        };

        for level in 1..path.len() - 1 {
            let pos = path.len() - level - 1;
            let mut acc = self.buffer.get(self.aspect, block_id);
            let idx = path[pos] as usize * 4;
            block_id = if need_to_allocate || path[pos] != before_path[pos] {
                need_to_allocate = true;
                let new_id = self.buffer.allocate(self.aspect).expect("block tree node allocation failed").logical_id().1;
                acc.write()[idx..idx + 4].copy_from_slice(&new_id.to_le_bytes());
                new_id
            } else {
                u32::from_le_bytes(acc.read()[idx..idx + 4].try_into().unwrap())
            };
        }

        let mut leaf = self.buffer.get(self.aspect, block_id);
        let idx = path[0] as usize * 4;
        leaf.write()[idx..idx + 4].copy_from_slice(&value.to_le_bytes());
    }

    /// Removes and returns the last value, shrinking the tree a level if it just fell
    /// back under `K·B^L`.
    pub fn remove(&mut self) -> u32 {
        let n = self.number_of_blocks();
        assert!(n > 0, "remove from an empty block tree");
        let path = levels(n - 1);
        let after_path = levels(n.saturating_sub(2));
        self.set_number_of_blocks(n - 1);

        if path.len() == 1 {
            let value = self.read_header_slot(path[0]);
            self.write_header_slot(path[0], NO_BLOCK);
            return value;
        }

        let header_pos = *path.last().unwrap();
        let mut block_id = self.read_header_slot(header_pos);
        let mut deallocate: Vec<BlockId> = Vec::new();

        for level in 1..path.len() - 1 {
            let pos = path.len() - level - 1;
            if path[pos] == 0 {
                deallocate.push(block_id);
            } else {
                deallocate.clear();
            }
            let acc = self.buffer.get(self.aspect, block_id);
            let idx = path[pos] as usize * 4;
            block_id = u32::from_le_bytes(acc.read()[idx..idx + 4].try_into().unwrap());
        }

        let value = {
            let acc = self.buffer.get(self.aspect, block_id);
            let idx = path[0] as usize * 4;
            u32::from_le_bytes(acc.read()[idx..idx + 4].try_into().unwrap())
        };
        if path[0] == 0 {
            deallocate.push(block_id);
        } else {
            deallocate.clear();
        }

        for id in deallocate {
            self.buffer.deallocate(self.aspect, id);
        }

        if path.len() != after_path.len() {
            let demote_id = self.read_header_slot(0);
            let restored: Vec<u32> = {
                let acc = self.buffer.get(self.aspect, demote_id);
                (0..NUM_HEADER_BLOCK_TREE_ENTRIES)
                    .map(|i| {
                        let idx = i as usize * 4;
                        u32::from_le_bytes(acc.read()[idx..idx + 4].try_into().unwrap())
                    })
                    .collect()
            };
            for (i, v) in restored.into_iter().enumerate() {
                self.write_header_slot(i as u32, v);
            }
            self.buffer.deallocate(self.aspect, demote_id);
        }

        value
    }

    /// Reads the value at logical position `position` without disturbing the tree.
    /// Implemented by closing and reopening accessors level by level rather than
    /// caching them across calls, which keeps an otherwise stateful iterator simple.
    pub fn get_at(&self, position: u32) -> u32 {
        value_at(self.buffer, self.aspect, self.header, self.offset, position)
    }

    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        (0..self.number_of_blocks()).map(move |i| self.get_at(i))
    }

    /// Dumps every stored value with its mixed-radix path, for diagnostics only.
    pub fn debug_tree(&self) -> String {
        let mut out = String::new();
        for i in 0..self.number_of_blocks() {
            out.push_str(&format!("{:?} -> {}\n", levels(i), self.get_at(i)));
        }
        out
    }
}

/// Reads the value at `position` given just an (immutably borrowed) header, without
/// needing to construct a `BlockTree`. Lets callers that only read — `BlockFile`
/// resolving a page to a block id — avoid taking the header mutably.
pub fn value_at(buffer: &Buffer, aspect: Aspect, header: &BlockAccessor, offset: u32, position: u32) -> u32 {
    let read_header_slot = |i: u32| -> u32 {
        let idx = (offset + 4 + 4 * i) as usize;
        u32::from_le_bytes(header.read()[idx..idx + 4].try_into().unwrap())
    };
    let path = levels(position);
    if path.len() == 1 {
        return read_header_slot(path[0]);
    }
    let mut block_id = read_header_slot(*path.last().unwrap());
    for level in 1..path.len() - 1 {
        let pos = path.len() - level - 1;
        let acc = buffer.get(aspect, block_id);
        let idx = path[pos] as usize * 4;
        block_id = u32::from_le_bytes(acc.read()[idx..idx + 4].try_into().unwrap());
    }
    let acc = buffer.get(aspect, block_id);
    let idx = path[0] as usize * 4;
    u32::from_le_bytes(acc.read()[idx..idx + 4].try_into().unwrap())
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

    fn with_header<R>(buf: &Buffer, f: impl FnOnce(&mut BlockTree) -> R) -> R {
        let mut header = buf.allocate(Aspect::Cover).unwrap();
        header.write()[0..5].fill(0);
        let mut tree = BlockTree::new(buf, Aspect::Cover, &mut header, 1);
        f(&mut tree)
    }

    #[test]
    fn append_and_read_within_header() {
        let buf = fresh_buffer(4096, 64);
        let _op = buf.operation(Aspect::Cover, 64);
        with_header(&buf, |tree| {
            for v in 0..8 {
                tree.add(v * 11);
            }
            assert_eq!(tree.number_of_blocks(), 8);
            for v in 0..8 {
                assert_eq!(tree.get_at(v), v * 11);
            }
        });
    }

    #[test]
    fn grows_past_header_capacity() {
        let buf = fresh_buffer(4096, 64);
        let _op = buf.operation(Aspect::Cover, 64);
        with_header(&buf, |tree| {
            for v in 0..50u32 {
                tree.add(v * 3);
            }
            assert_eq!(tree.number_of_blocks(), 50);
            for v in 0..50u32 {
                assert_eq!(tree.get_at(v), v * 3);
            }
        });
    }

    #[test]
    fn append_then_remove_is_lifo() {
        let buf = fresh_buffer(4096, 64);
        let _op = buf.operation(Aspect::Cover, 64);
        with_header(&buf, |tree| {
            for v in 0..20u32 {
                tree.add(v);
            }
            for v in (0..20u32).rev() {
                assert_eq!(tree.remove(), v);
            }
            assert_eq!(tree.number_of_blocks(), 0);
        });
    }

    #[test]
    fn level_boundary_at_k_times_b() {
        let buf = fresh_buffer(20_000, 64);
        let _op = buf.operation(Aspect::Cover, 64);
        with_header(&buf, |tree| {
            let boundary = NUM_HEADER_BLOCK_TREE_ENTRIES * NUM_TREE_BLOCK_TREE_ENTRIES;
            for v in 0..boundary + 2 {
                tree.add(v);
            }
            for v in 0..boundary + 2 {
                assert_eq!(tree.get_at(v), v);
            }
        });
    }
}

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

//! On-disk layout constants shared by every layer of the core.

/// Size in bytes of one physical slot: a 16-byte IV followed by 4080 bytes of ciphertext.
pub const PHYSICAL_BLOCK_SIZE: u32 = 4096;
/// AES block size, and therefore the IV size (CBC mode).
pub const CIPHER_BLOCK_SIZE: u32 = 16;
pub const IV_SIZE: u32 = CIPHER_BLOCK_SIZE;
pub const KEY_SIZE: usize = 16;
/// Size of the plaintext carried by one physical slot.
pub const LOGICAL_BLOCK_SIZE: u32 = PHYSICAL_BLOCK_SIZE - IV_SIZE;
/// Width of one mapping-table entry: a little-endian u32 logical block id or sentinel.
pub const MAPPING_ENTRY_SIZE: u32 = 4;
/// Mapping-table entries packed into one logical block.
pub const MAPPING_ENTRIES_PER_BLOCK: u32 = LOGICAL_BLOCK_SIZE / MAPPING_ENTRY_SIZE;

pub const NO_BLOCK_ASSIGNED: u32 = 0xFFFF_FFFF;
pub const VIRTUAL: u32 = 0xFFFF_FFFE;

pub const FILE_TYPE: u8 = b'F';
pub const DIR_TYPE: u8 = b'D';

/// K: number of block-tree pointers held inline in a BlockFile header.
pub const NUM_HEADER_BLOCK_TREE_ENTRIES: u32 = 8;
/// B: branching factor of an interior block-tree node.
pub const NUM_TREE_BLOCK_TREE_ENTRIES: u32 = LOGICAL_BLOCK_SIZE / 4;
/// Byte offset of the block-tree's `numberOfBlocks` counter within a file header.
pub const BLOCK_TREE_OFFSET: u32 = 1;

/// Byte offset of the first data byte in a file's header block (page 0).
pub const DATA_OFFSET: u32 =
    BLOCK_TREE_OFFSET + 4 + 4 * NUM_HEADER_BLOCK_TREE_ENTRIES;
pub const DATA_SIZE: u32 = LOGICAL_BLOCK_SIZE - DATA_OFFSET;
/// Width of the length prefix `File` stores at the start of page 0.
pub const FILE_HEADER_SIZE: u32 = 4;

pub const FILE_NAME_SIZE: u32 = 255;
pub const FILE_PTR_SIZE: u32 = 4;
pub const BTREE_RECORD_SIZE: u32 = FILE_NAME_SIZE + FILE_PTR_SIZE;

/// Byte offset of the directory header's inline B-tree root node.
pub const DIR_BTREE_HEADER_OFFSET: u32 = 9;
pub const DIR_BTREE_HEADER_SIZE: u32 = LOGICAL_BLOCK_SIZE - DIR_BTREE_HEADER_OFFSET;
/// Interior/leaf nodes allocated as their own block start their records at offset 0.
pub const DIR_BTREE_NODE_OFFSET: u32 = 0;
pub const DIR_BTREE_NODE_SIZE: u32 = LOGICAL_BLOCK_SIZE;

/// An empty directory-record slot is marked by this value in its value field.
pub const NO_BLOCK: u32 = 0xFFFF_FFFF;

/// How long `Buffer::get` will wait for a contended cache entry before it is fatal.
pub const CACHE_WAIT_TIMEOUT_SECS: u64 = 10;

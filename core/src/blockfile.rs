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

//! A byte-addressable stream of blocks: page 0 is the header (carrying `DATA_SIZE`
//! bytes of payload after the block-tree's inline slots), pages 1.. are plain data
//! blocks addressed through a `BlockTree`.

use crate::aspect::{Aspect, BlockId, LogicalId};
use crate::blocktree::{value_at, BlockTree};
use crate::buffer::{Buffer, BlockAccessor};
use crate::consts::{BLOCK_TREE_OFFSET, DATA_OFFSET, DATA_SIZE, FILE_TYPE, LOGICAL_BLOCK_SIZE};
use crate::error::Result;

pub struct BlockFile<'b> {
    buffer: &'b Buffer,
    header: BlockAccessor<'b>,
}

impl<'b> BlockFile<'b> {
    pub fn create(buffer: &'b Buffer, aspect: Aspect) -> Result<Self> {
        let mut header = buffer.allocate(aspect)?;
        {
            let payload = header.write();
            payload[0] = FILE_TYPE;
            let idx = BLOCK_TREE_OFFSET as usize;
            payload[idx..idx + 4].copy_from_slice(&0u32.to_le_bytes());
        }
        Ok(Self { buffer, header })
    }

    pub fn open(buffer: &'b Buffer, aspect: Aspect, id: BlockId) -> Self {
        let header = buffer.get(aspect, id);
        assert_eq!(header.read()[0], FILE_TYPE, "block is not a file header");
        Self { buffer, header }
    }

    pub fn id(&self) -> LogicalId {
        self.header.logical_id()
    }

    pub fn header(&self) -> &BlockAccessor<'b> {
        &self.header
    }

    pub fn header_mut(&mut self) -> &mut BlockAccessor<'b> {
        &mut self.header
    }

    fn tree(&mut self) -> BlockTree<'_, 'b> {
        let aspect = self.header.logical_id().0;
        BlockTree::new(self.buffer, aspect, &mut self.header, BLOCK_TREE_OFFSET)
    }

    /// Number of pages, including the header page.
    pub fn number_of_blocks(&self) -> u32 {
        let idx = BLOCK_TREE_OFFSET as usize;
        u32::from_le_bytes(self.header.read()[idx..idx + 4].try_into().unwrap()) + 1
    }

    pub fn number_of_bytes(&self) -> u32 {
        let tree_blocks = self.number_of_blocks() - 1;
        tree_blocks * LOGICAL_BLOCK_SIZE + DATA_SIZE
    }

    /// Maps a byte offset to `(page, offset_within_page)`.
    pub fn position_for_byte(pos: u32) -> (u32, u32) {
        if pos < DATA_SIZE {
            return (0, pos);
        }
        let pos = pos - DATA_SIZE;
        (pos / LOGICAL_BLOCK_SIZE + 1, pos % LOGICAL_BLOCK_SIZE)
    }

    /// Appends one fresh, zero-filled data page.
    pub fn add_block(&mut self) -> Result<()> {
        let aspect = self.header.logical_id().0;
        let new_id = self.buffer.allocate(aspect)?.logical_id().1;
        self.tree().add(new_id);
        Ok(())
    }

    /// Removes the last data page.
    pub fn remove_block(&mut self) {
        let aspect = self.header.logical_id().0;
        let id = self.tree().remove();
        self.buffer.deallocate(aspect, id);
    }

    pub fn truncate(&mut self) {
        for _ in 0..self.number_of_blocks() - 1 {
            self.remove_block();
        }
    }

    /// Opens page `page` (1-based; page 0 is the header, use `header()`/`header_mut()`
    /// for that). The accessor must be dropped before another page is requested for
    /// the same operation, matching every other block access in the core.
    pub fn data_block(&self, page: u32) -> BlockAccessor<'b> {
        assert!(page >= 1, "page 0 is the header, not a tree-addressed data block");
        let aspect = self.header.logical_id().0;
        let id = value_at(self.buffer, aspect, &self.header, BLOCK_TREE_OFFSET, page - 1);
        self.buffer.get(aspect, id)
    }

    /// Data bytes available in the header page, starting at `DATA_OFFSET`.
    pub fn header_data_range() -> (u32, u32) {
        (DATA_OFFSET, DATA_SIZE)
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
    fn grows_and_reports_size() {
        let buf = fresh_buffer(4096, 32);
        let _op = buf.operation(Aspect::Cover, 32);
        let mut file = BlockFile::create(&buf, Aspect::Cover).unwrap();
        assert_eq!(file.number_of_blocks(), 1);
        assert_eq!(file.number_of_bytes(), DATA_SIZE);

        for _ in 0..5 {
            file.add_block().unwrap();
        }
        assert_eq!(file.number_of_blocks(), 6);
        assert_eq!(file.number_of_bytes(), DATA_SIZE + 5 * LOGICAL_BLOCK_SIZE);
    }

    #[test]
    fn writes_and_reads_a_data_page() {
        let buf = fresh_buffer(4096, 32);
        let _op = buf.operation(Aspect::Cover, 32);
        let mut file = BlockFile::create(&buf, Aspect::Cover).unwrap();
        file.add_block().unwrap();
        {
            let mut acc = file.data_block(1);
            acc.write()[..4].copy_from_slice(&[1, 2, 3, 4]);
        }
        let acc = file.data_block(1);
        assert_eq!(&acc.read()[..4], &[1, 2, 3, 4]);
    }

    #[test]
    fn truncate_releases_every_page() {
        let buf = fresh_buffer(4096, 32);
        let _op = buf.operation(Aspect::Cover, 32);
        let mut file = BlockFile::create(&buf, Aspect::Cover).unwrap();
        for _ in 0..10 {
            file.add_block().unwrap();
        }
        file.truncate();
        assert_eq!(file.number_of_blocks(), 1);
    }

    #[test]
    fn position_for_byte_boundaries() {
        assert_eq!(BlockFile::position_for_byte(0), (0, 0));
        assert_eq!(BlockFile::position_for_byte(DATA_SIZE - 1), (0, DATA_SIZE - 1));
        assert_eq!(BlockFile::position_for_byte(DATA_SIZE), (1, 0));
        assert_eq!(BlockFile::position_for_byte(DATA_SIZE + LOGICAL_BLOCK_SIZE), (2, 0));
    }
}

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

//! A byte stream over a `BlockFile`: the first four bytes of its data region hold the
//! logical file length, everything after is content.

use crate::aspect::{Aspect, BlockId, LogicalId};
use crate::blockfile::BlockFile;
use crate::buffer::Buffer;
use crate::consts::{DATA_SIZE, FILE_HEADER_SIZE, LOGICAL_BLOCK_SIZE};
use crate::error::Result;

pub struct File<'b> {
    bf: BlockFile<'b>,
}

impl<'b> File<'b> {
    pub fn create(buffer: &'b Buffer, aspect: Aspect) -> Result<Self> {
        let bf = BlockFile::create(buffer, aspect)?;
        let mut file = Self { bf };
        file.set_size(0);
        Ok(file)
    }

    pub fn open(buffer: &'b Buffer, aspect: Aspect, id: BlockId) -> Self {
        Self { bf: BlockFile::open(buffer, aspect, id) }
    }

    pub fn id(&self) -> LogicalId {
        self.bf.id()
    }

    pub fn size(&self) -> u32 {
        let (off, _) = BlockFile::header_data_range();
        let idx = off as usize;
        u32::from_le_bytes(self.bf.header().read()[idx..idx + 4].try_into().unwrap())
    }

    fn set_size(&mut self, size: u32) {
        let (off, _) = BlockFile::header_data_range();
        let idx = off as usize;
        self.bf.header_mut().write()[idx..idx + 4].copy_from_slice(&size.to_le_bytes());
    }

    fn blocks_for_size(size: u32) -> u32 {
        let stop_bytes = size + FILE_HEADER_SIZE;
        let (page, rem) = BlockFile::position_for_byte(stop_bytes);
        let stop_block = if rem != 0 { page + 1 } else { page };
        stop_block.max(1)
    }

    /// Copies up to `buf.len()` bytes starting at file offset `pos` into `buf`,
    /// clamped to the file's current size, and returns the number copied.
    pub fn read(&self, pos: u32, buf: &mut [u8]) -> u32 {
        let size = self.size();
        let start_byte = pos.min(size) + FILE_HEADER_SIZE;
        let stop_byte = pos.saturating_add(buf.len() as u32).min(size) + FILE_HEADER_SIZE;
        if stop_byte <= start_byte {
            return 0;
        }
        let (start_page, start_off) = BlockFile::position_for_byte(start_byte);
        let (stop_page, stop_off) = BlockFile::position_for_byte(stop_byte);

        let mut copied = 0usize;
        let mut page = start_page;
        loop {
            let read_start = if page == start_page { start_off } else { 0 };
            let page_size = if page == 0 { DATA_SIZE } else { LOGICAL_BLOCK_SIZE };
            let read_len = if page == stop_page {
                if start_page == stop_page { stop_off - read_start } else { stop_off }
            } else {
                page_size - read_start
            };

            if page == 0 {
                let (off, _) = BlockFile::header_data_range();
                let src = self.bf.header().read();
                let src_start = (off + read_start) as usize;
                buf[copied..copied + read_len as usize].copy_from_slice(&src[src_start..src_start + read_len as usize]);
            } else {
                let acc = self.bf.data_block(page);
                let src = acc.read();
                let src_start = read_start as usize;
                buf[copied..copied + read_len as usize].copy_from_slice(&src[src_start..src_start + read_len as usize]);
            }

            copied += read_len as usize;
            if page == stop_page {
                break;
            }
            page += 1;
        }
        copied as u32
    }

    /// Writes `data` at file offset `pos`, growing the file (and allocating new
    /// pages) if necessary, and returns the number of bytes written.
    pub fn write(&mut self, pos: u32, data: &[u8]) -> Result<u32> {
        let (start_page, start_off) = BlockFile::position_for_byte(pos + FILE_HEADER_SIZE);
        let bytes_stop = pos + data.len() as u32 + FILE_HEADER_SIZE;
        while self.bf.number_of_bytes() < bytes_stop {
            self.bf.add_block()?;
        }
        let (stop_page, stop_off) = BlockFile::position_for_byte(bytes_stop);

        let mut copied = 0usize;
        let mut page = start_page;
        loop {
            let write_start = if page == start_page { start_off } else { 0 };
            let page_size = if page == 0 { DATA_SIZE } else { LOGICAL_BLOCK_SIZE };
            let write_len = if page == stop_page {
                if start_page == stop_page { stop_off - write_start } else { stop_off }
            } else {
                page_size - write_start
            };

            if page == 0 {
                let (off, _) = BlockFile::header_data_range();
                let dst = self.bf.header_mut().write();
                let dst_start = (off + write_start) as usize;
                dst[dst_start..dst_start + write_len as usize]
                    .copy_from_slice(&data[copied..copied + write_len as usize]);
            } else {
                let mut acc = self.bf.data_block(page);
                let dst = acc.write();
                let dst_start = write_start as usize;
                dst[dst_start..dst_start + write_len as usize]
                    .copy_from_slice(&data[copied..copied + write_len as usize]);
            }

            copied += write_len as usize;
            if page == stop_page {
                break;
            }
            page += 1;
        }

        let new_size = self.size().max(bytes_stop - FILE_HEADER_SIZE);
        self.set_size(new_size);
        Ok(copied as u32)
    }

    pub fn truncate(&mut self, pos: u32) {
        let num_blocks = Self::blocks_for_size(pos);
        let stop_bytes = pos.min(self.size()) + FILE_HEADER_SIZE;
        while self.bf.number_of_blocks() > num_blocks {
            self.bf.remove_block();
        }
        self.set_size(stop_bytes - FILE_HEADER_SIZE);
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
    fn write_read_within_header_page() {
        let buf = fresh_buffer(4096, 32);
        let _op = buf.operation(Aspect::Cover, 32);
        let mut file = File::create(&buf, Aspect::Cover).unwrap();
        file.write(0, b"hello").unwrap();
        assert_eq!(file.size(), 5);
        let mut out = [0u8; 5];
        assert_eq!(file.read(0, &mut out), 5);
        assert_eq!(&out, b"hello");
    }

    #[test]
    fn write_spanning_many_pages() {
        let buf = fresh_buffer(8192, 32);
        let _op = buf.operation(Aspect::Cover, 32);
        let mut file = File::create(&buf, Aspect::Cover).unwrap();
        let data: Vec<u8> = (0..(DATA_SIZE + 3 * LOGICAL_BLOCK_SIZE)).map(|i| (i % 251) as u8).collect();
        file.write(0, &data).unwrap();
        assert_eq!(file.size(), data.len() as u32);

        let mut out = vec![0u8; data.len()];
        assert_eq!(file.read(0, &mut out), data.len() as u32);
        assert_eq!(out, data);
    }

    #[test]
    fn write_at_offset_extends_size() {
        let buf = fresh_buffer(4096, 32);
        let _op = buf.operation(Aspect::Cover, 32);
        let mut file = File::create(&buf, Aspect::Cover).unwrap();
        file.write(10, b"xyz").unwrap();
        assert_eq!(file.size(), 13);
    }

    #[test]
    fn truncate_shrinks_and_releases_pages() {
        let buf = fresh_buffer(8192, 32);
        let _op = buf.operation(Aspect::Cover, 32);
        let mut file = File::create(&buf, Aspect::Cover).unwrap();
        let data = vec![0xABu8; (DATA_SIZE + 2 * LOGICAL_BLOCK_SIZE) as usize];
        file.write(0, &data).unwrap();
        file.truncate(4);
        assert_eq!(file.size(), 4);
        let mut out = [0u8; 4];
        file.read(0, &mut out);
        assert_eq!(out, [0xAB, 0xAB, 0xAB, 0xAB]);
    }

    #[test]
    fn truncate_into_first_data_block_keeps_its_live_bytes() {
        let buf = fresh_buffer(8192, 32);
        let _op = buf.operation(Aspect::Cover, 32);
        let mut file = File::create(&buf, Aspect::Cover).unwrap();
        let data: Vec<u8> = (0..(DATA_SIZE + 2 * LOGICAL_BLOCK_SIZE)).map(|i| (i % 251) as u8).collect();
        file.write(0, &data).unwrap();

        let new_size = DATA_SIZE + 10;
        file.truncate(new_size);
        assert_eq!(file.size(), new_size);
        assert_eq!(file.bf.number_of_blocks(), 2);

        let mut out = vec![0u8; new_size as usize];
        assert_eq!(file.read(0, &mut out), new_size);
        assert_eq!(out, data[..new_size as usize]);
    }
}

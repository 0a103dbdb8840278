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

//! A directory: an in-block B-tree mapping names to block ids. The root lives
//! inline in the header block at `DIR_BTREE_HEADER_OFFSET`; once it overflows,
//! its content moves out to two freshly allocated node blocks and the header
//! becomes an interior node one level taller.
//!
//! Records are decoded into plain `Record` values and rebuilt wholesale on every
//! write rather than shuffled in place a byte at a time — nodes top out around
//! fifteen entries, so the cost is negligible and the borrow/rotate/merge logic
//! reads like ordinary B-tree code instead of a maze of `memmove` offsets.

use crate::aspect::{Aspect, BlockId, LogicalId};
use crate::buffer::Buffer;
use crate::consts::{
    BLOCK_TREE_OFFSET, BTREE_RECORD_SIZE, DIR_BTREE_HEADER_OFFSET, DIR_BTREE_HEADER_SIZE,
    DIR_BTREE_NODE_SIZE, DIR_TYPE, FILE_NAME_SIZE, FILE_PTR_SIZE, LOGICAL_BLOCK_SIZE, NO_BLOCK,
};
use crate::error::{Error, Result};

#[derive(Clone, Debug)]
struct Record {
    name: Vec<u8>,
    value: u32,
    /// Right-child pointer; `None` for leaf records.
    child: Option<u32>,
}

#[derive(Clone, Copy)]
enum NodeLoc {
    Header,
    Block(u32),
}

impl NodeLoc {
    fn offset(self) -> u32 {
        match self {
            NodeLoc::Header => DIR_BTREE_HEADER_OFFSET,
            NodeLoc::Block(_) => 0,
        }
    }

    fn size(self) -> u32 {
        match self {
            NodeLoc::Header => DIR_BTREE_HEADER_SIZE,
            NodeLoc::Block(_) => DIR_BTREE_NODE_SIZE,
        }
    }
}

enum RemoveOutcome {
    Done,
    Underfull,
}

fn record_size(is_leaf: bool) -> u32 {
    if is_leaf { BTREE_RECORD_SIZE } else { BTREE_RECORD_SIZE + FILE_PTR_SIZE }
}

fn num_keys(size: u32, is_leaf: bool) -> u32 {
    if is_leaf { size / record_size(is_leaf) } else { (size - FILE_PTR_SIZE) / record_size(is_leaf) }
}

fn read_u32(buf: &[u8], pos: u32) -> u32 {
    let i = pos as usize;
    u32::from_le_bytes(buf[i..i + 4].try_into().unwrap())
}

fn write_u32(buf: &mut [u8], pos: u32, v: u32) {
    let i = pos as usize;
    buf[i..i + 4].copy_from_slice(&v.to_le_bytes());
}

fn fname_from_bytes(buf: &[u8], pos: u32) -> Vec<u8> {
    let start = pos as usize;
    let field = &buf[start..start + FILE_NAME_SIZE as usize];
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    field[..end].to_vec()
}

fn decode_node(buf: &[u8], offset: u32, size: u32, is_leaf: bool) -> (Option<u32>, Vec<Record>) {
    let leftmost = if is_leaf { None } else { Some(read_u32(buf, offset)) };
    let rs = record_size(is_leaf);
    let base = if is_leaf { offset } else { offset + FILE_PTR_SIZE };
    let mut records = Vec::new();
    for i in 0..num_keys(size, is_leaf) {
        let pos = base + rs * i;
        let value = read_u32(buf, pos + FILE_NAME_SIZE);
        if value == NO_BLOCK {
            break;
        }
        let name = fname_from_bytes(buf, pos);
        let child = if is_leaf { None } else { Some(read_u32(buf, pos + FILE_NAME_SIZE + FILE_PTR_SIZE)) };
        records.push(Record { name, value, child });
    }
    (leftmost, records)
}

fn encode_node(buf: &mut [u8], offset: u32, size: u32, is_leaf: bool, leftmost: Option<u32>, records: &[Record]) {
    let rs = record_size(is_leaf);
    let base = if is_leaf { offset } else { offset + FILE_PTR_SIZE };
    let cap = num_keys(size, is_leaf);
    assert!(records.len() as u32 <= cap, "directory node overflow");
    if !is_leaf {
        write_u32(buf, offset, leftmost.expect("interior node requires a leftmost child"));
    }
    for i in 0..cap {
        let pos = base + rs * i;
        if let Some(r) = records.get(i as usize) {
            let name_pos = pos as usize;
            buf[name_pos..name_pos + FILE_NAME_SIZE as usize].fill(0);
            let copy_len = r.name.len().min(FILE_NAME_SIZE as usize);
            buf[name_pos..name_pos + copy_len].copy_from_slice(&r.name[..copy_len]);
            write_u32(buf, pos + FILE_NAME_SIZE, r.value);
            if !is_leaf {
                write_u32(buf, pos + FILE_NAME_SIZE + FILE_PTR_SIZE, r.child.expect("interior record requires a child"));
            }
        } else {
            write_u32(buf, pos + FILE_NAME_SIZE, NO_BLOCK);
        }
    }
}

enum InsertOutcome {
    Done,
    Split { promoted_name: Vec<u8>, promoted_value: u32, right_child: u32 },
}

pub struct Dir<'b> {
    buffer: &'b Buffer,
    header: crate::buffer::BlockAccessor<'b>,
}

impl<'b> Dir<'b> {
    pub fn create(buffer: &'b Buffer, aspect: Aspect) -> Result<Self> {
        let mut header = buffer.allocate(aspect)?;
        {
            let data = header.write();
            data[0] = DIR_TYPE;
            write_u32(data, BLOCK_TREE_OFFSET, 0);
            write_u32(data, BLOCK_TREE_OFFSET + 4, 0);
            encode_node(data, DIR_BTREE_HEADER_OFFSET, DIR_BTREE_HEADER_SIZE, true, None, &[]);
        }
        Ok(Self { buffer, header })
    }

    pub fn open(buffer: &'b Buffer, aspect: Aspect, id: BlockId) -> Self {
        let header = buffer.get(aspect, id);
        assert_eq!(header.read()[0], DIR_TYPE, "block is not a directory header");
        Self { buffer, header }
    }

    pub fn id(&self) -> LogicalId {
        self.header.logical_id()
    }

    fn blocks(&self) -> u32 {
        read_u32(self.header.read(), BLOCK_TREE_OFFSET)
    }

    fn set_blocks(&mut self, v: u32) {
        write_u32(self.header.write(), BLOCK_TREE_OFFSET, v)
    }

    fn height(&self) -> u32 {
        read_u32(self.header.read(), BLOCK_TREE_OFFSET + 4)
    }

    fn set_height(&mut self, v: u32) {
        write_u32(self.header.write(), BLOCK_TREE_OFFSET + 4, v)
    }

    /// Bytes occupied on disk by this directory's header and node blocks.
    pub fn disk_size(&self) -> u32 {
        (self.blocks() + 1) * LOGICAL_BLOCK_SIZE
    }

    fn read_node(&self, loc: NodeLoc, is_leaf: bool) -> (Option<u32>, Vec<Record>) {
        match loc {
            NodeLoc::Header => decode_node(self.header.read(), loc.offset(), loc.size(), is_leaf),
            NodeLoc::Block(id) => {
                let acc = self.buffer.get(self.id().0, id);
                decode_node(acc.read(), loc.offset(), loc.size(), is_leaf)
            }
        }
    }

    fn write_node(&mut self, loc: NodeLoc, is_leaf: bool, leftmost: Option<u32>, records: &[Record]) {
        match loc {
            NodeLoc::Header => encode_node(self.header.write(), loc.offset(), loc.size(), is_leaf, leftmost, records),
            NodeLoc::Block(id) => {
                let aspect = self.id().0;
                let mut acc = self.buffer.get(aspect, id);
                encode_node(acc.write(), loc.offset(), loc.size(), is_leaf, leftmost, records);
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.height() == 0 && self.read_node(NodeLoc::Header, true).1.is_empty()
    }

    pub fn get(&self, name: &[u8]) -> Option<u32> {
        let mut loc = NodeLoc::Header;
        let mut height = self.height();
        loop {
            let is_leaf = height == 0;
            let (leftmost, records) = self.read_node(loc, is_leaf);
            let pos = records.iter().position(|r| r.name.as_slice() >= name);
            match pos {
                Some(p) if records[p].name == name => return Some(records[p].value),
                _ if is_leaf => return None,
                Some(p) => {
                    let child = if p == 0 { leftmost? } else { records[p - 1].child? };
                    loc = NodeLoc::Block(child);
                }
                None => {
                    let child = match records.last() {
                        Some(r) => r.child?,
                        None => leftmost?,
                    };
                    loc = NodeLoc::Block(child);
                }
            }
            height -= 1;
        }
    }

    pub fn entries(&self) -> Vec<(Vec<u8>, u32)> {
        let mut out = Vec::new();
        self.collect(NodeLoc::Header, self.height(), &mut out);
        out
    }

    fn collect(&self, loc: NodeLoc, height: u32, out: &mut Vec<(Vec<u8>, u32)>) {
        let is_leaf = height == 0;
        let (leftmost, records) = self.read_node(loc, is_leaf);
        if !is_leaf {
            if let Some(l) = leftmost {
                self.collect(NodeLoc::Block(l), height - 1, out);
            }
        }
        for r in &records {
            out.push((r.name.clone(), r.value));
            if !is_leaf {
                if let Some(c) = r.child {
                    self.collect(NodeLoc::Block(c), height - 1, out);
                }
            }
        }
    }

    /// Pretty-prints the node tree for diagnostics (the `hidefs check` subcommand and
    /// tests only; never on a hot path), walking it depth-first and indenting each
    /// node's records by depth.
    pub fn debug_tree(&self) -> String {
        let mut out = String::new();
        self.debug_node(NodeLoc::Header, self.height(), 0, &mut out);
        out
    }

    fn debug_node(&self, loc: NodeLoc, height: u32, depth: usize, out: &mut String) {
        let is_leaf = height == 0;
        let (leftmost, records) = self.read_node(loc, is_leaf);
        let indent = "  ".repeat(depth);
        out.push_str(&format!(
            "{indent}{} ({} records){}\n",
            if is_leaf { "leaf" } else { "interior" },
            records.len(),
            match loc {
                NodeLoc::Header => " [header]".to_string(),
                NodeLoc::Block(id) => format!(" [block {id}]"),
            }
        ));
        if !is_leaf {
            if let Some(l) = leftmost {
                self.debug_node(NodeLoc::Block(l), height - 1, depth + 1, out);
            }
        }
        for r in &records {
            out.push_str(&format!(
                "{indent}  {:?} -> {}\n",
                String::from_utf8_lossy(&r.name),
                r.value
            ));
            if !is_leaf {
                if let Some(c) = r.child {
                    self.debug_node(NodeLoc::Block(c), height - 1, depth + 1, out);
                }
            }
        }
    }

    pub fn add(&mut self, name: &[u8], value: u32) -> Result<()> {
        if name.is_empty() || name.len() > FILE_NAME_SIZE as usize {
            return Err(Error::NameTooLong(FILE_NAME_SIZE));
        }
        let height = self.height();
        match self.insert_into(NodeLoc::Header, height, name, value)? {
            InsertOutcome::Done | InsertOutcome::Split { .. } => Ok(()),
        }
    }

    fn insert_into(&mut self, loc: NodeLoc, height: u32, name: &[u8], value: u32) -> Result<InsertOutcome> {
        let is_leaf = height == 0;
        let (leftmost, mut records) = self.read_node(loc, is_leaf);
        let pos = records.iter().position(|r| r.name.as_slice() >= name).unwrap_or(records.len());
        if pos < records.len() && records[pos].name == name {
            return Err(Error::Exists);
        }

        if is_leaf {
            records.insert(pos, Record { name: name.to_vec(), value, child: None });
            return self.finish_insert(loc, is_leaf, leftmost, records, height);
        }

        let child = if pos == 0 { leftmost.expect("interior node missing leftmost child") } else { records[pos - 1].child.expect("interior record missing child") };
        match self.insert_into(NodeLoc::Block(child), height - 1, name, value)? {
            InsertOutcome::Done => Ok(InsertOutcome::Done),
            InsertOutcome::Split { promoted_name, promoted_value, right_child } => {
                let insert_pos = records.iter().position(|r| r.name.as_slice() >= promoted_name.as_slice()).unwrap_or(records.len());
                records.insert(insert_pos, Record { name: promoted_name, value: promoted_value, child: Some(right_child) });
                self.finish_insert(loc, is_leaf, leftmost, records, height)
            }
        }
    }

    fn finish_insert(&mut self, loc: NodeLoc, is_leaf: bool, leftmost: Option<u32>, records: Vec<Record>, height: u32) -> Result<InsertOutcome> {
        let cap = num_keys(loc.size(), is_leaf);
        if records.len() as u32 <= cap {
            self.write_node(loc, is_leaf, leftmost, &records);
            return Ok(InsertOutcome::Done);
        }

        let mid = records.len() / 2;
        let left: Vec<Record> = records[..mid].to_vec();
        let median = records[mid].clone();
        let right: Vec<Record> = records[mid + 1..].to_vec();
        let aspect = self.id().0;
        let right_leftmost = median.child;

        match loc {
            NodeLoc::Block(_) => {
                let new_acc = self.buffer.allocate(aspect)?;
                let right_id = new_acc.logical_id().1;
                drop(new_acc);
                self.write_node(NodeLoc::Block(right_id), is_leaf, right_leftmost, &right);
                self.write_node(loc, is_leaf, leftmost, &left);
                let blocks = self.blocks();
                self.set_blocks(blocks + 1);
                Ok(InsertOutcome::Split { promoted_name: median.name, promoted_value: median.value, right_child: right_id })
            }
            NodeLoc::Header => {
                let left_acc = self.buffer.allocate(aspect)?;
                let left_id = left_acc.logical_id().1;
                drop(left_acc);
                let right_acc = self.buffer.allocate(aspect)?;
                let right_id = right_acc.logical_id().1;
                drop(right_acc);
                self.write_node(NodeLoc::Block(left_id), is_leaf, leftmost, &left);
                self.write_node(NodeLoc::Block(right_id), is_leaf, right_leftmost, &right);
                let new_root = vec![Record { name: median.name, value: median.value, child: Some(right_id) }];
                self.write_node(NodeLoc::Header, false, Some(left_id), &new_root);
                let blocks = self.blocks();
                self.set_blocks(blocks + 2);
                self.set_height(height + 1);
                Ok(InsertOutcome::Done)
            }
        }
    }

    pub fn remove(&mut self, name: &[u8]) -> Result<u32> {
        let height = self.height();
        let (value, outcome) = self.remove_from(NodeLoc::Header, height, name)?;
        if let RemoveOutcome::Underfull = outcome {
            self.maybe_shrink_root();
        }
        Ok(value)
    }

    fn remove_from(&mut self, loc: NodeLoc, height: u32, name: &[u8]) -> Result<(u32, RemoveOutcome)> {
        let is_leaf = height == 0;
        let (leftmost, mut records) = self.read_node(loc, is_leaf);
        let pos = records.iter().position(|r| r.name.as_slice() >= name);
        let found = matches!(pos, Some(p) if records[p].name == name);

        if is_leaf {
            let p = match pos {
                Some(p) if found => p,
                _ => return Err(Error::NotFound),
            };
            let value = records[p].value;
            records.remove(p);
            let cap = num_keys(loc.size(), true);
            let underfull = (records.len() as u32) < cap / 2;
            self.write_node(loc, true, leftmost, &records);
            return Ok((value, if underfull { RemoveOutcome::Underfull } else { RemoveOutcome::Done }));
        }

        if found {
            let p = pos.unwrap();
            let value = records[p].value;
            let left_child = if p == 0 { leftmost.expect("interior node missing leftmost child") } else { records[p - 1].child.expect("interior record missing child") };
            let child_is_leaf = height - 1 == 0;
            let (pred_name, pred_value, child_outcome) = self.pop_largest(left_child, height - 1)?;
            records[p] = Record { name: pred_name, value: pred_value, child: records[p].child };
            self.write_node(loc, false, leftmost, &records);
            if let RemoveOutcome::Underfull = child_outcome {
                let outcome = self.refill_child(loc, p, child_is_leaf)?;
                return Ok((value, outcome));
            }
            return Ok((value, RemoveOutcome::Done));
        }

        let p = pos.unwrap_or(records.len());
        let child = if p == 0 { leftmost.expect("interior node missing leftmost child") } else { records[p - 1].child.expect("interior record missing child") };
        let child_is_leaf = height - 1 == 0;
        let (value, child_outcome) = self.remove_from(NodeLoc::Block(child), height - 1, name)?;
        if let RemoveOutcome::Underfull = child_outcome {
            let outcome = self.refill_child(loc, p, child_is_leaf)?;
            return Ok((value, outcome));
        }
        Ok((value, RemoveOutcome::Done))
    }

    fn pop_largest(&mut self, block_id: u32, height: u32) -> Result<(Vec<u8>, u32, RemoveOutcome)> {
        let is_leaf = height == 0;
        let loc = NodeLoc::Block(block_id);
        let (leftmost, mut records) = self.read_node(loc, is_leaf);
        if is_leaf {
            let last = records.pop().expect("leaf node must be non-empty to pop its largest key");
            let cap = num_keys(loc.size(), true);
            let underfull = (records.len() as u32) < cap / 2;
            self.write_node(loc, true, leftmost, &records);
            return Ok((last.name, last.value, if underfull { RemoveOutcome::Underfull } else { RemoveOutcome::Done }));
        }
        let last_pos = records.len();
        let rightmost_child = if last_pos == 0 {
            leftmost.expect("interior node must have a child")
        } else {
            records[last_pos - 1].child.expect("interior record missing child")
        };
        let (name, value, child_outcome) = self.pop_largest(rightmost_child, height - 1)?;
        if let RemoveOutcome::Underfull = child_outcome {
            let child_is_leaf = height - 1 == 0;
            let outcome = self.refill_child(loc, last_pos, child_is_leaf)?;
            return Ok((name, value, outcome));
        }
        Ok((name, value, RemoveOutcome::Done))
    }

    /// Rebalances the child of `loc` at position `child_pos` (0 = leftmost pointer,
    /// k>0 = `records[k-1].child`) after it dropped below minimum fill: rotates an
    /// entry from whichever sibling can spare one, or merges with one otherwise.
    fn refill_child(&mut self, loc: NodeLoc, child_pos: usize, child_is_leaf: bool) -> Result<RemoveOutcome> {
        let (leftmost, mut records) = self.read_node(loc, false);
        let child_id = if child_pos == 0 { leftmost.expect("interior node missing leftmost child") } else { records[child_pos - 1].child.expect("interior record missing child") };
        let cap = num_keys(DIR_BTREE_NODE_SIZE, child_is_leaf);
        let min_fill = cap / 2;

        if child_pos > 0 {
            let left_id = if child_pos == 1 { leftmost.unwrap() } else { records[child_pos - 2].child.unwrap() };
            let (left_leftmost, mut left_records) = self.read_node(NodeLoc::Block(left_id), child_is_leaf);
            if left_records.len() as u32 > min_fill {
                let (child_leftmost, mut child_records) = self.read_node(NodeLoc::Block(child_id), child_is_leaf);
                let moved = left_records.pop().unwrap();
                let separator = records[child_pos - 1].clone();
                let sep_child = if child_is_leaf { None } else { child_leftmost };
                child_records.insert(0, Record { name: separator.name, value: separator.value, child: sep_child });
                let new_child_leftmost = if child_is_leaf { None } else { moved.child };
                records[child_pos - 1] = Record { name: moved.name, value: moved.value, child: separator.child };
                self.write_node(NodeLoc::Block(child_id), child_is_leaf, new_child_leftmost, &child_records);
                self.write_node(NodeLoc::Block(left_id), child_is_leaf, left_leftmost, &left_records);
                self.write_node(loc, false, leftmost, &records);
                return Ok(RemoveOutcome::Done);
            }
        }

        if child_pos < records.len() {
            let right_id = records[child_pos].child.expect("interior record missing child");
            let (right_leftmost, mut right_records) = self.read_node(NodeLoc::Block(right_id), child_is_leaf);
            if right_records.len() as u32 > min_fill {
                let (child_leftmost, mut child_records) = self.read_node(NodeLoc::Block(child_id), child_is_leaf);
                let moved = right_records.remove(0);
                let separator = records[child_pos].clone();
                let sep_child = if child_is_leaf { None } else { right_leftmost };
                child_records.push(Record { name: separator.name, value: separator.value, child: sep_child });
                let new_right_leftmost = if child_is_leaf { None } else { moved.child };
                records[child_pos] = Record { name: moved.name, value: moved.value, child: separator.child };
                self.write_node(NodeLoc::Block(child_id), child_is_leaf, child_leftmost, &child_records);
                self.write_node(NodeLoc::Block(right_id), child_is_leaf, new_right_leftmost, &right_records);
                self.write_node(loc, false, leftmost, &records);
                return Ok(RemoveOutcome::Done);
            }
        }

        let aspect = self.id().0;
        if child_pos > 0 {
            let left_pos = child_pos - 1;
            let left_id = if left_pos == 0 { leftmost.unwrap() } else { records[left_pos - 1].child.unwrap() };
            let (left_leftmost, mut left_records) = self.read_node(NodeLoc::Block(left_id), child_is_leaf);
            let (child_leftmost, child_records) = self.read_node(NodeLoc::Block(child_id), child_is_leaf);
            let separator = records[left_pos].clone();
            if child_is_leaf {
                left_records.push(separator);
            } else {
                left_records.push(Record { name: separator.name, value: separator.value, child: child_leftmost });
            }
            left_records.extend(child_records);
            self.write_node(NodeLoc::Block(left_id), child_is_leaf, left_leftmost, &left_records);
            self.buffer.deallocate(aspect, child_id);
            records.remove(left_pos);
            self.write_node(loc, false, leftmost, &records);
        } else {
            let right_id = records[child_pos].child.expect("interior record missing child");
            let (right_leftmost, right_records) = self.read_node(NodeLoc::Block(right_id), child_is_leaf);
            let (child_leftmost, mut merged) = self.read_node(NodeLoc::Block(child_id), child_is_leaf);
            let separator = records[child_pos].clone();
            if child_is_leaf {
                merged.push(separator);
            } else {
                merged.push(Record { name: separator.name, value: separator.value, child: right_leftmost });
            }
            merged.extend(right_records);
            self.write_node(NodeLoc::Block(child_id), child_is_leaf, child_leftmost, &merged);
            self.buffer.deallocate(aspect, right_id);
            records.remove(child_pos);
            self.write_node(loc, false, leftmost, &records);
        }

        let blocks = self.blocks();
        self.set_blocks(blocks - 1);
        let parent_cap = num_keys(loc.size(), false);
        let underfull = (records.len() as u32) < parent_cap / 2;
        Ok(if underfull { RemoveOutcome::Underfull } else { RemoveOutcome::Done })
    }

    fn maybe_shrink_root(&mut self) {
        let height = self.height();
        if height == 0 {
            return;
        }
        let (leftmost, records) = self.read_node(NodeLoc::Header, false);
        if !records.is_empty() {
            return;
        }
        let only_child = leftmost.expect("interior root must have a leftmost child");
        let child_is_leaf = height - 1 == 0;
        let (child_leftmost, child_records) = self.read_node(NodeLoc::Block(only_child), child_is_leaf);
        self.write_node(NodeLoc::Header, child_is_leaf, child_leftmost, &child_records);
        let aspect = self.id().0;
        self.buffer.deallocate(aspect, only_child);
        let blocks = self.blocks();
        self.set_blocks(blocks - 1);
        self.set_height(height - 1);
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
    fn add_get_and_list_within_header() {
        let buf = fresh_buffer(4096, 32);
        let _op = buf.operation(Aspect::Cover, 32);
        let mut dir = Dir::create(&buf, Aspect::Cover).unwrap();
        dir.add(b"banana", 2).unwrap();
        dir.add(b"apple", 1).unwrap();
        dir.add(b"cherry", 3).unwrap();
        assert_eq!(dir.get(b"apple"), Some(1));
        assert_eq!(dir.get(b"banana"), Some(2));
        assert_eq!(dir.get(b"missing"), None);
        let names: Vec<Vec<u8>> = dir.entries().into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec![b"apple".to_vec(), b"banana".to_vec(), b"cherry".to_vec()]);
    }

    #[test]
    fn duplicate_add_is_rejected() {
        let buf = fresh_buffer(4096, 32);
        let _op = buf.operation(Aspect::Cover, 32);
        let mut dir = Dir::create(&buf, Aspect::Cover).unwrap();
        dir.add(b"x", 1).unwrap();
        assert!(matches!(dir.add(b"x", 2), Err(Error::Exists)));
    }

    #[test]
    fn remove_unknown_name_errors() {
        let buf = fresh_buffer(4096, 32);
        let _op = buf.operation(Aspect::Cover, 32);
        let mut dir = Dir::create(&buf, Aspect::Cover).unwrap();
        assert!(matches!(dir.remove(b"nope"), Err(Error::NotFound)));
    }

    #[test]
    fn grows_past_one_node_and_stays_sorted() {
        let buf = fresh_buffer(65536, 256);
        let _op = buf.operation(Aspect::Cover, 256);
        let mut dir = Dir::create(&buf, Aspect::Cover).unwrap();
        let mut names: Vec<String> = (0..400).map(|i| format!("file-{:04}", i)).collect();
        for n in &names {
            dir.add(n.as_bytes(), n.len() as u32).unwrap();
        }
        for n in &names {
            assert_eq!(dir.get(n.as_bytes()), Some(n.len() as u32));
        }
        let mut listed: Vec<String> = dir.entries().into_iter().map(|(n, _)| String::from_utf8(n).unwrap()).collect();
        names.sort();
        listed.sort();
        assert_eq!(listed, names);
    }

    #[test]
    fn insert_and_remove_interleaved_keeps_remaining_entries() {
        let buf = fresh_buffer(65536, 256);
        let _op = buf.operation(Aspect::Cover, 256);
        let mut dir = Dir::create(&buf, Aspect::Cover).unwrap();
        let names: Vec<String> = (0..200).map(|i| format!("n{:03}", i)).collect();
        for n in &names {
            dir.add(n.as_bytes(), 1).unwrap();
        }
        for n in names.iter().step_by(2) {
            dir.remove(n.as_bytes()).unwrap();
        }
        for (i, n) in names.iter().enumerate() {
            if i % 2 == 0 {
                assert_eq!(dir.get(n.as_bytes()), None);
            } else {
                assert_eq!(dir.get(n.as_bytes()), Some(1));
            }
        }
    }

    #[test]
    fn debug_tree_mentions_every_name() {
        let buf = fresh_buffer(65536, 256);
        let _op = buf.operation(Aspect::Cover, 256);
        let mut dir = Dir::create(&buf, Aspect::Cover).unwrap();
        for i in 0..60 {
            dir.add(format!("f{i:03}").as_bytes(), i).unwrap();
        }
        let tree = dir.debug_tree();
        assert!(tree.contains("f000"));
        assert!(tree.contains("interior") || tree.contains("leaf"));
    }

    #[test]
    fn removing_everything_empties_the_directory() {
        let buf = fresh_buffer(65536, 256);
        let _op = buf.operation(Aspect::Cover, 256);
        let mut dir = Dir::create(&buf, Aspect::Cover).unwrap();
        let names: Vec<String> = (0..120).map(|i| format!("k{:03}", i)).collect();
        for n in &names {
            dir.add(n.as_bytes(), 7).unwrap();
        }
        for n in &names {
            dir.remove(n.as_bytes()).unwrap();
        }
        assert!(dir.is_empty());
        assert!(dir.entries().is_empty());
    }
}

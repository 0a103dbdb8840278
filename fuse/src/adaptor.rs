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

//! Maps POSIX filesystem calls onto the `hidefs-core` storage stack. This is the
//! external adaptor: everything POSIX-shaped (paths, inodes, `errno`) lives here, not
//! in the storage core.
//!
//! `fuser` is inode-based rather than path-based. Inode numbers are therefore not
//! opaque handles into a lookup table; they *are* the location, with a high bit
//! carrying the aspect — `ino = 2 + id` for cover, with the hidden aspect's ids offset
//! by `1 << 32` so cover and hidden ids (each at most `u32::MAX`) never collide.
//! `ino == 1` is `fuser`'s reserved root; it does not correspond to a stored block at
//! all, and is synthesized here as a two-entry directory listing `cover` and `hidden`.
//!
//! File handles are just the inode again (`open`/`opendir` reply with `fh = ino`):
//! since the inode already names the block, a second handle table would be pure
//! bookkeeping with nothing to look up.

use std::ffi::OsStr;
use std::os::unix::ffi::OsStrExt;
use std::time::{Duration, SystemTime};

use fuser::{
    FileAttr, FileType, Filesystem, ReplyAttr, ReplyCreate, ReplyData, ReplyDirectory,
    ReplyEmpty, ReplyEntry, ReplyOpen, ReplyStatfs, ReplyWrite, Request, TimeOrNow,
};
use libc::{EEXIST, EINVAL, EIO, ENOENT, ENOTDIR, ENOTEMPTY, EPERM, EXDEV};

use hidefs_core::consts::{DIR_TYPE, FILE_NAME_SIZE, FILE_TYPE, LOGICAL_BLOCK_SIZE};
use hidefs_core::{Aspect, BlockId, Buffer, Dir, File, LogicalId, ROOT_BLOCK_ID};

const TTL: Duration = Duration::from_secs(1);
/// Cache slots reserved for metadata-only operations (lookup, getattr, mkdir, ...):
/// a directory descent is at most a handful of block accesses even at B-tree depth.
const META_BUDGET: usize = 32;
const HIDDEN_ASPECT_OFFSET: u64 = 1 << 32;

const VFS_ROOT_INO: u64 = 1;

fn logical_to_ino(aspect: Aspect, id: BlockId) -> u64 {
    2 + match aspect {
        Aspect::Cover => id as u64,
        Aspect::Hidden => HIDDEN_ASPECT_OFFSET + id as u64,
    }
}

fn ino_to_logical(ino: u64) -> Option<LogicalId> {
    if ino < 2 {
        return None;
    }
    let v = ino - 2;
    if v & HIDDEN_ASPECT_OFFSET != 0 {
        Some((Aspect::Hidden, (v - HIDDEN_ASPECT_OFFSET) as u32))
    } else {
        Some((Aspect::Cover, v as u32))
    }
}

fn split_name(name: &OsStr) -> Result<&[u8], i32> {
    let bytes = name.as_bytes();
    if bytes.len() > FILE_NAME_SIZE as usize {
        return Err(libc::ENAMETOOLONG);
    }
    Ok(bytes)
}

fn dir_attr(ino: u64, size: u64) -> FileAttr {
    let now = SystemTime::UNIX_EPOCH;
    FileAttr {
        ino,
        size,
        blocks: (size + LOGICAL_BLOCK_SIZE as u64 - 1) / LOGICAL_BLOCK_SIZE as u64,
        atime: now,
        mtime: now,
        ctime: now,
        crtime: now,
        kind: FileType::Directory,
        perm: 0o755,
        nlink: 2,
        uid: 0,
        gid: 0,
        rdev: 0,
        blksize: LOGICAL_BLOCK_SIZE,
        flags: 0,
    }
}

fn file_attr(ino: u64, size: u64) -> FileAttr {
    let now = SystemTime::UNIX_EPOCH;
    FileAttr {
        ino,
        size,
        blocks: (size + LOGICAL_BLOCK_SIZE as u64 - 1) / LOGICAL_BLOCK_SIZE as u64,
        atime: now,
        mtime: now,
        ctime: now,
        crtime: now,
        kind: FileType::RegularFile,
        perm: 0o644,
        nlink: 1,
        uid: 0,
        gid: 0,
        rdev: 0,
        blksize: LOGICAL_BLOCK_SIZE,
        flags: 0,
    }
}

/// The root's two synthetic children. Not stored anywhere; `hidden`'s cover key is
/// never involved so observing this directory reveals nothing about whether the
/// hidden aspect holds real data.
const ASPECT_NAMES: [(&str, Aspect); 2] = [("cover", Aspect::Cover), ("hidden", Aspect::Hidden)];

pub struct HideFs {
    buffer: Buffer,
}

impl HideFs {
    pub fn new(buffer: Buffer) -> Self {
        Self { buffer }
    }

    fn op_budget(&self, hint: usize) -> usize {
        hint.min(self.buffer.cache_size().saturating_sub(1)).max(1)
    }

    /// Reads the type tag and size of an already-allocated block, inside an
    /// already-open operation for its aspect.
    fn attr_of(&self, aspect: Aspect, id: BlockId, ino: u64) -> Result<FileAttr, i32> {
        let tag = self.buffer.get(aspect, id).read()[0];
        match tag {
            DIR_TYPE => {
                let dir = Dir::open(&self.buffer, aspect, id);
                Ok(dir_attr(ino, dir.disk_size() as u64))
            }
            FILE_TYPE => {
                let file = File::open(&self.buffer, aspect, id);
                Ok(file_attr(ino, file.size() as u64))
            }
            _ => Err(EIO),
        }
    }

    fn getattr_for_ino(&self, ino: u64) -> Result<FileAttr, i32> {
        if ino == VFS_ROOT_INO {
            return Ok(dir_attr(VFS_ROOT_INO, 0));
        }
        let (aspect, id) = ino_to_logical(ino).ok_or(ENOENT)?;
        let _op = self.buffer.operation(aspect, self.op_budget(META_BUDGET));
        self.attr_of(aspect, id, ino)
    }

    /// Resolves `ino` to the aspect/block-id of a directory, rejecting the synthetic
    /// VFS root (mutating it is meaningless; every real entry lives under `cover/` or
    /// `hidden/`).
    fn resolve_dir(&self, ino: u64) -> Result<LogicalId, i32> {
        ino_to_logical(ino).ok_or(if ino == VFS_ROOT_INO { EPERM } else { ENOENT })
    }

    fn lookup_child(&self, aspect: Aspect, parent: BlockId, name: &[u8]) -> Result<(BlockId, FileAttr), i32> {
        let dir = Dir::open(&self.buffer, aspect, parent);
        let child_id = dir.get(name).ok_or(ENOENT)?;
        drop(dir);
        let ino = logical_to_ino(aspect, child_id);
        let attr = self.attr_of(aspect, child_id, ino)?;
        Ok((child_id, attr))
    }
}

impl Filesystem for HideFs {
    fn lookup(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        if parent == VFS_ROOT_INO {
            for (label, aspect) in ASPECT_NAMES {
                if name == label {
                    let ino = logical_to_ino(aspect, ROOT_BLOCK_ID);
                    match self.getattr_for_ino(ino) {
                        Ok(attr) => reply.entry(&TTL, &attr, 0),
                        Err(e) => reply.error(e),
                    }
                    return;
                }
            }
            reply.error(ENOENT);
            return;
        }

        let Ok((aspect, pid)) = self.resolve_dir(parent) else {
            reply.error(ENOENT);
            return;
        };
        let name = match split_name(name) {
            Ok(n) => n,
            Err(e) => return reply.error(e),
        };
        let _op = self.buffer.operation(aspect, self.op_budget(META_BUDGET));
        match self.lookup_child(aspect, pid, name) {
            Ok((_, attr)) => reply.entry(&TTL, &attr, 0),
            Err(e) => reply.error(e),
        }
    }

    fn getattr(&mut self, _req: &Request<'_>, ino: u64, _fh: Option<u64>, reply: ReplyAttr) {
        match self.getattr_for_ino(ino) {
            Ok(attr) => reply.attr(&TTL, &attr),
            Err(e) => reply.error(e),
        }
    }

    fn setattr(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _mode: Option<u32>,
        _uid: Option<u32>,
        _gid: Option<u32>,
        size: Option<u64>,
        _atime: Option<TimeOrNow>,
        _mtime: Option<TimeOrNow>,
        _ctime: Option<SystemTime>,
        _fh: Option<u64>,
        _crtime: Option<SystemTime>,
        _chgtime: Option<SystemTime>,
        _bkuptime: Option<SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        let Some((aspect, id)) = ino_to_logical(ino) else {
            return reply.error(EPERM);
        };
        if let Some(new_size) = size {
            let _op = self.buffer.operation(aspect, self.op_budget(META_BUDGET + 64));
            let tag = self.buffer.get(aspect, id).read()[0];
            if tag != FILE_TYPE {
                return reply.error(libc::EISDIR);
            }
            let mut file = File::open(&self.buffer, aspect, id);
            file.truncate(new_size as u32);
        }
        match self.getattr_for_ino(ino) {
            Ok(attr) => reply.attr(&TTL, &attr),
            Err(e) => reply.error(e),
        }
    }

    fn mkdir(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, _mode: u32, _umask: u32, reply: ReplyEntry) {
        let Ok((aspect, pid)) = self.resolve_dir(parent) else {
            return reply.error(EPERM);
        };
        let name = match split_name(name) {
            Ok(n) => n,
            Err(e) => return reply.error(e),
        };
        let _op = self.buffer.operation(aspect, self.op_budget(META_BUDGET));
        let mut parent_dir = Dir::open(&self.buffer, aspect, pid);
        if parent_dir.get(name).is_some() {
            return reply.error(EEXIST);
        }
        let new_dir = match Dir::create(&self.buffer, aspect) {
            Ok(d) => d,
            Err(_) => return reply.error(libc::ENOSPC),
        };
        let new_id = new_dir.id().1;
        drop(new_dir);
        if let Err(e) = parent_dir.add(name, new_id) {
            return reply.error(posix_error(e));
        }
        let ino = logical_to_ino(aspect, new_id);
        match self.attr_of(aspect, new_id, ino) {
            Ok(attr) => reply.entry(&TTL, &attr, 0),
            Err(e) => reply.error(e),
        }
    }

    fn create(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        _mode: u32,
        _umask: u32,
        _flags: i32,
        reply: ReplyCreate,
    ) {
        let Ok((aspect, pid)) = self.resolve_dir(parent) else {
            return reply.error(EPERM);
        };
        let name = match split_name(name) {
            Ok(n) => n,
            Err(e) => return reply.error(e),
        };
        let _op = self.buffer.operation(aspect, self.op_budget(META_BUDGET));
        let mut parent_dir = Dir::open(&self.buffer, aspect, pid);
        if parent_dir.get(name).is_some() {
            return reply.error(EEXIST);
        }
        let new_file = match File::create(&self.buffer, aspect) {
            Ok(f) => f,
            Err(_) => return reply.error(libc::ENOSPC),
        };
        let new_id = new_file.id().1;
        drop(new_file);
        if let Err(e) = parent_dir.add(name, new_id) {
            return reply.error(posix_error(e));
        }
        let ino = logical_to_ino(aspect, new_id);
        match self.attr_of(aspect, new_id, ino) {
            Ok(attr) => reply.created(&TTL, &attr, 0, ino, 0),
            Err(e) => reply.error(e),
        }
    }

    fn unlink(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let Ok((aspect, pid)) = self.resolve_dir(parent) else {
            return reply.error(EPERM);
        };
        let name = match split_name(name) {
            Ok(n) => n,
            Err(e) => return reply.error(e),
        };
        let _op = self.buffer.operation(aspect, self.op_budget(META_BUDGET + 64));
        let mut parent_dir = Dir::open(&self.buffer, aspect, pid);
        let Some(child_id) = parent_dir.get(name) else {
            return reply.error(ENOENT);
        };
        let tag = self.buffer.get(aspect, child_id).read()[0];
        if tag != FILE_TYPE {
            return reply.error(libc::EISDIR);
        }
        let mut file = File::open(&self.buffer, aspect, child_id);
        file.truncate(0);
        drop(file);
        self.buffer.deallocate(aspect, child_id);
        let _ = parent_dir.remove(name);
        reply.ok();
    }

    fn rmdir(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let Ok((aspect, pid)) = self.resolve_dir(parent) else {
            return reply.error(EPERM);
        };
        let name = match split_name(name) {
            Ok(n) => n,
            Err(e) => return reply.error(e),
        };
        let _op = self.buffer.operation(aspect, self.op_budget(META_BUDGET));
        let mut parent_dir = Dir::open(&self.buffer, aspect, pid);
        let Some(child_id) = parent_dir.get(name) else {
            return reply.error(ENOENT);
        };
        let tag = self.buffer.get(aspect, child_id).read()[0];
        if tag != DIR_TYPE {
            return reply.error(ENOTDIR);
        }
        let child_dir = Dir::open(&self.buffer, aspect, child_id);
        if !child_dir.is_empty() {
            return reply.error(ENOTEMPTY);
        }
        drop(child_dir);
        self.buffer.deallocate(aspect, child_id);
        let _ = parent_dir.remove(name);
        reply.ok();
    }

    fn rename(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        newparent: u64,
        newname: &OsStr,
        flags: u32,
        reply: ReplyEmpty,
    ) {
        if flags != 0 && flags != libc::RENAME_EXCHANGE && flags != libc::RENAME_NOREPLACE {
            return reply.error(EINVAL);
        }
        let Ok((aspect, pid)) = self.resolve_dir(parent) else {
            return reply.error(EPERM);
        };
        let Ok((new_aspect, new_pid)) = self.resolve_dir(newparent) else {
            return reply.error(EPERM);
        };
        // Every path walks down from either `cover/` or `hidden/`: a rename can never
        // legally cross that boundary, matching §6's "the core enforces that every
        // operation stays within one aspect".
        if aspect != new_aspect {
            return reply.error(EXDEV);
        }
        let name = match split_name(name) {
            Ok(n) => n,
            Err(e) => return reply.error(e),
        };
        let newname = match split_name(newname) {
            Ok(n) => n,
            Err(e) => return reply.error(e),
        };

        let _op = self.buffer.operation(aspect, self.op_budget(META_BUDGET + 64));
        let mut old_dir = Dir::open(&self.buffer, aspect, pid);
        let Some(old_id) = old_dir.get(name) else {
            return reply.error(ENOENT);
        };

        if pid == new_pid {
            rename_within(&mut old_dir, &self.buffer, aspect, name, newname, old_id, flags, reply);
            return;
        }
        drop(old_dir);
        let mut new_dir = Dir::open(&self.buffer, aspect, new_pid);
        let existing = new_dir.get(newname);
        if let Err(e) = apply_rename(&self.buffer, aspect, &mut new_dir, newname, existing, old_id, flags) {
            return reply.error(e);
        }
        drop(new_dir);
        let mut old_dir = Dir::open(&self.buffer, aspect, pid);
        let _ = old_dir.remove(name);
        if flags == libc::RENAME_EXCHANGE {
            let _ = old_dir.add(name, existing.expect("apply_rename guarantees Some on exchange"));
        }
        reply.ok();
    }

    fn open(&mut self, _req: &Request<'_>, ino: u64, _flags: i32, reply: ReplyOpen) {
        reply.opened(ino, 0);
    }

    fn opendir(&mut self, _req: &Request<'_>, ino: u64, _flags: i32, reply: ReplyOpen) {
        reply.opened(ino, 0);
    }

    fn release(&mut self, _req: &Request<'_>, _ino: u64, _fh: u64, _flags: i32, _lock_owner: Option<u64>, _flush: bool, reply: ReplyEmpty) {
        reply.ok();
    }

    fn releasedir(&mut self, _req: &Request<'_>, _ino: u64, _fh: u64, _flags: i32, reply: ReplyEmpty) {
        reply.ok();
    }

    fn flush(&mut self, _req: &Request<'_>, _ino: u64, _fh: u64, _lock_owner: u64, reply: ReplyEmpty) {
        reply.ok();
    }

    /// Called once on clean unmount. Without this, any write/mkdir/unlink not
    /// followed by an explicit `fsync` would sit dirty in the buffer forever.
    fn destroy(&mut self) {
        if let Err(e) = self.buffer.flush() {
            log::error!("flush on unmount failed: {e}");
        }
    }

    fn fsync(&mut self, _req: &Request<'_>, _ino: u64, _fh: u64, _datasync: bool, reply: ReplyEmpty) {
        match self.buffer.flush() {
            Ok(()) => reply.ok(),
            Err(_) => reply.error(EIO),
        }
    }

    fn read(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        let Some((aspect, id)) = ino_to_logical(ino) else {
            return reply.error(EIO);
        };
        let budget = self.op_budget(size as usize / LOGICAL_BLOCK_SIZE as usize + 16);
        let _op = self.buffer.operation(aspect, budget);
        let tag = self.buffer.get(aspect, id).read()[0];
        if tag != FILE_TYPE {
            return reply.error(libc::EISDIR);
        }
        let file = File::open(&self.buffer, aspect, id);
        let mut buf = vec![0u8; size as usize];
        let n = file.read(offset as u32, &mut buf);
        buf.truncate(n as usize);
        reply.data(&buf);
    }

    fn write(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        let Some((aspect, id)) = ino_to_logical(ino) else {
            return reply.error(EIO);
        };
        let budget = self.op_budget(data.len() / LOGICAL_BLOCK_SIZE as usize + 16);
        let _op = self.buffer.operation(aspect, budget);
        let tag = self.buffer.get(aspect, id).read()[0];
        if tag != FILE_TYPE {
            return reply.error(libc::EISDIR);
        }
        let mut file = File::open(&self.buffer, aspect, id);
        match file.write(offset as u32, data) {
            Ok(n) => reply.written(n),
            Err(_) => reply.error(libc::ENOSPC),
        }
    }

    fn readdir(&mut self, _req: &Request<'_>, ino: u64, _fh: u64, offset: i64, mut reply: ReplyDirectory) {
        let mut entries: Vec<(u64, FileType, Vec<u8>)> = vec![
            (ino, FileType::Directory, b".".to_vec()),
            (ino, FileType::Directory, b"..".to_vec()),
        ];

        if ino == VFS_ROOT_INO {
            for (label, aspect) in ASPECT_NAMES {
                entries.push((logical_to_ino(aspect, ROOT_BLOCK_ID), FileType::Directory, label.as_bytes().to_vec()));
            }
        } else {
            let Some((aspect, id)) = ino_to_logical(ino) else {
                return reply.error(ENOENT);
            };
            let _op = self.buffer.operation(aspect, self.op_budget(self.buffer.cache_size() / 2));
            let dir = Dir::open(&self.buffer, aspect, id);
            for (name, value) in dir.entries() {
                let child_tag = self.buffer.get(aspect, value).read()[0];
                let kind = if child_tag == DIR_TYPE { FileType::Directory } else { FileType::RegularFile };
                entries.push((logical_to_ino(aspect, value), kind, name));
            }
        }

        for (i, (child_ino, kind, name)) in entries.into_iter().enumerate().skip(offset as usize) {
            if reply.add(child_ino, (i + 1) as i64, kind, OsStr::from_bytes(&name)) {
                break;
            }
        }
        reply.ok();
    }

    fn statfs(&mut self, _req: &Request<'_>, ino: u64, reply: ReplyStatfs) {
        let counts = self.buffer.slot_counts();
        let total = (counts.allocated_cover + counts.allocated_hidden + counts.virtual_slots + counts.unallocated) as u64;

        let (blocks, free) = match ino_to_logical(ino) {
            None => (total, counts.unallocated as u64),
            Some((Aspect::Cover, _)) => {
                let capacity = total / 2;
                (capacity, capacity.saturating_sub(counts.allocated_cover as u64))
            }
            Some((Aspect::Hidden, _)) => {
                let capacity = counts.allocated_cover as u64;
                (capacity, capacity.saturating_sub(counts.allocated_hidden as u64))
            }
        };

        reply.statfs(blocks, free, free, 0, 0, LOGICAL_BLOCK_SIZE, FILE_NAME_SIZE, LOGICAL_BLOCK_SIZE);
    }

    fn access(&mut self, _req: &Request<'_>, ino: u64, mask: i32, reply: ReplyEmpty) {
        if ino == VFS_ROOT_INO {
            return reply.ok();
        }
        match self.getattr_for_ino(ino) {
            Ok(attr) if attr.kind == FileType::RegularFile && mask & libc::X_OK != 0 => reply.error(libc::EACCES),
            Ok(_) => reply.ok(),
            Err(e) => reply.error(e),
        }
    }
}

/// Renames within a single directory: the only case where `RENAME_EXCHANGE` swaps two
/// entries belonging to the same parent, since `old` and `new` name the same `Dir`.
fn rename_within(
    dir: &mut Dir,
    buffer: &Buffer,
    aspect: Aspect,
    name: &[u8],
    newname: &[u8],
    old_id: BlockId,
    flags: u32,
    reply: ReplyEmpty,
) {
    let existing = dir.get(newname);
    if let Err(e) = apply_rename(buffer, aspect, dir, newname, existing, old_id, flags) {
        return reply.error(e);
    }
    let _ = dir.remove(name);
    if flags == libc::RENAME_EXCHANGE {
        let _ = dir.add(name, existing.expect("apply_rename guarantees Some on exchange"));
    }
    reply.ok();
}

/// Removes whatever currently sits at `newname` (unless exchanging) and inserts
/// `old_id` in its place. `existing` is the id previously resolved at `newname`, if
/// any the caller already looked up before this call.
fn apply_rename(
    buffer: &Buffer,
    aspect: Aspect,
    dir: &mut Dir,
    newname: &[u8],
    existing: Option<BlockId>,
    old_id: BlockId,
    flags: u32,
) -> Result<(), i32> {
    match existing {
        Some(_) if flags == libc::RENAME_NOREPLACE => return Err(EEXIST),
        Some(existing_id) if flags != libc::RENAME_EXCHANGE => {
            let old_tag = buffer.get(aspect, old_id).read()[0];
            let existing_tag = buffer.get(aspect, existing_id).read()[0];
            if existing_tag == DIR_TYPE && old_tag != DIR_TYPE {
                return Err(libc::EISDIR);
            }
            if old_tag == DIR_TYPE && existing_tag != DIR_TYPE {
                return Err(ENOTDIR);
            }
            if existing_tag == DIR_TYPE {
                let existing_dir = Dir::open(buffer, aspect, existing_id);
                if !existing_dir.is_empty() {
                    return Err(ENOTEMPTY);
                }
            } else {
                let mut existing_file = File::open(buffer, aspect, existing_id);
                existing_file.truncate(0);
            }
            buffer.deallocate(aspect, existing_id);
            let _ = dir.remove(newname);
            dir.add(newname, old_id).map_err(posix_error)
        }
        None if flags == libc::RENAME_EXCHANGE => Err(ENOENT),
        None => dir.add(newname, old_id).map_err(posix_error),
        Some(_) => {
            // RENAME_EXCHANGE: point newname at old_id now; the caller repoints
            // name at the displaced id once it has dropped this directory borrow.
            let _ = dir.remove(newname);
            dir.add(newname, old_id).map_err(posix_error)
        }
    }
}

fn posix_error(e: hidefs_core::Error) -> i32 {
    use hidefs_core::Error;
    match e {
        Error::NotFound => ENOENT,
        Error::Exists => EEXIST,
        Error::NotADirectory => ENOTDIR,
        Error::IsADirectory => libc::EISDIR,
        Error::NotEmpty => ENOTEMPTY,
        Error::NameTooLong(_) => libc::ENAMETOOLONG,
        Error::CrossAspect => EXDEV,
        Error::Full | Error::HiddenParityLimit => libc::ENOSPC,
        Error::Io(_) | Error::BadKeySize { .. } | Error::MisalignedFileSize { .. } => EIO,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ino_roundtrips_cover_and_hidden() {
        for (aspect, id) in [(Aspect::Cover, 0u32), (Aspect::Cover, 12345), (Aspect::Hidden, 0), (Aspect::Hidden, 999)] {
            let ino = logical_to_ino(aspect, id);
            assert_eq!(ino_to_logical(ino), Some((aspect, id)));
        }
    }

    #[test]
    fn cover_and_hidden_inos_never_collide() {
        assert_ne!(logical_to_ino(Aspect::Cover, 7), logical_to_ino(Aspect::Hidden, 7));
    }

    #[test]
    fn reserved_inos_have_no_logical_id() {
        assert_eq!(ino_to_logical(0), None);
        assert_eq!(ino_to_logical(1), None);
        assert_eq!(ino_to_logical(VFS_ROOT_INO), None);
    }

    #[test]
    fn root_block_id_maps_to_ino_two() {
        assert_eq!(logical_to_ino(Aspect::Cover, ROOT_BLOCK_ID), 2);
        assert_eq!(logical_to_ino(Aspect::Hidden, ROOT_BLOCK_ID), 2 + HIDDEN_ASPECT_OFFSET);
    }

    #[test]
    fn split_name_rejects_overlong_names() {
        let long = vec![b'a'; FILE_NAME_SIZE as usize + 1];
        let name = OsStr::from_bytes(&long);
        assert_eq!(split_name(name), Err(libc::ENAMETOOLONG));

        let short = vec![b'a'; FILE_NAME_SIZE as usize];
        let name = OsStr::from_bytes(&short);
        assert_eq!(split_name(name), Ok(short.as_slice()));
    }
}

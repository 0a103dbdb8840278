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

//! Recoverable errors only. Invariant violations, cache exhaustion without an active
//! operation, and cache-wait timeouts are programming-error assertions and are raised
//! with `panic!`, not through this type.

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("key must be {expected} bytes, got {got}")]
    BadKeySize { expected: usize, got: usize },
    #[error("backing file size ({size}) is not a multiple of the physical block size ({block})")]
    MisalignedFileSize { size: u64, block: u32 },
    #[error("name not found")]
    NotFound,
    #[error("name already exists")]
    Exists,
    #[error("not a directory")]
    NotADirectory,
    #[error("is a directory")]
    IsADirectory,
    #[error("directory not empty")]
    NotEmpty,
    #[error("name longer than {0} bytes")]
    NameTooLong(u32),
    #[error("operation would cross the cover/hidden aspect boundary")]
    CrossAspect,
    #[error("filesystem is full")]
    Full,
    #[error("allocating this hidden block would exceed the cover block count")]
    HiddenParityLimit,
}

pub type Result<T> = std::result::Result<T, Error>;

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

/// One of the two independent namespaces sharing a backing file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Aspect {
    Cover,
    Hidden,
}

impl Aspect {
    pub fn is_hidden(self) -> bool {
        matches!(self, Aspect::Hidden)
    }

    pub fn other(self) -> Aspect {
        match self {
            Aspect::Cover => Aspect::Hidden,
            Aspect::Hidden => Aspect::Cover,
        }
    }
}

/// A logical block identifier, unique within its aspect and stable across flushes.
pub type BlockId = u32;

/// The pair that uniquely names a logical block across both aspects.
pub type LogicalId = (Aspect, BlockId);

// Copyright 2024 Saptak Santra
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

//! Generational handles.
//!
//! A [`GenHandle<Tag>`] is a `(index, generation)` pair that indexes into some slot table;
//! the generation must match the slot's current generation for the handle to be considered
//! alive. `Tag` is a zero-sized marker type so that, say, an `EntityId` and a `ResourceHandle`
//! don't accidentally compare equal or get swapped at a call site despite sharing a layout.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

/// Sentinel index denoting an invalid/unset handle.
pub const SENTINEL_INDEX: u32 = 0xFFFF_FFFF;

/// A `(index, generation)` handle tagged by `Tag` so different handle kinds are distinct types.
pub struct GenHandle<Tag> {
    index: u32,
    generation: u32,
    _tag: PhantomData<fn() -> Tag>,
}

impl<Tag> GenHandle<Tag> {
    pub const INVALID: GenHandle<Tag> = GenHandle {
        index: SENTINEL_INDEX,
        generation: 0,
        _tag: PhantomData,
    };

    #[inline]
    pub fn new(index: u32, generation: u32) -> Self {
        Self { index, generation, _tag: PhantomData }
    }

    #[inline]
    pub fn index(&self) -> u32 {
        self.index
    }

    #[inline]
    pub fn generation(&self) -> u32 {
        self.generation
    }

    #[inline]
    pub fn is_sentinel(&self) -> bool {
        self.index == SENTINEL_INDEX
    }
}

impl<Tag> Clone for GenHandle<Tag> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<Tag> Copy for GenHandle<Tag> {}

impl<Tag> PartialEq for GenHandle<Tag> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index && self.generation == other.generation
    }
}
impl<Tag> Eq for GenHandle<Tag> {}

impl<Tag> Hash for GenHandle<Tag> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.index.hash(state);
        self.generation.hash(state);
    }
}

impl<Tag> fmt::Debug for GenHandle<Tag> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_sentinel() {
            write!(f, "GenHandle(INVALID)")
        } else {
            write!(f, "GenHandle({}#{})", self.index, self.generation)
        }
    }
}

impl<Tag> Default for GenHandle<Tag> {
    fn default() -> Self {
        Self::INVALID
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct TagA;
    struct TagB;

    #[test]
    fn test_sentinel_is_invalid() {
        let h: GenHandle<TagA> = GenHandle::INVALID;
        assert!(h.is_sentinel());
    }

    #[test]
    fn test_equality_requires_matching_generation() {
        let a: GenHandle<TagA> = GenHandle::new(3, 0);
        let b: GenHandle<TagA> = GenHandle::new(3, 1);
        assert_ne!(a, b);
        assert_eq!(a, GenHandle::new(3, 0));
    }

    #[test]
    fn test_distinct_tags_are_distinct_types() {
        let _a: GenHandle<TagA> = GenHandle::new(0, 0);
        let _b: GenHandle<TagB> = GenHandle::new(0, 0);
        // compiles only because the two are unrelated types; nothing to assert at runtime.
    }
}

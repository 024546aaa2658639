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

//! Utility functions shared across the crate.

/// Generate a process-unique id (used for resource content-cache keys and debug labels).
pub fn next_id() -> u64 {
    use std::sync::atomic::{AtomicU64, Ordering};
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// Align `value` up to the next multiple of `alignment` (`alignment` must be a power of two).
pub fn align_to(value: usize, alignment: usize) -> usize {
    debug_assert!(alignment.is_power_of_two());
    (value + alignment - 1) & !(alignment - 1)
}

/// Given a set of `(size, align)` column descriptors and a fixed buffer budget, compute the
/// largest row capacity `n` such that every column's `n * size` run, laid end to end and each
/// aligned to its own alignment, fits inside `budget_bytes` alongside a trailing
/// `n * size_of::<u32>()` entity-id column aligned to 4.
///
/// Mirrors `ArchetypeChunk::InitializeLayoutFromMask`: capacity is found by iterative shrink
/// rather than solved in closed form, since per-column alignment padding is not linear in `n`.
pub fn fit_capacity(columns: &[(usize, usize)], budget_bytes: usize) -> usize {
    let entity_id_size = std::mem::size_of::<u32>();
    let total_size: usize = columns.iter().map(|(s, _)| *s).sum::<usize>() + entity_id_size;
    let mut n = if total_size > 0 { budget_bytes / total_size } else { 0 };
    loop {
        if layout_bytes(columns, n) <= budget_bytes {
            return n;
        }
        if n == 0 {
            return 0;
        }
        n -= 1;
    }
}

/// Total byte size of the column layout for `n` rows: each column's `n * size` run aligned to
/// its own alignment and packed end to end, plus the trailing `n`-row entity-id column.
fn layout_bytes(columns: &[(usize, usize)], n: usize) -> usize {
    let mut offset = 0usize;
    for &(size, align) in columns {
        offset = align_to(offset, align.max(1));
        offset += size * n;
    }
    offset = align_to(offset, std::mem::align_of::<u32>());
    offset += std::mem::size_of::<u32>() * n;
    offset
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_id() {
        let id1 = next_id();
        let id2 = next_id();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_align_to() {
        assert_eq!(align_to(0, 8), 0);
        assert_eq!(align_to(1, 8), 8);
        assert_eq!(align_to(7, 8), 8);
        assert_eq!(align_to(8, 8), 8);
        assert_eq!(align_to(9, 8), 16);
    }

    #[test]
    fn test_fit_capacity_fits_budget() {
        // one 16-byte column (e.g. Vec3+f32) plus the entity-id column.
        let cols = [(16, 16)];
        let n = fit_capacity(&cols, 16 * 1024);
        assert!(n > 0);
        assert!(layout_bytes(&cols, n) <= 16 * 1024);
        assert!(layout_bytes(&cols, n + 1) > 16 * 1024);
    }

    #[test]
    fn test_fit_capacity_no_columns() {
        assert_eq!(fit_capacity(&[], 1024), 256);
    }
}

//! Canonical cell reindexing.
//!
//! Snapshots list cells in solver order, keyed by an id that may be sparse
//! or shuffled.  A [`Permutation`] maps each stored position to the rank of
//! its key in ascending order, so applying it yields values ordered by key
//! and compacted to `0..n`.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReindexError {
    #[error("negative key {key} at position {position}")]
    NegativeKey { position: usize, key: i32 },
    #[error("key {key} appears at positions {first} and {second}")]
    DuplicateKey { key: i32, first: usize, second: usize },
    #[error("permutation covers {expected} values, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Permutation {
    perm: Vec<usize>,
}

impl Permutation {
    /// Build the permutation for zero-based `keys`.  Keys must be unique and
    /// non-negative.
    pub fn from_keys(keys: &[i32]) -> Result<Self, ReindexError> {
        let mut pairs: Vec<(usize, usize)> = Vec::with_capacity(keys.len());
        for (position, &key) in keys.iter().enumerate() {
            let key = usize::try_from(key).map_err(|_| ReindexError::NegativeKey { position, key })?;
            pairs.push((key, position));
        }
        pairs.sort_by_key(|&(key, _)| key);

        for w in pairs.windows(2) {
            if w[0].0 == w[1].0 {
                return Err(ReindexError::DuplicateKey {
                    key:    w[0].0 as i32,
                    first:  w[0].1,
                    second: w[1].1,
                });
            }
        }

        let mut perm = vec![0usize; keys.len()];
        for (rank, &(_, position)) in pairs.iter().enumerate() {
            perm[position] = rank;
        }
        Ok(Self { perm })
    }

    pub fn len(&self) -> usize {
        self.perm.len()
    }

    pub fn is_empty(&self) -> bool {
        self.perm.is_empty()
    }

    /// `perm[i]` is the destination of the value stored at position `i`.
    pub fn as_slice(&self) -> &[usize] {
        &self.perm
    }

    /// Reorder `field`: `result[perm[i]] = field[i]`.
    pub fn apply<T: Copy + Default>(&self, field: &[T]) -> Result<Vec<T>, ReindexError> {
        self.check_len(field.len())?;
        let mut result = vec![T::default(); field.len()];
        for (&dst, &value) in self.perm.iter().zip(field) {
            result[dst] = value;
        }
        Ok(result)
    }

    /// Same as [`apply`](Self::apply), following cycles instead of
    /// allocating a second buffer.
    pub fn apply_in_place<T>(&self, field: &mut [T]) -> Result<(), ReindexError> {
        self.check_len(field.len())?;
        let mut placed = vec![false; field.len()];
        for start in 0..field.len() {
            if placed[start] {
                continue;
            }
            // The value at `start` travels along the cycle until it returns.
            let mut dst = self.perm[start];
            while dst != start {
                field.swap(start, dst);
                placed[dst] = true;
                dst = self.perm[dst];
            }
            placed[start] = true;
        }
        Ok(())
    }

    /// The permutation undoing this one.
    pub fn inverse(&self) -> Self {
        let mut inv = vec![0usize; self.perm.len()];
        for (src, &dst) in self.perm.iter().enumerate() {
            inv[dst] = src;
        }
        Self { perm: inv }
    }

    fn check_len(&self, actual: usize) -> Result<(), ReindexError> {
        if actual != self.perm.len() {
            return Err(ReindexError::LengthMismatch { expected: self.perm.len(), actual });
        }
        Ok(())
    }
}

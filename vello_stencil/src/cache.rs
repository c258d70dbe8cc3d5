// Copyright 2025 the Vello Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Host side arrays which grow in fixed blocks.

use std::ops::{Deref, Range};

use log::{debug, warn};

use crate::{Error, Result};

/// A growable array with an explicit capacity, called its size.
///
/// The size only grows in multiples of `block`, and always keeps at least `threshold` free
/// slots after an append. Every append goes through [`ensure`](Self::ensure) so the size is
/// never exceeded.
#[derive(Debug)]
pub(crate) struct GrowableArray<T> {
    data: Vec<T>,
    size: usize,
    block: usize,
    threshold: usize,
    name: &'static str,
}

impl<T> GrowableArray<T> {
    pub(crate) fn new(name: &'static str, block: usize, threshold: usize) -> Self {
        Self::with_size(name, block, block, threshold)
    }

    pub(crate) fn with_size(name: &'static str, size: usize, block: usize, threshold: usize) -> Self {
        Self {
            data: Vec::with_capacity(size),
            size,
            block: block.max(1),
            threshold,
            name,
        }
    }

    /// Number of slots that may be used without growing.
    pub(crate) fn size(&self) -> usize {
        self.size
    }

    /// Make room for `n` more elements plus the threshold.
    pub(crate) fn ensure(&mut self, n: usize) -> Result<()> {
        if self.size - self.data.len() > self.threshold + n {
            return Ok(());
        }
        let blocks = n.div_ceil(self.block).max(1);
        self.grow(blocks * self.block)
    }

    fn grow(&mut self, additional: usize) -> Result<()> {
        let size = self.size + additional;
        self.data
            .try_reserve_exact(size - self.data.len())
            .map_err(|_| {
                warn!("failed to grow the {} array to {size} elements", self.name);
                Error::NoMemory
            })?;
        debug!("{} array resized: {} -> {size}", self.name, self.size);
        self.size = size;
        Ok(())
    }

    /// Grow the size to at least `size`.
    pub(crate) fn reserve_size(&mut self, size: usize) -> Result<()> {
        if size > self.size {
            self.grow(size - self.size)?;
        }
        Ok(())
    }

    pub(crate) fn push(&mut self, value: T) -> Result<()> {
        self.ensure(1)?;
        self.data.push(value);
        Ok(())
    }

    pub(crate) fn pop(&mut self) -> Option<T> {
        self.data.pop()
    }

    pub(crate) fn truncate(&mut self, len: usize) {
        self.data.truncate(len);
    }

    pub(crate) fn clear(&mut self) {
        self.data.clear();
    }

    pub(crate) fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }

    /// Remove the elements in `range`, moving the tail to the front.
    pub(crate) fn remove_front(&mut self, range: Range<usize>) {
        self.data.drain(range);
    }
}

impl<T> Deref for GrowableArray<T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        &self.data
    }
}

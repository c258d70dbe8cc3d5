// Copyright 2025 the Vello Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Clip state tracking and the allocation of stencil bits for saved clips.
//!
//! The stencil attachment holds two working bits, [`STENCIL_FILL_BIT`] and
//! [`STENCIL_CLIP_BIT`], followed by [`BITS_PER_PLANE`] bits used to save the clip bit across
//! [`Context::save`](crate::Context::save). Once every save bit of the attachment is in use the
//! whole attachment is copied to an auxiliary plane and the bits are reused, so the nesting
//! depth of saved clips is not bounded by the stencil format.
//!
//! [`STENCIL_FILL_BIT`]: crate::device::STENCIL_FILL_BIT
//! [`STENCIL_CLIP_BIT`]: crate::device::STENCIL_CLIP_BIT

use log::debug;

/// Number of stencil bits available for saved clips before a plane is spilled.
pub const BITS_PER_PLANE: u32 = 6;

/// Index of the first save bit in the stencil attachment.
const FIRST_SAVE_BIT: u32 = 2;

/// What the stencil clip bit currently represents.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum ClipState {
    /// No clip was set, every pixel is inside.
    #[default]
    None = 0,
    /// The clip was reset while an enclosing saved state still holds a clip.
    Clear = 1,
    /// A clip is active.
    Clip = 2,
    /// A clip is active and was saved into a stencil bit.
    ClipSaved = 6,
}

impl ClipState {
    /// The state with the saved marker removed.
    #[must_use]
    pub fn unsaved(self) -> Self {
        match self {
            Self::ClipSaved => Self::Clip,
            other => other,
        }
    }

    /// Whether the stencil clip bit restricts drawing.
    pub fn is_clipping(self) -> bool {
        matches!(self, Self::Clip | Self::ClipSaved)
    }
}

/// A stencil bit handed out for a saved clip.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct StencilBit {
    /// Mask of the bit in the stencil attachment.
    pub mask: u32,
    /// Auxiliary plane the attachment must be copied to before the bit is written.
    pub spill_plane: Option<usize>,
}

/// A stencil bit given back by [`StencilBitAllocator::release`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ReleasedBit {
    /// Mask of the bit which held the saved clip.
    pub mask: u32,
    /// Auxiliary plane to copy back into the attachment once the clip bit is restored.
    pub restore_plane: Option<usize>,
}

/// Hands out stencil bits for saved clips in LIFO order.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct StencilBitAllocator {
    depth: u32,
}

impl StencilBitAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of bits currently handed out.
    pub fn depth(&self) -> u32 {
        self.depth
    }

    /// Number of auxiliary planes currently holding spilled bits.
    pub fn spilled_planes(&self) -> usize {
        (self.depth.saturating_sub(1) / BITS_PER_PLANE) as usize
    }

    fn mask(depth: u32) -> u32 {
        1 << (depth % BITS_PER_PLANE + FIRST_SAVE_BIT)
    }

    /// Mask of the most recently acquired bit.
    pub fn top(&self) -> Option<u32> {
        self.depth.checked_sub(1).map(Self::mask)
    }

    pub fn acquire(&mut self) -> StencilBit {
        let depth = self.depth;
        let spill_plane = (depth > 0 && depth % BITS_PER_PLANE == 0)
            .then(|| (depth / BITS_PER_PLANE - 1) as usize);
        if let Some(plane) = spill_plane {
            debug!("stencil save bits exhausted, spilling to plane {plane}");
        }
        self.depth += 1;
        StencilBit {
            mask: Self::mask(depth),
            spill_plane,
        }
    }

    /// Give back the most recently acquired bit. Returns `None` if no bit is in use.
    pub fn release(&mut self) -> Option<ReleasedBit> {
        let depth = self.depth.checked_sub(1)?;
        self.depth = depth;
        let restore_plane = (depth > 0 && depth % BITS_PER_PLANE == 0)
            .then(|| (depth / BITS_PER_PLANE - 1) as usize);
        Some(ReleasedBit {
            mask: Self::mask(depth),
            restore_plane,
        })
    }
}

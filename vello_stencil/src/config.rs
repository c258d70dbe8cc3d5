// Copyright 2025 the Vello Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Tunable sizes and limits of a [`Context`](crate::Context).

use std::time::Duration;

/// Number of points the point array grows by.
pub const POINT_BLOCK: usize = 1024;
/// Number of vertices the vertex cache and vertex buffer grow by.
pub const VERTEX_BLOCK: usize = POINT_BLOCK * 4;
/// Number of indices the index cache and index buffer grow by.
pub const INDEX_BLOCK: usize = VERTEX_BLOCK * 6;
/// Number of entries the path table grows by.
pub const PATH_BLOCK: usize = 16;
/// Free slots that must remain in a growable array after an append.
pub const ARRAY_THRESHOLD: usize = 8;
/// Default duration a fence wait may take before the context fails with
/// [`Error::Timeout`](crate::Error::Timeout).
pub const FENCE_TIMEOUT: Duration = Duration::from_secs(5);

/// Polygon tessellator used for non-zero fills of non-convex paths.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum NonZeroTessellator {
    /// Sweep-line tessellation with `lyon`, handling self intersections and
    /// winding across sub-paths.
    #[default]
    Lyon,
    /// Ear clipping of every sub-path on its own.
    ///
    /// Cheaper, but only correct for simple polygons.
    EarClip,
}

/// Options which are set at context creation time.
#[derive(Debug, Clone, PartialEq)]
pub struct ContextOptions {
    /// Growth increment of the point array.
    pub point_block: usize,
    /// Growth increment of the vertex cache and of the device vertex buffer.
    pub vertex_block: usize,
    /// Growth increment of the index cache and of the device index buffer.
    pub index_block: usize,
    /// Growth increment of the path table.
    pub path_block: usize,
    /// Headroom kept free in every growable array.
    pub array_threshold: usize,
    /// Initial capacity of the device vertex buffer, in vertices.
    pub initial_vertex_buffer: usize,
    /// Initial capacity of the device index buffer, in indices.
    pub initial_index_buffer: usize,
    /// Maximum time to wait on the device fence.
    pub fence_timeout: Duration,
    /// Tessellator used for non-zero fills.
    pub tessellator: NonZeroTessellator,
}

impl Default for ContextOptions {
    fn default() -> Self {
        Self {
            point_block: POINT_BLOCK,
            vertex_block: VERTEX_BLOCK,
            index_block: INDEX_BLOCK,
            path_block: PATH_BLOCK,
            array_threshold: ARRAY_THRESHOLD,
            initial_vertex_buffer: VERTEX_BLOCK,
            initial_index_buffer: INDEX_BLOCK,
            fence_timeout: FENCE_TIMEOUT,
            tessellator: NonZeroTessellator::default(),
        }
    }
}

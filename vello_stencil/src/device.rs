// Copyright 2025 the Vello Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The interface between the rasterizer and a GPU backend.
//!
//! A [`Context`](crate::Context) never talks to a graphics API directly. It records its work
//! through a [`Device`], which owns a vertex buffer, an index buffer, two command buffers and a
//! fence, and knows the pipelines listed in [`Pipeline`].

use std::mem::size_of;
use std::time::Duration;

use bytemuck::{Pod, Zeroable};
use static_assertions::const_assert_eq;

use crate::math::Matrix;
use crate::pattern::{Extend, Filter, Surface};

/// Index into the vertex buffer, relative to the vertex offset of the draw.
#[cfg(not(feature = "u32-indices"))]
pub type Index = u16;
/// Index into the vertex buffer, relative to the vertex offset of the draw.
#[cfg(feature = "u32-indices")]
pub type Index = u32;

/// Stencil bit set by fills before the cover pass.
pub const STENCIL_FILL_BIT: u32 = 0x1;
/// Stencil bit marking pixels outside of the active clip.
pub const STENCIL_CLIP_BIT: u32 = 0x2;
/// Both the fill and the clip bit.
pub const STENCIL_ALL_BIT: u32 = 0x3;

/// Added to [`PushConstants::pattern_type`] while a full screen quad is drawn.
pub const FULLSCREEN_BIT: u32 = 0x1000_0000;

/// Maximum number of color stops of a gradient.
pub const MAX_GRADIENT_STOPS: usize = 16;

/// A vertex as laid out in the vertex buffer.
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct Vertex {
    pub pos: [f32; 2],
    /// Color packed with [`pack_rgba`](crate::pack_rgba).
    pub color: u32,
    /// Texture coordinates, `z` is `-1` for vertices that are painted with the source.
    pub uv: [f32; 3],
}

const_assert_eq!(size_of::<Vertex>(), 24);

impl Vertex {
    pub const fn new(x: f32, y: f32, color: u32) -> Self {
        Self {
            pos: [x, y],
            color,
            uv: [0.0, 0.0, -1.0],
        }
    }
}

/// Per draw constants shared by all pipelines.
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct PushConstants {
    /// Source rectangle: surface offset and extent, or the target extent for gradients.
    pub source: [f32; 4],
    /// Extent of the target in pixels.
    pub size: [f32; 2],
    /// One of the `PATTERN_*` values of [`PatternKind`](crate::PatternKind), possibly combined
    /// with [`FULLSCREEN_BIT`].
    pub pattern_type: u32,
    pub opacity: f32,
    pub matrix: Matrix,
    pub matrix_inv: Matrix,
}

const_assert_eq!(size_of::<PushConstants>(), 80);

impl PushConstants {
    pub(crate) fn new(width: u32, height: u32) -> Self {
        Self {
            source: [0.0; 4],
            size: [width as f32, height as f32],
            pattern_type: 0,
            opacity: 1.0,
            matrix: Matrix::IDENTITY,
            matrix_inv: Matrix::IDENTITY,
        }
    }
}

/// Gradient description consumed by the fragment stage.
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct GradientUniform {
    /// Control points, already mapped to device space.
    ///
    /// Linear gradients use `xy` of both points, radial gradients store the radius in `z`.
    pub cp: [[f32; 4]; 2],
    pub colors: [[f32; 4]; MAX_GRADIENT_STOPS],
    /// Stop offsets, one per 16 byte slot.
    pub stops: [[f32; 4]; MAX_GRADIENT_STOPS],
    pub count: u32,
    pub _padding: [u32; 3],
}

/// Pipelines a device must provide.
///
/// Every pipeline tests `stencil & compare_mask == reference & compare_mask`. What happens to
/// the bits of the write mask depends on the pipeline:
///
/// | Pipeline      | Test passes         | Test fails |
/// |---------------|---------------------|------------|
/// | color outputs | zero                | keep       |
/// | `PolyFill`    | invert              | keep       |
/// | `Clipping`    | replace `reference` | zero       |
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Pipeline {
    /// Color output, source over destination.
    Over,
    /// Color output replacing the destination.
    Source,
    /// Color output clearing the destination.
    Clear,
    /// Color output subtracting the source.
    Difference,
    /// No color output, inverts the fill bit of the stencil for each covering triangle.
    ///
    /// Non-indexed draws with this pipeline are triangle fans, all other draws are triangle
    /// lists.
    PolyFill,
    /// No color output, stencil operations only.
    Clipping,
}

/// What a render pass does with the attachments when it begins.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum LoadOp {
    /// Keep the previous content.
    #[default]
    Load,
    /// Keep colors, clear the stencil to zero.
    ClearStencil,
    /// Clear colors and stencil.
    ClearAll,
}

/// Attachments cleared inside an active render pass.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ClearAttachments {
    Color,
    Stencil,
    ColorAndStencil,
}

/// Scissor rectangle in pixels.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ScissorRect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

/// One of the two command buffers of a device.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub struct CommandBufferId(pub u8);

impl CommandBufferId {
    /// The other command buffer.
    #[must_use]
    pub fn swapped(self) -> Self {
        Self(self.0 ^ 1)
    }
}

/// What the color pipelines sample from.
#[derive(Debug, Clone, PartialEq)]
pub enum Source {
    /// Solid colors, taken from the vertices.
    Empty,
    Surface {
        surface: Surface,
        extend: Extend,
        filter: Filter,
    },
    Gradient(Box<GradientUniform>),
}

/// A GPU backend able to execute what a [`Context`](crate::Context) records.
///
/// Buffer sizes are in elements, not bytes. All recording methods target the command
/// buffer that was last passed to [`begin_commands`](Self::begin_commands).
///
/// # Stencil usage
///
/// The stencil attachment is cleared to zero. Between two operations of a context the
/// [`STENCIL_FILL_BIT`] is zero everywhere and the [`STENCIL_CLIP_BIT`] is set on the pixels
/// which are clipped out. Color pipelines are drawn with reference [`STENCIL_FILL_BIT`],
/// compare mask [`STENCIL_CLIP_BIT`] and write mask [`STENCIL_FILL_BIT`], so they only touch
/// pixels inside the clip. Even-odd fills and clips first set the fill bit with
/// [`Pipeline::PolyFill`] and then cover it. Saved clips are copies of the clip bit in the
/// upper bits of the attachment.
pub trait Device {
    /// Extent of the render target in pixels.
    fn target_size(&self) -> (u32, u32);

    /// Reallocate the vertex buffer. Previous content may be discarded.
    fn resize_vertex_buffer(&mut self, vertices: usize);
    /// Reallocate the index buffer. Previous content may be discarded.
    fn resize_index_buffer(&mut self, indices: usize);
    /// Copy vertices to the start of the vertex buffer.
    fn write_vertices(&mut self, vertices: &[Vertex]);
    /// Copy indices to the start of the index buffer.
    fn write_indices(&mut self, indices: &[Index]);

    fn begin_commands(&mut self, cmd: CommandBufferId);
    fn end_commands(&mut self, cmd: CommandBufferId);
    fn begin_render_pass(&mut self, load: LoadOp);
    fn end_render_pass(&mut self);
    fn clear_attachments(&mut self, attachments: ClearAttachments);

    fn bind_pipeline(&mut self, pipeline: Pipeline);
    fn set_stencil_reference(&mut self, reference: u32);
    fn set_stencil_compare_mask(&mut self, mask: u32);
    fn set_stencil_write_mask(&mut self, mask: u32);
    /// Restrict drawing to `rect`, or to the whole target when `None`.
    fn set_scissor(&mut self, rect: Option<ScissorRect>);
    fn push_constants(&mut self, constants: &PushConstants);
    /// Update what the color pipelines sample. Never called while commands are recorded.
    fn bind_source(&mut self, source: &Source);
    /// Transition a surface so it can be sampled by the next submission.
    fn prepare_surface(&mut self, surface: &Surface);

    fn draw_indexed(&mut self, index_count: u32, first_index: u32, vertex_offset: u32);
    /// Draw without indices, see [`Pipeline::PolyFill`] for the topology.
    fn draw(&mut self, vertex_count: u32, first_vertex: u32);

    /// Copy the stencil attachment into auxiliary plane `plane`, allocating it if needed.
    fn save_stencil(&mut self, plane: usize);
    /// Copy auxiliary plane `plane` back into the stencil attachment.
    fn restore_stencil(&mut self, plane: usize);
    /// Free auxiliary plane `plane`.
    fn release_stencil(&mut self, plane: usize);

    /// Wait until the last submission completed. Returns `false` on timeout.
    fn wait_fence(&mut self, timeout: Duration) -> bool;
    fn reset_fence(&mut self);
    /// Submit `cmd`, signaling the fence once it completes.
    fn submit(&mut self, cmd: CommandBufferId);
    fn reset_commands(&mut self, cmd: CommandBufferId);
}

// Copyright 2025 the Vello Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Accumulation of vertices and indices, and their submission to a [`Device`].
//!
//! Geometry is appended to host side caches. Indexed geometry which was not yet drawn forms the
//! *undrawn tail*: the indices from `ind_start` on, relative to the vertex `vert_offset`.
//! [`Batch::emit`] turns that tail into one indexed draw. The caches are copied to the device
//! buffers only when the command buffer is submitted, after the fence guarding the previous
//! submission was waited on.

use std::time::Duration;

use log::{debug, error};

use crate::cache::GrowableArray;
use crate::config::ContextOptions;
use crate::device::{
    CommandBufferId, Device, Index, LoadOp, Pipeline, PushConstants, ScissorRect, Vertex,
    FULLSCREEN_BIT, STENCIL_CLIP_BIT, STENCIL_FILL_BIT,
};
use crate::math::Point;
use crate::{Error, Operator, Result};

/// Undrawn vertices above which geometry generators split their output into several draws.
pub(crate) const BATCH_VERTEX_LIMIT: usize = Index::MAX as usize / 3;

/// Dynamic stencil state of the bound pipeline.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) struct StencilState {
    pub(crate) reference: u32,
    pub(crate) compare: u32,
    pub(crate) write: u32,
}

impl StencilState {
    /// State used by the color pipelines: draw where the clip bit is unset, clear the fill bit.
    pub(crate) const DRAW: Self = Self::new(STENCIL_FILL_BIT, STENCIL_CLIP_BIT, STENCIL_FILL_BIT);

    pub(crate) const fn new(reference: u32, compare: u32, write: u32) -> Self {
        Self {
            reference,
            compare,
            write,
        }
    }
}

/// Color pipeline implementing `operator`.
pub(crate) fn operator_pipeline(operator: Operator) -> Pipeline {
    match operator {
        Operator::Clear => Pipeline::Clear,
        Operator::Source => Pipeline::Source,
        Operator::Over => Pipeline::Over,
        Operator::Difference => Pipeline::Difference,
    }
}

/// Axis aligned bounds of device space points.
#[derive(Debug, Copy, Clone, PartialEq)]
pub(crate) struct Bounds {
    min: Point,
    max: Point,
}

impl Bounds {
    pub(crate) const EMPTY: Self = Self {
        min: Point::new(f32::MAX, f32::MAX),
        max: Point::new(f32::MIN, f32::MIN),
    };

    pub(crate) fn add(&mut self, p: Point) {
        self.min.x = self.min.x.min(p.x);
        self.min.y = self.min.y.min(p.y);
        self.max.x = self.max.x.max(p.x);
        self.max.y = self.max.y.max(p.y);
    }

    /// Pixel rectangle enclosing the bounds, `None` if nothing was added.
    pub(crate) fn scissor(&self) -> Option<ScissorRect> {
        if self.min.x > self.max.x || self.min.y > self.max.y {
            return None;
        }
        let x = self.min.x.max(0.0) as i32;
        let y = self.min.y.max(0.0) as i32;
        Some(ScissorRect {
            x,
            y,
            width: ((self.max.x as i32 - self.min.x as i32 + 1).max(1)) as u32,
            height: ((self.max.y as i32 - self.min.y as i32 + 1).max(1)) as u32,
        })
    }
}

/// Vertex and index caches of a context, and the state of its command recording.
#[derive(Debug)]
pub(crate) struct Batch {
    pub(crate) vertices: GrowableArray<Vertex>,
    pub(crate) indices: GrowableArray<Index>,
    /// First vertex of the undrawn tail, indices are relative to it.
    pub(crate) vert_offset: usize,
    /// First index of the undrawn tail.
    pub(crate) ind_start: usize,
    /// Color given to new vertices.
    pub(crate) color: u32,
    pub(crate) push: PushConstants,
    pub(crate) push_dirty: bool,
    /// Load operation of the next render pass.
    pub(crate) load_op: LoadOp,
    /// Color pipeline of the current operator.
    pub(crate) draw_pipeline: Pipeline,
    vertex_buffer: usize,
    index_buffer: usize,
    vertex_block: usize,
    index_block: usize,
    threshold: usize,
    fence_timeout: Duration,
    cmd: CommandBufferId,
    cmd_started: bool,
    pipeline: Pipeline,
    stencil: StencilState,
    scissor: Option<ScissorRect>,
}

impl Batch {
    pub(crate) fn new<D: Device>(device: &mut D, options: &ContextOptions) -> Self {
        let (width, height) = device.target_size();
        let vertex_buffer = options.initial_vertex_buffer;
        let index_buffer = options.initial_index_buffer;
        device.resize_vertex_buffer(vertex_buffer);
        device.resize_index_buffer(index_buffer);
        Self {
            vertices: GrowableArray::with_size(
                "vertex",
                vertex_buffer,
                options.vertex_block,
                options.array_threshold,
            ),
            indices: GrowableArray::with_size(
                "index",
                index_buffer,
                options.index_block,
                options.array_threshold,
            ),
            vert_offset: 0,
            ind_start: 0,
            color: crate::pack_rgba(0.0, 0.0, 0.0, 1.0),
            push: PushConstants::new(width, height),
            push_dirty: false,
            load_op: LoadOp::ClearStencil,
            draw_pipeline: Pipeline::Over,
            vertex_buffer,
            index_buffer,
            vertex_block: options.vertex_block.max(1),
            index_block: options.index_block.max(1),
            threshold: options.array_threshold,
            fence_timeout: options.fence_timeout,
            cmd: CommandBufferId::default(),
            cmd_started: false,
            pipeline: Pipeline::Over,
            stencil: StencilState::DRAW,
            scissor: None,
        }
    }

    /// Whether a command buffer is being recorded.
    pub(crate) fn cmd_started(&self) -> bool {
        self.cmd_started
    }

    /// Number of vertices appended after the undrawn tail start.
    pub(crate) fn undrawn_vertices(&self) -> usize {
        self.vertices.len() - self.vert_offset
    }

    /// Index the next appended vertex will have, relative to the tail.
    pub(crate) fn next_index(&self) -> Index {
        self.undrawn_vertices() as Index
    }

    pub(crate) fn add_vertex(&mut self, p: Point) -> Result<()> {
        self.vertices.push(Vertex::new(p.x, p.y, self.color))
    }

    pub(crate) fn add_triangle(&mut self, a: Index, b: Index, c: Index) -> Result<()> {
        self.indices.ensure(3)?;
        self.indices.push(a)?;
        self.indices.push(b)?;
        self.indices.push(c)
    }

    /// Two triangles covering the quad `i, i + 1, i + 2, i + 3` laid out as a ribbon.
    pub(crate) fn add_rect_indices(&mut self, i: Index) -> Result<()> {
        self.add_triangle(i, i + 2, i + 1)?;
        self.add_triangle(i + 1, i + 2, i + 3)
    }

    /// Append a quad as four vertices and two triangles.
    pub(crate) fn add_rectangle(&mut self, x: f32, y: f32, width: f32, height: f32) -> Result<()> {
        let i = self.next_index();
        self.vertices.ensure(4)?;
        self.add_vertex(Point::new(x, y))?;
        self.add_vertex(Point::new(x, y + height))?;
        self.add_vertex(Point::new(x + width, y))?;
        self.add_vertex(Point::new(x + width, y + height))?;
        self.add_rect_indices(i)
    }

    /// Draw the undrawn tail with a single indexed draw.
    pub(crate) fn emit<D: Device>(&mut self, device: &mut D) -> Result<()> {
        if self.indices.len() == self.ind_start {
            return Ok(());
        }
        self.check_buffer_sizes(device)?;
        self.ensure_render_pass(device);
        let count = self.indices.len() - self.ind_start;
        device.draw_indexed(count as u32, self.ind_start as u32, self.vert_offset as u32);
        self.ind_start = self.indices.len();
        self.vert_offset = self.vertices.len();
        Ok(())
    }

    /// Grow the device buffers when the caches outgrew them.
    fn check_buffer_sizes<D: Device>(&mut self, device: &mut D) -> Result<()> {
        if self.vertices.len() <= self.vertex_buffer && self.indices.len() <= self.index_buffer {
            return Ok(());
        }
        if self.cmd_started {
            self.flush_until_vertex_base(device)?;
        }
        if self.vertices.len() > self.vertex_buffer {
            self.resize_vertex_buffer(device, self.vertices.size())?;
        }
        if self.indices.len() > self.index_buffer {
            self.resize_index_buffer(device, self.indices.size())?;
        }
        Ok(())
    }

    fn resize_vertex_buffer<D: Device>(&mut self, device: &mut D, vertices: usize) -> Result<()> {
        self.wait(device)?;
        let size = vertices.div_ceil(self.vertex_block) * self.vertex_block;
        debug!("vertex buffer resized: {} -> {size}", self.vertex_buffer);
        device.resize_vertex_buffer(size);
        self.vertex_buffer = size;
        self.vertices.reserve_size(size)
    }

    fn resize_index_buffer<D: Device>(&mut self, device: &mut D, indices: usize) -> Result<()> {
        self.wait(device)?;
        let size = indices.div_ceil(self.index_block) * self.index_block;
        debug!("index buffer resized: {} -> {size}", self.index_buffer);
        device.resize_index_buffer(size);
        self.index_buffer = size;
        self.indices.reserve_size(size)
    }

    /// Submit everything drawn so far, keeping the undrawn tail at the front of the caches.
    fn flush_until_vertex_base<D: Device>(&mut self, device: &mut D) -> Result<()> {
        device.end_render_pass();
        if self.vert_offset > 0 {
            self.wait(device)?;
            device.write_vertices(&self.vertices[..self.vert_offset]);
            device.write_indices(&self.indices[..self.ind_start]);
            self.vertices.remove_front(0..self.vert_offset);
            self.indices.remove_front(0..self.ind_start);
            self.vert_offset = 0;
            self.ind_start = 0;
        }
        device.end_commands(self.cmd);
        self.wait_and_submit(device)
    }

    /// Copy the caches to the device buffers and empty them.
    fn flush_caches<D: Device>(&mut self, device: &mut D) -> Result<()> {
        self.wait(device)?;
        // Vertices past the buffer were never referenced by a draw.
        let vertices = self.vertices.len().min(self.vertex_buffer);
        let indices = self.indices.len().min(self.index_buffer);
        device.write_vertices(&self.vertices[..vertices]);
        device.write_indices(&self.indices[..indices]);
        self.vertices.clear();
        self.indices.clear();
        self.vert_offset = 0;
        self.ind_start = 0;
        Ok(())
    }

    /// Emit the undrawn tail and submit the command buffer.
    pub(crate) fn flush<D: Device>(&mut self, device: &mut D) -> Result<()> {
        self.emit(device)?;
        if !self.cmd_started {
            return Ok(());
        }
        device.end_render_pass();
        self.flush_caches(device)?;
        device.end_commands(self.cmd);
        self.wait_and_submit(device)
    }

    /// Submit the recorded command buffer once the previous submission completed, then
    /// switch to the other command buffer.
    fn wait_and_submit<D: Device>(&mut self, device: &mut D) -> Result<()> {
        if !self.cmd_started {
            return Ok(());
        }
        self.wait(device)?;
        device.reset_fence();
        device.submit(self.cmd);
        self.cmd = self.cmd.swapped();
        device.reset_commands(self.cmd);
        self.cmd_started = false;
        Ok(())
    }

    /// Block until the last submission completed.
    pub(crate) fn wait<D: Device>(&mut self, device: &mut D) -> Result<()> {
        if device.wait_fence(self.fence_timeout) {
            Ok(())
        } else {
            error!("fence wait timed out after {:?}", self.fence_timeout);
            Err(Error::Timeout)
        }
    }

    pub(crate) fn ensure_render_pass<D: Device>(&mut self, device: &mut D) {
        if !self.cmd_started {
            self.start_render_pass(device);
        } else if self.push_dirty {
            device.push_constants(&self.push);
            self.push_dirty = false;
        }
    }

    /// Begin a command buffer and a render pass, replaying the current dynamic state.
    fn start_render_pass<D: Device>(&mut self, device: &mut D) {
        device.begin_commands(self.cmd);
        self.cmd_started = true;
        device.begin_render_pass(self.load_op);
        self.load_op = LoadOp::Load;
        device.set_scissor(self.scissor);
        device.push_constants(&self.push);
        self.push_dirty = false;
        device.bind_pipeline(self.pipeline);
        device.set_stencil_reference(self.stencil.reference);
        device.set_stencil_compare_mask(self.stencil.compare);
        device.set_stencil_write_mask(self.stencil.write);
    }

    /// Open a command buffer for work outside of a render pass, such as surface
    /// transitions or stencil copies. Everything drawn so far is recorded before it.
    pub(crate) fn begin_transfer<D: Device>(&mut self, device: &mut D) -> Result<()> {
        self.emit(device)?;
        if self.cmd_started {
            device.end_render_pass();
            self.flush_caches(device)?;
        } else {
            device.begin_commands(self.cmd);
            self.cmd_started = true;
        }
        Ok(())
    }

    /// Submit the command buffer opened by [`begin_transfer`](Self::begin_transfer) and wait
    /// for its completion.
    pub(crate) fn end_transfer<D: Device>(&mut self, device: &mut D) -> Result<()> {
        device.end_commands(self.cmd);
        self.wait_and_submit(device)?;
        self.wait(device)
    }

    /// Make sure `count` vertices drawn without indices fit in the vertex buffer, then make
    /// sure a render pass is active.
    pub(crate) fn reserve_unindexed<D: Device>(&mut self, device: &mut D, count: usize) -> Result<()> {
        if self.vertices.len() + count + self.threshold > self.vertex_buffer {
            self.emit(device)?;
            if self.cmd_started {
                device.end_render_pass();
                self.flush_caches(device)?;
                device.end_commands(self.cmd);
                self.wait_and_submit(device)?;
            }
            let needed = self.vertices.len() + count + self.threshold;
            if needed > self.vertex_buffer {
                self.resize_vertex_buffer(device, needed)?;
            }
        }
        self.vertices.ensure(count)?;
        self.ensure_render_pass(device);
        Ok(())
    }

    pub(crate) fn bind_pipeline<D: Device>(&mut self, device: &mut D, pipeline: Pipeline) {
        if self.cmd_started && self.pipeline != pipeline {
            device.bind_pipeline(pipeline);
        }
        self.pipeline = pipeline;
    }

    pub(crate) fn set_stencil<D: Device>(&mut self, device: &mut D, state: StencilState) {
        if self.cmd_started {
            if self.stencil.reference != state.reference {
                device.set_stencil_reference(state.reference);
            }
            if self.stencil.compare != state.compare {
                device.set_stencil_compare_mask(state.compare);
            }
            if self.stencil.write != state.write {
                device.set_stencil_write_mask(state.write);
            }
        }
        self.stencil = state;
    }

    /// Bind the color pipeline of the current operator with the default stencil state.
    pub(crate) fn bind_draw_state<D: Device>(&mut self, device: &mut D) {
        self.bind_pipeline(device, self.draw_pipeline);
        self.set_stencil(device, StencilState::DRAW);
    }

    /// Draw a triangle covering the whole target, or only `scissor` when given.
    pub(crate) fn draw_full_screen_quad<D: Device>(
        &mut self,
        device: &mut D,
        scissor: Option<ScissorRect>,
    ) -> Result<()> {
        self.reserve_unindexed(device, 3)?;
        if scissor.is_some() {
            device.set_scissor(scissor);
        }
        let first = self.vertices.len();
        for (x, y) in [(-1.0, -1.0), (3.0, -1.0), (-1.0, 3.0)] {
            self.add_vertex(Point::new(x, y))?;
        }
        self.vert_offset = self.vertices.len();

        self.push.pattern_type |= FULLSCREEN_BIT;
        device.push_constants(&self.push);
        device.draw(3, first as u32);
        self.push.pattern_type &= !FULLSCREEN_BIT;
        device.push_constants(&self.push);
        self.push_dirty = false;

        if scissor.is_some() {
            device.set_scissor(self.scissor);
        }
        Ok(())
    }

    /// Duplicate the vertices still referenced by the geometry after the undrawn tail is
    /// drawn, so a ribbon can continue in the next draw.
    ///
    /// Trailing triangles referencing vertices which are not yet appended are held back from
    /// the draw. The vertices listed in `keep` are copied first, then the ones the held back
    /// triangles reference, and those triangles are re-added against the copies. Returns the
    /// new index of every entry of `keep`.
    pub(crate) fn split_tail<D: Device, const N: usize>(
        &mut self,
        device: &mut D,
        keep: [Index; N],
    ) -> Result<[Index; N]> {
        let count = self.undrawn_vertices();
        let mut pending = Vec::new();
        while self.indices.len() >= self.ind_start + 3 {
            let len = self.indices.len();
            let tri = [self.indices[len - 3], self.indices[len - 2], self.indices[len - 1]];
            if tri.iter().all(|&i| (i as usize) < count) {
                break;
            }
            self.indices.truncate(len - 3);
            pending.push(tri);
        }
        pending.reverse();

        let mut copies: Vec<Index> = keep.to_vec();
        for &i in pending.iter().flatten() {
            if (i as usize) < count && !copies.contains(&i) {
                copies.push(i);
            }
        }

        self.emit(device)?;
        // Emit may have compacted the caches, the old tail is still their last `count` vertices.
        self.vert_offset = self.vertices.len();
        let base = self.vert_offset - count;
        let source: Vec<Vertex> = copies
            .iter()
            .map(|&i| self.vertices[base + i as usize])
            .collect();
        self.vertices.ensure(source.len())?;
        for v in source {
            self.vertices.push(v)?;
        }

        let remap = |i: Index| -> Index {
            if (i as usize) < count {
                copies.iter().position(|&c| c == i).unwrap_or(0) as Index
            } else {
                (i as usize - count + copies.len()) as Index
            }
        };
        for [a, b, c] in pending {
            self.add_triangle(remap(a), remap(b), remap(c))?;
        }
        let mut kept = keep;
        for k in &mut kept {
            *k = remap(*k);
        }
        Ok(kept)
    }
}

// Copyright 2025 the Vello Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! A [`Device`] which records calls instead of executing them.

use std::time::Duration;

use log::trace;

use crate::device::{
    ClearAttachments, CommandBufferId, Device, Index, LoadOp, Pipeline, PushConstants,
    ScissorRect, Source, Vertex,
};
use crate::pattern::Surface;

/// Single call made on a [`RecordingDevice`].
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    ResizeVertexBuffer(usize),
    ResizeIndexBuffer(usize),
    /// Number of vertices written.
    WriteVertices(usize),
    /// Number of indices written.
    WriteIndices(usize),
    BeginCommands(CommandBufferId),
    EndCommands(CommandBufferId),
    BeginRenderPass(LoadOp),
    EndRenderPass,
    ClearAttachments(ClearAttachments),
    BindPipeline(Pipeline),
    StencilReference(u32),
    StencilCompareMask(u32),
    StencilWriteMask(u32),
    Scissor(Option<ScissorRect>),
    PushConstants(PushConstants),
    BindSource(Source),
    PrepareSurface(Surface),
    DrawIndexed {
        index_count: u32,
        first_index: u32,
        vertex_offset: u32,
    },
    Draw {
        vertex_count: u32,
        first_vertex: u32,
    },
    SaveStencil(usize),
    RestoreStencil(usize),
    ReleaseStencil(usize),
    WaitFence,
    ResetFence,
    Submit(CommandBufferId),
    ResetCommands(CommandBufferId),
}

impl Command {
    /// Whether the command records a draw.
    pub fn is_draw(&self) -> bool {
        matches!(self, Self::Draw { .. } | Self::DrawIndexed { .. })
    }
}

/// Headless [`Device`] keeping a log of every call and the content of its buffers.
#[derive(Debug, Clone)]
pub struct RecordingDevice {
    width: u32,
    height: u32,
    commands: Vec<Command>,
    vertices: Vec<Vertex>,
    indices: Vec<Index>,
    vertex_buffer_size: usize,
    index_buffer_size: usize,
    fence_times_out: bool,
}

impl RecordingDevice {
    /// A device rendering to a target of `width` by `height` pixels.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            commands: Vec::new(),
            vertices: Vec::new(),
            indices: Vec::new(),
            vertex_buffer_size: 0,
            index_buffer_size: 0,
            fence_times_out: false,
        }
    }

    /// Make every later fence wait report a timeout.
    pub fn simulate_fence_timeout(&mut self, timeout: bool) {
        self.fence_times_out = timeout;
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    /// Take the recorded commands, leaving the log empty.
    pub fn take_commands(&mut self) -> Vec<Command> {
        std::mem::take(&mut self.commands)
    }

    /// Vertices last written to the vertex buffer.
    pub fn vertices(&self) -> &[Vertex] {
        &self.vertices
    }

    /// Indices last written to the index buffer.
    pub fn indices(&self) -> &[Index] {
        &self.indices
    }

    pub fn vertex_buffer_size(&self) -> usize {
        self.vertex_buffer_size
    }

    pub fn index_buffer_size(&self) -> usize {
        self.index_buffer_size
    }

    fn record(&mut self, command: Command) {
        trace!("device: {command:?}");
        self.commands.push(command);
    }
}

impl Device for RecordingDevice {
    fn target_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn resize_vertex_buffer(&mut self, vertices: usize) {
        self.vertex_buffer_size = vertices;
        self.vertices.truncate(vertices);
        self.record(Command::ResizeVertexBuffer(vertices));
    }

    fn resize_index_buffer(&mut self, indices: usize) {
        self.index_buffer_size = indices;
        self.indices.truncate(indices);
        self.record(Command::ResizeIndexBuffer(indices));
    }

    fn write_vertices(&mut self, vertices: &[Vertex]) {
        debug_assert!(vertices.len() <= self.vertex_buffer_size);
        self.vertices.clear();
        self.vertices.extend_from_slice(vertices);
        self.record(Command::WriteVertices(vertices.len()));
    }

    fn write_indices(&mut self, indices: &[Index]) {
        debug_assert!(indices.len() <= self.index_buffer_size);
        self.indices.clear();
        self.indices.extend_from_slice(indices);
        self.record(Command::WriteIndices(indices.len()));
    }

    fn begin_commands(&mut self, cmd: CommandBufferId) {
        self.record(Command::BeginCommands(cmd));
    }

    fn end_commands(&mut self, cmd: CommandBufferId) {
        self.record(Command::EndCommands(cmd));
    }

    fn begin_render_pass(&mut self, load: LoadOp) {
        self.record(Command::BeginRenderPass(load));
    }

    fn end_render_pass(&mut self) {
        self.record(Command::EndRenderPass);
    }

    fn clear_attachments(&mut self, attachments: ClearAttachments) {
        self.record(Command::ClearAttachments(attachments));
    }

    fn bind_pipeline(&mut self, pipeline: Pipeline) {
        self.record(Command::BindPipeline(pipeline));
    }

    fn set_stencil_reference(&mut self, reference: u32) {
        self.record(Command::StencilReference(reference));
    }

    fn set_stencil_compare_mask(&mut self, mask: u32) {
        self.record(Command::StencilCompareMask(mask));
    }

    fn set_stencil_write_mask(&mut self, mask: u32) {
        self.record(Command::StencilWriteMask(mask));
    }

    fn set_scissor(&mut self, rect: Option<ScissorRect>) {
        self.record(Command::Scissor(rect));
    }

    fn push_constants(&mut self, constants: &PushConstants) {
        self.record(Command::PushConstants(*constants));
    }

    fn bind_source(&mut self, source: &Source) {
        self.record(Command::BindSource(source.clone()));
    }

    fn prepare_surface(&mut self, surface: &Surface) {
        self.record(Command::PrepareSurface(*surface));
    }

    fn draw_indexed(&mut self, index_count: u32, first_index: u32, vertex_offset: u32) {
        self.record(Command::DrawIndexed {
            index_count,
            first_index,
            vertex_offset,
        });
    }

    fn draw(&mut self, vertex_count: u32, first_vertex: u32) {
        self.record(Command::Draw {
            vertex_count,
            first_vertex,
        });
    }

    fn save_stencil(&mut self, plane: usize) {
        self.record(Command::SaveStencil(plane));
    }

    fn restore_stencil(&mut self, plane: usize) {
        self.record(Command::RestoreStencil(plane));
    }

    fn release_stencil(&mut self, plane: usize) {
        self.record(Command::ReleaseStencil(plane));
    }

    fn wait_fence(&mut self, _timeout: Duration) -> bool {
        self.record(Command::WaitFence);
        !self.fence_times_out
    }

    fn reset_fence(&mut self) {
        self.record(Command::ResetFence);
    }

    fn submit(&mut self, cmd: CommandBufferId) {
        self.record(Command::Submit(cmd));
    }

    fn reset_commands(&mut self, cmd: CommandBufferId) {
        self.record(Command::ResetCommands(cmd));
    }
}

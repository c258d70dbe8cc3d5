// Copyright 2025 the Vello Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Utility functions shared across different tests.

use std::time::Duration;

use vello_stencil::device::{
    ClearAttachments, CommandBufferId, Device, LoadOp, Pipeline, PushConstants, ScissorRect,
    Source, FULLSCREEN_BIT,
};
use vello_stencil::{Context, ContextOptions, Index, Matrix, RecordingDevice, Surface, Vertex};

pub(crate) fn recording_ctx(width: u32, height: u32) -> Context<RecordingDevice> {
    Context::new(RecordingDevice::new(width, height), ContextOptions::default())
}

pub(crate) fn sim_ctx(width: u32, height: u32) -> Context<StencilSim> {
    Context::new(StencilSim::new(width, height), ContextOptions::default())
}

pub(crate) fn sim_ctx_with(width: u32, height: u32, options: ContextOptions) -> Context<StencilSim> {
    Context::new(StencilSim::new(width, height), options)
}

/// The five pointed star drawn with crossing lines.
pub(crate) fn crossed_line_star<D: Device>(ctx: &mut Context<D>) {
    ctx.move_to(50.0, 10.0);
    ctx.line_to(75.0, 90.0);
    ctx.line_to(10.0, 40.0);
    ctx.line_to(90.0, 40.0);
    ctx.line_to(25.0, 90.0);
    ctx.close_path();
}

#[derive(Debug, Clone)]
enum Op {
    BeginPass(LoadOp),
    Clear(ClearAttachments),
    Pipeline(Pipeline),
    Reference(u32),
    Compare(u32),
    Write(u32),
    Scissor(Option<ScissorRect>),
    Push(PushConstants),
    DrawIndexed { count: u32, first: u32, offset: u32 },
    Draw { count: u32, first: u32 },
    SaveStencil(usize),
    RestoreStencil(usize),
}

/// A [`Device`] rasterizing submitted draws on the CPU, one sample per pixel center.
///
/// Colors are not blended: a color pipeline passing the stencil test stores the vertex color,
/// the clear operator stores zero.
#[derive(Debug)]
pub(crate) struct StencilSim {
    width: u32,
    height: u32,
    vertices: Vec<Vertex>,
    indices: Vec<Index>,
    recorded: Vec<Op>,
    stencil: Vec<u8>,
    color: Vec<u32>,
    planes: Vec<Vec<u8>>,
    pipeline: Pipeline,
    reference: u32,
    compare: u32,
    write: u32,
    scissor: Option<ScissorRect>,
    matrix: Matrix,
    fullscreen: bool,
    pub(crate) sources: Vec<Source>,
    pub(crate) submits: usize,
}

impl StencilSim {
    pub(crate) fn new(width: u32, height: u32) -> Self {
        let len = (width * height) as usize;
        Self {
            width,
            height,
            vertices: Vec::new(),
            indices: Vec::new(),
            recorded: Vec::new(),
            stencil: vec![0; len],
            color: vec![0; len],
            planes: Vec::new(),
            pipeline: Pipeline::Over,
            reference: 0,
            compare: 0,
            write: 0,
            scissor: None,
            matrix: Matrix::IDENTITY,
            fullscreen: false,
            sources: Vec::new(),
            submits: 0,
        }
    }

    pub(crate) fn color_at(&self, x: u32, y: u32) -> u32 {
        self.color[(y * self.width + x) as usize]
    }

    pub(crate) fn painted(&self, x: u32, y: u32) -> bool {
        self.color_at(x, y) != 0
    }

    pub(crate) fn stencil_at(&self, x: u32, y: u32) -> u8 {
        self.stencil[(y * self.width + x) as usize]
    }

    /// Number of painted pixels.
    pub(crate) fn painted_count(&self) -> usize {
        self.color.iter().filter(|&&c| c != 0).count()
    }

    fn execute(&mut self) {
        for op in std::mem::take(&mut self.recorded) {
            match op {
                Op::BeginPass(load) => match load {
                    LoadOp::Load => {}
                    LoadOp::ClearStencil => self.stencil.fill(0),
                    LoadOp::ClearAll => {
                        self.stencil.fill(0);
                        self.color.fill(0);
                    }
                },
                Op::Clear(attachments) => match attachments {
                    ClearAttachments::Color => self.color.fill(0),
                    ClearAttachments::Stencil => self.stencil.fill(0),
                    ClearAttachments::ColorAndStencil => {
                        self.color.fill(0);
                        self.stencil.fill(0);
                    }
                },
                Op::Pipeline(pipeline) => self.pipeline = pipeline,
                Op::Reference(r) => self.reference = r,
                Op::Compare(c) => self.compare = c,
                Op::Write(w) => self.write = w,
                Op::Scissor(rect) => self.scissor = rect,
                Op::Push(push) => {
                    self.matrix = push.matrix;
                    self.fullscreen = push.pattern_type & FULLSCREEN_BIT != 0;
                }
                Op::DrawIndexed {
                    count,
                    first,
                    offset,
                } => {
                    for t in 0..count as usize / 3 {
                        let i = first as usize + t * 3;
                        let tri = [0, 1, 2]
                            .map(|k| self.vertices[offset as usize + self.indices[i + k] as usize]);
                        self.triangle(tri);
                    }
                }
                Op::Draw { count, first } => {
                    let first = first as usize;
                    let count = count as usize;
                    if self.pipeline == Pipeline::PolyFill {
                        for i in 1..count.saturating_sub(1) {
                            let tri = [
                                self.vertices[first],
                                self.vertices[first + i],
                                self.vertices[first + i + 1],
                            ];
                            self.triangle(tri);
                        }
                    } else {
                        for t in 0..count / 3 {
                            let tri = [0, 1, 2].map(|k| self.vertices[first + t * 3 + k]);
                            self.triangle(tri);
                        }
                    }
                }
                Op::SaveStencil(plane) => {
                    if self.planes.len() <= plane {
                        self.planes.resize(plane + 1, Vec::new());
                    }
                    self.planes[plane] = self.stencil.clone();
                }
                Op::RestoreStencil(plane) => self.stencil = self.planes[plane].clone(),
            }
        }
    }

    fn pixel_range(&self) -> (u32, u32, u32, u32) {
        match self.scissor {
            Some(r) => {
                let x0 = r.x.max(0) as u32;
                let y0 = r.y.max(0) as u32;
                (
                    x0.min(self.width),
                    y0.min(self.height),
                    (x0 + r.width).min(self.width),
                    (y0 + r.height).min(self.height),
                )
            }
            None => (0, 0, self.width, self.height),
        }
    }

    fn triangle(&mut self, tri: [Vertex; 3]) {
        let color = tri[0].color;
        let (x0, y0, x1, y1) = self.pixel_range();
        if self.fullscreen {
            for y in y0..y1 {
                for x in x0..x1 {
                    self.shade(x, y, color);
                }
            }
            return;
        }
        let p = tri.map(|v| {
            let q = self
                .matrix
                .transform_point(vello_stencil::Point::new(v.pos[0], v.pos[1]));
            (q.x, q.y)
        });
        let min_x = p.iter().map(|q| q.0).fold(f32::MAX, f32::min).floor().max(0.0) as u32;
        let min_y = p.iter().map(|q| q.1).fold(f32::MAX, f32::min).floor().max(0.0) as u32;
        let max_x = p.iter().map(|q| q.0).fold(f32::MIN, f32::max).ceil().max(0.0) as u32;
        let max_y = p.iter().map(|q| q.1).fold(f32::MIN, f32::max).ceil().max(0.0) as u32;
        for y in min_y.max(y0)..(max_y + 1).min(y1) {
            for x in min_x.max(x0)..(max_x + 1).min(x1) {
                if covers(p, x as f32 + 0.5, y as f32 + 0.5) {
                    self.shade(x, y, color);
                }
            }
        }
    }

    fn shade(&mut self, x: u32, y: u32, color: u32) {
        let i = (y * self.width + x) as usize;
        let s = self.stencil[i] as u32;
        let pass = (s & self.compare) == (self.reference & self.compare);
        let w = self.write;
        let s = match self.pipeline {
            Pipeline::PolyFill if pass => s ^ w,
            Pipeline::PolyFill => s,
            Pipeline::Clipping if pass => (s & !w) | (self.reference & w),
            Pipeline::Clipping => s & !w,
            pipeline if pass => {
                self.color[i] = if pipeline == Pipeline::Clear { 0 } else { color };
                s & !w
            }
            _ => s,
        };
        self.stencil[i] = s as u8;
    }
}

fn edge(a: (f32, f32), b: (f32, f32), p: (f32, f32)) -> f32 {
    (b.0 - a.0) * (p.1 - a.1) - (b.1 - a.1) * (p.0 - a.0)
}

/// Whether the sample `(x, y)` is inside the triangle.
///
/// Samples on an edge belong to exactly one of the two triangles sharing it.
fn covers(p: [(f32, f32); 3], x: f32, y: f32) -> bool {
    let area = edge(p[0], p[1], p[2]);
    if area == 0.0 {
        return false;
    }
    let p = if area < 0.0 { [p[0], p[2], p[1]] } else { p };
    for k in 0..3 {
        let (a, b) = (p[k], p[(k + 1) % 3]);
        let w = edge(a, b, (x, y));
        if w < 0.0 {
            return false;
        }
        if w == 0.0 {
            let (dx, dy) = (b.0 - a.0, b.1 - a.1);
            if !(dy > 0.0 || (dy == 0.0 && dx < 0.0)) {
                return false;
            }
        }
    }
    true
}

impl Device for StencilSim {
    fn target_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn resize_vertex_buffer(&mut self, _vertices: usize) {}

    fn resize_index_buffer(&mut self, _indices: usize) {}

    fn write_vertices(&mut self, vertices: &[Vertex]) {
        self.vertices = vertices.to_vec();
    }

    fn write_indices(&mut self, indices: &[Index]) {
        self.indices = indices.to_vec();
    }

    fn begin_commands(&mut self, _cmd: CommandBufferId) {}

    fn end_commands(&mut self, _cmd: CommandBufferId) {}

    fn begin_render_pass(&mut self, load: LoadOp) {
        self.recorded.push(Op::BeginPass(load));
    }

    fn end_render_pass(&mut self) {}

    fn clear_attachments(&mut self, attachments: ClearAttachments) {
        self.recorded.push(Op::Clear(attachments));
    }

    fn bind_pipeline(&mut self, pipeline: Pipeline) {
        self.recorded.push(Op::Pipeline(pipeline));
    }

    fn set_stencil_reference(&mut self, reference: u32) {
        self.recorded.push(Op::Reference(reference));
    }

    fn set_stencil_compare_mask(&mut self, mask: u32) {
        self.recorded.push(Op::Compare(mask));
    }

    fn set_stencil_write_mask(&mut self, mask: u32) {
        self.recorded.push(Op::Write(mask));
    }

    fn set_scissor(&mut self, rect: Option<ScissorRect>) {
        self.recorded.push(Op::Scissor(rect));
    }

    fn push_constants(&mut self, constants: &PushConstants) {
        self.recorded.push(Op::Push(*constants));
    }

    fn bind_source(&mut self, source: &Source) {
        self.sources.push(source.clone());
    }

    fn prepare_surface(&mut self, _surface: &Surface) {}

    fn draw_indexed(&mut self, index_count: u32, first_index: u32, vertex_offset: u32) {
        self.recorded.push(Op::DrawIndexed {
            count: index_count,
            first: first_index,
            offset: vertex_offset,
        });
    }

    fn draw(&mut self, vertex_count: u32, first_vertex: u32) {
        self.recorded.push(Op::Draw {
            count: vertex_count,
            first: first_vertex,
        });
    }

    fn save_stencil(&mut self, plane: usize) {
        self.recorded.push(Op::SaveStencil(plane));
    }

    fn restore_stencil(&mut self, plane: usize) {
        self.recorded.push(Op::RestoreStencil(plane));
    }

    fn release_stencil(&mut self, _plane: usize) {}

    fn wait_fence(&mut self, _timeout: Duration) -> bool {
        true
    }

    fn reset_fence(&mut self) {}

    fn submit(&mut self, _cmd: CommandBufferId) {
        self.submits += 1;
        self.execute();
    }

    fn reset_commands(&mut self, _cmd: CommandBufferId) {
        self.recorded.clear();
    }
}

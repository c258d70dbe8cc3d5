// Copyright 2025 the Vello Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Fill geometry.
//!
//! Non-zero fills are triangulated on the CPU: a lone convex sub-path becomes a triangle fan,
//! anything else goes through a polygon tessellator reporting its output to a
//! [`PolygonTessellationSink`]. Even-odd fills are resolved in the stencil buffer: every
//! sub-path is drawn as a plain triangle fan which inverts the fill bit, and a cover pass then
//! paints where the bit ended up set.

use std::collections::HashMap;

use log::warn;
use lyon::path::PathEvent;
use lyon::tessellation::{
    FillGeometryBuilder, FillOptions, FillRule, FillTessellator, FillVertex, GeometryBuilder,
    GeometryBuilderError, VertexId,
};

use crate::batch::{Batch, Bounds, StencilState, BATCH_VERTEX_LIMIT};
use crate::config::NonZeroTessellator;
use crate::device::{Device, Index, Pipeline};
use crate::math::{Matrix, Point};
use crate::path::PathTable;
use crate::{Error, Result};

/// How the vertices following [`PolygonTessellationSink::on_begin`] form triangles.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PrimitiveKind {
    /// Every three vertices form a triangle.
    Triangles,
    /// Every vertex after the second forms a triangle with the two before it.
    TriangleStrip,
    /// Every vertex after the second forms a triangle with the previous one and the first.
    TriangleFan,
}

/// Receives the output of a polygon tessellator.
///
/// Vertices are identified by their index relative to the current draw. Input vertices are
/// known to the tessellator by the index they were given when the polygon was submitted, new
/// vertices created at intersections are allocated through [`on_combine`](Self::on_combine).
pub trait PolygonTessellationSink {
    /// A new primitive starts.
    fn on_begin(&mut self, kind: PrimitiveKind);
    /// The next vertex of the current primitive.
    fn on_vertex(&mut self, index: Index) -> Result<()>;
    /// Allocate a vertex at `position` and return its index.
    fn on_combine(&mut self, position: Point) -> Result<Index>;
}

/// Sink writing indices to the index cache of a [`Batch`], and combined vertices to its
/// vertex cache.
#[derive(Debug)]
pub(crate) struct IndexEmitter<'a> {
    batch: &'a mut Batch,
    kind: PrimitiveKind,
    counter: u32,
    fan_start: Index,
}

impl<'a> IndexEmitter<'a> {
    pub(crate) fn new(batch: &'a mut Batch) -> Self {
        Self {
            batch,
            kind: PrimitiveKind::Triangles,
            counter: 0,
            fan_start: 0,
        }
    }

    fn last_index(&self, back: usize) -> Index {
        let indices = &self.batch.indices;
        indices[indices.len() - back]
    }

    fn push(&mut self, index: Index) -> Result<()> {
        self.batch.indices.push(index)
    }
}

impl PolygonTessellationSink for IndexEmitter<'_> {
    fn on_begin(&mut self, kind: PrimitiveKind) {
        self.kind = kind;
        self.counter = 0;
        self.fan_start = 0;
    }

    fn on_vertex(&mut self, index: Index) -> Result<()> {
        match self.kind {
            PrimitiveKind::Triangles => self.push(index),
            PrimitiveKind::TriangleStrip => {
                let counter = self.counter;
                self.counter += 1;
                if counter < 3 {
                    return self.push(index);
                }
                let (a, b) = (self.last_index(2), self.last_index(1));
                if counter % 2 == 1 {
                    self.batch.add_triangle(a, index, b)
                } else {
                    self.batch.add_triangle(b, a, index)
                }
            }
            PrimitiveKind::TriangleFan => match self.counter {
                0 => {
                    self.fan_start = index;
                    self.counter += 1;
                    self.push(index)
                }
                1 | 2 => {
                    self.counter += 1;
                    self.push(index)
                }
                _ => {
                    let prev = self.last_index(1);
                    self.batch.add_triangle(self.fan_start, prev, index)
                }
            },
        }
    }

    fn on_combine(&mut self, position: Point) -> Result<Index> {
        let index = self.batch.next_index();
        self.batch.add_vertex(position)?;
        Ok(index)
    }
}

/// Feeds the output of lyon's fill tessellator to a [`PolygonTessellationSink`].
struct LyonOutput<'a, S> {
    sink: &'a mut S,
    /// Index of every input point, by the bits of its coordinates.
    known: HashMap<(u32, u32), Index>,
    error: Option<Error>,
}

fn point_key(x: f32, y: f32) -> (u32, u32) {
    (x.to_bits(), y.to_bits())
}

impl<S: PolygonTessellationSink> GeometryBuilder for LyonOutput<'_, S> {
    fn begin_geometry(&mut self) {
        self.sink.on_begin(PrimitiveKind::Triangles);
    }

    fn add_triangle(&mut self, a: VertexId, b: VertexId, c: VertexId) {
        for id in [a, b, c] {
            if let Err(e) = self.sink.on_vertex(id.0 as Index) {
                self.error.get_or_insert(e);
            }
        }
    }
}

impl<S: PolygonTessellationSink> FillGeometryBuilder for LyonOutput<'_, S> {
    fn add_fill_vertex(&mut self, vertex: FillVertex<'_>) -> Result<VertexId, GeometryBuilderError> {
        let p = vertex.position();
        if let Some(&index) = self.known.get(&point_key(p.x, p.y)) {
            return Ok(VertexId(index.into()));
        }
        match self.sink.on_combine(Point::new(p.x, p.y)) {
            Ok(index) => Ok(VertexId(index.into())),
            Err(e) => {
                self.error = Some(e);
                Err(GeometryBuilderError::TooManyVertices)
            }
        }
    }
}

/// Number of points of the sub-paths which enclose an area.
fn fillable_point_count(paths: &PathTable) -> usize {
    paths
        .iter()
        .map(|(_, pts)| pts.len())
        .filter(|&n| n > 2)
        .sum()
}

/// Triangulate the path with the non-zero winding rule into the batch caches.
///
/// The geometry is drawn with whatever pipeline is bound when it is emitted.
pub(crate) fn fill_non_zero<D: Device>(
    batch: &mut Batch,
    device: &mut D,
    paths: &PathTable,
    tessellator: NonZeroTessellator,
) -> Result<()> {
    if let [path] = paths.paths() {
        if path.convex {
            return fill_convex(batch, device, paths.points());
        }
    }
    match tessellator {
        NonZeroTessellator::Lyon => tessellate(batch, device, paths, &FillOptions::non_zero()),
        NonZeroTessellator::EarClip => ear_clip_paths(batch, device, paths),
    }
}

fn ear_clip_paths<D: Device>(batch: &mut Batch, device: &mut D, paths: &PathTable) -> Result<()> {
    for (_, pts) in paths.iter().filter(|(_, pts)| pts.len() > 2) {
        ear_clip(batch, device, pts)?;
    }
    Ok(())
}

/// Triangle fan around the first point.
fn fill_convex<D: Device>(batch: &mut Batch, device: &mut D, pts: &[Point]) -> Result<()> {
    if pts.len() < 3 {
        return Ok(());
    }
    batch.vertices.ensure(pts.len())?;
    batch.indices.ensure((pts.len() - 2) * 3)?;

    let mut center = batch.next_index();
    batch.add_vertex(pts[0])?;
    let mut prev = batch.next_index();
    batch.add_vertex(pts[1])?;
    for &p in &pts[2..] {
        if batch.undrawn_vertices() >= BATCH_VERTEX_LIMIT {
            [center, prev] = batch.split_tail(device, [center, prev])?;
        }
        let i = batch.next_index();
        batch.add_vertex(p)?;
        batch.add_triangle(center, prev, i)?;
        prev = i;
    }
    Ok(())
}

/// Non-zero tessellation through lyon.
///
/// Should lyon fail, everything appended since the call started is dropped and the sub-paths
/// are ear clipped instead.
fn tessellate<D: Device>(
    batch: &mut Batch,
    device: &mut D,
    paths: &PathTable,
    options: &FillOptions,
) -> Result<()> {
    let total = fillable_point_count(paths);
    if total > BATCH_VERTEX_LIMIT {
        warn!("{total} points cannot be tessellated in a single draw, ear clipping sub-paths");
        return ear_clip_paths(batch, device, paths);
    }
    if batch.undrawn_vertices() + total > BATCH_VERTEX_LIMIT {
        batch.emit(device)?;
    }

    let (vertex_mark, index_mark) = (batch.vertices.len(), batch.indices.len());
    batch.vertices.ensure(total)?;
    let mut known = HashMap::with_capacity(total);
    let mut events = Vec::with_capacity(total + 2 * paths.paths().len());
    for (_, pts) in paths.iter().filter(|(_, pts)| pts.len() > 2) {
        let lp = |p: Point| lyon::math::point(p.x, p.y);
        for &p in pts {
            known.entry(point_key(p.x, p.y)).or_insert(batch.next_index());
            batch.add_vertex(p)?;
        }
        events.push(PathEvent::Begin { at: lp(pts[0]) });
        for w in pts.windows(2) {
            events.push(PathEvent::Line {
                from: lp(w[0]),
                to: lp(w[1]),
            });
        }
        events.push(PathEvent::End {
            last: lp(pts[pts.len() - 1]),
            first: lp(pts[0]),
            close: true,
        });
    }

    let mut emitter = IndexEmitter::new(batch);
    let mut output = LyonOutput {
        sink: &mut emitter,
        known,
        error: None,
    };
    let options = options.with_fill_rule(FillRule::NonZero);
    let result = FillTessellator::new().tessellate(events, &options, &mut output);
    let error = output.error;
    if error.is_some() || result.is_err() {
        batch.vertices.truncate(vertex_mark);
        batch.indices.truncate(index_mark);
    }
    if let Some(e) = error {
        return Err(e);
    }
    if let Err(e) = result {
        warn!("non-zero tessellation failed ({e}), ear clipping sub-paths");
        return ear_clip_paths(batch, device, paths);
    }
    Ok(())
}

/// Whether `p` lies in the triangle `p0, p1, p2`, edges included.
fn point_in_triangle(p: Point, p0: Point, p1: Point, p2: Point) -> bool {
    let dx = p.x - p2.x;
    let dy = p.y - p2.y;
    let dx21 = p2.x - p1.x;
    let dy12 = p1.y - p2.y;
    let d = dy12 * (p0.x - p2.x) + dx21 * (p0.y - p2.y);
    let s = dy12 * dx + dx21 * dy;
    let t = (p2.y - p0.y) * dx + (p0.x - p2.x) * dy;
    if d < 0.0 {
        s <= 0.0 && t <= 0.0 && s + t >= d
    } else {
        s >= 0.0 && t >= 0.0 && s + t <= d
    }
}

/// Ear clipping of a single simple polygon.
///
/// Clipping stops when no ear is found after a full turn, leaving the rest of the polygon
/// unfilled.
fn ear_clip<D: Device>(batch: &mut Batch, device: &mut D, pts: &[Point]) -> Result<()> {
    let n = pts.len();
    if batch.undrawn_vertices() + n > BATCH_VERTEX_LIMIT {
        batch.emit(device)?;
    }
    let first = batch.next_index();
    batch.vertices.ensure(n)?;
    for &p in pts {
        batch.add_vertex(p)?;
    }

    // Ears are searched assuming a positive signed area.
    let area: f32 = (0..n).map(|i| pts[i].det(pts[(i + 1) % n])).sum();
    let order: Vec<usize> = if area < 0.0 {
        (0..n).rev().collect()
    } else {
        (0..n).collect()
    };
    let pos = |k: usize| pts[order[k]];
    let idx = |k: usize| first + order[k] as Index;
    let mut next: Vec<usize> = (1..=n).map(|k| k % n).collect();

    let mut current = 0;
    let mut count = n;
    let mut tries = 0;
    while count > 3 {
        if tries > count {
            break;
        }
        let v1 = current;
        let v0 = next[v1];
        let v2 = next[v0];
        if (pos(v2) - pos(v0)).det(pos(v1) - pos(v0)) < 0.0 {
            current = v0;
            tries += 1;
            continue;
        }
        let mut vp = next[v2];
        let mut is_ear = true;
        while vp != v1 {
            if point_in_triangle(pos(vp), pos(v0), pos(v2), pos(v1)) {
                is_ear = false;
                break;
            }
            vp = next[vp];
        }
        if is_ear {
            batch.add_triangle(idx(v0), idx(v1), idx(v2))?;
            next[v1] = v2;
            count -= 1;
            tries = 0;
        } else {
            current = v0;
            tries += 1;
        }
    }
    if count == 3 {
        let v0 = next[current];
        batch.add_triangle(idx(v0), idx(current), idx(next[v0]))?;
    }
    Ok(())
}

/// Draw every sub-path as a triangle fan with the [`Pipeline::PolyFill`] pipeline, leaving
/// the fill bit set where the path covers the clip an odd number of times.
///
/// Returns the device space bounds of the drawn points. Room for a full screen quad is
/// reserved along with the points.
pub(crate) fn poly_fill<D: Device>(
    batch: &mut Batch,
    device: &mut D,
    paths: &PathTable,
    matrix: &Matrix,
) -> Result<Bounds> {
    batch.emit(device)?;
    let total = fillable_point_count(paths);
    batch.reserve_unindexed(device, total + 3)?;
    batch.bind_pipeline(device, Pipeline::PolyFill);
    batch.set_stencil(device, StencilState::DRAW);

    let mut bounds = Bounds::EMPTY;
    for (_, pts) in paths.iter().filter(|(_, pts)| pts.len() > 2) {
        let first = batch.vertices.len();
        for &p in pts {
            batch.add_vertex(p)?;
            bounds.add(matrix.transform_point(p));
        }
        device.draw(pts.len() as u32, first as u32);
    }
    batch.vert_offset = batch.vertices.len();
    Ok(bounds)
}

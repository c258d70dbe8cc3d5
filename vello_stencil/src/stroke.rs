// Copyright 2025 the Vello Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Conversion of paths into triangle ribbons.
//!
//! Each point of a sub-path contributes a pair of vertices on either side of the line, plus
//! the vertices of its join. Every step leaves triangles referencing the pair of the next
//! step, which closes the quad of the segment in between. Caps terminate the ribbon of open
//! sub-paths and of each dash.

use std::f32::consts::{FRAC_PI_2, PI};

use log::trace;
use peniko::kurbo::{Cap, Join};

use crate::batch::{Batch, BATCH_VERTEX_LIMIT};
use crate::device::{Device, Index};
use crate::math::{approx_eq, Point};
use crate::path::{arc_step, PathTable, SubPath};
use crate::{Error, Result};

/// Below this cosine between two flattened curve segments their join is rounded.
const CURVE_ROUND_JOIN_DOT: f32 = 0.8;

/// Line style applied by a stroke.
#[derive(Debug, Clone, Copy)]
pub(crate) struct StrokeStyle<'a> {
    pub(crate) width: f32,
    pub(crate) cap: Cap,
    pub(crate) join: Join,
    pub(crate) miter_limit: f32,
    pub(crate) dashes: &'a [f32],
    pub(crate) dash_offset: f32,
}

/// Progress along the dash pattern, carried across the segments of a sub-path.
#[derive(Debug)]
struct DashState {
    /// The next dash boundary starts a dash.
    on: bool,
    index: usize,
    /// Distance from the start of the current segment to the next dash boundary.
    offset: f32,
    total: f32,
    /// Direction of the last segment walked.
    normal: Point,
}

struct Stroker<'a, D> {
    batch: &'a mut Batch,
    device: &'a mut D,
    style: &'a StrokeStyle<'a>,
    pts: &'a [Point],
    half_width: f32,
    miter_length_max: f32,
    scale: f32,
    arc_step: Option<f32>,
    /// Index of the first vertex pair of the sub-path, the closing quad joins it.
    first_idx: Index,
    /// The sub-path is closed and not dashed, so `first_idx` must survive batch splits.
    seam: bool,
    left: usize,
    right: usize,
    current: usize,
}

/// Append the stroke geometry of every sub-path to the batch.
pub(crate) fn stroke<D: Device>(
    batch: &mut Batch,
    device: &mut D,
    paths: &PathTable,
    style: &StrokeStyle<'_>,
    scale: f32,
) -> Result<()> {
    let total: f32 = style.dashes.iter().sum();
    if !style.dashes.is_empty() && (total <= 0.0 || style.dashes.iter().any(|&d| d < 0.0)) {
        return Err(Error::InvalidDash);
    }
    for (path, pts) in paths.iter() {
        if pts.len() < 2 {
            continue;
        }
        let mut stroker = Stroker {
            batch: &mut *batch,
            device: &mut *device,
            style,
            pts,
            half_width: style.width * 0.5,
            miter_length_max: style.miter_limit * style.width,
            scale,
            arc_step: None,
            first_idx: 0,
            seam: false,
            left: 0,
            right: 0,
            current: 0,
        };
        stroker.stroke_path(path)?;
        if batch.undrawn_vertices() > BATCH_VERTEX_LIMIT {
            batch.emit(device)?;
        }
    }
    Ok(())
}

impl<D: Device> Stroker<'_, D> {
    fn stroke_path(&mut self, path: &SubPath) -> Result<()> {
        let pts = self.pts;
        let last = pts.len() - 1;
        let dashed = !self.style.dashes.is_empty();
        self.first_idx = self.batch.next_index();
        self.seam = path.closed && !dashed;

        let mut dash = dashed.then(|| {
            let total: f32 = self.style.dashes.iter().sum();
            DashState {
                on: true,
                index: 0,
                offset: self.style.dash_offset.rem_euclid(total),
                total,
                normal: Point::ZERO,
            }
        });

        if dash.is_some() || path.closed {
            self.left = last;
        } else {
            self.cap(pts[0], Point::line_normal(pts[0], pts[1]), true)?;
            self.left = 0;
            self.current = 1;
        }

        let flags: Vec<bool> = path.point_flags().take(pts.len()).collect();
        while self.current < last {
            self.segment(dash.as_mut(), flags[self.current])?;
        }

        if let Some(dash) = dash.as_mut() {
            if path.closed {
                self.right = 0;
                self.dashed_segment(dash, false)?;
                self.left += 1;
                self.current += 1;
            }
            if !dash.on {
                // A dash is still open. Its end cap is pulled back from the end of the
                // sub-path by at most the length of the following entry.
                let dashes = self.style.dashes;
                let (prev, next) = match dash.index {
                    0 => (dashes.len() - 1, dashes.len() - 1),
                    i => (i - 1, i),
                };
                let m = (dashes[prev] - dash.offset).min(dashes[next]).max(0.0);
                self.cap(pts[self.right] - dash.normal * m, dash.normal, false)?;
            }
        } else if path.closed {
            self.right = 0;
            let inverse = self.step(false)?;
            self.close_seam(inverse);
        } else {
            self.cap(
                pts[last],
                Point::line_normal(pts[last - 1], pts[last]),
                false,
            )?;
        }
        Ok(())
    }

    /// Point the quad left open by the last step at the first vertex pair.
    fn close_seam(&mut self, inverse: bool) {
        let ind_start = self.batch.ind_start;
        let indices = self.batch.indices.as_mut_slice();
        let len = indices.len();
        if len < ind_start + 6 {
            return;
        }
        let ii = self.first_idx;
        let inds = &mut indices[len - 6..];
        if inverse {
            inds[1] = ii + 1;
            inds[4] = ii + 1;
            inds[5] = ii;
        } else {
            inds[1] = ii;
            inds[4] = ii;
            inds[5] = ii + 1;
        }
    }

    fn segment(&mut self, dash: Option<&mut DashState>, curved: bool) -> Result<()> {
        self.right = self.current + 1;
        match dash {
            Some(dash) => self.dashed_segment(dash, curved)?,
            None => {
                self.step(curved)?;
            }
        }
        self.left = self.current;
        self.current += 1;
        self.check_batch()
    }

    /// Split the ribbon into a new draw when its indices approach the range of [`Index`].
    fn check_batch(&mut self) -> Result<()> {
        let undrawn = self.batch.undrawn_vertices();
        if undrawn <= BATCH_VERTEX_LIMIT {
            return Ok(());
        }
        if self.seam && (self.first_idx as usize + 1) < undrawn {
            let first = self.first_idx;
            [self.first_idx, _] = self.batch.split_tail(self.device, [first, first + 1])?;
        } else {
            self.batch.split_tail(self.device, [])?;
        }
        Ok(())
    }

    fn dashed_segment(&mut self, dash: &mut DashState, curved: bool) -> Result<()> {
        let p = self.pts[self.current];
        let pr = self.pts[self.right];
        if !dash.on {
            self.step(curved)?;
        }
        let d = pr - p;
        let length = d.length();
        if length < f32::EPSILON {
            return Ok(());
        }
        dash.normal = d.normalize();
        let dashes = self.style.dashes;
        while dash.offset < length {
            let p0 = p + dash.normal * dash.offset;
            self.cap(p0, dash.normal, dash.on)?;
            dash.on = !dash.on;
            dash.offset += dashes[dash.index];
            dash.index = (dash.index + 1) % dashes.len();
        }
        dash.offset = (dash.offset - length) % dash.total;
        Ok(())
    }

    fn arc_step(&mut self) -> f32 {
        let (hw, scale) = (self.half_width, self.scale);
        *self.arc_step.get_or_insert_with(|| arc_step(hw, scale))
    }

    fn add(&mut self, p: Point) -> Result<()> {
        self.batch.add_vertex(p)
    }

    fn tri(&mut self, a: Index, b: Index, c: Index) -> Result<()> {
        self.batch.add_triangle(a, b, c)
    }

    fn arc_point(&self, center: Point, angle: f32) -> Point {
        Point::new(
            angle.cos() * self.half_width + center.x,
            angle.sin() * self.half_width + center.y,
        )
    }

    /// Emit the vertices and join of the current point.
    ///
    /// Returns whether the turn is clockwise, which decides the vertex order used to close a
    /// closed sub-path.
    fn step(&mut self, curved: bool) -> Result<bool> {
        let hw = self.half_width;
        let p0 = self.pts[self.current];
        let v0 = p0 - self.pts[self.left];
        let v1 = self.pts[self.right] - p0;
        let length_v0 = v0.length();
        let length_v1 = v1.length();
        if length_v0 < f32::EPSILON || length_v1 < f32::EPSILON {
            trace!("stroke step discarded, zero length neighbor");
            return Ok(false);
        }
        let v0n = v0 * length_v0.recip();
        let v1n = v1 * length_v1.recip();
        let dot = v0n.dot(v1n);
        let det = v0n.det(v1n);
        if approx_eq(dot, 1.0) {
            return Ok(false);
        }

        let idx = self.batch.next_index();
        if approx_eq(dot, -1.0) {
            // Cusp, the line folds back onto itself.
            let perp = v0n.perp() * hw;
            self.add(p0 + perp)?;
            self.add(p0 - perp)?;
            self.tri(idx, idx + 1, idx + 2)?;
            self.tri(idx, idx + 2, idx + 3)?;
            return Ok(true);
        }

        let bisec_n = (v0n + v1n).normalize();
        let mut alpha = dot.clamp(-1.0, 1.0).acos();
        if det < 0.0 {
            alpha = -alpha;
        }
        let cos_half_alpha = (alpha / 2.0).cos();
        let lh = hw / cos_half_alpha;
        let bisec_n_perp = bisec_n.perp();

        // The inner vertex may not move further than the shortest neighbor segment.
        let mut rlh = lh;
        if dot < 0.0 {
            rlh = rlh.min(length_v0.min(length_v1));
        }
        let bisec = bisec_n_perp * rlh;
        let shortened = rlh < lh;

        let (inside, outside) = if shortened {
            let vn_perp = if length_v0 < length_v1 {
                v1n.perp()
            } else {
                v0n.perp()
            };
            let hw_perp = vn_perp * hw;
            let lbc = cos_half_alpha * rlh;
            if det < 0.0 {
                (
                    vn_perp * -lbc + (p0 + bisec) + hw_perp,
                    p0 - bisec_n_perp * lh,
                )
            } else {
                (
                    vn_perp * lbc + (p0 - bisec) - hw_perp,
                    p0 + bisec_n_perp * lh,
                )
            }
        } else if det < 0.0 {
            (p0 + bisec, p0 - bisec)
        } else {
            (p0 - bisec, p0 + bisec)
        };

        let join = if curved {
            if dot < CURVE_ROUND_JOIN_DOT {
                Join::Round
            } else {
                Join::Miter
            }
        } else {
            self.style.join
        };

        if join == Join::Miter {
            if lh > self.miter_length_max {
                // Over the miter limit, cut the tip.
                let x = (lh - self.miter_length_max) * cos_half_alpha;
                let bisec_perp = bisec_n * x;
                let bisec = bisec_n_perp * self.miter_length_max;
                if det < 0.0 {
                    let p = p0 - bisec;
                    self.add(inside)?;
                    self.add(p - bisec_perp)?;
                    self.add(p + bisec_perp)?;
                    self.tri(idx, idx + 2, idx + 1)?;
                    self.tri(idx + 2, idx + 4, idx)?;
                    self.tri(idx, idx + 3, idx + 4)?;
                    return Ok(true);
                }
                let p = p0 + bisec;
                self.add(p - bisec_perp)?;
                self.add(inside)?;
                self.add(p + bisec_perp)?;
                self.tri(idx, idx + 2, idx + 1)?;
                self.tri(idx + 2, idx + 3, idx + 1)?;
                self.tri(idx + 1, idx + 3, idx + 4)?;
                return Ok(false);
            }
            if det < 0.0 {
                self.add(inside)?;
                self.add(outside)?;
            } else {
                self.add(outside)?;
                self.add(inside)?;
            }
            self.batch.add_rect_indices(idx)?;
            return Ok(false);
        }

        let vp = v0n.perp();
        let inner = if dot < 0.0 && shortened {
            inside
        } else if det < 0.0 {
            p0 + bisec
        } else {
            p0 - bisec
        };
        if det < 0.0 {
            self.add(inner)?;
            self.add(p0 - vp * hw)?;
        } else {
            self.add(p0 + vp * hw)?;
            self.add(inner)?;
        }

        if join == Join::Bevel {
            if det < 0.0 {
                self.tri(idx, idx + 2, idx + 1)?;
                self.tri(idx + 2, idx + 4, idx)?;
                self.tri(idx, idx + 3, idx + 4)?;
            } else {
                self.tri(idx, idx + 2, idx + 1)?;
                self.tri(idx + 2, idx + 3, idx + 1)?;
                self.tri(idx + 1, idx + 3, idx + 4)?;
            }
        } else {
            let step = self.arc_step();
            let mut a = vp.x.clamp(-1.0, 1.0).acos();
            if vp.y < 0.0 {
                a = -a;
            }
            if det < 0.0 {
                a += PI;
                let a1 = a + alpha;
                a -= step;
                while a > a1 {
                    self.add(self.arc_point(p0, a))?;
                    a -= step;
                }
            } else {
                let a1 = a + alpha;
                a += step;
                while a < a1 {
                    self.add(self.arc_point(p0, a))?;
                    a += step;
                }
            }
            let p0_idx = self.batch.next_index();
            self.tri(idx, idx + 2, idx + 1)?;
            if det < 0.0 {
                for p in idx + 2..p0_idx {
                    self.tri(p, p + 1, idx)?;
                }
                self.tri(p0_idx, p0_idx + 2, idx)?;
                self.tri(idx, p0_idx + 1, p0_idx + 2)?;
            } else {
                for p in idx + 2..p0_idx {
                    self.tri(p, p + 1, idx + 1)?;
                }
                self.tri(p0_idx, p0_idx + 1, idx + 1)?;
                self.tri(idx + 1, p0_idx + 1, p0_idx + 2)?;
            }
        }

        let vp = v1n.perp() * hw;
        if det < 0.0 {
            self.add(p0 - vp)?;
        } else {
            self.add(p0 + vp)?;
        }
        Ok(det < 0.0)
    }

    /// Emit a cap at `p0` for a line going in direction `n`.
    ///
    /// A start cap leaves a quad open towards the next vertex pair, an end cap closes the quad
    /// left open by the previous step.
    fn cap(&mut self, p0: Point, n: Point, start: bool) -> Result<()> {
        let cap = self.style.cap;
        let mut first = self.batch.next_index();
        let vhw = n * self.half_width;

        if start {
            let p0 = if cap == Cap::Square { p0 - vhw } else { p0 };
            let vhw = vhw.perp();
            if cap == Cap::Round {
                let step = self.arc_step();
                let mut a = n.x.clamp(-1.0, 1.0).acos() + FRAC_PI_2;
                if n.y < 0.0 {
                    a = PI - a;
                }
                let a1 = a + PI;
                a += step;
                while a < a1 {
                    self.add(self.arc_point(p0, a))?;
                    a += step;
                }
                let p0_idx = self.batch.next_index();
                for p in first..p0_idx {
                    self.tri(p0_idx + 1, p, p + 1)?;
                }
                first = p0_idx;
            }
            self.add(p0 + vhw)?;
            self.add(p0 - vhw)?;
            return self.batch.add_rect_indices(first);
        }

        let p0 = if cap == Cap::Square { p0 + vhw } else { p0 };
        let vhw = vhw.perp();
        self.add(p0 + vhw)?;
        self.add(p0 - vhw)?;
        if cap == Cap::Round {
            first = self.batch.next_index();
            let step = self.arc_step();
            let mut a = n.x.clamp(-1.0, 1.0).acos() + FRAC_PI_2;
            if n.y < 0.0 {
                a = PI - a;
            }
            let a1 = a - PI;
            a -= step;
            while a > a1 {
                self.add(self.arc_point(p0, a))?;
                a -= step;
            }
            let p0_idx = self.batch.next_index() - 1;
            for p in first - 1..p0_idx {
                self.tri(p + 1, p, first - 2)?;
            }
        }
        Ok(())
    }
}

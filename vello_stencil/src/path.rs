// Copyright 2025 the Vello Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Incremental path construction.
//!
//! Points of all sub-paths live in one flat array. Each finished sub-path is described by a
//! [`SubPath`] entry giving its point count and flags. Sub-paths containing curves are also
//! split into [`Segment`]s so strokes can treat flattened curves and straight runs differently.

use std::f32::consts::{FRAC_PI_2, FRAC_PI_3, PI, TAU};
use std::mem;

use log::trace;
use peniko::kurbo::Rect;

use crate::cache::GrowableArray;
use crate::config::ContextOptions;
use crate::flatten::{distance_tolerance, flatten_cubic};
use crate::math::{approx_eq, Matrix, Point};
use crate::{Error, Result};

/// Factor used to raise a quadratic Bézier to a cubic one.
const QUADRATIC_FACTOR: f32 = 2.0 / 3.0;

/// A run of consecutive points of a sub-path.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct Segment {
    /// Number of points in the run.
    pub len: u32,
    /// The run comes from a flattened curve or arc.
    pub curved: bool,
}

/// A finished sub-path.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SubPath {
    pub point_count: u32,
    pub closed: bool,
    /// Set by the convex shape helpers, enables the triangle fan fast path for fills.
    pub convex: bool,
    /// The sub-path contains curves and is described by [`segments`](Self::segments).
    pub curved: bool,
    /// Runs of straight and curved points, summing to [`point_count`](Self::point_count).
    ///
    /// Empty unless the sub-path contains curves.
    pub segments: Vec<Segment>,
}

impl SubPath {
    fn is_segmented(&self) -> bool {
        !self.segments.is_empty()
    }

    /// Iterate over the curve flag of every point, in order.
    pub(crate) fn point_flags(&self) -> impl Iterator<Item = bool> + '_ {
        self.segments
            .iter()
            .flat_map(|s| std::iter::repeat(s.curved).take(s.len as usize))
            .chain(std::iter::repeat(false))
    }
}

/// Angular step used to approximate an arc of `radius` under a transform of scale `scale`.
pub(crate) fn arc_step(radius: f32, scale: f32) -> f32 {
    let r = radius * scale.abs();
    if r < 30.0 {
        FRAC_PI_3.min(PI / r)
    } else {
        FRAC_PI_3.min(PI / (r * 0.4))
    }
}

/// Points and sub-paths of the path under construction.
#[derive(Debug)]
pub(crate) struct PathTable {
    points: GrowableArray<Point>,
    paths: GrowableArray<SubPath>,
    /// The open sub-path, its points are the tail of `points`.
    current: SubPath,
    /// Set while the first sub-path consists only of an arc started on an empty path.
    simple_convex: bool,
}

impl PathTable {
    pub(crate) fn new(options: &ContextOptions) -> Self {
        Self {
            points: GrowableArray::new("point", options.point_block, options.array_threshold),
            paths: GrowableArray::new("path", options.path_block, options.array_threshold),
            current: SubPath::default(),
            simple_convex: false,
        }
    }

    pub(crate) fn points(&self) -> &[Point] {
        &self.points
    }

    /// Finished sub-paths.
    pub(crate) fn paths(&self) -> &[SubPath] {
        &self.paths
    }

    /// Finished sub-paths along with their points.
    pub(crate) fn iter(&self) -> impl Iterator<Item = (&SubPath, &[Point])> + '_ {
        let mut start = 0;
        self.paths.iter().map(move |path| {
            let end = start + path.point_count as usize;
            let pts = &self.points[start..end];
            start = end;
            (path, pts)
        })
    }

    pub(crate) fn current_is_empty(&self) -> bool {
        self.current.point_count == 0
    }

    pub(crate) fn current_point(&self) -> Option<Point> {
        if self.current_is_empty() {
            None
        } else {
            self.points.last().copied()
        }
    }

    fn current_start(&self) -> usize {
        self.points.len() - self.current.point_count as usize
    }

    /// Drop the open sub-path and its points.
    fn abort_current(&mut self) {
        let start = self.current_start();
        self.points.truncate(start);
        self.current = SubPath::default();
    }

    pub(crate) fn clear(&mut self) {
        self.points.clear();
        self.paths.clear();
        self.current = SubPath::default();
        self.simple_convex = false;
    }

    pub(crate) fn add_point(&mut self, p: Point) -> Result<()> {
        if p.is_nan() {
            trace!("skipping NaN point");
            return Ok(());
        }
        if let Err(e) = self.points.push(p) {
            self.abort_current();
            return Err(e);
        }
        self.current.point_count += 1;
        if let Some(segment) = self.current.segments.last_mut() {
            segment.len += 1;
        }
        Ok(())
    }

    fn remove_last_point(&mut self) {
        if self.current.point_count == 0 {
            return;
        }
        self.points.pop();
        self.current.point_count -= 1;
        let segments = &mut self.current.segments;
        if segments.last().is_some_and(|s| s.len == 0) {
            segments.pop();
        }
        if let Some(last) = segments.last_mut() {
            last.len -= 1;
            if last.len == 0 {
                *last = Segment::default();
            } else if last.curved {
                segments.push(Segment::default());
            }
        }
    }

    fn set_curve_start(&mut self) {
        let segments = &mut self.current.segments;
        match segments.last() {
            Some(last) if last.len == 0 => {}
            Some(_) => segments.push(Segment::default()),
            None => {
                if self.current.point_count > 0 {
                    segments.push(Segment {
                        len: self.current.point_count,
                        curved: false,
                    });
                }
                segments.push(Segment::default());
            }
        }
    }

    fn set_curve_end(&mut self) {
        if let Some(last) = self.current.segments.last_mut() {
            last.curved = true;
        }
        self.current.segments.push(Segment::default());
    }

    /// Close the open sub-path entry, discarding it if it has fewer than two points.
    pub(crate) fn finish(&mut self) -> Result<()> {
        match self.current.point_count {
            0 => return Ok(()),
            1 => {
                self.abort_current();
                return Ok(());
            }
            _ => {}
        }
        if self.paths.is_empty() && self.simple_convex {
            self.current.convex = true;
        }
        if self.current.is_segmented() {
            self.current.curved = true;
            if self.current.segments.last().is_some_and(|s| s.len == 0) {
                self.current.segments.pop();
            }
        }
        trace!("path finished with {} points", self.current.point_count);
        let path = mem::take(&mut self.current);
        let point_count = path.point_count as usize;
        if let Err(e) = self.paths.push(path) {
            let len = self.points.len();
            self.points.truncate(len - point_count);
            return Err(e);
        }
        self.simple_convex = false;
        Ok(())
    }

    /// Flag the last finished sub-path as convex.
    fn mark_last_convex(&mut self) {
        if let Some(path) = self.paths.as_mut_slice().last_mut() {
            path.convex = true;
        }
    }

    pub(crate) fn close(&mut self) -> Result<()> {
        if self.current.closed || self.current.point_count < 3 {
            return Ok(());
        }
        let first = self.points[self.current_start()];
        if self.current_point() == Some(first) {
            if self.current.point_count < 4 {
                return Ok(());
            }
            self.remove_last_point();
        }
        self.current.closed = true;
        self.finish()
    }

    pub(crate) fn move_to(&mut self, p: Point) -> Result<()> {
        self.finish()?;
        self.add_point(p)
    }

    pub(crate) fn line_to(&mut self, p: Point) -> Result<()> {
        if self.current_point() == Some(p) {
            return Ok(());
        }
        self.add_point(p)?;
        self.simple_convex = false;
        Ok(())
    }

    pub(crate) fn rel_move_to(&mut self, d: Point) -> Result<()> {
        if self.current_is_empty() {
            self.add_point(Point::ZERO)?;
        }
        let cp = self.current_point().unwrap_or_default();
        self.finish()?;
        self.add_point(cp + d)
    }

    pub(crate) fn rel_line_to(&mut self, d: Point) -> Result<()> {
        if self.current_is_empty() {
            self.add_point(Point::ZERO)?;
        }
        let cp = self.current_point().unwrap_or_default();
        self.line_to(cp + d)
    }

    pub(crate) fn curve_to(&mut self, p1: Point, p2: Point, p3: Point, scale: f32) -> Result<()> {
        let same = |a: Point, b: Point| approx_eq(a.x, b.x) && approx_eq(a.y, b.y);
        if same(p1, p2) && same(p2, p3) {
            match self.current_point() {
                None => return Ok(()),
                Some(cp) if same(cp, p1) => return Ok(()),
                _ => {}
            }
        }
        self.simple_convex = false;
        self.set_curve_start();
        if self.current_is_empty() {
            self.add_point(p1)?;
        }
        let p0 = self.current_point().unwrap_or(p1);
        let mut flattened = Vec::new();
        flatten_cubic(distance_tolerance(scale), [p0, p1, p2, p3], &mut |p| {
            flattened.push(p);
        });
        self.points.ensure(flattened.len() + 1)?;
        for p in flattened {
            self.add_point(p)?;
        }
        self.add_point(p3)?;
        self.set_curve_end();
        Ok(())
    }

    pub(crate) fn rel_curve_to(&mut self, p1: Point, p2: Point, p3: Point, scale: f32) -> Result<()> {
        let cp = self.current_point().ok_or(Error::NoCurrentPoint)?;
        self.curve_to(cp + p1, cp + p2, cp + p3, scale)
    }

    pub(crate) fn quadratic_to(&mut self, p1: Point, p2: Point, scale: f32) -> Result<()> {
        let p0 = self.current_point().unwrap_or(p1);
        self.curve_to(
            p0 + (p1 - p0) * QUADRATIC_FACTOR,
            p2 + (p1 - p2) * QUADRATIC_FACTOR,
            p2,
            scale,
        )
    }

    pub(crate) fn rel_quadratic_to(&mut self, p1: Point, p2: Point, scale: f32) -> Result<()> {
        let cp = self.current_point().ok_or(Error::NoCurrentPoint)?;
        self.quadratic_to(cp + p1, cp + p2, scale)
    }

    /// Add the first point of an arc, either starting a new sub-path or joining the open one
    /// with a line.
    fn start_arc(&mut self, p: Point) -> Result<()> {
        if self.current_is_empty() {
            self.set_curve_start();
            self.add_point(p)?;
            self.simple_convex = self.paths.is_empty();
        } else {
            self.line_to(p)?;
            self.set_curve_start();
            self.simple_convex = false;
        }
        Ok(())
    }

    /// Circular arc of increasing angle from `a1` to `a2`.
    pub(crate) fn arc(&mut self, c: Point, radius: f32, a1: f32, mut a2: f32, scale: f32) -> Result<()> {
        while a2 < a1 {
            a2 += TAU;
        }
        if a2 - a1 > TAU {
            a2 = a1 + TAU;
        }
        let at = |a: f32| Point::new(a.cos() * radius + c.x, a.sin() * radius + c.y);
        let step = arc_step(radius, scale);

        self.start_arc(at(a1))?;
        if approx_eq(a2, a1) {
            return Ok(());
        }
        let mut a = a1 + step;
        while a < a2 {
            self.add_point(at(a))?;
            a += step;
        }
        if approx_eq(a2 - a1, TAU) {
            self.set_curve_end();
            return self.close();
        }
        self.add_point(at(a2))?;
        self.set_curve_end();
        Ok(())
    }

    /// Circular arc of decreasing angle from `a1` to `a2`.
    pub(crate) fn arc_negative(
        &mut self,
        c: Point,
        radius: f32,
        a1: f32,
        mut a2: f32,
        scale: f32,
    ) -> Result<()> {
        while a2 > a1 {
            a2 -= TAU;
        }
        if a1 - a2 > TAU {
            a2 = a1 - TAU;
        }
        let at = |a: f32| Point::new(a.cos() * radius + c.x, a.sin() * radius + c.y);
        let step = arc_step(radius, scale);

        self.start_arc(at(a1))?;
        if approx_eq(a2, a1) {
            return Ok(());
        }
        let mut a = a1 - step;
        while a > a2 {
            self.add_point(at(a))?;
            a -= step;
        }
        if approx_eq(a1 - a2, TAU) {
            self.set_curve_end();
            return self.close();
        }
        self.add_point(at(a2))?;
        self.set_curve_end();
        Ok(())
    }

    /// Elliptical arc from `p1` to `p2` in SVG endpoint parameterization.
    #[expect(clippy::too_many_arguments, reason = "mirrors the SVG arc command")]
    pub(crate) fn elliptic_arc(
        &mut self,
        p1: Point,
        p2: Point,
        large_arc: bool,
        counter_clockwise: bool,
        rx: f32,
        ry: f32,
        phi: f32,
        scale: f32,
    ) -> Result<()> {
        if rx == 0.0 || ry == 0.0 {
            if self.current_is_empty() {
                self.move_to(p1)?;
            }
            return self.line_to(p2);
        }
        let mut rx = rx.abs();
        let mut ry = ry.abs();
        let (sin_phi, cos_phi) = phi.sin_cos();

        // Midpoint in the ellipse frame.
        let h = (p1 - p2) * 0.5;
        let q = Point::new(cos_phi * h.x + sin_phi * h.y, -sin_phi * h.x + cos_phi * h.y);

        let lambda = (q.x * q.x) / (rx * rx) + (q.y * q.y) / (ry * ry);
        if lambda > 1.0 {
            let lambda = lambda.sqrt();
            rx *= lambda;
            ry *= lambda;
        }

        let (rx2, ry2) = (rx * rx, ry * ry);
        let num = rx2 * ry2 - rx2 * q.y * q.y - ry2 * q.x * q.x;
        let den = rx2 * q.y * q.y + ry2 * q.x * q.x;
        let mut cp = Point::new(rx * q.y / ry, -ry * q.x / rx) * (num / den).abs().sqrt();
        if large_arc == counter_clockwise {
            cp = -cp;
        }

        let rotate = |v: Point| Point::new(cos_phi * v.x - sin_phi * v.y, sin_phi * v.x + cos_phi * v.y);
        let center = rotate(cp) + (p1 + p2) * 0.5;

        let signed_angle = |u: Point, v: Point| {
            let mut a = (u.dot(v) / (v.length().abs() * u.length().abs())).acos();
            if a.is_nan() {
                a = PI;
            }
            if u.det(v) < 0.0 {
                -a
            } else {
                a
            }
        };
        let u = Point::new(1.0, 0.0);
        let v = Point::new((q.x - cp.x) / rx, (q.y - cp.y) / ry);
        let start = signed_angle(u, v);
        let w = Point::new((-q.x - cp.x) / rx, (-q.y - cp.y) / ry);
        let mut delta = signed_angle(v, w);
        if counter_clockwise {
            if delta < 0.0 {
                delta += TAU;
            }
        } else if delta > 0.0 {
            delta -= TAU;
        }
        let end = start + delta;
        let step = (arc_step(rx.min(ry), scale) * 0.1).min(PI).max(0.001);
        let at = |theta: f32| rotate(Point::new(rx * theta.cos(), ry * theta.sin())) + center;

        self.start_arc(at(start))?;
        let mut theta = start;
        if start < end {
            theta += step;
            while theta < end {
                self.add_point(at(theta))?;
                theta += step;
            }
        } else {
            theta -= step;
            while theta > end {
                self.add_point(at(theta))?;
                theta -= step;
            }
        }
        self.add_point(at(end))?;
        self.set_curve_end();
        Ok(())
    }

    pub(crate) fn rectangle(&mut self, x: f32, y: f32, w: f32, h: f32) -> Result<()> {
        self.finish()?;
        if w <= 0.0 || h <= 0.0 {
            return Err(Error::InvalidRect);
        }
        self.points.ensure(4)?;
        self.add_point(Point::new(x, y))?;
        self.add_point(Point::new(x + w, y))?;
        self.add_point(Point::new(x + w, y + h))?;
        self.add_point(Point::new(x, y + h))?;
        self.current.closed = true;
        self.current.convex = true;
        self.finish()
    }

    pub(crate) fn rounded_rectangle(
        &mut self,
        x: f32,
        y: f32,
        w: f32,
        h: f32,
        radius: f32,
        scale: f32,
    ) -> Result<()> {
        self.finish()?;
        if w <= 0.0 || h <= 0.0 {
            return Err(Error::InvalidRect);
        }
        let r = radius.min(w / 2.0).min(h / 2.0);
        self.move_to(Point::new(x, y + r))?;
        self.arc(Point::new(x + r, y + r), r, PI, -FRAC_PI_2, scale)?;
        self.line_to(Point::new(x + w - r, y))?;
        self.arc(Point::new(x + w - r, y + r), r, -FRAC_PI_2, 0.0, scale)?;
        self.line_to(Point::new(x + w, y + h - r))?;
        self.arc(Point::new(x + w - r, y + h - r), r, 0.0, FRAC_PI_2, scale)?;
        self.line_to(Point::new(x + r, y + h))?;
        self.arc(Point::new(x + r, y + h - r), r, FRAC_PI_2, PI, scale)?;
        self.line_to(Point::new(x, y + r))?;
        self.close()?;
        self.mark_last_convex();
        Ok(())
    }

    /// Rounded rectangle with elliptic corners of radii `rx` and `ry`.
    #[expect(clippy::too_many_arguments, reason = "rectangle plus radii")]
    pub(crate) fn rounded_rectangle_xy(
        &mut self,
        x: f32,
        y: f32,
        w: f32,
        h: f32,
        rx: f32,
        ry: f32,
        scale: f32,
    ) -> Result<()> {
        self.finish()?;
        if w <= 0.0 || h <= 0.0 {
            return Err(Error::InvalidRect);
        }
        let rx = rx.min(w / 2.0);
        let ry = ry.min(h / 2.0);
        let corners = [
            (Point::new(x + w - rx, y), Point::new(x + w, y + ry)),
            (Point::new(x + w, y + h - ry), Point::new(x + w - rx, y + h)),
            (Point::new(x + rx, y + h), Point::new(x, y + h - ry)),
            (Point::new(x, y + ry), Point::new(x + rx, y)),
        ];
        self.move_to(Point::new(x + rx, y))?;
        for (line_end, arc_end) in corners {
            self.line_to(line_end)?;
            let from = self.current_point().unwrap_or(line_end);
            self.elliptic_arc(from, arc_end, false, true, rx, ry, 0.0, scale)?;
        }
        self.close()?;
        self.mark_last_convex();
        Ok(())
    }

    /// Ellipse approximated by two cubic Béziers.
    pub(crate) fn ellipse(
        &mut self,
        radius_x: f32,
        radius_y: f32,
        c: Point,
        rotation: f32,
        scale: f32,
    ) -> Result<()> {
        let width_two_thirds = radius_x * 4.0 / 3.0;
        let (sin_r, cos_r) = rotation.sin_cos();
        let d1 = Point::new(sin_r * radius_y, cos_r * radius_y);
        let d2 = Point::new(cos_r * width_two_thirds, sin_r * width_two_thirds);

        let top_center = Point::new(c.x - d1.x, c.y + d1.y);
        let bottom_center = Point::new(c.x + d1.x, c.y - d1.y);

        self.finish()?;
        self.add_point(bottom_center)?;
        self.curve_to(bottom_center + d2, top_center + d2, top_center, scale)?;
        self.curve_to(top_center - d2, bottom_center - d2, bottom_center, scale)?;
        // The second curve ends on the first point.
        if self.current.point_count >= 4 {
            self.remove_last_point();
        }
        self.current.closed = true;
        self.current.convex = true;
        self.finish()
    }

    /// Bounds of the finished sub-paths, optionally mapped through `matrix`.
    pub(crate) fn extents(&self, matrix: Option<&Matrix>) -> Option<Rect> {
        let count: usize = self.paths.iter().map(|p| p.point_count as usize).sum();
        if count == 0 {
            return None;
        }
        let (mut min, mut max) = (Point::new(f32::MAX, f32::MAX), Point::new(f32::MIN, f32::MIN));
        for &p in &self.points[..count] {
            let p = matrix.map_or(p, |m| m.transform_point(p));
            min = Point::new(min.x.min(p.x), min.y.min(p.y));
            max = Point::new(max.x.max(p.x), max.y.max(p.y));
        }
        Some(Rect::new(
            min.x as f64,
            min.y as f64,
            max.x as f64,
            max.y as f64,
        ))
    }
}

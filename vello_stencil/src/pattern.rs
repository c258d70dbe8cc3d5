// Copyright 2025 the Vello Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Paint sources other than solid colors.
//!
//! A [`Pattern`] is configured through `&mut self` methods and then shared with one or more
//! contexts as an `Arc<Pattern>`. A context keeps its own reference for as long as the pattern
//! is the current source or is held by a saved state.

use std::num::NonZeroU64;
use std::sync::atomic::{AtomicU64, Ordering};

use smallvec::SmallVec;

use crate::device::{GradientUniform, MAX_GRADIENT_STOPS};
use crate::math::{Matrix, Point};
use crate::{Error, Result};

/// Value of [`PushConstants::pattern_type`](crate::device::PushConstants::pattern_type) for
/// solid colors.
pub const PATTERN_SOLID: u32 = 0;
pub const PATTERN_SURFACE: u32 = 1;
pub const PATTERN_LINEAR: u32 = 2;
pub const PATTERN_RADIAL: u32 = 3;

/// Identifier of a device image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SurfaceId(pub NonZeroU64);

impl SurfaceId {
    pub fn next() -> Self {
        static ID_COUNTER: AtomicU64 = AtomicU64::new(1);
        let id = ID_COUNTER.fetch_add(1, Ordering::Relaxed);
        Self(NonZeroU64::new(id).unwrap_or(NonZeroU64::MIN))
    }
}

/// An image owned by the device which can be sampled as a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Surface {
    pub id: SurfaceId,
    pub width: u32,
    pub height: u32,
}

impl Surface {
    /// Describe a device image of the given extent with a fresh identifier.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            id: SurfaceId::next(),
            width,
            height,
        }
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(Error::InvalidSurface);
        }
        Ok(())
    }
}

/// How a source is sampled outside of its bounds.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum Extend {
    /// Transparent outside.
    #[default]
    None,
    Repeat,
    Reflect,
    /// The edge pixels are extended.
    Pad,
}

impl From<peniko::Extend> for Extend {
    fn from(extend: peniko::Extend) -> Self {
        match extend {
            peniko::Extend::Pad => Self::Pad,
            peniko::Extend::Repeat => Self::Repeat,
            peniko::Extend::Reflect => Self::Reflect,
        }
    }
}

/// Sampling filter of surface sources.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum Filter {
    Fast,
    #[default]
    Good,
    Best,
    Nearest,
    Bilinear,
    Gaussian,
}

impl Filter {
    /// Whether the filter samples with linear interpolation.
    pub fn is_linear(self) -> bool {
        matches!(self, Self::Bilinear | Self::Best)
    }
}

/// A gradient color stop.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct ColorStop {
    pub offset: f32,
    /// Unpremultiplied RGBA.
    pub color: [f32; 4],
}

/// The geometry of a pattern.
#[derive(Debug, Clone, PartialEq)]
pub enum PatternKind {
    Surface(Surface),
    Linear {
        start: Point,
        end: Point,
    },
    /// Two circle radial gradient, stored after the focal correction applied by
    /// [`Pattern::radial`].
    Radial {
        start_center: Point,
        start_radius: f32,
        end_center: Point,
        end_radius: f32,
    },
}

impl PatternKind {
    /// The `PATTERN_*` value identifying this kind in push constants.
    pub fn pattern_type(&self) -> u32 {
        match self {
            Self::Surface(_) => PATTERN_SURFACE,
            Self::Linear { .. } => PATTERN_LINEAR,
            Self::Radial { .. } => PATTERN_RADIAL,
        }
    }
}

/// A surface or gradient source.
#[derive(Debug, Clone, PartialEq)]
pub struct Pattern {
    kind: PatternKind,
    extend: Extend,
    filter: Filter,
    matrix: Option<Matrix>,
    stops: SmallVec<[ColorStop; 4]>,
}

impl Pattern {
    fn with_kind(kind: PatternKind) -> Self {
        Self {
            kind,
            extend: Extend::None,
            filter: Filter::default(),
            matrix: None,
            stops: SmallVec::new(),
        }
    }

    /// A pattern sampling `surface`.
    pub fn for_surface(surface: Surface) -> Self {
        Self::with_kind(PatternKind::Surface(surface))
    }

    /// A linear gradient from `(x0, y0)` to `(x1, y1)`.
    pub fn linear(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        Self::with_kind(PatternKind::Linear {
            start: Point::new(x0, y0),
            end: Point::new(x1, y1),
        })
    }

    /// A radial gradient between the circles `(cx0, cy0, radius0)` and `(cx1, cy1, radius1)`.
    ///
    /// The inner circle is shrunk and pulled towards the outer center so that it stays at
    /// least one unit inside the outer circle.
    pub fn radial(cx0: f32, cy0: f32, radius0: f32, cx1: f32, cy1: f32, radius1: f32) -> Self {
        let mut c0 = Point::new(cx0, cy0);
        let c1 = Point::new(cx1, cy1);
        let radius0 = radius0.min(radius1 - 1.0);
        let u = c0 - c1;
        let len = u.length();
        if len + radius0 + 1.0 >= radius1 && len > 0.0 {
            c0 = c1 + u * ((radius1 - radius0 - 1.0) / len);
        }
        Self::with_kind(PatternKind::Radial {
            start_center: c0,
            start_radius: radius0,
            end_center: c1,
            end_radius: radius1,
        })
    }

    pub fn kind(&self) -> &PatternKind {
        &self.kind
    }

    pub fn pattern_type(&self) -> u32 {
        self.kind.pattern_type()
    }

    pub fn add_color_stop(&mut self, offset: f32, r: f32, g: f32, b: f32, a: f32) -> Result<()> {
        if matches!(self.kind, PatternKind::Surface(_)) {
            return Err(Error::PatternTypeMismatch);
        }
        if self.stops.len() >= MAX_GRADIENT_STOPS {
            return Err(Error::InvalidIndex);
        }
        self.stops.push(ColorStop {
            offset,
            color: [r, g, b, a],
        });
        Ok(())
    }

    pub fn color_stop_count(&self) -> Result<usize> {
        match self.kind {
            PatternKind::Surface(_) => Err(Error::PatternTypeMismatch),
            _ => Ok(self.stops.len()),
        }
    }

    /// Offset and color of the stop at `index`.
    pub fn color_stop_rgba(&self, index: usize) -> Result<ColorStop> {
        if matches!(self.kind, PatternKind::Surface(_)) {
            return Err(Error::PatternTypeMismatch);
        }
        self.stops.get(index).copied().ok_or(Error::InvalidIndex)
    }

    pub fn set_extend(&mut self, extend: Extend) {
        self.extend = extend;
    }

    pub fn extend(&self) -> Extend {
        self.extend
    }

    pub fn set_filter(&mut self, filter: Filter) {
        self.filter = filter;
    }

    pub fn filter(&self) -> Filter {
        self.filter
    }

    /// Set the transform from user space to pattern space.
    pub fn set_matrix(&mut self, matrix: Matrix) {
        self.matrix = Some(matrix);
    }

    /// The pattern matrix, identity if none was set.
    pub fn matrix(&self) -> Matrix {
        self.matrix.unwrap_or_default()
    }

    /// End points of a linear gradient.
    pub fn linear_points(&self) -> Result<(Point, Point)> {
        match self.kind {
            PatternKind::Linear { start, end } => Ok((start, end)),
            _ => Err(Error::PatternTypeMismatch),
        }
    }

    /// Circles of a radial gradient, as `(center, radius)` pairs.
    pub fn radial_circles(&self) -> Result<((Point, f32), (Point, f32))> {
        match self.kind {
            PatternKind::Radial {
                start_center,
                start_radius,
                end_center,
                end_radius,
            } => Ok(((start_center, start_radius), (end_center, end_radius))),
            _ => Err(Error::PatternTypeMismatch),
        }
    }

    /// Gradient parameters mapped to device space with `ctm`.
    pub(crate) fn gradient_uniform(&self, ctm: &Matrix) -> Result<GradientUniform> {
        if self.stops.len() < 2 {
            return Err(Error::PatternInvalidGradient);
        }
        let pattern_inv = self
            .matrix
            .map(|m| m.invert().unwrap_or_default())
            .unwrap_or_default();
        let to_device = *ctm * pattern_inv;
        let mut uniform: GradientUniform = bytemuck::Zeroable::zeroed();
        match self.kind {
            PatternKind::Linear { start, end } => {
                let p0 = to_device.transform_point(start);
                let p1 = to_device.transform_point(end);
                uniform.cp[0] = [p0.x, p0.y, p1.x, p1.y];
            }
            PatternKind::Radial {
                start_center,
                start_radius,
                end_center,
                end_radius,
            } => {
                let c0 = to_device.transform_point(start_center);
                let c1 = to_device.transform_point(end_center);
                let r0 = to_device.transform_distance(Point::new(start_radius, 0.0)).x;
                let r1 = to_device.transform_distance(Point::new(end_radius, 0.0)).x;
                uniform.cp[0] = [c0.x, c0.y, r0, 0.0];
                uniform.cp[1] = [c1.x, c1.y, r1, 0.0];
            }
            PatternKind::Surface(_) => return Err(Error::PatternTypeMismatch),
        }
        for (i, stop) in self.stops.iter().enumerate() {
            uniform.colors[i] = stop.color;
            uniform.stops[i] = [stop.offset, 0.0, 0.0, 0.0];
        }
        uniform.count = self.stops.len() as u32;
        Ok(uniform)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stops_require_a_gradient() {
        let mut pat = Pattern::for_surface(Surface::new(4, 4));
        assert_eq!(
            pat.add_color_stop(0.0, 1.0, 0.0, 0.0, 1.0),
            Err(Error::PatternTypeMismatch)
        );
        assert_eq!(pat.color_stop_count(), Err(Error::PatternTypeMismatch));
        assert_eq!(pat.linear_points(), Err(Error::PatternTypeMismatch));
    }

    #[test]
    fn color_stop_getters() {
        let mut pat = Pattern::linear(0.0, 0.0, 100.0, 0.0);
        pat.add_color_stop(0.0, 1.0, 0.0, 0.0, 1.0).unwrap();
        pat.add_color_stop(1.0, 0.0, 0.0, 1.0, 0.5).unwrap();
        assert_eq!(pat.color_stop_count(), Ok(2));
        let stop = pat.color_stop_rgba(1).unwrap();
        assert_eq!(stop.offset, 1.0);
        assert_eq!(stop.color, [0.0, 0.0, 1.0, 0.5]);
        assert_eq!(pat.color_stop_rgba(2), Err(Error::InvalidIndex));
    }

    #[test]
    fn stop_count_is_bounded() {
        let mut pat = Pattern::linear(0.0, 0.0, 1.0, 0.0);
        for i in 0..MAX_GRADIENT_STOPS {
            pat.add_color_stop(i as f32 / 16.0, 0.0, 0.0, 0.0, 1.0).unwrap();
        }
        assert_eq!(
            pat.add_color_stop(1.0, 0.0, 0.0, 0.0, 1.0),
            Err(Error::InvalidIndex)
        );
    }

    #[test]
    fn radial_focus_is_pulled_inside() {
        let pat = Pattern::radial(100.0, 0.0, 5.0, 0.0, 0.0, 50.0);
        let ((c0, r0), (c1, r1)) = pat.radial_circles().unwrap();
        assert_eq!((c1, r1), (Point::ZERO, 50.0));
        assert_eq!(r0, 5.0);
        assert!((c0.x - 44.0).abs() < 1e-4 && c0.y == 0.0);

        let pat = Pattern::radial(0.0, 0.0, 60.0, 0.0, 0.0, 50.0);
        let ((_, r0), _) = pat.radial_circles().unwrap();
        assert_eq!(r0, 49.0);
    }

    #[test]
    fn gradient_needs_two_stops() {
        let mut pat = Pattern::linear(0.0, 0.0, 10.0, 0.0);
        pat.add_color_stop(0.0, 1.0, 1.0, 1.0, 1.0).unwrap();
        assert_eq!(
            pat.gradient_uniform(&Matrix::IDENTITY),
            Err(Error::PatternInvalidGradient)
        );
    }

    #[test]
    fn gradient_points_follow_the_transform() {
        let mut pat = Pattern::linear(0.0, 0.0, 10.0, 0.0);
        pat.add_color_stop(0.0, 1.0, 1.0, 1.0, 1.0).unwrap();
        pat.add_color_stop(1.0, 0.0, 0.0, 0.0, 1.0).unwrap();
        pat.set_matrix(Matrix::translation(-5.0, 0.0));
        let uniform = pat.gradient_uniform(&Matrix::scaling(2.0, 2.0)).unwrap();
        assert_eq!(uniform.cp[0], [10.0, 0.0, 30.0, 0.0]);
        assert_eq!(uniform.count, 2);
        assert_eq!(uniform.stops[1][0], 1.0);
    }
}

// Copyright 2025 the Vello Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Single precision points and affine matrices.

use std::ops::{Add, Mul, Neg, Sub};

use bytemuck::{Pod, Zeroable};
use peniko::kurbo;

use crate::{Error, Result};

/// Two floats compare equal when they differ by at most [`f32::EPSILON`].
#[inline]
pub(crate) fn approx_eq(a: f32, b: f32) -> bool {
    (a - b).abs() <= f32::EPSILON
}

/// A point, or a vector, in single precision.
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct Point {
    /// The x coordinate of the point.
    pub x: f32,
    /// The y coordinate of the point.
    pub y: f32,
}

impl Point {
    /// The point `(0, 0)`.
    pub const ZERO: Self = Self::new(0., 0.);

    /// Create a new point.
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Euclidean length of the vector.
    #[inline]
    pub fn length(self) -> f32 {
        (self.x * self.x + self.y * self.y).sqrt()
    }

    /// The vector scaled to unit length.
    ///
    /// A zero vector produces NaN components.
    #[inline]
    pub fn normalize(self) -> Self {
        let len = self.length();
        Self::new(self.x / len, self.y / len)
    }

    /// The vector rotated by a quarter turn, `(y, -x)`.
    #[inline]
    pub fn perp(self) -> Self {
        Self::new(self.y, -self.x)
    }

    #[inline]
    pub fn dot(self, other: Self) -> f32 {
        self.x * other.x + self.y * other.y
    }

    /// The z component of the cross product.
    #[inline]
    pub fn det(self, other: Self) -> f32 {
        self.x * other.y - self.y * other.x
    }

    #[inline]
    pub fn is_nan(self) -> bool {
        self.x.is_nan() || self.y.is_nan()
    }

    /// Unit direction of the line going from `a` to `b`.
    #[inline]
    pub fn line_normal(a: Self, b: Self) -> Self {
        (b - a).normalize()
    }
}

impl Add for Point {
    type Output = Self;

    #[inline]
    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Point {
    type Output = Self;

    #[inline]
    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Mul<f32> for Point {
    type Output = Self;

    #[inline]
    fn mul(self, rhs: f32) -> Self {
        Self::new(self.x * rhs, self.y * rhs)
    }
}

impl Neg for Point {
    type Output = Self;

    #[inline]
    fn neg(self) -> Self {
        Self::new(-self.x, -self.y)
    }
}

/// Affine transformation matrix.
///
/// A point is mapped as `x' = xx * x + xy * y + x0` and `y' = yx * x + yy * y + y0`.
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct Matrix {
    pub xx: f32,
    pub yx: f32,
    pub xy: f32,
    pub yy: f32,
    pub x0: f32,
    pub y0: f32,
}

impl Default for Matrix {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Matrix {
    /// Identity transform.
    pub const IDENTITY: Self = Self::new(1.0, 0.0, 0.0, 1.0, 0.0, 0.0);

    pub const fn new(xx: f32, yx: f32, xy: f32, yy: f32, x0: f32, y0: f32) -> Self {
        Self {
            xx,
            yx,
            xy,
            yy,
            x0,
            y0,
        }
    }

    pub const fn translation(tx: f32, ty: f32) -> Self {
        Self::new(1.0, 0.0, 0.0, 1.0, tx, ty)
    }

    pub const fn scaling(sx: f32, sy: f32) -> Self {
        Self::new(sx, 0.0, 0.0, sy, 0.0, 0.0)
    }

    /// Rotation by `radians`, clockwise in a y-down coordinate system.
    pub fn rotation(radians: f32) -> Self {
        let (s, c) = radians.sin_cos();
        Self::new(c, s, -s, c, 0.0, 0.0)
    }

    /// This matrix with a translation applied before it.
    #[must_use]
    pub fn pre_translate(&self, tx: f32, ty: f32) -> Self {
        *self * Self::translation(tx, ty)
    }

    /// This matrix with a scale applied before it.
    #[must_use]
    pub fn pre_scale(&self, sx: f32, sy: f32) -> Self {
        *self * Self::scaling(sx, sy)
    }

    /// This matrix with a rotation applied before it.
    #[must_use]
    pub fn pre_rotate(&self, radians: f32) -> Self {
        *self * Self::rotation(radians)
    }

    #[inline]
    pub fn transform_point(&self, p: Point) -> Point {
        Point::new(
            self.xx * p.x + self.xy * p.y + self.x0,
            self.yx * p.x + self.yy * p.y + self.y0,
        )
    }

    /// Transform a vector, ignoring the translation.
    #[inline]
    pub fn transform_distance(&self, d: Point) -> Point {
        Point::new(
            self.xx * d.x + self.xy * d.y,
            self.yx * d.x + self.yy * d.y,
        )
    }

    /// Length of the images of the unit axes.
    pub fn scale_factors(&self) -> (f32, f32) {
        let sx = (self.xx * self.xx + self.xy * self.xy).sqrt();
        let sy = (self.yx * self.yx + self.yy * self.yy).sqrt();
        (sx, sy)
    }

    /// The larger of the two [scale factors](Self::scale_factors).
    pub fn max_scale(&self) -> f32 {
        let (sx, sy) = self.scale_factors();
        sx.max(sy)
    }

    pub fn determinant(&self) -> f32 {
        self.xx * self.yy - self.yx * self.xy
    }

    /// Compute the inverse transform.
    ///
    /// Fails with [`Error::InvalidMatrix`] if the matrix is singular.
    pub fn invert(&self) -> Result<Self> {
        let mut m = *self;
        // Pure scale and translation.
        if m.xy == 0.0 && m.yx == 0.0 {
            m.x0 = -m.x0;
            m.y0 = -m.y0;
            if m.xx != 1.0 {
                if m.xx == 0.0 {
                    return Err(Error::InvalidMatrix);
                }
                m.xx = 1.0 / m.xx;
                m.x0 *= m.xx;
            }
            if m.yy != 1.0 {
                if m.yy == 0.0 {
                    return Err(Error::InvalidMatrix);
                }
                m.yy = 1.0 / m.yy;
                m.y0 *= m.yy;
            }
            return Ok(m);
        }
        let det = m.determinant();
        if !det.is_finite() || det == 0.0 {
            return Err(Error::InvalidMatrix);
        }
        let inv = 1.0 / det;
        Ok(Self::new(
            m.yy * inv,
            -m.yx * inv,
            -m.xy * inv,
            m.xx * inv,
            (m.xy * m.y0 - m.yy * m.x0) * inv,
            (m.yx * m.x0 - m.xx * m.y0) * inv,
        ))
    }

    /// Creates a matrix from a kurbo affine transform.
    pub fn from_kurbo(transform: &kurbo::Affine) -> Self {
        let c = transform.as_coeffs().map(|x| x as f32);
        Self::new(c[0], c[1], c[2], c[3], c[4], c[5])
    }

    /// Converts the matrix to a kurbo affine transform.
    pub fn to_kurbo(&self) -> kurbo::Affine {
        kurbo::Affine::new(
            [self.xx, self.yx, self.xy, self.yy, self.x0, self.y0].map(|x| x as f64),
        )
    }
}

/// `a * b` applies `b` first, then `a`.
impl Mul for Matrix {
    type Output = Self;

    #[inline]
    fn mul(self, other: Self) -> Self {
        Self {
            xx: self.xx * other.xx + self.xy * other.yx,
            yx: self.yx * other.xx + self.yy * other.yx,
            xy: self.xx * other.xy + self.xy * other.yy,
            yy: self.yx * other.xy + self.yy * other.yy,
            x0: self.xx * other.x0 + self.xy * other.y0 + self.x0,
            y0: self.yx * other.x0 + self.yy * other.y0 + self.y0,
        }
    }
}

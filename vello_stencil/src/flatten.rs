// Copyright 2025 the Vello Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Adaptive subdivision of cubic Béziers into polylines.

use std::f32::consts::{PI, TAU};

use log::warn;

use crate::math::Point;

/// Subdivision depth after which a curve is truncated.
pub const CURVE_RECURSION_LIMIT: u32 = 100;
/// Below this distance control points count as lying on the chord.
pub const CURVE_COLLINEARITY_EPSILON: f32 = 1.7;
/// Sum of tangent angle changes below which a span is flat enough.
pub const ANGLE_TOLERANCE: f32 = 0.01;
/// Tangent angle change above which a control point is emitted as a cusp.
pub const CUSP_LIMIT: f32 = 0.01;
/// An [`ANGLE_TOLERANCE`] below this value disables the angle tests.
pub const ANGLE_TOLERANCE_EPSILON: f32 = 0.001;

/// Squared distance tolerance for a curve drawn under a transform of scale `scale`.
pub(crate) fn distance_tolerance(scale: f32) -> f32 {
    (0.25 / scale).abs()
}

/// Flatten the cubic Bézier `p`, calling `sink` for every point strictly after `p[0]`
/// and before `p[3]`, in curve order.
///
/// The end points themselves are left to the caller.
pub(crate) fn flatten_cubic(tolerance: f32, p: [Point; 4], sink: &mut impl FnMut(Point)) {
    recursive_bezier(tolerance, p, 0, sink);
}

fn angle_diff(a: f32, b: f32) -> f32 {
    let d = (a - b).abs();
    if d >= PI {
        TAU - d
    } else {
        d
    }
}

fn angle(from: Point, to: Point) -> f32 {
    (to.y - from.y).atan2(to.x - from.x)
}

fn recursive_bezier(tolerance: f32, p: [Point; 4], level: u32, sink: &mut impl FnMut(Point)) {
    if level > CURVE_RECURSION_LIMIT {
        warn!("curve subdivision reached its depth limit, truncating");
        return;
    }
    let [p1, p2, p3, p4] = p;
    let mid = |a: Point, b: Point| (a + b) * 0.5;
    let p12 = mid(p1, p2);
    let p23 = mid(p2, p3);
    let p34 = mid(p3, p4);
    let p123 = mid(p12, p23);
    let p234 = mid(p23, p34);
    let p1234 = mid(p123, p234);

    // The first level always subdivides.
    if level > 0 {
        let d = p4 - p1;
        let chord_sq = d.x * d.x + d.y * d.y;
        let d2 = (p2 - p4).det(d).abs();
        let d3 = (p3 - p4).det(d).abs();

        match (
            d2 > CURVE_COLLINEARITY_EPSILON,
            d3 > CURVE_COLLINEARITY_EPSILON,
        ) {
            (true, true) => {
                if (d2 + d3) * (d2 + d3) <= chord_sq * tolerance {
                    if ANGLE_TOLERANCE < ANGLE_TOLERANCE_EPSILON {
                        sink(p1234);
                        return;
                    }
                    let a23 = angle(p2, p3);
                    let da1 = angle_diff(a23, angle(p1, p2));
                    let da2 = angle_diff(angle(p3, p4), a23);
                    if da1 + da2 < ANGLE_TOLERANCE {
                        sink(p1234);
                        return;
                    }
                    if da1 > CUSP_LIMIT {
                        sink(p2);
                        return;
                    }
                    if da2 > CUSP_LIMIT {
                        sink(p3);
                        return;
                    }
                }
            }
            // p1, p3 and p4 are collinear.
            (true, false) => {
                if d2 * d2 <= tolerance * chord_sq {
                    if ANGLE_TOLERANCE < ANGLE_TOLERANCE_EPSILON {
                        sink(p1234);
                        return;
                    }
                    let da1 = angle_diff(angle(p2, p3), angle(p1, p2));
                    if da1 < ANGLE_TOLERANCE {
                        sink(p2);
                        sink(p3);
                        return;
                    }
                    if da1 > CUSP_LIMIT {
                        sink(p2);
                        return;
                    }
                }
            }
            // p1, p2 and p4 are collinear.
            (false, true) => {
                if d3 * d3 <= tolerance * chord_sq {
                    if ANGLE_TOLERANCE < ANGLE_TOLERANCE_EPSILON {
                        sink(p1234);
                        return;
                    }
                    let da1 = angle_diff(angle(p3, p4), angle(p2, p3));
                    if da1 < ANGLE_TOLERANCE {
                        sink(p2);
                        sink(p3);
                        return;
                    }
                    if da1 > CUSP_LIMIT {
                        sink(p3);
                        return;
                    }
                }
            }
            (false, false) => {
                let dm = p1234 - mid(p1, p4);
                if dm.x * dm.x + dm.y * dm.y <= tolerance {
                    sink(p1234);
                    return;
                }
            }
        }
    }

    recursive_bezier(tolerance, [p1, p12, p123, p1234], level + 1, sink);
    recursive_bezier(tolerance, [p1234, p234, p34, p4], level + 1, sink);
}

// Copyright 2025 the Vello Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use std::f32::consts::TAU;

use vello_stencil::kurbo::Rect;
use vello_stencil::{Error, Point};

use crate::util::{recording_ctx, sim_ctx};

fn assert_near(p: Point, x: f32, y: f32) {
    assert!(
        (p.x - x).abs() < 1e-3 && (p.y - y).abs() < 1e-3,
        "{p:?} is not near ({x}, {y})"
    );
}

#[test]
fn current_point_follows_the_path() {
    let mut ctx = recording_ctx(64, 64);
    assert!(!ctx.has_current_point());
    assert_eq!(ctx.current_point(), Point::ZERO);
    ctx.move_to(10.0, 20.0);
    assert!(ctx.has_current_point());
    assert_eq!(ctx.current_point(), Point::new(10.0, 20.0));
    ctx.line_to(30.0, 20.0);
    ctx.curve_to(35.0, 25.0, 40.0, 30.0, 45.0, 45.0);
    assert_near(ctx.current_point(), 45.0, 45.0);
    ctx.quadratic_to(50.0, 40.0, 60.0, 50.0);
    assert_near(ctx.current_point(), 60.0, 50.0);
    ctx.new_path();
    assert!(!ctx.has_current_point());
    assert!(ctx.status().is_ok());
}

#[test]
fn relative_operations_start_at_the_origin() {
    let mut ctx = recording_ctx(64, 64);
    ctx.rel_move_to(5.0, 5.0);
    assert_eq!(ctx.current_point(), Point::new(5.0, 5.0));
    ctx.rel_line_to(10.0, 0.0);
    assert_eq!(ctx.current_point(), Point::new(15.0, 5.0));
    ctx.rel_curve_to(1.0, 1.0, 2.0, 2.0, 5.0, 10.0);
    assert_near(ctx.current_point(), 20.0, 15.0);
    ctx.rel_quadratic_to(2.0, 0.0, 4.0, 4.0);
    assert_near(ctx.current_point(), 24.0, 19.0);
    assert!(ctx.status().is_ok());
}

#[test]
fn relative_curve_needs_a_current_point() {
    let mut ctx = recording_ctx(64, 64);
    ctx.rel_quadratic_to(1.0, 1.0, 2.0, 2.0);
    assert_eq!(ctx.status(), Err(Error::NoCurrentPoint));
}

#[test]
fn close_path_ends_the_sub_path() {
    let mut ctx = recording_ctx(64, 64);
    ctx.move_to(10.0, 10.0);
    ctx.line_to(20.0, 10.0);
    ctx.line_to(20.0, 20.0);
    ctx.close_path();
    assert!(!ctx.has_current_point());
}

#[test]
fn extents_are_in_user_space() {
    let mut ctx = recording_ctx(64, 64);
    assert_eq!(ctx.path_extents(), Rect::ZERO);
    ctx.scale(2.0, 2.0);
    ctx.rectangle(10.0, 20.0, 30.0, 40.0).unwrap();
    assert_eq!(ctx.path_extents(), Rect::new(10.0, 20.0, 40.0, 60.0));
    ctx.move_to(0.0, 5.0);
    ctx.line_to(50.0, 5.0);
    assert_eq!(ctx.path_extents(), Rect::new(0.0, 5.0, 50.0, 60.0));
}

#[test]
fn degenerate_rectangle_is_rejected_without_failing() {
    let mut ctx = recording_ctx(64, 64);
    assert_eq!(ctx.rectangle(0.0, 0.0, 0.0, 10.0), Err(Error::InvalidRect));
    assert_eq!(
        ctx.rounded_rectangle(0.0, 0.0, 10.0, 0.0, 2.0),
        Err(Error::InvalidRect)
    );
    assert!(ctx.status().is_ok());
    assert_eq!(ctx.path_extents(), Rect::ZERO);
}

#[test]
fn elliptic_arc_ends_at_its_target() {
    let mut ctx = recording_ctx(128, 128);
    ctx.move_to(10.0, 50.0);
    ctx.elliptic_arc_to(90.0, 50.0, false, true, 40.0, 40.0, 0.0);
    assert_near(ctx.current_point(), 90.0, 50.0);
    ctx.rel_elliptic_arc_to(-20.0, 20.0, false, false, 20.0, 20.0, 0.0);
    assert_near(ctx.current_point(), 70.0, 70.0);
    assert!(ctx.status().is_ok());
}

#[test]
fn filled_circle() {
    let mut ctx = sim_ctx(100, 100);
    ctx.arc(50.0, 50.0, 30.0, 0.0, TAU);
    ctx.fill();
    ctx.flush();
    let target = ctx.device();
    assert!(target.painted(50, 50));
    assert!(target.painted(50, 22));
    assert!(target.painted(77, 50));
    assert!(!target.painted(50, 85));
    assert!(!target.painted(25, 25));
    assert!(!target.painted(5, 5));
}

#[test]
fn negative_arc_fills_the_same_disc() {
    let mut ctx = sim_ctx(100, 100);
    ctx.arc_negative(50.0, 50.0, 30.0, TAU, 0.0);
    ctx.fill();
    ctx.flush();
    assert!(ctx.device().painted(50, 50));
    assert!(!ctx.device().painted(25, 25));
}

#[test]
fn filled_ellipse() {
    let mut ctx = sim_ctx(100, 100);
    ctx.ellipse(40.0, 20.0, 50.0, 50.0, 0.0);
    ctx.fill();
    ctx.flush();
    let target = ctx.device();
    assert!(target.painted(50, 50));
    assert!(target.painted(85, 50));
    assert!(!target.painted(50, 75));
    assert!(!target.painted(95, 50));
}

#[test]
fn rounded_corners_are_cut() {
    let mut ctx = sim_ctx(100, 100);
    ctx.rounded_rectangle(10.0, 10.0, 80.0, 80.0, 10.0).unwrap();
    ctx.fill();
    ctx.flush();
    let target = ctx.device();
    assert!(!target.painted(11, 11));
    assert!(!target.painted(88, 88));
    assert!(target.painted(50, 50));
    assert!(target.painted(15, 50));
    assert!(target.painted(50, 11));
}

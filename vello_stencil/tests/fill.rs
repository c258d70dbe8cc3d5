// Copyright 2025 the Vello Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use vello_stencil::device::Pipeline;
use vello_stencil::{Command, Context, ContextOptions, Device, Fill, NonZeroTessellator};

use crate::util::{crossed_line_star, recording_ctx, sim_ctx, sim_ctx_with, StencilSim};

fn draw_star(fill_rule: Fill) -> Context<StencilSim> {
    let mut ctx = sim_ctx(100, 100);
    ctx.set_fill_rule(fill_rule);
    crossed_line_star(&mut ctx);
    ctx.fill();
    ctx.flush();
    assert!(ctx.status().is_ok());
    ctx
}

#[test]
fn star_non_zero_fills_the_center() {
    let ctx = draw_star(Fill::NonZero);
    let target = ctx.device();
    assert!(target.painted(50, 55));
    assert!(target.painted(50, 20));
    assert!(!target.painted(5, 5));
    assert!(!target.painted(50, 95));
}

#[test]
fn star_even_odd_leaves_a_hole() {
    let ctx = draw_star(Fill::EvenOdd);
    let target = ctx.device();
    assert!(!target.painted(50, 55));
    assert!(target.painted(50, 20));
    assert!(!target.painted(5, 5));
    // The fill bit does not outlive the fill.
    assert_eq!(target.stencil_at(50, 20), 0);
}

#[test]
fn even_odd_fill_uses_fans_and_a_scissored_cover() {
    let mut ctx = recording_ctx(100, 100);
    ctx.set_fill_rule(Fill::EvenOdd);
    crossed_line_star(&mut ctx);
    ctx.fill();
    ctx.flush();
    let commands = ctx.device().commands();
    assert!(commands.contains(&Command::BindPipeline(Pipeline::PolyFill)));
    assert!(commands.contains(&Command::Draw {
        vertex_count: 5,
        first_vertex: 0,
    }));
    let scissors: Vec<_> = commands
        .iter()
        .filter_map(|c| match c {
            Command::Scissor(Some(rect)) => Some(*rect),
            _ => None,
        })
        .collect();
    assert_eq!(scissors.len(), 1);
    let rect = scissors[0];
    assert!(rect.x <= 10 && rect.y <= 10);
    assert!(rect.x + rect.width as i32 >= 90 && rect.y + rect.height as i32 >= 90);
}

#[test]
fn convex_rectangle_is_a_fan_of_two_triangles() {
    let mut ctx = recording_ctx(64, 64);
    ctx.rectangle(4.0, 4.0, 8.0, 8.0).unwrap();
    ctx.fill();
    ctx.flush();
    assert_eq!(ctx.device().vertices().len(), 4);
    assert_eq!(ctx.device().indices().len(), 6);
}

fn l_shape<D: Device>(ctx: &mut Context<D>) {
    ctx.move_to(10.0, 10.0);
    ctx.line_to(60.0, 10.0);
    ctx.line_to(60.0, 30.0);
    ctx.line_to(30.0, 30.0);
    ctx.line_to(30.0, 60.0);
    ctx.line_to(10.0, 60.0);
    ctx.close_path();
}

#[test]
fn concave_polygon_with_each_tessellator() {
    for tessellator in [NonZeroTessellator::Lyon, NonZeroTessellator::EarClip] {
        let options = ContextOptions {
            tessellator,
            ..ContextOptions::default()
        };
        let mut ctx = sim_ctx_with(100, 100, options);
        l_shape(&mut ctx);
        ctx.fill();
        ctx.flush();
        let target = ctx.device();
        assert!(target.painted(20, 50), "{tessellator:?}");
        assert!(target.painted(50, 20), "{tessellator:?}");
        assert!(target.painted(15, 15), "{tessellator:?}");
        assert!(!target.painted(50, 50), "{tessellator:?}");
        assert!(!target.painted(35, 35), "{tessellator:?}");
    }
}

fn nested_squares<D: Device>(ctx: &mut Context<D>) {
    ctx.rectangle(10.0, 10.0, 80.0, 80.0).unwrap();
    ctx.rectangle(30.0, 30.0, 40.0, 40.0).unwrap();
}

#[test]
fn nested_sub_paths_follow_the_fill_rule() {
    let mut ctx = sim_ctx(100, 100);
    nested_squares(&mut ctx);
    ctx.fill();
    ctx.flush();
    assert!(ctx.device().painted(50, 50));
    assert!(ctx.device().painted(20, 20));

    let mut ctx = sim_ctx(100, 100);
    ctx.set_fill_rule(Fill::EvenOdd);
    nested_squares(&mut ctx);
    ctx.fill();
    ctx.flush();
    assert!(!ctx.device().painted(50, 50));
    assert!(ctx.device().painted(20, 20));
    assert!(!ctx.device().painted(95, 95));
}

#[test]
fn fill_preserve_keeps_the_path() {
    let mut ctx = sim_ctx(64, 64);
    ctx.rectangle(0.0, 0.0, 16.0, 16.0).unwrap();
    ctx.fill_preserve();
    assert!(ctx.path_extents().width() > 0.0);
    ctx.translate(32.0, 32.0);
    ctx.fill();
    ctx.flush();
    assert!(ctx.device().painted(8, 8));
    assert!(ctx.device().painted(40, 40));
    assert!(!ctx.device().painted(24, 24));
}

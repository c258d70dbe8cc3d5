// Copyright 2025 the Vello Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use vello_stencil::device::{LoadOp, Pipeline};
use vello_stencil::{pack_rgba, Cap, ClipState, Command, Error, Fill, Join, Matrix, Operator};

use crate::util::{recording_ctx, sim_ctx};

#[test]
fn default_state() {
    let ctx = recording_ctx(64, 64);
    assert_eq!(ctx.line_width(), 1.0);
    assert_eq!(ctx.miter_limit(), 10.0);
    assert_eq!(ctx.line_cap(), Cap::Butt);
    assert_eq!(ctx.line_join(), Join::Miter);
    assert_eq!(ctx.dash_count(), 0);
    assert_eq!(ctx.fill_rule(), Fill::NonZero);
    assert_eq!(ctx.operator(), Operator::Over);
    assert_eq!(ctx.opacity(), 1.0);
    assert_eq!(ctx.matrix(), Matrix::IDENTITY);
    assert_eq!(ctx.font_face(), "sans");
    assert_eq!(ctx.font_size(), 10);
    assert_eq!(ctx.clip_state(), ClipState::None);
    assert!(ctx.source().is_none());
    assert!(ctx.status().is_ok());
}

#[test]
fn first_pass_clears_stencil_only() {
    let mut ctx = recording_ctx(64, 64);
    ctx.rectangle(8.0, 8.0, 16.0, 16.0).unwrap();
    ctx.fill();
    ctx.flush();
    let commands = ctx.device().commands();
    let first_pass = commands
        .iter()
        .find(|c| matches!(c, Command::BeginRenderPass(_)));
    assert_eq!(first_pass, Some(&Command::BeginRenderPass(LoadOp::ClearStencil)));
    assert!(commands.contains(&Command::DrawIndexed {
        index_count: 6,
        first_index: 0,
        vertex_offset: 0,
    }));
    assert!(ctx.status().is_ok());
}

#[test]
fn flush_orders_fence_writes_and_submit() {
    let mut ctx = recording_ctx(64, 64);
    ctx.fill_rectangle(0.0, 0.0, 10.0, 10.0);
    ctx.flush();
    let commands = ctx.device().commands();
    let position = |f: &dyn Fn(&Command) -> bool| commands.iter().position(f).unwrap();
    let write = position(&|c| matches!(c, Command::WriteVertices(4)));
    let end = position(&|c| matches!(c, Command::EndCommands(_)));
    let submit = position(&|c| matches!(c, Command::Submit(_)));
    assert!(write < end && end < submit);
    assert_eq!(commands.last(), Some(&Command::WaitFence));
    assert_eq!(ctx.device().vertices().len(), 4);
    assert_eq!(ctx.device().indices().len(), 6);
}

#[test]
fn flush_without_drawing_submits_nothing() {
    let mut ctx = recording_ctx(64, 64);
    ctx.flush();
    assert!(!ctx
        .device()
        .commands()
        .iter()
        .any(|c| matches!(c, Command::Submit(_) | Command::BeginCommands(_))));
}

#[test]
fn fill_rectangle_paints_its_pixels() {
    let mut ctx = sim_ctx(64, 64);
    ctx.set_source_rgb(1.0, 0.0, 0.0);
    ctx.fill_rectangle(10.0, 10.0, 20.0, 20.0);
    ctx.flush();
    let target = ctx.device();
    assert_eq!(target.color_at(15, 15), pack_rgba(1.0, 0.0, 0.0, 1.0));
    assert!(target.painted(10, 10));
    assert!(target.painted(29, 29));
    assert!(!target.painted(30, 30));
    assert!(!target.painted(9, 15));
    assert_eq!(target.painted_count(), 400);
}

#[test]
fn paint_covers_the_target() {
    let mut ctx = sim_ctx(32, 32);
    ctx.paint();
    ctx.flush();
    assert_eq!(ctx.device().painted_count(), 32 * 32);
}

#[test]
fn clear_operator_erases() {
    let mut ctx = sim_ctx(32, 32);
    ctx.paint();
    ctx.set_operator(Operator::Clear);
    ctx.fill_rectangle(0.0, 0.0, 8.0, 8.0);
    ctx.flush();
    assert!(!ctx.device().painted(4, 4));
    assert!(ctx.device().painted(16, 16));
    assert_eq!(ctx.operator(), Operator::Clear);
}

#[test]
fn operator_change_binds_its_pipeline() {
    let mut ctx = recording_ctx(32, 32);
    ctx.fill_rectangle(0.0, 0.0, 8.0, 8.0);
    ctx.set_operator(Operator::Difference);
    ctx.fill_rectangle(8.0, 8.0, 8.0, 8.0);
    ctx.flush();
    assert!(ctx
        .device()
        .commands()
        .contains(&Command::BindPipeline(Pipeline::Difference)));
}

#[test]
fn clear_empties_the_target() {
    let mut ctx = sim_ctx(32, 32);
    ctx.paint();
    ctx.flush();
    ctx.clear();
    ctx.flush();
    assert_eq!(ctx.device().painted_count(), 0);
    assert!(ctx.status().is_ok());
}

#[test]
fn errors_are_sticky() {
    let mut ctx = recording_ctx(32, 32);
    ctx.rel_curve_to(1.0, 1.0, 2.0, 2.0, 3.0, 3.0);
    assert_eq!(ctx.status(), Err(Error::NoCurrentPoint));
    ctx.set_line_width(5.0);
    ctx.move_to(1.0, 1.0);
    ctx.restore();
    assert_eq!(ctx.line_width(), 1.0);
    assert!(!ctx.has_current_point());
    assert_eq!(ctx.status(), Err(Error::NoCurrentPoint));
}

#[test]
fn fence_timeout_is_latched() {
    let mut ctx = recording_ctx(32, 32);
    ctx.device_mut().simulate_fence_timeout(true);
    ctx.fill_rectangle(0.0, 0.0, 4.0, 4.0);
    ctx.flush();
    assert_eq!(ctx.status(), Err(Error::Timeout));
}

#[test]
fn status_strings() {
    assert_eq!(Error::InvalidRestore.to_string(), "restore() without matching save()");
    assert_eq!(Error::NoCurrentPoint.to_string(), "no current point defined");
}

// Copyright 2025 the Vello Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use vello_stencil::{pack_rgba, ClipState, Command, Fill};

use crate::util::{recording_ctx, sim_ctx};

#[test]
fn paint_stays_inside_the_clip() {
    let mut ctx = sim_ctx(100, 100);
    ctx.rectangle(20.0, 20.0, 40.0, 40.0).unwrap();
    ctx.clip();
    assert_eq!(ctx.clip_state(), ClipState::Clip);
    assert!(!ctx.has_current_point());
    ctx.paint();
    ctx.flush();
    let target = ctx.device();
    assert_eq!(target.painted_count(), 40 * 40);
    assert!(target.painted(20, 20));
    assert!(target.painted(59, 59));
    assert!(!target.painted(60, 30));
    assert!(!target.painted(10, 10));
}

#[test]
fn even_odd_clip_has_a_hole() {
    let mut ctx = sim_ctx(100, 100);
    ctx.set_fill_rule(Fill::EvenOdd);
    ctx.rectangle(10.0, 10.0, 80.0, 80.0).unwrap();
    ctx.rectangle(30.0, 30.0, 40.0, 40.0).unwrap();
    ctx.clip();
    ctx.paint();
    ctx.flush();
    let target = ctx.device();
    assert!(target.painted(20, 20));
    assert!(!target.painted(50, 50));
    assert!(!target.painted(5, 5));
}

#[test]
fn clips_intersect() {
    let mut ctx = sim_ctx(100, 100);
    ctx.rectangle(0.0, 0.0, 60.0, 60.0).unwrap();
    ctx.clip();
    ctx.rectangle(40.0, 40.0, 60.0, 60.0).unwrap();
    ctx.clip();
    ctx.paint();
    ctx.flush();
    let target = ctx.device();
    assert_eq!(target.painted_count(), 20 * 20);
    assert!(target.painted(50, 50));
    assert!(!target.painted(30, 30));
    assert!(!target.painted(70, 70));
}

#[test]
fn clip_preserve_keeps_the_path() {
    let mut ctx = sim_ctx(100, 100);
    ctx.rectangle(10.0, 10.0, 20.0, 20.0).unwrap();
    ctx.clip_preserve();
    assert!(ctx.path_extents().width() > 0.0);
    ctx.fill();
    ctx.fill_rectangle(0.0, 0.0, 100.0, 100.0);
    ctx.flush();
    assert_eq!(ctx.device().painted_count(), 20 * 20);
}

#[test]
fn reset_clip_removes_the_clip() {
    let mut ctx = sim_ctx(50, 50);
    ctx.rectangle(0.0, 0.0, 10.0, 10.0).unwrap();
    ctx.clip();
    ctx.reset_clip();
    assert_eq!(ctx.clip_state(), ClipState::None);
    ctx.paint();
    ctx.flush();
    assert_eq!(ctx.device().painted_count(), 50 * 50);
}

#[test]
fn restore_brings_the_clip_back() {
    let mut ctx = sim_ctx(100, 100);
    let red = pack_rgba(1.0, 0.0, 0.0, 1.0);
    let blue = pack_rgba(0.0, 0.0, 1.0, 1.0);
    ctx.rectangle(10.0, 10.0, 60.0, 60.0).unwrap();
    ctx.clip();
    ctx.save();
    assert_eq!(ctx.clip_state(), ClipState::ClipSaved);

    ctx.rectangle(40.0, 40.0, 60.0, 60.0).unwrap();
    ctx.clip();
    ctx.set_source_rgb(1.0, 0.0, 0.0);
    ctx.paint();
    ctx.restore();
    assert_eq!(ctx.clip_state(), ClipState::Clip);

    ctx.set_source_rgb(0.0, 0.0, 1.0);
    ctx.fill_rectangle(0.0, 0.0, 50.0, 100.0);
    ctx.flush();
    let target = ctx.device();
    assert_eq!(target.color_at(60, 60), red);
    assert_eq!(target.color_at(45, 45), blue);
    assert_eq!(target.color_at(20, 20), blue);
    assert!(!target.painted(5, 20));
    assert!(!target.painted(80, 80));
    assert!(!target.painted(20, 80));
}

#[test]
fn reset_inside_a_save_is_undone_by_restore() {
    let mut ctx = sim_ctx(100, 100);
    ctx.rectangle(20.0, 20.0, 20.0, 20.0).unwrap();
    ctx.clip();
    ctx.save();
    ctx.reset_clip();
    assert_eq!(ctx.clip_state(), ClipState::Clear);
    ctx.paint();
    ctx.flush();
    assert_eq!(ctx.device().painted_count(), 100 * 100);

    ctx.clear();
    ctx.restore();
    assert_eq!(ctx.clip_state(), ClipState::Clip);
    ctx.paint();
    ctx.flush();
    assert_eq!(ctx.device().painted_count(), 20 * 20);
    assert!(ctx.device().painted(30, 30));
}

#[test]
fn clip_inside_a_save_without_clip_is_dropped_on_restore() {
    let mut ctx = sim_ctx(50, 50);
    ctx.save();
    ctx.rectangle(0.0, 0.0, 10.0, 10.0).unwrap();
    ctx.clip();
    ctx.restore();
    assert_eq!(ctx.clip_state(), ClipState::None);
    ctx.paint();
    ctx.flush();
    assert_eq!(ctx.device().painted_count(), 50 * 50);
}

#[test]
fn clear_inside_a_save_keeps_saved_clips() {
    let mut ctx = sim_ctx(100, 100);
    ctx.rectangle(0.0, 0.0, 50.0, 50.0).unwrap();
    ctx.clip();
    ctx.save();
    ctx.paint();
    ctx.clear();
    ctx.flush();
    assert_eq!(ctx.device().painted_count(), 0);
    ctx.restore();
    ctx.paint();
    ctx.flush();
    assert_eq!(ctx.device().painted_count(), 50 * 50);
}

/// Clip to nested squares shrinking by `STEP` on each side, saving after each clip.
const STEP: u32 = 5;
const LEVELS: u32 = 8;

fn nested_clip_square(level: u32) -> (f32, f32) {
    let inset = (level * STEP) as f32;
    (inset, 100.0 - 2.0 * inset)
}

#[test]
fn deep_saves_spill_the_stencil() {
    let mut ctx = recording_ctx(100, 100);
    for level in 0..LEVELS {
        let (inset, size) = nested_clip_square(level);
        ctx.rectangle(inset, inset, size, size).unwrap();
        ctx.clip();
        ctx.save();
    }
    for _ in 0..LEVELS {
        ctx.restore();
    }
    assert!(ctx.status().is_ok());
    let commands = ctx.device().commands();
    let count = |command: Command| commands.iter().filter(|&c| *c == command).count();
    assert_eq!(count(Command::SaveStencil(0)), 1);
    assert_eq!(count(Command::RestoreStencil(0)), 1);
    assert_eq!(count(Command::ReleaseStencil(0)), 1);
    assert_eq!(count(Command::SaveStencil(1)), 0);
    let save = commands
        .iter()
        .position(|c| *c == Command::SaveStencil(0))
        .unwrap();
    let restore = commands
        .iter()
        .position(|c| *c == Command::RestoreStencil(0))
        .unwrap();
    assert!(save < restore);
}

#[test]
fn deep_saves_restore_every_clip() {
    let mut ctx = sim_ctx(100, 100);
    for level in 0..LEVELS {
        let (inset, size) = nested_clip_square(level);
        ctx.rectangle(inset, inset, size, size).unwrap();
        ctx.clip();
        ctx.save();
    }
    for level in (0..LEVELS).rev() {
        ctx.restore();
        let shade = (level + 1) as f32 / LEVELS as f32;
        let color = pack_rgba(shade, 0.0, 0.0, 1.0);
        ctx.set_source_rgb(shade, 0.0, 0.0);
        ctx.paint();
        ctx.flush();
        let target = ctx.device();
        let inset = level * STEP;
        assert_eq!(target.color_at(inset + 1, 50), color, "level {level}");
        assert_eq!(target.color_at(50, 99 - inset - 1), color, "level {level}");
        if level > 0 {
            assert_ne!(target.color_at(inset - 2, 50), color, "level {level}");
        }
    }
    assert!(ctx.status().is_ok());
    assert_eq!(ctx.clip_state(), ClipState::Clip);
}

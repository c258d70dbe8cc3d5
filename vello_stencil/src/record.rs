// Copyright 2025 the Vello Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Capture and replay of drawing calls.
//!
//! While [`Context::start_recording`] is active, drawing calls are stored as
//! [`RecordedCommand`]s instead of being executed. The resulting [`Recording`] can be replayed
//! on any context, as a whole or one command at a time.

use std::sync::Arc;

use log::debug;
use peniko::kurbo::{Cap, Join};
use peniko::Fill;
use smallvec::SmallVec;

use crate::device::Device;
use crate::math::Matrix;
use crate::pattern::{Pattern, Surface};
use crate::{Context, Operator, Result};

/// A drawing call captured by a [`Recording`].
///
/// Each variant carries the arguments of the [`Context`] method of the same name.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedCommand {
    MoveTo { x: f32, y: f32 },
    LineTo { x: f32, y: f32 },
    RelMoveTo { dx: f32, dy: f32 },
    RelLineTo { dx: f32, dy: f32 },
    CurveTo([f32; 6]),
    RelCurveTo([f32; 6]),
    QuadraticTo([f32; 4]),
    RelQuadraticTo([f32; 4]),
    Arc {
        xc: f32,
        yc: f32,
        radius: f32,
        a1: f32,
        a2: f32,
    },
    ArcNegative {
        xc: f32,
        yc: f32,
        radius: f32,
        a1: f32,
        a2: f32,
    },
    /// Shared by the absolute and relative elliptic arcs.
    EllipticArcTo {
        relative: bool,
        x: f32,
        y: f32,
        large_arc: bool,
        counter_clockwise: bool,
        rx: f32,
        ry: f32,
        phi: f32,
    },
    Rectangle {
        x: f32,
        y: f32,
        width: f32,
        height: f32,
    },
    RoundedRectangle {
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        radius: f32,
    },
    RoundedRectangleXy {
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        rx: f32,
        ry: f32,
    },
    Ellipse {
        radius_x: f32,
        radius_y: f32,
        x: f32,
        y: f32,
        rotation: f32,
    },
    ClosePath,
    NewPath,
    NewSubPath,
    Fill,
    FillPreserve,
    Stroke,
    StrokePreserve,
    Paint,
    FillRectangle {
        x: f32,
        y: f32,
        width: f32,
        height: f32,
    },
    Clip,
    ClipPreserve,
    ResetClip,
    Clear,
    Save,
    Restore,
    SetLineWidth(f32),
    SetMiterLimit(f32),
    SetLineCap(Cap),
    SetLineJoin(Join),
    SetDash {
        dashes: SmallVec<[f32; 4]>,
        offset: f32,
    },
    SetFillRule(Fill),
    SetOperator(Operator),
    SetOpacity(f32),
    SelectFontFace(String),
    SetFontSize(u32),
    SetSourceRgba([f32; 4]),
    SetSource(Arc<Pattern>),
    SetSourceSurface { surface: Surface, x: f32, y: f32 },
    Translate { dx: f32, dy: f32 },
    Scale { sx: f32, sy: f32 },
    Rotate(f32),
    Transform(Matrix),
    SetMatrix(Matrix),
    IdentityMatrix,
}

/// Ordered list of [`RecordedCommand`]s.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Recording {
    commands: Vec<RecordedCommand>,
}

impl Recording {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a [`RecordedCommand`] to the back of the recording.
    pub fn push(&mut self, command: RecordedCommand) {
        self.commands.push(command);
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// The command at `index`, `None` past the end.
    pub fn get(&self, index: usize) -> Option<&RecordedCommand> {
        self.commands.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &RecordedCommand> {
        self.commands.iter()
    }
}

impl<D: Device> Context<D> {
    /// Run every command of `recording` in order.
    pub fn replay(&mut self, recording: &Recording) {
        for command in recording.iter() {
            self.apply(command);
        }
    }

    /// Run the command at `index` of `recording`. An index past the end is ignored.
    pub fn replay_command(&mut self, recording: &Recording, index: usize) {
        if let Some(command) = recording.get(index) {
            self.apply(command);
        }
    }

    fn apply(&mut self, command: &RecordedCommand) {
        use RecordedCommand as C;
        match *command {
            C::MoveTo { x, y } => self.move_to(x, y),
            C::LineTo { x, y } => self.line_to(x, y),
            C::RelMoveTo { dx, dy } => self.rel_move_to(dx, dy),
            C::RelLineTo { dx, dy } => self.rel_line_to(dx, dy),
            C::CurveTo([x1, y1, x2, y2, x3, y3]) => self.curve_to(x1, y1, x2, y2, x3, y3),
            C::RelCurveTo([x1, y1, x2, y2, x3, y3]) => self.rel_curve_to(x1, y1, x2, y2, x3, y3),
            C::QuadraticTo([x1, y1, x2, y2]) => self.quadratic_to(x1, y1, x2, y2),
            C::RelQuadraticTo([x1, y1, x2, y2]) => self.rel_quadratic_to(x1, y1, x2, y2),
            C::Arc {
                xc,
                yc,
                radius,
                a1,
                a2,
            } => self.arc(xc, yc, radius, a1, a2),
            C::ArcNegative {
                xc,
                yc,
                radius,
                a1,
                a2,
            } => self.arc_negative(xc, yc, radius, a1, a2),
            C::EllipticArcTo {
                relative,
                x,
                y,
                large_arc,
                counter_clockwise,
                rx,
                ry,
                phi,
            } => {
                if relative {
                    self.rel_elliptic_arc_to(x, y, large_arc, counter_clockwise, rx, ry, phi);
                } else {
                    self.elliptic_arc_to(x, y, large_arc, counter_clockwise, rx, ry, phi);
                }
            }
            C::Rectangle {
                x,
                y,
                width,
                height,
            } => shape_result(self.rectangle(x, y, width, height)),
            C::RoundedRectangle {
                x,
                y,
                width,
                height,
                radius,
            } => shape_result(self.rounded_rectangle(x, y, width, height, radius)),
            C::RoundedRectangleXy {
                x,
                y,
                width,
                height,
                rx,
                ry,
            } => shape_result(self.rounded_rectangle_xy(x, y, width, height, rx, ry)),
            C::Ellipse {
                radius_x,
                radius_y,
                x,
                y,
                rotation,
            } => self.ellipse(radius_x, radius_y, x, y, rotation),
            C::ClosePath => self.close_path(),
            C::NewPath => self.new_path(),
            C::NewSubPath => self.new_sub_path(),
            C::Fill => self.fill(),
            C::FillPreserve => self.fill_preserve(),
            C::Stroke => self.stroke(),
            C::StrokePreserve => self.stroke_preserve(),
            C::Paint => self.paint(),
            C::FillRectangle {
                x,
                y,
                width,
                height,
            } => self.fill_rectangle(x, y, width, height),
            C::Clip => self.clip(),
            C::ClipPreserve => self.clip_preserve(),
            C::ResetClip => self.reset_clip(),
            C::Clear => self.clear(),
            C::Save => self.save(),
            C::Restore => self.restore(),
            C::SetLineWidth(width) => self.set_line_width(width),
            C::SetMiterLimit(limit) => self.set_miter_limit(limit),
            C::SetLineCap(cap) => self.set_line_cap(cap),
            C::SetLineJoin(join) => self.set_line_join(join),
            C::SetDash { ref dashes, offset } => self.set_dash(dashes, offset),
            C::SetFillRule(fill_rule) => self.set_fill_rule(fill_rule),
            C::SetOperator(operator) => self.set_operator(operator),
            C::SetOpacity(opacity) => self.set_opacity(opacity),
            C::SelectFontFace(ref name) => self.select_font_face(name),
            C::SetFontSize(size) => self.set_font_size(size),
            C::SetSourceRgba([r, g, b, a]) => self.set_source_rgba(r, g, b, a),
            C::SetSource(ref pattern) => self.set_source(pattern.clone()),
            C::SetSourceSurface { surface, x, y } => self.set_source_surface(surface, x, y),
            C::Translate { dx, dy } => self.translate(dx, dy),
            C::Scale { sx, sy } => self.scale(sx, sy),
            C::Rotate(radians) => self.rotate(radians),
            C::Transform(ref matrix) => self.transform(matrix),
            C::SetMatrix(ref matrix) => self.set_matrix(matrix),
            C::IdentityMatrix => self.identity_matrix(),
        }
    }
}

/// Shape helpers report invalid sizes to their caller, which a replay does not have.
fn shape_result(result: Result<()>) {
    if let Err(e) = result {
        debug!("replayed shape skipped: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_past_the_end() {
        let mut recording = Recording::new();
        assert!(recording.is_empty());
        recording.push(RecordedCommand::Save);
        recording.push(RecordedCommand::Rotate(1.0));
        assert_eq!(recording.len(), 2);
        assert_eq!(recording.get(1), Some(&RecordedCommand::Rotate(1.0)));
        assert_eq!(recording.get(2), None);
    }
}

// Copyright 2025 the Vello Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The drawing context.

use std::sync::Arc;

use log::{debug, warn};
use peniko::kurbo::{Cap, Join, Rect};
use peniko::{Color, Fill};
use smallvec::SmallVec;

use crate::batch::{operator_pipeline, Batch, StencilState, BATCH_VERTEX_LIMIT};
use crate::clip::{ClipState, StencilBitAllocator};
use crate::config::ContextOptions;
use crate::device::{
    ClearAttachments, Device, LoadOp, Pipeline, PushConstants, Source, FULLSCREEN_BIT,
    STENCIL_ALL_BIT, STENCIL_CLIP_BIT, STENCIL_FILL_BIT,
};
use crate::fill::{fill_non_zero, poly_fill};
use crate::math::{approx_eq, Matrix, Point};
use crate::path::PathTable;
use crate::pattern::{Pattern, PatternKind, Surface, PATTERN_SOLID};
use crate::record::{RecordedCommand, Recording};
use crate::stroke::{stroke, StrokeStyle};
use crate::{pack_rgba, Error, Operator, Result};

/// Font face selected when a context is created.
const DEFAULT_FONT_FACE: &str = "sans";
const DEFAULT_FONT_SIZE: u32 = 10;

/// The part of the state which is saved and restored as a whole.
#[derive(Debug, Clone)]
struct RenderState {
    line_width: f32,
    miter_limit: f32,
    line_cap: Cap,
    line_join: Join,
    dashes: SmallVec<[f32; 4]>,
    dash_offset: f32,
    fill_rule: Fill,
    operator: Operator,
    /// Solid color, used when there is no pattern.
    color: u32,
    pattern: Option<Arc<Pattern>>,
    font_face: String,
    font_size: u32,
}

impl Default for RenderState {
    fn default() -> Self {
        Self {
            line_width: 1.0,
            miter_limit: 10.0,
            line_cap: Cap::Butt,
            line_join: Join::Miter,
            dashes: SmallVec::new(),
            dash_offset: 0.0,
            fill_rule: Fill::NonZero,
            operator: Operator::Over,
            color: pack_rgba(0.0, 0.0, 0.0, 1.0),
            pattern: None,
            font_face: DEFAULT_FONT_FACE.to_owned(),
            font_size: DEFAULT_FONT_SIZE,
        }
    }
}

/// An entry of the save stack.
#[derive(Debug)]
struct SavedState {
    state: RenderState,
    push: PushConstants,
    /// [`ClipState::ClipSaved`] when the clip was copied to a stencil bit.
    clip: ClipState,
}

/// A drawing context rendering through a [`Device`].
///
/// The context follows the PostScript model: a current path is built with the path methods
/// and consumed by the painting methods, which use the current render state (transform, line
/// style, fill rule, operator and source).
///
/// Failures are sticky. The first error is recorded and makes every later method which
/// changes the context a no-op; query it with [`status`](Self::status).
#[derive(Debug)]
pub struct Context<D: Device> {
    device: D,
    options: ContextOptions,
    batch: Batch,
    paths: PathTable,
    state: RenderState,
    clip_state: ClipState,
    stencil_bits: StencilBitAllocator,
    saved: Vec<SavedState>,
    recording: Option<Recording>,
    status: Option<Error>,
}

impl<D: Device> Context<D> {
    /// Create a context drawing to the target of `device`.
    ///
    /// The stencil of the target is cleared by the first render pass, its colors are kept.
    pub fn new(mut device: D, options: ContextOptions) -> Self {
        let batch = Batch::new(&mut device, &options);
        let paths = PathTable::new(&options);
        Self {
            device,
            options,
            batch,
            paths,
            state: RenderState::default(),
            clip_state: ClipState::None,
            stencil_bits: StencilBitAllocator::new(),
            saved: Vec::new(),
            recording: None,
            status: None,
        }
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    pub fn options(&self) -> &ContextOptions {
        &self.options
    }

    /// The first error met by this context, if any.
    pub fn status(&self) -> Result<()> {
        match self.status {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn latch(&mut self, error: Error) {
        if self.status.is_none() {
            warn!("context failed: {error}");
            self.status = Some(error);
        }
    }

    /// Run `f` unless the context already failed, latching its error.
    fn run(&mut self, f: impl FnOnce(&mut Self) -> Result<()>) {
        if self.status.is_some() {
            return;
        }
        if let Err(e) = f(self) {
            self.latch(e);
        }
    }

    /// Capture drawing calls from now on instead of executing them, see [`Recording`].
    ///
    /// A recording already in progress is discarded.
    pub fn start_recording(&mut self) {
        if self.status.is_none() {
            self.recording = Some(Recording::new());
        }
    }

    /// End the capture started by [`start_recording`](Self::start_recording).
    ///
    /// Returns `None` if nothing was captured or the context failed.
    pub fn stop_recording(&mut self) -> Option<Recording> {
        if self.status.is_some() {
            return None;
        }
        self.recording.take().filter(|recording| !recording.is_empty())
    }

    pub fn is_recording(&self) -> bool {
        self.recording.is_some()
    }

    /// Append a command to the recording in progress.
    ///
    /// Returns whether the command was captured, in which case the caller must not execute it.
    fn record(&mut self, command: impl FnOnce() -> RecordedCommand) -> bool {
        if self.status.is_some() {
            return false;
        }
        match &mut self.recording {
            Some(recording) => {
                recording.push(command());
                true
            }
            None => false,
        }
    }

    /// Scale of the current transform, drives the flattening precision.
    fn flatten_scale(&self) -> f32 {
        self.batch.push.matrix.max_scale()
    }

    /// Draw and submit all pending geometry and wait for its completion.
    pub fn flush(&mut self) {
        self.run(|ctx| {
            ctx.batch.flush(&mut ctx.device)?;
            ctx.batch.wait(&mut ctx.device)
        });
    }

    // Path construction.

    /// Begin a new sub-path at `(x, y)`.
    pub fn move_to(&mut self, x: f32, y: f32) {
        if self.record(|| RecordedCommand::MoveTo { x, y }) {
            return;
        }
        self.run(|ctx| ctx.paths.move_to(Point::new(x, y)));
    }

    pub fn line_to(&mut self, x: f32, y: f32) {
        if self.record(|| RecordedCommand::LineTo { x, y }) {
            return;
        }
        self.run(|ctx| ctx.paths.line_to(Point::new(x, y)));
    }

    /// Begin a new sub-path at an offset from the current point, or from the origin.
    pub fn rel_move_to(&mut self, dx: f32, dy: f32) {
        if self.record(|| RecordedCommand::RelMoveTo { dx, dy }) {
            return;
        }
        self.run(|ctx| ctx.paths.rel_move_to(Point::new(dx, dy)));
    }

    pub fn rel_line_to(&mut self, dx: f32, dy: f32) {
        if self.record(|| RecordedCommand::RelLineTo { dx, dy }) {
            return;
        }
        self.run(|ctx| ctx.paths.rel_line_to(Point::new(dx, dy)));
    }

    /// Append a cubic Bézier from the current point.
    ///
    /// When there is no current point the curve starts at `(x1, y1)`.
    pub fn curve_to(&mut self, x1: f32, y1: f32, x2: f32, y2: f32, x3: f32, y3: f32) {
        if self.record(|| RecordedCommand::CurveTo([x1, y1, x2, y2, x3, y3])) {
            return;
        }
        self.run(|ctx| {
            let scale = ctx.flatten_scale();
            ctx.paths.curve_to(
                Point::new(x1, y1),
                Point::new(x2, y2),
                Point::new(x3, y3),
                scale,
            )
        });
    }

    /// Relative version of [`curve_to`](Self::curve_to).
    ///
    /// Fails with [`Error::NoCurrentPoint`] when there is no current point.
    pub fn rel_curve_to(&mut self, dx1: f32, dy1: f32, dx2: f32, dy2: f32, dx3: f32, dy3: f32) {
        if self.record(|| RecordedCommand::RelCurveTo([dx1, dy1, dx2, dy2, dx3, dy3])) {
            return;
        }
        self.run(|ctx| {
            let scale = ctx.flatten_scale();
            ctx.paths.rel_curve_to(
                Point::new(dx1, dy1),
                Point::new(dx2, dy2),
                Point::new(dx3, dy3),
                scale,
            )
        });
    }

    /// Append a quadratic Bézier from the current point.
    pub fn quadratic_to(&mut self, x1: f32, y1: f32, x2: f32, y2: f32) {
        if self.record(|| RecordedCommand::QuadraticTo([x1, y1, x2, y2])) {
            return;
        }
        self.run(|ctx| {
            let scale = ctx.flatten_scale();
            ctx.paths
                .quadratic_to(Point::new(x1, y1), Point::new(x2, y2), scale)
        });
    }

    pub fn rel_quadratic_to(&mut self, dx1: f32, dy1: f32, dx2: f32, dy2: f32) {
        if self.record(|| RecordedCommand::RelQuadraticTo([dx1, dy1, dx2, dy2])) {
            return;
        }
        self.run(|ctx| {
            let scale = ctx.flatten_scale();
            ctx.paths
                .rel_quadratic_to(Point::new(dx1, dy1), Point::new(dx2, dy2), scale)
        });
    }

    /// Append a circular arc of increasing angle, joined to the current point by a line.
    pub fn arc(&mut self, xc: f32, yc: f32, radius: f32, a1: f32, a2: f32) {
        if self.record(|| RecordedCommand::Arc {
            xc,
            yc,
            radius,
            a1,
            a2,
        }) {
            return;
        }
        self.run(|ctx| {
            let scale = ctx.flatten_scale();
            ctx.paths.arc(Point::new(xc, yc), radius, a1, a2, scale)
        });
    }

    /// Append a circular arc of decreasing angle, joined to the current point by a line.
    pub fn arc_negative(&mut self, xc: f32, yc: f32, radius: f32, a1: f32, a2: f32) {
        if self.record(|| RecordedCommand::ArcNegative {
            xc,
            yc,
            radius,
            a1,
            a2,
        }) {
            return;
        }
        self.run(|ctx| {
            let scale = ctx.flatten_scale();
            ctx.paths.arc_negative(Point::new(xc, yc), radius, a1, a2, scale)
        });
    }

    /// Append an elliptical arc from the current point to `(x, y)`, with the parameters of
    /// the SVG arc command. `phi` is the rotation of the ellipse in radians.
    #[expect(clippy::too_many_arguments, reason = "mirrors the SVG arc command")]
    pub fn elliptic_arc_to(
        &mut self,
        x: f32,
        y: f32,
        large_arc: bool,
        counter_clockwise: bool,
        rx: f32,
        ry: f32,
        phi: f32,
    ) {
        if self.record(|| RecordedCommand::EllipticArcTo {
            relative: false,
            x,
            y,
            large_arc,
            counter_clockwise,
            rx,
            ry,
            phi,
        }) {
            return;
        }
        self.run(|ctx| {
            let scale = ctx.flatten_scale();
            let from = ctx.paths.current_point().unwrap_or(Point::ZERO);
            ctx.paths.elliptic_arc(
                from,
                Point::new(x, y),
                large_arc,
                counter_clockwise,
                rx,
                ry,
                phi,
                scale,
            )
        });
    }

    #[expect(clippy::too_many_arguments, reason = "mirrors the SVG arc command")]
    pub fn rel_elliptic_arc_to(
        &mut self,
        dx: f32,
        dy: f32,
        large_arc: bool,
        counter_clockwise: bool,
        rx: f32,
        ry: f32,
        phi: f32,
    ) {
        if self.record(|| RecordedCommand::EllipticArcTo {
            relative: true,
            x: dx,
            y: dy,
            large_arc,
            counter_clockwise,
            rx,
            ry,
            phi,
        }) {
            return;
        }
        let cp = self.current_point();
        self.elliptic_arc_to(
            cp.x + dx,
            cp.y + dy,
            large_arc,
            counter_clockwise,
            rx,
            ry,
            phi,
        );
    }

    /// Latch allocation failures of a shape helper, hand back its validation errors.
    fn shape(&mut self, f: impl FnOnce(&mut Self) -> Result<()>) -> Result<()> {
        self.status()?;
        match f(self) {
            Err(Error::InvalidRect) => Err(Error::InvalidRect),
            Err(e) => {
                self.latch(e);
                Err(e)
            }
            Ok(()) => Ok(()),
        }
    }

    /// Add a closed rectangle sub-path.
    ///
    /// A width or height that is not strictly positive is reported with
    /// [`Error::InvalidRect`] and leaves the context usable.
    pub fn rectangle(&mut self, x: f32, y: f32, width: f32, height: f32) -> Result<()> {
        if self.record(|| RecordedCommand::Rectangle {
            x,
            y,
            width,
            height,
        }) {
            return Ok(());
        }
        self.shape(|ctx| ctx.paths.rectangle(x, y, width, height))
    }

    /// Add a rectangle with circular corners. The radius is clamped to half the smaller side.
    pub fn rounded_rectangle(
        &mut self,
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        radius: f32,
    ) -> Result<()> {
        if self.record(|| RecordedCommand::RoundedRectangle {
            x,
            y,
            width,
            height,
            radius,
        }) {
            return Ok(());
        }
        self.shape(|ctx| {
            let scale = ctx.flatten_scale();
            ctx.paths
                .rounded_rectangle(x, y, width, height, radius, scale)
        })
    }

    /// Add a rectangle with elliptic corners of radii `rx` and `ry`.
    pub fn rounded_rectangle_xy(
        &mut self,
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        rx: f32,
        ry: f32,
    ) -> Result<()> {
        if self.record(|| RecordedCommand::RoundedRectangleXy {
            x,
            y,
            width,
            height,
            rx,
            ry,
        }) {
            return Ok(());
        }
        self.shape(|ctx| {
            let scale = ctx.flatten_scale();
            ctx.paths
                .rounded_rectangle_xy(x, y, width, height, rx, ry, scale)
        })
    }

    /// Add a closed ellipse centered on `(x, y)`, rotated by `rotation` radians.
    pub fn ellipse(&mut self, radius_x: f32, radius_y: f32, x: f32, y: f32, rotation: f32) {
        if self.record(|| RecordedCommand::Ellipse {
            radius_x,
            radius_y,
            x,
            y,
            rotation,
        }) {
            return;
        }
        self.run(|ctx| {
            let scale = ctx.flatten_scale();
            ctx.paths
                .ellipse(radius_x, radius_y, Point::new(x, y), rotation, scale)
        });
    }

    pub fn close_path(&mut self) {
        if self.record(|| RecordedCommand::ClosePath) {
            return;
        }
        self.run(|ctx| ctx.paths.close());
    }

    /// Discard the current path.
    pub fn new_path(&mut self) {
        if self.record(|| RecordedCommand::NewPath) {
            return;
        }
        if self.status.is_none() {
            self.paths.clear();
        }
    }

    /// Finish the open sub-path, the next segment starts without a current point.
    pub fn new_sub_path(&mut self) {
        if self.record(|| RecordedCommand::NewSubPath) {
            return;
        }
        self.run(|ctx| ctx.paths.finish());
    }

    pub fn has_current_point(&self) -> bool {
        self.paths.current_point().is_some()
    }

    /// The last point of the open sub-path, the origin if there is none.
    pub fn current_point(&self) -> Point {
        self.paths.current_point().unwrap_or(Point::ZERO)
    }

    /// Bounds of the current path in user space, empty at the origin if there is no path.
    pub fn path_extents(&mut self) -> Rect {
        self.run(|ctx| ctx.paths.finish());
        self.paths.extents(None).unwrap_or(Rect::ZERO)
    }

    // Painting.

    /// Fill the current path with the current fill rule, then discard it.
    pub fn fill(&mut self) {
        if self.record(|| RecordedCommand::Fill) {
            return;
        }
        self.fill_preserve();
        self.new_path();
    }

    pub fn fill_preserve(&mut self) {
        if self.record(|| RecordedCommand::FillPreserve) {
            return;
        }
        self.run(Self::fill_path);
    }

    fn fill_path(&mut self) -> Result<()> {
        self.paths.finish()?;
        if self.paths.paths().is_empty() {
            return Ok(());
        }
        match self.state.fill_rule {
            Fill::EvenOdd => self.fill_even_odd(),
            Fill::NonZero => fill_non_zero(
                &mut self.batch,
                &mut self.device,
                &self.paths,
                self.options.tessellator,
            ),
        }
    }

    /// Set the fill bit with the polygons, then cover it with the draw pipeline.
    fn fill_even_odd(&mut self) -> Result<()> {
        let matrix = self.batch.push.matrix;
        let bounds = poly_fill(&mut self.batch, &mut self.device, &self.paths, &matrix)?;
        self.batch.bind_draw_state(&mut self.device);
        if let Some(scissor) = bounds.scissor() {
            let cover = StencilState::new(STENCIL_FILL_BIT, STENCIL_FILL_BIT, STENCIL_FILL_BIT);
            self.batch.set_stencil(&mut self.device, cover);
            self.batch.draw_full_screen_quad(&mut self.device, Some(scissor))?;
            self.batch.set_stencil(&mut self.device, StencilState::DRAW);
        }
        Ok(())
    }

    /// Stroke the current path with the current line style, then discard it.
    pub fn stroke(&mut self) {
        if self.record(|| RecordedCommand::Stroke) {
            return;
        }
        self.stroke_preserve();
        self.new_path();
    }

    pub fn stroke_preserve(&mut self) {
        if self.record(|| RecordedCommand::StrokePreserve) {
            return;
        }
        self.run(|ctx| {
            ctx.paths.finish()?;
            let scale = ctx.flatten_scale();
            let style = StrokeStyle {
                width: ctx.state.line_width,
                cap: ctx.state.line_cap,
                join: ctx.state.line_join,
                miter_limit: ctx.state.miter_limit,
                dashes: &ctx.state.dashes,
                dash_offset: ctx.state.dash_offset,
            };
            stroke(&mut ctx.batch, &mut ctx.device, &ctx.paths, &style, scale)
        });
    }

    /// Fill the current path, or the whole clip region when there is no path.
    pub fn paint(&mut self) {
        if self.record(|| RecordedCommand::Paint) {
            return;
        }
        self.run(|ctx| {
            ctx.paths.finish()?;
            if !ctx.paths.paths().is_empty() {
                ctx.fill_path()?;
                ctx.paths.clear();
                return Ok(());
            }
            ctx.batch.draw_full_screen_quad(&mut ctx.device, None)
        });
    }

    /// Fill an axis aligned rectangle without going through the current path.
    pub fn fill_rectangle(&mut self, x: f32, y: f32, width: f32, height: f32) {
        if self.record(|| RecordedCommand::FillRectangle {
            x,
            y,
            width,
            height,
        }) {
            return;
        }
        self.run(|ctx| {
            if ctx.batch.undrawn_vertices() + 4 > BATCH_VERTEX_LIMIT {
                ctx.batch.emit(&mut ctx.device)?;
            }
            ctx.batch.add_rectangle(x, y, width, height)
        });
    }

    // Clipping.

    /// Intersect the clip with the current path, then discard the path.
    pub fn clip(&mut self) {
        if self.record(|| RecordedCommand::Clip) {
            return;
        }
        self.clip_preserve();
        self.new_path();
    }

    pub fn clip_preserve(&mut self) {
        if self.record(|| RecordedCommand::ClipPreserve) {
            return;
        }
        self.run(Self::clip_path);
    }

    fn clip_path(&mut self) -> Result<()> {
        self.paths.finish()?;
        if self.paths.paths().is_empty() {
            return Ok(());
        }
        let device = &mut self.device;
        self.batch.emit(device)?;
        match self.state.fill_rule {
            Fill::EvenOdd => {
                let matrix = self.batch.push.matrix;
                poly_fill(&mut self.batch, device, &self.paths, &matrix)?;
            }
            Fill::NonZero => {
                self.batch.bind_pipeline(device, Pipeline::Clipping);
                self.batch.set_stencil(device, StencilState::DRAW);
                fill_non_zero(&mut self.batch, device, &self.paths, self.options.tessellator)?;
                self.batch.emit(device)?;
            }
        }
        // Pixels without the fill bit are clipped out, the fill bit is cleared everywhere.
        self.batch.bind_pipeline(device, Pipeline::Clipping);
        let merge = StencilState::new(STENCIL_CLIP_BIT, STENCIL_FILL_BIT, STENCIL_ALL_BIT);
        self.batch.set_stencil(device, merge);
        self.batch.draw_full_screen_quad(device, None)?;
        self.batch.bind_draw_state(device);
        self.clip_state = ClipState::Clip;
        Ok(())
    }

    pub fn clip_state(&self) -> ClipState {
        self.clip_state
    }

    /// State of the clip once the clip bit is cleared.
    ///
    /// Only a saved state holding a clip yields [`ClipState::Clear`], there is nothing for a
    /// restore to bring back otherwise.
    fn cleared_clip_state(&self) -> ClipState {
        match self.saved.last() {
            Some(saved) if saved.clip != ClipState::None => ClipState::Clear,
            _ => ClipState::None,
        }
    }

    /// Remove the clip, letting every later drawing operation reach the whole target.
    pub fn reset_clip(&mut self) {
        if self.record(|| RecordedCommand::ResetClip) {
            return;
        }
        self.run(|ctx| {
            if ctx.clip_state == ClipState::Clear {
                return Ok(());
            }
            ctx.clip_state = ctx.cleared_clip_state();
            ctx.clear_clip_stencil()
        });
    }

    /// Clear the target to transparent and remove the clip.
    pub fn clear(&mut self) {
        if self.record(|| RecordedCommand::Clear) {
            return;
        }
        self.run(|ctx| {
            ctx.clip_state = ctx.cleared_clip_state();
            ctx.batch.emit(&mut ctx.device)?;
            if ctx.stencil_bits.depth() == 0 {
                ctx.clear_attachments(LoadOp::ClearAll, ClearAttachments::ColorAndStencil);
                return Ok(());
            }
            // Saved clips live in the stencil, only the clip bit may be cleared.
            ctx.batch.ensure_render_pass(&mut ctx.device);
            ctx.device.clear_attachments(ClearAttachments::Color);
            ctx.clear_clip_bit()
        });
    }

    /// Clear attachments in the current render pass, or through the load operation of the
    /// next one when no command buffer is recorded.
    fn clear_attachments(&mut self, load: LoadOp, attachments: ClearAttachments) {
        if self.batch.cmd_started() {
            self.batch.ensure_render_pass(&mut self.device);
            self.device.clear_attachments(attachments);
        } else {
            self.batch.load_op = load;
            self.batch.ensure_render_pass(&mut self.device);
        }
    }

    /// Remove the clip from the stencil.
    fn clear_clip_stencil(&mut self) -> Result<()> {
        self.batch.emit(&mut self.device)?;
        if self.stencil_bits.depth() == 0 {
            self.clear_attachments(LoadOp::ClearStencil, ClearAttachments::Stencil);
            Ok(())
        } else {
            self.clear_clip_bit()
        }
    }

    /// Zero the clip bit, keeping the saved clips.
    fn clear_clip_bit(&mut self) -> Result<()> {
        let device = &mut self.device;
        self.batch.bind_pipeline(device, Pipeline::Clipping);
        self.batch
            .set_stencil(device, StencilState::new(0, 0, STENCIL_CLIP_BIT));
        self.batch.draw_full_screen_quad(device, None)?;
        self.batch.bind_draw_state(device);
        Ok(())
    }

    // Save stack.

    /// Push a copy of the render state, the transform and the clip.
    pub fn save(&mut self) {
        if self.record(|| RecordedCommand::Save) {
            return;
        }
        self.run(Self::push_state);
    }

    fn push_state(&mut self) -> Result<()> {
        let device = &mut self.device;
        self.batch.flush(device)?;
        self.batch.wait(device)?;
        let clip = if self.clip_state.is_clipping() {
            let bit = self.stencil_bits.acquire();
            if let Some(plane) = bit.spill_plane {
                self.batch.begin_transfer(device)?;
                device.save_stencil(plane);
                self.batch.end_transfer(device)?;
            }
            debug!("saving clip in stencil bit {:#x}", bit.mask);
            self.batch.bind_pipeline(device, Pipeline::Clipping);
            let copy = StencilState::new(STENCIL_CLIP_BIT | bit.mask, STENCIL_CLIP_BIT, bit.mask);
            self.batch.set_stencil(device, copy);
            self.batch.draw_full_screen_quad(device, None)?;
            self.batch.bind_draw_state(device);
            self.clip_state = ClipState::ClipSaved;
            ClipState::ClipSaved
        } else {
            self.clip_state
        };
        self.saved.push(SavedState {
            state: self.state.clone(),
            push: self.batch.push,
            clip,
        });
        Ok(())
    }

    /// Pop the state pushed by the matching [`save`](Self::save).
    ///
    /// Without a matching save the context fails with [`Error::InvalidRestore`] and nothing
    /// else changes.
    pub fn restore(&mut self) {
        if self.record(|| RecordedCommand::Restore) {
            return;
        }
        self.run(Self::pop_state);
    }

    fn pop_state(&mut self) -> Result<()> {
        let saved = self.saved.pop().ok_or(Error::InvalidRestore)?;
        let device = &mut self.device;
        self.batch.flush(device)?;
        self.batch.wait(device)?;

        self.batch.push = saved.push;
        self.batch.push_dirty = true;

        if saved.clip == ClipState::ClipSaved {
            if let Some(released) = self.stencil_bits.release() {
                debug!("restoring clip from stencil bit {:#x}", released.mask);
                self.batch.bind_pipeline(device, Pipeline::Clipping);
                let copy = StencilState::new(
                    STENCIL_CLIP_BIT | released.mask,
                    released.mask,
                    STENCIL_CLIP_BIT,
                );
                self.batch.set_stencil(device, copy);
                self.batch.draw_full_screen_quad(device, None)?;
                self.batch.bind_draw_state(device);
                if let Some(plane) = released.restore_plane {
                    self.batch.begin_transfer(device)?;
                    device.restore_stencil(plane);
                    device.release_stencil(plane);
                    self.batch.end_transfer(device)?;
                }
            }
            self.clip_state = saved.clip.unsaved();
        } else {
            if self.clip_state.is_clipping() {
                self.clear_clip_stencil()?;
            }
            self.clip_state = saved.clip;
        }

        // The saved pattern goes through `update_pattern`, which needs the one in use.
        let SavedState { mut state, .. } = saved;
        let pattern = std::mem::replace(&mut state.pattern, self.state.pattern.take());
        self.state = state;
        self.batch.color = self.state.color;
        self.batch.draw_pipeline = operator_pipeline(self.state.operator);
        self.batch.bind_draw_state(&mut self.device);
        let unchanged = match (&pattern, &self.state.pattern) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        };
        if !unchanged {
            self.update_pattern(pattern)?;
        }
        Ok(())
    }

    // Render state.

    pub fn set_line_width(&mut self, width: f32) {
        if self.record(|| RecordedCommand::SetLineWidth(width)) {
            return;
        }
        if self.status.is_none() {
            self.state.line_width = width;
        }
    }

    pub fn line_width(&self) -> f32 {
        self.state.line_width
    }

    pub fn set_miter_limit(&mut self, limit: f32) {
        if self.record(|| RecordedCommand::SetMiterLimit(limit)) {
            return;
        }
        if self.status.is_none() {
            self.state.miter_limit = limit;
        }
    }

    pub fn miter_limit(&self) -> f32 {
        self.state.miter_limit
    }

    pub fn set_line_cap(&mut self, cap: Cap) {
        if self.record(|| RecordedCommand::SetLineCap(cap)) {
            return;
        }
        if self.status.is_none() {
            self.state.line_cap = cap;
        }
    }

    pub fn line_cap(&self) -> Cap {
        self.state.line_cap
    }

    pub fn set_line_join(&mut self, join: Join) {
        if self.record(|| RecordedCommand::SetLineJoin(join)) {
            return;
        }
        if self.status.is_none() {
            self.state.line_join = join;
        }
    }

    pub fn line_join(&self) -> Join {
        self.state.line_join
    }

    /// Set the dash pattern of strokes, an empty slice disables dashing.
    ///
    /// The pattern is validated when a stroke uses it: negative lengths or a zero total
    /// length make the stroke fail with [`Error::InvalidDash`].
    pub fn set_dash(&mut self, dashes: &[f32], offset: f32) {
        if self.record(|| RecordedCommand::SetDash {
            dashes: SmallVec::from_slice(dashes),
            offset,
        }) {
            return;
        }
        if self.status.is_none() {
            self.state.dashes = SmallVec::from_slice(dashes);
            self.state.dash_offset = offset;
        }
    }

    /// The dash lengths and the dash offset.
    pub fn dash(&self) -> (&[f32], f32) {
        (&self.state.dashes[..], self.state.dash_offset)
    }

    pub fn dash_count(&self) -> usize {
        self.state.dashes.len()
    }

    pub fn set_fill_rule(&mut self, fill_rule: Fill) {
        if self.record(|| RecordedCommand::SetFillRule(fill_rule)) {
            return;
        }
        if self.status.is_none() {
            self.state.fill_rule = fill_rule;
        }
    }

    pub fn fill_rule(&self) -> Fill {
        self.state.fill_rule
    }

    /// Set the compositing operator of the following drawing operations.
    pub fn set_operator(&mut self, operator: Operator) {
        if self.record(|| RecordedCommand::SetOperator(operator)) {
            return;
        }
        self.run(|ctx| {
            if ctx.state.operator == operator {
                return Ok(());
            }
            ctx.batch.emit(&mut ctx.device)?;
            ctx.state.operator = operator;
            let pipeline = operator_pipeline(operator);
            ctx.batch.draw_pipeline = pipeline;
            ctx.batch.bind_pipeline(&mut ctx.device, pipeline);
            Ok(())
        });
    }

    pub fn operator(&self) -> Operator {
        self.state.operator
    }

    /// Set the opacity applied to everything drawn afterwards.
    pub fn set_opacity(&mut self, opacity: f32) {
        if self.record(|| RecordedCommand::SetOpacity(opacity)) {
            return;
        }
        self.run(|ctx| {
            if approx_eq(ctx.batch.push.opacity, opacity) {
                return Ok(());
            }
            ctx.batch.emit(&mut ctx.device)?;
            ctx.batch.push.opacity = opacity;
            ctx.batch.push_dirty = true;
            Ok(())
        });
    }

    pub fn opacity(&self) -> f32 {
        self.batch.push.opacity
    }

    /// Select a font face by name. Only recorded in the render state.
    pub fn select_font_face(&mut self, name: &str) {
        if self.record(|| RecordedCommand::SelectFontFace(name.to_owned())) {
            return;
        }
        self.run(|ctx| {
            if name.is_empty() {
                return Err(Error::InvalidFont);
            }
            name.clone_into(&mut ctx.state.font_face);
            Ok(())
        });
    }

    pub fn font_face(&self) -> &str {
        &self.state.font_face
    }

    pub fn set_font_size(&mut self, size: u32) {
        if self.record(|| RecordedCommand::SetFontSize(size)) {
            return;
        }
        if self.status.is_none() {
            self.state.font_size = size;
        }
    }

    pub fn font_size(&self) -> u32 {
        self.state.font_size
    }

    // Sources.

    /// Paint with an opaque solid color.
    pub fn set_source_rgb(&mut self, r: f32, g: f32, b: f32) {
        self.set_source_rgba(r, g, b, 1.0);
    }

    /// Paint with a solid color.
    pub fn set_source_rgba(&mut self, r: f32, g: f32, b: f32, a: f32) {
        if self.record(|| RecordedCommand::SetSourceRgba([r, g, b, a])) {
            return;
        }
        self.run(|ctx| {
            ctx.state.color = pack_rgba(r, g, b, a);
            ctx.batch.color = ctx.state.color;
            ctx.update_pattern(None)
        });
    }

    pub fn set_source_color(&mut self, color: Color) {
        let [r, g, b, a] = [color.r, color.g, color.b, color.a].map(|c| f32::from(c) / 255.0);
        self.set_source_rgba(r, g, b, a);
    }

    /// Paint with `surface`, its origin placed at `(x, y)`.
    pub fn set_source_surface(&mut self, surface: Surface, x: f32, y: f32) {
        if self.record(|| RecordedCommand::SetSourceSurface { surface, x, y }) {
            return;
        }
        self.run(|ctx| {
            ctx.update_pattern(Some(Arc::new(Pattern::for_surface(surface))))?;
            ctx.batch.push.source[0] = x;
            ctx.batch.push.source[1] = y;
            ctx.batch.push_dirty = true;
            Ok(())
        });
    }

    /// Paint with a pattern. The context keeps a reference to it until the source changes.
    pub fn set_source(&mut self, pattern: Arc<Pattern>) {
        if self.record(|| RecordedCommand::SetSource(pattern.clone())) {
            return;
        }
        self.run(|ctx| ctx.update_pattern(Some(pattern)));
    }

    /// The current pattern, `None` when painting with a solid color.
    pub fn source(&self) -> Option<Arc<Pattern>> {
        self.state.pattern.clone()
    }

    /// Make `pattern` the current source and bind what the device samples.
    fn update_pattern(&mut self, pattern: Option<Arc<Pattern>>) -> Result<()> {
        let device = &mut self.device;
        let pattern_type = match &pattern {
            None => {
                if self.state.pattern.is_none() {
                    return Ok(());
                }
                self.batch.flush(device)?;
                self.batch.wait(device)?;
                device.bind_source(&Source::Empty);
                PATTERN_SOLID
            }
            Some(pattern) => {
                match pattern.kind() {
                    PatternKind::Surface(surface) => {
                        surface.validate()?;
                        self.batch.begin_transfer(device)?;
                        device.prepare_surface(surface);
                        self.batch.end_transfer(device)?;
                        device.bind_source(&Source::Surface {
                            surface: *surface,
                            extend: pattern.extend(),
                            filter: pattern.filter(),
                        });
                        self.batch.push.source[2] = surface.width as f32;
                        self.batch.push.source[3] = surface.height as f32;
                    }
                    PatternKind::Linear { .. } | PatternKind::Radial { .. } => {
                        self.batch.flush(device)?;
                        self.batch.wait(device)?;
                        let (width, height) = device.target_size();
                        self.batch.push.source = [width as f32, height as f32, 0.0, 0.0];
                        let uniform = pattern.gradient_uniform(&self.batch.push.matrix)?;
                        device.bind_source(&Source::Gradient(Box::new(uniform)));
                    }
                }
                pattern.pattern_type()
            }
        };
        self.state.pattern = pattern;
        self.batch.push.pattern_type = (self.batch.push.pattern_type & FULLSCREEN_BIT) | pattern_type;
        self.batch.push_dirty = true;
        Ok(())
    }

    // Transform.

    /// Replace the transform, keeping it unchanged if `matrix` is not invertible.
    fn apply_matrix(&mut self, matrix: Matrix) -> Result<()> {
        let inverse = matrix.invert()?;
        self.batch.emit(&mut self.device)?;
        self.batch.push.matrix = matrix;
        self.batch.push.matrix_inv = inverse;
        self.batch.push_dirty = true;
        Ok(())
    }

    pub fn translate(&mut self, dx: f32, dy: f32) {
        if self.record(|| RecordedCommand::Translate { dx, dy }) {
            return;
        }
        self.run(|ctx| ctx.apply_matrix(ctx.batch.push.matrix.pre_translate(dx, dy)));
    }

    pub fn scale(&mut self, sx: f32, sy: f32) {
        if self.record(|| RecordedCommand::Scale { sx, sy }) {
            return;
        }
        self.run(|ctx| ctx.apply_matrix(ctx.batch.push.matrix.pre_scale(sx, sy)));
    }

    /// Rotate the user space by `radians`.
    pub fn rotate(&mut self, radians: f32) {
        if self.record(|| RecordedCommand::Rotate(radians)) {
            return;
        }
        self.run(|ctx| ctx.apply_matrix(ctx.batch.push.matrix.pre_rotate(radians)));
    }

    /// Apply `matrix` before the current transform.
    pub fn transform(&mut self, matrix: &Matrix) {
        if self.record(|| RecordedCommand::Transform(*matrix)) {
            return;
        }
        self.run(|ctx| ctx.apply_matrix(ctx.batch.push.matrix * *matrix));
    }

    pub fn set_matrix(&mut self, matrix: &Matrix) {
        if self.record(|| RecordedCommand::SetMatrix(*matrix)) {
            return;
        }
        self.run(|ctx| ctx.apply_matrix(*matrix));
    }

    pub fn identity_matrix(&mut self) {
        if self.record(|| RecordedCommand::IdentityMatrix) {
            return;
        }
        self.run(|ctx| ctx.apply_matrix(Matrix::IDENTITY));
    }

    /// The transform from user space to device space.
    pub fn matrix(&self) -> Matrix {
        self.batch.push.matrix
    }
}

// Copyright 2025 the Vello Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Vello Stencil is a stencil-and-cover 2D path rasterizer.
//!
//! It exposes a PostScript-style drawing context: paths are built incrementally with
//! [`Context::move_to`], [`Context::line_to`], [`Context::curve_to`], arcs and the shape helpers,
//! then painted with [`Context::fill`], [`Context::stroke`] or used to restrict drawing with
//! [`Context::clip`].
//!
//! All geometry work happens on the CPU. Curves are flattened adaptively to the current
//! transform, strokes are turned into triangle ribbons with miter, bevel or round joins,
//! non-zero fills are tessellated and even-odd fills use the stencil buffer.
//! The resulting vertices and indices accumulate in host-side caches and are handed to a
//! [`Device`] in batches, each batch being a single indexed draw.
//!
//! The [`Device`] trait is the only contact point with a GPU API. A [`RecordingDevice`] is
//! provided that records every call instead of executing it; it is useful for headless
//! testing and for inspecting what the rasterizer produces.
//!
//! ```
//! use vello_stencil::{Context, ContextOptions, RecordingDevice};
//!
//! let mut ctx = Context::new(RecordingDevice::new(256, 256), ContextOptions::default());
//! ctx.set_source_rgb(0.9, 0.2, 0.1);
//! ctx.rectangle(10.0, 10.0, 100.0, 50.0).unwrap();
//! ctx.fill();
//! ctx.set_line_width(4.0);
//! ctx.arc(128.0, 128.0, 40.0, 0.0, std::f32::consts::PI);
//! ctx.stroke();
//! ctx.flush();
//! assert!(ctx.status().is_ok());
//! ```
//!
//! # Errors
//!
//! Drawing operations do not return errors. Instead the first failure is latched on the
//! context and every later drawing operation becomes a no-op, see [`Context::status`].

// LINEBENDER LINT SET - lib.rs - v2
// See https://linebender.org/wiki/canonical-lints/
// These lints aren't included in Cargo.toml because they
// shouldn't apply to examples and tests
#![warn(unused_crate_dependencies)]
#![warn(clippy::print_stdout, clippy::print_stderr)]
// Targeting e.g. 32-bit means structs containing usize can give false positives for 64-bit.
#![cfg_attr(target_pointer_width = "64", warn(clippy::trivially_copy_pass_by_ref))]
// END LINEBENDER LINT SET
#![cfg_attr(docsrs, feature(doc_auto_cfg))]
// The following lints are part of the Linebender standard set,
// but resolving them has been deferred for now.
// Feel free to send a PR that solves one or more of these.
#![allow(
    unreachable_pub,
    clippy::cast_possible_truncation,
    clippy::missing_assert_message,
    reason = "Deferred"
)]

mod batch;
mod cache;
mod clip;
mod context;
mod fill;
mod flatten;
mod path;
mod record;
mod stroke;

pub mod config;
pub mod device;
pub mod math;
pub mod pattern;
pub mod recording;

/// Styling and composition primitives.
pub use peniko;
/// Line caps and joins come from kurbo's stroke model.
pub use peniko::kurbo;

pub use clip::{ClipState, ReleasedBit, StencilBit, StencilBitAllocator, BITS_PER_PLANE};
pub use config::{ContextOptions, NonZeroTessellator};
pub use context::Context;
pub use device::{Device, Index, Vertex};
pub use fill::{PolygonTessellationSink, PrimitiveKind};
pub use math::{Matrix, Point};
pub use path::{Segment, SubPath};
pub use pattern::{ColorStop, Extend, Filter, Pattern, PatternKind, Surface, SurfaceId};
pub use record::{RecordedCommand, Recording};
pub use recording::{Command, RecordingDevice};

pub use peniko::kurbo::{Cap, Join};
pub use peniko::{Color, Fill};

use thiserror::Error;

/// Errors that can be latched on a [`Context`].
///
/// The descriptions are the human readable status strings; use the [`Display`](std::fmt::Display)
/// implementation to obtain them.
#[derive(Error, Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum Error {
    /// Growing one of the host side caches failed.
    #[error("out of memory")]
    NoMemory,
    /// [`Context::restore`] was called more often than [`Context::save`].
    #[error("restore() without matching save()")]
    InvalidRestore,
    /// A relative curve was requested while no path was open.
    #[error("no current point defined")]
    NoCurrentPoint,
    /// The transform became singular.
    #[error("invalid matrix (not invertible)")]
    InvalidMatrix,
    /// The dash array sums to zero.
    #[error("invalid value for a dash setting")]
    InvalidDash,
    /// A rectangle has a width or height that is not strictly positive.
    #[error("a rectangle has the height or width equal to 0")]
    InvalidRect,
    /// Waiting for the device fence exceeded [`ContextOptions::fence_timeout`].
    #[error("waiting for the device fence timed out")]
    Timeout,
    /// A gradient was used with fewer than two color stops.
    #[error("the stops count is zero")]
    PatternInvalidGradient,
    /// The pattern type is not appropriate for the operation.
    #[error("the pattern type is not appropriate for the operation")]
    PatternTypeMismatch,
    /// A surface with a zero extent was used as a source.
    #[error("invalid surface")]
    InvalidSurface,
    /// The font face name could not be resolved.
    #[error("unresolved font name")]
    InvalidFont,
    /// A resource could not be located.
    #[error("file not found")]
    FileNotFound,
    /// An index passed to a getter is out of range.
    #[error("invalid index passed to getter")]
    InvalidIndex,
}

/// A specialized `Result` type for this crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Compositing operator applied to subsequent drawing operations.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum Operator {
    /// Clear the destination.
    Clear,
    /// Replace the destination.
    Source,
    /// Draw the source over the destination.
    #[default]
    Over,
    /// Subtract the source from the destination.
    Difference,
}

/// Pack a color in the vertex layout: alpha in the high byte, then blue, green and red.
///
/// Components are clamped to `[0, 1]`.
pub fn pack_rgba(r: f32, g: f32, b: f32, a: f32) -> u32 {
    let c = |v: f32| (v.clamp(0.0, 1.0) * 255.0) as u32;
    (c(a) << 24) | (c(b) << 16) | (c(g) << 8) | c(r)
}

/// Unpack a color produced by [`pack_rgba`].
pub fn unpack_rgba(color: u32) -> [f32; 4] {
    let c = |shift: u32| ((color >> shift) & 0xff) as f32 / 255.0;
    [c(0), c(8), c(16), c(24)]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packed_colors() {
        assert_eq!(pack_rgba(0.0, 0.0, 0.0, 1.0), 0xff00_0000);
        assert_eq!(pack_rgba(1.0, 0.0, 0.0, 1.0), 0xff00_00ff);
        assert_eq!(pack_rgba(0.0, 0.0, 1.0, 0.0), 0x00ff_0000);
        assert_eq!(unpack_rgba(0xff00_00ff), [1.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn status_strings() {
        assert_eq!(Error::NoMemory.to_string(), "out of memory");
        assert_eq!(
            Error::InvalidRestore.to_string(),
            "restore() without matching save()"
        );
        assert_eq!(
            Error::InvalidMatrix.to_string(),
            "invalid matrix (not invertible)"
        );
    }
}

// Copyright 2025 the Vello Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Integration tests drawing through a [`Context`](vello_stencil::Context).
//!
//! Tests checking the recorded device calls use the `RecordingDevice`. Tests checking what
//! ends up on the target use the CPU stencil simulator in `util`.

#![allow(missing_docs, reason = "we don't need docs for testing")]
#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    reason = "not critical for testing"
)]

mod basic;
mod clip;
mod fill;
mod path;
mod util;

// SPDX-License-Identifier: LGPL-3.0-or-later

//! # headroom-dsp
//!
//! Real-time look-ahead peak limiting for multi-channel audio.
//!
//! The crate is built around three components, leaves first:
//!
//! - [`util::sliding_min`]: a fixed-capacity sliding-window minimum
//!   filter, used to anticipate the smallest gain inside the look-ahead
//!   horizon.
//! - [`meters::true_peak`]: a 4× polyphase FIR upsampler estimating the
//!   inter-sample ("true") peak magnitude of a sample stream.
//! - [`dynamics::peak_limiter`]: the limiter engine, a dual-timescale
//!   peak detector driving a look-ahead gain envelope over a per-channel
//!   delay line.
//!
//! The engine is driven in blocks by the caller and is allocation-free,
//! lock-free and deterministic in steady state: given the same
//! configuration history and input, the output is bit-identical regardless
//! of how the stream is split into `process` calls. Latency is bounded and
//! reported by [`dynamics::peak_limiter::PeakLimiter::latency`].

pub mod units;

pub mod dynamics;
pub mod meters;
pub mod util;

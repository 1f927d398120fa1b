// SPDX-License-Identifier: LGPL-3.0-or-later

//! Dynamics processors.

pub mod peak_limiter;

pub use peak_limiter::{LimiterStats, PeakLimiter};

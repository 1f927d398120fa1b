// SPDX-License-Identifier: LGPL-3.0-or-later

//! Audio metering utilities.
//!
//! - **TruePeakUpsampler**: 4× oversampled inter-sample peak estimation

pub mod true_peak;

pub use true_peak::TruePeakUpsampler;

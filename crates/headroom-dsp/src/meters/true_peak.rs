// SPDX-License-Identifier: LGPL-3.0-or-later

//! True-peak upsampler: 4× oversampled inter-sample peak estimation.
//!
//! Digital sample peaks underestimate the level of the reconstructed
//! analogue waveform whenever the true maximum falls between two samples.
//! This module estimates the inter-sample peak by reconstructing three
//! fractional phases per input sample with a 48-tap cosine-windowed sinc
//! FIR bank and reporting the largest magnitude among the four phases
//! (phase 0 is the input sample itself).
//!
//! The upsampler sits in the limiter's detection path only: it never
//! touches the signal path, it just replaces `|x|` as the peak estimate.
//! The FIR centre introduces a detection latency of [`LATENCY`] input
//! samples.
//!
//! # Examples
//!
//! ```
//! use headroom_dsp::meters::true_peak::TruePeakUpsampler;
//!
//! let mut up = TruePeakUpsampler::new();
//! // An fs/4 tone with a π/4 phase offset: every sample is ~0.919 but
//! // the waveform peaks at 1.3 between samples.
//! let mut peak = 0.0f32;
//! for n in 0..200 {
//!     let x = 1.3 * (std::f32::consts::PI * (0.5 * n as f32 - 0.25)).cos();
//!     peak = peak.max(up.process_one(x));
//! }
//! assert!(peak > 1.2);
//! ```

use multiversion::multiversion;

/// Length of the per-channel input history and of each FIR phase.
const TAPS: usize = 48;

/// Detection latency in input samples (the FIR centre tap).
pub const LATENCY: usize = 23;

// 4x upsampling FIR bank, cosine-windowed sinc. Phase 0 is the identity.
// Phase 2 is symmetric; phases 1 and 3 are mirror images of each other.
// The literals are part of the contract: detector output must stay
// bit-identical across builds, so do not regenerate or round them.
#[rustfmt::skip]
const PHASE_1: [f32; TAPS] = [
    -2.330790e-05,  1.321291e-04, -3.394408e-04,  6.562235e-04,
    -1.094138e-03,  1.665807e-03, -2.385230e-03,  3.268371e-03,
    -4.334012e-03,  5.604985e-03, -7.109989e-03,  8.886314e-03,
    -1.098403e-02,  1.347264e-02, -1.645206e-02,  2.007155e-02,
    -2.456432e-02,  3.031531e-02, -3.800644e-02,  4.896667e-02,
    -6.616853e-02,  9.788141e-02, -1.788607e-01,  9.000753e-01,
     2.993829e-01, -1.269367e-01,  7.922398e-02, -5.647748e-02,
     4.295093e-02, -3.385706e-02,  2.724946e-02, -2.218943e-02,
     1.816976e-02, -1.489313e-02,  1.217411e-02, -9.891211e-03,
     7.961470e-03, -6.326144e-03,  4.942202e-03, -3.777065e-03,
     2.805240e-03, -2.006106e-03,  1.362416e-03, -8.592768e-04,
     4.834383e-04, -2.228007e-04,  6.607267e-05, -2.537056e-06,
];

#[rustfmt::skip]
const PHASE_2: [f32; TAPS] = [
    -1.450055e-05,  1.359163e-04, -3.928527e-04,  8.006445e-04,
    -1.375510e-03,  2.134915e-03, -3.098103e-03,  4.286860e-03,
    -5.726614e-03,  7.448018e-03, -9.489286e-03,  1.189966e-02,
    -1.474471e-02,  1.811472e-02, -2.213828e-02,  2.700557e-02,
    -3.301023e-02,  4.062971e-02, -5.069345e-02,  6.477499e-02,
    -8.625619e-02,  1.239454e-01, -2.101678e-01,  6.359382e-01,
     6.359382e-01, -2.101678e-01,  1.239454e-01, -8.625619e-02,
     6.477499e-02, -5.069345e-02,  4.062971e-02, -3.301023e-02,
     2.700557e-02, -2.213828e-02,  1.811472e-02, -1.474471e-02,
     1.189966e-02, -9.489286e-03,  7.448018e-03, -5.726614e-03,
     4.286860e-03, -3.098103e-03,  2.134915e-03, -1.375510e-03,
     8.006445e-04, -3.928527e-04,  1.359163e-04, -1.450055e-05,
];

#[rustfmt::skip]
const PHASE_3: [f32; TAPS] = [
    -2.537056e-06,  6.607267e-05, -2.228007e-04,  4.834383e-04,
    -8.592768e-04,  1.362416e-03, -2.006106e-03,  2.805240e-03,
    -3.777065e-03,  4.942202e-03, -6.326144e-03,  7.961470e-03,
    -9.891211e-03,  1.217411e-02, -1.489313e-02,  1.816976e-02,
    -2.218943e-02,  2.724946e-02, -3.385706e-02,  4.295093e-02,
    -5.647748e-02,  7.922398e-02, -1.269367e-01,  2.993829e-01,
     9.000753e-01, -1.788607e-01,  9.788141e-02, -6.616853e-02,
     4.896667e-02, -3.800644e-02,  3.031531e-02, -2.456432e-02,
     2.007155e-02, -1.645206e-02,  1.347264e-02, -1.098403e-02,
     8.886314e-03, -7.109989e-03,  5.604985e-03, -4.334012e-03,
     3.268371e-03, -2.385230e-03,  1.665807e-03, -1.094138e-03,
     6.562235e-04, -3.394408e-04,  1.321291e-04, -2.330790e-05,
];

/// 48-tap FIR dot product, summed in tap order.
///
/// Strict source-order accumulation keeps the result identical across the
/// dispatched targets.
#[multiversion(targets("x86_64+avx2+fma", "x86_64+avx", "x86_64+sse4.1", "aarch64+neon"))]
fn convolve(hist: &[f32; TAPS], taps: &[f32; TAPS]) -> f32 {
    let mut acc = 0.0f32;
    for k in 0..TAPS {
        acc += hist[k] * taps[k];
    }
    acc
}

/// Per-channel 4× true-peak upsampler.
///
/// Holds the last [`TAPS`] input samples. Each call to
/// [`process_one`](Self::process_one) pushes one sample, evaluates the
/// three fractional phases, and returns the maximum magnitude among the
/// four reconstructed sub-sample points.
#[derive(Debug, Clone)]
pub struct TruePeakUpsampler {
    hist: [f32; TAPS],
}

impl Default for TruePeakUpsampler {
    fn default() -> Self {
        Self::new()
    }
}

impl TruePeakUpsampler {
    /// Create an upsampler with a zeroed history.
    pub fn new() -> Self {
        Self { hist: [0.0; TAPS] }
    }

    /// Zero the input history.
    ///
    /// Call on a stream discontinuity; the next [`LATENCY`] estimates
    /// describe a signal padded with leading zeros.
    pub fn reset(&mut self) {
        self.hist = [0.0; TAPS];
    }

    /// Push one input sample and return the 4× oversampled peak estimate.
    ///
    /// Phase 0 is the current input sample, so the estimate is never below
    /// `|x|`.
    pub fn process_one(&mut self, x: f32) -> f32 {
        self.hist[TAPS - 1] = x;

        let u1 = convolve(&self.hist, &PHASE_1);
        let u2 = convolve(&self.hist, &PHASE_2);
        let u3 = convolve(&self.hist, &PHASE_3);

        // Shift the history left by one; the last slot is rewritten on the
        // next call.
        self.hist.copy_within(1.., 0);

        let p1 = x.abs().max(u1.abs());
        let p2 = u2.abs().max(u3.abs());
        p1.max(p2)
    }
}

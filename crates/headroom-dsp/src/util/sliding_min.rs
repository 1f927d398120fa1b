// SPDX-License-Identifier: LGPL-3.0-or-later

//! Sliding-window minimum filter.
//!
//! Reports the minimum of the last `len` values written into a small ring
//! buffer, in amortised O(1) per write. The limiter engine runs one
//! instance over the per-chunk inverse-gain targets and one over the
//! per-super-chunk low-passed targets, so the gain envelope always knows
//! the smallest gain required anywhere inside the look-ahead horizon.
//!
//! # Algorithm
//!
//! The filter caches the current minimum together with a hold countdown:
//! the number of further writes for which the cached value is still inside
//! the window. A write that ties or undercuts the minimum refreshes the
//! hold; otherwise the hold is decremented. Only when it hits zero (the
//! cached minimum just fell out of the window) are the remaining
//! `len - 1` entries rescanned. The rescan reseeds the hold with the
//! distance until the new minimum expires in turn, so the worst case is
//! O(`len`) once per window, O(1) amortised.

/// Ring capacity; all supported window lengths fit in 16 slots.
const SIZE: usize = 16;
const MASK: usize = SIZE - 1;

/// Sliding-window minimum over the last `len` values written.
///
/// The buffer starts filled with `1.0`, so before `len` values have been
/// seen the reported minimum is `1.0`: unity gain, the correct quiet-start
/// behaviour for the limiter's inverse-gain histories.
#[derive(Debug, Clone)]
pub struct SlidingMin {
    /// Window length in writes.
    len: usize,
    /// Writes remaining until the cached minimum leaves the window.
    hold: usize,
    /// Write index.
    wind: usize,
    /// Cached minimum of the last `len` writes.
    vmin: f32,
    hist: [f32; SIZE],
}

impl Default for SlidingMin {
    fn default() -> Self {
        Self::new()
    }
}

impl SlidingMin {
    /// Create a filter with a full-capacity window.
    pub fn new() -> Self {
        Self {
            len: SIZE,
            hold: SIZE,
            wind: 0,
            vmin: 1.0,
            hist: [1.0; SIZE],
        }
    }

    /// Reset the filter to a window of `len` writes.
    ///
    /// # Arguments
    /// * `len` - Window length, `1 ..= 16`
    pub fn init(&mut self, len: usize) {
        assert!(len >= 1 && len <= SIZE);
        self.len = len;
        self.hold = len;
        self.wind = 0;
        self.vmin = 1.0;
        self.hist = [1.0; SIZE];
    }

    /// Append `v` and return the minimum of the last `len` values.
    pub fn write(&mut self, v: f32) -> f32 {
        let i = self.wind;
        self.hist[i] = v;
        if v <= self.vmin {
            // Ties refresh the hold, so a flat stretch never forces a
            // premature rescan.
            self.vmin = v;
            self.hold = self.len;
        } else {
            self.hold -= 1;
            if self.hold == 0 {
                // The cached minimum just expired: rescan the previous
                // len - 1 entries, oldest first.
                self.vmin = v;
                self.hold = self.len;
                for off in (1..self.len).rev() {
                    let u = self.hist[(i + SIZE - off) & MASK];
                    if u < self.vmin {
                        self.vmin = u;
                        self.hold = self.len - off;
                    }
                }
            }
        }
        self.wind = (i + 1) & MASK;
        self.vmin
    }

    /// Current minimum, without writing.
    pub fn vmin(&self) -> f32 {
        self.vmin
    }
}

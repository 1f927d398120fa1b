// SPDX-License-Identifier: LGPL-3.0-or-later

//! Utility processing modules.

pub mod sliding_min;

pub use sliding_min::SlidingMin;

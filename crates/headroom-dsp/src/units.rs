// SPDX-License-Identifier: LGPL-3.0-or-later

//! Unit conversion functions.
//!
//! The handful of dB/linear-gain and time/sample conversions used across
//! the workspace.

/// Convert decibels to linear gain (amplitude ratio).
///
/// # Arguments
/// * `db` - Level in decibels
///
/// # Returns
/// Linear gain (amplitude ratio)
#[inline]
pub fn db_to_gain(db: f32) -> f32 {
    (db * (std::f32::consts::LN_10 / 20.0)).exp()
}

/// Convert linear gain (amplitude ratio) to decibels.
///
/// # Arguments
/// * `gain` - Linear gain (amplitude ratio)
///
/// # Returns
/// Level in decibels
#[inline]
pub fn gain_to_db(gain: f32) -> f32 {
    20.0 * gain.log10()
}

/// Convert seconds to sample count.
///
/// # Arguments
/// * `sr` - Sample rate in Hz
/// * `time` - Time in seconds
///
/// # Returns
/// Number of samples
#[inline]
pub fn seconds_to_samples(sr: f32, time: f32) -> f32 {
    time * sr
}

/// Convert milliseconds to sample count.
///
/// # Arguments
/// * `sr` - Sample rate in Hz
/// * `time` - Time in milliseconds
///
/// # Returns
/// Number of samples
#[inline]
pub fn millis_to_samples(sr: f32, time: f32) -> f32 {
    time * sr / 1000.0
}

/// Convert sample count to milliseconds.
///
/// # Arguments
/// * `sr` - Sample rate in Hz
/// * `samples` - Number of samples
///
/// # Returns
/// Time in milliseconds
#[inline]
pub fn samples_to_millis(sr: f32, samples: f32) -> f32 {
    samples * 1000.0 / sr
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f32 = 1e-5;

    #[test]
    fn test_db_gain_conversion() {
        // 0 dB = gain of 1.0, exactly
        assert_eq!(db_to_gain(0.0), 1.0);
        assert!((gain_to_db(1.0) - 0.0).abs() < EPSILON);

        // +6.02 dB ~ gain of 2.0
        assert!((db_to_gain(6.0206) - 2.0).abs() < 0.001);
        assert!((gain_to_db(2.0) - 6.0206).abs() < 0.001);

        // -6.02 dB ~ gain of 0.5
        assert!((db_to_gain(-6.0206) - 0.5).abs() < 0.001);

        // Roundtrip
        let db = -1.2;
        assert!((gain_to_db(db_to_gain(db)) - db).abs() < EPSILON);
    }

    #[test]
    fn test_gain_to_db_edge_cases() {
        let db = gain_to_db(0.0);
        assert!(db.is_infinite() && db.is_sign_negative());

        assert!(gain_to_db(-1.0).is_nan(), "negative gain has no dB value");
    }

    #[test]
    fn test_time_sample_conversion() {
        let sr = 48000.0;
        assert!((seconds_to_samples(sr, 1.0) - 48000.0).abs() < EPSILON);
        assert!((millis_to_samples(sr, 50.0) - 2400.0).abs() < EPSILON);
        assert!((samples_to_millis(sr, 2400.0) - 50.0).abs() < EPSILON);

        // Roundtrip
        let ms = 1.2;
        assert!((samples_to_millis(sr, millis_to_samples(sr, ms)) - ms).abs() < EPSILON);
    }
}

// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// 16x16 ordered-dither threshold matrices.
//
// A sample with gray level `g` becomes a black dot when `g <= m[y & 15][x & 15]`.
// Thresholds stay within 0..=254 so pure white never marks.

use druckwerk_core::Dither;

/// Highest threshold value; white (255) is always above it.
pub const MAX_THRESHOLD: u8 = 254;

/// 8x8 clustered-dot screen, tiled to 16x16 by [`clustered`].
const CLUSTERED_8X8: [[u8; 8]; 8] = [
    [24, 10, 12, 26, 35, 47, 49, 37],
    [8, 0, 2, 14, 45, 59, 61, 51],
    [22, 6, 4, 16, 43, 57, 63, 53],
    [30, 20, 18, 28, 33, 41, 55, 39],
    [34, 46, 48, 36, 25, 11, 13, 27],
    [44, 58, 60, 50, 9, 1, 3, 15],
    [42, 56, 62, 52, 23, 7, 5, 17],
    [32, 40, 54, 38, 31, 21, 19, 29],
];

/// Dispersed-dot (Bayer) matrix, used for photos.
pub fn bayer() -> Dither {
    let mut m = [[0u8; 16]; 16];
    for (y, row) in m.iter_mut().enumerate() {
        for (x, cell) in row.iter_mut().enumerate() {
            let a = x ^ y;
            let mut v = 0usize;
            for bit in 0..4 {
                v = (v << 2) | (((a >> bit) & 1) << 1) | ((y >> bit) & 1);
            }
            *cell = (v * usize::from(MAX_THRESHOLD) / 255) as u8;
        }
    }
    m
}

/// Clustered-dot matrix, used for text and graphics.
pub fn clustered() -> Dither {
    let mut m = [[0u8; 16]; 16];
    for (y, row) in m.iter_mut().enumerate() {
        for (x, cell) in row.iter_mut().enumerate() {
            *cell = CLUSTERED_8X8[y & 7][x & 7] * 4 + 2;
        }
    }
    m
}

/// Flat 50% threshold, used for draft and bi-level output.
pub fn threshold() -> Dither {
    [[127u8; 16]; 16]
}

/// Shift every threshold by `darkness` percent (-100..=100).
///
/// Positive values move thresholds toward white, so more samples mark.
pub fn apply_darkness(matrix: &Dither, darkness: i32) -> Dither {
    let d = darkness.clamp(-100, 100);
    if d == 0 {
        return *matrix;
    }
    let mut out = *matrix;
    for row in out.iter_mut() {
        for cell in row.iter_mut() {
            let t = i32::from(*cell);
            let shifted = if d > 0 {
                t + (i32::from(MAX_THRESHOLD) - t) * d / 100
            } else {
                t + t * d / 100
            };
            *cell = shifted.clamp(0, i32::from(MAX_THRESHOLD)) as u8;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bayer_spans_the_threshold_range() {
        let m = bayer();
        let mut seen = std::collections::BTreeSet::new();
        for row in m.iter() {
            for v in row {
                assert!(*v <= MAX_THRESHOLD);
                seen.insert(*v);
            }
        }
        assert_eq!(m[0][0], 0);
        assert!(seen.contains(&MAX_THRESHOLD));
        assert!(seen.len() > 200);
    }

    #[test]
    fn clustered_tiles_every_eight() {
        let m = clustered();
        assert_eq!(m[1][1], 2);
        assert_eq!(m[9][9], m[1][1]);
        assert_eq!(m[2][6], 63 * 4 + 2);
    }

    #[test]
    fn darkness_moves_thresholds() {
        let base = threshold();
        assert_eq!(apply_darkness(&base, 0), base);
        assert_eq!(apply_darkness(&base, 100)[0][0], MAX_THRESHOLD);
        assert_eq!(apply_darkness(&base, -100)[0][0], 0);
        assert_eq!(apply_darkness(&base, 50)[3][3], 190);
        assert_eq!(apply_darkness(&base, 400), apply_darkness(&base, 100));
    }
}

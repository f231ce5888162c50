//! Pixel-grid helpers shared by reconstruction and fusion.

/// Round a pixel coordinate to the nearest integer, halves going up.
///
/// Truncates toward zero, then adds one when the `fmod` remainder is at least
/// one half. Negative values therefore never round away from zero:
/// `2.5 -> 3`, `-2.5 -> -2`, `-2.7 -> -2`.
pub fn round_half_up(value: f64) -> i64 {
    let truncated = value.trunc() as i64;
    if value % 1.0 >= 0.5 {
        truncated + 1
    } else {
        truncated
    }
}

/// True when `(x, y)` lies strictly inside a `width` x `height` grid.
///
/// Row and column zero are excluded: `(0, 0)` is the pose estimator's
/// "not detected" coordinate.
pub fn pixel_in_frame(x: i64, y: i64, width: u32, height: u32) -> bool {
    x > 0 && y > 0 && x < width as i64 && y < height as i64
}

/// Row-major index of `(x, y)` in a grid `width` pixels wide.
#[inline]
pub fn pixel_index(x: u32, y: u32, width: u32) -> usize {
    y as usize * width as usize + x as usize
}

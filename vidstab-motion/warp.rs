use rayon::prelude::*;
use tracing::debug;
use vidstab_core::{BorderMode, Frame, Transform};

use crate::error::{check_frame, MotionResult};

/// Corrective transform that moves a frame from its raw trajectory position onto the smoothed one
#[inline]
pub fn correct(raw: &Transform, smoothed: &Transform) -> Transform {
    *smoothed - *raw
}

/// Forward matrix of `correction` on a canvas enlarged by `border` pixels.
///
/// The rotation stays anchored at the original frame's origin, so a margin
/// only shifts the content and never changes how it moves.
pub fn corrective_matrix(correction: &Transform, border: usize) -> [[f64; 3]; 2] {
    let mut m = correction.to_affine();
    let b = border as f64;
    // T(b) * M * T(-b)
    m[0][2] += b - (m[0][0] * b + m[0][1] * b);
    m[1][2] += b - (m[1][0] * b + m[1][1] * b);
    m
}

/// Inverse of a 2x3 affine matrix, `None` when singular
pub fn invert_affine(m: &[[f64; 3]; 2]) -> Option<[[f64; 3]; 2]> {
    let det = m[0][0] * m[1][1] - m[0][1] * m[1][0];
    if det.abs() < 1e-12 || !det.is_finite() {
        return None;
    }
    let (a, b, c) = (m[1][1] / det, -m[0][1] / det, -m[1][0] / det);
    let d = m[0][0] / det;
    Some([
        [a, b, -(a * m[0][2] + b * m[1][2])],
        [c, d, -(c * m[0][2] + d * m[1][2])],
    ])
}

/// Map a possibly out-of-range coordinate onto `0..n`, `None` meaning "use the constant"
#[inline]
fn border_index(i: i64, n: usize, mode: BorderMode) -> Option<usize> {
    let n = n as i64;
    if (0..n).contains(&i) {
        return Some(i as usize);
    }
    match mode {
        BorderMode::Constant(_) => None,
        BorderMode::Replicate => Some(i.clamp(0, n - 1) as usize),
        BorderMode::Reflect => {
            if n == 1 {
                return Some(0);
            }
            let period = 2 * (n - 1);
            let m = i.rem_euclid(period);
            let reflected = if m < n { m } else { period - m };
            Some(reflected as usize)
        }
    }
}

#[inline]
fn constant_sample(mode: BorderMode, channel: usize) -> u8 {
    match mode {
        BorderMode::Constant(color) => color.get(channel).copied().unwrap_or(0),
        _ => 0,
    }
}

/// Enlarge a frame by `border` pixels on every side, filling the margin per `mode`
pub fn make_border(frame: &Frame, border: usize, mode: BorderMode) -> MotionResult<Frame> {
    check_frame(frame)?;
    if border == 0 {
        return Ok(frame.clone());
    }

    let ch = frame.channels;
    let (w, h) = (frame.width, frame.height);
    let out_w = w + 2 * border;
    let out_h = h + 2 * border;
    let mut data = vec![0u8; out_w * out_h * ch];

    data.par_chunks_mut(out_w * ch).enumerate().for_each(|(oy, row)| {
        let sy = border_index(oy as i64 - border as i64, h, mode);
        for ox in 0..out_w {
            let sx = border_index(ox as i64 - border as i64, w, mode);
            let dst = &mut row[ox * ch..(ox + 1) * ch];
            match (sx, sy) {
                (Some(sx), Some(sy)) => dst.copy_from_slice(frame.pixel(sx, sy)),
                _ => {
                    for (c, v) in dst.iter_mut().enumerate() {
                        *v = constant_sample(mode, c);
                    }
                }
            }
        }
    });

    Ok(Frame::new(frame.index, out_w, out_h, ch, data))
}

/// Apply a forward affine `m` to `src`, producing an `out_width` x `out_height` frame.
///
/// Each output pixel is pulled from the inverse-mapped source location with
/// bilinear interpolation; samples falling outside the source follow `mode`.
pub fn warp_affine(
    src: &Frame,
    m: &[[f64; 3]; 2],
    out_width: usize,
    out_height: usize,
    mode: BorderMode,
) -> MotionResult<Frame> {
    check_frame(src)?;
    let ch = src.channels;
    let mut data = vec![0u8; out_width * out_height * ch];

    let Some(inv) = invert_affine(m) else {
        debug!(index = src.index, "singular warp matrix, returning fill");
        for px in data.chunks_exact_mut(ch) {
            for (c, v) in px.iter_mut().enumerate() {
                *v = constant_sample(mode, c);
            }
        }
        return Ok(Frame::new(src.index, out_width, out_height, ch, data));
    };

    let (w, h) = (src.width, src.height);
    data.par_chunks_mut(out_width * ch).enumerate().for_each(|(oy, row)| {
        let v = oy as f64;
        let mut acc = [0.0f64; 4];
        for ox in 0..out_width {
            let u = ox as f64;
            let sx = inv[0][0] * u + inv[0][1] * v + inv[0][2];
            let sy = inv[1][0] * u + inv[1][1] * v + inv[1][2];

            let x0 = sx.floor();
            let y0 = sy.floor();
            let (fx, fy) = (sx - x0, sy - y0);
            let (x0, y0) = (x0 as i64, y0 as i64);

            acc[..ch.min(4)].iter_mut().for_each(|a| *a = 0.0);
            let dst = &mut row[ox * ch..(ox + 1) * ch];
            let taps = [
                (x0, y0, (1.0 - fx) * (1.0 - fy)),
                (x0 + 1, y0, fx * (1.0 - fy)),
                (x0, y0 + 1, (1.0 - fx) * fy),
                (x0 + 1, y0 + 1, fx * fy),
            ];

            if ch <= 4 {
                for &(tx, ty, weight) in &taps {
                    if weight == 0.0 {
                        continue;
                    }
                    match (border_index(tx, w, mode), border_index(ty, h, mode)) {
                        (Some(px), Some(py)) => {
                            for (c, s) in src.pixel(px, py).iter().enumerate() {
                                acc[c] += weight * *s as f64;
                            }
                        }
                        _ => {
                            for (c, a) in acc[..ch].iter_mut().enumerate() {
                                *a += weight * constant_sample(mode, c) as f64;
                            }
                        }
                    }
                }
                for (d, a) in dst.iter_mut().zip(acc.iter()) {
                    *d = a.round().clamp(0.0, 255.0) as u8;
                }
            } else {
                for (c, d) in dst.iter_mut().enumerate() {
                    let value: f64 = taps
                        .iter()
                        .map(|&(tx, ty, weight)| match (border_index(tx, w, mode), border_index(ty, h, mode)) {
                            (Some(px), Some(py)) => weight * src.pixel(px, py)[c] as f64,
                            _ => weight * constant_sample(mode, c) as f64,
                        })
                        .sum();
                    *d = value.round().clamp(0.0, 255.0) as u8;
                }
            }
        }
    });

    Ok(Frame::new(src.index, out_width, out_height, ch, data))
}

/// Copy the `width` x `height` region starting at (`x`, `y`)
pub fn crop(frame: &Frame, x: usize, y: usize, width: usize, height: usize) -> Frame {
    let ch = frame.channels;
    let stride = frame.row_stride();
    let mut data = Vec::with_capacity(width * height * ch);
    for row in y..y + height {
        let start = row * stride + x * ch;
        data.extend_from_slice(&frame.data[start..start + width * ch]);
    }
    Frame::new(frame.index, width, height, ch, data)
}

/// Smallest margin that keeps every corner of a `width` x `height` frame on
/// canvas under all of the given corrective transforms
pub fn auto_border_size(corrections: &[Transform], width: usize, height: usize) -> usize {
    let corners = [
        (0.0, 0.0),
        (width as f64, 0.0),
        (0.0, height as f64),
        (width as f64, height as f64),
    ];
    let max_shift = corrections
        .iter()
        .flat_map(|t| {
            let m = t.to_affine();
            corners.iter().map(move |&(x, y)| {
                let nx = m[0][0] * x + m[0][1] * y + m[0][2];
                let ny = m[1][0] * x + m[1][1] * y + m[1][2];
                (nx - x).abs().max((ny - y).abs())
            })
        })
        .fold(0.0f64, f64::max);

    if max_shift.is_finite() {
        max_shift.ceil() as usize
    } else {
        0
    }
}

/// Applies corrective transforms with a fixed border policy
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameWarper {
    border: usize,
    mode: BorderMode,
    crop_to_original: bool,
}

impl FrameWarper {
    pub fn new(border: usize, mode: BorderMode, crop_to_original: bool) -> Self {
        Self {
            border,
            mode,
            crop_to_original,
        }
    }

    pub fn border(&self) -> usize {
        self.border
    }

    pub fn mode(&self) -> BorderMode {
        self.mode
    }

    /// Output dimensions for an input of `width` x `height`
    pub fn output_size(&self, width: usize, height: usize) -> (usize, usize) {
        if self.crop_to_original {
            (width, height)
        } else {
            (width + 2 * self.border, height + 2 * self.border)
        }
    }

    /// Enlarge, warp by `correction` and optionally crop back to the input size
    pub fn warp(&self, frame: &Frame, correction: &Transform) -> MotionResult<Frame> {
        let bordered = make_border(frame, self.border, self.mode)?;
        let m = corrective_matrix(correction, self.border);
        let warped = warp_affine(&bordered, &m, bordered.width, bordered.height, self.mode)?;

        if self.crop_to_original && self.border > 0 {
            Ok(crop(&warped, self.border, self.border, frame.width, frame.height))
        } else {
            Ok(warped)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MotionError;

    fn gradient_frame(width: usize, height: usize, channels: usize) -> Frame {
        let data = (0..width * height * channels)
            .map(|i| {
                let px = i / channels;
                ((px % width) * 7 + (px / width) * 13 + (i % channels) * 50) as u8
            })
            .collect();
        Frame::new(0, width, height, channels, data)
    }

    #[test]
    fn test_correct_is_smoothed_minus_raw() {
        let raw = Transform::new(5.0, -2.0, 0.1);
        let smoothed = Transform::new(4.0, -1.0, 0.05);
        assert!(correct(&raw, &smoothed).approx_eq(&Transform::new(-1.0, 1.0, -0.05), 1e-12));
    }

    #[test]
    fn test_identity_warp_is_exact() {
        let frame = gradient_frame(17, 11, 3);
        let warper = FrameWarper::new(0, BorderMode::Replicate, false);
        assert_eq!(warper.warp(&frame, &Transform::IDENTITY).unwrap(), frame);
    }

    #[test]
    fn test_border_enlarges_output() {
        let frame = gradient_frame(20, 10, 3);
        let warper = FrameWarper::new(6, BorderMode::BLACK, false);
        let out = warper.warp(&frame, &Transform::new(1.0, 1.0, 0.01)).unwrap();

        assert_eq!(out.dimensions(), (32, 22));
        assert_eq!(warper.output_size(20, 10), (32, 22));
        assert!(out.is_consistent());
    }

    #[test]
    fn test_crop_back_restores_size_and_content() {
        let frame = gradient_frame(20, 10, 1);
        let warper = FrameWarper::new(4, BorderMode::BLACK, true);
        let out = warper.warp(&frame, &Transform::IDENTITY).unwrap();
        assert_eq!(out, frame);
    }

    #[test]
    fn test_integer_translation() {
        let frame = gradient_frame(12, 12, 1);
        let out = FrameWarper::new(0, BorderMode::BLACK, false)
            .warp(&frame, &Transform::new(2.0, 1.0, 0.0))
            .unwrap();

        assert_eq!(out.pixel(5, 5), frame.pixel(3, 4));
        // Exposed top-left corner is filled
        assert_eq!(out.pixel(0, 0), &[0]);
    }

    #[test]
    fn test_border_modes() {
        let frame = Frame::new(0, 3, 1, 1, vec![10, 20, 30]);

        let constant = make_border(&frame, 2, BorderMode::Constant([99, 0, 0, 0])).unwrap();
        assert_eq!(&constant.data[2 * 7..3 * 7], &[99, 99, 10, 20, 30, 99, 99]);
        assert_eq!(&constant.data[..7], &[99; 7]);

        let replicate = make_border(&frame, 2, BorderMode::Replicate).unwrap();
        assert_eq!(&replicate.data[2 * 7..3 * 7], &[10, 10, 10, 20, 30, 30, 30]);

        let reflect = make_border(&frame, 2, BorderMode::Reflect).unwrap();
        assert_eq!(&reflect.data[2 * 7..3 * 7], &[30, 20, 10, 20, 30, 20, 10]);
    }

    #[test]
    fn test_rotation_pivots_on_frame_origin() {
        let correction = Transform::new(0.0, 0.0, 0.3);
        let m = corrective_matrix(&correction, 5);
        // Original origin sits at (5, 5) on the enlarged canvas and stays put
        let x = m[0][0] * 5.0 + m[0][1] * 5.0 + m[0][2];
        let y = m[1][0] * 5.0 + m[1][1] * 5.0 + m[1][2];
        assert!((x - 5.0).abs() < 1e-12 && (y - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_invert_affine() {
        let m = Transform::new(3.0, -4.0, 0.7).to_affine();
        let inv = invert_affine(&m).unwrap();
        let (x, y) = (10.0, 20.0);
        let fx = m[0][0] * x + m[0][1] * y + m[0][2];
        let fy = m[1][0] * x + m[1][1] * y + m[1][2];
        let bx = inv[0][0] * fx + inv[0][1] * fy + inv[0][2];
        let by = inv[1][0] * fx + inv[1][1] * fy + inv[1][2];
        assert!((bx - x).abs() < 1e-9 && (by - y).abs() < 1e-9);

        assert!(invert_affine(&[[0.0, 0.0, 1.0], [0.0, 0.0, 1.0]]).is_none());
    }

    #[test]
    fn test_auto_border_size() {
        let corrections = [Transform::new(3.2, -1.0, 0.0), Transform::new(-0.5, 4.6, 0.0)];
        assert_eq!(auto_border_size(&corrections, 100, 50), 5);
        assert_eq!(auto_border_size(&[], 100, 50), 0);
        // Rotation moves the far corners as well
        assert!(auto_border_size(&[Transform::new(0.0, 0.0, 0.05)], 100, 100) > 5);
    }

    #[test]
    fn test_rejects_bad_frames() {
        let empty = Frame::new(4, 0, 0, 3, Vec::new());
        assert_eq!(make_border(&empty, 2, BorderMode::BLACK), Err(MotionError::EmptyFrame { index: 4 }));

        let short = Frame::new(1, 4, 4, 1, vec![0; 10]);
        assert!(matches!(
            FrameWarper::new(0, BorderMode::BLACK, false).warp(&short, &Transform::IDENTITY),
            Err(MotionError::InvalidFrame { expected_len: 16, actual_len: 10, .. })
        ));
    }
}

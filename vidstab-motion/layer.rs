use std::fmt;
use std::sync::Arc;

use vidstab_core::Frame;

use crate::error::{check_frame, MotionError, MotionResult};

type CustomLayerFn = dyn Fn(&Frame, &Frame) -> Frame + Send + Sync;

/// How a stabilized frame is composited over the previous composited output
#[derive(Clone)]
pub enum LayerFn {
    /// Foreground wins except where its alpha is zero; frames without alpha are opaque
    Overlay,
    /// `alpha * foreground + (1 - alpha) * background`
    Blend { alpha: f32 },
    Custom(Arc<CustomLayerFn>),
}

impl LayerFn {
    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(&Frame, &Frame) -> Frame + Send + Sync + 'static,
    {
        LayerFn::Custom(Arc::new(f))
    }

    /// Composite `foreground` over `background`
    pub fn apply(&self, foreground: &Frame, background: &Frame) -> MotionResult<Frame> {
        check_frame(foreground)?;
        check_frame(background)?;
        let expected = (foreground.width, foreground.height, foreground.channels);
        let actual = (background.width, background.height, background.channels);
        if expected != actual {
            return Err(MotionError::DimensionMismatch { expected, actual });
        }

        match self {
            LayerFn::Overlay => Ok(layer_overlay(foreground, background)),
            LayerFn::Blend { alpha } => layer_blend(foreground, background, *alpha),
            LayerFn::Custom(f) => Ok(f(foreground, background)),
        }
    }
}

impl fmt::Debug for LayerFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LayerFn::Overlay => write!(f, "Overlay"),
            LayerFn::Blend { alpha } => f.debug_struct("Blend").field("alpha", alpha).finish(),
            LayerFn::Custom(_) => write!(f, "Custom(..)"),
        }
    }
}

fn layer_overlay(foreground: &Frame, background: &Frame) -> Frame {
    if foreground.channels < 4 {
        return foreground.clone();
    }
    let ch = foreground.channels;
    let mut out = foreground.clone();
    for (dst, bg) in out.data.chunks_exact_mut(ch).zip(background.data.chunks_exact(ch)) {
        if dst[3] == 0 {
            dst.copy_from_slice(bg);
        }
        dst[3] = 255;
    }
    out
}

fn layer_blend(foreground: &Frame, background: &Frame, alpha: f32) -> MotionResult<Frame> {
    if !(0.0..=1.0).contains(&alpha) {
        return Err(MotionError::InvalidAlpha(alpha));
    }
    let data = foreground
        .data
        .iter()
        .zip(&background.data)
        .map(|(&f, &b)| (alpha * f as f32 + (1.0 - alpha) * b as f32).round().clamp(0.0, 255.0) as u8)
        .collect();
    Ok(Frame::new(foreground.index, foreground.width, foreground.height, foreground.channels, data))
}

/// Composite the current frame over the previous layered output, if any.
///
/// The returned frame is what the caller keeps as `previous` for the next call.
pub fn apply_layer_func(current: Frame, previous: Option<&Frame>, layer: &LayerFn) -> MotionResult<Frame> {
    match previous {
        Some(prev) => layer.apply(&current, prev),
        None => Ok(current),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overlay_fills_transparent_pixels() {
        let fg = Frame::new(0, 2, 1, 4, vec![10, 20, 30, 255, 0, 0, 0, 0]);
        let bg = Frame::new(0, 2, 1, 4, vec![1, 2, 3, 40, 7, 8, 9, 50]);
        let out = LayerFn::Overlay.apply(&fg, &bg).unwrap();
        assert_eq!(out.data, vec![10, 20, 30, 255, 7, 8, 9, 255]);
    }

    #[test]
    fn test_overlay_without_alpha_keeps_foreground() {
        let fg = Frame::filled(0, 3, 3, 3, 12);
        let bg = Frame::filled(0, 3, 3, 3, 200);
        assert_eq!(LayerFn::Overlay.apply(&fg, &bg).unwrap(), fg);
    }

    #[test]
    fn test_blend() {
        let fg = Frame::filled(0, 2, 2, 1, 200);
        let bg = Frame::filled(0, 2, 2, 1, 100);
        let out = LayerFn::Blend { alpha: 0.6 }.apply(&fg, &bg).unwrap();
        assert!(out.data.iter().all(|&v| v == 160));

        assert_eq!(
            LayerFn::Blend { alpha: 1.5 }.apply(&fg, &bg),
            Err(MotionError::InvalidAlpha(1.5))
        );
    }

    #[test]
    fn test_custom_and_first_frame() {
        let darker = LayerFn::custom(|fg, bg| {
            let data = fg.data.iter().zip(&bg.data).map(|(a, b)| *a.min(b)).collect();
            Frame::new(fg.index, fg.width, fg.height, fg.channels, data)
        });
        let a = Frame::filled(0, 2, 2, 1, 50);
        let b = Frame::filled(1, 2, 2, 1, 90);

        let first = apply_layer_func(b.clone(), None, &darker).unwrap();
        assert_eq!(first, b);
        let second = apply_layer_func(b, Some(&a), &darker).unwrap();
        assert!(second.data.iter().all(|&v| v == 50));
    }

    #[test]
    fn test_mismatched_frames() {
        let a = Frame::filled(0, 2, 2, 1, 0);
        let b = Frame::filled(0, 3, 2, 1, 0);
        assert!(matches!(LayerFn::Overlay.apply(&a, &b), Err(MotionError::DimensionMismatch { .. })));
    }
}

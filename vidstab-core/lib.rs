use std::ops::{Add, AddAssign, Neg, Sub};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Row-major 8-bit grayscale image
pub type Image = Vec<u8>;

/// Interleaved 8-bit frame (gray, gray+alpha, RGB or RGBA) with its position in the sequence
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub index: usize,
    pub width: usize,
    pub height: usize,
    pub channels: usize,
    pub data: Vec<u8>,
}

impl Frame {
    pub fn new(index: usize, width: usize, height: usize, channels: usize, data: Vec<u8>) -> Self {
        Self { index, width, height, channels, data }
    }

    /// Frame with every sample set to `value`
    pub fn filled(index: usize, width: usize, height: usize, channels: usize, value: u8) -> Self {
        Self::new(index, width, height, channels, vec![value; width * height * channels])
    }

    /// Frame built from a grayscale image
    pub fn from_gray(index: usize, width: usize, height: usize, img: Image) -> Self {
        Self::new(index, width, height, 1, img)
    }

    /// True for the end-of-stream placeholder or a frame without pixels
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0 || self.channels == 0 || self.data.is_empty()
    }

    /// Buffer length matches the declared geometry
    pub fn is_consistent(&self) -> bool {
        self.data.len() == self.width * self.height * self.channels
    }

    pub fn dimensions(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    pub fn row_stride(&self) -> usize {
        self.width * self.channels
    }

    /// Samples of the pixel at (x, y)
    pub fn pixel(&self, x: usize, y: usize) -> &[u8] {
        let start = (y * self.width + x) * self.channels;
        &self.data[start..start + self.channels]
    }

    /// Luma conversion (ITU-R BT.601 weights for colour frames)
    pub fn to_gray(&self) -> Image {
        match self.channels {
            1 => self.data.clone(),
            2 => self.data.chunks_exact(2).map(|px| px[0]).collect(),
            _ => self
                .data
                .chunks_exact(self.channels)
                .map(|px| {
                    let luma = 299 * px[0] as u32 + 587 * px[1] as u32 + 114 * px[2] as u32;
                    ((luma + 500) / 1000) as u8
                })
                .collect(),
        }
    }
}

/// Key-point with subpixel location and orientation (radians)
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Keypoint {
    pub x: f32,
    pub y: f32,
    pub angle: f32,
}

impl Keypoint {
    pub fn at(x: f32, y: f32) -> Self {
        Self { x, y, angle: 0.0 }
    }
}

/// Matched point locations in frame t (`prev`) and frame t+1 (`cur`).
///
/// Untracked points are never stored, so both sides always have the same length.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CorrespondenceSet {
    prev: Vec<[f32; 2]>,
    cur: Vec<[f32; 2]>,
}

impl CorrespondenceSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(n: usize) -> Self {
        Self {
            prev: Vec::with_capacity(n),
            cur: Vec::with_capacity(n),
        }
    }

    pub fn push(&mut self, prev: [f32; 2], cur: [f32; 2]) {
        self.prev.push(prev);
        self.cur.push(cur);
    }

    pub fn len(&self) -> usize {
        self.prev.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prev.is_empty()
    }

    pub fn prev_points(&self) -> &[[f32; 2]] {
        &self.prev
    }

    pub fn cur_points(&self) -> &[[f32; 2]] {
        &self.cur
    }

    pub fn pairs(&self) -> impl Iterator<Item = (&[f32; 2], &[f32; 2])> + '_ {
        self.prev.iter().zip(self.cur.iter())
    }
}

impl FromIterator<([f32; 2], [f32; 2])> for CorrespondenceSet {
    fn from_iter<I: IntoIterator<Item = ([f32; 2], [f32; 2])>>(iter: I) -> Self {
        let mut set = Self::new();
        for (p, c) in iter {
            set.push(p, c);
        }
        set
    }
}

/// Rigid motion: displacement in pixels and rotation in radians.
///
/// Used both for estimated frame-to-frame motion and for cumulative
/// trajectory entries; addition is component-wise.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Transform {
    pub dx: f64,
    pub dy: f64,
    pub da: f64,
}

impl Transform {
    pub const IDENTITY: Transform = Transform { dx: 0.0, dy: 0.0, da: 0.0 };

    pub fn new(dx: f64, dy: f64, da: f64) -> Self {
        Self { dx, dy, da }
    }

    pub fn identity() -> Self {
        Self::IDENTITY
    }

    pub fn is_identity(&self) -> bool {
        *self == Self::IDENTITY
    }

    /// Component-wise comparison with absolute tolerance
    pub fn approx_eq(&self, other: &Transform, tol: f64) -> bool {
        (self.dx - other.dx).abs() <= tol
            && (self.dy - other.dy).abs() <= tol
            && (self.da - other.da).abs() <= tol
    }

    /// 2x3 forward matrix `[[cos, -sin, dx], [sin, cos, dy]]` (rotation about the origin)
    pub fn to_affine(&self) -> [[f64; 3]; 2] {
        let (s, c) = self.da.sin_cos();
        [[c, -s, self.dx], [s, c, self.dy]]
    }

    /// Reads displacement and rotation out of a 2x3 similarity matrix; scale is dropped
    pub fn from_affine(m: &[[f64; 3]; 2]) -> Self {
        Self {
            dx: m[0][2],
            dy: m[1][2],
            da: m[1][0].atan2(m[0][0]),
        }
    }
}

impl Add for Transform {
    type Output = Transform;

    fn add(self, rhs: Transform) -> Transform {
        Transform::new(self.dx + rhs.dx, self.dy + rhs.dy, self.da + rhs.da)
    }
}

impl AddAssign for Transform {
    fn add_assign(&mut self, rhs: Transform) {
        self.dx += rhs.dx;
        self.dy += rhs.dy;
        self.da += rhs.da;
    }
}

impl Sub for Transform {
    type Output = Transform;

    fn sub(self, rhs: Transform) -> Transform {
        Transform::new(self.dx - rhs.dx, self.dy - rhs.dy, self.da - rhs.da)
    }
}

impl Neg for Transform {
    type Output = Transform;

    fn neg(self) -> Transform {
        Transform::new(-self.dx, -self.dy, -self.da)
    }
}

/// Fill policy for canvas regions exposed by border enlargement or warping
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum BorderMode {
    /// Fixed colour; only as many samples as the frame has channels are used
    Constant([u8; 4]),
    /// Repeat the outermost row/column
    Replicate,
    /// Mirror about the edge without repeating it (reflect-101)
    Reflect,
}

impl BorderMode {
    pub const BLACK: BorderMode = BorderMode::Constant([0, 0, 0, 255]);
}

impl Default for BorderMode {
    fn default() -> Self {
        BorderMode::BLACK
    }
}

/// Margin added on every side before warping
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum BorderSize {
    Fixed(u32),
    /// Smallest margin that keeps every corrected frame on canvas (batch only)
    Auto,
}

impl Default for BorderSize {
    fn default() -> Self {
        BorderSize::Fixed(0)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BorderConfig {
    pub size: BorderSize,
    pub mode: BorderMode,
}

impl BorderConfig {
    pub fn fixed(size: u32, mode: BorderMode) -> Self {
        Self { size: BorderSize::Fixed(size), mode }
    }
}

/// Default smoothing half-width in frames
pub const DEFAULT_SMOOTHING_WINDOW: usize = 30;

#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct StabConfig {
    /// Half-width `w` of the centered moving average (window spans `2w + 1` frames)
    pub smoothing_window: usize,
    pub border: BorderConfig,
    /// Crop warped frames back to the input size instead of keeping the margin
    pub crop_to_original: bool,
    pub n_threads: usize,
}

impl Default for StabConfig {
    fn default() -> Self {
        Self {
            smoothing_window: DEFAULT_SMOOTHING_WINDOW,
            border: BorderConfig::default(),
            crop_to_original: false,
            n_threads: num_cpus::get().max(1),
        }
    }
}

/// Initialize Rayon thread pool with the specified number of threads
pub fn init_thread_pool(n_threads: usize) -> Result<(), rayon::ThreadPoolBuildError> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(n_threads)
        .build_global()
}

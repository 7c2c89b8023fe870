use crate::types::ScaleLevel;

/// Image pyramid operations for multi-scale detection and coarse-to-fine tracking
pub struct ImagePyramid;

impl ImagePyramid {
    /// Generate scale levels, stopping at `n_levels` or when a level drops below `min_size`
    pub fn generate_scale_levels(
        width: usize,
        height: usize,
        scale_factor: f32,
        n_levels: usize,
        min_size: usize,
    ) -> Vec<ScaleLevel> {
        let mut levels = Vec::new();
        let mut current_scale = 1.0f32;

        for level in 0..n_levels {
            let scaled_width = ((width as f32) / current_scale) as usize;
            let scaled_height = ((height as f32) / current_scale) as usize;

            if scaled_width < min_size || scaled_height < min_size {
                break;
            }

            levels.push(ScaleLevel {
                level,
                scale: current_scale,
                width: scaled_width,
                height: scaled_height,
            });

            current_scale *= scale_factor;
        }

        levels
    }

    /// Build an 8-bit pyramid for the given scale levels
    pub fn build_scaled(img: &[u8], width: usize, height: usize, scale_levels: &[ScaleLevel]) -> Vec<Vec<u8>> {
        scale_levels
            .iter()
            .map(|scale_level| {
                if scale_level.level == 0 {
                    img.to_vec()
                } else {
                    Self::downsample_image(img, width, height, scale_level.width, scale_level.height)
                }
            })
            .collect()
    }

    /// Downsample image using bilinear interpolation
    fn downsample_image(
        img: &[u8],
        src_width: usize,
        src_height: usize,
        target_width: usize,
        target_height: usize,
    ) -> Vec<u8> {
        let mut downsampled = vec![0u8; target_width * target_height];

        let x_ratio = src_width as f32 / target_width as f32;
        let y_ratio = src_height as f32 / target_height as f32;

        for y in 0..target_height {
            for x in 0..target_width {
                let value = bilinear_u8(img, src_width, src_height, x as f32 * x_ratio, y as f32 * y_ratio);
                downsampled[y * target_width + x] = value.round().clamp(0.0, 255.0) as u8;
            }
        }

        downsampled
    }
}

fn bilinear_u8(img: &[u8], width: usize, height: usize, x: f32, y: f32) -> f32 {
    let x1 = (x.floor().max(0.0) as usize).min(width - 1);
    let y1 = (y.floor().max(0.0) as usize).min(height - 1);
    let x2 = (x1 + 1).min(width - 1);
    let y2 = (y1 + 1).min(height - 1);

    let fx = x - x1 as f32;
    let fy = y - y1 as f32;

    let p11 = img[y1 * width + x1] as f32;
    let p12 = img[y1 * width + x2] as f32;
    let p21 = img[y2 * width + x1] as f32;
    let p22 = img[y2 * width + x2] as f32;

    let top = p11 * (1.0 - fx) + p12 * fx;
    let bottom = p21 * (1.0 - fx) + p22 * fx;

    top * (1.0 - fy) + bottom * fy
}

/// One level of a floating-point halving pyramid
#[derive(Debug, Clone)]
pub struct PyramidLevel {
    pub width: usize,
    pub height: usize,
    pub data: Vec<f32>,
}

impl PyramidLevel {
    pub fn from_gray(img: &[u8], width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            data: img.iter().map(|&v| v as f32).collect(),
        }
    }

    /// 2x2 box-filtered half-resolution level
    pub fn downsample(&self) -> Self {
        let width = (self.width / 2).max(1);
        let height = (self.height / 2).max(1);
        let mut data = vec![0.0f32; width * height];

        for y in 0..height {
            let y0 = (2 * y).min(self.height - 1);
            let y1 = (2 * y + 1).min(self.height - 1);
            for x in 0..width {
                let x0 = (2 * x).min(self.width - 1);
                let x1 = (2 * x + 1).min(self.width - 1);
                data[y * width + x] = 0.25
                    * (self.data[y0 * self.width + x0]
                        + self.data[y0 * self.width + x1]
                        + self.data[y1 * self.width + x0]
                        + self.data[y1 * self.width + x1]);
            }
        }

        Self { width, height, data }
    }

    /// Bilinear sample; coordinates outside the level are clamped to the edge
    #[inline]
    pub fn sample(&self, x: f32, y: f32) -> f32 {
        let max_x = (self.width - 1) as f32;
        let max_y = (self.height - 1) as f32;
        let x = x.clamp(0.0, max_x);
        let y = y.clamp(0.0, max_y);

        let x0 = x.floor() as usize;
        let y0 = y.floor() as usize;
        let x1 = (x0 + 1).min(self.width - 1);
        let y1 = (y0 + 1).min(self.height - 1);
        let fx = x - x0 as f32;
        let fy = y - y0 as f32;

        let row0 = y0 * self.width;
        let row1 = y1 * self.width;
        let top = self.data[row0 + x0] * (1.0 - fx) + self.data[row0 + x1] * fx;
        let bottom = self.data[row1 + x0] * (1.0 - fx) + self.data[row1 + x1] * fx;
        top * (1.0 - fy) + bottom * fy
    }
}

/// Halving pyramid used by the Lucas-Kanade tracker
#[derive(Debug, Clone)]
pub struct GrayPyramid {
    levels: Vec<PyramidLevel>,
}

impl GrayPyramid {
    /// Levels 0..=max_level, stopping early once a level would be smaller than `min_size`
    pub fn build(img: &[u8], width: usize, height: usize, max_level: usize, min_size: usize) -> Self {
        let mut levels = vec![PyramidLevel::from_gray(img, width, height)];
        while levels.len() <= max_level {
            let last = &levels[levels.len() - 1];
            if last.width / 2 < min_size || last.height / 2 < min_size {
                break;
            }
            let next = last.downsample();
            levels.push(next);
        }
        Self { levels }
    }

    pub fn num_levels(&self) -> usize {
        self.levels.len()
    }

    pub fn level(&self, i: usize) -> &PyramidLevel {
        &self.levels[i]
    }

    pub fn base(&self) -> &PyramidLevel {
        &self.levels[0]
    }
}

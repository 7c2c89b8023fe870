use std::fs;
use std::path::{Path, PathBuf};

use image::{ColorType, DynamicImage};
use tracing::debug;
use vidstab_core::Frame;

use crate::error::{StabError, StabResult};

/// Ordered frame input. `Ok(None)` marks the end of the stream.
pub trait FrameSource {
    fn next_frame(&mut self) -> StabResult<Option<Frame>>;

    /// Restart from the first frame; single-pass sources refuse
    fn rewind(&mut self) -> StabResult<()> {
        Err(StabError::SourceNotRewindable)
    }

    /// Whether [`rewind`](Self::rewind) can succeed
    fn is_rewindable(&self) -> bool {
        false
    }

    /// Number of frames, if known up front
    fn len_hint(&self) -> Option<usize> {
        None
    }
}

/// Ordered frame output
pub trait FrameSink {
    fn write_frame(&mut self, frame: &Frame) -> StabResult<()>;

    fn finish(&mut self) -> StabResult<()> {
        Ok(())
    }
}

impl FrameSink for Vec<Frame> {
    fn write_frame(&mut self, frame: &Frame) -> StabResult<()> {
        self.push(frame.clone());
        Ok(())
    }
}

/// In-memory, re-readable source
#[derive(Debug, Clone, Default)]
pub struct VecSource {
    frames: Vec<Frame>,
    pos: usize,
}

impl VecSource {
    pub fn new(frames: Vec<Frame>) -> Self {
        Self { frames, pos: 0 }
    }
}

impl FrameSource for VecSource {
    fn next_frame(&mut self) -> StabResult<Option<Frame>> {
        let frame = self.frames.get(self.pos).cloned();
        if frame.is_some() {
            self.pos += 1;
        }
        Ok(frame)
    }

    fn rewind(&mut self) -> StabResult<()> {
        self.pos = 0;
        Ok(())
    }

    fn is_rewindable(&self) -> bool {
        true
    }

    fn len_hint(&self) -> Option<usize> {
        Some(self.frames.len())
    }
}

/// Single-pass source over any frame iterator
pub struct IterSource<I> {
    iter: I,
}

impl<I: Iterator<Item = Frame>> IterSource<I> {
    pub fn new(iter: I) -> Self {
        Self { iter }
    }
}

impl<I: Iterator<Item = Frame>> FrameSource for IterSource<I> {
    fn next_frame(&mut self) -> StabResult<Option<Frame>> {
        Ok(self.iter.next())
    }
}

const IMAGE_EXTENSIONS: [&str; 7] = ["png", "jpg", "jpeg", "bmp", "tif", "tiff", "webp"];

fn is_image_file(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
            .unwrap_or(false)
}

/// Frames read from a directory of images, in file name order.
///
/// A single image file is accepted as a one-frame sequence.
#[derive(Debug, Clone)]
pub struct ImageSequenceSource {
    paths: Vec<PathBuf>,
    pos: usize,
}

impl ImageSequenceSource {
    pub fn open(path: impl AsRef<Path>) -> StabResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(StabError::SourceNotFound(path.to_path_buf()));
        }

        let mut paths = if path.is_dir() {
            fs::read_dir(path)?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| is_image_file(p))
                .collect::<Vec<_>>()
        } else {
            vec![path.to_path_buf()]
        };
        paths.sort();

        debug!(path = %path.display(), frames = paths.len(), "opened image sequence");
        Ok(Self { paths, pos: 0 })
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }
}

/// Keep gray, gray+alpha, RGB or RGBA layout; deeper formats are reduced to 8 bits
pub fn frame_from_image(index: usize, img: DynamicImage) -> Frame {
    let (width, height) = (img.width() as usize, img.height() as usize);
    let color = img.color();
    let (channels, data) = match (color.has_color(), color.has_alpha()) {
        (false, false) => (1, img.into_luma8().into_raw()),
        (false, true) => (2, img.into_luma_alpha8().into_raw()),
        (true, false) => (3, img.into_rgb8().into_raw()),
        (true, true) => (4, img.into_rgba8().into_raw()),
    };
    Frame::new(index, width, height, channels, data)
}

impl FrameSource for ImageSequenceSource {
    fn next_frame(&mut self) -> StabResult<Option<Frame>> {
        let Some(path) = self.paths.get(self.pos) else {
            return Ok(None);
        };
        let img = image::open(path)?;
        let frame = frame_from_image(self.pos, img);
        self.pos += 1;
        Ok(Some(frame))
    }

    fn rewind(&mut self) -> StabResult<()> {
        self.pos = 0;
        Ok(())
    }

    fn is_rewindable(&self) -> bool {
        true
    }

    fn len_hint(&self) -> Option<usize> {
        Some(self.paths.len())
    }
}

/// Writes frames as numbered PNG files into a directory
#[derive(Debug, Clone)]
pub struct ImageSequenceSink {
    dir: PathBuf,
    prefix: String,
    written: usize,
}

impl ImageSequenceSink {
    pub fn create(dir: impl AsRef<Path>) -> StabResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            prefix: "frame".to_string(),
            written: 0,
        })
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn written(&self) -> usize {
        self.written
    }

    pub fn frame_path(&self, n: usize) -> PathBuf {
        self.dir.join(format!("{}_{:06}.png", self.prefix, n))
    }
}

impl FrameSink for ImageSequenceSink {
    fn write_frame(&mut self, frame: &Frame) -> StabResult<()> {
        let color = match frame.channels {
            1 => ColorType::L8,
            2 => ColorType::La8,
            3 => ColorType::Rgb8,
            4 => ColorType::Rgba8,
            n => {
                return Err(StabError::Config(format!(
                    "cannot encode frame {} with {} channels",
                    frame.index, n
                )))
            }
        };
        let path = self.frame_path(self.written);
        image::save_buffer(&path, &frame.data, frame.width as u32, frame.height as u32, color)?;
        self.written += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vec_source_rewinds() {
        let mut source = VecSource::new(vec![Frame::filled(0, 2, 2, 1, 1), Frame::filled(1, 2, 2, 1, 2)]);
        assert_eq!(source.next_frame().unwrap().unwrap().index, 0);
        assert_eq!(source.next_frame().unwrap().unwrap().index, 1);
        assert!(source.next_frame().unwrap().is_none());

        assert!(source.is_rewindable());
        source.rewind().unwrap();
        assert_eq!(source.next_frame().unwrap().unwrap().index, 0);
    }

    #[test]
    fn test_iter_source_is_single_pass() {
        let mut source = IterSource::new((0..2).map(|i| Frame::filled(i, 2, 2, 1, 0)));
        assert!(!source.is_rewindable());
        assert!(source.next_frame().unwrap().is_some());
        assert!(matches!(source.rewind(), Err(StabError::SourceNotRewindable)));
    }

    #[test]
    fn test_missing_directory() {
        let err = ImageSequenceSource::open("fake_input_path").unwrap_err();
        assert!(err.to_string().contains("fake_input_path does not exist"));
    }

    #[test]
    fn test_sink_then_source_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let frames: Vec<Frame> = (0..3)
            .map(|i| Frame::new(i, 4, 3, 3, (0..36).map(|v| (v * 7 + i * 11) as u8).collect()))
            .collect();

        let mut sink = ImageSequenceSink::create(dir.path()).unwrap();
        for f in &frames {
            sink.write_frame(f).unwrap();
        }
        assert_eq!(sink.written(), 3);

        let mut source = ImageSequenceSource::open(dir.path()).unwrap();
        assert_eq!(source.len_hint(), Some(3));
        for expected in &frames {
            let frame = source.next_frame().unwrap().unwrap();
            assert_eq!(frame.data, expected.data);
            assert_eq!(frame.dimensions(), (4, 3));
        }
        assert!(source.next_frame().unwrap().is_none());
    }

    #[test]
    fn test_gray_frames_stay_gray() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = ImageSequenceSink::create(dir.path()).unwrap().with_prefix("g");
        sink.write_frame(&Frame::filled(0, 5, 5, 1, 77)).unwrap();

        let frame = ImageSequenceSource::open(sink.frame_path(0)).unwrap().next_frame().unwrap().unwrap();
        assert_eq!(frame.channels, 1);
        assert!(frame.data.iter().all(|&v| v == 77));
    }
}

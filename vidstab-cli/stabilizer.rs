use std::path::Path;

use tracing::{debug, info, warn};
use vidstab_core::{BorderSize, Frame, Transform};
use vidstab_motion::{apply_layer_func, auto_border_size, correct, smooth, FrameWarper, LayerFn};

use crate::error::{StabError, StabResult};
use crate::io::{FrameSink, FrameSource, ImageSequenceSink, ImageSequenceSource};
use crate::motion::FrameMotion;
use crate::settings::{StabilizerSettings, TransformLog};

/// Two-pass stabilizer.
///
/// [`gen_transforms`](Self::gen_transforms) reads the whole sequence and
/// materialises the per-frame transforms, the trajectory and its smoothed
/// version; [`apply_transforms`](Self::apply_transforms) reads it again and
/// writes the corrected frames.
#[derive(Debug)]
pub struct Stabilizer {
    settings: StabilizerSettings,
    motion: FrameMotion,
    layer: Option<LayerFn>,
    transforms: Vec<Transform>,
    trajectory: Vec<Transform>,
    smoothed_trajectory: Vec<Transform>,
    frame_size: Option<(usize, usize)>,
    /// Set once a first pass ran or a log was loaded, even if it held no frames
    prepared: bool,
}

impl Stabilizer {
    /// Validates the detector configuration up front
    pub fn new(settings: StabilizerSettings) -> StabResult<Self> {
        let motion = FrameMotion::new(&settings)?;
        Ok(Self {
            settings,
            motion,
            layer: None,
            transforms: Vec::new(),
            trajectory: Vec::new(),
            smoothed_trajectory: Vec::new(),
            frame_size: None,
            prepared: false,
        })
    }

    /// Composite each corrected frame over the previous output
    pub fn with_layer(mut self, layer: LayerFn) -> Self {
        self.layer = Some(layer);
        self
    }

    pub fn settings(&self) -> &StabilizerSettings {
        &self.settings
    }

    pub fn transforms(&self) -> &[Transform] {
        &self.transforms
    }

    pub fn trajectory(&self) -> &[Transform] {
        &self.trajectory
    }

    pub fn smoothed_trajectory(&self) -> &[Transform] {
        &self.smoothed_trajectory
    }

    /// Corrective transform for every frame
    pub fn corrections(&self) -> Vec<Transform> {
        self.trajectory
            .iter()
            .zip(&self.smoothed_trajectory)
            .map(|(raw, smoothed)| correct(raw, smoothed))
            .collect()
    }

    /// Frames whose motion estimate fell back to the identity in the last pass
    pub fn degraded_frames(&self) -> usize {
        self.motion.degraded()
    }

    pub fn transform_log(&self) -> TransformLog {
        TransformLog {
            smoothing_window: self.settings.config.smoothing_window,
            transforms: self.transforms.clone(),
            trajectory: self.trajectory.clone(),
            smoothed_trajectory: self.smoothed_trajectory.clone(),
        }
    }

    /// Use previously generated transforms instead of running the first pass
    pub fn load_transform_log(&mut self, log: TransformLog) -> StabResult<()> {
        log.validate()?;
        self.transforms = log.transforms;
        self.trajectory = log.trajectory;
        self.smoothed_trajectory = log.smoothed_trajectory;
        self.frame_size = None;
        self.prepared = true;
        Ok(())
    }

    /// First pass: estimate motion for every frame and smooth the trajectory
    pub fn gen_transforms(&mut self, source: &mut dyn FrameSource) -> StabResult<()> {
        let limit = self.settings.max_frames.unwrap_or(usize::MAX);
        let window = self.settings.config.smoothing_window;

        self.motion.reset();
        self.transforms.clear();
        self.trajectory.clear();
        self.frame_size = None;
        self.prepared = false;

        info!(window, hint = ?source.len_hint(), "generating transforms");
        while self.transforms.len() < limit {
            let Some(frame) = next_non_empty(source)? else {
                break;
            };
            self.frame_size.get_or_insert((frame.width, frame.height));

            let step = self.motion.observe(&frame)?;
            self.transforms.push(step.transform);
            self.trajectory.push(step.trajectory);
        }

        self.smoothed_trajectory = smooth(&self.trajectory, window);
        self.prepared = true;
        info!(
            frames = self.transforms.len(),
            degraded = self.motion.degraded(),
            "transforms generated"
        );
        Ok(())
    }

    /// Open an image sequence and run the first pass over it
    pub fn gen_transforms_from_path(&mut self, input: impl AsRef<Path>) -> StabResult<()> {
        let mut source = ImageSequenceSource::open(input)?;
        self.gen_transforms(&mut source)
    }

    /// Second pass: warp frames from the start of `source` and write them to `sink`.
    ///
    /// Returns the number of frames written. Frames beyond the generated
    /// transforms are not written; an empty first pass writes nothing.
    pub fn apply_transforms(&mut self, source: &mut dyn FrameSource, sink: &mut dyn FrameSink) -> StabResult<usize> {
        if !self.prepared {
            return Err(StabError::NoTransforms);
        }

        let corrections = self.corrections();
        let mut warper: Option<FrameWarper> = None;
        let mut previous_layer: Option<Frame> = None;
        let mut written = 0;

        while written < corrections.len() {
            let Some(frame) = next_non_empty(source)? else {
                break;
            };

            let active = *warper.get_or_insert_with(|| self.make_warper(&corrections, frame.width, frame.height));

            let mut out = active.warp(&frame, &corrections[written])?;
            if let Some(layer) = &self.layer {
                out = apply_layer_func(out, previous_layer.as_ref(), layer)?;
                previous_layer = Some(out.clone());
            }
            sink.write_frame(&out)?;
            written += 1;
        }
        sink.finish()?;

        if written < corrections.len() {
            warn!(written, expected = corrections.len(), "source ended before every transform was applied");
        }
        info!(written, "transforms applied");
        Ok(written)
    }

    /// Both passes over a re-readable source.
    ///
    /// A single-pass source is refused before any frame is read.
    pub fn stabilize(&mut self, source: &mut dyn FrameSource, sink: &mut dyn FrameSink) -> StabResult<usize> {
        if !source.is_rewindable() {
            return Err(StabError::SourceNotRewindable);
        }
        self.gen_transforms(source)?;
        source.rewind()?;
        self.apply_transforms(source, sink)
    }

    /// Both passes from an image sequence directory into another
    pub fn stabilize_path(&mut self, input: impl AsRef<Path>, output: impl AsRef<Path>) -> StabResult<usize> {
        let mut source = ImageSequenceSource::open(input)?;
        let mut sink = ImageSequenceSink::create(output)?;
        self.stabilize(&mut source, &mut sink)
    }

    fn make_warper(&self, corrections: &[Transform], width: usize, height: usize) -> FrameWarper {
        let config = &self.settings.config;
        let border = match config.border.size {
            BorderSize::Fixed(b) => b as usize,
            BorderSize::Auto => {
                let (w, h) = self.frame_size.unwrap_or((width, height));
                auto_border_size(corrections, w, h)
            }
        };
        debug!(border, mode = ?config.border.mode, "border resolved");
        FrameWarper::new(border, config.border.mode, config.crop_to_original)
    }
}

/// Next frame, treating an empty frame like the end of the stream
fn next_non_empty(source: &mut dyn FrameSource) -> StabResult<Option<Frame>> {
    Ok(source.next_frame()?.filter(|f| !f.is_empty()))
}

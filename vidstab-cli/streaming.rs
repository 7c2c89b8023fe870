use tracing::{debug, info, warn};
use vidstab_core::{BorderSize, Frame, Transform};
use vidstab_motion::{apply_layer_func, FrameWarper, LayerFn, Smoothed, SmootherState, StreamingSmoother};

use crate::error::{StabError, StabResult};
use crate::motion::FrameMotion;
use crate::settings::StabilizerSettings;

/// Result of feeding one frame (or the end-of-stream signal) to the streaming stabilizer
#[derive(Debug, Clone, PartialEq)]
pub enum StreamOutput {
    /// Still filling the look-ahead window
    Pending,
    Frame(Frame),
    /// Every buffered frame has been emitted
    EndOfStream,
}

impl StreamOutput {
    pub fn into_frame(self) -> Option<Frame> {
        match self {
            StreamOutput::Frame(f) => Some(f),
            _ => None,
        }
    }

    pub fn is_end(&self) -> bool {
        matches!(self, StreamOutput::EndOfStream)
    }
}

/// Correction applied to the most recently emitted frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EmittedCorrection {
    pub index: usize,
    pub raw: Transform,
    pub smoothed: Transform,
    pub correction: Transform,
}

/// One-pass stabilizer with `O(window)` memory.
///
/// Frames are pushed one at a time with [`stabilize_frame`](Self::stabilize_frame).
/// Each frame waits until `smoothing_window` later frames have arrived, so the
/// output lags the input by that many frames; passing `None` flushes the rest.
/// Emitted frames are identical to what the two-pass [`Stabilizer`](crate::Stabilizer)
/// produces for the same input and settings.
#[derive(Debug)]
pub struct StreamingStabilizer {
    motion: FrameMotion,
    smoother: StreamingSmoother<Frame>,
    warper: FrameWarper,
    layer: Option<LayerFn>,
    previous_layer: Option<Frame>,
    last: Option<EmittedCorrection>,
    emitted: usize,
}

impl StreamingStabilizer {
    /// Fails on an automatic border size, which needs the full trajectory
    pub fn new(settings: StabilizerSettings) -> StabResult<Self> {
        let config = &settings.config;
        let border = match config.border.size {
            BorderSize::Fixed(b) => b as usize,
            BorderSize::Auto => {
                return Err(StabError::InvalidOption {
                    option: "border".to_string(),
                    reason: "automatic border size is only available in batch mode".to_string(),
                })
            }
        };

        Ok(Self {
            motion: FrameMotion::new(&settings)?,
            smoother: StreamingSmoother::new(config.smoothing_window),
            warper: FrameWarper::new(border, config.border.mode, config.crop_to_original),
            layer: None,
            previous_layer: None,
            last: None,
            emitted: 0,
        })
    }

    pub fn with_layer(mut self, layer: LayerFn) -> Self {
        self.layer = Some(layer);
        self
    }

    pub fn state(&self) -> SmootherState {
        self.smoother.state()
    }

    /// Frames held back waiting for their look-ahead
    pub fn buffered(&self) -> usize {
        self.smoother.pending()
    }

    pub fn frames_in(&self) -> usize {
        self.motion.frames()
    }

    pub fn frames_out(&self) -> usize {
        self.emitted
    }

    pub fn degraded_frames(&self) -> usize {
        self.motion.degraded()
    }

    pub fn last_correction(&self) -> Option<&EmittedCorrection> {
        self.last.as_ref()
    }

    /// Feed the next frame, or `None` (or an empty frame) once input has ended.
    ///
    /// After the end signal every call emits one buffered frame until
    /// [`StreamOutput::EndOfStream`] is returned.
    pub fn stabilize_frame(&mut self, frame: Option<Frame>) -> StabResult<StreamOutput> {
        let frame = frame.filter(|f| !f.is_empty());

        match (frame, self.smoother.state()) {
            (Some(frame), SmootherState::Accumulating | SmootherState::Streaming) => {
                let step = self.motion.observe(&frame)?;
                match self.smoother.push(step.trajectory, frame) {
                    Some(ready) => self.emit(ready).map(StreamOutput::Frame),
                    None => Ok(StreamOutput::Pending),
                }
            }
            (frame, state) => {
                if frame.is_some() {
                    warn!(?state, "frame received after end of stream, ignoring");
                }
                if state != SmootherState::Done && state != SmootherState::Draining {
                    debug!(buffered = self.smoother.pending(), "end of stream, draining");
                }
                match self.smoother.drain_next() {
                    Some(ready) => self.emit(ready).map(StreamOutput::Frame),
                    None => {
                        if self.emitted > 0 || self.motion.frames() > 0 {
                            info!(frames = self.emitted, degraded = self.motion.degraded(), "stream finished");
                        }
                        Ok(StreamOutput::EndOfStream)
                    }
                }
            }
        }
    }

    /// Signal end of input and collect every remaining frame
    pub fn finish(&mut self) -> StabResult<Vec<Frame>> {
        let mut out = Vec::with_capacity(self.smoother.pending());
        while let StreamOutput::Frame(frame) = self.stabilize_frame(None)? {
            out.push(frame);
        }
        Ok(out)
    }

    fn emit(&mut self, ready: Smoothed<Frame>) -> StabResult<Frame> {
        let correction = ready.correction();
        let mut out = self.warper.warp(&ready.payload, &correction)?;
        if let Some(layer) = &self.layer {
            out = apply_layer_func(out, self.previous_layer.as_ref(), layer)?;
            self.previous_layer = Some(out.clone());
        }

        self.last = Some(EmittedCorrection {
            index: ready.index,
            raw: ready.raw,
            smoothed: ready.smoothed,
            correction,
        });
        self.emitted += 1;
        Ok(out)
    }
}

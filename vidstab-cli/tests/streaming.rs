mod common;

use common::*;
use vidstab_cli::{
    BorderConfig, BorderMode, SmootherState, Stabilizer, StreamOutput, StreamingStabilizer, VecSource,
};
use vidstab_core::Frame;

fn run_stream(stabilizer: &mut StreamingStabilizer, frames: Vec<Frame>) -> Vec<Frame> {
    let mut out = Vec::new();
    for frame in frames {
        if let StreamOutput::Frame(f) = stabilizer.stabilize_frame(Some(frame)).unwrap() {
            out.push(f);
        }
    }
    out.extend(stabilizer.finish().unwrap());
    out
}

#[test]
fn streaming_output_matches_batch() {
    let frames = frames_at(&shaky_offsets(20));
    let window = 3;
    let border = BorderConfig::fixed(4, BorderMode::Reflect);

    let mut batch_out: Vec<Frame> = Vec::new();
    let mut batch = Stabilizer::new(settings(window).with_border(border)).unwrap();
    batch.stabilize(&mut VecSource::new(frames.clone()), &mut batch_out).unwrap();

    let mut streaming = StreamingStabilizer::new(settings(window).with_border(border)).unwrap();
    let stream_out = run_stream(&mut streaming, frames);

    assert_eq!(stream_out.len(), batch_out.len());
    for (s, b) in stream_out.iter().zip(&batch_out) {
        assert_eq!(s.index, b.index);
        assert_eq!(s, b, "frame {} differs between modes", s.index);
    }

    let last = streaming.last_correction().unwrap();
    assert_eq!(last.index, 19);
    let batch_last = batch.corrections()[19];
    assert!(last.correction.approx_eq(&batch_last, 1e-9));
}

#[test]
fn output_lags_input_by_window() {
    let frames = frames_at(&shaky_offsets(10));
    let window = 3;
    let mut stabilizer = StreamingStabilizer::new(settings(window)).unwrap();

    for (i, frame) in frames.into_iter().enumerate() {
        let out = stabilizer.stabilize_frame(Some(frame)).unwrap();
        if i < window {
            assert_eq!(out, StreamOutput::Pending);
            assert_eq!(stabilizer.state(), SmootherState::Accumulating);
        } else {
            assert_eq!(out.into_frame().unwrap().index, i - window);
            assert_eq!(stabilizer.state(), SmootherState::Streaming);
        }
        assert!(stabilizer.buffered() <= window + 1);
    }
    assert_eq!(stabilizer.finish().unwrap().len(), window);
}

#[test]
fn short_sequence_emits_every_frame_once() {
    // 3 frames with a window of 2 * 4 + 1
    let frames = frames_at(&shaky_offsets(3));
    let mut stabilizer = StreamingStabilizer::new(settings(4)).unwrap();

    for frame in frames {
        assert_eq!(stabilizer.stabilize_frame(Some(frame)).unwrap(), StreamOutput::Pending);
    }

    let mut emitted = Vec::new();
    loop {
        match stabilizer.stabilize_frame(None).unwrap() {
            StreamOutput::Frame(f) => {
                assert!(matches!(stabilizer.state(), SmootherState::Draining | SmootherState::Done));
                emitted.push(f.index);
            }
            StreamOutput::EndOfStream => break,
            StreamOutput::Pending => panic!("pending after end of stream"),
        }
    }

    assert_eq!(emitted, vec![0, 1, 2]);
    assert_eq!(stabilizer.state(), SmootherState::Done);
    assert!(stabilizer.stabilize_frame(None).unwrap().is_end());
}

#[test]
fn memory_stays_bounded_on_long_streams() {
    let window = 2;
    let mut stabilizer = StreamingStabilizer::new(settings(window)).unwrap();
    let mut emitted = 0;
    for (i, &(dx, dy)) in shaky_offsets(60).iter().enumerate() {
        if stabilizer.stabilize_frame(Some(textured_frame(i, dx, dy, 1))).unwrap() != StreamOutput::Pending {
            emitted += 1;
        }
        assert!(stabilizer.buffered() <= window + 1);
    }
    emitted += stabilizer.finish().unwrap().len();
    assert_eq!(emitted, 60);
    assert_eq!(stabilizer.frames_out(), 60);
}

#[test]
fn bordered_stream_frames() {
    let mut stabilizer =
        StreamingStabilizer::new(settings(1).with_border(BorderConfig::fixed(5, BorderMode::BLACK))).unwrap();
    let out = run_stream(&mut stabilizer, frames_at(&shaky_offsets(4)));
    assert_eq!(out.len(), 4);
    assert!(out.iter().all(|f| f.dimensions() == (WIDTH + 10, HEIGHT + 10)));
}

use std::collections::VecDeque;

use tracing::{trace, warn};
use vidstab_core::Transform;

/// Mean of a run of trajectory entries, summed in sequence order.
///
/// Batch and streaming smoothing both go through here so that they agree
/// bit for bit on every index.
fn window_mean<'a, I>(entries: I) -> Transform
where
    I: IntoIterator<Item = &'a Transform>,
{
    let mut sum = Transform::IDENTITY;
    let mut count = 0usize;
    for t in entries {
        sum += *t;
        count += 1;
    }
    if count == 0 {
        return Transform::IDENTITY;
    }
    let n = count as f64;
    Transform::new(sum.dx / n, sum.dy / n, sum.da / n)
}

/// Centered moving average with the window clipped at both ends of the sequence.
///
/// `smoothed[i]` is the mean of `trajectory[max(0, i - radius) ..= min(n - 1, i + radius)]`,
/// so entries near the boundaries average fewer neighbours on one side.
pub fn smooth(trajectory: &[Transform], radius: usize) -> Vec<Transform> {
    if radius == 0 {
        return trajectory.to_vec();
    }
    let n = trajectory.len();
    (0..n)
        .map(|i| {
            let lo = i.saturating_sub(radius);
            let hi = (i + radius).min(n - 1);
            window_mean(&trajectory[lo..=hi])
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmootherState {
    /// Waiting for the first entry's look-ahead; nothing emitted yet
    Accumulating,
    /// One emission per pushed entry
    Streaming,
    /// Input ended, flushing the remaining entries with a shrinking window
    Draining,
    /// Everything emitted
    Done,
}

/// One smoothed trajectory entry together with whatever was pushed alongside it
#[derive(Debug, Clone, PartialEq)]
pub struct Smoothed<T> {
    pub index: usize,
    pub raw: Transform,
    pub smoothed: Transform,
    pub payload: T,
}

impl<T> Smoothed<T> {
    /// Transform that moves this entry from its raw onto its smoothed position
    pub fn correction(&self) -> Transform {
        self.smoothed - self.raw
    }
}

/// Bounded look-ahead version of [`smooth`].
///
/// Entry `e` is emitted as soon as entry `e + radius` has been pushed, or
/// during draining once input has ended. The history kept for averaging
/// never exceeds `2 * radius + 1` trajectory entries and at most
/// `radius + 1` payloads wait for emission. Every emitted value equals
/// `smooth(full_trajectory, radius)[e]`.
#[derive(Debug, Clone)]
pub struct StreamingSmoother<T> {
    radius: usize,
    history: VecDeque<Transform>,
    /// Sequence index of `history[0]`
    history_start: usize,
    pending: VecDeque<T>,
    next_emit: usize,
    pushed: usize,
    state: SmootherState,
}

impl<T> StreamingSmoother<T> {
    pub fn new(radius: usize) -> Self {
        Self {
            radius,
            history: VecDeque::with_capacity(2 * radius + 1),
            history_start: 0,
            pending: VecDeque::with_capacity(radius + 1),
            next_emit: 0,
            pushed: 0,
            state: SmootherState::Accumulating,
        }
    }

    pub fn radius(&self) -> usize {
        self.radius
    }

    /// Maximum number of trajectory entries held at once
    pub fn capacity(&self) -> usize {
        2 * self.radius + 1
    }

    pub fn state(&self) -> SmootherState {
        self.state
    }

    /// Trajectory entries currently held
    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    /// Payloads waiting for emission
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub fn pushed(&self) -> usize {
        self.pushed
    }

    /// Add the next trajectory entry; returns the entry that became ready, if any
    pub fn push(&mut self, raw: Transform, payload: T) -> Option<Smoothed<T>> {
        if matches!(self.state, SmootherState::Draining | SmootherState::Done) {
            warn!(index = self.pushed, "entry pushed after end of stream, ignoring");
            return None;
        }

        self.history.push_back(raw);
        self.pending.push_back(payload);
        self.pushed += 1;

        if self.pushed > self.next_emit + self.radius {
            self.state = SmootherState::Streaming;
            self.emit()
        } else {
            trace!(buffered = self.history.len(), "accumulating");
            None
        }
    }

    /// Signal end of input; remaining entries come out of [`drain_next`](Self::drain_next)
    pub fn finish(&mut self) {
        self.state = if self.pending.is_empty() {
            SmootherState::Done
        } else {
            SmootherState::Draining
        };
    }

    /// Next entry while draining; `None` once everything has been emitted
    pub fn drain_next(&mut self) -> Option<Smoothed<T>> {
        match self.state {
            SmootherState::Draining => {
                let out = self.emit();
                if self.pending.is_empty() {
                    self.state = SmootherState::Done;
                }
                out
            }
            SmootherState::Done => None,
            _ => {
                self.finish();
                self.drain_next()
            }
        }
    }

    /// Finish and collect everything still buffered
    pub fn drain(&mut self) -> Vec<Smoothed<T>> {
        self.finish();
        std::iter::from_fn(|| self.drain_next()).collect()
    }

    fn emit(&mut self) -> Option<Smoothed<T>> {
        let payload = self.pending.pop_front()?;
        let index = self.next_emit;

        let lo = index.saturating_sub(self.radius) - self.history_start;
        let hi = (index + self.radius).min(self.pushed - 1) - self.history_start;
        let raw = self.history[index - self.history_start];
        let smoothed = if self.radius == 0 {
            raw
        } else {
            window_mean(self.history.range(lo..=hi))
        };

        self.next_emit += 1;
        // Drop history the next window no longer reaches
        let keep_from = self.next_emit.saturating_sub(self.radius);
        while self.history_start < keep_from && !self.history.is_empty() {
            self.history.pop_front();
            self.history_start += 1;
        }

        Some(Smoothed {
            index,
            raw,
            smoothed,
            payload,
        })
    }
}

use vidstab_core::Transform;

/// Running cumulative sum of per-frame transforms.
///
/// Entry `i` of the trajectory is the component-wise sum of transforms
/// `0..=i`. Angles are summed without wrapping.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TrajectoryBuilder {
    current: Transform,
    len: usize,
}

impl TrajectoryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accumulate one transform and return the new trajectory entry
    pub fn append(&mut self, transform: Transform) -> Transform {
        self.current += transform;
        self.len += 1;
        self.current
    }

    /// Latest trajectory entry, identity before the first append
    pub fn current(&self) -> Transform {
        self.current
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Cumulative trajectory of a whole transform sequence
pub fn cumulative_sum(transforms: &[Transform]) -> Vec<Transform> {
    let mut builder = TrajectoryBuilder::new();
    transforms.iter().map(|&t| builder.append(t)).collect()
}

/// Check if there are at least `min_count` consecutive true values in the circular array
/// using a branch-free bitmask approach
pub fn has_consecutive_pixels(pixels: &[bool; 16], min_count: usize) -> bool {
    if min_count > 16 || min_count == 0 {
        return false;
    }

    let mut mask: u16 = 0;
    for (i, &pixel) in pixels.iter().enumerate() {
        if pixel {
            mask |= 1 << i;
        }
    }

    // A run of n bits survives n-1 rotate-and-AND steps
    let mut test_mask = mask;
    for i in 1..min_count {
        let shifted = mask.rotate_left(i as u32);
        test_mask &= shifted;
        if test_mask == 0 {
            return false;
        }
    }

    test_mask != 0
}

/// Clamp a signed coordinate into `0..size`
#[inline]
pub fn clamp_coord(c: i64, size: usize) -> usize {
    c.clamp(0, size as i64 - 1) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arc(start: usize, len: usize) -> [bool; 16] {
        let mut ring = [false; 16];
        for k in 0..len {
            ring[(start + k) % 16] = true;
        }
        ring
    }

    #[test]
    fn run_length_is_exact() {
        let ring = arc(3, 9);
        assert!(has_consecutive_pixels(&ring, 9));
        assert!(!has_consecutive_pixels(&ring, 10));
    }

    #[test]
    fn runs_wrap_past_the_last_index() {
        assert!(has_consecutive_pixels(&arc(12, 9), 9));
        assert!(has_consecutive_pixels(&arc(15, 12), 12));
    }

    #[test]
    fn alternating_ring_has_only_unit_runs() {
        let mut ring = [false; 16];
        for slot in ring.iter_mut().step_by(2) {
            *slot = true;
        }
        assert!(has_consecutive_pixels(&ring, 1));
        assert!(!has_consecutive_pixels(&ring, 2));
        assert!(!has_consecutive_pixels(&ring, 0));
        assert!(!has_consecutive_pixels(&[true; 16], 17));
    }

    #[test]
    fn clamp_coord_saturates_both_ends() {
        assert_eq!(clamp_coord(-3, 10), 0);
        assert_eq!(clamp_coord(12, 10), 9);
        assert_eq!(clamp_coord(4, 10), 4);
    }
}

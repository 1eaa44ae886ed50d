//! The 32 operator routings of the six-operator architecture.
//!
//! Operators are numbered 1-6. Every modulation link runs from a higher
//! operator to a lower one, so evaluating OP6 down to OP1 sees each
//! modulator's output before its targets.

use tb_ir::fm_patch::{ALGORITHMS, OPERATORS};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Algorithm {
    /// `modulators[i]` has bit j set when OP(j+1) modulates OP(i+1)
    pub modulators: [u8; OPERATORS],
    /// Bit i set when OP(i+1) is audible
    pub carriers: u8,
    /// Operator (1-6) with self-feedback
    pub feedback: u8,
}

impl Algorithm {
    #[inline]
    pub fn is_carrier(&self, op: usize) -> bool {
        self.carriers & (1 << op) != 0
    }

    pub fn carrier_count(&self) -> u32 {
        self.carriers.count_ones()
    }

    /// Table lookup by zero-based algorithm number, clamped.
    pub fn get(index: u8) -> &'static Algorithm {
        &TABLE[(index as usize).min(ALGORITHMS - 1)]
    }
}

const fn alg(carriers: &[u8], links: &[(u8, u8)], feedback: u8) -> Algorithm {
    let mut mask = 0u8;
    let mut i = 0;
    while i < carriers.len() {
        mask |= 1 << (carriers[i] - 1);
        i += 1;
    }
    let mut modulators = [0u8; OPERATORS];
    let mut j = 0;
    while j < links.len() {
        let (from, to) = links[j];
        modulators[(to - 1) as usize] |= 1 << (from - 1);
        j += 1;
    }
    Algorithm { modulators, carriers: mask, feedback }
}

const ALL: &[u8] = &[1, 2, 3, 4, 5, 6];
const FIVE: &[u8] = &[1, 2, 3, 4, 5];

pub static TABLE: [Algorithm; ALGORITHMS] = [
    alg(&[1, 3], &[(2, 1), (4, 3), (5, 4), (6, 5)], 6),
    alg(&[1, 3], &[(2, 1), (4, 3), (5, 4), (6, 5)], 2),
    alg(&[1, 4], &[(2, 1), (3, 2), (5, 4), (6, 5)], 6),
    alg(&[1, 4], &[(2, 1), (3, 2), (5, 4), (6, 5)], 6),
    alg(&[1, 3, 5], &[(2, 1), (4, 3), (6, 5)], 6),
    alg(&[1, 3, 5], &[(2, 1), (4, 3), (6, 5)], 6),
    alg(&[1, 3], &[(2, 1), (4, 3), (5, 3), (6, 5)], 6),
    alg(&[1, 3], &[(2, 1), (4, 3), (5, 3), (6, 5)], 4),
    alg(&[1, 3], &[(2, 1), (4, 3), (5, 3), (6, 5)], 2),
    alg(&[1, 4], &[(2, 1), (3, 2), (5, 4), (6, 4)], 3),
    alg(&[1, 4], &[(2, 1), (3, 2), (5, 4), (6, 4)], 6),
    alg(&[1, 3], &[(2, 1), (4, 3), (5, 3), (6, 3)], 2),
    alg(&[1, 3], &[(2, 1), (4, 3), (5, 3), (6, 3)], 6),
    alg(&[1, 3], &[(2, 1), (4, 3), (5, 4), (6, 4)], 6),
    alg(&[1, 3], &[(2, 1), (4, 3), (5, 4), (6, 4)], 2),
    alg(&[1], &[(2, 1), (3, 1), (5, 1), (4, 3), (6, 5)], 6),
    alg(&[1], &[(2, 1), (3, 1), (5, 1), (4, 3), (6, 5)], 2),
    alg(&[1], &[(2, 1), (3, 1), (4, 1), (5, 4), (6, 5)], 3),
    alg(&[1, 4, 5], &[(2, 1), (3, 2), (6, 4), (6, 5)], 6),
    alg(&[1, 2, 4], &[(3, 1), (3, 2), (5, 4), (6, 4)], 3),
    alg(&[1, 2, 4, 5], &[(3, 1), (3, 2), (6, 4), (6, 5)], 3),
    alg(&[1, 3, 4, 5], &[(2, 1), (6, 3), (6, 4), (6, 5)], 6),
    alg(&[1, 2, 4, 5], &[(3, 2), (6, 4), (6, 5)], 6),
    alg(FIVE, &[(6, 3), (6, 4), (6, 5)], 6),
    alg(FIVE, &[(6, 4), (6, 5)], 6),
    alg(&[1, 2, 4], &[(3, 2), (5, 4), (6, 4)], 6),
    alg(&[1, 2, 4], &[(3, 2), (5, 4), (6, 4)], 3),
    alg(&[1, 3, 6], &[(2, 1), (4, 3), (5, 4)], 5),
    alg(&[1, 2, 3, 5], &[(4, 3), (6, 5)], 6),
    alg(&[1, 2, 3, 6], &[(4, 3), (5, 4)], 5),
    alg(FIVE, &[(6, 5)], 6),
    alg(ALL, &[], 6),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn links_run_downward() {
        for (n, a) in TABLE.iter().enumerate() {
            for (target, mask) in a.modulators.iter().enumerate() {
                let below = (1u8 << (target + 1)) - 1;
                assert_eq!(mask & below, 0, "algorithm {}", n + 1);
            }
        }
    }

    #[test]
    fn every_algorithm_has_a_carrier_and_valid_feedback() {
        for a in &TABLE {
            assert!(a.carrier_count() >= 1);
            assert!((1..=6).contains(&a.feedback));
            assert!(a.is_carrier(0));
        }
        assert_eq!(Algorithm::get(31).carrier_count(), 6);
        assert_eq!(Algorithm::get(200), Algorithm::get(31));
    }

    #[test]
    fn first_algorithm_stacks() {
        let a = Algorithm::get(0);
        assert_eq!(a.carriers, 0b000101);
        assert_eq!(a.modulators[0], 0b000010);
        assert_eq!(a.modulators[2], 0b001000);
        assert_eq!(a.modulators[4], 0b100000);
    }
}

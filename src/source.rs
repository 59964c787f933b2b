use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::catalog::PieceType;

// ============================================================================
// Piece Source Trait
// ============================================================================

/// Supplies fresh piece types and shuffle indices.
///
/// Every random decision the engine makes goes through this trait, so a seeded
/// or scripted source makes a level fully reproducible.
pub trait PieceSource {
    /// A type in `[0, type_count)`.
    fn next_type(&mut self, type_count: u8) -> PieceType;

    /// An index in `[0, bound)`. `bound` is never zero.
    fn next_index(&mut self, bound: usize) -> usize;
}

pub struct RandomPieceSource {
    rng: StdRng,
}

impl RandomPieceSource {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Default for RandomPieceSource {
    fn default() -> Self {
        Self::new()
    }
}

impl PieceSource for RandomPieceSource {
    fn next_type(&mut self, type_count: u8) -> PieceType {
        PieceType(self.rng.gen_range(0..type_count.max(1)))
    }

    fn next_index(&mut self, bound: usize) -> usize {
        self.rng.gen_range(0..bound.max(1))
    }
}

/// Cycles through a fixed list of types. Shuffle indices count upward and
/// wrap at the requested bound.
pub struct SequencePieceSource {
    types: Vec<u8>,
    index: usize,
    draws: usize,
}

impl SequencePieceSource {
    pub fn new(types: Vec<u8>) -> Self {
        Self {
            types,
            index: 0,
            draws: 0,
        }
    }
}

impl PieceSource for SequencePieceSource {
    fn next_type(&mut self, type_count: u8) -> PieceType {
        if self.types.is_empty() {
            return PieceType(0);
        }
        let value = self.types[self.index % self.types.len()];
        self.index += 1;
        PieceType(value % type_count.max(1))
    }

    fn next_index(&mut self, bound: usize) -> usize {
        let value = self.draws % bound.max(1);
        self.draws += 1;
        value
    }
}

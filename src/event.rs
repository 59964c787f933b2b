use crate::catalog::{ObstacleKind, PieceType, SpecialKind};
use crate::grid::{Piece, Pos};
use crate::objective::Verdict;

/// One discrete change to the board, in the order it happened. A presentation
/// layer can replay these to animate a move without re-deriving any logic.
#[derive(Clone, PartialEq, Debug)]
pub enum ResolutionEvent {
    Swapped {
        a: Pos,
        b: Pos,
    },
    /// The swap produced no match and was undone.
    SwapReverted {
        a: Pos,
        b: Pos,
    },
    Matched {
        depth: u32,
        cells: Vec<Pos>,
        score: u32,
    },
    SpecialActivated {
        pos: Pos,
        kind: SpecialKind,
        affected: Vec<Pos>,
    },
    ObstacleDamaged {
        pos: Pos,
        kind: ObstacleKind,
        /// Zero means the obstacle is gone.
        hp_left: u8,
    },
    /// Cells emptied this step.
    Cleared {
        cells: Vec<Pos>,
    },
    SpecialCreated {
        pos: Pos,
        piece_type: PieceType,
        kind: SpecialKind,
    },
    Dropped {
        from: Pos,
        to: Pos,
    },
    Refilled {
        pos: Pos,
        piece_type: PieceType,
    },
    Reshuffled {
        pieces: Vec<(Pos, Piece)>,
    },
    LevelEnded {
        verdict: Verdict,
    },
}

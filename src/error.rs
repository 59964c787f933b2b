use thiserror::Error;

use crate::grid::Pos;

/// Fatal problems found when a level is started. A level that fails here never
/// produces a board.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("grid must be at least 3x3, got {rows}x{cols}")]
    GridTooSmall { rows: usize, cols: usize },

    #[error("piece type count must be at least 3, got {0}")]
    TooFewPieceTypes(u8),

    #[error("objective references piece type {piece_type} but the level only has {type_count} types")]
    UnknownPieceType { piece_type: u8, type_count: u8 },

    #[error("obstacle at {0:?} is outside the board")]
    ObstacleOutOfBounds(Pos),

    #[error("more than one obstacle placed at {0:?}")]
    DuplicateObstacle(Pos),

    #[error("obstacle at {0:?} has zero hit points")]
    ZeroHpObstacle(Pos),

    #[error("level has neither a move limit nor a time limit")]
    NoExhaustionLimit,

    #[error("move and time limits must be positive")]
    EmptyLimit,

    #[error("boss objective needs positive hit points")]
    BossWithoutHp,

    #[error("board has no legal move after {attempts} generation attempts")]
    NoLegalMoves { attempts: u32 },

    #[error("board is {found_rows}x{found_cols}, level expects {rows}x{cols}")]
    GridMismatch {
        rows: usize,
        cols: usize,
        found_rows: usize,
        found_cols: usize,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("level parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Why a command was refused. A refused command leaves the level untouched.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("engine is busy or the level is over")]
    NotIdle,

    #[error("cell is outside the board")]
    OutOfBounds,

    #[error("cells are not adjacent")]
    NotAdjacent,

    #[error("cell cannot move")]
    Immovable,

    #[error("cell is mid-transition")]
    InTransition,

    #[error("consumable is disabled for this level")]
    ConsumableDisabled,

    #[error("consumable has no effect here")]
    Inapplicable,

    #[error("nothing to clear")]
    NothingToClear,
}

//! Piece identifiers, special-piece kinds and obstacle kinds.
//!
//! Everything here is plain data plus classification queries; nothing in this
//! module touches a grid.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::grid::Pos;

// ============================================================================
// Configuration
// ============================================================================

/// Fewest distinct piece types a level may declare.
pub const MIN_PIECE_TYPES: u8 = 3;

/// Shortest run that counts as a match.
pub const MIN_RUN: usize = 3;

pub const ICE_DEFAULT_HP: u8 = 2;
pub const VINE_DEFAULT_HP: u8 = 1;

// ============================================================================
// Types
// ============================================================================

/// Index of a piece colour in `[0, piece_type_count)`.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PieceType(pub u8);

impl PieceType {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpecialKind {
    #[default]
    None,
    /// Clears its whole row when activated.
    LineRow,
    /// Clears its whole column when activated.
    LineCol,
    /// Clears the 8 surrounding cells.
    Bomb,
    /// Clears every other piece of its type.
    Rainbow,
}

impl SpecialKind {
    pub fn is_special(self) -> bool {
        self != SpecialKind::None
    }

    /// Used to settle two groups that want to place a special on the same cell.
    pub fn rank(self) -> u8 {
        match self {
            SpecialKind::None => 0,
            SpecialKind::LineRow | SpecialKind::LineCol => 1,
            SpecialKind::Bomb => 2,
            SpecialKind::Rainbow => 3,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObstacleKind {
    Ice,
    Vine,
    Stone,
}

impl ObstacleKind {
    /// Stone occupies its cell on its own: no piece underneath, never moves.
    pub fn is_immovable(self) -> bool {
        self == ObstacleKind::Stone
    }

    /// Hit points given to a placement that does not name any.
    ///
    /// Stone has none: a stone without explicit hp is unbreakable.
    pub fn default_hp(self) -> Option<u8> {
        match self {
            ObstacleKind::Ice => Some(ICE_DEFAULT_HP),
            ObstacleKind::Vine => Some(VINE_DEFAULT_HP),
            ObstacleKind::Stone => None,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Axis {
    Horizontal,
    Vertical,
}

// ============================================================================
// Classification
// ============================================================================

/// Decides which special piece a match group earns.
///
/// Rules, first hit wins:
/// 1. five or more cells: rainbow
/// 2. four or more cells spanning at least two rows and two columns: bomb
/// 3. exactly four cells in one row: `LineCol`; in one column: `LineRow`;
///    otherwise the axis of the swap decides the same way
/// 4. anything else: no special
pub fn classify_match_group(cells: &[Pos], swap_axis: Option<Axis>) -> SpecialKind {
    let count = cells.len();
    if count >= 5 {
        return SpecialKind::Rainbow;
    }

    let rows: BTreeSet<usize> = cells.iter().map(|p| p.row).collect();
    let cols: BTreeSet<usize> = cells.iter().map(|p| p.col).collect();

    if count >= 4 && rows.len() >= 2 && cols.len() >= 2 {
        return SpecialKind::Bomb;
    }

    if count == 4 {
        if rows.len() == 1 {
            return SpecialKind::LineCol;
        }
        if cols.len() == 1 {
            return SpecialKind::LineRow;
        }
        return match swap_axis {
            Some(Axis::Vertical) => SpecialKind::LineRow,
            Some(Axis::Horizontal) | None => SpecialKind::LineCol,
        };
    }

    SpecialKind::None
}

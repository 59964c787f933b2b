//! The board: a fixed `rows × cols` matrix of cells plus a per-cell
//! "mid-transition" flag.

use std::ops::Index;

use serde::{Deserialize, Serialize};

use crate::catalog::{Axis, ObstacleKind, PieceType, SpecialKind};
use crate::source::PieceSource;

// ============================================================================
// Types
// ============================================================================

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
pub struct Pos {
    pub row: usize,
    pub col: usize,
}

impl Pos {
    pub const fn new(row: usize, col: usize) -> Self {
        Self { row, col }
    }

    /// True for orthogonal neighbours only.
    pub fn is_adjacent(self, other: Pos) -> bool {
        self.row.abs_diff(other.row) + self.col.abs_diff(other.col) == 1
    }

    /// Axis of a swap between two adjacent cells.
    pub fn axis_to(self, other: Pos) -> Option<Axis> {
        if !self.is_adjacent(other) {
            return None;
        }
        if self.row == other.row {
            Some(Axis::Horizontal)
        } else {
            Some(Axis::Vertical)
        }
    }
}

/// Ice or vine attached to a piece. Stone is a cell shape of its own.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Obstacle {
    pub kind: ObstacleKind,
    pub hp: u8,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Piece {
    pub piece_type: PieceType,
    pub special: SpecialKind,
    pub obstacle: Option<Obstacle>,
}

impl Piece {
    pub fn plain(piece_type: PieceType) -> Self {
        Self {
            piece_type,
            special: SpecialKind::None,
            obstacle: None,
        }
    }

    pub fn special(piece_type: PieceType, special: SpecialKind) -> Self {
        Self {
            piece_type,
            special,
            obstacle: None,
        }
    }

    pub fn with_obstacle(mut self, kind: ObstacleKind, hp: u8) -> Self {
        self.obstacle = Some(Obstacle { kind, hp });
        self
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Cell {
    /// Only exists mid-resolution, between clearing and refill.
    Empty,
    Piece(Piece),
    /// Immovable obstacle. `hp: None` is unbreakable.
    Stone { hp: Option<u8> },
}

impl Cell {
    pub fn piece(&self) -> Option<&Piece> {
        match self {
            Cell::Piece(piece) => Some(piece),
            _ => None,
        }
    }

    pub fn piece_mut(&mut self) -> Option<&mut Piece> {
        match self {
            Cell::Piece(piece) => Some(piece),
            _ => None,
        }
    }

    pub fn piece_type(&self) -> Option<PieceType> {
        self.piece().map(|p| p.piece_type)
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Cell::Empty)
    }

    pub fn is_stone(&self) -> bool {
        matches!(self, Cell::Stone { .. })
    }

    pub fn has_movable_obstacle(&self) -> bool {
        self.piece().is_some_and(|p| p.obstacle.is_some())
    }

    pub fn is_special(&self) -> bool {
        self.piece().is_some_and(|p| p.special.is_special())
    }
}

/// One piece moved by gravity.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Drop {
    pub from: Pos,
    pub to: Pos,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Grid {
    rows: usize,
    cols: usize,
    cells: Vec<Cell>,
    in_transition: Vec<bool>,
}

// ============================================================================
// Grid
// ============================================================================

impl Grid {
    /// A board of `Empty` cells.
    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            cells: vec![Cell::Empty; rows * cols],
            in_transition: vec![false; rows * cols],
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn contains(&self, pos: Pos) -> bool {
        pos.row < self.rows && pos.col < self.cols
    }

    fn offset(&self, pos: Pos) -> usize {
        pos.row * self.cols + pos.col
    }

    pub fn get(&self, pos: Pos) -> Option<&Cell> {
        if self.contains(pos) {
            Some(&self.cells[self.offset(pos)])
        } else {
            None
        }
    }

    pub fn get_mut(&mut self, pos: Pos) -> Option<&mut Cell> {
        if self.contains(pos) {
            let offset = self.offset(pos);
            Some(&mut self.cells[offset])
        } else {
            None
        }
    }

    /// Writes `cell` at `pos`; out-of-range positions are ignored.
    pub fn set(&mut self, pos: Pos, cell: Cell) {
        if let Some(slot) = self.get_mut(pos) {
            *slot = cell;
        }
    }

    pub fn swap(&mut self, a: Pos, b: Pos) {
        if self.contains(a) && self.contains(b) {
            let (ia, ib) = (self.offset(a), self.offset(b));
            self.cells.swap(ia, ib);
        }
    }

    /// Every position in row-major order.
    pub fn positions(&self) -> impl Iterator<Item = Pos> {
        let cols = self.cols;
        (0..self.rows).flat_map(move |row| (0..cols).map(move |col| Pos::new(row, col)))
    }

    pub fn neighbors4(&self, pos: Pos) -> Vec<Pos> {
        self.neighbors(pos, false)
    }

    pub fn neighbors8(&self, pos: Pos) -> Vec<Pos> {
        self.neighbors(pos, true)
    }

    fn neighbors(&self, pos: Pos, diagonal: bool) -> Vec<Pos> {
        let mut out = Vec::with_capacity(8);
        for dr in -1i64..=1 {
            for dc in -1i64..=1 {
                if (dr == 0 && dc == 0) || (!diagonal && dr != 0 && dc != 0) {
                    continue;
                }
                let row = pos.row as i64 + dr;
                let col = pos.col as i64 + dc;
                if row >= 0 && col >= 0 {
                    let p = Pos::new(row as usize, col as usize);
                    if self.contains(p) {
                        out.push(p);
                    }
                }
            }
        }
        out
    }

    pub fn count_empty(&self) -> usize {
        self.cells.iter().filter(|c| c.is_empty()).count()
    }

    /// Obstacles still standing. Stone, breakable or not, only counts when
    /// `include_stone` is set.
    pub fn count_obstacles(&self, include_stone: bool) -> usize {
        self.cells
            .iter()
            .filter(|cell| match cell {
                Cell::Piece(piece) => piece.obstacle.is_some(),
                Cell::Stone { .. } => include_stone,
                _ => false,
            })
            .count()
    }

    // ------------------------------------------------------------------------
    // Transition lock
    // ------------------------------------------------------------------------

    pub fn mark_transition(&mut self, pos: Pos) {
        if self.contains(pos) {
            let offset = self.offset(pos);
            self.in_transition[offset] = true;
        }
    }

    pub fn is_in_transition(&self, pos: Pos) -> bool {
        self.contains(pos) && self.in_transition[self.offset(pos)]
    }

    pub fn clear_transitions(&mut self) {
        self.in_transition.iter_mut().for_each(|flag| *flag = false);
    }

    // ------------------------------------------------------------------------
    // Gravity and refill
    // ------------------------------------------------------------------------

    /// Compacts pieces downward in every column, keeping their order.
    ///
    /// Stone never moves and splits its column: pieces above a stone settle
    /// on top of it.
    pub fn apply_gravity(&mut self) -> Vec<Drop> {
        let mut drops = Vec::new();
        for col in 0..self.cols {
            let mut write = self.rows as i64 - 1;
            for row in (0..self.rows).rev() {
                let pos = Pos::new(row, col);
                let cell = self[pos];
                match cell {
                    Cell::Stone { .. } => write = row as i64 - 1,
                    Cell::Empty => {}
                    Cell::Piece(_) => {
                        let target = Pos::new(write as usize, col);
                        if target != pos {
                            self.swap(pos, target);
                            drops.push(Drop {
                                from: pos,
                                to: target,
                            });
                        }
                        write -= 1;
                    }
                }
            }
        }
        drops
    }

    /// Fills every `Empty` cell with a fresh plain piece, column by column,
    /// bottom-most first.
    pub fn refill(&mut self, type_count: u8, source: &mut dyn PieceSource) -> Vec<(Pos, PieceType)> {
        let mut filled = Vec::new();
        for col in 0..self.cols {
            for row in (0..self.rows).rev() {
                let pos = Pos::new(row, col);
                if self[pos].is_empty() {
                    let piece_type = source.next_type(type_count);
                    self.set(pos, Cell::Piece(Piece::plain(piece_type)));
                    filled.push((pos, piece_type));
                }
            }
        }
        filled
    }

    /// Force-fills cells that should never be empty at rest. Returns what was
    /// repaired; a healthy board returns nothing.
    pub fn repair_empty(&mut self, type_count: u8, source: &mut dyn PieceSource) -> Vec<(Pos, PieceType)> {
        if self.count_empty() == 0 {
            return Vec::new();
        }
        self.refill(type_count, source)
    }
}

impl Index<Pos> for Grid {
    type Output = Cell;

    fn index(&self, pos: Pos) -> &Cell {
        debug_assert!(self.contains(pos), "position {pos:?} outside the board");
        &self.cells[self.offset(pos)]
    }
}

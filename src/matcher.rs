//! Run detection over rows and columns, and the legal-move queries built on it.

use std::collections::BTreeSet;

use crate::catalog::{Axis, PieceType, MIN_RUN};
use crate::grid::{Cell, Grid, Pos};

/// One straight run of three or more equal pieces.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct MatchGroup {
    pub cells: Vec<Pos>,
    pub axis: Axis,
    pub piece_type: PieceType,
}

impl MatchGroup {
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Middle cell of the run, rounding toward the start.
    pub fn center(&self) -> Pos {
        self.cells[self.cells.len() / 2]
    }
}

fn matchable_type(cell: &Cell) -> Option<PieceType> {
    match cell {
        Cell::Piece(piece) => Some(piece.piece_type),
        Cell::Empty | Cell::Stone { .. } => None,
    }
}

fn scan_line(grid: &Grid, line: &[Pos], axis: Axis, out: &mut Vec<MatchGroup>) {
    let mut start = 0;
    while start < line.len() {
        let Some(piece_type) = matchable_type(&grid[line[start]]) else {
            start += 1;
            continue;
        };
        let mut len = 1;
        while start + len < line.len() && matchable_type(&grid[line[start + len]]) == Some(piece_type) {
            len += 1;
        }
        if len >= MIN_RUN {
            out.push(MatchGroup {
                cells: line[start..start + len].to_vec(),
                axis,
                piece_type,
            });
        }
        start += len;
    }
}

/// Every run, rows first (top to bottom) then columns (left to right).
///
/// A cell on two perpendicular runs shows up in both groups.
pub fn find_match_groups(grid: &Grid) -> Vec<MatchGroup> {
    let mut groups = Vec::new();
    for row in 0..grid.rows() {
        let line: Vec<Pos> = (0..grid.cols()).map(|col| Pos::new(row, col)).collect();
        scan_line(grid, &line, Axis::Horizontal, &mut groups);
    }
    for col in 0..grid.cols() {
        let line: Vec<Pos> = (0..grid.rows()).map(|row| Pos::new(row, col)).collect();
        scan_line(grid, &line, Axis::Vertical, &mut groups);
    }
    groups
}

/// Union of all runs, each cell once.
pub fn find_matched_cells(grid: &Grid) -> BTreeSet<Pos> {
    find_match_groups(grid)
        .into_iter()
        .flat_map(|group| group.cells)
        .collect()
}

pub fn has_match(grid: &Grid) -> bool {
    !find_match_groups(grid).is_empty()
}

fn swappable(grid: &Grid, pos: Pos) -> bool {
    grid.get(pos).is_some_and(|cell| cell.piece().is_some())
}

/// Candidate swaps: each piece with its right and its bottom neighbour.
fn candidate_swaps(grid: &Grid) -> Vec<(Pos, Pos)> {
    let mut out = Vec::new();
    for pos in grid.positions() {
        if !swappable(grid, pos) {
            continue;
        }
        for other in [Pos::new(pos.row, pos.col + 1), Pos::new(pos.row + 1, pos.col)] {
            if swappable(grid, other) {
                out.push((pos, other));
            }
        }
    }
    out
}

/// True as soon as one swap would produce a match. The grid is left exactly
/// as it was found.
pub fn has_any_legal_move(grid: &mut Grid) -> bool {
    for (a, b) in candidate_swaps(grid) {
        grid.swap(a, b);
        let matched = has_match(grid);
        grid.swap(a, b);
        if matched {
            return true;
        }
    }
    false
}

/// The legal swap whose immediate match clears the most cells. Ties go to the
/// first candidate in row-major order.
pub fn find_best_move(grid: &mut Grid) -> Option<(Pos, Pos)> {
    let mut best: Option<((Pos, Pos), usize)> = None;
    for (a, b) in candidate_swaps(grid) {
        grid.swap(a, b);
        let cleared = find_matched_cells(grid).len();
        grid.swap(a, b);
        if cleared > 0 && best.map_or(true, |(_, most)| cleared > most) {
            best = Some(((a, b), cleared));
        }
    }
    best.map(|(swap, _)| swap)
}

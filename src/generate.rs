//! Board generation without pre-existing matches, and deadlock reshuffles.

use std::collections::BTreeMap;

use tracing::{debug, warn};

use crate::catalog::PieceType;
use crate::config::ObstaclePlacement;
use crate::grid::{Cell, Grid, Piece, Pos};
use crate::matcher::{has_any_legal_move, has_match};
use crate::source::PieceSource;

/// Draws per cell before a type that completes a run is accepted anyway.
pub const CELL_RETRY_LIMIT: u32 = 50;

/// Whole-board regenerations before the last attempt is kept.
pub const BOARD_RETRY_LIMIT: u32 = 100;

pub const RESHUFFLE_RETRY_LIMIT: u32 = 50;

/// True when `piece_type` at `pos` would finish a run of three with the two
/// cells to its left or the two cells above it.
fn would_match_at(grid: &Grid, pos: Pos, piece_type: PieceType) -> bool {
    let same = |p: Pos| grid.get(p).and_then(Cell::piece_type) == Some(piece_type);
    let left = pos.col >= 2 && same(Pos::new(pos.row, pos.col - 1)) && same(Pos::new(pos.row, pos.col - 2));
    let up = pos.row >= 2 && same(Pos::new(pos.row - 1, pos.col)) && same(Pos::new(pos.row - 2, pos.col));
    left || up
}

fn pick_type(grid: &Grid, pos: Pos, type_count: u8, source: &mut dyn PieceSource) -> PieceType {
    let mut piece_type = source.next_type(type_count);
    let mut attempts = 1;
    while attempts < CELL_RETRY_LIMIT && would_match_at(grid, pos, piece_type) {
        piece_type = source.next_type(type_count);
        attempts += 1;
    }
    piece_type
}

fn generate_once(
    rows: usize,
    cols: usize,
    type_count: u8,
    placements: &BTreeMap<Pos, ObstaclePlacement>,
    source: &mut dyn PieceSource,
) -> Grid {
    let mut grid = Grid::new(rows, cols);

    for (pos, placement) in placements {
        if placement.kind.is_immovable() {
            grid.set(*pos, Cell::Stone { hp: placement.hp });
        }
    }

    for pos in (0..rows).flat_map(|row| (0..cols).map(move |col| Pos::new(row, col))) {
        if grid[pos].is_stone() {
            continue;
        }
        let mut piece = Piece::plain(pick_type(&grid, pos, type_count, source));
        if let Some(placement) = placements.get(&pos) {
            if let Some(hp) = placement.effective_hp() {
                piece = piece.with_obstacle(placement.kind, hp);
            }
        }
        grid.set(pos, Cell::Piece(piece));
    }

    grid
}

/// Fills a fresh board honouring the obstacle layout.
///
/// Regenerates the whole board while it has a match or no legal move, up to
/// [`BOARD_RETRY_LIMIT`] times; the last attempt is returned either way, so
/// callers that need guarantees must check the result.
pub fn generate(
    rows: usize,
    cols: usize,
    type_count: u8,
    obstacles: &[ObstaclePlacement],
    source: &mut dyn PieceSource,
) -> Grid {
    let placements: BTreeMap<Pos, ObstaclePlacement> = obstacles.iter().map(|o| (o.pos(), *o)).collect();

    let mut grid = generate_once(rows, cols, type_count, &placements, source);
    let mut attempts = 1;
    while attempts < BOARD_RETRY_LIMIT && (has_match(&grid) || !has_any_legal_move(&mut grid)) {
        grid = generate_once(rows, cols, type_count, &placements, source);
        attempts += 1;
    }
    debug!(rows, cols, attempts, "board generated");
    grid
}

/// Cells whose pieces take part in a reshuffle: pieces without an obstacle.
fn shuffle_slots(grid: &Grid) -> Vec<Pos> {
    grid.positions()
        .filter(|pos| grid[*pos].piece().is_some_and(|p| p.obstacle.is_none()))
        .collect()
}

/// Redistributes the free pieces so the board has no match and at least one
/// legal move.
///
/// Pieces keep their special kind as they move. After
/// [`RESHUFFLE_RETRY_LIMIT`] failed shuffles the free cells are re-rolled with
/// the generation rules instead. Returns whether the final board is playable.
pub fn reshuffle(grid: &mut Grid, type_count: u8, source: &mut dyn PieceSource) -> bool {
    let slots = shuffle_slots(grid);
    let mut pieces: Vec<Piece> = slots.iter().filter_map(|pos| grid[*pos].piece().copied()).collect();

    for attempt in 1..=RESHUFFLE_RETRY_LIMIT {
        for i in (1..pieces.len()).rev() {
            let j = source.next_index(i + 1);
            pieces.swap(i, j);
        }
        for (pos, piece) in slots.iter().zip(&pieces) {
            grid.set(*pos, Cell::Piece(*piece));
        }
        if !has_match(grid) && has_any_legal_move(grid) {
            debug!(attempt, "board reshuffled");
            return true;
        }
    }

    warn!(
        attempts = RESHUFFLE_RETRY_LIMIT,
        "reshuffle kept failing, re-rolling free cells"
    );
    for _ in 0..BOARD_RETRY_LIMIT {
        for pos in &slots {
            let special = grid[*pos].piece().map(|p| p.special).unwrap_or_default();
            grid.set(*pos, Cell::Empty);
            let piece_type = pick_type(grid, *pos, type_count, source);
            grid.set(*pos, Cell::Piece(Piece::special(piece_type, special)));
        }
        if !has_match(grid) && has_any_legal_move(grid) {
            return true;
        }
    }
    false
}


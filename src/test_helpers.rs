//! Board and level builders shared by the integration tests.

use crate::catalog::{ObstacleKind, PieceType};
use crate::config::LevelConfig;
use crate::engine::Engine;
use crate::grid::{Cell, Grid, Piece, Pos};
use crate::objective::Objective;
use crate::source::SequencePieceSource;

/// Builds a grid from one string per row: digits are piece types, `#` is
/// unbreakable stone, `.` is an empty cell.
pub fn grid_from_rows(rows: &[&str]) -> Grid {
    let cols = rows.first().map_or(0, |row| row.len());
    let mut grid = Grid::new(rows.len(), cols);
    for (row, line) in rows.iter().enumerate() {
        assert_eq!(line.len(), cols, "row {row} has the wrong width");
        for (col, ch) in line.chars().enumerate() {
            let cell = match ch {
                '#' => Cell::Stone { hp: None },
                '.' => Cell::Empty,
                digit => {
                    let value = digit.to_digit(10).unwrap_or_else(|| panic!("bad cell {digit:?}"));
                    Cell::Piece(Piece::plain(PieceType(value as u8)))
                }
            };
            grid.set(Pos::new(row, col), cell);
        }
    }
    grid
}

/// Puts an obstacle on the piece already at `pos`.
pub fn add_obstacle(grid: &mut Grid, pos: Pos, kind: ObstacleKind, hp: u8) {
    let piece = grid[pos].piece().copied().expect("obstacle needs a piece");
    grid.set(pos, Cell::Piece(piece.with_obstacle(kind, hp)));
}

pub fn place_special(grid: &mut Grid, pos: Pos, special: crate::catalog::SpecialKind) {
    let piece = grid[pos].piece().copied().expect("special needs a piece");
    grid.set(pos, Cell::Piece(Piece::special(piece.piece_type, special)));
}

/// Types along one row, `None` for stone and empty cells.
pub fn row_types(grid: &Grid, row: usize) -> Vec<Option<u8>> {
    (0..grid.cols())
        .map(|col| grid[Pos::new(row, col)].piece_type().map(|t| t.0))
        .collect()
}

pub fn level(rows: usize, cols: usize, type_count: u8, objective: Objective) -> LevelConfig {
    LevelConfig {
        rows,
        cols,
        piece_type_count: type_count,
        objective,
        ..LevelConfig::default()
    }
}

pub fn score_level(rows: usize, cols: usize, type_count: u8, target: u32, moves: u32) -> LevelConfig {
    LevelConfig {
        moves_limit: Some(moves),
        ..level(rows, cols, type_count, Objective::Score { target })
    }
}

/// Engine over a hand-built board whose refills cycle through `refill`.
pub fn engine_on(config: LevelConfig, grid: Grid, refill: Vec<u8>) -> Engine {
    Engine::with_grid(config, grid, Box::new(SequencePieceSource::new(refill))).expect("valid level")
}

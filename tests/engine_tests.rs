//! Tests for move resolution and level flow.
//!
//! Test categories:
//! - Swap validation
//! - Scoring and combos
//! - Special pieces
//! - Obstacles
//! - Objectives and level end
//! - Clock
//! - Consumables
//! - Construction and queries

use std::collections::BTreeMap;

use match3::catalog::{ObstacleKind, PieceType, SpecialKind};
use match3::config::{ConsumableKind, LevelConfig, ObstaclePlacement};
use match3::engine::{Consumable, Engine, Line, Phase};
use match3::error::{ConfigError, Rejection};
use match3::event::ResolutionEvent;
use match3::grid::{Cell, Grid, Obstacle, Pos};
use match3::matcher::{has_any_legal_move, has_match};
use match3::objective::{CollectGoal, Objective, Verdict};
use match3::source::{RandomPieceSource, SequencePieceSource};
use match3::test_helpers::*;

fn p(row: usize, col: usize) -> Pos {
    Pos::new(row, col)
}

/// 8x8, seven types, no matches. Swapping (3,2) with (4,2) lines up three 2s
/// across row 4.
const BOARD_A: [&str; 8] = [
    "01234560", "34560123", "60123456", "23256012", "22012345", "12345601", "45201234", "01234560",
];
const REFILL_A: [u8; 3] = [5, 6, 5];

/// Swapping (4,0) with (5,0) clears three 0s on row 5; column 0 then drops a
/// 1 next to the two 1s already waiting there.
const COMBO_BOARD: [&str; 6] = ["432410", "410120", "112241", "234122", "021004", "200113"];
const COMBO_REFILL: [u8; 3] = [3, 4, 2];

/// Ice goes on (5,0). The first swap clears row 5 beside it; the second
/// clears column 0 above it.
const ICE_BOARD: [&str; 6] = ["012340", "304012", "231234", "223401", "124423", "044300"];
const ICE_REFILL: [u8; 3] = [1, 3, 0];

fn board_a_engine(config: LevelConfig) -> Engine {
    engine_on(config, grid_from_rows(&BOARD_A), REFILL_A.to_vec())
}

fn board_a_level() -> LevelConfig {
    score_level(8, 8, 7, 500, 25)
}

fn type_counts(grid: &Grid) -> BTreeMap<PieceType, usize> {
    let mut counts = BTreeMap::new();
    for pos in grid.positions() {
        if let Some(t) = grid[pos].piece_type() {
            *counts.entry(t).or_insert(0) += 1;
        }
    }
    counts
}

fn damage_events(events: &[ResolutionEvent]) -> Vec<(Pos, ObstacleKind, u8)> {
    events
        .iter()
        .filter_map(|event| match event {
            ResolutionEvent::ObstacleDamaged { pos, kind, hp_left } => Some((*pos, *kind, *hp_left)),
            _ => None,
        })
        .collect()
}

// ============================================================================
// Swap Validation Tests
// ============================================================================

mod swap_validation {
    use super::*;

    #[test]
    fn matching_swap_scores_one_move() {
        let mut engine = board_a_engine(board_a_level());

        let report = engine.try_swap(p(3, 2), p(4, 2)).unwrap();

        assert!(report.valid);
        assert_eq!(report.chain_depth, 1);
        assert_eq!(report.score_gained, 45);
        assert_eq!(report.verdict, Verdict::Continue);

        let snapshot = engine.snapshot();
        assert_eq!(snapshot.score, 45);
        assert_eq!(snapshot.combo_depth, 0);
        assert_eq!(snapshot.moves_left, Some(24));
        assert_eq!(snapshot.phase, Phase::Idle);
    }

    #[test]
    fn events_follow_resolution_order() {
        let mut engine = board_a_engine(board_a_level());

        let report = engine.try_swap(p(3, 2), p(4, 2)).unwrap();

        assert_eq!(report.events[0], ResolutionEvent::Swapped { a: p(3, 2), b: p(4, 2) });
        assert_eq!(
            report.events[1],
            ResolutionEvent::Matched {
                depth: 1,
                cells: vec![p(4, 0), p(4, 1), p(4, 2)],
                score: 45,
            }
        );
        assert_eq!(
            report.events[2],
            ResolutionEvent::Cleared {
                cells: vec![p(4, 0), p(4, 1), p(4, 2)],
            }
        );
        let refills = report
            .events
            .iter()
            .filter(|event| matches!(event, ResolutionEvent::Refilled { .. }))
            .count();
        assert_eq!(refills, 3);
        assert!(!report
            .events
            .iter()
            .any(|event| matches!(event, ResolutionEvent::Reshuffled { .. })));
    }

    #[test]
    fn non_matching_swap_is_undone_for_free() {
        let mut engine = board_a_engine(board_a_level());
        let before = engine.grid().clone();

        let report = engine.try_swap(p(0, 0), p(0, 1)).unwrap();

        assert!(!report.valid);
        assert_eq!(report.score_gained, 0);
        assert_eq!(
            report.events,
            vec![
                ResolutionEvent::Swapped { a: p(0, 0), b: p(0, 1) },
                ResolutionEvent::SwapReverted { a: p(0, 0), b: p(0, 1) },
            ]
        );
        assert_eq!(engine.grid(), &before);
        assert_eq!(engine.snapshot().moves_left, Some(25));
        assert_eq!(engine.phase(), Phase::Idle);
    }

    #[test]
    fn non_adjacent_swap_is_rejected() {
        let mut engine = board_a_engine(board_a_level());
        let before = engine.grid().clone();

        assert_eq!(engine.try_swap(p(0, 0), p(0, 2)), Err(Rejection::NotAdjacent));
        assert_eq!(engine.try_swap(p(0, 0), p(1, 1)), Err(Rejection::NotAdjacent));
        assert_eq!(engine.grid(), &before);
    }

    #[test]
    fn out_of_bounds_swap_is_rejected() {
        let mut engine = board_a_engine(board_a_level());
        assert_eq!(engine.try_swap(p(7, 7), p(7, 8)), Err(Rejection::OutOfBounds));
    }

    #[test]
    fn stone_cannot_be_swapped() {
        let mut grid = grid_from_rows(&BOARD_A);
        grid.set(p(7, 7), Cell::Stone { hp: None });
        let mut engine = engine_on(board_a_level(), grid, REFILL_A.to_vec());

        assert_eq!(engine.try_swap(p(7, 6), p(7, 7)), Err(Rejection::Immovable));
        assert_eq!(engine.snapshot().moves_left, Some(25));
    }

    #[test]
    fn board_is_full_after_every_move() {
        let mut engine = engine_on(
            score_level(6, 6, 5, 10_000, 10),
            grid_from_rows(&COMBO_BOARD),
            COMBO_REFILL.to_vec(),
        );
        engine.try_swap(p(4, 0), p(5, 0)).unwrap();

        assert_eq!(engine.grid().count_empty(), 0);
        assert!(!has_match(engine.grid()));
    }
}

// ============================================================================
// Scoring Tests
// ============================================================================

mod scoring {
    use super::*;

    fn combo_engine(objective: Objective) -> Engine {
        let config = LevelConfig {
            moves_limit: Some(10),
            ..level(6, 6, 5, objective)
        };
        engine_on(config, grid_from_rows(&COMBO_BOARD), COMBO_REFILL.to_vec())
    }

    #[test]
    fn cascade_adds_combo_bonus() {
        let mut engine = combo_engine(Objective::Score { target: 10_000 });

        let report = engine.try_swap(p(4, 0), p(5, 0)).unwrap();

        // 3 x 15, then 3 x 15 + 2 x 8.
        assert_eq!(report.chain_depth, 2);
        assert_eq!(report.score_gained, 106);
        let steps: Vec<(u32, u32)> = report
            .events
            .iter()
            .filter_map(|event| match event {
                ResolutionEvent::Matched { depth, score, .. } => Some((*depth, *score)),
                _ => None,
            })
            .collect();
        assert_eq!(steps, vec![(1, 45), (2, 61)]);
        assert_eq!(engine.snapshot().combo_depth, 0);
    }

    #[test]
    fn score_never_decreases() {
        let mut engine = combo_engine(Objective::Score { target: 10_000 });
        let mut last = 0;

        engine.try_swap(p(4, 0), p(5, 0)).unwrap();
        for _ in 0..5 {
            let Some((a, b)) = engine.hint() else { break };
            engine.try_swap(a, b).unwrap();
            let score = engine.snapshot().score;
            assert!(score >= last);
            last = score;
        }
    }

    #[test]
    fn boss_takes_cell_and_combo_damage() {
        let mut engine = combo_engine(Objective::Boss { hp: 100 });

        engine.try_swap(p(4, 0), p(5, 0)).unwrap();

        // 3 x 2, then 3 x 2 + 2 x 3.
        let snapshot = engine.snapshot();
        assert_eq!(snapshot.boss_hp, 82);
        assert_eq!(snapshot.boss_max_hp, 100);
    }

    #[test]
    fn boss_defeated_wins() {
        let mut engine = combo_engine(Objective::Boss { hp: 18 });

        let report = engine.try_swap(p(4, 0), p(5, 0)).unwrap();

        assert_eq!(report.verdict, Verdict::Won);
        assert_eq!(engine.snapshot().boss_hp, 0);
        assert_eq!(report.events.last(), Some(&ResolutionEvent::LevelEnded { verdict: Verdict::Won }));
    }

    #[test]
    fn collect_counts_matched_types() {
        let objective = Objective::Collect {
            items: vec![
                CollectGoal {
                    piece_type: PieceType(0),
                    count: 3,
                },
                CollectGoal {
                    piece_type: PieceType(1),
                    count: 4,
                },
            ],
        };
        let mut engine = combo_engine(objective);

        let report = engine.try_swap(p(4, 0), p(5, 0)).unwrap();

        let snapshot = engine.snapshot();
        assert_eq!(snapshot.collected.get(&PieceType(0)), Some(&3));
        assert_eq!(snapshot.collected.get(&PieceType(1)), Some(&3));
        assert_eq!(report.verdict, Verdict::Continue);
    }

    #[test]
    fn collect_goal_reached_wins() {
        let objective = Objective::Collect {
            items: vec![CollectGoal {
                piece_type: PieceType(0),
                count: 3,
            }],
        };
        let mut engine = combo_engine(objective);

        let report = engine.try_swap(p(4, 0), p(5, 0)).unwrap();

        assert_eq!(report.verdict, Verdict::Won);
        assert_eq!(engine.phase(), Phase::Won);
    }
}

// ============================================================================
// Special Piece Tests
// ============================================================================

mod specials {
    use super::*;

    fn special_at(engine: &Engine, pos: Pos) -> Option<(PieceType, SpecialKind)> {
        engine.grid()[pos].piece().map(|piece| (piece.piece_type, piece.special))
    }

    #[test]
    fn five_in_a_row_makes_rainbow_at_center() {
        let grid = grid_from_rows(&["012340", "234012", "401234", "123401", "341123", "110110"]);
        let mut engine = engine_on(score_level(6, 6, 5, 10_000, 10), grid, vec![2, 3, 4, 0]);

        let report = engine.try_swap(p(4, 2), p(5, 2)).unwrap();

        assert_eq!(report.score_gained, 75);
        assert_eq!(special_at(&engine, p(5, 2)), Some((PieceType(1), SpecialKind::Rainbow)));
        assert!(report.events.contains(&ResolutionEvent::SpecialCreated {
            pos: p(5, 2),
            piece_type: PieceType(1),
            kind: SpecialKind::Rainbow,
        }));
    }

    #[test]
    fn four_in_a_row_makes_column_clearer() {
        let grid = grid_from_rows(&["012340", "234012", "401234", "123401", "341123", "110140"]);
        let mut engine = engine_on(score_level(6, 6, 5, 10_000, 10), grid, vec![2, 3, 4, 0]);

        let report = engine.try_swap(p(4, 2), p(5, 2)).unwrap();

        assert_eq!(report.score_gained, 60);
        assert_eq!(special_at(&engine, p(5, 2)), Some((PieceType(1), SpecialKind::LineCol)));
    }

    #[test]
    fn rainbow_clears_its_type_in_one_pass() {
        let mut grid = grid_from_rows(&["012340", "234012", "401234", "123401", "340123", "012240"]);
        place_special(&mut grid, p(5, 2), SpecialKind::Rainbow);
        let mut after_swap = grid.clone();
        after_swap.swap(p(4, 4), p(5, 4));
        let expected: Vec<Pos> = after_swap
            .positions()
            .filter(|pos| *pos != p(5, 2) && after_swap[*pos].piece_type() == Some(PieceType(2)))
            .collect();
        let mut engine = engine_on(score_level(6, 6, 5, 10_000, 10), grid, vec![0, 1, 3, 4]);

        let report = engine.try_swap(p(4, 4), p(5, 4)).unwrap();

        let activations: Vec<&ResolutionEvent> = report
            .events
            .iter()
            .filter(|event| matches!(event, ResolutionEvent::SpecialActivated { .. }))
            .collect();
        assert_eq!(
            activations,
            vec![&ResolutionEvent::SpecialActivated {
                pos: p(5, 2),
                kind: SpecialKind::Rainbow,
                affected: expected,
            }]
        );
        assert_eq!(report.score_gained, 45);
        let grid = engine.grid();
        assert!(grid.positions().all(|pos| grid[pos].piece_type() != Some(PieceType(2))));
    }

    #[test]
    fn row_clearer_empties_its_row() {
        let mut grid = grid_from_rows(&["012340", "234012", "401234", "123401", "340123", "012240"]);
        place_special(&mut grid, p(5, 2), SpecialKind::LineRow);
        let mut engine = engine_on(score_level(6, 6, 5, 10_000, 10), grid, vec![0, 1, 3, 4]);

        let report = engine.try_swap(p(4, 4), p(5, 4)).unwrap();

        assert!(report.events.contains(&ResolutionEvent::SpecialActivated {
            pos: p(5, 2),
            kind: SpecialKind::LineRow,
            affected: vec![p(5, 0), p(5, 1), p(5, 3), p(5, 4), p(5, 5)],
        }));
        assert!(report.events.contains(&ResolutionEvent::Cleared {
            cells: (0..6).map(|col| p(5, col)).collect(),
        }));
    }

    fn activations(events: &[ResolutionEvent]) -> Vec<(Pos, SpecialKind)> {
        events
            .iter()
            .filter_map(|event| match event {
                ResolutionEvent::SpecialActivated { pos, kind, .. } => Some((*pos, *kind)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn row_clearer_sets_off_a_bomb_in_its_row() {
        let mut grid = grid_from_rows(&["012340", "234012", "401234", "123401", "340123", "012240"]);
        place_special(&mut grid, p(5, 2), SpecialKind::LineRow);
        place_special(&mut grid, p(5, 0), SpecialKind::Bomb);
        let mut engine = engine_on(score_level(6, 6, 5, 10_000, 10), grid, vec![0, 1, 3, 4]);

        let report = engine.try_swap(p(4, 4), p(5, 4)).unwrap();

        assert_eq!(
            activations(&report.events),
            vec![(p(5, 2), SpecialKind::LineRow), (p(5, 0), SpecialKind::Bomb)]
        );
        assert!(report.events.contains(&ResolutionEvent::SpecialActivated {
            pos: p(5, 0),
            kind: SpecialKind::Bomb,
            affected: vec![p(4, 0), p(4, 1), p(5, 1)],
        }));
        assert_eq!(report.score_gained, 45);
    }

    #[test]
    fn specials_reaching_each_other_fire_once() {
        let mut grid = grid_from_rows(&["012340", "234012", "401234", "123401", "340123", "012240"]);
        place_special(&mut grid, p(5, 2), SpecialKind::LineRow);
        place_special(&mut grid, p(5, 1), SpecialKind::Bomb);
        let mut engine = engine_on(score_level(6, 6, 5, 10_000, 10), grid, vec![0, 1, 3, 4]);

        let report = engine.try_swap(p(4, 4), p(5, 4)).unwrap();

        assert_eq!(
            activations(&report.events),
            vec![(p(5, 2), SpecialKind::LineRow), (p(5, 1), SpecialKind::Bomb)]
        );
        assert!(report.events.contains(&ResolutionEvent::SpecialActivated {
            pos: p(5, 1),
            kind: SpecialKind::Bomb,
            affected: vec![p(4, 0), p(4, 1), p(4, 2), p(5, 0), p(5, 2)],
        }));
        let cleared: Vec<Pos> = report
            .events
            .iter()
            .find_map(|event| match event {
                ResolutionEvent::Cleared { cells } => Some(cells.clone()),
                _ => None,
            })
            .unwrap();
        let expected: Vec<Pos> = [p(4, 0), p(4, 1), p(4, 2)]
            .into_iter()
            .chain((0..6).map(|col| p(5, col)))
            .collect();
        assert_eq!(cleared, expected);
    }

    #[test]
    fn two_row_clearers_in_one_row_fire_once_each() {
        let mut grid = grid_from_rows(&["012340", "234012", "401234", "123401", "340123", "012240"]);
        place_special(&mut grid, p(5, 2), SpecialKind::LineRow);
        place_special(&mut grid, p(5, 5), SpecialKind::LineRow);
        let mut engine = engine_on(score_level(6, 6, 5, 10_000, 10), grid, vec![0, 1, 3, 4]);

        let report = engine.try_swap(p(4, 4), p(5, 4)).unwrap();

        assert_eq!(
            activations(&report.events),
            vec![(p(5, 2), SpecialKind::LineRow), (p(5, 5), SpecialKind::LineRow)]
        );
    }

    #[test]
    fn bomb_footprint_is_the_ring() {
        let grid = grid_from_rows(&["012", "120", "201"]);
        let bomb = match3::grid::Piece::special(PieceType(2), SpecialKind::Bomb);

        let affected = match3::engine::activate_special(&grid, p(1, 1), &bomb);

        assert_eq!(affected.len(), 8);
        assert!(!affected.contains(&p(1, 1)));
    }

    #[test]
    fn footprints_skip_stone() {
        let grid = grid_from_rows(&["0#2", "120", "201"]);
        let line = match3::grid::Piece::special(PieceType(0), SpecialKind::LineRow);

        let affected = match3::engine::activate_special(&grid, p(0, 0), &line);

        assert_eq!(affected, vec![p(0, 2)]);
    }
}

// ============================================================================
// Obstacle Tests
// ============================================================================

mod obstacles {
    use super::*;

    fn ice_engine(objective: Objective) -> Engine {
        let mut grid = grid_from_rows(&ICE_BOARD);
        add_obstacle(&mut grid, p(5, 0), ObstacleKind::Ice, 2);
        let config = LevelConfig {
            moves_limit: Some(10),
            ..level(6, 6, 5, objective)
        };
        engine_on(config, grid, ICE_REFILL.to_vec())
    }

    fn ice_at(engine: &Engine, pos: Pos) -> Option<Obstacle> {
        engine.grid()[pos].piece().and_then(|piece| piece.obstacle)
    }

    #[test]
    fn ice_loses_one_hp_per_adjacent_step() {
        let mut engine = ice_engine(Objective::Score { target: 10_000 });

        let first = engine.try_swap(p(4, 3), p(5, 3)).unwrap();
        assert_eq!(damage_events(&first.events), vec![(p(5, 0), ObstacleKind::Ice, 1)]);
        assert_eq!(
            ice_at(&engine, p(5, 0)),
            Some(Obstacle {
                kind: ObstacleKind::Ice,
                hp: 1,
            })
        );

        let second = engine.try_swap(p(4, 0), p(4, 1)).unwrap();
        assert_eq!(damage_events(&second.events), vec![(p(5, 0), ObstacleKind::Ice, 0)]);
        assert_eq!(ice_at(&engine, p(5, 0)), None);

        let piece = engine.grid()[p(5, 0)].piece().copied().unwrap();
        assert_eq!(piece.piece_type, PieceType(0));
        assert_eq!(piece.special, SpecialKind::None);
    }

    #[test]
    fn clearing_all_ice_wins() {
        let mut engine = ice_engine(Objective::Clear { include_stone: false });

        let first = engine.try_swap(p(4, 3), p(5, 3)).unwrap();
        assert_eq!(first.verdict, Verdict::Continue);
        assert_eq!(engine.snapshot().obstacles_left, 1);

        let second = engine.try_swap(p(4, 0), p(4, 1)).unwrap();
        assert_eq!(second.verdict, Verdict::Won);
        assert_eq!(engine.snapshot().obstacles_left, 0);
    }

    #[test]
    fn matched_iced_piece_is_cleared_with_its_ice() {
        let mut grid = grid_from_rows(&BOARD_A);
        add_obstacle(&mut grid, p(4, 1), ObstacleKind::Ice, 2);
        let mut engine = engine_on(board_a_level(), grid, REFILL_A.to_vec());

        let report = engine.try_swap(p(3, 2), p(4, 2)).unwrap();

        assert_eq!(report.chain_depth, 1);
        assert_eq!(report.score_gained, 45);
        assert!(report.events.contains(&ResolutionEvent::Cleared {
            cells: vec![p(4, 0), p(4, 1), p(4, 2)],
        }));
        let piece = engine.grid()[p(4, 1)].piece().copied().unwrap();
        assert_eq!(piece.piece_type, PieceType(3));
        assert_eq!(piece.obstacle, None);
        assert_eq!(engine.grid().count_obstacles(false), 0);
    }

    #[test]
    fn fully_iced_run_is_matched_once() {
        let mut grid = grid_from_rows(&BOARD_A);
        for pos in [p(4, 0), p(4, 1), p(3, 2)] {
            add_obstacle(&mut grid, pos, ObstacleKind::Ice, 2);
        }
        let mut engine = engine_on(board_a_level(), grid, REFILL_A.to_vec());

        let report = engine.try_swap(p(3, 2), p(4, 2)).unwrap();

        let matches: Vec<&ResolutionEvent> = report
            .events
            .iter()
            .filter(|event| matches!(event, ResolutionEvent::Matched { .. }))
            .collect();
        assert_eq!(
            matches,
            vec![&ResolutionEvent::Matched {
                depth: 1,
                cells: vec![p(4, 0), p(4, 1), p(4, 2)],
                score: 45,
            }]
        );
        assert_eq!(report.chain_depth, 1);
        assert_eq!(report.score_gained, 45);
        assert_eq!(engine.grid().count_obstacles(false), 0);
    }

    #[test]
    fn breakable_stone_crumbles_and_column_refills() {
        let mut grid = grid_from_rows(&["012340", "304012", "231234", "223401", "124423", "0443#0"]);
        grid.set(p(5, 4), Cell::Stone { hp: Some(1) });
        let mut engine = engine_on(score_level(6, 6, 5, 10_000, 10), grid, ICE_REFILL.to_vec());

        let report = engine.try_swap(p(4, 3), p(5, 3)).unwrap();

        assert_eq!(damage_events(&report.events), vec![(p(5, 4), ObstacleKind::Stone, 0)]);
        let grid = engine.grid();
        assert!(grid.positions().all(|pos| !grid[pos].is_stone()));
        assert_eq!(grid.count_empty(), 0);
    }

    #[test]
    fn unbreakable_stone_ignores_adjacent_clears() {
        let mut grid = grid_from_rows(&["012340", "304012", "231234", "223401", "124423", "0443#0"]);
        grid.set(p(5, 4), Cell::Stone { hp: None });
        let mut engine = engine_on(score_level(6, 6, 5, 10_000, 10), grid, ICE_REFILL.to_vec());

        let report = engine.try_swap(p(4, 3), p(5, 3)).unwrap();

        assert!(damage_events(&report.events).is_empty());
        assert_eq!(engine.grid()[p(5, 4)], Cell::Stone { hp: None });
    }
}

// ============================================================================
// Level End Tests
// ============================================================================

mod level_end {
    use super::*;

    fn stone_board() -> Grid {
        let mut grid = grid_from_rows(&BOARD_A);
        grid.set(p(7, 7), Cell::Stone { hp: None });
        grid
    }

    #[test]
    fn last_move_without_objective_loses() {
        let mut engine = board_a_engine(score_level(8, 8, 7, 500, 1));

        let report = engine.try_swap(p(3, 2), p(4, 2)).unwrap();

        assert!(report.valid);
        assert_eq!(report.verdict, Verdict::Lost);
        assert_eq!(engine.snapshot().moves_left, Some(0));
        assert_eq!(engine.phase(), Phase::Lost);
        assert_eq!(report.events.last(), Some(&ResolutionEvent::LevelEnded { verdict: Verdict::Lost }));
    }

    #[test]
    fn invalid_last_swap_keeps_level_alive() {
        let mut engine = board_a_engine(score_level(8, 8, 7, 500, 1));

        let report = engine.try_swap(p(0, 0), p(0, 1)).unwrap();

        assert!(!report.valid);
        assert_eq!(report.verdict, Verdict::Continue);
        assert_eq!(engine.snapshot().moves_left, Some(1));
    }

    #[test]
    fn reaching_target_on_last_move_wins() {
        let mut engine = board_a_engine(score_level(8, 8, 7, 45, 1));

        let report = engine.try_swap(p(3, 2), p(4, 2)).unwrap();

        assert_eq!(report.verdict, Verdict::Won);
        assert_eq!(engine.phase(), Phase::Won);
    }

    #[test]
    fn finished_level_rejects_commands() {
        let mut engine = board_a_engine(score_level(8, 8, 7, 500, 1));
        engine.try_swap(p(3, 2), p(4, 2)).unwrap();

        assert_eq!(engine.try_swap(p(3, 0), p(3, 1)), Err(Rejection::NotIdle));
        assert_eq!(engine.activate_consumable(Consumable::Shuffle), Err(Rejection::NotIdle));
        assert_eq!(engine.force_reshuffle(), Err(Rejection::NotIdle));
        assert_eq!(engine.hint(), None);
    }

    #[test]
    fn counted_stone_blocks_a_clear_win() {
        let config = LevelConfig {
            moves_limit: Some(1),
            ..level(8, 8, 7, Objective::Clear { include_stone: true })
        };
        let mut engine = engine_on(config, stone_board(), REFILL_A.to_vec());

        let report = engine.try_swap(p(3, 2), p(4, 2)).unwrap();

        assert_eq!(report.verdict, Verdict::Lost);
        assert_eq!(engine.snapshot().obstacles_left, 1);
    }

    #[test]
    fn uncounted_stone_does_not_block_a_clear_win() {
        let config = LevelConfig {
            moves_limit: Some(5),
            ..level(8, 8, 7, Objective::Clear { include_stone: false })
        };
        let mut engine = engine_on(config, stone_board(), REFILL_A.to_vec());

        let report = engine.try_swap(p(3, 2), p(4, 2)).unwrap();

        assert_eq!(report.verdict, Verdict::Won);
        assert_eq!(engine.snapshot().obstacles_left, 0);
    }
}

// ============================================================================
// Clock Tests
// ============================================================================

mod clock {
    use super::*;

    fn timed_level(seconds: f64) -> LevelConfig {
        LevelConfig {
            moves_limit: None,
            time_limit: Some(seconds),
            ..board_a_level()
        }
    }

    #[test]
    fn tick_counts_down() {
        let mut engine = board_a_engine(timed_level(10.0));

        assert_eq!(engine.tick(4.0), Verdict::Continue);
        assert_eq!(engine.snapshot().time_left, Some(6.0));
    }

    #[test]
    fn running_out_of_time_loses() {
        let mut engine = board_a_engine(timed_level(10.0));

        assert_eq!(engine.tick(12.5), Verdict::Lost);
        assert_eq!(engine.snapshot().time_left, Some(0.0));
        assert_eq!(engine.phase(), Phase::Lost);
        assert_eq!(engine.try_swap(p(3, 2), p(4, 2)), Err(Rejection::NotIdle));
    }

    #[test]
    fn untimed_level_ignores_ticks() {
        let mut engine = board_a_engine(board_a_level());

        assert_eq!(engine.tick(1_000.0), Verdict::Continue);
        assert_eq!(engine.snapshot().time_left, None);
        assert_eq!(engine.phase(), Phase::Idle);
    }

    #[test]
    fn negative_tick_is_ignored() {
        let mut engine = board_a_engine(timed_level(10.0));

        engine.tick(-5.0);
        assert_eq!(engine.snapshot().time_left, Some(10.0));
    }

    #[test]
    fn timed_swaps_do_not_use_moves() {
        let mut engine = board_a_engine(timed_level(30.0));

        engine.try_swap(p(3, 2), p(4, 2)).unwrap();
        assert_eq!(engine.snapshot().moves_left, None);
        assert_eq!(engine.phase(), Phase::Idle);
    }
}

// ============================================================================
// Consumable Tests
// ============================================================================

mod consumables {
    use super::*;

    #[test]
    fn line_clear_empties_a_row() {
        let mut engine = board_a_engine(board_a_level());

        let report = engine.activate_consumable(Consumable::LineClear(Line::Row(0))).unwrap();

        assert_eq!(
            report.events[0],
            ResolutionEvent::Cleared {
                cells: (0..8).map(|col| p(0, col)).collect(),
            }
        );
        assert!(report.score_gained >= 120);
        assert_eq!(engine.snapshot().score, report.score_gained);
        assert_eq!(engine.snapshot().moves_left, Some(25));
        assert_eq!(engine.grid().count_empty(), 0);
    }

    #[test]
    fn area_clear_in_a_corner_is_clipped() {
        let mut engine = board_a_engine(board_a_level());

        let report = engine
            .activate_consumable(Consumable::AreaClear { center: Some(p(0, 0)) })
            .unwrap();

        assert_eq!(
            report.events[0],
            ResolutionEvent::Cleared {
                cells: vec![p(0, 0), p(0, 1), p(1, 0), p(1, 1)],
            }
        );
        assert!(report.score_gained >= 60);
    }

    #[test]
    fn area_clear_defaults_to_board_center() {
        let mut engine = board_a_engine(board_a_level());

        let report = engine.activate_consumable(Consumable::AreaClear { center: None }).unwrap();

        match &report.events[0] {
            ResolutionEvent::Cleared { cells } => {
                assert_eq!(cells.len(), 9);
                assert!(cells.contains(&p(4, 4)));
            }
            other => panic!("unexpected first event {other:?}"),
        }
    }

    #[test]
    fn type_clear_removes_one_type() {
        let mut engine = board_a_engine(board_a_level());
        let threes = type_counts(engine.grid())[&PieceType(3)];

        let report = engine
            .activate_consumable(Consumable::TypeClear {
                piece_type: Some(PieceType(3)),
            })
            .unwrap();

        match &report.events[0] {
            ResolutionEvent::Cleared { cells } => assert_eq!(cells.len(), threes),
            other => panic!("unexpected first event {other:?}"),
        }
        assert!(report.score_gained >= 20 * threes as u32);
    }

    #[test]
    fn random_type_clear_picks_a_present_type() {
        let mut engine = board_a_engine(board_a_level());

        let report = engine.activate_consumable(Consumable::TypeClear { piece_type: None }).unwrap();

        assert!(report.valid);
        assert!(report.score_gained > 0);
    }

    #[test]
    fn unknown_type_is_inapplicable() {
        let mut engine = board_a_engine(board_a_level());

        let result = engine.activate_consumable(Consumable::TypeClear {
            piece_type: Some(PieceType(9)),
        });

        assert_eq!(result, Err(Rejection::Inapplicable));
    }

    #[test]
    fn off_board_targets_are_rejected() {
        let mut engine = board_a_engine(board_a_level());
        let before = engine.grid().clone();

        assert_eq!(
            engine.activate_consumable(Consumable::AreaClear { center: Some(p(8, 8)) }),
            Err(Rejection::OutOfBounds)
        );
        assert_eq!(
            engine.activate_consumable(Consumable::LineClear(Line::Col(8))),
            Err(Rejection::OutOfBounds)
        );
        assert_eq!(engine.grid(), &before);
    }

    #[test]
    fn extra_time_adds_moves_when_untimed() {
        let mut engine = board_a_engine(board_a_level());

        engine.activate_consumable(Consumable::ExtraTime).unwrap();

        assert_eq!(engine.snapshot().moves_left, Some(28));
    }

    #[test]
    fn stray_empty_cell_is_repaired_at_command_end() {
        let mut grid = grid_from_rows(&BOARD_A);
        grid.set(p(0, 0), Cell::Empty);
        let mut engine = engine_on(board_a_level(), grid, vec![5]);

        let report = engine.activate_consumable(Consumable::ExtraTime).unwrap();

        assert_eq!(
            report.events,
            vec![ResolutionEvent::Refilled {
                pos: p(0, 0),
                piece_type: PieceType(5),
            }]
        );
        assert_eq!(engine.grid().count_empty(), 0);
    }

    #[test]
    fn extra_time_adds_seconds_when_timed() {
        let config = LevelConfig {
            moves_limit: None,
            time_limit: Some(10.0),
            ..board_a_level()
        };
        let mut engine = board_a_engine(config);

        engine.activate_consumable(Consumable::ExtraTime).unwrap();

        assert_eq!(engine.snapshot().time_left, Some(25.0));
    }

    #[test]
    fn disabled_consumable_is_rejected() {
        let config = LevelConfig {
            disabled_consumables: vec![ConsumableKind::LineClear],
            ..board_a_level()
        };
        let mut engine = board_a_engine(config);

        assert_eq!(
            engine.activate_consumable(Consumable::LineClear(Line::Row(0))),
            Err(Rejection::ConsumableDisabled)
        );
        assert!(engine.activate_consumable(Consumable::ExtraTime).is_ok());
    }

    #[test]
    fn shuffle_keeps_the_pieces() {
        let mut engine = board_a_engine(board_a_level());
        let before = type_counts(engine.grid());

        let report = engine.activate_consumable(Consumable::Shuffle).unwrap();

        assert_eq!(type_counts(engine.grid()), before);
        assert!(report
            .events
            .iter()
            .any(|event| matches!(event, ResolutionEvent::Reshuffled { .. })));
        assert!(!has_match(engine.grid()));
    }

    #[test]
    fn force_reshuffle_leaves_a_playable_board() {
        let mut engine = board_a_engine(board_a_level());
        let before = type_counts(engine.grid());

        engine.force_reshuffle().unwrap();

        let mut grid = engine.grid().clone();
        assert_eq!(type_counts(&grid), before);
        assert!(has_any_legal_move(&mut grid));
        assert_eq!(engine.snapshot().moves_left, Some(25));
    }
}

// ============================================================================
// Construction and Query Tests
// ============================================================================

mod construction {
    use super::*;

    #[test]
    fn default_level_starts_playable() {
        let engine = Engine::new(LevelConfig::default()).unwrap();
        let mut grid = engine.grid().clone();

        assert_eq!(grid.rows(), 8);
        assert_eq!(grid.cols(), 8);
        assert!(!has_match(&grid));
        assert!(has_any_legal_move(&mut grid));
        assert_eq!(engine.phase(), Phase::Idle);
    }

    #[test]
    fn seeded_levels_repeat() {
        let config = LevelConfig {
            seed: Some(1234),
            ..LevelConfig::default()
        };
        let a = Engine::new(config.clone()).unwrap();
        let b = Engine::new(config).unwrap();

        assert_eq!(a.grid(), b.grid());
    }

    #[test]
    fn obstacles_from_config_are_on_the_board() {
        let config = LevelConfig {
            seed: Some(7),
            obstacles: vec![
                ObstaclePlacement::new(0, 0, ObstacleKind::Stone),
                ObstaclePlacement::new(3, 3, ObstacleKind::Vine),
            ],
            objective: Objective::Clear { include_stone: false },
            ..LevelConfig::default()
        };
        let engine = Engine::new(config).unwrap();

        assert!(engine.grid()[p(0, 0)].is_stone());
        assert!(engine.grid()[p(3, 3)].has_movable_obstacle());
        assert_eq!(engine.snapshot().obstacles_left, 1);
    }

    #[test]
    fn invalid_config_is_refused() {
        let config = LevelConfig {
            moves_limit: None,
            time_limit: None,
            ..LevelConfig::default()
        };
        assert!(matches!(Engine::new(config), Err(ConfigError::NoExhaustionLimit)));
    }

    #[test]
    fn hand_built_board_must_fit_the_level() {
        let result = Engine::with_grid(
            LevelConfig::default(),
            grid_from_rows(&COMBO_BOARD),
            Box::new(SequencePieceSource::new(vec![0])),
        );

        assert!(matches!(
            result,
            Err(ConfigError::GridMismatch {
                rows: 8,
                cols: 8,
                found_rows: 6,
                found_cols: 6,
            })
        ));
    }

    #[test]
    fn start_level_replaces_everything() {
        let mut engine = board_a_engine(board_a_level());
        engine.try_swap(p(3, 2), p(4, 2)).unwrap();

        let next = LevelConfig {
            seed: Some(3),
            ..score_level(6, 7, 5, 300, 12)
        };
        engine.start_level(next).unwrap();

        let snapshot = engine.snapshot();
        assert_eq!((snapshot.rows, snapshot.cols), (6, 7));
        assert_eq!(snapshot.score, 0);
        assert_eq!(snapshot.moves_left, Some(12));
        assert_eq!(snapshot.target_score, Some(300));
    }

    #[test]
    fn unseeded_restart_keeps_drawing_from_the_same_source() {
        let first_level = LevelConfig {
            seed: None,
            ..score_level(6, 6, 5, 300, 12)
        };
        let next = LevelConfig {
            seed: None,
            ..level(7, 7, 6, Objective::Boss { hp: 150 })
        };
        let mut a = Engine::with_source(first_level.clone(), Box::new(RandomPieceSource::seeded(9))).unwrap();
        let mut b = Engine::with_source(first_level, Box::new(RandomPieceSource::seeded(9))).unwrap();

        a.start_level(next.clone()).unwrap();
        b.start_level(next).unwrap();

        assert_eq!(a.grid(), b.grid());
        assert_eq!(a.snapshot().boss_hp, 150);
        assert_eq!(a.snapshot().boss_max_hp, 150);
        assert_eq!(a.phase(), Phase::Idle);
    }

    #[test]
    fn failed_start_keeps_the_old_level() {
        let mut engine = board_a_engine(board_a_level());
        let before = engine.grid().clone();

        let result = engine.start_level(LevelConfig {
            piece_type_count: 2,
            ..LevelConfig::default()
        });

        assert!(matches!(result, Err(ConfigError::TooFewPieceTypes(2))));
        assert_eq!(engine.grid(), &before);
    }

    #[test]
    fn snapshot_reflects_a_fresh_level() {
        let engine = board_a_engine(board_a_level());
        let snapshot = engine.snapshot();

        assert_eq!(snapshot.score, 0);
        assert_eq!(snapshot.combo_depth, 0);
        assert_eq!(snapshot.moves_left, Some(25));
        assert_eq!(snapshot.time_left, None);
        assert_eq!(snapshot.phase, Phase::Idle);
        assert_eq!(snapshot.target_score, Some(500));
        assert_eq!(snapshot.obstacles_left, 0);
        assert_eq!(snapshot.boss_hp, 0);
    }

    #[test]
    fn hint_points_at_a_matching_swap() {
        let mut engine = board_a_engine(board_a_level());

        let (a, b) = engine.hint().unwrap();
        assert_eq!((a, b), (p(3, 0), p(3, 1)));

        let report = engine.try_swap(a, b).unwrap();
        assert!(report.valid);
    }
}

//! The resolution engine.
//!
//! An [`Engine`] owns one level: its board, counters, objective and random
//! source. Every command runs to completion synchronously and hands back the
//! ordered list of [`ResolutionEvent`]s it produced, so callers can animate at
//! their own pace while the logical outcome is already settled.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use tracing::{debug, info, trace, warn};

use crate::catalog::{classify_match_group, Axis, ObstacleKind, PieceType, SpecialKind};
use crate::config::{ConsumableKind, LevelConfig};
use crate::error::{ConfigError, Rejection};
use crate::event::ResolutionEvent;
use crate::generate::{generate, reshuffle, BOARD_RETRY_LIMIT};
use crate::grid::{Cell, Grid, Piece, Pos};
use crate::matcher::{find_best_move, find_match_groups, has_any_legal_move, has_match, MatchGroup};
use crate::objective::{evaluate, Objective, RunState, Verdict};
use crate::source::{PieceSource, RandomPieceSource};

// ============================================================================
// Configuration
// ============================================================================

pub const BASE_CELL_SCORE: u32 = 15;
pub const COMBO_BONUS_PER_DEPTH: u32 = 8;
pub const BOSS_CELL_DAMAGE: u32 = 2;
pub const BOSS_COMBO_DAMAGE_PER_DEPTH: u32 = 3;
pub const TYPE_CLEAR_CELL_SCORE: u32 = 20;
pub const EXTRA_TIME_SECONDS: f64 = 15.0;
pub const EXTRA_MOVES: u32 = 3;

/// Safety valve for scripted sources that keep refilling into matches.
pub const MAX_CHAIN_DEPTH: u32 = 256;

// ============================================================================
// Types
// ============================================================================

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Phase {
    Idle,
    Resolving,
    Won,
    Lost,
}

impl Phase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Won | Phase::Lost)
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Line {
    Row(usize),
    Col(usize),
}

/// Externally granted power-ups.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Consumable {
    Shuffle,
    /// +15 s on timed levels, +3 moves otherwise.
    ExtraTime,
    /// 3×3 block; the board centre when `center` is `None`.
    AreaClear { center: Option<Pos> },
    LineClear(Line),
    /// Every piece of one type; a random type on the board when `None`.
    TypeClear { piece_type: Option<PieceType> },
}

impl Consumable {
    pub fn kind(&self) -> ConsumableKind {
        match self {
            Consumable::Shuffle => ConsumableKind::Shuffle,
            Consumable::ExtraTime => ConsumableKind::ExtraTime,
            Consumable::AreaClear { .. } => ConsumableKind::AreaClear,
            Consumable::LineClear(_) => ConsumableKind::LineClear,
            Consumable::TypeClear { .. } => ConsumableKind::TypeClear,
        }
    }
}

/// Read-only view of the level for callers.
#[derive(Clone, PartialEq, Debug)]
pub struct Snapshot {
    pub score: u32,
    pub combo_depth: u32,
    pub moves_left: Option<u32>,
    pub time_left: Option<f64>,
    pub collected: BTreeMap<PieceType, u32>,
    pub boss_hp: u32,
    pub boss_max_hp: u32,
    pub phase: Phase,
    pub target_score: Option<u32>,
    pub rows: usize,
    pub cols: usize,
    pub obstacles_left: usize,
    pub objective: Objective,
}

/// Outcome of one accepted command.
#[derive(Clone, PartialEq, Debug)]
pub struct MoveReport {
    /// False when a swap produced no match and was reverted.
    pub valid: bool,
    /// Deepest combo reached by the chain.
    pub chain_depth: u32,
    pub score_gained: u32,
    pub verdict: Verdict,
    pub events: Vec<ResolutionEvent>,
}

/// A piece to be placed once the current clear set has been emptied.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
struct PendingSpecial {
    piece_type: PieceType,
    kind: SpecialKind,
}

pub struct Engine {
    config: LevelConfig,
    grid: Grid,
    run: RunState,
    boss_max_hp: u32,
    phase: Phase,
    source: Box<dyn PieceSource>,
    events: Vec<ResolutionEvent>,
}

// ============================================================================
// Special Activation
// ============================================================================

/// Cells a special piece at `pos` clears when activated. Never includes `pos`
/// itself or stone.
pub fn activate_special(grid: &Grid, pos: Pos, piece: &Piece) -> Vec<Pos> {
    let cells: Vec<Pos> = match piece.special {
        SpecialKind::None => Vec::new(),
        SpecialKind::LineRow => (0..grid.cols()).map(|col| Pos::new(pos.row, col)).collect(),
        SpecialKind::LineCol => (0..grid.rows()).map(|row| Pos::new(row, pos.col)).collect(),
        SpecialKind::Bomb => grid.neighbors8(pos),
        SpecialKind::Rainbow => grid
            .positions()
            .filter(|p| grid[*p].piece_type() == Some(piece.piece_type))
            .collect(),
    };
    cells
        .into_iter()
        .filter(|p| *p != pos && grid[*p].piece().is_some())
        .collect()
}

fn build_board(config: &LevelConfig, source: &mut dyn PieceSource) -> Result<Grid, ConfigError> {
    let mut grid = generate(
        config.rows,
        config.cols,
        config.piece_type_count,
        &config.obstacles,
        source,
    );
    if (has_match(&grid) || !has_any_legal_move(&mut grid))
        && !reshuffle(&mut grid, config.piece_type_count, source)
    {
        return Err(ConfigError::NoLegalMoves {
            attempts: BOARD_RETRY_LIMIT,
        });
    }
    Ok(grid)
}

fn fresh_run(config: &LevelConfig) -> RunState {
    info!(
        rows = config.rows,
        cols = config.cols,
        piece_types = config.piece_type_count,
        objective = ?config.objective,
        "level started"
    );
    RunState::new(&config.objective, config.moves_limit, config.time_limit)
}

fn source_for(config: &LevelConfig) -> Box<dyn PieceSource> {
    match config.seed {
        Some(seed) => Box::new(RandomPieceSource::seeded(seed)),
        None => Box::new(RandomPieceSource::new()),
    }
}

// ============================================================================
// Engine
// ============================================================================

impl Engine {
    /// Starts a level, seeding the random source from `config.seed` when set.
    pub fn new(config: LevelConfig) -> Result<Self, ConfigError> {
        let source = source_for(&config);
        Self::with_source(config, source)
    }

    pub fn with_source(config: LevelConfig, mut source: Box<dyn PieceSource>) -> Result<Self, ConfigError> {
        config.validate()?;
        let grid = build_board(&config, source.as_mut())?;
        Ok(Self::assemble(config, grid, source))
    }

    /// Starts a level on a hand-built board. The board is taken as is: no
    /// match or legal-move checks.
    pub fn with_grid(config: LevelConfig, grid: Grid, source: Box<dyn PieceSource>) -> Result<Self, ConfigError> {
        config.validate()?;
        if grid.rows() != config.rows || grid.cols() != config.cols {
            return Err(ConfigError::GridMismatch {
                rows: config.rows,
                cols: config.cols,
                found_rows: grid.rows(),
                found_cols: grid.cols(),
            });
        }
        Ok(Self::assemble(config, grid, source))
    }

    fn assemble(config: LevelConfig, grid: Grid, source: Box<dyn PieceSource>) -> Self {
        let run = fresh_run(&config);
        Self {
            boss_max_hp: run.boss_hp,
            config,
            grid,
            run,
            phase: Phase::Idle,
            source,
            events: Vec::new(),
        }
    }

    /// Replaces the current level wholesale. On error the old level is kept.
    pub fn start_level(&mut self, config: LevelConfig) -> Result<(), ConfigError> {
        config.validate()?;
        if config.seed.is_some() {
            self.source = source_for(&config);
        }
        self.grid = build_board(&config, self.source.as_mut())?;
        self.run = fresh_run(&config);
        self.boss_max_hp = self.run.boss_hp;
        self.config = config;
        self.phase = Phase::Idle;
        self.events.clear();
        Ok(())
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn config(&self) -> &LevelConfig {
        &self.config
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            score: self.run.score,
            combo_depth: self.run.combo_depth,
            moves_left: self.run.moves_left,
            time_left: self.run.time_left,
            collected: self.run.collected.clone(),
            boss_hp: self.run.boss_hp,
            boss_max_hp: self.boss_max_hp,
            phase: self.phase,
            target_score: self.config.objective.target_score(),
            rows: self.grid.rows(),
            cols: self.grid.cols(),
            obstacles_left: self.config.objective.obstacles_left(&self.grid),
            objective: self.config.objective.clone(),
        }
    }

    /// Best swap on the current board, if any.
    pub fn hint(&self) -> Option<(Pos, Pos)> {
        if self.phase != Phase::Idle {
            return None;
        }
        let mut scratch = self.grid.clone();
        find_best_move(&mut scratch)
    }

    // ------------------------------------------------------------------------
    // Commands
    // ------------------------------------------------------------------------

    fn check_swap(&self, a: Pos, b: Pos) -> Result<(), Rejection> {
        if self.phase != Phase::Idle {
            return Err(Rejection::NotIdle);
        }
        if !self.grid.contains(a) || !self.grid.contains(b) {
            return Err(Rejection::OutOfBounds);
        }
        if !a.is_adjacent(b) {
            return Err(Rejection::NotAdjacent);
        }
        if self.grid[a].piece().is_none() || self.grid[b].piece().is_none() {
            return Err(Rejection::Immovable);
        }
        if self.grid.is_in_transition(a) || self.grid.is_in_transition(b) {
            return Err(Rejection::InTransition);
        }
        Ok(())
    }

    /// Swaps two adjacent pieces and resolves everything that follows.
    ///
    /// A swap that makes no match is undone and costs nothing; the report
    /// comes back with `valid == false`.
    pub fn try_swap(&mut self, a: Pos, b: Pos) -> Result<MoveReport, Rejection> {
        if let Err(reason) = self.check_swap(a, b) {
            trace!(?a, ?b, %reason, "swap rejected");
            return Err(reason);
        }

        self.phase = Phase::Resolving;
        self.grid.mark_transition(a);
        self.grid.mark_transition(b);
        self.grid.swap(a, b);
        self.events.push(ResolutionEvent::Swapped { a, b });

        if !has_match(&self.grid) {
            self.grid.swap(a, b);
            self.grid.clear_transitions();
            self.events.push(ResolutionEvent::SwapReverted { a, b });
            self.phase = Phase::Idle;
            debug!(?a, ?b, "swap made no match");
            return Ok(MoveReport {
                valid: false,
                chain_depth: 0,
                score_gained: 0,
                verdict: Verdict::Continue,
                events: std::mem::take(&mut self.events),
            });
        }

        if let Some(moves) = self.run.moves_left.as_mut() {
            *moves = moves.saturating_sub(1);
        }
        let score_before = self.run.score;
        let depth = self.resolve_chain(a.axis_to(b));
        Ok(self.finish(depth, score_before))
    }

    /// Advances the level clock. Untimed levels ignore it.
    pub fn tick(&mut self, delta_seconds: f64) -> Verdict {
        match self.phase {
            Phase::Won => return Verdict::Won,
            Phase::Lost => return Verdict::Lost,
            Phase::Resolving => return Verdict::Continue,
            Phase::Idle => {}
        }
        let Some(time_left) = self.run.time_left.as_mut() else {
            return Verdict::Continue;
        };
        if delta_seconds > 0.0 {
            *time_left = (*time_left - delta_seconds).max(0.0);
        }
        let verdict = evaluate(&self.run, &self.config.objective, &self.grid);
        self.conclude(verdict);
        verdict
    }

    pub fn force_reshuffle(&mut self) -> Result<MoveReport, Rejection> {
        if self.phase != Phase::Idle {
            return Err(Rejection::NotIdle);
        }
        self.phase = Phase::Resolving;
        let score_before = self.run.score;
        self.reshuffle_board();
        Ok(self.finish(0, score_before))
    }

    pub fn activate_consumable(&mut self, consumable: Consumable) -> Result<MoveReport, Rejection> {
        if self.phase != Phase::Idle {
            return Err(Rejection::NotIdle);
        }
        if !self.config.is_consumable_enabled(consumable.kind()) {
            return Err(Rejection::ConsumableDisabled);
        }
        let score_before = self.run.score;

        let (cells, per_cell): (Vec<Pos>, u32) = match consumable {
            Consumable::Shuffle => {
                self.phase = Phase::Resolving;
                self.reshuffle_board();
                return Ok(self.finish(0, score_before));
            }
            Consumable::ExtraTime => {
                if let Some(time_left) = self.run.time_left.as_mut() {
                    *time_left += EXTRA_TIME_SECONDS;
                } else if let Some(moves) = self.run.moves_left.as_mut() {
                    *moves += EXTRA_MOVES;
                } else {
                    return Err(Rejection::Inapplicable);
                }
                self.phase = Phase::Resolving;
                return Ok(self.finish(0, score_before));
            }
            Consumable::AreaClear { center } => {
                let center = center.unwrap_or(Pos::new(self.grid.rows() / 2, self.grid.cols() / 2));
                if !self.grid.contains(center) {
                    return Err(Rejection::OutOfBounds);
                }
                let mut cells = self.grid.neighbors8(center);
                cells.push(center);
                (cells, BASE_CELL_SCORE)
            }
            Consumable::LineClear(Line::Row(row)) => {
                if row >= self.grid.rows() {
                    return Err(Rejection::OutOfBounds);
                }
                ((0..self.grid.cols()).map(|col| Pos::new(row, col)).collect(), BASE_CELL_SCORE)
            }
            Consumable::LineClear(Line::Col(col)) => {
                if col >= self.grid.cols() {
                    return Err(Rejection::OutOfBounds);
                }
                ((0..self.grid.rows()).map(|row| Pos::new(row, col)).collect(), BASE_CELL_SCORE)
            }
            Consumable::TypeClear { piece_type } => {
                let target = match piece_type {
                    Some(t) if t.0 < self.config.piece_type_count => t,
                    Some(_) => return Err(Rejection::Inapplicable),
                    None => self.random_present_type().ok_or(Rejection::NothingToClear)?,
                };
                let cells: Vec<Pos> = self
                    .grid
                    .positions()
                    .filter(|p| self.grid[*p].piece_type() == Some(target))
                    .collect();
                (cells, TYPE_CLEAR_CELL_SCORE)
            }
        };

        let seed: BTreeSet<Pos> = cells
            .into_iter()
            .filter(|p| self.grid[*p].piece().is_some())
            .collect();
        if seed.is_empty() {
            return Err(Rejection::NothingToClear);
        }

        self.phase = Phase::Resolving;
        self.run.score += seed.len() as u32 * per_cell;
        debug!(kind = ?consumable.kind(), cells = seed.len(), "consumable used");

        self.clear_step(seed, &BTreeMap::new());
        let depth = self.resolve_chain(None);
        Ok(self.finish(depth, score_before))
    }

    fn random_present_type(&mut self) -> Option<PieceType> {
        let present: Vec<PieceType> = self
            .grid
            .positions()
            .filter_map(|p| self.grid[p].piece_type())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        if present.is_empty() {
            return None;
        }
        Some(present[self.source.next_index(present.len())])
    }

    // ------------------------------------------------------------------------
    // Chain resolution
    // ------------------------------------------------------------------------

    /// Clears matches, cascades and refills until the board is stable.
    /// Returns the deepest combo reached.
    fn resolve_chain(&mut self, swap_axis: Option<Axis>) -> u32 {
        let mut depth = 0;
        loop {
            let groups = find_match_groups(&self.grid);
            if groups.is_empty() {
                break;
            }
            if depth >= MAX_CHAIN_DEPTH {
                warn!(depth, "chain stopped at depth limit");
                break;
            }
            depth += 1;
            self.run.combo_depth = depth;

            let matched: BTreeSet<Pos> = groups.iter().flat_map(|g| g.cells.iter().copied()).collect();
            let gained = self.award_match(&matched, depth);
            debug!(depth, cleared = matched.len(), gained, "chain step");
            self.events.push(ResolutionEvent::Matched {
                depth,
                cells: matched.iter().copied().collect(),
                score: gained,
            });

            let axis = if depth == 1 { swap_axis } else { None };
            let pending = Self::plan_specials(&groups, axis);
            self.clear_step(matched, &pending);
        }
        self.run.combo_depth = 0;
        depth
    }

    fn award_match(&mut self, matched: &BTreeSet<Pos>, depth: u32) -> u32 {
        let cleared = matched.len() as u32;
        let combo_bonus = if depth > 1 { depth * COMBO_BONUS_PER_DEPTH } else { 0 };
        let gained = cleared * BASE_CELL_SCORE + combo_bonus;
        self.run.score += gained;

        for pos in matched {
            if let Some(piece_type) = self.grid[*pos].piece_type() {
                if self.config.objective.tracks(piece_type) {
                    *self.run.collected.entry(piece_type).or_insert(0) += 1;
                }
            }
        }

        if self.config.objective.is_boss() {
            let combo_damage = if depth > 1 { depth * BOSS_COMBO_DAMAGE_PER_DEPTH } else { 0 };
            let damage = cleared * BOSS_CELL_DAMAGE + combo_damage;
            self.run.boss_hp = self.run.boss_hp.saturating_sub(damage);
        }

        gained
    }

    fn plan_specials(groups: &[MatchGroup], swap_axis: Option<Axis>) -> BTreeMap<Pos, PendingSpecial> {
        let mut pending: BTreeMap<Pos, PendingSpecial> = BTreeMap::new();
        for group in groups {
            // Groups are single runs, so a bomb only comes from callers that
            // hand classify_match_group a merged L/T group.
            let kind = classify_match_group(&group.cells, swap_axis);
            if !kind.is_special() {
                continue;
            }
            let anchor = group.center();
            let outranked = pending
                .get(&anchor)
                .is_some_and(|existing| existing.kind.rank() >= kind.rank());
            if !outranked {
                pending.insert(
                    anchor,
                    PendingSpecial {
                        piece_type: group.piece_type,
                        kind,
                    },
                );
            }
        }
        pending
    }

    /// Activates specials, damages obstacles, empties the clear set and lets
    /// the board settle.
    fn clear_step(&mut self, seed: BTreeSet<Pos>, pending: &BTreeMap<Pos, PendingSpecial>) {
        let clear = self.expand_specials(seed);
        self.damage_obstacles(&clear);
        self.materialize(&clear, pending);
        self.settle();
    }

    /// Grows the clear set with every special it touches, each activated once.
    fn expand_specials(&mut self, seed: BTreeSet<Pos>) -> BTreeSet<Pos> {
        let mut clear = seed;
        let mut activated = BTreeSet::new();
        let mut queue: VecDeque<Pos> = clear
            .iter()
            .copied()
            .filter(|pos| self.grid[*pos].is_special())
            .collect();

        while let Some(pos) = queue.pop_front() {
            if !activated.insert(pos) {
                continue;
            }
            let Some(piece) = self.grid[pos].piece().copied() else {
                continue;
            };
            let affected = activate_special(&self.grid, pos, &piece);
            for cell in &affected {
                if clear.insert(*cell) && self.grid[*cell].is_special() {
                    queue.push_back(*cell);
                }
            }
            debug!(?pos, kind = ?piece.special, affected = affected.len(), "special activated");
            self.events.push(ResolutionEvent::SpecialActivated {
                pos,
                kind: piece.special,
                affected,
            });
        }
        clear
    }

    /// Every obstacle orthogonally next to the clear set loses one hp.
    fn damage_obstacles(&mut self, clear: &BTreeSet<Pos>) {
        let hits: BTreeSet<Pos> = clear
            .iter()
            .flat_map(|pos| self.grid.neighbors4(*pos))
            .filter(|pos| match self.grid[*pos] {
                Cell::Piece(piece) => piece.obstacle.is_some(),
                Cell::Stone { hp } => hp.is_some(),
                Cell::Empty => false,
            })
            .collect();

        for pos in hits {
            let Some(cell) = self.grid.get_mut(pos) else {
                continue;
            };
            let (kind, hp_left) = match *cell {
                Cell::Piece(mut piece) => {
                    let Some(mut obstacle) = piece.obstacle else {
                        continue;
                    };
                    obstacle.hp = obstacle.hp.saturating_sub(1);
                    piece.obstacle = (obstacle.hp > 0).then_some(obstacle);
                    *cell = Cell::Piece(piece);
                    (obstacle.kind, obstacle.hp)
                }
                Cell::Stone { hp: Some(hp) } => {
                    let left = hp.saturating_sub(1);
                    *cell = if left > 0 {
                        Cell::Stone { hp: Some(left) }
                    } else {
                        Cell::Empty
                    };
                    (ObstacleKind::Stone, left)
                }
                _ => continue,
            };
            self.events.push(ResolutionEvent::ObstacleDamaged { pos, kind, hp_left });
        }
    }

    /// Empties every piece in the clear set, obstacle and all. Pending
    /// specials take their cell instead.
    fn materialize(&mut self, clear: &BTreeSet<Pos>, pending: &BTreeMap<Pos, PendingSpecial>) {
        let mut emptied = Vec::new();
        let mut created = Vec::new();
        for pos in clear {
            if self.grid[*pos].piece().is_none() {
                continue;
            }
            match pending.get(pos) {
                Some(special) => {
                    self.grid
                        .set(*pos, Cell::Piece(Piece::special(special.piece_type, special.kind)));
                    created.push((*pos, *special));
                }
                None => {
                    self.grid.set(*pos, Cell::Empty);
                    emptied.push(*pos);
                }
            }
        }

        if !emptied.is_empty() {
            self.events.push(ResolutionEvent::Cleared { cells: emptied });
        }
        for (pos, special) in created {
            self.events.push(ResolutionEvent::SpecialCreated {
                pos,
                piece_type: special.piece_type,
                kind: special.kind,
            });
        }
    }

    fn settle(&mut self) {
        for drop in self.grid.apply_gravity() {
            self.events.push(ResolutionEvent::Dropped {
                from: drop.from,
                to: drop.to,
            });
        }
        let type_count = self.config.piece_type_count;
        for (pos, piece_type) in self.grid.refill(type_count, self.source.as_mut()) {
            self.events.push(ResolutionEvent::Refilled { pos, piece_type });
        }
    }

    // ------------------------------------------------------------------------
    // End of command
    // ------------------------------------------------------------------------

    fn reshuffle_board(&mut self) -> bool {
        let playable = reshuffle(&mut self.grid, self.config.piece_type_count, self.source.as_mut());
        if !playable {
            warn!("reshuffle could not produce a playable board");
        }
        let pieces = self
            .grid
            .positions()
            .filter_map(|pos| self.grid[pos].piece().map(|piece| (pos, *piece)))
            .collect();
        self.events.push(ResolutionEvent::Reshuffled { pieces });
        playable
    }

    fn conclude(&mut self, verdict: Verdict) {
        self.phase = match verdict {
            Verdict::Won => Phase::Won,
            Verdict::Lost => Phase::Lost,
            Verdict::Continue => Phase::Idle,
        };
        if verdict != Verdict::Continue {
            info!(?verdict, score = self.run.score, "level ended");
        }
    }

    fn finish(&mut self, chain_depth: u32, score_before: u32) -> MoveReport {
        let type_count = self.config.piece_type_count;
        let repaired = self.grid.repair_empty(type_count, self.source.as_mut());
        if !repaired.is_empty() {
            warn!(cells = repaired.len(), "empty cells survived refill, repaired");
            for (pos, piece_type) in repaired {
                self.events.push(ResolutionEvent::Refilled { pos, piece_type });
            }
        }

        if !has_any_legal_move(&mut self.grid) {
            debug!("no legal move left, reshuffling");
            self.reshuffle_board();
        }

        let verdict = evaluate(&self.run, &self.config.objective, &self.grid);
        self.conclude(verdict);
        if self.phase.is_terminal() {
            self.events.push(ResolutionEvent::LevelEnded { verdict });
        }
        self.grid.clear_transitions();

        MoveReport {
            valid: true,
            chain_depth,
            score_gained: self.run.score - score_before,
            verdict,
            events: std::mem::take(&mut self.events),
        }
    }
}

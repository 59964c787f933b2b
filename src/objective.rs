//! Level objectives, the per-level run counters, and the win/loss check.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::catalog::PieceType;
use crate::grid::Grid;

#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct CollectGoal {
    pub piece_type: PieceType,
    pub count: u32,
}

#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Objective {
    Score {
        target: u32,
    },
    Collect {
        items: Vec<CollectGoal>,
    },
    /// Clear every ice and vine. Stone only counts when `include_stone` is set,
    /// in which case unbreakable stone makes the objective unreachable.
    Clear {
        #[serde(default)]
        include_stone: bool,
    },
    Boss {
        hp: u32,
    },
}

impl Objective {
    pub fn tracks(&self, piece_type: PieceType) -> bool {
        match self {
            Objective::Collect { items } => items.iter().any(|item| item.piece_type == piece_type),
            _ => false,
        }
    }

    pub fn is_boss(&self) -> bool {
        matches!(self, Objective::Boss { .. })
    }

    pub fn target_score(&self) -> Option<u32> {
        match self {
            Objective::Score { target } => Some(*target),
            _ => None,
        }
    }

    pub fn obstacles_left(&self, grid: &Grid) -> usize {
        let include_stone = matches!(self, Objective::Clear { include_stone: true });
        grid.count_obstacles(include_stone)
    }

    pub fn is_met(&self, run: &RunState, grid: &Grid) -> bool {
        match self {
            Objective::Score { target } => run.score >= *target,
            Objective::Collect { items } => items
                .iter()
                .all(|item| run.collected_of(item.piece_type) >= item.count),
            Objective::Clear { .. } => self.obstacles_left(grid) == 0,
            Objective::Boss { .. } => run.boss_hp == 0,
        }
    }
}

/// Counters for the level in progress.
#[derive(Clone, PartialEq, Debug)]
pub struct RunState {
    pub score: u32,
    /// Depth of the chain being resolved; zero between moves.
    pub combo_depth: u32,
    pub moves_left: Option<u32>,
    /// Seconds; `None` for untimed levels.
    pub time_left: Option<f64>,
    pub collected: BTreeMap<PieceType, u32>,
    pub boss_hp: u32,
}

impl RunState {
    pub fn new(objective: &Objective, moves_limit: Option<u32>, time_limit: Option<f64>) -> Self {
        let collected = match objective {
            Objective::Collect { items } => items.iter().map(|item| (item.piece_type, 0)).collect(),
            _ => BTreeMap::new(),
        };
        let boss_hp = match objective {
            Objective::Boss { hp } => *hp,
            _ => 0,
        };
        Self {
            score: 0,
            combo_depth: 0,
            moves_left: moves_limit,
            time_left: time_limit,
            collected,
            boss_hp,
        }
    }

    pub fn collected_of(&self, piece_type: PieceType) -> u32 {
        self.collected.get(&piece_type).copied().unwrap_or(0)
    }

    pub fn is_exhausted(&self) -> bool {
        let out_of_moves = self.moves_left.is_some_and(|moves| moves == 0);
        let out_of_time = self.time_left.is_some_and(|time| time <= 0.0);
        out_of_moves || out_of_time
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Won,
    Lost,
    Continue,
}

/// Win is checked first; a level only loses once a limit runs out with the
/// objective still unmet.
pub fn evaluate(run: &RunState, objective: &Objective, grid: &Grid) -> Verdict {
    if objective.is_met(run, grid) {
        Verdict::Won
    } else if run.is_exhausted() {
        Verdict::Lost
    } else {
        Verdict::Continue
    }
}

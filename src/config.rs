//! Level configuration: board size, limits, objective and obstacle layout.

use std::collections::BTreeSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::catalog::{ObstacleKind, PieceType, MIN_PIECE_TYPES};
use crate::error::ConfigError;
use crate::grid::Pos;
use crate::objective::Objective;

/// Environment variable naming a level file for the binary.
pub const LEVEL_ENV_VAR: &str = "MATCH3_LEVEL";

pub const DEFAULT_ROWS: usize = 8;
pub const DEFAULT_COLS: usize = 8;
pub const DEFAULT_PIECE_TYPES: u8 = 7;
pub const DEFAULT_MOVES: u32 = 25;
pub const DEFAULT_TARGET_SCORE: u32 = 500;

#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct ObstaclePlacement {
    pub row: usize,
    pub col: usize,
    pub kind: ObstacleKind,
    /// Falls back to the kind's default; stone without hp is unbreakable.
    #[serde(default)]
    pub hp: Option<u8>,
}

impl ObstaclePlacement {
    pub fn new(row: usize, col: usize, kind: ObstacleKind) -> Self {
        Self {
            row,
            col,
            kind,
            hp: None,
        }
    }

    pub fn with_hp(mut self, hp: u8) -> Self {
        self.hp = Some(hp);
        self
    }

    pub fn pos(&self) -> Pos {
        Pos::new(self.row, self.col)
    }

    pub fn effective_hp(&self) -> Option<u8> {
        self.hp.or(self.kind.default_hp())
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsumableKind {
    Shuffle,
    ExtraTime,
    AreaClear,
    LineClear,
    TypeClear,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LevelConfig {
    pub rows: usize,
    pub cols: usize,
    pub piece_type_count: u8,
    pub moves_limit: Option<u32>,
    /// Seconds.
    pub time_limit: Option<f64>,
    pub objective: Objective,
    pub obstacles: Vec<ObstaclePlacement>,
    /// Seeds the random source; entropy when absent.
    pub seed: Option<u64>,
    pub disabled_consumables: Vec<ConsumableKind>,
}

impl Default for LevelConfig {
    fn default() -> Self {
        Self {
            rows: DEFAULT_ROWS,
            cols: DEFAULT_COLS,
            piece_type_count: DEFAULT_PIECE_TYPES,
            moves_limit: Some(DEFAULT_MOVES),
            time_limit: None,
            objective: Objective::Score {
                target: DEFAULT_TARGET_SCORE,
            },
            obstacles: Vec::new(),
            seed: None,
            disabled_consumables: Vec::new(),
        }
    }
}

impl LevelConfig {
    /// Parses and validates a level. Fields left out take their default,
    /// except that a timed level which names no move limit gets none.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let value: serde_json::Value = serde_json::from_str(json)?;
        let timed_only = value.get("moves_limit").is_none()
            && value.get("time_limit").is_some_and(|limit| !limit.is_null());
        let mut config: LevelConfig = serde_json::from_value(value)?;
        if timed_only {
            config.moves_limit = None;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Loads the file named by `MATCH3_LEVEL`, or the default level when the
    /// variable is unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        match std::env::var_os(LEVEL_ENV_VAR) {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn is_consumable_enabled(&self, kind: ConsumableKind) -> bool {
        !self.disabled_consumables.contains(&kind)
    }

    /// Every check that does not need a generated board.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rows < 3 || self.cols < 3 {
            return Err(ConfigError::GridTooSmall {
                rows: self.rows,
                cols: self.cols,
            });
        }
        if self.piece_type_count < MIN_PIECE_TYPES {
            return Err(ConfigError::TooFewPieceTypes(self.piece_type_count));
        }

        match (self.moves_limit, self.time_limit) {
            (None, None) => return Err(ConfigError::NoExhaustionLimit),
            (Some(0), _) => return Err(ConfigError::EmptyLimit),
            (_, Some(t)) if !(t > 0.0) => return Err(ConfigError::EmptyLimit),
            _ => {}
        }

        match &self.objective {
            Objective::Collect { items } => {
                for item in items {
                    self.check_piece_type(item.piece_type)?;
                }
            }
            Objective::Boss { hp: 0 } => return Err(ConfigError::BossWithoutHp),
            _ => {}
        }

        let mut seen = BTreeSet::new();
        for placement in &self.obstacles {
            let pos = placement.pos();
            if pos.row >= self.rows || pos.col >= self.cols {
                return Err(ConfigError::ObstacleOutOfBounds(pos));
            }
            if !seen.insert(pos) {
                return Err(ConfigError::DuplicateObstacle(pos));
            }
            if placement.hp == Some(0) {
                return Err(ConfigError::ZeroHpObstacle(pos));
            }
        }

        Ok(())
    }

    fn check_piece_type(&self, piece_type: PieceType) -> Result<(), ConfigError> {
        if piece_type.0 >= self.piece_type_count {
            return Err(ConfigError::UnknownPieceType {
                piece_type: piece_type.0,
                type_count: self.piece_type_count,
            });
        }
        Ok(())
    }
}

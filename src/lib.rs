pub mod catalog;
pub mod config;
pub mod controller;
pub mod engine;
pub mod error;
pub mod event;
pub mod generate;
pub mod grid;
pub mod matcher;
pub mod objective;
pub mod source;
pub mod test_helpers;

pub use catalog::{Axis, ObstacleKind, PieceType, SpecialKind};
pub use config::{ConsumableKind, LevelConfig, ObstaclePlacement};
pub use controller::{ControllerState, MoveController, SelectOutcome};
pub use engine::{Consumable, Engine, Line, MoveReport, Phase, Snapshot};
pub use error::{ConfigError, Rejection};
pub use event::ResolutionEvent;
pub use grid::{Cell, Grid, Piece, Pos};
pub use objective::{Objective, Verdict};
pub use source::{PieceSource, RandomPieceSource, SequencePieceSource};

//! Two-tap swap selection on top of the engine.

use tracing::trace;

use crate::config::LevelConfig;
use crate::engine::{Consumable, Engine, MoveReport};
use crate::error::{ConfigError, Rejection};
use crate::grid::Pos;
use crate::objective::Verdict;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ControllerState {
    Idle,
    AwaitingSecondCell(Pos),
    /// Only observable from inside a command; every command finishes before
    /// returning.
    Resolving,
    Terminal(Verdict),
}

#[derive(Clone, PartialEq, Debug)]
pub enum SelectOutcome {
    Selected(Pos),
    /// The selected cell was tapped again.
    Deselected,
    /// A non-adjacent cell replaced the previous selection.
    Reselected(Pos),
    /// Two adjacent cells were selected and the swap ran. The report says
    /// whether it was kept.
    Moved(MoveReport),
    Rejected(Rejection),
}

pub struct MoveController {
    engine: Engine,
    state: ControllerState,
}

impl MoveController {
    pub fn new(engine: Engine) -> Self {
        let mut controller = Self {
            engine,
            state: ControllerState::Idle,
        };
        controller.sync_state();
        controller
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    pub fn selection(&self) -> Option<Pos> {
        match self.state {
            ControllerState::AwaitingSecondCell(pos) => Some(pos),
            _ => None,
        }
    }

    pub fn select(&mut self, pos: Pos) -> SelectOutcome {
        if let ControllerState::Terminal(_) | ControllerState::Resolving = self.state {
            return self.reject(Rejection::NotIdle);
        }
        let Some(cell) = self.engine.grid().get(pos) else {
            return self.reject(Rejection::OutOfBounds);
        };
        if cell.piece().is_none() {
            return self.reject(Rejection::Immovable);
        }

        match self.state {
            ControllerState::AwaitingSecondCell(first) if first == pos => {
                self.state = ControllerState::Idle;
                SelectOutcome::Deselected
            }
            ControllerState::AwaitingSecondCell(first) if first.is_adjacent(pos) => {
                self.state = ControllerState::Resolving;
                let outcome = match self.engine.try_swap(first, pos) {
                    Ok(report) => SelectOutcome::Moved(report),
                    Err(reason) => SelectOutcome::Rejected(reason),
                };
                self.sync_state();
                outcome
            }
            ControllerState::AwaitingSecondCell(_) => {
                self.state = ControllerState::AwaitingSecondCell(pos);
                SelectOutcome::Reselected(pos)
            }
            _ => {
                self.state = ControllerState::AwaitingSecondCell(pos);
                SelectOutcome::Selected(pos)
            }
        }
    }

    pub fn deselect(&mut self) {
        if let ControllerState::AwaitingSecondCell(_) = self.state {
            self.state = ControllerState::Idle;
        }
    }

    pub fn tick(&mut self, delta_seconds: f64) -> Verdict {
        let verdict = self.engine.tick(delta_seconds);
        self.sync_state();
        verdict
    }

    pub fn activate_consumable(&mut self, consumable: Consumable) -> Result<MoveReport, Rejection> {
        let result = self.engine.activate_consumable(consumable);
        self.after_command();
        result
    }

    pub fn force_reshuffle(&mut self) -> Result<MoveReport, Rejection> {
        let result = self.engine.force_reshuffle();
        self.after_command();
        result
    }

    pub fn hint(&self) -> Option<(Pos, Pos)> {
        self.engine.hint()
    }

    pub fn restart(&mut self, config: LevelConfig) -> Result<(), ConfigError> {
        self.engine.start_level(config)?;
        self.state = ControllerState::Idle;
        Ok(())
    }

    fn reject(&self, reason: Rejection) -> SelectOutcome {
        trace!(%reason, "selection rejected");
        SelectOutcome::Rejected(reason)
    }

    /// Commands other than a swap drop any half-made selection.
    fn after_command(&mut self) {
        self.state = ControllerState::Idle;
        self.sync_state();
    }

    fn sync_state(&mut self) {
        use crate::engine::Phase;

        self.state = match self.engine.phase() {
            Phase::Won => ControllerState::Terminal(Verdict::Won),
            Phase::Lost => ControllerState::Terminal(Verdict::Lost),
            Phase::Resolving => ControllerState::Resolving,
            Phase::Idle => match self.state {
                ControllerState::AwaitingSecondCell(pos) => ControllerState::AwaitingSecondCell(pos),
                _ => ControllerState::Idle,
            },
        };
    }
}

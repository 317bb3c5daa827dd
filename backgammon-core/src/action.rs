//! Authoritative checks around each player action.
//!
//! These wrap the pure rules with turn ownership, dice and token bookkeeping.
//! On `Err` the state is left untouched.

use crate::dice::TurnStart;
use crate::execute::MoveOutcome;
use crate::{GameState, Move, Player};

/// Why an action was rejected.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, thiserror::Error)]
pub enum ActionError {
    #[error("it is not your turn")]
    NotYourTurn,
    #[error("the game is over")]
    GameOver,
    #[error("dice already rolled this turn")]
    AlreadyRolled,
    #[error("roll the dice first")]
    RollFirst,
    #[error("illegal move")]
    InvalidMove,
    #[error("no die of that value left this turn")]
    DieUnavailable,
    #[error("legal moves remain, play them before ending the turn")]
    MovesRemaining,
}

impl ActionError {
    /// Stable machine-readable code for the wire.
    pub fn code(self) -> &'static str {
        match self {
            ActionError::NotYourTurn => "NOT_YOUR_TURN",
            ActionError::GameOver => "GAME_OVER",
            ActionError::AlreadyRolled => "ALREADY_ROLLED",
            ActionError::RollFirst => "ROLL_FIRST",
            ActionError::InvalidMove => "INVALID_MOVE",
            ActionError::DieUnavailable => "DIE_UNAVAILABLE",
            ActionError::MovesRemaining => "MOVES_REMAINING",
        }
    }
}

impl GameState {
    /// The game must be running and `player` must hold the turn.
    pub fn check_actor(&self, player: Player) -> Result<(), ActionError> {
        if self.winner.is_some() {
            return Err(ActionError::GameOver);
        }
        if player != self.turn {
            return Err(ActionError::NotYourTurn);
        }
        Ok(())
    }

    /// Roll for `player`, using dice the caller drew.
    pub fn roll(&mut self, player: Player, dice: [u8; 2]) -> Result<TurnStart, ActionError> {
        self.check_actor(player)?;
        if self.has_rolled() {
            return Err(ActionError::AlreadyRolled);
        }
        Ok(self.resolve_roll(dice))
    }

    /// Validate and apply one checker move for `player`.
    pub fn play(&mut self, player: Player, mv: Move) -> Result<MoveOutcome, ActionError> {
        self.check_actor(player)?;
        if !self.has_rolled() {
            return Err(ActionError::RollFirst);
        }
        if !self.is_legal_move(mv, player) {
            return Err(ActionError::InvalidMove);
        }
        if !self.moves_left.contains(&mv.die) {
            return Err(ActionError::DieUnavailable);
        }
        Ok(self.apply_move(mv, player))
    }

    /// End `player`'s turn. Refused while an unused token still has a legal move.
    pub fn end_turn(&mut self, player: Player) -> Result<(), ActionError> {
        self.check_actor(player)?;
        if !self.has_rolled() {
            return Err(ActionError::RollFirst);
        }
        if self.has_any_legal_move(&self.moves_left, player) {
            return Err(ActionError::MovesRemaining);
        }
        self.pass_turn();
        Ok(())
    }

    /// Back to the opening layout with `starting` to move.
    pub fn reset(&mut self, starting: Player) {
        *self = GameState::new(starting);
    }
}

//! Client-side move preview.
//!
//! A [`Preview`] keeps the last authoritative state as a baseline and a local
//! copy that the acting player moves checkers on before committing. Local
//! moves go through [`GameState::play`], the same code the authority runs, so
//! a sequence accepted here is accepted there unless the authoritative state
//! moved on in the meantime.

use crate::action::ActionError;
use crate::execute::MoveOutcome;
use crate::{Destination, GameState, Move, Origin, Player};

/// The authoritative side of a game, as seen by one seat.
pub trait Authority {
    type Error;

    /// Submit one move; returns the new authoritative state.
    fn submit_move(&mut self, player: Player, mv: Move) -> Result<GameState, Self::Error>;

    /// End the turn; returns the new authoritative state.
    fn submit_end_turn(&mut self, player: Player) -> Result<GameState, Self::Error>;
}

/// A bare state is its own authority (hot-seat play, tests).
impl Authority for GameState {
    type Error = ActionError;

    fn submit_move(&mut self, player: Player, mv: Move) -> Result<GameState, ActionError> {
        self.play(player, mv)?;
        Ok(self.clone())
    }

    fn submit_end_turn(&mut self, player: Player) -> Result<GameState, ActionError> {
        self.end_turn(player)?;
        Ok(self.clone())
    }
}

/// The authority rejected part of a confirmation.
#[derive(Debug, thiserror::Error)]
#[error("authority rejected the confirmation after {accepted} accepted moves: {source}")]
pub struct ConfirmError<E> {
    /// Pending moves the authority accepted before the rejection.
    ///
    /// Those moves are already applied on the authority side. When this is
    /// non-zero, call [`Preview::sync`] with the authoritative state before
    /// confirming again, or the accepted moves are sent a second time.
    pub accepted: usize,
    #[source]
    pub source: E,
}

/// Local preview of one player's turn.
#[derive(Clone, Debug)]
pub struct Preview {
    player: Player,
    baseline: GameState,
    local: GameState,
    pending: Vec<Move>,
}

impl Preview {
    /// Start previewing from an authoritative state.
    pub fn new(baseline: GameState, player: Player) -> Preview {
        Preview {
            player,
            local: baseline.clone(),
            baseline,
            pending: Vec::new(),
        }
    }

    pub fn player(&self) -> Player {
        self.player
    }

    /// Last authoritative state.
    pub fn baseline(&self) -> &GameState {
        &self.baseline
    }

    /// Baseline with the pending moves applied.
    pub fn local(&self) -> &GameState {
        &self.local
    }

    /// Moves played locally but not yet confirmed, oldest first.
    pub fn pending(&self) -> &[Move] {
        &self.pending
    }

    /// Move a checker locally, picking the die token that pays for it.
    pub fn play(&mut self, origin: Origin, destination: Destination) -> Result<MoveOutcome, ActionError> {
        self.local.check_actor(self.player)?;
        if !self.local.has_rolled() {
            return Err(ActionError::RollFirst);
        }

        let Some(die) = self.local.resolve_die(origin, destination, self.player) else {
            let any_die = (1..=6).any(|die| self.local.is_legal_move(Move::new(origin, destination, die), self.player));
            return Err(if any_die {
                ActionError::DieUnavailable
            } else {
                ActionError::InvalidMove
            });
        };

        let mv = Move::new(origin, destination, die);
        let outcome = self.local.play(self.player, mv)?;
        self.pending.push(mv);
        Ok(outcome)
    }

    /// Drop the last pending move by replaying the baseline through the rest.
    pub fn undo(&mut self) -> Option<Move> {
        let last = self.pending.pop()?;
        let (local, replayed) = replay(&self.baseline, self.player, &self.pending);
        self.pending.truncate(replayed);
        self.local = local;
        Some(last)
    }

    /// Send every pending move to the authority in order, then end the turn.
    /// A winning move finishes the game, so no end-turn follows it.
    ///
    /// On rejection the pending moves are kept so the caller can report the
    /// failure. Retrying without [`Preview::sync`] resends every pending
    /// move, including any the authority already accepted.
    pub fn confirm<A: Authority>(&mut self, authority: &mut A) -> Result<GameState, ConfirmError<A::Error>> {
        let mut latest = None;
        for (accepted, &mv) in self.pending.iter().enumerate() {
            let state = authority
                .submit_move(self.player, mv)
                .map_err(|source| ConfirmError { accepted, source })?;
            latest = Some(state);
        }

        let state = match latest {
            Some(state) if state.is_over() => state,
            _ => authority
                .submit_end_turn(self.player)
                .map_err(|source| ConfirmError {
                    accepted: self.pending.len(),
                    source,
                })?,
        };

        self.pending.clear();
        self.baseline = state.clone();
        self.local = state.clone();
        Ok(state)
    }

    /// Adopt a newer authoritative state.
    ///
    /// Any change to the authoritative record (a roll, the turn passing, a
    /// reset, a move from another session) discards the pending moves.
    /// Returns true if pending moves were dropped.
    pub fn sync(&mut self, authoritative: GameState) -> bool {
        if authoritative == self.baseline {
            return false;
        }
        let dropped = !self.pending.is_empty();
        self.pending.clear();
        self.local = authoritative.clone();
        self.baseline = authoritative;
        dropped
    }
}

/// Apply `moves` to a copy of `baseline`, stopping at the first one that no
/// longer plays. Returns the state and how many moves were applied.
fn replay(baseline: &GameState, player: Player, moves: &[Move]) -> (GameState, usize) {
    let mut state = baseline.clone();
    for (applied, &mv) in moves.iter().enumerate() {
        if state.play(player, mv).is_err() {
            return (state, applied);
        }
    }
    (state, moves.len())
}

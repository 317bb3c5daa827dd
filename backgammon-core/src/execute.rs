//! Applying moves to the board.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{Destination, GameState, Move, Origin, Player, CHECKERS};

/// What happened when a move was applied.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default, Serialize, Deserialize)]
pub struct MoveOutcome {
    /// An opposing blot was sent to the bar.
    pub hit: bool,
    /// Set when this move bore off the mover's last checker.
    pub winner: Option<Player>,
}

impl GameState {
    /// True if `mv` would land on a lone opposing checker.
    pub fn is_hit(&self, mv: Move, player: Player) -> bool {
        match mv.destination {
            Destination::Point(to) => self.board[to as usize] == -player.sign(),
            Destination::Off => false,
        }
    }

    /// Apply a move and consume its die token.
    ///
    /// Does NOT validate - caller must check [`GameState::is_legal_move`]
    /// first (or go through [`GameState::play`]).
    pub fn apply_move(&mut self, mv: Move, player: Player) -> MoveOutcome {
        let sign = player.sign();

        match mv.origin {
            Origin::Bar => {
                let bar = self.bar.get_mut(player);
                *bar = bar.saturating_sub(1);
            }
            Origin::Point(from) => self.board[from as usize] -= sign,
        }

        let hit = self.is_hit(mv, player);
        match mv.destination {
            Destination::Off => *self.borne_off.get_mut(player) += 1,
            Destination::Point(to) => {
                if hit {
                    self.board[to as usize] = 0;
                    *self.bar.get_mut(player.opponent()) += 1;
                }
                self.board[to as usize] += sign;
            }
        }

        if let Some(index) = self.moves_left.iter().position(|&die| die == mv.die) {
            self.moves_left.remove(index);
        }

        if self.borne_off.get(player) >= CHECKERS {
            debug!(%player, "last checker borne off");
            self.winner = Some(player);
            self.moves_left.clear();
        }

        MoveOutcome { hit, winner: self.winner }
    }
}

//! Dice rolling and turn resolution.

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{GameState, Roll};

/// Roll two independent dice.
pub fn roll<R: Rng + ?Sized>(rng: &mut R) -> [u8; 2] {
    [rng.random_range(1..=6), rng.random_range(1..=6)]
}

/// Expand a roll into die tokens. Doubles give four.
pub fn expand(dice: [u8; 2]) -> Vec<u8> {
    let [d1, d2] = dice;
    if d1 == d2 {
        vec![d1; 4]
    } else {
        vec![d1, d2]
    }
}

/// How a freshly rolled turn starts.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnStart {
    /// Tokens are available and at least one move is legal.
    Moves,
    /// Nothing can move; the turn already passed to the opponent.
    ForcedPass,
}

impl GameState {
    /// Record a roll for the player to act and open their turn.
    ///
    /// If no token pays for a legal move the dice stay on the table for
    /// display, the tokens are emptied and the turn flips immediately.
    pub fn resolve_roll(&mut self, dice: [u8; 2]) -> TurnStart {
        let player = self.turn;
        self.dice = Some(Roll { values: dice, player });

        let tokens = expand(dice);
        if self.has_any_legal_move(&tokens, player) {
            self.moves_left = tokens;
            TurnStart::Moves
        } else {
            debug!(%player, ?dice, "no legal move, passing turn");
            self.moves_left.clear();
            self.turn = player.opponent();
            TurnStart::ForcedPass
        }
    }

    /// Clear the dice and hand the turn to the opponent.
    pub fn pass_turn(&mut self) {
        self.dice = None;
        self.moves_left.clear();
        self.turn = self.turn.opponent();
    }

    /// True if the player to act has already rolled this turn.
    #[inline]
    pub fn has_rolled(&self) -> bool {
        matches!(self.dice, Some(roll) if roll.player == self.turn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Player, POINTS};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_expand_plain_roll() {
        assert_eq!(expand([6, 5]), vec![6, 5]);
        assert_eq!(expand([1, 3]), vec![1, 3]);
    }

    #[test]
    fn test_expand_doubles() {
        assert_eq!(expand([4, 4]), vec![4, 4, 4, 4]);
    }

    #[test]
    fn test_roll_in_range() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut seen = [false; 6];
        for _ in 0..500 {
            for die in roll(&mut rng) {
                assert!((1..=6).contains(&die));
                seen[die as usize - 1] = true;
            }
        }
        assert!(seen.iter().all(|&s| s), "every face should come up: {seen:?}");
    }

    #[test]
    fn test_resolve_roll_opens_turn() {
        let mut state = GameState::default();
        assert_eq!(state.resolve_roll([6, 5]), TurnStart::Moves);
        assert_eq!(state.moves_left, vec![6, 5]);
        assert_eq!(state.turn, Player::One);
        assert!(state.has_rolled());
    }

    #[test]
    fn test_resolve_roll_doubles() {
        let mut state = GameState::new(Player::Two);
        assert_eq!(state.resolve_roll([2, 2]), TurnStart::Moves);
        assert_eq!(state.moves_left, vec![2, 2, 2, 2]);
        assert_eq!(state.dice, Some(Roll { values: [2, 2], player: Player::Two }));
    }

    #[test]
    fn test_resolve_roll_forced_pass() {
        let mut state = GameState::default();
        state.board = [0; POINTS];
        for point in 0..6 {
            state.board[point] = -2;
        }
        state.board[20] = -3;
        state.board[12] = 14;
        state.bar.player1 = 1;

        assert_eq!(state.resolve_roll([3, 5]), TurnStart::ForcedPass);
        assert!(state.moves_left.is_empty());
        assert_eq!(state.turn, Player::Two);
        // Dice stay visible but belong to the player who passed.
        assert_eq!(state.dice, Some(Roll { values: [3, 5], player: Player::One }));
        assert!(!state.has_rolled());
    }

    #[test]
    fn test_pass_turn() {
        let mut state = GameState::default();
        state.resolve_roll([6, 5]);
        state.pass_turn();
        assert_eq!(state.turn, Player::Two);
        assert_eq!(state.dice, None);
        assert!(state.moves_left.is_empty());
    }
}

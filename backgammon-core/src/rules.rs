//! Legality of single checker moves.
//!
//! Every function here is pure: it reads a [`GameState`] and answers a
//! question about it. The authoritative server and the client preview both
//! call these, so a move accepted locally is accepted remotely.

use crate::{Destination, GameState, Move, Origin, Player, POINTS};

/// Distinct die values in a token multiset, ascending.
pub(crate) fn distinct_dice(tokens: &[u8]) -> Vec<u8> {
    let mut dice = tokens.to_vec();
    dice.sort_unstable();
    dice.dedup();
    dice
}

impl GameState {
    /// True if `point` holds two or more of `player`'s opponent's checkers.
    #[inline]
    pub fn is_blocked(&self, point: u8, player: Player) -> bool {
        self.own(point, player.opponent()) >= 2
    }

    /// True iff `player` has nothing on the bar and every remaining checker
    /// sits in the home quadrant.
    pub fn can_bear_off(&self, player: Player) -> bool {
        self.bar.get(player) == 0 && self.occupied(player).all(|point| player.home().contains(&point))
    }

    /// The occupied point farthest from `player`'s bear-off edge.
    pub fn furthest_checker(&self, player: Player) -> Option<u8> {
        match player {
            Player::One => self.occupied(player).next(),
            Player::Two => self.occupied(player).last(),
        }
    }

    /// Destination a die produces from an origin, ignoring blocking and
    /// bear-off eligibility. `None` if the origin has no checker to move.
    pub fn target(&self, origin: Origin, die: u8, player: Player) -> Option<Destination> {
        let from = match origin {
            Origin::Bar if self.bar.get(player) > 0 => player.bar_index(),
            Origin::Bar => return None,
            Origin::Point(point) if (point as usize) < POINTS && self.own(point, player) > 0 => point as i16,
            Origin::Point(_) => return None,
        };
        let landing = player.advance(from, die);
        if (0..POINTS as i16).contains(&landing) {
            Some(Destination::Point(landing as u8))
        } else {
            Some(Destination::Off)
        }
    }

    /// Is this single checker move legal for `player`?
    ///
    /// Token availability is not checked here; see [`GameState::play`].
    pub fn is_legal_move(&self, mv: Move, player: Player) -> bool {
        if self.winner.is_some() || !(1..=6).contains(&mv.die) {
            return false;
        }
        let on_bar = self.bar.get(player) > 0;

        match mv.origin {
            Origin::Bar => {
                if !on_bar {
                    return false;
                }
                let entry = player.entry_point(mv.die);
                !self.is_blocked(entry, player) && mv.destination == Destination::Point(entry)
            }
            Origin::Point(from) => {
                // Bar checkers must re-enter before anything else moves.
                if on_bar || from as usize >= POINTS || self.own(from, player) == 0 {
                    return false;
                }
                let landing = player.advance(from as i16, mv.die);

                match mv.destination {
                    Destination::Off => {
                        if !self.can_bear_off(player) {
                            return false;
                        }
                        landing == player.off_index()
                            || (player.overshoots(landing) && self.furthest_checker(player) == Some(from))
                    }
                    Destination::Point(to) => {
                        (to as usize) < POINTS && landing == to as i16 && !self.is_blocked(to, player)
                    }
                }
            }
        }
    }

    /// Every move a single die could pay for, legal or not.
    fn candidates(&self, die: u8, player: Player) -> Vec<Move> {
        if self.bar.get(player) > 0 {
            return self
                .target(Origin::Bar, die, player)
                .map(|destination| Move::new(Origin::Bar, destination, die))
                .into_iter()
                .collect();
        }
        self.occupied(player)
            .filter_map(|point| {
                let origin = Origin::Point(point);
                self.target(origin, die, player)
                    .map(|destination| Move::new(origin, destination, die))
            })
            .collect()
    }

    /// True iff at least one token in `tokens` pays for a legal move.
    ///
    /// With checkers on the bar only entry moves are considered.
    pub fn has_any_legal_move(&self, tokens: &[u8], player: Player) -> bool {
        distinct_dice(tokens).into_iter().any(|die| {
            self.candidates(die, player)
                .into_iter()
                .any(|mv| self.is_legal_move(mv, player))
        })
    }

    /// All legal single checker moves for the tokens in `moves_left`.
    pub fn legal_moves(&self, player: Player) -> Vec<Move> {
        let mut moves = Vec::with_capacity(16);
        for die in distinct_dice(&self.moves_left) {
            moves.extend(
                self.candidates(die, player)
                    .into_iter()
                    .filter(|&mv| self.is_legal_move(mv, player)),
            );
        }
        moves
    }

    /// Distinct destinations reachable from `origin` with the remaining tokens.
    pub fn legal_destinations(&self, origin: Origin, player: Player) -> Vec<Destination> {
        let mut destinations = Vec::with_capacity(4);
        for die in distinct_dice(&self.moves_left) {
            let Some(destination) = self.target(origin, die, player) else {
                continue;
            };
            if self.is_legal_move(Move::new(origin, destination, die), player)
                && !destinations.contains(&destination)
            {
                destinations.push(destination);
            }
        }
        destinations
    }

    /// The token that pays for moving `origin` to `destination`.
    ///
    /// The smallest legal token wins, so an exact bear-off is preferred over
    /// an overage one. `None` if no remaining token makes the move legal.
    pub fn resolve_die(&self, origin: Origin, destination: Destination, player: Player) -> Option<u8> {
        distinct_dice(&self.moves_left)
            .into_iter()
            .find(|&die| self.is_legal_move(Move::new(origin, destination, die), player))
    }
}

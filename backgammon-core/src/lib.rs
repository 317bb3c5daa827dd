//! Backgammon rule engine shared by the browser preview and the authoritative server.
//!
//! # Board Layout
//!
//! ```text
//! index:   0  1  2  3  4  5 | 6 ... 11 | 12 ... 17 | 18 19 20 21 22 23
//!          \___P2 home____/                           \___P1 home_____/
//!
//! Player One moves 0 -> 23 and bears off past 23 (target 24).
//! Player Two moves 23 -> 0 and bears off past 0  (target -1).
//! ```
//!
//! Each point is a signed checker count: positive = Player One, negative =
//! Player Two, magnitude = number of checkers. A single signed integer cannot
//! hold both colours, so mixed occupancy is unrepresentable.
//!
//! Checkers on the bar re-enter from the far edge: Player One enters at
//! `die - 1`, Player Two at `24 - die`. Equivalently, the bar sits one step
//! before the first point of each player's track (-1 for Player One, 24 for
//! Player Two), and entry is an ordinary step of `die` from there.
//!
//! # Module Map
//!
//! - [`rules`]: legality of single checker moves, "any legal move" detection
//! - [`dice`]: rolling, token expansion, forced-pass turn resolution
//! - [`execute`]: applying a move (hits, bear-off, win detection)
//! - [`action`]: authoritative action checks (turn, dice, tokens)
//! - [`preview`]: client-side move preview with undo and confirmation

pub mod action;
pub mod dice;
pub mod execute;
pub mod preview;
pub mod rules;

#[cfg(feature = "wasm")]
pub mod wasm;

use std::fmt;
use std::ops::RangeInclusive;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

pub use action::ActionError;
pub use dice::{expand, roll, TurnStart};
pub use execute::MoveOutcome;
pub use preview::{Authority, ConfirmError, Preview};

/// Number of points on the track.
pub const POINTS: usize = 24;

/// Checkers each player owns for the whole game.
pub const CHECKERS: u8 = 15;

/// Pip distance of a checker waiting on the bar.
pub const BAR_PIPS: u16 = 25;

/// Player One's opening layout as (index, count). Player Two mirrors it.
const OPENING: [(usize, i8); 4] = [(0, 2), (11, 5), (16, 3), (18, 5)];

/// Player identifier.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
#[repr(u8)]
pub enum Player {
    One = 1,
    Two = 2,
}

impl Player {
    /// Get the opponent player.
    #[inline]
    pub fn opponent(self) -> Player {
        match self {
            Player::One => Player::Two,
            Player::Two => Player::One,
        }
    }

    /// Convert from u8 (1 or 2) to Player.
    #[inline]
    pub fn from_bits(bits: u8) -> Option<Player> {
        match bits {
            1 => Some(Player::One),
            2 => Some(Player::Two),
            _ => None,
        }
    }

    /// Both players, One first.
    pub fn all() -> impl Iterator<Item = Player> {
        [Player::One, Player::Two].into_iter()
    }

    /// Sign of this player's checkers on the board.
    #[inline]
    pub fn sign(self) -> i8 {
        match self {
            Player::One => 1,
            Player::Two => -1,
        }
    }

    /// The six points nearest this player's bear-off edge.
    #[inline]
    pub fn home(self) -> RangeInclusive<u8> {
        match self {
            Player::One => 18..=23,
            Player::Two => 0..=5,
        }
    }

    /// Virtual index of the bar, one step before the first point.
    #[inline]
    pub fn bar_index(self) -> i16 {
        match self {
            Player::One => -1,
            Player::Two => POINTS as i16,
        }
    }

    /// Virtual index of the bear-off tray, one step past the last point.
    #[inline]
    pub fn off_index(self) -> i16 {
        match self {
            Player::One => POINTS as i16,
            Player::Two => -1,
        }
    }

    /// Point a checker enters on from the bar with the given die.
    #[inline]
    pub fn entry_point(self, die: u8) -> u8 {
        debug_assert!((1..=6).contains(&die));
        match self {
            Player::One => die - 1,
            Player::Two => POINTS as u8 - die,
        }
    }

    /// Index reached by stepping `die` points forward from `from`.
    #[inline]
    pub fn advance(self, from: i16, die: u8) -> i16 {
        from + self.sign() as i16 * die as i16
    }

    /// True if `index` lies strictly beyond the bear-off target.
    #[inline]
    pub fn overshoots(self, index: i16) -> bool {
        match self {
            Player::One => index > self.off_index(),
            Player::Two => index < self.off_index(),
        }
    }

    /// Pips a checker on `point` still has to travel to bear off.
    #[inline]
    pub fn pips_from(self, point: u8) -> u16 {
        match self {
            Player::One => POINTS as u16 - point as u16,
            Player::Two => point as u16 + 1,
        }
    }
}

impl fmt::Display for Player {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "player {}", *self as u8)
    }
}

impl From<Player> for u8 {
    fn from(player: Player) -> u8 {
        player as u8
    }
}

impl TryFrom<u8> for Player {
    type Error = InvalidPlayer;

    fn try_from(bits: u8) -> Result<Self, Self::Error> {
        Player::from_bits(bits).ok_or(InvalidPlayer(bits))
    }
}

/// A player number other than 1 or 2.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
#[error("player must be 1 or 2, got {0}")]
pub struct InvalidPlayer(pub u8);

/// Per-player checker counts (bar, borne off).
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default, Hash, Serialize, Deserialize)]
pub struct Counts {
    pub player1: u8,
    pub player2: u8,
}

impl Counts {
    #[inline]
    pub fn get(&self, player: Player) -> u8 {
        match player {
            Player::One => self.player1,
            Player::Two => self.player2,
        }
    }

    #[inline]
    pub fn get_mut(&mut self, player: Player) -> &mut u8 {
        match player {
            Player::One => &mut self.player1,
            Player::Two => &mut self.player2,
        }
    }
}

/// Where a moving checker starts.
///
/// Wire form: `"bar"` or a point index 0-23.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash)]
pub enum Origin {
    Bar,
    Point(u8),
}

/// Where a moving checker lands.
///
/// Wire form: `"off"` or a point index 0-23.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash)]
pub enum Destination {
    Point(u8),
    Off,
}

/// Untagged wire form shared by [`Origin`] and [`Destination`].
#[derive(Deserialize)]
#[serde(untagged)]
enum Location {
    Index(u8),
    Label(String),
}

fn checked_point<E: serde::de::Error>(index: u8) -> Result<u8, E> {
    if (index as usize) < POINTS {
        Ok(index)
    } else {
        Err(E::custom(format!("point index {index} out of range 0-23")))
    }
}

impl Serialize for Origin {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Origin::Bar => serializer.serialize_str("bar"),
            Origin::Point(index) => serializer.serialize_u8(*index),
        }
    }
}

impl<'de> Deserialize<'de> for Origin {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match Location::deserialize(deserializer)? {
            Location::Index(index) => Ok(Origin::Point(checked_point(index)?)),
            Location::Label(label) if label == "bar" => Ok(Origin::Bar),
            Location::Label(label) => Err(D::Error::custom(format!(
                "invalid origin {label:?}, expected \"bar\" or a point index"
            ))),
        }
    }
}

impl Serialize for Destination {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Destination::Off => serializer.serialize_str("off"),
            Destination::Point(index) => serializer.serialize_u8(*index),
        }
    }
}

impl<'de> Deserialize<'de> for Destination {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match Location::deserialize(deserializer)? {
            Location::Index(index) => Ok(Destination::Point(checked_point(index)?)),
            Location::Label(label) if label == "off" => Ok(Destination::Off),
            Location::Label(label) => Err(D::Error::custom(format!(
                "invalid destination {label:?}, expected \"off\" or a point index"
            ))),
        }
    }
}

/// A single checker move, paid for with one die token.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash, Serialize, Deserialize)]
pub struct Move {
    pub origin: Origin,
    pub destination: Destination,
    pub die: u8,
}

impl Move {
    pub fn new(origin: Origin, destination: Destination, die: u8) -> Move {
        Move { origin, destination, die }
    }
}

impl fmt::Display for Move {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.origin {
            Origin::Bar => write!(f, "bar")?,
            Origin::Point(index) => write!(f, "{index}")?,
        }
        match self.destination {
            Destination::Off => write!(f, "/off")?,
            Destination::Point(index) => write!(f, "/{index}")?,
        }
        write!(f, " ({})", self.die)
    }
}

/// Dice on the table and who rolled them.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash, Serialize, Deserialize)]
pub struct Roll {
    pub values: [u8; 2],
    pub player: Player,
}

/// Complete game state: the record both evaluation sites agree on.
#[derive(Clone, PartialEq, Eq, Debug, Hash, Serialize, Deserialize)]
pub struct GameState {
    /// Signed checker count per point.
    pub board: [i8; POINTS],
    /// Checkers waiting to re-enter.
    pub bar: Counts,
    /// Checkers that have left the track.
    pub borne_off: Counts,
    /// Last roll, kept for display after a forced pass.
    pub dice: Option<Roll>,
    /// Die tokens still usable this turn.
    pub moves_left: Vec<u8>,
    /// Player who may act.
    pub turn: Player,
    pub winner: Option<Player>,
}

impl GameState {
    /// Create the opening layout with `starting` to move.
    pub fn new(starting: Player) -> GameState {
        let mut board = [0i8; POINTS];
        for (index, count) in OPENING {
            board[index] = count;
            board[POINTS - 1 - index] = -count;
        }
        GameState {
            board,
            bar: Counts::default(),
            borne_off: Counts::default(),
            dice: None,
            moves_left: Vec::new(),
            turn: starting,
            winner: None,
        }
    }

    /// Owner of the checkers on a point, if any.
    #[inline]
    pub fn owner(&self, point: u8) -> Option<Player> {
        match self.board[point as usize] {
            0 => None,
            count if count > 0 => Some(Player::One),
            _ => Some(Player::Two),
        }
    }

    /// Number of checkers on a point, regardless of owner.
    #[inline]
    pub fn count(&self, point: u8) -> u8 {
        self.board[point as usize].unsigned_abs()
    }

    /// Number of `player`'s checkers on a point.
    #[inline]
    pub fn own(&self, point: u8, player: Player) -> u8 {
        // Widened so -128 does not overflow when negated.
        let signed = self.board[point as usize] as i16 * player.sign() as i16;
        signed.clamp(0, u8::MAX as i16) as u8
    }

    /// Points holding at least one of `player`'s checkers.
    pub fn occupied(&self, player: Player) -> impl Iterator<Item = u8> + '_ {
        (0..POINTS as u8).filter(move |&point| self.own(point, player) > 0)
    }

    /// Checkers `player` has on the 24 points.
    pub fn checkers_on_board(&self, player: Player) -> u16 {
        (0..POINTS as u8).map(|point| self.own(point, player) as u16).sum()
    }

    /// Board + bar + borne off. Always [`CHECKERS`] in a consistent state.
    pub fn checker_total(&self, player: Player) -> u16 {
        self.checkers_on_board(player) + self.bar.get(player) as u16 + self.borne_off.get(player) as u16
    }

    /// Total pips `player` still has to travel to bear everything off.
    pub fn pip_count(&self, player: Player) -> u32 {
        let on_board: u32 = self
            .occupied(player)
            .map(|point| player.pips_from(point) as u32 * self.own(point, player) as u32)
            .sum();
        on_board + BAR_PIPS as u32 * self.bar.get(player) as u32
    }

    /// True once a winner is recorded.
    #[inline]
    pub fn is_over(&self) -> bool {
        self.winner.is_some()
    }

    /// Verify the record-level invariants.
    pub fn check_invariants(&self) -> Result<(), InvariantError> {
        if let Some(point) = (0..POINTS as u8).find(|&point| self.count(point) > CHECKERS) {
            return Err(InvariantError::PointOverfull {
                point,
                count: self.board[point as usize],
            });
        }
        for player in Player::all() {
            let found = self.checker_total(player);
            if found != CHECKERS as u16 {
                return Err(InvariantError::CheckerCount { player, found });
            }
        }

        let finished = Player::all().find(|&p| self.borne_off.get(p) == CHECKERS);
        if finished != self.winner {
            return Err(InvariantError::WinnerMismatch {
                winner: self.winner,
                finished,
            });
        }

        if self.moves_left.len() > 4 {
            return Err(InvariantError::TooManyTokens(self.moves_left.len()));
        }
        let dice = self.dice.iter().flat_map(|roll| roll.values);
        if let Some(bad) = self.moves_left.iter().copied().chain(dice).find(|d| !(1..=6).contains(d)) {
            return Err(InvariantError::DieOutOfRange(bad));
        }
        Ok(())
    }
}

impl Default for GameState {
    fn default() -> Self {
        Self::new(Player::One)
    }
}

/// A broken record-level invariant.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum InvariantError {
    #[error("point {point} holds {count} checkers, at most 15 allowed")]
    PointOverfull { point: u8, count: i8 },
    #[error("{player} has {found} checkers, expected 15")]
    CheckerCount { player: Player, found: u16 },
    #[error("winner {winner:?} disagrees with borne-off counts (finished: {finished:?})")]
    WinnerMismatch {
        winner: Option<Player>,
        finished: Option<Player>,
    },
    #[error("{0} die tokens left, at most 4 allowed")]
    TooManyTokens(usize),
    #[error("die value {0} outside 1-6")]
    DieOutOfRange(u8),
}

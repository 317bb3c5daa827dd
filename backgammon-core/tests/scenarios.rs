//! Rule scenarios loaded from tests/data/scenarios.json.
//!
//! Each scenario starts from the opening layout or a hand-built position and
//! runs a list of actions, checking the result code of every step and, where
//! given, parts of the state afterwards. Rejected actions must leave the
//! state untouched.

use backgammon_core::{
    expand, ActionError, Counts, Destination, GameState, Move, Origin, Player, Roll, TurnStart, POINTS,
};
use serde::Deserialize;

const SCENARIOS: &str = include_str!("data/scenarios.json");

#[derive(Deserialize)]
struct Scenario {
    name: String,
    setup: Option<Setup>,
    steps: Vec<Step>,
}

#[derive(Deserialize)]
struct Setup {
    points: Vec<(u8, i8)>,
    #[serde(default)]
    bar: Counts,
    #[serde(default)]
    borne_off: Counts,
    turn: Player,
    dice: Option<[u8; 2]>,
}

impl Setup {
    fn build(&self) -> GameState {
        let mut state = GameState::new(self.turn);
        state.board = [0; POINTS];
        for &(point, count) in &self.points {
            state.board[point as usize] = count;
        }
        state.bar = self.bar;
        state.borne_off = self.borne_off;
        if let Some(values) = self.dice {
            state.dice = Some(Roll { values, player: self.turn });
            state.moves_left = expand(values);
        }
        state
    }
}

#[derive(Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
enum Action {
    Roll {
        player: Player,
        dice: [u8; 2],
    },
    Move {
        player: Player,
        origin: Origin,
        destination: Destination,
        die: u8,
    },
    EndTurn {
        player: Player,
    },
}

#[derive(Deserialize)]
struct Step {
    #[serde(flatten)]
    action: Action,
    expect: String,
    then: Option<Check>,
}

#[derive(Deserialize, Default)]
struct Check {
    #[serde(default)]
    points: Vec<(u8, i8)>,
    bar: Option<Counts>,
    borne_off: Option<Counts>,
    turn: Option<Player>,
    moves_left: Option<Vec<u8>>,
}

/// Run one action and describe what happened the way the fixture does.
fn run(state: &mut GameState, action: &Action) -> Result<&'static str, ActionError> {
    match *action {
        Action::Roll { player, dice } => Ok(match state.roll(player, dice)? {
            TurnStart::Moves => "moves",
            TurnStart::ForcedPass => "forced_pass",
        }),
        Action::Move {
            player,
            origin,
            destination,
            die,
        } => {
            let outcome = state.play(player, Move::new(origin, destination, die))?;
            Ok(if outcome.winner.is_some() {
                "win"
            } else if outcome.hit {
                "hit"
            } else {
                "ok"
            })
        }
        Action::EndTurn { player } => state.end_turn(player).map(|()| "ok"),
    }
}

fn check(name: &str, index: usize, state: &GameState, check: &Check) {
    let at = format!("{name}, step {index}");
    for &(point, count) in &check.points {
        assert_eq!(state.board[point as usize], count, "{at}: point {point}");
    }
    if let Some(bar) = check.bar {
        assert_eq!(state.bar, bar, "{at}: bar");
    }
    if let Some(borne_off) = check.borne_off {
        assert_eq!(state.borne_off, borne_off, "{at}: borne off");
    }
    if let Some(turn) = check.turn {
        assert_eq!(state.turn, turn, "{at}: turn");
    }
    if let Some(moves_left) = &check.moves_left {
        assert_eq!(&state.moves_left, moves_left, "{at}: moves left");
    }
}

#[test]
fn test_rule_scenarios() {
    let scenarios: Vec<Scenario> = serde_json::from_str(SCENARIOS).expect("scenario fixture parses");
    assert!(!scenarios.is_empty());

    for scenario in &scenarios {
        let name = scenario.name.as_str();
        let mut state = scenario.setup.as_ref().map_or_else(GameState::default, Setup::build);
        state
            .check_invariants()
            .unwrap_or_else(|err| panic!("{name}: bad setup: {err}"));

        for (index, step) in scenario.steps.iter().enumerate() {
            let before = state.clone();
            let got = match run(&mut state, &step.action) {
                Ok(result) => result,
                Err(err) => {
                    assert_eq!(state, before, "{name}, step {index}: rejected action changed the state");
                    err.code()
                }
            };
            assert_eq!(got, step.expect, "{name}, step {index}");
            assert_eq!(state.check_invariants(), Ok(()), "{name}, step {index}");
            if let Some(expected) = &step.then {
                check(name, index, &state, expected);
            }
        }
    }
}

/// Legality is a pure function of the state and the move.
#[test]
fn test_legality_is_repeatable() {
    let mut state = GameState::default();
    state.roll(Player::One, [6, 5]).unwrap();
    let snapshot = state.clone();

    for die in 1..=6 {
        for from in 0..POINTS as u8 {
            for to in 0..POINTS as u8 {
                let mv = Move::new(Origin::Point(from), Destination::Point(to), die);
                let first = state.is_legal_move(mv, Player::One);
                assert_eq!(state.is_legal_move(mv, Player::One), first);
            }
        }
    }
    assert_eq!(state, snapshot);
}

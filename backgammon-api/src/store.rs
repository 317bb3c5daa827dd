//! SQLite-backed room records.
//!
//! Every write is a read-validate-write inside one immediate transaction,
//! guarded by the record's version: `UPDATE ... WHERE version = ?` bumps it,
//! and a caller holding a stale version gets [`StoreError::Conflict`].

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use backgammon_core::{ActionError, GameState, InvariantError, Player};
use rand::Rng;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use tracing::{debug, info};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS rooms (
    code    TEXT PRIMARY KEY,
    version INTEGER NOT NULL,
    player1 TEXT,
    player2 TEXT,
    state   TEXT NOT NULL
);";

/// Room codes avoid characters that read alike (0/O, 1/I).
const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
const CODE_LEN: usize = 6;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("room {0} not found")]
    RoomNotFound(String),
    #[error("room {0} already has two players")]
    RoomFull(String),
    #[error("seat token does not belong to this room")]
    Unauthorized,
    #[error("room changed since version {expected} (now {found})")]
    Conflict { expected: u64, found: u64 },
    #[error(transparent)]
    Rejected(#[from] ActionError),
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("stored game state is unusable: {0}")]
    Corrupt(String),
    #[error("room store lock poisoned")]
    Poisoned,
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Corrupt(err.to_string())
    }
}

impl From<InvariantError> for StoreError {
    fn from(err: InvariantError) -> Self {
        StoreError::Corrupt(err.to_string())
    }
}

/// One persisted room.
#[derive(Clone, Debug, PartialEq)]
pub struct Room {
    pub code: String,
    pub version: u64,
    pub player1: Option<String>,
    pub player2: Option<String>,
    pub state: GameState,
}

impl Room {
    /// The seat a token belongs to.
    pub fn seat_of(&self, token: &str) -> Option<Player> {
        if self.player1.as_deref() == Some(token) {
            Some(Player::One)
        } else if self.player2.as_deref() == Some(token) {
            Some(Player::Two)
        } else {
            None
        }
    }

    pub fn is_seated(&self, player: Player) -> bool {
        match player {
            Player::One => self.player1.is_some(),
            Player::Two => self.player2.is_some(),
        }
    }
}

pub struct RoomStore {
    conn: Mutex<Connection>,
}

impl RoomStore {
    /// Open (or create) the store. `":memory:"` keeps everything in memory.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;
        Ok(RoomStore { conn: Mutex::new(conn) })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    /// Create a room with `starting` to move. The creator takes seat 1;
    /// returns the room and that seat's token.
    pub fn create(&self, starting: Player) -> Result<(Room, String), StoreError> {
        let conn = self.lock()?;
        let state = GameState::new(starting);
        let json = serde_json::to_string(&state)?;
        let token = new_token();

        loop {
            let code = new_code();
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO rooms (code, version, player1, player2, state)
                 VALUES (?1, 1, ?2, NULL, ?3)",
                params![code, token, json],
            )?;
            if inserted == 1 {
                info!(%code, %starting, "room created");
                let room = Room {
                    code,
                    version: 1,
                    player1: Some(token.clone()),
                    player2: None,
                    state,
                };
                return Ok((room, token));
            }
            debug!(%code, "room code taken, drawing another");
        }
    }

    /// Take seat 2. Returns the updated room and the new token.
    pub fn join(&self, code: &str) -> Result<(Room, String), StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let mut room = load_room(&tx, code)?;
        if room.player2.is_some() {
            return Err(StoreError::RoomFull(code.to_string()));
        }

        let token = new_token();
        let changed = tx.execute(
            "UPDATE rooms SET player2 = ?1, version = version + 1
             WHERE code = ?2 AND version = ?3 AND player2 IS NULL",
            params![token, code, room.version as i64],
        )?;
        if changed == 0 {
            return Err(StoreError::RoomFull(code.to_string()));
        }
        tx.commit()?;

        room.version += 1;
        room.player2 = Some(token.clone());
        info!(%code, "second player joined");
        Ok((room, token))
    }

    /// Latest record for a room.
    pub fn load(&self, code: &str) -> Result<Room, StoreError> {
        let conn = self.lock()?;
        load_room(&conn, code)
    }

    /// The seat a token holds in a room.
    pub fn seat(&self, code: &str, token: &str) -> Result<Player, StoreError> {
        self.load(code)?.seat_of(token).ok_or(StoreError::Unauthorized)
    }

    /// Run `action` against the room's state and persist the result.
    ///
    /// `expected` is the version the caller last saw; `None` skips that
    /// check but the write is still guarded against concurrent writers.
    /// A rejected action writes nothing.
    pub fn update<T>(
        &self,
        code: &str,
        expected: Option<u64>,
        action: impl FnOnce(&mut GameState) -> Result<T, ActionError>,
    ) -> Result<(Room, T), StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let mut room = load_room(&tx, code)?;
        if let Some(expected) = expected {
            if expected != room.version {
                return Err(StoreError::Conflict {
                    expected,
                    found: room.version,
                });
            }
        }

        let output = action(&mut room.state)?;
        let json = serde_json::to_string(&room.state)?;
        let changed = tx.execute(
            "UPDATE rooms SET state = ?1, version = version + 1 WHERE code = ?2 AND version = ?3",
            params![json, code, room.version as i64],
        )?;
        if changed == 0 {
            let found = current_version(&tx, code)?;
            return Err(StoreError::Conflict {
                expected: room.version,
                found,
            });
        }
        tx.commit()?;

        room.version += 1;
        debug!(%code, version = room.version, "room updated");
        Ok((room, output))
    }
}

fn load_room(conn: &Connection, code: &str) -> Result<Room, StoreError> {
    let row = conn
        .query_row(
            "SELECT version, player1, player2, state FROM rooms WHERE code = ?1",
            [code],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, Option<String>>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, String>(3)?,
                ))
            },
        )
        .optional()?;
    let Some((version, player1, player2, state)) = row else {
        return Err(StoreError::RoomNotFound(code.to_string()));
    };

    let state: GameState = serde_json::from_str(&state)?;
    state.check_invariants()?;
    Ok(Room {
        code: code.to_string(),
        version: version as u64,
        player1,
        player2,
        state,
    })
}

fn current_version(conn: &Connection, code: &str) -> Result<u64, StoreError> {
    let version: Option<i64> = conn
        .query_row("SELECT version FROM rooms WHERE code = ?1", [code], |row| row.get(0))
        .optional()?;
    version
        .map(|version| version as u64)
        .ok_or_else(|| StoreError::RoomNotFound(code.to_string()))
}

fn new_code() -> String {
    let mut rng = rand::rng();
    (0..CODE_LEN)
        .map(|_| CODE_ALPHABET[rng.random_range(0..CODE_ALPHABET.len())] as char)
        .collect()
}

/// 128 random bits, hex encoded.
fn new_token() -> String {
    let bits: u128 = rand::rng().random();
    format!("{bits:032x}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use backgammon_core::{Authority, Destination, Move, Origin, Preview};

    fn memory_store() -> RoomStore {
        RoomStore::open(":memory:").unwrap()
    }

    /// One seat of a stored room, acting through the store.
    struct RoomSeat<'a> {
        store: &'a RoomStore,
        code: String,
        token: String,
    }

    impl Authority for RoomSeat<'_> {
        type Error = StoreError;

        fn submit_move(&mut self, player: Player, mv: Move) -> Result<GameState, StoreError> {
            if self.store.seat(&self.code, &self.token)? != player {
                return Err(StoreError::Unauthorized);
            }
            let (room, _) = self.store.update(&self.code, None, |state| state.play(player, mv))?;
            Ok(room.state)
        }

        fn submit_end_turn(&mut self, player: Player) -> Result<GameState, StoreError> {
            if self.store.seat(&self.code, &self.token)? != player {
                return Err(StoreError::Unauthorized);
            }
            let (room, _) = self.store.update(&self.code, None, |state| state.end_turn(player))?;
            Ok(room.state)
        }
    }

    #[test]
    fn test_create_and_join() {
        let store = memory_store();
        let (room, token1) = store.create(Player::Two).unwrap();
        assert_eq!(room.code.len(), CODE_LEN);
        assert_eq!(room.version, 1);
        assert_eq!(room.state, GameState::new(Player::Two));
        assert!(room.is_seated(Player::One));
        assert!(!room.is_seated(Player::Two));

        let (joined, token2) = store.join(&room.code).unwrap();
        assert_ne!(token1, token2);
        assert_eq!(joined.version, 2);
        assert_eq!(store.load(&room.code).unwrap(), joined);

        assert_eq!(store.seat(&room.code, &token1).unwrap(), Player::One);
        assert_eq!(store.seat(&room.code, &token2).unwrap(), Player::Two);
        assert!(matches!(store.seat(&room.code, "nope"), Err(StoreError::Unauthorized)));
    }

    #[test]
    fn test_join_full_room() {
        let store = memory_store();
        let (room, _) = store.create(Player::One).unwrap();
        store.join(&room.code).unwrap();
        assert!(matches!(store.join(&room.code), Err(StoreError::RoomFull(_))));
    }

    #[test]
    fn test_unknown_room() {
        let store = memory_store();
        assert!(matches!(store.load("ZZZZZZ"), Err(StoreError::RoomNotFound(_))));
        assert!(matches!(store.join("ZZZZZZ"), Err(StoreError::RoomNotFound(_))));
        let result = store.update("ZZZZZZ", None, |state| state.roll(Player::One, [3, 1]));
        assert!(matches!(result, Err(StoreError::RoomNotFound(_))));
    }

    #[test]
    fn test_update_bumps_version() {
        let store = memory_store();
        let (room, _) = store.create(Player::One).unwrap();

        let (rolled, _) = store
            .update(&room.code, Some(1), |state| state.roll(Player::One, [6, 5]))
            .unwrap();
        assert_eq!(rolled.version, 2);
        assert_eq!(rolled.state.moves_left, vec![6, 5]);
        assert_eq!(store.load(&room.code).unwrap(), rolled);
    }

    #[test]
    fn test_stale_version_conflicts() {
        let store = memory_store();
        let (room, _) = store.create(Player::One).unwrap();
        store
            .update(&room.code, Some(1), |state| state.roll(Player::One, [6, 5]))
            .unwrap();

        // A retry of the same roll carrying the version it was based on.
        let retry = store.update(&room.code, Some(1), |state| state.roll(Player::One, [6, 5]));
        assert!(matches!(retry, Err(StoreError::Conflict { expected: 1, found: 2 })));

        let mv = Move::new(Origin::Point(11), Destination::Point(17), 6);
        let stale = store.update(&room.code, Some(1), |state| state.play(Player::One, mv));
        assert!(matches!(stale, Err(StoreError::Conflict { .. })));
        assert_eq!(store.load(&room.code).unwrap().state.board[17], 0);
    }

    #[test]
    fn test_rejected_action_writes_nothing() {
        let store = memory_store();
        let (room, _) = store.create(Player::One).unwrap();
        let result = store.update(&room.code, None, |state| state.roll(Player::Two, [6, 5]));
        assert!(matches!(result, Err(StoreError::Rejected(ActionError::NotYourTurn))));
        assert_eq!(store.load(&room.code).unwrap(), room);
    }

    #[test]
    fn test_unusable_stored_state_is_corrupt() {
        let store = memory_store();
        let (room, _) = store.create(Player::One).unwrap();

        let mut state = serde_json::to_value(&room.state).unwrap();
        state["board"][0] = serde_json::json!(-128);
        store
            .lock()
            .unwrap()
            .execute(
                "UPDATE rooms SET state = ?1 WHERE code = ?2",
                params![state.to_string(), room.code],
            )
            .unwrap();

        assert!(matches!(store.load(&room.code), Err(StoreError::Corrupt(_))));
        let result = store.update(&room.code, None, |state| state.roll(Player::One, [3, 1]));
        assert!(matches!(result, Err(StoreError::Corrupt(_))));

        store
            .lock()
            .unwrap()
            .execute("UPDATE rooms SET state = 'not json' WHERE code = ?1", [&room.code])
            .unwrap();
        assert!(matches!(store.load(&room.code), Err(StoreError::Corrupt(_))));
    }

    #[test]
    fn test_reopen_file_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rooms.db");

        let code = {
            let store = RoomStore::open(&path).unwrap();
            let (room, _) = store.create(Player::One).unwrap();
            store
                .update(&room.code, None, |state| state.roll(Player::One, [4, 4]))
                .unwrap();
            room.code
        };

        let store = RoomStore::open(&path).unwrap();
        let room = store.load(&code).unwrap();
        assert_eq!(room.version, 2);
        assert_eq!(room.state.moves_left, vec![4, 4, 4, 4]);
    }

    #[test]
    fn test_preview_confirms_through_store() {
        let store = memory_store();
        let (room, token) = store.create(Player::One).unwrap();
        store.join(&room.code).unwrap();
        let (rolled, _) = store
            .update(&room.code, None, |state| state.roll(Player::One, [6, 5]))
            .unwrap();

        let mut preview = Preview::new(rolled.state, Player::One);
        preview.play(Origin::Point(11), Destination::Point(17)).unwrap();
        preview.play(Origin::Point(11), Destination::Point(16)).unwrap();
        let local = preview.local().clone();

        let mut seat = RoomSeat { store: &store, code: room.code.clone(), token };
        let confirmed = preview.confirm(&mut seat).unwrap();

        let stored = store.load(&room.code).unwrap();
        assert_eq!(stored.state, confirmed);
        assert_eq!(stored.version, rolled.version + 3);
        assert_eq!(stored.state.board, local.board);
        assert_eq!(stored.state.turn, Player::Two);
        assert!(preview.pending().is_empty());
    }

    #[test]
    fn test_preview_confirm_after_reset() {
        let store = memory_store();
        let (room, token) = store.create(Player::One).unwrap();
        let (rolled, _) = store
            .update(&room.code, None, |state| state.roll(Player::One, [6, 5]))
            .unwrap();

        let mut preview = Preview::new(rolled.state, Player::One);
        preview.play(Origin::Point(11), Destination::Point(17)).unwrap();

        // The room is reset from another session before the confirm lands.
        store
            .update(&room.code, None, |state| {
                state.reset(Player::One);
                Ok(())
            })
            .unwrap();

        let mut seat = RoomSeat { store: &store, code: room.code.clone(), token };
        let err = preview.confirm(&mut seat).unwrap_err();
        assert_eq!(err.accepted, 0);
        assert!(matches!(err.source, StoreError::Rejected(ActionError::RollFirst)));
        assert_eq!(preview.pending().len(), 1);
        assert_eq!(store.load(&room.code).unwrap().state, GameState::new(Player::One));
    }
}

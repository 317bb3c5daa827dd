//! Backgammon Web API
//!
//! Authoritative server for two-player rooms. Each room is one SQLite
//! record; every action runs the backgammon-core rules against the stored
//! state inside a versioned transaction, and the new record is pushed to
//! the room's WebSocket subscribers.
//!
//! Browsers preview moves locally with the same rule engine compiled to
//! WebAssembly, then post them here one by one followed by an end-turn.

mod error;
mod feed;
mod store;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use clap::Parser;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::error::RecvError;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn, Level};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

use backgammon_core::{roll, Destination, GameState, Move, MoveOutcome, Origin, Player, TurnStart};

use crate::error::ApiError;
use crate::feed::{Feed, Subscription};
use crate::store::{Room, RoomStore};

const SEAT_TOKEN_HEADER: &str = "x-seat-token";

// =============================================================================
// Configuration
// =============================================================================

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Address to listen on.
    #[arg(long, env = "BACKGAMMON_LISTEN", default_value = "0.0.0.0:8000")]
    listen: SocketAddr,

    /// SQLite database file (":memory:" keeps rooms in memory only).
    #[arg(long, env = "BACKGAMMON_DATABASE", default_value = "data/rooms.db")]
    database: PathBuf,

    #[arg(long, env = "BACKGAMMON_LOG_LEVEL", default_value = "info")]
    log_level: Level,

    /// Updates buffered per room before a slow subscriber lags.
    #[arg(long, env = "BACKGAMMON_FEED_CAPACITY", default_value_t = 64)]
    feed_capacity: usize,
}

// =============================================================================
// Shared State
// =============================================================================

struct AppStateInner {
    store: RoomStore,
    feed: Arc<Feed>,
}

type AppState = Arc<AppStateInner>;

impl AppStateInner {
    /// Announce a written record to the room.
    fn publish(&self, room: &Room) -> RoomView {
        let view = RoomView::from(room);
        let delivered = self.feed.publish(view.clone());
        debug!(code = %room.code, version = room.version, delivered, "published room");
        view
    }
}

// =============================================================================
// JSON Models
// =============================================================================

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct SeatsModel {
    pub player1: bool,
    pub player2: bool,
}

/// A room as clients see it. Seat tokens never leave the server.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct RoomView {
    pub code: String,
    pub version: u64,
    pub seats: SeatsModel,
    pub state: GameState,
}

impl From<&Room> for RoomView {
    fn from(room: &Room) -> Self {
        RoomView {
            code: room.code.clone(),
            version: room.version,
            seats: SeatsModel {
                player1: room.is_seated(Player::One),
                player2: room.is_seated(Player::Two),
            },
            state: room.state.clone(),
        }
    }
}

/// Returned once to whoever takes a seat.
#[derive(Serialize)]
struct SeatModel {
    token: String,
    player: Player,
    room: RoomView,
}

#[derive(Serialize)]
struct ActionModel<T> {
    room: RoomView,
    outcome: T,
}

#[derive(Serialize)]
struct RollOutcome {
    dice: [u8; 2],
    result: TurnStart,
}

#[derive(Serialize)]
struct HealthModel {
    status: String,
}

#[derive(Deserialize, Default)]
struct CreateRequest {
    starting_player: Option<Player>,
}

/// Body of roll and end-turn; both fields optional.
#[derive(Deserialize, Default)]
struct VersionRequest {
    version: Option<u64>,
}

#[derive(Deserialize)]
struct MoveRequest {
    origin: Origin,
    destination: Destination,
    die: u8,
    version: Option<u64>,
}

#[derive(Deserialize, Default)]
struct ResetRequest {
    starting_player: Option<Player>,
    version: Option<u64>,
}

fn seat_token(headers: &HeaderMap) -> Result<&str, ApiError> {
    headers
        .get(SEAT_TOKEN_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or(ApiError::MissingToken)
}

fn random_player() -> Player {
    if rand::random::<bool>() {
        Player::One
    } else {
        Player::Two
    }
}

// =============================================================================
// API Endpoints
// =============================================================================

async fn create_room(
    State(state): State<AppState>,
    body: Option<Json<CreateRequest>>,
) -> Result<(StatusCode, Json<SeatModel>), ApiError> {
    let req = body.map(|Json(req)| req).unwrap_or_default();
    let starting = req.starting_player.unwrap_or_else(random_player);
    let (room, token) = state.store.create(starting)?;
    Ok((
        StatusCode::CREATED,
        Json(SeatModel {
            token,
            player: Player::One,
            room: RoomView::from(&room),
        }),
    ))
}

async fn join_room(State(state): State<AppState>, Path(code): Path<String>) -> Result<Json<SeatModel>, ApiError> {
    let (room, token) = state.store.join(&code)?;
    let view = state.publish(&room);
    Ok(Json(SeatModel {
        token,
        player: Player::Two,
        room: view,
    }))
}

async fn get_room(State(state): State<AppState>, Path(code): Path<String>) -> Result<Json<RoomView>, ApiError> {
    let room = state.store.load(&code)?;
    Ok(Json(RoomView::from(&room)))
}

async fn get_moves(State(state): State<AppState>, Path(code): Path<String>) -> Result<Json<Vec<Move>>, ApiError> {
    let room = state.store.load(&code)?;
    Ok(Json(room.state.legal_moves(room.state.turn)))
}

async fn roll_dice(
    State(state): State<AppState>,
    Path(code): Path<String>,
    headers: HeaderMap,
    body: Option<Json<VersionRequest>>,
) -> Result<Json<ActionModel<RollOutcome>>, ApiError> {
    let req = body.map(|Json(req)| req).unwrap_or_default();
    let player = state.store.seat(&code, seat_token(&headers)?)?;
    let dice = roll(&mut rand::rng());

    let (room, result) = state
        .store
        .update(&code, req.version, |game| game.roll(player, dice))?;
    info!(%code, %player, ?dice, ?result, "rolled");

    Ok(Json(ActionModel {
        room: state.publish(&room),
        outcome: RollOutcome { dice, result },
    }))
}

async fn make_move(
    State(state): State<AppState>,
    Path(code): Path<String>,
    headers: HeaderMap,
    Json(req): Json<MoveRequest>,
) -> Result<Json<ActionModel<MoveOutcome>>, ApiError> {
    let player = state.store.seat(&code, seat_token(&headers)?)?;
    let mv = Move::new(req.origin, req.destination, req.die);

    let (room, outcome) = match state.store.update(&code, req.version, |game| game.play(player, mv)) {
        Ok(done) => done,
        Err(err) => {
            debug!(%code, %player, %mv, %err, "move rejected");
            return Err(err.into());
        }
    };
    info!(%code, %player, %mv, hit = outcome.hit, "moved");
    if let Some(winner) = outcome.winner {
        info!(%code, %winner, "game won");
    }

    Ok(Json(ActionModel {
        room: state.publish(&room),
        outcome,
    }))
}

async fn end_turn(
    State(state): State<AppState>,
    Path(code): Path<String>,
    headers: HeaderMap,
    body: Option<Json<VersionRequest>>,
) -> Result<Json<RoomView>, ApiError> {
    let req = body.map(|Json(req)| req).unwrap_or_default();
    let player = state.store.seat(&code, seat_token(&headers)?)?;
    let (room, ()) = state.store.update(&code, req.version, |game| game.end_turn(player))?;
    info!(%code, %player, "turn ended");
    Ok(Json(state.publish(&room)))
}

/// Either seat may reset at any time, including after a win.
async fn reset_game(
    State(state): State<AppState>,
    Path(code): Path<String>,
    headers: HeaderMap,
    body: Option<Json<ResetRequest>>,
) -> Result<Json<RoomView>, ApiError> {
    let req = body.map(|Json(req)| req).unwrap_or_default();
    let player = state.store.seat(&code, seat_token(&headers)?)?;
    let starting = req.starting_player.unwrap_or_else(random_player);
    let (room, ()) = state.store.update(&code, req.version, |game| {
        game.reset(starting);
        Ok(())
    })?;
    info!(%code, %player, %starting, "game reset");
    Ok(Json(state.publish(&room)))
}

async fn health() -> Json<HealthModel> {
    Json(HealthModel {
        status: "ok".to_string(),
    })
}

// =============================================================================
// Change Feed
// =============================================================================

async fn room_feed(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let (updates, current) = open_feed(&state, &code)?;
    Ok(ws.on_upgrade(move |socket| stream_room(socket, state, code, updates, current)))
}

/// Subscribe to an existing room and read its current record.
fn open_feed(state: &AppState, code: &str) -> Result<(Subscription, RoomView), ApiError> {
    // Unknown rooms must not get a channel.
    state.store.load(code)?;
    // Read again after subscribing so no write falls between the two.
    let updates = state.feed.subscribe(code);
    let current = RoomView::from(&state.store.load(code)?);
    Ok((updates, current))
}

async fn stream_room(
    socket: WebSocket,
    state: AppState,
    code: String,
    mut updates: Subscription,
    current: RoomView,
) {
    let (mut sender, mut receiver) = socket.split();
    let mut sent = current.version;
    if send_view(&mut sender, &current).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            update = updates.recv() => {
                let view = match update {
                    Ok(view) => view,
                    Err(RecvError::Lagged(skipped)) => {
                        debug!(%code, skipped, "subscriber lagged, resending latest record");
                        match state.store.load(&code) {
                            Ok(room) => RoomView::from(&room),
                            Err(err) => {
                                warn!(%code, %err, "reloading room for lagged subscriber failed");
                                break;
                            }
                        }
                    }
                    Err(RecvError::Closed) => break,
                };
                // Older records can still be queued after a resync.
                if view.version <= sent {
                    continue;
                }
                sent = view.version;
                if send_view(&mut sender, &view).await.is_err() {
                    break;
                }
            }
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }
    debug!(%code, "feed subscriber disconnected");
}

async fn send_view(sender: &mut SplitSink<WebSocket, Message>, view: &RoomView) -> Result<(), axum::Error> {
    let payload = serde_json::to_string(view).map_err(axum::Error::new)?;
    sender.send(Message::Text(payload.into())).await
}

// =============================================================================
// Main
// =============================================================================

fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/rooms", post(create_room))
        .route("/rooms/{code}", get(get_room))
        .route("/rooms/{code}/join", post(join_room))
        .route("/rooms/{code}/moves", get(get_moves))
        .route("/rooms/{code}/roll", post(roll_dice))
        .route("/rooms/{code}/move", post(make_move))
        .route("/rooms/{code}/end-turn", post(end_turn))
        .route("/rooms/{code}/reset", post(reset_game))
        .route("/rooms/{code}/ws", get(room_feed))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_filter(LevelFilter::from_level(args.log_level)))
        .init();

    if let Some(dir) = args.database.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    }
    let store = RoomStore::open(&args.database)
        .with_context(|| format!("opening room store at {}", args.database.display()))?;

    let state: AppState = Arc::new(AppStateInner {
        store,
        feed: Arc::new(Feed::new(args.feed_capacity)),
    });

    let listener = tokio::net::TcpListener::bind(args.listen)
        .await
        .with_context(|| format!("binding {}", args.listen))?;
    info!(addr = %args.listen, database = %args.database.display(), "backgammon api listening");

    axum::serve(listener, router(state)).await?;
    Ok(())
}

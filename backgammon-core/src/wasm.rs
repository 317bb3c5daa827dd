//! WASM bindings for backgammon-core
//!
//! Exposes the move preview to the browser. Origins and destinations are
//! passed as optional point indices: `undefined` means the bar for an origin
//! and bearing off for a destination.

use wasm_bindgen::prelude::*;

use crate::{Destination, GameState, Origin, Player, Preview};

fn origin_from_js(point: Option<u8>) -> Origin {
    point.map_or(Origin::Bar, Origin::Point)
}

fn destination_from_js(point: Option<u8>) -> Destination {
    point.map_or(Destination::Off, Destination::Point)
}

fn player_from_js(player: u8) -> Result<Player, JsValue> {
    Player::try_from(player).map_err(|err| JsValue::from_str(&err.to_string()))
}

/// Decode a state object and reject records no game could reach.
fn state_from_js(state: JsValue) -> Result<GameState, JsValue> {
    let state: GameState = serde_wasm_bindgen::from_value(state).map_err(JsValue::from)?;
    state
        .check_invariants()
        .map_err(|err| JsValue::from_str(&err.to_string()))?;
    Ok(state)
}

/// WASM-friendly wrapper around Preview
#[wasm_bindgen]
pub struct WasmPreview {
    inner: Preview,
}

#[wasm_bindgen]
impl WasmPreview {
    /// Start a preview from an authoritative state object for seat 1 or 2
    #[wasm_bindgen(constructor)]
    pub fn new(state: JsValue, player: u8) -> Result<WasmPreview, JsValue> {
        Ok(WasmPreview {
            inner: Preview::new(state_from_js(state)?, player_from_js(player)?),
        })
    }

    /// Local state with pending moves applied
    pub fn state(&self) -> Result<JsValue, JsValue> {
        serde_wasm_bindgen::to_value(self.inner.local()).map_err(JsValue::from)
    }

    /// Pending moves as [{ origin, destination, die }], in submission order
    pub fn pending(&self) -> Result<JsValue, JsValue> {
        serde_wasm_bindgen::to_value(self.inner.pending()).map_err(JsValue::from)
    }

    /// Move a checker locally. Returns { hit, winner } or throws an error code
    pub fn play(&mut self, origin: Option<u8>, destination: Option<u8>) -> Result<JsValue, JsValue> {
        let outcome = self
            .inner
            .play(origin_from_js(origin), destination_from_js(destination))
            .map_err(|err| JsValue::from_str(err.code()))?;
        serde_wasm_bindgen::to_value(&outcome).map_err(JsValue::from)
    }

    /// Undo the last pending move. Returns false if nothing was pending
    pub fn undo(&mut self) -> bool {
        self.inner.undo().is_some()
    }

    /// Adopt a newer authoritative state. Returns true if pending moves were dropped
    pub fn sync(&mut self, state: JsValue) -> Result<bool, JsValue> {
        Ok(self.inner.sync(state_from_js(state)?))
    }

    /// Destinations reachable from an origin, each a point index or "off"
    #[wasm_bindgen(js_name = legalDestinations)]
    pub fn legal_destinations(&self, origin: Option<u8>) -> Result<JsValue, JsValue> {
        let destinations = self
            .inner
            .local()
            .legal_destinations(origin_from_js(origin), self.inner.player());
        serde_wasm_bindgen::to_value(&destinations).map_err(JsValue::from)
    }

    /// Whether any remaining token still has a legal move
    #[wasm_bindgen(js_name = hasAnyLegalMove)]
    pub fn has_any_legal_move(&self) -> bool {
        let local = self.inner.local();
        local.has_any_legal_move(&local.moves_left, self.inner.player())
    }

    /// Pip count for a player (1 or 2)
    #[wasm_bindgen(js_name = pipCount)]
    pub fn pip_count(&self, player: u8) -> Result<u32, JsValue> {
        Ok(self.inner.local().pip_count(player_from_js(player)?))
    }
}

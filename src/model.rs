//! Domain entities and the application model.
//!
//! Entity structs mirror the backend's camelCase JSON exactly; they are
//! immutable snapshots replaced wholesale on re-fetch, never patched in
//! place. `Model` is the single authoritative store of UI and session state,
//! mutated only by `App::update`.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::api::{ApiError, ApiRequest};
use crate::capabilities::DEFAULT_TIMEOUT_MS;
use crate::search_history::SearchHistory;
use crate::Filter;

/// The access/refresh pair issued at login and rotated on refresh.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

impl std::fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenPair")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginPayload {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleLoginPayload {
    pub id_token: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterPayload {
    pub email: String,
    pub password: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub user_id: u64,
    pub email: String,
    pub name: String,
    #[serde(default)]
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParkingLot {
    pub parking_lot_id: u64,
    pub name: String,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    pub total_slots: u32,
    pub available_slots: u32,
}

impl ParkingLot {
    /// Occupancy-derived congestion bucket; never trusted from the wire.
    #[must_use]
    pub fn congestion(&self) -> crate::CongestionLevel {
        crate::congestion_level(self.available_slots, self.total_slots)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FavoriteLot {
    pub favorite_parking_lot_id: u64,
    pub parking_lot_id: u64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSettings {
    pub setting_id: u64,
    pub parking_sort: String,
    pub congestion_alert: bool,
    pub available_alert: bool,
    pub auto_launch: bool,
    pub theme: String,
    pub font_size: String,
    pub language: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParkedLocation {
    pub parking_lot_name: String,
    pub location: String,
    pub parked_at: String,
}

/// In-memory token cache. This is the "memory cache" the request-phase
/// interceptor reads; it is the source of truth between process restarts,
/// with the key-value store as its durable mirror.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Session {
    access_token: Option<String>,
    refresh_token: Option<String>,
}

impl Session {
    #[must_use]
    pub fn with_tokens(access: Option<String>, refresh: Option<String>) -> Self {
        Self {
            access_token: access,
            refresh_token: refresh,
        }
    }

    #[must_use]
    pub fn access_token(&self) -> Option<&str> {
        self.access_token.as_deref()
    }

    #[must_use]
    pub fn refresh_token(&self) -> Option<&str> {
        self.refresh_token.as_deref()
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.access_token.is_some()
    }

    /// Replaces both tokens. After this, any previously-issued access token
    /// is dead and must not be reused.
    pub fn install(&mut self, pair: &TokenPair) {
        self.access_token = Some(pair.access_token.clone());
        self.refresh_token = Some(pair.refresh_token.clone());
    }

    pub fn clear(&mut self) {
        self.access_token = None;
        self.refresh_token = None;
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("access_token", &self.access_token.as_ref().map(|_| "<redacted>"))
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Token renewal coordination. At most one renewal is in flight; requests
/// that hit 401 while one is running queue on it instead of starting their
/// own. The update loop is single-threaded, so this needs no lock.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum RefreshState {
    #[default]
    Idle,
    InFlight { queued: Vec<ApiRequest> },
}

impl RefreshState {
    #[must_use]
    pub const fn is_in_flight(&self) -> bool {
        matches!(self, Self::InFlight { .. })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AuthState {
    /// Restoring persisted session state at startup.
    #[default]
    Restoring,
    Unauthenticated,
    Authenticating,
    Ready,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiConfig {
    pub base_url: Url,
    pub timeout_ms: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            // Placeholder host; shells override this per deployment.
            base_url: Url::parse("https://parking.campus.example")
                .unwrap_or_else(|_| unreachable!("static URL is valid")),
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }
}

#[derive(Debug, Default)]
pub struct Model {
    pub config: ApiConfig,

    // Session
    pub session: Session,
    pub refresh: RefreshState,
    pub auth_state: AuthState,
    pub user: Option<UserProfile>,

    // Server-sourced snapshots
    pub lots: Vec<ParkingLot>,
    pub favorites: Vec<FavoriteLot>,
    pub settings: Option<UserSettings>,
    pub parked_location: Option<ParkedLocation>,
    pub is_loading_lots: bool,

    // UI selection state (not persisted, except search history)
    pub selected_lot: Option<ParkingLot>,
    pub search_query: String,
    pub search_generation: u64,
    pub search_results: Vec<ParkingLot>,
    pub selected_filter: Filter,
    pub bottom_sheet_index: u8,
    pub is_search_focused: bool,
    pub search_history: SearchHistory,

    pub last_error: Option<ApiError>,
}

impl Model {
    #[must_use]
    pub fn is_favorite(&self, parking_lot_id: u64) -> bool {
        self.favorites
            .iter()
            .any(|f| f.parking_lot_id == parking_lot_id)
    }

    #[must_use]
    pub fn lot_by_id(&self, parking_lot_id: u64) -> Option<&ParkingLot> {
        self.search_results
            .iter()
            .chain(self.lots.iter())
            .find(|lot| lot.parking_lot_id == parking_lot_id)
    }

    /// Drops everything tied to the signed-in user. Storage removal is the
    /// caller's responsibility; this only covers memory.
    pub fn clear_session_state(&mut self) {
        self.session.clear();
        self.refresh = RefreshState::Idle;
        self.auth_state = AuthState::Unauthenticated;
        self.user = None;
        self.favorites.clear();
        self.settings = None;
        self.parked_location = None;
        self.search_history.clear();
    }

    pub fn record_error(&mut self, error: ApiError) {
        tracing::warn!(code = error.code.as_str(), message = %error.message, "request failed");
        self.last_error = Some(error);
    }
}

#![forbid(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(
    clippy::module_name_repetitions,
    clippy::too_many_lines,
    clippy::cast_precision_loss
)]

//! Shared core for the campus parking client.
//!
//! The core owns authenticated API access (bearer attachment, automatic
//! token refresh on 401, failure classification), the application state
//! store (selection, filters, bottom sheet, bounded search history), and the
//! view model derived from them. Rendering, navigation and platform I/O live
//! in the shells, reached through capabilities.

pub mod api;
pub mod capabilities;
pub mod event;
pub mod model;
pub mod search_history;
pub mod services;

pub use api::{ApiError, ApiErrorCode};
pub use app::App;
pub use capabilities::{Capabilities, Effect};
pub use event::Event;
pub use model::Model;
pub use search_history::{SearchEntry, SearchHistory};

use serde::{Deserialize, Serialize};

// --- Tunables -------------------------------------------------------------

/// Maximum retained search-history entries.
pub const MAX_SEARCH_HISTORY: usize = 10;

/// Queries with fewer trimmed characters than this never reach the server.
pub const MIN_SEARCH_QUERY_LEN: usize = 2;

/// Idle time before a typed query is evaluated.
pub const SEARCH_DEBOUNCE_MS: u64 = 300;

/// Default map region: campus center and radius.
pub const CAMPUS_CENTER_LAT: f64 = 37.3211;
pub const CAMPUS_CENTER_LON: f64 = 127.1267;
pub const CAMPUS_RADIUS_M: f64 = 2_000.0;

/// Bottom-sheet snap points, by index.
pub const SHEET_COLLAPSED: u8 = 0;
pub const SHEET_MID: u8 = 1;
pub const SHEET_EXPANDED: u8 = 2;

const EARTH_RADIUS_M: f64 = 6_371_000.0;

// --- Congestion -----------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CongestionLevel {
    Available,
    Normal,
    Busy,
    Full,
}

impl CongestionLevel {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Available => "Available",
            Self::Normal => "Normal",
            Self::Busy => "Busy",
            Self::Full => "Full",
        }
    }

    /// Marker tint used by the map shells.
    #[must_use]
    pub const fn color(self) -> &'static str {
        match self {
            Self::Available => "#34C759",
            Self::Normal => "#FFD60A",
            Self::Busy => "#FF9500",
            Self::Full => "#FF3B30",
        }
    }
}

/// Buckets a lot's occupancy ratio. A lot with no slots at all counts as
/// full. Boundaries are inclusive: exactly 90% is full, 70% busy, 40% normal.
#[must_use]
pub fn congestion_level(available_slots: u32, total_slots: u32) -> CongestionLevel {
    if total_slots == 0 {
        return CongestionLevel::Full;
    }
    let occupied = total_slots.saturating_sub(available_slots);
    let occupancy = f64::from(occupied) / f64::from(total_slots) * 100.0;
    if occupancy >= 90.0 {
        CongestionLevel::Full
    } else if occupancy >= 70.0 {
        CongestionLevel::Busy
    } else if occupancy >= 40.0 {
        CongestionLevel::Normal
    } else {
        CongestionLevel::Available
    }
}

// --- Filters --------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Filter {
    #[default]
    All,
    Favorites,
    Available,
    Normal,
    Busy,
    Full,
}

impl Filter {
    #[must_use]
    pub fn matches(self, lot: &model::ParkingLot, is_favorite: bool) -> bool {
        match self {
            Self::All => true,
            Self::Favorites => is_favorite,
            Self::Available => lot.congestion() == CongestionLevel::Available,
            Self::Normal => lot.congestion() == CongestionLevel::Normal,
            Self::Busy => lot.congestion() == CongestionLevel::Busy,
            Self::Full => lot.congestion() == CongestionLevel::Full,
        }
    }
}

// --- Geometry & formatting ------------------------------------------------

/// Great-circle distance in meters.
#[must_use]
pub fn haversine_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();
    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_M * c
}

#[must_use]
pub fn format_distance(meters: f64) -> String {
    if meters < 1_000.0 {
        format!("{} m", meters.round() as i64)
    } else {
        format!("{:.1} km", meters / 1_000.0)
    }
}

/// Milliseconds since the Unix epoch; zero if the clock is broken.
#[must_use]
pub fn current_time_ms() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}

// --- View model -----------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum AuthView {
    Restoring,
    Unauthenticated,
    Authenticating,
    Ready { name: String, email: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LotMarker {
    pub parking_lot_id: u64,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub available_slots: u32,
    pub total_slots: u32,
    pub congestion: CongestionLevel,
    pub congestion_color: &'static str,
    pub is_favorite: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LotDetail {
    pub parking_lot_id: u64,
    pub name: String,
    pub location: Option<String>,
    pub address: Option<String>,
    pub available_slots: u32,
    pub total_slots: u32,
    pub congestion: CongestionLevel,
    pub congestion_label: &'static str,
    pub distance_from_campus: String,
    pub is_favorite: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchView {
    pub query: String,
    pub is_focused: bool,
    pub history: Vec<SearchEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorView {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViewModel {
    pub auth: AuthView,
    pub lots: Vec<LotMarker>,
    pub search_results: Vec<LotMarker>,
    pub selected: Option<LotDetail>,
    pub search: SearchView,
    pub bottom_sheet_index: u8,
    pub is_loading_lots: bool,
    pub parked_location: Option<model::ParkedLocation>,
    pub error: Option<ErrorView>,
}

// --- App ------------------------------------------------------------------

pub mod app {
    use super::{
        format_distance, haversine_distance, AuthView, ErrorView, Filter, LotDetail, LotMarker,
        SearchView, ViewModel, CAMPUS_CENTER_LAT, CAMPUS_CENTER_LON, MIN_SEARCH_QUERY_LEN,
        SEARCH_DEBOUNCE_MS, SHEET_MID,
    };
    use crate::api::{self, ApiError, ApiRequest, RequestKind};
    use crate::capabilities::{Capabilities, HttpResult, KvOutput, StorageKey};
    use crate::event::Event;
    use crate::model::{
        AuthState, Model, ParkedLocation, ParkingLot, RefreshState, TokenPair, UserProfile,
    };
    use crate::services::{auth, parking};

    #[derive(Default)]
    pub struct App;

    impl crux_core::App for App {
        type Event = Event;
        type Model = Model;
        type ViewModel = ViewModel;
        type Capabilities = Capabilities;

        fn update(&self, event: Event, model: &mut Model, caps: &Capabilities) {
            tracing::debug!(event = event.name(), "update");
            match event {
                Event::AppStarted => {
                    model.auth_state = AuthState::Restoring;
                    caps.kv.get_multi(Self::startup_keys().to_vec(), |result| {
                        Event::StorageRestored(Box::new(result))
                    });
                }
                Event::StorageRestored(result) => Self::restore_storage(*result, model, caps),

                Event::LoginSubmitted(payload) => {
                    model.auth_state = AuthState::Authenticating;
                    Self::try_dispatch(auth::login(&payload), model, caps);
                }
                Event::GoogleLoginSubmitted(payload) => {
                    model.auth_state = AuthState::Authenticating;
                    Self::try_dispatch(auth::google_login(&payload), model, caps);
                }
                Event::RegisterSubmitted(payload) => {
                    model.auth_state = AuthState::Authenticating;
                    Self::try_dispatch(auth::register(&payload), model, caps);
                }
                Event::LogoutRequested => {
                    // The server call needs the bearer, so it goes out before
                    // local state is dropped. Its outcome never blocks local
                    // logout.
                    Self::dispatch(auth::logout(), model, caps);
                    Self::end_session_locally(model, caps);
                }
                Event::DeleteAccountRequested => {
                    Self::dispatch(auth::delete_account(), model, caps);
                    Self::end_session_locally(model, caps);
                }

                Event::LotsRefreshRequested => {
                    model.is_loading_lots = true;
                    Self::dispatch(parking::fetch_lots(), model, caps);
                }
                Event::FavoritesRefreshRequested => {
                    Self::dispatch(parking::fetch_favorites(), model, caps);
                }
                Event::FavoriteAdded { parking_lot_id } => {
                    Self::try_dispatch(parking::add_favorite(parking_lot_id), model, caps);
                }
                Event::FavoriteRemoved { favorite_id } => {
                    Self::dispatch(parking::remove_favorite(favorite_id), model, caps);
                }
                Event::SettingsRefreshRequested => {
                    Self::dispatch(parking::fetch_settings(), model, caps);
                }
                Event::SettingsUpdateRequested(settings) => {
                    Self::try_dispatch(parking::update_settings(&settings), model, caps);
                }
                Event::ParkedLocationSaved {
                    parking_lot_name,
                    location,
                } => {
                    let parked = ParkedLocation {
                        parking_lot_name,
                        location,
                        // Epoch millis as a string; the shell formats it.
                        parked_at: super::current_time_ms().to_string(),
                    };
                    model.parked_location = Some(parked.clone());
                    Self::persist_json(StorageKey::ParkedLocation, &parked, caps);
                    Self::try_dispatch(parking::save_parked_location(&parked), model, caps);
                }
                Event::ParkedLocationCleared => {
                    model.parked_location = None;
                    Self::remove_keys(vec![StorageKey::ParkedLocation], caps);
                }

                Event::SearchQueryChanged { text } => {
                    model.search_query = text;
                    model.search_generation += 1;
                    let generation = model.search_generation;
                    // Character count, not byte length: a single Hangul
                    // syllable is one character.
                    if model.search_query.trim().chars().count() >= MIN_SEARCH_QUERY_LEN {
                        caps.delay.start(SEARCH_DEBOUNCE_MS, move || {
                            Event::SearchDebounceElapsed { generation }
                        });
                    } else {
                        model.search_results.clear();
                    }
                }
                Event::SearchDebounceElapsed { generation } => {
                    let query = model.search_query.trim().to_string();
                    if generation == model.search_generation
                        && query.chars().count() >= MIN_SEARCH_QUERY_LEN
                    {
                        Self::dispatch(parking::search_lots(&query, generation), model, caps);
                    }
                }
                Event::SearchSubmitted { query } => {
                    Self::record_search(&query, None, model, caps);
                    let trimmed = query.trim().to_string();
                    model.search_query = query;
                    if trimmed.chars().count() >= MIN_SEARCH_QUERY_LEN {
                        model.search_generation += 1;
                        Self::dispatch(
                            parking::search_lots(&trimmed, model.search_generation),
                            model,
                            caps,
                        );
                    }
                }
                Event::LotSelected { parking_lot_id } => {
                    Self::select_lot(parking_lot_id, model);
                }
                Event::LotDeselected => {
                    model.selected_lot = None;
                }
                Event::LotChosenFromSearch { parking_lot_id } => {
                    // Atomic from the caller's point of view: no render
                    // happens between these writes.
                    Self::select_lot(parking_lot_id, model);
                    model.is_search_focused = false;
                    let query = model.search_query.clone();
                    Self::record_search(&query, Some(parking_lot_id), model, caps);
                }
                Event::FilterSelected(filter) => {
                    model.selected_filter = filter;
                }
                Event::FiltersReset => {
                    model.selected_filter = Filter::All;
                    model.search_query.clear();
                    model.search_generation += 1;
                    model.search_results.clear();
                }
                Event::SheetSnapped { index } => {
                    // Range is the caller's responsibility.
                    model.bottom_sheet_index = index;
                }
                Event::SearchFocusChanged { focused } => {
                    model.is_search_focused = focused;
                }
                Event::SearchHistoryCleared => {
                    // Memory and storage are cleared independently; neither
                    // waits on the other.
                    model.search_history.clear();
                    Self::remove_keys(vec![StorageKey::SearchHistory], caps);
                }
                Event::ErrorDismissed => {
                    model.last_error = None;
                }

                Event::ApiResponse { request, result } => {
                    Self::handle_api_response(*request, *result, model, caps);
                }
                Event::PersistCompleted { keys, result } => {
                    if let Err(error) = *result {
                        tracing::warn!(?keys, %error, "persistence failed; memory state stands");
                    }
                }
            }
            caps.render.render();
        }

        fn view(&self, model: &Model) -> ViewModel {
            let marker = |lot: &ParkingLot| LotMarker {
                parking_lot_id: lot.parking_lot_id,
                name: lot.name.clone(),
                latitude: lot.latitude,
                longitude: lot.longitude,
                available_slots: lot.available_slots,
                total_slots: lot.total_slots,
                congestion: lot.congestion(),
                congestion_color: lot.congestion().color(),
                is_favorite: model.is_favorite(lot.parking_lot_id),
            };

            ViewModel {
                auth: match model.auth_state {
                    AuthState::Restoring => AuthView::Restoring,
                    AuthState::Unauthenticated => AuthView::Unauthenticated,
                    AuthState::Authenticating => AuthView::Authenticating,
                    AuthState::Ready => model.user.as_ref().map_or(
                        AuthView::Ready {
                            name: String::new(),
                            email: String::new(),
                        },
                        |user| AuthView::Ready {
                            name: user.name.clone(),
                            email: user.email.clone(),
                        },
                    ),
                },
                lots: model
                    .lots
                    .iter()
                    .filter(|lot| {
                        model
                            .selected_filter
                            .matches(lot, model.is_favorite(lot.parking_lot_id))
                    })
                    .map(marker)
                    .collect(),
                search_results: model.search_results.iter().map(marker).collect(),
                selected: model.selected_lot.as_ref().map(|lot| LotDetail {
                    parking_lot_id: lot.parking_lot_id,
                    name: lot.name.clone(),
                    location: lot.location.clone(),
                    address: lot.address.clone(),
                    available_slots: lot.available_slots,
                    total_slots: lot.total_slots,
                    congestion: lot.congestion(),
                    congestion_label: lot.congestion().label(),
                    distance_from_campus: format_distance(haversine_distance(
                        CAMPUS_CENTER_LAT,
                        CAMPUS_CENTER_LON,
                        lot.latitude,
                        lot.longitude,
                    )),
                    is_favorite: model.is_favorite(lot.parking_lot_id),
                }),
                search: SearchView {
                    query: model.search_query.clone(),
                    is_focused: model.is_search_focused,
                    history: model.search_history.entries().to_vec(),
                },
                bottom_sheet_index: model.bottom_sheet_index,
                is_loading_lots: model.is_loading_lots,
                parked_location: model.parked_location.clone(),
                error: model.last_error.as_ref().map(|e| ErrorView {
                    code: e.code.as_str(),
                    message: e.message.clone(),
                }),
            }
        }
    }

    impl App {
        const fn startup_keys() -> [StorageKey; 6] {
            [
                StorageKey::AccessToken,
                StorageKey::RefreshToken,
                StorageKey::UserProfile,
                StorageKey::SearchHistory,
                StorageKey::ParkedLocation,
                StorageKey::AppSettings,
            ]
        }

        /// Lowers a descriptor to the wire and sends it. The bearer comes
        /// from the in-memory session: the refresh token for the renewal
        /// call, the access token for everything else.
        fn dispatch(request: ApiRequest, model: &mut Model, caps: &Capabilities) {
            let bearer = match request.kind {
                RequestKind::TokenRefresh => model.session.refresh_token(),
                _ => model.session.access_token(),
            };
            match request.to_http(&model.config.base_url, bearer, model.config.timeout_ms) {
                Ok(http) => {
                    caps.http.send(http, move |result| Event::ApiResponse {
                        request: Box::new(request.clone()),
                        result: Box::new(result),
                    });
                }
                Err(error) => {
                    // A renewal call that cannot even be constructed must
                    // tear the refresh down, or its waiters hang forever.
                    if matches!(request.kind, RequestKind::TokenRefresh) {
                        Self::abort_refresh(error, model, caps);
                    } else {
                        Self::fail(&request.kind, error, model);
                    }
                }
            }
        }

        fn try_dispatch(
            request: Result<ApiRequest, ApiError>,
            model: &mut Model,
            caps: &Capabilities,
        ) {
            match request {
                Ok(request) => Self::dispatch(request, model, caps),
                Err(error) => {
                    if model.auth_state == AuthState::Authenticating {
                        model.auth_state = AuthState::Unauthenticated;
                    }
                    model.record_error(error);
                }
            }
        }

        /// Response-phase interceptor. A fresh 401 (not the renewal call, not
        /// yet retried) joins the refresh queue; everything else is routed by
        /// request kind.
        fn handle_api_response(
            request: ApiRequest,
            result: HttpResult,
            model: &mut Model,
            caps: &Capabilities,
        ) {
            if matches!(request.kind, RequestKind::TokenRefresh) {
                Self::finish_refresh(result, model, caps);
                return;
            }

            match result {
                Ok(response) if response.status == 401 && !request.retried => {
                    let mut retry = request;
                    retry.retried = true;
                    if model.session.refresh_token().is_none() {
                        Self::fail(&retry.kind, ApiError::unauthorized(), model);
                        return;
                    }
                    match &mut model.refresh {
                        RefreshState::InFlight { queued } => queued.push(retry),
                        RefreshState::Idle => {
                            tracing::debug!("access token rejected; starting refresh");
                            model.refresh = RefreshState::InFlight {
                                queued: vec![retry],
                            };
                            Self::dispatch(auth::refresh(), model, caps);
                        }
                    }
                }
                Ok(response) if response.is_success() => {
                    Self::succeed(request.kind, &response.body, model, caps);
                }
                Ok(response) => Self::fail(
                    &request.kind,
                    api::classify_status(response.status, &response.body),
                    model,
                ),
                Err(error) => {
                    Self::fail(&request.kind, api::classify_transport(&error), model);
                }
            }
        }

        /// Resolves the single in-flight refresh: on success the new pair is
        /// installed and persisted and every waiter is redispatched exactly
        /// once; on failure the session ends and every waiter fails with the
        /// refresh error.
        fn finish_refresh(result: HttpResult, model: &mut Model, caps: &Capabilities) {
            let outcome: Result<TokenPair, ApiError> = match result {
                Ok(response) if response.is_success() => auth::decode_token_pair(&response.body),
                Ok(response) => Err(api::classify_status(response.status, &response.body)),
                Err(error) => Err(api::classify_transport(&error)),
            };

            match outcome {
                Ok(pair) => {
                    let queued = match std::mem::take(&mut model.refresh) {
                        RefreshState::InFlight { queued } => queued,
                        RefreshState::Idle => {
                            tracing::warn!("refresh response with no refresh in flight");
                            Vec::new()
                        }
                    };
                    model.session.install(&pair);
                    Self::persist_tokens(&pair, caps);
                    tracing::debug!(waiters = queued.len(), "refresh succeeded; replaying");
                    for request in queued {
                        Self::dispatch(request, model, caps);
                    }
                }
                Err(error) => Self::abort_refresh(error, model, caps),
            }
        }

        /// Tears down a renewal that will never succeed, whether it failed on
        /// the wire or could not be dispatched at all: the session ends and
        /// every queued waiter fails with the refresh error.
        fn abort_refresh(error: ApiError, model: &mut Model, caps: &Capabilities) {
            let queued = match std::mem::take(&mut model.refresh) {
                RefreshState::InFlight { queued } => queued,
                RefreshState::Idle => Vec::new(),
            };
            tracing::warn!(code = error.code.as_str(), "refresh failed; ending session");
            model.clear_session_state();
            Self::remove_keys(
                [StorageKey::session_keys().as_slice(), &[StorageKey::SearchHistory]]
                    .concat(),
                caps,
            );
            for request in queued {
                Self::fail(&request.kind, error.clone(), model);
            }
        }

        fn succeed(kind: RequestKind, body: &[u8], model: &mut Model, caps: &Capabilities) {
            match kind {
                RequestKind::Login | RequestKind::GoogleLogin => {
                    match auth::decode_token_pair(body) {
                        Ok(pair) => {
                            model.session.install(&pair);
                            model.auth_state = AuthState::Ready;
                            model.last_error = None;
                            Self::persist_tokens(&pair, caps);
                            Self::dispatch(auth::fetch_profile(), model, caps);
                            Self::fetch_account_data(model, caps);
                        }
                        Err(error) => {
                            model.auth_state = AuthState::Unauthenticated;
                            model.record_error(error);
                        }
                    }
                }
                RequestKind::Register => {
                    // Registration does not sign the user in.
                    model.auth_state = AuthState::Unauthenticated;
                    model.last_error = None;
                }
                RequestKind::Logout | RequestKind::DeleteAccount => {
                    tracing::debug!(kind = kind.name(), "server acknowledged; local state already cleared");
                }
                RequestKind::FetchProfile | RequestKind::UpdateProfile => {
                    match auth::decode_profile(body) {
                        Ok(profile) => {
                            Self::persist_json(StorageKey::UserProfile, &profile, caps);
                            model.user = Some(profile);
                        }
                        Err(error) => model.record_error(error),
                    }
                }
                RequestKind::FetchLots => {
                    model.is_loading_lots = false;
                    match parking::decode_lots(body) {
                        Ok(lots) => model.lots = lots,
                        Err(error) => model.record_error(error),
                    }
                }
                RequestKind::SearchLots { generation } => {
                    if generation != model.search_generation {
                        tracing::debug!(generation, "dropping stale search response");
                        return;
                    }
                    match parking::decode_lots(body) {
                        Ok(lots) => model.search_results = lots,
                        Err(error) => model.record_error(error),
                    }
                }
                RequestKind::FetchFavorites => match parking::decode_favorites(body) {
                    Ok(favorites) => model.favorites = favorites,
                    Err(error) => model.record_error(error),
                },
                RequestKind::AddFavorite { .. } => match parking::decode_favorite(body) {
                    Ok(favorite) => {
                        model
                            .favorites
                            .retain(|f| f.parking_lot_id != favorite.parking_lot_id);
                        model.favorites.push(favorite);
                    }
                    Err(error) => model.record_error(error),
                },
                RequestKind::RemoveFavorite { favorite_id } => {
                    model
                        .favorites
                        .retain(|f| f.favorite_parking_lot_id != favorite_id);
                }
                RequestKind::FetchSettings | RequestKind::UpdateSettings { .. } => {
                    match parking::decode_settings(body) {
                        Ok(settings) => {
                            Self::persist_json(StorageKey::AppSettings, &settings, caps);
                            model.settings = Some(settings);
                        }
                        Err(error) => model.record_error(error),
                    }
                }
                RequestKind::SaveParkedLocation => match parking::decode_parked_location(body) {
                    Ok(parked) => {
                        Self::persist_json(StorageKey::ParkedLocation, &parked, caps);
                        model.parked_location = Some(parked);
                    }
                    Err(error) => model.record_error(error),
                },
                RequestKind::TokenRefresh => {
                    tracing::warn!("renewal response routed as a plain success");
                }
            }
        }

        fn fail(kind: &RequestKind, error: ApiError, model: &mut Model) {
            match kind {
                RequestKind::Login | RequestKind::GoogleLogin | RequestKind::Register => {
                    model.auth_state = AuthState::Unauthenticated;
                    model.record_error(error);
                }
                RequestKind::Logout | RequestKind::DeleteAccount => {
                    // Local logout already happened; the server outcome is
                    // informational only.
                    tracing::warn!(code = error.code.as_str(), "server-side logout failed");
                }
                RequestKind::FetchLots => {
                    model.is_loading_lots = false;
                    model.record_error(error);
                }
                _ => model.record_error(error),
            }
        }

        fn restore_storage(
            result: crate::capabilities::KvResult,
            model: &mut Model,
            caps: &Capabilities,
        ) {
            match result {
                Ok(KvOutput::Values(values)) => {
                    let value = |i: usize| values.get(i).cloned().flatten();

                    // Index order matches `startup_keys`.
                    model.session = crate::model::Session::with_tokens(value(0), value(1));
                    if let Some(history) = value(3) {
                        model.search_history.restore(&history);
                    }

                    if model.session.is_authenticated() {
                        // User-scoped values are only trusted alongside a
                        // token pair; leftovers from a previous session are
                        // ignored.
                        model.user = value(2)
                            .and_then(|json| serde_json::from_str::<UserProfile>(&json).ok());
                        model.parked_location = value(4)
                            .and_then(|json| serde_json::from_str::<ParkedLocation>(&json).ok());
                        model.settings = value(5).and_then(|json| {
                            serde_json::from_str::<crate::model::UserSettings>(&json).ok()
                        });

                        model.auth_state = AuthState::Ready;
                        model.is_loading_lots = true;
                        Self::dispatch(parking::fetch_lots(), model, caps);
                        Self::fetch_account_data(model, caps);
                    } else {
                        model.auth_state = AuthState::Unauthenticated;
                    }
                }
                Ok(output) => {
                    tracing::warn!(?output, "unexpected storage shape; starting clean");
                    model.auth_state = AuthState::Unauthenticated;
                }
                Err(error) => {
                    // Startup restore never fails outward.
                    tracing::warn!(%error, "storage unavailable; starting clean");
                    model.auth_state = AuthState::Unauthenticated;
                }
            }
        }

        fn fetch_account_data(model: &mut Model, caps: &Capabilities) {
            Self::dispatch(parking::fetch_favorites(), model, caps);
            Self::dispatch(parking::fetch_settings(), model, caps);
        }

        /// Ends the session without waiting on the server: every persisted
        /// key is removed, so nothing of this user survives into the next
        /// startup.
        fn end_session_locally(model: &mut Model, caps: &Capabilities) {
            model.clear_session_state();
            model.selected_lot = None;
            Self::remove_keys(Self::startup_keys().to_vec(), caps);
        }

        fn select_lot(parking_lot_id: u64, model: &mut Model) {
            if let Some(lot) = model.lot_by_id(parking_lot_id).cloned() {
                model.selected_lot = Some(lot);
                // Selecting a lot always reveals its detail panel.
                model.bottom_sheet_index = SHEET_MID;
            } else {
                tracing::warn!(parking_lot_id, "selection of unknown lot ignored");
            }
        }

        fn record_search(
            query: &str,
            parking_lot_id: Option<u64>,
            model: &mut Model,
            caps: &Capabilities,
        ) {
            if model
                .search_history
                .add(query, parking_lot_id, super::current_time_ms())
            {
                if let Some(json) = model.search_history.to_json() {
                    caps.kv.set(StorageKey::SearchHistory, json, |result| {
                        Event::PersistCompleted {
                            keys: vec![StorageKey::SearchHistory],
                            result: Box::new(result),
                        }
                    });
                }
            }
        }

        fn persist_tokens(pair: &TokenPair, caps: &Capabilities) {
            caps.kv.set_multi(
                vec![
                    (StorageKey::AccessToken, pair.access_token.clone()),
                    (StorageKey::RefreshToken, pair.refresh_token.clone()),
                ],
                |result| Event::PersistCompleted {
                    keys: vec![StorageKey::AccessToken, StorageKey::RefreshToken],
                    result: Box::new(result),
                },
            );
        }

        fn persist_json<T: serde::Serialize>(key: StorageKey, value: &T, caps: &Capabilities) {
            match serde_json::to_string(value) {
                Ok(json) => caps.kv.set(key, json, move |result| Event::PersistCompleted {
                    keys: vec![key],
                    result: Box::new(result),
                }),
                Err(error) => {
                    tracing::error!(%key, %error, "could not encode value for persistence");
                }
            }
        }

        fn remove_keys(keys: Vec<StorageKey>, caps: &Capabilities) {
            let echo = keys.clone();
            caps.kv.remove_multi(keys, move |result| Event::PersistCompleted {
                keys: echo.clone(),
                result: Box::new(result),
            });
        }
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    mod congestion_tests {
        use super::*;

        #[test]
        fn boundary_at_90_percent_is_full() {
            // 100 slots, 10 free: exactly 90% occupied.
            assert_eq!(congestion_level(10, 100), CongestionLevel::Full);
            assert_eq!(congestion_level(11, 100), CongestionLevel::Busy);
        }

        #[test]
        fn boundary_at_70_percent_is_busy() {
            assert_eq!(congestion_level(30, 100), CongestionLevel::Busy);
            assert_eq!(congestion_level(31, 100), CongestionLevel::Normal);
        }

        #[test]
        fn boundary_at_40_percent_is_normal() {
            assert_eq!(congestion_level(60, 100), CongestionLevel::Normal);
            assert_eq!(congestion_level(61, 100), CongestionLevel::Available);
        }

        #[test]
        fn zero_capacity_counts_as_full() {
            assert_eq!(congestion_level(0, 0), CongestionLevel::Full);
        }

        #[test]
        fn small_lots_hit_the_same_boundaries() {
            assert_eq!(congestion_level(1, 10), CongestionLevel::Full); // 90%
            assert_eq!(congestion_level(3, 10), CongestionLevel::Busy); // 70%
            assert_eq!(congestion_level(6, 10), CongestionLevel::Normal); // 40%
            assert_eq!(congestion_level(7, 10), CongestionLevel::Available); // 30%
        }

        #[test]
        fn overreported_availability_saturates() {
            // available > total should not underflow.
            assert_eq!(congestion_level(15, 10), CongestionLevel::Available);
        }
    }

    mod distance_tests {
        use super::*;

        #[test]
        fn zero_distance_for_identical_points() {
            let d = haversine_distance(37.3211, 127.1267, 37.3211, 127.1267);
            assert!(d.abs() < 1e-6);
        }

        #[test]
        fn known_distance_is_roughly_right() {
            // One degree of latitude is about 111 km.
            let d = haversine_distance(37.0, 127.0, 38.0, 127.0);
            assert!((d - 111_000.0).abs() < 500.0, "got {d}");
        }

        #[test]
        fn format_switches_units_at_a_kilometer() {
            assert_eq!(format_distance(850.0), "850 m");
            assert_eq!(format_distance(999.4), "999 m");
            assert_eq!(format_distance(1_200.0), "1.2 km");
        }
    }

    mod filter_tests {
        use super::*;
        use crate::model::ParkingLot;

        fn lot(available: u32, total: u32) -> ParkingLot {
            ParkingLot {
                parking_lot_id: 1,
                name: "Lot".into(),
                location: None,
                address: None,
                latitude: 0.0,
                longitude: 0.0,
                total_slots: total,
                available_slots: available,
            }
        }

        #[test]
        fn all_matches_everything() {
            assert!(Filter::All.matches(&lot(0, 0), false));
            assert!(Filter::All.matches(&lot(10, 10), true));
        }

        #[test]
        fn favorites_depend_only_on_flag() {
            assert!(Filter::Favorites.matches(&lot(5, 10), true));
            assert!(!Filter::Favorites.matches(&lot(5, 10), false));
        }

        #[test]
        fn congestion_buckets_are_exclusive() {
            let busy = lot(3, 10);
            assert!(Filter::Busy.matches(&busy, false));
            assert!(!Filter::Full.matches(&busy, false));
            assert!(!Filter::Normal.matches(&busy, false));
        }
    }
}

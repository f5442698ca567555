//! Application events: user intents plus capability callbacks.

use crate::api::ApiRequest;
use crate::capabilities::{HttpResult, KvResult, StorageKey};
use crate::model::{GoogleLoginPayload, LoginPayload, RegisterPayload, UserSettings};
use crate::Filter;

#[derive(Debug, Clone)]
pub enum Event {
    // Lifecycle
    AppStarted,
    /// Result of the startup multi-get over every persisted key.
    StorageRestored(Box<KvResult>),

    // Auth
    LoginSubmitted(LoginPayload),
    GoogleLoginSubmitted(GoogleLoginPayload),
    RegisterSubmitted(RegisterPayload),
    LogoutRequested,
    DeleteAccountRequested,

    // Data
    LotsRefreshRequested,
    FavoritesRefreshRequested,
    FavoriteAdded { parking_lot_id: u64 },
    FavoriteRemoved { favorite_id: u64 },
    SettingsRefreshRequested,
    SettingsUpdateRequested(Box<UserSettings>),
    ParkedLocationSaved { parking_lot_name: String, location: String },
    ParkedLocationCleared,

    // Search & selection
    SearchQueryChanged { text: String },
    SearchDebounceElapsed { generation: u64 },
    SearchSubmitted { query: String },
    LotSelected { parking_lot_id: u64 },
    LotDeselected,
    /// Composite: select the lot, expand the detail sheet, unfocus search
    /// and record the query in history, atomically.
    LotChosenFromSearch { parking_lot_id: u64 },
    FilterSelected(Filter),
    FiltersReset,
    SheetSnapped { index: u8 },
    SearchFocusChanged { focused: bool },
    SearchHistoryCleared,
    ErrorDismissed,

    // Capability callbacks
    ApiResponse {
        request: Box<ApiRequest>,
        result: Box<HttpResult>,
    },
    PersistCompleted {
        keys: Vec<StorageKey>,
        result: Box<KvResult>,
    },
}

impl Event {
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::AppStarted => "app_started",
            Self::StorageRestored(_) => "storage_restored",
            Self::LoginSubmitted(_) => "login_submitted",
            Self::GoogleLoginSubmitted(_) => "google_login_submitted",
            Self::RegisterSubmitted(_) => "register_submitted",
            Self::LogoutRequested => "logout_requested",
            Self::DeleteAccountRequested => "delete_account_requested",
            Self::LotsRefreshRequested => "lots_refresh_requested",
            Self::FavoritesRefreshRequested => "favorites_refresh_requested",
            Self::FavoriteAdded { .. } => "favorite_added",
            Self::FavoriteRemoved { .. } => "favorite_removed",
            Self::SettingsRefreshRequested => "settings_refresh_requested",
            Self::SettingsUpdateRequested(_) => "settings_update_requested",
            Self::ParkedLocationSaved { .. } => "parked_location_saved",
            Self::ParkedLocationCleared => "parked_location_cleared",
            Self::SearchQueryChanged { .. } => "search_query_changed",
            Self::SearchDebounceElapsed { .. } => "search_debounce_elapsed",
            Self::SearchSubmitted { .. } => "search_submitted",
            Self::LotSelected { .. } => "lot_selected",
            Self::LotDeselected => "lot_deselected",
            Self::LotChosenFromSearch { .. } => "lot_chosen_from_search",
            Self::FilterSelected(_) => "filter_selected",
            Self::FiltersReset => "filters_reset",
            Self::SheetSnapped { .. } => "sheet_snapped",
            Self::SearchFocusChanged { .. } => "search_focus_changed",
            Self::SearchHistoryCleared => "search_history_cleared",
            Self::ErrorDismissed => "error_dismissed",
            Self::ApiResponse { .. } => "api_response",
            Self::PersistCompleted { .. } => "persist_completed",
        }
    }

    /// Whether the event originates from a user gesture rather than a
    /// capability callback or lifecycle hook.
    #[must_use]
    pub const fn is_user_initiated(&self) -> bool {
        !matches!(
            self,
            Self::AppStarted
                | Self::StorageRestored(_)
                | Self::SearchDebounceElapsed { .. }
                | Self::ApiResponse { .. }
                | Self::PersistCompleted { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn callback_events_are_not_user_initiated() {
        assert!(!Event::AppStarted.is_user_initiated());
        assert!(!Event::SearchDebounceElapsed { generation: 1 }.is_user_initiated());
        assert!(Event::LogoutRequested.is_user_initiated());
        assert!(Event::SearchSubmitted { query: "gym".into() }.is_user_initiated());
    }

    #[test]
    fn names_are_stable_identifiers() {
        assert_eq!(Event::AppStarted.name(), "app_started");
        assert_eq!(Event::SearchHistoryCleared.name(), "search_history_cleared");
    }
}

//! Parking lot, favorite, settings and parked-location endpoints.

use serde::Serialize;

use crate::api::{ApiError, ApiRequest, Envelope, RequestKind};
use crate::model::{FavoriteLot, ParkedLocation, ParkingLot, UserSettings};

#[must_use]
pub fn fetch_lots() -> ApiRequest {
    ApiRequest::get(RequestKind::FetchLots, "/parking-lots")
}

/// Text search. The generation tag lets the caller drop responses that were
/// superseded by a newer query before they arrived.
#[must_use]
pub fn search_lots(query: &str, generation: u64) -> ApiRequest {
    let encoded: String = url::form_urlencoded::byte_serialize(query.as_bytes()).collect();
    ApiRequest::get(
        RequestKind::SearchLots { generation },
        format!("/parking-lots/search?q={encoded}"),
    )
}

#[must_use]
pub fn fetch_favorites() -> ApiRequest {
    ApiRequest::get(RequestKind::FetchFavorites, "/favorite-parking-lots")
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AddFavoriteBody {
    parking_lot_id: u64,
}

pub fn add_favorite(parking_lot_id: u64) -> Result<ApiRequest, ApiError> {
    ApiRequest::post(
        RequestKind::AddFavorite { parking_lot_id },
        "/favorite-parking-lots",
        &AddFavoriteBody { parking_lot_id },
    )
}

#[must_use]
pub fn remove_favorite(favorite_id: u64) -> ApiRequest {
    ApiRequest::delete(
        RequestKind::RemoveFavorite { favorite_id },
        format!("/favorite-parking-lots/{favorite_id}"),
    )
}

#[must_use]
pub fn fetch_settings() -> ApiRequest {
    ApiRequest::get(RequestKind::FetchSettings, "/settings")
}

pub fn update_settings(settings: &UserSettings) -> Result<ApiRequest, ApiError> {
    ApiRequest::put(
        RequestKind::UpdateSettings {
            settings: Box::new(settings.clone()),
        },
        format!("/settings/{}", settings.setting_id),
        settings,
    )
}

pub fn save_parked_location(location: &ParkedLocation) -> Result<ApiRequest, ApiError> {
    ApiRequest::post(RequestKind::SaveParkedLocation, "/me/parking", location)
}

pub fn decode_lots(body: &[u8]) -> Result<Vec<ParkingLot>, ApiError> {
    Envelope::decode(body)
}

pub fn decode_favorites(body: &[u8]) -> Result<Vec<FavoriteLot>, ApiError> {
    Envelope::decode(body)
}

pub fn decode_favorite(body: &[u8]) -> Result<FavoriteLot, ApiError> {
    Envelope::decode(body)
}

pub fn decode_settings(body: &[u8]) -> Result<UserSettings, ApiError> {
    Envelope::decode(body)
}

pub fn decode_parked_location(body: &[u8]) -> Result<ParkedLocation, ApiError> {
    Envelope::decode(body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_query_is_url_encoded() {
        let request = search_lots("공학관 lot & more", 7);
        assert_eq!(
            request.kind,
            RequestKind::SearchLots { generation: 7 }
        );
        assert!(request.path.starts_with("/parking-lots/search?q="));
        assert!(!request.path.contains(' '));
        assert!(!request.path.contains('&'));
        assert!(request.path.ends_with("%26+more"));
    }

    #[test]
    fn remove_favorite_puts_id_in_path() {
        let request = remove_favorite(42);
        assert_eq!(request.path, "/favorite-parking-lots/42");
    }

    #[test]
    fn lots_decode_from_envelope_array() {
        let body = br#"{
            "data": [{
                "parkingLotId": 1,
                "name": "Main Gate",
                "latitude": 37.3,
                "longitude": 127.1,
                "totalSlots": 50,
                "availableSlots": 12
            }],
            "error": null
        }"#;
        let lots = decode_lots(body).unwrap();
        assert_eq!(lots.len(), 1);
        assert_eq!(lots[0].name, "Main Gate");
    }

    #[test]
    fn envelope_error_is_raised_before_data() {
        let body = br#"{"data":[],"error":{"code":"SERVER_ERROR","message":"db down"}}"#;
        let error = decode_lots(body).unwrap_err();
        assert_eq!(error.message, "db down");
    }
}

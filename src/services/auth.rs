//! Account and session endpoints.

use crate::api::{ApiError, ApiRequest, Envelope, RequestKind, TOKEN_RENEWAL_PATH};
use crate::model::{GoogleLoginPayload, LoginPayload, RegisterPayload, TokenPair, UserProfile};

pub fn login(payload: &LoginPayload) -> Result<ApiRequest, ApiError> {
    ApiRequest::post(RequestKind::Login, "/auth/login", payload)
}

pub fn google_login(payload: &GoogleLoginPayload) -> Result<ApiRequest, ApiError> {
    ApiRequest::post(RequestKind::GoogleLogin, "/auth/google", payload)
}

pub fn register(payload: &RegisterPayload) -> Result<ApiRequest, ApiError> {
    ApiRequest::post(RequestKind::Register, "/users/register", payload)
}

#[must_use]
pub fn logout() -> ApiRequest {
    ApiRequest::post_empty(RequestKind::Logout, "/auth/logout")
}

/// The renewal call. Dispatched with the refresh token as bearer, never the
/// access token.
#[must_use]
pub fn refresh() -> ApiRequest {
    ApiRequest::post_empty(RequestKind::TokenRefresh, TOKEN_RENEWAL_PATH)
}

#[must_use]
pub fn fetch_profile() -> ApiRequest {
    ApiRequest::get(RequestKind::FetchProfile, "/users/info")
}

pub fn update_profile(profile: &UserProfile) -> Result<ApiRequest, ApiError> {
    ApiRequest::put(RequestKind::UpdateProfile, "/users/info", profile)
}

#[must_use]
pub fn delete_account() -> ApiRequest {
    ApiRequest::delete(RequestKind::DeleteAccount, "/users/info")
}

pub fn decode_token_pair(body: &[u8]) -> Result<TokenPair, ApiError> {
    Envelope::decode(body)
}

pub fn decode_profile(body: &[u8]) -> Result<UserProfile, ApiError> {
    Envelope::decode(body)
}

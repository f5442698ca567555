//! The API client: request descriptors, bearer attachment and failure
//! classification.
//!
//! Every outbound call is described by an [`ApiRequest`]. The descriptor
//! travels with the dispatched HTTP operation and comes back attached to the
//! response event, which is what lets the update loop route responses, mark a
//! request as retried after a 401, and redispatch it after a token refresh.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::capabilities::{HttpError, HttpMethod, HttpRequest};
use crate::model::UserSettings;

/// Renewal endpoint, authenticated by the refresh token rather than the
/// access token.
pub const TOKEN_RENEWAL_PATH: &str = "/auth/token";

/// The fixed failure taxonomy surfaced to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApiErrorCode {
    ValidationError,
    Unauthorized,
    Forbidden,
    NotFound,
    ServerError,
    NetworkError,
    UnknownError,
}

impl ApiErrorCode {
    #[must_use]
    pub const fn from_status(status: u16) -> Self {
        match status {
            400 => Self::ValidationError,
            401 => Self::Unauthorized,
            403 => Self::Forbidden,
            404 => Self::NotFound,
            500 => Self::ServerError,
            _ => Self::UnknownError,
        }
    }

    /// Maps a server-supplied code string onto the taxonomy. Unknown strings
    /// collapse to `UnknownError`; the message still passes through verbatim.
    #[must_use]
    pub fn from_code_str(code: &str) -> Self {
        match code {
            "VALIDATION_ERROR" => Self::ValidationError,
            "UNAUTHORIZED" => Self::Unauthorized,
            "FORBIDDEN" => Self::Forbidden,
            "NOT_FOUND" => Self::NotFound,
            "SERVER_ERROR" => Self::ServerError,
            "NETWORK_ERROR" => Self::NetworkError,
            _ => Self::UnknownError,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ValidationError => "VALIDATION_ERROR",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::Forbidden => "FORBIDDEN",
            Self::NotFound => "NOT_FOUND",
            Self::ServerError => "SERVER_ERROR",
            Self::NetworkError => "NETWORK_ERROR",
            Self::UnknownError => "UNKNOWN_ERROR",
        }
    }

    #[must_use]
    pub const fn default_message(self) -> &'static str {
        match self {
            Self::ValidationError => "The request was invalid.",
            Self::Unauthorized => "Sign-in required.",
            Self::Forbidden => "You do not have access to this resource.",
            Self::NotFound => "The requested resource was not found.",
            Self::ServerError => "The server hit an internal error.",
            Self::NetworkError => "Could not reach the server. Check your connection.",
            Self::UnknownError => "Something went wrong.",
        }
    }
}

impl std::fmt::Display for ApiErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("[{code}] {message}")]
pub struct ApiError {
    pub code: ApiErrorCode,
    pub message: String,
}

impl ApiError {
    #[must_use]
    pub fn new(code: ApiErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn from_code(code: ApiErrorCode) -> Self {
        Self::new(code, code.default_message())
    }

    #[must_use]
    pub fn unauthorized() -> Self {
        Self::from_code(ApiErrorCode::Unauthorized)
    }
}

/// Classifies a transport-level failure (no response received).
#[must_use]
pub fn classify_transport(error: &HttpError) -> ApiError {
    match error {
        HttpError::Timeout { .. } | HttpError::Network { .. } => {
            ApiError::from_code(ApiErrorCode::NetworkError)
        }
        _ => ApiError::from_code(ApiErrorCode::UnknownError),
    }
}

/// Classifies a non-2xx HTTP status. A structured error message in the body
/// envelope takes precedence over the generic message for the code.
#[must_use]
pub fn classify_status(status: u16, body: &[u8]) -> ApiError {
    let code = ApiErrorCode::from_status(status);
    if let Ok(envelope) = serde_json::from_slice::<Envelope<serde_json::Value>>(body) {
        if let Some(server_error) = envelope.error {
            return ApiError::new(code, server_error.message);
        }
    }
    ApiError::from_code(code)
}

/// The `{data, error}` wrapper every endpoint responds with.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<T> {
    #[serde(default = "Option::default")]
    pub data: Option<T>,
    #[serde(default)]
    pub error: Option<EnvelopeError>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvelopeError {
    pub code: String,
    pub message: String,
}

impl<T: serde::de::DeserializeOwned> Envelope<T> {
    /// Decodes a 2xx body, raising the envelope error before touching the
    /// payload. A missing payload or a malformed body is a classified
    /// failure, never a panic.
    pub fn decode(body: &[u8]) -> Result<T, ApiError> {
        let envelope: Self = serde_json::from_slice(body).map_err(|e| {
            ApiError::new(
                ApiErrorCode::UnknownError,
                format!("malformed response body: {e}"),
            )
        })?;
        if let Some(error) = envelope.error {
            return Err(ApiError::new(
                ApiErrorCode::from_code_str(&error.code),
                error.message,
            ));
        }
        envelope.data.ok_or_else(|| {
            ApiError::new(ApiErrorCode::UnknownError, "response carried no data")
        })
    }
}

/// Routing tag: which logical call a response belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestKind {
    Login,
    GoogleLogin,
    Register,
    Logout,
    DeleteAccount,
    FetchProfile,
    UpdateProfile,
    FetchLots,
    SearchLots { generation: u64 },
    FetchFavorites,
    AddFavorite { parking_lot_id: u64 },
    RemoveFavorite { favorite_id: u64 },
    FetchSettings,
    UpdateSettings { settings: Box<UserSettings> },
    SaveParkedLocation,
    TokenRefresh,
}

impl RequestKind {
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Login => "login",
            Self::GoogleLogin => "google_login",
            Self::Register => "register",
            Self::Logout => "logout",
            Self::DeleteAccount => "delete_account",
            Self::FetchProfile => "fetch_profile",
            Self::UpdateProfile => "update_profile",
            Self::FetchLots => "fetch_lots",
            Self::SearchLots { .. } => "search_lots",
            Self::FetchFavorites => "fetch_favorites",
            Self::AddFavorite { .. } => "add_favorite",
            Self::RemoveFavorite { .. } => "remove_favorite",
            Self::FetchSettings => "fetch_settings",
            Self::UpdateSettings { .. } => "update_settings",
            Self::SaveParkedLocation => "save_parked_location",
            Self::TokenRefresh => "token_refresh",
        }
    }
}

/// A pending request descriptor. `retried` is the one-shot marker that keeps
/// a 401 from triggering more than one refresh-and-retry cycle per request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiRequest {
    pub id: String,
    pub kind: RequestKind,
    pub method: HttpMethod,
    pub path: String,
    pub body: Option<Vec<u8>>,
    pub retried: bool,
}

impl ApiRequest {
    #[must_use]
    pub fn get(kind: RequestKind, path: impl Into<String>) -> Self {
        Self::bare(kind, HttpMethod::Get, path)
    }

    #[must_use]
    pub fn delete(kind: RequestKind, path: impl Into<String>) -> Self {
        Self::bare(kind, HttpMethod::Delete, path)
    }

    pub fn post<T: Serialize>(
        kind: RequestKind,
        path: impl Into<String>,
        body: &T,
    ) -> Result<Self, ApiError> {
        Self::with_body(kind, HttpMethod::Post, path, body)
    }

    /// POST with no body (logout, token renewal).
    #[must_use]
    pub fn post_empty(kind: RequestKind, path: impl Into<String>) -> Self {
        Self::bare(kind, HttpMethod::Post, path)
    }

    pub fn put<T: Serialize>(
        kind: RequestKind,
        path: impl Into<String>,
        body: &T,
    ) -> Result<Self, ApiError> {
        Self::with_body(kind, HttpMethod::Put, path, body)
    }

    fn bare(kind: RequestKind, method: HttpMethod, path: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind,
            method,
            path: path.into(),
            body: None,
            retried: false,
        }
    }

    fn with_body<T: Serialize>(
        kind: RequestKind,
        method: HttpMethod,
        path: impl Into<String>,
        body: &T,
    ) -> Result<Self, ApiError> {
        let body = serde_json::to_vec(body).map_err(|e| {
            ApiError::new(
                ApiErrorCode::UnknownError,
                format!("could not encode request body: {e}"),
            )
        })?;
        let mut request = Self::bare(kind, method, path);
        request.body = Some(body);
        Ok(request)
    }

    /// Lowers the descriptor to a wire request: joins the base URL, attaches
    /// the bearer credential if one is present, applies the configured
    /// timeout. Construction failures are classified, per the taxonomy.
    pub fn to_http(
        &self,
        base_url: &Url,
        bearer: Option<&str>,
        timeout_ms: u64,
    ) -> Result<HttpRequest, ApiError> {
        let url = base_url.join(&self.path).map_err(|e| {
            ApiError::new(
                ApiErrorCode::UnknownError,
                format!("could not build request URL: {e}"),
            )
        })?;

        let mut request = HttpRequest::new(self.method, url.as_str()).with_timeout_ms(timeout_ms);
        if let Some(token) = bearer {
            request = request
                .with_header("authorization", &format!("Bearer {token}"))
                .map_err(construction_error)?;
        }
        if let Some(body) = &self.body {
            request = request.with_json_body(body.clone()).map_err(construction_error)?;
        }
        Ok(request)
    }
}

fn construction_error(error: HttpError) -> ApiError {
    ApiError::new(
        ApiErrorCode::UnknownError,
        format!("could not build request: {error}"),
    )
}

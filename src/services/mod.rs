//! Typed request builders and response decoders, one module per backend
//! surface. Builders produce [`crate::api::ApiRequest`] descriptors; decoders
//! check the response envelope before touching the payload.

pub mod auth;
pub mod parking;

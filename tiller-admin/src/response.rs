//! Flat response envelope of the Registry API.
//!
//! Success is `200` with a JSON document (or `null` for writes). Every
//! registry failure is `500` with `{"error": "<message>"}`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Serialize;
use serde_json::Value;
use tiller_core::TillerError;
use tracing::error;

pub type ApiResult = Result<Json<Value>, ApiError>;

#[derive(Debug)]
pub struct ApiError(pub TillerError);

impl From<TillerError> for ApiError {
    fn from(e: TillerError) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        error!(error = %self.0, "Registry request failed");
        (StatusCode::INTERNAL_SERVER_ERROR, Json(self.0.to_json_body())).into_response()
    }
}

pub fn ok<T: Serialize>(value: &T) -> ApiResult {
    let value = serde_json::to_value(value).map_err(TillerError::from)?;
    Ok(Json(value))
}

pub fn null() -> ApiResult {
    Ok(Json(Value::Null))
}

use axum::extract::{rejection::JsonRejection, FromRequest, Request};
use axum::response::{IntoResponse, Response};
use tracing::warn;

use crate::error::AppError;

/// [`axum::Json`] whose rejection is an [`AppError`], so malformed bodies get
/// the same `{error}` response as every other client error.
pub struct Json<T>(pub T);

impl<T> IntoResponse for Json<T>
where
    T: serde::Serialize,
{
    fn into_response(self) -> Response {
        axum::Json(self.0).into_response()
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        match rejection {
            JsonRejection::JsonDataError(e) => AppError::bad_request(e.body_text()),
            JsonRejection::JsonSyntaxError(e) => AppError::bad_request(e.body_text()),
            JsonRejection::MissingJsonContentType(_) => {
                AppError::bad_request("Expected request with Content-Type: application/json")
            }
            JsonRejection::BytesRejection(e) => AppError::bad_request(e.body_text()),
            other => {
                warn!(rejection = ?other, "unhandled json rejection");
                AppError::bad_request("Invalid request body")
            }
        }
    }
}

#[axum::async_trait]
impl<T, S> FromRequest<S> for Json<T>
where
    T: serde::de::DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let axum::Json(value) = axum::Json::<T>::from_request(req, state).await?;
        Ok(Json(value))
    }
}

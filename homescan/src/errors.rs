use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        FromRequest, FromRequestParts, Query, Request,
    },
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use homescan_core::CatalogError;
use serde::de::DeserializeOwned;
use serde_json::json;
use std::fmt;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub kind: &'static str,
    pub message: String,
}

impl AppError {
    pub fn new(status: StatusCode, kind: &'static str, message: impl Into<String>) -> Self {
        Self { status, kind, message: message.into() }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "unauthorized", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "not_found", message)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": {
                "message": self.message,
                "status": self.status.as_u16(),
                "kind": self.kind,
            }
        }));

        (self.status, body).into_response()
    }
}

impl From<CatalogError> for AppError {
    fn from(err: CatalogError) -> Self {
        let status = match &err {
            CatalogError::NotFound { .. } => StatusCode::NOT_FOUND,
            CatalogError::Conflict(_) | CatalogError::ScanInProgress(_) => StatusCode::CONFLICT,
            CatalogError::InvalidOrdering(_) | CatalogError::Validation(_) => StatusCode::BAD_REQUEST,
            CatalogError::DetectorUnavailable(_) => StatusCode::BAD_GATEWAY,
            CatalogError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            CatalogError::Storage(_) => {
                tracing::error!(error = ?err, "storage operation failed");
                return Self::new(StatusCode::INTERNAL_SERVER_ERROR, err.kind(), "storage operation failed");
            }
        };
        Self::new(status, err.kind(), err.to_string())
    }
}

impl From<JsonRejection> for AppError {
    fn from(rej: JsonRejection) -> Self {
        let kind = if rej.status() == StatusCode::UNPROCESSABLE_ENTITY { "invalid_body" } else { "bad_request" };
        Self::new(rej.status(), kind, rej.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rej: QueryRejection) -> Self {
        Self::new(rej.status(), "invalid_query", rej.body_text())
    }
}

/// `Query` whose rejections use the API error body.
pub struct ApiQuery<T>(pub T);

impl<S, T> FromRequestParts<S> for ApiQuery<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request_parts(parts, state).await?;
        Ok(ApiQuery(value))
    }
}

/// `Json` whose rejections use the API error body.
pub struct ApiJson<T>(pub T);

impl<S, T> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        Ok(ApiJson(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn catalog_errors_map_to_statuses() {
        let cases = [
            (CatalogError::not_found("service", 3), StatusCode::NOT_FOUND),
            (CatalogError::Conflict("dup".into()), StatusCode::CONFLICT),
            (CatalogError::ScanInProgress(1), StatusCode::CONFLICT),
            (CatalogError::InvalidOrdering("x".into()), StatusCode::BAD_REQUEST),
            (CatalogError::Validation("x".into()), StatusCode::BAD_REQUEST),
            (CatalogError::DetectorUnavailable("x".into()), StatusCode::BAD_GATEWAY),
            (CatalogError::Timeout(Duration::from_secs(1)), StatusCode::GATEWAY_TIMEOUT),
        ];
        for (err, status) in cases {
            let kind = err.kind();
            let app = AppError::from(err);
            assert_eq!(app.status, status);
            assert_eq!(app.kind, kind);
        }
    }

    #[test]
    fn storage_details_are_not_leaked() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk path /var/secret");
        let app = AppError::from(CatalogError::Storage(Box::new(io)));
        assert_eq!(app.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!app.message.contains("secret"));
    }
}

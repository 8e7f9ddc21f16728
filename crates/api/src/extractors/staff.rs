//! Acting staff member extractor.

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::HeaderName, request::Parts},
};

use crate::error::ApiError;

/// The header carrying the acting staff member's id.
pub const STAFF_ID_HEADER: &str = "x-staff-id";

/// Staff member on whose behalf a workflow command runs.
///
/// Authentication happens upstream; this only reads the id the gateway
/// forwards in `X-Staff-Id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaffId(pub i64);

fn parse_staff_id(raw: Option<&str>) -> Result<i64, ApiError> {
    let raw = raw
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ApiError::BadRequest("Missing X-Staff-Id header".to_string()))?;

    match raw.parse::<i64>() {
        Ok(id) if id > 0 => Ok(id),
        _ => Err(ApiError::BadRequest(format!(
            "Invalid X-Staff-Id header '{}'",
            raw
        ))),
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for StaffId
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header_name = HeaderName::from_static(STAFF_ID_HEADER);
        let raw = parts
            .headers
            .get(&header_name)
            .and_then(|value| value.to_str().ok());
        parse_staff_id(raw).map(StaffId)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    async fn extract(header: Option<&str>) -> Result<StaffId, ApiError> {
        let mut builder = Request::builder().uri("/");
        if let Some(value) = header {
            builder = builder.header(STAFF_ID_HEADER, value);
        }
        let (mut parts, _) = builder.body(()).unwrap().into_parts();
        StaffId::from_request_parts(&mut parts, &()).await
    }

    #[tokio::test]
    async fn test_valid_header() {
        assert_eq!(extract(Some(" 42 ")).await.unwrap(), StaffId(42));
    }

    #[tokio::test]
    async fn test_missing_header() {
        assert!(matches!(extract(None).await, Err(ApiError::BadRequest(_))));
        assert!(matches!(extract(Some("")).await, Err(ApiError::BadRequest(_))));
    }

    #[tokio::test]
    async fn test_invalid_header() {
        assert!(matches!(extract(Some("abc")).await, Err(ApiError::BadRequest(_))));
        assert!(matches!(extract(Some("0")).await, Err(ApiError::BadRequest(_))));
    }
}

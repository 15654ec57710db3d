//! HTTP handlers for the Passive Edge API

use axum::{
    http::{header, HeaderMap},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use shared::{ListResponse, Pagination};

use crate::error::AppResult;
use crate::services::ReportingService;

pub mod admin;
pub mod auth;
pub mod dashboard;
pub mod formulas;
pub mod health;
pub mod materials;
pub mod orders;
pub mod stock_operations;
pub mod suppliers;
pub mod test_records;
pub mod users;

pub use admin::*;
pub use auth::*;
pub use dashboard::*;
pub use formulas::*;
pub use health::*;
pub use materials::*;
pub use orders::*;
pub use stock_operations::*;
pub use suppliers::*;
pub use test_records::*;
pub use users::*;

/// Success envelope: `{ "success": true, "data": …, "message"?: … }`
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data,
            message: None,
        })
    }

    pub fn with_message(data: T, message: impl Into<String>) -> Json<Self> {
        Json(Self {
            success: true,
            data,
            message: Some(message.into()),
        })
    }
}

pub type ApiResult<T> = AppResult<Json<ApiResponse<T>>>;

/// Whether a list endpoint was asked for CSV instead of JSON
pub(crate) fn wants_csv(format: Option<&str>) -> bool {
    format.is_some_and(|f| f.eq_ignore_ascii_case("csv"))
}

/// Render a list page as JSON, or as a CSV attachment when requested
pub(crate) fn list_or_csv<T: Serialize>(
    items: Vec<T>,
    total: i64,
    page: Pagination,
    format: Option<&str>,
    filename: &str,
) -> AppResult<Response> {
    if wants_csv(format) {
        let csv = ReportingService::export_to_csv(&items)?;
        let disposition = format!("attachment; filename=\"{}\"", filename);
        return Ok((
            [
                (header::CONTENT_TYPE, "text/csv".to_string()),
                (header::CONTENT_DISPOSITION, disposition),
            ],
            csv,
        )
            .into_response());
    }

    Ok(ApiResponse::ok(ListResponse::new(items, total, page)).into_response())
}

/// Read a trimmed, non-empty header value
pub(crate) fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_wants_csv() {
        assert!(wants_csv(Some("csv")));
        assert!(wants_csv(Some("CSV")));
        assert!(!wants_csv(Some("json")));
        assert!(!wants_csv(None));
    }

    #[test]
    fn test_header_value_trims_and_skips_blank() {
        let mut headers = HeaderMap::new();
        headers.insert("x-creator-code", HeaderValue::from_static(" J "));
        headers.insert("x-approved-by", HeaderValue::from_static("  "));
        assert_eq!(header_value(&headers, "x-creator-code"), Some("J"));
        assert_eq!(header_value(&headers, "x-approved-by"), None);
        assert_eq!(header_value(&headers, "x-missing"), None);
    }

    #[test]
    fn test_envelope_shape() {
        let Json(body) = ApiResponse::with_message(1, "done");
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["data"], 1);
        assert_eq!(json["message"], "done");
    }
}

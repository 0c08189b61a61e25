use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::SimError;
use crate::query::Page;

/// Standard API response wrapper
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    /// Non-fatal problems, e.g. a filter that could not be applied or a
    /// change that was not persisted.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ResponseMetadata>,
}

/// Pagination details for list responses
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ResponseMetadata {
    pub total_count: usize,
    pub page: usize,
    pub page_size: usize,
    pub total_pages: usize,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            warnings: Vec::new(),
            timestamp: Utc::now(),
            metadata: None,
        }
    }

    pub fn with_warning(mut self, warning: &SimError) -> Self {
        self.warnings.push(warning.to_string());
        self
    }

    pub fn with_warnings<'a>(mut self, warnings: impl IntoIterator<Item = &'a SimError>) -> Self {
        self.warnings.extend(warnings.into_iter().map(ToString::to_string));
        self
    }
}

impl<R: Serialize> ApiResponse<Vec<R>> {
    /// Wraps a page's items and records its position.
    pub fn paged(page: Page<R>) -> Self {
        let metadata = ResponseMetadata {
            total_count: page.total_items,
            page: page.page,
            page_size: page.page_size,
            total_pages: page.total_pages,
        };
        let mut response = Self::success(page.items);
        response.metadata = Some(metadata);
        response
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self)).into_response()
    }
}

pub fn success<T: Serialize>(data: T) -> ApiResponse<T> {
    ApiResponse::success(data)
}

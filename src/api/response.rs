//! Request/response envelope
//!
//! Every operation answers with one of
//! `{"success": true, "data": ...}` or
//! `{"success": false, "error": {"type", "message", "details"}}`.

use serde::Serialize;

use crate::types::{Result, StoreError};

/// Error payload of a failed operation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApiError {
    #[serde(rename = "type")]
    pub error_type: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl From<&StoreError> for ApiError {
    fn from(err: &StoreError) -> Self {
        Self {
            error_type: err.type_name().to_string(),
            message: err.to_string(),
            details: err.details(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiError>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(err: &StoreError) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(ApiError::from(err)),
        }
    }

    /// Envelope for an operation result, logging failures.
    pub fn from_result(operation: &str, result: Result<T>) -> Self {
        match result {
            Ok(data) => Self::ok(data),
            Err(e) => {
                tracing::warn!(operation, kind = %e.kind(), "Operation failed: {}", e);
                Self::err(&e)
            }
        }
    }

    pub fn is_success(&self) -> bool {
        self.success
    }
}

impl<T: Serialize> ApiResponse<T> {
    pub fn to_json(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }
}

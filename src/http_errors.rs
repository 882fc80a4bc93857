// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! HTTP status mapping for the load balancer appliance API.
//!
//! Every non-success response from the appliance is turned into an
//! [`ApplianceError`] here, so backends can branch on the error variant
//! instead of raw status codes.
//!
//! # HTTP Code Mapping
//!
//! | HTTP Code | Variant | Meaning |
//! |-----------|---------|---------|
//! | 401 | `Unauthorized` | Authentication required |
//! | 403 | `Unauthorized` | Insufficient permissions |
//! | 404 | `NotFound` | Object does not exist |
//! | 409 | `AlreadyExists` | Object being created exists |
//! | Other | `Http` | Any other failure |
//!
//! # Usage
//!
//! ```rust
//! use lbsync::http_errors::{map_http_error, ApplianceRequest};
//!
//! let request = ApplianceRequest::new("GET", "/mgmt/tm/ltm/pool/~Common~web-pool", "pool", "web-pool");
//! let err = map_http_error(&request, 404, "");
//! assert!(err.is_not_found());
//! ```

use crate::errors::ApplianceError;

/// Identifies the request a response belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplianceRequest {
    /// HTTP method
    pub method: String,
    /// Request path
    pub path: String,
    /// Object kind (monitor, pool, member, node, virtualserver)
    pub kind: String,
    /// Object name
    pub name: String,
}

impl ApplianceRequest {
    /// Describe a request.
    #[must_use]
    pub fn new(method: &str, path: &str, kind: &str, name: &str) -> Self {
        Self {
            method: method.to_string(),
            path: path.to_string(),
            kind: kind.to_string(),
            name: name.to_string(),
        }
    }
}

/// Map an HTTP error status to an [`ApplianceError`].
///
/// `body` is the response body; when empty a generic description of the status
/// is used as the message.
#[must_use]
pub fn map_http_error(request: &ApplianceRequest, status: u16, body: &str) -> ApplianceError {
    match status {
        401 | 403 => ApplianceError::Unauthorized { status },
        404 => ApplianceError::NotFound {
            kind: request.kind.clone(),
            name: request.name.clone(),
        },
        409 => ApplianceError::AlreadyExists {
            kind: request.kind.clone(),
            name: request.name.clone(),
        },
        _ => ApplianceError::Http {
            method: request.method.clone(),
            path: request.path.clone(),
            status,
            message: error_message(status, body),
        },
    }
}

/// Map a transport failure (no HTTP status received) to an [`ApplianceError`].
///
/// # Common Causes
///
/// - Appliance management address unreachable
/// - TLS handshake failure
/// - Request timeout
#[must_use]
pub fn map_connection_error(err: &reqwest::Error) -> ApplianceError {
    let reason = if err.is_timeout() {
        format!("request timed out: {err}")
    } else if err.is_connect() {
        format!("could not connect: {err}")
    } else {
        err.to_string()
    };
    ApplianceError::Connection { reason }
}

/// Returns the error message for a status, preferring the response body.
fn error_message(status: u16, body: &str) -> String {
    let body = body.trim();
    if body.is_empty() {
        describe_status(status).to_string()
    } else {
        body.to_string()
    }
}

/// Short description of an HTTP status returned by the appliance.
#[must_use]
pub fn describe_status(status: u16) -> &'static str {
    match status {
        400 => "Invalid request to appliance",
        401 => "Appliance authentication required",
        403 => "Appliance authorization failed",
        404 => "Object not found on appliance",
        409 => "Object already exists on appliance",
        500 => "Appliance internal error",
        501 => "Operation not supported by appliance",
        502..=504 => "Gateway error reaching appliance",
        _ => "Unexpected HTTP error from appliance",
    }
}

#[cfg(test)]
#[path = "http_errors_tests.rs"]
mod http_errors_tests;

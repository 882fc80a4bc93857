// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for http_errors module

#[cfg(test)]
mod tests {
    use crate::errors::ApplianceError;
    use crate::http_errors::*;

    fn pool_request() -> ApplianceRequest {
        ApplianceRequest::new(
            "POST",
            "/mgmt/tm/ltm/pool",
            "pool",
            "web-pool",
        )
    }

    // ============================================================================
    // Test HTTP 4xx Error Code Mappings
    // ============================================================================

    #[test]
    fn test_map_http_401_and_403_unauthorized() {
        for status in [401, 403] {
            assert_eq!(
                map_http_error(&pool_request(), status, ""),
                ApplianceError::Unauthorized { status }
            );
        }
    }

    #[test]
    fn test_map_http_404_not_found() {
        let err = map_http_error(&pool_request(), 404, "{\"code\":404}");

        assert_eq!(
            err,
            ApplianceError::NotFound {
                kind: "pool".to_string(),
                name: "web-pool".to_string(),
            }
        );
        assert!(err.is_not_found());
    }

    #[test]
    fn test_map_http_409_already_exists() {
        let err = map_http_error(&pool_request(), 409, "");

        assert!(err.is_already_exists());
        assert!(err.to_string().contains("web-pool"));
    }

    // ============================================================================
    // Test Other Error Code Mappings
    // ============================================================================

    #[test]
    fn test_map_http_500_uses_body() {
        let err = map_http_error(&pool_request(), 500, "  monitor does not exist  ");

        assert_eq!(
            err,
            ApplianceError::Http {
                method: "POST".to_string(),
                path: "/mgmt/tm/ltm/pool".to_string(),
                status: 500,
                message: "monitor does not exist".to_string(),
            }
        );
    }

    #[test]
    fn test_map_http_empty_body_uses_description() {
        let err = map_http_error(&pool_request(), 503, "");

        match err {
            ApplianceError::Http { message, .. } => {
                assert_eq!(message, "Gateway error reaching appliance");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_describe_status() {
        assert_eq!(describe_status(400), "Invalid request to appliance");
        assert_eq!(describe_status(502), "Gateway error reaching appliance");
        assert_eq!(describe_status(504), "Gateway error reaching appliance");
        assert_eq!(describe_status(418), "Unexpected HTTP error from appliance");
    }
}

// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `naming.rs`

#[cfg(test)]
mod tests {
    use super::super::*;

    #[test]
    fn test_resource_names() {
        assert_eq!(resource_name("ns-app", None, ResourceKind::Monitor), "ns-app-monitor");
        assert_eq!(resource_name("ns-app", Some(""), ResourceKind::Pool), "ns-app-pool");
        assert_eq!(
            resource_name("ns-app", Some("http"), ResourceKind::VirtualServer),
            "ns-app-http-virtualserver"
        );
    }

    #[test]
    fn test_parse_qualifier_inverts_resource_name() {
        for qualifier in [None, Some("http"), Some("grpc-web")] {
            for kind in ResourceKind::deletion_order() {
                let name = resource_name("web", qualifier, kind);
                assert_eq!(
                    parse_qualifier("web", kind, &name),
                    Some(qualifier.map(str::to_string)),
                    "name {name}"
                );
            }
        }
    }

    #[test]
    fn test_parse_qualifier_rejects_foreign_names() {
        assert_eq!(parse_qualifier("web", ResourceKind::Pool, "api-pool"), None);
        assert_eq!(parse_qualifier("web", ResourceKind::Pool, "web-monitor"), None);
        assert_eq!(parse_qualifier("web", ResourceKind::Pool, "webpool"), None);
        assert_eq!(parse_qualifier("web", ResourceKind::Pool, "web--pool"), None);
    }

    #[test]
    fn test_deletion_order_starts_with_virtual_server() {
        assert_eq!(
            ResourceKind::deletion_order(),
            [
                ResourceKind::VirtualServer,
                ResourceKind::Pool,
                ResourceKind::Monitor
            ]
        );
    }

    #[test]
    fn test_normalize_destination() {
        assert_eq!(normalize_destination("/Common/10.0.0.1:80"), "10.0.0.1:80");
        assert_eq!(normalize_destination("10.0.0.1:80"), "10.0.0.1:80");
    }
}

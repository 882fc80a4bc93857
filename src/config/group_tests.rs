// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `group.rs`

#[cfg(test)]
mod tests {
    use super::super::*;
    use crate::config::ConfigSnapshot;
    use crate::errors::ConfigError;
    use std::net::Ipv4Addr;

    fn snapshot(pairs: &[(&str, &str)]) -> ConfigSnapshot {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_group_name_before_first_separator() {
        assert_eq!(group_name("web.bind-port"), "web");
        assert_eq!(group_name("web.tls.cert"), "web");
        assert_eq!(group_name("standalone"), "standalone");
        assert_eq!(group_name(".bind-port"), "");
    }

    #[test]
    fn test_config_groups_collects_unique_names() {
        let data = snapshot(&[
            ("web.bind-port", "80"),
            ("web.namespace", "shop"),
            ("api.bind-port", "443"),
        ]);

        let groups: Vec<String> = config_groups(&data).into_iter().collect();
        assert_eq!(groups, vec!["api".to_string(), "web".to_string()]);
    }

    #[test]
    fn test_has_group_ignores_prefix_siblings() {
        let data = snapshot(&[("web-admin.bind-port", "80"), ("web2.bind-port", "81")]);

        assert!(!has_group(&data, "web"));
        assert!(has_group(&data, "web2"));
        assert!(has_group(&data, "web-admin"));
    }

    #[test]
    fn test_parse_full_group() {
        let data = snapshot(&[
            ("web.host", "shop.example.com"),
            ("web.namespace", "shop"),
            ("web.bind-ip", "10.0.0.10"),
            ("web.bind-port", "80"),
            ("web.target-service-name", "frontend"),
            ("web.target-service-id", "http"),
            ("web.target-port", "8080"),
            ("web.SSL", "true"),
            ("web.ssl-port", "443"),
            ("web.path", "/"),
        ]);

        let group = ConfigGroup::from_snapshot("web", &data, "default", ParseMode::Lenient)
            .expect("group should parse");

        assert_eq!(group.name, "web");
        assert_eq!(group.host, "shop.example.com");
        assert_eq!(group.namespace, "shop");
        assert_eq!(group.bind_ip, Some(Ipv4Addr::new(10, 0, 0, 10)));
        assert_eq!(group.bind_port, 80);
        assert_eq!(group.target_service_name, "frontend");
        assert_eq!(group.target_service_id, "http");
        assert_eq!(group.target_port, 8080);
        assert!(group.ssl);
        assert_eq!(group.ssl_port, 443);
        assert_eq!(group.path, "/");
        assert!(group.validate().is_ok());
    }

    #[test]
    fn test_missing_fields_default_to_zero_values() {
        let data = snapshot(&[("web.target-service-name", "frontend")]);

        let group =
            ConfigGroup::from_snapshot("web", &data, "shop", ParseMode::Lenient).unwrap();

        assert_eq!(group.namespace, "shop");
        assert_eq!(group.bind_ip, None);
        assert_eq!(group.bind_port, 0);
        assert!(!group.ssl);
        assert_eq!(
            group.validate(),
            Err(ConfigError::MissingBindPort {
                group: "web".to_string()
            })
        );
    }

    #[test]
    fn test_lenient_mode_zeroes_malformed_values() {
        let data = snapshot(&[
            ("web.bind-port", "eighty"),
            ("web.SSL", "maybe"),
            ("web.bind-ip", "not-an-ip"),
        ]);

        let group =
            ConfigGroup::from_snapshot("web", &data, "default", ParseMode::Lenient).unwrap();

        assert_eq!(group.bind_port, 0);
        assert!(!group.ssl);
        assert_eq!(group.bind_ip, None);
    }

    #[test]
    fn test_strict_mode_rejects_malformed_port() {
        let data = snapshot(&[("web.bind-port", "99999")]);

        let err = ConfigGroup::from_snapshot("web", &data, "default", ParseMode::Strict)
            .unwrap_err();

        assert_eq!(
            err,
            ConfigError::MalformedField {
                group: "web".to_string(),
                field: "bind-port".to_string(),
                value: "99999".to_string(),
            }
        );
    }

    #[test]
    fn test_strict_mode_rejects_invalid_bind_ip() {
        let data = snapshot(&[("web.bind-port", "80"), ("web.bind-ip", "10.0.0")]);

        let err = ConfigGroup::from_snapshot("web", &data, "default", ParseMode::Strict)
            .unwrap_err();

        assert!(matches!(err, ConfigError::InvalidBindIp { .. }));
    }

    #[test]
    fn test_boolean_spellings() {
        for (value, expected) in [("1", true), ("T", true), ("False", false), ("0", false)] {
            let data = snapshot(&[("web.SSL", value)]);
            let group =
                ConfigGroup::from_snapshot("web", &data, "default", ParseMode::Strict).unwrap();
            assert_eq!(group.ssl, expected, "value {value}");
        }
    }

    #[test]
    fn test_values_are_trimmed() {
        let data = snapshot(&[("web.bind-port", " 80 "), ("web.namespace", "  ")]);

        let group =
            ConfigGroup::from_snapshot("web", &data, "fallback", ParseMode::Strict).unwrap();

        assert_eq!(group.bind_port, 80);
        assert_eq!(group.namespace, "fallback");
    }

    #[test]
    fn test_targets_service() {
        let data = snapshot(&[
            ("web.namespace", "shop"),
            ("web.target-service-name", "frontend"),
        ]);
        let group =
            ConfigGroup::from_snapshot("web", &data, "default", ParseMode::Lenient).unwrap();

        assert!(group.targets_service("shop", "frontend"));
        assert!(!group.targets_service("default", "frontend"));
        assert!(!group.targets_service("shop", "backend"));
    }
}

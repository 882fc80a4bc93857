// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `cluster.rs`

#[cfg(test)]
mod tests {
    use super::super::*;
    use crate::config::{ConfigSnapshot, ParseMode};
    use crate::node::{ClusterNode, NodeAddress};
    use serde_json::json;

    fn group(pairs: &[(&str, &str)]) -> ConfigGroup {
        let snapshot: ConfigSnapshot = pairs
            .iter()
            .map(|(k, v)| (format!("web.{k}"), (*v).to_string()))
            .collect();
        ConfigGroup::from_snapshot("web", &snapshot, "shop", ParseMode::Lenient).unwrap()
    }

    fn port(name: &str, port: u16, target: Option<u16>, node_port: Option<u16>) -> ServicePortInfo {
        ServicePortInfo {
            name: name.to_string(),
            port,
            target_port: target,
            node_port,
        }
    }

    fn service(ports: Vec<ServicePortInfo>) -> ServiceInfo {
        ServiceInfo {
            namespace: "shop".to_string(),
            name: "frontend".to_string(),
            ports,
        }
    }

    #[test]
    fn test_from_k8s_service() {
        let svc: Service = serde_json::from_value(json!({
            "apiVersion": "v1",
            "kind": "Service",
            "metadata": { "name": "frontend", "namespace": "shop" },
            "spec": {
                "type": "NodePort",
                "ports": [
                    { "name": "http", "port": 80, "targetPort": 8080, "nodePort": 30080 },
                    { "port": 443, "targetPort": "https" }
                ]
            }
        }))
        .unwrap();

        let info = ServiceInfo::from_service(&svc);

        assert_eq!(info.key(), "shop/frontend");
        assert_eq!(
            info.ports,
            vec![
                port("http", 80, Some(8080), Some(30080)),
                port("", 443, None, None),
            ]
        );
        assert_eq!(info.qualifiers(), vec![Some("http".to_string()), None]);
    }

    #[test]
    fn test_all_ports_selected_without_target_port() {
        let svc = service(vec![
            port("http", 80, Some(8080), Some(30080)),
            port("admin", 9000, None, Some(30900)),
        ]);

        let ports = select_target_ports(&group(&[("bind-port", "80")]), &svc).unwrap();

        assert_eq!(
            ports,
            vec![
                TargetPort {
                    qualifier: Some("http".to_string()),
                    port: 80,
                    node_port: 30080,
                },
                TargetPort {
                    qualifier: Some("admin".to_string()),
                    port: 9000,
                    node_port: 30900,
                },
            ]
        );
    }

    #[test]
    fn test_target_port_matches_service_or_container_port() {
        let svc = service(vec![
            port("http", 80, Some(8080), Some(30080)),
            port("admin", 9000, None, Some(30900)),
        ]);

        let by_container = select_target_ports(&group(&[("target-port", "8080")]), &svc).unwrap();
        assert_eq!(by_container.len(), 1);
        assert_eq!(by_container[0].node_port, 30080);

        let by_service = select_target_ports(&group(&[("target-port", "9000")]), &svc).unwrap();
        assert_eq!(by_service.len(), 1);
        assert_eq!(by_service[0].node_port, 30900);
    }

    #[test]
    fn test_target_service_id_matches_port_name() {
        let svc = service(vec![
            port("http", 80, Some(8080), Some(30080)),
            port("admin", 9000, None, Some(30900)),
        ]);

        let ports = select_target_ports(
            &group(&[("target-port", "1"), ("target-service-id", "admin")]),
            &svc,
        )
        .unwrap();

        assert_eq!(ports.len(), 1);
        assert_eq!(ports[0].qualifier.as_deref(), Some("admin"));
    }

    #[test]
    fn test_no_matching_port_is_error() {
        let svc = service(vec![port("http", 80, Some(8080), Some(30080))]);

        let err = select_target_ports(&group(&[("target-port", "5432")]), &svc).unwrap_err();

        assert!(matches!(err, BackendError::NoServicePorts { .. }));
    }

    #[test]
    fn test_missing_node_port_is_error() {
        let svc = service(vec![port("", 80, None, None)]);

        let err = select_target_ports(&group(&[]), &svc).unwrap_err();

        match err {
            BackendError::MissingNodePort { service, port } => {
                assert_eq!(service, "shop/frontend");
                assert_eq!(port, "80");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_static_view_ready_nodes() {
        let view = StaticClusterView::new();
        for (name, ready) in [("a", true), ("b", false), ("c", true)] {
            view.put_node(ClusterNode {
                name: name.to_string(),
                addresses: vec![NodeAddress {
                    kind: "InternalIP".to_string(),
                    address: "10.0.0.1".to_string(),
                }],
                ready,
            });
        }

        let ready: Vec<String> = view.ready_nodes().into_iter().map(|n| n.name).collect();
        assert_eq!(ready, vec!["a".to_string(), "c".to_string()]);

        view.remove_node("a");
        assert_eq!(view.nodes().len(), 2);
    }

    #[test]
    fn test_static_view_services_and_groups() {
        let view = StaticClusterView::new();
        view.put_service(service(vec![]));
        view.put_group(group(&[("bind-port", "80")]));

        assert!(view.service("shop", "frontend").is_some());
        assert!(view.service("default", "frontend").is_none());
        assert_eq!(view.groups().len(), 1);

        view.remove_service("shop", "frontend");
        view.remove_group("web");
        assert!(view.service("shop", "frontend").is_none());
        assert!(view.groups().is_empty());
    }
}

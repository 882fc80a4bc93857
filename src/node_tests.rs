// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `node.rs`

#[cfg(test)]
mod tests {
    use crate::errors::NodeAddressError;
    use crate::node::*;
    use k8s_openapi::api::core::v1::{Node, NodeAddress as K8sNodeAddress, NodeCondition, NodeStatus};
    use kube::api::ObjectMeta;

    fn node(name: &str, addresses: &[(&str, &str)], ready: bool) -> ClusterNode {
        ClusterNode {
            name: name.to_string(),
            addresses: addresses
                .iter()
                .map(|(kind, address)| NodeAddress {
                    kind: (*kind).to_string(),
                    address: (*address).to_string(),
                })
                .collect(),
            ready,
        }
    }

    #[test]
    fn test_external_address_wins() {
        let n = node(
            "node-1",
            &[("InternalIP", "10.0.0.1"), ("ExternalIP", "203.0.113.1")],
            true,
        );

        assert_eq!(n.host_address(), Ok("203.0.113.1"));
    }

    #[test]
    fn test_legacy_host_before_internal() {
        let n = node(
            "node-1",
            &[("InternalIP", "10.0.0.1"), ("LegacyHostIP", "192.168.0.1")],
            true,
        );

        assert_eq!(n.host_address(), Ok("192.168.0.1"));
    }

    #[test]
    fn test_internal_only() {
        let n = node("node-1", &[("InternalIP", "10.0.0.1")], true);

        assert_eq!(n.host_address(), Ok("10.0.0.1"));
    }

    #[test]
    fn test_first_address_of_class_is_used() {
        let n = node(
            "node-1",
            &[("InternalIP", "10.0.0.1"), ("InternalIP", "10.0.0.2")],
            true,
        );

        assert_eq!(n.host_address(), Ok("10.0.0.1"));
    }

    #[test]
    fn test_no_recognized_address_is_error() {
        let n = node("node-1", &[("Hostname", "node-1.local")], true);

        assert_eq!(
            n.host_address(),
            Err(NodeAddressError::NoUsableAddress {
                node: "node-1".to_string(),
                known: vec!["Hostname=node-1.local".to_string()],
            })
        );
    }

    #[test]
    fn test_member_name() {
        let n = node("node-1", &[], true);

        assert_eq!(n.member_name(30080), "node-1:30080");
    }

    #[test]
    fn test_membership_changed_ignores_heartbeats() {
        let old = node("node-1", &[("InternalIP", "10.0.0.1")], true);
        let same = old.clone();
        let moved = node("node-1", &[("InternalIP", "10.0.0.9")], true);
        let not_ready = node("node-1", &[("InternalIP", "10.0.0.1")], false);

        assert!(!same.membership_changed(&old));
        assert!(moved.membership_changed(&old));
        assert!(not_ready.membership_changed(&old));
    }

    #[test]
    fn test_from_k8s_node() {
        let k8s_node = Node {
            metadata: ObjectMeta {
                name: Some("worker-1".to_string()),
                ..Default::default()
            },
            spec: None,
            status: Some(NodeStatus {
                addresses: Some(vec![
                    K8sNodeAddress {
                        type_: "InternalIP".to_string(),
                        address: "10.0.0.5".to_string(),
                    },
                    K8sNodeAddress {
                        type_: "Hostname".to_string(),
                        address: "worker-1".to_string(),
                    },
                ]),
                conditions: Some(vec![NodeCondition {
                    type_: "Ready".to_string(),
                    status: "True".to_string(),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
        };

        let n = ClusterNode::from_node(&k8s_node);
        assert_eq!(n.name, "worker-1");
        assert!(n.ready);
        assert_eq!(n.addresses.len(), 2);
        assert_eq!(n.host_address(), Ok("10.0.0.5"));
    }

    #[test]
    fn test_node_without_status_is_not_ready() {
        let k8s_node = Node {
            metadata: ObjectMeta {
                name: Some("worker-2".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };

        let n = ClusterNode::from_node(&k8s_node);
        assert!(!n.ready);
        assert!(n.addresses.is_empty());
        assert!(n.host_address().is_err());
    }
}

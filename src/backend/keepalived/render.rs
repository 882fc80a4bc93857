// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! keepalived configuration rendering.

use crate::constants::{KEEPALIVED_IPTABLES_CHAIN, KEEPALIVED_VIRTUAL_ROUTER_ID};
use std::collections::BTreeSet;
use std::net::Ipv4Addr;

/// keepalived.conf template
const KEEPALIVED_CONF_TEMPLATE: &str = include_str!("../../../templates/keepalived.conf.tmpl");

/// Render the keepalived configuration for a set of held VIPs.
///
/// Addresses are emitted in ascending order so identical sets always render
/// identical files.
#[must_use]
pub fn render_config(interface: &str, vips: &BTreeSet<Ipv4Addr>) -> String {
    let addresses = vips
        .iter()
        .map(|vip| format!("    {vip}"))
        .collect::<Vec<_>>()
        .join("\n");

    KEEPALIVED_CONF_TEMPLATE
        .replace("{{IPTABLES_CHAIN}}", KEEPALIVED_IPTABLES_CHAIN)
        .replace("{{INTERFACE}}", interface)
        .replace(
            "{{VIRTUAL_ROUTER_ID}}",
            &KEEPALIVED_VIRTUAL_ROUTER_ID.to_string(),
        )
        .replace("{{VIRTUAL_ADDRESSES}}", &addresses)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_lists_vips_in_order() {
        let vips = BTreeSet::from([Ipv4Addr::new(10, 0, 0, 2), Ipv4Addr::new(10, 0, 0, 1)]);

        let config = render_config("eth1", &vips);

        let first = config.find("10.0.0.1").unwrap();
        let second = config.find("10.0.0.2").unwrap();
        assert!(first < second);
        assert!(config.contains("interface eth1"));
        assert!(config.contains("virtual_router_id 50"));
        assert!(config.contains("vrrp_iptables LOADBALANCER-DAEMON"));
        assert!(!config.contains("{{"));
    }

    #[test]
    fn test_render_empty_set() {
        let config = render_config("eth0", &BTreeSet::new());

        assert!(config.contains("virtual_ipaddress {"));
        assert!(!config.contains("{{VIRTUAL_ADDRESSES}}"));
    }
}

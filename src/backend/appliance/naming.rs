// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Deterministic appliance resource names.
//!
//! Names are `<group>[-<port-name>]-<kind>`, so every resource a group owns can
//! be rediscovered after a restart from the group identity alone.

use crate::constants::{KIND_MONITOR, KIND_POOL, KIND_VIRTUAL_SERVER, RESOURCE_NAME_SEPARATOR};
use std::fmt;

/// Kinds of appliance resources owned by a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceKind {
    /// Health monitor
    Monitor,
    /// Server pool
    Pool,
    /// Virtual server
    VirtualServer,
}

impl ResourceKind {
    /// Name suffix of the kind.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Monitor => KIND_MONITOR,
            Self::Pool => KIND_POOL,
            Self::VirtualServer => KIND_VIRTUAL_SERVER,
        }
    }

    /// Kinds in deletion order: each kind is only referenced by kinds before it.
    #[must_use]
    pub fn deletion_order() -> [Self; 3] {
        [Self::VirtualServer, Self::Pool, Self::Monitor]
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Build the name of a group's resource.
///
/// # Examples
///
/// ```
/// use lbsync::backend::appliance::naming::{resource_name, ResourceKind};
///
/// assert_eq!(resource_name("web", None, ResourceKind::Pool), "web-pool");
/// assert_eq!(resource_name("web", Some("http"), ResourceKind::Monitor), "web-http-monitor");
/// ```
#[must_use]
pub fn resource_name(group: &str, qualifier: Option<&str>, kind: ResourceKind) -> String {
    match qualifier {
        Some(q) if !q.is_empty() => {
            format!("{group}{RESOURCE_NAME_SEPARATOR}{q}{RESOURCE_NAME_SEPARATOR}{kind}")
        }
        _ => format!("{group}{RESOURCE_NAME_SEPARATOR}{kind}"),
    }
}

/// Recover the port qualifier from a resource name of `group` and `kind`.
///
/// Returns `Some(None)` for an unqualified name, `Some(Some(q))` for a
/// qualified one, and `None` when the name does not follow the group's pattern.
#[must_use]
pub fn parse_qualifier(group: &str, kind: ResourceKind, name: &str) -> Option<Option<String>> {
    let rest = name
        .strip_prefix(group)?
        .strip_prefix(RESOURCE_NAME_SEPARATOR)?;
    if rest == kind.as_str() {
        return Some(None);
    }
    let qualifier = rest
        .strip_suffix(kind.as_str())?
        .strip_suffix(RESOURCE_NAME_SEPARATOR)?;
    (!qualifier.is_empty()).then(|| Some(qualifier.to_string()))
}

/// Strip the partition prefix from a virtual server destination.
///
/// The appliance reports destinations as `/<partition>/<ip>:<port>`.
#[must_use]
pub fn normalize_destination(destination: &str) -> &str {
    destination.rsplit('/').next().unwrap_or(destination)
}

#[cfg(test)]
#[path = "naming_tests.rs"]
mod naming_tests;

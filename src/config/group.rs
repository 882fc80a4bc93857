// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Configuration group extraction and field parsing.

use super::ConfigSnapshot;
use crate::constants::{
    FIELD_BIND_IP, FIELD_BIND_PORT, FIELD_HOST, FIELD_NAMESPACE, FIELD_PATH, FIELD_SSL,
    FIELD_SSL_PORT, FIELD_TARGET_PORT, FIELD_TARGET_SERVICE_ID, FIELD_TARGET_SERVICE_NAME,
    GROUP_KEY_SEPARATOR,
};
use crate::errors::ConfigError;
use std::collections::BTreeSet;
use std::net::Ipv4Addr;
use std::ops::Bound;
use tracing::warn;

/// How malformed numeric and boolean fields are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParseMode {
    /// Parse failures yield the zero value and a warning
    #[default]
    Lenient,
    /// Parse failures reject the whole group
    Strict,
}

/// A named, declaratively configured load balanced endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigGroup {
    /// Group identity, the key prefix before the first separator
    pub name: String,
    /// Hostname served by the group
    pub host: String,
    /// Namespace of the target service
    pub namespace: String,
    /// Pre-assigned bind address, if any
    pub bind_ip: Option<Ipv4Addr>,
    /// Port the virtual server listens on (0 means unset)
    pub bind_port: u16,
    /// Name of the target service
    pub target_service_name: String,
    /// Identifier of the target service port
    pub target_service_id: String,
    /// Target port number on the service (0 means every port)
    pub target_port: u16,
    /// TLS flag
    pub ssl: bool,
    /// TLS listening port
    pub ssl_port: u16,
    /// HTTP path
    pub path: String,
}

/// Returns the group a configuration key belongs to.
///
/// Every key maps to exactly one group: the text before the first separator,
/// or the whole key when it contains no separator.
#[must_use]
pub fn group_name(key: &str) -> &str {
    key.split_once(GROUP_KEY_SEPARATOR)
        .map_or(key, |(group, _)| group)
}

/// Returns every group named by the keys of a snapshot.
#[must_use]
pub fn config_groups(snapshot: &ConfigSnapshot) -> BTreeSet<String> {
    snapshot
        .keys()
        .map(|key| group_name(key).to_string())
        .collect()
}

/// Returns true if at least one key of the snapshot belongs to `group`.
///
/// Keys of one group share its name as a prefix, so only the contiguous
/// prefix range of the ordered snapshot is inspected.
#[must_use]
pub fn has_group(snapshot: &ConfigSnapshot, group: &str) -> bool {
    snapshot
        .range::<str, _>((Bound::Included(group), Bound::Unbounded))
        .take_while(|(key, _)| key.starts_with(group))
        .any(|(key, _)| group_name(key) == group)
}

impl ConfigGroup {
    /// Parse a group from a configuration snapshot.
    ///
    /// Missing fields default to empty/zero/false. The target service namespace
    /// falls back to `default_namespace`, the namespace of the ConfigMap the
    /// snapshot came from.
    ///
    /// # Errors
    ///
    /// In [`ParseMode::Strict`], returns [`ConfigError::MalformedField`] or
    /// [`ConfigError::InvalidBindIp`] for values that do not parse.
    pub fn from_snapshot(
        name: &str,
        snapshot: &ConfigSnapshot,
        default_namespace: &str,
        mode: ParseMode,
    ) -> Result<Self, ConfigError> {
        let fields = GroupFields {
            group: name,
            snapshot,
            mode,
        };

        let namespace = match fields.text(FIELD_NAMESPACE) {
            ns if ns.is_empty() => default_namespace.to_string(),
            ns => ns,
        };

        Ok(Self {
            name: name.to_string(),
            host: fields.text(FIELD_HOST),
            namespace,
            bind_ip: fields.address(FIELD_BIND_IP)?,
            bind_port: fields.port(FIELD_BIND_PORT)?,
            target_service_name: fields.text(FIELD_TARGET_SERVICE_NAME),
            target_service_id: fields.text(FIELD_TARGET_SERVICE_ID),
            target_port: fields.port(FIELD_TARGET_PORT)?,
            ssl: fields.flag(FIELD_SSL)?,
            ssl_port: fields.port(FIELD_SSL_PORT)?,
            path: fields.text(FIELD_PATH),
        })
    }

    /// Check that the group can be provisioned.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingBindPort`] when no bind port is set.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bind_port == 0 {
            return Err(ConfigError::MissingBindPort {
                group: self.name.clone(),
            });
        }
        Ok(())
    }

    /// Returns true if the group targets the given service.
    #[must_use]
    pub fn targets_service(&self, namespace: &str, name: &str) -> bool {
        self.namespace == namespace && self.target_service_name == name
    }
}

/// Typed accessors over the keys of one group.
struct GroupFields<'a> {
    group: &'a str,
    snapshot: &'a ConfigSnapshot,
    mode: ParseMode,
}

impl GroupFields<'_> {
    fn raw(&self, field: &str) -> Option<&str> {
        let key = format!("{}{GROUP_KEY_SEPARATOR}{field}", self.group);
        self.snapshot
            .get(&key)
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
    }

    fn text(&self, field: &str) -> String {
        self.raw(field).unwrap_or_default().to_string()
    }

    fn malformed(&self, field: &str, value: &str) -> Result<(), ConfigError> {
        match self.mode {
            ParseMode::Strict => Err(ConfigError::MalformedField {
                group: self.group.to_string(),
                field: field.to_string(),
                value: value.to_string(),
            }),
            ParseMode::Lenient => {
                warn!(
                    group = %self.group,
                    field = %field,
                    value = %value,
                    "Malformed configuration value, using default"
                );
                Ok(())
            }
        }
    }

    fn port(&self, field: &str) -> Result<u16, ConfigError> {
        let Some(value) = self.raw(field) else {
            return Ok(0);
        };
        match value.parse::<u16>() {
            Ok(port) => Ok(port),
            Err(_) => self.malformed(field, value).map(|()| 0),
        }
    }

    fn flag(&self, field: &str) -> Result<bool, ConfigError> {
        let Some(value) = self.raw(field) else {
            return Ok(false);
        };
        match parse_bool(value) {
            Some(flag) => Ok(flag),
            None => self.malformed(field, value).map(|()| false),
        }
    }

    fn address(&self, field: &str) -> Result<Option<Ipv4Addr>, ConfigError> {
        let Some(value) = self.raw(field) else {
            return Ok(None);
        };
        match value.parse::<Ipv4Addr>() {
            Ok(ip) => Ok(Some(ip)),
            Err(_) if self.mode == ParseMode::Strict => Err(ConfigError::InvalidBindIp {
                group: self.group.to_string(),
                value: value.to_string(),
            }),
            Err(_) => self.malformed(field, value).map(|()| None),
        }
    }
}

/// Parse the boolean spellings accepted in configuration values.
fn parse_bool(value: &str) -> Option<bool> {
    match value {
        "1" | "t" | "T" | "true" | "TRUE" | "True" => Some(true),
        "0" | "f" | "F" | "false" | "FALSE" | "False" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
#[path = "group_tests.rs"]
mod group_tests;

// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Load balancer configuration groups and snapshot diffing.
//!
//! Operators describe load balanced endpoints in ConfigMaps whose keys have the
//! form `<group>.<field>`:
//!
//! ```text
//! web.namespace:            shop
//! web.bind-port:            "80"
//! web.target-service-name:  frontend
//! ```
//!
//! - [`group`] - Extracts groups from a snapshot and parses their fields
//! - [`diff`] - Compares two snapshots and classifies every affected group

pub mod diff;
pub mod group;

pub use diff::{diff, GroupChange, GroupDiff, KeyDiff};
pub use group::{config_groups, group_name, ConfigGroup, ParseMode};

use std::collections::BTreeMap;

/// Flat key/value configuration observed at one watch event.
pub type ConfigSnapshot = BTreeMap<String, String>;

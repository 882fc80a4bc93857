// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Label constants used to select and mark objects watched by the controller.

// ============================================================================
// Configuration Selection
// ============================================================================

/// Label key identifying a ConfigMap as load balancer configuration
pub const CONFIG_LABEL_KEY: &str = "loadbalancer";

/// Label value identifying a ConfigMap as load balancer configuration
pub const CONFIG_LABEL_VALUE: &str = "configmap";

// ============================================================================
// Kubernetes Standard Labels
// https://kubernetes.io/docs/concepts/overview/working-with-objects/common-labels/
// ============================================================================

/// Standard label for the tool being used to manage the operation of an application
pub const K8S_MANAGED_BY: &str = "app.kubernetes.io/managed-by";

/// Value for `app.kubernetes.io/managed-by` on objects created by this controller
pub const MANAGED_BY_LBSYNC: &str = "lbsync";

/// Label selector string matching load balancer configuration ConfigMaps
#[must_use]
pub fn config_label_selector() -> String {
    format!("{CONFIG_LABEL_KEY}={CONFIG_LABEL_VALUE}")
}

// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! # lbsync - Load Balancer Reconciliation Controller for Kubernetes
//!
//! lbsync watches labelled ConfigMaps describing load balancer groups and
//! keeps an external load balancer in step with the cluster.
//!
//! ## Overview
//!
//! A configuration group exposes one Kubernetes Service on a Virtual IP. Two
//! backends realise groups:
//!
//! - **Appliance** - a remote load balancer appliance managed over its REST
//!   API (health monitor, pool with one member per ready node, virtual server)
//! - **keepalived** - a local daemon announcing the Virtual IPs from this host
//!
//! Virtual IPs come either from the group's `bind-ip` or from a configured
//! range, recorded in a shared allocation ConfigMap so replicas never hand out
//! the same address twice.
//!
//! ## Modules
//!
//! - [`config`] - Configuration group parsing, validation and diffing
//! - [`cluster`] - Read-only view of services, nodes and groups
//! - [`node`] - Node address selection and membership
//! - [`vip`] - Virtual IP range and allocation table
//! - [`backend`] - Appliance and keepalived backends
//! - [`controller`] - Watch loops, command planning and per-key dispatch
//! - [`context`] - Reflector stores backing the cluster view
//! - [`cli`] - Command line and environment configuration
//! - [`metrics`] - Prometheus metrics and the `/metrics` endpoint
//!
//! ## Configuration Example
//!
//! ```yaml
//! apiVersion: v1
//! kind: ConfigMap
//! metadata:
//!   name: lb-config
//!   labels:
//!     loadbalancer: configmap
//! data:
//!   web.bind-port: "80"
//!   web.target-service-name: frontend
//!   web.namespace: shop
//! ```

pub mod backend;
pub mod cli;
pub mod cluster;
pub mod config;
pub mod constants;
pub mod context;
pub mod controller;
pub mod errors;
pub mod http_errors;
pub mod labels;
pub mod metrics;
pub mod node;
pub mod retry;
pub mod vip;

// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Load balancer appliance API.
//!
//! [`ApplianceApi`] is the narrow get/create/modify/delete surface the
//! appliance backend needs. [`BigIpClient`] implements it over the iControl
//! REST interface:
//!
//! | Object | Collection path |
//! |--------|-----------------|
//! | Monitor | `/mgmt/tm/ltm/monitor/tcp` |
//! | Pool | `/mgmt/tm/ltm/pool` |
//! | Pool member | `/mgmt/tm/ltm/pool/~<partition>~<pool>/members` |
//! | Node | `/mgmt/tm/ltm/node` |
//! | Virtual server | `/mgmt/tm/ltm/virtual` |
//!
//! Objects are addressed as `<collection>/~<partition>~<name>`.

use super::naming::ResourceKind;
use crate::constants::{APPLIANCE_LTM_PATH, APPLIANCE_REQUEST_TIMEOUT_SECS, MONITOR_PROTOCOL};
use crate::errors::ApplianceError;
use crate::http_errors::{map_connection_error, map_http_error, ApplianceRequest};
use async_trait::async_trait;
use reqwest::{Client as HttpClient, Method};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error};
use url::Url;

/// A TCP health monitor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Monitor {
    /// Monitor name
    pub name: String,
    /// Probe interval in seconds
    #[serde(default)]
    pub interval: u32,
    /// Probe timeout in seconds
    #[serde(default)]
    pub timeout: u32,
}

/// A server pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pool {
    /// Pool name
    pub name: String,
    /// Name of the monitor checking pool members
    #[serde(default)]
    pub monitor: String,
    /// `yes` when NAT is allowed
    #[serde(default)]
    pub allow_nat: String,
    /// `yes` when SNAT is allowed
    #[serde(default)]
    pub allow_snat: String,
}

/// A node object referenced by pool members.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplianceNode {
    /// Node name, the Kubernetes node name
    pub name: String,
    /// Node address
    #[serde(default)]
    pub address: String,
}

/// Source address translation settings of a virtual server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SourceAddressTranslation {
    /// Translation mode (`automap`)
    #[serde(rename = "type", default)]
    pub kind: String,
}

/// A virtual server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualServer {
    /// Virtual server name
    pub name: String,
    /// `<ip>:<port>`, reported back as `/<partition>/<ip>:<port>`
    #[serde(default)]
    pub destination: String,
    /// Destination mask
    #[serde(default)]
    pub mask: String,
    /// Pool receiving the traffic
    #[serde(default)]
    pub pool: String,
    /// Source address translation
    #[serde(default)]
    pub source_address_translation: SourceAddressTranslation,
}

/// Operations the appliance backend performs against the load balancer.
///
/// `get_*` return `Ok(None)` for absent objects. Creating an existing object
/// fails with [`ApplianceError::AlreadyExists`]; deleting an absent one fails
/// with [`ApplianceError::NotFound`].
#[async_trait]
pub trait ApplianceApi: Send + Sync {
    /// Look up a monitor.
    async fn get_monitor(&self, name: &str) -> Result<Option<Monitor>, ApplianceError>;
    /// Create a monitor.
    async fn create_monitor(&self, monitor: &Monitor) -> Result<(), ApplianceError>;
    /// Delete a monitor.
    async fn delete_monitor(&self, name: &str) -> Result<(), ApplianceError>;

    /// Look up a pool.
    async fn get_pool(&self, name: &str) -> Result<Option<Pool>, ApplianceError>;
    /// Create a pool.
    async fn create_pool(&self, pool: &Pool) -> Result<(), ApplianceError>;
    /// Delete a pool and its members.
    async fn delete_pool(&self, name: &str) -> Result<(), ApplianceError>;

    /// Add a `<node>:<port>` member to a pool.
    async fn add_pool_member(&self, pool: &str, member: &str) -> Result<(), ApplianceError>;
    /// Remove a member from a pool.
    async fn delete_pool_member(&self, pool: &str, member: &str) -> Result<(), ApplianceError>;

    /// Look up a node.
    async fn get_node(&self, name: &str) -> Result<Option<ApplianceNode>, ApplianceError>;
    /// Create a node.
    async fn create_node(&self, node: &ApplianceNode) -> Result<(), ApplianceError>;
    /// Replace a node's settings.
    async fn modify_node(&self, node: &ApplianceNode) -> Result<(), ApplianceError>;

    /// Look up a virtual server.
    async fn get_virtual_server(&self, name: &str) -> Result<Option<VirtualServer>, ApplianceError>;
    /// Create a virtual server.
    async fn create_virtual_server(&self, server: &VirtualServer) -> Result<(), ApplianceError>;
    /// Replace a virtual server's settings.
    async fn modify_virtual_server(&self, server: &VirtualServer) -> Result<(), ApplianceError>;
    /// Delete a virtual server.
    async fn delete_virtual_server(&self, name: &str) -> Result<(), ApplianceError>;

    /// Names of every object of a kind.
    async fn list_names(&self, kind: ResourceKind) -> Result<Vec<String>, ApplianceError>;
}

/// Connection settings for [`BigIpClient`].
#[derive(Debug, Clone)]
pub struct ApplianceConfig {
    /// Management base URL, e.g. `https://bigip.example.com`
    pub url: String,
    /// API user
    pub user: String,
    /// API password
    pub password: String,
    /// Administrative partition
    pub partition: String,
    /// Accept self-signed management certificates
    pub insecure: bool,
}

/// iControl REST client.
pub struct BigIpClient {
    http: HttpClient,
    base_url: Url,
    user: String,
    password: String,
    partition: String,
}

#[derive(Deserialize)]
struct Collection {
    #[serde(default)]
    items: Vec<NamedItem>,
}

#[derive(Deserialize)]
struct NamedItem {
    name: String,
}

#[derive(Serialize)]
struct MemberRef<'a> {
    name: &'a str,
}

impl BigIpClient {
    /// Create a client.
    ///
    /// # Errors
    ///
    /// Returns [`ApplianceError::Connection`] when the URL does not parse or the
    /// HTTP client cannot be built.
    pub fn new(config: &ApplianceConfig) -> Result<Self, ApplianceError> {
        let base_url = Url::parse(&config.url).map_err(|e| ApplianceError::Connection {
            reason: format!("invalid appliance URL '{}': {e}", config.url),
        })?;

        let http = HttpClient::builder()
            .timeout(Duration::from_secs(APPLIANCE_REQUEST_TIMEOUT_SECS))
            .danger_accept_invalid_certs(config.insecure)
            .build()
            .map_err(|e| ApplianceError::Connection {
                reason: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            http,
            base_url,
            user: config.user.clone(),
            password: config.password.clone(),
            partition: config.partition.clone(),
        })
    }

    fn collection_path(collection: &str) -> String {
        format!("{APPLIANCE_LTM_PATH}/{collection}")
    }

    fn object_path(&self, collection: &str, name: &str) -> String {
        format!(
            "{APPLIANCE_LTM_PATH}/{collection}/~{}~{name}",
            self.partition
        )
    }

    fn members_path(&self, pool: &str) -> String {
        format!("{}/members", self.object_path("pool", pool))
    }

    fn kind_collection(kind: ResourceKind) -> String {
        match kind {
            ResourceKind::Monitor => format!("monitor/{MONITOR_PROTOCOL}"),
            ResourceKind::Pool => "pool".to_string(),
            ResourceKind::VirtualServer => "virtual".to_string(),
        }
    }

    /// Send one request and return the response body.
    async fn send<B: Serialize + ?Sized>(
        &self,
        method: Method,
        request: &ApplianceRequest,
        body: Option<&B>,
    ) -> Result<String, ApplianceError> {
        let url = self
            .base_url
            .join(&request.path)
            .map_err(|e| ApplianceError::Connection {
                reason: format!("invalid request path '{}': {e}", request.path),
            })?;

        debug!(
            method = %request.method,
            path = %request.path,
            kind = %request.kind,
            name = %request.name,
            "Appliance API request"
        );

        let mut builder = self
            .http
            .request(method, url)
            .basic_auth(&self.user, Some(&self.password));
        if let Some(body) = body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|e| map_connection_error(&e))?;
        let status = response.status();
        let text = response.text().await.map_err(|e| map_connection_error(&e))?;

        if !status.is_success() {
            let err = map_http_error(request, status.as_u16(), &text);
            if !err.is_not_found() && !err.is_already_exists() {
                error!(
                    method = %request.method,
                    path = %request.path,
                    status = %status,
                    error = %err,
                    "Appliance API request failed"
                );
            }
            return Err(err);
        }

        Ok(text)
    }

    async fn get_object<T: DeserializeOwned>(
        &self,
        collection: &str,
        kind: &str,
        name: &str,
    ) -> Result<Option<T>, ApplianceError> {
        let request = ApplianceRequest::new("GET", &self.object_path(collection, name), kind, name);
        match self.send(Method::GET, &request, None::<&()>).await {
            Ok(text) => serde_json::from_str(&text)
                .map(Some)
                .map_err(|e| ApplianceError::Decode {
                    path: request.path,
                    reason: e.to_string(),
                }),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn create_object<B: Serialize + ?Sized>(
        &self,
        collection: &str,
        kind: &str,
        name: &str,
        body: &B,
    ) -> Result<(), ApplianceError> {
        let request = ApplianceRequest::new("POST", &Self::collection_path(collection), kind, name);
        self.send(Method::POST, &request, Some(body)).await.map(|_| ())
    }

    async fn modify_object<B: Serialize + ?Sized>(
        &self,
        collection: &str,
        kind: &str,
        name: &str,
        body: &B,
    ) -> Result<(), ApplianceError> {
        let request = ApplianceRequest::new("PUT", &self.object_path(collection, name), kind, name);
        self.send(Method::PUT, &request, Some(body)).await.map(|_| ())
    }

    async fn delete_object(&self, collection: &str, kind: &str, name: &str) -> Result<(), ApplianceError> {
        let request = ApplianceRequest::new("DELETE", &self.object_path(collection, name), kind, name);
        self.send(Method::DELETE, &request, None::<&()>).await.map(|_| ())
    }
}

#[async_trait]
impl ApplianceApi for BigIpClient {
    async fn get_monitor(&self, name: &str) -> Result<Option<Monitor>, ApplianceError> {
        let collection = Self::kind_collection(ResourceKind::Monitor);
        self.get_object(&collection, "monitor", name).await
    }

    async fn create_monitor(&self, monitor: &Monitor) -> Result<(), ApplianceError> {
        let collection = Self::kind_collection(ResourceKind::Monitor);
        self.create_object(&collection, "monitor", &monitor.name, monitor)
            .await
    }

    async fn delete_monitor(&self, name: &str) -> Result<(), ApplianceError> {
        let collection = Self::kind_collection(ResourceKind::Monitor);
        self.delete_object(&collection, "monitor", name).await
    }

    async fn get_pool(&self, name: &str) -> Result<Option<Pool>, ApplianceError> {
        self.get_object("pool", "pool", name).await
    }

    async fn create_pool(&self, pool: &Pool) -> Result<(), ApplianceError> {
        self.create_object("pool", "pool", &pool.name, pool).await
    }

    async fn delete_pool(&self, name: &str) -> Result<(), ApplianceError> {
        self.delete_object("pool", "pool", name).await
    }

    async fn add_pool_member(&self, pool: &str, member: &str) -> Result<(), ApplianceError> {
        let request = ApplianceRequest::new("POST", &self.members_path(pool), "member", member);
        self.send(Method::POST, &request, Some(&MemberRef { name: member }))
            .await
            .map(|_| ())
    }

    async fn delete_pool_member(&self, pool: &str, member: &str) -> Result<(), ApplianceError> {
        let path = format!("{}/~{}~{member}", self.members_path(pool), self.partition);
        let request = ApplianceRequest::new("DELETE", &path, "member", member);
        self.send(Method::DELETE, &request, None::<&()>)
            .await
            .map(|_| ())
    }

    async fn get_node(&self, name: &str) -> Result<Option<ApplianceNode>, ApplianceError> {
        self.get_object("node", "node", name).await
    }

    async fn create_node(&self, node: &ApplianceNode) -> Result<(), ApplianceError> {
        self.create_object("node", "node", &node.name, node).await
    }

    async fn modify_node(&self, node: &ApplianceNode) -> Result<(), ApplianceError> {
        self.modify_object("node", "node", &node.name, node).await
    }

    async fn get_virtual_server(&self, name: &str) -> Result<Option<VirtualServer>, ApplianceError> {
        self.get_object("virtual", "virtualserver", name).await
    }

    async fn create_virtual_server(&self, server: &VirtualServer) -> Result<(), ApplianceError> {
        self.create_object("virtual", "virtualserver", &server.name, server)
            .await
    }

    async fn modify_virtual_server(&self, server: &VirtualServer) -> Result<(), ApplianceError> {
        self.modify_object("virtual", "virtualserver", &server.name, server)
            .await
    }

    async fn delete_virtual_server(&self, name: &str) -> Result<(), ApplianceError> {
        self.delete_object("virtual", "virtualserver", name).await
    }

    async fn list_names(&self, kind: ResourceKind) -> Result<Vec<String>, ApplianceError> {
        let path = Self::collection_path(&Self::kind_collection(kind));
        let request = ApplianceRequest::new("GET", &path, kind.as_str(), "*");
        let text = self.send(Method::GET, &request, None::<&()>).await?;
        let collection: Collection =
            serde_json::from_str(&text).map_err(|e| ApplianceError::Decode {
                path,
                reason: e.to_string(),
            })?;
        Ok(collection.items.into_iter().map(|item| item.name).collect())
    }
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod client_tests;

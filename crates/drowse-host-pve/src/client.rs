//! Proxmox VE REST client

use async_trait::async_trait;
use drowse_config::ApiConfig;
use drowse_host_api::{
    ApiError, ApiErrorKind, ApiResult, ClusterApi, NodeInfo, NodeStatus, Workload, WorkloadKind,
    WorkloadRef, format_tags,
};
use drowse_util::NodeName;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use std::collections::BTreeSet;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::wire::{self, GuestEntry, NodeEntry, NodeStatusEntry};

/// Cluster access through the Proxmox `api2/json` endpoints, authenticated
/// with an API token
pub struct PveClient {
    client: Client,
    base_url: String,
    auth_header: String,
}

impl PveClient {
    pub fn new(config: &ApiConfig) -> ApiResult<Self> {
        if !config.verify_ssl {
            warn!(host = %config.host, "TLS certificate verification disabled");
        }

        let client = Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(config.request_timeout)
            .danger_accept_invalid_certs(!config.verify_ssl)
            .build()
            .map_err(|e| ApiError::transport(format!("failed to build HTTP client: {}", e)))?;

        info!(
            base_url = %config.base_url(),
            user = %config.user,
            token = %config.token_name,
            "Proxmox client configured"
        );

        Ok(Self {
            client,
            base_url: config.base_url(),
            auth_header: config.auth_header(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder, path: &str) -> ApiResult<T> {
        let response = request
            .header(reqwest::header::AUTHORIZATION, &self.auth_header)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        let body = response.text().await.map_err(transport_error)?;

        if !status.is_success() {
            debug!(path = %path, status = status.as_u16(), "Proxmox API request failed");
            return Err(wire::status_error(status.as_u16(), &body));
        }

        wire::decode(&body)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> ApiResult<T> {
        self.send(self.client.get(self.url(path)), path).await
    }

    async fn list_guests(&self, node: &NodeName, kind: WorkloadKind) -> ApiResult<Vec<Workload>> {
        let path = format!("/nodes/{}/{}", node, kind.api_segment());
        let guests: Vec<GuestEntry> = self.get(&path).await?;
        guests.into_iter().map(|g| g.into_workload(kind)).collect()
    }
}

fn transport_error(e: reqwest::Error) -> ApiError {
    let kind = if e.is_timeout() {
        ApiErrorKind::Timeout
    } else if e.is_decode() {
        ApiErrorKind::Decode
    } else {
        ApiErrorKind::Transport
    };
    ApiError::new(kind, e.to_string())
}

fn guest_path(target: &WorkloadRef) -> String {
    format!(
        "/nodes/{}/{}/{}",
        target.node,
        target.kind.api_segment(),
        target.id
    )
}

#[async_trait]
impl ClusterApi for PveClient {
    async fn list_nodes(&self) -> ApiResult<Vec<NodeInfo>> {
        let nodes: Vec<NodeEntry> = self.get("/nodes").await?;
        Ok(nodes.into_iter().map(NodeInfo::from).collect())
    }

    async fn node_status(&self, node: &NodeName) -> ApiResult<NodeStatus> {
        let status: NodeStatusEntry = self.get(&format!("/nodes/{}/status", node)).await?;
        Ok(status.into())
    }

    async fn list_workloads(&self, node: &NodeName) -> ApiResult<Vec<Workload>> {
        let mut workloads = self.list_guests(node, WorkloadKind::Vm).await?;
        workloads.extend(self.list_guests(node, WorkloadKind::Container).await?);
        Ok(workloads)
    }

    async fn shutdown_workload(&self, target: &WorkloadRef, timeout: Duration) -> ApiResult<()> {
        let path = format!("{}/status/shutdown", guest_path(target));
        let timeout = timeout.as_secs().to_string();
        let _task: serde_json::Value = self
            .send(
                self.client
                    .post(self.url(&path))
                    .form(&[("timeout", timeout.as_str())]),
                &path,
            )
            .await?;
        Ok(())
    }

    async fn shutdown_node(&self, node: &NodeName) -> ApiResult<()> {
        let path = format!("/nodes/{}/status", node);
        let _: serde_json::Value = self
            .send(
                self.client
                    .post(self.url(&path))
                    .form(&[("command", "shutdown")]),
                &path,
            )
            .await?;
        Ok(())
    }

    async fn set_tags(&self, target: &WorkloadRef, tags: &BTreeSet<String>) -> ApiResult<()> {
        let path = format!("{}/config", guest_path(target));
        let tags = format_tags(tags);
        let _: serde_json::Value = self
            .send(
                self.client
                    .put(self.url(&path))
                    .form(&[("tags", tags.as_str())]),
                &path,
            )
            .await?;
        Ok(())
    }
}

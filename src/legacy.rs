use std::ops::RangeInclusive;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::api::{check_override, DucoApi};
use crate::protocol::{self, BOX_NODE_PARAMETERS, NODE_PARAMETERS};
use crate::transport::{Timeouts, Transport};
use crate::types::*;
use crate::Result;

/// Node ids probed during a scan: room sensors, then box-mounted sensors.
pub const NODE_SCAN_RANGES: [RangeInclusive<u8>; 2] = [2..=10, 50..=100];

/// Communication Print: flat JSON per endpoint, nodes addressed by `node=<id>`.
pub struct CommunicationPrintApi {
    transport: Transport,
}

impl CommunicationPrintApi {
    pub fn new(host: &str, http: reqwest::Client) -> Self {
        Self::from_transport(Transport::new(http, host, Timeouts::default()))
    }

    pub(crate) fn from_transport(transport: Transport) -> Self {
        Self { transport }
    }

    async fn get_box_info(&self) -> Result<Value> {
        let timeout = self.transport.timeouts().request;
        let (_, body) = self
            .transport
            .get(&protocol::legacy_node_info_path(BOX_NODE_ID), timeout)
            .await?
            .into_json()?;
        Ok(body)
    }

    async fn probe_node(&self, node_id: u8) -> Option<NodeData> {
        let timeout = self.transport.timeouts().scan;
        match self
            .transport
            .get(&protocol::legacy_node_info_path(node_id), timeout)
            .await
        {
            Ok(reply) if reply.is_ok() => protocol::parse_legacy_node(node_id, &reply.body),
            Ok(reply) => {
                debug!(node_id, status = reply.status, "no node at id");
                None
            }
            Err(e) => {
                debug!(node_id, "failed to get node: {e}");
                None
            }
        }
    }

    /// JSON body of a 200 reply, otherwise an empty object.
    async fn get_optional_object(&self, path: &str) -> Result<Value> {
        let timeout = self.transport.timeouts().request;
        let reply = self.transport.get(path, timeout).await?;
        if reply.is_ok() && reply.body.is_object() {
            Ok(reply.body)
        } else {
            debug!(path, status = reply.status, "config endpoint gave no data");
            Ok(json!({}))
        }
    }
}

#[async_trait]
impl DucoApi for CommunicationPrintApi {
    fn variant(&self) -> ApiVariant {
        ApiVariant::CommunicationPrint
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            energy: true,
            node_scan: true,
            node_config: true,
            node_override: true,
        }
    }

    async fn get_device_info(&self) -> Result<DeviceInfo> {
        let timeout = self.transport.timeouts().request;
        let (url, body) = self
            .transport
            .get(&protocol::legacy_node_info_path(BOX_NODE_ID), timeout)
            .await?
            .into_json()?;
        protocol::parse_legacy_device_info(&body, &url)
    }

    async fn get_data(&self, fetch_energy: bool, fetch_nodes: bool) -> Result<BoxSnapshot> {
        let body = self.get_box_info().await?;
        let mut snapshot = protocol::parse_legacy_snapshot(&body);

        if fetch_energy {
            snapshot.energy_info = match self.get_energy_info().await {
                Ok(energy) => energy,
                Err(e) => {
                    debug!("failed to get energy info: {e}");
                    None
                }
            };
        }
        if fetch_nodes {
            snapshot.nodes = self.get_nodes().await?;
        }
        Ok(snapshot)
    }

    async fn get_ventilation_state_options(&self) -> Result<Vec<String>> {
        Ok(protocol::legacy_state_labels())
    }

    async fn set_ventilation_state(&self, state: &str) -> Result<bool> {
        let timeout = self.transport.timeouts().request;
        let code = protocol::encode_legacy_state(state);
        self.transport
            .log_command("set_ventilation_state", Some(BOX_NODE_ID), &json!(code));

        let reply = self
            .transport
            .get(&protocol::legacy_set_state_path(BOX_NODE_ID, &code), timeout)
            .await?
            .require_success()?;
        Ok(reply.is_ok())
    }

    async fn get_energy_info(&self) -> Result<Option<EnergyInfo>> {
        let timeout = self.transport.timeouts().request;
        let (_, body) = self
            .transport
            .get(protocol::LEGACY_BOX_INFO_PATH, timeout)
            .await?
            .into_json()?;
        Ok(Some(protocol::parse_legacy_energy(&body)))
    }

    /// Probes every candidate id one at a time. A probe that errors, times
    /// out or lacks location/devtype is skipped; the scan itself never fails.
    async fn get_nodes(&self) -> Result<Vec<NodeData>> {
        let mut nodes = Vec::new();
        for range in NODE_SCAN_RANGES {
            for node_id in range {
                if let Some(node) = self.probe_node(node_id).await {
                    nodes.push(node);
                }
            }
        }
        debug!(count = nodes.len(), "node scan complete");
        Ok(nodes)
    }

    async fn get_node_config(&self, node_id: u8) -> Result<Option<NodeConfig>> {
        let mut config = NodeConfig::new(node_id);

        if node_id == BOX_NODE_ID {
            let node_data = self
                .get_optional_object(&protocol::legacy_node_config_path(node_id))
                .await?;
            let box_data = self
                .get_optional_object(protocol::LEGACY_BOX_CONFIG_PATH)
                .await?;
            let energy = box_data.get("Energy").cloned().unwrap_or_else(|| json!({}));

            protocol::fill_config(&mut config, &node_data, &NODE_PARAMETERS);
            protocol::fill_config(&mut config, &node_data, &BOX_NODE_PARAMETERS);
            let box_level: Vec<ConfigParameter> = ConfigParameter::ALL
                .into_iter()
                .filter(ConfigParameter::is_box_level)
                .collect();
            protocol::fill_config(&mut config, &energy, &box_level);
            config.location = node_data
                .get("Location")
                .and_then(|v| v.as_str())
                .map(str::to_string);
            return Ok(Some(config));
        }

        let timeout = self.transport.timeouts().request;
        let reply = self
            .transport
            .get(&protocol::legacy_node_config_path(node_id), timeout)
            .await?;
        if !reply.is_ok() {
            debug!(node_id, status = reply.status, "no config for node");
            return Ok(None);
        }

        protocol::fill_config(&mut config, &reply.body, &NODE_PARAMETERS);
        config.location = reply
            .body
            .get("Location")
            .and_then(|v| v.as_str())
            .map(str::to_string);
        Ok(Some(config))
    }

    /// Success is judged by HTTP 200 only; the device gives no payload to check.
    async fn set_node_config(&self, node_id: u8, parameter: ConfigParameter, value: i64) -> Result<bool> {
        let timeout = self.transport.timeouts().request;
        let path = if node_id == BOX_NODE_ID && parameter.is_box_level() {
            protocol::legacy_box_config_set_path(parameter, value)
        } else {
            protocol::legacy_node_config_set_path(node_id, parameter, value)
        };
        self.transport.log_command(
            &format!("set_config.{}", parameter.as_duco_str()),
            Some(node_id),
            &json!(value),
        );

        let reply = self.transport.get(&path, timeout).await?;
        if reply.is_ok() {
            debug!(node_id, parameter = parameter.as_duco_str(), value, "config written");
            Ok(true)
        } else {
            warn!(
                node_id,
                parameter = parameter.as_duco_str(),
                status = reply.status,
                "config write rejected"
            );
            Ok(false)
        }
    }

    async fn set_node_override(&self, node_id: u8, level: u8) -> Result<bool> {
        check_override(level)?;
        let timeout = self.transport.timeouts().request;
        self.transport
            .log_command("set_node_override", Some(node_id), &json!(level));

        let reply = self
            .transport
            .get(&protocol::legacy_set_override_path(node_id, level), timeout)
            .await?;
        if reply.is_ok() {
            debug!(node_id, level, "override set");
            Ok(true)
        } else {
            warn!(node_id, level, status = reply.status, "override rejected");
            Ok(false)
        }
    }
}

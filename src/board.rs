use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use crate::api::DucoApi;
use crate::protocol::{self, BOARD_INFO_FIELDS, BOX_LIVE_FIELDS, SET_VENTILATION_STATE};
use crate::transport::{Timeouts, Transport};
use crate::types::*;
use crate::Result;

/// Connectivity Board 2.0: hierarchical JSON under `/info` and `/action`.
///
/// Energy, node scanning and node configuration are not exposed by this
/// client yet. Those calls answer empty without touching the network.
pub struct ConnectivityBoardApi {
    transport: Transport,
}

impl ConnectivityBoardApi {
    pub fn new(host: &str, http: reqwest::Client) -> Self {
        Self::from_transport(Transport::new(http, host, Timeouts::default()))
    }

    pub(crate) fn from_transport(transport: Transport) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl DucoApi for ConnectivityBoardApi {
    fn variant(&self) -> ApiVariant {
        ApiVariant::ConnectivityBoard
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            energy: false,
            node_scan: false,
            node_config: false,
            node_override: false,
        }
    }

    async fn get_device_info(&self) -> Result<DeviceInfo> {
        let timeout = self.transport.timeouts().request;
        let (url, body) = self
            .transport
            .get(&protocol::info_path(BOARD_INFO_FIELDS), timeout)
            .await?
            .into_json()?;
        protocol::parse_board_device_info(&body, &url)
    }

    async fn get_data(&self, fetch_energy: bool, fetch_nodes: bool) -> Result<BoxSnapshot> {
        let timeout = self.transport.timeouts().request;
        let (_, body) = self
            .transport
            .get(&protocol::node_info_path(BOX_NODE_ID, BOX_LIVE_FIELDS), timeout)
            .await?
            .into_json()?;

        let mut snapshot = protocol::parse_board_snapshot(&body);
        if fetch_energy {
            snapshot.energy_info = self.get_energy_info().await?;
        }
        if fetch_nodes {
            snapshot.nodes = self.get_nodes().await?;
        }
        Ok(snapshot)
    }

    async fn get_ventilation_state_options(&self) -> Result<Vec<String>> {
        let timeout = self.transport.timeouts().request;
        let (url, body) = self
            .transport
            .get(
                &protocol::action_options_path(BOX_NODE_ID, SET_VENTILATION_STATE),
                timeout,
            )
            .await?
            .into_json()?;
        protocol::parse_state_options(&body, &url)
    }

    async fn set_ventilation_state(&self, state: &str) -> Result<bool> {
        let timeout = self.transport.timeouts().request;
        let payload = json!({"Action": SET_VENTILATION_STATE, "Val": state});
        self.transport
            .log_command("set_ventilation_state", Some(BOX_NODE_ID), &json!(state));

        let reply = self
            .transport
            .post_json(&protocol::action_path(BOX_NODE_ID), &payload, timeout)
            .await?
            .require_success()?;
        Ok(reply.body.get("Result").and_then(|r| r.as_str()) == Some("SUCCESS"))
    }

    async fn get_energy_info(&self) -> Result<Option<EnergyInfo>> {
        debug!("energy info not available on Connectivity Board API");
        Ok(None)
    }

    async fn get_nodes(&self) -> Result<Vec<NodeData>> {
        debug!("node discovery not available on Connectivity Board API");
        Ok(Vec::new())
    }

    async fn get_node_config(&self, node_id: u8) -> Result<Option<NodeConfig>> {
        debug!(node_id, "node config not available on Connectivity Board API");
        Ok(None)
    }

    async fn set_node_config(&self, node_id: u8, parameter: ConfigParameter, _value: i64) -> Result<bool> {
        debug!(
            node_id,
            parameter = parameter.as_duco_str(),
            "node config not available on Connectivity Board API"
        );
        Ok(false)
    }

    async fn set_node_override(&self, node_id: u8, level: u8) -> Result<bool> {
        debug!(node_id, level, "node override not available on Connectivity Board API");
        Ok(false)
    }
}

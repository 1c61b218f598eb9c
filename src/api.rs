use async_trait::async_trait;
use tracing::{debug, info};

use crate::board::ConnectivityBoardApi;
use crate::legacy::CommunicationPrintApi;
use crate::protocol;
use crate::transport::{Timeouts, Transport};
use crate::types::*;
use crate::{Error, Result};

/// Operations every protocol generation answers.
///
/// Optional features return `None`, an empty list or `Ok(false)` on a
/// variant that lacks them; [`DucoApi::capabilities`] says which ones
/// are real. Transport failures come back as `Error::Http`/`Error::Timeout`,
/// structurally incomplete answers as `Error::MissingField`.
#[async_trait]
pub trait DucoApi: Send + Sync {
    fn variant(&self) -> ApiVariant;

    fn capabilities(&self) -> Capabilities;

    async fn get_device_info(&self) -> Result<DeviceInfo>;

    /// Box-level live fields are always fetched; energy and nodes only on request.
    async fn get_data(&self, fetch_energy: bool, fetch_nodes: bool) -> Result<BoxSnapshot>;

    async fn get_ventilation_state_options(&self) -> Result<Vec<String>>;

    async fn set_ventilation_state(&self, state: &str) -> Result<bool>;

    async fn get_energy_info(&self) -> Result<Option<EnergyInfo>>;

    async fn get_nodes(&self) -> Result<Vec<NodeData>>;

    async fn get_node_config(&self, node_id: u8) -> Result<Option<NodeConfig>>;

    async fn set_node_config(&self, node_id: u8, parameter: ConfigParameter, value: i64) -> Result<bool>;

    /// `level` is a percentage 0-100, or [`CLEAR_OVERRIDE`].
    async fn set_node_override(&self, node_id: u8, level: u8) -> Result<bool>;
}

pub(crate) fn check_override(level: u8) -> Result<()> {
    if level <= 100 || level == CLEAR_OVERRIDE {
        Ok(())
    } else {
        Err(Error::InvalidOverride(level))
    }
}

/// Probe the device once and report which protocol it speaks.
///
/// Probe failures of any kind are only logged; the error is returned
/// when neither probe matches.
pub(crate) async fn detect_variant(transport: &Transport) -> Result<ApiVariant> {
    let timeout = transport.timeouts().probe;

    match transport.get(&protocol::info_path("BoxName"), timeout).await {
        Ok(reply) if reply.is_ok() && protocol::is_board_info(&reply.body) => {
            info!(host = transport.host(), "detected Connectivity Board 2.0 API");
            return Ok(ApiVariant::ConnectivityBoard);
        }
        Ok(reply) => debug!(status = reply.status, "Connectivity Board probe did not match"),
        Err(e) => debug!("Connectivity Board probe failed: {e}"),
    }

    match transport
        .get(&protocol::legacy_node_info_path(BOX_NODE_ID), timeout)
        .await
    {
        Ok(reply) if reply.is_ok() && protocol::is_legacy_node_info(&reply.body) => {
            info!(host = transport.host(), "detected Communication Print (legacy) API");
            return Ok(ApiVariant::CommunicationPrint);
        }
        Ok(reply) => debug!(status = reply.status, "Communication Print probe did not match"),
        Err(e) => debug!("Communication Print probe failed: {e}"),
    }

    Err(Error::UnknownVariant {
        host: transport.host().to_string(),
    })
}

pub(crate) fn bind(variant: ApiVariant, transport: Transport) -> Box<dyn DucoApi> {
    match variant {
        ApiVariant::ConnectivityBoard => Box::new(ConnectivityBoardApi::from_transport(transport)),
        ApiVariant::CommunicationPrint => Box::new(CommunicationPrintApi::from_transport(transport)),
    }
}

/// Detect the protocol spoken at `host` and return the matching client.
pub async fn detect_api(host: &str, http: reqwest::Client) -> Result<Box<dyn DucoApi>> {
    let transport = Transport::new(http, host, Timeouts::default());
    let variant = detect_variant(&transport).await?;
    Ok(bind(variant, transport))
}

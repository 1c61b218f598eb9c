use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::api::{bind, check_override, detect_variant, DucoApi};
use crate::diff::diff_snapshots;
use crate::logger::MessageLogMode;
use crate::transport::{Timeouts, Transport};
use crate::types::*;
use crate::{Error, Result};

type EventCallback = Box<dyn Fn(&Event) + Send + Sync>;
type SnapshotCallback = Box<dyn Fn(&BoxSnapshot) + Send + Sync>;

/// Refresh cadence. Box-level fields are fetched on every tick; nodes and
/// energy only once their own interval has elapsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    pub interval: Duration,
    pub nodes_after: Duration,
    pub energy_after: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(15),
            nodes_after: Duration::from_secs(9),
            energy_after: Duration::from_secs(60),
        }
    }
}

/// Last good result of each slow tier.
#[derive(Default)]
struct TierCache {
    nodes_fetched_at: Option<Instant>,
    nodes: Option<Vec<NodeData>>,
    energy_fetched_at: Option<Instant>,
    energy: Option<EnergyInfo>,
}

impl TierCache {
    fn due(last: Option<Instant>, now: Instant, after: Duration) -> bool {
        last.is_none_or(|at| now.duration_since(at) >= after)
    }

    fn merge(&mut self, snapshot: &mut BoxSnapshot, fetched_energy: bool, fetched_nodes: bool, now: Instant) {
        if fetched_energy {
            self.energy_fetched_at = Some(now);
            self.energy = snapshot.energy_info.clone();
        } else if let Some(energy) = &self.energy {
            snapshot.energy_info = Some(energy.clone());
        }

        if fetched_nodes {
            self.nodes_fetched_at = Some(now);
            self.nodes = Some(snapshot.nodes.clone());
        } else if let Some(nodes) = &self.nodes {
            snapshot.nodes = nodes.clone();
        }
    }
}

pub struct CoordinatorBuilder {
    host: String,
    timeouts: Timeouts,
    poll: PollSettings,
    http: Option<reqwest::Client>,
    api: Option<Box<dyn DucoApi>>,
    event_callbacks: Vec<EventCallback>,
    snapshot_callbacks: Vec<SnapshotCallback>,
    log_mode: Option<MessageLogMode>,
    log_path: Option<String>,
}

impl CoordinatorBuilder {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            timeouts: Timeouts::default(),
            poll: PollSettings::default(),
            http: None,
            api: None,
            event_callbacks: Vec::new(),
            snapshot_callbacks: Vec::new(),
            log_mode: None,
            log_path: None,
        }
    }

    pub fn timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn poll_settings(mut self, poll: PollSettings) -> Self {
        self.poll = poll;
        self
    }

    pub fn http_client(mut self, http: reqwest::Client) -> Self {
        self.http = Some(http);
        self
    }

    /// Use an already bound client instead of probing the host.
    pub fn api(mut self, api: Box<dyn DucoApi>) -> Self {
        self.api = Some(api);
        self
    }

    pub fn on_event(mut self, f: impl Fn(&Event) + Send + Sync + 'static) -> Self {
        self.event_callbacks.push(Box::new(f));
        self
    }

    pub fn on_snapshot(mut self, f: impl Fn(&BoxSnapshot) + Send + Sync + 'static) -> Self {
        self.snapshot_callbacks.push(Box::new(f));
        self
    }

    pub fn message_log(mut self, mode: MessageLogMode, path: impl Into<String>) -> Self {
        self.log_mode = Some(mode);
        self.log_path = Some(path.into());
        self
    }

    /// Detect the protocol, load identity and state options, and run the
    /// first refresh. Any failure here means the coordinator is not ready.
    pub async fn connect(self) -> Result<Coordinator> {
        let api = match self.api {
            Some(api) => api,
            None => {
                let http = match self.http {
                    Some(http) => http,
                    None => reqwest::Client::builder().build()?,
                };
                let mut transport = Transport::new(http, &self.host, self.timeouts);
                if let (Some(mode), Some(path)) = (self.log_mode, self.log_path) {
                    transport = transport.with_message_log(mode, &path)?;
                }
                let variant = detect_variant(&transport).await?;
                bind(variant, transport)
            }
        };

        let device_info = api
            .get_device_info()
            .await
            .map_err(|e| Error::Setup(Box::new(e)))?;
        let ventilation_state_options = api
            .get_ventilation_state_options()
            .await
            .map_err(|e| Error::Setup(Box::new(e)))?;
        info!(
            model = %device_info.model,
            serial = %device_info.serial_number,
            variant = ?api.variant(),
            "coordinator ready"
        );

        let (data, _) = watch::channel(None);
        let coordinator = Coordinator {
            api,
            poll: self.poll,
            device_info,
            ventilation_state_options,
            tiers: Mutex::new(TierCache::default()),
            data,
            configs: Mutex::new(HashMap::new()),
            last_update_success: AtomicBool::new(false),
            event_callbacks: self.event_callbacks,
            snapshot_callbacks: self.snapshot_callbacks,
        };

        coordinator
            .refresh()
            .await
            .map_err(|e| Error::Setup(Box::new(e)))?;
        Ok(coordinator)
    }
}

/// Owns one bound protocol client for its whole life and publishes merged
/// snapshots of the box.
///
/// Refreshes are serialized by the tier cache lock: a refresh requested by
/// a command waits for one already in flight.
pub struct Coordinator {
    api: Box<dyn DucoApi>,
    poll: PollSettings,
    device_info: DeviceInfo,
    ventilation_state_options: Vec<String>,
    tiers: Mutex<TierCache>,
    data: watch::Sender<Option<Arc<BoxSnapshot>>>,
    configs: Mutex<HashMap<u8, NodeConfig>>,
    last_update_success: AtomicBool,
    event_callbacks: Vec<EventCallback>,
    snapshot_callbacks: Vec<SnapshotCallback>,
}

impl Coordinator {
    pub fn builder(host: impl Into<String>) -> CoordinatorBuilder {
        CoordinatorBuilder::new(host)
    }

    pub fn device_info(&self) -> &DeviceInfo {
        &self.device_info
    }

    pub fn ventilation_state_options(&self) -> &[String] {
        &self.ventilation_state_options
    }

    pub fn api(&self) -> &dyn DucoApi {
        self.api.as_ref()
    }

    pub fn poll_settings(&self) -> PollSettings {
        self.poll
    }

    /// Latest published snapshot.
    pub fn data(&self) -> Option<Arc<BoxSnapshot>> {
        self.data.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<BoxSnapshot>>> {
        self.data.subscribe()
    }

    pub fn last_update_success(&self) -> bool {
        self.last_update_success.load(Ordering::Relaxed)
    }

    /// One refresh cycle. On failure the published snapshot and the tier
    /// caches are left untouched.
    pub async fn refresh(&self) -> Result<()> {
        let mut tiers = self.tiers.lock().await;
        let now = Instant::now();
        let fetch_nodes = TierCache::due(tiers.nodes_fetched_at, now, self.poll.nodes_after);
        let fetch_energy = TierCache::due(tiers.energy_fetched_at, now, self.poll.energy_after);
        trace!(fetch_nodes, fetch_energy, "refreshing");

        let mut snapshot = match self.api.get_data(fetch_energy, fetch_nodes).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                self.last_update_success.store(false, Ordering::Relaxed);
                if e.is_timeout() {
                    debug!("timeout fetching data from box: {e}");
                } else {
                    warn!("error fetching data from box, this may persist: {e}");
                }
                return Err(Error::UpdateFailed(Box::new(e)));
            }
        };

        tiers.merge(&mut snapshot, fetch_energy, fetch_nodes, now);
        self.publish(snapshot);
        self.last_update_success.store(true, Ordering::Relaxed);
        Ok(())
    }

    fn publish(&self, snapshot: BoxSnapshot) {
        let snapshot = Arc::new(snapshot);
        let previous = self.data.send_replace(Some(snapshot.clone()));

        let events = diff_snapshots(previous.as_deref(), &snapshot);
        for event in &events {
            trace!(?event, "state change");
            for cb in &self.event_callbacks {
                cb(event);
            }
        }
        for cb in &self.snapshot_callbacks {
            cb(snapshot.as_ref());
        }
    }

    async fn request_refresh(&self) {
        if let Err(e) = self.refresh().await {
            debug!("refresh after command failed: {e}");
        }
    }

    async fn run_command(
        &self,
        command: &'static str,
        value: String,
        call: impl Future<Output = Result<bool>>,
    ) -> Result<()> {
        match call.await {
            Ok(true) => {
                self.request_refresh().await;
                Ok(())
            }
            Ok(false) => Err(Error::CommandRejected { command, value }),
            Err(e) => Err(Error::CommandFailed {
                command,
                value,
                source: Box::new(e),
            }),
        }
    }

    pub async fn set_ventilation_state(&self, state: &str) -> Result<()> {
        self.run_command(
            "ventilation state",
            state.to_string(),
            self.api.set_ventilation_state(state),
        )
        .await
    }

    /// 0-100 %, or [`CLEAR_OVERRIDE`] to hand control back to the preset.
    pub async fn set_flow_override(&self, percentage: u8) -> Result<()> {
        check_override(percentage)?;
        self.run_command(
            "flow override",
            format!("{percentage}%"),
            self.api.set_node_override(BOX_NODE_ID, percentage),
        )
        .await
    }

    /// An active override outranks any preset, so it is cleared first.
    pub async fn set_preset_mode(&self, state: &str) -> Result<()> {
        if self.api.capabilities().node_override {
            self.set_flow_override(CLEAR_OVERRIDE).await?;
        }
        self.set_ventilation_state(state).await
    }

    pub async fn turn_on(&self, preset: Option<&str>, percentage: Option<u8>) -> Result<()> {
        match (preset, percentage) {
            (Some(preset), _) => self.set_preset_mode(preset).await,
            (None, Some(percentage)) => self.set_flow_override(percentage).await,
            (None, None) => self.set_ventilation_state(PRESET_AUTO).await,
        }
    }

    pub async fn turn_off(&self) -> Result<()> {
        self.set_ventilation_state(PRESET_AWAY).await
    }

    /// Cached configuration, fetched on first use.
    ///
    /// Config reads and writes share one lock, so a fetch that started
    /// before a write can never land after it.
    pub async fn node_config(&self, node_id: u8) -> Result<Option<NodeConfig>> {
        let mut configs = self.configs.lock().await;
        if let Some(config) = configs.get(&node_id) {
            return Ok(Some(config.clone()));
        }
        self.fetch_node_config(&mut configs, node_id).await
    }

    pub async fn refresh_node_config(&self, node_id: u8) -> Result<Option<NodeConfig>> {
        let mut configs = self.configs.lock().await;
        self.fetch_node_config(&mut configs, node_id).await
    }

    async fn fetch_node_config(
        &self,
        configs: &mut HashMap<u8, NodeConfig>,
        node_id: u8,
    ) -> Result<Option<NodeConfig>> {
        let fetched = self.api.get_node_config(node_id).await?;
        match &fetched {
            Some(config) => {
                configs.insert(node_id, config.clone());
            }
            None => {
                configs.remove(&node_id);
            }
        }
        Ok(fetched)
    }

    /// Write a tunable in raw device units. A value outside the cached
    /// bounds is refused before any request. On success the cached value is
    /// updated so reads reflect the write until the next fetch.
    pub async fn set_node_config(&self, node_id: u8, parameter: ConfigParameter, value: i64) -> Result<()> {
        let command = parameter.as_duco_str();
        let mut configs = self.configs.lock().await;
        if let Some(param) = configs.get(&node_id).and_then(|c| c.get(parameter))
            && !param.contains(value as f64)
        {
            return Err(Error::OutOfRange {
                parameter: command,
                value,
                min: param.min,
                max: param.max,
            });
        }

        match self.api.set_node_config(node_id, parameter, value).await {
            Ok(true) => {
                if let Some(config) = configs.get_mut(&node_id) {
                    config.apply_written(parameter, value as f64);
                }
                Ok(())
            }
            Ok(false) => Err(Error::CommandRejected {
                command,
                value: value.to_string(),
            }),
            Err(e) => Err(Error::CommandFailed {
                command,
                value: value.to_string(),
                source: Box::new(e),
            }),
        }
    }

    /// Write a tunable given in display units, e.g. degrees for
    /// [`ConfigParameter::ComfortTemperature`].
    pub async fn set_node_config_display(
        &self,
        node_id: u8,
        parameter: ConfigParameter,
        display: f64,
    ) -> Result<()> {
        let raw = match parameter.display_scale() {
            Some((divisor, offset)) => ConfigParam::unscale(display, divisor, offset),
            None => display,
        };
        self.set_node_config(node_id, parameter, raw.round() as i64)
            .await
    }

    pub async fn reset_filter(&self) -> Result<()> {
        self.set_node_config(BOX_NODE_ID, ConfigParameter::FilterReset, 1)
            .await
    }
}

/// Refresh on every [`PollSettings::interval`] until `cancel` fires.
///
/// Ticks run one after another, so a slow refresh delays the next tick
/// instead of overlapping it.
pub fn spawn_polling(coordinator: Arc<Coordinator>, cancel: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(coordinator.poll.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        interval.tick().await; // connect() already ran the first refresh

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                _ = interval.tick() => {
                    if let Err(e) = coordinator.refresh().await {
                        trace!("periodic refresh failed: {e}");
                    }
                }
            }
        }
        debug!("polling stopped");
    })
}

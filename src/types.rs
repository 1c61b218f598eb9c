use chrono::{DateTime, Utc};
use serde::Serialize;

/// Node id of the box itself on both protocol generations.
pub const BOX_NODE_ID: u8 = 1;

/// Override level that hands control back to the active preset.
pub const CLEAR_OVERRIDE: u8 = 255;

/// Mode reported while a manual flow override is in effect.
pub const OVERRIDE_MODE: &str = "EXTN";

pub const PRESET_AUTO: &str = "Auto";
pub const PRESET_AWAY: &str = "Away";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceInfo {
    pub model: String,
    pub api_version: String,
    pub serial_number: String,
    pub mac_address: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EnergyInfo {
    /// Outdoor air, °C.
    pub temp_oda: Option<f64>,
    /// Supply air, °C.
    pub temp_sup: Option<f64>,
    /// Extract air, °C.
    pub temp_eta: Option<f64>,
    /// Exhaust air, °C.
    pub temp_eha: Option<f64>,
    pub bypass_status: Option<i64>,
    /// Days until the filter needs replacing.
    pub filter_remaining_time: Option<i64>,
    pub supply_fan_speed: Option<i64>,
    pub supply_fan_pwm_percentage: Option<i64>,
    pub exhaust_fan_speed: Option<i64>,
    pub exhaust_fan_pwm_percentage: Option<i64>,
}

/// One networked sensor or actuator attached to the box.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NodeData {
    pub node_id: u8,
    pub location: String,
    pub devtype: String,
    pub temp: Option<f64>,
    pub co2: Option<i64>,
    pub rh: Option<f64>,
    pub state: Option<String>,
    pub mode: Option<String>,
    pub swversion: Option<String>,
    pub serialnb: Option<String>,
    pub error: Option<String>,
    pub ovrl: Option<i64>,
    /// Link type, `WI` (wired) or `RF` (radio).
    pub netw: Option<String>,
    pub cntdwn: Option<i64>,
    pub endtime: Option<i64>,
    /// Signal strength node to main.
    pub rssi_n2m: Option<i64>,
    /// Signal strength node to hop.
    pub rssi_n2h: Option<i64>,
    pub hop_via: Option<i64>,
    pub asso: Option<bool>,
    pub cerr: Option<i64>,
}

/// Live box state. A refresh always produces a whole new snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BoxSnapshot {
    pub state: Option<String>,
    pub time_state_remain: Option<i64>,
    pub time_state_end: Option<i64>,
    pub mode: Option<String>,
    pub flow_lvl_tgt: Option<i64>,
    pub rh: Option<f64>,
    pub iaq_rh: Option<f64>,
    pub energy_info: Option<EnergyInfo>,
    pub nodes: Vec<NodeData>,
}

impl BoxSnapshot {
    pub fn is_override_active(&self) -> bool {
        self.mode.as_deref() == Some(OVERRIDE_MODE)
    }

    /// The active preset, or `None` while a flow override is in effect.
    pub fn preset_mode(&self) -> Option<&str> {
        if self.is_override_active() {
            return None;
        }
        self.state.as_deref()
    }

    pub fn is_on(&self) -> bool {
        self.state.as_deref() != Some(PRESET_AWAY)
    }

    pub fn state_ends_at(&self) -> Option<DateTime<Utc>> {
        self.time_state_end
            .and_then(|ts| DateTime::from_timestamp(ts, 0))
    }

    pub fn node(&self, node_id: u8) -> Option<&NodeData> {
        self.nodes.iter().find(|n| n.node_id == node_id)
    }
}

/// A tunable as reported by the device. Bounds and increment are taken
/// verbatim and differ between parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ConfigParam {
    pub val: f64,
    pub min: f64,
    pub max: f64,
    pub inc: f64,
}

impl ConfigParam {
    /// Convert a raw device value to display units: `(raw - offset) / divisor`.
    pub fn scaled(&self, divisor: f64, offset: f64) -> ConfigParam {
        let conv = |raw: f64| (raw - offset) / divisor;
        ConfigParam {
            val: conv(self.val),
            min: conv(self.min),
            max: conv(self.max),
            inc: self.inc / divisor,
        }
    }

    /// Inverse of [`ConfigParam::scaled`] for a single value.
    pub fn unscale(display: f64, divisor: f64, offset: f64) -> f64 {
        display * divisor + offset
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ConfigParameter {
    Co2Setpoint,
    RhSetpoint,
    Manual1,
    Manual2,
    Manual3,
    ManualTimeout,
    TempDependent,
    RhDelta,
    SensorVisuLevel,
    AutoMin,
    AutoMax,
    Capacity,
    BypassMode,
    BypassAdaptive,
    ComfortTemperature,
    FilterReset,
    CalibPinMax,
    CalibPoutMax,
    CalibQout,
    ProgramModeZone1,
    ProgramModeZone2,
}

impl ConfigParameter {
    pub const ALL: [ConfigParameter; 21] = [
        ConfigParameter::Co2Setpoint,
        ConfigParameter::RhSetpoint,
        ConfigParameter::Manual1,
        ConfigParameter::Manual2,
        ConfigParameter::Manual3,
        ConfigParameter::ManualTimeout,
        ConfigParameter::TempDependent,
        ConfigParameter::RhDelta,
        ConfigParameter::SensorVisuLevel,
        ConfigParameter::AutoMin,
        ConfigParameter::AutoMax,
        ConfigParameter::Capacity,
        ConfigParameter::BypassMode,
        ConfigParameter::BypassAdaptive,
        ConfigParameter::ComfortTemperature,
        ConfigParameter::FilterReset,
        ConfigParameter::CalibPinMax,
        ConfigParameter::CalibPoutMax,
        ConfigParameter::CalibQout,
        ConfigParameter::ProgramModeZone1,
        ConfigParameter::ProgramModeZone2,
    ];

    pub fn as_duco_str(&self) -> &'static str {
        match self {
            ConfigParameter::Co2Setpoint => "CO2Setpoint",
            ConfigParameter::RhSetpoint => "RHSetpoint",
            ConfigParameter::Manual1 => "Manual1",
            ConfigParameter::Manual2 => "Manual2",
            ConfigParameter::Manual3 => "Manual3",
            ConfigParameter::ManualTimeout => "ManualTimeout",
            ConfigParameter::TempDependent => "TempDependent",
            ConfigParameter::RhDelta => "RHDelta",
            ConfigParameter::SensorVisuLevel => "SensorVisuLevel",
            ConfigParameter::AutoMin => "AutoMin",
            ConfigParameter::AutoMax => "AutoMax",
            ConfigParameter::Capacity => "Capacity",
            ConfigParameter::BypassMode => "BypassMode",
            ConfigParameter::BypassAdaptive => "BypassAdaptive",
            ConfigParameter::ComfortTemperature => "ComfortTemperature",
            ConfigParameter::FilterReset => "FilterReset",
            ConfigParameter::CalibPinMax => "CalibPinMax",
            ConfigParameter::CalibPoutMax => "CalibPoutMax",
            ConfigParameter::CalibQout => "CalibQout",
            ConfigParameter::ProgramModeZone1 => "ProgramModeZone1",
            ConfigParameter::ProgramModeZone2 => "ProgramModeZone2",
        }
    }

    pub fn from_duco_str(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.as_duco_str() == s)
    }

    /// `(divisor, offset)` between raw device units and display units.
    /// The comfort temperature is stored as deci-degrees plus 8.
    pub fn display_scale(&self) -> Option<(f64, f64)> {
        match self {
            ConfigParameter::ComfortTemperature => Some((10.0, 8.0)),
            _ => None,
        }
    }

    /// Parameters stored in the box's `Energy` module rather than on a node.
    pub fn is_box_level(&self) -> bool {
        matches!(
            self,
            ConfigParameter::BypassMode
                | ConfigParameter::BypassAdaptive
                | ConfigParameter::ComfortTemperature
                | ConfigParameter::FilterReset
                | ConfigParameter::CalibPinMax
                | ConfigParameter::CalibPoutMax
                | ConfigParameter::CalibQout
                | ConfigParameter::ProgramModeZone1
                | ConfigParameter::ProgramModeZone2
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NodeConfig {
    pub node_id: u8,
    pub co2_setpoint: Option<ConfigParam>,
    pub rh_setpoint: Option<ConfigParam>,
    pub manual1: Option<ConfigParam>,
    pub manual2: Option<ConfigParam>,
    pub manual3: Option<ConfigParam>,
    pub manual_timeout: Option<ConfigParam>,
    pub temp_dependent: Option<ConfigParam>,
    pub rh_delta: Option<ConfigParam>,
    pub sensor_visu_level: Option<ConfigParam>,
    pub auto_min: Option<ConfigParam>,
    pub auto_max: Option<ConfigParam>,
    pub capacity: Option<ConfigParam>,
    pub bypass_mode: Option<ConfigParam>,
    pub bypass_adaptive: Option<ConfigParam>,
    pub comfort_temperature: Option<ConfigParam>,
    pub filter_reset: Option<ConfigParam>,
    pub calib_pin_max: Option<ConfigParam>,
    pub calib_pout_max: Option<ConfigParam>,
    pub calib_qout: Option<ConfigParam>,
    pub program_mode_zone1: Option<ConfigParam>,
    pub program_mode_zone2: Option<ConfigParam>,
    pub location: Option<String>,
}

impl NodeConfig {
    pub fn new(node_id: u8) -> Self {
        Self {
            node_id,
            ..Default::default()
        }
    }

    pub fn get(&self, param: ConfigParameter) -> Option<&ConfigParam> {
        self.slot(param).as_ref()
    }

    pub fn set(&mut self, param: ConfigParameter, value: Option<ConfigParam>) {
        *self.slot_mut(param) = value;
    }

    /// Record a successful write so reads reflect it until the next fetch.
    /// The parameter in display units.
    pub fn display(&self, param: ConfigParameter) -> Option<ConfigParam> {
        let raw = self.get(param)?;
        Some(match param.display_scale() {
            Some((divisor, offset)) => raw.scaled(divisor, offset),
            None => *raw,
        })
    }

    pub(crate) fn apply_written(&mut self, param: ConfigParameter, value: f64) {
        if let Some(p) = self.slot_mut(param) {
            p.val = value;
        }
    }

    fn slot(&self, param: ConfigParameter) -> &Option<ConfigParam> {
        match param {
            ConfigParameter::Co2Setpoint => &self.co2_setpoint,
            ConfigParameter::RhSetpoint => &self.rh_setpoint,
            ConfigParameter::Manual1 => &self.manual1,
            ConfigParameter::Manual2 => &self.manual2,
            ConfigParameter::Manual3 => &self.manual3,
            ConfigParameter::ManualTimeout => &self.manual_timeout,
            ConfigParameter::TempDependent => &self.temp_dependent,
            ConfigParameter::RhDelta => &self.rh_delta,
            ConfigParameter::SensorVisuLevel => &self.sensor_visu_level,
            ConfigParameter::AutoMin => &self.auto_min,
            ConfigParameter::AutoMax => &self.auto_max,
            ConfigParameter::Capacity => &self.capacity,
            ConfigParameter::BypassMode => &self.bypass_mode,
            ConfigParameter::BypassAdaptive => &self.bypass_adaptive,
            ConfigParameter::ComfortTemperature => &self.comfort_temperature,
            ConfigParameter::FilterReset => &self.filter_reset,
            ConfigParameter::CalibPinMax => &self.calib_pin_max,
            ConfigParameter::CalibPoutMax => &self.calib_pout_max,
            ConfigParameter::CalibQout => &self.calib_qout,
            ConfigParameter::ProgramModeZone1 => &self.program_mode_zone1,
            ConfigParameter::ProgramModeZone2 => &self.program_mode_zone2,
        }
    }

    fn slot_mut(&mut self, param: ConfigParameter) -> &mut Option<ConfigParam> {
        match param {
            ConfigParameter::Co2Setpoint => &mut self.co2_setpoint,
            ConfigParameter::RhSetpoint => &mut self.rh_setpoint,
            ConfigParameter::Manual1 => &mut self.manual1,
            ConfigParameter::Manual2 => &mut self.manual2,
            ConfigParameter::Manual3 => &mut self.manual3,
            ConfigParameter::ManualTimeout => &mut self.manual_timeout,
            ConfigParameter::TempDependent => &mut self.temp_dependent,
            ConfigParameter::RhDelta => &mut self.rh_delta,
            ConfigParameter::SensorVisuLevel => &mut self.sensor_visu_level,
            ConfigParameter::AutoMin => &mut self.auto_min,
            ConfigParameter::AutoMax => &mut self.auto_max,
            ConfigParameter::Capacity => &mut self.capacity,
            ConfigParameter::BypassMode => &mut self.bypass_mode,
            ConfigParameter::BypassAdaptive => &mut self.bypass_adaptive,
            ConfigParameter::ComfortTemperature => &mut self.comfort_temperature,
            ConfigParameter::FilterReset => &mut self.filter_reset,
            ConfigParameter::CalibPinMax => &mut self.calib_pin_max,
            ConfigParameter::CalibPoutMax => &mut self.calib_pout_max,
            ConfigParameter::CalibQout => &mut self.calib_qout,
            ConfigParameter::ProgramModeZone1 => &mut self.program_mode_zone1,
            ConfigParameter::ProgramModeZone2 => &mut self.program_mode_zone2,
        }
    }
}

/// Which protocol generation a device speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ApiVariant {
    /// Connectivity Board 2.0 (`/info`, `/action`).
    ConnectivityBoard,
    /// Communication Print (`/nodeinfoget` and friends).
    CommunicationPrint,
}

/// Which optional operations a variant actually implements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Capabilities {
    pub energy: bool,
    pub node_scan: bool,
    pub node_config: bool,
    pub node_override: bool,
}

/// Events emitted when a published snapshot differs from the previous one.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    StateChanged { state: Option<String> },
    ModeChanged { mode: Option<String> },
    FlowTargetChanged { percentage: Option<i64> },
    HumidityChanged { rh: Option<f64> },
    EnergyChanged { energy: EnergyInfo },

    NodeAppeared { node_id: u8, location: String, devtype: String },
    NodeDisappeared { node_id: u8 },
    NodeTemperatureChanged { node_id: u8, location: String, temp: Option<f64> },
    NodeCo2Changed { node_id: u8, location: String, co2: Option<i64> },
    NodeHumidityChanged { node_id: u8, location: String, rh: Option<f64> },
}

use serde_json::Value;

use crate::types::*;
use crate::{Error, Result};

// Connectivity Board 2.0

pub const BOARD_INFO_FIELDS: &str = "BoxName,PublicApiVersion,SerialDucoBox,Mac";
pub const BOX_LIVE_FIELDS: &str = "State,TimeStateRemain,TimeStateEnd,Mode,FlowLvlTgt,Rh,IaqRh";
pub const SET_VENTILATION_STATE: &str = "SetVentilationState";

pub fn info_path(fields: &str) -> String {
    format!("/info?parameter={fields}")
}

pub fn node_info_path(node_id: u8, fields: &str) -> String {
    format!("/info/nodes/{node_id}?parameter={fields}")
}

pub fn action_path(node_id: u8) -> String {
    format!("/action/nodes/{node_id}")
}

pub fn action_options_path(node_id: u8, action: &str) -> String {
    format!("/action/nodes/{node_id}?action={action}")
}

// Communication Print

pub fn legacy_node_info_path(node_id: u8) -> String {
    format!("/nodeinfoget?node={node_id}")
}

pub fn legacy_set_state_path(node_id: u8, code: &str) -> String {
    format!("/nodesetoperstate?node={node_id}&value={code}")
}

pub fn legacy_set_override_path(node_id: u8, level: u8) -> String {
    format!("/nodesetoverrule?node={node_id}&value={level}")
}

pub const LEGACY_BOX_INFO_PATH: &str = "/boxinfoget";
pub const LEGACY_BOX_CONFIG_PATH: &str = "/boxconfigget";

pub fn legacy_node_config_path(node_id: u8) -> String {
    format!("/nodeconfigget?node={node_id}")
}

pub fn legacy_node_config_set_path(node_id: u8, param: ConfigParameter, value: i64) -> String {
    format!(
        "/nodeconfigset?node={node_id}&para={}&value={value}",
        param.as_duco_str()
    )
}

pub fn legacy_box_config_set_path(param: ConfigParameter, value: i64) -> String {
    format!(
        "/boxconfigset?mod=Energy&para={}&value={value}",
        param.as_duco_str()
    )
}

/// Four-character legacy state codes and their display labels, in the
/// order the box offers them.
pub const LEGACY_STATES: [(&str, &str); 8] = [
    ("AUTO", "Auto"),
    ("MAN1", "Manual 1"),
    ("CNT1", "Manual 1 Forced"),
    ("MAN2", "Manual 2"),
    ("CNT2", "Manual 2 Forced"),
    ("MAN3", "Manual 3"),
    ("CNT3", "Manual 3 Forced"),
    ("EMPT", "Away"),
];

/// Code to label. Unknown codes pass through unchanged.
pub fn decode_legacy_state(code: &str) -> String {
    LEGACY_STATES
        .iter()
        .find(|(c, _)| *c == code)
        .map_or(code, |(_, label)| *label)
        .to_string()
}

/// Label to code. Unknown labels pass through unchanged.
pub fn encode_legacy_state(label: &str) -> String {
    LEGACY_STATES
        .iter()
        .find(|(_, l)| *l == label)
        .map_or(label, |(code, _)| *code)
        .to_string()
}

pub fn legacy_state_labels() -> Vec<String> {
    LEGACY_STATES.iter().map(|(_, l)| l.to_string()).collect()
}

fn as_i64(v: &Value) -> Option<i64> {
    match v {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn as_f64(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn as_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn int_field(data: &Value, key: &str) -> Option<i64> {
    data.get(key).and_then(as_i64)
}

fn float_field(data: &Value, key: &str) -> Option<f64> {
    data.get(key).and_then(as_f64)
}

fn string_field(data: &Value, key: &str) -> Option<String> {
    data.get(key).and_then(as_string)
}

fn non_empty_string(data: &Value, key: &str) -> Option<String> {
    string_field(data, key).filter(|s| !s.is_empty())
}

/// `General.Board.BoxName` style lookup of a `{"Val": ...}` leaf.
fn board_val<'a>(data: &'a Value, section: &str, group: &str, key: &str) -> Option<&'a Value> {
    data.get(section)?
        .get(group)?
        .get(key)?
        .get("Val")
        .filter(|v| !v.is_null())
}

fn required_board_val(
    data: &Value,
    group: &str,
    key: &'static str,
    url: &str,
) -> Result<String> {
    board_val(data, "General", group, key)
        .and_then(as_string)
        .ok_or_else(|| Error::MissingField {
            field: key,
            url: url.to_string(),
        })
}

/// Title-case words the way the box names are shown to users:
/// `DUCOBOX_FOCUS` becomes `Ducobox Focus`.
pub fn display_name(raw: &str) -> String {
    raw.replace('_', " ")
        .split(' ')
        .map(|word| {
            let mut out = String::with_capacity(word.len());
            let mut at_start = true;
            for ch in word.chars() {
                if ch.is_alphabetic() {
                    if at_start {
                        out.extend(ch.to_uppercase());
                    } else {
                        out.extend(ch.to_lowercase());
                    }
                    at_start = false;
                } else {
                    out.push(ch);
                    at_start = true;
                }
            }
            out
        })
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn parse_board_device_info(data: &Value, url: &str) -> Result<DeviceInfo> {
    let model = required_board_val(data, "Board", "BoxName", url)?;
    let api_version = required_board_val(data, "Board", "PublicApiVersion", url)?;
    let serial_number = required_board_val(data, "Board", "SerialDucoBox", url)?;
    let mac = required_board_val(data, "Lan", "Mac", url)?;

    Ok(DeviceInfo {
        model: display_name(&model),
        api_version,
        serial_number,
        mac_address: Some(mac),
    })
}

/// Box-level live fields from `/info/nodes/1`. Energy and nodes are left empty.
pub fn parse_board_snapshot(data: &Value) -> BoxSnapshot {
    let leaf = |section: &str, key: &str| -> Option<Value> {
        data.get(section)?.get(key)?.get("Val").cloned()
    };

    BoxSnapshot {
        state: leaf("Ventilation", "State").as_ref().and_then(as_string),
        time_state_remain: leaf("Ventilation", "TimeStateRemain").as_ref().and_then(as_i64),
        time_state_end: leaf("Ventilation", "TimeStateEnd").as_ref().and_then(as_i64),
        mode: leaf("Ventilation", "Mode").as_ref().and_then(as_string),
        flow_lvl_tgt: leaf("Ventilation", "FlowLvlTgt").as_ref().and_then(as_i64),
        rh: leaf("Sensor", "Rh").as_ref().and_then(as_f64),
        iaq_rh: leaf("Sensor", "IaqRh").as_ref().and_then(as_f64),
        energy_info: None,
        nodes: Vec::new(),
    }
}

pub fn parse_state_options(data: &Value, url: &str) -> Result<Vec<String>> {
    let missing = || Error::MissingField {
        field: "Actions.Enum",
        url: url.to_string(),
    };
    let first = match data.get("Actions") {
        Some(Value::Array(actions)) => actions.first().ok_or_else(missing)?,
        _ => return Err(missing()),
    };
    let options: Vec<String> = match first.get("Enum") {
        Some(Value::Array(values)) => values.iter().filter_map(as_string).collect(),
        _ => return Err(missing()),
    };
    if options.is_empty() {
        return Err(missing());
    }
    Ok(options)
}

pub fn is_board_info(data: &Value) -> bool {
    data.get("General")
        .and_then(|g| g.get("Board"))
        .is_some()
}

pub fn is_legacy_node_info(data: &Value) -> bool {
    data.get("devtype").is_some() && data.get("state").is_some()
}

pub fn parse_legacy_device_info(data: &Value, url: &str) -> Result<DeviceInfo> {
    let serial_number = string_field(data, "serialnb").ok_or_else(|| Error::MissingField {
        field: "serialnb",
        url: url.to_string(),
    })?;
    let devtype = string_field(data, "devtype").unwrap_or_else(|| "Unknown".to_string());
    let location = string_field(data, "location").unwrap_or_default();
    let api_version = non_empty_string(data, "swversion").unwrap_or_else(|| "Legacy".to_string());

    Ok(DeviceInfo {
        model: display_name(format!("{devtype} {location}").trim()),
        api_version,
        serial_number,
        mac_address: None,
    })
}

/// Humidity of zero or below means the sensor is not fitted.
fn legacy_humidity(data: &Value) -> Option<f64> {
    float_field(data, "rh").filter(|rh| *rh > 0.0)
}

/// Tenths of a degree. Zero cannot be told apart from a missing field.
fn legacy_deci_degrees(data: &Value, key: &str) -> Option<f64> {
    float_field(data, key)
        .filter(|t| *t != 0.0)
        .map(|t| t / 10.0)
}

pub fn parse_legacy_snapshot(data: &Value) -> BoxSnapshot {
    BoxSnapshot {
        state: string_field(data, "state").map(|s| decode_legacy_state(&s)),
        time_state_remain: int_field(data, "cntdwn"),
        time_state_end: int_field(data, "endtime"),
        mode: string_field(data, "mode"),
        flow_lvl_tgt: int_field(data, "trgt"),
        rh: legacy_humidity(data),
        iaq_rh: None,
        energy_info: None,
        nodes: Vec::new(),
    }
}

/// A scanned id only counts as a node when it reports both a location and
/// a device type.
pub fn parse_legacy_node(node_id: u8, data: &Value) -> Option<NodeData> {
    let location = non_empty_string(data, "location")?;
    let devtype = non_empty_string(data, "devtype")?;

    Some(NodeData {
        node_id,
        location,
        devtype,
        temp: float_field(data, "temp").filter(|t| *t != 0.0),
        co2: int_field(data, "co2"),
        rh: legacy_humidity(data),
        state: string_field(data, "state"),
        mode: string_field(data, "mode"),
        swversion: string_field(data, "swversion"),
        serialnb: string_field(data, "serialnb"),
        error: string_field(data, "error"),
        ovrl: int_field(data, "ovrl"),
        netw: string_field(data, "netw"),
        cntdwn: int_field(data, "cntdwn"),
        endtime: int_field(data, "endtime"),
        rssi_n2m: int_field(data, "rssi_n2m"),
        rssi_n2h: int_field(data, "rssi_n2h"),
        hop_via: int_field(data, "hop_via"),
        asso: int_field(data, "asso").map(|a| a != 0),
        cerr: int_field(data, "cerr"),
    })
}

pub fn parse_legacy_energy(data: &Value) -> EnergyInfo {
    let empty = Value::Null;
    let energy = data.get("EnergyInfo").unwrap_or(&empty);
    let fan = data.get("EnergyFan").unwrap_or(&empty);

    EnergyInfo {
        temp_oda: legacy_deci_degrees(energy, "TempODA"),
        temp_sup: legacy_deci_degrees(energy, "TempSUP"),
        temp_eta: legacy_deci_degrees(energy, "TempETA"),
        temp_eha: legacy_deci_degrees(energy, "TempEHA"),
        bypass_status: int_field(energy, "BypassStatus"),
        filter_remaining_time: int_field(energy, "FilterRemainingTime"),
        supply_fan_speed: int_field(fan, "SupplyFanSpeed"),
        supply_fan_pwm_percentage: int_field(fan, "SupplyFanPwmPercentage"),
        exhaust_fan_speed: int_field(fan, "ExhaustFanSpeed"),
        exhaust_fan_pwm_percentage: int_field(fan, "ExhaustFanPwmPercentage"),
    }
}

/// `{"Val": .., "Min": .., "Max": .., "Inc": ..}` under `key`.
pub fn parse_config_param(data: &Value, key: &str) -> Option<ConfigParam> {
    let obj = data.get(key).filter(|v| v.is_object())?;
    Some(ConfigParam {
        val: float_field(obj, "Val").unwrap_or(0.0),
        min: float_field(obj, "Min").unwrap_or(0.0),
        max: float_field(obj, "Max").unwrap_or(0.0),
        inc: float_field(obj, "Inc").unwrap_or(1.0),
    })
}

/// Tunables every node exposes through `/nodeconfigget`.
pub const NODE_PARAMETERS: [ConfigParameter; 9] = [
    ConfigParameter::Co2Setpoint,
    ConfigParameter::RhSetpoint,
    ConfigParameter::Manual1,
    ConfigParameter::Manual2,
    ConfigParameter::Manual3,
    ConfigParameter::ManualTimeout,
    ConfigParameter::TempDependent,
    ConfigParameter::RhDelta,
    ConfigParameter::SensorVisuLevel,
];

/// Extra `/nodeconfigget` tunables only read for the box itself.
pub const BOX_NODE_PARAMETERS: [ConfigParameter; 3] = [
    ConfigParameter::AutoMin,
    ConfigParameter::AutoMax,
    ConfigParameter::Capacity,
];

/// Copy every parameter in `params` that `data` carries. Unknown keys and
/// parameters outside `params` are ignored.
pub fn fill_config(config: &mut NodeConfig, data: &Value, params: &[ConfigParameter]) {
    let Some(obj) = data.as_object() else {
        return;
    };
    for key in obj.keys() {
        if let Some(param) = ConfigParameter::from_duco_str(key)
            && params.contains(&param)
        {
            config.set(param, parse_config_param(data, key));
        }
    }
}

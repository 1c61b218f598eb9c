use serde_json::Value;

use crate::types::*;

/// Collect `(path, old, new)` for every leaf of `current` that differs from
/// `previous`. Keys that vanished from `current` are not reported.
pub(crate) fn diff_json(
    previous: &Value,
    current: &Value,
    path_prefix: &str,
    changes: &mut Vec<(String, Value, Value)>,
) {
    match (previous, current) {
        (Value::Object(prev_map), Value::Object(curr_map)) => {
            for (key, curr_val) in curr_map {
                let path = if path_prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{path_prefix}.{key}")
                };
                match prev_map.get(key) {
                    Some(prev_val) => diff_json(prev_val, curr_val, &path, changes),
                    None => {
                        if curr_val.is_object() {
                            diff_json(&Value::Object(serde_json::Map::new()), curr_val, &path, changes);
                        } else {
                            changes.push((path, Value::Null, curr_val.clone()));
                        }
                    }
                }
            }
        }
        (prev, curr) if prev != curr => {
            changes.push((path_prefix.to_string(), prev.clone(), curr.clone()));
        }
        _ => {}
    }
}

/// Typed change events between two published snapshots. With no previous
/// snapshot every populated field and node is reported once.
pub(crate) fn diff_snapshots(previous: Option<&BoxSnapshot>, current: &BoxSnapshot) -> Vec<Event> {
    let empty = BoxSnapshot::default();
    let prev = previous.unwrap_or(&empty);
    let mut events = Vec::new();

    if prev.state != current.state {
        events.push(Event::StateChanged {
            state: current.state.clone(),
        });
    }
    if prev.mode != current.mode {
        events.push(Event::ModeChanged {
            mode: current.mode.clone(),
        });
    }
    if prev.flow_lvl_tgt != current.flow_lvl_tgt {
        events.push(Event::FlowTargetChanged {
            percentage: current.flow_lvl_tgt,
        });
    }
    if prev.rh != current.rh {
        events.push(Event::HumidityChanged { rh: current.rh });
    }
    if let Some(energy) = &current.energy_info
        && prev.energy_info.as_ref() != Some(energy)
    {
        events.push(Event::EnergyChanged {
            energy: energy.clone(),
        });
    }

    for node in &current.nodes {
        let Some(old) = prev.node(node.node_id) else {
            events.push(Event::NodeAppeared {
                node_id: node.node_id,
                location: node.location.clone(),
                devtype: node.devtype.clone(),
            });
            continue;
        };
        if old.temp != node.temp {
            events.push(Event::NodeTemperatureChanged {
                node_id: node.node_id,
                location: node.location.clone(),
                temp: node.temp,
            });
        }
        if old.co2 != node.co2 {
            events.push(Event::NodeCo2Changed {
                node_id: node.node_id,
                location: node.location.clone(),
                co2: node.co2,
            });
        }
        if old.rh != node.rh {
            events.push(Event::NodeHumidityChanged {
                node_id: node.node_id,
                location: node.location.clone(),
                rh: node.rh,
            });
        }
    }

    for old in &prev.nodes {
        if current.node(old.node_id).is_none() {
            events.push(Event::NodeDisappeared {
                node_id: old.node_id,
            });
        }
    }

    events
}

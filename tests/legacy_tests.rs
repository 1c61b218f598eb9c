use std::time::Duration;

use ducobox::{
    CommunicationPrintApi, ConfigParameter, DucoApi, Error, CLEAR_OVERRIDE, LEGACY_STATES,
};
use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn api_for(server: &MockServer) -> CommunicationPrintApi {
    let addr = server.address();
    CommunicationPrintApi::new(&format!("{}:{}", addr.ip(), addr.port()), reqwest::Client::new())
}

async fn mount_node(server: &MockServer, node: &str, body: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path("/nodeinfoget"))
        .and(query_param("node", node))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

#[tokio::test]
async fn get_data_translates_state_and_fields() {
    let server = MockServer::start().await;
    mount_node(
        &server,
        "1",
        json!({"state": "MAN2", "mode": "AUTO", "trgt": 45, "rh": 38,
               "cntdwn": 120, "endtime": 1700000000, "devtype": "BOX"}),
    )
    .await;

    let snap = api_for(&server).get_data(false, false).await.unwrap();
    assert_eq!(snap.state.as_deref(), Some("Manual 2"));
    assert_eq!(snap.flow_lvl_tgt, Some(45));
    assert_eq!(snap.rh, Some(38.0));
    assert_eq!(snap.time_state_remain, Some(120));
    assert_eq!(snap.time_state_end, Some(1_700_000_000));
    assert!(snap.energy_info.is_none());
    assert!(snap.nodes.is_empty());
}

#[tokio::test]
async fn get_data_skips_sub_fetches_when_not_requested() {
    let server = MockServer::start().await;
    mount_node(&server, "1", json!({"state": "AUTO", "devtype": "BOX"})).await;
    Mock::given(method("GET"))
        .and(path("/boxinfoget"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(0)
        .mount(&server)
        .await;

    api_for(&server).get_data(false, false).await.unwrap();
}

#[tokio::test]
async fn get_data_box_humidity_zero_is_absent() {
    let server = MockServer::start().await;
    mount_node(&server, "1", json!({"state": "EMPT", "rh": 0, "devtype": "BOX"})).await;

    let snap = api_for(&server).get_data(false, false).await.unwrap();
    assert_eq!(snap.state.as_deref(), Some("Away"));
    assert_eq!(snap.rh, None);
}

#[tokio::test]
async fn get_data_http_error_is_status_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/nodeinfoget"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let err = api_for(&server).get_data(false, false).await.unwrap_err();
    assert!(matches!(err, Error::Status { status: 503, .. }), "got {err:?}");
}

#[tokio::test]
async fn energy_info_decodes_tenths_of_degrees() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/boxinfoget"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "EnergyInfo": {"TempODA": 85, "TempSUP": 198, "TempETA": 0, "TempEHA": -12,
                           "BypassStatus": 0, "FilterRemainingTime": 120},
            "EnergyFan": {"SupplyFanSpeed": 1200, "SupplyFanPwmPercentage": 31,
                          "ExhaustFanSpeed": 1180, "ExhaustFanPwmPercentage": 30}
        })))
        .mount(&server)
        .await;

    let energy = api_for(&server).get_energy_info().await.unwrap().unwrap();
    assert_eq!(energy.temp_oda, Some(8.5));
    assert_eq!(energy.temp_sup, Some(19.8));
    assert_eq!(energy.temp_eta, None);
    assert_eq!(energy.temp_eha, Some(-1.2));
    assert_eq!(energy.bypass_status, Some(0));
    assert_eq!(energy.filter_remaining_time, Some(120));
    assert_eq!(energy.supply_fan_speed, Some(1200));
    assert_eq!(energy.exhaust_fan_pwm_percentage, Some(30));
}

#[tokio::test]
async fn get_data_tolerates_failing_energy_endpoint() {
    let server = MockServer::start().await;
    mount_node(&server, "1", json!({"state": "AUTO", "devtype": "BOX"})).await;
    Mock::given(method("GET"))
        .and(path("/boxinfoget"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let snap = api_for(&server).get_data(true, false).await.unwrap();
    assert_eq!(snap.state.as_deref(), Some("Auto"));
    assert!(snap.energy_info.is_none());
}

#[tokio::test]
async fn node_scan_survives_failures_and_filters_incomplete_nodes() {
    let server = MockServer::start().await;
    mount_node(&server, "2", json!({"location": "Bedroom", "devtype": "UCCO2", "co2": 640})).await;
    Mock::given(method("GET"))
        .and(path("/nodeinfoget"))
        .and(query_param("node", "7"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    mount_node(&server, "8", json!({"location": "Bathroom", "devtype": "UCRH", "rh": 61.5})).await;
    mount_node(&server, "9", json!({"devtype": "UCRH"})).await;
    mount_node(&server, "10", json!({"location": "Attic"})).await;
    mount_node(&server, "67", json!({"location": "Box", "devtype": "UCRH", "rh": 0, "temp": 0})).await;
    mount_node(&server, "100", json!({"location": "Last", "devtype": "VLV"})).await;
    // Outside the scanned ranges.
    mount_node(&server, "11", json!({"location": "Ghost", "devtype": "UCCO2"})).await;
    mount_node(&server, "49", json!({"location": "Ghost", "devtype": "UCCO2"})).await;

    let nodes = api_for(&server).get_nodes().await.unwrap();
    let ids: Vec<u8> = nodes.iter().map(|n| n.node_id).collect();
    assert_eq!(ids, vec![2, 8, 67, 100]);

    assert_eq!(nodes[0].co2, Some(640));
    assert_eq!(nodes[1].rh, Some(61.5));
    assert_eq!(nodes[2].rh, None);
    assert_eq!(nodes[2].temp, None);
}

#[tokio::test]
async fn node_scan_probes_every_candidate_once() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/nodeinfoget"))
        .respond_with(ResponseTemplate::new(404))
        .expect(9 + 51)
        .mount(&server)
        .await;

    let nodes = api_for(&server).get_nodes().await.unwrap();
    assert!(nodes.is_empty());
}

#[tokio::test]
async fn node_scan_skips_slow_probes() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/nodeinfoget"))
        .and(query_param("node", "3"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"location": "Slow", "devtype": "UCCO2"}))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;
    mount_node(&server, "4", json!({"location": "Fast", "devtype": "UCCO2"})).await;

    let nodes = api_for(&server).get_nodes().await.unwrap();
    let ids: Vec<u8> = nodes.iter().map(|n| n.node_id).collect();
    assert_eq!(ids, vec![4]);
}

#[tokio::test]
async fn set_state_sends_legacy_code() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/nodesetoperstate"))
        .and(query_param("node", "1"))
        .and(query_param("value", "CNT3"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    assert!(api_for(&server).set_ventilation_state("Manual 3 Forced").await.unwrap());
}

#[tokio::test]
async fn set_state_passes_unknown_label_through() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/nodesetoperstate"))
        .and(query_param("value", "MAN1"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    assert!(api_for(&server).set_ventilation_state("MAN1").await.unwrap());
}

#[tokio::test]
async fn state_options_are_the_fixed_labels() {
    let server = MockServer::start().await;
    let options = api_for(&server).get_ventilation_state_options().await.unwrap();
    let labels: Vec<&str> = LEGACY_STATES.iter().map(|(_, l)| *l).collect();
    assert_eq!(options, labels);
}

#[tokio::test]
async fn override_success_is_http_200() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/nodesetoverrule"))
        .and(query_param("node", "1"))
        .and(query_param("value", "255"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/nodesetoverrule"))
        .and(query_param("value", "40"))
        .respond_with(ResponseTemplate::new(400))
        .mount(&server)
        .await;

    let api = api_for(&server);
    assert!(api.set_node_override(1, CLEAR_OVERRIDE).await.unwrap());
    assert!(!api.set_node_override(1, 40).await.unwrap());
}

#[tokio::test]
async fn override_out_of_range_is_rejected_locally() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/nodesetoverrule"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let err = api_for(&server).set_node_override(1, 150).await.unwrap_err();
    assert!(matches!(err, Error::InvalidOverride(150)));
}

fn param(val: i64, min: i64, max: i64, inc: i64) -> serde_json::Value {
    json!({"Val": val, "Min": min, "Max": max, "Inc": inc})
}

#[tokio::test]
async fn box_config_merges_node_and_energy_sections() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/nodeconfigget"))
        .and(query_param("node", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "Location": "Utility",
            "Manual1": param(25, 10, 100, 5),
            "AutoMin": param(10, 0, 50, 1),
            "Capacity": param(325, 100, 400, 25)
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/boxconfigget"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "Energy": {
                "ComfortTemperature": param(218, 108, 258, 1),
                "BypassMode": param(0, 0, 2, 1)
            }
        })))
        .mount(&server)
        .await;

    let cfg = api_for(&server).get_node_config(1).await.unwrap().unwrap();
    assert_eq!(cfg.node_id, 1);
    assert_eq!(cfg.location.as_deref(), Some("Utility"));
    assert_eq!(cfg.manual1.unwrap().inc, 5.0);
    assert_eq!(cfg.auto_min.unwrap().max, 50.0);
    assert_eq!(cfg.capacity.unwrap().inc, 25.0);
    assert_eq!(cfg.comfort_temperature.unwrap().val, 218.0);
    assert_eq!(cfg.bypass_mode.unwrap().max, 2.0);
    assert!(cfg.filter_reset.is_none());
}

#[tokio::test]
async fn box_config_survives_missing_box_section() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/nodeconfigget"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"Manual2": param(50, 10, 100, 5)})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/boxconfigget"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let cfg = api_for(&server).get_node_config(1).await.unwrap().unwrap();
    assert_eq!(cfg.manual2.unwrap().val, 50.0);
    assert!(cfg.comfort_temperature.is_none());
}

#[tokio::test]
async fn room_node_config_reads_node_scope_only() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/nodeconfigget"))
        .and(query_param("node", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "Location": "Bedroom",
            "CO2Setpoint": param(800, 500, 1200, 50),
            "AutoMin": param(10, 0, 50, 1)
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/boxconfigget"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(0)
        .mount(&server)
        .await;

    let cfg = api_for(&server).get_node_config(2).await.unwrap().unwrap();
    assert_eq!(cfg.co2_setpoint.unwrap().inc, 50.0);
    assert!(cfg.auto_min.is_none());
    assert_eq!(cfg.location.as_deref(), Some("Bedroom"));
}

#[tokio::test]
async fn room_node_config_absent_on_error_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/nodeconfigget"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    assert!(api_for(&server).get_node_config(5).await.unwrap().is_none());
}

#[tokio::test]
async fn box_level_parameter_routes_to_box_endpoint() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/boxconfigset"))
        .and(query_param("mod", "Energy"))
        .and(query_param("para", "ComfortTemperature"))
        .and(query_param("value", "228"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let ok = api_for(&server)
        .set_node_config(1, ConfigParameter::ComfortTemperature, 228)
        .await
        .unwrap();
    assert!(ok);
}

#[tokio::test]
async fn node_parameters_and_other_nodes_route_to_node_endpoint() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/nodeconfigset"))
        .and(query_param("node", "1"))
        .and(query_param("para", "Manual1"))
        .and(query_param("value", "30"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    // Box-level name on a room node still goes to the node endpoint.
    Mock::given(method("GET"))
        .and(path("/nodeconfigset"))
        .and(query_param("node", "3"))
        .and(query_param("para", "BypassMode"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/boxconfigset"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let api = api_for(&server);
    assert!(api.set_node_config(1, ConfigParameter::Manual1, 30).await.unwrap());
    assert!(!api.set_node_config(3, ConfigParameter::BypassMode, 1).await.unwrap());
}

#[tokio::test]
async fn device_info_uses_devtype_and_location() {
    let server = MockServer::start().await;
    mount_node(
        &server,
        "1",
        json!({"devtype": "BOX", "location": "ducobox_silent", "serialnb": "RS1911001234",
               "swversion": "16056.10.4.0", "state": "AUTO"}),
    )
    .await;

    let info = api_for(&server).get_device_info().await.unwrap();
    assert_eq!(info.model, "Box Ducobox Silent");
    assert_eq!(info.api_version, "16056.10.4.0");
    assert_eq!(info.serial_number, "RS1911001234");
    assert_eq!(info.mac_address, None);
}

#[tokio::test]
async fn capabilities_are_all_present() {
    let server = MockServer::start().await;
    let caps = api_for(&server).capabilities();
    assert!(caps.energy && caps.node_scan && caps.node_config && caps.node_override);
}
